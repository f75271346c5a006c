//! Gift card ledger.
//!
//! A code moves from unredeemed to redeemed exactly once. The transition is a
//! conditional `UPDATE … WHERE is_redeemed = 0`, so of two concurrent attempts
//! on the same code only one can observe a changed row.

use rand::Rng;
use rusqlite::{Connection, OptionalExtension, Row};
use reclaim_types::gift_card::GiftCardCode;
use reclaim_types::sku::PaymentMode;

use crate::queries::skus;
use crate::{DbError, Result};

/// Characters used in generated codes. Excludes `0 O 1 I` to avoid misreads.
const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Groups of four characters in a generated code.
const CODE_GROUPS: usize = 3;

/// Upper bound on codes issued in one call.
pub const MAX_ISSUE_BATCH: u32 = 10_000;

const GIFT_CARD_COLUMNS: &str =
    "id, code, sku_id, is_redeemed, redeemed_at, redeemed_by, created_at";

/// Store a specific code for a SKU.
pub fn insert(conn: &Connection, code: &str, sku_id: &str) -> Result<GiftCardCode> {
    let card = GiftCardCode {
        id: crate::new_id(),
        code: normalize(code),
        sku_id: sku_id.to_string(),
        is_redeemed: false,
        redeemed_at: None,
        redeemed_by: None,
        created_at: crate::now(),
    };
    if card.code.is_empty() {
        return Err(DbError::Validation("gift card code must not be empty".into()));
    }
    conn.execute(
        "INSERT INTO gift_card_codes (id, code, sku_id, created_at) VALUES (?1, ?2, ?3, ?4)",
        rusqlite::params![card.id, card.code, card.sku_id, card.created_at as i64],
    )
    .map_err(|e| match e {
        rusqlite::Error::SqliteFailure(f, _)
            if f.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            DbError::Conflict(format!("gift card '{}' already exists", card.code))
        }
        other => DbError::Sqlite(other),
    })?;
    Ok(card)
}

/// Generate `count` fresh random codes bound to a GIFT_CARD SKU.
pub fn issue(conn: &Connection, sku_id: &str, count: u32) -> Result<Vec<GiftCardCode>> {
    if count == 0 || count > MAX_ISSUE_BATCH {
        return Err(DbError::Validation(format!(
            "gift card batch size must be within 1..={MAX_ISSUE_BATCH}, got {count}"
        )));
    }
    let sku = skus::get_by_id(conn, sku_id)?;
    if sku.payment_mode != PaymentMode::GiftCard {
        return Err(DbError::Validation(format!(
            "sku '{}' is {}, not GIFT_CARD",
            sku.code, sku.payment_mode
        )));
    }

    let mut rng = rand::thread_rng();
    let mut cards = Vec::with_capacity(count as usize);
    while cards.len() < count as usize {
        match insert(conn, &generate_code(&mut rng), sku_id) {
            Ok(card) => cards.push(card),
            // Collision with an existing code; draw again.
            Err(DbError::Conflict(_)) => continue,
            Err(e) => return Err(e),
        }
    }
    tracing::info!(sku = %sku.code, count, "gift cards issued");
    Ok(cards)
}

/// Fetch a code.
pub fn get_by_code(conn: &Connection, code: &str) -> Result<GiftCardCode> {
    let code = normalize(code);
    conn.query_row(
        &format!("SELECT {GIFT_CARD_COLUMNS} FROM gift_card_codes WHERE code = ?1"),
        [&code],
        card_from_row,
    )
    .optional()?
    .ok_or_else(|| DbError::NotFound(format!("gift card '{code}'")))
}

/// Check that a code exists, is unused and (optionally) belongs to the SKU
/// being purchased. Does not modify the code.
pub fn validate(conn: &Connection, code: &str, expected_sku_id: Option<&str>) -> Result<GiftCardCode> {
    let card = get_by_code(conn, code)?;
    if card.is_redeemed {
        return Err(DbError::Conflict(format!("gift card '{}' already redeemed", card.code)));
    }
    if let Some(expected) = expected_sku_id {
        if card.sku_id != expected {
            return Err(DbError::Validation(format!(
                "gift card '{}' is not valid for this product",
                card.code
            )));
        }
    }
    Ok(card)
}

/// Mark a code as used by `user_id`.
///
/// Re-checks redemption state inside the update itself; a code redeemed
/// between [`validate`] and this call yields [`DbError::Conflict`].
pub fn redeem_and_bind(conn: &Connection, code: &str, user_id: &str) -> Result<GiftCardCode> {
    let card = transition(conn, code, Some(user_id))?;
    tracing::info!(code = %card.code, user_id, "gift card redeemed");
    Ok(card)
}

/// Void a code administratively. It ends redeemed with no redeemer.
pub fn invalidate(conn: &Connection, code: &str) -> Result<GiftCardCode> {
    let card = transition(conn, code, None)?;
    tracing::info!(code = %card.code, "gift card invalidated");
    Ok(card)
}

fn transition(conn: &Connection, code: &str, user_id: Option<&str>) -> Result<GiftCardCode> {
    let code = normalize(code);
    let updated = conn
        .query_row(
            &format!(
                "UPDATE gift_card_codes
                 SET is_redeemed = 1, redeemed_at = ?2, redeemed_by = ?3
                 WHERE code = ?1 AND is_redeemed = 0
                 RETURNING {GIFT_CARD_COLUMNS}"
            ),
            rusqlite::params![code, crate::now() as i64, user_id],
            card_from_row,
        )
        .optional()?;
    match updated {
        Some(card) => Ok(card),
        None => {
            // Missing code surfaces as NotFound; otherwise it was already used.
            get_by_code(conn, &code)?;
            Err(DbError::Conflict(format!("gift card '{code}' already redeemed")))
        }
    }
}

fn generate_code(rng: &mut impl Rng) -> String {
    let groups: Vec<String> = (0..CODE_GROUPS)
        .map(|_| {
            (0..4)
                .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
                .collect::<String>()
        })
        .collect();
    groups.join("-")
}

fn normalize(code: &str) -> String {
    code.trim().to_uppercase()
}

fn card_from_row(row: &Row<'_>) -> rusqlite::Result<GiftCardCode> {
    Ok(GiftCardCode {
        id: row.get(0)?,
        code: row.get(1)?,
        sku_id: row.get(2)?,
        is_redeemed: row.get(3)?,
        redeemed_at: row.get::<_, Option<i64>>(4)?.map(|t| t as u64),
        redeemed_by: row.get(5)?,
        created_at: row.get::<_, i64>(6)? as u64,
    })
}
