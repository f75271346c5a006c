//! Wallet ledger.
//!
//! Every mutation is a single `UPDATE … RETURNING` statement that reads and
//! writes the row under SQLite's write lock, so concurrent credits against the
//! same owner can never both act on the same stale balance. The balance
//! equation `current_balance = total_accumulated - total_redeemed` is also
//! enforced by a table `CHECK`.

use rusqlite::{Connection, OptionalExtension, Row};
use reclaim_types::wallet::{OwnerType, Wallet, WalletAdjustment};
use reclaim_types::{Cents, Grams};

use crate::queries::users;
use crate::{DbError, Result};

const WALLET_COLUMNS: &str = "id, owner_id, owner_type, total_accumulated, total_redeemed,
     current_balance, total_amount_spent, certified_asset_status, updated_at";

/// Fetch the wallet of an owner, if one has been created.
pub fn find(conn: &Connection, owner_id: &str, owner_type: OwnerType) -> Result<Option<Wallet>> {
    conn.query_row(
        &format!("SELECT {WALLET_COLUMNS} FROM wallets WHERE owner_id = ?1 AND owner_type = ?2"),
        rusqlite::params![owner_id, owner_type.as_str()],
        wallet_from_row,
    )
    .optional()
    .map_err(DbError::Sqlite)
}

/// Fetch the wallet of an owner.
pub fn get(conn: &Connection, owner_id: &str, owner_type: OwnerType) -> Result<Wallet> {
    find(conn, owner_id, owner_type)?
        .ok_or_else(|| DbError::NotFound(format!("{owner_type} wallet for '{owner_id}'")))
}

/// Create a zeroed wallet for the owner unless one exists.
fn ensure(conn: &Connection, owner_id: &str, owner_type: OwnerType) -> Result<()> {
    conn.execute(
        "INSERT INTO wallets (id, owner_id, owner_type, updated_at)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(owner_id, owner_type) DO NOTHING",
        rusqlite::params![
            crate::new_id(),
            owner_id,
            owner_type.as_str(),
            crate::now() as i64
        ],
    )?;
    Ok(())
}

/// Credit impact and spend to an owner's wallet.
///
/// Creates the wallet on first use. `certified_asset_status` becomes
/// `total_amount_spent >= threshold` after the spend is added.
pub fn credit(
    conn: &Connection,
    owner_id: &str,
    owner_type: OwnerType,
    impact: Grams,
    amount_spent: Cents,
    threshold: Cents,
) -> Result<Wallet> {
    let impact_sql = crate::sql_amount(impact, "impact")?;
    let spent_sql = crate::sql_amount(amount_spent, "amount spent")?;
    let threshold_sql = crate::sql_amount(threshold, "threshold")?;
    ensure(conn, owner_id, owner_type)?;
    let wallet = conn.query_row(
        &format!(
            "UPDATE wallets SET
                 total_accumulated = total_accumulated + ?3,
                 total_amount_spent = total_amount_spent + ?4,
                 current_balance = total_accumulated + ?3 - total_redeemed,
                 certified_asset_status = (certified_asset_status OR total_amount_spent + ?4 >= ?5),
                 updated_at = ?6
             WHERE owner_id = ?1 AND owner_type = ?2
             RETURNING {WALLET_COLUMNS}"
        ),
        rusqlite::params![
            owner_id,
            owner_type.as_str(),
            impact_sql,
            spent_sql,
            threshold_sql,
            crate::now() as i64,
        ],
        wallet_from_row,
    )?;
    tracing::debug!(
        owner_id,
        owner_type = %owner_type,
        impact,
        amount_spent,
        balance = wallet.current_balance,
        certified = wallet.certified_asset_status,
        "wallet credited"
    );
    Ok(wallet)
}

/// Redeem impact from an owner's wallet.
///
/// # Errors
///
/// - [`DbError::InvalidAmount`] if `grams` is zero
/// - [`DbError::NotFound`] if the owner has no wallet
/// - [`DbError::InsufficientBalance`] if `grams` exceeds the current balance
pub fn redeem(conn: &Connection, owner_id: &str, owner_type: OwnerType, grams: Grams) -> Result<Wallet> {
    if grams == 0 {
        return Err(DbError::InvalidAmount("redemption must be > 0 g".into()));
    }
    // No balance can exceed i64::MAX, so an unrepresentable request is an overdraw.
    let Ok(grams_sql) = i64::try_from(grams) else {
        let wallet = get(conn, owner_id, owner_type)?;
        return Err(DbError::InsufficientBalance {
            available: wallet.current_balance,
            requested: grams,
        });
    };
    let redeemed = conn
        .query_row(
            &format!(
                "UPDATE wallets SET
                     total_redeemed = total_redeemed + ?3,
                     current_balance = total_accumulated - (total_redeemed + ?3),
                     updated_at = ?4
                 WHERE owner_id = ?1 AND owner_type = ?2 AND current_balance >= ?3
                 RETURNING {WALLET_COLUMNS}"
            ),
            rusqlite::params![owner_id, owner_type.as_str(), grams_sql, crate::now() as i64],
            wallet_from_row,
        )
        .optional()?;

    match redeemed {
        Some(wallet) => {
            tracing::info!(
                owner_id,
                owner_type = %owner_type,
                grams,
                balance = wallet.current_balance,
                "wallet redeemed"
            );
            Ok(wallet)
        }
        None => {
            let wallet = get(conn, owner_id, owner_type)?;
            Err(DbError::InsufficientBalance {
                available: wallet.current_balance,
                requested: grams,
            })
        }
    }
}

/// Apply an administrative adjustment to a user's wallet and record it.
///
/// The delta is applied to `total_accumulated`. Rejects a zero delta, an
/// empty reason or actor, and any delta that would make the balance negative.
pub fn adjust(
    conn: &Connection,
    user_id: &str,
    delta_grams: i64,
    reason: &str,
    adjusted_by: &str,
) -> Result<(Wallet, WalletAdjustment)> {
    if delta_grams == 0 {
        return Err(DbError::Validation("adjustment delta must not be zero".into()));
    }
    if reason.trim().is_empty() {
        return Err(DbError::Validation("adjustment reason must not be empty".into()));
    }
    if adjusted_by.trim().is_empty() {
        return Err(DbError::Validation("adjusted_by must not be empty".into()));
    }
    users::get_by_id(conn, user_id)?;
    ensure(conn, user_id, OwnerType::User)?;

    let adjusted = conn
        .query_row(
            &format!(
                "UPDATE wallets SET
                     total_accumulated = total_accumulated + ?2,
                     current_balance = current_balance + ?2,
                     updated_at = ?3
                 WHERE owner_id = ?1 AND owner_type = 'user' AND current_balance + ?2 >= 0
                 RETURNING {WALLET_COLUMNS}"
            ),
            rusqlite::params![user_id, delta_grams, crate::now() as i64],
            wallet_from_row,
        )
        .optional()?;

    let Some(wallet) = adjusted else {
        let current = get(conn, user_id, OwnerType::User)?;
        return Err(DbError::Validation(format!(
            "adjustment of {delta_grams} g would drive balance of {} g negative",
            current.current_balance
        )));
    };

    let balance_after = wallet.current_balance;
    let balance_before = (balance_after as i64 - delta_grams) as u64;
    let record = WalletAdjustment {
        id: crate::new_id(),
        wallet_id: wallet.id.clone(),
        delta_grams,
        reason: reason.trim().to_string(),
        adjusted_by: adjusted_by.to_string(),
        balance_before,
        balance_after,
        created_at: crate::now(),
    };
    conn.execute(
        "INSERT INTO wallet_adjustments
             (id, wallet_id, delta_grams, reason, adjusted_by, balance_before, balance_after, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        rusqlite::params![
            record.id,
            record.wallet_id,
            record.delta_grams,
            record.reason,
            record.adjusted_by,
            record.balance_before as i64,
            record.balance_after as i64,
            record.created_at as i64,
        ],
    )?;

    tracing::info!(
        user_id,
        delta_grams,
        adjusted_by,
        balance_before,
        balance_after,
        "wallet adjusted"
    );
    Ok((wallet, record))
}

/// Adjustments recorded against a wallet, newest first.
pub fn adjustments(conn: &Connection, wallet_id: &str) -> Result<Vec<WalletAdjustment>> {
    let mut stmt = conn.prepare(
        "SELECT id, wallet_id, delta_grams, reason, adjusted_by, balance_before, balance_after, created_at
         FROM wallet_adjustments WHERE wallet_id = ?1
         ORDER BY created_at DESC, rowid DESC",
    )?;
    let rows = stmt
        .query_map([wallet_id], |row| {
            Ok(WalletAdjustment {
                id: row.get(0)?,
                wallet_id: row.get(1)?,
                delta_grams: row.get(2)?,
                reason: row.get(3)?,
                adjusted_by: row.get(4)?,
                balance_before: row.get::<_, i64>(5)? as u64,
                balance_after: row.get::<_, i64>(6)? as u64,
                created_at: row.get::<_, i64>(7)? as u64,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn wallet_from_row(row: &Row<'_>) -> rusqlite::Result<Wallet> {
    let owner_type: String = row.get(2)?;
    let owner_type = owner_type.parse::<OwnerType>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(Wallet {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        owner_type,
        total_accumulated: row.get::<_, i64>(3)? as u64,
        total_redeemed: row.get::<_, i64>(4)? as u64,
        current_balance: row.get::<_, i64>(5)? as u64,
        total_amount_spent: row.get::<_, i64>(6)? as u64,
        certified_asset_status: row.get(7)?,
        updated_at: row.get::<_, i64>(8)? as u64,
    })
}
