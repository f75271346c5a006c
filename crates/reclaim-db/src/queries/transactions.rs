//! Transaction records.
//!
//! Rows are append-mostly: after insertion only `payment_status`,
//! `stripe_payment_intent_id` and `settled_at` change, and only through the
//! conditional `pending → completed|failed` updates below.

use rusqlite::{Connection, OptionalExtension, Row};
use reclaim_types::transaction::{NewTransaction, PaymentStatus, Transaction};

use crate::{DbError, Result};

const TX_COLUMNS: &str = "id, user_id, sku_id, master_id, merchant_id, partner_id, order_id,
     amount, calculated_impact, payment_status, checkout_ref, gateway_reference,
     stripe_payment_intent_id, application_fee, gift_card_code_id, corsair_connect_flag,
     created_by, created_at, settled_at, corsair_threshold";

/// Insert a transaction.
///
/// Transactions created in a terminal state are stamped `settled_at = created_at`.
pub fn insert(conn: &Connection, new: &NewTransaction) -> Result<Transaction> {
    let now = crate::now();
    let settled_at = new.payment_status.is_terminal().then_some(now);
    let tx = Transaction {
        id: crate::new_id(),
        user_id: new.user_id.clone(),
        sku_id: new.sku_id.clone(),
        master_id: new.master_id.clone(),
        merchant_id: new.merchant_id.clone(),
        partner_id: new.partner_id.clone(),
        order_id: new.order_id.clone(),
        amount: new.amount,
        calculated_impact: new.calculated_impact,
        payment_status: new.payment_status,
        checkout_ref: new.checkout_ref.clone(),
        gateway_reference: new.gateway_reference.clone(),
        stripe_payment_intent_id: None,
        application_fee: new.application_fee,
        gift_card_code_id: new.gift_card_code_id.clone(),
        corsair_connect_flag: new.corsair_connect_flag,
        corsair_threshold: new.corsair_threshold,
        created_by: new.created_by.clone(),
        created_at: now,
        settled_at,
    };
    let amount = crate::sql_amount(tx.amount, "amount")?;
    let impact = crate::sql_amount(tx.calculated_impact, "impact")?;
    let application_fee = tx
        .application_fee
        .map(|f| crate::sql_amount(f, "application fee"))
        .transpose()?;
    let corsair_threshold = crate::sql_amount(tx.corsair_threshold, "corsair threshold")?;
    conn.execute(
        &format!(
            "INSERT INTO transactions ({TX_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, NULL, ?13, ?14, ?15, ?16, ?17, ?18, ?19)"
        ),
        rusqlite::params![
            tx.id,
            tx.user_id,
            tx.sku_id,
            tx.master_id,
            tx.merchant_id,
            tx.partner_id,
            tx.order_id,
            amount,
            impact,
            tx.payment_status.as_str(),
            tx.checkout_ref,
            tx.gateway_reference,
            application_fee,
            tx.gift_card_code_id,
            tx.corsair_connect_flag,
            tx.created_by,
            tx.created_at as i64,
            tx.settled_at.map(|t| t as i64),
            corsair_threshold,
        ],
    )
    .map_err(|e| match e {
        rusqlite::Error::SqliteFailure(f, _)
            if f.code == rusqlite::ErrorCode::ConstraintViolation
                && f.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
        {
            DbError::Conflict(format!("transaction '{}' duplicates an existing record", tx.checkout_ref))
        }
        other => DbError::Sqlite(other),
    })?;
    tracing::info!(
        transaction_id = %tx.id,
        user_id = %tx.user_id,
        amount = tx.amount,
        impact = tx.calculated_impact,
        status = %tx.payment_status,
        "transaction recorded"
    );
    Ok(tx)
}

/// Fetch a transaction by id.
pub fn get(conn: &Connection, id: &str) -> Result<Transaction> {
    find_by(conn, "id", id)?.ok_or_else(|| DbError::NotFound(format!("transaction '{id}'")))
}

/// Find the transaction already bound to a gateway payment intent.
pub fn find_by_payment_intent(conn: &Connection, payment_intent_id: &str) -> Result<Option<Transaction>> {
    find_by(conn, "stripe_payment_intent_id", payment_intent_id)
}

/// Find a transaction by the correlation id embedded in gateway metadata.
pub fn find_by_checkout_ref(conn: &Connection, checkout_ref: &str) -> Result<Option<Transaction>> {
    find_by(conn, "checkout_ref", checkout_ref)
}

/// Find a transaction by the intent/session id returned at creation.
pub fn find_by_gateway_reference(conn: &Connection, reference: &str) -> Result<Option<Transaction>> {
    find_by(conn, "gateway_reference", reference)
}

/// Most recent transactions of a user.
pub fn list_for_user(conn: &Connection, user_id: &str, limit: u32) -> Result<Vec<Transaction>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {TX_COLUMNS} FROM transactions WHERE user_id = ?1
         ORDER BY created_at DESC, rowid DESC LIMIT ?2"
    ))?;
    let rows = stmt
        .query_map(rusqlite::params![user_id, limit], tx_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Move a pending transaction to `completed` and bind the payment intent.
///
/// Returns the updated row, or `None` if the transaction was not pending.
pub fn complete_pending(
    conn: &Connection,
    id: &str,
    payment_intent_id: &str,
) -> Result<Option<Transaction>> {
    settle_pending(conn, id, PaymentStatus::Completed, Some(payment_intent_id))
}

/// Move a pending transaction to `failed`. No ledger effect.
///
/// Returns the updated row, or `None` if the transaction was not pending.
pub fn fail_pending(
    conn: &Connection,
    id: &str,
    payment_intent_id: Option<&str>,
) -> Result<Option<Transaction>> {
    settle_pending(conn, id, PaymentStatus::Failed, payment_intent_id)
}

fn settle_pending(
    conn: &Connection,
    id: &str,
    status: PaymentStatus,
    payment_intent_id: Option<&str>,
) -> Result<Option<Transaction>> {
    conn.query_row(
        &format!(
            "UPDATE transactions SET
                 payment_status = ?2,
                 stripe_payment_intent_id = COALESCE(?3, stripe_payment_intent_id),
                 settled_at = ?4
             WHERE id = ?1 AND payment_status = 'pending'
             RETURNING {TX_COLUMNS}"
        ),
        rusqlite::params![id, status.as_str(), payment_intent_id, crate::now() as i64],
        tx_from_row,
    )
    .optional()
    .map_err(|e| match e {
        rusqlite::Error::SqliteFailure(f, _)
            if f.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            DbError::Conflict(format!(
                "payment intent {} is already bound to another transaction",
                payment_intent_id.unwrap_or_default()
            ))
        }
        other => DbError::Sqlite(other),
    })
}

fn find_by(conn: &Connection, column: &str, value: &str) -> Result<Option<Transaction>> {
    conn.query_row(
        &format!("SELECT {TX_COLUMNS} FROM transactions WHERE {column} = ?1 LIMIT 1"),
        [value],
        tx_from_row,
    )
    .optional()
    .map_err(DbError::Sqlite)
}

fn tx_from_row(row: &Row<'_>) -> rusqlite::Result<Transaction> {
    let status: String = row.get(9)?;
    let payment_status = status.parse::<PaymentStatus>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(9, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(Transaction {
        id: row.get(0)?,
        user_id: row.get(1)?,
        sku_id: row.get(2)?,
        master_id: row.get(3)?,
        merchant_id: row.get(4)?,
        partner_id: row.get(5)?,
        order_id: row.get(6)?,
        amount: row.get::<_, i64>(7)? as u64,
        calculated_impact: row.get::<_, i64>(8)? as u64,
        payment_status,
        checkout_ref: row.get(10)?,
        gateway_reference: row.get(11)?,
        stripe_payment_intent_id: row.get(12)?,
        application_fee: row.get::<_, Option<i64>>(13)?.map(|f| f as u64),
        gift_card_code_id: row.get(14)?,
        corsair_connect_flag: row.get(15)?,
        created_by: row.get(16)?,
        created_at: row.get::<_, i64>(17)? as u64,
        settled_at: row.get::<_, Option<i64>>(18)?.map(|t| t as u64),
        corsair_threshold: row.get::<_, i64>(19)? as u64,
    })
}
