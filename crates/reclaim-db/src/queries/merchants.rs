//! Merchant records.

use rusqlite::{Connection, OptionalExtension};
use reclaim_types::sku::Merchant;

use crate::{DbError, Result};

/// Register a merchant.
pub fn insert(conn: &Connection, name: &str, stripe_account_id: Option<&str>) -> Result<Merchant> {
    if name.trim().is_empty() {
        return Err(DbError::Validation("merchant name must not be empty".into()));
    }
    let merchant = Merchant {
        id: crate::new_id(),
        name: name.to_string(),
        stripe_account_id: stripe_account_id.map(str::to_string),
        created_at: crate::now(),
    };
    conn.execute(
        "INSERT INTO merchants (id, name, stripe_account_id, created_at)
         VALUES (?1, ?2, ?3, ?4)",
        rusqlite::params![
            merchant.id,
            merchant.name,
            merchant.stripe_account_id,
            merchant.created_at as i64,
        ],
    )?;
    Ok(merchant)
}

/// Fetch a merchant by id.
pub fn get(conn: &Connection, id: &str) -> Result<Merchant> {
    conn.query_row(
        "SELECT id, name, stripe_account_id, created_at FROM merchants WHERE id = ?1",
        [id],
        |row| {
            Ok(Merchant {
                id: row.get(0)?,
                name: row.get(1)?,
                stripe_account_id: row.get(2)?,
                created_at: row.get::<_, i64>(3)? as u64,
            })
        },
    )
    .optional()?
    .ok_or_else(|| DbError::NotFound(format!("merchant '{id}'")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_get() {
        let conn = crate::open_memory().expect("open");
        let m = insert(&conn, "Quayside Cafe", Some("acct_123")).expect("insert");
        let fetched = get(&conn, &m.id).expect("get");
        assert_eq!(fetched.stripe_account_id.as_deref(), Some("acct_123"));
        assert!(matches!(get(&conn, "nope"), Err(DbError::NotFound(_))));
    }
}
