//! # reclaim-db
//!
//! Persistence layer for the settlement engine.
//! Manages the single SQLite database at `$RECLAIM_DATA_DIR/reclaim.db`.
//!
//! ## Schema
//!
//! - WAL mode mandatory
//! - Foreign keys enforced
//! - All timestamps are Unix epoch seconds
//! - Money in integer cents, impact in integer grams
//! - Schema version stored in `PRAGMA user_version`
//!
//! ## Locking
//!
//! Every multi-step mutation runs inside a transaction opened with
//! [`begin_immediate`], which takes SQLite's reserved lock up front.
//! Wallet and gift card writes are single conditional statements, so no
//! caller ever acts on a stale read of a balance or a redemption flag.

pub mod migrations;
pub mod queries;
pub mod schema;

use std::path::Path;

use rand::RngCore;
use rusqlite::{Connection, Transaction, TransactionBehavior};

/// Current schema version.
pub const SCHEMA_VERSION: u32 = 1;

/// Database error types.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("migration failed: {0}")]
    Migration(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("insufficient balance: have {available} g, requested {requested} g")]
    InsufficientBalance { available: u64, requested: u64 },

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("unknown payment mode '{0}'")]
    UnknownPaymentMode(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

pub type Result<T> = std::result::Result<T, DbError>;

/// Open or create the database at the given path.
///
/// Configures WAL mode, foreign keys, and runs any pending migrations.
pub fn open(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)?;
    configure(&conn)?;
    migrations::run(&conn)?;
    Ok(conn)
}

/// Open an in-memory database (for testing).
pub fn open_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory()?;
    configure(&conn)?;
    migrations::run(&conn)?;
    Ok(conn)
}

/// Start a write transaction that holds the database write lock from the
/// first statement until commit or rollback.
pub fn begin_immediate(conn: &mut Connection) -> Result<Transaction<'_>> {
    Ok(conn.transaction_with_behavior(TransactionBehavior::Immediate)?)
}

/// Configure SQLite pragmas.
fn configure(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = 5000;
         PRAGMA synchronous = NORMAL;
         PRAGMA cache_size = -8000;",
    )?;
    Ok(())
}

/// Convert a cent or gram quantity to SQLite's signed integer.
///
/// Quantities beyond `i64::MAX` cannot be stored and would wrap if cast.
pub fn sql_amount(value: u64, what: &str) -> Result<i64> {
    i64::try_from(value).map_err(|_| DbError::InvalidAmount(format!("{what} of {value} is out of range")))
}

/// Generate a fresh 128-bit hex identifier.
pub fn new_id() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Current Unix timestamp in seconds.
pub fn now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_memory() {
        let conn = open_memory().expect("open in-memory db");
        let version: u32 = conn
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .expect("get user_version");
        assert_eq!(version, SCHEMA_VERSION);
    }

    #[test]
    fn test_foreign_keys_enabled() {
        let conn = open_memory().expect("open");
        let fk: i32 = conn
            .pragma_query_value(None, "foreign_keys", |row| row.get(0))
            .expect("get foreign_keys");
        assert_eq!(fk, 1);
    }

    #[test]
    fn test_new_id_is_unique_hex() {
        let a = new_id();
        let b = new_id();
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[test]
    fn test_immediate_transaction_rolls_back_on_drop() {
        let mut conn = open_memory().expect("open");
        {
            let tx = begin_immediate(&mut conn).expect("begin");
            tx.execute(
                "INSERT INTO merchants (id, name, created_at) VALUES ('m1', 'Quay', 1)",
                [],
            )
            .expect("insert");
        }
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM merchants", [], |row| row.get(0))
            .expect("count");
        assert_eq!(count, 0);
    }
}
