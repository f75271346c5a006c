//! Global configuration store.
//!
//! Values are stored as strings. Typed accessors validate on every read and
//! report [`DbError::InvalidConfig`] instead of substituting a default.

use rusqlite::{Connection, OptionalExtension};
use reclaim_types::config::{self as keys, ConfigChange, ConfigSnapshot};
use reclaim_types::{euros_to_cents, Cents};

use crate::{DbError, Result};

/// Get a raw value by key.
pub fn get(conn: &Connection, key: &str) -> Result<String> {
    conn.query_row(
        "SELECT value FROM global_config WHERE key = ?1",
        [key],
        |row| row.get(0),
    )
    .map_err(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => DbError::NotFound(format!("config key '{key}'")),
        other => DbError::Sqlite(other),
    })
}

/// List every key/value pair, sorted by key.
pub fn list(conn: &Connection) -> Result<Vec<(String, String)>> {
    let mut stmt = conn.prepare("SELECT key, value FROM global_config ORDER BY key")?;
    let rows = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Set a value and append an audit entry, atomically.
///
/// Known keys are validated before anything is written.
pub fn set(conn: &mut Connection, key: &str, value: &str, changed_by: &str) -> Result<()> {
    validate_value(key, value).map_err(DbError::Validation)?;
    if changed_by.trim().is_empty() {
        return Err(DbError::Validation("changed_by must not be empty".into()));
    }

    let now = crate::now();
    let tx = crate::begin_immediate(conn)?;
    let old: Option<String> = tx
        .query_row(
            "SELECT value FROM global_config WHERE key = ?1",
            [key],
            |row| row.get(0),
        )
        .optional()?;

    tx.execute(
        "INSERT INTO global_config (key, value, updated_at, updated_by)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(key) DO UPDATE SET
             value = excluded.value,
             updated_at = excluded.updated_at,
             updated_by = excluded.updated_by",
        rusqlite::params![key, value, now as i64, changed_by],
    )?;
    tx.execute(
        "INSERT INTO config_history (key, old_value, new_value, changed_by, changed_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        rusqlite::params![key, old, value, changed_by, now as i64],
    )?;
    tx.commit()?;

    tracing::info!(key, value, changed_by, "config changed");
    Ok(())
}

/// Set `key` only if it has no value yet. Returns whether a value was written.
pub fn ensure(conn: &mut Connection, key: &str, value: &str, changed_by: &str) -> Result<bool> {
    match get(conn, key) {
        Ok(_) => Ok(false),
        Err(DbError::NotFound(_)) => {
            set(conn, key, value, changed_by)?;
            Ok(true)
        }
        Err(e) => Err(e),
    }
}

/// Audit trail, newest first. `key = None` returns every key.
pub fn history(conn: &Connection, key: Option<&str>, limit: u32) -> Result<Vec<ConfigChange>> {
    let mut stmt = conn.prepare(
        "SELECT key, old_value, new_value, changed_by, changed_at
         FROM config_history
         WHERE ?1 IS NULL OR key = ?1
         ORDER BY id DESC LIMIT ?2",
    )?;
    let rows = stmt
        .query_map(rusqlite::params![key, limit], |row| {
            Ok(ConfigChange {
                key: row.get(0)?,
                old_value: row.get(1)?,
                new_value: row.get(2)?,
                changed_by: row.get(3)?,
                changed_at: row.get::<_, i64>(4)? as u64,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Current price per kilogram in euros. Must be > 0.
pub fn csr_price(conn: &Connection) -> Result<f64> {
    let raw = required(conn, keys::CURRENT_CSR_PRICE)?;
    parse_positive(keys::CURRENT_CSR_PRICE, &raw).map_err(DbError::InvalidConfig)
}

/// Global corsair threshold in cents. Must be > 0.
pub fn corsair_threshold(conn: &Connection) -> Result<Cents> {
    let raw = required(conn, keys::CORSAIR_THRESHOLD)?;
    parse_threshold(&raw).map_err(DbError::InvalidConfig)
}

/// Platform fee fraction in `[0, 1]`.
pub fn platform_fee(conn: &Connection) -> Result<f64> {
    let raw = required(conn, keys::PLATFORM_FEE_PERCENTAGE)?;
    parse_fraction(&raw).map_err(DbError::InvalidConfig)
}

/// Master attribution id. Must be non-empty.
pub fn master_id(conn: &Connection) -> Result<String> {
    let raw = required(conn, keys::MASTER_ID)?;
    if raw.trim().is_empty() {
        return Err(DbError::InvalidConfig(format!("{} is empty", keys::MASTER_ID)));
    }
    Ok(raw)
}

/// Read and validate every settlement key at once.
pub fn snapshot(conn: &Connection) -> Result<ConfigSnapshot> {
    Ok(ConfigSnapshot {
        csr_price_per_kg: csr_price(conn)?,
        corsair_threshold: corsair_threshold(conn)?,
        platform_fee_fraction: platform_fee(conn)?,
        master_id: master_id(conn)?,
    })
}

fn required(conn: &Connection, key: &str) -> Result<String> {
    get(conn, key).map_err(|e| match e {
        DbError::NotFound(_) => DbError::InvalidConfig(format!("{key} is not set")),
        other => other,
    })
}

fn validate_value(key: &str, value: &str) -> std::result::Result<(), String> {
    match key {
        keys::CURRENT_CSR_PRICE => parse_positive(key, value).map(|_| ()),
        keys::CORSAIR_THRESHOLD => parse_threshold(value).map(|_| ()),
        keys::PLATFORM_FEE_PERCENTAGE => parse_fraction(value).map(|_| ()),
        keys::MASTER_ID if value.trim().is_empty() => Err(format!("{key} must not be empty")),
        _ => Ok(()),
    }
}

fn parse_positive(key: &str, raw: &str) -> std::result::Result<f64, String> {
    let v: f64 = raw
        .trim()
        .parse()
        .map_err(|_| format!("{key} is not a number: '{raw}'"))?;
    if !v.is_finite() || v <= 0.0 {
        return Err(format!("{key} must be > 0, got {raw}"));
    }
    Ok(v)
}

fn parse_threshold(raw: &str) -> std::result::Result<Cents, String> {
    let euros = parse_positive(keys::CORSAIR_THRESHOLD, raw)?;
    match euros_to_cents(euros) {
        Some(cents) if cents > 0 => Ok(cents),
        _ => Err(format!("{} rounds to zero cents: {raw}", keys::CORSAIR_THRESHOLD)),
    }
}

fn parse_fraction(raw: &str) -> std::result::Result<f64, String> {
    let key = keys::PLATFORM_FEE_PERCENTAGE;
    let v: f64 = raw
        .trim()
        .parse()
        .map_err(|_| format!("{key} is not a number: '{raw}'"))?;
    if !(0.0..=1.0).contains(&v) {
        return Err(format!("{key} must be within [0, 1], got {raw}"));
    }
    Ok(v)
}
