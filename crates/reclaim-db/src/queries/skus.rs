//! SKU registry.

use rusqlite::{Connection, OptionalExtension, Row};
use reclaim_types::sku::{NewSku, PaymentMode, Sku};

use crate::{DbError, Result};

const SKU_COLUMNS: &str = "id, code, name, payment_mode, price, impact_multiplier,
     requires_validation, corsair_threshold, is_active, created_at";

/// Register a SKU.
pub fn insert(conn: &Connection, new: &NewSku) -> Result<Sku> {
    if new.code.trim().is_empty() {
        return Err(DbError::Validation("sku code must not be empty".into()));
    }
    if !new.impact_multiplier.is_finite() || new.impact_multiplier <= 0.0 {
        return Err(DbError::Validation(format!(
            "impact multiplier must be > 0, got {}",
            new.impact_multiplier
        )));
    }
    if new.corsair_threshold == Some(0) {
        return Err(DbError::Validation("corsair threshold override must be > 0".into()));
    }
    let price = crate::sql_amount(new.price, "price")?;
    let threshold = new
        .corsair_threshold
        .map(|t| crate::sql_amount(t, "corsair threshold"))
        .transpose()?;
    let sku = Sku {
        id: crate::new_id(),
        code: new.code.clone(),
        name: new.name.clone(),
        payment_mode: new.payment_mode,
        price: new.price,
        impact_multiplier: new.impact_multiplier,
        requires_validation: new.requires_validation,
        corsair_threshold: new.corsair_threshold,
        is_active: true,
        created_at: crate::now(),
    };
    conn.execute(
        "INSERT INTO skus (id, code, name, payment_mode, price, impact_multiplier,
                           requires_validation, corsair_threshold, is_active, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 1, ?9)",
        rusqlite::params![
            sku.id,
            sku.code,
            sku.name,
            sku.payment_mode.as_str(),
            price,
            sku.impact_multiplier,
            sku.requires_validation,
            threshold,
            sku.created_at as i64,
        ],
    )
    .map_err(|e| match e {
        rusqlite::Error::SqliteFailure(f, _)
            if f.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            DbError::Conflict(format!("sku code '{}' already exists", new.code))
        }
        other => DbError::Sqlite(other),
    })?;
    Ok(sku)
}

/// Look up a SKU by its public code.
pub fn get_by_code(conn: &Connection, code: &str) -> Result<Sku> {
    let raw = conn
        .query_row(
            &format!("SELECT {SKU_COLUMNS} FROM skus WHERE code = ?1"),
            [code],
            RawSku::from_row,
        )
        .optional()?
        .ok_or_else(|| DbError::NotFound(format!("sku '{code}'")))?;
    raw.into_sku()
}

/// Look up a SKU by id.
pub fn get_by_id(conn: &Connection, id: &str) -> Result<Sku> {
    let raw = conn
        .query_row(
            &format!("SELECT {SKU_COLUMNS} FROM skus WHERE id = ?1"),
            [id],
            RawSku::from_row,
        )
        .optional()?
        .ok_or_else(|| DbError::NotFound(format!("sku id '{id}'")))?;
    raw.into_sku()
}

/// Activate or retire a SKU. Pricing fields are never edited here.
pub fn set_active(conn: &Connection, id: &str, active: bool) -> Result<()> {
    let updated = conn.execute(
        "UPDATE skus SET is_active = ?1 WHERE id = ?2",
        rusqlite::params![active, id],
    )?;
    if updated == 0 {
        return Err(DbError::NotFound(format!("sku id '{id}'")));
    }
    Ok(())
}

/// Row as stored, before the payment mode label is checked.
struct RawSku {
    id: String,
    code: String,
    name: String,
    payment_mode: String,
    price: i64,
    impact_multiplier: f64,
    requires_validation: bool,
    corsair_threshold: Option<i64>,
    is_active: bool,
    created_at: i64,
}

impl RawSku {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            code: row.get(1)?,
            name: row.get(2)?,
            payment_mode: row.get(3)?,
            price: row.get(4)?,
            impact_multiplier: row.get(5)?,
            requires_validation: row.get(6)?,
            corsair_threshold: row.get(7)?,
            is_active: row.get(8)?,
            created_at: row.get(9)?,
        })
    }

    fn into_sku(self) -> Result<Sku> {
        let payment_mode: PaymentMode = self
            .payment_mode
            .parse()
            .map_err(|_| DbError::UnknownPaymentMode(self.payment_mode.clone()))?;
        Ok(Sku {
            id: self.id,
            code: self.code,
            name: self.name,
            payment_mode,
            price: self.price as u64,
            impact_multiplier: self.impact_multiplier,
            requires_validation: self.requires_validation,
            corsair_threshold: self.corsair_threshold.map(|t| t as u64),
            is_active: self.is_active,
            created_at: self.created_at as u64,
        })
    }
}
