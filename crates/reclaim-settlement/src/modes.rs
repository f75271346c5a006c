//! SKU resolution and payment-mode dispatch.
//!
//! Each payment mode fixes where the amount comes from and what status the
//! new transaction starts in:
//!
//! | Mode        | Amount                     | Initial status |
//! |-------------|----------------------------|----------------|
//! | CLAIM       | SKU price                  | `n/a`          |
//! | PAY         | SKU price                  | `pending`      |
//! | GIFT_CARD   | SKU price, code required   | `completed`    |
//! | ALLOCATION  | caller-supplied, > 0       | `completed`    |

use reclaim_db::queries::skus;
use reclaim_types::sku::{PaymentMode, Sku};
use reclaim_types::transaction::PaymentStatus;
use reclaim_types::Cents;
use rusqlite::Connection;

use crate::{Result, SettlementError};

/// Amount and initial status chosen by the payment mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Pricing {
    pub amount: Cents,
    pub status: PaymentStatus,
}

/// Load a SKU by code and reject retired ones.
pub fn resolve_sku(conn: &Connection, code: &str) -> Result<Sku> {
    let code = code.trim();
    if code.is_empty() {
        return Err(SettlementError::Validation("sku code is required".into()));
    }
    let sku = skus::get_by_code(conn, code)?;
    if !sku.is_active {
        return Err(SettlementError::Inactive(sku.code));
    }
    Ok(sku)
}

/// Determine amount and initial status for a purchase of `sku`.
///
/// # Errors
///
/// - [`SettlementError::Validation`] if a GIFT_CARD purchase has no code or an
///   ALLOCATION purchase has no positive amount
pub fn price(sku: &Sku, requested_amount: Option<Cents>, gift_card_code: Option<&str>) -> Result<Pricing> {
    match sku.payment_mode {
        PaymentMode::Claim => Ok(Pricing {
            amount: sku.price,
            status: PaymentStatus::NotApplicable,
        }),
        PaymentMode::Pay => {
            if sku.price == 0 {
                return Err(SettlementError::Config(format!(
                    "PAY sku '{}' has no price",
                    sku.code
                )));
            }
            Ok(Pricing {
                amount: sku.price,
                status: PaymentStatus::Pending,
            })
        }
        PaymentMode::GiftCard => {
            if gift_card_code.map_or(true, |c| c.trim().is_empty()) {
                return Err(SettlementError::Validation(
                    "gift card code is required for this product".into(),
                ));
            }
            Ok(Pricing {
                amount: sku.price,
                status: PaymentStatus::Completed,
            })
        }
        PaymentMode::Allocation => match requested_amount {
            Some(amount) if amount > 0 => Ok(Pricing {
                amount,
                status: PaymentStatus::Completed,
            }),
            _ => Err(SettlementError::Validation(
                "allocation requires an amount > 0".into(),
            )),
        },
    }
}
