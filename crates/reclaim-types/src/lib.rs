//! # reclaim-types
//!
//! Shared domain types used across the Reclaim workspace: SKUs, users,
//! wallets, gift cards, transactions and the global configuration snapshot.
//!
//! Money is carried as integer euro cents and impact as integer grams.

pub mod config;
pub mod gift_card;
pub mod sku;
pub mod transaction;
pub mod user;
pub mod wallet;

/// Common type aliases.
pub type SkuId = String;
pub type UserId = String;
pub type MerchantId = String;
pub type TransactionId = String;
pub type GiftCardId = String;
pub type WalletId = String;

/// Amount in euro cents.
pub type Cents = u64;

/// Impact in grams of plastic removed.
pub type Grams = u64;

/// Cents per euro.
pub const CENTS_PER_EURO: u64 = 100;

/// Grams per kilogram. Prices are quoted per kilogram.
pub const GRAMS_PER_KG: f64 = 1000.0;

/// Error returned when a stored enum label does not match any variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} '{value}'")]
pub struct UnknownVariant {
    /// Which enum was being parsed.
    pub kind: &'static str,
    /// The offending label.
    pub value: String,
}

/// Convert a decimal euro amount (e.g. `2.5`) to cents, rounding half-up.
///
/// Returns `None` for negative, NaN or infinite inputs.
pub fn euros_to_cents(euros: f64) -> Option<Cents> {
    if !euros.is_finite() || euros < 0.0 {
        return None;
    }
    Some((euros * CENTS_PER_EURO as f64).round() as u64)
}

/// Render cents as a euro amount.
pub fn cents_to_euros(cents: Cents) -> f64 {
    cents as f64 / CENTS_PER_EURO as f64
}
