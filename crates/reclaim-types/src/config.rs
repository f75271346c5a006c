//! Global configuration keys and the per-operation snapshot.

use serde::{Deserialize, Serialize};

use crate::Cents;

/// Current price of one kilogram of plastic removal, in euros.
pub const CURRENT_CSR_PRICE: &str = "CURRENT_CSR_PRICE";

/// Cumulative spend (euros) at which a user's assets become certified.
pub const CORSAIR_THRESHOLD: &str = "CORSAIR_THRESHOLD";

/// Platform fee taken on split payments, as a fraction in `[0, 1]`.
pub const PLATFORM_FEE_PERCENTAGE: &str = "PLATFORM_FEE_PERCENTAGE";

/// Master attribution id stamped on every transaction.
pub const MASTER_ID: &str = "MASTER_ID";

/// Keys that must be present and valid for any settlement operation.
pub const REQUIRED_KEYS: &[&str] = &[
    CURRENT_CSR_PRICE,
    CORSAIR_THRESHOLD,
    PLATFORM_FEE_PERCENTAGE,
    MASTER_ID,
];

/// Immutable, validated view of the global configuration.
///
/// Taken once at the start of an operation and threaded through every
/// sub-step so a concurrent admin change cannot split a single transaction
/// across two prices.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConfigSnapshot {
    /// Euros per kilogram. Always > 0.
    pub csr_price_per_kg: f64,
    /// Global corsair threshold in cents. Always > 0.
    pub corsair_threshold: Cents,
    /// Fraction in `[0, 1]`.
    pub platform_fee_fraction: f64,
    /// Never empty.
    pub master_id: String,
}

/// One entry of the configuration audit trail.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConfigChange {
    pub key: String,
    pub old_value: Option<String>,
    pub new_value: String,
    pub changed_by: String,
    pub changed_at: u64,
}
