//! Impact calculation.
//!
//! One formula for every payment mode and for manual transactions:
//!
//! ```text
//! impact_grams = round((amount / price_per_kg) * impact_multiplier * 1000)
//! ```
//!
//! Rounding is half-up to the nearest gram.

use reclaim_types::{cents_to_euros, Cents, Grams, GRAMS_PER_KG};

use crate::{Result, SettlementError};

/// Compute the impact in grams of spending `amount` cents.
///
/// # Errors
///
/// - [`SettlementError::Config`] if `price_per_kg` or `impact_multiplier` is
///   not a finite number > 0
/// - [`SettlementError::InvalidAmount`] if the result does not fit in `u64`
pub fn impact_grams(amount: Cents, price_per_kg: f64, impact_multiplier: f64) -> Result<Grams> {
    if !price_per_kg.is_finite() || price_per_kg <= 0.0 {
        return Err(SettlementError::Config(format!(
            "price per kg must be > 0, got {price_per_kg}"
        )));
    }
    if !impact_multiplier.is_finite() || impact_multiplier <= 0.0 {
        return Err(SettlementError::Config(format!(
            "impact multiplier must be > 0, got {impact_multiplier}"
        )));
    }

    let kilograms = cents_to_euros(amount) / price_per_kg * impact_multiplier;
    // Inputs are non-negative, so rounding half away from zero is half-up.
    let grams = (kilograms * GRAMS_PER_KG).round();
    if !grams.is_finite() || grams >= u64::MAX as f64 {
        return Err(SettlementError::InvalidAmount(format!(
            "impact of {amount} cents overflows"
        )));
    }
    Ok(grams as u64)
}
