//! Platform fee on split payments.
//!
//! When a PAY purchase is routed to a merchant's connected account, the
//! platform keeps `PLATFORM_FEE_PERCENTAGE` of the amount as an application
//! fee and the merchant receives the rest.

use reclaim_types::Cents;
use serde::{Deserialize, Serialize};

use crate::{Result, SettlementError};

/// How a charge is divided between platform and merchant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeSplit {
    /// Kept by the platform.
    pub platform: Cents,
    /// Forwarded to the merchant.
    pub merchant: Cents,
}

/// Compute the platform fee for `amount` at `fee_fraction`.
///
/// The fee is rounded half-up to the cent. The remainder goes to the merchant.
///
/// # Errors
///
/// - [`SettlementError::InvalidAmount`] if the amount is zero
/// - [`SettlementError::Config`] if the fraction is outside `0.0..=1.0`
pub fn split(amount: Cents, fee_fraction: f64) -> Result<FeeSplit> {
    if amount == 0 {
        return Err(SettlementError::InvalidAmount("charge amount is zero".into()));
    }
    if !(0.0..=1.0).contains(&fee_fraction) {
        return Err(SettlementError::Config(format!(
            "platform fee must be within 0..=1, got {fee_fraction}"
        )));
    }

    let platform = ((amount as f64) * fee_fraction).round() as u64;
    let platform = platform.min(amount);
    let merchant = amount - platform;

    tracing::debug!(amount, platform, merchant, "platform fee computed");

    Ok(FeeSplit { platform, merchant })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_five_percent() {
        let s = split(1000, 0.05).expect("split");
        assert_eq!(s.platform, 50);
        assert_eq!(s.merchant, 950);
    }

    #[test]
    fn test_rounds_half_up() {
        // 5% of 1010 = 50.5 -> 51
        let s = split(1010, 0.05).expect("split");
        assert_eq!(s.platform, 51);
        assert_eq!(s.platform + s.merchant, 1010);
    }

    #[test]
    fn test_bounds() {
        assert_eq!(split(1000, 0.0).expect("zero fee").platform, 0);
        assert_eq!(split(1000, 1.0).expect("full fee").merchant, 0);
        assert!(matches!(split(0, 0.05), Err(SettlementError::InvalidAmount(_))));
        assert!(matches!(split(1000, 1.5), Err(SettlementError::Config(_))));
        assert!(matches!(split(1000, -0.1), Err(SettlementError::Config(_))));
        assert!(matches!(split(1000, f64::NAN), Err(SettlementError::Config(_))));
    }
}
