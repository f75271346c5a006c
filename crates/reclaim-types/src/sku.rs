//! Impact products and merchants.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{Cents, MerchantId, SkuId, UnknownVariant};

/// How a SKU is paid for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMode {
    /// Pre-funded by the merchant; the customer pays nothing.
    Claim,
    /// Customer pays through the gateway.
    Pay,
    /// Paid out-of-band at the point of sale, redeemed with a code.
    GiftCard,
    /// Merchant/partner funded; the amount travels with the request.
    Allocation,
}

impl PaymentMode {
    /// Database label.
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMode::Claim => "CLAIM",
            PaymentMode::Pay => "PAY",
            PaymentMode::GiftCard => "GIFT_CARD",
            PaymentMode::Allocation => "ALLOCATION",
        }
    }
}

impl fmt::Display for PaymentMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentMode {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CLAIM" => Ok(PaymentMode::Claim),
            "PAY" => Ok(PaymentMode::Pay),
            "GIFT_CARD" => Ok(PaymentMode::GiftCard),
            "ALLOCATION" => Ok(PaymentMode::Allocation),
            other => Err(UnknownVariant {
                kind: "payment mode",
                value: other.to_string(),
            }),
        }
    }
}

/// A purchasable impact product.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Sku {
    pub id: SkuId,
    pub code: String,
    pub name: String,
    pub payment_mode: PaymentMode,
    /// Unit price in cents. Ignored for ALLOCATION, where the request carries the amount.
    pub price: Cents,
    pub impact_multiplier: f64,
    /// Forces at least the standard registration tier.
    pub requires_validation: bool,
    /// Per-SKU override of the global corsair threshold, in cents.
    pub corsair_threshold: Option<Cents>,
    pub is_active: bool,
    pub created_at: u64,
}

/// Fields for registering a new SKU.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NewSku {
    pub code: String,
    pub name: String,
    pub payment_mode: PaymentMode,
    pub price: Cents,
    pub impact_multiplier: f64,
    #[serde(default)]
    pub requires_validation: bool,
    #[serde(default)]
    pub corsair_threshold: Option<Cents>,
}

/// A merchant that funds or sells impact products.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Merchant {
    pub id: MerchantId,
    pub name: String,
    /// Connected gateway account receiving split payments.
    pub stripe_account_id: Option<String>,
    pub created_at: u64,
}
