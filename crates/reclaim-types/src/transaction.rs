//! Settlement records.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{Cents, GiftCardId, Grams, MerchantId, SkuId, TransactionId, UnknownVariant, UserId};

/// Payment state of a transaction.
///
/// `Pending` moves once to `Completed` or `Failed`. `NotApplicable` is
/// assigned at creation for flows with no gateway step and never changes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaymentStatus {
    #[serde(rename = "pending")]
    Pending,
    #[serde(rename = "completed")]
    Completed,
    #[serde(rename = "failed")]
    Failed,
    #[serde(rename = "n/a")]
    NotApplicable,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
            PaymentStatus::NotApplicable => "n/a",
        }
    }

    /// Whether no further transition is allowed.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PaymentStatus::Pending)
    }

    /// Whether the transaction counts toward the ledger.
    pub fn is_settled_credit(&self) -> bool {
        matches!(self, PaymentStatus::Completed | PaymentStatus::NotApplicable)
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PaymentStatus::Pending),
            "completed" => Ok(PaymentStatus::Completed),
            "failed" => Ok(PaymentStatus::Failed),
            "n/a" => Ok(PaymentStatus::NotApplicable),
            other => Err(UnknownVariant {
                kind: "payment status",
                value: other.to_string(),
            }),
        }
    }
}

/// A persisted settlement record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub user_id: UserId,
    pub sku_id: SkuId,
    pub master_id: String,
    pub merchant_id: Option<MerchantId>,
    pub partner_id: Option<String>,
    pub order_id: Option<String>,
    pub amount: Cents,
    pub calculated_impact: Grams,
    pub payment_status: PaymentStatus,
    /// Correlation id embedded in gateway metadata at request time.
    pub checkout_ref: String,
    /// Intent or checkout-session id returned by the gateway at creation.
    pub gateway_reference: Option<String>,
    /// Set once, when the gateway confirms payment.
    pub stripe_payment_intent_id: Option<String>,
    pub application_fee: Option<Cents>,
    pub gift_card_code_id: Option<GiftCardId>,
    /// Whether the amount alone meets the corsair threshold.
    pub corsair_connect_flag: bool,
    /// Threshold in force when the transaction was created. Deferred
    /// confirmation credits against this value, not the current config.
    pub corsair_threshold: Cents,
    /// Admin who recorded the transaction manually.
    pub created_by: Option<String>,
    pub created_at: u64,
    pub settled_at: Option<u64>,
}

/// Fields for inserting a transaction.
#[derive(Clone, Debug)]
pub struct NewTransaction {
    pub user_id: UserId,
    pub sku_id: SkuId,
    pub master_id: String,
    pub merchant_id: Option<MerchantId>,
    pub partner_id: Option<String>,
    pub order_id: Option<String>,
    pub amount: Cents,
    pub calculated_impact: Grams,
    pub payment_status: PaymentStatus,
    pub checkout_ref: String,
    pub gateway_reference: Option<String>,
    pub application_fee: Option<Cents>,
    pub gift_card_code_id: Option<GiftCardId>,
    pub corsair_connect_flag: bool,
    pub corsair_threshold: Cents,
    pub created_by: Option<String>,
}
