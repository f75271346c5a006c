//! Impact wallets and their audit records.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{Cents, Grams, UnknownVariant, WalletId};

/// Kind of entity that owns a wallet.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OwnerType {
    User,
    Merchant,
}

impl OwnerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OwnerType::User => "user",
            OwnerType::Merchant => "merchant",
        }
    }
}

impl fmt::Display for OwnerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OwnerType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(OwnerType::User),
            "merchant" => Ok(OwnerType::Merchant),
            other => Err(UnknownVariant {
                kind: "owner type",
                value: other.to_string(),
            }),
        }
    }
}

/// Running impact balance of one user or one merchant.
///
/// Invariant: `current_balance == total_accumulated - total_redeemed`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wallet {
    pub id: WalletId,
    pub owner_id: String,
    pub owner_type: OwnerType,
    pub total_accumulated: Grams,
    pub total_redeemed: Grams,
    pub current_balance: Grams,
    pub total_amount_spent: Cents,
    pub certified_asset_status: bool,
    pub updated_at: u64,
}

impl Wallet {
    /// Check the balance equation.
    pub fn is_balanced(&self) -> bool {
        self.total_accumulated
            .checked_sub(self.total_redeemed)
            .is_some_and(|b| b == self.current_balance)
    }
}

/// Totals reported when a user crosses the corsair threshold.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletTotals {
    pub total_accumulated: Grams,
    pub current_balance: Grams,
    pub total_amount_spent: Cents,
}

impl From<&Wallet> for WalletTotals {
    fn from(w: &Wallet) -> Self {
        Self {
            total_accumulated: w.total_accumulated,
            current_balance: w.current_balance,
            total_amount_spent: w.total_amount_spent,
        }
    }
}

/// Immutable audit record of an administrative balance adjustment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletAdjustment {
    pub id: String,
    pub wallet_id: WalletId,
    pub delta_grams: i64,
    pub reason: String,
    pub adjusted_by: String,
    pub balance_before: Grams,
    pub balance_after: Grams,
    pub created_at: u64,
}
