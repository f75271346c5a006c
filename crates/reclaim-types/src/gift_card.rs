//! One-time-use gift card codes.

use serde::{Deserialize, Serialize};

use crate::{GiftCardId, SkuId, UserId};

/// A gift card code bound to one SKU.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GiftCardCode {
    pub id: GiftCardId,
    pub code: String,
    pub sku_id: SkuId,
    pub is_redeemed: bool,
    pub redeemed_at: Option<u64>,
    /// `None` on a redeemed code means it was invalidated by an admin.
    pub redeemed_by: Option<UserId>,
    pub created_at: u64,
}

impl GiftCardCode {
    /// True when the code was voided administratively rather than used.
    pub fn is_invalidated(&self) -> bool {
        self.is_redeemed && self.redeemed_by.is_none()
    }
}
