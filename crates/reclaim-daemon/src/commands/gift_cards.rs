//! Gift card command handlers.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;

use super::{parse, to_json, Result};
use crate::DaemonState;

#[derive(Deserialize)]
struct ValidateParams {
    code: String,
    /// Product the code is about to be used for.
    #[serde(default)]
    sku_code: Option<String>,
}

#[derive(Deserialize)]
struct CodeParams {
    code: String,
}

#[derive(Deserialize)]
struct IssueParams {
    sku_code: String,
    count: u32,
}

/// Check a code without consuming it.
pub async fn validate_gift_card(state: &Arc<DaemonState>, params: &Value) -> Result {
    let p: ValidateParams = parse(params)?;
    let card = state
        .engine
        .validate_gift_card(&p.code, p.sku_code.as_deref())
        .await?;
    to_json(&card)
}

pub async fn invalidate_gift_card(state: &Arc<DaemonState>, params: &Value) -> Result {
    let p: CodeParams = parse(params)?;
    let card = state.engine.invalidate_gift_card(&p.code).await?;
    to_json(&card)
}

/// Generate a batch of codes for a GIFT_CARD SKU.
pub async fn issue_gift_cards(state: &Arc<DaemonState>, params: &Value) -> Result {
    let p: IssueParams = parse(params)?;
    let cards = state.engine.issue_gift_cards(&p.sku_code, p.count).await?;
    to_json(&cards)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{memory_state, seed_sku};
    use reclaim_types::sku::PaymentMode;

    #[tokio::test]
    async fn test_issue_validate_invalidate() {
        let state = memory_state();
        seed_sku(&state, "GIFT-25", PaymentMode::GiftCard, 2500).await;
        seed_sku(&state, "PAY-10", PaymentMode::Pay, 1000).await;

        let cards = issue_gift_cards(&state, &serde_json::json!({ "sku_code": "GIFT-25", "count": 3 }))
            .await
            .expect("issue");
        let cards = cards.as_array().cloned().unwrap_or_default();
        assert_eq!(cards.len(), 3);
        let code = cards[0]["code"].clone();

        validate_gift_card(&state, &serde_json::json!({ "code": code, "sku_code": "GIFT-25" }))
            .await
            .expect("valid");
        let err = validate_gift_card(&state, &serde_json::json!({ "code": code, "sku_code": "PAY-10" }))
            .await
            .expect_err("wrong product");
        assert_eq!(err.code, -32602);

        let voided = invalidate_gift_card(&state, &serde_json::json!({ "code": code }))
            .await
            .expect("invalidate");
        assert_eq!(voided["is_redeemed"], true);
        assert_eq!(voided["redeemed_by"], Value::Null);

        let err = validate_gift_card(&state, &serde_json::json!({ "code": code }))
            .await
            .expect_err("voided");
        assert_eq!(err.code, -32009);
    }

    #[tokio::test]
    async fn test_issue_for_non_gift_sku_rejected() {
        let state = memory_state();
        seed_sku(&state, "PAY-10", PaymentMode::Pay, 1000).await;
        let err = issue_gift_cards(&state, &serde_json::json!({ "sku_code": "PAY-10", "count": 1 }))
            .await
            .expect_err("not a gift sku");
        assert_eq!(err.code, -32602);
    }
}
