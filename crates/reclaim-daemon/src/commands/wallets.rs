//! Wallet command handlers.

use std::sync::Arc;

use reclaim_types::wallet::OwnerType;
use serde::Deserialize;
use serde_json::Value;

use super::{parse, to_json, Result};
use crate::DaemonState;

fn default_owner_type() -> OwnerType {
    OwnerType::User
}

#[derive(Deserialize)]
struct WalletParams {
    owner_id: String,
    #[serde(default = "default_owner_type")]
    owner_type: OwnerType,
}

#[derive(Deserialize)]
struct RedeemParams {
    owner_id: String,
    #[serde(default = "default_owner_type")]
    owner_type: OwnerType,
    grams: u64,
}

#[derive(Deserialize)]
struct AdjustParams {
    user_id: String,
    delta_grams: i64,
    reason: String,
    adjusted_by: String,
}

#[derive(Deserialize)]
struct AdjustmentsParams {
    user_id: String,
}

pub async fn get_wallet(state: &Arc<DaemonState>, params: &Value) -> Result {
    let p: WalletParams = parse(params)?;
    let wallet = state.engine.get_wallet(&p.owner_id, p.owner_type).await?;
    to_json(&wallet)
}

/// Spend impact from a wallet.
pub async fn redeem_impact(state: &Arc<DaemonState>, params: &Value) -> Result {
    let p: RedeemParams = parse(params)?;
    let wallet = state
        .engine
        .redeem_impact(&p.owner_id, p.owner_type, p.grams)
        .await?;
    to_json(&wallet)
}

/// Administrative balance correction.
pub async fn adjust_wallet(state: &Arc<DaemonState>, params: &Value) -> Result {
    let p: AdjustParams = parse(params)?;
    let (wallet, adjustment) = state
        .engine
        .adjust_wallet(&p.user_id, p.delta_grams, &p.reason, &p.adjusted_by)
        .await?;
    Ok(serde_json::json!({
        "wallet": to_json(&wallet)?,
        "adjustment": to_json(&adjustment)?,
    }))
}

pub async fn list_wallet_adjustments(state: &Arc<DaemonState>, params: &Value) -> Result {
    let p: AdjustmentsParams = parse(params)?;
    let adjustments = state.engine.list_adjustments(&p.user_id).await?;
    to_json(&adjustments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::transactions::create_transaction;
    use crate::test_support::{memory_state, seed_sku};
    use reclaim_types::sku::PaymentMode;

    async fn claim(state: &Arc<DaemonState>) -> String {
        seed_sku(state, "ALLOC", PaymentMode::Allocation, 0).await;
        let result = create_transaction(
            state,
            &serde_json::json!({
                "sku_code": "ALLOC",
                "email": "a@x.com",
                "amount": 250,
                "profile": { "first_name": "Ada", "last_name": "Lovelace", "terms_accepted": true },
            }),
        )
        .await
        .expect("allocation");
        result["user"]["id"].as_str().expect("user id").to_string()
    }

    #[tokio::test]
    async fn test_redeem_and_overdraw() {
        let state = memory_state();
        let user_id = claim(&state).await;

        let wallet = redeem_impact(&state, &serde_json::json!({ "owner_id": user_id, "grams": 2_727 }))
            .await
            .expect("redeem");
        assert_eq!(wallet["current_balance"], 20_000);
        assert_eq!(wallet["total_redeemed"], 2_727);

        let err = redeem_impact(&state, &serde_json::json!({ "owner_id": user_id, "grams": 20_001 }))
            .await
            .expect_err("overdraw");
        assert_eq!(err.code, -32040);
        assert_eq!(
            err.data.map(|d| d["available"].clone()),
            Some(serde_json::json!(20_000))
        );
    }

    #[tokio::test]
    async fn test_adjust_and_audit_trail() {
        let state = memory_state();
        let user_id = claim(&state).await;

        let result = adjust_wallet(
            &state,
            &serde_json::json!({
                "user_id": user_id,
                "delta_grams": -727,
                "reason": "duplicate import",
                "adjusted_by": "ops",
            }),
        )
        .await
        .expect("adjust");
        assert_eq!(result["wallet"]["current_balance"], 22_000);
        assert_eq!(result["adjustment"]["balance_before"], 22_727);

        let trail = list_wallet_adjustments(&state, &serde_json::json!({ "user_id": user_id }))
            .await
            .expect("trail");
        assert_eq!(trail.as_array().map(Vec::len), Some(1));

        let err = adjust_wallet(
            &state,
            &serde_json::json!({
                "user_id": user_id,
                "delta_grams": 5,
                "reason": "x",
                "adjusted_by": " ",
            }),
        )
        .await
        .expect_err("anonymous");
        assert_eq!(err.code, -32602);
    }
}
