//! Transaction command handlers.

use std::sync::Arc;

use reclaim_settlement::{ManualTransactionRequest, PurchaseRequest};
use serde::Deserialize;
use serde_json::Value;

use super::{parse, to_json, Result};
use crate::DaemonState;

#[derive(Deserialize)]
struct WebhookParams {
    /// Raw request body exactly as received; the signature covers these bytes.
    payload: String,
    signature: String,
}

#[derive(Deserialize)]
struct TransactionParams {
    id: String,
}

#[derive(Deserialize)]
struct ListParams {
    user_id: String,
    #[serde(default)]
    limit: Option<u32>,
}

/// Purchase a SKU.
pub async fn create_transaction(state: &Arc<DaemonState>, params: &Value) -> Result {
    let request: PurchaseRequest = parse(params)?;
    let outcome = state.engine.create_transaction(request).await?;
    to_json(&outcome)
}

/// Record an off-platform purchase.
pub async fn create_manual_transaction(state: &Arc<DaemonState>, params: &Value) -> Result {
    let request: ManualTransactionRequest = parse(params)?;
    let settlement = state.engine.create_manual_transaction(request).await?;
    to_json(&settlement)
}

/// Verify and apply a gateway webhook relayed by the HTTP front end.
pub async fn apply_gateway_webhook(state: &Arc<DaemonState>, params: &Value) -> Result {
    let p: WebhookParams = parse(params)?;
    let outcome = state
        .engine
        .handle_webhook(p.payload.as_bytes(), &p.signature)
        .await?;
    to_json(&outcome)
}

pub async fn get_transaction(state: &Arc<DaemonState>, params: &Value) -> Result {
    let p: TransactionParams = parse(params)?;
    let transaction = state.engine.get_transaction(&p.id).await?;
    to_json(&transaction)
}

/// A user's transactions, newest first.
pub async fn list_user_transactions(state: &Arc<DaemonState>, params: &Value) -> Result {
    let p: ListParams = parse(params)?;
    let transactions = state.engine.list_user_transactions(&p.user_id, p.limit).await?;
    to_json(&transactions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{memory_state, seed_sku};
    use reclaim_types::sku::PaymentMode;

    #[tokio::test]
    async fn test_allocation_then_listing() {
        let state = memory_state();
        seed_sku(&state, "ALLOC", PaymentMode::Allocation, 0).await;

        let result = create_transaction(
            &state,
            &serde_json::json!({
                "sku_code": "ALLOC",
                "email": "a@x.com",
                "amount": 250,
                "profile": { "first_name": "Ada", "last_name": "Lovelace", "terms_accepted": true },
            }),
        )
        .await
        .expect("allocation");
        assert_eq!(result["status"], "settled");
        assert_eq!(result["transaction"]["calculated_impact"], 22_727);
        assert_eq!(result["user"]["registration_level"], "standard");

        let user_id = result["user"]["id"].as_str().expect("user id").to_string();
        let listed = list_user_transactions(&state, &serde_json::json!({ "user_id": user_id }))
            .await
            .expect("list");
        assert_eq!(listed.as_array().map(Vec::len), Some(1));

        let id = result["transaction"]["id"].clone();
        let fetched = get_transaction(&state, &serde_json::json!({ "id": id }))
            .await
            .expect("get");
        assert_eq!(fetched["amount"], 250);
    }

    #[tokio::test]
    async fn test_bad_params() {
        let state = memory_state();
        let err = create_transaction(&state, &serde_json::json!({ "email": "a@x.com" }))
            .await
            .expect_err("no sku");
        assert_eq!(err.code, -32602);

        let err = get_transaction(&state, &serde_json::json!({ "id": "missing" }))
            .await
            .expect_err("missing");
        assert_eq!(err.code, -32004);
    }

    #[tokio::test]
    async fn test_unsigned_webhook_rejected() {
        let state = memory_state();
        let err = apply_gateway_webhook(
            &state,
            &serde_json::json!({ "payload": "{}", "signature": "t=1,v1=00" }),
        )
        .await
        .expect_err("unsigned");
        assert_eq!(err.code, -32001);
    }
}
