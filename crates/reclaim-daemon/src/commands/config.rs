//! Configuration and status command handlers.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;

use super::{parse, to_json, Result};
use crate::DaemonState;

fn default_history_limit() -> u32 {
    100
}

#[derive(Deserialize)]
struct GetParams {
    #[serde(default)]
    key: Option<String>,
}

#[derive(Deserialize)]
struct SetParams {
    key: String,
    value: String,
    changed_by: String,
}

#[derive(Deserialize)]
struct HistoryParams {
    #[serde(default)]
    key: Option<String>,
    #[serde(default = "default_history_limit")]
    limit: u32,
}

/// One key, or every key as an object.
pub async fn get_config(state: &Arc<DaemonState>, params: &Value) -> Result {
    let p: GetParams = parse(params)?;
    let rows = state.engine.get_config(p.key.as_deref()).await?;
    let map: serde_json::Map<String, Value> = rows.into_iter().map(|(k, v)| (k, Value::String(v))).collect();
    Ok(Value::Object(map))
}

/// Change a value. The previous value is kept in the history.
pub async fn set_config(state: &Arc<DaemonState>, params: &Value) -> Result {
    let p: SetParams = parse(params)?;
    state
        .engine
        .set_config(&p.key, &p.value, &p.changed_by)
        .await?;
    Ok(serde_json::json!({ "key": p.key, "value": p.value }))
}

pub async fn get_config_history(state: &Arc<DaemonState>, params: &Value) -> Result {
    let p: HistoryParams = parse(params)?;
    let history = state
        .engine
        .config_history(p.key.as_deref(), p.limit)
        .await?;
    to_json(&history)
}

/// Daemon version and whether settlement can run.
pub async fn get_status(state: &Arc<DaemonState>) -> Result {
    let ready = state.engine.config_snapshot().await;
    Ok(serde_json::json!({
        "version": env!("CARGO_PKG_VERSION"),
        "gateway_configured": !state.config.gateway.secret_key.is_empty(),
        "checkout_mode": state.config.gateway.checkout_mode,
        "settlement_ready": ready.is_ok(),
        "config_error": ready.err().map(|e| e.to_string()),
        "events_emitted": state.event_bus.sequence(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::memory_state;

    #[tokio::test]
    async fn test_set_and_history() {
        let state = memory_state();
        set_config(
            &state,
            &serde_json::json!({ "key": "CURRENT_CSR_PRICE", "value": "0.12", "changed_by": "ops" }),
        )
        .await
        .expect("set");

        let value = get_config(&state, &serde_json::json!({ "key": "CURRENT_CSR_PRICE" }))
            .await
            .expect("get");
        assert_eq!(value["CURRENT_CSR_PRICE"], "0.12");

        let history = get_config_history(&state, &serde_json::json!({ "key": "CURRENT_CSR_PRICE" }))
            .await
            .expect("history");
        assert_eq!(history[0]["old_value"], "0.11");
        assert_eq!(history[0]["new_value"], "0.12");
        assert_eq!(history[0]["changed_by"], "ops");
    }

    #[tokio::test]
    async fn test_invalid_value_rejected() {
        let state = memory_state();
        let err = set_config(
            &state,
            &serde_json::json!({ "key": "PLATFORM_FEE_PERCENTAGE", "value": "1.5", "changed_by": "ops" }),
        )
        .await
        .expect_err("out of range");
        assert_eq!(err.code, -32602);

        let all = get_config(&state, &Value::Null).await.expect("all");
        assert_eq!(all["PLATFORM_FEE_PERCENTAGE"], "0.05");
    }

    #[tokio::test]
    async fn test_status() {
        let state = memory_state();
        let status = get_status(&state).await.expect("status");
        assert_eq!(status["settlement_ready"], true);
        assert_eq!(status["gateway_configured"], false);
    }
}
