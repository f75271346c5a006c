//! IPC command handlers.
//!
//! Each submodule implements the commands for one IPC category. Handlers
//! deserialize their params, call the engine and serialize the result.

pub mod catalog;
pub mod config;
pub mod gift_cards;
pub mod transactions;
pub mod wallets;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::rpc::RpcError;

type Result = std::result::Result<Value, RpcError>;

/// Deserialize the params object into a typed request.
fn parse<T: DeserializeOwned>(params: &Value) -> std::result::Result<T, RpcError> {
    let params = if params.is_null() {
        Value::Object(serde_json::Map::new())
    } else {
        params.clone()
    };
    serde_json::from_value(params).map_err(|e| RpcError::invalid_params(&e.to_string()))
}

fn to_json<T: Serialize>(value: &T) -> Result {
    serde_json::to_value(value).map_err(|e| RpcError::internal_error(&format!("serialize: {e}")))
}
