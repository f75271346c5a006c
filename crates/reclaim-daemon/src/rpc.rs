//! JSON-RPC server over Unix socket.
//!
//! Listens on a Unix domain socket, accepts connections, and dispatches
//! newline-delimited JSON-RPC 2.0 calls to the command handlers.

use std::path::PathBuf;
use std::sync::Arc;

use reclaim_settlement::SettlementError;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixListener;
use tracing::{debug, error, info, warn};

use crate::commands;
use crate::DaemonState;

/// JSON-RPC request.
#[derive(Debug, Deserialize)]
pub struct RpcRequest {
    /// JSON-RPC version (must be "2.0").
    pub jsonrpc: String,
    /// Request ID.
    pub id: serde_json::Value,
    /// Method name.
    pub method: String,
    /// Parameters.
    #[serde(default)]
    pub params: serde_json::Value,
}

/// JSON-RPC response.
#[derive(Debug, Serialize)]
pub struct RpcResponse {
    /// JSON-RPC version.
    pub jsonrpc: String,
    /// Request ID.
    pub id: serde_json::Value,
    /// Result or error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

/// JSON-RPC error object.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RpcError {
    pub code: i32,
    /// Error name.
    pub message: String,
    /// Optional structured data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl RpcResponse {
    /// Create a success response.
    pub fn success(id: serde_json::Value, result: serde_json::Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Create an error response.
    pub fn error(id: serde_json::Value, error: RpcError) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }
}

impl RpcError {
    fn with_detail(code: i32, message: &str, detail: &str) -> Self {
        Self {
            code,
            message: message.to_string(),
            data: Some(serde_json::json!({"detail": detail})),
        }
    }

    /// Parse error (-32700).
    pub fn parse_error() -> Self {
        Self {
            code: -32700,
            message: "PARSE_ERROR".to_string(),
            data: None,
        }
    }

    /// Invalid request (-32600).
    pub fn invalid_request() -> Self {
        Self {
            code: -32600,
            message: "INVALID_REQUEST".to_string(),
            data: None,
        }
    }

    /// Method not found (-32601).
    pub fn method_not_found(method: &str) -> Self {
        Self {
            code: -32601,
            message: "METHOD_NOT_FOUND".to_string(),
            data: Some(serde_json::json!({"method": method})),
        }
    }

    /// Invalid params (-32602).
    pub fn invalid_params(detail: &str) -> Self {
        Self::with_detail(-32602, "INVALID_PARAMS", detail)
    }

    /// Internal error (-32603).
    pub fn internal_error(detail: &str) -> Self {
        Self::with_detail(-32603, "INTERNAL_ERROR", detail)
    }

    /// Unauthorized (-32001).
    pub fn unauthorized(detail: &str) -> Self {
        Self::with_detail(-32001, "UNAUTHORIZED", detail)
    }

    /// Not found (-32004).
    pub fn not_found(detail: &str) -> Self {
        Self::with_detail(-32004, "NOT_FOUND", detail)
    }

    /// SKU retired (-32005).
    pub fn inactive(detail: &str) -> Self {
        Self::with_detail(-32005, "INACTIVE", detail)
    }

    /// Conflict (-32009).
    pub fn conflict(detail: &str) -> Self {
        Self::with_detail(-32009, "CONFLICT", detail)
    }

    /// Insufficient balance (-32040).
    pub fn insufficient_balance(requested: u64, available: u64) -> Self {
        Self {
            code: -32040,
            message: "INSUFFICIENT_BALANCE".to_string(),
            data: Some(serde_json::json!({"requested": requested, "available": available})),
        }
    }

    /// Configuration error (-32050).
    pub fn config_error(detail: &str) -> Self {
        Self::with_detail(-32050, "CONFIG_ERROR", detail)
    }

    /// Payment gateway failure (-32070). Always retryable.
    pub fn external_service(detail: &str) -> Self {
        Self {
            code: -32070,
            message: "EXTERNAL_SERVICE_ERROR".to_string(),
            data: Some(serde_json::json!({"detail": detail, "retryable": true})),
        }
    }
}

impl From<SettlementError> for RpcError {
    fn from(err: SettlementError) -> Self {
        let detail = err.to_string();
        match err {
            SettlementError::Validation(_) | SettlementError::InvalidAmount(_) => Self::invalid_params(&detail),
            SettlementError::NotFound(_) => Self::not_found(&detail),
            SettlementError::Inactive(_) => Self::inactive(&detail),
            SettlementError::Conflict(_) => Self::conflict(&detail),
            SettlementError::InsufficientBalance { available, requested } => {
                Self::insufficient_balance(requested, available)
            }
            SettlementError::Config(_) | SettlementError::UnknownPaymentMode(_) => Self::config_error(&detail),
            SettlementError::ExternalService(_) => Self::external_service(&detail),
            SettlementError::Unauthorized(_) => Self::unauthorized(&detail),
            SettlementError::Storage(_) => {
                error!(error = %detail, "storage failure");
                Self::internal_error(&detail)
            }
        }
    }
}

/// The RPC server.
pub struct RpcServer {
    state: Arc<DaemonState>,
    socket_path: PathBuf,
}

impl RpcServer {
    /// Create a new RPC server.
    pub fn new(state: Arc<DaemonState>, socket_path: PathBuf) -> Self {
        Self { state, socket_path }
    }

    /// Run the server, accepting connections.
    pub async fn run(&self) -> anyhow::Result<()> {
        // Remove stale socket file
        let _ = std::fs::remove_file(&self.socket_path);

        let listener = UnixListener::bind(&self.socket_path)?;
        info!(socket = ?self.socket_path, "IPC server listening");

        loop {
            match listener.accept().await {
                Ok((stream, _addr)) => {
                    let state = self.state.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(state, stream).await {
                            warn!("Connection error: {}", e);
                        }
                    });
                }
                Err(e) => {
                    error!("Accept error: {}", e);
                }
            }
        }
    }
}

/// Handle a single client connection.
async fn handle_connection(state: Arc<DaemonState>, stream: tokio::net::UnixStream) -> anyhow::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    loop {
        line.clear();
        let bytes_read = reader.read_line(&mut line).await?;
        if bytes_read == 0 {
            break; // EOF
        }
        if line.trim().is_empty() {
            continue;
        }

        let response = handle_line(&state, &line).await;
        let mut response_json = serde_json::to_string(&response)?;
        response_json.push('\n');
        writer.write_all(response_json.as_bytes()).await?;
        writer.flush().await?;
    }

    Ok(())
}

/// Parse one request line and produce its response.
pub async fn handle_line(state: &Arc<DaemonState>, line: &str) -> RpcResponse {
    match serde_json::from_str::<RpcRequest>(line) {
        Ok(request) if request.jsonrpc != "2.0" => RpcResponse::error(request.id, RpcError::invalid_request()),
        Ok(request) => dispatch_request(state, request).await,
        Err(_) => RpcResponse::error(serde_json::Value::Null, RpcError::parse_error()),
    }
}

/// Dispatch a JSON-RPC request to the appropriate command handler.
async fn dispatch_request(state: &Arc<DaemonState>, request: RpcRequest) -> RpcResponse {
    let id = request.id.clone();
    let method = request.method.as_str();
    let params = &request.params;

    debug!(method, "dispatching RPC method");

    let result = match method {
        // Transactions
        "create_transaction" => commands::transactions::create_transaction(state, params).await,
        "create_manual_transaction" => commands::transactions::create_manual_transaction(state, params).await,
        "apply_gateway_webhook" => commands::transactions::apply_gateway_webhook(state, params).await,
        "get_transaction" => commands::transactions::get_transaction(state, params).await,
        "list_user_transactions" => commands::transactions::list_user_transactions(state, params).await,

        // Wallets
        "get_wallet" => commands::wallets::get_wallet(state, params).await,
        "redeem_impact" => commands::wallets::redeem_impact(state, params).await,
        "adjust_wallet" => commands::wallets::adjust_wallet(state, params).await,
        "list_wallet_adjustments" => commands::wallets::list_wallet_adjustments(state, params).await,

        // Gift cards
        "validate_gift_card" => commands::gift_cards::validate_gift_card(state, params).await,
        "invalidate_gift_card" => commands::gift_cards::invalidate_gift_card(state, params).await,
        "issue_gift_cards" => commands::gift_cards::issue_gift_cards(state, params).await,

        // Catalog
        "create_sku" => commands::catalog::create_sku(state, params).await,
        "get_sku" => commands::catalog::get_sku(state, params).await,
        "set_sku_active" => commands::catalog::set_sku_active(state, params).await,
        "create_merchant" => commands::catalog::create_merchant(state, params).await,

        // Configuration
        "get_config" => commands::config::get_config(state, params).await,
        "set_config" => commands::config::set_config(state, params).await,
        "get_config_history" => commands::config::get_config_history(state, params).await,
        "get_status" => commands::config::get_status(state).await,

        _ => Err(RpcError::method_not_found(method)),
    };

    match result {
        Ok(value) => RpcResponse::success(id, value),
        Err(err) => RpcResponse::error(id, err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::memory_state;

    #[test]
    fn test_rpc_error_codes() {
        let err = RpcError::method_not_found("unknown");
        assert_eq!(err.code, -32601);

        let err: RpcError = SettlementError::Validation("missing name".into()).into();
        assert_eq!(err.code, -32602);
        let err: RpcError = SettlementError::NotFound("sku 'X'".into()).into();
        assert_eq!(err.code, -32004);
        let err: RpcError = SettlementError::Conflict("used".into()).into();
        assert_eq!(err.code, -32009);
        let err: RpcError = SettlementError::Config("no price".into()).into();
        assert_eq!(err.code, -32050);
        let err: RpcError = SettlementError::Unauthorized("bad sig".into()).into();
        assert_eq!(err.code, -32001);

        let err: RpcError = SettlementError::ExternalService("timeout".into()).into();
        assert_eq!(err.code, -32070);
        assert_eq!(err.data.as_ref().map(|d| d["retryable"].clone()), Some(serde_json::json!(true)));

        let err: RpcError = SettlementError::InsufficientBalance {
            available: 30,
            requested: 50,
        }
        .into();
        assert_eq!(err.code, -32040);
    }

    #[test]
    fn test_rpc_response_shapes() {
        let resp = RpcResponse::success(serde_json::json!(1), serde_json::json!({"ok": true}));
        assert!(resp.result.is_some());
        assert!(resp.error.is_none());

        let resp = RpcResponse::error(serde_json::json!(1), RpcError::internal_error("test"));
        assert!(resp.result.is_none());
        assert!(resp.error.is_some());
    }

    #[tokio::test]
    async fn test_handle_line_errors() {
        let state = memory_state();
        let resp = handle_line(&state, "not json").await;
        assert_eq!(resp.error.map(|e| e.code), Some(-32700));

        let resp = handle_line(&state, r#"{"jsonrpc":"1.0","id":1,"method":"get_config"}"#).await;
        assert_eq!(resp.error.map(|e| e.code), Some(-32600));

        let resp = handle_line(&state, r#"{"jsonrpc":"2.0","id":2,"method":"nope"}"#).await;
        assert_eq!(resp.error.map(|e| e.code), Some(-32601));
    }

    #[tokio::test]
    async fn test_claim_over_rpc() {
        let state = memory_state();
        let create_sku = r#"{"jsonrpc":"2.0","id":1,"method":"create_sku","params":
            {"code":"CLAIM-0","name":"Free claim","payment_mode":"CLAIM","price":0,"impact_multiplier":1.0}}"#;
        let resp = handle_line(&state, &create_sku.replace('\n', " ")).await;
        assert!(resp.error.is_none(), "{:?}", resp.error);

        let purchase = r#"{"jsonrpc":"2.0","id":2,"method":"create_transaction","params":{"sku_code":"CLAIM-0","email":"a@x.com"}}"#;
        let resp = handle_line(&state, purchase).await;
        let result = resp.result.expect("settled");
        assert_eq!(result["status"], "settled");
        assert_eq!(result["transaction"]["payment_status"], "n/a");

        let missing = r#"{"jsonrpc":"2.0","id":3,"method":"create_transaction","params":{"sku_code":"NOPE","email":"a@x.com"}}"#;
        let resp = handle_line(&state, missing).await;
        assert_eq!(resp.error.map(|e| e.code), Some(-32004));
    }
}
