//! # reclaim-settlement
//!
//! Transaction & settlement engine.
//!
//! Turns a purchase of an impact product into a priced, impact-quantified
//! transaction, keeps the wallet ledger consistent with it, and applies
//! asynchronous payment confirmations idempotently.
//!
//! ## Modules
//!
//! - [`impact`]: The single impact formula
//! - [`modes`]: SKU resolution and payment-mode dispatch
//! - [`tiers`]: Registration tier requirements and user resolution
//! - [`fees`]: Platform fee on split payments
//! - [`ledger`]: Wallet credit plus threshold-crossing detection
//! - [`webhook`]: Idempotent payment-event state machine
//! - [`gateway`]: Payment gateway adapter interface
//! - [`dispatcher`]: Side-effect dispatcher interface
//! - [`events`]: Broadcast event bus implementing the dispatcher
//! - [`engine`]: The orchestrating engine

pub mod dispatcher;
pub mod engine;
pub mod events;
pub mod fees;
pub mod gateway;
pub mod impact;
pub mod ledger;
pub mod modes;
pub mod tiers;
pub mod webhook;

pub use engine::{ManualTransactionRequest, PurchaseOutcome, PurchaseRequest, SettlementEngine};

use reclaim_db::DbError;

use crate::gateway::GatewayError;

/// Error types for settlement operations.
#[derive(Debug, thiserror::Error)]
pub enum SettlementError {
    /// Missing or invalid input. Never retried.
    #[error("validation failed: {0}")]
    Validation(String),

    /// SKU, user, transaction, wallet or gift card does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The SKU exists but is retired.
    #[error("sku '{0}' is inactive")]
    Inactive(String),

    /// One-time transition already taken (e.g. gift card redeemed).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Redemption larger than the wallet balance.
    #[error("insufficient balance: have {available} g, requested {requested} g")]
    InsufficientBalance {
        /// Current balance in grams.
        available: u64,
        /// Requested grams.
        requested: u64,
    },

    /// Non-positive or overflowing amount.
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// Global configuration or SKU pricing is missing or out of range. Fatal.
    #[error("configuration error: {0}")]
    Config(String),

    /// A SKU carries a payment mode this engine does not know.
    #[error("unknown payment mode '{0}'")]
    UnknownPaymentMode(String),

    /// The payment gateway failed or timed out. Retryable by the caller.
    #[error("payment gateway error: {0}")]
    ExternalService(String),

    /// Webhook signature did not verify.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Underlying storage failure.
    #[error("storage error: {0}")]
    Storage(String),
}

impl SettlementError {
    /// Whether the caller may retry the same request unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SettlementError::ExternalService(_))
    }

    /// Stable machine-readable kind.
    pub fn kind(&self) -> &'static str {
        match self {
            SettlementError::Validation(_) => "validation",
            SettlementError::NotFound(_) => "not_found",
            SettlementError::Inactive(_) => "inactive",
            SettlementError::Conflict(_) => "conflict",
            SettlementError::InsufficientBalance { .. } => "insufficient_balance",
            SettlementError::InvalidAmount(_) => "invalid_amount",
            SettlementError::Config(_) => "config",
            SettlementError::UnknownPaymentMode(_) => "unknown_payment_mode",
            SettlementError::ExternalService(_) => "external_service",
            SettlementError::Unauthorized(_) => "unauthorized",
            SettlementError::Storage(_) => "storage",
        }
    }
}

impl From<DbError> for SettlementError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound(what) => SettlementError::NotFound(what),
            DbError::Conflict(what) => SettlementError::Conflict(what),
            DbError::Validation(what) => SettlementError::Validation(what),
            DbError::InvalidAmount(what) => SettlementError::InvalidAmount(what),
            DbError::InsufficientBalance {
                available,
                requested,
            } => SettlementError::InsufficientBalance {
                available,
                requested,
            },
            DbError::InvalidConfig(what) => SettlementError::Config(what),
            DbError::UnknownPaymentMode(mode) => SettlementError::UnknownPaymentMode(mode),
            other @ (DbError::Sqlite(_) | DbError::Migration(_) | DbError::Serialization(_)) => {
                SettlementError::Storage(other.to_string())
            }
        }
    }
}

impl From<rusqlite::Error> for SettlementError {
    fn from(err: rusqlite::Error) -> Self {
        DbError::from(err).into()
    }
}

impl From<GatewayError> for SettlementError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::InvalidSignature(_) => SettlementError::Unauthorized(err.to_string()),
            GatewayError::MalformedPayload(_) => SettlementError::Validation(err.to_string()),
            GatewayError::Timeout(_) | GatewayError::Transport(_) | GatewayError::Api { .. } => {
                SettlementError::ExternalService(err.to_string())
            }
        }
    }
}

/// Convenience result type for settlement operations.
pub type Result<T> = std::result::Result<T, SettlementError>;
