//! Payment gateway adapter interface.
//!
//! The engine only ever talks to a gateway through [`PaymentGateway`]. A
//! concrete adapter lives in its own crate; tests use an in-memory fake.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reclaim_types::Cents;
use serde::{Deserialize, Serialize};

/// Metadata key carrying the transaction's `checkout_ref`.
pub const TRANSACTION_REF_KEY: &str = "transaction_ref";

/// Errors raised by a gateway adapter.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// The gateway did not answer in time.
    #[error("gateway request timed out after {0:?}")]
    Timeout(Duration),

    /// Connection-level failure.
    #[error("gateway unreachable: {0}")]
    Transport(String),

    /// The gateway answered with an error status.
    #[error("gateway returned {status}: {message}")]
    Api {
        /// HTTP status.
        status: u16,
        /// Message from the gateway's error body.
        message: String,
    },

    /// Webhook signature missing, stale or wrong.
    #[error("invalid webhook signature: {0}")]
    InvalidSignature(String),

    /// Body could not be understood.
    #[error("malformed gateway payload: {0}")]
    MalformedPayload(String),
}

/// Request to open a payment for a pending transaction.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CheckoutRequest {
    pub amount: Cents,
    pub description: String,
    /// Connected account receiving the funds minus the fee.
    pub destination_account: Option<String>,
    /// Platform fee kept on a split payment.
    pub application_fee: Option<Cents>,
    pub customer_email: Option<String>,
    /// Echoed back on every event for this payment.
    pub metadata: BTreeMap<String, String>,
}

/// What the caller needs to complete payment client-side.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutHandle {
    /// Intent or checkout-session id.
    pub id: String,
    pub client_secret: Option<String>,
    pub url: Option<String>,
}

/// Classification of a verified gateway event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentEventKind {
    /// Money was captured.
    Succeeded,
    /// Payment failed, was canceled, or the session expired.
    Failed,
    /// Anything the engine does not act on.
    Ignored,
}

/// A verified, parsed gateway event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentEvent {
    pub event_id: String,
    /// Raw gateway event type, e.g. `payment_intent.succeeded`.
    pub event_type: String,
    pub kind: PaymentEventKind,
    pub payment_intent_id: Option<String>,
    /// Id of the object the event is about (intent or session).
    pub gateway_reference: Option<String>,
    /// `checkout_ref` echoed from metadata, when present.
    pub transaction_ref: Option<String>,
}

/// A payment provider.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Open a payment intent or checkout session.
    async fn create_intent_or_session(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutHandle, GatewayError>;

    /// Authenticate a raw webhook body against `signature` and parse it.
    ///
    /// Must return [`GatewayError::InvalidSignature`] on any mismatch.
    fn verify_and_parse_webhook(
        &self,
        raw_body: &[u8],
        signature: &str,
        secret: &str,
    ) -> Result<PaymentEvent, GatewayError>;
}
