//! Stand-in gateway used when no gateway secret key is configured.
//!
//! Webhooks only need the webhook secret, so they are still verified and
//! applied. Opening a checkout fails, which keeps PAY purchases out of the
//! database entirely.

use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use reclaim_settlement::gateway::{CheckoutHandle, CheckoutRequest, GatewayError, PaymentEvent, PaymentGateway};

pub struct UnconfiguredGateway {
    signature_tolerance_secs: u64,
}

impl UnconfiguredGateway {
    pub fn new(signature_tolerance_secs: u64) -> Self {
        Self {
            signature_tolerance_secs,
        }
    }
}

#[async_trait]
impl PaymentGateway for UnconfiguredGateway {
    async fn create_intent_or_session(&self, request: &CheckoutRequest) -> Result<CheckoutHandle, GatewayError> {
        tracing::warn!(amount = request.amount, "checkout requested but no gateway is configured");
        Err(GatewayError::Transport("payment gateway not configured".into()))
    }

    fn verify_and_parse_webhook(&self, raw_body: &[u8], signature: &str, secret: &str) -> Result<PaymentEvent, GatewayError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        reclaim_stripe::signature::verify(raw_body, signature, secret, self.signature_tolerance_secs, now)?;
        reclaim_stripe::event::parse(raw_body)
    }
}
