//! # reclaim-stripe
//!
//! Stripe-compatible [`PaymentGateway`] over HTTPS.
//!
//! Opens either a payment intent (client confirms with the returned secret)
//! or a hosted checkout session (client is redirected to the returned URL).
//! Split payments route funds to a merchant's connected account and keep the
//! platform fee as an application fee.
//!
//! ## Modules
//!
//! - [`signature`]: `Stripe-Signature` HMAC verification
//! - [`event`]: Webhook body parsing

pub mod event;
pub mod signature;

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use reclaim_settlement::gateway::{
    CheckoutHandle, CheckoutRequest, GatewayError, PaymentEvent, PaymentGateway, TRANSACTION_REF_KEY,
};
use reqwest::Client;
use serde::{Deserialize, Serialize};

/// Production API base.
pub const DEFAULT_API_BASE: &str = "https://api.stripe.com";

/// What the adapter opens for a PAY transaction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckoutMode {
    /// `POST /v1/payment_intents`, returns a client secret.
    #[default]
    Intent,
    /// `POST /v1/checkout/sessions`, returns a hosted page URL.
    Session,
}

/// Adapter settings.
#[derive(Clone, Debug)]
pub struct StripeConfig {
    pub api_base: String,
    pub secret_key: String,
    /// ISO currency, lower case.
    pub currency: String,
    pub timeout: Duration,
    pub mode: CheckoutMode,
    /// Required in session mode.
    pub success_url: Option<String>,
    /// Required in session mode.
    pub cancel_url: Option<String>,
    /// Maximum webhook age in seconds.
    pub signature_tolerance_secs: u64,
}

impl Default for StripeConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            secret_key: String::new(),
            currency: "eur".to_string(),
            timeout: Duration::from_secs(10),
            mode: CheckoutMode::Intent,
            success_url: None,
            cancel_url: None,
            signature_tolerance_secs: signature::DEFAULT_TOLERANCE_SECS,
        }
    }
}

/// Stripe gateway client.
pub struct StripeGateway {
    client: Client,
    config: StripeConfig,
}

#[derive(Debug, Deserialize)]
struct CreatedObject {
    id: String,
    #[serde(default)]
    client_secret: Option<String>,
    #[serde(default)]
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    message: Option<String>,
}

impl StripeGateway {
    /// Build a client.
    ///
    /// # Errors
    ///
    /// - [`GatewayError::Transport`] if the HTTP client cannot be built or the
    ///   configuration is incomplete
    pub fn new(config: StripeConfig) -> Result<Self, GatewayError> {
        if config.secret_key.is_empty() {
            return Err(GatewayError::Transport("gateway secret key not configured".into()));
        }
        if config.mode == CheckoutMode::Session && (config.success_url.is_none() || config.cancel_url.is_none()) {
            return Err(GatewayError::Transport(
                "session mode requires success and cancel URLs".into(),
            ));
        }
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| GatewayError::Transport(e.to_string()))?;
        Ok(Self { client, config })
    }

    fn endpoint(&self) -> String {
        let path = match self.config.mode {
            CheckoutMode::Intent => "/v1/payment_intents",
            CheckoutMode::Session => "/v1/checkout/sessions",
        };
        format!("{}{path}", self.config.api_base.trim_end_matches('/'))
    }

    fn map_send_error(&self, err: reqwest::Error) -> GatewayError {
        if err.is_timeout() {
            GatewayError::Timeout(self.config.timeout)
        } else {
            GatewayError::Transport(err.to_string())
        }
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    async fn create_intent_or_session(&self, request: &CheckoutRequest) -> Result<CheckoutHandle, GatewayError> {
        let form = match self.config.mode {
            CheckoutMode::Intent => intent_form(request, &self.config.currency),
            CheckoutMode::Session => session_form(request, &self.config),
        };
        let mut builder = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.config.secret_key)
            .form(&form);
        // Replaying the same checkout never opens a second payment.
        if let Some(reference) = request.metadata.get(TRANSACTION_REF_KEY) {
            builder = builder.header("Idempotency-Key", reference);
        }

        let response = builder.send().await.map_err(|e| self.map_send_error(e))?;
        let status = response.status();
        let body = response.text().await.map_err(|e| self.map_send_error(e))?;

        if !status.is_success() {
            let message = serde_json::from_str::<ErrorBody>(&body)
                .ok()
                .and_then(|b| b.error.message)
                .unwrap_or_else(|| body.chars().take(200).collect());
            tracing::warn!(status = %status, message = %message, "gateway rejected checkout");
            return Err(GatewayError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let created: CreatedObject =
            serde_json::from_str(&body).map_err(|e| GatewayError::MalformedPayload(e.to_string()))?;
        tracing::debug!(id = %created.id, mode = ?self.config.mode, amount = request.amount, "checkout opened");
        Ok(CheckoutHandle {
            id: created.id,
            client_secret: created.client_secret,
            url: created.url,
        })
    }

    fn verify_and_parse_webhook(&self, raw_body: &[u8], signature: &str, secret: &str) -> Result<PaymentEvent, GatewayError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        signature::verify(raw_body, signature, secret, self.config.signature_tolerance_secs, now)?;
        event::parse(raw_body)
    }
}

/// Form fields for `POST /v1/payment_intents`.
pub fn intent_form(request: &CheckoutRequest, currency: &str) -> Vec<(String, String)> {
    let mut form = vec![
        ("amount".to_string(), request.amount.to_string()),
        ("currency".to_string(), currency.to_string()),
        ("description".to_string(), request.description.clone()),
        ("automatic_payment_methods[enabled]".to_string(), "true".to_string()),
    ];
    if let Some(email) = &request.customer_email {
        form.push(("receipt_email".to_string(), email.clone()));
    }
    push_split(&mut form, request, "");
    push_metadata(&mut form, request, "metadata");
    form
}

/// Form fields for `POST /v1/checkout/sessions`.
pub fn session_form(request: &CheckoutRequest, config: &StripeConfig) -> Vec<(String, String)> {
    let item = "line_items[0]";
    let mut form = vec![
        ("mode".to_string(), "payment".to_string()),
        (format!("{item}[quantity]"), "1".to_string()),
        (format!("{item}[price_data][currency]"), config.currency.clone()),
        (format!("{item}[price_data][unit_amount]"), request.amount.to_string()),
        (format!("{item}[price_data][product_data][name]"), request.description.clone()),
    ];
    if let Some(url) = &config.success_url {
        form.push(("success_url".to_string(), url.clone()));
    }
    if let Some(url) = &config.cancel_url {
        form.push(("cancel_url".to_string(), url.clone()));
    }
    if let Some(email) = &request.customer_email {
        form.push(("customer_email".to_string(), email.clone()));
    }
    push_split(&mut form, request, "payment_intent_data");
    push_metadata(&mut form, request, "metadata");
    // Intent events must also carry the transaction ref.
    push_metadata(&mut form, request, "payment_intent_data[metadata]");
    form
}

fn push_split(form: &mut Vec<(String, String)>, request: &CheckoutRequest, prefix: &str) {
    let key = |name: &str| {
        if prefix.is_empty() {
            name.to_string()
        } else {
            format!("{prefix}[{name}]")
        }
    };
    if let Some(destination) = &request.destination_account {
        form.push((format!("{}[destination]", key("transfer_data")), destination.clone()));
        if let Some(fee) = request.application_fee {
            form.push((key("application_fee_amount"), fee.to_string()));
        }
    }
}

fn push_metadata(form: &mut Vec<(String, String)>, request: &CheckoutRequest, prefix: &str) {
    for (k, v) in &request.metadata {
        form.push((format!("{prefix}[{k}]"), v.clone()));
    }
}
