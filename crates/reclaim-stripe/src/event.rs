//! Parsing gateway webhook bodies into [`PaymentEvent`]s.

use std::collections::HashMap;

use reclaim_settlement::gateway::{GatewayError, PaymentEvent, PaymentEventKind, TRANSACTION_REF_KEY};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct RawEvent {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    data: RawData,
}

#[derive(Debug, Deserialize)]
struct RawData {
    object: RawObject,
}

#[derive(Debug, Deserialize)]
struct RawObject {
    id: String,
    /// Set on checkout sessions once an intent exists.
    #[serde(default)]
    payment_intent: Option<String>,
    /// Checkout session payment state: `paid`, `unpaid`, `no_payment_required`.
    #[serde(default)]
    payment_status: Option<String>,
    #[serde(default)]
    metadata: HashMap<String, String>,
}

/// Parse a verified webhook body.
///
/// # Errors
///
/// - [`GatewayError::MalformedPayload`] if the body is not an event object
pub fn parse(raw_body: &[u8]) -> Result<PaymentEvent, GatewayError> {
    let raw: RawEvent =
        serde_json::from_slice(raw_body).map_err(|e| GatewayError::MalformedPayload(e.to_string()))?;
    let object = raw.data.object;
    let transaction_ref = object.metadata.get(TRANSACTION_REF_KEY).cloned();

    let (kind, payment_intent_id) = match raw.event_type.as_str() {
        "payment_intent.succeeded" => (PaymentEventKind::Succeeded, Some(object.id.clone())),
        "payment_intent.payment_failed" | "payment_intent.canceled" => {
            (PaymentEventKind::Failed, Some(object.id.clone()))
        }
        // Delayed payment methods complete the session unpaid; wait for the intent.
        "checkout.session.completed" if object.payment_status.as_deref() == Some("paid") => {
            (PaymentEventKind::Succeeded, object.payment_intent.clone())
        }
        "checkout.session.expired" => (PaymentEventKind::Failed, object.payment_intent.clone()),
        _ => (PaymentEventKind::Ignored, None),
    };

    Ok(PaymentEvent {
        event_id: raw.id,
        event_type: raw.event_type,
        kind,
        payment_intent_id,
        gateway_reference: Some(object.id),
        transaction_ref,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(event_type: &str, object: serde_json::Value) -> Vec<u8> {
        serde_json::to_vec(&serde_json::json!({
            "id": "evt_1",
            "type": event_type,
            "data": { "object": object },
        }))
        .expect("json")
    }

    #[test]
    fn test_intent_succeeded() {
        let event = parse(&body(
            "payment_intent.succeeded",
            serde_json::json!({ "id": "pi_1", "metadata": { "transaction_ref": "ref-1" } }),
        ))
        .expect("parse");
        assert_eq!(event.kind, PaymentEventKind::Succeeded);
        assert_eq!(event.payment_intent_id.as_deref(), Some("pi_1"));
        assert_eq!(event.transaction_ref.as_deref(), Some("ref-1"));
    }

    #[test]
    fn test_session_completed_only_when_paid() {
        let paid = parse(&body(
            "checkout.session.completed",
            serde_json::json!({ "id": "cs_1", "payment_intent": "pi_9", "payment_status": "paid" }),
        ))
        .expect("parse");
        assert_eq!(paid.kind, PaymentEventKind::Succeeded);
        assert_eq!(paid.payment_intent_id.as_deref(), Some("pi_9"));
        assert_eq!(paid.gateway_reference.as_deref(), Some("cs_1"));

        let unpaid = parse(&body(
            "checkout.session.completed",
            serde_json::json!({ "id": "cs_1", "payment_intent": "pi_9", "payment_status": "unpaid" }),
        ))
        .expect("parse");
        assert_eq!(unpaid.kind, PaymentEventKind::Ignored);
    }

    #[test]
    fn test_failure_events() {
        for event_type in ["payment_intent.payment_failed", "payment_intent.canceled"] {
            let event = parse(&body(event_type, serde_json::json!({ "id": "pi_1" }))).expect("parse");
            assert_eq!(event.kind, PaymentEventKind::Failed);
        }
        let expired = parse(&body(
            "checkout.session.expired",
            serde_json::json!({ "id": "cs_1", "payment_intent": null }),
        ))
        .expect("parse");
        assert_eq!(expired.kind, PaymentEventKind::Failed);
        assert_eq!(expired.payment_intent_id, None);
    }

    #[test]
    fn test_other_events_ignored() {
        let event = parse(&body("customer.created", serde_json::json!({ "id": "cus_1" }))).expect("parse");
        assert_eq!(event.kind, PaymentEventKind::Ignored);
        assert_eq!(event.event_type, "customer.created");
    }

    #[test]
    fn test_malformed() {
        assert!(matches!(parse(b"not json"), Err(GatewayError::MalformedPayload(_))));
        assert!(matches!(parse(b"{\"id\":\"evt\"}"), Err(GatewayError::MalformedPayload(_))));
    }
}
