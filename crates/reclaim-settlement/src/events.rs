//! Settlement event bus.
//!
//! Publishes side effects as events on a broadcast channel. Downstream
//! consumers (mailers, CRM sync) subscribe and act independently. Each
//! subscriber has its own buffer; a lagging subscriber drops the oldest events.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use reclaim_types::transaction::Transaction;
use reclaim_types::user::User;
use reclaim_types::wallet::WalletTotals;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::dispatcher::{DispatchError, SideEffectDispatcher};

/// Event type for a confirmed transaction at or above the threshold.
pub const TRANSACTION_CONFIRMED: &str = "TransactionConfirmed";

/// Event type for a first threshold crossing.
pub const THRESHOLD_ACHIEVED: &str = "ThresholdAchieved";

/// An event emitted after settlement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Event type name (e.g. "ThresholdAchieved").
    pub event_type: String,
    /// Unix timestamp.
    pub timestamp: u64,
    /// Type-specific payload.
    pub payload: serde_json::Value,
}

/// Event bus for broadcasting events to subscribers.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
    sequence: Arc<AtomicU64>,
}

impl EventBus {
    /// Create a new event bus with the given buffer capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            sequence: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Emit an event to all subscribers.
    pub fn emit(&self, event: Event) {
        self.sequence.fetch_add(1, Ordering::SeqCst);
        // No subscribers is not an error.
        let _ = self.sender.send(event);
    }

    /// Subscribe to events.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }

    /// Number of events emitted so far.
    pub fn sequence(&self) -> u64 {
        self.sequence.load(Ordering::SeqCst)
    }

    fn emit_json(&self, event_type: &str, payload: serde_json::Value) {
        self.emit(Event {
            event_type: event_type.to_string(),
            timestamp: reclaim_db::now(),
            payload,
        });
    }
}

impl SideEffectDispatcher for EventBus {
    fn notify_transaction_confirmed(&self, transaction: &Transaction, user: &User) -> Result<(), DispatchError> {
        let payload = serde_json::json!({
            "transaction": transaction,
            "user_id": user.id,
            "email": user.email,
        });
        self.emit_json(TRANSACTION_CONFIRMED, payload);
        Ok(())
    }

    fn notify_threshold_achieved(&self, user: &User, totals: &WalletTotals) -> Result<(), DispatchError> {
        let payload = serde_json::json!({
            "user_id": user.id,
            "email": user.email,
            "totals": totals,
        });
        self.emit_json(THRESHOLD_ACHIEVED, payload);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reclaim_types::user::{Profile, RegistrationLevel};

    fn user() -> User {
        User {
            id: "u1".into(),
            email: "a@x.com".into(),
            registration_level: RegistrationLevel::Full,
            profile: Profile::default(),
            corsair_connect_flag: true,
            created_at: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn test_event_bus_emit_subscribe() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.emit(Event {
            event_type: "DaemonStarted".to_string(),
            timestamp: 1000,
            payload: serde_json::json!({"version": "0.1.0"}),
        });

        let event = rx.try_recv().expect("receive event");
        assert_eq!(event.event_type, "DaemonStarted");
        assert_eq!(bus.sequence(), 1);
    }

    #[test]
    fn test_threshold_event_payload() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        let totals = WalletTotals {
            total_accumulated: 136_364,
            current_balance: 136_364,
            total_amount_spent: 1500,
        };
        bus.notify_threshold_achieved(&user(), &totals).expect("dispatch");

        let event = rx.try_recv().expect("receive event");
        assert_eq!(event.event_type, THRESHOLD_ACHIEVED);
        assert_eq!(event.payload["user_id"], "u1");
        assert_eq!(event.payload["totals"]["total_amount_spent"], 1500);
    }

    #[test]
    fn test_emit_without_subscribers() {
        let bus = EventBus::new(4);
        let totals = WalletTotals {
            total_accumulated: 0,
            current_balance: 0,
            total_amount_spent: 0,
        };
        bus.notify_threshold_achieved(&user(), &totals).expect("dispatch");
        assert_eq!(bus.sequence(), 1);
    }
}
