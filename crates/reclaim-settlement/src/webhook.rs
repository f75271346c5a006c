//! Payment-event state machine.
//!
//! ```text
//! pending ──succeeded──▶ completed   (credit wallets once)
//!    │
//!    └──failed/canceled/expired──▶ failed   (no ledger effect)
//! ```
//!
//! Gateways deliver at least once and in any order. Applying the same success
//! event twice yields [`WebhookOutcome::Duplicate`]; events that reference an
//! unknown or already-terminal transaction are discarded with a warning
//! instead of raising, so the gateway stops retrying them.

use reclaim_db::queries::{transactions, users};
use reclaim_types::transaction::{PaymentStatus, Transaction};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::gateway::{PaymentEvent, PaymentEventKind};
use crate::ledger::{self, Notification};
use crate::{Result, SettlementError};

/// Why an event was dropped.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum DiscardReason {
    /// No correlation id matched a transaction.
    UnknownTransaction,
    /// The transaction already left `pending`.
    NotPending { status: PaymentStatus },
    /// A success event without a payment intent id.
    MissingPaymentIntent,
    /// The payment intent already settled a different transaction.
    PaymentIntentBound { transaction_id: String },
}

/// Result of applying one event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum WebhookOutcome {
    /// Pending transaction completed and credited.
    Applied { transaction: Transaction },
    /// The payment intent was already applied.
    Duplicate { transaction_id: String },
    /// Pending transaction marked failed.
    Failed { transaction: Transaction },
    Discarded(DiscardReason),
    /// Event type the engine does not act on.
    Ignored { event_type: String },
}

/// An applied event plus the side effect to deliver after commit.
#[derive(Debug)]
pub struct Applied {
    pub outcome: WebhookOutcome,
    pub notification: Option<Notification>,
}

impl From<WebhookOutcome> for Applied {
    fn from(outcome: WebhookOutcome) -> Self {
        Self {
            outcome,
            notification: None,
        }
    }
}

/// Apply `event` inside the caller's locking transaction.
///
/// The idempotency lookup is the first read.
///
/// # Errors
///
/// Only storage and configuration failures. Business-level rejections are
/// reported as [`WebhookOutcome::Discarded`].
pub fn apply(conn: &Connection, event: &PaymentEvent) -> Result<Applied> {
    match event.kind {
        PaymentEventKind::Succeeded => apply_success(conn, event),
        PaymentEventKind::Failed => apply_failure(conn, event),
        PaymentEventKind::Ignored => {
            tracing::debug!(event_id = %event.event_id, event_type = %event.event_type, "webhook ignored");
            Ok(WebhookOutcome::Ignored {
                event_type: event.event_type.clone(),
            }
            .into())
        }
    }
}

fn apply_success(conn: &Connection, event: &PaymentEvent) -> Result<Applied> {
    let Some(payment_intent_id) = event.payment_intent_id.as_deref() else {
        return Ok(discard(event, DiscardReason::MissingPaymentIntent));
    };

    if let Some(existing) = transactions::find_by_payment_intent(conn, payment_intent_id)? {
        if existing.payment_status == PaymentStatus::Completed {
            tracing::info!(
                event_id = %event.event_id,
                transaction_id = %existing.id,
                payment_intent_id,
                "duplicate payment confirmation"
            );
            return Ok(WebhookOutcome::Duplicate {
                transaction_id: existing.id,
            }
            .into());
        }
        return Ok(discard(
            event,
            DiscardReason::NotPending {
                status: existing.payment_status,
            },
        ));
    }

    let Some(target) = locate(conn, event)? else {
        return Ok(discard(event, DiscardReason::UnknownTransaction));
    };
    if target.payment_status != PaymentStatus::Pending {
        return Ok(discard(
            event,
            DiscardReason::NotPending {
                status: target.payment_status,
            },
        ));
    }

    // Read the user before the credit so the crossing check sees the old flag.
    let user = users::get_by_id(conn, &target.user_id)?;
    let completed = match transactions::complete_pending(conn, &target.id, payment_intent_id) {
        Ok(Some(tx)) => tx,
        Ok(None) => {
            return Ok(discard(
                event,
                DiscardReason::NotPending {
                    status: target.payment_status,
                },
            ))
        }
        Err(reclaim_db::DbError::Conflict(_)) => {
            return Ok(discard(
                event,
                DiscardReason::PaymentIntentBound {
                    transaction_id: target.id,
                },
            ))
        }
        Err(e) => return Err(e.into()),
    };

    let credited = ledger::credit_settled(conn, &completed, &user)?;

    tracing::info!(
        event_id = %event.event_id,
        transaction_id = %completed.id,
        payment_intent_id,
        impact = completed.calculated_impact,
        balance = credited.wallet.current_balance,
        "payment confirmed"
    );
    Ok(Applied {
        outcome: WebhookOutcome::Applied {
            transaction: completed,
        },
        notification: credited.notification,
    })
}

fn apply_failure(conn: &Connection, event: &PaymentEvent) -> Result<Applied> {
    let Some(target) = locate(conn, event)? else {
        return Ok(discard(event, DiscardReason::UnknownTransaction));
    };
    match transactions::fail_pending(conn, &target.id, event.payment_intent_id.as_deref()) {
        Ok(Some(failed)) => {
            tracing::info!(
                event_id = %event.event_id,
                transaction_id = %failed.id,
                event_type = %event.event_type,
                "payment failed"
            );
            Ok(WebhookOutcome::Failed { transaction: failed }.into())
        }
        Ok(None) => Ok(discard(
            event,
            DiscardReason::NotPending {
                status: target.payment_status,
            },
        )),
        Err(reclaim_db::DbError::Conflict(_)) => Ok(discard(
            event,
            DiscardReason::PaymentIntentBound {
                transaction_id: target.id,
            },
        )),
        Err(e) => Err(SettlementError::from(e)),
    }
}

/// Find the transaction an event refers to: metadata ref, then the gateway
/// object id, then the payment intent id.
fn locate(conn: &Connection, event: &PaymentEvent) -> Result<Option<Transaction>> {
    if let Some(reference) = event.transaction_ref.as_deref() {
        if let Some(tx) = transactions::find_by_checkout_ref(conn, reference)? {
            return Ok(Some(tx));
        }
    }
    if let Some(reference) = event.gateway_reference.as_deref() {
        if let Some(tx) = transactions::find_by_gateway_reference(conn, reference)? {
            return Ok(Some(tx));
        }
    }
    if let Some(pi) = event.payment_intent_id.as_deref() {
        if let Some(tx) = transactions::find_by_gateway_reference(conn, pi)? {
            return Ok(Some(tx));
        }
        if let Some(tx) = transactions::find_by_payment_intent(conn, pi)? {
            return Ok(Some(tx));
        }
    }
    Ok(None)
}

fn discard(event: &PaymentEvent, reason: DiscardReason) -> Applied {
    tracing::warn!(
        event_id = %event.event_id,
        event_type = %event.event_type,
        reason = ?reason,
        "webhook discarded"
    );
    WebhookOutcome::Discarded(reason).into()
}
