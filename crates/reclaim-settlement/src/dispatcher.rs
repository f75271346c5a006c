//! Side-effect dispatcher interface.
//!
//! Notifications are fire-and-forget: the engine calls the dispatcher only
//! after the database transaction commits and logs any failure. A dispatcher
//! error never rolls anything back.

use std::sync::Arc;

use reclaim_types::transaction::Transaction;
use reclaim_types::user::User;
use reclaim_types::wallet::WalletTotals;

/// Failure reported by a dispatcher.
#[derive(Debug, thiserror::Error)]
#[error("dispatch failed: {0}")]
pub struct DispatchError(pub String);

/// Receiver of post-settlement side effects (emails, CRM sync, ...).
pub trait SideEffectDispatcher: Send + Sync {
    /// A transaction at or above the threshold was confirmed.
    fn notify_transaction_confirmed(&self, transaction: &Transaction, user: &User) -> Result<(), DispatchError>;

    /// The user's cumulative spend crossed the threshold for the first time.
    fn notify_threshold_achieved(&self, user: &User, totals: &WalletTotals) -> Result<(), DispatchError>;
}

/// Dispatcher that only writes log lines.
#[derive(Clone, Copy, Debug, Default)]
pub struct LoggingDispatcher;

impl SideEffectDispatcher for LoggingDispatcher {
    fn notify_transaction_confirmed(&self, transaction: &Transaction, user: &User) -> Result<(), DispatchError> {
        tracing::info!(
            transaction_id = %transaction.id,
            user_id = %user.id,
            amount = transaction.amount,
            impact = transaction.calculated_impact,
            "transaction confirmed"
        );
        Ok(())
    }

    fn notify_threshold_achieved(&self, user: &User, totals: &WalletTotals) -> Result<(), DispatchError> {
        tracing::info!(
            user_id = %user.id,
            spent = totals.total_amount_spent,
            accumulated = totals.total_accumulated,
            "threshold achieved"
        );
        Ok(())
    }
}

/// Forwards every notification to each inner dispatcher in order.
///
/// All dispatchers are attempted; the first failure is returned.
#[derive(Clone, Default)]
pub struct FanoutDispatcher {
    targets: Vec<Arc<dyn SideEffectDispatcher>>,
}

impl FanoutDispatcher {
    pub fn new(targets: Vec<Arc<dyn SideEffectDispatcher>>) -> Self {
        Self { targets }
    }

    fn each(&self, f: impl Fn(&dyn SideEffectDispatcher) -> Result<(), DispatchError>) -> Result<(), DispatchError> {
        let mut first_error = None;
        for target in &self.targets {
            if let Err(e) = f(target.as_ref()) {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

impl SideEffectDispatcher for FanoutDispatcher {
    fn notify_transaction_confirmed(&self, transaction: &Transaction, user: &User) -> Result<(), DispatchError> {
        self.each(|d| d.notify_transaction_confirmed(transaction, user))
    }

    fn notify_threshold_achieved(&self, user: &User, totals: &WalletTotals) -> Result<(), DispatchError> {
        self.each(|d| d.notify_threshold_achieved(user, totals))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reclaim_types::user::{Profile, RegistrationLevel};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting {
        calls: AtomicUsize,
        fail: bool,
    }

    impl SideEffectDispatcher for Counting {
        fn notify_transaction_confirmed(&self, _: &Transaction, _: &User) -> Result<(), DispatchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn notify_threshold_achieved(&self, _: &User, _: &WalletTotals) -> Result<(), DispatchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(DispatchError("mailer down".into()))
            } else {
                Ok(())
            }
        }
    }

    #[test]
    fn test_fanout_reaches_all_despite_failure() {
        let failing = Arc::new(Counting {
            calls: AtomicUsize::new(0),
            fail: true,
        });
        let healthy = Arc::new(Counting {
            calls: AtomicUsize::new(0),
            fail: false,
        });
        let targets: Vec<Arc<dyn SideEffectDispatcher>> = vec![
            failing.clone() as Arc<dyn SideEffectDispatcher>,
            healthy.clone() as Arc<dyn SideEffectDispatcher>,
            Arc::new(LoggingDispatcher) as Arc<dyn SideEffectDispatcher>,
        ];
        let fanout = FanoutDispatcher::new(targets);
        let user = User {
            id: "u1".into(),
            email: "a@x.com".into(),
            registration_level: RegistrationLevel::Full,
            profile: Profile::default(),
            corsair_connect_flag: true,
            created_at: 0,
            updated_at: 0,
        };
        let totals = WalletTotals {
            total_accumulated: 1,
            current_balance: 1,
            total_amount_spent: 1000,
        };
        assert!(fanout.notify_threshold_achieved(&user, &totals).is_err());
        assert_eq!(failing.calls.load(Ordering::SeqCst), 1);
        assert_eq!(healthy.calls.load(Ordering::SeqCst), 1);
    }
}
