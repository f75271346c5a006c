//! Wallet credit and threshold-crossing detection.
//!
//! Called inside the caller's database transaction once a transaction is
//! known to be paid (or needs no payment). Credits the user's wallet and, when
//! the transaction names a merchant, the merchant's wallet. Then compares the
//! user's flag as read *before* the credit with the certification the credit
//! produced.

use reclaim_db::queries::users;
use reclaim_db::queries::wallets;
use reclaim_types::transaction::Transaction;
use reclaim_types::user::User;
use reclaim_types::wallet::{OwnerType, Wallet, WalletTotals};
use reclaim_types::Cents;
use rusqlite::Connection;

use crate::dispatcher::SideEffectDispatcher;
use crate::Result;

/// What a credit did to the user's threshold state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ThresholdOutcome {
    /// Cumulative spend crossed the threshold for the first time.
    Crossed,
    /// Already crossed earlier, but this transaction alone meets the threshold.
    Qualified,
    /// Nothing to report.
    Unchanged,
}

/// Classify a credit.
///
/// `previous_flag` must be read before the wallet mutation.
pub fn detect(previous_flag: bool, certified_now: bool, amount: Cents, threshold: Cents) -> ThresholdOutcome {
    if !previous_flag && certified_now {
        ThresholdOutcome::Crossed
    } else if amount >= threshold {
        ThresholdOutcome::Qualified
    } else {
        ThresholdOutcome::Unchanged
    }
}

/// A side effect to deliver once the database transaction has committed.
#[derive(Clone, Debug, PartialEq)]
pub enum Notification {
    TransactionConfirmed { transaction: Transaction, user: User },
    ThresholdAchieved { user: User, totals: WalletTotals },
}

impl Notification {
    /// Hand the notification to `dispatcher`, logging a failure.
    pub fn deliver(&self, dispatcher: &dyn SideEffectDispatcher) {
        let result = match self {
            Notification::TransactionConfirmed { transaction, user } => {
                dispatcher.notify_transaction_confirmed(transaction, user)
            }
            Notification::ThresholdAchieved { user, totals } => dispatcher.notify_threshold_achieved(user, totals),
        };
        if let Err(e) = result {
            tracing::warn!(error = %e, "side effect dispatch failed");
        }
    }
}

/// Result of crediting a settled transaction.
#[derive(Clone, Debug, PartialEq)]
pub struct Credited {
    /// The user after any flag change.
    pub user: User,
    pub wallet: Wallet,
    pub merchant_wallet: Option<Wallet>,
    pub outcome: ThresholdOutcome,
    pub notification: Option<Notification>,
}

/// Credit the wallets for `transaction` and detect a threshold crossing.
///
/// `user` must be the user as read before this call. The threshold is the one
/// recorded on the transaction at creation.
pub fn credit_settled(conn: &Connection, transaction: &Transaction, user: &User) -> Result<Credited> {
    let threshold = transaction.corsair_threshold;
    let previous_flag = user.corsair_connect_flag;
    let wallet = wallets::credit(
        conn,
        &user.id,
        OwnerType::User,
        transaction.calculated_impact,
        transaction.amount,
        threshold,
    )?;
    let merchant_wallet = match &transaction.merchant_id {
        Some(merchant_id) => Some(wallets::credit(
            conn,
            merchant_id,
            OwnerType::Merchant,
            transaction.calculated_impact,
            transaction.amount,
            threshold,
        )?),
        None => None,
    };

    let outcome = detect(previous_flag, wallet.certified_asset_status, transaction.amount, threshold);
    let (user, notification) = match outcome {
        ThresholdOutcome::Crossed => {
            users::set_threshold_flag(conn, &user.id, true)?;
            let user = users::get_by_id(conn, &user.id)?;
            tracing::info!(
                user_id = %user.id,
                transaction_id = %transaction.id,
                spent = wallet.total_amount_spent,
                threshold,
                "corsair threshold crossed"
            );
            let totals = WalletTotals::from(&wallet);
            (
                user.clone(),
                Some(Notification::ThresholdAchieved { user, totals }),
            )
        }
        ThresholdOutcome::Qualified => (
            user.clone(),
            Some(Notification::TransactionConfirmed {
                transaction: transaction.clone(),
                user: user.clone(),
            }),
        ),
        ThresholdOutcome::Unchanged => (user.clone(), None),
    };

    Ok(Credited {
        user,
        wallet,
        merchant_wallet,
        outcome,
        notification,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect() {
        assert_eq!(detect(false, true, 1500, 1000), ThresholdOutcome::Crossed);
        assert_eq!(detect(false, true, 200, 1000), ThresholdOutcome::Crossed);
        assert_eq!(detect(true, true, 1500, 1000), ThresholdOutcome::Qualified);
        assert_eq!(detect(true, true, 200, 1000), ThresholdOutcome::Unchanged);
        assert_eq!(detect(false, false, 200, 1000), ThresholdOutcome::Unchanged);
    }
}
