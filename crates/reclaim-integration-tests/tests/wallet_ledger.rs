//! Integration test: wallet ledger invariants.
//!
//! Covers:
//! 1. The balance equation after every credit, redemption and adjustment
//! 2. Adjustments that would drive a balance negative
//! 3. The threshold side effect firing once per user lifetime

mod common;

use common::{fixture, full_profile, settled, standard_profile};
use reclaim_settlement::{PurchaseRequest, SettlementError};
use reclaim_types::wallet::OwnerType;

fn allocation(email: &str, amount: u64) -> PurchaseRequest {
    PurchaseRequest {
        sku_code: "ALLOC".into(),
        email: Some(email.into()),
        profile: full_profile(),
        amount: Some(amount),
        ..PurchaseRequest::default()
    }
}

#[tokio::test]
async fn test_balance_equation_holds_throughout() {
    let f = fixture();
    let s = settled(f.engine.create_transaction(allocation("a@x.com", 250)).await.expect("credit"));
    let user_id = s.user.id;
    assert!(s.wallet.is_balanced());

    let w = f
        .engine
        .redeem_impact(&user_id, OwnerType::User, 2_727)
        .await
        .expect("redeem");
    assert!(w.is_balanced());
    assert_eq!(w.current_balance, 20_000);

    let (w, adj) = f
        .engine
        .adjust_wallet(&user_id, 1_000, "missed import", "ops")
        .await
        .expect("adjust up");
    assert!(w.is_balanced());
    assert_eq!(w.total_accumulated, 23_727);
    assert_eq!((adj.balance_before, adj.balance_after), (20_000, 21_000));

    let w = settled(f.engine.create_transaction(allocation("a@x.com", 250)).await.expect("credit"))
        .wallet;
    assert!(w.is_balanced());
    assert_eq!(w.current_balance, 43_727);
    assert_eq!(w.total_amount_spent, 500);

    let err = f
        .engine
        .redeem_impact(&user_id, OwnerType::User, 43_728)
        .await
        .expect_err("overdraw");
    assert!(matches!(
        err,
        SettlementError::InsufficientBalance {
            available: 43_727,
            requested: 43_728
        }
    ));
}

#[tokio::test]
async fn test_negative_adjustment_beyond_balance_rejected() {
    let f = fixture();
    let s = settled(f.engine.create_transaction(allocation("a@x.com", 250)).await.expect("credit"));
    f.engine
        .redeem_impact(&s.user.id, OwnerType::User, 22_697)
        .await
        .expect("redeem");
    let before = f.engine.get_wallet(&s.user.id, OwnerType::User).await.expect("wallet");
    assert_eq!(before.current_balance, 30);

    let err = f
        .engine
        .adjust_wallet(&s.user.id, -50, "chargeback", "ops")
        .await
        .expect_err("negative");
    assert!(matches!(err, SettlementError::Validation(_)));

    let after = f.engine.get_wallet(&s.user.id, OwnerType::User).await.expect("wallet");
    assert_eq!(after, before);
    assert!(f
        .engine
        .list_adjustments(&s.user.id)
        .await
        .expect("trail")
        .is_empty());
}

#[tokio::test]
async fn test_adjustment_requires_reason() {
    let f = fixture();
    let s = settled(f.engine.create_transaction(allocation("a@x.com", 250)).await.expect("credit"));
    let err = f
        .engine
        .adjust_wallet(&s.user.id, 10, "  ", "ops")
        .await
        .expect_err("no reason");
    assert!(matches!(err, SettlementError::Validation(_)));
}

#[tokio::test]
async fn test_threshold_fires_once_per_lifetime() {
    let f = fixture();
    // €6 then €6: the second purchase crosses €10.
    for _ in 0..2 {
        f.engine
            .create_transaction(PurchaseRequest {
                profile: standard_profile(),
                ..allocation("a@x.com", 600)
            })
            .await
            .expect("below threshold");
    }
    assert_eq!(f.dispatcher.threshold_count(), 1);
    assert_eq!(f.dispatcher.confirmed_count(), 0);
    {
        let thresholds = f.dispatcher.thresholds.lock().expect("lock");
        assert_eq!(thresholds[0].1.total_amount_spent, 1200);
    }

    // Each later qualifying purchase confirms, never re-crosses.
    for _ in 0..3 {
        let s = settled(f.engine.create_transaction(allocation("a@x.com", 1500)).await.expect("qualifying"));
        assert!(s.user.corsair_connect_flag);
    }
    // Small purchases after the crossing notify nothing.
    f.engine
        .create_transaction(allocation("a@x.com", 100))
        .await
        .expect("small");
    assert_eq!(f.dispatcher.threshold_count(), 1);
    assert_eq!(f.dispatcher.confirmed_count(), 3);
}
