//! Shared fixtures for the daemon's unit tests.

use std::sync::Arc;

use reclaim_db::queries::skus;
use reclaim_types::sku::{NewSku, PaymentMode};

use crate::config::DaemonConfig;
use crate::gateway::UnconfiguredGateway;
use crate::{build_state, DaemonState};

/// State over an in-memory database with a master id and webhook secret.
pub fn memory_state() -> Arc<DaemonState> {
    let mut config = DaemonConfig::default();
    config.settlement.master_id = "master-1".into();
    config.gateway.webhook_secret = "whsec".into();
    let conn = reclaim_db::open_memory().expect("db");
    build_state(config, conn, Arc::new(UnconfiguredGateway::new(300))).expect("state")
}

pub async fn seed_sku(state: &Arc<DaemonState>, code: &str, payment_mode: PaymentMode, price: u64) {
    let db = state.db.lock().await;
    skus::insert(
        &db,
        &NewSku {
            code: code.into(),
            name: code.into(),
            payment_mode,
            price,
            impact_multiplier: 1.0,
            requires_validation: false,
            corsair_threshold: None,
        },
    )
    .expect("sku");
}
