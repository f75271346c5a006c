//! reclaim-daemon: the settlement service.
//!
//! Single OS process running a Tokio async runtime. Storefronts, the
//! webhook relay and admin tooling talk to it via JSON-RPC over a Unix
//! socket.

mod commands;
mod config;
mod gateway;
mod rpc;
#[cfg(test)]
mod test_support;

use std::sync::Arc;

use reclaim_settlement::dispatcher::{FanoutDispatcher, LoggingDispatcher, SideEffectDispatcher};
use reclaim_settlement::events::{self, EventBus};
use reclaim_settlement::gateway::PaymentGateway;
use reclaim_settlement::SettlementEngine;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use crate::config::DaemonConfig;
use crate::rpc::RpcServer;

/// Daemon-wide shared state.
pub struct DaemonState {
    /// Settlement engine.
    pub engine: Arc<SettlementEngine>,
    /// Database connection shared with the engine.
    pub db: Arc<tokio::sync::Mutex<rusqlite::Connection>>,
    /// Configuration.
    pub config: DaemonConfig,
    /// Event bus for pushing settlement events to subscribers.
    pub event_bus: EventBus,
    /// Shutdown signal sender.
    pub shutdown_tx: broadcast::Sender<()>,
}

/// Wire the engine around an open database.
fn build_state(
    config: DaemonConfig,
    mut conn: rusqlite::Connection,
    gateway: Arc<dyn PaymentGateway>,
) -> anyhow::Result<Arc<DaemonState>> {
    let master_id = config.settlement.master_id.trim();
    if !master_id.is_empty()
        && reclaim_db::queries::config::ensure(&mut conn, reclaim_types::config::MASTER_ID, master_id, "daemon")?
    {
        info!(master_id, "seeded master id");
    }

    let event_bus = EventBus::new(1000);
    let dispatcher = FanoutDispatcher::new(vec![
        Arc::new(LoggingDispatcher) as Arc<dyn SideEffectDispatcher>,
        Arc::new(event_bus.clone()) as Arc<dyn SideEffectDispatcher>,
    ]);

    let db = Arc::new(tokio::sync::Mutex::new(conn));
    let engine = SettlementEngine::new(
        db.clone(),
        gateway,
        Arc::new(dispatcher),
        config.gateway.webhook_secret.clone(),
    )
    .with_gateway_timeout(config.gateway.timeout());

    let (shutdown_tx, _shutdown_rx) = broadcast::channel(1);
    Ok(Arc::new(DaemonState {
        engine: Arc::new(engine),
        db,
        config,
        event_bus,
        shutdown_tx,
    }))
}

/// Choose the payment gateway from configuration.
fn build_gateway(config: &DaemonConfig) -> anyhow::Result<Arc<dyn PaymentGateway>> {
    let stripe = config.gateway.stripe_config();
    if config.gateway.secret_key.is_empty() {
        warn!("gateway secret key not configured, PAY purchases are disabled");
        return Ok(Arc::new(gateway::UnconfiguredGateway::new(stripe.signature_tolerance_secs)));
    }
    Ok(Arc::new(reclaim_stripe::StripeGateway::new(stripe)?))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Load config
    let config = DaemonConfig::load()?;

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(format!("reclaim={}", config.logging.level).parse()?),
        )
        .init();

    info!("Reclaim daemon starting");

    if config.gateway.webhook_secret.is_empty() {
        warn!("webhook secret not configured, every gateway webhook will be rejected");
    }

    let data_dir = config.data_dir();
    std::fs::create_dir_all(&data_dir)?;

    // 2. Open database
    let db_path = config.database_path();
    let conn = reclaim_db::open(&db_path)?;
    info!(path = ?db_path, "database open");

    // 3. Gateway, engine, state
    let gateway = build_gateway(&config)?;
    let state = build_state(config, conn, gateway)?;

    // 4. Start IPC server
    let socket_path = data_dir.join("daemon.sock");
    let rpc_server = RpcServer::new(state.clone(), socket_path.clone());

    state.event_bus.emit(events::Event {
        event_type: "DaemonStarted".to_string(),
        timestamp: reclaim_db::now(),
        payload: serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
        }),
    });

    // 5. Run the RPC server until shutdown
    let mut shutdown_rx = state.shutdown_tx.subscribe();
    tokio::select! {
        result = rpc_server.run() => {
            if let Err(e) = result {
                error!("RPC server error: {}", e);
            }
        }
        _ = shutdown_rx.recv() => {
            info!("Shutdown signal received");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl-C received, shutting down");
        }
    }

    // Clean up socket file
    let _ = std::fs::remove_file(&socket_path);

    info!("Daemon stopped");
    Ok(())
}
