//! Fixtures shared by the integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex as StdMutex};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use reclaim_db::queries::{config, gift_cards, merchants, skus};
use reclaim_settlement::dispatcher::{DispatchError, SideEffectDispatcher};
use reclaim_settlement::engine::{PendingPayment, Settlement};
use reclaim_settlement::gateway::{CheckoutHandle, CheckoutRequest, GatewayError, PaymentEvent, PaymentGateway};
use reclaim_settlement::{PurchaseOutcome, SettlementEngine};
use reclaim_types::sku::{Merchant, NewSku, PaymentMode};
use reclaim_types::transaction::Transaction;
use reclaim_types::user::{Address, Profile, User};
use reclaim_types::wallet::WalletTotals;
use tokio::sync::Mutex;

pub const WEBHOOK_SECRET: &str = "whsec_integration";

/// Gateway that opens checkouts locally and verifies webhooks with the real
/// signature scheme.
#[derive(Default)]
pub struct LocalGateway {
    /// Return `cs_` session ids instead of `pi_` intent ids.
    pub sessions: bool,
    pub opened: StdMutex<Vec<CheckoutRequest>>,
}

#[async_trait]
impl PaymentGateway for LocalGateway {
    async fn create_intent_or_session(&self, request: &CheckoutRequest) -> Result<CheckoutHandle, GatewayError> {
        let mut opened = self.opened.lock().expect("lock");
        opened.push(request.clone());
        let n = opened.len();
        Ok(if self.sessions {
            CheckoutHandle {
                id: format!("cs_{n}"),
                client_secret: None,
                url: Some(format!("https://checkout.local/cs_{n}")),
            }
        } else {
            CheckoutHandle {
                id: format!("pi_{n}"),
                client_secret: Some(format!("pi_{n}_secret")),
                url: None,
            }
        })
    }

    fn verify_and_parse_webhook(&self, raw_body: &[u8], signature: &str, secret: &str) -> Result<PaymentEvent, GatewayError> {
        reclaim_stripe::signature::verify(
            raw_body,
            signature,
            secret,
            reclaim_stripe::signature::DEFAULT_TOLERANCE_SECS,
            unix_now(),
        )?;
        reclaim_stripe::event::parse(raw_body)
    }
}

#[derive(Default)]
pub struct RecordingDispatcher {
    pub confirmed: StdMutex<Vec<String>>,
    pub thresholds: StdMutex<Vec<(String, WalletTotals)>>,
}

impl RecordingDispatcher {
    pub fn threshold_count(&self) -> usize {
        self.thresholds.lock().expect("lock").len()
    }

    pub fn confirmed_count(&self) -> usize {
        self.confirmed.lock().expect("lock").len()
    }
}

impl SideEffectDispatcher for RecordingDispatcher {
    fn notify_transaction_confirmed(&self, transaction: &Transaction, _user: &User) -> Result<(), DispatchError> {
        self.confirmed.lock().expect("lock").push(transaction.id.clone());
        Ok(())
    }

    fn notify_threshold_achieved(&self, user: &User, totals: &WalletTotals) -> Result<(), DispatchError> {
        self.thresholds
            .lock()
            .expect("lock")
            .push((user.id.clone(), totals.clone()));
        Ok(())
    }
}

pub struct Fixture {
    pub engine: Arc<SettlementEngine>,
    pub gateway: Arc<LocalGateway>,
    pub dispatcher: Arc<RecordingDispatcher>,
}

impl Fixture {
    /// Insert known gift card codes for `sku_code`.
    pub async fn gift_cards(&self, sku_code: &str, codes: &[&str]) {
        let conn = self.engine.db().lock().await;
        let sku = skus::get_by_code(&conn, sku_code).expect("sku");
        for code in codes {
            gift_cards::insert(&conn, code, &sku.id).expect("card");
        }
    }

    pub async fn merchant(&self, name: &str, stripe_account_id: Option<&str>) -> Merchant {
        let conn = self.engine.db().lock().await;
        merchants::insert(&conn, name, stripe_account_id).expect("merchant")
    }

    /// Deliver a webhook signed with the engine's secret.
    pub async fn deliver(&self, event_id: &str, event_type: &str, object: serde_json::Value) -> reclaim_settlement::Result<reclaim_settlement::webhook::WebhookOutcome> {
        let (body, signature) = signed(event_id, event_type, object);
        self.engine.handle_webhook(&body, &signature).await
    }
}

/// Engine over an in-memory database with default pricing (0.11 €/kg,
/// threshold €10, fee 5%) and these SKUs:
///
/// - `CLAIM-0` free claim
/// - `PAY-10` €10 through the gateway
/// - `GIFT-25` €25 gift card
/// - `ALLOC` merchant allocation
pub fn fixture() -> Fixture {
    fixture_with(LocalGateway::default())
}

pub fn fixture_with(gateway: LocalGateway) -> Fixture {
    let mut conn = reclaim_db::open_memory().expect("db");
    config::set(&mut conn, reclaim_types::config::MASTER_ID, "reclaim-eu", "fixture").expect("master id");
    for (code, mode, price) in [
        ("CLAIM-0", PaymentMode::Claim, 0),
        ("PAY-10", PaymentMode::Pay, 1000),
        ("GIFT-25", PaymentMode::GiftCard, 2500),
        ("ALLOC", PaymentMode::Allocation, 0),
    ] {
        skus::insert(
            &conn,
            &NewSku {
                code: code.into(),
                name: format!("{code} ocean cleanup"),
                payment_mode: mode,
                price,
                impact_multiplier: 1.0,
                requires_validation: false,
                corsair_threshold: None,
            },
        )
        .expect("sku");
    }

    let gateway = Arc::new(gateway);
    let dispatcher = Arc::new(RecordingDispatcher::default());
    let engine = SettlementEngine::new(
        Arc::new(Mutex::new(conn)),
        gateway.clone(),
        dispatcher.clone(),
        WEBHOOK_SECRET,
    );
    Fixture {
        engine: Arc::new(engine),
        gateway,
        dispatcher,
    }
}

pub fn standard_profile() -> Profile {
    Profile {
        first_name: Some("Ada".into()),
        last_name: Some("Lovelace".into()),
        terms_accepted: true,
        ..Profile::default()
    }
}

pub fn full_profile() -> Profile {
    Profile {
        date_of_birth: Some("1990-12-10".into()),
        address: Some(Address {
            street: "1 Harbour St".into(),
            city: "Lisbon".into(),
            postal_code: "1000-001".into(),
            country: "PT".into(),
        }),
        ..standard_profile()
    }
}

pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock")
        .as_secs()
}

/// A gateway event body and its `Stripe-Signature` header.
pub fn signed(event_id: &str, event_type: &str, object: serde_json::Value) -> (Vec<u8>, String) {
    let body = serde_json::to_vec(&serde_json::json!({
        "id": event_id,
        "type": event_type,
        "data": { "object": object },
    }))
    .expect("json");
    let header = reclaim_stripe::signature::sign(&body, WEBHOOK_SECRET, unix_now()).expect("sign");
    (body, header)
}

pub fn settled(outcome: PurchaseOutcome) -> Settlement {
    match outcome {
        PurchaseOutcome::Settled(s) => s,
        PurchaseOutcome::AwaitingPayment(p) => panic!("expected settlement, got pending {}", p.transaction.id),
    }
}

pub fn pending(outcome: PurchaseOutcome) -> PendingPayment {
    match outcome {
        PurchaseOutcome::AwaitingPayment(p) => p,
        PurchaseOutcome::Settled(s) => panic!("expected pending, got settled {}", s.transaction.id),
    }
}
