//! The settlement engine.
//!
//! Every mutating operation runs as one `BEGIN IMMEDIATE` transaction on the
//! shared connection, so writers are serialized on the database lock and a
//! failure anywhere rolls the whole operation back. Notifications go out only
//! after commit.
//!
//! PAY purchases are split around the gateway call so that no database lock
//! is held while waiting on the network:
//!
//! 1. under the lock: snapshot config, resolve SKU and merchant, validate the
//!    buyer's data; nothing is written
//! 2. without the lock: open the intent or session, carrying `checkout_ref`
//! 3. under the lock: resolve or escalate the user, insert the pending row

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use reclaim_db::queries::{config, gift_cards, merchants, skus, transactions, users, wallets};
use reclaim_types::config::{ConfigChange, ConfigSnapshot};
use reclaim_types::gift_card::GiftCardCode;
use reclaim_types::sku::{Merchant, PaymentMode, Sku};
use reclaim_types::transaction::{NewTransaction, PaymentStatus, Transaction};
use reclaim_types::user::{Profile, RegistrationLevel, User};
use reclaim_types::wallet::{OwnerType, Wallet, WalletAdjustment};
use reclaim_types::{Cents, Grams, MerchantId, UserId};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::dispatcher::SideEffectDispatcher;
use crate::gateway::{CheckoutHandle, CheckoutRequest, GatewayError, PaymentEvent, PaymentGateway, TRANSACTION_REF_KEY};
use crate::ledger::{self, Notification};
use crate::modes::{self, Pricing};
use crate::tiers::{self, Identity};
use crate::webhook::{self, WebhookOutcome};
use crate::{fees, impact, Result, SettlementError};

/// Default bound on a single gateway call.
pub const DEFAULT_GATEWAY_TIMEOUT: Duration = Duration::from_secs(15);

/// Default page size for transaction listings.
pub const DEFAULT_LIST_LIMIT: u32 = 50;

/// A purchase of one SKU.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PurchaseRequest {
    pub sku_code: String,
    /// Existing user. Takes precedence over `email`.
    #[serde(default)]
    pub user_id: Option<UserId>,
    #[serde(default)]
    pub email: Option<String>,
    /// Buyer data; merged over what is already stored.
    #[serde(default)]
    pub profile: Profile,
    /// Required for ALLOCATION, ignored otherwise.
    #[serde(default)]
    pub amount: Option<Cents>,
    /// Required for GIFT_CARD.
    #[serde(default)]
    pub gift_card_code: Option<String>,
    #[serde(default)]
    pub merchant_id: Option<MerchantId>,
    #[serde(default)]
    pub partner_id: Option<String>,
    #[serde(default)]
    pub order_id: Option<String>,
}

/// An administrator recording an off-platform purchase.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ManualTransactionRequest {
    pub sku_code: String,
    #[serde(default)]
    pub user_id: Option<UserId>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub profile: Profile,
    pub amount: Cents,
    pub created_by: String,
    #[serde(default)]
    pub merchant_id: Option<MerchantId>,
    #[serde(default)]
    pub partner_id: Option<String>,
    #[serde(default)]
    pub order_id: Option<String>,
}

/// A transaction that took effect immediately.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Settlement {
    pub transaction: Transaction,
    pub user: User,
    pub wallet: Wallet,
}

/// A PAY transaction waiting for the gateway's confirmation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PendingPayment {
    pub transaction: Transaction,
    pub checkout: CheckoutHandle,
}

/// Result of [`SettlementEngine::create_transaction`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PurchaseOutcome {
    Settled(Settlement),
    AwaitingPayment(PendingPayment),
}

/// Everything decided before anything is written.
#[derive(Clone, Debug)]
struct Prepared {
    snapshot: ConfigSnapshot,
    sku: Sku,
    pricing: Pricing,
    impact: Grams,
    threshold: Cents,
    required: RegistrationLevel,
    merchant: Option<Merchant>,
}

/// Fields of a transaction supplied by the caller rather than derived.
struct Recording<'a> {
    identity: Identity<'a>,
    profile: &'a Profile,
    gift_card_code: Option<&'a str>,
    partner_id: Option<String>,
    order_id: Option<String>,
    checkout_ref: String,
    gateway_reference: Option<String>,
    application_fee: Option<Cents>,
    created_by: Option<String>,
}

struct Recorded {
    transaction: Transaction,
    user: User,
    wallet: Option<Wallet>,
    notification: Option<Notification>,
}

enum Phase {
    Recorded(Recorded),
    Checkout(Prepared),
}

/// Orchestrates pricing, user resolution, ledger updates and confirmations.
pub struct SettlementEngine {
    db: Arc<Mutex<Connection>>,
    gateway: Arc<dyn PaymentGateway>,
    dispatcher: Arc<dyn SideEffectDispatcher>,
    webhook_secret: String,
    gateway_timeout: Duration,
}

impl SettlementEngine {
    pub fn new(
        db: Arc<Mutex<Connection>>,
        gateway: Arc<dyn PaymentGateway>,
        dispatcher: Arc<dyn SideEffectDispatcher>,
        webhook_secret: impl Into<String>,
    ) -> Self {
        Self {
            db,
            gateway,
            dispatcher,
            webhook_secret: webhook_secret.into(),
            gateway_timeout: DEFAULT_GATEWAY_TIMEOUT,
        }
    }

    /// Bound each gateway call by `timeout`.
    pub fn with_gateway_timeout(mut self, timeout: Duration) -> Self {
        self.gateway_timeout = timeout;
        self
    }

    /// Shared database handle.
    pub fn db(&self) -> &Arc<Mutex<Connection>> {
        &self.db
    }

    /// Create a transaction for a purchase.
    ///
    /// CLAIM, GIFT_CARD and ALLOCATION purchases settle immediately. PAY
    /// purchases return a pending transaction plus the gateway handle.
    ///
    /// # Errors
    ///
    /// - [`SettlementError::NotFound`] / [`SettlementError::Inactive`] for the SKU
    /// - [`SettlementError::Validation`] for missing buyer data or inputs
    /// - [`SettlementError::Conflict`] if the gift card is already used
    /// - [`SettlementError::Config`] if global configuration is unusable
    /// - [`SettlementError::ExternalService`] if the gateway fails (retryable)
    pub async fn create_transaction(&self, request: PurchaseRequest) -> Result<PurchaseOutcome> {
        let identity = Identity {
            user_id: request.user_id.as_deref(),
            email: request.email.as_deref(),
        };

        let phase = {
            let mut conn = self.db.lock().await;
            let tx = reclaim_db::begin_immediate(&mut conn)?;
            let prepared = prepare(
                &tx,
                &request.sku_code,
                request.merchant_id.as_deref(),
                PricingSource::Requested {
                    amount: request.amount,
                    gift_card_code: request.gift_card_code.as_deref(),
                },
            )?;

            if prepared.pricing.status == PaymentStatus::Pending {
                // Validate the buyer now so a doomed purchase never reaches
                // the gateway. The read transaction rolls back on drop.
                tiers::plan(&tx, identity, prepared.required, &request.profile)?;
                Phase::Checkout(prepared)
            } else {
                let recorded = record(
                    &tx,
                    &prepared,
                    Recording {
                        identity,
                        profile: &request.profile,
                        gift_card_code: request.gift_card_code.as_deref(),
                        partner_id: request.partner_id.clone(),
                        order_id: request.order_id.clone(),
                        checkout_ref: reclaim_db::new_id(),
                        gateway_reference: None,
                        application_fee: None,
                        created_by: None,
                    },
                )?;
                tx.commit()?;
                Phase::Recorded(recorded)
            }
        };

        match phase {
            Phase::Recorded(recorded) => Ok(PurchaseOutcome::Settled(self.finish(recorded)?)),
            Phase::Checkout(prepared) => self.open_checkout(&request, identity, prepared).await,
        }
    }

    async fn open_checkout(
        &self,
        request: &PurchaseRequest,
        identity: Identity<'_>,
        prepared: Prepared,
    ) -> Result<PurchaseOutcome> {
        let checkout_ref = reclaim_db::new_id();
        let destination = prepared
            .merchant
            .as_ref()
            .and_then(|m| m.stripe_account_id.clone());
        let application_fee = match destination {
            Some(_) => Some(fees::split(prepared.pricing.amount, prepared.snapshot.platform_fee_fraction)?.platform),
            None => None,
        };

        let mut metadata = BTreeMap::new();
        metadata.insert(TRANSACTION_REF_KEY.to_string(), checkout_ref.clone());
        metadata.insert("sku_code".to_string(), prepared.sku.code.clone());
        metadata.insert("master_id".to_string(), prepared.snapshot.master_id.clone());
        if let Some(merchant) = &prepared.merchant {
            metadata.insert("merchant_id".to_string(), merchant.id.clone());
        }
        if let Some(partner_id) = &request.partner_id {
            metadata.insert("partner_id".to_string(), partner_id.clone());
        }
        if let Some(order_id) = &request.order_id {
            metadata.insert("order_id".to_string(), order_id.clone());
        }

        let checkout_request = CheckoutRequest {
            amount: prepared.pricing.amount,
            description: prepared.sku.name.clone(),
            destination_account: destination,
            application_fee,
            customer_email: request.email.clone(),
            metadata,
        };

        let call = self.gateway.create_intent_or_session(&checkout_request);
        let checkout = match tokio::time::timeout(self.gateway_timeout, call).await {
            Ok(Ok(handle)) => handle,
            Ok(Err(e)) => {
                tracing::warn!(sku = %prepared.sku.code, error = %e, "gateway checkout failed");
                return Err(e.into());
            }
            Err(_) => {
                tracing::warn!(sku = %prepared.sku.code, timeout = ?self.gateway_timeout, "gateway checkout timed out");
                return Err(GatewayError::Timeout(self.gateway_timeout).into());
            }
        };

        let recorded = {
            let mut conn = self.db.lock().await;
            let tx = reclaim_db::begin_immediate(&mut conn)?;
            let recorded = record(
                &tx,
                &prepared,
                Recording {
                    identity,
                    profile: &request.profile,
                    gift_card_code: None,
                    partner_id: request.partner_id.clone(),
                    order_id: request.order_id.clone(),
                    checkout_ref,
                    gateway_reference: Some(checkout.id.clone()),
                    application_fee,
                    created_by: None,
                },
            )
            .inspect_err(|e| {
                tracing::warn!(
                    gateway_reference = %checkout.id,
                    error = %e,
                    "checkout opened but transaction not recorded"
                );
            })?;
            tx.commit()?;
            recorded
        };

        tracing::info!(
            transaction_id = %recorded.transaction.id,
            gateway_reference = %checkout.id,
            amount = recorded.transaction.amount,
            "awaiting payment"
        );
        Ok(PurchaseOutcome::AwaitingPayment(PendingPayment {
            transaction: recorded.transaction,
            checkout,
        }))
    }

    /// Record an off-platform purchase. Always settles as `completed`.
    ///
    /// # Errors
    ///
    /// - [`SettlementError::InvalidAmount`] if `amount` is zero
    /// - [`SettlementError::Validation`] if `created_by` is empty or buyer
    ///   data is missing
    pub async fn create_manual_transaction(&self, request: ManualTransactionRequest) -> Result<Settlement> {
        if request.amount == 0 {
            return Err(SettlementError::InvalidAmount("manual transaction amount must be > 0".into()));
        }
        let created_by = request.created_by.trim();
        if created_by.is_empty() {
            return Err(SettlementError::Validation("created_by is required".into()));
        }

        let mut conn = self.db.lock().await;
        let tx = reclaim_db::begin_immediate(&mut conn)?;
        let prepared = prepare(
            &tx,
            &request.sku_code,
            request.merchant_id.as_deref(),
            PricingSource::Fixed(Pricing {
                amount: request.amount,
                status: PaymentStatus::Completed,
            }),
        )?;
        let recorded = record(
            &tx,
            &prepared,
            Recording {
                identity: Identity {
                    user_id: request.user_id.as_deref(),
                    email: request.email.as_deref(),
                },
                profile: &request.profile,
                gift_card_code: None,
                partner_id: request.partner_id.clone(),
                order_id: request.order_id.clone(),
                checkout_ref: reclaim_db::new_id(),
                gateway_reference: None,
                application_fee: None,
                created_by: Some(created_by.to_string()),
            },
        )?;
        tx.commit()?;
        drop(conn);
        self.finish(recorded)
    }

    /// Verify and apply a raw gateway webhook.
    ///
    /// # Errors
    ///
    /// - [`SettlementError::Unauthorized`] if the signature does not verify
    /// - [`SettlementError::Validation`] if the body cannot be parsed
    pub async fn handle_webhook(&self, raw_body: &[u8], signature: &str) -> Result<WebhookOutcome> {
        let event = self
            .gateway
            .verify_and_parse_webhook(raw_body, signature, &self.webhook_secret)
            .map_err(|e| {
                tracing::warn!(error = %e, "webhook rejected");
                SettlementError::from(e)
            })?;
        self.apply_payment_event(&event).await
    }

    /// Apply an already-verified payment event.
    pub async fn apply_payment_event(&self, event: &PaymentEvent) -> Result<WebhookOutcome> {
        let applied = {
            let mut conn = self.db.lock().await;
            let tx = reclaim_db::begin_immediate(&mut conn)?;
            let applied = webhook::apply(&tx, event)?;
            tx.commit()?;
            applied
        };
        if let Some(notification) = &applied.notification {
            notification.deliver(self.dispatcher.as_ref());
        }
        Ok(applied.outcome)
    }

    pub async fn get_transaction(&self, id: &str) -> Result<Transaction> {
        let conn = self.db.lock().await;
        Ok(transactions::get(&conn, id)?)
    }

    /// Transactions of a user, newest first.
    pub async fn list_user_transactions(&self, user_id: &str, limit: Option<u32>) -> Result<Vec<Transaction>> {
        let conn = self.db.lock().await;
        users::get_by_id(&conn, user_id)?;
        Ok(transactions::list_for_user(
            &conn,
            user_id,
            limit.unwrap_or(DEFAULT_LIST_LIMIT),
        )?)
    }

    pub async fn get_wallet(&self, owner_id: &str, owner_type: OwnerType) -> Result<Wallet> {
        let conn = self.db.lock().await;
        Ok(wallets::get(&conn, owner_id, owner_type)?)
    }

    /// Adjustments recorded on a user's wallet, newest first.
    pub async fn list_adjustments(&self, user_id: &str) -> Result<Vec<WalletAdjustment>> {
        let conn = self.db.lock().await;
        let wallet = wallets::get(&conn, user_id, OwnerType::User)?;
        Ok(wallets::adjustments(&conn, &wallet.id)?)
    }

    /// Spend impact from a wallet.
    pub async fn redeem_impact(&self, owner_id: &str, owner_type: OwnerType, grams: Grams) -> Result<Wallet> {
        let mut conn = self.db.lock().await;
        let tx = reclaim_db::begin_immediate(&mut conn)?;
        let wallet = wallets::redeem(&tx, owner_id, owner_type, grams)?;
        tx.commit()?;
        Ok(wallet)
    }

    /// Administrative correction of a user's balance.
    pub async fn adjust_wallet(
        &self,
        user_id: &str,
        delta_grams: i64,
        reason: &str,
        adjusted_by: &str,
    ) -> Result<(Wallet, WalletAdjustment)> {
        let mut conn = self.db.lock().await;
        let tx = reclaim_db::begin_immediate(&mut conn)?;
        let adjusted = wallets::adjust(&tx, user_id, delta_grams, reason, adjusted_by)?;
        tx.commit()?;
        Ok(adjusted)
    }

    /// Check a gift card without consuming it.
    pub async fn validate_gift_card(&self, code: &str, sku_code: Option<&str>) -> Result<GiftCardCode> {
        let conn = self.db.lock().await;
        let sku_id = match sku_code {
            Some(sku_code) => Some(skus::get_by_code(&conn, sku_code)?.id),
            None => None,
        };
        Ok(gift_cards::validate(&conn, code, sku_id.as_deref())?)
    }

    /// Void an unused gift card.
    pub async fn invalidate_gift_card(&self, code: &str) -> Result<GiftCardCode> {
        let mut conn = self.db.lock().await;
        let tx = reclaim_db::begin_immediate(&mut conn)?;
        let card = gift_cards::invalidate(&tx, code)?;
        tx.commit()?;
        Ok(card)
    }

    /// Generate `count` new codes for a GIFT_CARD SKU.
    pub async fn issue_gift_cards(&self, sku_code: &str, count: u32) -> Result<Vec<GiftCardCode>> {
        let mut conn = self.db.lock().await;
        let tx = reclaim_db::begin_immediate(&mut conn)?;
        let sku = modes::resolve_sku(&tx, sku_code)?;
        let cards = gift_cards::issue(&tx, &sku.id, count)?;
        tx.commit()?;
        Ok(cards)
    }

    /// Raw configuration rows, or one key.
    pub async fn get_config(&self, key: Option<&str>) -> Result<Vec<(String, String)>> {
        let conn = self.db.lock().await;
        match key {
            Some(key) => Ok(vec![(key.to_string(), config::get(&conn, key)?)]),
            None => Ok(config::list(&conn)?),
        }
    }

    /// Validated view of the configuration.
    pub async fn config_snapshot(&self) -> Result<ConfigSnapshot> {
        let conn = self.db.lock().await;
        Ok(config::snapshot(&conn)?)
    }

    /// Change a configuration value and record the change.
    pub async fn set_config(&self, key: &str, value: &str, changed_by: &str) -> Result<()> {
        let mut conn = self.db.lock().await;
        Ok(config::set(&mut conn, key, value, changed_by)?)
    }

    pub async fn config_history(&self, key: Option<&str>, limit: u32) -> Result<Vec<ConfigChange>> {
        let conn = self.db.lock().await;
        Ok(config::history(&conn, key, limit)?)
    }

    fn finish(&self, recorded: Recorded) -> Result<Settlement> {
        let wallet = recorded.wallet.ok_or_else(|| {
            SettlementError::Storage(format!(
                "transaction '{}' settled without a wallet credit",
                recorded.transaction.id
            ))
        })?;
        tracing::info!(
            transaction_id = %recorded.transaction.id,
            user_id = %recorded.user.id,
            status = %recorded.transaction.payment_status,
            amount = recorded.transaction.amount,
            impact = recorded.transaction.calculated_impact,
            balance = wallet.current_balance,
            "transaction settled"
        );
        if let Some(notification) = &recorded.notification {
            notification.deliver(self.dispatcher.as_ref());
        }
        Ok(Settlement {
            transaction: recorded.transaction,
            user: recorded.user,
            wallet,
        })
    }
}

enum PricingSource<'a> {
    /// Let the SKU's payment mode decide.
    Requested {
        amount: Option<Cents>,
        gift_card_code: Option<&'a str>,
    },
    /// Admin-supplied amount and status.
    Fixed(Pricing),
}

fn prepare(
    conn: &Connection,
    sku_code: &str,
    merchant_id: Option<&str>,
    source: PricingSource<'_>,
) -> Result<Prepared> {
    let snapshot = config::snapshot(conn)?;
    let sku = modes::resolve_sku(conn, sku_code)?;
    let pricing = match source {
        PricingSource::Requested { amount, gift_card_code } => {
            let pricing = modes::price(&sku, amount, gift_card_code)?;
            if let (PaymentMode::GiftCard, Some(code)) = (sku.payment_mode, gift_card_code) {
                gift_cards::validate(conn, code, Some(&sku.id))?;
            }
            pricing
        }
        PricingSource::Fixed(pricing) => pricing,
    };
    let impact = impact::impact_grams(pricing.amount, snapshot.csr_price_per_kg, sku.impact_multiplier)?;
    let threshold = sku.corsair_threshold.unwrap_or(snapshot.corsair_threshold);
    let required = tiers::required_level(pricing.amount, threshold, sku.requires_validation);
    let merchant = merchant_id.map(|id| merchants::get(conn, id)).transpose()?;

    Ok(Prepared {
        snapshot,
        sku,
        pricing,
        impact,
        threshold,
        required,
        merchant,
    })
}

fn record(conn: &Connection, prepared: &Prepared, recording: Recording<'_>) -> Result<Recorded> {
    let user = tiers::resolve_user(conn, recording.identity, prepared.required, recording.profile)?;

    let gift_card_code_id = match (prepared.sku.payment_mode, recording.gift_card_code) {
        (PaymentMode::GiftCard, Some(code)) => Some(gift_cards::redeem_and_bind(conn, code, &user.id)?.id),
        _ => None,
    };

    let transaction = transactions::insert(
        conn,
        &NewTransaction {
            user_id: user.id.clone(),
            sku_id: prepared.sku.id.clone(),
            master_id: prepared.snapshot.master_id.clone(),
            merchant_id: prepared.merchant.as_ref().map(|m| m.id.clone()),
            partner_id: recording.partner_id,
            order_id: recording.order_id,
            amount: prepared.pricing.amount,
            calculated_impact: prepared.impact,
            payment_status: prepared.pricing.status,
            checkout_ref: recording.checkout_ref,
            gateway_reference: recording.gateway_reference,
            application_fee: recording.application_fee,
            gift_card_code_id,
            corsair_connect_flag: prepared.pricing.amount >= prepared.threshold,
            corsair_threshold: prepared.threshold,
            created_by: recording.created_by,
        },
    )?;

    if !transaction.payment_status.is_settled_credit() {
        return Ok(Recorded {
            transaction,
            user,
            wallet: None,
            notification: None,
        });
    }

    let credited = ledger::credit_settled(conn, &transaction, &user)?;
    Ok(Recorded {
        transaction,
        user: credited.user,
        wallet: Some(credited.wallet),
        notification: credited.notification,
    })
}
