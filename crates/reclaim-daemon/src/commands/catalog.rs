//! Product catalog administration.

use std::sync::Arc;

use reclaim_db::queries::{merchants, skus};
use reclaim_settlement::SettlementError;
use reclaim_types::sku::NewSku;
use serde::Deserialize;
use serde_json::Value;

use super::{parse, to_json, Result};
use crate::DaemonState;

#[derive(Deserialize)]
struct SkuParams {
    code: String,
}

#[derive(Deserialize)]
struct ActiveParams {
    code: String,
    active: bool,
}

#[derive(Deserialize)]
struct MerchantParams {
    name: String,
    #[serde(default)]
    stripe_account_id: Option<String>,
}

/// Register a new SKU.
pub async fn create_sku(state: &Arc<DaemonState>, params: &Value) -> Result {
    let new: NewSku = parse(params)?;
    let db = state.db.lock().await;
    let sku = skus::insert(&db, &new).map_err(SettlementError::from)?;
    to_json(&sku)
}

pub async fn get_sku(state: &Arc<DaemonState>, params: &Value) -> Result {
    let p: SkuParams = parse(params)?;
    let db = state.db.lock().await;
    let sku = skus::get_by_code(&db, &p.code).map_err(SettlementError::from)?;
    to_json(&sku)
}

/// Retire or reactivate a SKU. Existing transactions are unaffected.
pub async fn set_sku_active(state: &Arc<DaemonState>, params: &Value) -> Result {
    let p: ActiveParams = parse(params)?;
    let db = state.db.lock().await;
    let sku = skus::get_by_code(&db, &p.code).map_err(SettlementError::from)?;
    skus::set_active(&db, &sku.id, p.active).map_err(SettlementError::from)?;
    let sku = skus::get_by_id(&db, &sku.id).map_err(SettlementError::from)?;
    to_json(&sku)
}

pub async fn create_merchant(state: &Arc<DaemonState>, params: &Value) -> Result {
    let p: MerchantParams = parse(params)?;
    let db = state.db.lock().await;
    let merchant = merchants::insert(&db, &p.name, p.stripe_account_id.as_deref()).map_err(SettlementError::from)?;
    to_json(&merchant)
}
