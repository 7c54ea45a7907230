//! Stock record, ledger and alert endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use chrono::{DateTime, NaiveDate, Utc};
use common::OwnerId;
use domain::{
    Action, Adjustment, AlertKind, HistoryFilter, HistoryPage, Module, MonthlyTotals, PageToken,
    StockAlert,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use stock_store::{
    InventoryStore, MovementKind, StockFilter, StockInit, StockKey, StockRecord, StockSettings,
    Version,
};

use super::{parse_id, parse_optional_id};
use crate::auth::Actor;
use crate::error::ApiError;
use crate::state::AppState;

/// Default window for the monthly aggregate, in months.
const DEFAULT_MONTHS: u32 = 12;

// -- Request types --

#[derive(Deserialize)]
pub struct CreateStockRequest {
    pub owner_id: OwnerId,
    pub product_code: String,
    #[serde(default)]
    pub lot: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub minimum_threshold: Option<Decimal>,
    #[serde(default)]
    pub maximum_threshold: Option<Decimal>,
    #[serde(default)]
    pub expiry_date: Option<NaiveDate>,
    #[serde(default)]
    pub unit_cost: Option<Decimal>,
}

#[derive(Deserialize)]
pub struct UpdateSettingsRequest {
    #[serde(default)]
    pub minimum_threshold: Option<Decimal>,
    #[serde(default)]
    pub maximum_threshold: Option<Decimal>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub unit_cost: Option<Decimal>,
    #[serde(default)]
    pub expiry_date: Option<NaiveDate>,
    #[serde(default)]
    pub expected_version: Option<i64>,
}

#[derive(Deserialize)]
pub struct AdjustRequest {
    pub quantity_delta: Decimal,
    pub reason: String,
    #[serde(default)]
    pub reference: Option<String>,
}

#[derive(Deserialize)]
pub struct ListStockParams {
    pub owner_id: Option<String>,
}

#[derive(Deserialize)]
pub struct HistoryParams {
    pub page_token: Option<String>,
    pub limit: Option<usize>,
    /// Comma-separated movement kinds.
    pub kind: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
pub struct MonthlyParams {
    pub months: Option<u32>,
}

#[derive(Deserialize)]
pub struct AlertParams {
    pub owner_id: Option<String>,
    #[serde(rename = "type")]
    pub kind: String,
    pub horizon_days: Option<u32>,
}

// -- Response types --

#[derive(Serialize)]
pub struct StockResponse {
    #[serde(flatten)]
    pub record: StockRecord,
    pub available_quantity: Decimal,
    pub low_stock: bool,
}

impl From<StockRecord> for StockResponse {
    fn from(record: StockRecord) -> Self {
        Self {
            available_quantity: record.available_quantity(),
            low_stock: record.is_low_stock(),
            record,
        }
    }
}

// -- Handlers --

/// POST /stock: return the record for (owner, product, lot), creating it empty.
#[tracing::instrument(skip(state, actor, req))]
pub async fn create<S: InventoryStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    actor: Actor,
    Json(req): Json<CreateStockRequest>,
) -> Result<Json<StockResponse>, ApiError> {
    actor.require(Module::Stock, Action::Create)?;

    if req.product_code.trim().is_empty() {
        return Err(ApiError::BadRequest("product_code is required".to_string()));
    }

    let key = StockKey::new(req.owner_id, req.product_code.trim(), req.lot);
    let init = StockInit {
        location: req.location.unwrap_or_default(),
        minimum_threshold: req.minimum_threshold.unwrap_or(Decimal::ZERO),
        maximum_threshold: req.maximum_threshold,
        expiry_date: req.expiry_date,
        unit_cost: req.unit_cost,
    };
    let record = state.stock.upsert(key, init).await?;
    Ok(Json(record.into()))
}

/// GET /stock: list records, optionally for one owner.
#[tracing::instrument(skip(state, actor, params))]
pub async fn list<S: InventoryStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    actor: Actor,
    Query(params): Query<ListStockParams>,
) -> Result<Json<Vec<StockResponse>>, ApiError> {
    actor.require(Module::Stock, Action::Read)?;
    let owner_id = parse_optional_id("owner", params.owner_id.as_deref())?;
    let records = state.stock.list(StockFilter::for_owner(owner_id)).await?;
    Ok(Json(records.into_iter().map(StockResponse::from).collect()))
}

/// GET /stock/{id}
#[tracing::instrument(skip(state, actor))]
pub async fn get<S: InventoryStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    actor: Actor,
    Path(id): Path<String>,
) -> Result<Json<StockResponse>, ApiError> {
    actor.require(Module::Stock, Action::Read)?;
    let record = state.stock.get(parse_id("stock record", &id)?).await?;
    Ok(Json(record.into()))
}

/// PUT /stock/{id}/settings: thresholds, location, cost and expiry.
#[tracing::instrument(skip(state, actor, req))]
pub async fn update_settings<S: InventoryStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    actor: Actor,
    Path(id): Path<String>,
    Json(req): Json<UpdateSettingsRequest>,
) -> Result<Json<StockResponse>, ApiError> {
    actor.require(Module::Stock, Action::Update)?;

    let settings = StockSettings {
        minimum_threshold: req.minimum_threshold,
        maximum_threshold: req.maximum_threshold,
        location: req.location,
        unit_cost: req.unit_cost,
        expiry_date: req.expiry_date,
    };
    let record = state
        .stock
        .update_settings(
            parse_id("stock record", &id)?,
            settings,
            req.expected_version.map(Version::new),
        )
        .await?;
    Ok(Json(record.into()))
}

/// POST /stock/{id}/adjust: manual correction with a reason.
#[tracing::instrument(skip(state, actor, req))]
pub async fn adjust<S: InventoryStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    actor: Actor,
    Path(id): Path<String>,
    Json(req): Json<AdjustRequest>,
) -> Result<Json<StockResponse>, ApiError> {
    actor.require(Module::Stock, Action::Update)?;

    let record = state
        .stock
        .adjust(
            parse_id("stock record", &id)?,
            Adjustment {
                quantity_delta: req.quantity_delta,
                reason: req.reason,
                reference: req.reference,
            },
            actor.id,
        )
        .await?;
    Ok(Json(record.into()))
}

/// GET /stock/{id}/movements: one page of ledger history.
#[tracing::instrument(skip(state, actor, params))]
pub async fn movements<S: InventoryStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    actor: Actor,
    Path(id): Path<String>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<HistoryPage>, ApiError> {
    actor.require(Module::Stock, Action::Read)?;

    let kinds = params
        .kind
        .as_deref()
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(|k| {
                    k.parse::<MovementKind>()
                        .map_err(|e| ApiError::BadRequest(e.to_string()))
                })
                .collect::<Result<Vec<_>, _>>()
        })
        .transpose()?;
    let page_token = params
        .page_token
        .as_deref()
        .map(str::parse::<PageToken>)
        .transpose()?;

    let page = state
        .ledger
        .history(
            parse_id("stock record", &id)?,
            HistoryFilter {
                kinds,
                from: params.from,
                to: params.to,
            },
            page_token,
            params.limit,
        )
        .await?;
    Ok(Json(page))
}

/// GET /stock/{id}/monthly: receipt and issue totals per calendar month.
#[tracing::instrument(skip(state, actor, params))]
pub async fn monthly<S: InventoryStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    actor: Actor,
    Path(id): Path<String>,
    Query(params): Query<MonthlyParams>,
) -> Result<Json<Vec<MonthlyTotals>>, ApiError> {
    actor.require(Module::Stock, Action::Read)?;
    let totals = state
        .ledger
        .monthly_aggregate(
            parse_id("stock record", &id)?,
            params.months.unwrap_or(DEFAULT_MONTHS),
        )
        .await?;
    Ok(Json(totals))
}

/// GET /stock/alerts: low stock, near expiry or expired records.
#[tracing::instrument(skip(state, actor, params))]
pub async fn alerts<S: InventoryStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    actor: Actor,
    Query(params): Query<AlertParams>,
) -> Result<Json<Vec<StockAlert>>, ApiError> {
    actor.require(Module::Alerts, Action::Read)?;

    let kind: AlertKind = params.kind.parse()?;
    let owner_id = parse_optional_id("owner", params.owner_id.as_deref())?;
    let horizon = params.horizon_days.unwrap_or(state.near_expiry_days);
    let alerts = state.alerts.evaluate(kind, owner_id, horizon).await?;
    Ok(Json(alerts))
}
