//! Operation workflow endpoints.

use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use chrono::{DateTime, NaiveDate, Utc};
use common::{ActorId, DamageId, LineId, OperationId, OwnerId};
use domain::{
    Action, Aggregate, CloseSummary, DamageRecord, Direction, Module, NewDamage, NewLine,
    OpenOperation, Operation, OperationLine, OperationQuery, OperationStatus, OperationTotals,
    TransportInfo,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use stock_store::{InventoryStore, MovementEntry};

use super::{parse_id, parse_optional_id};
use crate::auth::Actor;
use crate::error::ApiError;
use crate::state::AppState;

// -- Request types --

#[derive(Deserialize)]
pub struct OpenOperationRequest {
    pub direction: Direction,
    pub owner_id: OwnerId,
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub transport: Option<TransportInfo>,
}

#[derive(Deserialize)]
pub struct AddLineRequest {
    pub product_code: String,
    pub quantity: Decimal,
    #[serde(default)]
    pub lot: Option<String>,
    #[serde(default)]
    pub expiry_date: Option<NaiveDate>,
}

#[derive(Deserialize)]
pub struct RegisterDamageRequest {
    pub quantity: Decimal,
    pub damage_type: String,
    #[serde(default)]
    pub evidence_ref: Option<String>,
}

#[derive(Deserialize, Default)]
pub struct VoidRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Deserialize)]
pub struct ListOperationsParams {
    pub owner_id: Option<String>,
    pub status: Option<String>,
    pub direction: Option<String>,
    pub year: Option<i32>,
}

// -- Response types --

#[derive(Serialize)]
pub struct OperationCreatedResponse {
    pub operation_id: OperationId,
    pub reference_code: String,
    pub status: OperationStatus,
}

#[derive(Serialize)]
pub struct LineAddedResponse {
    pub line_id: LineId,
    pub status: OperationStatus,
}

#[derive(Serialize)]
pub struct DamageRegisteredResponse {
    pub damage_id: DamageId,
}

#[derive(Serialize)]
pub struct VoidedResponse {
    pub operation_id: OperationId,
    pub status: OperationStatus,
}

#[derive(Serialize)]
pub struct OperationResponse {
    pub id: Option<OperationId>,
    pub reference_code: String,
    pub owner_id: Option<OwnerId>,
    pub direction: Direction,
    pub status: OperationStatus,
    pub external_reference: Option<String>,
    pub transport: TransportInfo,
    pub lines: Vec<OperationLine>,
    pub damages: Vec<DamageRecord>,
    pub totals: OperationTotals,
    pub version: i64,
    pub opened_by: Option<ActorId>,
    pub created_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    pub closed_by: Option<ActorId>,
    pub voided_at: Option<DateTime<Utc>>,
    pub void_reason: Option<String>,
}

impl From<&Operation> for OperationResponse {
    fn from(operation: &Operation) -> Self {
        Self {
            id: operation.id(),
            reference_code: operation.reference_code().to_string(),
            owner_id: operation.owner_id(),
            direction: operation.direction(),
            status: operation.status(),
            external_reference: operation.external_reference().map(String::from),
            transport: operation.transport().clone(),
            lines: operation.lines().to_vec(),
            damages: operation.damages().to_vec(),
            totals: operation.totals().clone(),
            version: operation.version().as_i64(),
            opened_by: operation.opened_by(),
            created_at: operation.created_at(),
            closed_at: operation.closed_at(),
            closed_by: operation.closed_by(),
            voided_at: operation.voided_at(),
            void_reason: operation.void_reason().map(String::from),
        }
    }
}

// -- Handlers --

/// POST /operations: open a pending operation.
#[tracing::instrument(skip(state, actor, req))]
pub async fn create<S: InventoryStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    actor: Actor,
    Json(req): Json<OpenOperationRequest>,
) -> Result<(StatusCode, Json<OperationCreatedResponse>), ApiError> {
    actor.require(Module::Operations, Action::Create)?;

    let operation = state
        .workflow
        .open(
            OpenOperation {
                direction: req.direction,
                owner_id: req.owner_id,
                external_reference: req.reference,
                transport: req.transport.unwrap_or_default(),
            },
            actor.id,
        )
        .await?;

    let operation_id = operation
        .id()
        .ok_or_else(|| ApiError::Internal("opened operation has no id".to_string()))?;
    Ok((
        StatusCode::CREATED,
        Json(OperationCreatedResponse {
            operation_id,
            reference_code: operation.reference_code().to_string(),
            status: operation.status(),
        }),
    ))
}

/// GET /operations: list live operations.
#[tracing::instrument(skip(state, actor, params))]
pub async fn list<S: InventoryStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    actor: Actor,
    Query(params): Query<ListOperationsParams>,
) -> Result<Json<Vec<OperationResponse>>, ApiError> {
    actor.require(Module::Operations, Action::Read)?;

    let query = OperationQuery {
        owner_id: parse_optional_id("owner", params.owner_id.as_deref())?,
        status: params
            .status
            .as_deref()
            .map(str::parse::<OperationStatus>)
            .transpose()?,
        direction: params
            .direction
            .as_deref()
            .map(str::parse::<Direction>)
            .transpose()?,
        year: params.year,
    };
    let operations = state.workflow.list(query).await?;
    Ok(Json(operations.iter().map(OperationResponse::from).collect()))
}

/// GET /operations/{id}: load an operation with its lines and damages.
#[tracing::instrument(skip(state, actor))]
pub async fn get<S: InventoryStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    actor: Actor,
    Path(id): Path<String>,
) -> Result<Json<OperationResponse>, ApiError> {
    actor.require(Module::Operations, Action::Read)?;
    let operation = state.workflow.get(parse_id("operation", &id)?).await?;
    Ok(Json(OperationResponse::from(&operation)))
}

/// DELETE /operations/{id}: soft-delete a closed or voided operation.
#[tracing::instrument(skip(state, actor))]
pub async fn delete<S: InventoryStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    actor: Actor,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    actor.require(Module::Operations, Action::Delete)?;
    state
        .workflow
        .delete(parse_id("operation", &id)?, actor.id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /operations/{id}/lines: add a line; outbound lines reserve stock.
#[tracing::instrument(skip(state, actor, req))]
pub async fn add_line<S: InventoryStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    actor: Actor,
    Path(id): Path<String>,
    Json(req): Json<AddLineRequest>,
) -> Result<(StatusCode, Json<LineAddedResponse>), ApiError> {
    actor.require(Module::Operations, Action::Update)?;

    let (operation, line_id) = state
        .workflow
        .add_line(
            parse_id("operation", &id)?,
            NewLine {
                product_code: req.product_code,
                quantity: req.quantity,
                lot: req.lot,
                expiry_date: req.expiry_date,
            },
            actor.id,
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(LineAddedResponse {
            line_id,
            status: operation.status(),
        }),
    ))
}

/// POST /operations/{id}/lines/{line_id}/damages: register damaged units.
#[tracing::instrument(skip(state, actor, req))]
pub async fn register_damage<S: InventoryStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    actor: Actor,
    Path((id, line_id)): Path<(String, String)>,
    Json(req): Json<RegisterDamageRequest>,
) -> Result<(StatusCode, Json<DamageRegisteredResponse>), ApiError> {
    actor.require(Module::Operations, Action::Update)?;

    let (_, damage_id) = state
        .workflow
        .register_damage(
            parse_id("operation", &id)?,
            parse_id("line", &line_id)?,
            NewDamage {
                quantity: req.quantity,
                damage_type: req.damage_type,
                evidence_ref: req.evidence_ref,
            },
            actor.id,
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(DamageRegisteredResponse { damage_id }),
    ))
}

/// POST /operations/{id}/close: commit movements and close.
#[tracing::instrument(skip(state, actor))]
pub async fn close<S: InventoryStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    actor: Actor,
    Path(id): Path<String>,
) -> Result<Json<CloseSummary>, ApiError> {
    actor.require(Module::Operations, Action::Close)?;
    let summary = state
        .workflow
        .close(parse_id("operation", &id)?, actor.id)
        .await?;
    Ok(Json(summary))
}

/// POST /operations/{id}/void: void and release reservations.
///
/// The body is optional and may carry a `reason`.
#[tracing::instrument(skip(state, actor, body))]
pub async fn void<S: InventoryStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    actor: Actor,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<VoidedResponse>, ApiError> {
    actor.require(Module::Operations, Action::Void)?;

    let req: VoidRequest = if body.is_empty() {
        VoidRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ApiError::BadRequest(format!("Invalid void request: {e}")))?
    };

    let operation_id = parse_id("operation", &id)?;
    let operation = state
        .workflow
        .void(operation_id, actor.id, req.reason)
        .await?;

    Ok(Json(VoidedResponse {
        operation_id,
        status: operation.status(),
    }))
}

/// GET /operations/{id}/movements: ledger entries written by an operation.
#[tracing::instrument(skip(state, actor))]
pub async fn movements<S: InventoryStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    actor: Actor,
    Path(id): Path<String>,
) -> Result<Json<Vec<MovementEntry>>, ApiError> {
    actor.require(Module::Operations, Action::Read)?;
    let entries = state
        .workflow
        .movements(parse_id("operation", &id)?)
        .await?;
    Ok(Json(entries))
}
