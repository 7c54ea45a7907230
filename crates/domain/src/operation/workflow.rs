//! Operation workflow service.
//!
//! Loads an operation, runs a command against the aggregate, and commits the
//! new operation state together with every stock change the command implies
//! in one unit of work.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, NaiveDate, Utc};
use common::{ActorId, DamageId, LineId, OperationId, OwnerId, StockRecordId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use stock_store::{
    CommitOutcome, InventoryStore, InventoryStoreExt, LifecycleState, MovementDraft,
    MovementEntry, MovementKind, MovementQuery, OperationFilter, OperationRow, OperationWrite,
    StockChange, StockInit, StockKey, StockRecord, UnitOfWork, Version,
};

use crate::aggregate::Aggregate;
use crate::error::{DomainError, Result};
use crate::notify::{LogNotifier, Notification, OperationNotifier};
use crate::reservation::{HoldContext, commit_change, release_change, reserve_change};
use crate::retry::RetryPolicy;

use super::{Direction, OpenedData, Operation, OperationLine, OperationStatus, TransportInfo};

/// Input for opening an operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenOperation {
    pub direction: Direction,
    pub owner_id: OwnerId,
    #[serde(default)]
    pub external_reference: Option<String>,
    #[serde(default)]
    pub transport: TransportInfo,
}

/// Input for adding a line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewLine {
    pub product_code: String,
    pub quantity: Decimal,
    #[serde(default)]
    pub lot: Option<String>,
    #[serde(default)]
    pub expiry_date: Option<NaiveDate>,
}

/// Input for registering damage on a line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewDamage {
    pub quantity: Decimal,
    pub damage_type: String,
    #[serde(default)]
    pub evidence_ref: Option<String>,
}

/// Filter for listing operations. Soft-deleted operations are never listed.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OperationQuery {
    pub owner_id: Option<OwnerId>,
    pub status: Option<OperationStatus>,
    pub direction: Option<Direction>,
    pub year: Option<i32>,
}

/// Result of closing an operation.
#[derive(Debug, Clone, Serialize)]
pub struct CloseSummary {
    pub operation_id: OperationId,
    pub reference_code: String,
    pub direction: Direction,
    pub status: OperationStatus,
    pub closed_at: DateTime<Utc>,
    pub line_count: u32,
    pub good_units: Decimal,
    pub damaged_units: Decimal,
    pub movements: Vec<MovementEntry>,
}

/// Coordinates operation commands with the stock they move.
#[derive(Clone)]
pub struct OperationWorkflow<S: InventoryStore> {
    store: S,
    retry: RetryPolicy,
    notifier: Arc<dyn OperationNotifier>,
    recipients: Vec<String>,
}

impl<S: InventoryStore + Clone> OperationWorkflow<S> {
    /// Creates a workflow that logs close notifications.
    pub fn new(store: S) -> Self {
        Self {
            store,
            retry: RetryPolicy::default(),
            notifier: Arc::new(LogNotifier),
            recipients: Vec::new(),
        }
    }

    /// Sets the conflict retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Sets who is told about closed operations, and how.
    pub fn with_notifier(
        mut self,
        notifier: Arc<dyn OperationNotifier>,
        recipients: Vec<String>,
    ) -> Self {
        self.notifier = notifier;
        self.recipients = recipients;
        self
    }

    /// Returns a reference to the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Opens a pending operation and assigns its reference code.
    #[tracing::instrument(skip(self, input), fields(direction = %input.direction))]
    pub async fn open(&self, input: OpenOperation, actor_id: ActorId) -> Result<Operation> {
        let operation = self
            .retry
            .run("open_operation", || async {
                let mut operation = Operation::default();
                let events = operation.open(OpenedData {
                    operation_id: OperationId::new(),
                    owner_id: input.owner_id,
                    direction: input.direction,
                    external_reference: input.external_reference.clone(),
                    transport: input.transport.clone(),
                    opened_by: actor_id,
                    opened_at: Utc::now(),
                })?;
                operation.apply_events(events);

                let row = self
                    .store
                    .create_operation(operation.to_new_operation()?)
                    .await?;
                Operation::from_row(&row)
            })
            .await?;

        metrics::counter!("operations_opened_total", "direction" => input.direction.as_str())
            .increment(1);
        tracing::info!(reference = %operation.reference_code(), "operation opened");
        Ok(operation)
    }

    /// Retrieves an operation. Soft-deleted operations are not found.
    pub async fn get(&self, id: OperationId) -> Result<Operation> {
        let (operation, _) = self.load(id).await?;
        if operation.is_deleted() {
            return Err(DomainError::OperationNotFound(id));
        }
        Ok(operation)
    }

    /// Lists live operations ordered by year and sequence.
    pub async fn list(&self, query: OperationQuery) -> Result<Vec<Operation>> {
        let rows = self
            .store
            .list_operations(OperationFilter {
                owner_id: query.owner_id,
                status: query.status.map(|s| s.as_str().to_string()),
                direction: query.direction.map(|d| d.as_str().to_string()),
                year: query.year,
                include_deleted: false,
            })
            .await?;
        rows.iter().map(Operation::from_row).collect()
    }

    /// Every ledger entry written on behalf of an operation.
    pub async fn movements(&self, id: OperationId) -> Result<Vec<MovementEntry>> {
        self.store.require_operation(id).await?;
        Ok(self
            .store
            .query_movements(MovementQuery::new().operation(id))
            .await?)
    }

    /// Adds a line.
    ///
    /// Outbound lines reserve their quantity in the same commit; if the
    /// reservation fails the line is rejected and the operation is unchanged.
    /// Inbound lines never create stock records here; a product without a
    /// record gets one when the operation closes.
    #[tracing::instrument(skip(self, input), fields(product = %input.product_code, quantity = %input.quantity))]
    pub async fn add_line(
        &self,
        id: OperationId,
        input: NewLine,
        actor_id: ActorId,
    ) -> Result<(Operation, LineId)> {
        if input.product_code.trim().is_empty() {
            return Err(DomainError::InvalidInput(
                "product code is required".to_string(),
            ));
        }

        self.retry
            .run("add_line", || async {
                let (mut operation, row) = self.load(id).await?;
                operation.check_line(input.quantity)?;
                let owner_id = operation
                    .owner_id()
                    .ok_or(DomainError::OperationNotFound(id))?;

                let product_code = input.product_code.trim();
                let key = StockKey::new(owner_id, product_code, input.lot.clone());
                let existing = self.store.find_stock(&key).await?;

                let mut work = UnitOfWork::new();
                if operation.direction() == Direction::Outbound {
                    let record = existing.as_ref().ok_or_else(|| DomainError::NoStockRecord {
                        owner_id,
                        product_code: product_code.to_string(),
                        requested: input.quantity,
                    })?;
                    work.push_change(reserve_change(
                        record.id,
                        input.quantity,
                        record.version,
                        HoldContext::for_operation(actor_id, id),
                    ));
                }

                let line = OperationLine {
                    id: LineId::new(),
                    stock_record_id: existing.as_ref().map(|r| r.id),
                    product_code: key.product_code.clone(),
                    quantity: input.quantity,
                    damaged_quantity: Decimal::ZERO,
                    lot: key.lot.clone(),
                    expiry_date: input
                        .expiry_date
                        .or(existing.as_ref().and_then(|r| r.expiry_date)),
                };
                let line_id = line.id;

                let events = operation.add_line(line)?;
                operation.apply_events(events);

                let (operation, _) = self.persist(&operation, &row, work).await?;
                Ok((operation, line_id))
            })
            .await
            .inspect_err(|err| {
                if matches!(
                    err,
                    DomainError::InsufficientStock { .. } | DomainError::NoStockRecord { .. }
                ) {
                    metrics::counter!("reservations_rejected_total").increment(1);
                }
            })
    }

    /// Registers damaged units against a line of an in-progress operation.
    #[tracing::instrument(skip(self, input), fields(quantity = %input.quantity))]
    pub async fn register_damage(
        &self,
        id: OperationId,
        line_id: LineId,
        input: NewDamage,
        actor_id: ActorId,
    ) -> Result<(Operation, DamageId)> {
        self.retry
            .run("register_damage", || async {
                let (mut operation, row) = self.load(id).await?;
                let events = operation.register_damage(
                    line_id,
                    input.quantity,
                    &input.damage_type,
                    input.evidence_ref.clone(),
                    actor_id,
                    Utc::now(),
                )?;
                operation.apply_events(events);

                let (operation, _) = self.persist(&operation, &row, UnitOfWork::new()).await?;
                let damage_id = operation
                    .damages()
                    .last()
                    .map(|d| d.id)
                    .ok_or(DomainError::OperationNotFound(id))?;
                Ok((operation, damage_id))
            })
            .await
    }

    /// Closes an in-progress operation and commits its movements.
    ///
    /// Outbound lines issue their good units from the reservation. Damaged
    /// units have their hold released and are moved into the record's
    /// `damaged` sibling by a pair of adjustments. Inbound lines receive their
    /// good units, while damaged units are adjusted straight into the sibling.
    #[tracing::instrument(skip(self))]
    pub async fn close(&self, id: OperationId, actor_id: ActorId) -> Result<CloseSummary> {
        let started = Instant::now();

        let summary = self
            .retry
            .run("close_operation", || async {
                let (mut operation, row) = self.load(id).await?;
                let closed_at = Utc::now();
                let events = operation.close(actor_id, closed_at)?;
                operation.apply_events(events);

                let work = self.close_movements(&operation, actor_id).await?;
                let (operation, outcome) = self.persist(&operation, &row, work).await?;

                Ok(CloseSummary {
                    operation_id: id,
                    reference_code: operation.reference_code().to_string(),
                    direction: operation.direction(),
                    status: operation.status(),
                    closed_at,
                    line_count: operation.totals().line_count,
                    good_units: operation.totals().good_units(),
                    damaged_units: operation.totals().damaged_units,
                    movements: outcome.movements,
                })
            })
            .await?;

        metrics::histogram!("operation_close_duration_seconds")
            .record(started.elapsed().as_secs_f64());
        metrics::counter!("operations_closed_total", "direction" => summary.direction.as_str())
            .increment(1);
        tracing::info!(
            reference = %summary.reference_code,
            movements = summary.movements.len(),
            "operation closed"
        );

        self.dispatch(&summary);
        Ok(summary)
    }

    /// Voids a pending or in-progress operation, releasing outbound holds.
    #[tracing::instrument(skip(self, reason))]
    pub async fn void(
        &self,
        id: OperationId,
        actor_id: ActorId,
        reason: Option<String>,
    ) -> Result<Operation> {
        let operation = self
            .retry
            .run("void_operation", || async {
                let (mut operation, row) = self.load(id).await?;
                let events = operation.void(actor_id, Utc::now(), reason.clone())?;
                operation.apply_events(events);

                let mut work = UnitOfWork::new();
                if operation.direction() == Direction::Outbound {
                    let context = HoldContext::for_operation(actor_id, id);
                    let mut chain = VersionChain::new(&self.store);
                    for line in operation.lines() {
                        let Some(stock_id) = line.stock_record_id else {
                            continue;
                        };
                        let version = chain.next(stock_id).await?;
                        work.push_change(release_change(stock_id, line.quantity, version, context));
                    }
                }

                let (operation, _) = self.persist(&operation, &row, work).await?;
                Ok(operation)
            })
            .await?;

        metrics::counter!("operations_voided_total").increment(1);
        tracing::info!(reference = %operation.reference_code(), "operation voided");
        Ok(operation)
    }

    /// Soft-deletes a closed or voided operation.
    #[tracing::instrument(skip(self))]
    pub async fn delete(&self, id: OperationId, actor_id: ActorId) -> Result<Operation> {
        self.retry
            .run("delete_operation", || async {
                let (mut operation, row) = self.load(id).await?;
                let events = operation.delete(actor_id, Utc::now())?;
                operation.apply_events(events);
                let (operation, _) = self.persist(&operation, &row, UnitOfWork::new()).await?;
                Ok(operation)
            })
            .await
    }

    async fn load(&self, id: OperationId) -> Result<(Operation, OperationRow)> {
        let row = self.store.require_operation(id).await?;
        let operation = Operation::from_row(&row)?;
        Ok((operation, row))
    }

    /// Commits `work` together with the operation's new state.
    async fn persist(
        &self,
        operation: &Operation,
        current: &OperationRow,
        work: UnitOfWork,
    ) -> Result<(Operation, CommitOutcome)> {
        let write = OperationWrite::new(operation.to_row(current)?, current.version);
        let outcome = self.store.commit(work.with_operation(write)).await?;
        let row = outcome
            .operation
            .as_ref()
            .ok_or_else(|| DomainError::OperationNotFound(current.id))?;
        let written = Operation::from_row(row)?;
        Ok((written, outcome))
    }

    /// Builds the stock changes a close commits, chaining versions for
    /// records touched by more than one change.
    async fn close_movements(&self, operation: &Operation, actor_id: ActorId) -> Result<UnitOfWork> {
        let operation_id = operation
            .id()
            .ok_or_else(|| DomainError::InvalidInput("operation has no id".to_string()))?;
        let owner_id = operation
            .owner_id()
            .ok_or(DomainError::OperationNotFound(operation_id))?;
        let reference = operation.reference_code().to_string();
        let context = HoldContext::for_operation(actor_id, operation_id);
        let mut chain = VersionChain::new(&self.store);
        let mut work = UnitOfWork::new();

        for line in operation.lines() {
            let stock_id = match line.stock_record_id {
                Some(stock_id) => stock_id,
                None => {
                    self.store
                        .upsert_stock(
                            line.stock_key(owner_id),
                            StockInit {
                                expiry_date: line.expiry_date,
                                ..Default::default()
                            },
                        )
                        .await?
                        .id
                }
            };
            let good = line.good_quantity();
            let damaged = line.damaged_quantity;

            match operation.direction() {
                Direction::Outbound => {
                    if good > Decimal::ZERO {
                        let mut change =
                            commit_change(stock_id, good, chain.next(stock_id).await?, context);
                        change.movement = change.movement.reference(reference.clone());
                        work.push_change(change);
                    }
                    if damaged > Decimal::ZERO {
                        work.push_change(release_change(
                            stock_id,
                            damaged,
                            chain.next(stock_id).await?,
                            context,
                        ));
                        work.push_change(StockChange::new(
                            stock_id,
                            -damaged,
                            Decimal::ZERO,
                            chain.next(stock_id).await?,
                            damage_draft(actor_id, operation_id, &reference),
                        ));
                    }
                }
                Direction::Inbound => {
                    if good > Decimal::ZERO {
                        work.push_change(StockChange::new(
                            stock_id,
                            good,
                            Decimal::ZERO,
                            chain.next(stock_id).await?,
                            MovementDraft::new(MovementKind::Receipt, actor_id)
                                .operation(operation_id)
                                .reference(reference.clone()),
                        ));
                    }
                }
            }

            if damaged > Decimal::ZERO {
                let source = chain.record(stock_id).await?;
                let sibling = self
                    .store
                    .upsert_stock(
                        source.key().with_state(LifecycleState::Damaged),
                        StockInit {
                            location: source.location.clone(),
                            expiry_date: source.expiry_date,
                            unit_cost: source.unit_cost,
                            ..Default::default()
                        },
                    )
                    .await?;
                work.push_change(StockChange::new(
                    sibling.id,
                    damaged,
                    Decimal::ZERO,
                    chain.next(sibling.id).await?,
                    damage_draft(actor_id, operation_id, &reference),
                ));
            }
        }

        Ok(work)
    }

    fn dispatch(&self, summary: &CloseSummary) {
        if self.recipients.is_empty() {
            return;
        }

        let notifier = Arc::clone(&self.notifier);
        let notification = Notification {
            operation_reference: summary.reference_code.clone(),
            recipients: self.recipients.clone(),
            summary: summary.clone(),
        };
        tokio::spawn(async move {
            let reference = notification.operation_reference.clone();
            if let Err(err) = notifier.notify(notification).await {
                tracing::warn!(reference = %reference, error = %err, "close notification failed");
            }
        });
    }
}

fn damage_draft(actor_id: ActorId, operation_id: OperationId, reference: &str) -> MovementDraft {
    MovementDraft::new(MovementKind::Adjustment, actor_id)
        .operation(operation_id)
        .reference(reference)
        .reason("damaged")
}

/// Tracks the version each record will have when the next change in a unit
/// of work reaches it.
struct VersionChain<'a, S> {
    store: &'a S,
    records: HashMap<StockRecordId, StockRecord>,
    versions: HashMap<StockRecordId, Version>,
}

impl<'a, S: InventoryStore> VersionChain<'a, S> {
    fn new(store: &'a S) -> Self {
        Self {
            store,
            records: HashMap::new(),
            versions: HashMap::new(),
        }
    }

    /// The record as it was before this unit of work.
    async fn record(&mut self, id: StockRecordId) -> Result<StockRecord> {
        if let Some(record) = self.records.get(&id) {
            return Ok(record.clone());
        }
        let record = self.store.require_stock(id).await?;
        self.records.insert(id, record.clone());
        Ok(record)
    }

    /// Expected version for the next change against `id`.
    async fn next(&mut self, id: StockRecordId) -> Result<Version> {
        if let Some(version) = self.versions.get_mut(&id) {
            *version = version.next();
            return Ok(*version);
        }
        let version = self.record(id).await?.version;
        self.versions.insert(id, version);
        Ok(version)
    }
}
