use std::collections::HashMap;

use async_trait::async_trait;
use common::{OperationId, StockRecordId};
use rust_decimal::Decimal;

use crate::{
    MovementDraft, MovementEntry, MovementQuery, NewOperation, OperationFilter, OperationRow,
    Result, StockFilter, StockInit, StockKey, StockRecord, StockSettings, StoreError, Version,
};

/// A single quantity change against one stock record.
///
/// `expected_version` is the version the caller read; the change is rejected
/// with `VersionConflict` if the record moved on in the meantime. When a unit
/// of work touches the same record several times, each later change expects
/// the version produced by the previous one.
#[derive(Debug, Clone)]
pub struct StockChange {
    pub stock_record_id: StockRecordId,
    pub on_hand_delta: Decimal,
    pub reserved_delta: Decimal,
    pub expected_version: Version,
    pub movement: MovementDraft,
}

impl StockChange {
    /// Creates a new change.
    pub fn new(
        stock_record_id: StockRecordId,
        on_hand_delta: Decimal,
        reserved_delta: Decimal,
        expected_version: Version,
        movement: MovementDraft,
    ) -> Self {
        Self {
            stock_record_id,
            on_hand_delta,
            reserved_delta,
            expected_version,
            movement,
        }
    }
}

/// Replacement of an operation row, guarded by the version the caller read.
#[derive(Debug, Clone)]
pub struct OperationWrite {
    pub row: OperationRow,
    pub expected_version: Version,
}

impl OperationWrite {
    /// Creates a write expecting the row to still be at `expected_version`.
    pub fn new(row: OperationRow, expected_version: Version) -> Self {
        Self {
            row,
            expected_version,
        }
    }
}

/// Everything one command writes, committed all-or-nothing.
///
/// Stock changes are applied in order and each produces exactly one ledger
/// entry in the same transaction, so balances and history never diverge.
#[derive(Debug, Clone, Default)]
pub struct UnitOfWork {
    pub changes: Vec<StockChange>,
    pub operation: Option<OperationWrite>,
}

impl UnitOfWork {
    /// Creates an empty unit of work.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a stock change.
    pub fn with_change(mut self, change: StockChange) -> Self {
        self.changes.push(change);
        self
    }

    /// Adds a stock change in place.
    pub fn push_change(&mut self, change: StockChange) {
        self.changes.push(change);
    }

    /// Sets the operation write.
    pub fn with_operation(mut self, write: OperationWrite) -> Self {
        self.operation = Some(write);
        self
    }

    /// Returns true if nothing would be written.
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty() && self.operation.is_none()
    }
}

/// What a successful commit wrote.
#[derive(Debug, Clone, Default)]
pub struct CommitOutcome {
    /// Final state of every touched record, in order of first touch.
    pub records: Vec<StockRecord>,

    /// Ledger entries appended, in change order.
    pub movements: Vec<MovementEntry>,

    /// The operation row as written, with its new version.
    pub operation: Option<OperationRow>,
}

impl CommitOutcome {
    /// Returns the final state of a touched record.
    pub fn record(&self, id: StockRecordId) -> Option<&StockRecord> {
        self.records.iter().find(|r| r.id == id)
    }
}

/// Core trait for inventory store implementations.
///
/// The store owns stock records, the movement ledger and operation rows.
/// All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait InventoryStore: Send + Sync {
    /// Retrieves a stock record by id.
    async fn get_stock(&self, id: StockRecordId) -> Result<Option<StockRecord>>;

    /// Retrieves a stock record by its natural key.
    async fn find_stock(&self, key: &StockKey) -> Result<Option<StockRecord>>;

    /// Returns the record for `key`, creating an empty one on first sight.
    ///
    /// `init` is ignored when the record already exists.
    async fn upsert_stock(&self, key: StockKey, init: StockInit) -> Result<StockRecord>;

    /// Updates non-quantity attributes. Writes no ledger entry.
    async fn update_stock_settings(
        &self,
        id: StockRecordId,
        settings: StockSettings,
        expected_version: Version,
    ) -> Result<StockRecord>;

    /// Lists stock records ordered by product code, lot and state.
    async fn list_stock(&self, filter: StockFilter) -> Result<Vec<StockRecord>>;

    /// Retrieves ledger entries matching a query, ordered by id.
    async fn query_movements(&self, query: MovementQuery) -> Result<Vec<MovementEntry>>;

    /// Inserts an operation, assigning the next sequence of its year in the
    /// same transaction as the insert.
    async fn create_operation(&self, operation: NewOperation) -> Result<OperationRow>;

    /// Retrieves an operation row by id, including soft-deleted rows.
    async fn get_operation(&self, id: OperationId) -> Result<Option<OperationRow>>;

    /// Lists operations ordered by year and sequence.
    async fn list_operations(&self, filter: OperationFilter) -> Result<Vec<OperationRow>>;

    /// Atomically applies a unit of work.
    ///
    /// Every change is validated against freshly read values; on any failure
    /// nothing is written.
    async fn commit(&self, work: UnitOfWork) -> Result<CommitOutcome>;
}

/// Extension trait providing convenience methods for inventory stores.
#[async_trait]
pub trait InventoryStoreExt: InventoryStore {
    /// Retrieves a stock record, failing if it does not exist.
    async fn require_stock(&self, id: StockRecordId) -> Result<StockRecord> {
        self.get_stock(id)
            .await?
            .ok_or(StoreError::StockRecordNotFound(id))
    }

    /// Retrieves an operation row, failing if it does not exist.
    async fn require_operation(&self, id: OperationId) -> Result<OperationRow> {
        self.get_operation(id)
            .await?
            .ok_or(StoreError::OperationNotFound(id))
    }

    /// Commits a single change and returns the updated record and its entry.
    async fn apply_change(&self, change: StockChange) -> Result<(StockRecord, MovementEntry)> {
        let id = change.stock_record_id;
        let outcome = self.commit(UnitOfWork::new().with_change(change)).await?;
        let record = outcome
            .record(id)
            .cloned()
            .ok_or(StoreError::StockRecordNotFound(id))?;
        let entry = outcome
            .movements
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::InvalidChange("commit wrote no movement".to_string()))?;
        Ok((record, entry))
    }

    /// Retrieves the complete history of a stock record.
    async fn movements_for(&self, id: StockRecordId) -> Result<Vec<MovementEntry>> {
        self.query_movements(MovementQuery::for_stock_record(id))
            .await
    }
}

// Blanket implementation for all InventoryStore implementations
impl<T: InventoryStore + ?Sized> InventoryStoreExt for T {}

/// Counts committed ledger entries by kind.
pub(crate) fn record_movement_metrics(movements: &[MovementEntry]) {
    for movement in movements {
        metrics::counter!("stock_movements_total", "kind" => movement.kind.as_str()).increment(1);
    }
}

/// Validates a unit of work before it reaches the database.
pub fn validate_unit_of_work(work: &UnitOfWork) -> Result<()> {
    if work.is_empty() {
        return Err(StoreError::InvalidChange(
            "Cannot commit an empty unit of work".to_string(),
        ));
    }

    for change in &work.changes {
        if !change
            .movement
            .kind
            .accepts(change.on_hand_delta, change.reserved_delta)
        {
            return Err(StoreError::InvalidChange(format!(
                "{} movement cannot carry on-hand delta {} and reserved delta {}",
                change.movement.kind, change.on_hand_delta, change.reserved_delta
            )));
        }
    }

    // A record's successive changes must chain their expected versions.
    let mut last_version: HashMap<StockRecordId, Version> = HashMap::new();
    for change in &work.changes {
        if let Some(previous) = last_version.insert(change.stock_record_id, change.expected_version)
            && change.expected_version != previous.next()
        {
            return Err(StoreError::InvalidChange(format!(
                "Changes to record {} must be sequential. Expected version {}, got {}",
                change.stock_record_id,
                previous.next(),
                change.expected_version
            )));
        }
    }

    Ok(())
}
