use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use common::{OperationId, StockRecordId};
use tokio::sync::RwLock;

use crate::{
    MovementEntry, MovementId, MovementQuery, NewOperation, OperationFilter, OperationRow, Result,
    StockFilter, StockInit, StockKey, StockRecord, StockSettings, StoreError, Version,
    store::{
        CommitOutcome, InventoryStore, UnitOfWork, record_movement_metrics, validate_unit_of_work,
    },
};

#[derive(Default)]
struct InventoryState {
    records: HashMap<StockRecordId, StockRecord>,
    keys: HashMap<StockKey, StockRecordId>,
    movements: Vec<MovementEntry>,
    operations: HashMap<OperationId, OperationRow>,
    last_sequence: HashMap<i32, i64>,
    next_movement_id: i64,
}

/// In-memory inventory store implementation for testing.
///
/// A single lock guards every table, so a commit is trivially atomic. It
/// applies the same validation as the PostgreSQL implementation.
#[derive(Clone, Default)]
pub struct InMemoryInventoryStore {
    state: Arc<RwLock<InventoryState>>,
}

impl InMemoryInventoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of ledger entries stored.
    pub async fn movement_count(&self) -> usize {
        self.state.read().await.movements.len()
    }

    /// Clears all records, movements and operations.
    pub async fn clear(&self) {
        *self.state.write().await = InventoryState::default();
    }
}

#[async_trait]
impl InventoryStore for InMemoryInventoryStore {
    async fn get_stock(&self, id: StockRecordId) -> Result<Option<StockRecord>> {
        Ok(self.state.read().await.records.get(&id).cloned())
    }

    async fn find_stock(&self, key: &StockKey) -> Result<Option<StockRecord>> {
        let state = self.state.read().await;
        Ok(state
            .keys
            .get(key)
            .and_then(|id| state.records.get(id))
            .cloned())
    }

    async fn upsert_stock(&self, key: StockKey, init: StockInit) -> Result<StockRecord> {
        let mut state = self.state.write().await;
        if let Some(existing) = state.keys.get(&key).and_then(|id| state.records.get(id)) {
            return Ok(existing.clone());
        }

        let record = StockRecord::new(key.clone(), init);
        state.keys.insert(key, record.id);
        state.records.insert(record.id, record.clone());
        Ok(record)
    }

    async fn update_stock_settings(
        &self,
        id: StockRecordId,
        settings: StockSettings,
        expected_version: Version,
    ) -> Result<StockRecord> {
        let mut state = self.state.write().await;
        let current = state
            .records
            .get(&id)
            .ok_or(StoreError::StockRecordNotFound(id))?;

        if current.version != expected_version {
            return Err(StoreError::VersionConflict {
                entity: "stock_record",
                id: id.to_string(),
                expected: expected_version,
                actual: current.version,
            });
        }

        let updated = current.with_settings(&settings, Utc::now());
        state.records.insert(id, updated.clone());
        Ok(updated)
    }

    async fn list_stock(&self, filter: StockFilter) -> Result<Vec<StockRecord>> {
        let state = self.state.read().await;
        let mut records: Vec<_> = state
            .records
            .values()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();
        records.sort_by(|a, b| {
            a.product_code
                .cmp(&b.product_code)
                .then(a.lot.cmp(&b.lot))
                .then(a.lifecycle_state.as_str().cmp(b.lifecycle_state.as_str()))
        });
        Ok(records)
    }

    async fn query_movements(&self, query: MovementQuery) -> Result<Vec<MovementEntry>> {
        let state = self.state.read().await;
        // Movements are appended in id order, so no sort is needed.
        let matching = state.movements.iter().filter(|m| query.matches(m)).cloned();

        let movements = match query.limit {
            Some(limit) => matching.take(limit).collect(),
            None => matching.collect(),
        };
        Ok(movements)
    }

    async fn create_operation(&self, operation: NewOperation) -> Result<OperationRow> {
        let mut state = self.state.write().await;
        let year = operation.year;
        let sequence = state.last_sequence.get(&year).copied().unwrap_or(0) + 1;

        // Simulates the (year, sequence) unique constraint.
        if state
            .operations
            .values()
            .any(|o| o.year == year && o.sequence == sequence)
        {
            return Err(StoreError::DuplicateSequence { year, sequence });
        }

        let row = operation.into_row(sequence);
        state.last_sequence.insert(year, sequence);
        state.operations.insert(row.id, row.clone());
        Ok(row)
    }

    async fn get_operation(&self, id: OperationId) -> Result<Option<OperationRow>> {
        Ok(self.state.read().await.operations.get(&id).cloned())
    }

    async fn list_operations(&self, filter: OperationFilter) -> Result<Vec<OperationRow>> {
        let state = self.state.read().await;
        let mut rows: Vec<_> = state
            .operations
            .values()
            .filter(|o| filter.matches(o))
            .cloned()
            .collect();
        rows.sort_by_key(|o| (o.year, o.sequence));
        Ok(rows)
    }

    async fn commit(&self, work: UnitOfWork) -> Result<CommitOutcome> {
        validate_unit_of_work(&work)?;

        let mut state = self.state.write().await;
        let now = Utc::now();

        // Stage everything first; nothing is written until all checks pass.
        let mut staged: HashMap<StockRecordId, StockRecord> = HashMap::new();
        let mut touched: Vec<StockRecordId> = Vec::new();
        let mut pending = Vec::with_capacity(work.changes.len());

        for change in &work.changes {
            let current = match staged.get(&change.stock_record_id) {
                Some(record) => record,
                None => state
                    .records
                    .get(&change.stock_record_id)
                    .ok_or(StoreError::StockRecordNotFound(change.stock_record_id))?,
            };

            let (next, movement) = current.apply_change(change, now)?;
            if !staged.contains_key(&next.id) {
                touched.push(next.id);
            }
            staged.insert(next.id, next);
            pending.push(movement);
        }

        let operation = match work.operation {
            Some(write) => {
                let current = state
                    .operations
                    .get(&write.row.id)
                    .ok_or(StoreError::OperationNotFound(write.row.id))?;

                if current.version != write.expected_version {
                    return Err(StoreError::VersionConflict {
                        entity: "operation",
                        id: write.row.id.to_string(),
                        expected: write.expected_version,
                        actual: current.version,
                    });
                }

                Some(OperationRow {
                    id: current.id,
                    year: current.year,
                    sequence: current.sequence,
                    reference_code: current.reference_code.clone(),
                    owner_id: current.owner_id,
                    created_at: current.created_at,
                    version: current.version.next(),
                    updated_at: now,
                    ..write.row
                })
            }
            None => None,
        };

        let mut movements = Vec::with_capacity(pending.len());
        for movement in pending {
            state.next_movement_id += 1;
            let entry = movement.into_entry(MovementId::new(state.next_movement_id));
            state.movements.push(entry.clone());
            movements.push(entry);
        }

        let mut records = Vec::with_capacity(touched.len());
        for id in touched {
            if let Some(record) = staged.remove(&id) {
                state.records.insert(id, record.clone());
                records.push(record);
            }
        }

        if let Some(ref row) = operation {
            state.operations.insert(row.id, row.clone());
        }

        record_movement_metrics(&movements);
        Ok(CommitOutcome {
            records,
            movements,
            operation,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{InventoryStoreExt, MovementDraft, MovementKind, OperationWrite, StockChange};
    use common::{ActorId, OwnerId};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    async fn seeded_record(store: &InMemoryInventoryStore, on_hand: Decimal) -> StockRecord {
        let record = store
            .upsert_stock(
                StockKey::new(OwnerId::new(), "SKU-100", None),
                StockInit {
                    location: "A-01".to_string(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        if on_hand == Decimal::ZERO {
            return record;
        }

        let (record, _) = store
            .apply_change(StockChange::new(
                record.id,
                on_hand,
                Decimal::ZERO,
                record.version,
                MovementDraft::new(MovementKind::Receipt, ActorId::new()),
            ))
            .await
            .unwrap();
        record
    }

    fn new_operation(owner_id: OwnerId, year: i32) -> NewOperation {
        NewOperation {
            id: OperationId::new(),
            year,
            owner_id,
            direction: "inbound".to_string(),
            status: "pending".to_string(),
            created_at: Utc::now(),
            state: serde_json::json!({}),
        }
    }

    #[tokio::test]
    async fn upsert_returns_existing_record() {
        let store = InMemoryInventoryStore::new();
        let key = StockKey::new(OwnerId::new(), "SKU-1", Some("L1".to_string()));

        let first = store
            .upsert_stock(key.clone(), StockInit::default())
            .await
            .unwrap();
        let second = store
            .upsert_stock(key.clone(), StockInit::default())
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(store.find_stock(&key).await.unwrap().unwrap().id, first.id);
    }

    #[tokio::test]
    async fn receipt_writes_record_and_movement() {
        let store = InMemoryInventoryStore::new();
        let record = seeded_record(&store, dec!(40)).await;

        assert_eq!(record.on_hand_quantity, dec!(40));
        assert_eq!(record.version, Version::new(2));

        let movements = store.movements_for(record.id).await.unwrap();
        assert_eq!(movements.len(), 1);
        assert_eq!(movements[0].balance_before, dec!(0));
        assert_eq!(movements[0].balance_after, dec!(40));
    }

    #[tokio::test]
    async fn failed_change_writes_nothing() {
        let store = InMemoryInventoryStore::new();
        let record = seeded_record(&store, dec!(10)).await;

        let work = UnitOfWork::new()
            .with_change(StockChange::new(
                record.id,
                dec!(-4),
                Decimal::ZERO,
                record.version,
                MovementDraft::new(MovementKind::Issue, ActorId::new()),
            ))
            .with_change(StockChange::new(
                record.id,
                dec!(-20),
                Decimal::ZERO,
                record.version.next(),
                MovementDraft::new(MovementKind::Adjustment, ActorId::new()),
            ));

        let result = store.commit(work).await;
        assert!(matches!(result, Err(StoreError::InsufficientStock { .. })));

        let unchanged = store.require_stock(record.id).await.unwrap();
        assert_eq!(unchanged.on_hand_quantity, dec!(10));
        assert_eq!(unchanged.version, record.version);
        assert_eq!(store.movement_count().await, 1);
    }

    #[tokio::test]
    async fn chained_changes_produce_contiguous_balances() {
        let store = InMemoryInventoryStore::new();
        let record = seeded_record(&store, dec!(10)).await;

        let work = UnitOfWork::new()
            .with_change(StockChange::new(
                record.id,
                dec!(-3),
                Decimal::ZERO,
                record.version,
                MovementDraft::new(MovementKind::Issue, ActorId::new()),
            ))
            .with_change(StockChange::new(
                record.id,
                dec!(-2),
                Decimal::ZERO,
                record.version.next(),
                MovementDraft::new(MovementKind::Adjustment, ActorId::new()),
            ));

        let outcome = store.commit(work).await.unwrap();
        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.records[0].on_hand_quantity, dec!(5));

        let history = store.movements_for(record.id).await.unwrap();
        for pair in history.windows(2) {
            assert_eq!(pair[0].balance_after, pair[1].balance_before);
            assert!(pair[0].id < pair[1].id);
        }
    }

    #[tokio::test]
    async fn stale_version_is_rejected() {
        let store = InMemoryInventoryStore::new();
        let record = seeded_record(&store, dec!(10)).await;

        let result = store
            .apply_change(StockChange::new(
                record.id,
                dec!(1),
                Decimal::ZERO,
                Version::first(),
                MovementDraft::new(MovementKind::Receipt, ActorId::new()),
            ))
            .await;

        assert!(matches!(result, Err(StoreError::VersionConflict { .. })));
    }

    #[tokio::test]
    async fn operations_are_numbered_per_year() {
        let store = InMemoryInventoryStore::new();
        let owner = OwnerId::new();

        let a = store.create_operation(new_operation(owner, 2026)).await.unwrap();
        let b = store.create_operation(new_operation(owner, 2026)).await.unwrap();
        let c = store.create_operation(new_operation(owner, 2027)).await.unwrap();

        assert_eq!(a.reference_code, "OP-2026-0001");
        assert_eq!(b.reference_code, "OP-2026-0002");
        assert_eq!(c.reference_code, "OP-2027-0001");
    }

    #[tokio::test]
    async fn operation_write_checks_version_and_keeps_identity() {
        let store = InMemoryInventoryStore::new();
        let row = store
            .create_operation(new_operation(OwnerId::new(), 2026))
            .await
            .unwrap();

        let mut tampered = row.with_state("closed", None, serde_json::json!({"done": true}));
        tampered.reference_code = "OP-1999-9999".to_string();

        let outcome = store
            .commit(UnitOfWork::new().with_operation(OperationWrite::new(tampered, row.version)))
            .await
            .unwrap();
        let written = outcome.operation.unwrap();
        assert_eq!(written.reference_code, row.reference_code);
        assert_eq!(written.version, row.version.next());
        assert_eq!(written.status, "closed");

        let stale = row.with_state("voided", None, serde_json::json!({}));
        let result = store
            .commit(UnitOfWork::new().with_operation(OperationWrite::new(stale, row.version)))
            .await;
        assert!(matches!(result, Err(StoreError::VersionConflict { .. })));
    }

    #[tokio::test]
    async fn movement_query_pages_by_id() {
        let store = InMemoryInventoryStore::new();
        let mut record = seeded_record(&store, dec!(1)).await;
        for _ in 0..4 {
            let (next, _) = store
                .apply_change(StockChange::new(
                    record.id,
                    dec!(1),
                    Decimal::ZERO,
                    record.version,
                    MovementDraft::new(MovementKind::Receipt, ActorId::new()),
                ))
                .await
                .unwrap();
            record = next;
        }

        let first_page = store
            .query_movements(MovementQuery::for_stock_record(record.id).limit(2))
            .await
            .unwrap();
        assert_eq!(first_page.len(), 2);

        let rest = store
            .query_movements(MovementQuery::for_stock_record(record.id).after(first_page[1].id))
            .await
            .unwrap();
        assert_eq!(rest.len(), 3);
        assert!(rest[0].id > first_page[1].id);
    }

    #[tokio::test]
    async fn settings_update_writes_no_movement() {
        let store = InMemoryInventoryStore::new();
        let record = seeded_record(&store, dec!(5)).await;
        let before = store.movement_count().await;

        let updated = store
            .update_stock_settings(
                record.id,
                StockSettings {
                    minimum_threshold: Some(dec!(8)),
                    ..Default::default()
                },
                record.version,
            )
            .await
            .unwrap();

        assert_eq!(updated.minimum_threshold, dec!(8));
        assert!(updated.is_low_stock());
        assert_eq!(store.movement_count().await, before);
    }
}
