//! PostgreSQL integration tests
//!
//! These tests use a shared PostgreSQL container for efficiency.
//! Run with:
//!
//! ```bash
//! cargo test -p stock-store --test postgres_integration -- --test-threads=1
//! ```

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serial_test::serial;
use sqlx::PgPool;
use stock_store::{
    ActorId, InventoryStore, InventoryStoreExt, LifecycleState, MovementDraft, MovementKind,
    MovementQuery, NewOperation, OperationFilter, OperationId, OperationWrite, OwnerId,
    PostgresInventoryStore, StockChange, StockFilter, StockInit, StockKey, StockRecord,
    StockSettings, StoreError, UnitOfWork, Version,
};
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

/// Global shared container
static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();

            // Run migrations using raw_sql to execute multiple statements
            sqlx::raw_sql(include_str!(
                "../../../migrations/001_create_inventory_tables.sql"
            ))
            .execute(&temp_pool)
            .await
            .unwrap();

            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

/// Get a fresh store with its own pool and cleared tables
async fn get_test_store() -> PostgresInventoryStore {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query(
        "TRUNCATE TABLE stock_movements, stock_records, operations, operation_counters CASCADE",
    )
    .execute(&pool)
    .await
    .unwrap();

    PostgresInventoryStore::new(pool)
}

async fn stocked(store: &PostgresInventoryStore, on_hand: Decimal) -> StockRecord {
    let record = store
        .upsert_stock(
            StockKey::new(OwnerId::new(), "SKU-PG", Some("L-01".to_string())),
            StockInit {
                location: "A-01".to_string(),
                minimum_threshold: dec!(5),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let (record, _) = store
        .apply_change(StockChange::new(
            record.id,
            on_hand,
            Decimal::ZERO,
            record.version,
            MovementDraft::new(MovementKind::Receipt, ActorId::new()).reference("GRN-1"),
        ))
        .await
        .unwrap();
    record
}

fn new_operation(year: i32) -> NewOperation {
    NewOperation {
        id: OperationId::new(),
        year,
        owner_id: OwnerId::new(),
        direction: "outbound".to_string(),
        status: "pending".to_string(),
        created_at: Utc::now(),
        state: serde_json::json!({"lines": []}),
    }
}

#[tokio::test]
#[serial]
async fn upsert_is_idempotent_per_key() {
    let store = get_test_store().await;
    let key = StockKey::new(OwnerId::new(), "SKU-1", None);

    let a = store
        .upsert_stock(key.clone(), StockInit::default())
        .await
        .unwrap();
    let b = store
        .upsert_stock(key.clone(), StockInit::default())
        .await
        .unwrap();
    let damaged = store
        .upsert_stock(key.with_state(LifecycleState::Damaged), StockInit::default())
        .await
        .unwrap();

    assert_eq!(a.id, b.id);
    assert_ne!(a.id, damaged.id);
    assert_eq!(a.lot, None);
    assert_eq!(damaged.lifecycle_state, LifecycleState::Damaged);
}

#[tokio::test]
#[serial]
async fn receipt_round_trips_record_and_movement() {
    let store = get_test_store().await;
    let record = stocked(&store, dec!(12.5)).await;

    let loaded = store.require_stock(record.id).await.unwrap();
    assert_eq!(loaded.on_hand_quantity, dec!(12.5));
    assert_eq!(loaded.version, Version::new(2));
    assert_eq!(loaded.lot.as_deref(), Some("L-01"));

    let history = store.movements_for(record.id).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].kind, MovementKind::Receipt);
    assert_eq!(history[0].balance_after, dec!(12.5));
    assert_eq!(history[0].reference_document.as_deref(), Some("GRN-1"));
}

#[tokio::test]
#[serial]
async fn failed_unit_of_work_rolls_back() {
    let store = get_test_store().await;
    let record = stocked(&store, dec!(10)).await;

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
            dec!(-40),
            Decimal::ZERO,
            record.version.next(),
            MovementDraft::new(MovementKind::Adjustment, ActorId::new()),
        ));

    let result = store.commit(work).await;
    assert!(matches!(result, Err(StoreError::InsufficientStock { .. })));

    let loaded = store.require_stock(record.id).await.unwrap();
    assert_eq!(loaded.on_hand_quantity, dec!(10));
    assert_eq!(store.movements_for(record.id).await.unwrap().len(), 1);
}

#[tokio::test]
#[serial]
async fn stale_write_is_a_version_conflict() {
    let store = get_test_store().await;
    let record = stocked(&store, dec!(10)).await;

    let draft = || MovementDraft::new(MovementKind::Reservation, ActorId::new());
    store
        .apply_change(StockChange::new(
            record.id,
            Decimal::ZERO,
            dec!(3),
            record.version,
            draft(),
        ))
        .await
        .unwrap();

    let result = store
        .apply_change(StockChange::new(
            record.id,
            Decimal::ZERO,
            dec!(3),
            record.version,
            draft(),
        ))
        .await;

    assert!(matches!(result, Err(StoreError::VersionConflict { .. })));
    let loaded = store.require_stock(record.id).await.unwrap();
    assert_eq!(loaded.reserved_quantity, dec!(3));
}

#[tokio::test]
#[serial]
async fn movements_are_append_only() {
    let store = get_test_store().await;
    let record = stocked(&store, dec!(1)).await;

    let result = sqlx::query("UPDATE stock_movements SET reason = 'edited' WHERE stock_record_id = $1")
        .bind(record.id.as_uuid())
        .execute(store.pool())
        .await;
    assert!(result.is_err());

    let result = sqlx::query("DELETE FROM stock_movements WHERE stock_record_id = $1")
        .bind(record.id.as_uuid())
        .execute(store.pool())
        .await;
    assert!(result.is_err());
}

#[tokio::test]
#[serial]
async fn movement_query_filters_and_pages() {
    let store = get_test_store().await;
    let mut record = stocked(&store, dec!(10)).await;

    for _ in 0..3 {
        let (next, _) = store
            .apply_change(StockChange::new(
                record.id,
                dec!(-1),
                Decimal::ZERO,
                record.version,
                MovementDraft::new(MovementKind::Issue, ActorId::new()),
            ))
            .await
            .unwrap();
        record = next;
    }

    let issues = store
        .query_movements(MovementQuery::for_stock_record(record.id).kind(MovementKind::Issue))
        .await
        .unwrap();
    assert_eq!(issues.len(), 3);

    let page = store
        .query_movements(MovementQuery::for_stock_record(record.id).limit(2))
        .await
        .unwrap();
    let rest = store
        .query_movements(MovementQuery::for_stock_record(record.id).after(page[1].id))
        .await
        .unwrap();
    assert_eq!(page.len() + rest.len(), 4);
    assert_eq!(rest.last().unwrap().balance_after, dec!(7));
}

#[tokio::test]
#[serial]
async fn operations_numbered_sequentially_per_year() {
    let store = get_test_store().await;

    let a = store.create_operation(new_operation(2026)).await.unwrap();
    let b = store.create_operation(new_operation(2026)).await.unwrap();
    let c = store.create_operation(new_operation(2027)).await.unwrap();

    assert_eq!(a.reference_code, "OP-2026-0001");
    assert_eq!(b.reference_code, "OP-2026-0002");
    assert_eq!(c.reference_code, "OP-2027-0001");
}

#[tokio::test]
#[serial]
async fn concurrent_operation_creation_yields_distinct_sequences() {
    let store = get_test_store().await;

    let mut handles = Vec::new();
    for _ in 0..8 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            store.create_operation(new_operation(2026)).await.unwrap()
        }));
    }

    let mut sequences = Vec::new();
    for handle in handles {
        sequences.push(handle.await.unwrap().sequence);
    }
    sequences.sort();
    assert_eq!(sequences, (1..=8).collect::<Vec<i64>>());
}

#[tokio::test]
#[serial]
async fn operation_write_bumps_version_and_filters_deleted() {
    let store = get_test_store().await;
    let row = store.create_operation(new_operation(2026)).await.unwrap();

    let closed = row.with_state("closed", None, serde_json::json!({"closed": true}));
    let written = store
        .commit(UnitOfWork::new().with_operation(OperationWrite::new(closed, row.version)))
        .await
        .unwrap()
        .operation
        .unwrap();
    assert_eq!(written.version, row.version.next());
    assert_eq!(written.status, "closed");

    let deleted = written.with_state("closed", Some(Utc::now()), written.state.clone());
    store
        .commit(UnitOfWork::new().with_operation(OperationWrite::new(deleted, written.version)))
        .await
        .unwrap();

    let visible = store
        .list_operations(OperationFilter::default())
        .await
        .unwrap();
    assert!(visible.is_empty());

    let all = store
        .list_operations(OperationFilter {
            include_deleted: true,
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(all.len(), 1);

    let stale = row.with_state("voided", None, serde_json::json!({}));
    let result = store
        .commit(UnitOfWork::new().with_operation(OperationWrite::new(stale, row.version)))
        .await;
    assert!(matches!(result, Err(StoreError::VersionConflict { .. })));
}

#[tokio::test]
#[serial]
async fn settings_update_and_listing() {
    let store = get_test_store().await;
    let record = stocked(&store, dec!(3)).await;

    let updated = store
        .update_stock_settings(
            record.id,
            StockSettings {
                location: Some("B-07".to_string()),
                ..Default::default()
            },
            record.version,
        )
        .await
        .unwrap();
    assert_eq!(updated.location, "B-07");

    let listed = store
        .list_stock(StockFilter::for_owner(Some(record.owner_id)))
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);
    assert!(listed[0].is_low_stock());
    assert_eq!(store.movements_for(record.id).await.unwrap().len(), 1);
}
