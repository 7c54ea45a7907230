use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use common::{ActorId, OperationId, OwnerId, StockRecordId};
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};
use uuid::Uuid;

use crate::{
    MovementEntry, MovementId, MovementQuery, NewMovement, NewOperation, OperationFilter,
    OperationRow, ProductCode, Result, StockFilter, StockInit, StockKey, StockRecord,
    StockSettings, StoreError, Version,
    store::{
        CommitOutcome, InventoryStore, UnitOfWork, record_movement_metrics, validate_unit_of_work,
    },
};

const STOCK_COLUMNS: &str = "id, owner_id, product_code, lot, lifecycle_state, on_hand_quantity, \
     reserved_quantity, minimum_threshold, maximum_threshold, location, expiry_date, unit_cost, \
     version, created_at, updated_at";

const MOVEMENT_COLUMNS: &str = "id, stock_record_id, actor_id, operation_id, kind, quantity_delta, \
     balance_before, balance_after, reserved_delta, reserved_after, reference_document, reason, \
     source_location, destination_location, timestamp";

const OPERATION_COLUMNS: &str = "id, year, sequence, reference_code, owner_id, direction, status, \
     version, created_at, updated_at, deleted_at, state";

/// PostgreSQL-backed inventory store implementation.
///
/// Every write runs in one transaction. Quantity updates are guarded by the
/// row version (`UPDATE ... WHERE id = $1 AND version = $2`), so a writer that
/// read stale values affects zero rows and gets a `VersionConflict`.
#[derive(Clone)]
pub struct PostgresInventoryStore {
    pool: PgPool,
}

impl PostgresInventoryStore {
    /// Creates a new PostgreSQL inventory store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    fn row_to_record(row: PgRow) -> Result<StockRecord> {
        let lot: String = row.try_get("lot")?;
        let state: String = row.try_get("lifecycle_state")?;

        Ok(StockRecord {
            id: StockRecordId::from_uuid(row.try_get::<Uuid, _>("id")?),
            owner_id: OwnerId::from_uuid(row.try_get::<Uuid, _>("owner_id")?),
            product_code: ProductCode::new(row.try_get::<String, _>("product_code")?),
            lot: Some(lot).filter(|l| !l.is_empty()),
            lifecycle_state: state.parse()?,
            on_hand_quantity: row.try_get("on_hand_quantity")?,
            reserved_quantity: row.try_get("reserved_quantity")?,
            minimum_threshold: row.try_get("minimum_threshold")?,
            maximum_threshold: row.try_get("maximum_threshold")?,
            location: row.try_get("location")?,
            expiry_date: row.try_get("expiry_date")?,
            unit_cost: row.try_get("unit_cost")?,
            version: Version::new(row.try_get("version")?),
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_movement(row: PgRow) -> Result<MovementEntry> {
        let kind: String = row.try_get("kind")?;

        Ok(MovementEntry {
            id: MovementId::new(row.try_get("id")?),
            stock_record_id: StockRecordId::from_uuid(row.try_get::<Uuid, _>("stock_record_id")?),
            actor_id: ActorId::from_uuid(row.try_get::<Uuid, _>("actor_id")?),
            operation_id: row
                .try_get::<Option<Uuid>, _>("operation_id")?
                .map(OperationId::from_uuid),
            kind: kind.parse()?,
            quantity_delta: row.try_get("quantity_delta")?,
            balance_before: row.try_get("balance_before")?,
            balance_after: row.try_get("balance_after")?,
            reserved_delta: row.try_get("reserved_delta")?,
            reserved_after: row.try_get("reserved_after")?,
            reference_document: row.try_get("reference_document")?,
            reason: row.try_get("reason")?,
            source_location: row.try_get("source_location")?,
            destination_location: row.try_get("destination_location")?,
            timestamp: row.try_get("timestamp")?,
        })
    }

    fn row_to_operation(row: PgRow) -> Result<OperationRow> {
        Ok(OperationRow {
            id: OperationId::from_uuid(row.try_get::<Uuid, _>("id")?),
            year: row.try_get("year")?,
            sequence: row.try_get("sequence")?,
            reference_code: row.try_get("reference_code")?,
            owner_id: OwnerId::from_uuid(row.try_get::<Uuid, _>("owner_id")?),
            direction: row.try_get("direction")?,
            status: row.try_get("status")?,
            version: Version::new(row.try_get("version")?),
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            deleted_at: row.try_get("deleted_at")?,
            state: row.try_get("state")?,
        })
    }

    async fn fetch_record(
        tx: &mut Transaction<'_, Postgres>,
        id: StockRecordId,
    ) -> Result<StockRecord> {
        let row = sqlx::query(&format!(
            "SELECT {STOCK_COLUMNS} FROM stock_records WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&mut **tx)
        .await?
        .ok_or(StoreError::StockRecordNotFound(id))?;

        Self::row_to_record(row)
    }

    async fn write_record(
        tx: &mut Transaction<'_, Postgres>,
        previous: Version,
        record: &StockRecord,
    ) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE stock_records
            SET on_hand_quantity = $3, reserved_quantity = $4, version = $5, updated_at = $6
            WHERE id = $1 AND version = $2
            "#,
        )
        .bind(record.id.as_uuid())
        .bind(previous.as_i64())
        .bind(record.on_hand_quantity)
        .bind(record.reserved_quantity)
        .bind(record.version.as_i64())
        .bind(record.updated_at)
        .execute(&mut **tx)
        .await?;

        if result.rows_affected() == 0 {
            let actual: Option<i64> =
                sqlx::query_scalar("SELECT version FROM stock_records WHERE id = $1")
                    .bind(record.id.as_uuid())
                    .fetch_optional(&mut **tx)
                    .await?;
            return Err(match actual {
                Some(actual) => StoreError::VersionConflict {
                    entity: "stock_record",
                    id: record.id.to_string(),
                    expected: previous,
                    actual: Version::new(actual),
                },
                None => StoreError::StockRecordNotFound(record.id),
            });
        }

        Ok(())
    }

    async fn insert_movement(
        tx: &mut Transaction<'_, Postgres>,
        movement: NewMovement,
    ) -> Result<MovementEntry> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO stock_movements (
                stock_record_id, actor_id, operation_id, kind, quantity_delta, balance_before,
                balance_after, reserved_delta, reserved_after, reference_document, reason,
                source_location, destination_location, timestamp
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            RETURNING id
            "#,
        )
        .bind(movement.stock_record_id.as_uuid())
        .bind(movement.actor_id.as_uuid())
        .bind(movement.operation_id.map(|id| id.as_uuid()))
        .bind(movement.kind.as_str())
        .bind(movement.quantity_delta)
        .bind(movement.balance_before)
        .bind(movement.balance_after)
        .bind(movement.reserved_delta)
        .bind(movement.reserved_after)
        .bind(&movement.reference_document)
        .bind(&movement.reason)
        .bind(&movement.source_location)
        .bind(&movement.destination_location)
        .bind(movement.timestamp)
        .fetch_one(&mut **tx)
        .await?;

        Ok(movement.into_entry(MovementId::new(id)))
    }
}

#[async_trait]
impl InventoryStore for PostgresInventoryStore {
    async fn get_stock(&self, id: StockRecordId) -> Result<Option<StockRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {STOCK_COLUMNS} FROM stock_records WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_record).transpose()
    }

    async fn find_stock(&self, key: &StockKey) -> Result<Option<StockRecord>> {
        let row = sqlx::query(&format!(
            r#"
            SELECT {STOCK_COLUMNS} FROM stock_records
            WHERE owner_id = $1 AND product_code = $2 AND lot = $3 AND lifecycle_state = $4
            "#
        ))
        .bind(key.owner_id.as_uuid())
        .bind(key.product_code.as_str())
        .bind(key.lot.as_deref().unwrap_or(""))
        .bind(key.lifecycle_state.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_record).transpose()
    }

    async fn upsert_stock(&self, key: StockKey, init: StockInit) -> Result<StockRecord> {
        let record = StockRecord::new(key.clone(), init);

        sqlx::query(
            r#"
            INSERT INTO stock_records (
                id, owner_id, product_code, lot, lifecycle_state, on_hand_quantity,
                reserved_quantity, minimum_threshold, maximum_threshold, location, expiry_date,
                unit_cost, version, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, 0, 0, $6, $7, $8, $9, $10, $11, $12, $12)
            ON CONFLICT ON CONSTRAINT unique_stock_key DO NOTHING
            "#,
        )
        .bind(record.id.as_uuid())
        .bind(record.owner_id.as_uuid())
        .bind(record.product_code.as_str())
        .bind(record.lot.as_deref().unwrap_or(""))
        .bind(record.lifecycle_state.as_str())
        .bind(record.minimum_threshold)
        .bind(record.maximum_threshold)
        .bind(&record.location)
        .bind(record.expiry_date)
        .bind(record.unit_cost)
        .bind(record.version.as_i64())
        .bind(record.created_at)
        .execute(&self.pool)
        .await?;

        self.find_stock(&key).await?.ok_or_else(|| {
            StoreError::InvalidChange(format!("stock record for {} vanished", key.product_code))
        })
    }

    async fn update_stock_settings(
        &self,
        id: StockRecordId,
        settings: StockSettings,
        expected_version: Version,
    ) -> Result<StockRecord> {
        let mut tx = self.pool.begin().await?;

        let current = Self::fetch_record(&mut tx, id).await?;
        if current.version != expected_version {
            return Err(StoreError::VersionConflict {
                entity: "stock_record",
                id: id.to_string(),
                expected: expected_version,
                actual: current.version,
            });
        }

        let updated = current.with_settings(&settings, Utc::now());
        let result = sqlx::query(
            r#"
            UPDATE stock_records
            SET minimum_threshold = $3, maximum_threshold = $4, location = $5, unit_cost = $6,
                expiry_date = $7, version = $8, updated_at = $9
            WHERE id = $1 AND version = $2
            "#,
        )
        .bind(id.as_uuid())
        .bind(expected_version.as_i64())
        .bind(updated.minimum_threshold)
        .bind(updated.maximum_threshold)
        .bind(&updated.location)
        .bind(updated.unit_cost)
        .bind(updated.expiry_date)
        .bind(updated.version.as_i64())
        .bind(updated.updated_at)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::VersionConflict {
                entity: "stock_record",
                id: id.to_string(),
                expected: expected_version,
                actual: expected_version.next(),
            });
        }

        tx.commit().await?;
        Ok(updated)
    }

    async fn list_stock(&self, filter: StockFilter) -> Result<Vec<StockRecord>> {
        let mut sql = format!("SELECT {STOCK_COLUMNS} FROM stock_records WHERE 1=1");
        let mut param_count = 0;

        if filter.owner_id.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND owner_id = ${param_count}"));
        }
        if filter.product_code.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND product_code = ${param_count}"));
        }
        if filter.lifecycle_state.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND lifecycle_state = ${param_count}"));
        }
        sql.push_str(" ORDER BY product_code ASC, lot ASC, lifecycle_state ASC");

        let mut query = sqlx::query(&sql);
        if let Some(owner_id) = filter.owner_id {
            query = query.bind(owner_id.as_uuid());
        }
        if let Some(product_code) = filter.product_code {
            query = query.bind(product_code.as_str().to_string());
        }
        if let Some(state) = filter.lifecycle_state {
            query = query.bind(state.as_str());
        }

        let rows = query.fetch_all(&self.pool).await?;
        rows.into_iter().map(Self::row_to_record).collect()
    }

    async fn query_movements(&self, query: MovementQuery) -> Result<Vec<MovementEntry>> {
        let mut sql = format!("SELECT {MOVEMENT_COLUMNS} FROM stock_movements WHERE 1=1");
        let mut param_count = 0;

        // Build dynamic query
        if query.stock_record_id.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND stock_record_id = ${param_count}"));
        }
        if query.operation_id.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND operation_id = ${param_count}"));
        }
        if query.kinds.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND kind = ANY(${param_count})"));
        }
        if query.from_timestamp.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND timestamp >= ${param_count}"));
        }
        if query.to_timestamp.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND timestamp <= ${param_count}"));
        }
        if query.after_id.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND id > ${param_count}"));
        }

        sql.push_str(" ORDER BY id ASC");

        if query.limit.is_some() {
            param_count += 1;
            sql.push_str(&format!(" LIMIT ${param_count}"));
        }

        let mut sqlx_query = sqlx::query(&sql);

        if let Some(id) = query.stock_record_id {
            sqlx_query = sqlx_query.bind(id.as_uuid());
        }
        if let Some(id) = query.operation_id {
            sqlx_query = sqlx_query.bind(id.as_uuid());
        }
        if let Some(kinds) = query.kinds {
            let kinds: Vec<String> = kinds.iter().map(|k| k.as_str().to_string()).collect();
            sqlx_query = sqlx_query.bind(kinds);
        }
        if let Some(from_ts) = query.from_timestamp {
            sqlx_query = sqlx_query.bind(from_ts);
        }
        if let Some(to_ts) = query.to_timestamp {
            sqlx_query = sqlx_query.bind(to_ts);
        }
        if let Some(after) = query.after_id {
            sqlx_query = sqlx_query.bind(after.as_i64());
        }
        if let Some(limit) = query.limit {
            sqlx_query = sqlx_query.bind(limit as i64);
        }

        let rows = sqlx_query.fetch_all(&self.pool).await?;
        rows.into_iter().map(Self::row_to_movement).collect()
    }

    async fn create_operation(&self, operation: NewOperation) -> Result<OperationRow> {
        let year = operation.year;
        let mut tx = self.pool.begin().await?;

        // The counter row is locked by the upsert until commit, so concurrent
        // creations for the same year serialize here.
        let sequence: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO operation_counters (year, last_sequence)
            VALUES ($1, COALESCE((SELECT MAX(sequence) FROM operations WHERE year = $1), 0) + 1)
            ON CONFLICT (year) DO UPDATE
                SET last_sequence = operation_counters.last_sequence + 1
            RETURNING last_sequence
            "#,
        )
        .bind(year)
        .fetch_one(&mut *tx)
        .await?;

        let row = operation.into_row(sequence);

        sqlx::query(
            r#"
            INSERT INTO operations (
                id, year, sequence, reference_code, owner_id, direction, status, version,
                created_at, updated_at, deleted_at, state
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, NULL, $11)
            "#,
        )
        .bind(row.id.as_uuid())
        .bind(row.year)
        .bind(row.sequence)
        .bind(&row.reference_code)
        .bind(row.owner_id.as_uuid())
        .bind(&row.direction)
        .bind(&row.status)
        .bind(row.version.as_i64())
        .bind(row.created_at)
        .bind(row.updated_at)
        .bind(&row.state)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.constraint() == Some("unique_operation_sequence")
            {
                return StoreError::DuplicateSequence { year, sequence };
            }
            StoreError::Database(e)
        })?;

        tx.commit().await?;
        Ok(row)
    }

    async fn get_operation(&self, id: OperationId) -> Result<Option<OperationRow>> {
        let row = sqlx::query(&format!(
            "SELECT {OPERATION_COLUMNS} FROM operations WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_operation).transpose()
    }

    async fn list_operations(&self, filter: OperationFilter) -> Result<Vec<OperationRow>> {
        let mut sql = format!("SELECT {OPERATION_COLUMNS} FROM operations WHERE 1=1");
        let mut param_count = 0;

        if !filter.include_deleted {
            sql.push_str(" AND deleted_at IS NULL");
        }
        if filter.owner_id.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND owner_id = ${param_count}"));
        }
        if filter.status.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND status = ${param_count}"));
        }
        if filter.direction.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND direction = ${param_count}"));
        }
        if filter.year.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND year = ${param_count}"));
        }
        sql.push_str(" ORDER BY year ASC, sequence ASC");

        let mut query = sqlx::query(&sql);
        if let Some(owner_id) = filter.owner_id {
            query = query.bind(owner_id.as_uuid());
        }
        if let Some(status) = filter.status {
            query = query.bind(status);
        }
        if let Some(direction) = filter.direction {
            query = query.bind(direction);
        }
        if let Some(year) = filter.year {
            query = query.bind(year);
        }

        let rows = query.fetch_all(&self.pool).await?;
        rows.into_iter().map(Self::row_to_operation).collect()
    }

    async fn commit(&self, work: UnitOfWork) -> Result<CommitOutcome> {
        validate_unit_of_work(&work)?;

        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let mut staged: HashMap<StockRecordId, StockRecord> = HashMap::new();
        let mut touched: Vec<StockRecordId> = Vec::new();
        let mut movements = Vec::with_capacity(work.changes.len());

        for change in &work.changes {
            let current = match staged.remove(&change.stock_record_id) {
                Some(record) => record,
                None => {
                    touched.push(change.stock_record_id);
                    Self::fetch_record(&mut tx, change.stock_record_id).await?
                }
            };

            let (next, movement) = current.apply_change(change, now)?;
            Self::write_record(&mut tx, current.version, &next).await?;
            movements.push(Self::insert_movement(&mut tx, movement).await?);
            staged.insert(next.id, next);
        }

        let operation = match work.operation {
            Some(write) => {
                let row = sqlx::query(&format!(
                    r#"
                    UPDATE operations
                    SET status = $3, deleted_at = $4, state = $5, version = version + 1,
                        updated_at = $6
                    WHERE id = $1 AND version = $2
                    RETURNING {OPERATION_COLUMNS}
                    "#
                ))
                .bind(write.row.id.as_uuid())
                .bind(write.expected_version.as_i64())
                .bind(&write.row.status)
                .bind(write.row.deleted_at)
                .bind(&write.row.state)
                .bind(now)
                .fetch_optional(&mut *tx)
                .await?;

                match row {
                    Some(row) => Some(Self::row_to_operation(row)?),
                    None => {
                        let actual: Option<i64> =
                            sqlx::query_scalar("SELECT version FROM operations WHERE id = $1")
                                .bind(write.row.id.as_uuid())
                                .fetch_optional(&mut *tx)
                                .await?;
                        return Err(match actual {
                            Some(actual) => StoreError::VersionConflict {
                                entity: "operation",
                                id: write.row.id.to_string(),
                                expected: write.expected_version,
                                actual: Version::new(actual),
                            },
                            None => StoreError::OperationNotFound(write.row.id),
                        });
                    }
                }
            }
            None => None,
        };

        tx.commit().await?;

        tracing::debug!(
            changes = movements.len(),
            operation = operation.is_some(),
            "unit of work committed"
        );
        record_movement_metrics(&movements);

        let records = touched
            .into_iter()
            .filter_map(|id| staged.remove(&id))
            .collect();

        Ok(CommitOutcome {
            records,
            movements,
            operation,
        })
    }
}
