//! Stock record service: lookups, upserts and ledger-backed quantity changes
//! made outside an operation.

use common::{ActorId, StockRecordId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use stock_store::{
    InventoryStore, InventoryStoreExt, MovementDraft, MovementKind, StockChange, StockFilter,
    StockInit, StockKey, StockRecord, StockSettings, UnitOfWork, Version,
};

use crate::error::{DomainError, Result};
use crate::retry::RetryPolicy;

/// A manual correction of on-hand quantity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Adjustment {
    /// Signed change to on-hand quantity.
    pub quantity_delta: Decimal,

    /// Why the correction was made.
    pub reason: String,

    /// Supporting document, if any.
    #[serde(default)]
    pub reference: Option<String>,
}

/// Service for reading and correcting stock records.
#[derive(Clone)]
pub struct StockService<S: InventoryStore> {
    store: S,
    retry: RetryPolicy,
}

impl<S: InventoryStore + Clone> StockService<S> {
    /// Creates a new stock service with the default retry policy.
    pub fn new(store: S) -> Self {
        Self::with_retry(store, RetryPolicy::default())
    }

    /// Creates a new stock service with a custom retry policy.
    pub fn with_retry(store: S, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    /// Returns a reference to the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Retrieves a stock record by id.
    pub async fn get(&self, id: StockRecordId) -> Result<StockRecord> {
        Ok(self.store.require_stock(id).await?)
    }

    /// Retrieves a stock record by owner, product and lot.
    pub async fn find(&self, key: &StockKey) -> Result<Option<StockRecord>> {
        Ok(self.store.find_stock(key).await?)
    }

    /// Returns the record for `key`, creating it empty if it does not exist.
    #[tracing::instrument(skip(self, init), fields(product = %key.product_code))]
    pub async fn upsert(&self, key: StockKey, init: StockInit) -> Result<StockRecord> {
        validate_thresholds(Some(init.minimum_threshold), init.maximum_threshold)?;
        Ok(self.store.upsert_stock(key, init).await?)
    }

    /// Lists stock records.
    pub async fn list(&self, filter: StockFilter) -> Result<Vec<StockRecord>> {
        Ok(self.store.list_stock(filter).await?)
    }

    /// Applies a quantity change against the version the caller read.
    ///
    /// This is the single write path for quantities outside an operation; it
    /// never retries, so a stale `expected_version` surfaces as `Conflict`.
    #[tracing::instrument(skip(self, movement))]
    pub async fn apply_delta(
        &self,
        id: StockRecordId,
        on_hand_delta: Decimal,
        reserved_delta: Decimal,
        expected_version: Version,
        movement: MovementDraft,
    ) -> Result<StockRecord> {
        let change = StockChange::new(id, on_hand_delta, reserved_delta, expected_version, movement);
        let (record, _) = self.store.apply_change(change).await?;
        Ok(record)
    }

    /// Corrects on-hand quantity with an `adjustment` movement.
    ///
    /// A negative adjustment may not exceed the available quantity.
    #[tracing::instrument(skip(self, adjustment), fields(delta = %adjustment.quantity_delta))]
    pub async fn adjust(
        &self,
        id: StockRecordId,
        adjustment: Adjustment,
        actor_id: ActorId,
    ) -> Result<StockRecord> {
        if adjustment.quantity_delta.is_zero() {
            return Err(DomainError::InvalidInput(
                "adjustment quantity must not be zero".to_string(),
            ));
        }
        if adjustment.reason.trim().is_empty() {
            return Err(DomainError::InvalidInput(
                "adjustment reason is required".to_string(),
            ));
        }

        let record = self
            .retry
            .run("adjust", || async {
                let current = self.store.require_stock(id).await?;
                let draft = MovementDraft::new(MovementKind::Adjustment, actor_id)
                    .reason(adjustment.reason.clone())
                    .maybe_reference(adjustment.reference.clone());
                self.apply_delta(
                    id,
                    adjustment.quantity_delta,
                    Decimal::ZERO,
                    current.version,
                    draft,
                )
                .await
            })
            .await?;

        tracing::info!(
            stock_record_id = %id,
            on_hand = %record.on_hand_quantity,
            "stock adjusted"
        );
        Ok(record)
    }

    /// Moves units between two records of the same owner and product, tagging
    /// both entries with origin and destination locations.
    #[tracing::instrument(skip(self))]
    pub async fn transfer(
        &self,
        from: StockRecordId,
        to: StockRecordId,
        quantity: Decimal,
        actor_id: ActorId,
    ) -> Result<(StockRecord, StockRecord)> {
        if quantity <= Decimal::ZERO {
            return Err(DomainError::InvalidInput(
                "transfer quantity must be positive".to_string(),
            ));
        }
        if from == to {
            return Err(DomainError::InvalidInput(
                "cannot transfer a record onto itself".to_string(),
            ));
        }

        self.retry
            .run("transfer", || async {
                let source = self.store.require_stock(from).await?;
                let target = self.store.require_stock(to).await?;
                if source.owner_id != target.owner_id || source.product_code != target.product_code
                {
                    return Err(DomainError::InvalidInput(
                        "transfers must stay within one owner and product".to_string(),
                    ));
                }

                let draft = MovementDraft::new(MovementKind::Transfer, actor_id)
                    .from_location(source.location.clone())
                    .to_location(target.location.clone());
                let work = UnitOfWork::new()
                    .with_change(StockChange::new(
                        from,
                        -quantity,
                        Decimal::ZERO,
                        source.version,
                        draft.clone(),
                    ))
                    .with_change(StockChange::new(
                        to,
                        quantity,
                        Decimal::ZERO,
                        target.version,
                        draft,
                    ));

                let outcome = self.store.commit(work).await?;
                let source = outcome
                    .record(from)
                    .cloned()
                    .ok_or(DomainError::StockRecordNotFound(from))?;
                let target = outcome
                    .record(to)
                    .cloned()
                    .ok_or(DomainError::StockRecordNotFound(to))?;
                Ok((source, target))
            })
            .await
    }

    /// Updates thresholds, location, cost or expiry. Writes no movement.
    ///
    /// With `expected_version` the write fails on a stale read; without it the
    /// latest version is used and conflicts are retried.
    #[tracing::instrument(skip(self, settings))]
    pub async fn update_settings(
        &self,
        id: StockRecordId,
        settings: StockSettings,
        expected_version: Option<Version>,
    ) -> Result<StockRecord> {
        if let Some(version) = expected_version {
            let current = self.store.require_stock(id).await?;
            validate_settings(&current, &settings)?;
            return Ok(self
                .store
                .update_stock_settings(id, settings, version)
                .await?);
        }

        self.retry
            .run("update_settings", || async {
                let current = self.store.require_stock(id).await?;
                validate_settings(&current, &settings)?;
                Ok(self
                    .store
                    .update_stock_settings(id, settings.clone(), current.version)
                    .await?)
            })
            .await
    }
}

fn validate_settings(current: &StockRecord, settings: &StockSettings) -> Result<()> {
    let minimum = settings.minimum_threshold.unwrap_or(current.minimum_threshold);
    let maximum = settings.maximum_threshold.or(current.maximum_threshold);
    validate_thresholds(Some(minimum), maximum)
}

fn validate_thresholds(minimum: Option<Decimal>, maximum: Option<Decimal>) -> Result<()> {
    if let Some(minimum) = minimum
        && minimum < Decimal::ZERO
    {
        return Err(DomainError::InvalidInput(
            "minimum threshold must not be negative".to_string(),
        ));
    }
    if let (Some(minimum), Some(maximum)) = (minimum, maximum)
        && maximum < minimum
    {
        return Err(DomainError::InvalidInput(format!(
            "maximum threshold {maximum} is below minimum {minimum}"
        )));
    }
    Ok(())
}
