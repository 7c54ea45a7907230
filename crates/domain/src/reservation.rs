//! Reservation manager: soft holds on available quantity.
//!
//! A reservation raises `reserved_quantity` without touching on-hand stock.
//! It is later either released (hold dropped) or committed (hold and on-hand
//! both reduced by an `issue` entry).

use common::{ActorId, OperationId, StockRecordId};
use rust_decimal::Decimal;
use stock_store::{
    InventoryStore, InventoryStoreExt, MovementDraft, MovementKind, StockChange, StockRecord,
    Version,
};

use crate::error::{DomainError, Result};
use crate::retry::RetryPolicy;

/// Who is acting, and on behalf of which operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HoldContext {
    pub actor_id: ActorId,
    pub operation_id: Option<OperationId>,
}

impl HoldContext {
    /// A hold made directly by an actor.
    pub fn actor(actor_id: ActorId) -> Self {
        Self {
            actor_id,
            operation_id: None,
        }
    }

    /// A hold made on behalf of an operation.
    pub fn for_operation(actor_id: ActorId, operation_id: OperationId) -> Self {
        Self {
            actor_id,
            operation_id: Some(operation_id),
        }
    }

    fn draft(&self, kind: MovementKind) -> MovementDraft {
        let draft = MovementDraft::new(kind, self.actor_id);
        match self.operation_id {
            Some(id) => draft.operation(id),
            None => draft,
        }
    }
}

fn positive(quantity: Decimal) -> Result<()> {
    if quantity <= Decimal::ZERO {
        return Err(DomainError::InvalidInput(format!(
            "quantity must be positive, got {quantity}"
        )));
    }
    Ok(())
}

/// Change that raises the reserved quantity by `quantity`.
pub fn reserve_change(
    id: StockRecordId,
    quantity: Decimal,
    expected_version: Version,
    context: HoldContext,
) -> StockChange {
    StockChange::new(
        id,
        Decimal::ZERO,
        quantity,
        expected_version,
        context.draft(MovementKind::Reservation),
    )
}

/// Change that lowers the reserved quantity by `quantity`.
pub fn release_change(
    id: StockRecordId,
    quantity: Decimal,
    expected_version: Version,
    context: HoldContext,
) -> StockChange {
    StockChange::new(
        id,
        Decimal::ZERO,
        -quantity,
        expected_version,
        context.draft(MovementKind::Release),
    )
}

/// Change that converts `quantity` reserved units into an issue.
pub fn commit_change(
    id: StockRecordId,
    quantity: Decimal,
    expected_version: Version,
    context: HoldContext,
) -> StockChange {
    StockChange::new(
        id,
        -quantity,
        -quantity,
        expected_version,
        context.draft(MovementKind::Issue),
    )
}

/// Service for reserving, releasing and committing held quantity.
#[derive(Clone)]
pub struct ReservationManager<S: InventoryStore> {
    store: S,
    retry: RetryPolicy,
}

impl<S: InventoryStore + Clone> ReservationManager<S> {
    /// Creates a new reservation manager with the default retry policy.
    pub fn new(store: S) -> Self {
        Self::with_retry(store, RetryPolicy::default())
    }

    /// Creates a new reservation manager with a custom retry policy.
    pub fn with_retry(store: S, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    /// Reserves `quantity` against the version the caller read.
    ///
    /// Fails with `InsufficientStock` when `quantity` exceeds the available
    /// quantity and with `Conflict` when the version is stale.
    #[tracing::instrument(skip(self))]
    pub async fn reserve(
        &self,
        id: StockRecordId,
        quantity: Decimal,
        expected_version: Version,
        context: HoldContext,
    ) -> Result<StockRecord> {
        positive(quantity)?;
        let change = reserve_change(id, quantity, expected_version, context);
        match self.store.apply_change(change).await {
            Ok((record, _)) => Ok(record),
            Err(err) => {
                let err = DomainError::from(err);
                if matches!(err, DomainError::InsufficientStock { .. }) {
                    metrics::counter!("reservations_rejected_total").increment(1);
                }
                Err(err)
            }
        }
    }

    /// Releases `quantity` previously reserved.
    #[tracing::instrument(skip(self))]
    pub async fn release(
        &self,
        id: StockRecordId,
        quantity: Decimal,
        expected_version: Version,
        context: HoldContext,
    ) -> Result<StockRecord> {
        positive(quantity)?;
        let change = release_change(id, quantity, expected_version, context);
        Ok(self.store.apply_change(change).await?.0)
    }

    /// Issues `quantity` reserved units, lowering on-hand and reserved together.
    #[tracing::instrument(skip(self))]
    pub async fn commit(
        &self,
        id: StockRecordId,
        quantity: Decimal,
        expected_version: Version,
        context: HoldContext,
    ) -> Result<StockRecord> {
        positive(quantity)?;
        let change = commit_change(id, quantity, expected_version, context);
        Ok(self.store.apply_change(change).await?.0)
    }

    /// Reserves against the latest version, retrying on conflict.
    pub async fn reserve_latest(
        &self,
        id: StockRecordId,
        quantity: Decimal,
        context: HoldContext,
    ) -> Result<StockRecord> {
        self.retry
            .run("reserve", || async {
                let current = self.store.require_stock(id).await?;
                self.reserve(id, quantity, current.version, context).await
            })
            .await
    }

    /// Releases against the latest version, retrying on conflict.
    pub async fn release_latest(
        &self,
        id: StockRecordId,
        quantity: Decimal,
        context: HoldContext,
    ) -> Result<StockRecord> {
        self.retry
            .run("release", || async {
                let current = self.store.require_stock(id).await?;
                self.release(id, quantity, current.version, context).await
            })
            .await
    }

    /// Commits against the latest version, retrying on conflict.
    pub async fn commit_latest(
        &self,
        id: StockRecordId,
        quantity: Decimal,
        context: HoldContext,
    ) -> Result<StockRecord> {
        self.retry
            .run("commit", || async {
                let current = self.store.require_stock(id).await?;
                self.commit(id, quantity, current.version, context).await
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::OwnerId;
    use rust_decimal_macros::dec;
    use stock_store::{InMemoryInventoryStore, StockInit, StockKey};

    async fn stocked(on_hand: Decimal) -> (ReservationManager<InMemoryInventoryStore>, InMemoryInventoryStore, StockRecord) {
        let store = InMemoryInventoryStore::new();
        let record = store
            .upsert_stock(StockKey::new(OwnerId::new(), "SKU-R", None), StockInit::default())
            .await
            .unwrap();
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
        (ReservationManager::new(store.clone()), store, record)
    }

    #[tokio::test]
    async fn reserve_release_round_trip_leaves_on_hand_untouched() {
        let (manager, store, record) = stocked(dec!(20)).await;
        let context = HoldContext::actor(ActorId::new());

        let held = manager
            .reserve(record.id, dec!(8), record.version, context)
            .await
            .unwrap();
        assert_eq!(held.reserved_quantity, dec!(8));
        assert_eq!(held.available_quantity(), dec!(12));

        let released = manager
            .release(record.id, dec!(8), held.version, context)
            .await
            .unwrap();
        assert_eq!(released.reserved_quantity, record.reserved_quantity);
        assert_eq!(released.on_hand_quantity, dec!(20));

        let history = store.movements_for(record.id).await.unwrap();
        let holds: Vec<_> = history.iter().skip(1).collect();
        assert_eq!(holds.len(), 2);
        assert_eq!(holds[0].kind, MovementKind::Reservation);
        assert_eq!(holds[1].kind, MovementKind::Release);
        assert!(holds.iter().all(|m| m.quantity_delta.is_zero()));
        assert_eq!(holds[0].reserved_delta + holds[1].reserved_delta, Decimal::ZERO);
    }

    #[tokio::test]
    async fn reserve_beyond_available_fails() {
        let (manager, _, record) = stocked(dec!(5)).await;

        let result = manager
            .reserve(record.id, dec!(6), record.version, HoldContext::actor(ActorId::new()))
            .await;
        assert!(matches!(result, Err(DomainError::InsufficientStock { .. })));
    }

    #[tokio::test]
    async fn release_more_than_reserved_fails() {
        let (manager, _, record) = stocked(dec!(5)).await;
        let context = HoldContext::actor(ActorId::new());
        let held = manager
            .reserve(record.id, dec!(2), record.version, context)
            .await
            .unwrap();

        let result = manager.release(record.id, dec!(3), held.version, context).await;
        assert!(matches!(
            result,
            Err(DomainError::ReleaseExceedsReserved { .. })
        ));
    }

    #[tokio::test]
    async fn commit_issues_reserved_units() {
        let (manager, store, record) = stocked(dec!(100)).await;
        let context = HoldContext::actor(ActorId::new());

        manager.reserve_latest(record.id, dec!(30), context).await.unwrap();
        let committed = manager.commit_latest(record.id, dec!(30), context).await.unwrap();

        assert_eq!(committed.on_hand_quantity, dec!(70));
        assert_eq!(committed.reserved_quantity, dec!(0));

        let issue = store.movements_for(record.id).await.unwrap().pop().unwrap();
        assert_eq!(issue.kind, MovementKind::Issue);
        assert_eq!(issue.quantity_delta, dec!(-30));
        assert_eq!(issue.balance_before, dec!(100));
        assert_eq!(issue.balance_after, dec!(70));
    }

    #[tokio::test]
    async fn zero_quantity_is_rejected() {
        let (manager, _, record) = stocked(dec!(5)).await;
        let result = manager
            .reserve(record.id, dec!(0), record.version, HoldContext::actor(ActorId::new()))
            .await;
        assert!(matches!(result, Err(DomainError::InvalidInput(_))));
    }
}
