use chrono::{DateTime, NaiveDate, Utc};
use common::{OwnerId, StockRecordId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::movement::NewMovement;
use crate::store::StockChange;
use crate::{Result, StoreError};

/// Version number of a stock record or operation row, used for optimistic
/// concurrency control.
///
/// A freshly created row starts at version 1 and every successful write
/// increments it by exactly one.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Version(i64);

impl Version {
    /// Creates a new version from a raw value.
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    /// Returns the version a row is created with.
    pub fn first() -> Self {
        Self(1)
    }

    /// Returns the next version.
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    /// Returns the raw version value.
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for Version {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

/// Product identifier (SKU) as used by the owning client.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductCode(String);

impl ProductCode {
    /// Creates a product code from a string.
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    /// Returns the product code as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ProductCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ProductCode {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ProductCode {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Lifecycle state of the units held by a stock record.
///
/// Only `Available` units can be reserved or issued by an outbound
/// operation. Damaged units stay on hand in a sibling record with the
/// `Damaged` state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    #[default]
    Available,
    Damaged,
    Quarantined,
    Expired,
}

impl LifecycleState {
    /// Returns the storage name of the state.
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Available => "available",
            LifecycleState::Damaged => "damaged",
            LifecycleState::Quarantined => "quarantined",
            LifecycleState::Expired => "expired",
        }
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for LifecycleState {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "available" => Ok(LifecycleState::Available),
            "damaged" => Ok(LifecycleState::Damaged),
            "quarantined" => Ok(LifecycleState::Quarantined),
            "expired" => Ok(LifecycleState::Expired),
            other => Err(StoreError::InvalidValue {
                field: "lifecycle_state",
                value: other.to_string(),
            }),
        }
    }
}

/// Natural identity of a stock record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StockKey {
    pub owner_id: OwnerId,
    pub product_code: ProductCode,
    pub lot: Option<String>,
    pub lifecycle_state: LifecycleState,
}

impl StockKey {
    /// Key of the sellable record for a product and optional lot.
    pub fn new(owner_id: OwnerId, product_code: impl Into<ProductCode>, lot: Option<String>) -> Self {
        Self {
            owner_id,
            product_code: product_code.into(),
            lot: lot.filter(|l| !l.is_empty()),
            lifecycle_state: LifecycleState::Available,
        }
    }

    /// Returns the same key for a different lifecycle state.
    pub fn with_state(mut self, state: LifecycleState) -> Self {
        self.lifecycle_state = state;
        self
    }
}

/// Attributes a stock record is created with on first sight.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StockInit {
    pub location: String,
    pub minimum_threshold: Decimal,
    pub maximum_threshold: Option<Decimal>,
    pub expiry_date: Option<NaiveDate>,
    pub unit_cost: Option<Decimal>,
}

/// Partial update of non-quantity attributes. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StockSettings {
    pub minimum_threshold: Option<Decimal>,
    pub maximum_threshold: Option<Decimal>,
    pub location: Option<String>,
    pub unit_cost: Option<Decimal>,
    pub expiry_date: Option<NaiveDate>,
}

/// Current-quantity row for one product (and lot) owned by one client.
///
/// Invariant: `0 <= reserved_quantity <= on_hand_quantity`. Quantities only
/// change through [`StockRecord::apply_change`], which also produces the
/// matching ledger entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockRecord {
    pub id: StockRecordId,
    pub owner_id: OwnerId,
    pub product_code: ProductCode,
    pub lot: Option<String>,
    pub lifecycle_state: LifecycleState,
    pub on_hand_quantity: Decimal,
    pub reserved_quantity: Decimal,
    pub minimum_threshold: Decimal,
    pub maximum_threshold: Option<Decimal>,
    pub location: String,
    pub expiry_date: Option<NaiveDate>,
    pub unit_cost: Option<Decimal>,
    pub version: Version,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StockRecord {
    /// Creates an empty record for the given key.
    pub fn new(key: StockKey, init: StockInit) -> Self {
        let now = Utc::now();
        Self {
            id: StockRecordId::new(),
            owner_id: key.owner_id,
            product_code: key.product_code,
            lot: key.lot,
            lifecycle_state: key.lifecycle_state,
            on_hand_quantity: Decimal::ZERO,
            reserved_quantity: Decimal::ZERO,
            minimum_threshold: init.minimum_threshold,
            maximum_threshold: init.maximum_threshold,
            location: init.location,
            expiry_date: init.expiry_date,
            unit_cost: init.unit_cost,
            version: Version::first(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns the natural key of this record.
    pub fn key(&self) -> StockKey {
        StockKey {
            owner_id: self.owner_id,
            product_code: self.product_code.clone(),
            lot: self.lot.clone(),
            lifecycle_state: self.lifecycle_state,
        }
    }

    /// On-hand quantity not held by a reservation.
    pub fn available_quantity(&self) -> Decimal {
        self.on_hand_quantity - self.reserved_quantity
    }

    /// Returns true if a minimum is configured and on-hand is at or below it.
    pub fn is_low_stock(&self) -> bool {
        self.minimum_threshold > Decimal::ZERO && self.on_hand_quantity <= self.minimum_threshold
    }

    /// Days from `today` until expiry; negative once expired.
    pub fn days_until_expiry(&self, today: NaiveDate) -> Option<i64> {
        self.expiry_date
            .map(|expiry| expiry.signed_duration_since(today).num_days())
    }

    /// Applies a non-quantity settings patch.
    pub fn with_settings(&self, settings: &StockSettings, at: DateTime<Utc>) -> Self {
        let mut next = self.clone();
        if let Some(minimum) = settings.minimum_threshold {
            next.minimum_threshold = minimum;
        }
        if let Some(maximum) = settings.maximum_threshold {
            next.maximum_threshold = Some(maximum);
        }
        if let Some(ref location) = settings.location {
            next.location = location.clone();
        }
        if let Some(cost) = settings.unit_cost {
            next.unit_cost = Some(cost);
        }
        if let Some(expiry) = settings.expiry_date {
            next.expiry_date = Some(expiry);
        }
        next.version = self.version.next();
        next.updated_at = at;
        next
    }

    /// Validates a quantity change against this record's current values and
    /// returns the updated record together with the ledger entry to append.
    ///
    /// Fails with `VersionConflict` if `change.expected_version` is stale,
    /// `ReservationUnderflow` if more would be released than is reserved, and
    /// `InsufficientStock` if on-hand or available quantity would go negative.
    pub fn apply_change(
        &self,
        change: &StockChange,
        at: DateTime<Utc>,
    ) -> Result<(StockRecord, NewMovement)> {
        if change.stock_record_id != self.id {
            return Err(StoreError::InvalidChange(format!(
                "change for {} applied to record {}",
                change.stock_record_id, self.id
            )));
        }

        if change.expected_version != self.version {
            return Err(StoreError::VersionConflict {
                entity: "stock_record",
                id: self.id.to_string(),
                expected: change.expected_version,
                actual: self.version,
            });
        }

        let on_hand = self.on_hand_quantity + change.on_hand_delta;
        let reserved = self.reserved_quantity + change.reserved_delta;

        if reserved < Decimal::ZERO {
            return Err(StoreError::ReservationUnderflow {
                stock_record_id: self.id,
                requested: -change.reserved_delta,
                reserved: self.reserved_quantity,
            });
        }

        if on_hand < Decimal::ZERO || reserved > on_hand {
            let requested =
                (change.reserved_delta - change.on_hand_delta).max(-change.on_hand_delta);
            return Err(StoreError::InsufficientStock {
                stock_record_id: self.id,
                requested,
                available: self.available_quantity(),
            });
        }

        let movement = NewMovement {
            stock_record_id: self.id,
            actor_id: change.movement.actor_id,
            operation_id: change.movement.operation_id,
            kind: change.movement.kind,
            quantity_delta: change.on_hand_delta,
            balance_before: self.on_hand_quantity,
            balance_after: on_hand,
            reserved_delta: change.reserved_delta,
            reserved_after: reserved,
            reference_document: change.movement.reference_document.clone(),
            reason: change.movement.reason.clone(),
            source_location: change.movement.source_location.clone(),
            destination_location: change.movement.destination_location.clone(),
            timestamp: at,
        };

        let mut next = self.clone();
        next.on_hand_quantity = on_hand;
        next.reserved_quantity = reserved;
        next.version = self.version.next();
        next.updated_at = at;

        Ok((next, movement))
    }
}
