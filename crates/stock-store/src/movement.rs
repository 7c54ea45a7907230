use chrono::{DateTime, Utc};
use common::{ActorId, OperationId, StockRecordId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{Result, StoreError};

/// Sequential identifier of a ledger entry.
///
/// Assigned by the store at commit time; for a single stock record, ids
/// increase in commit order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct MovementId(i64);

impl MovementId {
    /// Creates a movement id from a raw value.
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    /// Returns the raw id value.
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for MovementId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Cause of a ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementKind {
    Receipt,
    Issue,
    Adjustment,
    Reservation,
    Release,
    Transfer,
}

impl MovementKind {
    /// Returns the storage name of the kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementKind::Receipt => "receipt",
            MovementKind::Issue => "issue",
            MovementKind::Adjustment => "adjustment",
            MovementKind::Reservation => "reservation",
            MovementKind::Release => "release",
            MovementKind::Transfer => "transfer",
        }
    }

    /// Returns true if a change with these deltas may be recorded under this kind.
    ///
    /// Reservation and release entries never touch on-hand; receipts only
    /// add on-hand; issues only remove it and may consume a reservation.
    pub fn accepts(&self, on_hand_delta: Decimal, reserved_delta: Decimal) -> bool {
        let zero = Decimal::ZERO;
        match self {
            MovementKind::Receipt => on_hand_delta > zero && reserved_delta == zero,
            MovementKind::Issue => on_hand_delta < zero && reserved_delta <= zero,
            MovementKind::Adjustment => on_hand_delta != zero && reserved_delta == zero,
            MovementKind::Reservation => on_hand_delta == zero && reserved_delta > zero,
            MovementKind::Release => on_hand_delta == zero && reserved_delta < zero,
            MovementKind::Transfer => on_hand_delta != zero && reserved_delta == zero,
        }
    }
}

impl std::fmt::Display for MovementKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MovementKind {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "receipt" => Ok(MovementKind::Receipt),
            "issue" => Ok(MovementKind::Issue),
            "adjustment" => Ok(MovementKind::Adjustment),
            "reservation" => Ok(MovementKind::Reservation),
            "release" => Ok(MovementKind::Release),
            "transfer" => Ok(MovementKind::Transfer),
            other => Err(StoreError::InvalidValue {
                field: "kind",
                value: other.to_string(),
            }),
        }
    }
}

/// Descriptive half of a ledger entry, supplied by the caller of a change.
///
/// Balances, timestamp and id are filled in by the store when the change is
/// committed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementDraft {
    pub kind: MovementKind,
    pub actor_id: ActorId,
    pub operation_id: Option<OperationId>,
    pub reference_document: Option<String>,
    pub reason: Option<String>,
    pub source_location: Option<String>,
    pub destination_location: Option<String>,
}

impl MovementDraft {
    /// Creates a draft with only the kind and actor set.
    pub fn new(kind: MovementKind, actor_id: ActorId) -> Self {
        Self {
            kind,
            actor_id,
            operation_id: None,
            reference_document: None,
            reason: None,
            source_location: None,
            destination_location: None,
        }
    }

    /// Links the entry to an operation.
    pub fn operation(mut self, operation_id: OperationId) -> Self {
        self.operation_id = Some(operation_id);
        self
    }

    /// Sets the reference document.
    pub fn reference(mut self, reference: impl Into<String>) -> Self {
        self.reference_document = Some(reference.into());
        self
    }

    /// Sets the reference document if one is given.
    pub fn maybe_reference(mut self, reference: Option<String>) -> Self {
        if reference.is_some() {
            self.reference_document = reference;
        }
        self
    }

    /// Sets the free-text reason.
    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Sets the origin location.
    pub fn from_location(mut self, location: impl Into<String>) -> Self {
        self.source_location = Some(location.into());
        self
    }

    /// Sets the destination location.
    pub fn to_location(mut self, location: impl Into<String>) -> Self {
        self.destination_location = Some(location.into());
        self
    }
}

/// A validated entry awaiting its sequential id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewMovement {
    pub stock_record_id: StockRecordId,
    pub actor_id: ActorId,
    pub operation_id: Option<OperationId>,
    pub kind: MovementKind,
    pub quantity_delta: Decimal,
    pub balance_before: Decimal,
    pub balance_after: Decimal,
    pub reserved_delta: Decimal,
    pub reserved_after: Decimal,
    pub reference_document: Option<String>,
    pub reason: Option<String>,
    pub source_location: Option<String>,
    pub destination_location: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl NewMovement {
    /// Attaches the id assigned by the store.
    pub fn into_entry(self, id: MovementId) -> MovementEntry {
        MovementEntry {
            id,
            stock_record_id: self.stock_record_id,
            actor_id: self.actor_id,
            operation_id: self.operation_id,
            kind: self.kind,
            quantity_delta: self.quantity_delta,
            balance_before: self.balance_before,
            balance_after: self.balance_after,
            reserved_delta: self.reserved_delta,
            reserved_after: self.reserved_after,
            reference_document: self.reference_document,
            reason: self.reason,
            source_location: self.source_location,
            destination_location: self.destination_location,
            timestamp: self.timestamp,
        }
    }
}

/// Immutable audit entry describing one committed quantity change.
///
/// `quantity_delta`, `balance_before` and `balance_after` describe on-hand
/// quantity; `reserved_delta` and `reserved_after` describe the reservation
/// side of the same change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovementEntry {
    pub id: MovementId,
    pub stock_record_id: StockRecordId,
    pub actor_id: ActorId,
    pub operation_id: Option<OperationId>,
    pub kind: MovementKind,
    pub quantity_delta: Decimal,
    pub balance_before: Decimal,
    pub balance_after: Decimal,
    pub reserved_delta: Decimal,
    pub reserved_after: Decimal,
    pub reference_document: Option<String>,
    pub reason: Option<String>,
    pub source_location: Option<String>,
    pub destination_location: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn kind_accepts_only_matching_deltas() {
        assert!(MovementKind::Receipt.accepts(dec!(5), dec!(0)));
        assert!(!MovementKind::Receipt.accepts(dec!(-5), dec!(0)));

        assert!(MovementKind::Issue.accepts(dec!(-5), dec!(-5)));
        assert!(MovementKind::Issue.accepts(dec!(-5), dec!(0)));
        assert!(!MovementKind::Issue.accepts(dec!(-5), dec!(5)));

        assert!(MovementKind::Reservation.accepts(dec!(0), dec!(3)));
        assert!(!MovementKind::Reservation.accepts(dec!(1), dec!(3)));

        assert!(MovementKind::Release.accepts(dec!(0), dec!(-3)));
        assert!(!MovementKind::Release.accepts(dec!(0), dec!(3)));

        assert!(MovementKind::Adjustment.accepts(dec!(-2), dec!(0)));
        assert!(!MovementKind::Adjustment.accepts(dec!(0), dec!(0)));
    }

    #[test]
    fn kind_parses_storage_names() {
        for kind in [
            MovementKind::Receipt,
            MovementKind::Issue,
            MovementKind::Adjustment,
            MovementKind::Reservation,
            MovementKind::Release,
            MovementKind::Transfer,
        ] {
            assert_eq!(kind.as_str().parse::<MovementKind>().unwrap(), kind);
        }
    }

    #[test]
    fn draft_builder_sets_optional_fields() {
        let operation_id = OperationId::new();
        let draft = MovementDraft::new(MovementKind::Transfer, ActorId::new())
            .operation(operation_id)
            .reference("DOC-9")
            .from_location("A-01")
            .to_location("B-02");

        assert_eq!(draft.operation_id, Some(operation_id));
        assert_eq!(draft.reference_document.as_deref(), Some("DOC-9"));
        assert_eq!(draft.source_location.as_deref(), Some("A-01"));
        assert_eq!(draft.destination_location.as_deref(), Some("B-02"));
    }

    #[test]
    fn maybe_reference_keeps_existing_on_none() {
        let draft = MovementDraft::new(MovementKind::Adjustment, ActorId::new())
            .reference("R-1")
            .maybe_reference(None);
        assert_eq!(draft.reference_document.as_deref(), Some("R-1"));
    }
}
