//! Operation aggregate implementation.

use chrono::{DateTime, Datelike, Utc};
use common::{ActorId, DamageId, LineId, OperationId, OwnerId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use stock_store::{NewOperation, OperationRow, Version};

use crate::aggregate::Aggregate;
use crate::error::DomainError;

use super::{
    DamageRecord, Direction, OperationError, OperationEvent, OperationLine, OperationStatus,
    OperationTotals, TransportInfo,
    events::{
        ClosedData, DamageRegisteredData, DeletedData, LineAddedData, OpenedData, VoidedData,
    },
};

/// Operation aggregate root.
///
/// Owns its lines and damages. Header fields (`reference_code`, `year`,
/// `sequence`, `version`) are assigned by the store and restored from the
/// row when the operation is loaded.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Operation {
    id: Option<OperationId>,

    #[serde(default)]
    reference_code: String,

    #[serde(default)]
    year: i32,

    #[serde(default)]
    sequence: i64,

    #[serde(default)]
    version: Version,

    owner_id: Option<OwnerId>,
    direction: Direction,
    status: OperationStatus,
    external_reference: Option<String>,

    #[serde(default)]
    transport: TransportInfo,

    lines: Vec<OperationLine>,
    damages: Vec<DamageRecord>,
    totals: OperationTotals,

    opened_by: Option<ActorId>,
    created_at: Option<DateTime<Utc>>,
    closed_at: Option<DateTime<Utc>>,
    closed_by: Option<ActorId>,
    voided_at: Option<DateTime<Utc>>,
    void_reason: Option<String>,
    deleted_at: Option<DateTime<Utc>>,
}

impl Aggregate for Operation {
    type Event = OperationEvent;
    type Error = OperationError;
    type Id = OperationId;

    fn aggregate_type() -> &'static str {
        "Operation"
    }

    fn id(&self) -> Option<OperationId> {
        self.id
    }

    fn version(&self) -> Version {
        self.version
    }

    fn set_version(&mut self, version: Version) {
        self.version = version;
    }

    fn apply(&mut self, event: Self::Event) {
        match event {
            OperationEvent::Opened(data) => self.apply_opened(data),
            OperationEvent::LineAdded(data) => self.apply_line_added(data),
            OperationEvent::DamageRegistered(data) => self.apply_damage_registered(data),
            OperationEvent::Closed(data) => {
                self.status = OperationStatus::Closed;
                self.closed_at = Some(data.closed_at);
                self.closed_by = Some(data.closed_by);
            }
            OperationEvent::Voided(data) => {
                self.status = OperationStatus::Voided;
                self.voided_at = Some(data.voided_at);
                self.void_reason = data.reason;
            }
            OperationEvent::Deleted(data) => {
                self.deleted_at = Some(data.deleted_at);
            }
        }
    }
}

// Query methods
impl Operation {
    pub fn reference_code(&self) -> &str {
        &self.reference_code
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn sequence(&self) -> i64 {
        self.sequence
    }

    pub fn owner_id(&self) -> Option<OwnerId> {
        self.owner_id
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn status(&self) -> OperationStatus {
        self.status
    }

    pub fn external_reference(&self) -> Option<&str> {
        self.external_reference.as_deref()
    }

    pub fn transport(&self) -> &TransportInfo {
        &self.transport
    }

    pub fn lines(&self) -> &[OperationLine] {
        &self.lines
    }

    /// Returns a line by id.
    pub fn line(&self, line_id: LineId) -> Option<&OperationLine> {
        self.lines.iter().find(|l| l.id == line_id)
    }

    pub fn damages(&self) -> &[DamageRecord] {
        &self.damages
    }

    pub fn totals(&self) -> &OperationTotals {
        &self.totals
    }

    pub fn opened_by(&self) -> Option<ActorId> {
        self.opened_by
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn closed_at(&self) -> Option<DateTime<Utc>> {
        self.closed_at
    }

    pub fn closed_by(&self) -> Option<ActorId> {
        self.closed_by
    }

    pub fn voided_at(&self) -> Option<DateTime<Utc>> {
        self.voided_at
    }

    pub fn void_reason(&self) -> Option<&str> {
        self.void_reason.as_deref()
    }

    pub fn deleted_at(&self) -> Option<DateTime<Utc>> {
        self.deleted_at
    }

    /// Returns true if the operation has been soft-deleted.
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    fn invalid(&self, action: &'static str) -> OperationError {
        OperationError::InvalidStateTransition {
            reference: self.reference_code.clone(),
            current: self.status,
            action,
        }
    }

    fn ensure_live(&self) -> Result<(), OperationError> {
        if self.is_deleted() {
            return Err(OperationError::Deleted {
                reference: self.reference_code.clone(),
            });
        }
        Ok(())
    }
}

// Command methods (return events)
impl Operation {
    /// Opens a new operation.
    pub fn open(
        &self,
        data: OpenedData,
    ) -> Result<Vec<OperationEvent>, OperationError> {
        if self.id.is_some() {
            return Err(OperationError::AlreadyOpened);
        }
        Ok(vec![OperationEvent::Opened(data)])
    }

    /// Adds a line. The first line moves the operation to in-progress.
    pub fn add_line(&self, line: OperationLine) -> Result<Vec<OperationEvent>, OperationError> {
        self.check_line(line.quantity)?;
        Ok(vec![OperationEvent::LineAdded(LineAddedData { line })])
    }

    /// Checks that a line of `quantity` units could be added right now.
    pub fn check_line(&self, quantity: Decimal) -> Result<(), OperationError> {
        self.ensure_live()?;
        if !self.status.can_add_line() {
            return Err(self.invalid("add a line to"));
        }
        if quantity <= Decimal::ZERO {
            return Err(OperationError::InvalidQuantity { quantity });
        }
        Ok(())
    }

    /// Registers damaged units on a line.
    ///
    /// The quantity may not exceed the line's remaining good units.
    pub fn register_damage(
        &self,
        line_id: LineId,
        quantity: Decimal,
        damage_type: &str,
        evidence_ref: Option<String>,
        actor_id: ActorId,
        at: DateTime<Utc>,
    ) -> Result<Vec<OperationEvent>, OperationError> {
        self.ensure_live()?;
        if !self.status.can_register_damage() {
            return Err(self.invalid("register damage on"));
        }
        if quantity <= Decimal::ZERO {
            return Err(OperationError::InvalidQuantity { quantity });
        }
        if damage_type.trim().is_empty() {
            return Err(OperationError::MissingDamageType);
        }

        let line = self
            .line(line_id)
            .ok_or(OperationError::LineNotFound { line_id })?;
        let remaining = line.good_quantity();
        if quantity > remaining {
            return Err(OperationError::ExceedsAvailable {
                line_id,
                requested: quantity,
                remaining,
            });
        }

        Ok(vec![OperationEvent::DamageRegistered(DamageRegisteredData {
            damage: DamageRecord {
                id: DamageId::new(),
                line_id,
                quantity,
                damage_type: damage_type.trim().to_string(),
                evidence_ref,
                registered_by: actor_id,
                registered_at: at,
            },
        })])
    }

    /// Closes the operation. Only an in-progress operation can be closed, so
    /// a second close is rejected.
    pub fn close(
        &self,
        actor_id: ActorId,
        at: DateTime<Utc>,
    ) -> Result<Vec<OperationEvent>, OperationError> {
        self.ensure_live()?;
        if !self.status.can_close() {
            return Err(self.invalid("close"));
        }
        Ok(vec![OperationEvent::Closed(ClosedData {
            closed_by: actor_id,
            closed_at: at,
        })])
    }

    /// Voids a pending or in-progress operation.
    pub fn void(
        &self,
        actor_id: ActorId,
        at: DateTime<Utc>,
        reason: Option<String>,
    ) -> Result<Vec<OperationEvent>, OperationError> {
        self.ensure_live()?;
        if !self.status.can_void() {
            return Err(self.invalid("void"));
        }
        Ok(vec![OperationEvent::Voided(VoidedData {
            voided_by: actor_id,
            voided_at: at,
            reason,
        })])
    }

    /// Soft-deletes a closed or voided operation.
    pub fn delete(
        &self,
        actor_id: ActorId,
        at: DateTime<Utc>,
    ) -> Result<Vec<OperationEvent>, OperationError> {
        self.ensure_live()?;
        if !self.status.is_terminal() {
            return Err(self.invalid("delete"));
        }
        Ok(vec![OperationEvent::Deleted(DeletedData {
            deleted_by: actor_id,
            deleted_at: at,
        })])
    }
}

// Persistence
impl Operation {
    /// Rebuilds an operation from its stored row.
    pub fn from_row(row: &OperationRow) -> Result<Self, DomainError> {
        let mut operation: Operation = serde_json::from_value(row.state.clone())?;
        operation.id = Some(row.id);
        operation.reference_code = row.reference_code.clone();
        operation.year = row.year;
        operation.sequence = row.sequence;
        operation.version = row.version;
        operation.owner_id = Some(row.owner_id);
        operation.status = row.status.parse()?;
        operation.direction = row.direction.parse()?;
        operation.deleted_at = row.deleted_at;
        Ok(operation)
    }

    /// Builds the insert for a freshly opened operation.
    pub fn to_new_operation(&self) -> Result<NewOperation, DomainError> {
        let (Some(id), Some(owner_id), Some(created_at)) =
            (self.id, self.owner_id, self.created_at)
        else {
            return Err(DomainError::InvalidInput(
                "operation has not been opened".to_string(),
            ));
        };

        Ok(NewOperation {
            id,
            year: created_at.year(),
            owner_id,
            direction: self.direction.as_str().to_string(),
            status: self.status.as_str().to_string(),
            created_at,
            state: serde_json::to_value(self)?,
        })
    }

    /// Builds the replacement row carrying this operation's current state.
    pub fn to_row(&self, current: &OperationRow) -> Result<OperationRow, DomainError> {
        Ok(current.with_state(
            self.status.as_str(),
            self.deleted_at,
            serde_json::to_value(self)?,
        ))
    }
}

// Apply event helpers
impl Operation {
    fn apply_opened(&mut self, data: OpenedData) {
        self.id = Some(data.operation_id);
        self.owner_id = Some(data.owner_id);
        self.direction = data.direction;
        self.status = OperationStatus::Pending;
        self.external_reference = data.external_reference;
        self.transport = data.transport;
        self.opened_by = Some(data.opened_by);
        self.created_at = Some(data.opened_at);
    }

    fn apply_line_added(&mut self, data: LineAddedData) {
        self.totals.line_count += 1;
        self.totals.unit_count += data.line.quantity;
        self.totals.damaged_units += data.line.damaged_quantity;
        self.lines.push(data.line);
        if self.status == OperationStatus::Pending {
            self.status = OperationStatus::InProgress;
        }
    }

    fn apply_damage_registered(&mut self, data: DamageRegisteredData) {
        let damage = data.damage;
        if let Some(line) = self.lines.iter_mut().find(|l| l.id == damage.line_id) {
            line.damaged_quantity += damage.quantity;
        }
        self.totals.damaged_units += damage.quantity;
        self.damages.push(damage);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::StockRecordId;
    use rust_decimal_macros::dec;
    use stock_store::ProductCode;

    fn opened(direction: Direction) -> Operation {
        let mut operation = Operation::default();
        let events = operation
            .open(OpenedData {
                operation_id: OperationId::new(),
                owner_id: OwnerId::new(),
                direction,
                external_reference: Some("PO-77".to_string()),
                transport: TransportInfo::default(),
                opened_by: ActorId::new(),
                opened_at: Utc::now(),
            })
            .unwrap();
        operation.apply_events(events);
        operation
    }

    fn line(quantity: Decimal) -> OperationLine {
        OperationLine {
            id: LineId::new(),
            stock_record_id: Some(StockRecordId::new()),
            product_code: ProductCode::new("SKU-1"),
            quantity,
            damaged_quantity: Decimal::ZERO,
            lot: None,
            expiry_date: None,
        }
    }

    fn with_line(quantity: Decimal) -> (Operation, LineId) {
        let mut operation = opened(Direction::Outbound);
        let line = line(quantity);
        let line_id = line.id;
        let events = operation.add_line(line).unwrap();
        operation.apply_events(events);
        (operation, line_id)
    }

    #[test]
    fn open_sets_pending() {
        let operation = opened(Direction::Inbound);
        assert!(operation.id().is_some());
        assert_eq!(operation.status(), OperationStatus::Pending);
        assert_eq!(operation.external_reference(), Some("PO-77"));
        assert_eq!(Operation::aggregate_type(), "Operation");
    }

    #[test]
    fn cannot_open_twice() {
        let operation = opened(Direction::Inbound);
        let result = operation.open(OpenedData {
            operation_id: OperationId::new(),
            owner_id: OwnerId::new(),
            direction: Direction::Inbound,
            external_reference: None,
            transport: TransportInfo::default(),
            opened_by: ActorId::new(),
            opened_at: Utc::now(),
        });
        assert_eq!(result.unwrap_err(), OperationError::AlreadyOpened);
    }

    #[test]
    fn first_line_moves_to_in_progress_and_updates_totals() {
        let (operation, _) = with_line(dec!(10));
        assert_eq!(operation.status(), OperationStatus::InProgress);
        assert_eq!(operation.totals().line_count, 1);
        assert_eq!(operation.totals().unit_count, dec!(10));
    }

    #[test]
    fn zero_quantity_line_is_rejected() {
        let operation = opened(Direction::Inbound);
        let result = operation.add_line(line(dec!(0)));
        assert!(matches!(result, Err(OperationError::InvalidQuantity { .. })));
    }

    #[test]
    fn damage_updates_line_and_totals() {
        let (mut operation, line_id) = with_line(dec!(10));
        let events = operation
            .register_damage(line_id, dec!(3), "crushed", None, ActorId::new(), Utc::now())
            .unwrap();
        operation.apply_events(events);

        assert_eq!(operation.line(line_id).unwrap().damaged_quantity, dec!(3));
        assert_eq!(operation.line(line_id).unwrap().good_quantity(), dec!(7));
        assert_eq!(operation.totals().damaged_units, dec!(3));
        assert_eq!(operation.damages().len(), 1);
    }

    #[test]
    fn damage_cannot_exceed_remaining_good_units() {
        let (mut operation, line_id) = with_line(dec!(10));
        let events = operation
            .register_damage(line_id, dec!(8), "wet", None, ActorId::new(), Utc::now())
            .unwrap();
        operation.apply_events(events);

        let result =
            operation.register_damage(line_id, dec!(3), "wet", None, ActorId::new(), Utc::now());
        assert_eq!(
            result.unwrap_err(),
            OperationError::ExceedsAvailable {
                line_id,
                requested: dec!(3),
                remaining: dec!(2),
            }
        );
    }

    #[test]
    fn damage_requires_in_progress() {
        let operation = opened(Direction::Inbound);
        let result =
            operation.register_damage(LineId::new(), dec!(1), "wet", None, ActorId::new(), Utc::now());
        assert!(matches!(
            result,
            Err(OperationError::InvalidStateTransition { .. })
        ));
    }

    #[test]
    fn close_only_once() {
        let (mut operation, _) = with_line(dec!(1));
        let events = operation.close(ActorId::new(), Utc::now()).unwrap();
        operation.apply_events(events);

        assert_eq!(operation.status(), OperationStatus::Closed);
        assert!(operation.closed_at().is_some());
        assert!(matches!(
            operation.close(ActorId::new(), Utc::now()),
            Err(OperationError::InvalidStateTransition { action: "close", .. })
        ));
    }

    #[test]
    fn pending_operation_cannot_close() {
        let operation = opened(Direction::Outbound);
        assert!(operation.close(ActorId::new(), Utc::now()).is_err());
    }

    #[test]
    fn closed_operation_cannot_take_lines_or_void() {
        let (mut operation, _) = with_line(dec!(1));
        let events = operation.close(ActorId::new(), Utc::now()).unwrap();
        operation.apply_events(events);

        assert!(operation.add_line(line(dec!(1))).is_err());
        assert!(operation.void(ActorId::new(), Utc::now(), None).is_err());
    }

    #[test]
    fn delete_requires_terminal_status() {
        let (mut operation, _) = with_line(dec!(1));
        assert!(operation.delete(ActorId::new(), Utc::now()).is_err());

        let events = operation
            .void(ActorId::new(), Utc::now(), Some("customer cancelled".to_string()))
            .unwrap();
        operation.apply_events(events);
        let events = operation.delete(ActorId::new(), Utc::now()).unwrap();
        operation.apply_events(events);

        assert!(operation.is_deleted());
        assert!(matches!(
            operation.delete(ActorId::new(), Utc::now()),
            Err(OperationError::Deleted { .. })
        ));
    }

    #[test]
    fn row_round_trip_restores_header_fields() {
        let (operation, line_id) = with_line(dec!(4));
        let row = operation.to_new_operation().unwrap().into_row(9);

        let loaded = Operation::from_row(&row).unwrap();
        assert_eq!(loaded.reference_code(), row.reference_code);
        assert_eq!(loaded.sequence(), 9);
        assert_eq!(loaded.version(), Version::first());
        assert_eq!(loaded.status(), OperationStatus::InProgress);
        assert!(loaded.line(line_id).is_some());
    }
}
