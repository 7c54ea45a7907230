//! Operation domain events.

use chrono::{DateTime, Utc};
use common::{ActorId, OperationId, OwnerId};
use serde::{Deserialize, Serialize};

use crate::aggregate::DomainEvent;

use super::{DamageRecord, Direction, OperationLine, TransportInfo};

/// Events that can occur on an operation aggregate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum OperationEvent {
    /// Operation was opened.
    Opened(OpenedData),

    /// A line was added (outbound lines hold a reservation from here on).
    LineAdded(LineAddedData),

    /// Damaged units were registered against a line.
    DamageRegistered(DamageRegisteredData),

    /// Movements were committed and the operation closed.
    Closed(ClosedData),

    /// Operation was voided and its reservations released.
    Voided(VoidedData),

    /// A closed or voided operation was soft-deleted.
    Deleted(DeletedData),
}

impl DomainEvent for OperationEvent {
    fn event_type(&self) -> &'static str {
        match self {
            OperationEvent::Opened(_) => "OperationOpened",
            OperationEvent::LineAdded(_) => "LineAdded",
            OperationEvent::DamageRegistered(_) => "DamageRegistered",
            OperationEvent::Closed(_) => "OperationClosed",
            OperationEvent::Voided(_) => "OperationVoided",
            OperationEvent::Deleted(_) => "OperationDeleted",
        }
    }
}

/// Data for the Opened event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenedData {
    pub operation_id: OperationId,
    pub owner_id: OwnerId,
    pub direction: Direction,
    pub external_reference: Option<String>,
    pub transport: TransportInfo,
    pub opened_by: ActorId,
    pub opened_at: DateTime<Utc>,
}

/// Data for the LineAdded event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineAddedData {
    pub line: OperationLine,
}

/// Data for the DamageRegistered event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DamageRegisteredData {
    pub damage: DamageRecord,
}

/// Data for the Closed event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClosedData {
    pub closed_by: ActorId,
    pub closed_at: DateTime<Utc>,
}

/// Data for the Voided event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoidedData {
    pub voided_by: ActorId,
    pub voided_at: DateTime<Utc>,
    pub reason: Option<String>,
}

/// Data for the Deleted event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeletedData {
    pub deleted_by: ActorId,
    pub deleted_at: DateTime<Utc>,
}
