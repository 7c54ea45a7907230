//! Operation aggregate: multi-line inbound and outbound transactions.

mod aggregate;
mod events;
mod state;
mod value_objects;
mod workflow;

pub use aggregate::Operation;
pub use events::{
    ClosedData, DamageRegisteredData, DeletedData, LineAddedData, OpenedData, OperationEvent,
    VoidedData,
};
pub use state::{Direction, OperationStatus};
pub use value_objects::{DamageRecord, OperationLine, OperationTotals, TransportInfo};
pub use workflow::{
    CloseSummary, NewDamage, NewLine, OpenOperation, OperationQuery, OperationWorkflow,
};

use common::LineId;
use rust_decimal::Decimal;
use thiserror::Error;

/// Errors raised by the operation aggregate.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum OperationError {
    /// The operation has already been opened.
    #[error("Operation already opened")]
    AlreadyOpened,

    /// The operation is not in a status that allows the action.
    #[error("Invalid state transition: cannot {action} operation {reference} in {current} status")]
    InvalidStateTransition {
        reference: String,
        current: OperationStatus,
        action: &'static str,
    },

    /// Damage exceeds the good units remaining on the line.
    #[error("Damage of {requested} exceeds the {remaining} good units left on line {line_id}")]
    ExceedsAvailable {
        line_id: LineId,
        requested: Decimal,
        remaining: Decimal,
    },

    /// The line does not belong to the operation.
    #[error("Line not found: {line_id}")]
    LineNotFound { line_id: LineId },

    /// Quantities must be positive.
    #[error("Invalid quantity: {quantity} (must be greater than 0)")]
    InvalidQuantity { quantity: Decimal },

    /// A damage must name its type.
    #[error("Damage type is required")]
    MissingDamageType,

    /// The operation has already been soft-deleted.
    #[error("Operation {reference} is deleted")]
    Deleted { reference: String },
}

impl OperationError {
    /// Stable machine-readable code for the error.
    pub fn code(&self) -> &'static str {
        match self {
            OperationError::AlreadyOpened
            | OperationError::InvalidStateTransition { .. }
            | OperationError::Deleted { .. } => "invalid_state",
            OperationError::ExceedsAvailable { .. } => "exceeds_available",
            OperationError::LineNotFound { .. } => "not_found",
            OperationError::InvalidQuantity { .. } | OperationError::MissingDamageType => {
                "invalid_input"
            }
        }
    }
}
