//! Shared identifier types for the stock ledger workspace.

mod types;

pub use types::{ActorId, DamageId, LineId, OperationId, OwnerId, StockRecordId};
