//! Stock records, the movement ledger and operation rows, with in-memory
//! and PostgreSQL backends behind one [`InventoryStore`] trait.

pub mod error;
pub mod memory;
pub mod movement;
pub mod operation;
pub mod postgres;
pub mod query;
pub mod record;
pub mod store;

pub use common::{ActorId, OperationId, OwnerId, StockRecordId};
pub use error::{Result, StoreError};
pub use memory::InMemoryInventoryStore;
pub use movement::{MovementDraft, MovementEntry, MovementId, MovementKind, NewMovement};
pub use operation::{NewOperation, OperationRow, reference_code};
pub use postgres::PostgresInventoryStore;
pub use query::{MovementQuery, OperationFilter, StockFilter};
pub use record::{
    LifecycleState, ProductCode, StockInit, StockKey, StockRecord, StockSettings, Version,
};
pub use store::{
    CommitOutcome, InventoryStore, InventoryStoreExt, OperationWrite, StockChange, UnitOfWork,
    validate_unit_of_work,
};
