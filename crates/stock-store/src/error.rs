use common::{OperationId, StockRecordId};
use rust_decimal::Decimal;
use thiserror::Error;

use crate::Version;

/// Errors that can occur when interacting with the inventory store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The row's version did not match the version the caller read.
    #[error("Version conflict on {entity} {id}: expected version {expected}, found {actual}")]
    VersionConflict {
        entity: &'static str,
        id: String,
        expected: Version,
        actual: Version,
    },

    /// A change would drive on-hand or available quantity below zero.
    #[error(
        "Insufficient stock on record {stock_record_id}: requested {requested}, available {available}"
    )]
    InsufficientStock {
        stock_record_id: StockRecordId,
        requested: Decimal,
        available: Decimal,
    },

    /// A release or commit asked for more than is currently reserved.
    #[error(
        "Reservation underflow on record {stock_record_id}: requested {requested}, reserved {reserved}"
    )]
    ReservationUnderflow {
        stock_record_id: StockRecordId,
        requested: Decimal,
        reserved: Decimal,
    },

    /// Two operations were assigned the same number.
    #[error("Duplicate operation sequence {sequence} for year {year}")]
    DuplicateSequence { year: i32, sequence: i64 },

    /// The stock record does not exist.
    #[error("Stock record not found: {0}")]
    StockRecordNotFound(StockRecordId),

    /// The operation does not exist.
    #[error("Operation not found: {0}")]
    OperationNotFound(OperationId),

    /// A unit of work was malformed.
    #[error("Invalid change: {0}")]
    InvalidChange(String),

    /// A stored value could not be decoded.
    #[error("Invalid value for {field}: {value}")]
    InvalidValue { field: &'static str, value: String },

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Returns true for optimistic-concurrency failures a caller may retry
    /// after re-reading.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            StoreError::VersionConflict { .. } | StoreError::DuplicateSequence { .. }
        )
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
