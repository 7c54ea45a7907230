//! Domain error types.

use common::{OperationId, OwnerId, StockRecordId};
use rust_decimal::Decimal;
use stock_store::StoreError;
use thiserror::Error;

use crate::operation::OperationError;

/// Errors that can occur during domain operations.
#[derive(Debug, Error)]
pub enum DomainError {
    /// A removal or reservation exceeds the available quantity.
    #[error(
        "Insufficient stock on record {stock_record_id}: requested {requested}, available {available}"
    )]
    InsufficientStock {
        stock_record_id: StockRecordId,
        requested: Decimal,
        available: Decimal,
    },

    /// An outbound line names a product the owner has no stock record for.
    #[error("No stock of {product_code} for owner {owner_id}: requested {requested}, available 0")]
    NoStockRecord {
        owner_id: OwnerId,
        product_code: String,
        requested: Decimal,
    },

    /// A release or commit exceeds the reserved quantity.
    #[error(
        "Cannot release {requested} from record {stock_record_id}: only {reserved} reserved"
    )]
    ReleaseExceedsReserved {
        stock_record_id: StockRecordId,
        requested: Decimal,
        reserved: Decimal,
    },

    /// The row changed between read and write.
    #[error("Concurrent modification of {entity} {id}")]
    Conflict { entity: &'static str, id: String },

    /// Two operations were assigned the same number.
    #[error("Duplicate operation sequence {sequence} for year {year}")]
    DuplicateSequence { year: i32, sequence: i64 },

    /// An error raised by the operation aggregate.
    #[error(transparent)]
    Operation(#[from] OperationError),

    /// Stock record not found.
    #[error("Stock record not found: {0}")]
    StockRecordNotFound(StockRecordId),

    /// Operation not found.
    #[error("Operation not found: {0}")]
    OperationNotFound(OperationId),

    /// The request was malformed.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// An unexpected store failure.
    #[error("Store error: {0}")]
    Store(StoreError),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DomainError {
    /// Stable machine-readable code for the error.
    pub fn code(&self) -> &'static str {
        match self {
            DomainError::InsufficientStock { .. } | DomainError::NoStockRecord { .. } => {
                "insufficient_stock"
            }
            DomainError::ReleaseExceedsReserved { .. } => "release_exceeds_reserved",
            DomainError::Conflict { .. } => "conflict",
            DomainError::DuplicateSequence { .. } => "duplicate_sequence",
            DomainError::Operation(err) => err.code(),
            DomainError::StockRecordNotFound(_) | DomainError::OperationNotFound(_) => "not_found",
            DomainError::InvalidInput(_) => "invalid_input",
            DomainError::Store(_) | DomainError::Serialization(_) => "internal",
        }
    }

    /// Returns true for transient failures that are worth retrying after a
    /// fresh read.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DomainError::Conflict { .. } | DomainError::DuplicateSequence { .. }
        )
    }
}

impl From<StoreError> for DomainError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::VersionConflict { entity, id, .. } => DomainError::Conflict { entity, id },
            StoreError::InsufficientStock {
                stock_record_id,
                requested,
                available,
            } => DomainError::InsufficientStock {
                stock_record_id,
                requested,
                available,
            },
            StoreError::ReservationUnderflow {
                stock_record_id,
                requested,
                reserved,
            } => DomainError::ReleaseExceedsReserved {
                stock_record_id,
                requested,
                reserved,
            },
            StoreError::DuplicateSequence { year, sequence } => {
                DomainError::DuplicateSequence { year, sequence }
            }
            StoreError::StockRecordNotFound(id) => DomainError::StockRecordNotFound(id),
            StoreError::OperationNotFound(id) => DomainError::OperationNotFound(id),
            StoreError::InvalidChange(msg) => DomainError::InvalidInput(msg),
            StoreError::Serialization(e) => DomainError::Serialization(e),
            other => DomainError::Store(other),
        }
    }
}

/// Result type for domain operations.
pub type Result<T> = std::result::Result<T, DomainError>;

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use stock_store::Version;

    #[test]
    fn version_conflict_maps_to_retryable_conflict() {
        let err: DomainError = StoreError::VersionConflict {
            entity: "stock_record",
            id: "x".to_string(),
            expected: Version::new(1),
            actual: Version::new(2),
        }
        .into();

        assert!(matches!(err, DomainError::Conflict { .. }));
        assert!(err.is_retryable());
        assert_eq!(err.code(), "conflict");
    }

    #[test]
    fn insufficient_stock_is_not_retryable() {
        let err: DomainError = StoreError::InsufficientStock {
            stock_record_id: StockRecordId::new(),
            requested: dec!(60),
            available: dec!(50),
        }
        .into();

        assert!(!err.is_retryable());
        assert_eq!(err.code(), "insufficient_stock");
        assert!(err.to_string().contains("requested 60"));
    }

    #[test]
    fn reservation_underflow_maps_to_release_error() {
        let err: DomainError = StoreError::ReservationUnderflow {
            stock_record_id: StockRecordId::new(),
            requested: dec!(5),
            reserved: dec!(2),
        }
        .into();
        assert_eq!(err.code(), "release_exceeds_reserved");
    }
}
