use chrono::{DateTime, Utc};
use common::{OperationId, OwnerId};
use serde::{Deserialize, Serialize};

use crate::Version;

/// Builds the human-facing reference of an operation.
pub fn reference_code(year: i32, sequence: i64) -> String {
    format!("OP-{year}-{sequence:04}")
}

/// Persisted form of an operation.
///
/// Header columns are typed so the store can filter, number and version rows;
/// the aggregate itself (lines, damages, totals) lives in `state` as JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationRow {
    pub id: OperationId,
    pub year: i32,
    pub sequence: i64,
    pub reference_code: String,
    pub owner_id: OwnerId,
    pub direction: String,
    pub status: String,
    pub version: Version,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub state: serde_json::Value,
}

impl OperationRow {
    /// Returns a copy carrying new state, status and tombstone.
    ///
    /// Identity and numbering columns are kept; the store assigns the new
    /// version when the row is written.
    pub fn with_state(
        &self,
        status: impl Into<String>,
        deleted_at: Option<DateTime<Utc>>,
        state: serde_json::Value,
    ) -> Self {
        Self {
            status: status.into(),
            deleted_at,
            state,
            ..self.clone()
        }
    }

    /// Returns true if the row has been soft-deleted.
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// An operation to insert; the store assigns its year-scoped sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOperation {
    pub id: OperationId,
    pub year: i32,
    pub owner_id: OwnerId,
    pub direction: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub state: serde_json::Value,
}

impl NewOperation {
    /// Builds the row once a sequence has been allocated.
    pub fn into_row(self, sequence: i64) -> OperationRow {
        OperationRow {
            id: self.id,
            year: self.year,
            sequence,
            reference_code: reference_code(self.year, sequence),
            owner_id: self.owner_id,
            direction: self.direction,
            status: self.status,
            version: Version::first(),
            created_at: self.created_at,
            updated_at: self.created_at,
            deleted_at: None,
            state: self.state,
        }
    }
}
