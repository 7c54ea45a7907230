use chrono::{DateTime, Utc};
use common::{OperationId, OwnerId, StockRecordId};

use crate::{LifecycleState, MovementId, MovementKind, ProductCode};

/// Builder for ledger queries.
///
/// Results are always ordered by movement id (commit order). `after_id`
/// restarts a listing after the last entry of a previous page.
#[derive(Debug, Clone, Default)]
pub struct MovementQuery {
    /// Filter by stock record.
    pub stock_record_id: Option<StockRecordId>,

    /// Filter by operation.
    pub operation_id: Option<OperationId>,

    /// Filter by movement kinds (any of these kinds).
    pub kinds: Option<Vec<MovementKind>>,

    /// Filter to entries at or after this timestamp.
    pub from_timestamp: Option<DateTime<Utc>>,

    /// Filter to entries at or before this timestamp.
    pub to_timestamp: Option<DateTime<Utc>>,

    /// Only return entries with an id greater than this one.
    pub after_id: Option<MovementId>,

    /// Maximum number of entries to return.
    pub limit: Option<usize>,
}

impl MovementQuery {
    /// Creates a new empty query.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a query for one stock record.
    pub fn for_stock_record(stock_record_id: StockRecordId) -> Self {
        Self {
            stock_record_id: Some(stock_record_id),
            ..Default::default()
        }
    }

    /// Filters by operation.
    pub fn operation(mut self, operation_id: OperationId) -> Self {
        self.operation_id = Some(operation_id);
        self
    }

    /// Filters by a single kind.
    pub fn kind(mut self, kind: MovementKind) -> Self {
        self.kinds = Some(vec![kind]);
        self
    }

    /// Filters by several kinds.
    pub fn kinds(mut self, kinds: Vec<MovementKind>) -> Self {
        self.kinds = Some(kinds);
        self
    }

    /// Filters to entries at or after this timestamp.
    pub fn from_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.from_timestamp = Some(timestamp);
        self
    }

    /// Filters to entries at or before this timestamp.
    pub fn to_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.to_timestamp = Some(timestamp);
        self
    }

    /// Continues after the given entry.
    pub fn after(mut self, id: MovementId) -> Self {
        self.after_id = Some(id);
        self
    }

    /// Limits the number of entries returned.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Returns true if an entry passes every filter except `limit`.
    pub fn matches(&self, entry: &crate::MovementEntry) -> bool {
        if let Some(id) = self.stock_record_id
            && entry.stock_record_id != id
        {
            return false;
        }
        if let Some(id) = self.operation_id
            && entry.operation_id != Some(id)
        {
            return false;
        }
        if let Some(ref kinds) = self.kinds
            && !kinds.contains(&entry.kind)
        {
            return false;
        }
        if let Some(from) = self.from_timestamp
            && entry.timestamp < from
        {
            return false;
        }
        if let Some(to) = self.to_timestamp
            && entry.timestamp > to
        {
            return false;
        }
        if let Some(after) = self.after_id
            && entry.id <= after
        {
            return false;
        }
        true
    }
}

/// Filter for listing stock records.
#[derive(Debug, Clone, Default)]
pub struct StockFilter {
    pub owner_id: Option<OwnerId>,
    pub product_code: Option<ProductCode>,
    pub lifecycle_state: Option<LifecycleState>,
}

impl StockFilter {
    /// Matches every record.
    pub fn all() -> Self {
        Self::default()
    }

    /// Matches records of one owner, or every record when `owner_id` is `None`.
    pub fn for_owner(owner_id: Option<OwnerId>) -> Self {
        Self {
            owner_id,
            ..Default::default()
        }
    }

    /// Returns true if the record passes the filter.
    pub fn matches(&self, record: &crate::StockRecord) -> bool {
        self.owner_id.is_none_or(|id| record.owner_id == id)
            && self
                .product_code
                .as_ref()
                .is_none_or(|code| &record.product_code == code)
            && self
                .lifecycle_state
                .is_none_or(|state| record.lifecycle_state == state)
    }
}

/// Filter for listing operations. Soft-deleted rows are excluded unless
/// `include_deleted` is set.
#[derive(Debug, Clone, Default)]
pub struct OperationFilter {
    pub owner_id: Option<OwnerId>,
    pub status: Option<String>,
    pub direction: Option<String>,
    pub year: Option<i32>,
    pub include_deleted: bool,
}

impl OperationFilter {
    /// Returns true if the row passes the filter.
    pub fn matches(&self, row: &crate::OperationRow) -> bool {
        (self.include_deleted || row.deleted_at.is_none())
            && self.owner_id.is_none_or(|id| row.owner_id == id)
            && self.status.as_ref().is_none_or(|s| &row.status == s)
            && self.direction.as_ref().is_none_or(|d| &row.direction == d)
            && self.year.is_none_or(|y| row.year == y)
    }
}
