//! Read side of the movement ledger: paged history and monthly totals.

use chrono::{DateTime, Datelike, Months, NaiveDate, Utc};
use common::StockRecordId;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use stock_store::{InventoryStore, InventoryStoreExt, MovementEntry, MovementId, MovementKind, MovementQuery};

use crate::error::{DomainError, Result};

/// Default number of entries per history page.
pub const DEFAULT_PAGE_SIZE: usize = 50;

/// Upper bound on the number of entries per history page.
pub const MAX_PAGE_SIZE: usize = 500;

/// Upper bound on the monthly aggregate window, in months.
pub const MAX_WINDOW_MONTHS: u32 = 120;

/// Opaque cursor that resumes a history listing after the last entry seen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageToken(MovementId);

impl PageToken {
    /// Returns the id the next page starts after.
    pub fn after(&self) -> MovementId {
        self.0
    }
}

impl std::fmt::Display for PageToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "m{}", self.0)
    }
}

impl std::str::FromStr for PageToken {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        s.strip_prefix('m')
            .and_then(|raw| raw.parse::<i64>().ok())
            .filter(|id| *id >= 0)
            .map(|id| PageToken(MovementId::new(id)))
            .ok_or_else(|| DomainError::InvalidInput(format!("invalid page token: {s}")))
    }
}

/// Filters for a history listing.
#[derive(Debug, Clone, Default)]
pub struct HistoryFilter {
    pub kinds: Option<Vec<MovementKind>>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

/// One page of a stock record's history.
#[derive(Debug, Clone, Serialize)]
pub struct HistoryPage {
    pub entries: Vec<MovementEntry>,
    pub next_page_token: Option<String>,
}

/// Receipt and issue totals for one calendar month.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthlyTotals {
    pub year: i32,
    pub month: u32,
    pub inbound_total: Decimal,
    pub inbound_count: u64,
    pub outbound_total: Decimal,
    pub outbound_count: u64,
}

impl MonthlyTotals {
    fn empty(year: i32, month: u32) -> Self {
        Self {
            year,
            month,
            inbound_total: Decimal::ZERO,
            inbound_count: 0,
            outbound_total: Decimal::ZERO,
            outbound_count: 0,
        }
    }
}

/// Read access to the movement ledger.
#[derive(Clone)]
pub struct MovementLedger<S: InventoryStore> {
    store: S,
}

impl<S: InventoryStore + Clone> MovementLedger<S> {
    /// Creates a ledger reader over the given store.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Returns one page of history in commit order.
    ///
    /// Listings are restartable: passing the returned `next_page_token`
    /// continues exactly after the last entry of this page, even if new
    /// entries were committed in between.
    pub async fn history(
        &self,
        stock_record_id: StockRecordId,
        filter: HistoryFilter,
        page_token: Option<PageToken>,
        limit: Option<usize>,
    ) -> Result<HistoryPage> {
        self.store.require_stock(stock_record_id).await?;

        let limit = limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
        let mut query = MovementQuery::for_stock_record(stock_record_id).limit(limit + 1);
        if let Some(kinds) = filter.kinds {
            query = query.kinds(kinds);
        }
        if let Some(from) = filter.from {
            query = query.from_timestamp(from);
        }
        if let Some(to) = filter.to {
            query = query.to_timestamp(to);
        }
        if let Some(token) = page_token {
            query = query.after(token.after());
        }

        let mut entries = self.store.query_movements(query).await?;
        let next_page_token = if entries.len() > limit {
            entries.truncate(limit);
            entries.last().map(|e| PageToken(e.id).to_string())
        } else {
            None
        };

        Ok(HistoryPage {
            entries,
            next_page_token,
        })
    }

    /// Receipt and issue totals per calendar month for the `window_months`
    /// months ending with the current one, oldest first. Months without
    /// entries are included with zero totals.
    pub async fn monthly_aggregate(
        &self,
        stock_record_id: StockRecordId,
        window_months: u32,
    ) -> Result<Vec<MonthlyTotals>> {
        self.monthly_aggregate_as_of(stock_record_id, window_months, Utc::now().date_naive())
            .await
    }

    /// [`Self::monthly_aggregate`] evaluated as if today were `today`.
    pub async fn monthly_aggregate_as_of(
        &self,
        stock_record_id: StockRecordId,
        window_months: u32,
        today: NaiveDate,
    ) -> Result<Vec<MonthlyTotals>> {
        if window_months == 0 {
            return Err(DomainError::InvalidInput(
                "window must cover at least one month".to_string(),
            ));
        }
        if window_months > MAX_WINDOW_MONTHS {
            return Err(DomainError::InvalidInput(format!(
                "window of {window_months} months exceeds the maximum of {MAX_WINDOW_MONTHS}"
            )));
        }
        self.store.require_stock(stock_record_id).await?;

        let months = month_window(today, window_months);
        let mut totals: Vec<MonthlyTotals> = months
            .iter()
            .map(|(year, month)| MonthlyTotals::empty(*year, *month))
            .collect();

        let &(first_year, first_month) = months
            .first()
            .ok_or_else(|| DomainError::InvalidInput("window start out of range".to_string()))?;
        let start = NaiveDate::from_ymd_opt(first_year, first_month, 1)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|dt| dt.and_utc())
            .ok_or_else(|| DomainError::InvalidInput("window start out of range".to_string()))?;

        let entries = self
            .store
            .query_movements(
                MovementQuery::for_stock_record(stock_record_id)
                    .kinds(vec![MovementKind::Receipt, MovementKind::Issue])
                    .from_timestamp(start),
            )
            .await?;

        for entry in entries {
            let key = (entry.timestamp.year(), entry.timestamp.month());
            let Some(bucket) = totals.iter_mut().find(|t| (t.year, t.month) == key) else {
                continue;
            };
            match entry.kind {
                MovementKind::Receipt => {
                    bucket.inbound_total += entry.quantity_delta;
                    bucket.inbound_count += 1;
                }
                MovementKind::Issue => {
                    bucket.outbound_total += entry.quantity_delta.abs();
                    bucket.outbound_count += 1;
                }
                _ => {}
            }
        }

        Ok(totals)
    }

    /// Sums every on-hand delta of a record from a zero balance.
    ///
    /// For a consistent ledger this equals the record's current on-hand.
    pub async fn replayed_on_hand(&self, stock_record_id: StockRecordId) -> Result<Decimal> {
        let entries = self.store.movements_for(stock_record_id).await?;
        Ok(entries.iter().map(|e| e.quantity_delta).sum())
    }
}

/// The `count` calendar months ending with the month of `today`, oldest first.
fn month_window(today: NaiveDate, count: u32) -> Vec<(i32, u32)> {
    let Some(first_of_month) = today.with_day(1) else {
        return Vec::new();
    };
    (0..count)
        .rev()
        .filter_map(|back| first_of_month.checked_sub_months(Months::new(back)))
        .map(|month| (month.year(), month.month()))
        .collect()
}
