//! Stock alerts: low stock, near expiry and expired.
//!
//! All evaluations are pure reads over available stock records.

use chrono::{NaiveDate, Utc};
use common::OwnerId;
use serde::{Deserialize, Serialize};
use stock_store::{InventoryStore, LifecycleState, StockFilter, StockRecord};

use crate::error::{DomainError, Result};

/// Default look-ahead for near-expiry alerts, in days.
pub const DEFAULT_NEAR_EXPIRY_DAYS: u32 = 30;

/// Kind of stock alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    LowStock,
    NearExpiry,
    Expired,
}

impl AlertKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertKind::LowStock => "low_stock",
            AlertKind::NearExpiry => "near_expiry",
            AlertKind::Expired => "expired",
        }
    }
}

impl std::fmt::Display for AlertKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AlertKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "low_stock" => Ok(AlertKind::LowStock),
            "near_expiry" => Ok(AlertKind::NearExpiry),
            "expired" => Ok(AlertKind::Expired),
            other => Err(DomainError::InvalidInput(format!(
                "unknown alert type: {other}"
            ))),
        }
    }
}

/// A stock record that triggered an alert.
#[derive(Debug, Clone, Serialize)]
pub struct StockAlert {
    pub kind: AlertKind,
    pub days_until_expiry: Option<i64>,
    pub record: StockRecord,
}

/// Evaluates alert rules against stock records.
#[derive(Clone)]
pub struct AlertEvaluator<S: InventoryStore> {
    store: S,
}

impl<S: InventoryStore + Clone> AlertEvaluator<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Records with a configured minimum whose on-hand is at or below it.
    pub async fn low_stock(&self, owner_id: Option<OwnerId>) -> Result<Vec<StockAlert>> {
        Ok(self
            .available(owner_id)
            .await?
            .into_iter()
            .filter(StockRecord::is_low_stock)
            .map(|record| StockAlert {
                kind: AlertKind::LowStock,
                days_until_expiry: None,
                record,
            })
            .collect())
    }

    /// Records expiring within `horizon_days` from today, today included.
    pub async fn near_expiry(
        &self,
        owner_id: Option<OwnerId>,
        horizon_days: u32,
    ) -> Result<Vec<StockAlert>> {
        self.near_expiry_as_of(owner_id, horizon_days, Utc::now().date_naive())
            .await
    }

    /// [`Self::near_expiry`] evaluated as if today were `today`.
    pub async fn near_expiry_as_of(
        &self,
        owner_id: Option<OwnerId>,
        horizon_days: u32,
        today: NaiveDate,
    ) -> Result<Vec<StockAlert>> {
        let horizon = i64::from(horizon_days);
        self.by_expiry(owner_id, today, AlertKind::NearExpiry, |days| {
            (0..=horizon).contains(&days)
        })
        .await
    }

    /// Records whose expiry date has passed.
    pub async fn expired(&self, owner_id: Option<OwnerId>) -> Result<Vec<StockAlert>> {
        self.expired_as_of(owner_id, Utc::now().date_naive()).await
    }

    /// [`Self::expired`] evaluated as if today were `today`.
    pub async fn expired_as_of(
        &self,
        owner_id: Option<OwnerId>,
        today: NaiveDate,
    ) -> Result<Vec<StockAlert>> {
        self.by_expiry(owner_id, today, AlertKind::Expired, |days| days < 0)
            .await
    }

    /// Runs one alert rule.
    pub async fn evaluate(
        &self,
        kind: AlertKind,
        owner_id: Option<OwnerId>,
        horizon_days: u32,
    ) -> Result<Vec<StockAlert>> {
        match kind {
            AlertKind::LowStock => self.low_stock(owner_id).await,
            AlertKind::NearExpiry => self.near_expiry(owner_id, horizon_days).await,
            AlertKind::Expired => self.expired(owner_id).await,
        }
    }

    async fn available(&self, owner_id: Option<OwnerId>) -> Result<Vec<StockRecord>> {
        let filter = StockFilter {
            lifecycle_state: Some(LifecycleState::Available),
            ..StockFilter::for_owner(owner_id)
        };
        Ok(self.store.list_stock(filter).await?)
    }

    async fn by_expiry(
        &self,
        owner_id: Option<OwnerId>,
        today: NaiveDate,
        kind: AlertKind,
        rule: impl Fn(i64) -> bool,
    ) -> Result<Vec<StockAlert>> {
        Ok(self
            .available(owner_id)
            .await?
            .into_iter()
            .filter_map(|record| {
                let days = record.days_until_expiry(today)?;
                rule(days).then_some(StockAlert {
                    kind,
                    days_until_expiry: Some(days),
                    record,
                })
            })
            .collect())
    }
}
