//! Value objects owned by an operation.

use chrono::{DateTime, NaiveDate, Utc};
use common::{ActorId, DamageId, LineId, OwnerId, StockRecordId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use stock_store::{ProductCode, StockKey};

/// One product line of an operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationLine {
    pub id: LineId,
    /// Record the line moves. Unset for an inbound line whose product had no
    /// record yet; the record is then created when the operation closes.
    #[serde(default)]
    pub stock_record_id: Option<StockRecordId>,
    pub product_code: ProductCode,
    pub quantity: Decimal,
    pub damaged_quantity: Decimal,
    pub lot: Option<String>,
    pub expiry_date: Option<NaiveDate>,
}

impl OperationLine {
    /// Units that are not damaged.
    pub fn good_quantity(&self) -> Decimal {
        self.quantity - self.damaged_quantity
    }

    /// Identity of the stock the line moves for `owner_id`.
    pub fn stock_key(&self, owner_id: OwnerId) -> StockKey {
        StockKey::new(owner_id, self.product_code.clone(), self.lot.clone())
    }
}

/// Damage registered against a line while the operation is open.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DamageRecord {
    pub id: DamageId,
    pub line_id: LineId,
    pub quantity: Decimal,
    pub damage_type: String,
    /// Opaque reference into the document store.
    pub evidence_ref: Option<String>,
    pub registered_by: ActorId,
    pub registered_at: DateTime<Utc>,
}

/// Carrier details recorded with an operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportInfo {
    #[serde(default)]
    pub carrier: Option<String>,
    #[serde(default)]
    pub vehicle_plate: Option<String>,
    #[serde(default)]
    pub driver_name: Option<String>,
    #[serde(default)]
    pub seal_number: Option<String>,
}

/// Running totals across the lines of an operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationTotals {
    pub line_count: u32,
    pub unit_count: Decimal,
    pub damaged_units: Decimal,
}

impl OperationTotals {
    /// Units that will be committed as good stock on close.
    pub fn good_units(&self) -> Decimal {
        self.unit_count - self.damaged_units
    }
}
