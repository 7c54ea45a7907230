//! Domain layer for the stock ledger.
//!
//! This crate provides:
//! - Stock record service with manual adjustments and transfers
//! - Movement ledger reads (paged history, monthly totals)
//! - Reservation manager for soft holds
//! - Operation aggregate and workflow (open, lines, damage, close, void)
//! - Alert evaluator, role capabilities and close notifications

pub mod aggregate;
pub mod alerts;
pub mod error;
pub mod ledger;
pub mod notify;
pub mod operation;
pub mod permissions;
pub mod reservation;
pub mod retry;
pub mod stock;

pub use aggregate::{Aggregate, DomainEvent};
pub use alerts::{AlertEvaluator, AlertKind, DEFAULT_NEAR_EXPIRY_DAYS, StockAlert};
pub use error::{DomainError, Result};
pub use ledger::{
    DEFAULT_PAGE_SIZE, HistoryFilter, HistoryPage, MAX_PAGE_SIZE, MAX_WINDOW_MONTHS, MonthlyTotals,
    MovementLedger, PageToken,
};
pub use notify::{InMemoryNotifier, LogNotifier, Notification, NotifyError, OperationNotifier};
pub use operation::{
    CloseSummary, DamageRecord, Direction, NewDamage, NewLine, OpenOperation, Operation,
    OperationError, OperationEvent, OperationLine, OperationQuery, OperationStatus,
    OperationTotals, OperationWorkflow, TransportInfo,
};
pub use permissions::{Action, CapabilitySet, Module, Role};
pub use reservation::{HoldContext, ReservationManager};
pub use retry::RetryPolicy;
pub use stock::{Adjustment, StockService};
