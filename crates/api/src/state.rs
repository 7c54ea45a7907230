//! Shared application state.

use std::sync::Arc;

use domain::{
    AlertEvaluator, MovementLedger, OperationNotifier, OperationWorkflow, RetryPolicy,
    StockService,
};
use stock_store::InventoryStore;

use crate::config::Config;

/// Shared application state accessible from all handlers.
pub struct AppState<S: InventoryStore> {
    pub stock: StockService<S>,
    pub ledger: MovementLedger<S>,
    pub workflow: OperationWorkflow<S>,
    pub alerts: AlertEvaluator<S>,
    pub near_expiry_days: u32,
}

impl<S: InventoryStore + Clone> AppState<S> {
    /// Wires every service to the same store handle.
    pub fn new(store: S, config: &Config, notifier: Arc<dyn OperationNotifier>) -> Self {
        let retry = RetryPolicy::new(config.conflict_retry_limit);
        Self {
            stock: StockService::with_retry(store.clone(), retry),
            ledger: MovementLedger::new(store.clone()),
            workflow: OperationWorkflow::new(store.clone())
                .with_retry(retry)
                .with_notifier(notifier, config.notify_recipients.clone()),
            alerts: AlertEvaluator::new(store),
            near_expiry_days: config.near_expiry_days,
        }
    }
}
