//! Close notifications.
//!
//! Delivery is best-effort: a failed notification is logged and never undoes
//! the close that triggered it.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{Notify, RwLock};

use crate::operation::CloseSummary;

/// Message sent after an operation is closed.
#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub operation_reference: String,
    pub recipients: Vec<String>,
    pub summary: CloseSummary,
}

/// Errors raised by a notifier.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Notification delivery failed: {0}")]
    Delivery(String),
}

/// Dispatches close notifications.
#[async_trait]
pub trait OperationNotifier: Send + Sync {
    async fn notify(&self, notification: Notification) -> Result<(), NotifyError>;
}

/// Notifier that only writes a log line.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl OperationNotifier for LogNotifier {
    async fn notify(&self, notification: Notification) -> Result<(), NotifyError> {
        tracing::info!(
            reference = %notification.operation_reference,
            recipients = notification.recipients.len(),
            good_units = %notification.summary.good_units,
            damaged_units = %notification.summary.damaged_units,
            "operation closed notification"
        );
        Ok(())
    }
}

/// Notifier that records what it was asked to send.
#[derive(Clone, Default)]
pub struct InMemoryNotifier {
    sent: Arc<RwLock<Vec<Notification>>>,
    failing: Arc<AtomicBool>,
    signal: Arc<Notify>,
}

impl InMemoryNotifier {
    /// Creates an empty notifier.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent delivery fail.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Returns every notification delivered so far.
    pub async fn sent(&self) -> Vec<Notification> {
        self.sent.read().await.clone()
    }

    /// Waits until at least `count` notifications were delivered or `timeout`
    /// elapses, then returns what was delivered.
    pub async fn wait_for(&self, count: usize, timeout: Duration) -> Vec<Notification> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.signal.notified();
            {
                let sent = self.sent.read().await;
                if sent.len() >= count {
                    return sent.clone();
                }
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.sent().await;
            }
        }
    }
}

#[async_trait]
impl OperationNotifier for InMemoryNotifier {
    async fn notify(&self, notification: Notification) -> Result<(), NotifyError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(NotifyError::Delivery("notifier is failing".to_string()));
        }
        self.sent.write().await.push(notification);
        self.signal.notify_waiters();
        Ok(())
    }
}
