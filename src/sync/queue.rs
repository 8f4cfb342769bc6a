//! Deferred Submission Queue.
//!
//! On the configured background-sync signal, every pending submission is
//! replayed once. An answered replay is removed from the pending store; a
//! transport failure leaves the item for the next signal. Items are
//! independent: one failure never stops the rest.
//!
//! Delivery is at-least-once. A crash between a successful send and the
//! removal resubmits the item on the next signal.

use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::net::fetcher::Fetcher;
use crate::sync::pending::{PendingStore, PendingStoreError};

#[derive(Error, Debug)]
pub enum ReplayError {
    #[error("Failed to list pending submissions: {0}")]
    List(#[from] PendingStoreError),
}

/// What happened during one replay cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplayReport {
    /// Replayed and removed.
    pub delivered: Vec<Uuid>,
    /// Left pending: transport failed, or removal after delivery failed.
    pub retained: Vec<Uuid>,
}

pub struct DeferredQueue {
    pending: Arc<dyn PendingStore>,
    fetcher: Arc<dyn Fetcher>,
    tag: String,
}

impl DeferredQueue {
    pub fn new(pending: Arc<dyn PendingStore>, fetcher: Arc<dyn Fetcher>, tag: impl Into<String>) -> Self {
        Self {
            pending,
            fetcher,
            tag: tag.into(),
        }
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Handle a sync signal. Signals with another tag are ignored (`None`).
    pub async fn on_sync(&self, tag: &str) -> Option<Result<ReplayReport, ReplayError>> {
        if tag != self.tag {
            return None;
        }
        Some(self.replay_all().await)
    }

    /// Replay every pending submission, sequentially.
    pub async fn replay_all(&self) -> Result<ReplayReport, ReplayError> {
        let items = self.pending.list_pending().await?;
        info!(pending = items.len(), "Processing deferred submissions");

        let mut report = ReplayReport::default();
        for item in items {
            let request = item.to_request();
            match self.fetcher.fetch(&request).await {
                Ok(response) => {
                    if !response.is_success() {
                        warn!(
                            id = %item.id,
                            url = %item.url,
                            status = response.status,
                            "Deferred submission answered with non-success status"
                        );
                    }
                    match self.pending.remove_pending(item.id).await {
                        Ok(()) => {
                            info!(id = %item.id, url = %item.url, "Deferred submission delivered");
                            report.delivered.push(item.id);
                        }
                        Err(e) => {
                            warn!(id = %item.id, error = %e, "Delivered but could not remove pending item");
                            report.retained.push(item.id);
                        }
                    }
                }
                Err(e) => {
                    warn!(id = %item.id, url = %item.url, error = %e, "Failed to replay deferred submission");
                    report.retained.push(item.id);
                }
            }
        }

        Ok(report)
    }
}
