use std::collections::VecDeque;
use std::sync::Mutex;

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::api::MarketplaceApi;
use crate::error::ApiError;
use crate::types::sync::SyncItem;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedItem {
    pub item: SyncItem,
    pub attempts: u32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchReport {
    pub processed: usize,
    pub succeeded: usize,
    pub requeued: usize,
    pub dropped: usize,
    pub errors: Vec<ApiError>,
}

/// FIFO of outbound updates. Failed items go to the back with their attempt
/// count bumped; items reaching `max_attempts` are dropped.
#[derive(Default)]
pub struct SyncQueue {
    inner: Mutex<VecDeque<QueuedItem>>,
}

impl SyncQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<QueuedItem>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn enqueue(&self, item: SyncItem) {
        debug!(kind = item.label(), "Queued sync item");
        self.lock().push_back(QueuedItem { item, attempts: 0 });
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn pending(&self) -> Vec<QueuedItem> {
        self.lock().iter().cloned().collect()
    }

    /// Take up to `batch_size` items and push them with at most `parallelism`
    /// calls in flight. Every taken item is accounted for in the report.
    pub async fn process_batch<A: MarketplaceApi>(
        &self,
        api: &A,
        batch_size: usize,
        parallelism: usize,
        max_attempts: u32,
    ) -> BatchReport {
        let batch: Vec<QueuedItem> = {
            let mut queue = self.lock();
            let n = batch_size.min(queue.len());
            queue.drain(..n).collect()
        };
        if batch.is_empty() {
            return BatchReport::default();
        }

        let results: Vec<(QueuedItem, Result<(), ApiError>)> = stream::iter(batch)
            .map(|queued| async move {
                let result = api.push(&queued.item).await;
                (queued, result)
            })
            .buffer_unordered(parallelism.max(1))
            .collect()
            .await;

        let mut report = BatchReport {
            processed: results.len(),
            ..Default::default()
        };
        let mut queue = self.lock();
        for (mut queued, result) in results {
            match result {
                Ok(()) => report.succeeded += 1,
                Err(e) => {
                    queued.attempts += 1;
                    if queued.attempts >= max_attempts {
                        warn!(
                            kind = queued.item.label(),
                            attempts = queued.attempts,
                            error = %e,
                            "Dropping sync item after max attempts"
                        );
                        report.dropped += 1;
                    } else {
                        debug!(kind = queued.item.label(), attempts = queued.attempts, error = %e, "Sync item requeued");
                        queue.push_back(queued);
                        report.requeued += 1;
                    }
                    report.errors.push(e);
                }
            }
        }
        report
    }
}
