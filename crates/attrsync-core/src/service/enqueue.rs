//! Enqueue API
//!
//! The single entry point used by both the CRUD mutation hooks and the
//! periodic reconciler to request a sync of one attribute id.

use std::sync::Arc;

use tracing::{debug, error};

use attrsync_common::{EnqueueError, SyncMessage, SyncQueue, is_blank_id, normalize_id};

/// Thin, validating pass-through to the sync request queue
#[derive(Clone)]
pub struct Enqueuer {
    queue: Arc<dyn SyncQueue>,
}

impl Enqueuer {
    pub fn new(queue: Arc<dyn SyncQueue>) -> Self {
        Self { queue }
    }

    /// Request a sync of `id`
    ///
    /// The id is upper-cased but otherwise passed through untouched; only an
    /// empty or all-whitespace id is rejected.
    pub async fn enqueue(&self, id: &str) -> Result<(), EnqueueError> {
        if is_blank_id(id) {
            metrics::counter!("sync_enqueue_total", "result" => "invalid").increment(1);
            return Err(EnqueueError::InvalidId);
        }
        let id = normalize_id(id);

        match self.queue.send(SyncMessage { id: id.clone() }).await {
            Ok(()) => {
                metrics::counter!("sync_enqueue_total", "result" => "ok").increment(1);
                debug!("Enqueued sync request for {}", id);
                Ok(())
            }
            Err(e) => {
                metrics::counter!("sync_enqueue_total", "result" => "error").increment(1);
                error!(
                    "Failed to enqueue sync request for {}, registry may diverge until the next sweep: {}",
                    id, e
                );
                Err(e)
            }
        }
    }

    /// Variant for mutation hooks: failures are logged, never propagated
    pub async fn enqueue_best_effort(&self, id: &str) -> bool {
        self.enqueue(id).await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::service::queue::MemorySyncQueue;

    #[tokio::test]
    async fn test_enqueue_normalizes_id() {
        let queue = Arc::new(MemorySyncQueue::default());
        let enqueuer = Enqueuer::new(queue.clone());

        enqueuer.enqueue("env:prod").await.unwrap();

        let delivery = queue.receive(Duration::ZERO).await.unwrap();
        assert_eq!(delivery.body, r#"{"id":"ENV:PROD"}"#);
    }

    #[tokio::test]
    async fn test_enqueue_keeps_surrounding_whitespace() {
        let queue = Arc::new(MemorySyncQueue::default());
        let enqueuer = Enqueuer::new(queue.clone());

        enqueuer.enqueue("env:prod ").await.unwrap();
        enqueuer.enqueue("env:prod").await.unwrap();

        let first = queue.receive(Duration::ZERO).await.unwrap();
        let second = queue.receive(Duration::ZERO).await.unwrap();
        assert_eq!(first.body, r#"{"id":"ENV:PROD "}"#);
        assert_eq!(second.body, r#"{"id":"ENV:PROD"}"#);
    }

    #[tokio::test]
    async fn test_enqueue_rejects_blank_id() {
        let enqueuer = Enqueuer::new(Arc::new(MemorySyncQueue::default()));
        assert_eq!(enqueuer.enqueue("").await, Err(EnqueueError::InvalidId));
        assert_eq!(enqueuer.enqueue("   ").await, Err(EnqueueError::InvalidId));
    }

    #[tokio::test]
    async fn test_best_effort_swallows_queue_failure() {
        let queue = Arc::new(MemorySyncQueue::default());
        queue.close();
        let enqueuer = Enqueuer::new(queue);

        assert!(!enqueuer.enqueue_best_effort("A:B").await);
        assert!(matches!(
            enqueuer.enqueue("A:B").await,
            Err(EnqueueError::QueueUnavailable(_))
        ));
    }
}
