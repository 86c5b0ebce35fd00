//! Sync Worker
//!
//! Pulls deliveries from the sync request queue and runs one reconcile per
//! delivery. The worker holds no per-id state: ordering within an id comes
//! from the queue's partition lock, and every retry decision is delegated
//! back to the queue through ack / nack / dead-letter.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{Semaphore, watch};
use tracing::{debug, error, info, warn};

use attrsync_common::{Delivery, SyncError, SyncMessage, SyncQueue};

use super::reconcile::Reconciler;

/// Sync worker configuration
#[derive(Clone, Debug)]
pub struct WorkerConfig {
    /// Maximum deliveries processed in parallel (distinct ids only)
    pub concurrency: usize,
    /// Wall-clock bound for one reconcile call
    pub reconcile_timeout: Duration,
    /// How long one receive call waits for a message
    pub poll_wait: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: 8,
            reconcile_timeout: Duration::from_secs(30),
            poll_wait: Duration::from_secs(1),
        }
    }
}

/// What happened to a delivery after processing
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Disposition {
    /// Handled, removed from the queue
    Acked,
    /// Released for redelivery
    Retried,
    /// Parked in the dead-letter channel
    DeadLettered,
}

pub struct SyncWorker {
    queue: Arc<dyn SyncQueue>,
    reconciler: Arc<Reconciler>,
    config: WorkerConfig,
}

impl SyncWorker {
    pub fn new(
        queue: Arc<dyn SyncQueue>,
        reconciler: Arc<Reconciler>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            queue,
            reconciler,
            config,
        }
    }

    /// Receive and process a single delivery, if one arrives within `wait`
    pub async fn process_one(&self, wait: Duration) -> Option<Disposition> {
        let delivery = self.queue.receive(wait).await?;
        Some(
            handle_delivery(
                self.queue.as_ref(),
                &self.reconciler,
                self.config.reconcile_timeout,
                delivery,
            )
            .await,
        )
    }

    /// Process deliveries until the queue stays empty for one poll interval
    pub async fn drain(&self) -> usize {
        let mut processed = 0;
        while self.process_one(self.config.poll_wait).await.is_some() {
            processed += 1;
        }
        processed
    }

    /// Run the receive loop until `shutdown` flips to true
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let concurrency = self.config.concurrency.max(1);
        let semaphore = Arc::new(Semaphore::new(concurrency));
        info!("Sync worker started with concurrency {}", concurrency);

        loop {
            if *shutdown.borrow() {
                break;
            }

            let permit = tokio::select! {
                permit = semaphore.clone().acquire_owned() => permit,
                _ = shutdown.changed() => break,
            };
            let Ok(permit) = permit else {
                break;
            };

            let delivery = tokio::select! {
                delivery = self.queue.receive(self.config.poll_wait) => delivery,
                _ = shutdown.changed() => break,
            };
            let Some(delivery) = delivery else {
                continue;
            };

            let queue = self.queue.clone();
            let reconciler = self.reconciler.clone();
            let timeout = self.config.reconcile_timeout;
            tokio::spawn(async move {
                handle_delivery(queue.as_ref(), &reconciler, timeout, delivery).await;
                drop(permit);
            });
        }

        info!("Sync worker stopping, waiting for in-flight reconciles");
        let _ = semaphore.acquire_many(concurrency as u32).await;
        info!("Sync worker stopped");
    }
}

/// Reconcile one delivery and settle it with the queue
pub async fn handle_delivery(
    queue: &dyn SyncQueue,
    reconciler: &Reconciler,
    timeout: Duration,
    delivery: Delivery,
) -> Disposition {
    let start = Instant::now();
    let result = match SyncMessage::from_body(&delivery.body) {
        Ok(message) => {
            debug!(
                "Reconciling {} (message {}, attempt {})",
                message.id, delivery.message_id, delivery.receive_count
            );
            match tokio::time::timeout(timeout, reconciler.reconcile(&message.id)).await {
                Ok(result) => result,
                Err(_) => Err(SyncError::Transient(format!(
                    "reconcile of {} timed out after {:?}",
                    message.id, timeout
                ))),
            }
        }
        Err(e) => Err(SyncError::InvalidMessage(e.to_string())),
    };
    metrics::histogram!("sync_reconcile_duration_seconds").record(start.elapsed().as_secs_f64());

    let (disposition, settled) = match result {
        Ok(outcome) => {
            metrics::counter!("sync_reconcile_total", "outcome" => outcome.as_str()).increment(1);
            (Disposition::Acked, queue.ack(&delivery.receipt).await)
        }
        Err(SyncError::NotFound(id)) => {
            metrics::counter!("sync_reconcile_total", "outcome" => "not_found").increment(1);
            warn!("Sync request for unknown attribute {} dropped", id);
            (Disposition::Acked, queue.ack(&delivery.receipt).await)
        }
        Err(e) if e.is_retryable() => {
            metrics::counter!("sync_reconcile_total", "outcome" => e.kind()).increment(1);
            warn!(
                "Reconcile attempt {} of message {} failed: {}",
                delivery.receive_count, delivery.message_id, e
            );
            (
                Disposition::Retried,
                queue.nack(&delivery.receipt, &e.to_string()).await,
            )
        }
        Err(e) => {
            metrics::counter!("sync_reconcile_total", "outcome" => e.kind()).increment(1);
            error!(
                "Message {} needs operator attention, moving to dead-letter: {}",
                delivery.message_id, e
            );
            (
                Disposition::DeadLettered,
                queue.dead_letter(&delivery.receipt, &e.to_string()).await,
            )
        }
    };

    if let Err(e) = settled {
        // The lease expired while reconciling; the queue already redelivered
        warn!(
            "Failed to settle message {}: {}",
            delivery.message_id, e
        );
    }
    disposition
}
