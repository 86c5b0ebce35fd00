//! In-process sync request queue
//!
//! Messages are partitioned by attribute id. Each partition is a FIFO that is
//! locked while its head message is leased to a consumer, so two messages for
//! the same id are never processed concurrently, while different partitions
//! are handed out independently.
//!
//! Delivery is at-least-once: a lease that is not acked before the visibility
//! timeout counts as a failed attempt and the message becomes deliverable
//! again. After `max_retries + 1` failed attempts the message is parked in the
//! dead-letter list together with its last failure reason.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, error, warn};

use attrsync_common::{
    DeadLetter, Delivery, EnqueueError, QueueError, QueueStats, SyncMessage, SyncQueue,
};

/// Queue configuration
#[derive(Clone, Debug)]
pub struct QueueConfig {
    /// Redeliveries allowed after the first failed attempt
    pub max_retries: u32,
    /// How long a delivery stays locked to its consumer
    pub visibility_timeout: Duration,
    /// Delay before a nacked message becomes deliverable again
    pub redelivery_delay: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_retries: 1,
            visibility_timeout: Duration::from_secs(60),
            redelivery_delay: Duration::from_secs(1),
        }
    }
}

/// Content-based deduplication key: hex SHA-256 of the message body
pub fn dedup_key(body: &str) -> String {
    const_hex::encode(Sha256::digest(body.as_bytes()))
}

#[derive(Debug)]
struct QueuedMessage {
    message_id: String,
    body: String,
    dedup_key: String,
    receive_count: u32,
    last_error: Option<String>,
    visible_at: Instant,
}

#[derive(Debug)]
struct Lease {
    receipt: String,
    deadline: Instant,
}

#[derive(Debug, Default)]
struct Partition {
    messages: VecDeque<QueuedMessage>,
    lease: Option<Lease>,
}

#[derive(Debug, Default)]
struct QueueState {
    partitions: HashMap<String, Partition>,
    /// Round-robin order of partitions holding messages
    order: VecDeque<String>,
    /// receipt -> partition key
    receipts: HashMap<String, String>,
    dead_letters: Vec<DeadLetter>,
    deduplicated: u64,
    closed: bool,
}

enum Release {
    Retry,
    DeadLetter,
}

impl QueueState {
    fn push(&mut self, partition_key: String, message_id: String, body: String, now: Instant) {
        let dedup_key = dedup_key(&body);
        let partition = self.partitions.entry(partition_key.clone()).or_default();
        if partition.messages.is_empty() {
            self.order.push_back(partition_key);
        }
        partition.messages.push_back(QueuedMessage {
            message_id,
            body,
            dedup_key,
            receive_count: 0,
            last_error: None,
            visible_at: now,
        });
    }

    /// Append a message unless an identical one is still pending in its
    /// partition. Returns false when the message collapsed into that one.
    fn push_unique(
        &mut self,
        partition_key: String,
        message_id: String,
        body: String,
        now: Instant,
    ) -> bool {
        let key = dedup_key(&body);
        let duplicate = self.partitions.get(&partition_key).is_some_and(|p| {
            p.messages
                .iter()
                .enumerate()
                .any(|(i, m)| m.dedup_key == key && !(i == 0 && p.lease.is_some()))
        });
        if duplicate {
            self.deduplicated += 1;
            metrics::counter!("sync_enqueue_deduplicated_total").increment(1);
            debug!("Collapsed duplicate sync request for {}", partition_key);
            return false;
        }
        self.push(partition_key, message_id, body, now);
        true
    }

    /// Expire leases whose deadline has passed, counting them as failures
    fn expire_leases(&mut self, config: &QueueConfig, now: Instant) {
        let expired: Vec<String> = self
            .partitions
            .iter()
            .filter(|(_, p)| p.lease.as_ref().is_some_and(|l| l.deadline <= now))
            .map(|(k, _)| k.clone())
            .collect();

        for key in expired {
            warn!("Visibility timeout expired for partition {}", key);
            self.release(&key, "visibility timeout expired", Release::Retry, config, now);
        }
    }

    /// Unlock a partition after a failed or abandoned delivery
    fn release(
        &mut self,
        key: &str,
        reason: &str,
        mode: Release,
        config: &QueueConfig,
        now: Instant,
    ) {
        let Some(partition) = self.partitions.get_mut(key) else {
            return;
        };
        if let Some(lease) = partition.lease.take() {
            self.receipts.remove(&lease.receipt);
        }
        let Some(head) = partition.messages.front_mut() else {
            return;
        };
        head.last_error = Some(reason.to_string());

        let exhausted = head.receive_count > config.max_retries;
        if matches!(mode, Release::Retry) && !exhausted {
            head.visible_at = now + config.redelivery_delay;
            debug!(
                "Message {} scheduled for redelivery (attempt {} failed: {})",
                head.message_id, head.receive_count, reason
            );
            return;
        }

        if let Some(message) = partition.messages.pop_front() {
            error!(
                "Message {} moved to dead-letter after {} attempts: {}",
                message.message_id, message.receive_count, reason
            );
            metrics::counter!("sync_dead_letter_total").increment(1);
            self.dead_letters.push(DeadLetter {
                message_id: message.message_id,
                body: message.body,
                receive_count: message.receive_count,
                reason: reason.to_string(),
                dead_lettered_at: chrono::Utc::now().to_rfc3339(),
            });
        }
        self.drop_if_empty(key);
    }

    fn drop_if_empty(&mut self, key: &str) {
        if self
            .partitions
            .get(key)
            .is_some_and(|p| p.messages.is_empty() && p.lease.is_none())
        {
            self.partitions.remove(key);
            self.order.retain(|k| k != key);
        }
    }

    fn take_next(&mut self, config: &QueueConfig, now: Instant) -> Option<Delivery> {
        let position = self.order.iter().position(|key| {
            self.partitions.get(key).is_some_and(|p| {
                p.lease.is_none() && p.messages.front().is_some_and(|m| m.visible_at <= now)
            })
        })?;

        let key = self.order.remove(position)?;
        self.order.push_back(key.clone());

        let partition = self.partitions.get_mut(&key)?;
        let head = partition.messages.front_mut()?;
        head.receive_count += 1;

        let receipt = uuid::Uuid::new_v4().to_string();
        partition.lease = Some(Lease {
            receipt: receipt.clone(),
            deadline: now + config.visibility_timeout,
        });
        self.receipts.insert(receipt.clone(), key);

        Some(Delivery {
            receipt,
            message_id: head.message_id.clone(),
            body: head.body.clone(),
            receive_count: head.receive_count,
        })
    }

    /// Earliest instant at which the state may change without outside input
    fn next_wake(&self) -> Option<Instant> {
        self.partitions
            .values()
            .filter_map(|p| match &p.lease {
                Some(lease) => Some(lease.deadline),
                None => p.messages.front().map(|m| m.visible_at),
            })
            .min()
    }

    fn partition_for_receipt(&self, receipt: &str) -> Result<String, QueueError> {
        self.receipts
            .get(receipt)
            .cloned()
            .ok_or_else(|| QueueError::UnknownReceipt(receipt.to_string()))
    }
}

/// Partitioned, deduplicating, at-least-once queue held in process memory
pub struct MemorySyncQueue {
    config: QueueConfig,
    state: Mutex<QueueState>,
    notify: Notify,
}

impl MemorySyncQueue {
    pub fn new(config: QueueConfig) -> Self {
        Self {
            config,
            state: Mutex::new(QueueState::default()),
            notify: Notify::new(),
        }
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Reject further sends; queued messages can still be drained
    pub fn close(&self) {
        self.state.lock().closed = true;
        self.notify.notify_waiters();
    }

    fn try_receive(&self) -> (Option<Delivery>, Option<Instant>) {
        let now = Instant::now();
        let mut state = self.state.lock();
        state.expire_leases(&self.config, now);
        let delivery = state.take_next(&self.config, now);
        (delivery, state.next_wake())
    }
}

impl Default for MemorySyncQueue {
    fn default() -> Self {
        Self::new(QueueConfig::default())
    }
}

#[async_trait::async_trait]
impl SyncQueue for MemorySyncQueue {
    async fn send(&self, message: SyncMessage) -> Result<(), EnqueueError> {
        let body = message
            .to_body()
            .map_err(|e| EnqueueError::Serialization(e.to_string()))?;

        let pushed = {
            let mut state = self.state.lock();
            if state.closed {
                return Err(EnqueueError::QueueUnavailable("queue is closed".to_string()));
            }
            let message_id = uuid::Uuid::new_v4().to_string();
            state.push_unique(message.id, message_id, body, Instant::now())
        };

        if pushed {
            self.notify.notify_waiters();
        }
        Ok(())
    }

    async fn receive(&self, wait: Duration) -> Option<Delivery> {
        let deadline = Instant::now() + wait;
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let (delivery, next_wake) = self.try_receive();
            if delivery.is_some() {
                return delivery;
            }
            if Instant::now() >= deadline {
                return None;
            }

            let wake_at = next_wake.map_or(deadline, |t| t.min(deadline));
            let _ = tokio::time::timeout_at(wake_at, notified).await;
        }
    }

    async fn ack(&self, receipt: &str) -> Result<(), QueueError> {
        {
            let mut state = self.state.lock();
            let key = state.partition_for_receipt(receipt)?;
            state.receipts.remove(receipt);
            if let Some(partition) = state.partitions.get_mut(&key) {
                partition.lease = None;
                partition.messages.pop_front();
            }
            state.drop_if_empty(&key);
        }
        self.notify.notify_waiters();
        Ok(())
    }

    async fn nack(&self, receipt: &str, reason: &str) -> Result<(), QueueError> {
        {
            let mut state = self.state.lock();
            let key = state.partition_for_receipt(receipt)?;
            state.release(&key, reason, Release::Retry, &self.config, Instant::now());
        }
        self.notify.notify_waiters();
        Ok(())
    }

    async fn dead_letter(&self, receipt: &str, reason: &str) -> Result<(), QueueError> {
        {
            let mut state = self.state.lock();
            let key = state.partition_for_receipt(receipt)?;
            state.release(&key, reason, Release::DeadLetter, &self.config, Instant::now());
        }
        self.notify.notify_waiters();
        Ok(())
    }

    async fn dead_letters(&self) -> Vec<DeadLetter> {
        self.state.lock().dead_letters.clone()
    }

    async fn replay_dead_letter(&self, message_id: &str) -> Result<(), QueueError> {
        {
            let mut state = self.state.lock();
            if state.closed {
                return Err(QueueError::Closed);
            }
            let position = state
                .dead_letters
                .iter()
                .position(|d| d.message_id == message_id)
                .ok_or_else(|| QueueError::UnknownDeadLetter(message_id.to_string()))?;
            let dead = state.dead_letters.remove(position);

            // Poison bodies get a partition of their own
            let key = SyncMessage::from_body(&dead.body)
                .map(|m| m.id)
                .unwrap_or_else(|_| dead.message_id.clone());
            state.push_unique(key, dead.message_id, dead.body, Instant::now());
        }
        self.notify.notify_waiters();
        Ok(())
    }

    async fn purge_dead_letters(&self) -> usize {
        let mut state = self.state.lock();
        let count = state.dead_letters.len();
        state.dead_letters.clear();
        count
    }

    async fn stats(&self) -> QueueStats {
        let state = self.state.lock();
        let in_flight = state
            .partitions
            .values()
            .filter(|p| p.lease.is_some())
            .count();
        let total: usize = state.partitions.values().map(|p| p.messages.len()).sum();
        QueueStats {
            pending: total - in_flight,
            in_flight,
            dead_letters: state.dead_letters.len(),
            deduplicated: state.deduplicated,
        }
    }
}
