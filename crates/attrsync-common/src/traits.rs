//! Collaborator traits for dependency injection
//!
//! The synchronizer is constructed with explicit `Arc<dyn ...>` instances of
//! these traits; no process-wide client registry exists.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{EnqueueError, QueueError, RegistryError, StoreError};
use crate::model::{Attribute, AttributePage, RegistryGroup, SyncMessage};

/// Read access to the canonical attribute store
#[async_trait::async_trait]
pub trait AttributeStore: Send + Sync {
    /// Look up an attribute by its normalized id
    async fn get_by_id(&self, id: &str) -> Result<Option<Attribute>, StoreError>;

    /// List one page of attributes; `token` is the previous page's continuation
    async fn list_page(
        &self,
        page_size: usize,
        token: Option<&str>,
    ) -> Result<AttributePage, StoreError>;
}

/// Adapter over the external registry, keyed by group name
#[async_trait::async_trait]
pub trait RegistryClient: Send + Sync {
    /// Fetch a group; absence is `RegistryError::NotFound`
    async fn get(&self, name: &str) -> Result<RegistryGroup, RegistryError>;

    /// Create a group and return its identifier, if the registry supplied one
    async fn create(
        &self,
        name: &str,
        description: &str,
        payload: &str,
        tags: &BTreeMap<String, String>,
    ) -> Result<Option<String>, RegistryError>;

    /// Update description and payload, returning the group identifier
    async fn update(
        &self,
        name: &str,
        description: &str,
        payload: &str,
    ) -> Result<Option<String>, RegistryError>;

    /// Add tags to a group; never removes existing tags
    async fn tag(
        &self,
        identifier: &str,
        tags: &BTreeMap<String, String>,
    ) -> Result<(), RegistryError>;

    /// Delete a group
    async fn delete(&self, name: &str) -> Result<(), RegistryError>;
}

/// A message handed to a consumer, locked to it until acked or nacked
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Delivery {
    /// Handle used to ack/nack this particular delivery
    pub receipt: String,
    /// Stable id of the underlying message
    pub message_id: String,
    /// Raw message body
    pub body: String,
    /// Number of times this message has been delivered, this one included
    pub receive_count: u32,
}

/// A message parked after exhausting its retry budget
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetter {
    pub message_id: String,
    pub body: String,
    pub receive_count: u32,
    pub reason: String,
    pub dead_lettered_at: String,
}

/// Point-in-time queue counters
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStats {
    pub pending: usize,
    pub in_flight: usize,
    pub dead_letters: usize,
    pub deduplicated: u64,
}

/// Ordered, deduplicating, at-least-once channel of sync requests
///
/// Messages sharing a partition (attribute id) are never delivered
/// concurrently and keep their send order.
#[async_trait::async_trait]
pub trait SyncQueue: Send + Sync {
    /// Append a message to its partition
    async fn send(&self, message: SyncMessage) -> Result<(), EnqueueError>;

    /// Wait up to `wait` for the next deliverable message
    async fn receive(&self, wait: Duration) -> Option<Delivery>;

    /// Mark a delivery as handled
    async fn ack(&self, receipt: &str) -> Result<(), QueueError>;

    /// Release a delivery for redelivery, dead-lettering it once the budget is spent
    async fn nack(&self, receipt: &str, reason: &str) -> Result<(), QueueError>;

    /// Park a delivery immediately, bypassing the retry budget
    async fn dead_letter(&self, receipt: &str, reason: &str) -> Result<(), QueueError>;

    /// Snapshot of the dead-letter channel
    async fn dead_letters(&self) -> Vec<DeadLetter>;

    /// Re-send a dead-lettered message with its original body
    async fn replay_dead_letter(&self, message_id: &str) -> Result<(), QueueError>;

    /// Drop every dead-lettered message, returning how many were removed
    async fn purge_dead_letters(&self) -> usize;

    async fn stats(&self) -> QueueStats;
}
