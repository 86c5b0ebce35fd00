//! attrsync Core - Registry synchronization engine
//!
//! This crate provides:
//! - An in-process, partitioned, deduplicating sync request queue
//! - The enqueue API shared by mutation hooks and the periodic sweep
//! - Reconcile-one-entity, the only code path that writes to the registry
//! - The sync worker loop and the periodic reconciler
//! - In-memory store and registry backends

pub mod service;

// Re-export commonly used types
pub use service::{
    Disposition, Enqueuer, MemorySyncQueue, PeriodicReconciler, QueueConfig, ReconcileOutcome,
    Reconciler, ReconcilerConfig, SweepReport, SyncConfig, SyncWorker, WorkerConfig,
};
pub use service::memory::{MemoryAttributeStore, MemoryRegistry, RegistryOp};
