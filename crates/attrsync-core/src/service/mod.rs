// Sync services: queue, enqueue API, reconcile, worker, and periodic sweep

pub mod enqueue;
pub mod memory;
pub mod periodic;
pub mod queue;
pub mod reconcile;
pub mod worker;

// Re-export commonly used types
pub use enqueue::Enqueuer;
pub use periodic::{PeriodicReconciler, ReconcilerConfig, SweepReport};
pub use queue::{MemorySyncQueue, QueueConfig};
pub use reconcile::{ReconcileOutcome, Reconciler, SyncConfig};
pub use worker::{Disposition, SyncWorker, WorkerConfig};
