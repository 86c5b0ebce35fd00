//! Application state shared across HTTP handlers

use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusHandle;

use attrsync_common::SyncQueue;
use attrsync_core::{Enqueuer, PeriodicReconciler};

use crate::startup::ShutdownSignal;

/// Handles to the running synchronizer
pub struct AppState {
    pub queue: Arc<dyn SyncQueue>,
    pub enqueuer: Enqueuer,
    pub periodic: Arc<PeriodicReconciler>,
    pub shutdown: ShutdownSignal,
    /// Absent when another recorder was already installed
    pub prometheus: Option<PrometheusHandle>,
}

impl AppState {
    /// Ready while no shutdown has been requested
    pub fn is_ready(&self) -> bool {
        !self.shutdown.is_shutdown()
    }
}
