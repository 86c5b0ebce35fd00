//! Periodic Reconciler
//!
//! Sweeps the whole attribute store on a fixed schedule and enqueues one sync
//! request per id, so the registry converges even when real-time messages are
//! lost. A sweep interrupted at a page boundary is simply restarted by the
//! next tick; the re-enqueues it causes are idempotent.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use attrsync_common::{AttributeStore, SyncError};

use super::enqueue::Enqueuer;

/// Periodic reconciler configuration
#[derive(Clone, Debug)]
pub struct ReconcilerConfig {
    /// Time between two sweeps
    pub interval: Duration,
    /// Attributes requested per store page
    pub page_size: usize,
    /// Sweep immediately at startup instead of after the first interval
    pub run_on_start: bool,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(12 * 60 * 60),
            page_size: 100,
            run_on_start: false,
        }
    }
}

/// Result of one sweep
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
    /// Store pages read
    pub pages: usize,
    /// Ids enqueued successfully
    pub enqueued: usize,
    /// Ids whose enqueue failed
    pub failed: usize,
    /// Whether the sweep stopped early on shutdown
    pub cancelled: bool,
}

pub struct PeriodicReconciler {
    store: Arc<dyn AttributeStore>,
    enqueuer: Enqueuer,
    config: ReconcilerConfig,
}

impl PeriodicReconciler {
    pub fn new(
        store: Arc<dyn AttributeStore>,
        enqueuer: Enqueuer,
        config: ReconcilerConfig,
    ) -> Self {
        Self {
            store,
            enqueuer,
            config,
        }
    }

    /// Run one full sweep
    pub async fn sweep(&self) -> Result<SweepReport, SyncError> {
        self.sweep_until(None).await
    }

    /// Run one sweep, stopping at the next page boundary once `shutdown` is set
    pub async fn sweep_until(
        &self,
        shutdown: Option<&watch::Receiver<bool>>,
    ) -> Result<SweepReport, SyncError> {
        let mut report = SweepReport::default();
        let mut token: Option<String> = None;
        info!(
            "Starting reconciliation sweep with page size {}",
            self.config.page_size
        );

        loop {
            if shutdown.is_some_and(|rx| *rx.borrow()) {
                warn!(
                    "Reconciliation sweep cancelled after {} pages",
                    report.pages
                );
                report.cancelled = true;
                break;
            }

            let page = self
                .store
                .list_page(self.config.page_size, token.as_deref())
                .await
                .map_err(|e| {
                    error!(
                        "Reconciliation sweep aborted at page {}: {}",
                        report.pages + 1,
                        e
                    );
                    SyncError::from(e)
                })?;
            report.pages += 1;

            for attribute in &page.attributes {
                match self.enqueuer.enqueue(&attribute.id).await {
                    Ok(()) => report.enqueued += 1,
                    Err(e) => {
                        report.failed += 1;
                        warn!("Sweep failed to enqueue {}: {}", attribute.id, e);
                    }
                }
            }
            debug!(
                "Sweep page {} enqueued {} ids",
                report.pages,
                page.attributes.len()
            );

            match page.continuation() {
                Some(next) => token = Some(next.to_string()),
                None => break,
            }
        }

        metrics::counter!("sync_sweep_total").increment(1);
        info!(
            "Reconciliation sweep finished: {} pages, {} enqueued, {} failed",
            report.pages, report.enqueued, report.failed
        );
        Ok(report)
    }

    /// Sweep on a fixed interval until `shutdown` flips to true
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            "Periodic reconciler started with interval {:?}",
            self.config.interval
        );
        let start = if self.config.run_on_start {
            tokio::time::Instant::now()
        } else {
            tokio::time::Instant::now() + self.config.interval
        };
        let mut interval = tokio::time::interval_at(start, self.config.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {}
                _ = shutdown.changed() => break,
            }
            if *shutdown.borrow() {
                break;
            }
            // A failed sweep is retried in full on the next tick
            let _ = self.sweep_until(Some(&shutdown)).await;
        }
        info!("Periodic reconciler stopped");
    }
}
