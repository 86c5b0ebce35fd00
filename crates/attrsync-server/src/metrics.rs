// Metrics module for observability
// Installs the Prometheus recorder and describes the sync metrics

use metrics::{describe_counter, describe_gauge, describe_histogram, gauge};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};

use attrsync_common::QueueStats;

const RECONCILE_DURATION_BUCKETS: &[f64] = &[0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0];

/// Build a Prometheus recorder with histogram buckets for reconcile latency
pub fn prometheus_builder() -> anyhow::Result<PrometheusBuilder> {
    Ok(PrometheusBuilder::new().set_buckets_for_metric(
        Matcher::Full("sync_reconcile_duration_seconds".to_string()),
        RECONCILE_DURATION_BUCKETS,
    )?)
}

/// Install the global recorder and describe all metrics
/// Should be called once at application startup
pub fn init_metrics() -> anyhow::Result<PrometheusHandle> {
    let handle = prometheus_builder()?.install_recorder()?;
    describe_metrics();
    tracing::info!("Metrics initialized");
    Ok(handle)
}

pub fn describe_metrics() {
    // Reconcile metrics
    describe_counter!(
        "sync_reconcile_total",
        "Total number of reconcile calls by outcome"
    );
    describe_histogram!(
        "sync_reconcile_duration_seconds",
        "Reconcile duration in seconds"
    );

    // Queue metrics
    describe_counter!(
        "sync_enqueue_total",
        "Total number of enqueue attempts by result"
    );
    describe_counter!(
        "sync_enqueue_deduplicated_total",
        "Total number of sync requests collapsed into a pending duplicate"
    );
    describe_counter!(
        "sync_dead_letter_total",
        "Total number of messages moved to the dead-letter channel"
    );
    describe_gauge!("sync_queue_pending", "Messages waiting for delivery");
    describe_gauge!("sync_queue_in_flight", "Messages leased to a consumer");
    describe_gauge!("sync_queue_dead_letters", "Messages parked in dead-letter");

    // Sweep metrics
    describe_counter!("sync_sweep_total", "Total number of reconciliation sweeps");
}

/// Publish point-in-time queue counters as gauges
pub fn record_queue_stats(stats: &QueueStats) {
    gauge!("sync_queue_pending").set(stats.pending as f64);
    gauge!("sync_queue_in_flight").set(stats.in_flight as f64);
    gauge!("sync_queue_dead_letters").set(stats.dead_letters as f64);
}
