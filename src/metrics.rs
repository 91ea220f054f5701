//! Metrics for observability.
//!
//! Emits through the `metrics` facade; the host decides whether to install an
//! exporter. Without one, every call here is a no-op.
//!
//! # Metric Naming Convention
//!
//! All metrics are prefixed with `replicator_` and follow Prometheus conventions:
//! - Counters end in `_total`
//! - Gauges represent current state
//! - Histograms track distributions (duration)

use metrics::{counter, gauge, histogram};
use std::time::Duration;

/// Record a store connection attempt.
pub fn record_store_connection(store: &str, success: bool) {
    let status = if success { "success" } else { "failure" };
    counter!("replicator_store_connections_total", "store" => store.to_string(), "status" => status).increment(1);
}

/// Record a schema introspection and the number of tables found.
pub fn record_schema_fetch(store: &str, tables: usize) {
    counter!("replicator_schema_fetches_total", "store" => store.to_string()).increment(1);
    gauge!("replicator_schema_tables", "store" => store.to_string()).set(tables as f64);
}

/// Record the outcome of one replicated pair.
pub fn record_pair(
    source: &str,
    destination: &str,
    inserted: usize,
    skipped: usize,
    duration: Duration,
) {
    counter!("replicator_pairs_total", "status" => "success").increment(1);
    counter!(
        "replicator_rows_inserted_total",
        "source" => source.to_string(),
        "destination" => destination.to_string()
    )
    .increment(inserted as u64);
    counter!(
        "replicator_rows_skipped_total",
        "source" => source.to_string(),
        "destination" => destination.to_string()
    )
    .increment(skipped as u64);
    histogram!(
        "replicator_pair_duration_seconds",
        "source" => source.to_string(),
        "destination" => destination.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Record a failed pair.
pub fn record_pair_failure(source: &str, destination: &str, error_type: &str) {
    counter!("replicator_pairs_total", "status" => "failure").increment(1);
    counter!(
        "replicator_pair_errors_total",
        "source" => source.to_string(),
        "destination" => destination.to_string(),
        "error_type" => error_type.to_string()
    )
    .increment(1);
}

/// Record a completed pass.
pub fn record_pass(pairs: usize, failed: usize, duration: Duration) {
    counter!("replicator_passes_total").increment(1);
    gauge!("replicator_pass_pairs").set(pairs as f64);
    gauge!("replicator_pass_failed_pairs").set(failed as f64);
    histogram!("replicator_pass_duration_seconds").record(duration.as_secs_f64());
}

/// Record a ledger flush.
pub fn record_ledger_flush(entries: usize) {
    counter!("replicator_ledger_flushes_total").increment(1);
    counter!("replicator_ledger_entries_total").increment(entries as u64);
}

/// Gauge for orchestrator state.
pub fn set_orchestrator_state(state: &str) {
    let value = match state {
        "Idle" => 0.0,
        "Running" => 1.0,
        "Stopped" => 2.0,
        "Failed" => 3.0,
        _ => -1.0,
    };
    gauge!("replicator_orchestrator_state").set(value);
}
