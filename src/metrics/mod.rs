//! # Run Metrics
//!
//! Metric names and Prometheus recorder setup.
//!
//! Components record through the `metrics` facade; without an installed
//! recorder every call is a no-op. `clinsupply run --metrics` installs the
//! Prometheus recorder from [`setup_metrics`] and prints a text snapshot
//! once the run finishes.
//!
//! ## Metrics Tracked
//!
//! **Counters:**
//! - `clinsupply_reasoning_calls_total{shape, outcome}` - Reasoning calls after retries
//! - `clinsupply_credential_swaps_total` - Credential rotations inside one attempt
//! - `clinsupply_model_fallbacks_total` - Model fallbacks after a 404
//! - `clinsupply_degraded_sites_total{scope}` - Sites answered by rules after a reasoning failure
//! - `clinsupply_decisions_total{source}` - Final decisions per source
//!
//! **Histograms:**
//! - `clinsupply_reasoning_duration_seconds{shape}` - Wall time per reasoning call
//!
//! **Gauges:**
//! - `clinsupply_breaker_failures` - Consecutive reasoning failures in the run

pub use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

pub const REASONING_CALLS: &str = "clinsupply_reasoning_calls_total";
pub const CREDENTIAL_SWAPS: &str = "clinsupply_credential_swaps_total";
pub const MODEL_FALLBACKS: &str = "clinsupply_model_fallbacks_total";
pub const DEGRADED_SITES: &str = "clinsupply_degraded_sites_total";
pub const DECISIONS: &str = "clinsupply_decisions_total";
pub const REASONING_DURATION: &str = "clinsupply_reasoning_duration_seconds";
pub const BREAKER_FAILURES: &str = "clinsupply_breaker_failures";

/// Reasoning calls take seconds, and a retried call can take a minute.
const DURATION_BUCKETS: &[f64] = &[0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0];

/// Register descriptions so the Prometheus output carries `# HELP` lines.
pub fn describe_metrics() {
    metrics::describe_counter!(REASONING_CALLS, "Reasoning calls by shape and outcome");
    metrics::describe_counter!(CREDENTIAL_SWAPS, "Credential rotations after transient failures");
    metrics::describe_counter!(MODEL_FALLBACKS, "Model fallbacks after a missing model");
    metrics::describe_counter!(DEGRADED_SITES, "Sites decided by rules after a reasoning failure");
    metrics::describe_counter!(DECISIONS, "Final decisions by source");
    metrics::describe_histogram!(
        REASONING_DURATION,
        metrics::Unit::Seconds,
        "Reasoning call duration including retries"
    );
    metrics::describe_gauge!(BREAKER_FAILURES, "Consecutive reasoning failures in the current run");
}

/// Install the global Prometheus recorder.
///
/// Returns a handle that renders the text exposition format.
pub fn setup_metrics() -> Result<PrometheusHandle, BuildError> {
    use metrics_exporter_prometheus::Matcher;

    let handle = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full(REASONING_DURATION.to_string()),
            DURATION_BUCKETS,
        )?
        .install_recorder()?;
    describe_metrics();

    Ok(handle)
}
