//! Metrics definitions for the match service.
//!
//! All metrics follow Prometheus naming conventions:
//! - `ms_` prefix for the match service
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded by code, never by match or user identifiers:
//! - `outcome`: 3 values (`accepted`, `rejected`, `not_found`)
//! - `kind`: 3 values (`join`, `leave`, `data`)
//! - `result`: bounded relay outcomes (`delivered`, `not_member`, `no_recipients`, `bad_input`)

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Initialize Prometheus metrics recorder and return the handle
/// for serving metrics via HTTP.
///
/// Must be called before any metrics are recorded. Join latency buckets
/// cover the full 10 second join timeout.
///
/// # Errors
///
/// Returns error if Prometheus recorder fails to install (e.g., already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full("ms_join_latency_seconds".to_string()),
            &[
                0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000, 2.500, 5.000,
                10.000,
            ],
        )
        .map_err(|e| format!("Failed to set join latency buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus metrics recorder: {e}"))
}

// ============================================================================
// Match Metrics
// ============================================================================

/// Set the number of registered authoritative matches.
///
/// Metric: `ms_matches_active`
pub fn set_matches_active(count: usize) {
    // usize to f64 conversion is safe for realistic match counts (< 2^53)
    #[allow(clippy::cast_precision_loss)]
    gauge!("ms_matches_active").set(count as f64);
}

/// Record the outcome and latency of a registry join bridge call.
///
/// Metrics: `ms_join_attempts_total`, `ms_join_latency_seconds`
/// Labels: `outcome`
pub fn record_join_attempt(outcome: &str, duration: Duration) {
    counter!("ms_join_attempts_total", "outcome" => outcome.to_string()).increment(1);
    histogram!("ms_join_latency_seconds").record(duration.as_secs_f64());
}

// ============================================================================
// Actor Metrics
// ============================================================================

/// Record a mailbox message dropped due to backpressure.
///
/// Metric: `ms_messages_dropped_total`
/// Labels: `kind`
pub fn record_message_dropped(kind: &str) {
    counter!("ms_messages_dropped_total", "kind" => kind.to_string()).increment(1);
}

/// Record a match actor panic.
///
/// Metric: `ms_actor_panics_total`
///
/// Any non-zero value indicates a bug in match logic.
pub fn record_actor_panic() {
    counter!("ms_actor_panics_total").increment(1);
}

// ============================================================================
// Routing Metrics
// ============================================================================

/// Record the routing decision for a relayed data message.
///
/// Metric: `ms_relay_messages_total`
/// Labels: `result`
pub fn record_relay_message(result: &str) {
    counter!("ms_relay_messages_total", "result" => result.to_string()).increment(1);
}

/// Record an envelope the router could not hand to a session queue.
///
/// Metric: `ms_router_drops_total`
pub fn record_router_drop() {
    counter!("ms_router_drops_total").increment(1);
}
