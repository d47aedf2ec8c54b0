//! Prometheus metrics
//!
//! The recorder is installed once per process; recording before that (or
//! without it, in tests) is a no-op.

use std::time::Duration;

use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

pub const TURNS_TOTAL: &str = "campus_guide_turns_total";
pub const TURN_DURATION: &str = "campus_guide_turn_duration_seconds";
pub const ACTIVE_SESSIONS: &str = "campus_guide_active_sessions";
pub const ERRORS_TOTAL: &str = "campus_guide_errors_total";

/// Turns take seconds, most of it waiting on the language model
const TURN_BUCKETS: &[f64] = &[0.25, 0.5, 1.0, 2.0, 4.0, 8.0, 15.0, 30.0, 60.0, 120.0];

static HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

/// Install the global Prometheus recorder and return its render handle
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    HANDLE
        .get_or_try_init(|| {
            PrometheusBuilder::new()
                .set_buckets_for_metric(Matcher::Full(TURN_DURATION.to_string()), TURN_BUCKETS)?
                .install_recorder()
        })
        .cloned()
}

/// Count a finished turn and record its latency
pub fn record_turn(route: &'static str, outcome: &'static str, elapsed: Duration) {
    ::metrics::counter!(TURNS_TOTAL, "route" => route, "outcome" => outcome).increment(1);
    ::metrics::histogram!(TURN_DURATION, "route" => route).record(elapsed.as_secs_f64());
}

pub fn record_error(kind: &'static str) {
    ::metrics::counter!(ERRORS_TOTAL, "kind" => kind).increment(1);
}

pub fn set_active_sessions(count: usize) {
    ::metrics::gauge!(ACTIVE_SESSIONS).set(count as f64);
}
