//! Metrics declaration and recording helpers.
//!
//! With the `metrics` feature disabled every helper is an empty inline
//! function.

use std::time::Duration;

use crate::dispatcher::DispatchState;

#[cfg(feature = "metrics")]
use lazy_static::lazy_static;

#[cfg(feature = "metrics")]
lazy_static! {
    /// Track dispatches by terminal state.
    pub static ref DISPATCH_COUNTER: &'static str = {
        metrics::describe_counter!(
            "volley_dispatch_total",
            "Total number of dispatches by terminal state."
        );
        "volley_dispatch_total"
    };
    /// Gauge of currently in-flight deduplicated requests.
    pub static ref INFLIGHT_GAUGE: &'static str = {
        metrics::describe_gauge!(
            "volley_inflight",
            "Number of deduplicated requests currently in flight."
        );
        "volley_inflight"
    };
    /// Histogram of transport call duration.
    pub static ref TRANSPORT_DURATION: &'static str = {
        metrics::describe_histogram!(
            "volley_transport_duration_seconds",
            metrics::Unit::Seconds,
            "Duration of transport calls, including body buffering, in seconds."
        );
        "volley_transport_duration_seconds"
    };
    /// Track bytes charged against byte budgets.
    pub static ref BYTES_CHARGED: &'static str = {
        metrics::describe_counter!(
            "volley_budget_bytes_charged_total",
            "Total response bytes charged against byte budgets."
        );
        "volley_budget_bytes_charged_total"
    };
}

/// Records a terminal dispatch state for the given priority class.
#[cfg(feature = "metrics")]
#[inline]
pub fn record_state(class: &'static str, state: DispatchState) {
    metrics::counter!(*DISPATCH_COUNTER, "class" => class, "state" => state.as_str()).increment(1);
}

/// No-op version when metrics feature is disabled.
#[cfg(not(feature = "metrics"))]
#[inline]
pub fn record_state(_class: &'static str, _state: DispatchState) {}

/// Records a started (`1.0`) or finished (`-1.0`) in-flight entry.
#[cfg(feature = "metrics")]
#[inline]
pub fn record_inflight(class: &'static str, delta: f64) {
    metrics::gauge!(*INFLIGHT_GAUGE, "class" => class).increment(delta);
}

/// No-op version when metrics feature is disabled.
#[cfg(not(feature = "metrics"))]
#[inline]
pub fn record_inflight(_class: &'static str, _delta: f64) {}

/// Counts one in-flight entry on the gauge until dropped.
pub(crate) struct InflightGuard {
    class: &'static str,
}

impl InflightGuard {
    pub(crate) fn new(class: &'static str) -> Self {
        record_inflight(class, 1.0);
        Self { class }
    }
}

impl Drop for InflightGuard {
    fn drop(&mut self) {
        record_inflight(self.class, -1.0);
    }
}

/// Records one transport call and the bytes it charged.
#[cfg(feature = "metrics")]
#[inline]
pub fn record_fetch(class: &'static str, duration: Duration, charged: Option<u64>) {
    metrics::histogram!(*TRANSPORT_DURATION, "class" => class).record(duration.as_secs_f64());
    if let Some(bytes) = charged {
        metrics::counter!(*BYTES_CHARGED, "class" => class).increment(bytes);
    }
}

/// No-op version when metrics feature is disabled.
#[cfg(not(feature = "metrics"))]
#[inline]
pub fn record_fetch(_class: &'static str, _duration: Duration, _charged: Option<u64>) {}
