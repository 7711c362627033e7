//! Metrics definitions for the sync core.
//!
//! All metrics follow Prometheus naming conventions with a `live_` prefix
//! and `_total` suffixes for counters.
//!
//! # Cardinality
//!
//! Labels are bounded to prevent cardinality explosion:
//! - `kind`: 2 values (`connect`, `update`)
//! - `reason`: 5 values (see [`record_event_dropped`])
//! - `operation`: 3 values (`listener`, `get_state`, `apply_state`)
//! - `event`: bounded by the stable telemetry names
//!
//! Event names and object ids are never used as labels.

use metrics::{counter, gauge};

/// Record a signal handed to the carrier.
///
/// Metric: `live_signals_submitted_total`
/// Labels: `kind`
pub fn record_signal_submitted(kind: &str) {
    counter!("live_signals_submitted_total",
        "kind" => kind.to_string()
    )
    .increment(1);
}

/// Record an inbound event dropped before dispatch.
///
/// Metric: `live_events_dropped_total`
/// Labels: `reason`
///
/// Reasons: `disconnected`, `anonymous`, `malformed`, `role_rejected`,
/// `role_lookup_failed`.
pub fn record_event_dropped(reason: &'static str) {
    counter!("live_events_dropped_total",
        "reason" => reason
    )
    .increment(1);
}

/// Record an event delivered to local listeners.
///
/// Metric: `live_events_delivered_total`
pub fn record_event_delivered() {
    counter!("live_events_delivered_total").increment(1);
}

/// Record a user callback failure.
///
/// Metric: `live_handler_errors_total`
/// Labels: `operation` (`listener`, `get_state`, `apply_state`)
pub fn record_handler_error(operation: &'static str) {
    counter!("live_handler_errors_total",
        "operation" => operation
    )
    .increment(1);
}

/// Record a telemetry event emission by stable name.
///
/// Metric: `live_telemetry_events_total`
/// Labels: `event`
pub fn record_telemetry_event(event: &'static str) {
    counter!("live_telemetry_events_total",
        "event" => event
    )
    .increment(1);
}

/// Record a role-cache lookup outcome.
///
/// Metric: `live_role_lookups_total`
/// Labels: `outcome` (`hit`, `miss`, `error`)
pub fn record_role_lookup(outcome: &'static str) {
    counter!("live_role_lookups_total",
        "outcome" => outcome
    )
    .increment(1);
}

/// Set the number of live container synchronizers in this process.
///
/// Metric: `live_container_synchronizers`
pub fn set_container_synchronizers(count: usize) {
    #[allow(clippy::cast_precision_loss)]
    gauge!("live_container_synchronizers").set(count as f64);
}
