//! Prometheus metrics
//!
//! Metric names are fixed; dashboards depend on them. The recorder is
//! installed once at startup and the handle renders the text exposition for
//! `GET /metrics`.

use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use thiserror::Error as ThisError;

use crate::{Error, Result};

/// Errors from recorder installation
#[derive(Debug, ThisError)]
pub enum MetricsError {
    #[error("Failed to configure metric buckets: {0}")]
    Buckets(String),

    #[error("Failed to install metrics recorder: {0}")]
    Install(String),
}

impl From<MetricsError> for Error {
    fn from(error: MetricsError) -> Self {
        Error::Config(error.to_string())
    }
}

/// Fixed metric names
pub mod names {
    pub const HTTP_REQUEST_DURATION: &str = "http_request_duration_seconds";
    pub const HTTP_IN_FLIGHT: &str = "http_requests_in_flight";
    pub const EVENT_PROCESSING_DURATION: &str = "event_processing_duration_seconds";
    pub const CONSUMER_LAG: &str = "consumer_lag";
    pub const DEAD_LETTER_EVENTS: &str = "dead_letter_events_total";
    pub const DUPLICATE_EVENTS: &str = "duplicate_events_total";
    pub const OVERSELL_INCIDENTS: &str = "oversell_incidents_total";
    pub const ORDER_E2E_LATENCY: &str = "order_e2e_latency_seconds";
    pub const ORDER_STATE_TRANSITIONS: &str = "order_state_transitions_total";
    pub const OUTBOX_PENDING_DEPTH: &str = "outbox_pending_depth";
    pub const OUTBOX_PUBLISHED: &str = "outbox_published_total";
}

/// HTTP latency buckets: 5ms to 10s
const HTTP_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// Event processing buckets: 1ms to 5s
const EVENT_BUCKETS: &[f64] = &[0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0];

/// End-to-end order latency buckets
const E2E_BUCKETS: &[f64] = &[0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0];

/// Install the Prometheus recorder and register metric descriptions
///
/// Call once per process; returns the render handle for the HTTP surface.
pub fn install_recorder() -> Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full(names::HTTP_REQUEST_DURATION.to_string()),
            HTTP_BUCKETS,
        )
        .map_err(|e| MetricsError::Buckets(e.to_string()))?
        .set_buckets_for_metric(
            Matcher::Full(names::EVENT_PROCESSING_DURATION.to_string()),
            EVENT_BUCKETS,
        )
        .map_err(|e| MetricsError::Buckets(e.to_string()))?
        .set_buckets_for_metric(
            Matcher::Full(names::ORDER_E2E_LATENCY.to_string()),
            E2E_BUCKETS,
        )
        .map_err(|e| MetricsError::Buckets(e.to_string()))?
        .install_recorder()
        .map_err(|e| MetricsError::Install(e.to_string()))?;

    register_metrics();
    Ok(handle)
}

fn register_metrics() {
    describe_histogram!(
        names::HTTP_REQUEST_DURATION,
        "HTTP request latency in seconds"
    );
    describe_gauge!(names::HTTP_IN_FLIGHT, "In-flight HTTP requests per service");
    describe_histogram!(
        names::EVENT_PROCESSING_DURATION,
        "Consumer handler latency in seconds"
    );
    describe_gauge!(
        names::CONSUMER_LAG,
        "Consumer lag per (group, topic, partition)"
    );
    describe_counter!(
        names::DEAD_LETTER_EVENTS,
        "Messages diverted to the dead-letter topic"
    );
    describe_counter!(
        names::DUPLICATE_EVENTS,
        "Events skipped by the idempotency store"
    );
    describe_counter!(
        names::OVERSELL_INCIDENTS,
        "Inventory invariant violations; the only acceptable value is zero"
    );
    describe_histogram!(
        names::ORDER_E2E_LATENCY,
        "Order latency from creation to terminal state"
    );
    describe_counter!(
        names::ORDER_STATE_TRANSITIONS,
        "Order state transitions by (from_state, to_state)"
    );
    describe_gauge!(
        names::OUTBOX_PENDING_DEPTH,
        "Pending outbox rows per service"
    );
    describe_counter!(
        names::OUTBOX_PUBLISHED,
        "Outbox rows successfully published"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_names_are_stable() {
        // Dashboards reference these names verbatim
        assert_eq!(names::HTTP_REQUEST_DURATION, "http_request_duration_seconds");
        assert_eq!(names::CONSUMER_LAG, "consumer_lag");
        assert_eq!(names::OVERSELL_INCIDENTS, "oversell_incidents_total");
        assert_eq!(names::ORDER_E2E_LATENCY, "order_e2e_latency_seconds");
        assert_eq!(names::DUPLICATE_EVENTS, "duplicate_events_total");
    }

    #[test]
    fn test_bucket_spans() {
        assert_eq!(*HTTP_BUCKETS.first().unwrap(), 0.005);
        assert_eq!(*HTTP_BUCKETS.last().unwrap(), 10.0);
        assert_eq!(*EVENT_BUCKETS.first().unwrap(), 0.001);
        assert_eq!(*EVENT_BUCKETS.last().unwrap(), 5.0);
    }
}
