//! Metrics collection.
//!
//! # Metrics
//! - `pipeline_requests_total` (counter): requests by handler, status
//! - `pipeline_request_duration_seconds` (histogram): latency by handler
//! - `remote_calls_total` (counter): remote API calls by api, outcome
//! - `db_statements_total` (counter): statements by kind, outcome
//!
//! # Design Decisions
//! - Recorded through the `metrics` facade; installing an exporter is left
//!   to the embedding application
//! - Labels stay low-cardinality (handler titles, API names)

use std::time::Instant;

/// Record one finished pipeline request.
pub fn record_request(handler: &str, status: u16, start: Instant) {
    let duration = start.elapsed().as_secs_f64();
    metrics::counter!(
        "pipeline_requests_total",
        "handler" => handler.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    metrics::histogram!(
        "pipeline_request_duration_seconds",
        "handler" => handler.to_string()
    )
    .record(duration);
}

/// Record one remote API call.
pub fn record_remote_call(api: &str, outcome: &'static str) {
    metrics::counter!(
        "remote_calls_total",
        "api" => api.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

/// Record a recovered panic.
pub fn record_panic(handler: &str) {
    metrics::counter!("pipeline_panics_total", "handler" => handler.to_string()).increment(1);
}

/// Record one database statement issued by an endpoint.
pub fn record_db_statement(kind: &'static str, outcome: &'static str) {
    metrics::counter!(
        "db_statements_total",
        "kind" => kind,
        "outcome" => outcome
    )
    .increment(1);
}
