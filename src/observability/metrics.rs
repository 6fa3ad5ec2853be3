//! Metrics collection and exposition.
//!
//! # Metrics
//! - `relay_requests_total` (counter): forwarded requests by agent, status, outcome
//! - `relay_request_duration_seconds` (histogram): dispatch → stream end
//! - `relay_request_bytes_total` / `relay_response_bytes_total` (counters) by agent
//! - `relay_token_warnings_total` (counter): soft-threshold warnings by agent
//! - `relay_telemetry_failures_total` (counter): store errors by operation
//!
//! # Design Decisions
//! - Recording through the `metrics` facade is a no-op until a recorder is installed
//! - Prometheus exporter runs its own listener, separate from the proxy port

use std::net::SocketAddr;
use std::time::Duration;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::routing::AgentTag;

/// Install the Prometheus recorder and its HTTP listener.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Prometheus metrics endpoint started");
    Ok(())
}

pub fn record_forward(agent: AgentTag, status: u16, outcome: &'static str, duration: Duration) {
    counter!(
        "relay_requests_total",
        "agent" => agent.as_str(),
        "status" => status.to_string(),
        "outcome" => outcome
    )
    .increment(1);
    histogram!("relay_request_duration_seconds", "agent" => agent.as_str())
        .record(duration.as_secs_f64());
}

pub fn record_bytes(agent: AgentTag, in_bytes: u64, out_bytes: u64) {
    counter!("relay_request_bytes_total", "agent" => agent.as_str()).increment(in_bytes);
    counter!("relay_response_bytes_total", "agent" => agent.as_str()).increment(out_bytes);
}

pub fn record_token_warning(agent: AgentTag) {
    counter!("relay_token_warnings_total", "agent" => agent.as_str()).increment(1);
}

pub fn record_telemetry_failure(operation: &'static str) {
    counter!("relay_telemetry_failures_total", "operation" => operation).increment(1);
}
