//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define the per-request metrics record filled in by the pipeline
//! - Hand finished records to the `metrics` facade
//! - Install the Prometheus exporter (binary only)
//!
//! # Metrics
//! - `gateway_requests_total` (counter): requests by api, mapped path, status
//! - `gateway_request_duration_seconds` (histogram): end-to-end latency
//! - `gateway_endpoint_duration_seconds` (histogram): backend latency
//! - `gateway_interrupted_total` (counter): requests answered by a policy
//! - `gateway_endpoint_health` (gauge): 1=healthy, 0=unhealthy
//!
//! # Design Decisions
//! - The mapped path, not the raw path, is the label (bounded cardinality)
//! - Without an installed recorder every call is a no-op

use std::net::SocketAddr;
use std::time::Duration;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Finished record of one request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestMetrics {
    pub request_id: String,
    pub api_id: String,
    pub method: String,
    pub path: String,
    /// Normalized path alias, when one matched.
    pub mapped_path: Option<String>,
    pub endpoint: Option<String>,
    pub status: u16,
    /// A policy produced the response.
    pub interrupted: bool,
    /// Fault description when the pipeline failed.
    pub fault: Option<String>,
    pub gateway_latency: Duration,
    pub endpoint_latency: Option<Duration>,
}

/// Install the Prometheus exporter on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// Record a finished request.
pub fn record_request(record: &RequestMetrics) {
    let mapped_path = record.mapped_path.clone().unwrap_or_else(|| "unmapped".to_string());
    let status = record.status.to_string();

    metrics::counter!(
        "gateway_requests_total",
        "api" => record.api_id.clone(),
        "mapped_path" => mapped_path.clone(),
        "method" => record.method.clone(),
        "status" => status
    )
    .increment(1);

    metrics::histogram!(
        "gateway_request_duration_seconds",
        "api" => record.api_id.clone(),
        "mapped_path" => mapped_path
    )
    .record(record.gateway_latency.as_secs_f64());

    if let (Some(endpoint), Some(latency)) = (&record.endpoint, record.endpoint_latency) {
        metrics::histogram!(
            "gateway_endpoint_duration_seconds",
            "api" => record.api_id.clone(),
            "endpoint" => endpoint.clone()
        )
        .record(latency.as_secs_f64());
    }

    if record.interrupted {
        metrics::counter!("gateway_interrupted_total", "api" => record.api_id.clone()).increment(1);
    }

    tracing::debug!(
        request_id = %record.request_id,
        api = %record.api_id,
        method = %record.method,
        path = %record.path,
        mapped_path = ?record.mapped_path,
        endpoint = ?record.endpoint,
        status = record.status,
        interrupted = record.interrupted,
        fault = ?record.fault,
        latency_ms = record.gateway_latency.as_millis() as u64,
        "Request completed"
    );
}

/// Record the health of an endpoint.
pub fn record_endpoint_health(endpoint: &str, healthy: bool) {
    metrics::gauge!("gateway_endpoint_health", "endpoint" => endpoint.to_string())
        .set(if healthy { 1.0 } else { 0.0 });
}
