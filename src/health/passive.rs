//! Passive health checking (failure detection).
//!
//! # Responsibilities
//! - Observe request outcomes
//! - Classify them as success or failure
//! - Feed the endpoint manager, which owns thresholds and transitions
//!
//! # Design Decisions
//! - Only invocation errors and 5xx count as failures
//! - Timeouts are failures
//! - Unreadable request bodies are the client's fault, not the endpoint's
//! - 4xx are NOT failures (client error, not backend)

use axum::http::StatusCode;

use crate::gateway::error::InvokerError;
use crate::load_balancer::{EndpointManager, ManagedEndpoint};

/// Whether an invocation outcome counts against the endpoint.
pub fn is_failure(outcome: &Result<StatusCode, &InvokerError>) -> bool {
    match outcome {
        Ok(status) => status.is_server_error(),
        Err(InvokerError::Body(_)) => false,
        Err(_) => true,
    }
}

/// Report an invocation outcome to the manager.
pub fn observe(
    manager: &EndpointManager,
    endpoint: &ManagedEndpoint,
    outcome: Result<StatusCode, &InvokerError>,
) {
    if is_failure(&outcome) {
        tracing::debug!(endpoint = %endpoint.name(), outcome = ?outcome, "Passive health failure");
        manager.report_failure(endpoint);
    } else {
        manager.report_success(endpoint);
    }
}
