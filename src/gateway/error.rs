//! Gateway errors and their HTTP mapping.

use axum::http::StatusCode;
use thiserror::Error;

use crate::buffer::BufferError;
use crate::load_balancer::endpoint::EndpointError;
use crate::policy::{PolicyChainError, PolicyError};
use crate::routing::{FlowError, PatternError};

/// Errors raised while invoking an endpoint.
#[derive(Debug, Error)]
pub enum InvokerError {
    #[error("invalid upstream uri '{0}'")]
    InvalidUri(String),

    #[error("upstream request failed: {0}")]
    Request(String),

    #[error("upstream did not answer within {0:?}")]
    Timeout(std::time::Duration),

    #[error(transparent)]
    Body(#[from] BufferError),
}

/// Request-time failures of the pipeline.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("no API deployed for '{0}'")]
    NoApi(String),

    #[error("API '{api}' has no flow for {method} '{path}'")]
    NoFlow {
        api: String,
        method: String,
        path: String,
    },

    #[error("API '{0}' has no available endpoint")]
    NoEndpoint(String),

    #[error(transparent)]
    Chain(PolicyChainError),

    #[error(transparent)]
    Invoker(#[from] InvokerError),

    #[error(transparent)]
    Body(#[from] BufferError),
}

impl From<PolicyChainError> for GatewayError {
    /// Payload failures surface as body errors, whichever policy hit them.
    fn from(err: PolicyChainError) -> Self {
        match err {
            PolicyChainError::PolicyFailed {
                chain,
                policy,
                source: PolicyError::Body(e),
            } => {
                tracing::debug!(chain = %chain, policy = %policy, error = %e, "Policy could not read the payload");
                GatewayError::Body(e)
            }
            other => GatewayError::Chain(other),
        }
    }
}

impl GatewayError {
    /// Status written to the client.
    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::NoApi(_) | GatewayError::NoFlow { .. } => StatusCode::NOT_FOUND,
            GatewayError::NoEndpoint(_) => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::Chain(_) => StatusCode::INTERNAL_SERVER_ERROR,
            GatewayError::Invoker(InvokerError::Timeout(_)) => StatusCode::GATEWAY_TIMEOUT,
            GatewayError::Invoker(InvokerError::Body(BufferError::TooLarge { .. }))
            | GatewayError::Body(BufferError::TooLarge { .. }) => StatusCode::PAYLOAD_TOO_LARGE,
            GatewayError::Invoker(InvokerError::Body(BufferError::Transport(_))) => StatusCode::BAD_REQUEST,
            GatewayError::Invoker(_) => StatusCode::BAD_GATEWAY,
            GatewayError::Body(BufferError::Transport(_)) => StatusCode::BAD_REQUEST,
        }
    }
}

/// Errors raised while deploying an API from configuration.
#[derive(Debug, Error)]
pub enum DeployError {
    #[error("API '{api}': {source}")]
    Flow {
        api: String,
        #[source]
        source: FlowError,
    },

    #[error("API '{api}', flow '{flow}': {source}")]
    Chain {
        api: String,
        flow: String,
        #[source]
        source: PolicyChainError,
    },

    #[error("API '{api}': {source}")]
    Endpoint {
        api: String,
        #[source]
        source: EndpointError,
    },

    #[error("API '{api}': invalid mapped path: {source}")]
    MappedPath {
        api: String,
        #[source]
        source: PatternError,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(GatewayError::NoApi("/x".into()).status_code(), StatusCode::NOT_FOUND);
        assert_eq!(GatewayError::NoEndpoint("a".into()).status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            GatewayError::Invoker(InvokerError::Request("refused".into())).status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            GatewayError::Body(BufferError::TooLarge { limit: 1 }).status_code(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(
            GatewayError::Chain(PolicyChainError::UnknownPolicy("x".into())).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_policy_body_failure_is_lifted() {
        let err = GatewayError::from(PolicyChainError::PolicyFailed {
            chain: "api/flow/request".into(),
            policy: "reader".into(),
            source: PolicyError::Body(BufferError::TooLarge { limit: 6 }),
        });
        assert!(matches!(err, GatewayError::Body(BufferError::TooLarge { limit: 6 })));
        assert_eq!(err.status_code(), StatusCode::PAYLOAD_TOO_LARGE);

        let err = GatewayError::from(PolicyChainError::PolicyFailed {
            chain: "api/flow/request".into(),
            policy: "reader".into(),
            source: PolicyError::Body(BufferError::Transport("reset".into())),
        });
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);

        let err = GatewayError::from(PolicyChainError::PolicyFailed {
            chain: "api/flow/request".into(),
            policy: "reader".into(),
            source: PolicyError::failed("reader", "boom"),
        });
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_unreadable_request_body_is_client_error() {
        let err = GatewayError::Invoker(InvokerError::Body(BufferError::TooLarge { limit: 6 }));
        assert_eq!(err.status_code(), StatusCode::PAYLOAD_TOO_LARGE);
        let err = GatewayError::Invoker(InvokerError::Body(BufferError::Transport("reset".into())));
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }
}
