//! Policy execution subsystem.
//!
//! # Data Flow
//! ```text
//! Flow bindings for a phase (from config)
//!     → registry.rs (binding → policy instance, disabled bindings dropped)
//!     → condition.rs (conditional bindings wrapped)
//!     → chain.rs (PolicyChain with a phase dispatch fn fixed at build time)
//!
//! Per request:
//!     chain.execute(ctx)
//!         → for each policy, in order:
//!             ctx interrupted? → stop, chain still completes
//!             dispatch to on_request / on_response / on_message_*
//!             policy error? → chain faults, rest skipped
//! ```
//!
//! # Design Decisions
//! - Policies never run concurrently within one chain
//! - "Handled" failures (401, 429...) interrupt the context, they are not errors
//! - Unknown phase names fail when the chain is built, never per request

pub mod builtin;
pub mod chain;
pub mod condition;
pub mod context;
pub mod phase;
pub mod registry;

use async_trait::async_trait;
use thiserror::Error;

use crate::buffer::BufferError;

pub use chain::{ChainOutcome, PolicyChain, PolicyChainError};
pub use condition::{Condition, ConditionError, ConditionalPolicy};
pub use context::{
    ExecutionContext, GatewayRequest, GatewayResponse, HttpExecutionContext,
    MessageExecutionContext, ATTR_INTERNAL_ENDPOINT, ATTR_PREFIX,
};
pub use phase::{ExecutionPhase, UnknownPhase};
pub use registry::{PolicyFactory, PolicyRegistry};

/// Errors a policy reports.
#[derive(Debug, Error)]
pub enum PolicyError {
    /// The policy could not do its job for this request.
    #[error("policy '{policy}' failed: {message}")]
    Failed { policy: String, message: String },

    /// Reading or folding a payload failed.
    #[error(transparent)]
    Body(#[from] BufferError),

    /// The policy configuration is unusable.
    #[error("policy '{policy}' has an invalid configuration: {message}")]
    InvalidConfiguration { policy: String, message: String },
}

impl PolicyError {
    pub fn failed(policy: impl Into<String>, message: impl ToString) -> Self {
        PolicyError::Failed {
            policy: policy.into(),
            message: message.to_string(),
        }
    }

    pub fn invalid_configuration(policy: impl Into<String>, message: impl ToString) -> Self {
        PolicyError::InvalidConfiguration {
            policy: policy.into(),
            message: message.to_string(),
        }
    }
}

/// A unit of request/response processing.
///
/// Every entry point defaults to a no-op, so a policy implements only the
/// phases it cares about.
#[async_trait]
pub trait Policy: Send + Sync {
    /// Policy identifier, for diagnostics.
    fn id(&self) -> &str;

    async fn on_request(&self, _ctx: &mut HttpExecutionContext<'_>) -> Result<(), PolicyError> {
        Ok(())
    }

    async fn on_response(&self, _ctx: &mut HttpExecutionContext<'_>) -> Result<(), PolicyError> {
        Ok(())
    }

    async fn on_message_request(
        &self,
        _ctx: &mut MessageExecutionContext<'_>,
    ) -> Result<(), PolicyError> {
        Ok(())
    }

    async fn on_message_response(
        &self,
        _ctx: &mut MessageExecutionContext<'_>,
    ) -> Result<(), PolicyError> {
        Ok(())
    }
}
