//! Endpoint invocation seam.

use async_trait::async_trait;

use crate::gateway::error::InvokerError;
use crate::load_balancer::ManagedEndpoint;
use crate::policy::ExecutionContext;

/// Sends the context's request to an endpoint and fills in its response.
///
/// Implementations drain `ctx.request_mut().body` and install the backend
/// status, headers and body on `ctx.response_mut()`.
#[async_trait]
pub trait EndpointInvoker: Send + Sync {
    async fn invoke(
        &self,
        endpoint: &ManagedEndpoint,
        ctx: &mut ExecutionContext,
    ) -> Result<(), InvokerError>;
}
