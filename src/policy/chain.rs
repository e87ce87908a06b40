//! Policy chain execution.
//!
//! One chain is built per (flow, phase) and shared by every request of the
//! flow. Each `execute` call walks `Pending → Running → Completed | Faulted`:
//! `Ok(ChainOutcome)` is a completed run, interrupted or not, and
//! `Err(PolicyChainError::PolicyFailed)` a faulted one.

use std::fmt;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use thiserror::Error;

use crate::policy::context::{ExecutionContext, HttpExecutionContext, MessageExecutionContext};
use crate::policy::phase::{ExecutionPhase, UnknownPhase};
use crate::policy::condition::ConditionError;
use crate::policy::{Policy, PolicyError};

/// Errors raised while building or running a chain.
#[derive(Debug, Error)]
pub enum PolicyChainError {
    #[error(transparent)]
    UnknownPhase(#[from] UnknownPhase),

    #[error("no policy registered under '{0}'")]
    UnknownPolicy(String),

    #[error("cannot build policy '{policy}': {source}")]
    Configuration {
        policy: String,
        #[source]
        source: PolicyError,
    },

    #[error("invalid condition on policy '{policy}': {source}")]
    Condition {
        policy: String,
        #[source]
        source: ConditionError,
    },

    #[error("chain '{chain}' faulted in policy '{policy}': {source}")]
    PolicyFailed {
        chain: String,
        policy: String,
        #[source]
        source: PolicyError,
    },
}

/// Result of a chain invocation that completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainOutcome {
    /// The context was interrupted before every policy ran.
    pub interrupted: bool,
    /// Policies actually invoked.
    pub executed: usize,
    /// Policies skipped because the context was interrupted.
    pub skipped: usize,
}

type Dispatch =
    for<'a> fn(&'a dyn Policy, &'a mut ExecutionContext) -> BoxFuture<'a, Result<(), PolicyError>>;

fn dispatch_request<'a>(
    policy: &'a dyn Policy,
    ctx: &'a mut ExecutionContext,
) -> BoxFuture<'a, Result<(), PolicyError>> {
    Box::pin(async move {
        let mut view = HttpExecutionContext::new(ctx, ExecutionPhase::Request);
        policy.on_request(&mut view).await
    })
}

fn dispatch_response<'a>(
    policy: &'a dyn Policy,
    ctx: &'a mut ExecutionContext,
) -> BoxFuture<'a, Result<(), PolicyError>> {
    Box::pin(async move {
        let mut view = HttpExecutionContext::new(ctx, ExecutionPhase::Response);
        policy.on_response(&mut view).await
    })
}

fn dispatch_message_request<'a>(
    policy: &'a dyn Policy,
    ctx: &'a mut ExecutionContext,
) -> BoxFuture<'a, Result<(), PolicyError>> {
    Box::pin(async move {
        let mut view = MessageExecutionContext::new(ctx, ExecutionPhase::AsyncRequest);
        policy.on_message_request(&mut view).await
    })
}

fn dispatch_message_response<'a>(
    policy: &'a dyn Policy,
    ctx: &'a mut ExecutionContext,
) -> BoxFuture<'a, Result<(), PolicyError>> {
    Box::pin(async move {
        let mut view = MessageExecutionContext::new(ctx, ExecutionPhase::AsyncResponse);
        policy.on_message_response(&mut view).await
    })
}

fn dispatch_for(phase: ExecutionPhase) -> Dispatch {
    match phase {
        ExecutionPhase::Request => dispatch_request,
        ExecutionPhase::Response => dispatch_response,
        ExecutionPhase::AsyncRequest => dispatch_message_request,
        ExecutionPhase::AsyncResponse => dispatch_message_response,
    }
}

/// Ordered policies of one flow phase.
pub struct PolicyChain {
    id: String,
    phase: ExecutionPhase,
    policies: Vec<Arc<dyn Policy>>,
    dispatch: Dispatch,
}

impl PolicyChain {
    pub fn new(id: impl Into<String>, phase: ExecutionPhase, policies: Vec<Arc<dyn Policy>>) -> Self {
        Self {
            id: id.into(),
            phase,
            policies,
            dispatch: dispatch_for(phase),
        }
    }

    /// Build a chain from a phase name.
    pub fn for_phase(
        id: impl Into<String>,
        phase: &str,
        policies: Vec<Arc<dyn Policy>>,
    ) -> Result<Self, PolicyChainError> {
        let phase = phase.parse::<ExecutionPhase>()?;
        Ok(Self::new(id, phase, policies))
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn phase(&self) -> ExecutionPhase {
        self.phase
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }

    /// Run every policy in order against `ctx`.
    pub async fn execute(&self, ctx: &mut ExecutionContext) -> Result<ChainOutcome, PolicyChainError> {
        let mut executed = 0;
        tracing::trace!(chain = %self.id, phase = %self.phase, policies = self.policies.len(), "Executing policy chain");

        for policy in &self.policies {
            if ctx.is_interrupted() {
                let skipped = self.policies.len() - executed;
                tracing::debug!(chain = %self.id, phase = %self.phase, skipped, "Context interrupted, skipping remaining policies");
                return Ok(ChainOutcome {
                    interrupted: true,
                    executed,
                    skipped,
                });
            }

            tracing::trace!(chain = %self.id, policy = %policy.id(), "Invoking policy");
            if let Err(source) = (self.dispatch)(policy.as_ref(), ctx).await {
                tracing::warn!(chain = %self.id, phase = %self.phase, policy = %policy.id(), error = %source, "Policy chain faulted");
                return Err(PolicyChainError::PolicyFailed {
                    chain: self.id.clone(),
                    policy: policy.id().to_string(),
                    source,
                });
            }
            executed += 1;
        }

        Ok(ChainOutcome {
            interrupted: ctx.is_interrupted(),
            executed,
            skipped: 0,
        })
    }
}

impl fmt::Debug for PolicyChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PolicyChain")
            .field("id", &self.id)
            .field("phase", &self.phase)
            .field("policies", &self.policies.iter().map(|p| p.id()).collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::context::GatewayRequest;
    use async_trait::async_trait;
    use axum::http::Method;
    use std::sync::Mutex;

    /// Records every invocation as "<id>:<phase>".
    struct Recording {
        id: String,
        log: Arc<Mutex<Vec<String>>>,
        interrupt: bool,
        fail: bool,
    }

    impl Recording {
        fn new(id: &str, log: &Arc<Mutex<Vec<String>>>) -> Self {
            Self {
                id: id.to_string(),
                log: log.clone(),
                interrupt: false,
                fail: false,
            }
        }

        fn record(&self, ctx: &mut ExecutionContext, phase: &str) -> Result<(), PolicyError> {
            self.log.lock().unwrap().push(format!("{}:{}", self.id, phase));
            if self.interrupt {
                ctx.interrupt();
            }
            if self.fail {
                return Err(PolicyError::failed(&self.id, "boom"));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl Policy for Recording {
        fn id(&self) -> &str {
            &self.id
        }

        async fn on_request(&self, ctx: &mut HttpExecutionContext<'_>) -> Result<(), PolicyError> {
            self.record(ctx, "request")
        }

        async fn on_response(&self, ctx: &mut HttpExecutionContext<'_>) -> Result<(), PolicyError> {
            self.record(ctx, "response")
        }

        async fn on_message_request(&self, ctx: &mut MessageExecutionContext<'_>) -> Result<(), PolicyError> {
            self.record(ctx, "async_request")
        }

        async fn on_message_response(&self, ctx: &mut MessageExecutionContext<'_>) -> Result<(), PolicyError> {
            self.record(ctx, "async_response")
        }
    }

    fn context() -> ExecutionContext {
        ExecutionContext::new(GatewayRequest::new(Method::GET, "/"))
    }

    fn entries(log: &Arc<Mutex<Vec<String>>>) -> Vec<String> {
        log.lock().unwrap().clone()
    }

    #[tokio::test]
    async fn test_policies_run_in_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = PolicyChain::new(
            "flow-1",
            ExecutionPhase::Request,
            vec![
                Arc::new(Recording::new("A", &log)),
                Arc::new(Recording::new("B", &log)),
            ],
        );

        let outcome = chain.execute(&mut context()).await.unwrap();
        assert!(!outcome.interrupted);
        assert_eq!(outcome.executed, 2);
        assert_eq!(entries(&log), vec!["A:request", "B:request"]);
    }

    #[tokio::test]
    async fn test_interruption_skips_rest_and_completes() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut b = Recording::new("B", &log);
        b.interrupt = true;
        let chain = PolicyChain::new(
            "flow-1",
            ExecutionPhase::Request,
            vec![
                Arc::new(Recording::new("A", &log)),
                Arc::new(b),
                Arc::new(Recording::new("C", &log)),
            ],
        );

        let mut ctx = context();
        let outcome = chain.execute(&mut ctx).await.unwrap();
        assert_eq!(entries(&log), vec!["A:request", "B:request"]);
        assert!(outcome.interrupted);
        assert_eq!(outcome.executed, 2);
        assert_eq!(outcome.skipped, 1);
        assert!(ctx.is_interrupted());
    }

    #[tokio::test]
    async fn test_policy_failure_faults_chain() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut a = Recording::new("A", &log);
        a.fail = true;
        let chain = PolicyChain::new(
            "flow-1",
            ExecutionPhase::Response,
            vec![Arc::new(a), Arc::new(Recording::new("B", &log))],
        );

        let err = chain.execute(&mut context()).await.unwrap_err();
        assert!(matches!(err, PolicyChainError::PolicyFailed { ref policy, .. } if policy == "A"));
        assert_eq!(entries(&log), vec!["A:response"]);
    }

    #[tokio::test]
    async fn test_phase_selects_entry_point() {
        let log = Arc::new(Mutex::new(Vec::new()));
        for phase in ExecutionPhase::ALL {
            let chain = PolicyChain::new("c", phase, vec![Arc::new(Recording::new("P", &log))]);
            chain.execute(&mut context()).await.unwrap();
        }
        assert_eq!(
            entries(&log),
            vec!["P:request", "P:response", "P:async_request", "P:async_response"]
        );
    }

    #[tokio::test]
    async fn test_unknown_phase_fails_before_any_policy() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let result = PolicyChain::for_phase("c", "subscribe", vec![Arc::new(Recording::new("P", &log))]);
        assert!(matches!(result, Err(PolicyChainError::UnknownPhase(_))));
        assert!(entries(&log).is_empty());
    }

    #[tokio::test]
    async fn test_already_interrupted_context_runs_nothing() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = PolicyChain::new("c", ExecutionPhase::Request, vec![Arc::new(Recording::new("P", &log))]);
        let mut ctx = context();
        ctx.interrupt();
        let outcome = chain.execute(&mut ctx).await.unwrap();
        assert!(outcome.interrupted);
        assert_eq!(outcome.executed, 0);
        assert!(entries(&log).is_empty());
    }
}
