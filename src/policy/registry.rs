//! Policy registry.
//!
//! Maps policy ids to factories and turns flow bindings into chains.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::policy::builtin;
use crate::policy::chain::{PolicyChain, PolicyChainError};
use crate::policy::condition::{Condition, ConditionalPolicy};
use crate::policy::phase::ExecutionPhase;
use crate::policy::{Policy, PolicyError};
use crate::routing::flow::PolicyBinding;

/// Builds policy instances from their JSON configuration.
pub trait PolicyFactory: Send + Sync {
    fn create(&self, configuration: &Value) -> Result<Arc<dyn Policy>, PolicyError>;
}

impl<F> PolicyFactory for F
where
    F: Fn(&Value) -> Result<Arc<dyn Policy>, PolicyError> + Send + Sync,
{
    fn create(&self, configuration: &Value) -> Result<Arc<dyn Policy>, PolicyError> {
        self(configuration)
    }
}

#[derive(Clone, Default)]
pub struct PolicyRegistry {
    factories: HashMap<String, Arc<dyn PolicyFactory>>,
}

impl PolicyRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the built-in policies.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        builtin::register_all(&mut registry);
        registry
    }

    /// Register (or replace) the factory for `id`.
    pub fn register(&mut self, id: impl Into<String>, factory: impl PolicyFactory + 'static) {
        self.factories.insert(id.into(), Arc::new(factory));
    }

    pub fn contains(&self, id: &str) -> bool {
        self.factories.contains_key(id)
    }

    /// Instantiate one binding, wrapping it when it carries a condition.
    pub fn create(&self, binding: &PolicyBinding) -> Result<Arc<dyn Policy>, PolicyChainError> {
        let factory = self
            .factories
            .get(&binding.policy)
            .ok_or_else(|| PolicyChainError::UnknownPolicy(binding.policy.clone()))?;

        let policy = factory
            .create(&binding.configuration)
            .map_err(|source| PolicyChainError::Configuration {
                policy: binding.policy.clone(),
                source,
            })?;

        match binding.condition.as_deref().map(str::trim) {
            Some(text) if !text.is_empty() => {
                let condition = Condition::parse(text).map_err(|source| PolicyChainError::Condition {
                    policy: binding.policy.clone(),
                    source,
                })?;
                Ok(Arc::new(ConditionalPolicy::new(policy, condition)))
            }
            _ => Ok(policy),
        }
    }

    /// Build the chain for one flow phase. Disabled bindings are dropped.
    pub fn build_chain(
        &self,
        id: impl Into<String>,
        phase: ExecutionPhase,
        bindings: &[PolicyBinding],
    ) -> Result<PolicyChain, PolicyChainError> {
        let policies = bindings
            .iter()
            .filter(|b| b.enabled)
            .map(|b| self.create(b))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(PolicyChain::new(id, phase, policies))
    }
}

impl fmt::Debug for PolicyRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ids: Vec<_> = self.factories.keys().collect();
        ids.sort();
        f.debug_struct("PolicyRegistry").field("policies", &ids).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::context::{ExecutionContext, GatewayRequest, HttpExecutionContext};
    use async_trait::async_trait;
    use axum::http::{HeaderValue, Method};
    use serde_json::json;

    struct Tag(String);

    #[async_trait]
    impl Policy for Tag {
        fn id(&self) -> &str {
            "tag"
        }

        async fn on_request(&self, ctx: &mut HttpExecutionContext<'_>) -> Result<(), PolicyError> {
            let mut seen: Vec<String> = ctx.attribute_as("seen").ok().flatten().unwrap_or_default();
            seen.push(self.0.clone());
            ctx.set_attribute("seen", json!(seen));
            Ok(())
        }
    }

    fn registry() -> PolicyRegistry {
        let mut registry = PolicyRegistry::new();
        registry.register("tag", |config: &Value| -> Result<Arc<dyn Policy>, PolicyError> {
            let name = config
                .as_str()
                .ok_or_else(|| PolicyError::invalid_configuration("tag", "expected a string"))?;
            Ok(Arc::new(Tag(name.to_string())))
        });
        registry
    }

    #[tokio::test]
    async fn test_disabled_and_conditional_bindings() {
        let mut disabled = PolicyBinding::new("tag", json!("off"));
        disabled.enabled = false;
        let mut conditional = PolicyBinding::new("tag", json!("beta"));
        conditional.condition = Some("request.header.x-beta exists".to_string());

        let chain = registry()
            .build_chain(
                "flow",
                ExecutionPhase::Request,
                &[PolicyBinding::new("tag", json!("a")), disabled, conditional],
            )
            .unwrap();
        assert_eq!(chain.len(), 2);

        let mut plain = ExecutionContext::new(GatewayRequest::new(Method::GET, "/"));
        chain.execute(&mut plain).await.unwrap();
        assert_eq!(plain.attribute("seen"), Some(&json!(["a"])));

        let mut request = GatewayRequest::new(Method::GET, "/");
        request.headers.insert("x-beta", HeaderValue::from_static("1"));
        let mut beta = ExecutionContext::new(request);
        chain.execute(&mut beta).await.unwrap();
        assert_eq!(beta.attribute("seen"), Some(&json!(["a", "beta"])));
    }

    #[test]
    fn test_build_errors() {
        let registry = registry();

        let unknown = registry.build_chain("f", ExecutionPhase::Request, &[PolicyBinding::new("nope", Value::Null)]);
        assert!(matches!(unknown, Err(PolicyChainError::UnknownPolicy(_))));

        let bad_config = registry.build_chain("f", ExecutionPhase::Request, &[PolicyBinding::new("tag", json!(1))]);
        assert!(matches!(bad_config, Err(PolicyChainError::Configuration { .. })));

        let mut bad_condition = PolicyBinding::new("tag", json!("x"));
        bad_condition.condition = Some("whatever".to_string());
        let result = registry.build_chain("f", ExecutionPhase::Request, &[bad_condition]);
        assert!(matches!(result, Err(PolicyChainError::Condition { .. })));
    }

    #[test]
    fn test_builtins_are_registered() {
        let registry = PolicyRegistry::with_builtins();
        for id in ["rate-limit", "transform-headers", "assign-attributes", "assign-content", "log-payload"] {
            assert!(registry.contains(id), "{id} missing");
        }
    }
}
