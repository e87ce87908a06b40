//! Flow definitions.
//!
//! A flow is a path template plus ordered policy bindings per execution
//! phase. Flows are read-only once built; the resolver only borrows them.

use std::collections::HashMap;

use axum::http::Method;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::FlowConfig;
use crate::policy::ExecutionPhase;
use crate::routing::pattern::{PathPattern, PatternError};

/// Errors raised while building a flow from configuration.
#[derive(Debug, Error)]
pub enum FlowError {
    #[error(transparent)]
    Pattern(#[from] PatternError),

    #[error("flow '{flow}' declares an invalid HTTP method '{method}'")]
    InvalidMethod { flow: String, method: String },
}

/// One policy attached to a flow phase.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct PolicyBinding {
    /// Identifier of the policy in the policy registry.
    pub policy: String,

    /// Policy-specific configuration.
    #[serde(default)]
    pub configuration: serde_json::Value,

    /// Optional activation condition.
    #[serde(default)]
    pub condition: Option<String>,

    /// Disabled bindings are dropped when the chain is built.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl PolicyBinding {
    /// An enabled, unconditional binding.
    pub fn new(policy: impl Into<String>, configuration: serde_json::Value) -> Self {
        Self {
            policy: policy.into(),
            configuration,
            condition: None,
            enabled: true,
        }
    }
}

/// A compiled flow.
#[derive(Debug, Clone)]
pub struct Flow {
    name: String,
    path: PathPattern,
    methods: Vec<Method>,
    enabled: bool,
    bindings: HashMap<ExecutionPhase, Vec<PolicyBinding>>,
}

impl Flow {
    /// A flow that matches `template` for every method, with no policies.
    pub fn new(name: impl Into<String>, template: &str) -> Result<Self, PatternError> {
        Ok(Self {
            name: name.into(),
            path: PathPattern::compile(template)?,
            methods: Vec::new(),
            enabled: true,
            bindings: HashMap::new(),
        })
    }

    /// Build a flow from its configuration.
    pub fn from_config(config: &FlowConfig) -> Result<Self, FlowError> {
        let name = config.name.clone().unwrap_or_else(|| config.path.clone());

        let methods = config
            .methods
            .iter()
            .map(|m| {
                Method::from_bytes(m.to_ascii_uppercase().as_bytes()).map_err(|_| {
                    FlowError::InvalidMethod {
                        flow: name.clone(),
                        method: m.clone(),
                    }
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut flow = Self::new(name, &config.path)?;
        flow.methods = methods;
        flow.enabled = config.enabled;
        flow.bindings.insert(ExecutionPhase::Request, config.request.clone());
        flow.bindings.insert(ExecutionPhase::Response, config.response.clone());
        flow.bindings
            .insert(ExecutionPhase::AsyncRequest, config.message_request.clone());
        flow.bindings
            .insert(ExecutionPhase::AsyncResponse, config.message_response.clone());
        Ok(flow)
    }

    /// Append a binding to a phase.
    pub fn with_binding(mut self, phase: ExecutionPhase, binding: PolicyBinding) -> Self {
        self.bindings.entry(phase).or_default().push(binding);
        self
    }

    /// Restrict the flow to the given methods.
    pub fn with_methods(mut self, methods: Vec<Method>) -> Self {
        self.methods = methods;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &PathPattern {
        &self.path
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// True when the flow applies to `method`. An empty method set means any.
    pub fn accepts(&self, method: &Method) -> bool {
        self.methods.is_empty() || self.methods.contains(method)
    }

    /// Ordered bindings for a phase.
    pub fn bindings(&self, phase: ExecutionPhase) -> &[PolicyBinding] {
        self.bindings.get(&phase).map(Vec::as_slice).unwrap_or(&[])
    }
}

impl AsRef<Flow> for Flow {
    fn as_ref(&self) -> &Flow {
        self
    }
}
