//! Deployed API and its request pipeline.
//!
//! # Data Flow
//! ```text
//! ExecutionContext (path_info set by the router)
//!     → mapped path selected for metrics
//!     → flows resolved (flow mode, method, path)
//!     → path parameters copied onto the request
//!     → REQUEST chains (+ ASYNC_REQUEST for message APIs), flow order
//!     → interrupted? → response already set, stop
//!     → endpoint selected (internal "endpoint" attribute or first group)
//!     → invoker fills the response, outcome reported for passive health
//!     → RESPONSE chains (+ ASYNC_RESPONSE for message APIs), flow order
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use crate::config::{ApiConfig, ApiKind, HealthCheckConfig};
use crate::gateway::error::{DeployError, GatewayError};
use crate::gateway::invoker::EndpointInvoker;
use crate::health::passive;
use crate::load_balancer::{EndpointCriteria, EndpointManager};
use crate::policy::{
    ExecutionContext, ExecutionPhase, PolicyChain, PolicyRegistry, ATTR_INTERNAL_ENDPOINT,
};
use crate::routing::resolver::{self, FlowMode};
use crate::routing::{Flow, MappedPaths};

/// A flow with its chains built.
struct CompiledFlow {
    flow: Flow,
    chains: HashMap<ExecutionPhase, PolicyChain>,
}

impl AsRef<Flow> for CompiledFlow {
    fn as_ref(&self) -> &Flow {
        &self.flow
    }
}

/// A deployed API.
pub struct Api {
    id: String,
    name: String,
    kind: ApiKind,
    context_path: String,
    host: Option<String>,
    flow_mode: FlowMode,
    flows: Vec<CompiledFlow>,
    mapped_paths: MappedPaths,
    endpoints: EndpointManager,
}

impl Api {
    /// Compile an API definition.
    pub fn deploy(
        config: &ApiConfig,
        health: &HealthCheckConfig,
        registry: &PolicyRegistry,
    ) -> Result<Self, DeployError> {
        let api = config.id.clone();

        let mut flows = Vec::with_capacity(config.flows.len());
        for flow_config in &config.flows {
            let flow = Flow::from_config(flow_config).map_err(|source| DeployError::Flow {
                api: api.clone(),
                source,
            })?;

            let mut chains = HashMap::new();
            for phase in ExecutionPhase::ALL {
                let chain_id = format!("{}/{}/{}", api, flow.name(), phase);
                let chain = registry
                    .build_chain(chain_id, phase, flow.bindings(phase))
                    .map_err(|source| DeployError::Chain {
                        api: api.clone(),
                        flow: flow.name().to_string(),
                        source,
                    })?;
                if !chain.is_empty() {
                    chains.insert(phase, chain);
                }
            }
            flows.push(CompiledFlow { flow, chains });
        }

        let mapped_paths = MappedPaths::from_aliases(&config.mapped_paths).map_err(|source| {
            DeployError::MappedPath {
                api: api.clone(),
                source,
            }
        })?;

        let endpoints = EndpointManager::new(&config.endpoint_groups, health).map_err(|source| {
            DeployError::Endpoint {
                api: api.clone(),
                source,
            }
        })?;

        tracing::info!(
            api = %api,
            context_path = %config.context_path,
            flows = flows.len(),
            endpoints = endpoints.all_endpoints().len(),
            "API deployed"
        );

        Ok(Self {
            name: config.name.clone().unwrap_or_else(|| api.clone()),
            id: api,
            kind: config.kind,
            context_path: config.context_path.clone(),
            host: config.host.clone(),
            flow_mode: config.flow_mode,
            flows,
            mapped_paths,
            endpoints,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ApiKind {
        self.kind
    }

    pub fn context_path(&self) -> &str {
        &self.context_path
    }

    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    pub fn endpoints(&self) -> &EndpointManager {
        &self.endpoints
    }

    fn request_phases(&self) -> &'static [ExecutionPhase] {
        match self.kind {
            ApiKind::Proxy => &[ExecutionPhase::Request],
            ApiKind::Message => &[ExecutionPhase::Request, ExecutionPhase::AsyncRequest],
        }
    }

    fn response_phases(&self) -> &'static [ExecutionPhase] {
        match self.kind {
            ApiKind::Proxy => &[ExecutionPhase::Response],
            ApiKind::Message => &[ExecutionPhase::Response, ExecutionPhase::AsyncResponse],
        }
    }

    /// Run the whole pipeline for one request.
    pub async fn handle(
        &self,
        ctx: &mut ExecutionContext,
        invoker: &dyn EndpointInvoker,
    ) -> Result<(), GatewayError> {
        let path_info = ctx.request().path_info.clone();
        let method = ctx.request().method.clone();

        ctx.metrics_mut().api_id = self.id.clone();
        ctx.metrics_mut().mapped_path = self.mapped_paths.select(&path_info).map(str::to_string);

        let flows = self.flow_mode.resolve(&method, &path_info, &self.flows);
        if flows.is_empty() && !self.flows.is_empty() {
            return Err(GatewayError::NoFlow {
                api: self.id.clone(),
                method: method.to_string(),
                path: path_info,
            });
        }
        tracing::debug!(
            api = %self.id,
            path = %path_info,
            flows = ?flows.iter().map(|f| f.flow.name()).collect::<Vec<_>>(),
            "Flows resolved"
        );

        for flow in &flows {
            for (name, value) in resolver::path_parameters(&flow.flow, &path_info) {
                ctx.request_mut().path_parameters.entry(name).or_insert(value);
            }
        }

        self.run_phases(&flows, self.request_phases(), ctx).await?;
        if ctx.is_interrupted() {
            ctx.metrics_mut().interrupted = true;
            return Ok(());
        }

        let criteria = match ctx.internal_attribute_as::<String>(ATTR_INTERNAL_ENDPOINT) {
            Ok(Some(name)) => EndpointCriteria::named(name),
            _ => EndpointCriteria::any(),
        };
        let endpoint = self
            .endpoints
            .next(&criteria)
            .ok_or_else(|| GatewayError::NoEndpoint(self.id.clone()))?;
        ctx.metrics_mut().endpoint = Some(endpoint.name().to_string());

        let started = Instant::now();
        let result = invoker.invoke(&endpoint, ctx).await;
        ctx.metrics_mut().endpoint_latency = Some(started.elapsed());

        passive::observe(
            &self.endpoints,
            &endpoint,
            result.as_ref().map(|_| ctx.response().status),
        );
        result?;

        self.run_phases(&flows, self.response_phases(), ctx).await?;
        if ctx.is_interrupted() {
            ctx.metrics_mut().interrupted = true;
        }
        Ok(())
    }

    async fn run_phases(
        &self,
        flows: &[&CompiledFlow],
        phases: &[ExecutionPhase],
        ctx: &mut ExecutionContext,
    ) -> Result<(), GatewayError> {
        for phase in phases {
            for flow in flows {
                if ctx.is_interrupted() {
                    return Ok(());
                }
                if let Some(chain) = flow.chains.get(phase) {
                    chain.execute(ctx).await?;
                }
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Api {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Api")
            .field("id", &self.id)
            .field("context_path", &self.context_path)
            .field("host", &self.host)
            .field("kind", &self.kind)
            .field("flow_mode", &self.flow_mode)
            .field("flows", &self.flows.iter().map(|f| f.flow.name()).collect::<Vec<_>>())
            .finish()
    }
}

/// Shared handle to a deployed API.
pub type SharedApi = Arc<Api>;
