//! Gateway core: deployed APIs and request dispatch.
//!
//! # Data Flow
//! ```text
//! GatewayConfig
//!     → api.rs (compile flows, chains, endpoint groups per API)
//!     → ApiRouter (entrypoints), swapped in atomically
//!
//! Per request:
//!     host + path → ApiRouter → Api + path_info
//!     → Api::handle (flows, chains, endpoint, invoker)
//!     → GatewayError → status code (error.rs)
//! ```
//!
//! # Design Decisions
//! - A reload compiles everything first; a failed deploy keeps the old APIs
//! - In-flight requests keep the snapshot they started with
//! - The backend call goes through the `EndpointInvoker` seam

pub mod api;
pub mod error;
pub mod invoker;

use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::config::GatewayConfig;
use crate::policy::{ExecutionContext, PolicyRegistry};
use crate::routing::ApiRouter;

pub use api::{Api, SharedApi};
pub use error::{DeployError, GatewayError, InvokerError};
pub use invoker::EndpointInvoker;

/// Entrypoint table of the deployed APIs.
pub type ApiTable = ApiRouter<SharedApi>;

/// The set of deployed APIs.
#[derive(Debug)]
pub struct Gateway {
    table: ArcSwap<ApiTable>,
    registry: PolicyRegistry,
}

impl Gateway {
    /// A gateway with no API deployed.
    pub fn new(registry: PolicyRegistry) -> Self {
        Self {
            table: ArcSwap::from_pointee(ApiTable::default()),
            registry,
        }
    }

    /// A gateway with the APIs of `config` deployed.
    pub fn from_config(config: &GatewayConfig, registry: PolicyRegistry) -> Result<Self, DeployError> {
        let gateway = Self::new(registry);
        gateway.deploy(config)?;
        Ok(gateway)
    }

    /// Replace every deployed API with the APIs of `config`.
    ///
    /// Nothing changes if any API fails to compile.
    pub fn deploy(&self, config: &GatewayConfig) -> Result<usize, DeployError> {
        let apis = config
            .apis
            .iter()
            .map(|api| Api::deploy(api, &config.health_check, &self.registry).map(Arc::new))
            .collect::<Result<Vec<_>, _>>()?;

        let count = apis.len();
        let table = ApiTable::new(apis.into_iter().map(|api| {
            (
                api.host().map(str::to_string),
                api.context_path().to_string(),
                api,
            )
        }));
        self.table.store(Arc::new(table));

        tracing::info!(apis = count, "API table swapped");
        Ok(count)
    }

    /// Current snapshot of deployed APIs.
    pub fn apis(&self) -> Vec<SharedApi> {
        self.table.load().apis().cloned().collect()
    }

    /// Route and run one request.
    pub async fn handle(
        &self,
        host: Option<&str>,
        ctx: &mut ExecutionContext,
        invoker: &dyn EndpointInvoker,
    ) -> Result<(), GatewayError> {
        let table = self.table.load_full();
        let path = ctx.request().path.clone();

        let Some(route) = table.route(host, &path) else {
            return Err(GatewayError::NoApi(path));
        };
        let api = route.api.clone();
        ctx.request_mut().path_info = route.path_info;

        api.handle(ctx, invoker).await
    }
}
