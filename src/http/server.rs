//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router with the gateway handler as fallback
//! - Wire up middleware (tracing, timeout, request ID)
//! - Build the execution context and run the gateway pipeline
//! - Write the response from the context and record request metrics
//! - Apply configuration reloads

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{Request, Response},
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower::ServiceBuilder;
use tower_http::{
    request_id::{MakeRequestUuid, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::GatewayConfig;
use crate::gateway::{EndpointInvoker, Gateway};
use crate::http::proxy::HttpInvoker;
use crate::http::{request, response};
use crate::observability::metrics;
use crate::policy::ExecutionContext;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<Gateway>,
    pub invoker: Arc<dyn EndpointInvoker>,
    pub max_buffered_bytes: usize,
}

/// HTTP server for the gateway.
pub struct HttpServer {
    router: Router,
    gateway: Arc<Gateway>,
}

impl HttpServer {
    /// Create a server that invokes endpoints over HTTP.
    pub fn new(config: &GatewayConfig, gateway: Arc<Gateway>) -> Self {
        let invoker = Arc::new(HttpInvoker::new(&config.timeouts, &config.buffer));
        Self::with_invoker(config, gateway, invoker)
    }

    /// Create a server with a custom endpoint invoker.
    pub fn with_invoker(
        config: &GatewayConfig,
        gateway: Arc<Gateway>,
        invoker: Arc<dyn EndpointInvoker>,
    ) -> Self {
        let state = AppState {
            gateway: gateway.clone(),
            invoker,
            max_buffered_bytes: config.buffer.max_buffered_bytes,
        };

        let router = Self::build_router(config, state);
        Self { router, gateway }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &GatewayConfig, state: AppState) -> Router {
        // Outer bound only; the invoker's own timeout fires first.
        let timeout = Duration::from_secs(config.timeouts.request_secs + config.timeouts.connect_secs);

        Router::new()
            .fallback(gateway_handler)
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                    .layer(TraceLayer::new_for_http())
                    .layer(TimeoutLayer::new(timeout)),
            )
    }

    /// Run the server until `shutdown` fires, applying config updates as they
    /// arrive.
    pub async fn run(
        self,
        listener: TcpListener,
        updates: Option<mpsc::UnboundedReceiver<GatewayConfig>>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            apis = self.gateway.apis().len(),
            "HTTP server starting"
        );

        if let Some(updates) = updates {
            tokio::spawn(apply_updates(self.gateway.clone(), updates, shutdown.resubscribe()));
        }

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("HTTP server draining connections");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

async fn apply_updates(
    gateway: Arc<Gateway>,
    mut updates: mpsc::UnboundedReceiver<GatewayConfig>,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            update = updates.recv() => {
                let Some(config) = update else { break };
                match gateway.deploy(&config) {
                    Ok(count) => tracing::info!(apis = count, "Configuration reloaded"),
                    Err(e) => tracing::error!(error = %e, "Reload rejected, keeping deployed APIs"),
                }
            }
            _ = shutdown.recv() => break,
        }
    }
}

/// Gateway handler: every request lands here.
async fn gateway_handler(State(state): State<AppState>, request: Request<Body>) -> Response<Body> {
    let started = Instant::now();
    let host = request::host(&request).map(str::to_string);
    let remote = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);

    let inbound = request::from_axum(request, remote, state.max_buffered_bytes);
    let request_id = inbound.id.clone();
    let mut ctx = ExecutionContext::new(inbound);

    let result = state
        .gateway
        .handle(host.as_deref(), &mut ctx, state.invoker.as_ref())
        .await;

    let response = match result {
        Ok(()) => response::write(ctx.response_mut(), &request_id),
        Err(e) => {
            tracing::warn!(
                request_id = %request_id,
                path = %ctx.request().path,
                error = %e,
                "Request failed"
            );
            ctx.metrics_mut().fault = Some(e.to_string());
            response::error(&e, &request_id)
        }
    };

    let record = ctx.metrics_mut();
    record.status = response.status().as_u16();
    record.gateway_latency = started.elapsed();
    metrics::record_request(record);

    response
}
