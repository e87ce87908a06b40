//! Active health checking.
//!
//! # Responsibilities
//! - Periodically probe every endpoint of every deployed API
//! - Report results to the owning endpoint manager

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::Request;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use tokio::sync::broadcast;
use tokio::time;

use crate::config::HealthCheckConfig;
use crate::gateway::Gateway;
use crate::load_balancer::{EndpointManager, ManagedEndpoint};
use crate::observability::metrics;

pub struct HealthMonitor {
    gateway: Arc<Gateway>,
    config: HealthCheckConfig,
    client: Client<HttpConnector, Body>,
}

impl HealthMonitor {
    pub fn new(gateway: Arc<Gateway>, config: HealthCheckConfig) -> Self {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());

        Self {
            gateway,
            config,
            client,
        }
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        if !self.config.enabled {
            tracing::info!("Active health checks disabled");
            return;
        }

        tracing::info!(
            interval = self.config.interval_secs,
            path = %self.config.path,
            "Health monitor starting"
        );

        let interval = Duration::from_secs(self.config.interval_secs.max(1));
        let mut ticker = time::interval(interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.check_all().await;
                }
                _ = shutdown.recv() => {
                    tracing::info!("Health monitor received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    /// Probe every endpoint once.
    pub async fn check_all(&self) {
        for api in self.gateway.apis() {
            for endpoint in api.endpoints().all_endpoints() {
                self.check(api.endpoints(), &endpoint).await;
            }
        }
    }

    async fn check(&self, manager: &EndpointManager, endpoint: &ManagedEndpoint) {
        let uri = match endpoint.target().join(&self.config.path) {
            Ok(url) => url.to_string(),
            Err(e) => {
                tracing::error!(endpoint = %endpoint.name(), error = %e, "Failed to build health check uri");
                return;
            }
        };

        let request = match Request::builder()
            .method("GET")
            .uri(&uri)
            .header("user-agent", "api-gateway-health-check")
            .body(Body::empty())
        {
            Ok(req) => req,
            Err(e) => {
                tracing::error!(error = %e, "Failed to build health check request");
                return;
            }
        };

        let timeout = Duration::from_secs(self.config.timeout_secs);
        let healthy = match time::timeout(timeout, self.client.request(request)).await {
            Ok(Ok(response)) => {
                let success = response.status().is_success();
                if !success {
                    tracing::warn!(endpoint = %endpoint.name(), uri = %uri, status = %response.status(), "Health check failed: non-success status");
                }
                success
            }
            Ok(Err(e)) => {
                tracing::warn!(endpoint = %endpoint.name(), uri = %uri, error = %e, "Health check failed: connection error");
                false
            }
            Err(_) => {
                tracing::warn!(endpoint = %endpoint.name(), uri = %uri, "Health check failed: timeout");
                false
            }
        };

        if healthy {
            manager.report_success(endpoint);
        } else {
            manager.report_failure(endpoint);
        }

        metrics::record_endpoint_health(endpoint.name(), endpoint.is_available());
    }
}
