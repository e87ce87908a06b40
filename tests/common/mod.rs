//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use api_gateway::config::{ApiConfig, EndpointConfig, EndpointGroupConfig, FlowConfig, GatewayConfig};
use api_gateway::lifecycle::Shutdown;
use api_gateway::load_balancer::LoadBalancerType;
use api_gateway::policy::PolicyRegistry;
use api_gateway::{Gateway, HttpServer};
use axum::body::Bytes;
use axum::http::{HeaderMap, Method, Uri};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

/// Start a raw mock backend that returns a fixed response.
pub async fn start_mock_backend(response: &'static str) -> SocketAddr {
    start_programmable_backend(move || async move { (200, response.to_string()) }).await
}

/// Start a raw mock backend whose status and body come from `f`.
pub async fn start_programmable_backend<F, Fut>(f: F) -> SocketAddr
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let f = f.clone();
            tokio::spawn(async move {
                let (status, body) = f().await;
                let status_text = match status {
                    200 => "200 OK",
                    404 => "404 Not Found",
                    500 => "500 Internal Server Error",
                    502 => "502 Bad Gateway",
                    503 => "503 Service Unavailable",
                    _ => "200 OK",
                };

                let response = format!(
                    "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status_text,
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
                tokio::time::sleep(Duration::from_millis(10)).await;
            });
        }
    });

    addr
}

/// Start a backend that echoes what it received.
///
/// The body reads `<name> <METHOD> <path and query>`, then the request body
/// after a newline when there is one. Received `x-*` headers are echoed back
/// with an `echo-` prefix.
pub async fn start_echo_backend(name: &'static str) -> SocketAddr {
    let app = axum::Router::new().fallback(move |method: Method, uri: Uri, headers: HeaderMap, body: Bytes| async move {
        let mut text = format!("{} {} {}", name, method, uri);
        if !body.is_empty() {
            text.push('\n');
            text.push_str(&String::from_utf8_lossy(&body));
        }

        let mut echoed = HeaderMap::new();
        for (key, value) in headers.iter() {
            if key.as_str().starts_with("x-") {
                let echo = format!("echo-{}", key.as_str());
                echoed.insert(
                    axum::http::HeaderName::from_bytes(echo.as_bytes()).unwrap(),
                    value.clone(),
                );
            }
        }
        (echoed, text)
    });

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    addr
}

/// An address nothing listens on.
pub async fn dead_address() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

/// A proxy API forwarding to `backends` through one round-robin group.
pub fn api(id: &str, context_path: &str, backends: &[SocketAddr]) -> ApiConfig {
    ApiConfig {
        id: id.to_string(),
        name: None,
        context_path: context_path.to_string(),
        host: None,
        kind: Default::default(),
        flow_mode: Default::default(),
        mapped_paths: Vec::new(),
        flows: Vec::new(),
        endpoint_groups: vec![group("default", LoadBalancerType::RoundRobin, backends)],
    }
}

pub fn group(name: &str, load_balancer: LoadBalancerType, backends: &[SocketAddr]) -> EndpointGroupConfig {
    EndpointGroupConfig {
        name: name.to_string(),
        load_balancer,
        endpoints: backends
            .iter()
            .enumerate()
            .map(|(i, addr)| EndpointConfig {
                name: format!("{}-{}", name, i),
                target: format!("http://{}", addr),
                ..EndpointConfig::default()
            })
            .collect(),
    }
}

pub fn flow(path: &str) -> FlowConfig {
    FlowConfig {
        path: path.to_string(),
        ..FlowConfig::default()
    }
}

/// Gateway config for tests: active health checks off.
pub fn config(apis: Vec<ApiConfig>) -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.health_check.enabled = false;
    config.timeouts.request_secs = 2;
    config.timeouts.connect_secs = 1;
    config.apis = apis;
    config
}

/// A running gateway on a loopback port.
pub struct TestGateway {
    pub addr: SocketAddr,
    pub gateway: Arc<Gateway>,
    pub updates: mpsc::UnboundedSender<GatewayConfig>,
    pub shutdown: Shutdown,
}

impl TestGateway {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

impl Drop for TestGateway {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

pub async fn start_gateway(config: GatewayConfig) -> TestGateway {
    let gateway = Arc::new(Gateway::from_config(&config, PolicyRegistry::with_builtins()).unwrap());
    let shutdown = Shutdown::new();
    let (updates, update_rx) = mpsc::unbounded_channel();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = HttpServer::new(&config, gateway.clone());
    let server_shutdown = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, Some(update_rx), server_shutdown).await;
    });

    TestGateway {
        addr,
        gateway,
        updates,
        shutdown,
    }
}

/// Client without connection pooling or proxies.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}
