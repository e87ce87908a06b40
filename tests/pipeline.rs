//! In-process pipeline tests: gateway → flows → chains → recording invoker.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use api_gateway::buffer::{Buffer, BufferError, BufferFlow, BufferMode};
use api_gateway::config::{ApiConfig, ApiKind, GatewayConfig};
use api_gateway::gateway::{EndpointInvoker, Gateway, GatewayError, InvokerError};
use api_gateway::load_balancer::{LoadBalancerType, ManagedEndpoint};
use api_gateway::policy::{
    ExecutionContext, GatewayRequest, HttpExecutionContext, Policy, PolicyError, PolicyRegistry,
    ATTR_INTERNAL_ENDPOINT,
};
use api_gateway::routing::{FlowMode, PolicyBinding};
use async_trait::async_trait;
use axum::http::{Method, StatusCode};
use futures_util::stream::{self, StreamExt, TryStreamExt};
use serde_json::{json, Value};

mod common;

/// What the invoker saw for one call.
#[derive(Debug, Clone)]
struct Call {
    endpoint: String,
    path_info: String,
    path_parameters: HashMap<String, String>,
    headers: HashMap<String, Vec<String>>,
    chunks: Vec<String>,
}

#[derive(Default)]
struct RecordingInvoker {
    calls: Mutex<Vec<Call>>,
}

impl RecordingInvoker {
    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl EndpointInvoker for RecordingInvoker {
    async fn invoke(&self, endpoint: &ManagedEndpoint, ctx: &mut ExecutionContext) -> Result<(), InvokerError> {
        let request = ctx.request_mut();
        let chunks: Vec<Buffer> = request.body.chunks().try_collect().await?;

        let mut headers: HashMap<String, Vec<String>> = HashMap::new();
        for (name, value) in request.headers.iter() {
            headers
                .entry(name.to_string())
                .or_default()
                .push(value.to_str().unwrap().to_string());
        }

        self.calls.lock().unwrap().push(Call {
            endpoint: endpoint.name().to_string(),
            path_info: request.path_info.clone(),
            path_parameters: request.path_parameters.clone(),
            headers,
            chunks: chunks.iter().map(Buffer::to_string_lossy).collect(),
        });

        let response = ctx.response_mut();
        response.status = StatusCode::OK;
        response.body = BufferFlow::from_buffer(format!("from {}", endpoint.name()));
        Ok(())
    }
}

/// Routes to the endpoint or group named in its configuration.
struct RouteTo(String);

#[async_trait]
impl Policy for RouteTo {
    fn id(&self) -> &str {
        "route-to"
    }

    async fn on_request(&self, ctx: &mut HttpExecutionContext<'_>) -> Result<(), PolicyError> {
        ctx.set_internal_attribute(ATTR_INTERNAL_ENDPOINT, self.0.clone());
        Ok(())
    }
}

fn registry() -> PolicyRegistry {
    let mut registry = PolicyRegistry::with_builtins();
    registry.register("route-to", |config: &Value| -> Result<Arc<dyn Policy>, PolicyError> {
        let target = config.as_str().unwrap_or_default().to_string();
        Ok(Arc::new(RouteTo(target)))
    });
    registry
}

fn backend() -> SocketAddr {
    "127.0.0.1:9001".parse().unwrap()
}

fn gateway(apis: Vec<ApiConfig>) -> Gateway {
    Gateway::from_config(&common::config(apis), registry()).unwrap()
}

fn add_header(name: &str, value: &str) -> PolicyBinding {
    PolicyBinding::new("transform-headers", json!({ "add": { name: value } }))
}

async fn send(gateway: &Gateway, invoker: &RecordingInvoker, method: Method, path: &str) -> (ExecutionContext, Result<(), GatewayError>) {
    let mut ctx = ExecutionContext::new(GatewayRequest::new(method, path));
    let result = gateway.handle(None, &mut ctx, invoker).await;
    (ctx, result)
}

#[tokio::test]
async fn test_best_match_runs_only_the_most_specific_flow() {
    let mut api = common::api("users", "/api", &[backend()]);
    api.flow_mode = FlowMode::BestMatch;
    let mut by_id = common::flow("/users/:id");
    by_id.request.push(add_header("x-flow", "by-id"));
    let mut me = common::flow("/users/me");
    me.request.push(add_header("x-flow", "me"));
    api.flows = vec![by_id, me];
    let gateway = gateway(vec![api]);
    let invoker = RecordingInvoker::default();

    let (_, result) = send(&gateway, &invoker, Method::GET, "/api/users/me").await;
    result.unwrap();
    let (_, result) = send(&gateway, &invoker, Method::GET, "/api/users/42").await;
    result.unwrap();

    let calls = invoker.calls();
    assert_eq!(calls[0].headers["x-flow"], ["me"]);
    assert_eq!(calls[1].headers["x-flow"], ["by-id"]);
    assert_eq!(calls[1].path_parameters["id"], "42");
}

#[tokio::test]
async fn test_default_mode_runs_every_matching_flow_in_order() {
    let mut api = common::api("users", "/api", &[backend()]);
    let mut users = common::flow("/users/:id");
    users.request.push(add_header("x-trace", "users"));
    let mut other = common::flow("/orders");
    other.request.push(add_header("x-trace", "orders"));
    let mut seven = common::flow("/users/7");
    seven.request.push(add_header("x-trace", "seven"));
    api.flows = vec![users, other, seven];
    let gateway = gateway(vec![api]);
    let invoker = RecordingInvoker::default();

    let (ctx, result) = send(&gateway, &invoker, Method::GET, "/api/users/7").await;
    result.unwrap();

    let call = &invoker.calls()[0];
    assert_eq!(call.path_info, "/users/7");
    assert_eq!(call.headers["x-trace"], ["users", "seven"]);
    assert_eq!(ctx.response().status, StatusCode::OK);
}

#[tokio::test]
async fn test_path_parameters_and_mapped_path_recorded() {
    let mut api = common::api("shop", "/shop", &[backend()]);
    api.mapped_paths = vec!["/users/:id".to_string()];
    api.flows = vec![common::flow("/users/:id/orders/:order")];
    let gateway = gateway(vec![api]);
    let invoker = RecordingInvoker::default();

    let (ctx, result) = send(&gateway, &invoker, Method::GET, "/shop/users/7/orders/9").await;
    result.unwrap();

    let call = &invoker.calls()[0];
    assert_eq!(call.path_parameters["id"], "7");
    assert_eq!(call.path_parameters["order"], "9");

    let metrics = ctx.metrics();
    assert_eq!(metrics.api_id, "shop");
    assert_eq!(metrics.mapped_path.as_deref(), Some("/users/:id"));
    assert_eq!(metrics.endpoint.as_deref(), Some("default-0"));
    assert!(metrics.endpoint_latency.is_some());
}

#[tokio::test]
async fn test_interruption_skips_the_endpoint() {
    let mut api = common::api("limited", "/", &[backend()]);
    let mut flow = common::flow("/");
    flow.request.push(PolicyBinding::new(
        "rate-limit",
        json!({ "requests_per_second": 0.001, "burst_size": 1.0, "key": { "type": "global" } }),
    ));
    flow.request.push(add_header("x-after", "limit"));
    api.flows = vec![flow];
    let gateway = gateway(vec![api]);
    let invoker = RecordingInvoker::default();

    send(&gateway, &invoker, Method::GET, "/").await.1.unwrap();
    let (mut ctx, result) = send(&gateway, &invoker, Method::GET, "/").await;
    result.unwrap();

    assert_eq!(invoker.calls().len(), 1);
    assert!(ctx.is_interrupted());
    assert!(ctx.metrics().interrupted);
    assert_eq!(ctx.response().status, StatusCode::TOO_MANY_REQUESTS);
    assert!(ctx.request().headers.get("x-after").is_none());
    let body = ctx.response_mut().body.body().await.unwrap();
    assert!(body.is_some());
}

#[tokio::test]
async fn test_endpoint_attribute_selects_group_or_endpoint() {
    let mut api = common::api("canary", "/", &[]);
    api.endpoint_groups = vec![
        common::group("primary", LoadBalancerType::RoundRobin, &[backend()]),
        common::group("canary", LoadBalancerType::Random, &["127.0.0.1:9002".parse().unwrap()]),
    ];
    let mut to_group = common::flow("/beta");
    to_group.request.push(PolicyBinding::new("route-to", json!("canary")));
    let mut to_endpoint = common::flow("/pinned");
    to_endpoint.request.push(PolicyBinding::new("route-to", json!("primary-0")));
    let mut to_nothing = common::flow("/nowhere");
    to_nothing.request.push(PolicyBinding::new("route-to", json!("missing")));
    api.flows = vec![common::flow("/"), to_group, to_endpoint, to_nothing];
    let gateway = gateway(vec![api]);
    let invoker = RecordingInvoker::default();

    send(&gateway, &invoker, Method::GET, "/").await.1.unwrap();
    send(&gateway, &invoker, Method::GET, "/beta").await.1.unwrap();
    send(&gateway, &invoker, Method::GET, "/pinned").await.1.unwrap();
    let (_, missing) = send(&gateway, &invoker, Method::GET, "/nowhere").await;

    let endpoints: Vec<String> = invoker.calls().into_iter().map(|c| c.endpoint).collect();
    assert_eq!(endpoints, ["primary-0", "canary-0", "primary-0"]);
    assert!(matches!(missing, Err(GatewayError::NoEndpoint(_))));
}

#[tokio::test]
async fn test_conditional_binding() {
    let mut api = common::api("debug", "/", &[backend()]);
    let mut flow = common::flow("/");
    let mut binding = add_header("x-debug-echo", "on");
    binding.condition = Some("request.header.x-debug exists".to_string());
    flow.request.push(binding);
    api.flows = vec![flow];
    let gateway = gateway(vec![api]);
    let invoker = RecordingInvoker::default();

    send(&gateway, &invoker, Method::GET, "/").await.1.unwrap();

    let mut ctx = ExecutionContext::new(GatewayRequest::new(Method::GET, "/"));
    ctx.request_mut().headers.insert("x-debug", "1".parse().unwrap());
    gateway.handle(None, &mut ctx, &invoker).await.unwrap();

    let calls = invoker.calls();
    assert!(!calls[0].headers.contains_key("x-debug-echo"));
    assert_eq!(calls[1].headers["x-debug-echo"], ["on"]);
}

#[tokio::test]
async fn test_message_api_transforms_each_message() {
    let mut api = common::api("events", "/events", &[backend()]);
    api.kind = ApiKind::Message;
    let mut flow = common::flow("/");
    flow.message_request.push(PolicyBinding::new("assign-content", json!({ "body": "redacted" })));
    api.flows = vec![flow];
    let gateway = gateway(vec![api]);
    let invoker = RecordingInvoker::default();

    let mut ctx = ExecutionContext::new(GatewayRequest::new(Method::POST, "/events"));
    let messages = stream::iter(vec![Ok(Buffer::from("one")), Ok(Buffer::from("two"))]).boxed();
    ctx.request_mut().body = BufferFlow::from_stream(messages, BufferMode::Streaming);
    gateway.handle(None, &mut ctx, &invoker).await.unwrap();

    assert_eq!(invoker.calls()[0].chunks, ["redacted", "redacted"]);
}

#[tokio::test]
async fn test_api_without_flows_proxies_through() {
    let gateway = gateway(vec![common::api("plain", "/plain", &[backend()])]);
    let invoker = RecordingInvoker::default();

    let (mut ctx, result) = send(&gateway, &invoker, Method::DELETE, "/plain/anything").await;
    result.unwrap();

    assert_eq!(invoker.calls()[0].path_info, "/anything");
    let body = ctx.response_mut().body.body().await.unwrap().unwrap();
    assert_eq!(body.to_string_lossy(), "from default-0");
}

#[tokio::test]
async fn test_unknown_routes_are_errors() {
    let mut api = common::api("api", "/api", &[backend()]);
    api.flows = vec![common::flow("/users")];
    let gateway = gateway(vec![api]);
    let invoker = RecordingInvoker::default();

    let (_, no_api) = send(&gateway, &invoker, Method::GET, "/other").await;
    let (_, no_flow) = send(&gateway, &invoker, Method::GET, "/api/orders").await;

    assert!(matches!(no_api, Err(GatewayError::NoApi(_))));
    assert!(matches!(no_flow, Err(GatewayError::NoFlow { .. })));
    assert!(invoker.calls().is_empty());
}

#[tokio::test]
async fn test_failed_deploy_keeps_deployed_apis() {
    let gateway = gateway(vec![common::api("stable", "/", &[backend()])]);

    let mut broken = common::api("broken", "/broken", &[backend()]);
    let mut flow = common::flow("/");
    flow.request.push(PolicyBinding::new("no-such-policy", Value::Null));
    broken.flows = vec![flow];
    let config = GatewayConfig {
        apis: vec![broken],
        ..common::config(Vec::new())
    };

    assert!(gateway.deploy(&config).is_err());
    let ids: Vec<String> = gateway.apis().iter().map(|api| api.id().to_string()).collect();
    assert_eq!(ids, ["stable"]);
}

#[tokio::test]
async fn test_oversized_body_read_by_policy_is_413() {
    let mut api = common::api("upload", "/", &[backend()]);
    let mut flow = common::flow("/.*");
    flow.request.push(PolicyBinding::new("log-payload", Value::Null));
    api.flows = vec![flow];
    let gateway = gateway(vec![api]);
    let invoker = RecordingInvoker::default();

    let mut ctx = ExecutionContext::new(GatewayRequest::new(Method::POST, "/files"));
    let parts = stream::iter(vec![Ok(Buffer::from("12345")), Ok(Buffer::from("67890"))]).boxed();
    ctx.request_mut().body = BufferFlow::from_stream(parts, BufferMode::Buffered).with_max_size(6);

    let err = gateway.handle(None, &mut ctx, &invoker).await.unwrap_err();
    assert!(matches!(err, GatewayError::Body(BufferError::TooLarge { limit: 6 })));
    assert_eq!(err.status_code(), StatusCode::PAYLOAD_TOO_LARGE);
    assert!(invoker.calls().is_empty());
    // The endpoint was never called, so its health is untouched.
    let api = &gateway.apis()[0];
    assert!(api.endpoints().all_endpoints().iter().all(|e| e.is_available()));
}
