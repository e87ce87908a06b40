//! Per-request execution context.
//!
//! # Responsibilities
//! - Hold the request and response handles of one exchange
//! - Hold public attributes (shared by policies) and internal attributes
//! - Carry the `interrupted` flag policies use for early responses
//! - Carry the metrics record filled in along the pipeline
//!
//! # Design Decisions
//! - Created per request, dropped after, never pooled or shared
//! - Attribute keys given with [`ATTR_PREFIX`] are stored un-prefixed
//! - Phase views wrap `&mut ExecutionContext` and deref to it

use std::collections::HashMap;
use std::net::SocketAddr;
use std::ops::{Deref, DerefMut};
use std::time::Instant;

use axum::http::{HeaderMap, HeaderValue, Method, StatusCode};
use futures_util::stream::{StreamExt, TryStreamExt};
use serde::de::DeserializeOwned;
use serde_json::Value;
use uuid::Uuid;

use crate::buffer::{Buffer, BufferFlow};
use crate::observability::metrics::RequestMetrics;
use crate::policy::ExecutionPhase;

/// Prefix accepted (and stripped) on public attribute keys.
pub const ATTR_PREFIX: &str = "gateway.attribute.";

/// Internal attribute naming an endpoint or group to route to.
pub const ATTR_INTERNAL_ENDPOINT: &str = "endpoint";

/// Inbound request as seen by policies.
#[derive(Debug)]
pub struct GatewayRequest {
    pub id: String,
    pub method: Method,
    /// Full request path.
    pub path: String,
    /// Path below the API context path; flows match against this.
    pub path_info: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub remote_address: Option<SocketAddr>,
    pub path_parameters: HashMap<String, String>,
    pub body: BufferFlow,
    pub timestamp: Instant,
}

impl GatewayRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        let path = path.into();
        Self {
            id: Uuid::new_v4().to_string(),
            method,
            path_info: path.clone(),
            path,
            query: None,
            headers: HeaderMap::new(),
            remote_address: None,
            path_parameters: HashMap::new(),
            body: BufferFlow::default(),
            timestamp: Instant::now(),
        }
    }

    /// Header value as text, if present and valid.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// Outbound response being assembled.
#[derive(Debug, Default)]
pub struct GatewayResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: BufferFlow,
}

impl GatewayResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// State shared by every policy of one request.
#[derive(Debug)]
pub struct ExecutionContext {
    request: GatewayRequest,
    response: GatewayResponse,
    attributes: HashMap<String, Value>,
    internal_attributes: HashMap<String, Value>,
    interrupted: bool,
    metrics: RequestMetrics,
}

impl ExecutionContext {
    pub fn new(request: GatewayRequest) -> Self {
        let metrics = RequestMetrics {
            request_id: request.id.clone(),
            method: request.method.to_string(),
            path: request.path.clone(),
            ..RequestMetrics::default()
        };
        Self {
            request,
            response: GatewayResponse::default(),
            attributes: HashMap::new(),
            internal_attributes: HashMap::new(),
            interrupted: false,
            metrics,
        }
    }

    pub fn request(&self) -> &GatewayRequest {
        &self.request
    }

    pub fn request_mut(&mut self) -> &mut GatewayRequest {
        &mut self.request
    }

    pub fn response(&self) -> &GatewayResponse {
        &self.response
    }

    pub fn response_mut(&mut self) -> &mut GatewayResponse {
        &mut self.response
    }

    /// Split into request and response for the transport.
    pub fn into_parts(self) -> (GatewayRequest, GatewayResponse, RequestMetrics) {
        (self.request, self.response, self.metrics)
    }

    // --- Attributes ---

    pub fn set_attribute(&mut self, key: &str, value: impl Into<Value>) {
        self.attributes.insert(normalize(key).to_string(), value.into());
    }

    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes.get(normalize(key))
    }

    /// Typed attribute read. Fails if the stored value has another shape.
    pub fn attribute_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, serde_json::Error> {
        self.attribute(key)
            .map(|v| serde_json::from_value(v.clone()))
            .transpose()
    }

    pub fn remove_attribute(&mut self, key: &str) -> Option<Value> {
        self.attributes.remove(normalize(key))
    }

    pub fn attributes(&self) -> &HashMap<String, Value> {
        &self.attributes
    }

    pub fn set_internal_attribute(&mut self, key: &str, value: impl Into<Value>) {
        self.internal_attributes.insert(key.to_string(), value.into());
    }

    pub fn internal_attribute(&self, key: &str) -> Option<&Value> {
        self.internal_attributes.get(key)
    }

    pub fn internal_attribute_as<T: DeserializeOwned>(
        &self,
        key: &str,
    ) -> Result<Option<T>, serde_json::Error> {
        self.internal_attribute(key)
            .map(|v| serde_json::from_value(v.clone()))
            .transpose()
    }

    pub fn remove_internal_attribute(&mut self, key: &str) -> Option<Value> {
        self.internal_attributes.remove(key)
    }

    pub fn internal_attributes(&self) -> &HashMap<String, Value> {
        &self.internal_attributes
    }

    // --- Interruption ---

    pub fn is_interrupted(&self) -> bool {
        self.interrupted
    }

    /// Skip the remaining policies and the backend call.
    pub fn interrupt(&mut self) {
        self.interrupted = true;
    }

    /// Interrupt with a ready-made response.
    pub fn interrupt_with(&mut self, status: StatusCode, body: impl Into<Buffer>) {
        let body = body.into();
        self.response.status = status;
        self.response.headers.remove(axum::http::header::CONTENT_LENGTH);
        if !body.is_empty() && !self.response.headers.contains_key(axum::http::header::CONTENT_TYPE) {
            self.response.headers.insert(
                axum::http::header::CONTENT_TYPE,
                HeaderValue::from_static("text/plain; charset=utf-8"),
            );
        }
        self.response.body.set_body(body);
        self.interrupted = true;
    }

    // --- Metrics ---

    pub fn metrics(&self) -> &RequestMetrics {
        &self.metrics
    }

    pub fn metrics_mut(&mut self) -> &mut RequestMetrics {
        &mut self.metrics
    }
}

fn normalize(key: &str) -> &str {
    key.strip_prefix(ATTR_PREFIX).unwrap_or(key)
}

/// Request/response view handed to the synchronous phases.
pub struct HttpExecutionContext<'a> {
    ctx: &'a mut ExecutionContext,
    phase: ExecutionPhase,
}

impl<'a> HttpExecutionContext<'a> {
    pub fn new(ctx: &'a mut ExecutionContext, phase: ExecutionPhase) -> Self {
        Self { ctx, phase }
    }

    pub fn phase(&self) -> ExecutionPhase {
        self.phase
    }

    /// Body of the side this phase acts on.
    pub fn body_mut(&mut self) -> &mut BufferFlow {
        if self.phase.is_request_side() {
            &mut self.ctx.request.body
        } else {
            &mut self.ctx.response.body
        }
    }

    /// Headers of the side this phase acts on.
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        if self.phase.is_request_side() {
            &mut self.ctx.request.headers
        } else {
            &mut self.ctx.response.headers
        }
    }
}

impl Deref for HttpExecutionContext<'_> {
    type Target = ExecutionContext;

    fn deref(&self) -> &Self::Target {
        self.ctx
    }
}

impl DerefMut for HttpExecutionContext<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.ctx
    }
}

/// Message view handed to the asynchronous phases.
///
/// Each chunk of the payload is one message. Message transforms never fold
/// the stream.
pub struct MessageExecutionContext<'a> {
    ctx: &'a mut ExecutionContext,
    phase: ExecutionPhase,
}

impl<'a> MessageExecutionContext<'a> {
    pub fn new(ctx: &'a mut ExecutionContext, phase: ExecutionPhase) -> Self {
        Self { ctx, phase }
    }

    pub fn phase(&self) -> ExecutionPhase {
        self.phase
    }

    /// Payload carrying the messages of this phase.
    pub fn messages_mut(&mut self) -> &mut BufferFlow {
        if self.phase.is_request_side() {
            &mut self.ctx.request.body
        } else {
            &mut self.ctx.response.body
        }
    }

    /// Map every message of this phase.
    pub fn on_messages<F>(&mut self, mut transform: F)
    where
        F: FnMut(Buffer) -> Buffer + Send + 'static,
    {
        let flow = self.messages_mut();
        let messages = flow.chunks();
        flow.set_chunks(messages.map_ok(move |m| transform(m)).boxed());
    }

    /// Drop the messages for which `keep` returns false.
    pub fn filter_messages<F>(&mut self, keep: F)
    where
        F: Fn(&Buffer) -> bool + Send + Sync + 'static,
    {
        let flow = self.messages_mut();
        let messages = flow.chunks();
        flow.set_chunks(
            messages
                .try_filter(move |m| futures_util::future::ready(keep(m)))
                .boxed(),
        );
    }
}

impl Deref for MessageExecutionContext<'_> {
    type Target = ExecutionContext;

    fn deref(&self) -> &Self::Target {
        self.ctx
    }
}

impl DerefMut for MessageExecutionContext<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.ctx
    }
}
