//! Inbound request handling.
//!
//! # Responsibilities
//! - Turn an axum request into a `GatewayRequest`
//! - Carry the request ID assigned by the request-id layer
//! - Extract the routing host
//!
//! # Design Decisions
//! - The body is wrapped, never read, here
//! - Inbound headers are kept intact for policies; hop-by-hop headers are
//!   stripped by the invoker

use std::net::SocketAddr;

use axum::body::Body;
use axum::http::{header, Request};

use crate::http::body;
use crate::policy::GatewayRequest;

pub const X_REQUEST_ID: &str = "x-request-id";

/// Build the gateway's view of an inbound request.
pub fn from_axum(request: Request<Body>, remote: Option<SocketAddr>, limit: usize) -> GatewayRequest {
    let (parts, inbound) = request.into_parts();

    let mut request = GatewayRequest::new(parts.method, parts.uri.path());
    if let Some(id) = parts.headers.get(X_REQUEST_ID).and_then(|v| v.to_str().ok()) {
        request.id = id.to_string();
    }
    request.query = parts.uri.query().map(str::to_string);
    request.remote_address = remote;
    request.body = body::into_flow(inbound, &parts.headers, limit);
    request.headers = parts.headers;
    request
}

/// Host the request was addressed to, as sent (port included).
pub fn host<B>(request: &Request<B>) -> Option<&str> {
    request
        .headers()
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .or_else(|| request.uri().host())
}
