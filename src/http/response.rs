//! Response writing.
//!
//! # Responsibilities
//! - Write the context's response back to the client
//! - Map pipeline errors to status codes
//!
//! # Design Decisions
//! - Streaming responses are written chunk by chunk, never buffered here
//! - Hop-by-hop headers are stripped before writing
//! - Error bodies are short plain-text reasons

use axum::body::Body;
use axum::http::{header, HeaderValue, Response, StatusCode};

use crate::gateway::GatewayError;
use crate::http::body;
use crate::http::request::X_REQUEST_ID;
use crate::policy::GatewayResponse;

/// Client response for a completed pipeline.
pub fn write(response: &mut GatewayResponse, request_id: &str) -> Response<Body> {
    let mut headers = std::mem::take(&mut response.headers);
    body::strip_hop_by_hop(&mut headers);
    set_request_id(&mut headers, request_id);

    let mut out = Response::new(body::into_body(response.body.drain()));
    *out.status_mut() = response.status;
    *out.headers_mut() = headers;
    out
}

/// Client response for a failed pipeline.
pub fn error(err: &GatewayError, request_id: &str) -> Response<Body> {
    let status = err.status_code();
    let reason = match err {
        GatewayError::NoApi(_) | GatewayError::NoFlow { .. } => "No matching API found",
        GatewayError::NoEndpoint(_) => "No available endpoint",
        GatewayError::Invoker(_) if status == StatusCode::GATEWAY_TIMEOUT => "Upstream timed out",
        _ if status == StatusCode::PAYLOAD_TOO_LARGE => "Payload too large",
        _ if status == StatusCode::BAD_REQUEST => "Invalid request body",
        GatewayError::Invoker(_) => "Upstream request failed",
        GatewayError::Body(_) => "Invalid request body",
        GatewayError::Chain(_) => "Internal gateway error",
    };

    let mut out = Response::new(Body::from(reason));
    *out.status_mut() = status;
    out.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    set_request_id(out.headers_mut(), request_id);
    out
}

fn set_request_id(headers: &mut axum::http::HeaderMap, request_id: &str) {
    if let Ok(value) = HeaderValue::from_str(request_id) {
        headers.insert(X_REQUEST_ID, value);
    }
}
