//! Backend invocation over HTTP.
//!
//! # Responsibilities
//! - Build the upstream URI from the endpoint target and the path info
//! - Stream the request payload to the endpoint
//! - Wrap the backend response body into the response `BufferFlow`
//!
//! # Design Decisions
//! - One pooled client shared by every request
//! - The request timeout bounds the wait for response headers; the body
//!   streams afterwards
//! - No retries: a failed call is reported once

use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{HeaderValue, Request, Uri};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use url::Url;

use crate::buffer::Drained;
use crate::config::{BufferConfig, TimeoutConfig};
use crate::gateway::{EndpointInvoker, InvokerError};
use crate::http::body;
use crate::http::request::X_REQUEST_ID;
use crate::load_balancer::ManagedEndpoint;
use crate::policy::ExecutionContext;

/// Invokes endpoints with a hyper-util pooled client.
#[derive(Clone)]
pub struct HttpInvoker {
    client: Client<HttpConnector, Body>,
    request_timeout: Duration,
    max_buffered_bytes: usize,
}

impl HttpInvoker {
    pub fn new(timeouts: &TimeoutConfig, buffer: &BufferConfig) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(Duration::from_secs(timeouts.connect_secs)));

        let client = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(Duration::from_secs(timeouts.idle_secs))
            .build(connector);

        Self {
            client,
            request_timeout: Duration::from_secs(timeouts.request_secs),
            max_buffered_bytes: buffer.max_buffered_bytes,
        }
    }
}

/// Upstream URL: the target's path, then the path info, then the query.
pub fn upstream_uri(target: &Url, path_info: &str, query: Option<&str>) -> Result<Uri, InvokerError> {
    let mut url = target.clone();
    let base = target.path().trim_end_matches('/');
    let path = if path_info == "/" && !base.is_empty() {
        base.to_string()
    } else {
        format!("{}{}", base, path_info)
    };
    url.set_path(&path);
    url.set_query(query);

    url.as_str()
        .parse::<Uri>()
        .map_err(|_| InvokerError::InvalidUri(url.to_string()))
}

#[async_trait]
impl EndpointInvoker for HttpInvoker {
    async fn invoke(
        &self,
        endpoint: &ManagedEndpoint,
        ctx: &mut ExecutionContext,
    ) -> Result<(), InvokerError> {
        let request = ctx.request_mut();
        let uri = upstream_uri(endpoint.target(), &request.path_info, request.query.as_deref())?;

        let mut headers = request.headers.clone();
        body::strip_hop_by_hop(&mut headers);
        headers.remove(axum::http::header::HOST);
        if let Ok(id) = HeaderValue::from_str(&request.id) {
            headers.insert(X_REQUEST_ID, id);
        }

        let drained = match request.body.drain() {
            Drained::Failed(e) => {
                tracing::debug!(request_id = %request.id, error = %e, "Request body unreadable, not invoking endpoint");
                return Err(InvokerError::Body(e));
            }
            drained => drained,
        };

        let mut outbound = Request::new(body::into_body(drained));
        *outbound.method_mut() = request.method.clone();
        *outbound.uri_mut() = uri.clone();
        *outbound.headers_mut() = headers;

        tracing::debug!(
            request_id = %request.id,
            endpoint = %endpoint.name(),
            uri = %uri,
            "Invoking endpoint"
        );

        let response = match tokio::time::timeout(self.request_timeout, self.client.request(outbound)).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                tracing::warn!(endpoint = %endpoint.name(), uri = %uri, error = %e, "Upstream error");
                return Err(InvokerError::Request(e.to_string()));
            }
            Err(_) => {
                tracing::warn!(endpoint = %endpoint.name(), uri = %uri, "Upstream timed out");
                return Err(InvokerError::Timeout(self.request_timeout));
            }
        };

        let (parts, incoming) = response.into_parts();
        let mut headers = parts.headers;
        let flow = body::into_flow(Body::new(incoming), &headers, self.max_buffered_bytes);
        body::strip_hop_by_hop(&mut headers);

        let response = ctx.response_mut();
        response.status = parts.status;
        response.headers = headers;
        response.body = flow;
        Ok(())
    }
}
