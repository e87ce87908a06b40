//! Conversions between transport bodies and `BufferFlow`.
//!
//! # Responsibilities
//! - Choose buffered or streaming mode from the message headers
//! - Wrap an inbound body into a lazy chunk stream
//! - Turn a drained payload back into a transport body
//! - Strip hop-by-hop headers

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderName};
use futures_util::stream::{self, StreamExt, TryStreamExt};
use hyper::body::Body as HttpBody;

use crate::buffer::{Buffer, BufferError, BufferFlow, BufferMode, Drained};

/// Headers meaningful for a single transport hop only.
pub const HOP_BY_HOP: [HeaderName; 8] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

/// Streaming for event streams and for bodies announced larger than `limit`.
pub fn body_mode(headers: &HeaderMap, limit: usize) -> BufferMode {
    let event_stream = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.trim_start().starts_with("text/event-stream"));

    let oversized = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .is_some_and(|len| len > limit as u64);

    if event_stream || oversized {
        BufferMode::Streaming
    } else {
        BufferMode::Buffered
    }
}

/// Wrap a transport body without reading it.
pub fn into_flow(body: Body, headers: &HeaderMap, limit: usize) -> BufferFlow {
    let mode = body_mode(headers, limit);
    if HttpBody::is_end_stream(&body) {
        return BufferFlow::new(mode).with_max_size(limit);
    }

    let chunks = body
        .into_data_stream()
        .map_ok(Buffer::from)
        .map_err(|e| BufferError::Transport(e.to_string()))
        .boxed();
    BufferFlow::from_stream(chunks, mode).with_max_size(limit)
}

/// Transport body for a drained payload. Whole bodies carry an exact size.
pub fn into_body(drained: Drained) -> Body {
    match drained {
        Drained::Empty => Body::empty(),
        Drained::Whole(buffer) => Body::from(buffer.into_bytes()),
        Drained::Chunks(chunks) => Body::from_stream(chunks),
        // The writer aborts the message instead of sending a truncated body.
        Drained::Failed(e) => Body::from_stream(stream::once(async move { Err::<Buffer, _>(e) })),
    }
}

/// Remove hop-by-hop headers, including those listed in `Connection`.
///
/// `Content-Length` goes too: the outgoing body announces its own size.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in listed.iter().chain(HOP_BY_HOP.iter()) {
        headers.remove(name);
    }
    headers.remove(header::CONTENT_LENGTH);
}
