//! Per-request payload cache.
//!
//! # Responsibilities
//! - Reconcile the whole-body view and the chunk-stream view of one payload
//! - Drain the transport stream at most once per installation
//! - Keep both views consistent after body or chunk transformations
//!
//! # Design Decisions
//! - The payload is a tagged union: exactly one holder is authoritative
//! - `chunks()` hands the stream over and leaves nothing behind
//! - Transform failures become a deterministic cached buffer, never a gap
//! - A failed fold is remembered: every later read raises the same error

use std::fmt;
use std::future::Future;

use bytes::BytesMut;
use futures_util::stream::{self, StreamExt, TryStreamExt};

use super::{Buffer, BufferError, ChunkStream};

/// Whether the owner allows the body to be materialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BufferMode {
    /// The body may be folded and cached.
    #[default]
    Buffered,
    /// Chunks pass through untouched; `body()` is never available.
    Streaming,
}

enum Payload {
    /// Nothing computed and no stream installed.
    Absent,
    /// Computed, and the body is empty.
    Empty,
    Cached(Buffer),
    Stream(ChunkStream),
    /// Folding the stream failed; the partial payload is gone.
    Failed(BufferError),
}

/// Payload holder for one direction (request or response) of one request.
pub struct BufferFlow {
    mode: BufferMode,
    payload: Payload,
    max_size: Option<usize>,
}

impl BufferFlow {
    /// Create an empty flow.
    pub fn new(mode: BufferMode) -> Self {
        Self {
            mode,
            payload: Payload::Absent,
            max_size: None,
        }
    }

    /// Create a flow backed by a transport stream.
    pub fn from_stream(stream: ChunkStream, mode: BufferMode) -> Self {
        Self {
            mode,
            payload: Payload::Stream(stream),
            max_size: None,
        }
    }

    /// Create a buffered flow that already holds its body.
    pub fn from_buffer(buffer: impl Into<Buffer>) -> Self {
        Self {
            mode: BufferMode::Buffered,
            payload: Payload::Cached(buffer.into()),
            max_size: None,
        }
    }

    /// Cap the size a fold may reach.
    pub fn with_max_size(mut self, limit: usize) -> Self {
        self.max_size = Some(limit);
        self
    }

    pub fn mode(&self) -> BufferMode {
        self.mode
    }

    pub fn is_streaming(&self) -> bool {
        self.mode == BufferMode::Streaming
    }

    /// Take the chunk view of the payload.
    ///
    /// A cached body is handed out as a single-chunk stream and the cache is
    /// cleared. Otherwise the installed stream is handed out, or an empty
    /// stream if none is installed. After a failed fold the stream yields the
    /// fold error and the failure stays in place.
    pub fn chunks(&mut self) -> ChunkStream {
        match std::mem::replace(&mut self.payload, Payload::Absent) {
            Payload::Cached(buffer) => stream::once(async move { Ok(buffer) }).boxed(),
            Payload::Stream(chunks) => chunks,
            Payload::Absent | Payload::Empty => stream::empty().boxed(),
            Payload::Failed(e) => {
                self.payload = Payload::Failed(e.clone());
                stream::once(async move { Err(e) }).boxed()
            }
        }
    }

    /// Replace the payload with a new stream, discarding any cache.
    pub fn set_chunks(&mut self, chunks: ChunkStream) {
        self.payload = Payload::Stream(chunks);
    }

    /// Read the whole body, folding the stream on first access.
    ///
    /// Returns `Ok(None)` in streaming mode or when there is no body. A fold
    /// error is returned again on every later call.
    pub async fn body(&mut self) -> Result<Option<Buffer>, BufferError> {
        if self.is_streaming() {
            return Ok(None);
        }

        match &self.payload {
            Payload::Cached(buffer) => return Ok(Some(buffer.clone())),
            Payload::Empty => return Ok(Some(Buffer::empty())),
            Payload::Absent => return Ok(None),
            Payload::Failed(e) => return Err(e.clone()),
            Payload::Stream(_) => {}
        }

        let Payload::Stream(chunks) = std::mem::replace(&mut self.payload, Payload::Absent) else {
            return Ok(None);
        };

        match fold(chunks, self.max_size).await {
            Ok(folded) => {
                if let Some(buffer) = &folded {
                    self.payload = Payload::Cached(buffer.clone());
                }
                Ok(folded)
            }
            Err(e) => {
                tracing::debug!(error = %e, "Body fold failed");
                self.payload = Payload::Failed(e.clone());
                Err(e)
            }
        }
    }

    /// Like [`body`](Self::body) but yields a zero-length buffer when there is
    /// no body, and remembers that the body was computed as empty.
    pub async fn body_or_empty(&mut self) -> Result<Buffer, BufferError> {
        if self.is_streaming() {
            return Ok(Buffer::empty());
        }
        match self.body().await? {
            Some(buffer) => Ok(buffer),
            None => {
                self.payload = Payload::Empty;
                Ok(Buffer::empty())
            }
        }
    }

    /// Install a whole body; the chunk view collapses to this single value.
    pub fn set_body(&mut self, buffer: impl Into<Buffer>) {
        self.payload = Payload::Cached(buffer.into());
    }

    /// Read the body once, transform it and cache the result.
    ///
    /// A transform error is cached as a buffer carrying the error message. A
    /// transform that yields no value caches an empty body. Streaming flows
    /// are left untouched.
    pub async fn on_body<F, Fut, E>(&mut self, transform: F) -> Result<(), BufferError>
    where
        F: FnOnce(Option<Buffer>) -> Fut,
        Fut: Future<Output = Result<Option<Buffer>, E>>,
        E: fmt::Display,
    {
        if self.is_streaming() {
            tracing::debug!("Ignoring body transformation on a streaming payload");
            return Ok(());
        }

        let current = self.body().await?;
        self.payload = match transform(current).await {
            Ok(Some(buffer)) => Payload::Cached(buffer),
            Ok(None) => Payload::Empty,
            Err(e) => {
                tracing::warn!(error = %e, "Body transformation failed");
                Payload::Cached(Buffer::from(e.to_string()))
            }
        };
        Ok(())
    }

    /// Transform the chunk stream, then recompute the cached body from it.
    ///
    /// In streaming mode the transformed stream is installed without folding.
    pub async fn on_chunks<F>(&mut self, transform: F) -> Result<(), BufferError>
    where
        F: FnOnce(ChunkStream) -> ChunkStream,
    {
        let transformed = transform(self.chunks());
        self.set_chunks(transformed);

        if !self.is_streaming() {
            self.body().await?;
        }
        Ok(())
    }

    /// True when a live stream (not a cache) is installed.
    pub fn has_chunks(&self) -> bool {
        matches!(self.payload, Payload::Stream(_))
    }

    /// The error of a failed fold, if any.
    pub fn failure(&self) -> Option<&BufferError> {
        match &self.payload {
            Payload::Failed(e) => Some(e),
            _ => None,
        }
    }

    /// Hand the payload to a writer, keeping a known body whole so the
    /// writer can announce its length.
    pub fn drain(&mut self) -> Drained {
        match std::mem::replace(&mut self.payload, Payload::Absent) {
            Payload::Absent | Payload::Empty => Drained::Empty,
            Payload::Cached(buffer) if buffer.is_empty() => Drained::Empty,
            Payload::Cached(buffer) => Drained::Whole(buffer),
            Payload::Stream(chunks) => Drained::Chunks(chunks),
            Payload::Failed(e) => {
                self.payload = Payload::Failed(e.clone());
                Drained::Failed(e)
            }
        }
    }
}

/// Payload taken out of a [`BufferFlow`] for writing.
pub enum Drained {
    Empty,
    Whole(Buffer),
    /// Length unknown until the stream ends.
    Chunks(ChunkStream),
    /// The body could not be read; nothing valid is left to write.
    Failed(BufferError),
}

impl Default for BufferFlow {
    fn default() -> Self {
        Self::new(BufferMode::Buffered)
    }
}

impl fmt::Debug for BufferFlow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let payload = match &self.payload {
            Payload::Absent => "absent".to_string(),
            Payload::Empty => "empty".to_string(),
            Payload::Cached(buffer) => format!("cached({} bytes)", buffer.len()),
            Payload::Stream(_) => "stream".to_string(),
            Payload::Failed(e) => format!("failed({})", e),
        };
        f.debug_struct("BufferFlow")
            .field("mode", &self.mode)
            .field("payload", &payload)
            .field("max_size", &self.max_size)
            .finish()
    }
}

/// Drain a chunk stream into one buffer. An empty stream folds to `None`.
async fn fold(mut chunks: ChunkStream, limit: Option<usize>) -> Result<Option<Buffer>, BufferError> {
    let mut head: Option<Buffer> = None;
    let mut joined: Option<BytesMut> = None;
    let mut size = 0usize;

    while let Some(chunk) = chunks.try_next().await? {
        size += chunk.len();
        if let Some(limit) = limit {
            if size > limit {
                return Err(BufferError::TooLarge { limit });
            }
        }

        if let Some(bytes) = joined.as_mut() {
            bytes.extend_from_slice(chunk.as_bytes());
        } else if let Some(first) = head.take() {
            let mut bytes = BytesMut::with_capacity(first.len() + chunk.len());
            bytes.extend_from_slice(first.as_bytes());
            bytes.extend_from_slice(chunk.as_bytes());
            joined = Some(bytes);
        } else {
            head = Some(chunk);
        }
    }

    Ok(joined.map(|bytes| Buffer::from(bytes.freeze())).or(head))
}
