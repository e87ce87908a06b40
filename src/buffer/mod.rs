//! Payload buffering subsystem.
//!
//! # Data Flow
//! ```text
//! Transport body (lazy chunk stream)
//!     → flow.rs (BufferFlow: stream or cached body, never both)
//!     → policies read body() / chunks() as many times as they like
//!     → the stream is folded at most once per installation
//!     → backend writer / client writer drains chunks()
//! ```
//!
//! # Design Decisions
//! - `Buffer` wraps `bytes::Bytes`, so clones are reference-counted
//! - Cache and stream are a tagged union, ownership decides who is authoritative
//! - Streaming mode never materializes the body

pub mod flow;

use bytes::{Bytes, BytesMut};
use futures_util::stream::BoxStream;
use thiserror::Error;

pub use flow::{BufferFlow, BufferMode, Drained};

/// A lazy, finite sequence of body chunks consumed by exactly one reader.
pub type ChunkStream = BoxStream<'static, Result<Buffer, BufferError>>;

/// Errors raised while reading or folding a payload.
#[derive(Debug, Clone, Error)]
pub enum BufferError {
    /// The underlying transport failed while producing chunks.
    #[error("transport error while reading body: {0}")]
    Transport(String),

    /// The folded body exceeded the configured limit.
    #[error("body exceeds the maximum buffered size of {limit} bytes")]
    TooLarge { limit: usize },
}

/// An immutable byte sequence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Buffer {
    bytes: Bytes,
}

impl Buffer {
    /// Zero-length buffer.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Bytes {
        self.bytes
    }

    /// Lossy UTF-8 view, for logging and simple text policies.
    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }

    /// Concatenate two adjacent buffers into a new one.
    pub fn append(self, other: Buffer) -> Buffer {
        if self.is_empty() {
            return other;
        }
        if other.is_empty() {
            return self;
        }
        let mut joined = BytesMut::with_capacity(self.len() + other.len());
        joined.extend_from_slice(&self.bytes);
        joined.extend_from_slice(&other.bytes);
        Buffer {
            bytes: joined.freeze(),
        }
    }
}

impl From<Bytes> for Buffer {
    fn from(bytes: Bytes) -> Self {
        Self { bytes }
    }
}

impl From<Vec<u8>> for Buffer {
    fn from(bytes: Vec<u8>) -> Self {
        Self {
            bytes: Bytes::from(bytes),
        }
    }
}

impl From<String> for Buffer {
    fn from(text: String) -> Self {
        Self {
            bytes: Bytes::from(text),
        }
    }
}

impl From<&'static str> for Buffer {
    fn from(text: &'static str) -> Self {
        Self {
            bytes: Bytes::from_static(text.as_bytes()),
        }
    }
}

impl From<Buffer> for Bytes {
    fn from(buffer: Buffer) -> Self {
        buffer.bytes
    }
}
