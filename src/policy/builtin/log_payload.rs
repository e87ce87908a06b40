//! Payload logging policy.
//!
//! Reads the body of the side the phase acts on and logs it through
//! `tracing`. The read goes through the payload cache, so the backend and any
//! later policy see the same folded body. Streaming payloads are never
//! captured.

use async_trait::async_trait;
use serde::Deserialize;

use crate::buffer::Buffer;
use crate::policy::context::HttpExecutionContext;
use crate::policy::{Policy, PolicyError};

pub const ID: &str = "log-payload";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogPayloadConfig {
    /// Longest payload prefix written to the log.
    pub max_bytes: usize,
}

impl Default for LogPayloadConfig {
    fn default() -> Self {
        Self { max_bytes: 1024 }
    }
}

#[derive(Debug)]
pub struct LogPayloadPolicy {
    max_bytes: usize,
}

impl LogPayloadPolicy {
    pub fn new(config: LogPayloadConfig) -> Self {
        Self {
            max_bytes: config.max_bytes,
        }
    }

    /// Logged form of `buffer`, cut at `max_bytes`.
    fn excerpt(&self, buffer: &Buffer) -> String {
        let bytes = buffer.as_bytes();
        let cut = bytes.len().min(self.max_bytes);
        String::from_utf8_lossy(&bytes[..cut]).into_owned()
    }

    async fn log(&self, ctx: &mut HttpExecutionContext<'_>) -> Result<(), PolicyError> {
        let phase = ctx.phase();
        if ctx.body_mut().is_streaming() {
            tracing::debug!(request_id = %ctx.request().id, %phase, "Streaming payload not captured");
            return Ok(());
        }

        let body = ctx.body_mut().body().await?;
        let size = body.as_ref().map_or(0, Buffer::len);
        let payload = body.as_ref().map(|b| self.excerpt(b)).unwrap_or_default();
        tracing::info!(
            request_id = %ctx.request().id,
            api = %ctx.metrics().api_id,
            %phase,
            size,
            truncated = size > self.max_bytes,
            payload = %payload,
            "Payload"
        );
        Ok(())
    }
}

#[async_trait]
impl Policy for LogPayloadPolicy {
    fn id(&self) -> &str {
        ID
    }

    async fn on_request(&self, ctx: &mut HttpExecutionContext<'_>) -> Result<(), PolicyError> {
        self.log(ctx).await
    }

    async fn on_response(&self, ctx: &mut HttpExecutionContext<'_>) -> Result<(), PolicyError> {
        self.log(ctx).await
    }
}
