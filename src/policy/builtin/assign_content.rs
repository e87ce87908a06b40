//! Payload replacement policy.
//!
//! Replaces the body of the side the phase acts on. In message phases every
//! message is replaced instead, and the stream is left unfolded.
//!
//! A `{content}` placeholder in the configured body expands to the current
//! payload, read once through the payload cache. It expands to nothing on
//! streaming payloads, which are never folded.

use std::convert::Infallible;

use async_trait::async_trait;
use axum::http::{header, HeaderValue};
use serde::Deserialize;

use crate::buffer::Buffer;
use crate::policy::context::{HttpExecutionContext, MessageExecutionContext};
use crate::policy::{Policy, PolicyError};

pub const ID: &str = "assign-content";

const CONTENT_PLACEHOLDER: &str = "{content}";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AssignContentConfig {
    pub body: String,
    pub content_type: Option<String>,
}

#[derive(Debug)]
pub struct AssignContentPolicy {
    body: Buffer,
    /// Set when the body embeds the current payload.
    template: Option<String>,
    content_type: Option<HeaderValue>,
}

impl AssignContentPolicy {
    pub fn new(config: AssignContentConfig) -> Result<Self, PolicyError> {
        let content_type = config
            .content_type
            .as_deref()
            .map(HeaderValue::from_str)
            .transpose()
            .map_err(|e| PolicyError::invalid_configuration(ID, e))?;
        let template = config
            .body
            .contains(CONTENT_PLACEHOLDER)
            .then(|| config.body.clone());
        Ok(Self {
            body: Buffer::from(config.body),
            template,
            content_type,
        })
    }

    async fn replace(&self, ctx: &mut HttpExecutionContext<'_>) -> Result<(), PolicyError> {
        let length = match &self.template {
            Some(template) if !ctx.body_mut().is_streaming() => {
                let template = template.clone();
                let body = ctx.body_mut();
                body.on_body(|current| async move {
                    let content = current.map(|b| b.to_string_lossy()).unwrap_or_default();
                    Ok::<_, Infallible>(Some(Buffer::from(template.replace(CONTENT_PLACEHOLDER, &content))))
                })
                .await?;
                body.body().await?.map_or(0, |b| b.len())
            }
            Some(template) => {
                let expanded = Buffer::from(template.replace(CONTENT_PLACEHOLDER, ""));
                let length = expanded.len();
                ctx.body_mut().set_body(expanded);
                length
            }
            None => {
                ctx.body_mut().set_body(self.body.clone());
                self.body.len()
            }
        };

        let headers = ctx.headers_mut();
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(length));
        if let Some(content_type) = &self.content_type {
            headers.insert(header::CONTENT_TYPE, content_type.clone());
        }
        Ok(())
    }
}

#[async_trait]
impl Policy for AssignContentPolicy {
    fn id(&self) -> &str {
        ID
    }

    async fn on_request(&self, ctx: &mut HttpExecutionContext<'_>) -> Result<(), PolicyError> {
        self.replace(ctx).await
    }

    async fn on_response(&self, ctx: &mut HttpExecutionContext<'_>) -> Result<(), PolicyError> {
        self.replace(ctx).await
    }

    async fn on_message_request(&self, ctx: &mut MessageExecutionContext<'_>) -> Result<(), PolicyError> {
        let body = self.body.clone();
        ctx.on_messages(move |_| body.clone());
        Ok(())
    }

    async fn on_message_response(&self, ctx: &mut MessageExecutionContext<'_>) -> Result<(), PolicyError> {
        let body = self.body.clone();
        ctx.on_messages(move |_| body.clone());
        Ok(())
    }
}
