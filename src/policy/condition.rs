//! Conditional policy bindings.
//!
//! # Grammar
//! ```text
//! condition := operand "exists"
//!            | operand ("==" | "!=") literal
//! operand   := "request.header." NAME | "request.method" | "request.path"
//!            | "attribute." KEY
//! literal   := 'text' | "text"
//! ```
//!
//! Header names are case-insensitive, everything else is compared exactly.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::policy::context::{ExecutionContext, HttpExecutionContext, MessageExecutionContext};
use crate::policy::{Policy, PolicyError};

/// Errors raised while parsing a condition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConditionError {
    #[error("expected '<operand> == <literal>', '<operand> != <literal>' or '<operand> exists'")]
    Syntax,

    #[error("unknown operand '{0}'")]
    UnknownOperand(String),

    #[error("literal must be quoted: {0}")]
    UnquotedLiteral(String),
}

/// Value a condition reads from the context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    RequestHeader(String),
    RequestMethod,
    RequestPath,
    Attribute(String),
}

impl Operand {
    fn parse(text: &str) -> Result<Self, ConditionError> {
        let text = text.trim();
        if let Some(name) = text.strip_prefix("request.header.") {
            if !name.is_empty() {
                return Ok(Operand::RequestHeader(name.to_ascii_lowercase()));
            }
        }
        if let Some(key) = text.strip_prefix("attribute.") {
            if !key.is_empty() {
                return Ok(Operand::Attribute(key.to_string()));
            }
        }
        match text {
            "request.method" => Ok(Operand::RequestMethod),
            "request.path" => Ok(Operand::RequestPath),
            other => Err(ConditionError::UnknownOperand(other.to_string())),
        }
    }

    fn read(&self, ctx: &ExecutionContext) -> Option<String> {
        match self {
            Operand::RequestHeader(name) => ctx.request().header(name).map(str::to_string),
            Operand::RequestMethod => Some(ctx.request().method.to_string()),
            Operand::RequestPath => Some(ctx.request().path.clone()),
            Operand::Attribute(key) => ctx.attribute(key).map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            }),
        }
    }
}

/// A parsed activation condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    Exists(Operand),
    Equals(Operand, String),
    NotEquals(Operand, String),
}

impl Condition {
    pub fn parse(text: &str) -> Result<Self, ConditionError> {
        let text = text.trim();

        if let Some(operand) = text.strip_suffix("exists") {
            if operand.ends_with(char::is_whitespace) {
                return Ok(Condition::Exists(Operand::parse(operand)?));
            }
        }

        if let Some((left, right)) = text.split_once("!=") {
            return Ok(Condition::NotEquals(Operand::parse(left)?, literal(right)?));
        }
        if let Some((left, right)) = text.split_once("==") {
            return Ok(Condition::Equals(Operand::parse(left)?, literal(right)?));
        }

        Err(ConditionError::Syntax)
    }

    pub fn evaluate(&self, ctx: &ExecutionContext) -> bool {
        match self {
            Condition::Exists(operand) => operand.read(ctx).is_some(),
            Condition::Equals(operand, expected) => operand.read(ctx).as_deref() == Some(expected),
            Condition::NotEquals(operand, expected) => operand.read(ctx).as_deref() != Some(expected),
        }
    }
}

fn literal(text: &str) -> Result<String, ConditionError> {
    let text = text.trim();
    let quoted = text.len() >= 2
        && ((text.starts_with('\'') && text.ends_with('\''))
            || (text.starts_with('"') && text.ends_with('"')));
    if quoted {
        Ok(text[1..text.len() - 1].to_string())
    } else {
        Err(ConditionError::UnquotedLiteral(text.to_string()))
    }
}

/// Runs the wrapped policy only when the condition holds.
pub struct ConditionalPolicy {
    inner: Arc<dyn Policy>,
    condition: Condition,
}

impl ConditionalPolicy {
    pub fn new(inner: Arc<dyn Policy>, condition: Condition) -> Self {
        Self { inner, condition }
    }

    fn applies(&self, ctx: &ExecutionContext) -> bool {
        let applies = self.condition.evaluate(ctx);
        if !applies {
            tracing::trace!(policy = %self.inner.id(), condition = ?self.condition, "Condition not met, skipping policy");
        }
        applies
    }
}

#[async_trait]
impl Policy for ConditionalPolicy {
    fn id(&self) -> &str {
        self.inner.id()
    }

    async fn on_request(&self, ctx: &mut HttpExecutionContext<'_>) -> Result<(), PolicyError> {
        if self.applies(ctx) {
            self.inner.on_request(ctx).await?;
        }
        Ok(())
    }

    async fn on_response(&self, ctx: &mut HttpExecutionContext<'_>) -> Result<(), PolicyError> {
        if self.applies(ctx) {
            self.inner.on_response(ctx).await?;
        }
        Ok(())
    }

    async fn on_message_request(&self, ctx: &mut MessageExecutionContext<'_>) -> Result<(), PolicyError> {
        if self.applies(ctx) {
            self.inner.on_message_request(ctx).await?;
        }
        Ok(())
    }

    async fn on_message_response(&self, ctx: &mut MessageExecutionContext<'_>) -> Result<(), PolicyError> {
        if self.applies(ctx) {
            self.inner.on_message_response(ctx).await?;
        }
        Ok(())
    }
}

impl fmt::Debug for ConditionalPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConditionalPolicy")
            .field("policy", &self.inner.id())
            .field("condition", &self.condition)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::context::GatewayRequest;
    use axum::http::{HeaderValue, Method};

    fn context() -> ExecutionContext {
        let mut request = GatewayRequest::new(Method::POST, "/orders");
        request.headers.insert("x-tenant", HeaderValue::from_static("acme"));
        ExecutionContext::new(request)
    }

    #[test]
    fn test_parse_forms() {
        assert_eq!(
            Condition::parse("request.header.X-Tenant == 'acme'"),
            Ok(Condition::Equals(Operand::RequestHeader("x-tenant".into()), "acme".into()))
        );
        assert_eq!(
            Condition::parse("attribute.plan != \"free\""),
            Ok(Condition::NotEquals(Operand::Attribute("plan".into()), "free".into()))
        );
        assert_eq!(
            Condition::parse("request.header.authorization exists"),
            Ok(Condition::Exists(Operand::RequestHeader("authorization".into())))
        );
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(Condition::parse("request.method"), Err(ConditionError::Syntax));
        assert_eq!(
            Condition::parse("request.body == 'x'"),
            Err(ConditionError::UnknownOperand("request.body".into()))
        );
        assert_eq!(
            Condition::parse("request.method == GET"),
            Err(ConditionError::UnquotedLiteral("GET".into()))
        );
    }

    #[test]
    fn test_evaluate_against_context() {
        let mut ctx = context();
        ctx.set_attribute("plan", "gold");

        let holds = |text: &str, ctx: &ExecutionContext| Condition::parse(text).unwrap().evaluate(ctx);
        assert!(holds("request.method == 'POST'", &ctx));
        assert!(holds("request.path == '/orders'", &ctx));
        assert!(holds("request.header.x-tenant == 'acme'", &ctx));
        assert!(!holds("request.header.x-missing exists", &ctx));
        assert!(holds("request.header.x-missing != 'acme'", &ctx));
        assert!(holds("attribute.plan == 'gold'", &ctx));
    }
}
