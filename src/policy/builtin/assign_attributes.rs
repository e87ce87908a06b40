//! Attribute assignment policy.
//!
//! String values may reference `{request.path}`, `{request.method}` and
//! `{request.header.<name>}`; missing headers expand to an empty string.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::policy::context::{ExecutionContext, HttpExecutionContext, MessageExecutionContext};
use crate::policy::{Policy, PolicyError};

pub const ID: &str = "assign-attributes";

#[derive(Debug, Clone, Deserialize)]
pub struct AttributeAssignment {
    pub name: String,
    pub value: Value,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AssignAttributesConfig {
    pub attributes: Vec<AttributeAssignment>,
}

#[derive(Debug)]
pub struct AssignAttributesPolicy {
    config: AssignAttributesConfig,
}

impl AssignAttributesPolicy {
    pub fn new(config: AssignAttributesConfig) -> Self {
        Self { config }
    }

    fn assign(&self, ctx: &mut ExecutionContext) {
        for assignment in &self.config.attributes {
            let value = match &assignment.value {
                Value::String(template) => Value::String(expand(template, ctx)),
                other => other.clone(),
            };
            ctx.set_attribute(&assignment.name, value);
        }
    }
}

fn expand(template: &str, ctx: &ExecutionContext) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let Some(len) = rest[start..].find('}') else {
            rest = &rest[start..];
            break;
        };
        let expression = &rest[start + 1..start + len];
        match expression {
            "request.path" => out.push_str(&ctx.request().path),
            "request.method" => out.push_str(ctx.request().method.as_str()),
            _ => match expression.strip_prefix("request.header.") {
                Some(name) => out.push_str(ctx.request().header(name).unwrap_or("")),
                None => out.push_str(&rest[start..=start + len]),
            },
        }
        rest = &rest[start + len + 1..];
    }
    out.push_str(rest);
    out
}

#[async_trait]
impl Policy for AssignAttributesPolicy {
    fn id(&self) -> &str {
        ID
    }

    async fn on_request(&self, ctx: &mut HttpExecutionContext<'_>) -> Result<(), PolicyError> {
        self.assign(ctx);
        Ok(())
    }

    async fn on_response(&self, ctx: &mut HttpExecutionContext<'_>) -> Result<(), PolicyError> {
        self.assign(ctx);
        Ok(())
    }

    async fn on_message_request(&self, ctx: &mut MessageExecutionContext<'_>) -> Result<(), PolicyError> {
        self.assign(ctx);
        Ok(())
    }

    async fn on_message_response(&self, ctx: &mut MessageExecutionContext<'_>) -> Result<(), PolicyError> {
        self.assign(ctx);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::context::GatewayRequest;
    use crate::policy::phase::ExecutionPhase;
    use axum::http::{HeaderValue, Method};
    use serde_json::json;

    #[tokio::test]
    async fn test_assigns_literal_and_templated_values() {
        let config: AssignAttributesConfig = serde_json::from_value(json!({
            "attributes": [
                { "name": "gateway.attribute.tier", "value": 3 },
                { "name": "origin", "value": "{request.method} {request.path} by {request.header.x-user}" },
                { "name": "raw", "value": "{unknown} {open" }
            ]
        }))
        .unwrap();
        let policy = AssignAttributesPolicy::new(config);

        let mut request = GatewayRequest::new(Method::PUT, "/books/1");
        request.headers.insert("x-user", HeaderValue::from_static("bob"));
        let mut ctx = ExecutionContext::new(request);
        policy
            .on_request(&mut HttpExecutionContext::new(&mut ctx, ExecutionPhase::Request))
            .await
            .unwrap();

        assert_eq!(ctx.attribute("tier"), Some(&json!(3)));
        assert_eq!(ctx.attribute("origin"), Some(&json!("PUT /books/1 by bob")));
        assert_eq!(ctx.attribute("raw"), Some(&json!("{unknown} {open")));
    }
}
