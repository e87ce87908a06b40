//! Header transformation policy.
//!
//! On the request phase it rewrites request headers; on the response phase,
//! response headers. Removals run before additions.

use async_trait::async_trait;
use axum::http::{HeaderMap, HeaderName, HeaderValue};
use serde::Deserialize;
use std::collections::BTreeMap;

use crate::policy::context::HttpExecutionContext;
use crate::policy::{Policy, PolicyError};

pub const ID: &str = "transform-headers";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TransformHeadersConfig {
    /// Headers to set, replacing existing values.
    pub set: BTreeMap<String, String>,
    /// Headers to append, keeping existing values.
    pub add: BTreeMap<String, String>,
    /// Headers to remove.
    pub remove: Vec<String>,
}

#[derive(Debug)]
pub struct TransformHeadersPolicy {
    set: Vec<(HeaderName, HeaderValue)>,
    add: Vec<(HeaderName, HeaderValue)>,
    remove: Vec<HeaderName>,
}

impl TransformHeadersPolicy {
    /// Header names and values are checked here, not per request.
    pub fn new(config: TransformHeadersConfig) -> Result<Self, PolicyError> {
        Ok(Self {
            set: pairs(&config.set)?,
            add: pairs(&config.add)?,
            remove: config
                .remove
                .iter()
                .map(|n| name(n))
                .collect::<Result<Vec<_>, _>>()?,
        })
    }

    fn apply(&self, headers: &mut HeaderMap) {
        for name in &self.remove {
            headers.remove(name);
        }
        for (name, value) in &self.set {
            headers.insert(name.clone(), value.clone());
        }
        for (name, value) in &self.add {
            headers.append(name.clone(), value.clone());
        }
    }
}

fn name(raw: &str) -> Result<HeaderName, PolicyError> {
    HeaderName::from_bytes(raw.as_bytes())
        .map_err(|e| PolicyError::invalid_configuration(ID, format!("header '{raw}': {e}")))
}

fn pairs(map: &BTreeMap<String, String>) -> Result<Vec<(HeaderName, HeaderValue)>, PolicyError> {
    map.iter()
        .map(|(n, v)| {
            let value = HeaderValue::from_str(v)
                .map_err(|e| PolicyError::invalid_configuration(ID, format!("header '{n}': {e}")))?;
            Ok((name(n)?, value))
        })
        .collect()
}

#[async_trait]
impl Policy for TransformHeadersPolicy {
    fn id(&self) -> &str {
        ID
    }

    async fn on_request(&self, ctx: &mut HttpExecutionContext<'_>) -> Result<(), PolicyError> {
        self.apply(ctx.headers_mut());
        Ok(())
    }

    async fn on_response(&self, ctx: &mut HttpExecutionContext<'_>) -> Result<(), PolicyError> {
        self.apply(ctx.headers_mut());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::context::{ExecutionContext, GatewayRequest};
    use crate::policy::phase::ExecutionPhase;
    use axum::http::Method;

    fn policy() -> TransformHeadersPolicy {
        let config: TransformHeadersConfig = serde_json::from_value(serde_json::json!({
            "set": { "x-gateway": "on" },
            "add": { "via": "gateway" },
            "remove": ["x-internal"]
        }))
        .unwrap();
        TransformHeadersPolicy::new(config).unwrap()
    }

    #[tokio::test]
    async fn test_request_and_response_sides() {
        let mut request = GatewayRequest::new(Method::GET, "/");
        request.headers.insert("x-internal", HeaderValue::from_static("secret"));
        request.headers.insert("via", HeaderValue::from_static("edge"));
        let mut ctx = ExecutionContext::new(request);

        let p = policy();
        p.on_request(&mut HttpExecutionContext::new(&mut ctx, ExecutionPhase::Request))
            .await
            .unwrap();
        assert!(ctx.request().headers.get("x-internal").is_none());
        assert_eq!(ctx.request().header("x-gateway"), Some("on"));
        assert_eq!(ctx.request().headers.get_all("via").iter().count(), 2);
        assert!(ctx.response().headers.is_empty());

        p.on_response(&mut HttpExecutionContext::new(&mut ctx, ExecutionPhase::Response))
            .await
            .unwrap();
        assert_eq!(ctx.response().header("x-gateway"), Some("on"));
    }

    #[test]
    fn test_invalid_header_name_is_rejected() {
        let mut config = TransformHeadersConfig::default();
        config.remove.push("bad header".to_string());
        assert!(matches!(
            TransformHeadersPolicy::new(config),
            Err(PolicyError::InvalidConfiguration { .. })
        ));
    }
}
