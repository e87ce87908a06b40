//! Built-in policies.
//!
//! | id                  | phases               | effect                              |
//! |---------------------|----------------------|-------------------------------------|
//! | `rate-limit`        | request, message req | token bucket per key, 429 when dry  |
//! | `transform-headers` | request, response    | set / remove headers                |
//! | `assign-attributes` | all                  | write context attributes            |
//! | `assign-content`    | all                  | replace the payload                 |
//! | `log-payload`       | request, response    | log the body through `tracing`      |

pub mod assign_attributes;
pub mod assign_content;
pub mod log_payload;
pub mod rate_limit;
pub mod transform_headers;

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::policy::registry::PolicyRegistry;
use crate::policy::{Policy, PolicyError};

pub use assign_attributes::AssignAttributesPolicy;
pub use assign_content::AssignContentPolicy;
pub use log_payload::LogPayloadPolicy;
pub use rate_limit::RateLimitPolicy;
pub use transform_headers::TransformHeadersPolicy;

/// Register every built-in policy.
pub fn register_all(registry: &mut PolicyRegistry) {
    registry.register(rate_limit::ID, |config: &Value| -> Result<Arc<dyn Policy>, PolicyError> {
        Ok(Arc::new(RateLimitPolicy::new(parse(rate_limit::ID, config)?)))
    });
    registry.register(transform_headers::ID, |config: &Value| -> Result<Arc<dyn Policy>, PolicyError> {
        Ok(Arc::new(TransformHeadersPolicy::new(parse(transform_headers::ID, config)?)?))
    });
    registry.register(assign_attributes::ID, |config: &Value| -> Result<Arc<dyn Policy>, PolicyError> {
        Ok(Arc::new(AssignAttributesPolicy::new(parse(assign_attributes::ID, config)?)))
    });
    registry.register(assign_content::ID, |config: &Value| -> Result<Arc<dyn Policy>, PolicyError> {
        Ok(Arc::new(AssignContentPolicy::new(parse(assign_content::ID, config)?)?))
    });
    registry.register(log_payload::ID, |config: &Value| -> Result<Arc<dyn Policy>, PolicyError> {
        Ok(Arc::new(LogPayloadPolicy::new(parse(log_payload::ID, config)?)))
    });
}

/// Deserialize a policy configuration; `null` means all defaults.
fn parse<T: DeserializeOwned + Default>(policy: &str, config: &Value) -> Result<T, PolicyError> {
    if config.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(config.clone()).map_err(|e| PolicyError::invalid_configuration(policy, e))
}
