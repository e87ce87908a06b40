//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check uniqueness (API ids, entrypoints, group and endpoint names)
//! - Validate value ranges (timeouts > 0, thresholds > 0, addresses parse)
//! - Endpoint targets are plain `http` URLs; the invoker carries no TLS
//! - Compile flow paths, mapped paths and conditions ahead of deployment
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;

use thiserror::Error;
use url::Url;

use crate::config::schema::{ApiConfig, GatewayConfig};
use crate::policy::condition::Condition;
use crate::routing::pattern::PathPattern;

/// One semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("invalid listener bind address '{0}'")]
    InvalidBindAddress(String),

    #[error("timeout '{0}' must be greater than zero")]
    ZeroTimeout(&'static str),

    #[error("health check '{0}' must be greater than zero")]
    InvalidHealthCheck(&'static str),

    #[error("API id must not be empty")]
    EmptyApiId,

    #[error("duplicate API id '{0}'")]
    DuplicateApiId(String),

    #[error("API '{api}': context path '{path}' must start with '/'")]
    InvalidContextPath { api: String, path: String },

    #[error("API '{api}': entrypoint '{entrypoint}' is already used by another API")]
    DuplicateEntrypoint { api: String, entrypoint: String },

    #[error("API '{api}': no endpoint group declared")]
    NoEndpointGroup { api: String },

    #[error("API '{api}': endpoint group '{group}' has no endpoints")]
    EmptyEndpointGroup { api: String, group: String },

    #[error("API '{api}': duplicate endpoint group or endpoint name '{name}'")]
    DuplicateEndpointName { api: String, name: String },

    #[error("API '{api}': endpoint '{endpoint}' has an invalid target '{target}'")]
    InvalidEndpointTarget {
        api: String,
        endpoint: String,
        target: String,
    },

    #[error("API '{api}': invalid path '{path}': {reason}")]
    InvalidPath {
        api: String,
        path: String,
        reason: String,
    },

    #[error("API '{api}': flow '{flow}' has an invalid condition '{condition}': {reason}")]
    InvalidCondition {
        api: String,
        flow: String,
        condition: String,
        reason: String,
    },
}

/// Validate a configuration, collecting every error.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidBindAddress(
            config.listener.bind_address.clone(),
        ));
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::ZeroTimeout("request_secs"));
    }
    if config.timeouts.connect_secs == 0 {
        errors.push(ValidationError::ZeroTimeout("connect_secs"));
    }

    let health = &config.health_check;
    if health.unhealthy_threshold == 0 {
        errors.push(ValidationError::InvalidHealthCheck("unhealthy_threshold"));
    }
    if health.healthy_threshold == 0 {
        errors.push(ValidationError::InvalidHealthCheck("healthy_threshold"));
    }
    if health.enabled && health.interval_secs == 0 {
        errors.push(ValidationError::InvalidHealthCheck("interval_secs"));
    }

    let mut ids = HashSet::new();
    let mut entrypoints = HashSet::new();
    for api in &config.apis {
        if api.id.trim().is_empty() {
            errors.push(ValidationError::EmptyApiId);
        } else if !ids.insert(api.id.as_str()) {
            errors.push(ValidationError::DuplicateApiId(api.id.clone()));
        }

        let entrypoint = format!(
            "{}{}",
            api.host.as_deref().unwrap_or("").to_lowercase(),
            api.context_path.trim_end_matches('/')
        );
        if !entrypoints.insert(entrypoint.clone()) {
            errors.push(ValidationError::DuplicateEntrypoint {
                api: api.id.clone(),
                entrypoint,
            });
        }

        validate_api(api, &mut errors);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_api(api: &ApiConfig, errors: &mut Vec<ValidationError>) {
    if !api.context_path.starts_with('/') {
        errors.push(ValidationError::InvalidContextPath {
            api: api.id.clone(),
            path: api.context_path.clone(),
        });
    }

    if api.endpoint_groups.is_empty() {
        errors.push(ValidationError::NoEndpointGroup {
            api: api.id.clone(),
        });
    }

    let mut names = HashSet::new();
    for group in &api.endpoint_groups {
        if !names.insert(group.name.as_str()) {
            errors.push(ValidationError::DuplicateEndpointName {
                api: api.id.clone(),
                name: group.name.clone(),
            });
        }
        if group.endpoints.is_empty() {
            errors.push(ValidationError::EmptyEndpointGroup {
                api: api.id.clone(),
                group: group.name.clone(),
            });
        }
        for endpoint in &group.endpoints {
            if !names.insert(endpoint.name.as_str()) {
                errors.push(ValidationError::DuplicateEndpointName {
                    api: api.id.clone(),
                    name: endpoint.name.clone(),
                });
            }
            let valid_target = Url::parse(&endpoint.target)
                .map(|u| u.scheme() == "http" && u.has_host())
                .unwrap_or(false);
            if !valid_target {
                errors.push(ValidationError::InvalidEndpointTarget {
                    api: api.id.clone(),
                    endpoint: endpoint.name.clone(),
                    target: endpoint.target.clone(),
                });
            }
        }
    }

    for flow in &api.flows {
        if let Err(e) = PathPattern::compile(&flow.path) {
            errors.push(ValidationError::InvalidPath {
                api: api.id.clone(),
                path: flow.path.clone(),
                reason: e.to_string(),
            });
        }

        let bindings = flow
            .request
            .iter()
            .chain(&flow.response)
            .chain(&flow.message_request)
            .chain(&flow.message_response);
        for condition in bindings.filter_map(|b| b.condition.as_deref()) {
            if let Err(e) = Condition::parse(condition) {
                errors.push(ValidationError::InvalidCondition {
                    api: api.id.clone(),
                    flow: flow.name.clone().unwrap_or_else(|| flow.path.clone()),
                    condition: condition.to_string(),
                    reason: e.to_string(),
                });
            }
        }
    }

    for alias in &api.mapped_paths {
        if let Err(e) = PathPattern::compile_prefix(alias) {
            errors.push(ValidationError::InvalidPath {
                api: api.id.clone(),
                path: alias.clone(),
                reason: e.to_string(),
            });
        }
    }
}
