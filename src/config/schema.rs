//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

use crate::load_balancer::LoadBalancerType;
use crate::routing::flow::PolicyBinding;
use crate::routing::resolver::FlowMode;

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Health check settings.
    pub health_check: HealthCheckConfig,

    /// Payload buffering limits.
    pub buffer: BufferConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Deployed API definitions.
    pub apis: Vec<ApiConfig>,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Backend connection establishment timeout in seconds.
    pub connect_secs: u64,

    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,

    /// Idle pooled backend connection timeout in seconds.
    pub idle_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 5,
            request_secs: 30,
            idle_secs: 60,
        }
    }
}

/// Health check configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthCheckConfig {
    /// Enable active health checks.
    pub enabled: bool,

    /// Health check interval in seconds.
    pub interval_secs: u64,

    /// Health check timeout in seconds.
    pub timeout_secs: u64,

    /// Path to probe on each endpoint target.
    pub path: String,

    /// Number of consecutive failures before marking unhealthy.
    pub unhealthy_threshold: usize,

    /// Number of consecutive successes before marking healthy.
    pub healthy_threshold: usize,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 10,
            timeout_secs: 5,
            path: "/health".to_string(),
            unhealthy_threshold: 3,
            healthy_threshold: 2,
        }
    }
}

/// Payload buffering configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BufferConfig {
    /// Largest body folded into memory. Bigger declared bodies stream.
    pub max_buffered_bytes: usize,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            max_buffered_bytes: 10 * 1024 * 1024,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Kind of API: request/response proxy or message API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiKind {
    #[default]
    Proxy,
    Message,
}

/// A deployed API.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiConfig {
    /// Unique API identifier for logging/metrics.
    pub id: String,

    /// Display name.
    #[serde(default)]
    pub name: Option<String>,

    /// Entrypoint path prefix (e.g., "/books").
    pub context_path: String,

    /// Host header to match (exact match, case-insensitive).
    #[serde(default)]
    pub host: Option<String>,

    #[serde(default)]
    pub kind: ApiKind,

    /// How matching flows are selected.
    #[serde(default)]
    pub flow_mode: FlowMode,

    /// Aliases recorded as the mapped path in request metrics.
    #[serde(default)]
    pub mapped_paths: Vec<String>,

    #[serde(default)]
    pub flows: Vec<FlowConfig>,

    #[serde(default)]
    pub endpoint_groups: Vec<EndpointGroupConfig>,
}

/// A flow: path template plus policies per phase.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FlowConfig {
    /// Flow name; defaults to the path template.
    pub name: Option<String>,

    /// Path template relative to the context path.
    pub path: String,

    /// HTTP methods the flow applies to. Empty means any.
    pub methods: Vec<String>,

    pub enabled: bool,

    pub request: Vec<PolicyBinding>,
    pub response: Vec<PolicyBinding>,
    pub message_request: Vec<PolicyBinding>,
    pub message_response: Vec<PolicyBinding>,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            name: None,
            path: "/".to_string(),
            methods: Vec::new(),
            enabled: true,
            request: Vec::new(),
            response: Vec::new(),
            message_request: Vec::new(),
            message_response: Vec::new(),
        }
    }
}

/// A named group of endpoints sharing one load balancer.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct EndpointGroupConfig {
    pub name: String,

    #[serde(default)]
    pub load_balancer: LoadBalancerType,

    #[serde(default)]
    pub endpoints: Vec<EndpointConfig>,
}

/// Endpoint configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EndpointConfig {
    /// Unique endpoint identifier.
    pub name: String,

    /// Base URL requests are forwarded to (e.g., "http://127.0.0.1:3000").
    pub target: String,

    /// Weight for weighted load balancing (default: 1).
    #[serde(default = "default_weight")]
    pub weight: u32,

    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            target: String::new(),
            weight: default_weight(),
            enabled: default_enabled(),
        }
    }
}

fn default_weight() -> u32 {
    1
}

fn default_enabled() -> bool {
    true
}
