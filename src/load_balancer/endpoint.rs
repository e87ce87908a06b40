//! Managed endpoint abstraction.
//!
//! # Responsibilities
//! - Represent a single backend target of an endpoint group
//! - Carry the selection weight used by weighted strategies
//! - Track the administrative enabled flag (disable/enable)
//! - Track passive health state (Healthy/Unhealthy) from consecutive results

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};

use thiserror::Error;
use url::Url;

use crate::config::EndpointConfig;

/// Health state of an endpoint.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthState {
    Unknown = 0,
    Healthy = 1,
    Unhealthy = 2,
}

impl From<u8> for HealthState {
    fn from(val: u8) -> Self {
        match val {
            1 => HealthState::Healthy,
            2 => HealthState::Unhealthy,
            _ => HealthState::Unknown,
        }
    }
}

/// Errors raised while building an endpoint from configuration.
#[derive(Debug, Error)]
pub enum EndpointError {
    #[error("endpoint '{endpoint}' has an invalid target '{target}': {source}")]
    InvalidTarget {
        endpoint: String,
        target: String,
        #[source]
        source: url::ParseError,
    },
}

/// A weighted, health-tracked backend target.
pub struct ManagedEndpoint {
    name: String,
    group: String,
    target: Url,
    weight: u32,

    enabled: AtomicBool,
    /// Current health state (0=Unknown, 1=Healthy, 2=Unhealthy).
    state: AtomicU8,
    consecutive_failures: AtomicUsize,
    consecutive_successes: AtomicUsize,
}

impl ManagedEndpoint {
    pub fn new(name: impl Into<String>, group: impl Into<String>, target: Url, weight: u32) -> Self {
        Self {
            name: name.into(),
            group: group.into(),
            target,
            weight,
            enabled: AtomicBool::new(true),
            state: AtomicU8::new(HealthState::Unknown as u8),
            consecutive_failures: AtomicUsize::new(0),
            consecutive_successes: AtomicUsize::new(0),
        }
    }

    /// Build an endpoint of `group` from its configuration.
    pub fn from_config(group: &str, config: &EndpointConfig) -> Result<Self, EndpointError> {
        let target = Url::parse(&config.target).map_err(|source| EndpointError::InvalidTarget {
            endpoint: config.name.clone(),
            target: config.target.clone(),
            source,
        })?;
        let endpoint = Self::new(config.name.clone(), group, target, config.weight);
        endpoint.enabled.store(config.enabled, Ordering::Relaxed);
        Ok(endpoint)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn target(&self) -> &Url {
        &self.target
    }

    pub fn weight(&self) -> u32 {
        self.weight
    }

    pub fn health(&self) -> HealthState {
        HealthState::from(self.state.load(Ordering::Relaxed))
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Returns the previous value.
    pub(crate) fn set_enabled(&self, enabled: bool) -> bool {
        self.enabled.swap(enabled, Ordering::Relaxed)
    }

    /// Enabled and not known to be unhealthy.
    pub fn is_available(&self) -> bool {
        self.is_enabled() && self.health() != HealthState::Unhealthy
    }

    // --- Health Logic ---

    /// Report a successful request/check.
    ///
    /// Returns true when the endpoint transitioned to Healthy.
    pub fn mark_success(&self, healthy_threshold: usize) -> bool {
        self.consecutive_failures.store(0, Ordering::Relaxed);

        if self.health() == HealthState::Healthy {
            return false;
        }

        let successes = self.consecutive_successes.fetch_add(1, Ordering::Relaxed) + 1;
        if successes >= healthy_threshold {
            let previous = self.state.swap(HealthState::Healthy as u8, Ordering::Relaxed);
            self.consecutive_successes.store(0, Ordering::Relaxed);
            return previous != HealthState::Healthy as u8;
        }
        false
    }

    /// Report a failed request/check.
    ///
    /// Returns true when the endpoint transitioned to Unhealthy.
    pub fn mark_failure(&self, unhealthy_threshold: usize) -> bool {
        self.consecutive_successes.store(0, Ordering::Relaxed);

        if self.health() == HealthState::Unhealthy {
            return false;
        }

        let failures = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
        if failures >= unhealthy_threshold {
            let previous = self.state.swap(HealthState::Unhealthy as u8, Ordering::Relaxed);
            self.consecutive_failures.store(0, Ordering::Relaxed);
            return previous != HealthState::Unhealthy as u8;
        }
        false
    }
}

impl fmt::Debug for ManagedEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagedEndpoint")
            .field("name", &self.name)
            .field("group", &self.group)
            .field("target", &self.target.as_str())
            .field("weight", &self.weight)
            .field("enabled", &self.is_enabled())
            .field("health", &self.health())
            .finish()
    }
}
