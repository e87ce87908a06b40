//! Endpoint group management.
//!
//! # Responsibilities
//! - Manage the endpoint groups of one API
//! - Resolve endpoint criteria (endpoint name, group name, or first group)
//! - Flip endpoint availability and refresh the owning group's strategy
//! - Feed passive and active health results into endpoint state

use std::sync::{Arc, Mutex, PoisonError};

use crate::config::{EndpointGroupConfig, HealthCheckConfig};
use crate::load_balancer::endpoint::EndpointError;
use crate::load_balancer::{create_strategy, LoadBalancerStrategy, ManagedEndpoint};

/// Which endpoint a request wants.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EndpointCriteria {
    /// An endpoint name or a group name. Endpoint names take precedence.
    pub name: Option<String>,
}

impl EndpointCriteria {
    pub fn any() -> Self {
        Self::default()
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
        }
    }
}

/// One endpoint group and its strategy.
#[derive(Debug)]
pub struct EndpointGroup {
    name: String,
    endpoints: Vec<Arc<ManagedEndpoint>>,
    strategy: Box<dyn LoadBalancerStrategy>,
    /// Serializes computing the available subset and storing it, so the last
    /// store always reflects every availability flip before it.
    refresh_lock: Mutex<()>,
}

impl EndpointGroup {
    fn new(config: &EndpointGroupConfig) -> Result<Self, EndpointError> {
        let endpoints = config
            .endpoints
            .iter()
            .map(|e| ManagedEndpoint::from_config(&config.name, e).map(Arc::new))
            .collect::<Result<Vec<_>, _>>()?;

        let group = Self {
            name: config.name.clone(),
            strategy: create_strategy(config.load_balancer, Vec::new()),
            endpoints,
            refresh_lock: Mutex::new(()),
        };
        group.refresh();
        Ok(group)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn endpoints(&self) -> &[Arc<ManagedEndpoint>] {
        &self.endpoints
    }

    /// Hand the available subset to the strategy.
    fn refresh(&self) {
        let _guard = self.refresh_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let available: Vec<_> = self
            .endpoints
            .iter()
            .filter(|e| e.is_available())
            .cloned()
            .collect();
        tracing::debug!(
            group = %self.name,
            available = available.len(),
            total = self.endpoints.len(),
            "Refreshing endpoint group"
        );
        self.strategy.refresh(available);
    }
}

/// Health thresholds for passive and active reports.
#[derive(Debug, Clone, Copy)]
struct Thresholds {
    healthy: usize,
    unhealthy: usize,
}

/// Manages the endpoint groups of an API.
#[derive(Debug)]
pub struct EndpointManager {
    groups: Vec<EndpointGroup>,
    thresholds: Thresholds,
}

impl EndpointManager {
    /// Create a new endpoint manager from configuration.
    pub fn new(
        groups: &[EndpointGroupConfig],
        health: &HealthCheckConfig,
    ) -> Result<Self, EndpointError> {
        let groups = groups
            .iter()
            .map(EndpointGroup::new)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            groups,
            thresholds: Thresholds {
                healthy: health.healthy_threshold.max(1),
                unhealthy: health.unhealthy_threshold.max(1),
            },
        })
    }

    pub fn groups(&self) -> &[EndpointGroup] {
        &self.groups
    }

    /// Select an endpoint for `criteria`.
    pub fn next(&self, criteria: &EndpointCriteria) -> Option<Arc<ManagedEndpoint>> {
        let Some(name) = criteria.name.as_deref() else {
            let group = self.groups.first()?;
            return self.next_in(group);
        };

        if let Some(endpoint) = self.find(name) {
            if endpoint.is_available() {
                return Some(endpoint);
            }
            tracing::debug!(endpoint = %name, "Requested endpoint is not available");
            return None;
        }

        match self.groups.iter().find(|g| g.name == name) {
            Some(group) => self.next_in(group),
            None => {
                tracing::debug!(criteria = %name, "No endpoint or group matches criteria");
                None
            }
        }
    }

    fn next_in(&self, group: &EndpointGroup) -> Option<Arc<ManagedEndpoint>> {
        let selected = group.strategy.next();
        if selected.is_none() {
            tracing::debug!(group = %group.name, endpoint_count = group.endpoints.len(), "No available endpoint in group");
        }
        selected
    }

    /// Find an endpoint by name across every group.
    pub fn find(&self, name: &str) -> Option<Arc<ManagedEndpoint>> {
        self.groups
            .iter()
            .flat_map(|g| g.endpoints.iter())
            .find(|e| e.name() == name)
            .cloned()
    }

    /// Exclude an endpoint from selection.
    pub fn disable(&self, endpoint: &ManagedEndpoint) {
        if endpoint.set_enabled(false) {
            tracing::info!(endpoint = %endpoint.name(), group = %endpoint.group(), "Endpoint disabled");
            self.refresh_group(endpoint.group());
        }
    }

    /// Make a disabled endpoint selectable again.
    pub fn enable(&self, endpoint: &ManagedEndpoint) {
        if !endpoint.set_enabled(true) {
            tracing::info!(endpoint = %endpoint.name(), group = %endpoint.group(), "Endpoint enabled");
            self.refresh_group(endpoint.group());
        }
    }

    /// Record a successful call or probe.
    pub fn report_success(&self, endpoint: &ManagedEndpoint) {
        if endpoint.mark_success(self.thresholds.healthy) {
            tracing::info!(endpoint = %endpoint.name(), target = %endpoint.target(), "Endpoint is healthy");
            self.refresh_group(endpoint.group());
        }
    }

    /// Record a failed call or probe.
    pub fn report_failure(&self, endpoint: &ManagedEndpoint) {
        if endpoint.mark_failure(self.thresholds.unhealthy) {
            tracing::warn!(endpoint = %endpoint.name(), target = %endpoint.target(), "Endpoint is unhealthy");
            self.refresh_group(endpoint.group());
        }
    }

    /// Return a list of all endpoints (for health checking).
    pub fn all_endpoints(&self) -> Vec<Arc<ManagedEndpoint>> {
        self.groups
            .iter()
            .flat_map(|g| g.endpoints.iter())
            .cloned()
            .collect()
    }

    fn refresh_group(&self, name: &str) {
        if let Some(group) = self.groups.iter().find(|g| g.name == name) {
            group.refresh();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EndpointConfig;
    use crate::load_balancer::LoadBalancerType;

    fn endpoint(name: &str, port: u16) -> EndpointConfig {
        EndpointConfig {
            name: name.to_string(),
            target: format!("http://127.0.0.1:{}", port),
            ..EndpointConfig::default()
        }
    }

    fn manager() -> EndpointManager {
        let groups = vec![
            EndpointGroupConfig {
                name: "primary".to_string(),
                load_balancer: LoadBalancerType::RoundRobin,
                endpoints: vec![endpoint("a", 9001), endpoint("b", 9002)],
            },
            EndpointGroupConfig {
                name: "backup".to_string(),
                load_balancer: LoadBalancerType::RoundRobin,
                endpoints: vec![endpoint("c", 9003)],
            },
        ];
        let health = HealthCheckConfig {
            unhealthy_threshold: 2,
            healthy_threshold: 1,
            ..HealthCheckConfig::default()
        };
        EndpointManager::new(&groups, &health).unwrap()
    }

    #[test]
    fn test_next_uses_first_group() {
        let m = manager();
        let first = m.next(&EndpointCriteria::any()).unwrap();
        let second = m.next(&EndpointCriteria::any()).unwrap();
        assert_eq!(first.name(), "a");
        assert_eq!(second.name(), "b");
    }

    #[test]
    fn test_next_by_endpoint_and_group_name() {
        let m = manager();
        assert_eq!(m.next(&EndpointCriteria::named("b")).unwrap().name(), "b");
        assert_eq!(m.next(&EndpointCriteria::named("backup")).unwrap().name(), "c");
        assert!(m.next(&EndpointCriteria::named("UNKNOWN")).is_none());
    }

    #[test]
    fn test_disabled_endpoint_comes_back_after_enable() {
        let m = manager();
        let criteria = EndpointCriteria::named("a");
        let a = m.next(&criteria).unwrap();

        m.disable(&a);
        assert!(m.next(&criteria).is_none());
        for _ in 0..4 {
            assert_eq!(m.next(&EndpointCriteria::any()).unwrap().name(), "b");
        }

        m.enable(&a);
        assert!(m.next(&criteria).is_some());
    }

    #[test]
    fn test_passive_failures_exclude_endpoint() {
        let m = manager();
        let c = m.find("c").unwrap();
        m.report_failure(&c);
        assert!(m.next(&EndpointCriteria::named("backup")).is_some());
        m.report_failure(&c);
        assert!(m.next(&EndpointCriteria::named("backup")).is_none());

        m.report_success(&c);
        assert!(m.next(&EndpointCriteria::named("backup")).is_some());
    }

    #[test]
    fn test_concurrent_failures_all_leave_rotation() {
        let endpoints: Vec<EndpointConfig> = (0..16).map(|i| endpoint(&format!("e{i}"), 9100 + i)).collect();
        let groups = vec![EndpointGroupConfig {
            name: "wide".to_string(),
            load_balancer: LoadBalancerType::RoundRobin,
            endpoints,
        }];
        let health = HealthCheckConfig {
            unhealthy_threshold: 1,
            ..HealthCheckConfig::default()
        };

        for _ in 0..50 {
            let m = EndpointManager::new(&groups, &health).unwrap();
            let all = m.all_endpoints();
            let barrier = std::sync::Barrier::new(all.len());
            std::thread::scope(|scope| {
                for endpoint in &all {
                    let (m, barrier) = (&m, &barrier);
                    scope.spawn(move || {
                        barrier.wait();
                        m.report_failure(endpoint);
                    });
                }
            });
            assert!(m.next(&EndpointCriteria::any()).is_none());
        }
    }

    #[test]
    fn test_invalid_target_is_rejected() {
        let groups = vec![EndpointGroupConfig {
            name: "g".to_string(),
            load_balancer: LoadBalancerType::Random,
            endpoints: vec![EndpointConfig {
                name: "bad".to_string(),
                target: "not a url".to_string(),
                ..EndpointConfig::default()
            }],
        }];
        assert!(EndpointManager::new(&groups, &HealthCheckConfig::default()).is_err());
    }
}
