//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! Flow resolved → endpoint criteria identified
//!     → manager.rs (pick the endpoint group)
//!     → Apply the group's strategy:
//!         - round_robin.rs (rotate through endpoints)
//!         - random.rs (uniform pick)
//!         - weighted_random.rs (pick proportional to weight)
//!         - weighted_round_robin.rs (rotate, honoring weights per round)
//!     → Return managed endpoint or None
//! ```
//!
//! # Design Decisions
//! - One strategy instance per endpoint group, shared by every request
//! - Strategies only see available endpoints; the manager refreshes them
//! - `refresh` swaps a whole snapshot, so `next` never sees a torn list
//! - Unknown strategy type falls back to round robin

pub mod endpoint;
pub mod manager;
pub mod random;
pub mod round_robin;
pub mod weighted_random;
pub mod weighted_round_robin;

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize};

pub use endpoint::{HealthState, ManagedEndpoint};
pub use manager::{EndpointCriteria, EndpointManager};
pub use random::RandomStrategy;
pub use round_robin::RoundRobinStrategy;
pub use weighted_random::WeightedRandomStrategy;
pub use weighted_round_robin::{WeightDistribution, WeightDistributions, WeightedRoundRobinStrategy};

/// Endpoint selection strategy of one endpoint group.
pub trait LoadBalancerStrategy: Send + Sync + fmt::Debug {
    /// Select the next endpoint, or None when the list is empty.
    fn next(&self) -> Option<Arc<ManagedEndpoint>>;

    /// Replace the endpoint list and reset any selection state.
    fn refresh(&self, endpoints: Vec<Arc<ManagedEndpoint>>);

    /// Current endpoint snapshot.
    fn endpoints(&self) -> Vec<Arc<ManagedEndpoint>>;
}

/// Configured strategy type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadBalancerType {
    #[default]
    RoundRobin,
    Random,
    WeightedRandom,
    WeightedRoundRobin,
}

impl LoadBalancerType {
    /// Parse a type name; unknown names fall back to round robin.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "random" => LoadBalancerType::Random,
            "weighted_random" => LoadBalancerType::WeightedRandom,
            "weighted_round_robin" => LoadBalancerType::WeightedRoundRobin,
            "round_robin" => LoadBalancerType::RoundRobin,
            other => {
                tracing::warn!(load_balancer = %other, "Unknown load balancer type, using round_robin");
                LoadBalancerType::RoundRobin
            }
        }
    }
}

impl<'de> Deserialize<'de> for LoadBalancerType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Ok(Self::parse(&value))
    }
}

/// Build the strategy for `kind` over `endpoints`.
pub fn create_strategy(
    kind: LoadBalancerType,
    endpoints: Vec<Arc<ManagedEndpoint>>,
) -> Box<dyn LoadBalancerStrategy> {
    match kind {
        LoadBalancerType::RoundRobin => Box::new(RoundRobinStrategy::new(endpoints)),
        LoadBalancerType::Random => Box::new(RandomStrategy::new(endpoints)),
        LoadBalancerType::WeightedRandom => Box::new(WeightedRandomStrategy::new(endpoints)),
        LoadBalancerType::WeightedRoundRobin => Box::new(WeightedRoundRobinStrategy::new(endpoints)),
    }
}
