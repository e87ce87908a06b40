//! Uniform random load balancing strategy.

use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::load_balancer::{LoadBalancerStrategy, ManagedEndpoint};

#[derive(Debug)]
pub struct RandomStrategy {
    endpoints: ArcSwap<Vec<Arc<ManagedEndpoint>>>,
}

impl RandomStrategy {
    pub fn new(endpoints: Vec<Arc<ManagedEndpoint>>) -> Self {
        Self {
            endpoints: ArcSwap::from_pointee(endpoints),
        }
    }
}

impl LoadBalancerStrategy for RandomStrategy {
    fn next(&self) -> Option<Arc<ManagedEndpoint>> {
        let endpoints = self.endpoints.load();
        if endpoints.is_empty() {
            return None;
        }
        Some(endpoints[fastrand::usize(..endpoints.len())].clone())
    }

    fn refresh(&self, endpoints: Vec<Arc<ManagedEndpoint>>) {
        self.endpoints.store(Arc::new(endpoints));
    }

    fn endpoints(&self) -> Vec<Arc<ManagedEndpoint>> {
        self.endpoints.load().to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load_balancer::test_support::endpoints;

    #[test]
    fn test_picks_stay_in_list() {
        let lb = RandomStrategy::new(endpoints(&[1, 1, 1]));
        let mut seen = std::collections::HashSet::new();
        for _ in 0..300 {
            seen.insert(lb.next().unwrap().name().to_string());
        }
        assert_eq!(seen.len(), 3);

        lb.refresh(endpoints(&[1]));
        for _ in 0..20 {
            assert_eq!(lb.next().unwrap().name(), "e0");
        }
    }
}
