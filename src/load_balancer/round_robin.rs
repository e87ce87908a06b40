//! Round-robin load balancing strategy.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::load_balancer::{LoadBalancerStrategy, ManagedEndpoint};

#[derive(Debug)]
struct Rotation {
    endpoints: Vec<Arc<ManagedEndpoint>>,
    counter: AtomicUsize,
}

/// Round-robin selector.
/// The counter lives next to the endpoint list so a refresh resets both at once.
#[derive(Debug)]
pub struct RoundRobinStrategy {
    rotation: ArcSwap<Rotation>,
}

impl RoundRobinStrategy {
    pub fn new(endpoints: Vec<Arc<ManagedEndpoint>>) -> Self {
        Self {
            rotation: ArcSwap::from_pointee(Rotation {
                endpoints,
                counter: AtomicUsize::new(0),
            }),
        }
    }
}

impl LoadBalancerStrategy for RoundRobinStrategy {
    fn next(&self) -> Option<Arc<ManagedEndpoint>> {
        let rotation = self.rotation.load();
        if rotation.endpoints.is_empty() {
            return None;
        }

        let index = rotation.counter.fetch_add(1, Ordering::Relaxed) % rotation.endpoints.len();
        Some(rotation.endpoints[index].clone())
    }

    fn refresh(&self, endpoints: Vec<Arc<ManagedEndpoint>>) {
        self.rotation.store(Arc::new(Rotation {
            endpoints,
            counter: AtomicUsize::new(0),
        }));
    }

    fn endpoints(&self) -> Vec<Arc<ManagedEndpoint>> {
        self.rotation.load().endpoints.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load_balancer::test_support::{endpoints, names};

    #[test]
    fn test_round_robin() {
        let lb = RoundRobinStrategy::new(endpoints(&[1, 1, 1]));
        let picks: Vec<_> = (0..7).filter_map(|_| lb.next()).collect();
        assert_eq!(names(&picks), vec!["e0", "e1", "e2", "e0", "e1", "e2", "e0"]);
    }

    #[test]
    fn test_refresh_restarts_cycle() {
        let lb = RoundRobinStrategy::new(endpoints(&[1, 1, 1]));
        lb.next();
        lb.next();
        lb.refresh(endpoints(&[1, 1]));
        let picks: Vec<_> = (0..3).filter_map(|_| lb.next()).collect();
        assert_eq!(names(&picks), vec!["e0", "e1", "e0"]);
    }

    #[test]
    fn test_empty_list_yields_none() {
        let lb = RoundRobinStrategy::new(Vec::new());
        assert!(lb.next().is_none());
    }

    #[test]
    fn test_concurrent_picks_are_even() {
        let lb = Arc::new(RoundRobinStrategy::new(endpoints(&[1, 1, 1, 1])));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let lb = lb.clone();
                std::thread::spawn(move || (0..100).filter_map(|_| lb.next()).collect::<Vec<_>>())
            })
            .collect();

        let mut counts = std::collections::HashMap::new();
        for handle in handles {
            for ep in handle.join().unwrap() {
                *counts.entry(ep.name().to_string()).or_insert(0) += 1;
            }
        }
        assert_eq!(counts.len(), 4);
        assert!(counts.values().all(|c| *c == 100));
    }
}
