//! Weighted random load balancing strategy.
//!
//! Picks with probability proportional to weight. Zero-weight endpoints are
//! never chosen unless every weight is zero, in which case the pick is
//! uniform.

use std::sync::Arc;

use arc_swap::ArcSwap;
use rand::Rng;

use crate::load_balancer::{LoadBalancerStrategy, ManagedEndpoint};

#[derive(Debug, Default)]
struct WeightTable {
    endpoints: Vec<Arc<ManagedEndpoint>>,
    /// Running weight totals, one per endpoint.
    cumulative: Vec<u64>,
    total: u64,
}

impl WeightTable {
    fn new(endpoints: Vec<Arc<ManagedEndpoint>>) -> Self {
        let mut total = 0u64;
        let cumulative = endpoints
            .iter()
            .map(|e| {
                total += u64::from(e.weight());
                total
            })
            .collect();
        Self {
            endpoints,
            cumulative,
            total,
        }
    }
}

#[derive(Debug)]
pub struct WeightedRandomStrategy {
    table: ArcSwap<WeightTable>,
}

impl WeightedRandomStrategy {
    pub fn new(endpoints: Vec<Arc<ManagedEndpoint>>) -> Self {
        Self {
            table: ArcSwap::from_pointee(WeightTable::new(endpoints)),
        }
    }
}

impl LoadBalancerStrategy for WeightedRandomStrategy {
    fn next(&self) -> Option<Arc<ManagedEndpoint>> {
        let table = self.table.load();
        if table.endpoints.is_empty() {
            return None;
        }

        let mut rng = rand::thread_rng();
        if table.total == 0 {
            return Some(table.endpoints[rng.gen_range(0..table.endpoints.len())].clone());
        }

        let point = rng.gen_range(0..table.total);
        let index = table.cumulative.partition_point(|&c| c <= point);
        table.endpoints.get(index).cloned()
    }

    fn refresh(&self, endpoints: Vec<Arc<ManagedEndpoint>>) {
        self.table.store(Arc::new(WeightTable::new(endpoints)));
    }

    fn endpoints(&self) -> Vec<Arc<ManagedEndpoint>> {
        self.table.load().endpoints.clone()
    }
}
