//! Weighted round-robin load balancing strategy.
//!
//! # Selection
//! Each endpoint gets `weight` picks per round. A pick scans from the cursor
//! in list order, wrapping, for the first endpoint with picks remaining,
//! then moves the cursor past it. When a round is exhausted the weights are
//! restored and the cursor returns to the start of the list. Weights
//! `[2, 1]` therefore yield `0, 1, 0` per round.
//!
//! # Design Decisions
//! - The endpoint list is an atomically swapped snapshot
//! - Only the round bookkeeping sits behind a mutex
//! - All-zero weights degrade to plain rotation

use std::sync::{Arc, Mutex, PoisonError};

use arc_swap::ArcSwap;

use crate::load_balancer::{LoadBalancerStrategy, ManagedEndpoint};

/// Weight and picks left in the current round for one endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeightDistribution {
    pub weight: u32,
    pub remaining: u32,
}

/// Per-round bookkeeping of a weighted group.
///
/// `remaining_sum` always equals the sum of every `remaining`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeightDistributions {
    weight_sum: u64,
    remaining_sum: u64,
    distributions: Vec<WeightDistribution>,
}

impl WeightDistributions {
    pub fn new(weights: impl IntoIterator<Item = u32>) -> Self {
        let distributions: Vec<WeightDistribution> = weights
            .into_iter()
            .map(|weight| WeightDistribution {
                weight,
                remaining: weight,
            })
            .collect();
        let weight_sum = distributions.iter().map(|d| u64::from(d.weight)).sum();
        Self {
            weight_sum,
            remaining_sum: weight_sum,
            distributions,
        }
    }

    /// Restore every `remaining` to its weight.
    pub fn reset(&mut self) {
        for d in &mut self.distributions {
            d.remaining = d.weight;
        }
        self.remaining_sum = self.weight_sum;
    }

    /// Consume one pick of `index`. Returns false if it had none left.
    pub fn take(&mut self, index: usize) -> bool {
        match self.distributions.get_mut(index) {
            Some(d) if d.remaining > 0 => {
                d.remaining -= 1;
                self.remaining_sum -= 1;
                true
            }
            _ => false,
        }
    }

    pub fn weight_sum(&self) -> u64 {
        self.weight_sum
    }

    pub fn remaining_sum(&self) -> u64 {
        self.remaining_sum
    }

    pub fn distributions(&self) -> &[WeightDistribution] {
        &self.distributions
    }
}

#[derive(Debug)]
struct Round {
    distributions: WeightDistributions,
    cursor: usize,
}

#[derive(Debug)]
struct Snapshot {
    endpoints: Vec<Arc<ManagedEndpoint>>,
    round: Mutex<Round>,
}

impl Snapshot {
    fn new(endpoints: Vec<Arc<ManagedEndpoint>>) -> Self {
        let distributions = WeightDistributions::new(endpoints.iter().map(|e| e.weight()));
        Self {
            endpoints,
            round: Mutex::new(Round {
                distributions,
                cursor: 0,
            }),
        }
    }
}

#[derive(Debug)]
pub struct WeightedRoundRobinStrategy {
    snapshot: ArcSwap<Snapshot>,
}

impl WeightedRoundRobinStrategy {
    pub fn new(endpoints: Vec<Arc<ManagedEndpoint>>) -> Self {
        Self {
            snapshot: ArcSwap::from_pointee(Snapshot::new(endpoints)),
        }
    }

    /// Copy of the current round bookkeeping.
    pub fn distributions(&self) -> WeightDistributions {
        let snapshot = self.snapshot.load();
        let round = snapshot.round.lock().unwrap_or_else(PoisonError::into_inner);
        round.distributions.clone()
    }
}

impl LoadBalancerStrategy for WeightedRoundRobinStrategy {
    fn next(&self) -> Option<Arc<ManagedEndpoint>> {
        let snapshot = self.snapshot.load();
        let len = snapshot.endpoints.len();
        if len == 0 {
            return None;
        }

        let mut round = snapshot.round.lock().unwrap_or_else(PoisonError::into_inner);

        if round.distributions.weight_sum() == 0 {
            let index = round.cursor % len;
            round.cursor = (index + 1) % len;
            return Some(snapshot.endpoints[index].clone());
        }

        if round.distributions.remaining_sum() == 0 {
            round.distributions.reset();
            round.cursor = 0;
        }

        let start = round.cursor;
        for offset in 0..len {
            let index = (start + offset) % len;
            if round.distributions.take(index) {
                round.cursor = (index + 1) % len;
                return Some(snapshot.endpoints[index].clone());
            }
        }
        None
    }

    fn refresh(&self, endpoints: Vec<Arc<ManagedEndpoint>>) {
        self.snapshot.store(Arc::new(Snapshot::new(endpoints)));
    }

    fn endpoints(&self) -> Vec<Arc<ManagedEndpoint>> {
        self.snapshot.load().endpoints.clone()
    }
}
