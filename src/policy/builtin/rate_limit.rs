//! Token bucket rate limiting policy.
//!
//! Buckets are keyed by client-supplied values, so idle ones are swept every
//! `SWEEP_EVERY` checks. A bucket idle long enough to have refilled is
//! indistinguishable from a fresh one, which makes eviction lossless.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use axum::http::{HeaderValue, StatusCode};
use dashmap::DashMap;
use serde::Deserialize;

use crate::policy::context::{ExecutionContext, HttpExecutionContext, MessageExecutionContext};
use crate::policy::{Policy, PolicyError};

pub const ID: &str = "rate-limit";

/// Checks between two sweeps of idle buckets.
const SWEEP_EVERY: u64 = 1024;

/// Longest time an idle bucket is kept, for limits that refill slowly or never.
const MAX_IDLE: Duration = Duration::from_secs(3600);

/// What requests share a bucket.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case", tag = "type", content = "name")]
pub enum RateLimitKey {
    /// One bucket per client IP.
    #[default]
    RemoteAddress,
    /// One bucket per value of the named header.
    Header(String),
    /// A single bucket for every request.
    Global,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub requests_per_second: f64,
    pub burst_size: f64,
    pub key: RateLimitKey,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: 100.0,
            burst_size: 50.0,
            key: RateLimitKey::RemoteAddress,
        }
    }
}

/// A simple token bucket.
#[derive(Debug)]
struct TokenBucket {
    tokens: f64,
    last_update: Instant,
}

impl TokenBucket {
    fn new(capacity: f64) -> Self {
        Self {
            tokens: capacity,
            last_update: Instant::now(),
        }
    }

    fn try_acquire(&mut self, capacity: f64, refill_rate: f64) -> bool {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_update).as_secs_f64();

        self.tokens = (self.tokens + elapsed * refill_rate).min(capacity);
        self.last_update = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

#[derive(Debug)]
pub struct RateLimitPolicy {
    config: RateLimitConfig,
    buckets: DashMap<String, TokenBucket>,
    idle_after: Duration,
    checks: AtomicU64,
}

impl RateLimitPolicy {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            idle_after: idle_after(&config),
            config,
            buckets: DashMap::new(),
            checks: AtomicU64::new(0),
        }
    }

    /// Drop buckets untouched for longer than their refill time.
    fn evict_idle(&self, now: Instant) -> usize {
        let before = self.buckets.len();
        self.buckets
            .retain(|_, bucket| now.saturating_duration_since(bucket.last_update) < self.idle_after);
        let evicted = before.saturating_sub(self.buckets.len());
        if evicted > 0 {
            tracing::debug!(evicted, remaining = self.buckets.len(), "Evicted idle rate limit buckets");
        }
        evicted
    }

    fn key(&self, ctx: &ExecutionContext) -> String {
        match &self.config.key {
            RateLimitKey::RemoteAddress => ctx
                .request()
                .remote_address
                .map(|a| a.ip().to_string())
                .unwrap_or_else(|| "unknown".to_string()),
            RateLimitKey::Header(name) => ctx.request().header(name).unwrap_or("").to_string(),
            RateLimitKey::Global => String::new(),
        }
    }

    /// Take one token for the request; interrupt with 429 when none is left.
    fn check(&self, ctx: &mut ExecutionContext) {
        let key = self.key(ctx);
        let allowed = self
            .buckets
            .entry(key.clone())
            .or_insert_with(|| TokenBucket::new(self.config.burst_size))
            .try_acquire(self.config.burst_size, self.config.requests_per_second);

        if self.checks.fetch_add(1, Ordering::Relaxed) % SWEEP_EVERY == SWEEP_EVERY - 1 {
            self.evict_idle(Instant::now());
        }

        if !allowed {
            tracing::warn!(client = %key, api = %ctx.metrics().api_id, "Rate limit exceeded");
            ctx.interrupt_with(StatusCode::TOO_MANY_REQUESTS, "Rate limit exceeded");
            ctx.response_mut()
                .headers
                .insert("retry-after", HeaderValue::from_static("1"));
        }
    }
}

/// Time an empty bucket needs to refill completely.
fn idle_after(config: &RateLimitConfig) -> Duration {
    if config.requests_per_second <= 0.0 {
        return MAX_IDLE;
    }
    Duration::try_from_secs_f64(config.burst_size / config.requests_per_second)
        .map_or(MAX_IDLE, |refill| refill.min(MAX_IDLE))
}

#[async_trait]
impl Policy for RateLimitPolicy {
    fn id(&self) -> &str {
        ID
    }

    async fn on_request(&self, ctx: &mut HttpExecutionContext<'_>) -> Result<(), PolicyError> {
        self.check(ctx);
        Ok(())
    }

    async fn on_message_request(&self, ctx: &mut MessageExecutionContext<'_>) -> Result<(), PolicyError> {
        self.check(ctx);
        Ok(())
    }
}
