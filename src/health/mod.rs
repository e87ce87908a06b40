//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! Active health checks (active.rs):
//!     Periodic timer
//!     → Probe each endpoint of each deployed API
//!     → EndpointManager::report_success / report_failure
//!
//! Passive health checks (passive.rs):
//!     Invocation outcome observed
//!     → Classified as success or failure
//!     → EndpointManager::report_success / report_failure
//!
//! State machine (load_balancer::endpoint):
//!     Healthy ←→ Unhealthy
//!     With thresholds to prevent flapping
//!     A transition refreshes the group's strategy
//! ```
//!
//! # Design Decisions
//! - Active and passive checks are complementary
//! - State transitions require consecutive successes/failures
//! - Health state is per-endpoint, not per-group

pub mod active;
pub mod passive;

pub use active::HealthMonitor;
