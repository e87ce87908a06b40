//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → tracing events (structured fields, request id)
//!     → logging.rs (subscriber: pretty or JSON, EnvFilter)
//!
//! Pipeline produces one RequestMetrics per request:
//!     → metrics.rs record_request (counters, histograms)
//!     → Prometheus exporter (when installed by the binary)
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - Request ID flows through all subsystems
//! - Metrics are cheap (facade no-ops without a recorder)

pub mod logging;
pub mod metrics;
