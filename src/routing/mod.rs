//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (host, path, method)
//!     → router.rs (API lookup by host + context path)
//!     → matcher.rs (evaluate entrypoint conditions)
//!     → path info (path below the context path)
//!     → resolver.rs (select flows, best match or all matches)
//!     → pattern.rs (compiled templates, path parameters)
//!     → mapped_path.rs (metrics alias)
//!
//! Compilation (at deploy):
//!     FlowConfig[]
//!     → pattern.rs compiles each template once
//!     → Frozen inside the deployed API
//! ```
//!
//! # Design Decisions
//! - Templates compiled at deploy time, immutable at runtime
//! - Entrypoint lookup uses prefix matching only, no regex
//! - Deterministic: same input always selects the same flows
//! - No match is an empty result; the caller decides the status

pub mod flow;
pub mod mapped_path;
pub mod matcher;
pub mod pattern;
pub mod resolver;
pub mod router;

pub use flow::{Flow, FlowError, PolicyBinding};
pub use mapped_path::{select_mapped_path, MappedPaths};
pub use pattern::{PathPattern, PatternError};
pub use resolver::{BestMatchSelector, FlowMode};
pub use router::{ApiRouter, RouteMatch};
