//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → wait_for_signal() returns
//!
//! Shutdown (shutdown.rs):
//!     trigger() → every subscriber (server, health monitor, reload task)
//!     → stop accepting → drain in-flight requests → exit
//! ```
//!
//! # Design Decisions
//! - One broadcast channel; long-running tasks subscribe at spawn time
//! - In-flight requests finish on the API snapshot they started with

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
pub use signals::wait_for_signal;
