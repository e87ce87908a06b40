//! HTTP transport subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, tracing, timeout)
//!     → request.rs (GatewayRequest, body wrapped lazily by body.rs)
//!     → gateway pipeline (routing, flows, chains)
//!     → proxy.rs (endpoint call, response body wrapped by body.rs)
//!     → response.rs (strip hop-by-hop headers, write body)
//!     → Send to client
//! ```

pub mod body;
pub mod proxy;
pub mod request;
pub mod response;
pub mod server;

pub use proxy::HttpInvoker;
pub use request::X_REQUEST_ID;
pub use server::{AppState, HttpServer};
