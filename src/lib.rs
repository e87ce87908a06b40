//! API gateway data plane.
//!
//! Routes inbound HTTP requests to deployed APIs, resolves the flows that
//! apply, runs their policy chains around a load-balanced endpoint call, and
//! streams or buffers payloads on the way.

pub mod buffer;
pub mod config;
pub mod gateway;
pub mod health;
pub mod http;
pub mod lifecycle;
pub mod load_balancer;
pub mod observability;
pub mod policy;
pub mod routing;

pub use config::schema::GatewayConfig;
pub use gateway::Gateway;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
