//! API Gateway
//!
//! # Architecture Overview
//!
//! ```text
//!                              ┌──────────────────────────────────────────────────────────┐
//!                              │                       API GATEWAY                        │
//!                              │                                                          │
//!     Client Request           │  ┌─────────┐    ┌──────────┐    ┌──────────────┐         │
//!     ─────────────────────────┼─▶│  http   │───▶│ routing  │───▶│    flows     │         │
//!                              │  │ server  │    │ApiRouter │    │ FlowResolver │         │
//!                              │  └─────────┘    └──────────┘    └──────┬───────┘         │
//!                              │                                        │                 │
//!                              │                                        ▼                 │
//!                              │                                ┌──────────────┐         │
//!                              │                                │ policy chains│         │
//!                              │                                │  (request)   │         │
//!                              │                                └──────┬───────┘         │
//!                              │                                       ▼                  │
//!                              │                                ┌──────────────┐         │
//!                              │                                │load_balancer │         │
//!                              │                                │ + endpoints  │         │
//!                              │                                └──────┬───────┘         │
//!                              │                                       ▼                  │
//!     Client Response          │  ┌─────────┐    ┌──────────┐    ┌──────────────┐         │
//!     ◀────────────────────────┼──│response │◀───│  policy  │◀───│ http invoker │◀────────┼──── Backend
//!                              │  │ writer  │    │  chains  │    │ (BufferFlow) │         │     Endpoint
//!                              │  └─────────┘    └──────────┘    └──────────────┘         │
//!                              │                                                          │
//!                              │  ┌────────────────────────────────────────────────────┐  │
//!                              │  │              Cross-Cutting Concerns                │  │
//!                              │  │  ┌─────────┐ ┌────────┐ ┌──────────┐ ┌───────────┐ │  │
//!                              │  │  │ config  │ │ health │ │observa-  │ │ lifecycle │ │  │
//!                              │  │  │ +reload │ │ checks │ │ bility   │ │ shutdown  │ │  │
//!                              │  │  └─────────┘ └────────┘ └──────────┘ └───────────┘ │  │
//!                              │  └────────────────────────────────────────────────────┘  │
//!                              └──────────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use api_gateway::config::{load_config, watcher::ConfigWatcher};
use api_gateway::health::HealthMonitor;
use api_gateway::lifecycle::{wait_for_signal, Shutdown};
use api_gateway::observability::{logging, metrics};
use api_gateway::policy::PolicyRegistry;
use api_gateway::{Gateway, HttpServer};

#[derive(Parser, Debug)]
#[command(name = "api-gateway", version, about = "API gateway data plane")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "gateway.toml")]
    config: PathBuf,

    /// Do not reload the configuration when the file changes.
    #[arg(long)]
    no_watch: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = load_config(&args.config)?;
    logging::init_logging(&config.observability)?;

    tracing::info!(
        config = ?args.config,
        bind_address = %config.listener.bind_address,
        apis = config.apis.len(),
        request_timeout_secs = config.timeouts.request_secs,
        "api-gateway v0.1.0 starting"
    );

    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse() {
            metrics::init_metrics(addr);
        } else {
            tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            );
        }
    }

    let gateway = Arc::new(Gateway::from_config(&config, PolicyRegistry::with_builtins())?);
    let shutdown = Shutdown::new();

    // The watcher handle must outlive the server.
    let (_watcher, updates) = if args.no_watch {
        (None, None)
    } else {
        let (watcher, updates) = ConfigWatcher::new(&args.config);
        (Some(watcher.run()?), Some(updates))
    };

    let monitor = HealthMonitor::new(gateway.clone(), config.health_check.clone());
    let monitor_task = tokio::spawn(monitor.run(shutdown.subscribe()));

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let server = HttpServer::new(&config, gateway);
    let server_task = tokio::spawn(server.run(listener, updates, shutdown.subscribe()));

    wait_for_signal().await;
    shutdown.trigger();

    server_task.await??;
    monitor_task.await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
