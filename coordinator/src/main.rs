//! Coordinator entry point.
//!
//! Without an external substrate client configured this binary runs on
//! the in-memory substrate, for local development against a simulated
//! fleet.

use macaw_coordinator::{Coordinator, CoordinatorConfig};
use macaw_substrate::{logging, MemoryEventLog, MemoryKvStore};
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let config = match CoordinatorConfig::from_env() {
        Ok(config) => config,
        Err(error) => {
            eprintln!("macaw-coordinator: failed to start: {error}");
            std::process::exit(1);
        }
    };

    if config.production {
        logging::init_json_logging();
    } else {
        logging::init_logging();
    }
    info!(version = env!("CARGO_PKG_VERSION"), region = %config.region, "macaw coordinator");

    let log = Arc::new(MemoryEventLog::new());
    let kv = Arc::new(MemoryKvStore::new());
    info!("using in-memory substrate (local deployment)");

    let coordinator = Coordinator::new(config, log, kv);
    let runtime = match coordinator.start().await {
        Ok(runtime) => runtime,
        Err(error) => {
            error!(%error, "coordinator startup failed");
            std::process::exit(1);
        }
    };

    wait_for_signal().await;
    runtime.shutdown().await;
}

async fn wait_for_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("sigterm handler installs");
        tokio::select! {
            _ = ctrl_c => info!("received SIGINT"),
            _ = sigterm.recv() => info!("received SIGTERM"),
        }
    }
    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
        info!("received SIGINT");
    }
}
