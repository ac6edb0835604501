//! Standardised tracing initialisers for the Macaw services.
//!
//! Both binaries call one of these before any other work. Level
//! filtering comes from `RUST_LOG` with a default of INFO.
//!
//! ```bash
//! # Debug level for all modules
//! export RUST_LOG=debug
//!
//! # Per-module levels
//! export RUST_LOG=macaw_engine=debug,macaw_coordinator=info
//! ```

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialises human-readable logging.
pub fn init_logging() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::filter::EnvFilter::builder()
                .with_default_directive(tracing_subscriber::filter::LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .with(tracing_subscriber::fmt::layer())
        .init()
}

/// Initialises JSON logging for aggregators.
pub fn init_json_logging() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::filter::EnvFilter::builder()
                .with_default_directive(tracing_subscriber::filter::LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .with(tracing_subscriber::fmt::layer().json().flatten_event(true))
        .init()
}
