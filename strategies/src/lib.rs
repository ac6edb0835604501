#![forbid(unsafe_code)]
#![warn(
    unused,
    clippy::cognitive_complexity,
    unused_crate_dependencies,
    unused_extern_crates,
    missing_debug_implementations,
    rust_2018_idioms
)]

//! # Macaw Strategies
//!
//! The execution-strategy seam of the engine. A [`StrategyFactory`] maps
//! opportunity kinds to [`ExecutionStrategy`] implementations and hands
//! each invocation an immutable, cached [`StrategyContext`] carrying the
//! interface-only collaborators (chain providers, wallets, nonce
//! manager). Real strategies are registered by the deployment; the
//! built-in [`SimulationStrategy`] produces deterministic synthetic
//! results for local development and load testing and is forbidden in
//! production without an explicit override (enforced by the engine
//! constructor).

/// Strategy trait and error surface.
pub mod strategy;

/// Immutable execution context and its collaborator seams.
pub mod context;

/// Kind-keyed strategy dispatch with a cached context.
pub mod factory;

/// Deterministic synthetic execution.
pub mod simulation;

pub use context::{
    NonceManager, NullCollaborators, ProviderRegistry, StrategyContext, WalletRegistry,
};
pub use factory::StrategyFactory;
pub use simulation::{SimulationConfig, SimulationStrategy};
pub use strategy::{ExecutionStrategy, StrategyError};
