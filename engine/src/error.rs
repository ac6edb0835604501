use thiserror::Error;

/// Engine error surface.
///
/// Constructor invariants (simulation in production without the explicit
/// override, risk initialisation failure outside simulation) fail fast
/// with a clear message; the binary maps them to a non-zero exit.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error(
        "simulation mode is enabled in production; set SIMULATION_MODE_PRODUCTION_OVERRIDE=true \
         to allow it deliberately"
    )]
    SimulationForbiddenInProduction,

    #[error("risk management initialisation failed: {0}")]
    RiskInit(#[from] macaw_risk::RiskError),

    #[error("substrate failure: {0}")]
    Substrate(#[from] macaw_substrate::SubstrateError),

    #[error("coordination failure: {0}")]
    Coordination(#[from] macaw_coordination::CoordinationError),

    #[error("http server failure: {0}")]
    Http(#[from] std::io::Error),
}

/// Malformed environment configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid value `{value}` for {key}: {expected}")]
pub struct ConfigError {
    pub key: &'static str,
    pub value: String,
    pub expected: &'static str,
}

impl ConfigError {
    pub fn new(key: &'static str, value: impl Into<String>, expected: &'static str) -> Self {
        Self {
            key,
            value: value.into(),
            expected,
        }
    }
}
