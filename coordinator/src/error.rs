use thiserror::Error;

/// Coordinator error surface.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

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
