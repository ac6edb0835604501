use crate::error::{ConfigError, CoordinatorError};
use std::time::Duration;
use tracing::warn;
use url::Url;

/// Coordinator configuration, read from the environment.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub service_name: String,
    pub region: String,
    pub production: bool,
    pub port: u16,
    /// Fleet heartbeat reporting interval; staleness is 3x this.
    pub health_report_interval: Duration,
    /// Alert cooldown window.
    pub alert_cooldown: Duration,
    /// Services the restart endpoint may target.
    pub restart_allow_list: Vec<String>,
    /// Bearer token accepted by the admin API. `None` disables
    /// authenticated routes entirely (every call 401s).
    pub api_token: Option<String>,
    pub discord_webhook_url: Option<Url>,
    pub slack_webhook_url: Option<Url>,
    pub alert_email: Option<String>,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            service_name: "coordinator".to_string(),
            region: "us-east".to_string(),
            production: false,
            port: 3000,
            health_report_interval: Duration::from_secs(5),
            alert_cooldown: Duration::from_millis(300_000),
            restart_allow_list: vec![
                "execution-engine".to_string(),
                "eth-detector".to_string(),
                "bsc-detector".to_string(),
                "solana-detector".to_string(),
                "whale-detector".to_string(),
            ],
            api_token: None,
            discord_webhook_url: None,
            slack_webhook_url: None,
            alert_email: None,
        }
    }
}

impl CoordinatorConfig {
    pub fn from_env() -> Result<Self, CoordinatorError> {
        let defaults = Self::default();
        Ok(Self {
            service_name: env_string("SERVICE_NAME", "coordinator"),
            region: env_string("REGION_ID", "us-east"),
            production: env_string("NODE_ENV", "").eq_ignore_ascii_case("production"),
            port: env_port("COORDINATOR_PORT", 3000)?,
            health_report_interval: Duration::from_millis(env_u64(
                "HEALTH_REPORT_INTERVAL_MS",
                5_000,
            )?),
            alert_cooldown: Duration::from_millis(env_u64("ALERT_COOLDOWN_MS", 300_000)?),
            restart_allow_list: match std::env::var("RESTART_ALLOW_LIST") {
                Ok(raw) => raw
                    .split(',')
                    .map(|name| name.trim().to_string())
                    .filter(|name| !name.is_empty())
                    .collect(),
                Err(_) => defaults.restart_allow_list,
            },
            api_token: std::env::var("COORDINATOR_API_TOKEN").ok().filter(|t| !t.is_empty()),
            discord_webhook_url: env_url("DISCORD_WEBHOOK_URL"),
            slack_webhook_url: env_url("SLACK_WEBHOOK_URL"),
            alert_email: std::env::var("ALERT_EMAIL").ok().filter(|e| !e.is_empty()),
        })
    }

    pub fn leader_key(&self) -> &'static str {
        "coordinator:leader:lock"
    }
}

fn env_string(key: &'static str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_u64(key: &'static str, default: u64) -> Result<u64, ConfigError> {
    match std::env::var(key) {
        Err(_) => Ok(default),
        Ok(raw) => raw
            .parse()
            .map_err(|_| ConfigError::new(key, raw, "a non-negative integer")),
    }
}

fn env_port(key: &'static str, default: u16) -> Result<u16, ConfigError> {
    match std::env::var(key) {
        Err(_) => Ok(default),
        Ok(raw) => raw
            .parse()
            .map_err(|_| ConfigError::new(key, raw, "a port number")),
    }
}

fn env_url(key: &'static str) -> Option<Url> {
    let raw = std::env::var(key).ok()?;
    if raw.is_empty() {
        return None;
    }
    match Url::parse(&raw) {
        Ok(url) => Some(url),
        Err(error) => {
            warn!(key, %error, "ignoring malformed webhook url");
            None
        }
    }
}
