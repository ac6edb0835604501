use crate::breaker::CircuitBreakerConfig;
use crate::error::{ConfigError, EngineError};
use crate::queue::QueueConfig;
use macaw_strategies::SimulationConfig;
use std::time::Duration;

/// Strategy invocations are hard-capped below the 60 s opportunity lock
/// TTL so a timed-out execution can never outlive its lock.
pub const EXECUTION_TIMEOUT_MS: u64 = 55_000;

/// TTL of the per-opportunity distributed lock.
pub const OPPORTUNITY_LOCK_TTL_MS: u64 = 60_000;

/// Full engine configuration, read from the environment.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub service_name: String,
    pub region: String,
    /// Region whose leadership a standby shadows.
    pub primary_region: String,
    /// Start with the queue manually paused (standby instance).
    pub standby: bool,
    pub port: u16,
    pub max_concurrent_executions: usize,
    pub min_confidence: f64,
    pub simulation_mode: bool,
    /// `NODE_ENV=production`.
    pub production: bool,
    /// Literal `SIMULATION_MODE_PRODUCTION_OVERRIDE=true` escape.
    pub simulation_production_override: bool,
    pub simulation: SimulationConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    pub queue: QueueConfig,
    pub risk_enabled: bool,
    pub shutdown_drain_timeout: Duration,
    pub trade_log_dir: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            service_name: "execution-engine".to_string(),
            region: "us-east".to_string(),
            primary_region: "us-east".to_string(),
            standby: false,
            port: 3005,
            max_concurrent_executions: 5,
            min_confidence: 0.7,
            simulation_mode: false,
            production: false,
            simulation_production_override: false,
            simulation: SimulationConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            queue: QueueConfig::default(),
            risk_enabled: true,
            shutdown_drain_timeout: Duration::from_millis(30_000),
            trade_log_dir: "logs/trades".to_string(),
        }
    }
}

impl EngineConfig {
    /// Reads the environment, applying the documented defaults.
    ///
    /// Fails fast when simulation mode is enabled under
    /// `NODE_ENV=production` without the literal
    /// `SIMULATION_MODE_PRODUCTION_OVERRIDE=true` escape.
    pub fn from_env() -> Result<Self, EngineError> {
        let simulation_mode = env_bool("EXECUTION_SIMULATION_MODE", false)?;
        let production = env_string("NODE_ENV", "").eq_ignore_ascii_case("production");
        let override_flag = env_string("SIMULATION_MODE_PRODUCTION_OVERRIDE", "");
        if production && simulation_mode && override_flag != "true" {
            return Err(EngineError::SimulationForbiddenInProduction);
        }

        let simulation = SimulationConfig {
            success_rate: env_f64("EXECUTION_SIMULATION_SUCCESS_RATE", 0.85, 0.0..=1.0)?,
            latency_ms: env_u64("EXECUTION_SIMULATION_LATENCY_MS", 500)?,
            gas_used: env_u64("EXECUTION_SIMULATION_GAS_USED", 200_000)?,
            gas_cost_multiplier: env_f64(
                "EXECUTION_SIMULATION_GAS_COST_MULTIPLIER",
                0.1,
                0.0..=f64::MAX,
            )?,
            profit_variance: env_f64("EXECUTION_SIMULATION_PROFIT_VARIANCE", 0.2, 0.0..=1.0)?,
            log_executions: env_bool("EXECUTION_SIMULATION_LOG", false)?,
        };

        let circuit_breaker = CircuitBreakerConfig {
            // Enabled unless the literal string "false".
            enabled: env_string("CIRCUIT_BREAKER_ENABLED", "") != "false",
            failure_threshold: env_u64("CIRCUIT_BREAKER_FAILURE_THRESHOLD", 5)? as u32,
            cooldown: Duration::from_millis(env_u64("CIRCUIT_BREAKER_COOLDOWN_MS", 300_000)?),
            half_open_max_attempts: env_u64("CIRCUIT_BREAKER_HALF_OPEN_ATTEMPTS", 1)? as u32,
        };

        Ok(Self {
            service_name: env_string("SERVICE_NAME", "execution-engine"),
            region: env_string("REGION_ID", "us-east"),
            primary_region: env_string("PRIMARY_REGION_ID", "us-east"),
            standby: env_bool("IS_STANDBY", false)? || env_bool("QUEUE_PAUSED_ON_START", false)?,
            port: env_port("EXECUTION_ENGINE_PORT", env_port("HEALTH_CHECK_PORT", 3005)?)?,
            max_concurrent_executions: env_u64("MAX_CONCURRENT_EXECUTIONS", 5)? as usize,
            min_confidence: env_f64("MIN_OPPORTUNITY_CONFIDENCE", 0.7, 0.0..=1.0)?,
            simulation_mode,
            production,
            simulation_production_override: override_flag == "true",
            simulation,
            circuit_breaker,
            queue: QueueConfig::default(),
            risk_enabled: env_bool("RISK_MANAGEMENT_ENABLED", true)?,
            shutdown_drain_timeout: Duration::from_millis(env_u64(
                "SHUTDOWN_DRAIN_TIMEOUT_MS",
                30_000,
            )?),
            trade_log_dir: env_string("TRADE_LOG_DIR", "logs/trades"),
        })
    }

    pub fn leader_key(&self) -> String {
        format!("execution-engine:leader:lock:{}", self.region)
    }

    pub fn execution_timeout(&self) -> Duration {
        Duration::from_millis(EXECUTION_TIMEOUT_MS)
    }

    pub fn lock_ttl(&self) -> Duration {
        Duration::from_millis(OPPORTUNITY_LOCK_TTL_MS)
    }
}

fn env_string(key: &'static str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_bool(key: &'static str, default: bool) -> Result<bool, ConfigError> {
    match std::env::var(key) {
        Err(_) => Ok(default),
        Ok(raw) => match raw.as_str() {
            "true" | "1" => Ok(true),
            "false" | "0" | "" => Ok(false),
            _ => Err(ConfigError::new(key, raw, "true or false")),
        },
    }
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

fn env_f64(
    key: &'static str,
    default: f64,
    range: std::ops::RangeInclusive<f64>,
) -> Result<f64, ConfigError> {
    let value = match std::env::var(key) {
        Err(_) => default,
        Ok(raw) => raw
            .parse()
            .map_err(|_| ConfigError::new(key, raw, "a number"))?,
    };
    if range.contains(&value) {
        Ok(value)
    } else {
        Err(ConfigError::new(
            key,
            value.to_string(),
            "a number within the documented range",
        ))
    }
}
