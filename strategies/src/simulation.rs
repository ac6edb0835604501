use crate::context::StrategyContext;
use crate::strategy::{ExecutionStrategy, StrategyError};
use async_trait::async_trait;
use chrono::Utc;
use macaw_domain::{ExecutionResult, Opportunity, OpportunityKind};
use rand::Rng;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::info;

/// Tuning of the synthetic execution path.
#[derive(Debug, Clone)]
pub struct SimulationConfig {
    /// Probability a simulated execution succeeds.
    pub success_rate: f64,
    /// Base synthetic latency; each call jitters it by ±30 %.
    pub latency_ms: u64,
    /// Reported gas units per execution.
    pub gas_used: u64,
    /// Gas cost as a fraction of expected profit.
    pub gas_cost_multiplier: f64,
    /// Uniform profit variance `v`: realised profit is drawn from
    /// `expected * [1-v, 1+v]`.
    pub profit_variance: f64,
    /// Log each simulated execution at info level.
    pub log_executions: bool,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            success_rate: 0.85,
            latency_ms: 500,
            gas_used: 200_000,
            gas_cost_multiplier: 0.1,
            profit_variance: 0.2,
            log_executions: false,
        }
    }
}

/// Latency jitter applied around the configured base.
const LATENCY_JITTER: f64 = 0.3;

/// Deterministic synthetic execution for development and load testing.
///
/// Never touches a chain: it sleeps a jittered latency, draws the
/// outcome against the configured success rate and fabricates the
/// economics. Transaction hashes are unique within a run (a process-wide
/// counter is mixed into the random bytes).
#[derive(Debug)]
pub struct SimulationStrategy {
    config: SimulationConfig,
    sequence: AtomicU64,
}

impl SimulationStrategy {
    pub fn new(config: SimulationConfig) -> Self {
        Self {
            config,
            sequence: AtomicU64::new(0),
        }
    }

    fn synthetic_tx_hash(&self) -> String {
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        let mut bytes = [0u8; 32];
        rand::rng().fill(&mut bytes[..24]);
        bytes[24..].copy_from_slice(&sequence.to_be_bytes());
        format!("0x{}", hex::encode(bytes))
    }

    fn jittered_latency(&self) -> Duration {
        let factor = rand::rng().random_range(1.0 - LATENCY_JITTER..=1.0 + LATENCY_JITTER);
        Duration::from_millis(self.config.latency_ms).mul_f64(factor)
    }
}

#[async_trait]
impl ExecutionStrategy for SimulationStrategy {
    fn name(&self) -> &'static str {
        "simulation"
    }

    /// Simulation stands in for every kind.
    fn supports(&self, _kind: &OpportunityKind) -> bool {
        true
    }

    async fn execute(
        &self,
        opportunity: &Opportunity,
        _ctx: &StrategyContext,
    ) -> Result<ExecutionResult, StrategyError> {
        if opportunity.id.is_empty() {
            return Ok(ExecutionResult::failure(
                opportunity.id.clone(),
                "ERR_INVALID_OPPORTUNITY",
                Utc::now(),
            ));
        }

        tokio::time::sleep(self.jittered_latency()).await;

        let gas_cost = opportunity.expected_profit * self.config.gas_cost_multiplier;
        let succeeded = rand::rng().random_bool(self.config.success_rate.clamp(0.0, 1.0));

        let result = if succeeded {
            let v = self.config.profit_variance;
            let realised_factor = rand::rng().random_range(1.0 - v..=1.0 + v);
            ExecutionResult {
                opportunity_id: opportunity.id.clone(),
                success: true,
                transaction_hash: Some(self.synthetic_tx_hash()),
                actual_profit: Some(opportunity.expected_profit * realised_factor),
                gas_used: Some(self.config.gas_used),
                gas_cost: Some(gas_cost),
                error: None,
                timestamp: Utc::now(),
                chain: opportunity.source_chain.clone(),
                dex: opportunity.dex.clone(),
            }
        } else {
            ExecutionResult {
                opportunity_id: opportunity.id.clone(),
                success: false,
                transaction_hash: None,
                actual_profit: None,
                gas_used: Some(self.config.gas_used),
                gas_cost: Some(gas_cost),
                error: Some("simulated execution failure".to_string()),
                timestamp: Utc::now(),
                chain: opportunity.source_chain.clone(),
                dex: opportunity.dex.clone(),
            }
        };

        if self.config.log_executions {
            info!(
                id = %result.opportunity_id,
                success = result.success,
                profit = result.actual_profit,
                "simulated execution"
            );
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smol_str::SmolStr;
    use std::collections::HashSet;

    fn opportunity(id: &str) -> Opportunity {
        Opportunity {
            id: SmolStr::new(id),
            kind: OpportunityKind::CrossDex,
            source_chain: Some(SmolStr::new("ethereum")),
            target_chain: None,
            dex: Some(SmolStr::new("uniswap-v3")),
            expected_profit: 100.0,
            confidence: 0.9,
            amount: None,
            timestamp: Utc::now(),
            expires_at: None,
            status: Default::default(),
            data: serde_json::Value::Null,
        }
    }

    fn fast_config() -> SimulationConfig {
        SimulationConfig {
            latency_ms: 0,
            ..SimulationConfig::default()
        }
    }

    #[tokio::test]
    async fn test_empty_id_fails_without_attempt() {
        let strategy = SimulationStrategy::new(fast_config());
        let result = strategy
            .execute(&opportunity(""), &StrategyContext::detached())
            .await
            .unwrap();
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("ERR_INVALID_OPPORTUNITY"));
        assert!(result.transaction_hash.is_none());
    }

    #[tokio::test]
    async fn test_guaranteed_success_shapes_the_result() {
        let strategy = SimulationStrategy::new(SimulationConfig {
            success_rate: 1.0,
            ..fast_config()
        });
        let result = strategy
            .execute(&opportunity("opp-1"), &StrategyContext::detached())
            .await
            .unwrap();

        assert!(result.success);
        let hash = result.transaction_hash.expect("tx hash on success");
        assert!(hash.starts_with("0x"));
        assert_eq!(hash.len(), 66);
        assert!(hash[2..].chars().all(|c| c.is_ascii_hexdigit()));

        // gas_cost = expected_profit * multiplier
        assert_eq!(result.gas_cost, Some(10.0));
        assert_eq!(result.gas_used, Some(200_000));

        // Profit within the variance envelope.
        let profit = result.actual_profit.unwrap();
        assert!((80.0..=120.0).contains(&profit), "profit {profit}");
    }

    #[tokio::test]
    async fn test_guaranteed_failure_keeps_gas_economics() {
        let strategy = SimulationStrategy::new(SimulationConfig {
            success_rate: 0.0,
            ..fast_config()
        });
        let result = strategy
            .execute(&opportunity("opp-1"), &StrategyContext::detached())
            .await
            .unwrap();

        assert!(!result.success);
        assert!(result.transaction_hash.is_none());
        assert!(result.actual_profit.is_none());
        assert_eq!(result.gas_cost, Some(10.0));
        assert!(result.error.is_some());
    }

    #[tokio::test]
    async fn test_tx_hashes_are_unique_within_a_run() {
        let strategy = SimulationStrategy::new(SimulationConfig {
            success_rate: 1.0,
            ..fast_config()
        });
        let mut hashes = HashSet::new();
        for i in 0..200 {
            let result = strategy
                .execute(&opportunity(&format!("opp-{i}")), &StrategyContext::detached())
                .await
                .unwrap();
            assert!(hashes.insert(result.transaction_hash.unwrap()));
        }
    }
}
