use crate::context::StrategyContext;
use async_trait::async_trait;
use macaw_domain::{ExecutionResult, Opportunity, OpportunityKind};
use thiserror::Error;

/// One way of executing an opportunity.
///
/// A strategy expresses the execution outcome in the returned
/// [`ExecutionResult`] (`success` plus `error`), not in `Err`: the `Err`
/// channel is reserved for infrastructure problems that prevented an
/// attempt from being made at all. Strategies must be cancel-safe, since
/// the pipeline aborts them at the execution deadline.
#[async_trait]
pub trait ExecutionStrategy: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    fn supports(&self, kind: &OpportunityKind) -> bool;

    async fn execute(
        &self,
        opportunity: &Opportunity,
        ctx: &StrategyContext,
    ) -> Result<ExecutionResult, StrategyError>;
}

/// Infrastructure failures around strategy invocation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StrategyError {
    #[error("no strategy registered for opportunity kind `{0}`")]
    Unsupported(String),
    #[error("provider failure: {0}")]
    Provider(String),
}
