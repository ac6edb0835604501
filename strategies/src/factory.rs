use crate::context::StrategyContext;
use crate::strategy::{ExecutionStrategy, StrategyError};
use macaw_domain::{ExecutionResult, Opportunity, OpportunityKind};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Kind-keyed strategy dispatch.
///
/// Holds one cached [`StrategyContext`] shared by every invocation;
/// [`invalidate_context`](Self::invalidate_context) swaps it when a
/// dependency changes (standby activation, admin restart).
pub struct StrategyFactory {
    strategies: RwLock<HashMap<OpportunityKind, Arc<dyn ExecutionStrategy>>>,
    context: RwLock<Arc<StrategyContext>>,
}

impl fmt::Debug for StrategyFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kinds: Vec<String> = self
            .strategies
            .read()
            .keys()
            .map(ToString::to_string)
            .collect();
        f.debug_struct("StrategyFactory")
            .field("kinds", &kinds)
            .finish_non_exhaustive()
    }
}

impl StrategyFactory {
    pub fn new(context: StrategyContext) -> Self {
        Self {
            strategies: RwLock::new(HashMap::new()),
            context: RwLock::new(Arc::new(context)),
        }
    }

    /// Registers `strategy` for `kind`, replacing any previous binding.
    pub fn register(&self, kind: OpportunityKind, strategy: Arc<dyn ExecutionStrategy>) {
        debug!(kind = %kind, strategy = strategy.name(), "strategy registered");
        self.strategies.write().insert(kind, strategy);
    }

    /// Registers `strategy` for every kind it reports supporting.
    pub fn register_for_supported(
        &self,
        kinds: impl IntoIterator<Item = OpportunityKind>,
        strategy: Arc<dyn ExecutionStrategy>,
    ) {
        for kind in kinds {
            if strategy.supports(&kind) {
                self.register(kind, Arc::clone(&strategy));
            }
        }
    }

    pub fn strategy_for(&self, kind: &OpportunityKind) -> Option<Arc<dyn ExecutionStrategy>> {
        self.strategies.read().get(kind).cloned()
    }

    /// Current cached context.
    pub fn context(&self) -> Arc<StrategyContext> {
        Arc::clone(&self.context.read())
    }

    /// Swaps the cached context after a dependency change.
    pub fn invalidate_context(&self, context: StrategyContext) {
        *self.context.write() = Arc::new(context);
    }

    /// Dispatches to the strategy registered for the opportunity's kind.
    pub async fn dispatch(
        &self,
        opportunity: &Opportunity,
    ) -> Result<ExecutionResult, StrategyError> {
        let strategy = self
            .strategy_for(&opportunity.kind)
            .ok_or_else(|| StrategyError::Unsupported(opportunity.kind.to_string()))?;
        let context = self.context();
        strategy.execute(opportunity, &context).await
    }
}
