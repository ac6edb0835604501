use async_trait::async_trait;
use macaw_domain::Alert;
use macaw_substrate::Entry;
use std::sync::Arc;

/// Narrow alert sink injected into consumers, so the framework does not
/// hold a back-reference to the owning service's notifier.
pub type AlertFn = Arc<dyn Fn(Alert) + Send + Sync>;

/// What the framework should do with an entry after dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerOutcome {
    /// Handled; remove from the group's pending list.
    Ack,
    /// Claimed by a downstream owner who acks after completing its work.
    Defer,
    /// Transient failure; leave pending so the group redelivers.
    Retry,
    /// Deterministic failure; park on the dead-letter stream and ack.
    DeadLetter {
        /// Error kind recorded with the dead letter, e.g.
        /// `INVALID_OPPORTUNITY`.
        kind: &'static str,
        detail: String,
    },
}

impl HandlerOutcome {
    pub fn dead_letter(kind: &'static str, detail: impl Into<String>) -> Self {
        Self::DeadLetter {
            kind,
            detail: detail.into(),
        }
    }
}

/// Per-stream message handler.
///
/// Handlers never panic or error across the task boundary: every failure
/// is folded into a [`HandlerOutcome`] at the outermost step. They must
/// be idempotent keyed by the entity id in the entry fields, since
/// redelivery is part of normal operation.
#[async_trait]
pub trait StreamHandler: Send + Sync + 'static {
    async fn handle(&self, entry: &Entry) -> HandlerOutcome;
}
