use crate::queue::{EnqueueError, OpportunityQueue, QueueItem};
use crate::stats::EngineStats;
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashSet;
use macaw_domain::{Opportunity, WireEvent};
use macaw_streams::{HandlerOutcome, StreamHandler};
use macaw_substrate::Entry;
use smol_str::SmolStr;
use std::sync::Arc;
use tracing::{debug, warn};

/// Ids currently queued or executing, shared between the ingest handler
/// and the pipeline for duplicate suppression.
pub type ActiveSet = DashSet<SmolStr>;

/// Opportunity-stream handler: parses, validates and enqueues.
///
/// Outcomes follow the error taxonomy: unparseable entries dead-letter,
/// validation failures ack (not replayable), duplicates coalesce into the
/// in-flight execution, and a full or backpressured queue leaves the
/// entry pending for redelivery. Accepted entries are deferred; the
/// pipeline acks them after result publication.
pub struct OpportunityIngest {
    queue: Arc<OpportunityQueue>,
    active: Arc<ActiveSet>,
    stats: Arc<EngineStats>,
    min_confidence: f64,
}

impl std::fmt::Debug for OpportunityIngest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpportunityIngest")
            .field("min_confidence", &self.min_confidence)
            .finish_non_exhaustive()
    }
}

impl OpportunityIngest {
    pub fn new(
        queue: Arc<OpportunityQueue>,
        active: Arc<ActiveSet>,
        stats: Arc<EngineStats>,
        min_confidence: f64,
    ) -> Self {
        Self {
            queue,
            active,
            stats,
            min_confidence,
        }
    }
}

#[async_trait]
impl StreamHandler for OpportunityIngest {
    async fn handle(&self, entry: &Entry) -> HandlerOutcome {
        let event = match WireEvent::from_fields(&entry.fields) {
            Ok(event) => event,
            Err(error) => {
                EngineStats::incr(&self.stats.opportunities_rejected);
                return HandlerOutcome::dead_letter("INVALID_OPPORTUNITY", error.to_string());
            }
        };
        let opportunity: Opportunity = match event.decode() {
            Ok(opportunity) => opportunity,
            Err(error) => {
                EngineStats::incr(&self.stats.opportunities_rejected);
                return HandlerOutcome::dead_letter("INVALID_OPPORTUNITY", error.to_string());
            }
        };

        EngineStats::incr(&self.stats.opportunities_received);

        if let Err(error) = opportunity.validate(self.min_confidence) {
            debug!(id = %opportunity.id, %error, "opportunity rejected");
            EngineStats::incr(&self.stats.opportunities_rejected);
            return HandlerOutcome::Ack;
        }
        if opportunity.is_expired(Utc::now()) {
            debug!(id = %opportunity.id, "opportunity expired before execution");
            EngineStats::incr(&self.stats.opportunities_rejected);
            return HandlerOutcome::Ack;
        }

        // Concurrent redeliveries of an in-flight id coalesce here.
        if !self.active.insert(opportunity.id.clone()) {
            EngineStats::incr(&self.stats.duplicates_suppressed);
            return HandlerOutcome::Ack;
        }

        let id = opportunity.id.clone();
        match self.queue.enqueue(QueueItem {
            opportunity,
            entry_id: entry.id,
        }) {
            Ok(()) => HandlerOutcome::Defer,
            Err(error @ (EnqueueError::Full | EnqueueError::Backpressure)) => {
                self.active.remove(&id);
                EngineStats::incr(&self.stats.queue_rejections);
                warn!(%id, %error, "queue refused opportunity, leaving pending");
                HandlerOutcome::Retry
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::QueueConfig;
    use macaw_domain::{FieldMap, OpportunityKind};
    use macaw_substrate::EntryId;

    fn ingest() -> (OpportunityIngest, Arc<OpportunityQueue>, Arc<ActiveSet>) {
        let queue = Arc::new(OpportunityQueue::new(QueueConfig {
            max_size: 4,
            high_watermark: 3,
            low_watermark: 1,
        }));
        let active = Arc::new(ActiveSet::new());
        let handler = OpportunityIngest::new(
            Arc::clone(&queue),
            Arc::clone(&active),
            Arc::new(EngineStats::default()),
            0.7,
        );
        (handler, queue, active)
    }

    fn opportunity(id: &str, confidence: f64) -> Opportunity {
        Opportunity {
            id: SmolStr::new(id),
            kind: OpportunityKind::CrossDex,
            source_chain: None,
            target_chain: None,
            dex: None,
            expected_profit: 10.0,
            confidence,
            amount: None,
            timestamp: Utc::now(),
            expires_at: None,
            status: Default::default(),
            data: serde_json::Value::Null,
        }
    }

    fn entry_for(opportunity: &Opportunity) -> Entry {
        Entry {
            id: EntryId::new(1, 0),
            fields: WireEvent::encode("opportunity", opportunity)
                .unwrap()
                .with_id(opportunity.id.clone())
                .into_fields(),
            delivery_count: 1,
        }
    }

    #[tokio::test]
    async fn test_valid_opportunity_is_enqueued_and_deferred() {
        let (handler, queue, active) = ingest();
        let outcome = handler.handle(&entry_for(&opportunity("opp-1", 0.9))).await;
        assert_eq!(outcome, HandlerOutcome::Defer);
        assert_eq!(queue.size(), 1);
        assert!(active.contains(&SmolStr::new("opp-1")));
    }

    #[tokio::test]
    async fn test_low_confidence_is_acked_not_replayed() {
        let (handler, queue, _) = ingest();
        let outcome = handler.handle(&entry_for(&opportunity("opp-1", 0.2))).await;
        assert_eq!(outcome, HandlerOutcome::Ack);
        assert_eq!(queue.size(), 0);
        assert_eq!(
            handler
                .stats
                .opportunities_rejected
                .load(std::sync::atomic::Ordering::Relaxed),
            1
        );
    }

    #[tokio::test]
    async fn test_unparseable_entry_dead_letters() {
        let (handler, _, _) = ingest();
        let mut fields = FieldMap::new();
        fields.insert("type".into(), "opportunity".into());
        fields.insert("data".into(), "{broken".into());
        let outcome = handler
            .handle(&Entry {
                id: EntryId::new(1, 0),
                fields,
                delivery_count: 1,
            })
            .await;
        assert!(matches!(
            outcome,
            HandlerOutcome::DeadLetter {
                kind: "INVALID_OPPORTUNITY",
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_duplicate_in_flight_id_coalesces() {
        let (handler, queue, _) = ingest();
        let opportunity = opportunity("opp-1", 0.9);
        assert_eq!(
            handler.handle(&entry_for(&opportunity)).await,
            HandlerOutcome::Defer
        );
        assert_eq!(
            handler.handle(&entry_for(&opportunity)).await,
            HandlerOutcome::Ack
        );
        assert_eq!(queue.size(), 1);
    }

    #[tokio::test]
    async fn test_full_queue_leaves_entry_pending() {
        let (handler, queue, active) = ingest();
        for i in 0..3 {
            handler
                .handle(&entry_for(&opportunity(&format!("opp-{i}"), 0.9)))
                .await;
        }
        // High watermark reached: the next add is refused and retried.
        let outcome = handler.handle(&entry_for(&opportunity("opp-x", 0.9))).await;
        assert_eq!(outcome, HandlerOutcome::Retry);
        assert_eq!(queue.size(), 3);
        // The refused id is not stuck in the active set.
        assert!(!active.contains(&SmolStr::new("opp-x")));
    }

    #[tokio::test]
    async fn test_expired_opportunity_is_acked() {
        let (handler, queue, _) = ingest();
        let mut opportunity = opportunity("opp-1", 0.9);
        opportunity.expires_at = Some(Utc::now() - chrono::Duration::seconds(1));
        assert_eq!(
            handler.handle(&entry_for(&opportunity)).await,
            HandlerOutcome::Ack
        );
        assert_eq!(queue.size(), 0);
    }
}
