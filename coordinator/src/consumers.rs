use crate::health::HealthAggregator;
use crate::metrics::SystemMetrics;
use crate::opportunities::OpportunityCache;
use async_trait::async_trait;
use macaw_domain::{
    ExecutionResult, Opportunity, PriceUpdate, ServiceHealth, SwapEvent, VolumeAggregate,
    WhaleAlert, WireEvent,
};
use macaw_streams::{HandlerOutcome, StreamHandler};
use macaw_substrate::Entry;
use serde::de::DeserializeOwned;
use std::marker::PhantomData;
use std::sync::Arc;

/// Generic view-updating handler: decode the entry payload as `T` and
/// fold it into the coordinator's in-memory state.
///
/// Unparseable entries dead-letter; everything else acks. The fold runs
/// on the consumer task, so it must stay cheap (map writes and counter
/// bumps only); expensive maintenance belongs on the batch timers.
pub struct ViewHandler<T, F> {
    apply: F,
    _payload: PhantomData<fn(T)>,
}

impl<T, F> std::fmt::Debug for ViewHandler<T, F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ViewHandler").finish_non_exhaustive()
    }
}

impl<T, F> ViewHandler<T, F>
where
    T: DeserializeOwned + Send + Sync + 'static,
    F: Fn(T) + Send + Sync + 'static,
{
    pub fn new(apply: F) -> Arc<Self> {
        Arc::new(Self {
            apply,
            _payload: PhantomData,
        })
    }
}

#[async_trait]
impl<T, F> StreamHandler for ViewHandler<T, F>
where
    T: DeserializeOwned + Send + Sync + 'static,
    F: Fn(T) + Send + Sync + 'static,
{
    async fn handle(&self, entry: &Entry) -> HandlerOutcome {
        let event = match WireEvent::from_fields(&entry.fields) {
            Ok(event) => event,
            Err(error) => return HandlerOutcome::dead_letter("INVALID_EVENT", error.to_string()),
        };
        match event.decode::<T>() {
            Ok(payload) => {
                (self.apply)(payload);
                HandlerOutcome::Ack
            }
            Err(error) => HandlerOutcome::dead_letter("INVALID_EVENT", error.to_string()),
        }
    }
}

/// Handler for `stream:health`.
pub fn health_handler(health: Arc<HealthAggregator>) -> Arc<dyn StreamHandler> {
    ViewHandler::new(move |event: ServiceHealth| health.record(event))
}

/// Handler for `stream:opportunities` (coordinator side: cache + count).
pub fn opportunity_handler(
    cache: Arc<OpportunityCache>,
    metrics: Arc<SystemMetrics>,
) -> Arc<dyn StreamHandler> {
    ViewHandler::new(move |opportunity: Opportunity| {
        metrics.record_opportunity();
        cache.insert(opportunity);
    })
}

/// Handler for `stream:whale-alerts`.
pub fn whale_alert_handler(metrics: Arc<SystemMetrics>) -> Arc<dyn StreamHandler> {
    ViewHandler::new(move |event: WhaleAlert| metrics.record_whale_alert(event.amount_usd))
}

/// Handler for `stream:swap-events`.
pub fn swap_handler(metrics: Arc<SystemMetrics>) -> Arc<dyn StreamHandler> {
    ViewHandler::new(move |event: SwapEvent| metrics.record_swap(event.amount_usd))
}

/// Handler for `stream:volume-aggregates`.
pub fn volume_handler(metrics: Arc<SystemMetrics>) -> Arc<dyn StreamHandler> {
    ViewHandler::new(move |_event: VolumeAggregate| metrics.record_volume_aggregate())
}

/// Handler for `stream:price-updates`.
pub fn price_handler(metrics: Arc<SystemMetrics>) -> Arc<dyn StreamHandler> {
    ViewHandler::new(move |_event: PriceUpdate| metrics.record_price_update())
}

/// Handler for `stream:execution-results`.
pub fn execution_result_handler(metrics: Arc<SystemMetrics>) -> Arc<dyn StreamHandler> {
    ViewHandler::new(move |result: ExecutionResult| {
        metrics.record_execution(result.success, result.actual_profit, result.gas_cost)
    })
}
