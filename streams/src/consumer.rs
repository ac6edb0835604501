use crate::errors::StreamErrorTracker;
use crate::handler::{AlertFn, HandlerOutcome, StreamHandler};
use chrono::Utc;
use macaw_domain::wire;
use macaw_substrate::{streams, DeadLetter, Entry, EventLog, GroupStart};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Poll-loop configuration for one consumer.
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    pub stream: String,
    pub group: String,
    pub consumer_id: String,
    /// Entries fetched per read.
    pub batch_size: usize,
    /// Blocking-read timeout.
    pub block: Duration,
    /// Back-off after a failed read.
    pub error_backoff: Duration,
    /// Deliveries after which a retried entry is dead-lettered.
    pub max_attempts: u32,
    /// Where a freshly created group starts.
    pub start: GroupStart,
}

impl ConsumerConfig {
    pub fn new(
        stream: impl Into<String>,
        group: impl Into<String>,
        consumer_id: impl Into<String>,
    ) -> Self {
        Self {
            stream: stream.into(),
            group: group.into(),
            consumer_id: consumer_id.into(),
            batch_size: 16,
            block: Duration::from_secs(5),
            error_backoff: Duration::from_secs(1),
            max_attempts: 5,
            start: GroupStart::Tail,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_block(mut self, block: Duration) -> Self {
        self.block = block;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn from_beginning(mut self) -> Self {
        self.start = GroupStart::Beginning;
        self
    }
}

/// One consumer-group poll loop.
///
/// Spawn with [`GroupConsumer::spawn`]; the returned [`ConsumerHandle`]
/// stops the loop on shutdown. Entries flow through the handler and are
/// acked, deferred, left pending, or dead-lettered per its
/// [`HandlerOutcome`].
#[derive(Debug)]
pub struct GroupConsumer;

/// Handle to a spawned consumer loop.
pub struct ConsumerHandle {
    stream: String,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl fmt::Debug for ConsumerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsumerHandle")
            .field("stream", &self.stream)
            .finish_non_exhaustive()
    }
}

impl ConsumerHandle {
    pub fn stream(&self) -> &str {
        &self.stream
    }

    /// Signals the loop to stop after the in-flight batch and awaits it.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(error) = self.task.await {
            warn!(stream = %self.stream, %error, "consumer task did not shut down cleanly");
        }
    }
}

impl GroupConsumer {
    pub fn spawn(
        config: ConsumerConfig,
        log: Arc<dyn EventLog>,
        handler: Arc<dyn StreamHandler>,
        alerts: Option<AlertFn>,
    ) -> ConsumerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let stream = config.stream.clone();
        let task = tokio::spawn(run_consumer(config, log, handler, alerts, shutdown_rx));
        ConsumerHandle {
            stream,
            shutdown: shutdown_tx,
            task,
        }
    }
}

async fn run_consumer(
    config: ConsumerConfig,
    log: Arc<dyn EventLog>,
    handler: Arc<dyn StreamHandler>,
    alerts: Option<AlertFn>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut tracker = StreamErrorTracker::new(config.stream.clone());

    // Group creation is idempotent; keep trying through substrate
    // hiccups until shutdown.
    loop {
        match log
            .create_group(&config.stream, &config.group, config.start)
            .await
        {
            Ok(()) => break,
            Err(error) => {
                warn!(stream = %config.stream, group = %config.group, %error, "group create failed");
                tokio::select! {
                    _ = tokio::time::sleep(config.error_backoff) => {}
                    _ = shutdown.changed() => return,
                }
            }
        }
    }
    info!(
        stream = %config.stream,
        group = %config.group,
        consumer = %config.consumer_id,
        "consumer started"
    );

    loop {
        if *shutdown.borrow() {
            break;
        }
        let read = tokio::select! {
            read = log.read_group(
                &config.stream,
                &config.group,
                &config.consumer_id,
                config.batch_size,
                config.block,
            ) => read,
            _ = shutdown.changed() => break,
        };

        let entries = match read {
            Ok(entries) => {
                tracker.record_success();
                entries
            }
            Err(error) => {
                error!(stream = %config.stream, %error, "consumer read failed");
                if let Some(alert) = tracker.record_error(Utc::now()) {
                    if let Some(alerts) = &alerts {
                        alerts(alert);
                    }
                }
                tokio::select! {
                    _ = tokio::time::sleep(config.error_backoff) => {}
                    _ = shutdown.changed() => break,
                }
                continue;
            }
        };

        for entry in entries {
            dispatch_entry(&config, &*log, &*handler, entry).await;
        }
    }
    info!(stream = %config.stream, group = %config.group, "consumer stopped");
}

async fn dispatch_entry(
    config: &ConsumerConfig,
    log: &dyn EventLog,
    handler: &dyn StreamHandler,
    entry: Entry,
) {
    match handler.handle(&entry).await {
        HandlerOutcome::Ack => {
            ack_entry(config, log, &entry).await;
        }
        HandlerOutcome::Defer => {
            debug!(stream = %config.stream, id = %entry.id, "ack deferred to downstream owner");
        }
        HandlerOutcome::Retry => {
            if entry.delivery_count >= config.max_attempts {
                warn!(
                    stream = %config.stream,
                    id = %entry.id,
                    attempts = entry.delivery_count,
                    "retry budget exhausted, dead-lettering"
                );
                dead_letter(config, log, &entry, "RETRY_EXHAUSTED", "retry budget exhausted")
                    .await;
            } else {
                debug!(
                    stream = %config.stream,
                    id = %entry.id,
                    attempt = entry.delivery_count,
                    "left pending for redelivery"
                );
            }
        }
        HandlerOutcome::DeadLetter { kind, detail } => {
            dead_letter(config, log, &entry, kind, &detail).await;
        }
    }
}

async fn ack_entry(config: &ConsumerConfig, log: &dyn EventLog, entry: &Entry) {
    if let Err(error) = log.ack(&config.stream, &config.group, &[entry.id]).await {
        // Left pending: the entry redelivers and idempotent handling
        // absorbs the duplicate.
        warn!(stream = %config.stream, id = %entry.id, %error, "ack failed");
    }
}

async fn dead_letter(
    config: &ConsumerConfig,
    log: &dyn EventLog,
    entry: &Entry,
    kind: &'static str,
    detail: &str,
) {
    let letter = DeadLetter {
        origin_stream: config.stream.clone(),
        fields: entry.fields.clone(),
        error_kind: kind.to_string(),
        detail: (!detail.is_empty()).then(|| detail.to_string()),
    };
    let fields = match wire::WireEvent::encode("dead-letter", &letter) {
        Ok(event) => event.with_service(config.consumer_id.clone()).into_fields(),
        Err(error) => {
            error!(stream = %config.stream, id = %entry.id, %error, "dead letter encode failed");
            return;
        }
    };
    match log.append(streams::DLQ, fields).await {
        Ok(_) => ack_entry(config, log, entry).await,
        Err(error) => {
            // Leave the entry pending rather than lose it.
            warn!(stream = %config.stream, id = %entry.id, %error, "dead letter append failed");
        }
    }
}
