use macaw_domain::Opportunity;
use macaw_substrate::EntryId;
use parking_lot::{Mutex, RwLock};
use std::collections::VecDeque;
use std::fmt;
use tokio::sync::Notify;
use tracing::{debug, info};

/// Watermark configuration of the bounded queue.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Hard cap; additions beyond this are rejected outright.
    pub max_size: usize,
    /// Crossing this upward trips backpressure: further adds are refused
    /// until the queue drains to the low watermark.
    pub high_watermark: usize,
    /// Draining to this releases backpressure.
    pub low_watermark: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_size: 1000,
            high_watermark: 800,
            low_watermark: 200,
        }
    }
}

/// One queued opportunity plus the log entry it came from, so the
/// pipeline can ack after result publication.
#[derive(Debug, Clone)]
pub struct QueueItem {
    pub opportunity: Opportunity,
    pub entry_id: EntryId,
}

/// Why an enqueue was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum EnqueueError {
    #[error("queue is at its hard cap")]
    Full,
    #[error("queue is in backpressure")]
    Backpressure,
}

type PauseCallback = Box<dyn Fn(bool) + Send + Sync>;

/// Bounded FIFO of opportunities with watermark backpressure and an
/// independent manual pause.
///
/// Backpressure gates *additions*: once size crosses the high watermark
/// no more items are accepted until the pipeline drains the queue to the
/// low watermark. Manual pause gates *draining* and is used for standby
/// instances, which keep accepting items so a promoted standby starts
/// with a warm queue. The queue reports itself paused when either flag is
/// set.
///
/// [`wait_for_item`](Self::wait_for_item) is the pipeline's primary
/// work signal; the pipeline backs it with a one-second fallback tick.
pub struct OpportunityQueue {
    config: QueueConfig,
    inner: Mutex<Inner>,
    item_available: Notify,
    on_pause_change: RwLock<Option<PauseCallback>>,
}

#[derive(Debug, Default)]
struct Inner {
    items: VecDeque<QueueItem>,
    backpressured: bool,
    manually_paused: bool,
}

impl Inner {
    fn is_paused(&self) -> bool {
        self.backpressured || self.manually_paused
    }
}

impl fmt::Debug for OpportunityQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("OpportunityQueue")
            .field("size", &inner.items.len())
            .field("backpressured", &inner.backpressured)
            .field("manually_paused", &inner.manually_paused)
            .finish_non_exhaustive()
    }
}

impl OpportunityQueue {
    pub fn new(config: QueueConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner::default()),
            item_available: Notify::new(),
            on_pause_change: RwLock::new(None),
        }
    }

    /// Starts the queue manually paused (standby mode).
    pub fn new_paused(config: QueueConfig) -> Self {
        let queue = Self::new(config);
        queue.inner.lock().manually_paused = true;
        queue
    }

    /// Registers the pause-state callback, fired with the combined paused
    /// flag whenever it changes.
    pub fn set_on_pause_change(&self, callback: PauseCallback) {
        *self.on_pause_change.write() = Some(callback);
    }

    pub fn enqueue(&self, item: QueueItem) -> Result<(), EnqueueError> {
        let pause_flip = {
            let mut inner = self.inner.lock();
            if inner.items.len() >= self.config.max_size {
                return Err(EnqueueError::Full);
            }
            if inner.backpressured {
                return Err(EnqueueError::Backpressure);
            }
            let was_paused = inner.is_paused();
            inner.items.push_back(item);
            if inner.items.len() >= self.config.high_watermark {
                info!(size = inner.items.len(), "queue crossed high watermark, backpressure on");
                inner.backpressured = true;
            }
            (!was_paused && inner.is_paused()).then_some(true)
        };

        if let Some(paused) = pause_flip {
            self.fire_pause_change(paused);
        }
        self.item_available.notify_one();
        Ok(())
    }

    /// Pops the next item unless the queue is manually paused.
    pub fn dequeue(&self) -> Option<QueueItem> {
        let (item, pause_flip) = {
            let mut inner = self.inner.lock();
            if inner.manually_paused {
                return None;
            }
            let was_paused = inner.is_paused();
            let item = inner.items.pop_front()?;
            if inner.backpressured && inner.items.len() <= self.config.low_watermark {
                info!(size = inner.items.len(), "queue drained to low watermark, backpressure off");
                inner.backpressured = false;
            }
            (item, (was_paused && !inner.is_paused()).then_some(false))
        };

        if let Some(paused) = pause_flip {
            self.fire_pause_change(paused);
        }
        Some(item)
    }

    pub fn can_enqueue(&self) -> bool {
        let inner = self.inner.lock();
        !inner.backpressured && inner.items.len() < self.config.max_size
    }

    pub fn size(&self) -> usize {
        self.inner.lock().items.len()
    }

    /// Combined paused flag: backpressure or manual.
    pub fn is_paused(&self) -> bool {
        self.inner.lock().is_paused()
    }

    pub fn is_manually_paused(&self) -> bool {
        self.inner.lock().manually_paused
    }

    /// Manual pause for standby operation. Idempotent.
    pub fn pause(&self) {
        let flipped = {
            let mut inner = self.inner.lock();
            if inner.manually_paused {
                return;
            }
            let was_paused = inner.is_paused();
            inner.manually_paused = true;
            !was_paused
        };
        debug!("queue manually paused");
        if flipped {
            self.fire_pause_change(true);
        }
    }

    /// Clears the manual pause. Idempotent; backpressure is unaffected.
    pub fn resume(&self) {
        let flipped = {
            let mut inner = self.inner.lock();
            if !inner.manually_paused {
                return;
            }
            inner.manually_paused = false;
            !inner.is_paused()
        };
        debug!("queue manually resumed");
        if flipped {
            self.fire_pause_change(false);
        }
        self.item_available.notify_one();
    }

    pub fn clear(&self) -> usize {
        let mut inner = self.inner.lock();
        let drained = inner.items.len();
        inner.items.clear();
        // Backpressure cannot outlive an empty queue.
        let was_paused = inner.is_paused();
        inner.backpressured = false;
        let flipped = was_paused && !inner.is_paused();
        drop(inner);
        if flipped {
            self.fire_pause_change(false);
        }
        drained
    }

    /// Resolves when an item may be available. Primary pipeline signal;
    /// spurious wake-ups are expected.
    pub async fn wait_for_item(&self) {
        self.item_available.notified().await;
    }

    fn fire_pause_change(&self, paused: bool) {
        if let Some(callback) = self.on_pause_change.read().as_ref() {
            callback(paused);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use macaw_domain::OpportunityKind;
    use smol_str::SmolStr;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn item(id: &str) -> QueueItem {
        QueueItem {
            opportunity: Opportunity {
                id: SmolStr::new(id),
                kind: OpportunityKind::CrossDex,
                source_chain: None,
                target_chain: None,
                dex: None,
                expected_profit: 1.0,
                confidence: 0.9,
                amount: None,
                timestamp: Utc::now(),
                expires_at: None,
                status: Default::default(),
                data: serde_json::Value::Null,
            },
            entry_id: EntryId::ZERO,
        }
    }

    fn small_queue() -> OpportunityQueue {
        OpportunityQueue::new(QueueConfig {
            max_size: 10,
            high_watermark: 8,
            low_watermark: 2,
        })
    }

    #[test]
    fn test_fifo_order() {
        let queue = small_queue();
        queue.enqueue(item("a")).unwrap();
        queue.enqueue(item("b")).unwrap();
        assert_eq!(queue.dequeue().unwrap().opportunity.id, "a");
        assert_eq!(queue.dequeue().unwrap().opportunity.id, "b");
        assert!(queue.dequeue().is_none());
    }

    #[test]
    fn test_backpressure_trips_at_high_and_releases_at_low() {
        let queue = small_queue();
        for i in 0..8 {
            queue.enqueue(item(&i.to_string())).unwrap();
        }
        // Crossed the high watermark: adds refused.
        assert!(!queue.can_enqueue());
        assert!(queue.is_paused());
        assert_eq!(queue.enqueue(item("x")), Err(EnqueueError::Backpressure));

        // Draining above the low watermark keeps backpressure on.
        for _ in 0..5 {
            queue.dequeue().unwrap();
        }
        assert!(!queue.can_enqueue());

        // Reaching the low watermark releases it.
        queue.dequeue().unwrap();
        assert_eq!(queue.size(), 2);
        assert!(queue.can_enqueue());
        queue.enqueue(item("y")).unwrap();
    }

    #[test]
    fn test_hard_cap_rejects_as_full() {
        let queue = OpportunityQueue::new(QueueConfig {
            max_size: 2,
            high_watermark: 5,
            low_watermark: 1,
        });
        queue.enqueue(item("a")).unwrap();
        queue.enqueue(item("b")).unwrap();
        assert_eq!(queue.enqueue(item("c")), Err(EnqueueError::Full));
    }

    #[test]
    fn test_manual_pause_blocks_dequeue_but_not_enqueue() {
        let queue = small_queue();
        queue.pause();
        queue.enqueue(item("a")).unwrap();
        assert!(queue.dequeue().is_none());
        assert!(queue.is_paused());
        assert!(queue.is_manually_paused());

        queue.resume();
        assert!(queue.dequeue().is_some());
    }

    #[test]
    fn test_pause_and_resume_are_idempotent() {
        let queue = small_queue();
        let changes = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&changes);
        queue.set_on_pause_change(Box::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        queue.pause();
        queue.pause();
        assert_eq!(changes.load(Ordering::SeqCst), 1);

        queue.resume();
        queue.resume();
        assert_eq!(changes.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_pause_callback_reports_combined_state() {
        let queue = small_queue();
        let observed = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&observed);
        queue.set_on_pause_change(Box::new(move |paused| {
            sink.lock().push(paused);
        }));

        for i in 0..8 {
            queue.enqueue(item(&i.to_string())).unwrap();
        }
        for _ in 0..6 {
            queue.dequeue();
        }
        assert_eq!(*observed.lock(), vec![true, false]);
    }

    #[test]
    fn test_clear_empties_and_lifts_backpressure() {
        let queue = small_queue();
        for i in 0..8 {
            queue.enqueue(item(&i.to_string())).unwrap();
        }
        assert_eq!(queue.clear(), 8);
        assert_eq!(queue.size(), 0);
        assert!(queue.can_enqueue());
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_item_wakes_on_enqueue() {
        let queue = Arc::new(small_queue());
        let waiter = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move {
                queue.wait_for_item().await;
                queue.dequeue().map(|item| item.opportunity.id)
            })
        };
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        queue.enqueue(item("woken")).unwrap();
        assert_eq!(waiter.await.unwrap().unwrap(), "woken");
    }
}
