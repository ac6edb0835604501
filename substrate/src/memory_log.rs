use crate::log::{Entry, EntryId, EventLog, GroupStart, PendingSummary};
use crate::SubstrateError;
use async_trait::async_trait;
use chrono::Utc;
use macaw_domain::FieldMap;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

/// In-memory [`EventLog`] with the same delivery semantics the services
/// expect from the production store: strictly monotone ids, idempotent
/// group creation, per-consumer pending lists with redelivery on the next
/// read, and blocking reads woken by appends.
#[derive(Debug, Default)]
pub struct MemoryEventLog {
    inner: Mutex<HashMap<String, StreamState>>,
}

#[derive(Debug)]
struct StreamState {
    entries: VecDeque<StoredEntry>,
    last_id: EntryId,
    groups: HashMap<String, GroupState>,
    appended: Arc<Notify>,
}

#[derive(Debug, Clone)]
struct StoredEntry {
    id: EntryId,
    fields: FieldMap,
}

#[derive(Debug, Default)]
struct GroupState {
    /// Last id handed out to any consumer; new deliveries start after it.
    cursor: EntryId,
    pending: BTreeMap<EntryId, PendingDelivery>,
}

#[derive(Debug)]
struct PendingDelivery {
    consumer: String,
    delivery_count: u32,
}

impl Default for StreamState {
    fn default() -> Self {
        Self {
            entries: VecDeque::new(),
            last_id: EntryId::ZERO,
            groups: HashMap::new(),
            appended: Arc::new(Notify::new()),
        }
    }
}

impl MemoryEventLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(last: EntryId) -> EntryId {
        let ms = Utc::now().timestamp_millis().max(0) as u64;
        if ms > last.ms {
            EntryId::new(ms, 0)
        } else {
            last.next()
        }
    }

    /// Pending redeliveries for `consumer`, then undelivered entries after
    /// the group cursor, up to `count`.
    fn take_batch(
        stream: &mut StreamState,
        group_name: &str,
        consumer: &str,
        count: usize,
    ) -> Vec<Entry> {
        let Some(group) = stream.groups.get_mut(group_name) else {
            return Vec::new();
        };

        let mut batch = Vec::new();
        let redeliver: Vec<EntryId> = group
            .pending
            .iter()
            .filter(|(_, delivery)| delivery.consumer == consumer)
            .map(|(id, _)| *id)
            .take(count)
            .collect();
        for id in redeliver {
            let delivery = group.pending.get_mut(&id).expect("pending id just listed");
            delivery.delivery_count += 1;
            if let Some(stored) = stream.entries.iter().find(|entry| entry.id == id) {
                batch.push(Entry {
                    id,
                    fields: stored.fields.clone(),
                    delivery_count: delivery.delivery_count,
                });
            } else {
                // Trimmed out from under the pending list; drop the claim.
                group.pending.remove(&id);
            }
        }

        for stored in stream.entries.iter() {
            if batch.len() >= count {
                break;
            }
            if stored.id <= group.cursor {
                continue;
            }
            group.cursor = stored.id;
            group.pending.insert(
                stored.id,
                PendingDelivery {
                    consumer: consumer.to_string(),
                    delivery_count: 1,
                },
            );
            batch.push(Entry {
                id: stored.id,
                fields: stored.fields.clone(),
                delivery_count: 1,
            });
        }

        batch
    }
}

#[async_trait]
impl EventLog for MemoryEventLog {
    async fn append(&self, stream: &str, fields: FieldMap) -> Result<EntryId, SubstrateError> {
        let mut inner = self.inner.lock();
        let state = inner.entry(stream.to_string()).or_default();
        let id = Self::next_id(state.last_id);
        state.last_id = id;
        state.entries.push_back(StoredEntry { id, fields });
        state.appended.notify_waiters();
        Ok(id)
    }

    async fn create_group(
        &self,
        stream: &str,
        group: &str,
        from: GroupStart,
    ) -> Result<(), SubstrateError> {
        let mut inner = self.inner.lock();
        let state = inner.entry(stream.to_string()).or_default();
        if state.groups.contains_key(group) {
            return Ok(());
        }
        let cursor = match from {
            GroupStart::Tail => state.last_id,
            GroupStart::Beginning => EntryId::ZERO,
        };
        state.groups.insert(
            group.to_string(),
            GroupState {
                cursor,
                pending: BTreeMap::new(),
            },
        );
        Ok(())
    }

    async fn read_group(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
        block: Duration,
    ) -> Result<Vec<Entry>, SubstrateError> {
        let deadline = Instant::now() + block;
        loop {
            let (batch, appended) = {
                let mut inner = self.inner.lock();
                let state = inner
                    .get_mut(stream)
                    .ok_or_else(|| SubstrateError::NoSuchStream(stream.to_string()))?;
                if !state.groups.contains_key(group) {
                    return Err(SubstrateError::NoSuchGroup {
                        stream: stream.to_string(),
                        group: group.to_string(),
                    });
                }
                (
                    Self::take_batch(state, group, consumer, count),
                    Arc::clone(&state.appended),
                )
            };

            if !batch.is_empty() {
                return Ok(batch);
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(Vec::new());
            }
            tokio::select! {
                _ = appended.notified() => {}
                _ = tokio::time::sleep_until(deadline) => return Ok(Vec::new()),
            }
        }
    }

    async fn ack(&self, stream: &str, group: &str, ids: &[EntryId]) -> Result<u64, SubstrateError> {
        let mut inner = self.inner.lock();
        let state = inner
            .get_mut(stream)
            .ok_or_else(|| SubstrateError::NoSuchStream(stream.to_string()))?;
        let group = state
            .groups
            .get_mut(group)
            .ok_or_else(|| SubstrateError::NoSuchGroup {
                stream: stream.to_string(),
                group: group.to_string(),
            })?;
        let mut removed = 0;
        for id in ids {
            if group.pending.remove(id).is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn pending(&self, stream: &str, group: &str) -> Result<PendingSummary, SubstrateError> {
        let inner = self.inner.lock();
        let state = inner
            .get(stream)
            .ok_or_else(|| SubstrateError::NoSuchStream(stream.to_string()))?;
        let group = state
            .groups
            .get(group)
            .ok_or_else(|| SubstrateError::NoSuchGroup {
                stream: stream.to_string(),
                group: group.to_string(),
            })?;
        Ok(PendingSummary {
            count: group.pending.len() as u64,
            min: group.pending.keys().next().copied(),
            max: group.pending.keys().next_back().copied(),
        })
    }

    async fn len(&self, stream: &str) -> Result<u64, SubstrateError> {
        let inner = self.inner.lock();
        Ok(inner
            .get(stream)
            .map(|state| state.entries.len() as u64)
            .unwrap_or(0))
    }

    async fn trim(&self, stream: &str, max_len: u64) -> Result<u64, SubstrateError> {
        let mut inner = self.inner.lock();
        let Some(state) = inner.get_mut(stream) else {
            return Ok(0);
        };
        let mut dropped = 0;
        while state.entries.len() as u64 > max_len {
            state.entries.pop_front();
            dropped += 1;
        }
        Ok(dropped)
    }
}
