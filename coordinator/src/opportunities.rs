use chrono::{DateTime, Utc};
use macaw_domain::Opportunity;
use parking_lot::RwLock;
use smol_str::SmolStr;
use std::collections::BinaryHeap;
use std::collections::HashMap;

/// Default retention of the in-memory opportunity cache.
pub const MAX_OPPORTUNITIES: usize = 1000;

/// Bounded cache of recent opportunities.
///
/// Inserts are cheap map writes; pruning runs on the owner's one-second
/// batch cleanup timer, never inline per message. The prune drops expired
/// entries first, then the oldest by timestamp down to the cap.
#[derive(Debug)]
pub struct OpportunityCache {
    max_size: usize,
    entries: RwLock<HashMap<SmolStr, Opportunity>>,
}

impl Default for OpportunityCache {
    fn default() -> Self {
        Self::new(MAX_OPPORTUNITIES)
    }
}

impl OpportunityCache {
    pub fn new(max_size: usize) -> Self {
        Self {
            max_size,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Inserts or refreshes one opportunity.
    pub fn insert(&self, opportunity: Opportunity) {
        self.entries
            .write()
            .insert(opportunity.id.clone(), opportunity);
    }

    pub fn get(&self, id: &str) -> Option<Opportunity> {
        self.entries.read().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().len() == 0
    }

    /// Batch cleanup: expired first, then oldest-by-timestamp beyond the
    /// cap. Returns how many entries were dropped.
    pub fn prune(&self, now: DateTime<Utc>) -> usize {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, opportunity| !opportunity.is_expired(now));

        if entries.len() > self.max_size {
            let excess = entries.len() - self.max_size;
            let mut oldest: Vec<(DateTime<Utc>, SmolStr)> = entries
                .values()
                .map(|opportunity| (opportunity.timestamp, opportunity.id.clone()))
                .collect();
            oldest.sort();
            for (_, id) in oldest.into_iter().take(excess) {
                entries.remove(&id);
            }
        }
        before - entries.len()
    }

    /// The most recent `limit` opportunities by timestamp, newest first.
    ///
    /// Partial selection with a k-sized min-heap when the cache exceeds
    /// `limit` (O(n log k)); a plain sort otherwise.
    pub fn most_recent(&self, limit: usize) -> Vec<Opportunity> {
        let entries = self.entries.read();
        if entries.len() <= limit {
            let mut all: Vec<Opportunity> = entries.values().cloned().collect();
            all.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
            return all;
        }

        // Min-heap of the k newest (via Reverse on the timestamp key).
        let mut heap: BinaryHeap<std::cmp::Reverse<(DateTime<Utc>, SmolStr)>> =
            BinaryHeap::with_capacity(limit + 1);
        for opportunity in entries.values() {
            heap.push(std::cmp::Reverse((
                opportunity.timestamp,
                opportunity.id.clone(),
            )));
            if heap.len() > limit {
                heap.pop();
            }
        }
        let mut selected: Vec<Opportunity> = heap
            .into_iter()
            .filter_map(|std::cmp::Reverse((_, id))| entries.get(&id).cloned())
            .collect();
        selected.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        selected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use macaw_domain::OpportunityKind;

    fn opportunity(id: &str, at_ms: i64, expires_at: Option<i64>) -> Opportunity {
        Opportunity {
            id: SmolStr::new(id),
            kind: OpportunityKind::CrossDex,
            source_chain: None,
            target_chain: None,
            dex: None,
            expected_profit: 1.0,
            confidence: 0.9,
            amount: None,
            timestamp: Utc.timestamp_millis_opt(at_ms).unwrap(),
            expires_at: expires_at.map(|ms| Utc.timestamp_millis_opt(ms).unwrap()),
            status: Default::default(),
            data: serde_json::Value::Null,
        }
    }

    #[test]
    fn test_prune_drops_expired_then_oldest() {
        let cache = OpportunityCache::new(3);
        cache.insert(opportunity("expired", 100, Some(150)));
        for (i, at) in [(0, 200), (1, 300), (2, 400), (3, 500)] {
            cache.insert(opportunity(&format!("opp-{i}"), at, None));
        }

        let dropped = cache.prune(Utc.timestamp_millis_opt(1000).unwrap());
        // The expired entry and the oldest surviving entry both go.
        assert_eq!(dropped, 2);
        assert_eq!(cache.len(), 3);
        assert!(cache.get("expired").is_none());
        assert!(cache.get("opp-0").is_none());
        assert!(cache.get("opp-3").is_some());
    }

    #[test]
    fn test_most_recent_full_sort_under_limit() {
        let cache = OpportunityCache::default();
        cache.insert(opportunity("a", 100, None));
        cache.insert(opportunity("b", 300, None));
        cache.insert(opportunity("c", 200, None));

        let recent = cache.most_recent(10);
        let ids: Vec<&str> = recent.iter().map(|o| o.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c", "a"]);
    }

    #[test]
    fn test_most_recent_partial_selection_over_limit() {
        let cache = OpportunityCache::default();
        for i in 0..500 {
            cache.insert(opportunity(&format!("opp-{i}"), i * 10, None));
        }

        let top = cache.most_recent(100);
        assert_eq!(top.len(), 100);
        // Newest first, and exactly the newest 100.
        assert_eq!(top[0].id, "opp-499");
        assert_eq!(top[99].id, "opp-400");
        for pair in top.windows(2) {
            assert!(pair[0].timestamp >= pair[1].timestamp);
        }
    }

    #[test]
    fn test_insert_refreshes_existing_id() {
        let cache = OpportunityCache::default();
        cache.insert(opportunity("a", 100, None));
        cache.insert(opportunity("a", 900, None));
        assert_eq!(cache.len(), 1);
        assert_eq!(
            cache.get("a").unwrap().timestamp,
            Utc.timestamp_millis_opt(900).unwrap()
        );
    }
}
