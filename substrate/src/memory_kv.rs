use crate::kv::KvStore;
use crate::SubstrateError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;

/// In-memory [`KvStore`] with lazy TTL expiry.
///
/// Expired keys are dropped the next time anything touches them, which is
/// enough for leadership and locking semantics: an expired key behaves as
/// absent for `get`, `set_if_absent`, `expire` and `del`.
#[derive(Debug, Default)]
pub struct MemoryKvStore {
    inner: Mutex<HashMap<String, StoredValue>>,
}

#[derive(Debug, Clone)]
struct StoredValue {
    value: String,
    expires_at: Option<DateTime<Utc>>,
}

impl StoredValue {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|deadline| now >= deadline)
    }
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn expiry(ttl: Duration) -> Option<DateTime<Utc>> {
        chrono::Duration::from_std(ttl)
            .ok()
            .map(|ttl| Utc::now() + ttl)
    }

    fn evict_expired(inner: &mut HashMap<String, StoredValue>, key: &str) {
        let now = Utc::now();
        if inner.get(key).is_some_and(|stored| stored.is_expired(now)) {
            inner.remove(key);
        }
    }
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>, SubstrateError> {
        let mut inner = self.inner.lock();
        Self::evict_expired(&mut inner, key);
        Ok(inner.get(key).map(|stored| stored.value.clone()))
    }

    async fn set(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<(), SubstrateError> {
        let mut inner = self.inner.lock();
        inner.insert(
            key.to_string(),
            StoredValue {
                value: value.to_string(),
                expires_at: ttl.and_then(Self::expiry),
            },
        );
        Ok(())
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, SubstrateError> {
        let mut inner = self.inner.lock();
        Self::evict_expired(&mut inner, key);
        if inner.contains_key(key) {
            return Ok(false);
        }
        inner.insert(
            key.to_string(),
            StoredValue {
                value: value.to_string(),
                expires_at: Self::expiry(ttl),
            },
        );
        Ok(true)
    }

    async fn del(&self, key: &str) -> Result<bool, SubstrateError> {
        let mut inner = self.inner.lock();
        Self::evict_expired(&mut inner, key);
        Ok(inner.remove(key).is_some())
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, SubstrateError> {
        let mut inner = self.inner.lock();
        Self::evict_expired(&mut inner, key);
        match inner.get_mut(key) {
            Some(stored) => {
                stored.expires_at = Self::expiry(ttl);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn incr(&self, key: &str) -> Result<i64, SubstrateError> {
        let mut inner = self.inner.lock();
        Self::evict_expired(&mut inner, key);
        let next = match inner.get(key) {
            Some(stored) => stored
                .value
                .parse::<i64>()
                .map_err(|_| SubstrateError::Io(format!("key `{key}` is not an integer")))?
                .saturating_add(1),
            None => 1,
        };
        let expires_at = inner.get(key).and_then(|stored| stored.expires_at);
        inner.insert(
            key.to_string(),
            StoredValue {
                value: next.to_string(),
                expires_at,
            },
        );
        Ok(next)
    }

    async fn ping(&self) -> Result<(), SubstrateError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_if_absent_is_first_writer_wins() {
        let kv = MemoryKvStore::new();
        assert!(kv
            .set_if_absent("lock", "owner-a", Duration::from_secs(60))
            .await
            .unwrap());
        assert!(!kv
            .set_if_absent("lock", "owner-b", Duration::from_secs(60))
            .await
            .unwrap());
        assert_eq!(kv.get("lock").await.unwrap().as_deref(), Some("owner-a"));
    }

    #[tokio::test]
    async fn test_expired_key_behaves_as_absent() {
        let kv = MemoryKvStore::new();
        kv.set_if_absent("lock", "owner-a", Duration::ZERO)
            .await
            .unwrap();

        assert_eq!(kv.get("lock").await.unwrap(), None);
        assert!(kv
            .set_if_absent("lock", "owner-b", Duration::from_secs(60))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_expire_refreshes_only_live_keys() {
        let kv = MemoryKvStore::new();
        kv.set("k", "v", None).await.unwrap();
        assert!(kv.expire("k", Duration::from_secs(60)).await.unwrap());
        assert!(!kv.expire("missing", Duration::from_secs(60)).await.unwrap());
    }

    #[tokio::test]
    async fn test_incr_counts_from_zero() {
        let kv = MemoryKvStore::new();
        assert_eq!(kv.incr("hits").await.unwrap(), 1);
        assert_eq!(kv.incr("hits").await.unwrap(), 2);
        assert_eq!(kv.incr("hits").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_incr_rejects_non_integer() {
        let kv = MemoryKvStore::new();
        kv.set("k", "owner", None).await.unwrap();
        assert!(kv.incr("k").await.is_err());
    }

    #[tokio::test]
    async fn test_del_reports_existence() {
        let kv = MemoryKvStore::new();
        kv.set("k", "v", None).await.unwrap();
        assert!(kv.del("k").await.unwrap());
        assert!(!kv.del("k").await.unwrap());
    }
}
