use crate::SubstrateError;
use async_trait::async_trait;
use std::time::Duration;

/// Key/value primitives both services synchronise through.
///
/// Values are opaque strings. Leadership and distributed locking rest
/// entirely on [`set_if_absent`](Self::set_if_absent) being atomic in the
/// backing store; fencing is plain string equality on the stored owner id.
#[async_trait]
pub trait KvStore: Send + Sync + 'static {
    async fn get(&self, key: &str) -> Result<Option<String>, SubstrateError>;

    async fn set(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<(), SubstrateError>;

    /// Stores `value` only when `key` is absent. Returns whether the write
    /// happened.
    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, SubstrateError>;

    /// Deletes `key`, reporting whether it existed.
    async fn del(&self, key: &str) -> Result<bool, SubstrateError>;

    /// Refreshes the TTL of an existing key. Returns false when the key is
    /// gone.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, SubstrateError>;

    /// Increments the integer at `key` (from 0 when absent) and returns
    /// the new value.
    async fn incr(&self, key: &str) -> Result<i64, SubstrateError>;

    /// Liveness probe against the backing store.
    async fn ping(&self) -> Result<(), SubstrateError>;
}
