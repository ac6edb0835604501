use crate::SubstrateError;
use async_trait::async_trait;
use derive_more::Constructor;
use macaw_domain::FieldMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Identifier of one log entry: milliseconds since epoch plus a sequence
/// number disambiguating entries appended in the same millisecond.
///
/// Ids are strictly monotone per stream and render as `ms-seq`.
#[derive(
    Debug,
    Copy,
    Clone,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Deserialize,
    Serialize,
    Constructor,
)]
pub struct EntryId {
    pub ms: u64,
    pub seq: u64,
}

impl EntryId {
    pub const ZERO: EntryId = EntryId { ms: 0, seq: 0 };

    /// The smallest id strictly greater than `self`.
    pub fn next(self) -> Self {
        Self {
            ms: self.ms,
            seq: self.seq + 1,
        }
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.ms, self.seq)
    }
}

impl FromStr for EntryId {
    type Err = SubstrateError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let malformed = || SubstrateError::MalformedEntryId(value.to_string());
        let (ms, seq) = value.split_once('-').ok_or_else(malformed)?;
        Ok(Self {
            ms: ms.parse().map_err(|_| malformed())?,
            seq: seq.parse().map_err(|_| malformed())?,
        })
    }
}

/// One delivered log entry.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub id: EntryId,
    pub fields: FieldMap,
    /// How many times this entry has been delivered to the reading
    /// consumer, 1 on first delivery.
    pub delivery_count: u32,
}

/// Where a newly created group starts reading.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub enum GroupStart {
    /// Only entries appended after group creation.
    #[default]
    Tail,
    /// The full retained stream.
    Beginning,
}

/// Pending-entry summary for lag reporting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingSummary {
    pub count: u64,
    pub min: Option<EntryId>,
    pub max: Option<EntryId>,
}

/// Ordered append-only log with per-stream consumer groups.
///
/// Semantics the processing plane depends on:
/// - [`append`](Self::append) produces strictly monotone ids per stream;
/// - [`create_group`](Self::create_group) is idempotent;
/// - [`read_group`](Self::read_group) delivers each entry to exactly one
///   consumer of the group at a time, redelivering a consumer's unacked
///   entries on its next read, and blocks up to `block` when nothing is
///   available;
/// - [`ack`](Self::ack) removes entries from the group's pending list.
#[async_trait]
pub trait EventLog: Send + Sync + 'static {
    async fn append(&self, stream: &str, fields: FieldMap) -> Result<EntryId, SubstrateError>;

    async fn create_group(
        &self,
        stream: &str,
        group: &str,
        from: GroupStart,
    ) -> Result<(), SubstrateError>;

    async fn read_group(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
        block: Duration,
    ) -> Result<Vec<Entry>, SubstrateError>;

    async fn ack(&self, stream: &str, group: &str, ids: &[EntryId]) -> Result<u64, SubstrateError>;

    async fn pending(&self, stream: &str, group: &str) -> Result<PendingSummary, SubstrateError>;

    async fn len(&self, stream: &str) -> Result<u64, SubstrateError>;

    async fn trim(&self, stream: &str, max_len: u64) -> Result<u64, SubstrateError>;
}
