//! Stream names shared by the whole fleet.
//!
//! Detectors, analysis workers, the coordinator and the execution engine
//! all address the log through these constants; renaming one is a
//! fleet-wide migration.

use macaw_domain::FieldMap;
use serde::{Deserialize, Serialize};

/// Service health heartbeats from every fleet member.
pub const HEALTH: &str = "stream:health";
/// Candidate opportunities appended by detectors.
pub const OPPORTUNITIES: &str = "stream:opportunities";
/// Large-transfer alerts from whale detectors.
pub const WHALE_ALERTS: &str = "stream:whale-alerts";
/// Raw swap observations.
pub const SWAP_EVENTS: &str = "stream:swap-events";
/// Rolling volume aggregates from analysis workers.
pub const VOLUME_AGGREGATES: &str = "stream:volume-aggregates";
/// Token price refreshes.
pub const PRICE_UPDATES: &str = "stream:price-updates";
/// Privileged execution requests (admin restarts and the like).
pub const EXECUTION_REQUESTS: &str = "stream:execution-requests";
/// One result per accepted opportunity, success or failure.
pub const EXECUTION_RESULTS: &str = "stream:execution-results";
/// Entries no handler could process.
pub const DLQ: &str = "stream:dlq";
/// Circuit-breaker state transitions.
pub const CIRCUIT_BREAKER_EVENTS: &str = "stream:circuit-breaker-events";

/// A message parked on [`DLQ`] after parsing or deterministic handler
/// failure.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetter {
    /// Stream the entry was originally appended to.
    pub origin_stream: String,
    /// Raw fields of the failed entry.
    pub fields: FieldMap,
    /// Error kind that sent it here, e.g. `INVALID_OPPORTUNITY`.
    pub error_kind: String,
    /// Human-readable failure detail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}
