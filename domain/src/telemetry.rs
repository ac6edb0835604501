//! Market telemetry events the coordinator folds into system metrics.
//!
//! These are thin records: the coordinator only counts them and
//! accumulates volumes, so unknown extra fields are dropped at decode.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// A single large transfer flagged by a whale detector.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WhaleAlert {
    pub chain: SmolStr,
    pub token: SmolStr,
    pub amount_usd: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_hash: Option<String>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
}

/// One observed swap on a tracked venue.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapEvent {
    pub chain: SmolStr,
    pub dex: SmolStr,
    pub amount_usd: f64,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
}

/// Rolling volume aggregate emitted by the analysis workers.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeAggregate {
    pub chain: SmolStr,
    pub window_secs: u64,
    pub volume_usd: f64,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
}

/// Spot price refresh for a tracked token.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceUpdate {
    pub chain: SmolStr,
    pub token: SmolStr,
    pub price_usd: f64,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
}
