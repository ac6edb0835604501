use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A candidate arbitrage action identified by the detector fleet.
///
/// Detectors create opportunities and append them to the opportunities
/// stream; the execution engine reads them, mutates only the
/// [`status`](Self::status), and publishes exactly one
/// [`ExecutionResult`](crate::ExecutionResult) per accepted opportunity.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Opportunity {
    /// Unique opportunity id assigned by the detector.
    pub id: SmolStr,
    /// Opportunity class, drives strategy selection.
    #[serde(rename = "type")]
    pub kind: OpportunityKind,
    /// Chain the position is sourced on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_chain: Option<SmolStr>,
    /// Chain the position settles on, when it differs from the source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_chain: Option<SmolStr>,
    /// Venue hint for cross-dex opportunities.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dex: Option<SmolStr>,
    /// Profit the detector expects, in quote units.
    pub expected_profit: f64,
    /// Detector confidence in `[0, 1]`.
    pub confidence: f64,
    /// Capital the detector sized the opportunity at. The risk gate may
    /// override this before execution.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
    /// When the detector observed the opportunity.
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    /// Hard expiry after which execution is pointless.
    #[serde(
        default,
        with = "chrono::serde::ts_milliseconds_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub status: OpportunityStatus,
    /// Detector-specific payload, passed through untouched.
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub data: serde_json::Value,
}

impl Opportunity {
    /// Returns true once `now` has passed the opportunity expiry.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expiry| now >= expiry)
    }

    /// Validates the opportunity against the engine acceptance gate.
    ///
    /// An opportunity is valid when its id is non-empty, confidence meets
    /// the configured threshold, and the expected profit is finite and
    /// non-negative.
    pub fn validate(&self, min_confidence: f64) -> Result<(), ValidationError> {
        if self.id.is_empty() {
            return Err(ValidationError::EmptyId);
        }
        if !self.confidence.is_finite() || self.confidence < min_confidence {
            return Err(ValidationError::ConfidenceBelowThreshold {
                confidence: self.confidence,
                threshold: min_confidence,
            });
        }
        if !self.expected_profit.is_finite() || self.expected_profit < 0.0 {
            return Err(ValidationError::InvalidExpectedProfit(self.expected_profit));
        }
        Ok(())
    }
}

/// Opportunity classes recognised by the strategy factory.
///
/// The set is open: detectors may emit classes this build has no strategy
/// for, which the factory surfaces as an unsupported-kind error rather
/// than a parse failure.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum OpportunityKind {
    CrossDex,
    CrossChain,
    Backrun,
    Liquidation,
    Other(SmolStr),
}

impl OpportunityKind {
    pub fn as_str(&self) -> &str {
        match self {
            Self::CrossDex => "cross-dex",
            Self::CrossChain => "cross-chain",
            Self::Backrun => "backrun",
            Self::Liquidation => "liquidation",
            Self::Other(kind) => kind,
        }
    }
}

impl fmt::Display for OpportunityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OpportunityKind {
    type Err = std::convert::Infallible;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Ok(match value {
            "cross-dex" => Self::CrossDex,
            "cross-chain" => Self::CrossChain,
            "backrun" => Self::Backrun,
            "liquidation" => Self::Liquidation,
            other => Self::Other(SmolStr::new(other)),
        })
    }
}

impl Serialize for OpportunityKind {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for OpportunityKind {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = SmolStr::deserialize(deserializer)?;
        Ok(value.as_str().parse().unwrap_or(Self::Other(value)))
    }
}

/// Lifecycle of an opportunity inside the engine.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OpportunityStatus {
    #[default]
    Pending,
    Executing,
    Completed,
    Failed,
    Expired,
}

/// Why an opportunity failed the acceptance gate.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("opportunity id is empty")]
    EmptyId,
    #[error("confidence {confidence} below threshold {threshold}")]
    ConfidenceBelowThreshold { confidence: f64, threshold: f64 },
    #[error("expected profit {0} is not finite and non-negative")]
    InvalidExpectedProfit(f64),
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn opportunity() -> Opportunity {
        Opportunity {
            id: SmolStr::new("opp-1"),
            kind: OpportunityKind::CrossDex,
            source_chain: Some(SmolStr::new("ethereum")),
            target_chain: None,
            dex: Some(SmolStr::new("uniswap-v3")),
            expected_profit: 42.5,
            confidence: 0.9,
            amount: Some(1_000.0),
            timestamp: Utc.timestamp_millis_opt(1_700_000_000_000).unwrap(),
            expires_at: None,
            status: OpportunityStatus::Pending,
            data: serde_json::Value::Null,
        }
    }

    #[test]
    fn test_validate_accepts_well_formed_opportunity() {
        assert_eq!(opportunity().validate(0.7), Ok(()));
    }

    #[test]
    fn test_validate_rejects_empty_id() {
        let mut opp = opportunity();
        opp.id = SmolStr::default();
        assert_eq!(opp.validate(0.7), Err(ValidationError::EmptyId));
    }

    #[test]
    fn test_validate_rejects_low_confidence() {
        let mut opp = opportunity();
        opp.confidence = 0.5;
        assert!(matches!(
            opp.validate(0.7),
            Err(ValidationError::ConfidenceBelowThreshold { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_non_finite_profit() {
        let mut opp = opportunity();
        opp.expected_profit = f64::NAN;
        assert!(matches!(
            opp.validate(0.7),
            Err(ValidationError::InvalidExpectedProfit(_))
        ));

        opp.expected_profit = -1.0;
        assert!(matches!(
            opp.validate(0.7),
            Err(ValidationError::InvalidExpectedProfit(_))
        ));
    }

    #[test]
    fn test_kind_round_trips_unknown_values() {
        let kind: OpportunityKind = "sandwich".parse().unwrap();
        assert_eq!(kind, OpportunityKind::Other(SmolStr::new("sandwich")));
        assert_eq!(kind.to_string(), "sandwich");
    }

    #[test]
    fn test_opportunity_json_uses_camel_case_and_type_tag() {
        let json = serde_json::to_value(opportunity()).unwrap();
        assert_eq!(json["type"], "cross-dex");
        assert_eq!(json["expectedProfit"], 42.5);
        assert_eq!(json["timestamp"], 1_700_000_000_000_i64);
    }

    #[test]
    fn test_is_expired_honours_expiry() {
        let mut opp = opportunity();
        let now = opp.timestamp;
        assert!(!opp.is_expired(now));

        opp.expires_at = Some(now);
        assert!(opp.is_expired(now));
    }
}
