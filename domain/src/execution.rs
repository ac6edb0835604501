use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// Outcome of one execution attempt.
///
/// Exactly one result is appended to the execution-results stream per
/// accepted opportunity, success or failure. The coordinator ingests these
/// into its system metrics; the trade log persists them line-by-line.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub opportunity_id: SmolStr,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_profit: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas_used: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas_cost: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain: Option<SmolStr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dex: Option<SmolStr>,
}

impl ExecutionResult {
    /// A failure result carrying only an error reason.
    pub fn failure(
        opportunity_id: impl Into<SmolStr>,
        error: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            opportunity_id: opportunity_id.into(),
            success: false,
            transaction_hash: None,
            actual_profit: None,
            gas_used: None,
            gas_cost: None,
            error: Some(error.into()),
            timestamp,
            chain: None,
            dex: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_failure_result_serialises_without_optional_fields() {
        let result = ExecutionResult::failure(
            "opp-9",
            "timeout",
            Utc.timestamp_millis_opt(1_700_000_000_000).unwrap(),
        );
        let json = serde_json::to_value(&result).unwrap();

        assert_eq!(json["opportunityId"], "opp-9");
        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "timeout");
        assert!(json.get("transactionHash").is_none());
        assert!(json.get("actualProfit").is_none());
    }
}
