use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// How urgently an alert needs eyes.
#[derive(
    Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Low,
    #[default]
    Warning,
    High,
    Critical,
}

/// An operational alert raised by either service.
///
/// Alerts pass through the cooldown manager before reaching the notifier:
/// two alerts sharing a [cooldown key](Self::cooldown_key) are never
/// emitted within the cooldown window of each other.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    /// Alert class, e.g. `SERVICE_UNHEALTHY` or `STREAM_CONSUMER_FAILURE`.
    #[serde(rename = "type")]
    pub kind: SmolStr,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<SmolStr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub severity: AlertSeverity,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    /// Opaque structured context, e.g. `{streamName, errorCount}`.
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub data: serde_json::Value,
}

impl Alert {
    pub fn new(kind: impl Into<SmolStr>, severity: AlertSeverity, timestamp: DateTime<Utc>) -> Self {
        Self {
            kind: kind.into(),
            service: None,
            message: None,
            severity,
            timestamp,
            data: serde_json::Value::Null,
        }
    }

    pub fn with_service(mut self, service: impl Into<SmolStr>) -> Self {
        self.service = Some(service.into());
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }

    /// Cooldown key: `${type}_${service || "system"}`.
    pub fn cooldown_key(&self) -> String {
        match &self.service {
            Some(service) => format!("{}_{}", self.kind, service),
            None => format!("{}_system", self.kind),
        }
    }
}
