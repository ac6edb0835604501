use indexmap::IndexMap;
use serde::{de::DeserializeOwned, Serialize};
use smol_str::SmolStr;
use thiserror::Error;

/// Flat string fields of one event-log entry.
///
/// The substrate is wire-neutral: every entry is a map of string fields
/// with the JSON payload under `data` and routing metadata (`type`, `id`,
/// `service`) alongside it.
pub type FieldMap = IndexMap<String, String>;

const FIELD_TYPE: &str = "type";
const FIELD_ID: &str = "id";
const FIELD_SERVICE: &str = "service";
const FIELD_DATA: &str = "data";

/// Decoding or encoding failure at the event-log edge.
///
/// Serde errors are carried as strings so the error stays `Clone` and
/// comparable across task boundaries.
#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum DomainError {
    #[error("missing wire field `{0}`")]
    MissingField(&'static str),
    #[error("malformed `data` payload: {0}")]
    Json(String),
}

/// One typed event in its wire shape.
#[derive(Debug, Clone, PartialEq)]
pub struct WireEvent {
    /// Event class under the `type` field.
    pub kind: SmolStr,
    /// Entity id under the `id` field, when the event has one.
    pub id: Option<SmolStr>,
    /// Originating service under the `service` field.
    pub service: Option<SmolStr>,
    /// Raw JSON payload under the `data` field.
    pub data: String,
}

impl WireEvent {
    /// Serialises `payload` into the `data` field of a new event.
    pub fn encode<T: Serialize>(kind: impl Into<SmolStr>, payload: &T) -> Result<Self, DomainError> {
        let data = serde_json::to_string(payload).map_err(|err| DomainError::Json(err.to_string()))?;
        Ok(Self {
            kind: kind.into(),
            id: None,
            service: None,
            data,
        })
    }

    pub fn with_id(mut self, id: impl Into<SmolStr>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_service(mut self, service: impl Into<SmolStr>) -> Self {
        self.service = Some(service.into());
        self
    }

    /// Deserialises the `data` payload into `T`.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, DomainError> {
        serde_json::from_str(&self.data).map_err(|err| DomainError::Json(err.to_string()))
    }

    /// Renders the event as entry fields, `type` first.
    pub fn into_fields(self) -> FieldMap {
        let mut fields = FieldMap::with_capacity(4);
        fields.insert(FIELD_TYPE.to_string(), self.kind.to_string());
        if let Some(id) = self.id {
            fields.insert(FIELD_ID.to_string(), id.to_string());
        }
        if let Some(service) = self.service {
            fields.insert(FIELD_SERVICE.to_string(), service.to_string());
        }
        fields.insert(FIELD_DATA.to_string(), self.data);
        fields
    }

    /// Parses entry fields back into a [`WireEvent`].
    ///
    /// `type` and `data` are required; entries without them are malformed
    /// and belong on the dead-letter stream.
    pub fn from_fields(fields: &FieldMap) -> Result<Self, DomainError> {
        let kind = fields
            .get(FIELD_TYPE)
            .ok_or(DomainError::MissingField(FIELD_TYPE))?;
        let data = fields
            .get(FIELD_DATA)
            .ok_or(DomainError::MissingField(FIELD_DATA))?;
        Ok(Self {
            kind: SmolStr::new(kind),
            id: fields.get(FIELD_ID).map(SmolStr::new),
            service: fields.get(FIELD_SERVICE).map(SmolStr::new),
            data: data.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Opportunity, OpportunityKind};
    use chrono::{TimeZone, Utc};

    fn opportunity() -> Opportunity {
        Opportunity {
            id: SmolStr::new("opp-7"),
            kind: OpportunityKind::Backrun,
            source_chain: None,
            target_chain: None,
            dex: None,
            expected_profit: 10.0,
            confidence: 0.8,
            amount: None,
            timestamp: Utc.timestamp_millis_opt(1_700_000_000_000).unwrap(),
            expires_at: None,
            status: Default::default(),
            data: serde_json::Value::Null,
        }
    }

    #[test]
    fn test_wire_event_round_trip() {
        let opp = opportunity();
        let event = WireEvent::encode("opportunity", &opp)
            .unwrap()
            .with_id(opp.id.clone())
            .with_service("eth-detector");

        let fields = event.clone().into_fields();
        assert_eq!(fields.get("type").unwrap(), "opportunity");
        assert_eq!(fields.get("id").unwrap(), "opp-7");
        assert_eq!(fields.get("service").unwrap(), "eth-detector");

        let parsed = WireEvent::from_fields(&fields).unwrap();
        assert_eq!(parsed, event);
        assert_eq!(parsed.decode::<Opportunity>().unwrap(), opp);
    }

    #[test]
    fn test_from_fields_requires_type_and_data() {
        let mut fields = FieldMap::new();
        fields.insert("data".into(), "{}".into());
        assert_eq!(
            WireEvent::from_fields(&fields),
            Err(DomainError::MissingField("type"))
        );

        let mut fields = FieldMap::new();
        fields.insert("type".into(), "opportunity".into());
        assert_eq!(
            WireEvent::from_fields(&fields),
            Err(DomainError::MissingField("data"))
        );
    }

    #[test]
    fn test_decode_surfaces_malformed_payload() {
        let mut fields = FieldMap::new();
        fields.insert("type".into(), "opportunity".into());
        fields.insert("data".into(), "{not json".into());

        let event = WireEvent::from_fields(&fields).unwrap();
        assert!(matches!(
            event.decode::<Opportunity>(),
            Err(DomainError::Json(_))
        ));
    }
}
