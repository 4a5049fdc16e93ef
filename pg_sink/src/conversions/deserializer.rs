use bytes::Bytes;
use serde_json::Value;

use super::change_event::{ChangeEvent, ChangeEventError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawChangeRecord {
    pub destination: String,
    pub key: Option<Bytes>,
    pub value: Bytes,
}

impl RawChangeRecord {
    pub fn new(destination: impl Into<String>, key: Option<Bytes>, value: Bytes) -> Self {
        RawChangeRecord {
            destination: destination.into(),
            key,
            value,
        }
    }
}

pub trait EventDeserializer: Send + Sync {
    fn deserialize(&self, record: &RawChangeRecord) -> Result<ChangeEvent, ChangeEventError>;
}

/// Deserializer for JSON payloads, with or without an embedded schema.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonEventDeserializer;

impl JsonEventDeserializer {
    fn parse(destination: &str, bytes: &[u8]) -> Result<(Value, Option<Value>), ChangeEventError> {
        let doc: Value =
            serde_json::from_slice(bytes).map_err(|source| ChangeEventError::Deserialize {
                destination: destination.to_string(),
                source,
            })?;

        Ok(match doc {
            Value::Object(mut envelope)
                if envelope.contains_key("schema") && envelope.contains_key("payload") =>
            {
                let payload = envelope.remove("payload").unwrap_or(Value::Null);
                let schema = envelope.remove("schema").filter(|s| !s.is_null());
                (payload, schema)
            }
            doc => (doc, None),
        })
    }
}

impl EventDeserializer for JsonEventDeserializer {
    fn deserialize(&self, record: &RawChangeRecord) -> Result<ChangeEvent, ChangeEventError> {
        let (value, value_schema) = Self::parse(&record.destination, &record.value)?;

        let (key, key_schema) = match record.key.as_ref().filter(|k| !k.is_empty()) {
            Some(bytes) => {
                let (key, schema) = Self::parse(&record.destination, bytes)?;
                (Some(key).filter(|k| !k.is_null()), schema)
            }
            None => (None, None),
        };

        Ok(ChangeEvent::new(
            record.destination.clone(),
            value,
            key,
            value_schema,
            key_schema,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unwraps_schema_envelope() {
        let value = json!({
            "schema": {"type": "struct", "fields": [{"field": "id", "type": "int32"}]},
            "payload": {"id": 1, "__op": "c"}
        });
        let key = json!({
            "schema": {"type": "struct", "fields": [{"field": "id", "type": "int32"}]},
            "payload": {"id": 1}
        });
        let record = RawChangeRecord::new(
            "inventory.customers",
            Some(Bytes::from(key.to_string())),
            Bytes::from(value.to_string()),
        );

        let event = JsonEventDeserializer.deserialize(&record).unwrap();
        assert_eq!(event.destination(), "inventory.customers");
        assert_eq!(event.value(), &json!({"id": 1, "__op": "c"}));
        assert_eq!(event.key(), Some(&json!({"id": 1})));
        assert_eq!(event.schema().value_fields().unwrap().len(), 1);
        assert_eq!(event.schema().key_fields().unwrap().len(), 1);
    }

    #[test]
    fn plain_documents_have_no_schema() {
        let record = RawChangeRecord::new(
            "inventory.customers",
            None,
            Bytes::from_static(br#"{"id": 7, "__op": "r"}"#),
        );

        let event = JsonEventDeserializer.deserialize(&record).unwrap();
        assert_eq!(event.value(), &json!({"id": 7, "__op": "r"}));
        assert!(event.key().is_none());
        assert!(event.schema().value_schema().is_none());
    }

    #[test]
    fn empty_key_payload_is_no_key() {
        let record = RawChangeRecord::new(
            "t",
            Some(Bytes::new()),
            Bytes::from_static(br#"{"id": 7}"#),
        );
        assert!(JsonEventDeserializer.deserialize(&record).unwrap().key().is_none());
    }

    #[test]
    fn invalid_json_is_an_error() {
        let record = RawChangeRecord::new("t", None, Bytes::from_static(b"{not json"));
        assert!(matches!(
            JsonEventDeserializer.deserialize(&record),
            Err(ChangeEventError::Deserialize { destination, .. }) if destination == "t"
        ));
    }
}
