use serde_json::{Map, Value};
use thiserror::Error;

use crate::table::schema::{schema_fields, SchemaError, SchemaField};

pub const OP_FIELD: &str = "__op";
pub const SOURCE_TS_FIELD: &str = "__source_ts_ms";
pub const DELETED_FIELD: &str = "__deleted";

pub type Document = Map<String, Value>;

#[derive(Debug, Error)]
pub enum ChangeEventError {
    #[error("event for {0} has no __op field")]
    MissingOperation(String),

    #[error("event for {destination} has unknown operation {code:?}")]
    UnknownOperation { destination: String, code: String },

    #[error("event for {0} has no key")]
    MissingKey(String),

    #[error("event {part} for {destination} is not a json object")]
    NotAnObject {
        destination: String,
        part: &'static str,
    },

    #[error("unable to deserialize event for {destination}: {source}")]
    Deserialize {
        destination: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Create,
    Read,
    Update,
    Delete,
}

impl Operation {
    pub fn from_code(code: &str) -> Option<Operation> {
        match code {
            "c" => Some(Operation::Create),
            "r" => Some(Operation::Read),
            "u" => Some(Operation::Update),
            "d" => Some(Operation::Delete),
            _ => None,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Operation::Create => "c",
            Operation::Read => "r",
            Operation::Update => "u",
            Operation::Delete => "d",
        }
    }

    pub fn priority(&self) -> i32 {
        match self {
            Operation::Create => 1,
            Operation::Read => 2,
            Operation::Update => 3,
            Operation::Delete => 4,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventSchema {
    value_schema: Option<Value>,
    key_schema: Option<Value>,
}

impl EventSchema {
    pub fn new(value_schema: Option<Value>, key_schema: Option<Value>) -> Self {
        EventSchema {
            value_schema,
            key_schema,
        }
    }

    pub fn value_schema(&self) -> Option<&Value> {
        self.value_schema.as_ref()
    }

    pub fn key_schema(&self) -> Option<&Value> {
        self.key_schema.as_ref()
    }

    pub fn value_fields(&self) -> Result<Vec<SchemaField>, SchemaError> {
        schema_fields(self.value_schema.as_ref())
    }

    pub fn key_fields(&self) -> Result<Vec<SchemaField>, SchemaError> {
        schema_fields(self.key_schema.as_ref())
    }
}

#[derive(Debug, Clone)]
pub struct ChangeEvent {
    destination: String,
    value: Value,
    key: Option<Value>,
    schema: EventSchema,
}

impl ChangeEvent {
    pub fn new(
        destination: impl Into<String>,
        value: Value,
        key: Option<Value>,
        value_schema: Option<Value>,
        key_schema: Option<Value>,
    ) -> ChangeEvent {
        ChangeEvent {
            destination: destination.into(),
            value,
            key,
            schema: EventSchema::new(value_schema, key_schema),
        }
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn key(&self) -> Option<&Value> {
        self.key.as_ref()
    }

    pub fn schema(&self) -> &EventSchema {
        &self.schema
    }

    pub fn operation(&self) -> Result<Operation, ChangeEventError> {
        let code = self
            .value
            .get(OP_FIELD)
            .and_then(Value::as_str)
            .ok_or_else(|| ChangeEventError::MissingOperation(self.destination.clone()))?;

        Operation::from_code(code).ok_or_else(|| ChangeEventError::UnknownOperation {
            destination: self.destination.clone(),
            code: code.to_string(),
        })
    }

    pub fn operation_priority(&self) -> i32 {
        self.value
            .get(OP_FIELD)
            .and_then(Value::as_str)
            .and_then(Operation::from_code)
            .map_or(-1, |op| op.priority())
    }

    pub fn source_ts_ms(&self) -> i64 {
        match self.value.get(SOURCE_TS_FIELD) {
            Some(Value::Number(n)) => n
                .as_i64()
                .or_else(|| n.as_f64().map(|f| f as i64))
                .unwrap_or(0),
            Some(Value::String(s)) => s.trim().parse().unwrap_or(0),
            _ => 0,
        }
    }

    pub fn value_document(&self) -> Result<&Document, ChangeEventError> {
        self.value
            .as_object()
            .ok_or_else(|| ChangeEventError::NotAnObject {
                destination: self.destination.clone(),
                part: "value",
            })
    }

    pub fn key_document(&self) -> Result<&Document, ChangeEventError> {
        let key = self
            .key
            .as_ref()
            .ok_or_else(|| ChangeEventError::MissingKey(self.destination.clone()))?;
        key.as_object().ok_or_else(|| ChangeEventError::NotAnObject {
            destination: self.destination.clone(),
            part: "key",
        })
    }
}
