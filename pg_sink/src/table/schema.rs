use serde_json::Value;
use thiserror::Error;
use tracing::{debug, trace};

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("array field {0} has no declared item type")]
    UntypedArray(String),

    #[error("schema field is missing its {0} attribute")]
    MissingAttribute(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Int32,
    Int64,
    Float32,
    Float64,
    Boolean,
    String,
    Bytes,
}

impl ColumnType {
    pub fn from_tag(tag: &str) -> ColumnType {
        match tag {
            "int8" | "int16" | "int32" => ColumnType::Int32,
            "int64" => ColumnType::Int64,
            "float8" | "float16" | "float32" => ColumnType::Float32,
            "float64" => ColumnType::Float64,
            "boolean" => ColumnType::Boolean,
            "string" | "uuid" => ColumnType::String,
            "bytes" => ColumnType::Bytes,
            _ => ColumnType::String,
        }
    }

    pub fn ddl_type(&self) -> &'static str {
        match self {
            ColumnType::Int32 => "INTEGER",
            ColumnType::Int64 => "BIGINT",
            ColumnType::Float32 => "REAL",
            ColumnType::Float64 => "DOUBLE PRECISION",
            ColumnType::Boolean => "BOOLEAN",
            ColumnType::String => "TEXT",
            ColumnType::Bytes => "BYTEA",
        }
    }

    pub fn sql_type(&self) -> SqlType {
        match self {
            ColumnType::Int32 => SqlType::Integer,
            ColumnType::Int64 => SqlType::BigInt,
            ColumnType::Float32 => SqlType::Real,
            ColumnType::Float64 => SqlType::Double,
            ColumnType::Boolean => SqlType::Boolean,
            ColumnType::String => SqlType::Text,
            ColumnType::Bytes => SqlType::Bytea,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlType {
    SmallInt,
    Integer,
    BigInt,
    Real,
    Double,
    Boolean,
    Text,
    Bytea,
    Json,
    Jsonb,
    Other(String),
}

impl SqlType {
    pub fn from_udt_name(name: &str) -> SqlType {
        match name {
            "int2" => SqlType::SmallInt,
            "int4" => SqlType::Integer,
            "int8" => SqlType::BigInt,
            "float4" => SqlType::Real,
            "float8" => SqlType::Double,
            "bool" => SqlType::Boolean,
            "text" | "varchar" | "bpchar" | "name" => SqlType::Text,
            "bytea" => SqlType::Bytea,
            "json" => SqlType::Json,
            "jsonb" => SqlType::Jsonb,
            other => SqlType::Other(other.to_string()),
        }
    }

    pub fn is_natively_bound(&self) -> bool {
        !matches!(self, SqlType::Other(_))
    }

    pub fn is_text(&self) -> bool {
        matches!(self, SqlType::Text)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaField {
    pub name: String,
    pub column_type: ColumnType,
}

/// Maps a schema descriptor (`{"type": "struct", "fields": [...]}`) to its
/// fields in declaration order.
pub fn schema_fields(descriptor: Option<&Value>) -> Result<Vec<SchemaField>, SchemaError> {
    let Some(fields) = descriptor
        .and_then(|d| d.get("fields"))
        .and_then(Value::as_array)
    else {
        trace!("event schema not found");
        return Ok(vec![]);
    };

    let mut mapped = Vec::with_capacity(fields.len());
    for (column_id, field) in fields.iter().enumerate() {
        let name = field
            .get("field")
            .and_then(Value::as_str)
            .ok_or(SchemaError::MissingAttribute("field"))?;
        let tag = field
            .get("type")
            .and_then(Value::as_str)
            .ok_or(SchemaError::MissingAttribute("type"))?;
        debug!("processing field [{}] {name}::{tag}", column_id + 1);

        let column_type = match tag {
            "array" => {
                let has_item_type = field.get("items").is_some_and(|i| i.get("type").is_some());
                if !has_item_type {
                    return Err(SchemaError::UntypedArray(name.to_string()));
                }
                ColumnType::String
            }
            "map" | "struct" => ColumnType::String,
            primitive => ColumnType::from_tag(primitive),
        };

        mapped.push(SchemaField {
            name: name.to_string(),
            column_type,
        });
    }

    Ok(mapped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn maps_primitive_tags() {
        let schema = json!({
            "type": "struct",
            "fields": [
                {"field": "a", "type": "int16"},
                {"field": "b", "type": "int64"},
                {"field": "c", "type": "float32"},
                {"field": "d", "type": "float64"},
                {"field": "e", "type": "boolean"},
                {"field": "f", "type": "uuid"},
                {"field": "g", "type": "bytes"},
            ]
        });
        let types: Vec<_> = schema_fields(Some(&schema))
            .unwrap()
            .into_iter()
            .map(|f| (f.name, f.column_type))
            .collect();
        assert_eq!(
            types,
            vec![
                ("a".to_string(), ColumnType::Int32),
                ("b".to_string(), ColumnType::Int64),
                ("c".to_string(), ColumnType::Float32),
                ("d".to_string(), ColumnType::Float64),
                ("e".to_string(), ColumnType::Boolean),
                ("f".to_string(), ColumnType::String),
                ("g".to_string(), ColumnType::Bytes),
            ]
        );
    }

    #[test]
    fn complex_and_unknown_tags_degrade_to_text() {
        let schema = json!({
            "type": "struct",
            "fields": [
                {"field": "tags", "type": "array", "items": {"type": "string"}},
                {"field": "attrs", "type": "map"},
                {"field": "address", "type": "struct", "fields": []},
                {"field": "when", "type": "io.debezium.time.ZonedTimestamp"},
            ]
        });
        let fields = schema_fields(Some(&schema)).unwrap();
        assert_eq!(fields.len(), 4);
        assert!(fields.iter().all(|f| f.column_type == ColumnType::String));
    }

    #[test]
    fn untyped_array_is_rejected() {
        let schema = json!({
            "type": "struct",
            "fields": [{"field": "tags", "type": "array"}]
        });
        let err = schema_fields(Some(&schema)).unwrap_err();
        assert!(matches!(err, SchemaError::UntypedArray(name) if name == "tags"));
    }

    #[test]
    fn missing_fields_means_unknown_schema() {
        assert!(schema_fields(None).unwrap().is_empty());
        assert!(schema_fields(Some(&json!({"type": "string"})))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn catalog_names_round_into_sql_types() {
        assert_eq!(SqlType::from_udt_name("int8"), SqlType::BigInt);
        assert_eq!(SqlType::from_udt_name("varchar"), SqlType::Text);
        assert_eq!(
            SqlType::from_udt_name("numeric"),
            SqlType::Other("numeric".to_string())
        );
        assert!(!SqlType::from_udt_name("timestamptz").is_natively_bound());
    }
}
