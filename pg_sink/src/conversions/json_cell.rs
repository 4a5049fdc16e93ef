use std::error::Error;

use base64::Engine;
use bytes::BytesMut;
use thiserror::Error;
use tokio_postgres::types::{to_sql_checked, IsNull, ToSql, Type};

pub type JsonValue = serde_json::Value;

pub struct JsonConverter;

#[derive(Debug, Error)]
pub enum JsonValueConversionError {
    #[error("cannot bind {value} as {ty}")]
    Incompatible { value: String, ty: String },

    #[error("value {value} is out of range for {ty}")]
    OutOfRange { value: String, ty: String },

    #[error("invalid base64 value: {0}")]
    InvalidBytes(#[from] base64::DecodeError),
}

impl JsonValueConversionError {
    fn incompatible(value: &JsonValue, ty: &Type) -> Self {
        JsonValueConversionError::Incompatible {
            value: value.to_string(),
            ty: ty.to_string(),
        }
    }

    fn out_of_range(value: &JsonValue, ty: &Type) -> Self {
        JsonValueConversionError::OutOfRange {
            value: value.to_string(),
            ty: ty.to_string(),
        }
    }
}

impl JsonConverter {
    pub fn to_text(value: &JsonValue) -> String {
        match value {
            JsonValue::String(s) => s.clone(),
            other => other.to_string(),
        }
    }

    pub fn to_bool(value: &JsonValue, ty: &Type) -> Result<bool, JsonValueConversionError> {
        match value {
            JsonValue::Bool(b) => Ok(*b),
            JsonValue::String(s) => match s.as_str() {
                "t" | "true" => Ok(true),
                "f" | "false" => Ok(false),
                _ => Err(JsonValueConversionError::incompatible(value, ty)),
            },
            JsonValue::Number(n) => match n.as_i64() {
                Some(0) => Ok(false),
                Some(1) => Ok(true),
                _ => Err(JsonValueConversionError::incompatible(value, ty)),
            },
            _ => Err(JsonValueConversionError::incompatible(value, ty)),
        }
    }

    pub fn to_i64(value: &JsonValue, ty: &Type) -> Result<i64, JsonValueConversionError> {
        match value {
            JsonValue::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
                .ok_or_else(|| JsonValueConversionError::incompatible(value, ty)),
            JsonValue::String(s) => s
                .trim()
                .parse()
                .map_err(|_| JsonValueConversionError::incompatible(value, ty)),
            _ => Err(JsonValueConversionError::incompatible(value, ty)),
        }
    }

    pub fn to_f64(value: &JsonValue, ty: &Type) -> Result<f64, JsonValueConversionError> {
        match value {
            JsonValue::Number(n) => n
                .as_f64()
                .ok_or_else(|| JsonValueConversionError::incompatible(value, ty)),
            JsonValue::String(s) => s
                .trim()
                .parse()
                .map_err(|_| JsonValueConversionError::incompatible(value, ty)),
            _ => Err(JsonValueConversionError::incompatible(value, ty)),
        }
    }

    pub fn to_bytes(value: &JsonValue, ty: &Type) -> Result<Vec<u8>, JsonValueConversionError> {
        match value {
            JsonValue::String(s) => Ok(base64::engine::general_purpose::STANDARD.decode(s)?),
            _ => Err(JsonValueConversionError::incompatible(value, ty)),
        }
    }
}

#[derive(Debug)]
pub struct JsonParam<'a>(pub Option<&'a JsonValue>);

impl ToSql for JsonParam<'_> {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, Box<dyn Error + Sync + Send>> {
        let value = match self.0 {
            None | Some(JsonValue::Null) => return Ok(IsNull::Yes),
            Some(value) => value,
        };

        match *ty {
            Type::BOOL => JsonConverter::to_bool(value, ty)?.to_sql(ty, out),
            Type::INT2 => i16::try_from(JsonConverter::to_i64(value, ty)?)
                .map_err(|_| JsonValueConversionError::out_of_range(value, ty))?
                .to_sql(ty, out),
            Type::INT4 => i32::try_from(JsonConverter::to_i64(value, ty)?)
                .map_err(|_| JsonValueConversionError::out_of_range(value, ty))?
                .to_sql(ty, out),
            Type::INT8 => JsonConverter::to_i64(value, ty)?.to_sql(ty, out),
            Type::FLOAT4 => (JsonConverter::to_f64(value, ty)? as f32).to_sql(ty, out),
            Type::FLOAT8 => JsonConverter::to_f64(value, ty)?.to_sql(ty, out),
            Type::JSON | Type::JSONB => value.to_sql(ty, out),
            Type::BYTEA => JsonConverter::to_bytes(value, ty)?.to_sql(ty, out),
            _ => JsonConverter::to_text(value).to_sql(ty, out),
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn complex_values_survive_text_round_trip() {
        let nested = json!({"a": [1, 2, {"b": null}], "c": "x"});
        let text = JsonConverter::to_text(&nested);
        let decoded: JsonValue = serde_json::from_str(&text).unwrap();
        assert_eq!(decoded, nested);

        assert_eq!(JsonConverter::to_text(&json!("plain")), "plain");
        assert_eq!(JsonConverter::to_text(&json!(12)), "12");
    }

    #[test]
    fn scalar_conversions_are_lenient_on_strings() {
        assert_eq!(JsonConverter::to_i64(&json!("42"), &Type::INT8).unwrap(), 42);
        assert_eq!(JsonConverter::to_i64(&json!(3.0), &Type::INT8).unwrap(), 3);
        assert!(JsonConverter::to_i64(&json!(3.5), &Type::INT8).is_err());
        assert!(JsonConverter::to_bool(&json!("t"), &Type::BOOL).unwrap());
        assert!(!JsonConverter::to_bool(&json!(0), &Type::BOOL).unwrap());
        assert_eq!(JsonConverter::to_f64(&json!("1.5"), &Type::FLOAT8).unwrap(), 1.5);
        assert_eq!(
            JsonConverter::to_bytes(&json!("aGk="), &Type::BYTEA).unwrap(),
            b"hi".to_vec()
        );
    }

    #[test]
    fn params_encode_by_server_type() {
        let mut out = BytesMut::new();
        let v = json!(7);
        let is_null = JsonParam(Some(&v)).to_sql(&Type::INT4, &mut out).unwrap();
        assert!(matches!(is_null, IsNull::No));
        assert_eq!(&out[..], &7i32.to_be_bytes());

        let mut out = BytesMut::new();
        assert!(matches!(
            JsonParam(None).to_sql(&Type::INT4, &mut out).unwrap(),
            IsNull::Yes
        ));

        let mut out = BytesMut::new();
        let big = json!(1_i64 << 40);
        assert!(JsonParam(Some(&big)).to_sql(&Type::INT4, &mut out).is_err());

        let mut out = BytesMut::new();
        let arr = json!([1, 2]);
        JsonParam(Some(&arr)).to_sql(&Type::TEXT, &mut out).unwrap();
        assert_eq!(&out[..], b"[1,2]");
    }
}
