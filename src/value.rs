//! Cell values produced by a connection.

use base64::Engine as _;
use chrono::NaiveDateTime;
use serde_json::Value as JsonValue;

use crate::errors::Error;

/// Textual layout of [`Value::Timestamp`], shared by parsing and formatting.
pub(crate) const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A single typed cell, as handed over by the driver.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// SQL NULL
    Null,
    /// Boolean
    Bool(bool),
    /// Signed 64-bit integer
    Int(i64),
    /// Unsigned 64-bit integer that does not fit an `i64`
    Uint(u64),
    /// IEEE 754 floating point
    Float(f64),
    /// UTF-8 text
    Text(String),
    /// Binary blob
    Bytes(Vec<u8>),
    /// Civil date and time, second precision
    Timestamp(NaiveDateTime),
}

impl Value {
    /// Check if the value is Null.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Convert a JSON-encoded cell, as returned by remote drivers.
    ///
    /// Blobs travel as `{"base64": "..."}` objects; any other object or an
    /// array is rejected with [`Error::UnsupportedType`].
    pub fn from_json(cell: &JsonValue) -> Result<Self, Error> {
        match cell {
            JsonValue::Null => Ok(Value::Null),
            JsonValue::Bool(b) => Ok(Value::Bool(*b)),
            JsonValue::Number(n) => {
                if let Some(v) = n.as_i64() {
                    Ok(Value::Int(v))
                } else if let Some(v) = n.as_u64() {
                    Ok(Value::Uint(v))
                } else if let Some(v) = n.as_f64() {
                    Ok(Value::Float(v))
                } else {
                    Err(Error::UnsupportedType(format!("number {n}")))
                }
            }
            JsonValue::String(s) => Ok(Value::Text(s.clone())),
            JsonValue::Object(map) => match map.get("base64") {
                Some(JsonValue::String(encoded)) => decode_base64(encoded).map(Value::Bytes),
                Some(_) => Err(Error::UnsupportedType(
                    "map with a non-string \"base64\" field".into(),
                )),
                None => Err(Error::UnsupportedType("map without a \"base64\" field".into())),
            },
            JsonValue::Array(_) => Err(Error::UnsupportedType("array".into())),
        }
    }

    /// Parse `text` as a timestamp if it is exactly in `YYYY-MM-DD HH:MM:SS` form.
    ///
    /// Returns `None` whenever re-rendering the parsed value would not give back `text`.
    #[must_use]
    pub fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
        let parsed = NaiveDateTime::parse_from_str(text, TIMESTAMP_FORMAT).ok()?;
        (parsed.format(TIMESTAMP_FORMAT).to_string() == text).then_some(parsed)
    }
}

fn decode_base64(encoded: &str) -> Result<Vec<u8>, Error> {
    base64::engine::general_purpose::STANDARD_NO_PAD
        .decode(encoded.trim_end_matches('='))
        .map_err(|err| Error::UnsupportedType(format!("unable to decode base64 value: {err}")))
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        i64::try_from(v).map_or(Value::Uint(v), Value::Int)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.into())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Value::Timestamp(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}
