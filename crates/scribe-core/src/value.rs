//! Field values carried in changesets, and the column codecs that turn them
//! into the JSON stored in audit diffs.

use chrono::{DateTime, Utc};
use serde_json::{Number, Value as Json};

use crate::entity::ObjectId;
use crate::enums::ColumnType;

const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const DATE_FORMAT: &str = "%Y-%m-%d";

/// A field value as the host unit-of-work sees it.
///
/// `Entity` points at another object tracked by the same unit of work and is
/// only meaningful for association fields.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Timestamp(DateTime<Utc>),
    Json(Json),
    Entity(ObjectId),
}

impl Value {
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// The tracked object this value points at, if any.
    #[must_use]
    pub const fn as_object(&self) -> Option<ObjectId> {
        match self {
            Self::Entity(id) => Some(*id),
            _ => None,
        }
    }

    /// JSON form without any column type applied. Used when metadata is missing.
    #[must_use]
    pub fn to_json(&self) -> Json {
        match self {
            Self::Null | Self::Entity(_) => Json::Null,
            Self::Bool(b) => Json::Bool(*b),
            Self::Int(i) => Json::from(*i),
            Self::Float(f) => Number::from_f64(*f).map_or(Json::Null, Json::Number),
            Self::Text(s) => Json::String(s.clone()),
            Self::Timestamp(ts) => Json::String(ts.format(DATETIME_FORMAT).to_string()),
            Self::Json(v) => v.clone(),
        }
    }

    /// Text rendering used for labels.
    #[must_use]
    pub fn to_text(&self) -> String {
        match self {
            Self::Null | Self::Entity(_) => String::new(),
            Self::Bool(b) => b.to_string(),
            Self::Int(i) => i.to_string(),
            Self::Float(f) => f.to_string(),
            Self::Text(s) => s.clone(),
            Self::Timestamp(ts) => ts.format(DATETIME_FORMAT).to_string(),
            Self::Json(v) => v.to_string(),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Self::Int(i64::from(i))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(ts: DateTime<Utc>) -> Self {
        Self::Timestamp(ts)
    }
}

impl From<ObjectId> for Value {
    fn from(id: ObjectId) -> Self {
        Self::Entity(id)
    }
}

impl<T: Into<Self>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

impl ColumnType {
    /// Convert a field value into its diff representation for this column type.
    ///
    /// Booleans stay JSON booleans. Integer columns stay numbers, while
    /// `big_int` and `decimal` are stored as strings to keep their precision.
    /// Dates and datetimes use the SQL text formats.
    #[must_use]
    pub fn encode(self, value: &Value) -> Json {
        if matches!(value, Value::Null | Value::Entity(_)) {
            return Json::Null;
        }
        match self {
            Self::Boolean => encode_bool(value),
            Self::Integer | Self::SmallInt => encode_int(value),
            Self::Float => encode_float(value),
            Self::BigInt | Self::Decimal => Json::String(value.to_text()),
            Self::DateTime => encode_time(value, DATETIME_FORMAT),
            Self::Date => encode_time(value, DATE_FORMAT),
            Self::Json => match value {
                Value::Text(s) => Json::String(s.clone()),
                other => Json::String(other.to_json().to_string()),
            },
            Self::String | Self::Text => Json::String(value.to_text()),
        }
    }
}

fn encode_bool(value: &Value) -> Json {
    match value {
        Value::Bool(b) => Json::Bool(*b),
        Value::Int(i) => Json::Bool(*i != 0),
        Value::Float(f) => Json::Bool(*f != 0.0),
        Value::Text(s) => Json::Bool(matches!(
            s.to_ascii_lowercase().as_str(),
            "1" | "t" | "true" | "y" | "yes" | "on"
        )),
        _ => Json::Null,
    }
}

fn encode_int(value: &Value) -> Json {
    match value {
        Value::Int(i) => Json::from(*i),
        Value::Bool(b) => Json::from(i64::from(*b)),
        Value::Text(s) => s
            .trim()
            .parse::<i64>()
            .map_or_else(|_| Json::String(s.clone()), Json::from),
        other => other.to_json(),
    }
}

#[allow(clippy::cast_precision_loss)]
fn encode_float(value: &Value) -> Json {
    match value {
        Value::Int(i) => Number::from_f64(*i as f64).map_or(Json::Null, Json::Number),
        Value::Text(s) => s
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map_or_else(|| Json::String(s.clone()), Json::Number),
        other => other.to_json(),
    }
}

fn encode_time(value: &Value, format: &str) -> Json {
    match value {
        Value::Timestamp(ts) => Json::String(ts.format(format).to_string()),
        other => Json::String(other.to_text()),
    }
}
