//! Metadata driven conversion between loosely typed input, the canonical
//! [`Value`] set and the representation a backend persists.
//!
//! Every conversion is lenient: when a value cannot be converted it is passed
//! through unchanged instead of failing the operation.

use crate::time::{format_date, format_datetime, parse_date, parse_datetime, start_of_day, truncate_seconds};
use crate::{FieldType, Value};
use tracing::trace;

/// What a backend can store natively.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct StorageTraits {
    /// backend has a boolean type, otherwise booleans become `0`/`1`
    pub native_bool: bool,
    /// backend has a temporal type, otherwise dates become ISO-8601 text
    pub native_temporal: bool,
    /// JSON blobs have to be stored as serialized text
    pub textual_json: bool,
}

impl StorageTraits {
    pub const NATIVE: StorageTraits = StorageTraits {
        native_bool: true,
        native_temporal: true,
        textual_json: false,
    };

    pub const JSON: StorageTraits = StorageTraits {
        native_bool: true,
        native_temporal: false,
        textual_json: false,
    };

    pub const TEXTUAL: StorageTraits = StorageTraits {
        native_bool: false,
        native_temporal: false,
        textual_json: true,
    };
}

/// Converts a raw token, e.g. from a URL, into the canonical value of `field_type`.
pub fn coerce_str(field_type: FieldType, raw: &str) -> Value {
    coerce(field_type, Value::text(raw))
}

/// Converts an incoming value into the canonical value of `field_type`.
pub fn coerce(field_type: FieldType, value: Value) -> Value {
    if value.is_null() {
        return value;
    }
    let converted = match field_type {
        FieldType::String | FieldType::ObjectId => match &value {
            Value::Text(_) => None,
            Value::Int(_) | Value::Float(_) | Value::Bool(_) => Some(Value::text(value.to_string())),
            Value::Date(d) => Some(Value::text(format_date(d))),
            Value::Time(t) => Some(Value::text(format_datetime(t))),
            _ => None,
        },
        FieldType::Integer => match &value {
            Value::Int(_) => None,
            Value::Text(t) => t
                .trim()
                .parse::<i64>()
                .ok()
                .map(Value::int)
                .or_else(|| whole_float(t).map(Value::int)),
            Value::Float(f) if f.fract() == 0.0 => Some(Value::int(*f as i64)),
            Value::Bool(b) => Some(Value::int(*b as i64)),
            _ => None,
        },
        FieldType::Float | FieldType::Currency => match &value {
            Value::Float(_) => None,
            other => other.as_float().ok().map(Value::float),
        },
        FieldType::Boolean => match &value {
            Value::Bool(_) => None,
            other => other.as_bool().ok().map(Value::bool),
        },
        FieldType::Date => match &value {
            Value::Date(_) => None,
            Value::Time(t) => Some(Value::date(t.date_naive())),
            Value::Text(t) => parse_date(t).map(Value::date),
            _ => None,
        },
        FieldType::Datetime => match &value {
            Value::Time(t) => Some(Value::time(truncate_seconds(*t))),
            Value::Date(d) => Some(Value::time(start_of_day(*d))),
            Value::Text(t) => parse_datetime(t).map(|t| Value::time(truncate_seconds(t))),
            _ => None,
        },
        FieldType::Json => None,
    };

    match converted {
        Some(converted) => converted,
        None => {
            if !matches_type(field_type, &value) {
                trace!("passing {} through unconverted as {}", value, field_type);
            }
            value
        }
    }
}

/// Canonical value to the form persisted by a backend with `traits`.
pub fn to_storage(field_type: FieldType, value: Value, traits: &StorageTraits) -> Value {
    let value = coerce(field_type, value);
    match (field_type, value) {
        (FieldType::Date, Value::Date(d)) if !traits.native_temporal => Value::text(format_date(&d)),
        (FieldType::Datetime, Value::Time(t)) if !traits.native_temporal => {
            Value::text(format_datetime(&t))
        }
        (FieldType::Boolean, Value::Bool(b)) if !traits.native_bool => Value::int(b as i64),
        (FieldType::Json, value @ (Value::Dict(_) | Value::Array(_))) if traits.textual_json => {
            Value::text(serde_json::Value::from(&value).to_string())
        }
        (_, value) => value,
    }
}

/// Persisted form back to the canonical value, dates always structured.
pub fn from_storage(field_type: FieldType, value: Value) -> Value {
    match (field_type, value) {
        (FieldType::Json, Value::Text(t)) => match serde_json::from_str::<serde_json::Value>(&t) {
            Ok(json @ (serde_json::Value::Object(_) | serde_json::Value::Array(_))) => {
                Value::from(&json)
            }
            _ => Value::Text(t),
        },
        (FieldType::Boolean, Value::Int(i)) => Value::bool(i != 0),
        (field_type, value) => coerce(field_type, value),
    }
}

/// Does `value` already have the canonical shape of `field_type`.
pub fn matches_type(field_type: FieldType, value: &Value) -> bool {
    match (field_type, value) {
        (_, Value::Null) => true,
        (FieldType::String | FieldType::ObjectId, Value::Text(_)) => true,
        (FieldType::Integer, Value::Int(_)) => true,
        (FieldType::Float | FieldType::Currency, Value::Float(_) | Value::Int(_)) => true,
        (FieldType::Boolean, Value::Bool(_)) => true,
        (FieldType::Date, Value::Date(_)) => true,
        (FieldType::Datetime, Value::Time(_)) => true,
        (FieldType::Json, _) => true,
        _ => false,
    }
}

fn whole_float(raw: &str) -> Option<i64> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|f| f.fract() == 0.0)
        .map(|f| f as i64)
}
