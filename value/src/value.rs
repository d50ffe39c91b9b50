use crate::document::Document;
use crate::time::{format_date, format_datetime};
use chrono::{DateTime, NaiveDate, Utc};
use std::cmp::Ordering;
use std::fmt::{Display, Formatter};

/// Canonical in-memory value of a document field, independent of any backend.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f64),
    Bool(bool),
    Text(String),
    Date(NaiveDate),
    Time(DateTime<Utc>),
    Array(Vec<Value>),
    Dict(Document),
    Null,
}

impl Value {
    pub fn text<S: AsRef<str>>(string: S) -> Value {
        Value::Text(string.as_ref().to_string())
    }

    pub fn int(int: i64) -> Value {
        Value::Int(int)
    }

    pub fn float(float: f64) -> Value {
        Value::Float(float)
    }

    pub fn bool(bool: bool) -> Value {
        Value::Bool(bool)
    }

    pub fn date(date: NaiveDate) -> Value {
        Value::Date(date)
    }

    pub fn time(time: DateTime<Utc>) -> Value {
        Value::Time(time)
    }

    pub fn array(values: Vec<Value>) -> Value {
        Value::Array(values)
    }

    pub fn dict(document: Document) -> Value {
        Value::Dict(document)
    }

    pub fn null() -> Value {
        Value::Null
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "integer",
            Value::Float(_) => "float",
            Value::Bool(_) => "boolean",
            Value::Text(_) => "string",
            Value::Date(_) => "date",
            Value::Time(_) => "datetime",
            Value::Array(_) => "array",
            Value::Dict(_) => "dict",
            Value::Null => "null",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(t) => Some(t.as_str()),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Result<i64, String> {
        match self {
            Value::Int(i) => Ok(*i),
            Value::Float(f) if f.fract() == 0.0 => Ok(*f as i64),
            Value::Bool(b) => Ok(*b as i64),
            Value::Text(t) => t.trim().parse::<i64>().map_err(|err| err.to_string()),
            other => Err(format!("{} cannot be converted to integer", other.type_name())),
        }
    }

    pub fn as_float(&self) -> Result<f64, String> {
        match self {
            Value::Int(i) => Ok(*i as f64),
            Value::Float(f) => Ok(*f),
            Value::Text(t) => t.trim().parse::<f64>().map_err(|err| err.to_string()),
            other => Err(format!("{} cannot be converted to float", other.type_name())),
        }
    }

    pub fn as_bool(&self) -> Result<bool, String> {
        match self {
            Value::Bool(b) => Ok(*b),
            Value::Int(i) => Ok(*i != 0),
            Value::Text(t) => match t.to_lowercase().trim() {
                "true" | "1" | "yes" | "on" => Ok(true),
                "false" | "0" | "no" | "off" => Ok(false),
                other => Err(format!("'{}' is not a boolean", other)),
            },
            other => Err(format!("{} cannot be converted to boolean", other.type_name())),
        }
    }

    pub fn as_dict(&self) -> Option<&Document> {
        match self {
            Value::Dict(d) => Some(d),
            _ => None,
        }
    }

    /// Plain textual rendering, used for identifiers and error messages.
    pub fn to_plain_string(&self) -> String {
        match self {
            Value::Text(t) => t.clone(),
            other => other.to_string(),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Int(_) | Value::Float(_) => 2,
            Value::Date(_) | Value::Time(_) => 3,
            Value::Text(_) => 4,
            Value::Array(_) => 5,
            Value::Dict(_) => 6,
        }
    }

    /// Total order used for in-process sorting; `Null` sorts first.
    pub fn compare(&self, other: &Value, case_insensitive: bool) -> Ordering {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
                let a = self.as_float().unwrap_or_default();
                let b = other.as_float().unwrap_or_default();
                a.partial_cmp(&b).unwrap_or(Ordering::Equal)
            }
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Text(a), Value::Text(b)) => {
                if case_insensitive {
                    a.to_lowercase().cmp(&b.to_lowercase())
                } else {
                    a.cmp(b)
                }
            }
            (Value::Date(a), Value::Date(b)) => a.cmp(b),
            (Value::Time(a), Value::Time(b)) => a.cmp(b),
            (Value::Date(a), Value::Time(b)) => crate::time::start_of_day(*a).cmp(b),
            (Value::Time(a), Value::Date(b)) => a.cmp(&crate::time::start_of_day(*b)),
            (Value::Array(a), Value::Array(b)) => {
                for (left, right) in a.iter().zip(b.iter()) {
                    match left.compare(right, case_insensitive) {
                        Ordering::Equal => continue,
                        ord => return ord,
                    }
                }
                a.len().cmp(&b.len())
            }
            (Value::Null, Value::Null) => Ordering::Equal,
            _ => self.rank().cmp(&other.rank()),
        }
    }

    /// Equality that treats `1` and `1.0` alike and optionally ignores case.
    pub fn loose_eq(&self, other: &Value, case_insensitive: bool) -> bool {
        match (self, other) {
            (Value::Dict(a), Value::Dict(b)) => a == b,
            _ => {
                self.rank() == other.rank() && self.compare(other, case_insensitive) == Ordering::Equal
            }
        }
    }

    /// Case-insensitive substring test; only texts can contain anything.
    pub fn contains_ignore_case(&self, needle: &str) -> bool {
        match self {
            Value::Text(t) => t.to_lowercase().contains(&needle.to_lowercase()),
            _ => false,
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(float) => write!(f, "{}", float),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Text(t) => write!(f, "\"{}\"", t),
            Value::Date(d) => write!(f, "{}", format_date(d)),
            Value::Time(t) => write!(f, "{}", format_datetime(t)),
            Value::Array(a) => write!(
                f,
                "[{}]",
                a.iter()
                    .map(|v| v.to_string())
                    .collect::<Vec<_>>()
                    .join(",")
            ),
            Value::Dict(d) => write!(f, "{}", d),
            Value::Null => f.write_str("null"),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::text(value)
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::int(value as i64)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::float(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::bool(value)
    }
}

impl From<NaiveDate> for Value {
    fn from(value: NaiveDate) -> Self {
        Value::Date(value)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(value: DateTime<Utc>) -> Self {
        Value::Time(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Self {
        Value::Array(value)
    }
}

impl From<Document> for Value {
    fn from(value: Document) -> Self {
        Value::Dict(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        match value {
            None => Value::Null,
            Some(v) => v.into(),
        }
    }
}
