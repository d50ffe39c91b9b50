use crate::time::{format_date, format_datetime};
use crate::{Document, Value};
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

impl From<&serde_json::Map<String, serde_json::Value>> for Document {
    fn from(value: &serde_json::Map<String, serde_json::Value>) -> Self {
        value.iter().map(|(k, v)| (k.clone(), v.into())).collect()
    }
}

impl From<&serde_json::Value> for Value {
    fn from(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::null(),
            serde_json::Value::Bool(b) => Value::bool(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::int(i),
                None => Value::float(n.as_f64().unwrap_or_default()),
            },
            serde_json::Value::String(s) => Value::text(s),
            serde_json::Value::Array(a) => Value::array(a.iter().map(Value::from).collect()),
            serde_json::Value::Object(o) => Value::dict(o.into()),
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        (&value).into()
    }
}

impl From<&Value> for serde_json::Value {
    fn from(value: &Value) -> Self {
        match value {
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Text(t) => serde_json::Value::String(t.clone()),
            Value::Date(d) => serde_json::Value::String(format_date(d)),
            Value::Time(t) => serde_json::Value::String(format_datetime(t)),
            Value::Array(a) => serde_json::Value::Array(a.iter().map(|v| v.into()).collect()),
            Value::Dict(d) => serde_json::Value::Object(d.into()),
            Value::Null => serde_json::Value::Null,
        }
    }
}

impl From<Value> for serde_json::Value {
    fn from(value: Value) -> Self {
        (&value).into()
    }
}

impl From<&Document> for serde_json::Map<String, serde_json::Value> {
    fn from(document: &Document) -> Self {
        document
            .iter()
            .map(|(k, v)| (k.clone(), v.into()))
            .collect()
    }
}

impl Document {
    /// Builds a document from a JSON object, anything else is rejected.
    pub fn from_json(json: &serde_json::Value) -> Result<Document, String> {
        match json {
            serde_json::Value::Object(o) => Ok(o.into()),
            other => Err(format!("expected a JSON object, got {}", other)),
        }
    }

    pub fn parse_json(raw: &str) -> Result<Document, String> {
        let json: serde_json::Value = serde_json::from_str(raw).map_err(|err| err.to_string())?;
        Document::from_json(&json)
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(self.into())
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Int(i) => serializer.serialize_i64(*i),
            Value::Float(f) => serializer.serialize_f64(*f),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Text(t) => serializer.serialize_str(t),
            Value::Date(d) => serializer.serialize_str(&format_date(d)),
            Value::Time(t) => serializer.serialize_str(&format_datetime(t)),
            Value::Array(a) => {
                let mut seq = serializer.serialize_seq(Some(a.len()))?;
                for value in a {
                    seq.serialize_element(value)?;
                }
                seq.end()
            }
            Value::Dict(d) => d.serialize(serializer),
            Value::Null => serializer.serialize_unit(),
        }
    }
}

impl Serialize for Document {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for (k, v) in self {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use crate::{Document, Value};
    use chrono::NaiveDate;
    use serde_json::json;

    #[test]
    fn from_json_object() {
        let doc = Document::from_json(&json!({"name": "Ann", "age": 31, "score": 1.5, "tags": ["a"]}))
            .unwrap();
        assert_eq!(doc.get("name"), Some(&Value::text("Ann")));
        assert_eq!(doc.get("age"), Some(&Value::int(31)));
        assert_eq!(doc.get("score"), Some(&Value::float(1.5)));
        assert_eq!(doc.get("tags"), Some(&Value::array(vec![Value::text("a")])));
        assert!(Document::from_json(&json!([1, 2])).is_err());
    }

    #[test]
    fn serialize_keeps_order_and_dates() {
        let mut doc = Document::new();
        doc.insert("id", "01h");
        doc.insert("born", NaiveDate::from_ymd_opt(1990, 5, 17).unwrap());
        let text = serde_json::to_string(&doc).unwrap();
        assert_eq!(text, "{\"id\":\"01h\",\"born\":\"1990-05-17\"}");
    }
}
