use crate::time::{from_millis, start_of_day};
use crate::{Document, Value};
use mongodb::bson::{Bson, DateTime, Document as BsonDocument};

impl From<&Bson> for Value {
    fn from(bson: &Bson) -> Self {
        match bson {
            Bson::Double(d) => Value::float(*d),
            Bson::String(s) => Value::text(s),
            Bson::Document(d) => Value::dict(d.into()),
            Bson::Array(a) => Value::array(a.iter().map(Value::from).collect()),
            Bson::Boolean(b) => Value::bool(*b),
            Bson::Null | Bson::Undefined => Value::null(),
            Bson::Int32(i) => Value::int(*i as i64),
            Bson::Int64(i) => Value::int(*i),
            Bson::ObjectId(id) => Value::text(id.to_hex()),
            Bson::DateTime(dt) => from_millis(dt.timestamp_millis())
                .map(Value::time)
                .unwrap_or(Value::Null),
            Bson::Timestamp(ts) => from_millis(ts.time as i64 * 1000)
                .map(Value::time)
                .unwrap_or(Value::Null),
            other => Value::text(other.to_string()),
        }
    }
}

impl From<Bson> for Value {
    fn from(bson: Bson) -> Self {
        (&bson).into()
    }
}

// `From<&Value>` comes from bson's blanket impl over `Clone + Into<Bson>`.
impl From<Value> for Bson {
    fn from(value: Value) -> Self {
        match value {
            Value::Int(i) => Bson::Int64(i),
            Value::Float(f) => Bson::Double(f),
            Value::Bool(b) => Bson::Boolean(b),
            Value::Text(t) => Bson::String(t),
            Value::Date(d) => Bson::DateTime(DateTime::from_millis(start_of_day(d).timestamp_millis())),
            Value::Time(t) => Bson::DateTime(DateTime::from_millis(t.timestamp_millis())),
            Value::Array(a) => Bson::Array(a.into_iter().map(Bson::from).collect()),
            Value::Dict(d) => Bson::Document((&d).into()),
            Value::Null => Bson::Null,
        }
    }
}

impl From<&BsonDocument> for Document {
    fn from(doc: &BsonDocument) -> Self {
        doc.iter().map(|(k, v)| (k.to_string(), v.into())).collect()
    }
}

impl From<BsonDocument> for Document {
    fn from(doc: BsonDocument) -> Self {
        (&doc).into()
    }
}

impl From<&Document> for BsonDocument {
    fn from(doc: &Document) -> Self {
        let mut bson = BsonDocument::new();
        for (k, v) in doc {
            bson.insert(k.clone(), Bson::from(v.clone()));
        }
        bson
    }
}

#[cfg(test)]
mod tests {
    use crate::{Document, Value};
    use chrono::{NaiveDate, TimeZone, Utc};
    use mongodb::bson::{Bson, doc};

    #[test]
    fn date_becomes_utc_midnight() {
        let date = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        match Bson::from(Value::date(date)) {
            Bson::DateTime(dt) => assert_eq!(
                dt.timestamp_millis(),
                Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap().timestamp_millis()
            ),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn document_round_trip_keeps_types() {
        let bson = doc! {"_id": "01h", "age": 30_i32, "score": 2.5, "active": true, "tags": ["a", "b"]};
        let document: Document = bson.into();
        assert_eq!(document.get("age"), Some(&Value::int(30)));
        assert_eq!(document.get("active"), Some(&Value::bool(true)));
        assert_eq!(
            document.get("tags"),
            Some(&Value::array(vec![Value::text("a"), Value::text("b")]))
        );
        let back: mongodb::bson::Document = (&document).into();
        assert_eq!(back.get_i64("age").unwrap(), 30);
    }
}
