use crate::time::{format_date, format_datetime};
use crate::Value;
use rusqlite::types::{FromSql, FromSqlResult, ToSqlOutput, ValueRef};

impl FromSql for Value {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value {
            ValueRef::Null => Ok(Value::null()),
            ValueRef::Integer(i) => Ok(Value::int(i)),
            ValueRef::Real(f) => Ok(Value::float(f)),
            ValueRef::Text(t) => Ok(Value::text(String::from_utf8_lossy(t))),
            ValueRef::Blob(b) => Ok(Value::text(String::from_utf8_lossy(b))),
        }
    }
}

impl rusqlite::ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        match self {
            Value::Int(i) => Ok(ToSqlOutput::from(*i)),
            Value::Float(f) => Ok(ToSqlOutput::from(*f)),
            Value::Bool(b) => Ok(ToSqlOutput::from(*b as i64)),
            Value::Text(t) => Ok(ToSqlOutput::from(t.as_str())),
            Value::Date(d) => Ok(ToSqlOutput::from(format_date(d))),
            Value::Time(t) => Ok(ToSqlOutput::from(format_datetime(t))),
            Value::Array(_) | Value::Dict(_) => {
                Ok(ToSqlOutput::from(serde_json::Value::from(self).to_string()))
            }
            Value::Null => Ok(ToSqlOutput::from(rusqlite::types::Null)),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::Value;
    use rusqlite::Connection;

    #[test]
    fn values_survive_sqlite() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute("CREATE TABLE t (a, b, c, d)", []).unwrap();
        conn.execute(
            "INSERT INTO t VALUES (?1, ?2, ?3, ?4)",
            [
                Value::int(7),
                Value::text("x"),
                Value::bool(true),
                Value::null(),
            ],
        )
        .unwrap();
        let row: (Value, Value, Value, Value) = conn
            .query_row("SELECT a, b, c, d FROM t", [], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
            })
            .unwrap();
        assert_eq!(row.0, Value::int(7));
        assert_eq!(row.1, Value::text("x"));
        assert_eq!(row.2, Value::int(1));
        assert_eq!(row.3, Value::null());
    }
}
