use crate::time::{format_date, format_datetime};
use crate::{FieldType, Value};
use bytes::BytesMut;
use std::error::Error;
use tokio_postgres::types::{FromSql, IsNull, Json, ToSql, Type, to_sql_checked};

impl<'a> FromSql<'a> for Value {
    fn from_sql(ty: &Type, raw: &'a [u8]) -> Result<Self, Box<dyn Error + Sync + Send>> {
        match *ty {
            Type::BOOL => Ok(Value::bool(bool::from_sql(ty, raw)?)),
            Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME | Type::UNKNOWN => {
                Ok(Value::text(String::from_sql(ty, raw)?))
            }
            Type::INT2 => Ok(Value::int(i16::from_sql(ty, raw)? as i64)),
            Type::INT4 => Ok(Value::int(i32::from_sql(ty, raw)? as i64)),
            Type::INT8 => Ok(Value::int(i64::from_sql(ty, raw)?)),
            Type::FLOAT4 => Ok(Value::float(f32::from_sql(ty, raw)? as f64)),
            Type::FLOAT8 => Ok(Value::float(f64::from_sql(ty, raw)?)),
            Type::JSON | Type::JSONB => Ok(Value::from(serde_json::Value::from_sql(ty, raw)?)),
            _ => Err(format!("Unrecognized value type: {}", ty).into()),
        }
    }

    fn from_sql_null(_: &Type) -> Result<Self, Box<dyn Error + Sync + Send>> {
        Ok(Value::null())
    }

    fn accepts(ty: &Type) -> bool {
        matches!(
            *ty,
            Type::BOOL
                | Type::TEXT
                | Type::VARCHAR
                | Type::BPCHAR
                | Type::NAME
                | Type::UNKNOWN
                | Type::INT2
                | Type::INT4
                | Type::INT8
                | Type::FLOAT4
                | Type::FLOAT8
                | Type::JSON
                | Type::JSONB
        )
    }
}

/// Server side type of a bound parameter, one per typed column kind.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PgType {
    BigInt,
    Double,
    Boolean,
    Jsonb,
    Text,
}

impl PgType {
    pub fn of_field(field_type: FieldType) -> PgType {
        match field_type {
            FieldType::Integer => PgType::BigInt,
            FieldType::Float | FieldType::Currency => PgType::Double,
            FieldType::Boolean => PgType::Boolean,
            FieldType::Json => PgType::Jsonb,
            _ => PgType::Text,
        }
    }

    fn of_type(ty: &Type) -> Option<PgType> {
        match *ty {
            Type::INT8 => Some(PgType::BigInt),
            Type::FLOAT8 => Some(PgType::Double),
            Type::BOOL => Some(PgType::Boolean),
            Type::JSON | Type::JSONB => Some(PgType::Jsonb),
            Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME | Type::UNKNOWN => Some(PgType::Text),
            _ => None,
        }
    }

    /// Cast appended to a `$n` placeholder of this type.
    pub fn cast(&self) -> &'static str {
        match self {
            PgType::BigInt => "bigint",
            PgType::Double => "double precision",
            PgType::Boolean => "boolean",
            PgType::Jsonb => "jsonb",
            PgType::Text => "text",
        }
    }
}

/// Values are converted to the parameter type first, a value without a
/// lossless form of that type is refused instead of written as raw bytes.
impl ToSql for Value {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, Box<dyn Error + Sync + Send>> {
        let target = PgType::of_type(ty).ok_or_else(|| format!("cannot bind a value as {}", ty))?;
        let fitted = self
            .fit_pg(target)
            .ok_or_else(|| format!("{} '{}' does not fit a {} parameter", self.type_name(), self, ty))?;
        match (target, fitted) {
            (_, Value::Null) => Ok(IsNull::Yes),
            (PgType::Jsonb, value) => Json(serde_json::Value::from(&value)).to_sql(ty, out),
            (PgType::BigInt, Value::Int(i)) => i.to_sql(ty, out),
            (PgType::Double, Value::Float(f)) => f.to_sql(ty, out),
            (PgType::Boolean, Value::Bool(b)) => b.to_sql(ty, out),
            (PgType::Text, Value::Text(t)) => t.to_sql(ty, out),
            (_, other) => Err(format!("{} cannot be bound as {}", other.type_name(), ty).into()),
        }
    }

    fn accepts(ty: &Type) -> bool {
        PgType::of_type(ty).is_some()
    }

    to_sql_checked!();
}

impl Value {
    pub fn pg_type(&self) -> PgType {
        match self {
            Value::Int(_) => PgType::BigInt,
            Value::Float(_) => PgType::Double,
            Value::Bool(_) => PgType::Boolean,
            Value::Array(_) | Value::Dict(_) => PgType::Jsonb,
            Value::Text(_) | Value::Date(_) | Value::Time(_) | Value::Null => PgType::Text,
        }
    }

    /// Cast appended to a `$n` placeholder carrying this value.
    pub fn pg_cast(&self) -> &'static str {
        self.pg_type().cast()
    }

    /// This value in the representation `target` binds, `None` when there is
    /// no lossless one.
    pub fn fit_pg(&self, target: PgType) -> Option<Value> {
        match (target, self) {
            (_, Value::Null) => Some(Value::Null),
            (PgType::Jsonb, value) => Some(value.clone()),
            (PgType::BigInt, Value::Int(_)) => Some(self.clone()),
            (PgType::BigInt, Value::Float(f)) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => {
                Some(Value::int(*f as i64))
            }
            (PgType::BigInt, Value::Text(t)) => t.trim().parse::<i64>().ok().map(Value::int),
            (PgType::Double, Value::Int(_) | Value::Float(_) | Value::Text(_)) => {
                self.as_float().ok().filter(|f| f.is_finite()).map(Value::float)
            }
            (PgType::Boolean, Value::Bool(_) | Value::Text(_)) => self.as_bool().ok().map(Value::bool),
            (PgType::Boolean, Value::Int(i)) if *i == 0 || *i == 1 => Some(Value::bool(*i == 1)),
            (PgType::Text, Value::Text(_)) => Some(self.clone()),
            (PgType::Text, Value::Date(d)) => Some(Value::text(format_date(d))),
            (PgType::Text, Value::Time(t)) => Some(Value::text(format_datetime(t))),
            (PgType::Text, Value::Array(_) | Value::Dict(_)) => {
                Some(Value::text(serde_json::Value::from(self).to_string()))
            }
            (PgType::Text, other) => Some(Value::text(other.to_plain_string())),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bound_as(value: Value, ty: &Type) -> Result<BytesMut, Box<dyn Error + Sync + Send>> {
        let mut out = BytesMut::new();
        value.to_sql_checked(ty, &mut out)?;
        Ok(out)
    }

    #[test]
    fn whole_floats_bind_as_bigint() {
        let out = bound_as(Value::float(42.0), &Type::INT8).unwrap();
        assert_eq!(i64::from_sql(&Type::INT8, &out).unwrap(), 42);
        assert_eq!(Value::float(42.0).fit_pg(PgType::BigInt), Some(Value::int(42)));
    }

    #[test]
    fn fractional_floats_never_reach_bigint() {
        assert_eq!(Value::float(1.5).fit_pg(PgType::BigInt), None);
        assert!(bound_as(Value::float(1.5), &Type::INT8).is_err());
        assert!(bound_as(Value::text("many"), &Type::INT8).is_err());
        assert!(bound_as(Value::text("maybe"), &Type::BOOL).is_err());
    }

    #[test]
    fn numbers_widen_and_render() {
        let out = bound_as(Value::int(3), &Type::FLOAT8).unwrap();
        assert_eq!(f64::from_sql(&Type::FLOAT8, &out).unwrap(), 3.0);
        let out = bound_as(Value::int(3), &Type::TEXT).unwrap();
        assert_eq!(String::from_sql(&Type::TEXT, &out).unwrap(), "3");
        assert_eq!(Value::int(1).fit_pg(PgType::Boolean), Some(Value::bool(true)));
        assert_eq!(Value::int(7).fit_pg(PgType::Boolean), None);
    }

    #[test]
    fn anything_binds_as_jsonb() {
        let out = bound_as(Value::text("loose"), &Type::JSONB).unwrap();
        let json = serde_json::Value::from_sql(&Type::JSONB, &out).unwrap();
        assert_eq!(json, serde_json::Value::String("loose".to_string()));
        assert_eq!(bound_as(Value::Null, &Type::INT8).unwrap().len(), 0);
    }
}
