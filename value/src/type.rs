use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// Declared type of a field in the entity metadata.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    #[serde(alias = "str", alias = "text")]
    String,
    #[serde(alias = "int")]
    Integer,
    Float,
    Currency,
    #[serde(alias = "bool")]
    Boolean,
    Date,
    #[serde(alias = "timestamp")]
    Datetime,
    #[serde(alias = "reference", alias = "objectId")]
    ObjectId,
    Json,
}

impl FieldType {
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            FieldType::Integer | FieldType::Float | FieldType::Currency
        )
    }

    pub fn is_temporal(&self) -> bool {
        matches!(self, FieldType::Date | FieldType::Datetime)
    }

    /// Types that support range operators.
    pub fn is_ordered(&self) -> bool {
        self.is_numeric() || self.is_temporal()
    }
}

impl Display for FieldType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FieldType::String => "string",
            FieldType::Integer => "integer",
            FieldType::Float => "float",
            FieldType::Currency => "currency",
            FieldType::Boolean => "boolean",
            FieldType::Date => "date",
            FieldType::Datetime => "datetime",
            FieldType::ObjectId => "objectid",
            FieldType::Json => "json",
        };
        f.write_str(name)
    }
}

impl FromStr for FieldType {
    type Err = String;

    fn from_str(stencil: &str) -> Result<Self, Self::Err> {
        match stencil.to_lowercase().as_str() {
            "string" | "str" | "text" => Ok(FieldType::String),
            "integer" | "int" => Ok(FieldType::Integer),
            "float" => Ok(FieldType::Float),
            "currency" => Ok(FieldType::Currency),
            "boolean" | "bool" => Ok(FieldType::Boolean),
            "date" => Ok(FieldType::Date),
            "datetime" | "timestamp" => Ok(FieldType::Datetime),
            "objectid" | "reference" => Ok(FieldType::ObjectId),
            "json" => Ok(FieldType::Json),
            other => Err(format!("unknown field type '{}'", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::FieldType;

    #[test]
    fn parse() {
        assert_eq!("Integer".parse::<FieldType>(), Ok(FieldType::Integer));
        assert_eq!("bool".parse::<FieldType>(), Ok(FieldType::Boolean));
        assert_eq!("ObjectId".parse::<FieldType>(), Ok(FieldType::ObjectId));
        assert!("blob".parse::<FieldType>().is_err());
    }

    #[test]
    fn ordered() {
        assert!(FieldType::Currency.is_ordered());
        assert!(FieldType::Date.is_ordered());
        assert!(!FieldType::String.is_ordered());
        assert!(!FieldType::Boolean.is_ordered());
    }
}
