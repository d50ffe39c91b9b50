use crate::definition::{EntityMeta, ID_FIELD};
use error::Warning;
use value::{Document, FieldType, Value, matches_type};

/// Checks the shape of a document, never blocks a write.
pub trait Validator: Send + Sync {
    fn validate_model(&self, meta: &EntityMeta, document: &Document) -> Vec<Warning>;
}

/// Validates required, type, enum and min/max constraints of the metadata.
#[derive(Clone, Debug, Default)]
pub struct MetadataValidator;

impl Validator for MetadataValidator {
    fn validate_model(&self, meta: &EntityMeta, document: &Document) -> Vec<Warning> {
        let id = document.get(ID_FIELD).and_then(|v| v.as_str());
        let mut warnings = vec![];
        let mut warn = |field: &str, message: String| {
            let mut warning = Warning::validation(meta.name(), message).with_field(field);
            if let Some(id) = id {
                warning = warning.with_id(id);
            }
            warnings.push(warning);
        };

        for (name, field) in meta.fields() {
            let value = match document.get(name) {
                Some(value) if !value.is_null() => value,
                _ => {
                    // stamped fields are filled in after validation
                    if field.required && !field.auto_generate && !field.auto_update {
                        warn(name, "is required".to_string());
                    }
                    continue;
                }
            };

            if !matches_type(field.field_type, value) {
                warn(
                    name,
                    format!("expected {} but got {}", field.field_type, value.type_name()),
                );
                continue;
            }

            if let (Some(allowed), Value::Text(text)) = (&field.enum_values, value)
                && !allowed.is_empty()
                && !allowed.iter().any(|a| a == text)
            {
                warn(
                    name,
                    format!("'{}' is not one of [{}]", text, allowed.join(", ")),
                );
            }

            if field.field_type.is_numeric() || field.field_type == FieldType::String {
                let measure = match value {
                    Value::Text(t) => Some(t.chars().count() as f64),
                    other => other.as_float().ok(),
                };
                if let Some(measure) = measure {
                    if let Some(min) = field.min
                        && measure < min
                    {
                        warn(name, format!("{} is below the minimum {}", measure, min));
                    }
                    if let Some(max) = field.max
                        && measure > max
                    {
                        warn(name, format!("{} is above the maximum {}", measure, max));
                    }
                }
            }
        }
        warnings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::{EntityDefinition, FieldMeta};

    fn meta() -> EntityMeta {
        EntityMeta::build(
            EntityDefinition::new("Ticket")
                .field("title", FieldMeta::new(FieldType::String).required())
                .field(
                    "state",
                    FieldMeta::new(FieldType::String).enum_values(&["open", "closed"]),
                )
                .field(
                    "priority",
                    FieldMeta::new(FieldType::Integer).range(Some(1.0), Some(5.0)),
                )
                .field(
                    "createdAt",
                    FieldMeta::new(FieldType::Datetime).required().auto_generate(),
                ),
        )
        .unwrap()
    }

    #[test]
    fn valid_document() {
        let document = Document::from_pairs(vec![
            ("title", Value::text("broken")),
            ("state", Value::text("open")),
            ("priority", Value::int(3)),
        ]);
        assert!(MetadataValidator.validate_model(&meta(), &document).is_empty());
    }

    #[test]
    fn enum_values_are_exact() {
        let document = Document::from_pairs(vec![
            ("title", Value::text("broken")),
            ("state", Value::text("OPEN")),
        ]);
        let warnings = MetadataValidator.validate_model(&meta(), &document);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].field.as_deref(), Some("state"));
    }

    #[test]
    fn advisory_problems() {
        let document = Document::from_pairs(vec![
            ("id", Value::text("abc")),
            ("state", Value::text("pending")),
            ("priority", Value::int(9)),
        ]);
        let warnings = MetadataValidator.validate_model(&meta(), &document);
        let fields: Vec<_> = warnings.iter().filter_map(|w| w.field.clone()).collect();
        assert_eq!(fields, vec!["title", "state", "priority"]);
        assert!(warnings.iter().all(|w| w.id.as_deref() == Some("abc")));
    }

    #[test]
    fn wrong_type() {
        let document = Document::from_pairs(vec![
            ("title", Value::text("x")),
            ("priority", Value::text("high")),
        ]);
        let warnings = MetadataValidator.validate_model(&meta(), &document);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].message.contains("expected integer"));
    }
}
