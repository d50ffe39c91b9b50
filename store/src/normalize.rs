//! Shapes documents on their way into and out of a driver.

use util::{EntityMeta, ID_FIELD, normalize_id};
use value::time::now;
use value::{Document, FieldType, StorageTraits, Value, coerce, from_storage, to_storage};

/// Expansion keys of references that are not declared fields themselves.
fn placeholders(meta: &EntityMeta) -> Vec<String> {
    meta.references()
        .into_iter()
        .map(|r| r.key)
        .filter(|key| meta.field(key).is_none())
        .collect()
}

fn strip_placeholders(meta: &EntityMeta, document: &mut Document) {
    for key in placeholders(meta) {
        document.remove(&key);
    }
}

/// Document as returned to callers: `id` first and lowercase, the native
/// identifier key removed, temporal fields structured again.
pub(crate) fn response(meta: &EntityMeta, native_id: &str, document: Document) -> Document {
    let mut document = document;
    let id = document
        .remove(native_id)
        .or_else(|| document.remove(ID_FIELD))
        .map(|id| normalize_id(&id.to_plain_string()));
    document.remove(ID_FIELD);
    strip_placeholders(meta, &mut document);

    let mut normalized: Document = document
        .into_iter()
        .map(|(key, value)| match meta.field_type(&key) {
            Some(field_type) => {
                let value = from_storage(field_type, value);
                (key, value)
            }
            None => (key, value),
        })
        .collect();
    normalized.insert_first(ID_FIELD, id.map(Value::text).unwrap_or(Value::Null));
    normalized
}

/// Splits a caller payload into its identifier and the remaining fields:
/// declared fields get their canonical name and type, references are
/// lowercased and expansion placeholders are dropped.
pub(crate) fn payload(meta: &EntityMeta, native_id: &str, data: Document) -> (Option<String>, Document) {
    let mut id = None;
    let mut document = Document::new();
    for (key, value) in data {
        if key.eq_ignore_ascii_case(ID_FIELD) || key == native_id {
            if !value.is_null() {
                id = Some(normalize_id(&value.to_plain_string()));
            }
            continue;
        }
        match meta.resolve_field(&key) {
            Some(field) => {
                let field = field.to_string();
                let field_type = meta.field_type(&field).unwrap_or(FieldType::String);
                let value = match coerce(field_type, value) {
                    Value::Text(reference) if field_type == FieldType::ObjectId => {
                        Value::text(normalize_id(&reference))
                    }
                    other => other,
                };
                document.insert(field, value);
            }
            None => {
                document.insert(key, value);
            }
        }
    }
    strip_placeholders(meta, &mut document);
    (id.filter(|id| !id.is_empty()), document)
}

/// Stamps generated and updated timestamps.
pub(crate) fn stamp(meta: &EntityMeta, document: &mut Document, create: bool) {
    let time = now();
    for (field, field_type) in meta.stamped_fields(create) {
        let value = match field_type {
            FieldType::Date => Value::date(time.date_naive()),
            _ => Value::time(time),
        };
        document.insert(field, value);
    }
}

/// Converts declared fields to the form persisted by a driver with `traits`.
pub(crate) fn storage(meta: &EntityMeta, document: Document, traits: &StorageTraits) -> Document {
    document
        .into_iter()
        .map(|(key, value)| match meta.field_type(&key) {
            Some(field_type) => {
                let value = to_storage(field_type, value, traits);
                (key, value)
            }
            None => (key, value),
        })
        .collect()
}
