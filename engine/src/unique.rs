//! Shared translation of native duplicate-key failures into
//! [`StoreError::DuplicateConstraint`].

use error::StoreError;
use util::{EntityMeta, ID_FIELD};
use value::Document;

/// Name of the native index enforcing `fields`, identical on every backend.
pub fn index_name(collection: &str, fields: &[String]) -> String {
    format!("{}_unique_{}", collection, fields.join("_"))
}

/// Unique group enforced by the index called `name`.
pub fn group_of_index(meta: &EntityMeta, name: &str) -> Option<Vec<String>> {
    meta.unique_groups()
        .iter()
        .find(|group| {
            let expected = index_name(meta.collection(), group);
            name == expected || name.ends_with(&format!("_unique_{}", group.join("_")))
        })
        .cloned()
}

/// Group whose fields, in any casing, are exactly `columns`.
pub fn group_of_columns(meta: &EntityMeta, columns: &[&str]) -> Option<Vec<String>> {
    meta.unique_groups()
        .iter()
        .find(|group| {
            group.len() == columns.len()
                && group
                    .iter()
                    .all(|f| columns.iter().any(|c| c.eq_ignore_ascii_case(f)))
        })
        .cloned()
}

/// Builds the duplicate error for `fields`, reporting the offending values.
pub fn duplicate(meta: &EntityMeta, fields: Vec<String>, id: &str, document: &Document) -> StoreError {
    let value = fields
        .iter()
        .map(|field| {
            if field == ID_FIELD {
                id.to_string()
            } else {
                document
                    .get(field)
                    .map(|v| v.to_plain_string())
                    .unwrap_or_default()
            }
        })
        .collect::<Vec<_>>()
        .join(", ");
    StoreError::duplicate(meta.name(), fields, value)
}

/// Duplicate error for a violated index, unknown names are reported as is.
pub fn from_index(meta: &EntityMeta, name: &str, id: &str, document: &Document) -> StoreError {
    let fields = if is_primary_key(name) {
        vec![ID_FIELD.to_string()]
    } else {
        group_of_index(meta, name).unwrap_or_else(|| vec![name.to_string()])
    };
    duplicate(meta, fields, id, document)
}

fn is_primary_key(name: &str) -> bool {
    name.ends_with("_pkey") || name == "_id_" || name == "id"
}

/// Index name out of a mongodb duplicate key message:
/// `E11000 duplicate key error collection: db.user index: user_unique_email dup key: { ... }`.
pub fn mongo_index(message: &str) -> Option<&str> {
    let (_, rest) = message.split_once("index: ")?;
    rest.split_whitespace().next()
}

/// Violated index or columns out of a sqlite constraint message, either
/// `UNIQUE constraint failed: index 'user_unique_email'` or
/// `UNIQUE constraint failed: user.email, user.org`.
pub fn sqlite_violation(message: &str) -> Option<SqliteViolation> {
    let (_, rest) = message.split_once("constraint failed: ")?;
    let rest = rest.trim();
    if let Some(index) = rest.strip_prefix("index ") {
        return Some(SqliteViolation::Index(index.trim_matches('\'').to_string()));
    }
    let columns = rest
        .split(',')
        .filter_map(|c| c.trim().rsplit('.').next())
        .map(|c| c.to_string())
        .collect();
    Some(SqliteViolation::Columns(columns))
}

#[derive(Clone, Debug, PartialEq)]
pub enum SqliteViolation {
    Index(String),
    Columns(Vec<String>),
}

impl SqliteViolation {
    pub fn into_error(self, meta: &EntityMeta, id: &str, document: &Document) -> StoreError {
        match self {
            SqliteViolation::Index(name) => from_index(meta, &name, id, document),
            SqliteViolation::Columns(columns) => {
                let columns: Vec<&str> = columns.iter().map(|c| c.as_str()).collect();
                if columns == [ID_FIELD] {
                    return duplicate(meta, vec![ID_FIELD.to_string()], id, document);
                }
                let fields = group_of_columns(meta, &columns)
                    .unwrap_or_else(|| columns.iter().map(|c| c.to_string()).collect());
                duplicate(meta, fields, id, document)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use util::{EntityDefinition, FieldMeta};
    use value::{FieldType, Value};

    fn meta() -> EntityMeta {
        EntityMeta::build(
            EntityDefinition::new("User")
                .field("email", FieldMeta::new(FieldType::String).unique())
                .field("first", FieldMeta::new(FieldType::String))
                .field("orgId", FieldMeta::new(FieldType::ObjectId))
                .unique_group(&["first", "orgId"]),
        )
        .unwrap()
    }

    #[test]
    fn names_round_trip() {
        let meta = meta();
        let name = index_name("user", &["first".to_string(), "orgId".to_string()]);
        assert_eq!(name, "user_unique_first_orgId");
        assert_eq!(
            group_of_index(&meta, &name),
            Some(vec!["first".to_string(), "orgId".to_string()])
        );
        assert_eq!(group_of_index(&meta, "something"), None);
    }

    #[test]
    fn mongo_message() {
        let message = "E11000 duplicate key error collection: docs.user index: user_unique_email dup key: { email: \"a@x.com\" }";
        assert_eq!(mongo_index(message), Some("user_unique_email"));
        let document = Document::from_pairs(vec![("email", Value::text("a@x.com"))]);
        match from_index(&meta(), "user_unique_email", "abc", &document) {
            StoreError::DuplicateConstraint { fields, value, .. } => {
                assert_eq!(fields, vec!["email"]);
                assert_eq!(value, "a@x.com");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn sqlite_messages() {
        assert_eq!(
            sqlite_violation("UNIQUE constraint failed: index 'user_unique_email'"),
            Some(SqliteViolation::Index("user_unique_email".to_string()))
        );
        let violation = sqlite_violation("UNIQUE constraint failed: user.first, user.orgId").unwrap();
        let document = Document::from_pairs(vec![
            ("first", Value::text("ann")),
            ("orgId", Value::text("o1")),
        ]);
        match violation.into_error(&meta(), "abc", &document) {
            StoreError::DuplicateConstraint { fields, value, .. } => {
                assert_eq!(fields, vec!["first", "orgId"]);
                assert_eq!(value, "ann, o1");
            }
            other => panic!("unexpected {:?}", other),
        }
        let violation = sqlite_violation("UNIQUE constraint failed: user.id").unwrap();
        match violation.into_error(&meta(), "abc", &Document::new()) {
            StoreError::DuplicateConstraint { fields, value, .. } => {
                assert_eq!(fields, vec!["id"]);
                assert_eq!(value, "abc");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn primary_keys() {
        match from_index(&meta(), "user_pkey", "abc", &Document::new()) {
            StoreError::DuplicateConstraint { fields, .. } => assert_eq!(fields, vec!["id"]),
            other => panic!("unexpected {:?}", other),
        }
    }
}
