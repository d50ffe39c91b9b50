use error::{StoreError, StoreResult};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use value::FieldType;

/// Public name of the identifier of every document.
pub const ID_FIELD: &str = "id";

/// Metadata of a single field.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldMeta {
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub required: bool,
    /// stamped with the current time on create
    #[serde(default, alias = "autoGenerate")]
    pub auto_generate: bool,
    /// stamped with the current time on every write
    #[serde(default, alias = "autoUpdate")]
    pub auto_update: bool,
    #[serde(default, alias = "enum", alias = "enumValues")]
    pub enum_values: Option<Vec<String>>,
    /// shorthand for a single field unique group
    #[serde(default)]
    pub unique: bool,
    /// explicit target entity of an ObjectId field
    #[serde(default)]
    pub references: Option<String>,
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
    /// indexes into the unique groups of the entity, filled by the registry
    #[serde(skip)]
    pub unique_groups: Vec<usize>,
}

impl FieldMeta {
    pub fn new(field_type: FieldType) -> Self {
        FieldMeta {
            field_type,
            required: false,
            auto_generate: false,
            auto_update: false,
            enum_values: None,
            unique: false,
            references: None,
            min: None,
            max: None,
            unique_groups: vec![],
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn auto_generate(mut self) -> Self {
        self.auto_generate = true;
        self
    }

    pub fn auto_update(mut self) -> Self {
        self.auto_update = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn enum_values<S: AsRef<str>>(mut self, values: &[S]) -> Self {
        self.enum_values = Some(values.iter().map(|v| v.as_ref().to_string()).collect());
        self
    }

    pub fn references<S: AsRef<str>>(mut self, entity: S) -> Self {
        self.references = Some(entity.as_ref().to_string());
        self
    }

    pub fn range(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.min = min;
        self.max = max;
        self
    }

    pub fn is_enum(&self) -> bool {
        self.enum_values.as_ref().is_some_and(|v| !v.is_empty())
    }

    /// Free text: a string without enum metadata.
    pub fn is_free_text(&self) -> bool {
        self.field_type == FieldType::String && !self.is_enum()
    }
}

/// How equality on a field is evaluated by every driver.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum MatchKind {
    /// case-insensitive substring
    Substring,
    /// whole value, case-insensitive
    ExactIgnoreCase,
    Exact,
}

/// Serialized form of an entity, as found in configuration files.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EntityDefinition {
    pub name: String,
    pub fields: IndexMap<String, FieldMeta>,
    #[serde(default)]
    pub unique: Vec<Vec<String>>,
}

impl EntityDefinition {
    pub fn new<S: AsRef<str>>(name: S) -> Self {
        EntityDefinition {
            name: name.as_ref().to_string(),
            fields: IndexMap::new(),
            unique: vec![],
        }
    }

    pub fn field<S: AsRef<str>>(mut self, name: S, meta: FieldMeta) -> Self {
        self.fields.insert(name.as_ref().to_string(), meta);
        self
    }

    pub fn unique_group<S: AsRef<str>>(mut self, fields: &[S]) -> Self {
        self.unique
            .push(fields.iter().map(|f| f.as_ref().to_string()).collect());
        self
    }
}

/// A foreign key field together with the names derived from it.
#[derive(Clone, Debug, PartialEq)]
pub struct Reference {
    pub field: String,
    /// sibling key that receives the expansion, `userId` -> `user`
    pub key: String,
    /// target entity as declared or derived, not yet checked against the registry
    pub target: String,
    pub required: bool,
}

/// Precomputed metadata of one entity.
#[derive(Clone, Debug)]
pub struct EntityMeta {
    name: String,
    collection: String,
    fields: IndexMap<String, FieldMeta>,
    lookup: HashMap<String, String>,
    unique_groups: Vec<Vec<String>>,
    default_sort: String,
}

impl EntityMeta {
    pub fn build(definition: EntityDefinition) -> StoreResult<Self> {
        check_name(&definition.name)?;
        let mut fields = definition.fields;
        fields.shift_remove(ID_FIELD);

        let mut lookup = HashMap::new();
        lookup.insert(ID_FIELD.to_string(), ID_FIELD.to_string());
        for name in fields.keys() {
            check_name(name)?;
            if lookup.insert(name.to_lowercase(), name.clone()).is_some() {
                return Err(StoreError::config(format!(
                    "field '{}' of {} collides case-insensitively with another field",
                    name, definition.name
                )));
            }
        }

        let mut unique_groups: Vec<Vec<String>> = vec![];
        let singles = fields
            .iter()
            .filter(|(_, meta)| meta.unique)
            .map(|(name, _)| vec![name.clone()]);
        for group in definition.unique.into_iter().chain(singles) {
            let mut resolved = vec![];
            for field in &group {
                match lookup.get(&field.to_lowercase()) {
                    Some(name) => resolved.push(name.clone()),
                    None => {
                        return Err(StoreError::config(format!(
                            "unique group of {} names unknown field '{}'",
                            definition.name, field
                        )));
                    }
                }
            }
            if !resolved.is_empty() && !unique_groups.contains(&resolved) {
                unique_groups.push(resolved);
            }
        }
        for (index, group) in unique_groups.iter().enumerate() {
            for field in group {
                if let Some(meta) = fields.get_mut(field) {
                    meta.unique_groups.push(index);
                }
            }
        }

        let default_sort = fields
            .iter()
            .find(|(_, meta)| meta.auto_generate && meta.field_type.is_temporal())
            .map(|(name, _)| name.clone())
            .unwrap_or_else(|| ID_FIELD.to_string());

        Ok(EntityMeta {
            collection: definition.name.to_lowercase(),
            name: definition.name,
            fields,
            lookup,
            unique_groups,
            default_sort,
        })
    }

    /// Canonical casing of the entity name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Case-normalized name used for tables, collections and indexes.
    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn fields(&self) -> &IndexMap<String, FieldMeta> {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldMeta> {
        self.fields.get(name)
    }

    /// Canonical field name for a request token, `id` included.
    pub fn resolve_field(&self, token: &str) -> Option<&str> {
        self.lookup.get(&token.to_lowercase()).map(|s| s.as_str())
    }

    /// Like [`resolve_field`](Self::resolve_field) but reports unknown names as request errors.
    pub fn require_field(&self, token: &str) -> StoreResult<&str> {
        self.resolve_field(token).ok_or_else(|| {
            StoreError::invalid(format!("unknown field '{}' for {}", token, self.name))
        })
    }

    /// Declared type, the identifier counts as a string.
    pub fn field_type(&self, name: &str) -> Option<FieldType> {
        if name == ID_FIELD {
            return Some(FieldType::String);
        }
        self.fields.get(name).map(|m| m.field_type)
    }

    pub fn unique_groups(&self) -> &[Vec<String>] {
        &self.unique_groups
    }

    /// First auto generated date/datetime field, else the identifier.
    pub fn default_sort_field(&self) -> &str {
        &self.default_sort
    }

    pub fn match_kind(&self, field: &str, substring: bool) -> MatchKind {
        match self.fields.get(field) {
            Some(meta) if meta.is_free_text() => {
                if substring {
                    MatchKind::Substring
                } else {
                    MatchKind::ExactIgnoreCase
                }
            }
            _ => MatchKind::Exact,
        }
    }

    /// Whether sorting on `field` ignores case unless the driver is case-sensitive.
    pub fn is_text(&self, field: &str) -> bool {
        self.fields
            .get(field)
            .is_some_and(|m| m.field_type == FieldType::String)
    }

    pub fn references(&self) -> Vec<Reference> {
        self.fields
            .iter()
            .filter(|(_, meta)| meta.field_type == FieldType::ObjectId)
            .map(|(name, meta)| {
                let stripped = strip_id_suffix(name);
                // a declared field keeps its data, the expansion moves aside
                let key = stripped
                    .filter(|s| !self.fields.contains_key(*s))
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| format!("{}_ref", name));
                let target = meta
                    .references
                    .clone()
                    .unwrap_or_else(|| stripped.unwrap_or(name).to_string());
                Reference {
                    field: name.clone(),
                    key,
                    target,
                    required: meta.required,
                }
            })
            .collect()
    }

    /// Fields stamped with the current time on this kind of write.
    pub fn stamped_fields(&self, create: bool) -> Vec<(&str, FieldType)> {
        self.fields
            .iter()
            .filter(|(_, m)| m.field_type.is_temporal())
            .filter(|(_, m)| m.auto_update || (create && m.auto_generate))
            .map(|(n, m)| (n.as_str(), m.field_type))
            .collect()
    }
}

fn strip_id_suffix(name: &str) -> Option<&str> {
    name.strip_suffix("_id")
        .or_else(|| name.strip_suffix("Id"))
        .or_else(|| name.strip_suffix("ID"))
        .filter(|s| !s.is_empty())
}

/// Names end up in SQL identifiers, JSON paths and index names.
fn check_name(name: &str) -> StoreResult<()> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    };
    if valid {
        Ok(())
    } else {
        Err(StoreError::config(format!("'{}' is not a valid name", name)))
    }
}

/// Read access to entity metadata.
pub trait MetadataProvider: Send + Sync {
    fn entity(&self, name: &str) -> Option<Arc<EntityMeta>>;

    fn list_entities(&self) -> Vec<String>;

    fn proper_name(&self, name: &str) -> Option<String> {
        self.entity(name).map(|e| e.name().to_string())
    }

    fn field_meta(&self, entity: &str, field: &str) -> Option<FieldMeta> {
        let entity = self.entity(entity)?;
        let field = entity.resolve_field(field)?.to_string();
        entity.field(&field).cloned()
    }

    fn default_unique_groups(&self, entity: &str) -> Vec<Vec<String>> {
        self.entity(entity)
            .map(|e| e.unique_groups().to_vec())
            .unwrap_or_default()
    }
}

/// Registry built once at schema-load time.
#[derive(Clone, Debug, Default)]
pub struct MetadataRegistry {
    entities: IndexMap<String, Arc<EntityMeta>>,
}

impl MetadataRegistry {
    pub fn new(definitions: Vec<EntityDefinition>) -> StoreResult<Self> {
        let mut entities = IndexMap::new();
        for definition in definitions {
            let meta = EntityMeta::build(definition)?;
            let key = meta.collection().to_string();
            if entities.contains_key(&key) {
                return Err(StoreError::config(format!(
                    "entity '{}' is defined twice",
                    meta.name()
                )));
            }
            entities.insert(key, Arc::new(meta));
        }
        Ok(MetadataRegistry { entities })
    }

    pub fn entities(&self) -> impl Iterator<Item = &Arc<EntityMeta>> {
        self.entities.values()
    }
}

impl MetadataProvider for MetadataRegistry {
    fn entity(&self, name: &str) -> Option<Arc<EntityMeta>> {
        self.entities.get(&name.to_lowercase()).cloned()
    }

    fn list_entities(&self) -> Vec<String> {
        self.entities.values().map(|e| e.name().to_string()).collect()
    }
}
