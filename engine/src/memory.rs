use crate::config::MemoryConfig;
use crate::driver::{
    Driver, HealthStatus, IndexInfo, ListQuery, QueryTranslator, exact_match, list_match,
    sorts_case_insensitive, values_filter,
};
use crate::engine::EngineKind;
use crate::unique;
use async_trait::async_trait;
use error::StoreResult;
use indexmap::IndexMap;
use parking_lot::RwLock;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;
use util::{Condition, EntityMeta, Filter, ID_FIELD, MatchKind, SortField};
use value::{Document, FieldType, StorageTraits, Value, to_storage};

const MEMORY_ID: &str = "_id";

type Collections = HashMap<String, IndexMap<String, Document>>;

/// Predicate over one stored document.
pub type Predicate = Box<dyn Fn(&Document) -> bool + Send + Sync>;

/// Comparator ordering two stored documents.
pub type Comparator = Box<dyn Fn(&Document, &Document) -> Ordering + Send + Sync>;

fn lookup<'a>(document: &'a Document, field: &str) -> Option<&'a Value> {
    let key = if field == ID_FIELD { MEMORY_ID } else { field };
    document.get(key).filter(|v| !v.is_null())
}

fn matches(stored: Option<&Value>, condition: &Condition, kind: MatchKind) -> bool {
    match condition {
        Condition::Eq(Value::Null) => stored.is_none(),
        Condition::Eq(expected) => stored.is_some_and(|stored| match kind {
            MatchKind::Substring => stored.contains_ignore_case(&expected.to_plain_string()),
            MatchKind::ExactIgnoreCase => stored.loose_eq(expected, true),
            MatchKind::Exact => stored.loose_eq(expected, false),
        }),
        Condition::Range(range) => stored.is_some_and(|stored| range.contains(stored)),
    }
}

/// Evaluates the common filter and sort policy in process.
#[derive(Clone, Debug)]
pub struct MemoryTranslator {
    pub(crate) case_sensitive: bool,
}

impl MemoryTranslator {
    fn predicate(
        &self,
        meta: &EntityMeta,
        filter: &Filter,
        kind_of: impl Fn(&str) -> MatchKind,
    ) -> Predicate {
        let conditions = filter
            .iter()
            .map(|(field, condition)| {
                let field_type = meta.field_type(field).unwrap_or(FieldType::String);
                let condition = match condition {
                    Condition::Eq(value) => Condition::Eq(storage(field, field_type, value)),
                    Condition::Range(range) => {
                        let mut stored = range.clone();
                        for (op, bound) in range.bounds() {
                            stored.set(op, storage(field, field_type, bound));
                        }
                        Condition::Range(stored)
                    }
                };
                (field.clone(), condition, kind_of(field))
            })
            .collect::<Vec<_>>();

        Box::new(move |document| {
            conditions
                .iter()
                .all(|(field, condition, kind)| matches(lookup(document, field), condition, *kind))
        })
    }
}

fn storage(field: &str, field_type: FieldType, value: &Value) -> Value {
    if field == ID_FIELD {
        value.clone()
    } else {
        to_storage(field_type, value.clone(), &StorageTraits::NATIVE)
    }
}

impl QueryTranslator for MemoryTranslator {
    type Filter = Predicate;
    type Sort = Comparator;

    fn build_query_filter(
        &self,
        meta: &EntityMeta,
        filter: &Filter,
        substring_match: bool,
    ) -> StoreResult<Predicate> {
        Ok(self.predicate(meta, filter, list_match(meta, substring_match)))
    }

    fn build_sort_spec(&self, meta: &EntityMeta, sort: &[SortField]) -> StoreResult<Comparator> {
        let keys = sort
            .iter()
            .map(|s| {
                (
                    s.field.clone(),
                    s.direction.is_desc(),
                    sorts_case_insensitive(meta, &s.field, self.case_sensitive),
                )
            })
            .collect::<Vec<_>>();

        Ok(Box::new(move |a, b| {
            for (field, desc, ci) in &keys {
                // missing values order like nulls, before everything else
                let left = lookup(a, field).unwrap_or(&Value::Null);
                let right = lookup(b, field).unwrap_or(&Value::Null);
                let ordering = left.compare(right, *ci);
                let ordering = if *desc { ordering.reverse() } else { ordering };
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            Ordering::Equal
        }))
    }
}

/// Keeps every collection in process, mostly for tests and local tooling.
#[derive(Clone, Debug)]
pub struct Memory {
    pub(crate) collections: Arc<RwLock<Collections>>,
    pub(crate) translator: MemoryTranslator,
}

impl Memory {
    pub fn new(config: &MemoryConfig) -> Self {
        info!("☑️ Opened in-memory store");
        Memory {
            collections: Arc::new(RwLock::new(HashMap::new())),
            translator: MemoryTranslator {
                case_sensitive: config.common.case_sensitive,
            },
        }
    }

    fn stored(id: &str, document: Document) -> Document {
        let mut stored = document;
        stored.insert_first(MEMORY_ID, Value::text(id));
        stored
    }
}

#[async_trait]
impl Driver for Memory {
    fn kind(&self) -> EngineKind {
        EngineKind::Memory
    }

    async fn init(&self, entities: &[Arc<EntityMeta>]) -> StoreResult<()> {
        for meta in entities {
            self.create_collection(meta).await?;
        }
        Ok(())
    }

    async fn close(&self) -> StoreResult<()> {
        Ok(())
    }

    fn id_field(&self) -> &'static str {
        MEMORY_ID
    }

    async fn get_list(
        &self,
        meta: &EntityMeta,
        query: &ListQuery,
    ) -> StoreResult<(Vec<Document>, u64)> {
        let predicate = self
            .translator
            .build_query_filter(meta, &query.filter, query.substring_match)?;
        let comparator = self.translator.build_sort_spec(meta, &query.sort)?;

        let collections = self.collections.read();
        let mut found = collections
            .get(meta.collection())
            .map(|documents| documents.values().filter(|d| predicate(d)).collect::<Vec<_>>())
            .unwrap_or_default();
        found.sort_by(|a, b| comparator(a, b));

        let total = found.len() as u64;
        let page = found
            .into_iter()
            .skip(query.offset as usize)
            .take(query.limit as usize)
            .cloned()
            .collect();
        Ok((page, total))
    }

    async fn get_by_id(&self, meta: &EntityMeta, id: &str) -> StoreResult<Option<Document>> {
        Ok(self
            .collections
            .read()
            .get(meta.collection())
            .and_then(|documents| documents.get(id))
            .cloned())
    }

    async fn create(
        &self,
        meta: &EntityMeta,
        id: &str,
        document: Document,
    ) -> StoreResult<Document> {
        let mut collections = self.collections.write();
        let documents = collections.entry(meta.collection().to_string()).or_default();
        if documents.contains_key(id) {
            return Err(unique::duplicate(
                meta,
                vec![ID_FIELD.to_string()],
                id,
                &document,
            ));
        }
        let stored = Self::stored(id, document);
        documents.insert(id.to_string(), stored.clone());
        Ok(stored)
    }

    async fn update(
        &self,
        meta: &EntityMeta,
        id: &str,
        document: Document,
    ) -> StoreResult<Option<Document>> {
        let mut collections = self.collections.write();
        let Some(existing) = collections
            .get_mut(meta.collection())
            .and_then(|documents| documents.get_mut(id))
        else {
            return Ok(None);
        };
        *existing = Self::stored(id, document);
        Ok(Some(existing.clone()))
    }

    async fn delete(&self, meta: &EntityMeta, id: &str) -> StoreResult<Option<Document>> {
        Ok(self
            .collections
            .write()
            .get_mut(meta.collection())
            .and_then(|documents| documents.shift_remove(id)))
    }

    async fn collection_exists(&self, meta: &EntityMeta) -> StoreResult<bool> {
        Ok(self.collections.read().contains_key(meta.collection()))
    }

    async fn create_collection(&self, meta: &EntityMeta) -> StoreResult<()> {
        self.collections
            .write()
            .entry(meta.collection().to_string())
            .or_default();
        Ok(())
    }

    async fn delete_collection(&self, meta: &EntityMeta) -> StoreResult<()> {
        self.collections.write().remove(meta.collection());
        Ok(())
    }

    async fn list_indexes(&self, _meta: &EntityMeta) -> StoreResult<Vec<IndexInfo>> {
        Ok(vec![])
    }

    fn supports_native_indexes(&self) -> bool {
        false
    }

    async fn document_exists_with_field_value(
        &self,
        meta: &EntityMeta,
        values: &[(String, Value)],
        exclude_id: Option<&str>,
    ) -> StoreResult<bool> {
        let predicate = self
            .translator
            .predicate(meta, &values_filter(values), exact_match);
        Ok(self
            .collections
            .read()
            .get(meta.collection())
            .is_some_and(|documents| {
                documents
                    .iter()
                    .any(|(id, document)| Some(id.as_str()) != exclude_id && predicate(document))
            }))
    }

    fn storage_traits(&self) -> StorageTraits {
        StorageTraits::NATIVE
    }

    async fn health(&self, _entities: &[Arc<EntityMeta>]) -> HealthStatus {
        HealthStatus::Healthy
    }
}
