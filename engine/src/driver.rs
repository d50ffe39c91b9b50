use crate::engine::EngineKind;
use async_trait::async_trait;
use error::StoreResult;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use util::{EntityMeta, Filter, MatchKind, SortField};
use value::{Document, StorageTraits, Value};

/// A resolved list request: canonical field names, effective sort order and
/// the page window.
#[derive(Clone, Debug, Default)]
pub struct ListQuery {
    pub filter: Filter,
    pub sort: Vec<SortField>,
    pub offset: u64,
    pub limit: u64,
    pub substring_match: bool,
}

/// Index as reported by a backend.
#[derive(Clone, Debug, PartialEq)]
pub struct IndexInfo {
    pub name: String,
    pub fields: Vec<String>,
    pub unique: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub enum HealthStatus {
    Healthy,
    Degraded(Vec<String>),
    Unavailable(String),
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthStatus::Healthy)
    }
}

impl Display for HealthStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => f.write_str("healthy"),
            HealthStatus::Degraded(reasons) => write!(f, "degraded: {}", reasons.join("; ")),
            HealthStatus::Unavailable(reason) => write!(f, "unavailable: {}", reason),
        }
    }
}

/// Common storage interface of every backend.
///
/// Documents handed to a driver are already in the storage form described by
/// [`Driver::storage_traits`] and carry no identifier key, the identifier is
/// passed separately. Documents returned by a driver carry the identifier under
/// [`Driver::id_field`].
#[async_trait]
pub trait Driver: Send + Sync {
    fn kind(&self) -> EngineKind;

    /// Creates missing collections and their unique indexes.
    async fn init(&self, entities: &[Arc<EntityMeta>]) -> StoreResult<()>;

    async fn close(&self) -> StoreResult<()>;

    /// Key of the identifier in documents returned by this driver.
    fn id_field(&self) -> &'static str;

    fn get_id(&self, document: &Document) -> Option<String> {
        document
            .get(self.id_field())
            .filter(|v| !v.is_null())
            .map(|v| v.to_plain_string())
    }

    /// One page of matching documents and the total number of matches.
    async fn get_list(&self, meta: &EntityMeta, query: &ListQuery)
    -> StoreResult<(Vec<Document>, u64)>;

    async fn get_by_id(&self, meta: &EntityMeta, id: &str) -> StoreResult<Option<Document>>;

    async fn create(&self, meta: &EntityMeta, id: &str, document: Document)
    -> StoreResult<Document>;

    /// Replaces the stored document, `None` if there is none.
    async fn update(
        &self,
        meta: &EntityMeta,
        id: &str,
        document: Document,
    ) -> StoreResult<Option<Document>>;

    /// Removes and returns the stored document, `None` if there is none.
    async fn delete(&self, meta: &EntityMeta, id: &str) -> StoreResult<Option<Document>>;

    async fn collection_exists(&self, meta: &EntityMeta) -> StoreResult<bool>;

    async fn create_collection(&self, meta: &EntityMeta) -> StoreResult<()>;

    async fn delete_collection(&self, meta: &EntityMeta) -> StoreResult<()>;

    async fn list_indexes(&self, meta: &EntityMeta) -> StoreResult<Vec<IndexInfo>>;

    /// Whether declared unique groups are enforced by the backend itself.
    fn supports_native_indexes(&self) -> bool;

    /// Whether a document other than `exclude_id` holds exactly these values.
    async fn document_exists_with_field_value(
        &self,
        meta: &EntityMeta,
        values: &[(String, Value)],
        exclude_id: Option<&str>,
    ) -> StoreResult<bool>;

    fn storage_traits(&self) -> StorageTraits;

    async fn health(&self, entities: &[Arc<EntityMeta>]) -> HealthStatus;
}

/// Translation of the generic filter and sort shapes into a native query.
pub trait QueryTranslator {
    type Filter;
    type Sort;

    fn build_query_filter(
        &self,
        meta: &EntityMeta,
        filter: &Filter,
        substring_match: bool,
    ) -> StoreResult<Self::Filter>;

    fn build_sort_spec(&self, meta: &EntityMeta, sort: &[SortField]) -> StoreResult<Self::Sort>;
}

/// Match kind of a field in a list filter.
pub(crate) fn list_match(meta: &EntityMeta, substring_match: bool) -> impl Fn(&str) -> MatchKind {
    move |field| meta.match_kind(field, substring_match)
}

/// Uniqueness checks compare whole stored values.
pub(crate) fn exact_match(_field: &str) -> MatchKind {
    MatchKind::Exact
}

/// Equality filter over the given values, used by the uniqueness check.
pub(crate) fn values_filter(values: &[(String, Value)]) -> Filter {
    values
        .iter()
        .fold(Filter::new(), |filter, (field, value)| filter.eq(field, value.clone()))
}

/// Whether sorting on `field` has to ignore case.
pub(crate) fn sorts_case_insensitive(meta: &EntityMeta, field: &str, case_sensitive: bool) -> bool {
    !case_sensitive && meta.is_text(field)
}
