use crate::config::EngineConfig;
use crate::driver::{Driver, HealthStatus, IndexInfo, ListQuery};
use crate::elastic::Elastic;
use crate::memory::Memory;
use crate::mongo::MongoDB;
use crate::postgres::Postgres;
use crate::sqlite::Sqlite;
use async_trait::async_trait;
use error::{StoreError, StoreResult};
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use std::sync::Arc;
use util::EntityMeta;
use value::{Document, StorageTraits, Value};

/// Backend type, keyed by the name used in configuration.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum EngineKind {
    MongoDB,
    Elasticsearch,
    Postgres,
    Sqlite,
    Memory,
}

impl Display for EngineKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineKind::MongoDB => f.write_str("mongodb"),
            EngineKind::Elasticsearch => f.write_str("elasticsearch"),
            EngineKind::Postgres => f.write_str("postgresql"),
            EngineKind::Sqlite => f.write_str("sqlite"),
            EngineKind::Memory => f.write_str("memory"),
        }
    }
}

impl FromStr for EngineKind {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "mongodb" | "mongo" => Ok(EngineKind::MongoDB),
            "elasticsearch" | "elastic" => Ok(EngineKind::Elasticsearch),
            "postgresql" | "postgres" => Ok(EngineKind::Postgres),
            "sqlite" => Ok(EngineKind::Sqlite),
            "memory" => Ok(EngineKind::Memory),
            other => Err(StoreError::config(format!("unknown backend type '{}'", other))),
        }
    }
}

#[derive(Clone)]
pub enum Engine {
    MongoDB(MongoDB),
    Elasticsearch(Elastic),
    Postgres(Postgres),
    Sqlite(Sqlite),
    Memory(Memory),
}

impl Display for Engine {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        self.kind().fmt(f)
    }
}

impl Engine {
    /// Connects the driver selected by `config`.
    pub async fn connect(config: &EngineConfig) -> StoreResult<Engine> {
        Ok(match config {
            EngineConfig::Mongo(c) => Engine::MongoDB(MongoDB::connect(c).await?),
            EngineConfig::Elastic(c) => Engine::Elasticsearch(Elastic::connect(c).await?),
            EngineConfig::Postgres(c) => Engine::Postgres(Postgres::connect(c).await?),
            EngineConfig::Sqlite(c) => Engine::Sqlite(Sqlite::open(c).await?),
            EngineConfig::Memory(c) => Engine::Memory(Memory::new(c)),
        })
    }

    fn driver(&self) -> &dyn Driver {
        match self {
            Engine::MongoDB(m) => m,
            Engine::Elasticsearch(e) => e,
            Engine::Postgres(p) => p,
            Engine::Sqlite(s) => s,
            Engine::Memory(m) => m,
        }
    }
}

#[async_trait]
impl Driver for Engine {
    fn kind(&self) -> EngineKind {
        self.driver().kind()
    }

    async fn init(&self, entities: &[Arc<EntityMeta>]) -> StoreResult<()> {
        self.driver().init(entities).await
    }

    async fn close(&self) -> StoreResult<()> {
        self.driver().close().await
    }

    fn id_field(&self) -> &'static str {
        self.driver().id_field()
    }

    async fn get_list(
        &self,
        meta: &EntityMeta,
        query: &ListQuery,
    ) -> StoreResult<(Vec<Document>, u64)> {
        self.driver().get_list(meta, query).await
    }

    async fn get_by_id(&self, meta: &EntityMeta, id: &str) -> StoreResult<Option<Document>> {
        self.driver().get_by_id(meta, id).await
    }

    async fn create(
        &self,
        meta: &EntityMeta,
        id: &str,
        document: Document,
    ) -> StoreResult<Document> {
        self.driver().create(meta, id, document).await
    }

    async fn update(
        &self,
        meta: &EntityMeta,
        id: &str,
        document: Document,
    ) -> StoreResult<Option<Document>> {
        self.driver().update(meta, id, document).await
    }

    async fn delete(&self, meta: &EntityMeta, id: &str) -> StoreResult<Option<Document>> {
        self.driver().delete(meta, id).await
    }

    async fn collection_exists(&self, meta: &EntityMeta) -> StoreResult<bool> {
        self.driver().collection_exists(meta).await
    }

    async fn create_collection(&self, meta: &EntityMeta) -> StoreResult<()> {
        self.driver().create_collection(meta).await
    }

    async fn delete_collection(&self, meta: &EntityMeta) -> StoreResult<()> {
        self.driver().delete_collection(meta).await
    }

    async fn list_indexes(&self, meta: &EntityMeta) -> StoreResult<Vec<IndexInfo>> {
        self.driver().list_indexes(meta).await
    }

    fn supports_native_indexes(&self) -> bool {
        self.driver().supports_native_indexes()
    }

    async fn document_exists_with_field_value(
        &self,
        meta: &EntityMeta,
        values: &[(String, Value)],
        exclude_id: Option<&str>,
    ) -> StoreResult<bool> {
        self.driver()
            .document_exists_with_field_value(meta, values, exclude_id)
            .await
    }

    fn storage_traits(&self) -> StorageTraits {
        self.driver().storage_traits()
    }

    async fn health(&self, entities: &[Arc<EntityMeta>]) -> HealthStatus {
        self.driver().health(entities).await
    }
}

#[cfg(test)]
mod tests {
    use crate::config::{EngineConfig, MemoryConfig, SqliteConfig};
    use crate::driver::Driver;
    use crate::engine::{Engine, EngineKind};
    use tracing_test::traced_test;

    #[test]
    fn kinds_parse() {
        for (raw, kind) in [
            ("mongodb", EngineKind::MongoDB),
            ("Elasticsearch", EngineKind::Elasticsearch),
            ("postgresql", EngineKind::Postgres),
            ("postgres", EngineKind::Postgres),
            ("sqlite", EngineKind::Sqlite),
            ("memory", EngineKind::Memory),
        ] {
            assert_eq!(raw.parse::<EngineKind>().unwrap(), kind);
        }
        assert_eq!(EngineKind::Postgres.to_string(), "postgresql");
        assert!("oracle".parse::<EngineKind>().is_err());
    }

    #[tokio::test]
    #[traced_test]
    async fn factory_selects_driver() {
        let memory = Engine::connect(&EngineConfig::Memory(MemoryConfig::default()))
            .await
            .unwrap();
        assert_eq!(memory.kind(), EngineKind::Memory);
        assert_eq!(memory.id_field(), "_id");
        assert!(!memory.supports_native_indexes());

        let sqlite = Engine::connect(&EngineConfig::Sqlite(SqliteConfig::in_memory()))
            .await
            .unwrap();
        assert_eq!(sqlite.to_string(), "sqlite");
        assert_eq!(sqlite.id_field(), "id");
        assert!(sqlite.supports_native_indexes());
        assert!(sqlite.health(&[]).await.is_healthy());
    }
}
