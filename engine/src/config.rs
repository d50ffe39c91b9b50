use crate::engine::EngineKind;
use serde::{Deserialize, Serialize};
use std::time::Duration;

fn default_timeout() -> u64 {
    30
}

fn default_pool_size() -> usize {
    4
}

fn default_refresh() -> String {
    "wait_for".to_string()
}

/// Options shared by every backend.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CommonOptions {
    /// disables case-insensitive sorting on string fields
    #[serde(default)]
    pub case_sensitive: bool,
    #[serde(default = "default_timeout")]
    pub command_timeout_secs: u64,
}

impl Default for CommonOptions {
    fn default() -> Self {
        CommonOptions {
            case_sensitive: false,
            command_timeout_secs: default_timeout(),
        }
    }
}

impl CommonOptions {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs.max(1))
    }
}

/// How relational backends lay out a document.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Layout {
    /// `id` primary key plus one JSON `data` column
    #[default]
    Json,
    /// one typed column per field with native unique constraints
    Columns,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MongoConfig {
    pub uri: String,
    pub database: String,
    #[serde(flatten)]
    pub common: CommonOptions,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ElasticConfig {
    pub url: String,
    #[serde(default)]
    pub index_prefix: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// refresh policy of writes: `true`, `false` or `wait_for`
    #[serde(default = "default_refresh")]
    pub refresh: String,
    #[serde(flatten)]
    pub common: CommonOptions,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PostgresConfig {
    pub host: String,
    #[serde(default = "PostgresConfig::default_port")]
    pub port: u16,
    pub database: String,
    pub user: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
    #[serde(default)]
    pub connection_lifetime_secs: Option<u64>,
    #[serde(default)]
    pub layout: Layout,
    #[serde(flatten)]
    pub common: CommonOptions,
}

impl PostgresConfig {
    fn default_port() -> u16 {
        5432
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SqliteConfig {
    /// file path or `:memory:`
    pub path: String,
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
    #[serde(default)]
    pub layout: Layout,
    #[serde(flatten)]
    pub common: CommonOptions,
}

impl SqliteConfig {
    pub fn in_memory() -> Self {
        SqliteConfig {
            path: ":memory:".to_string(),
            pool_size: 1,
            layout: Layout::Json,
            common: CommonOptions::default(),
        }
    }

    pub fn is_in_memory(&self) -> bool {
        self.path == ":memory:"
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryConfig {
    #[serde(flatten)]
    pub common: CommonOptions,
}

/// Backend selection, tagged by `kind`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum EngineConfig {
    #[serde(rename = "mongodb", alias = "mongo")]
    Mongo(MongoConfig),
    #[serde(rename = "elasticsearch", alias = "elastic")]
    Elastic(ElasticConfig),
    #[serde(rename = "postgresql", alias = "postgres")]
    Postgres(PostgresConfig),
    #[serde(rename = "sqlite")]
    Sqlite(SqliteConfig),
    #[serde(rename = "memory")]
    Memory(MemoryConfig),
}

impl EngineConfig {
    pub fn kind(&self) -> EngineKind {
        match self {
            EngineConfig::Mongo(_) => EngineKind::MongoDB,
            EngineConfig::Elastic(_) => EngineKind::Elasticsearch,
            EngineConfig::Postgres(_) => EngineKind::Postgres,
            EngineConfig::Sqlite(_) => EngineKind::Sqlite,
            EngineConfig::Memory(_) => EngineKind::Memory,
        }
    }

    pub fn common(&self) -> &CommonOptions {
        match self {
            EngineConfig::Mongo(c) => &c.common,
            EngineConfig::Elastic(c) => &c.common,
            EngineConfig::Postgres(c) => &c.common,
            EngineConfig::Sqlite(c) => &c.common,
            EngineConfig::Memory(c) => &c.common,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize)]
    struct Wrapper {
        engine: EngineConfig,
    }

    #[test]
    fn postgres_defaults() {
        let wrapper: Wrapper = toml::from_str(
            r#"
            [engine]
            kind = "postgresql"
            host = "localhost"
            database = "docs"
            user = "postgres"
            layout = "columns"
            "#,
        )
        .unwrap();
        match wrapper.engine {
            EngineConfig::Postgres(pg) => {
                assert_eq!(pg.port, 5432);
                assert_eq!(pg.pool_size, 4);
                assert_eq!(pg.layout, Layout::Columns);
                assert!(!pg.common.case_sensitive);
                assert_eq!(pg.common.command_timeout_secs, 30);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn aliases_and_common() {
        let wrapper: Wrapper = toml::from_str(
            r#"
            [engine]
            kind = "elastic"
            url = "http://localhost:9200"
            case_sensitive = true
            "#,
        )
        .unwrap();
        assert_eq!(wrapper.engine.kind(), EngineKind::Elasticsearch);
        assert!(wrapper.engine.common().case_sensitive);
        match wrapper.engine {
            EngineConfig::Elastic(es) => assert_eq!(es.refresh, "wait_for"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn sqlite_memory() {
        let wrapper: Wrapper = toml::from_str(
            r#"
            [engine]
            kind = "sqlite"
            path = ":memory:"
            "#,
        )
        .unwrap();
        match wrapper.engine {
            EngineConfig::Sqlite(sqlite) => assert!(sqlite.is_in_memory()),
            other => panic!("unexpected {:?}", other),
        }
    }
}
