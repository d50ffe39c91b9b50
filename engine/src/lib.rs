pub mod config;
mod connection;
pub mod driver;
pub mod elastic;
pub mod engine;
pub mod memory;
pub mod mongo;
pub mod postgres;
pub mod sql;
pub mod sqlite;
pub mod unique;

pub use config::{
    CommonOptions, ElasticConfig, EngineConfig, Layout, MemoryConfig, MongoConfig, PostgresConfig,
    SqliteConfig,
};
pub use driver::{Driver, HealthStatus, IndexInfo, ListQuery, QueryTranslator};
pub use engine::{Engine, EngineKind};
