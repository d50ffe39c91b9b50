#![allow(dead_code)]

use engine::{Engine, EngineConfig, Layout, MemoryConfig, SqliteConfig};
use std::sync::Arc;
use store::DocumentManager;
use util::{CollectingSink, EntityDefinition, FieldMeta, MetadataRegistry};
use value::{Document, FieldType, Value};

pub fn definitions() -> Vec<EntityDefinition> {
    vec![
        EntityDefinition::new("User")
            .field("firstName", FieldMeta::new(FieldType::String).required())
            .field("lastName", FieldMeta::new(FieldType::String))
            .field("email", FieldMeta::new(FieldType::String))
            .field(
                "role",
                FieldMeta::new(FieldType::String).enum_values(&["admin", "member"]),
            )
            .field("age", FieldMeta::new(FieldType::Integer))
            .field("createdAt", FieldMeta::new(FieldType::Datetime).auto_generate())
            .field("updatedAt", FieldMeta::new(FieldType::Datetime).auto_update())
            .unique_group(&["email"]),
        EntityDefinition::new("Event")
            .field("title", FieldMeta::new(FieldType::String).required())
            .field("cost", FieldMeta::new(FieldType::Float))
            .field("day", FieldMeta::new(FieldType::Date))
            .field("userId", FieldMeta::new(FieldType::ObjectId).required())
            .field("hostId", FieldMeta::new(FieldType::ObjectId).references("User"))
            .field("venueId", FieldMeta::new(FieldType::ObjectId))
            .field("createdAt", FieldMeta::new(FieldType::Datetime).auto_generate()),
        EntityDefinition::new("Ticket")
            .field("user", FieldMeta::new(FieldType::String))
            .field("userId", FieldMeta::new(FieldType::ObjectId)),
    ]
}

pub fn sqlite(layout: Layout) -> EngineConfig {
    let mut config = SqliteConfig::in_memory();
    config.layout = layout;
    EngineConfig::Sqlite(config)
}

pub fn memory() -> EngineConfig {
    EngineConfig::Memory(MemoryConfig::default())
}

/// Initialized manager over `config` whose warnings end up in the returned sink.
pub async fn manager(config: EngineConfig) -> (DocumentManager, CollectingSink) {
    let registry = MetadataRegistry::new(definitions()).unwrap();
    let engine = Engine::connect(&config).await.unwrap();
    let sink = CollectingSink::new();
    let manager = DocumentManager::new(Arc::new(engine), Arc::new(registry))
        .with_sink(Arc::new(sink.clone()));
    manager.init().await.unwrap();
    (manager, sink)
}

pub fn doc(pairs: Vec<(&str, Value)>) -> Document {
    Document::from_pairs(pairs)
}

pub fn user(first: &str, email: &str, age: i64) -> Document {
    doc(vec![
        ("firstName", Value::text(first)),
        ("email", Value::text(email)),
        ("age", Value::int(age)),
    ])
}

pub fn id_of(document: &Document) -> String {
    document.get("id").and_then(|id| id.as_str()).unwrap().to_string()
}

pub fn text_of(document: &Document, field: &str) -> String {
    document.get(field).and_then(|v| v.as_str()).unwrap_or_default().to_string()
}
