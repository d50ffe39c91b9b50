use engine::EngineConfig;
use error::{StoreError, StoreResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use util::{EntityDefinition, MetadataRegistry};

/// Backend selection plus the entity schema, as read from a TOML file.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StoreConfig {
    pub engine: EngineConfig,
    #[serde(default)]
    pub entities: Vec<EntityDefinition>,
}

impl StoreConfig {
    pub fn from_toml_str(raw: &str) -> StoreResult<Self> {
        toml::from_str(raw).map_err(|err| StoreError::config(format!("invalid configuration: {}", err)))
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|err| {
            StoreError::config(format!("could not read {}: {}", path.display(), err))
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn registry(&self) -> StoreResult<MetadataRegistry> {
        MetadataRegistry::new(self.entities.clone())
    }
}
