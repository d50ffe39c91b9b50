use error::{Operation, StoreError, StoreResult};
use std::collections::HashMap;

/// Decides whether an operation on an entity may run.
pub trait PermissionGate: Send + Sync {
    fn permitted(&self, entity: &str, operation: Operation) -> StoreResult<()>;
}

/// Permits everything.
#[derive(Clone, Debug, Default)]
pub struct AllowAll;

impl PermissionGate for AllowAll {
    fn permitted(&self, _entity: &str, _operation: Operation) -> StoreResult<()> {
        Ok(())
    }
}

/// Fixed grants per entity as operation codes, e.g. `"rc"` for read and create.
/// Entities without an entry are fully permitted.
#[derive(Clone, Debug, Default)]
pub struct StaticPermissions {
    grants: HashMap<String, String>,
}

impl StaticPermissions {
    pub fn new() -> Self {
        StaticPermissions::default()
    }

    pub fn grant<S: AsRef<str>>(mut self, entity: S, codes: &str) -> Self {
        self.grants
            .insert(entity.as_ref().to_lowercase(), codes.to_lowercase());
        self
    }
}

impl PermissionGate for StaticPermissions {
    fn permitted(&self, entity: &str, operation: Operation) -> StoreResult<()> {
        match self.grants.get(&entity.to_lowercase()) {
            Some(codes) if !codes.contains(operation.code()) => {
                Err(StoreError::PermissionDenied {
                    entity: entity.to_string(),
                    operation: operation.code(),
                })
            }
            _ => Ok(()),
        }
    }
}
