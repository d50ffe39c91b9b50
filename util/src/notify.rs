use error::{StoreError, Warning, WarningKind};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{error, warn};

/// Receives advisory warnings and fatal errors surfaced by the manager.
pub trait NotificationSink: Send + Sync {
    fn warning(&self, warning: &Warning);

    /// Reports a fatal error and hands it back for propagation.
    fn error(&self, err: StoreError) -> StoreError {
        error!("{} ({})", err, err.status());
        err
    }
}

/// Logs warnings through `tracing`.
#[derive(Clone, Debug, Default)]
pub struct TracingSink;

impl NotificationSink for TracingSink {
    fn warning(&self, warning: &Warning) {
        match warning.kind {
            WarningKind::Validation => warn!(target: "doctracks::validation", "{}", warning),
            WarningKind::DataIntegrity => warn!(target: "doctracks::integrity", "{}", warning),
        }
    }
}

/// Keeps every warning, shares its buffer between clones.
#[derive(Clone, Debug, Default)]
pub struct CollectingSink {
    warnings: Arc<Mutex<Vec<Warning>>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        CollectingSink::default()
    }

    pub fn warnings(&self) -> Vec<Warning> {
        self.warnings.lock().clone()
    }

    pub fn clear(&self) {
        self.warnings.lock().clear()
    }
}

impl NotificationSink for CollectingSink {
    fn warning(&self, warning: &Warning) {
        self.warnings.lock().push(warning.clone());
    }
}
