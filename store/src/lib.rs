mod config;
mod fk;
mod manager;
mod normalize;
mod uniqueness;

pub use config::StoreConfig;
pub use manager::{DeleteOutcome, DocumentManager, GetOutcome, ListOutcome, SaveOutcome};
