pub mod error;
mod warning;

pub use error::{BoxError, Operation, StoreError, StoreResult};
pub use warning::{Warning, WarningKind};
