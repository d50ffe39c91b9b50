pub use coerce::{StorageTraits, coerce, coerce_str, from_storage, matches_type, to_storage};
pub use document::Document;
pub use r#type::FieldType;
pub use value::Value;

pub mod coerce;
mod conversion;
pub use conversion::postgres::PgType;
mod document;
pub mod time;
mod r#type;
pub(crate) mod value;
