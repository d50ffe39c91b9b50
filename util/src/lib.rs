pub mod definition;
pub mod id;
mod notify;
pub mod pagination;
pub mod params;
mod permission;
mod validator;

pub use definition::{
    EntityDefinition, EntityMeta, FieldMeta, ID_FIELD, MatchKind, MetadataProvider,
    MetadataRegistry, Reference,
};

pub use id::*;

pub use notify::*;

pub use params::*;

pub use permission::*;

pub use validator::*;
