mod bson;
mod json;
pub(crate) mod postgres;
mod sqlite;
