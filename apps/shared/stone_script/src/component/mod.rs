//! Components: schemas, the built-in table and the indexed store

pub mod builtin;
mod schema;
mod store;

pub use schema::{ComponentSchema, FieldDescriptor, FieldKind, Fields, number};
pub use store::{ComponentHandle, ComponentStore};
