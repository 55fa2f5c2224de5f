//! Catalog module for entity definitions.
//!
//! The catalog is the entity name to definition mapping: fields, the key
//! field, relationships to principal entities, and query parameters.
//! Definitions are built in code with [`EntityBuilder`] or loaded from JSON.

mod manager;
mod schema;
mod types;

pub use manager::Catalog;
pub use schema::{EntityBuilder, EntityDefinition, ParameterDef, Relationship, SchemaError};
pub use types::{DataType, FieldDef};
