//! rowgraph - an identity-mapped object graph over relational rows
//!
//! Rows of every entity live in one identity map per entity, relationships are
//! navigable in both directions, and every edit is tracked so that a save
//! submits only the net changes, principals before dependents.
//!
//! # Example
//!
//! ```no_run
//! use rowgraph::catalog::{Catalog, DataType, EntityBuilder};
//! use rowgraph::executor::{MemoryBackend, Parameters};
//! use rowgraph::model::Model;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let catalog = Catalog::new();
//! catalog.register(
//!     EntityBuilder::new("goods")
//!         .key("id", DataType::Integer)
//!         .add_field("name", DataType::Text)
//!         .build()?,
//! )?;
//!
//! let backend = MemoryBackend::new(catalog.clone());
//! let mut model = Model::new(catalog, backend)?;
//! model.query("goods", &Parameters::new()).await?;
//!
//! let mut good = model.new_instance("goods")?;
//! good.set("name", "Good 1")?;
//! model.insert(good)?;
//! assert_eq!(model.save().await?, 1);
//! # Ok(())
//! # }
//! ```

pub mod catalog;
pub mod changes;
pub mod executor;
pub mod model;
pub mod storage;

#[cfg(test)]
mod testing;

pub use catalog::{Catalog, EntityDefinition};
pub use changes::{Change, ChangeKind};
pub use executor::{Backend, MemoryBackend};
pub use model::{Model, ModelConfig, ModelError, ModelResult};
pub use storage::{Key, Row, Value};
