//! storage layer for rowgraph
//!
//! primitive data model shared by every other module: entity names, keys,
//! scalar values and typed rows. Nothing here knows about identity maps or
//! persistence; the model and executor layers build on top of it.
//!
//! # Usage
//!
//! ```ignore
//! use rowgraph::storage::{Row, Value};
//!
//! let mut good = Row::new(definition);
//! good.set("id", rowgraph::storage::next_id())?;
//! good.set("name", "Good 1")?;
//! assert_eq!(good.get("name"), Some(&Value::from("Good 1")));
//! ```

mod error;
mod row;
mod types;
mod value;

// Re-export public API
pub use error::{RowError, RowResult};
pub use row::Row;
pub use types::{next_id, EntityName, InvalidNameError, Key};
pub use value::{Columns, Value};

pub(crate) use row::coerce_field;
