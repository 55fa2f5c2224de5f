//! The model runtime.
//!
//! A [`Model`] holds one identity map per entity, keeps reverse indices of
//! every relationship so dependents can be reached from their principals,
//! and turns the difference between loaded and current values into an
//! ordered batch of [`Change`](crate::changes::Change)s on save.

mod config;
mod entity;
mod error;
mod groups;
mod model;
mod ordering;

pub use config::ModelConfig;
pub use entity::EntitySet;
pub use error::{ModelError, ModelResult};
pub use groups::GroupIndex;
pub use model::{validate_change, Model};
pub use ordering::{dependency_order, EntityChanges, Pending};
