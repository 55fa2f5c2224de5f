//! Persistence executor for rowgraph.
//!
//! The model talks to storage only through the [`Backend`] trait: it reads
//! entity rows with resolved parameters and submits ordered change batches.
//! [`MemoryBackend`] is the in-memory implementation used by tests and the
//! CLI.

mod backend;
mod error;
mod memory;

pub use backend::{matches_parameters, resolve_parameters, Backend, Parameters};
pub use error::{BackendError, BackendResult, ParameterError};
pub use memory::{CommandHandler, MemoryBackend, Table, Tables};
