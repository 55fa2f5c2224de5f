//! Row layer error types
//!
//! We use `thiserror` for ergonomic error definition and better error messages

use thiserror::Error;

use crate::storage::types::EntityName;

/// errors raised while building or mutating a row
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RowError {
    /// the field is not declared by the entity
    #[error("field '{field}' is not found in entity '{entity}'")]
    UnknownField { entity: EntityName, field: String },

    /// the value does not fit the declared field type
    #[error("field '{field}' of entity '{entity}' expects {expected}, got {actual}")]
    TypeMismatch {
        entity: EntityName,
        field: String,
        expected: String,
        actual: String,
    },

    /// a required field holds null
    #[error("field '{field}' of entity '{entity}' cannot be null")]
    NullValue { entity: EntityName, field: String },

    /// the key field is unset
    #[error("row of entity '{0}' has no key")]
    MissingKey(EntityName),
}

impl RowError {
    /// the field this error is about, if any
    pub fn field(&self) -> Option<&str> {
        match self {
            RowError::UnknownField { field, .. }
            | RowError::TypeMismatch { field, .. }
            | RowError::NullValue { field, .. } => Some(field),
            RowError::MissingKey(_) => None,
        }
    }
}

/// result type alias for row operations
pub type RowResult<T> = Result<T, RowError>;
