//! Persistence executor errors.

use thiserror::Error;

use crate::storage::RowError;

/// Result type for backend operations.
pub type BackendResult<T> = Result<T, BackendError>;

/// Errors reported by a backend while reading or applying a batch.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BackendError {
    #[error("duplicate key {key} in '{entity}'")]
    DuplicateKey { entity: String, key: String },

    /// A foreign key points at a principal row that does not exist.
    #[error("'{entity}' row {key}: '{field}' references missing '{target}' row {value}")]
    ForeignKeyViolation {
        entity: String,
        key: String,
        field: String,
        target: String,
        value: String,
    },

    /// A principal row is deleted while dependents still reference it.
    #[error("'{entity}' row {key} is still referenced by '{dependent}'")]
    StillReferenced {
        entity: String,
        key: String,
        dependent: String,
    },

    #[error("field '{field}' is not found in entity '{entity}'")]
    UnknownField { entity: String, field: String },

    #[error("entity not found: {0}")]
    EntityNotFound(String),

    #[error("change on '{0}' does not carry its key")]
    MissingKey(String),

    /// A value does not fit its field.
    #[error("invalid data for '{entity}': {reason}")]
    InvalidData { entity: String, reason: String },

    /// A command handler failed or no handler is registered.
    #[error("command '{entity}' failed: {reason}")]
    Command { entity: String, reason: String },

    /// The executor could not be reached.
    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

impl BackendError {
    /// Check if the batch was refused because of the data it carried.
    ///
    /// Conflicts leave the caller's pending changes intact so they can be
    /// corrected and saved again.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            BackendError::DuplicateKey { .. }
                | BackendError::ForeignKeyViolation { .. }
                | BackendError::StillReferenced { .. }
                | BackendError::InvalidData { .. }
        )
    }
}

/// Errors raised while resolving query or command parameters.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParameterError {
    #[error("parameter '{parameter}' is not declared by '{entity}'")]
    Unknown { entity: String, parameter: String },

    #[error("parameter '{parameter}' of '{entity}' expects {expected}, got {actual}")]
    TypeMismatch {
        entity: String,
        parameter: String,
        expected: String,
        actual: String,
    },
}

impl From<RowError> for BackendError {
    fn from(err: RowError) -> Self {
        match err {
            RowError::UnknownField { entity, field } => BackendError::UnknownField {
                entity: entity.into_string(),
                field,
            },
            RowError::MissingKey(entity) => BackendError::MissingKey(entity.into_string()),
            RowError::TypeMismatch { ref entity, .. } | RowError::NullValue { ref entity, .. } => {
                BackendError::InvalidData {
                    entity: entity.to_string(),
                    reason: err.to_string(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_classification() {
        let dup = BackendError::DuplicateKey {
            entity: "goods".to_string(),
            key: "1".to_string(),
        };
        assert!(dup.is_conflict());
        assert!(!BackendError::Unavailable("connection reset".to_string()).is_conflict());
        assert!(!BackendError::EntityNotFound("goods".to_string()).is_conflict());
    }
}
