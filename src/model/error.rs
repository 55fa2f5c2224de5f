//! Model error types.

use thiserror::Error;

use crate::catalog::SchemaError;
use crate::changes::DecodeError;
use crate::executor::{BackendError, ParameterError};
use crate::storage::RowError;

/// Result type for model operations.
pub type ModelResult<T> = Result<T, ModelError>;

/// Errors that can occur while querying, mutating or saving a model.
#[derive(Debug, Error)]
pub enum ModelError {
    /// A relationship accessor or write found no principal row.
    #[error("'{entity}' row {row}: '{relationship}' references missing '{target}' row {key}")]
    UnresolvedReference {
        entity: String,
        row: String,
        relationship: String,
        target: String,
        key: String,
    },

    /// A key write would collide with another row.
    #[error("key {key} is already taken in '{entity}'")]
    StaleKey { entity: String, key: String },

    /// The backend refused the batch; pending changes are kept.
    #[error("save conflict: {0}")]
    SaveConflict(BackendError),

    #[error("backend error: {0}")]
    Backend(BackendError),

    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("row error: {0}")]
    Row(#[from] RowError),

    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("entity not found: {0}")]
    EntityNotFound(String),

    #[error("row {key} not found in '{entity}'")]
    RowNotFound { entity: String, key: String },

    #[error("relationship '{relationship}' not found in '{entity}'")]
    RelationshipNotFound { entity: String, relationship: String },

    #[error("parameter '{parameter}' is not declared by '{entity}'")]
    UnknownParameter { entity: String, parameter: String },

    #[error("parameter '{parameter}' of '{entity}' expects {expected}, got {actual}")]
    InvalidParameter {
        entity: String,
        parameter: String,
        expected: String,
        actual: String,
    },

    /// Data changes on a read-only entity.
    #[error("entity '{0}' is read-only")]
    ReadOnly(String),

    /// An internal invariant does not hold.
    #[error("model corrupted: {0}")]
    Corrupted(String),
}

impl ModelError {
    /// Check if repeating the operation may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ModelError::SaveConflict(_) | ModelError::Backend(_))
    }

    /// Check if the model can no longer be trusted.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ModelError::Corrupted(_))
    }
}

impl From<BackendError> for ModelError {
    fn from(err: BackendError) -> Self {
        if err.is_conflict() {
            ModelError::SaveConflict(err)
        } else {
            ModelError::Backend(err)
        }
    }
}

impl From<ParameterError> for ModelError {
    fn from(err: ParameterError) -> Self {
        match err {
            ParameterError::Unknown { entity, parameter } => ModelError::UnknownParameter { entity, parameter },
            ParameterError::TypeMismatch {
                entity,
                parameter,
                expected,
                actual,
            } => ModelError::InvalidParameter {
                entity,
                parameter,
                expected,
                actual,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_errors_are_classified() {
        let conflict: ModelError = BackendError::DuplicateKey {
            entity: "goods".to_string(),
            key: "1".to_string(),
        }
        .into();
        assert!(matches!(conflict, ModelError::SaveConflict(_)));
        assert!(conflict.is_retryable());

        let offline: ModelError = BackendError::Unavailable("timeout".to_string()).into();
        assert!(matches!(offline, ModelError::Backend(_)));
        assert!(offline.is_retryable());
        assert!(!offline.is_fatal());
    }

    #[test]
    fn test_local_errors_are_not_retryable() {
        let err = ModelError::StaleKey {
            entity: "goods".to_string(),
            key: "1".to_string(),
        };
        assert!(!err.is_retryable());
        assert!(ModelError::Corrupted("index out of sync".to_string()).is_fatal());
    }
}
