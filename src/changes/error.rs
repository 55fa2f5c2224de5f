//! Change decoding error types.

use thiserror::Error;

/// Result type for change decoding.
pub type DecodeResult<T> = Result<T, DecodeError>;

/// Errors raised while decoding a change batch.
///
/// Decoding stops at the first bad record, so every variant that concerns a
/// record carries its position in the batch.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The input is not valid JSON.
    #[error("malformed changes: {0}")]
    Json(#[from] serde_json::Error),

    /// The top-level value is not an array of records.
    #[error("changes must be a JSON array")]
    NotAnArray,

    /// A record is not an object, or one of its sections has the wrong shape.
    #[error("change #{index} is invalid: {reason}")]
    InvalidRecord { index: usize, reason: String },

    #[error("change #{index} has no kind")]
    MissingDiscriminator { index: usize },

    #[error("change #{index} has unknown kind '{kind}'")]
    UnknownKind { index: usize, kind: String },

    #[error("change #{index} has no entity")]
    MissingEntity { index: usize },

    /// An update or delete without the key values of its target row.
    #[error("change #{index} on '{entity}' has no keys")]
    MissingKeys { index: usize, entity: String },

    #[error("change #{index} on '{entity}': field '{field}' has invalid timestamp {raw}")]
    InvalidTimestamp {
        index: usize,
        entity: String,
        field: String,
        raw: String,
    },

    #[error("change #{index} on '{entity}': field '{field}' expects {expected}, got {raw}")]
    TypeMismatch {
        index: usize,
        entity: String,
        field: String,
        expected: String,
        raw: String,
    },

    /// Arrays and objects are not scalar field values.
    #[error("change #{index} on '{entity}': field '{field}' has unsupported value {raw}")]
    UnsupportedValue {
        index: usize,
        entity: String,
        field: String,
        raw: String,
    },

    #[error("change #{index} refers to unknown entity '{entity}'")]
    UnknownEntity { index: usize, entity: String },

    #[error("change #{index} on '{entity}' refers to unknown field '{field}'")]
    UnknownField {
        index: usize,
        entity: String,
        field: String,
    },
}

impl DecodeError {
    /// Position of the offending record, if the error concerns one.
    pub fn index(&self) -> Option<usize> {
        match self {
            DecodeError::Json(_) | DecodeError::NotAnArray => None,
            DecodeError::InvalidRecord { index, .. }
            | DecodeError::MissingDiscriminator { index }
            | DecodeError::UnknownKind { index, .. }
            | DecodeError::MissingEntity { index }
            | DecodeError::MissingKeys { index, .. }
            | DecodeError::InvalidTimestamp { index, .. }
            | DecodeError::TypeMismatch { index, .. }
            | DecodeError::UnsupportedValue { index, .. }
            | DecodeError::UnknownEntity { index, .. }
            | DecodeError::UnknownField { index, .. } => Some(*index),
        }
    }
}
