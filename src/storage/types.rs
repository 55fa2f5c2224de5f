//! core identifier types for the object graph.

use std::borrow::Borrow;
use std::fmt;
use std::fmt::Formatter;
use std::sync::atomic::{AtomicI64, Ordering};

use serde::{Deserialize, Serialize};

use crate::storage::value::Value;

/// A validated entity name.
///
/// Entity names address query definitions, so they may be plain identifiers
/// (`goods`) or slash separated paths (`entities/orders/orders`).
///
/// Valid names:
/// - 1-128 characters
/// - Alphanumeric, underscores, hyphens, dots and slashes only
/// - Must start with a letter or underscore
/// - No empty path segments and no `..` segments
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EntityName(String);

impl EntityName {
    /// create a new EntityName, validating the input
    pub fn new(name: impl Into<String>) -> Result<Self, InvalidNameError> {
        let name = name.into();
        Self::validate(&name)?;
        Ok(Self(name))
    }

    /// Validate an entity name.
    fn validate(name: &str) -> Result<(), InvalidNameError> {
        let Some(first_char) = name.chars().next() else {
            return Err(InvalidNameError::Empty);
        };

        if name.len() > 128 {
            return Err(InvalidNameError::TooLong(name.len()));
        }

        if !first_char.is_ascii_alphabetic() && first_char != '_' {
            return Err(InvalidNameError::InvalidStart(first_char));
        }

        for (i, c) in name.chars().enumerate() {
            if !c.is_ascii_alphanumeric() && !matches!(c, '_' | '-' | '.' | '/') {
                return Err(InvalidNameError::InvalidCharacter { char: c, position: i });
            }
        }

        if name.split('/').any(|segment| segment.is_empty() || segment == "..") {
            return Err(InvalidNameError::InvalidPath(name.to_string()));
        }

        Ok(())
    }

    /// get the string representation
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// last path segment, used for short display
    pub fn short_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    /// convert to owned String
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for EntityName {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for EntityName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for EntityName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for EntityName {
    type Error = InvalidNameError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for EntityName {
    type Error = InvalidNameError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<EntityName> for String {
    fn from(name: EntityName) -> Self {
        name.0
    }
}

/// An identity-map key.
///
/// Keys are usually numeric surrogates, text keys are supported for
/// natural-key tables.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Key {
    Integer(i64),
    Text(String),
}

impl Key {
    /// Extract a key from a scalar value. Only integers and text can be keys.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Integer(i) => Some(Key::Integer(*i)),
            Value::Text(s) => Some(Key::Text(s.clone())),
            _ => None,
        }
    }

    /// Convert back to a scalar value.
    pub fn to_value(&self) -> Value {
        match self {
            Key::Integer(i) => Value::Integer(*i),
            Key::Text(s) => Value::Text(s.clone()),
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Key::Integer(i) => Some(*i),
            Key::Text(_) => None,
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Key::Integer(i) => write!(f, "{}", i),
            Key::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<i64> for Key {
    fn from(value: i64) -> Self {
        Key::Integer(value)
    }
}

impl From<&str> for Key {
    fn from(value: &str) -> Self {
        Key::Text(value.to_string())
    }
}

impl From<String> for Key {
    fn from(value: String) -> Self {
        Key::Text(value)
    }
}

impl From<Key> for Value {
    fn from(key: Key) -> Self {
        key.to_value()
    }
}

/// Counter slots per millisecond in generated ids.
const COUNTER_DIGITS: i64 = 100;

static LAST_ID: AtomicI64 = AtomicI64::new(0);

/// Generate a time based surrogate key.
///
/// Ids are `millis * 100 + counter` and strictly increase within the process.
/// When a millisecond's counter is exhausted the generator moves on to the next
/// millisecond slot instead of spinning.
pub fn next_id() -> i64 {
    let now = chrono::Utc::now().timestamp_millis() * COUNTER_DIGITS;
    let mut last = LAST_ID.load(Ordering::Relaxed);
    loop {
        let candidate = if now > last { now } else { last + 1 };
        match LAST_ID.compare_exchange_weak(last, candidate, Ordering::AcqRel, Ordering::Relaxed) {
            Ok(_) => return candidate,
            Err(actual) => last = actual,
        }
    }
}

/// error type for invalid entity names
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidNameError {
    Empty,
    TooLong(usize),
    InvalidStart(char),
    InvalidCharacter { char: char, position: usize },
    InvalidPath(String),
}

impl fmt::Display for InvalidNameError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "name cannot be empty"),
            Self::TooLong(len) => write!(f, "name too long: {} characters", len),
            Self::InvalidStart(c) => write!(f, "name cannot start with '{}'", c),
            Self::InvalidCharacter { char, position } => {
                write!(f, "invalid character '{}' at position {}", char, position)
            }
            Self::InvalidPath(path) => write!(f, "invalid path: '{}'", path),
        }
    }
}

impl std::error::Error for InvalidNameError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_name_valid() {
        assert!(EntityName::new("goods").is_ok());
        assert!(EntityName::new("order_lines").is_ok());
        assert!(EntityName::new("_private").is_ok());
        assert!(EntityName::new("entities/orders/orders").is_ok());
        assert!(EntityName::new("v1.goods").is_ok());
    }

    #[test]
    fn test_entity_name_invalid() {
        assert!(EntityName::new("").is_err());
        assert!(EntityName::new("1goods").is_err());
        assert!(EntityName::new("goods/").is_err());
        assert!(EntityName::new("a//b").is_err());
        assert!(EntityName::new("a/../b").is_err());
        assert!(EntityName::new("goods list").is_err());
        assert!(EntityName::new("a".repeat(129)).is_err());
    }

    #[test]
    fn test_entity_name_short_name() {
        let name = EntityName::new("entities/orders/orders").unwrap();
        assert_eq!(name.short_name(), "orders");
        assert_eq!(EntityName::new("goods").unwrap().short_name(), "goods");
    }

    #[test]
    fn test_entity_name_serde_validates() {
        let name: EntityName = serde_json::from_str("\"goods\"").unwrap();
        assert_eq!(name.as_str(), "goods");
        assert!(serde_json::from_str::<EntityName>("\"9lives\"").is_err());
    }

    #[test]
    fn test_key_from_value() {
        assert_eq!(Key::from_value(&Value::Integer(7)), Some(Key::Integer(7)));
        assert_eq!(Key::from_value(&Value::Text("a".into())), Some(Key::Text("a".into())));
        assert_eq!(Key::from_value(&Value::Null), None);
        assert_eq!(Key::from_value(&Value::Float(1.0)), None);
    }

    #[test]
    fn test_next_id_strictly_increases() {
        let mut last = next_id();
        for _ in 0..1_000 {
            let id = next_id();
            assert!(id > last);
            last = id;
        }
    }
}
