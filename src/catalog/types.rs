//! Field types and field definitions for entity schemas.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::storage::Value;

/// Scalar field types supported by rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    /// Text/string data.
    Text,
    /// 64-bit integers.
    Integer,
    /// Double precision floating point.
    Float,
    /// Boolean values.
    Boolean,
    /// UTC timestamps with millisecond precision.
    Timestamp,
}

impl DataType {
    /// Check if a value already has this type. Null matches every type.
    pub fn matches(&self, value: &Value) -> bool {
        matches!(
            (self, value),
            (_, Value::Null)
                | (DataType::Text, Value::Text(_))
                | (DataType::Integer, Value::Integer(_))
                | (DataType::Float, Value::Float(_))
                | (DataType::Boolean, Value::Boolean(_))
                | (DataType::Timestamp, Value::Timestamp(_))
        )
    }

    /// Convert a value to this type where a lossless conversion exists.
    ///
    /// Integers widen to floats, and timestamps are revived from RFC 3339
    /// strings or epoch milliseconds. Returns `None` when the value cannot
    /// represent this type.
    pub fn coerce(&self, value: Value) -> Option<Value> {
        if self.matches(&value) {
            return Some(value);
        }
        match (self, value) {
            (DataType::Float, Value::Integer(i)) => Some(Value::Float(i as f64)),
            (DataType::Timestamp, Value::Text(s)) => Value::parse_timestamp(&s),
            (DataType::Timestamp, Value::Integer(millis)) => Value::from_epoch_millis(millis),
            _ => None,
        }
    }

    /// Whether fields of this type can serve as keys.
    pub fn is_key_type(&self) -> bool {
        matches!(self, DataType::Integer | DataType::Text)
    }

    /// Lowercase name used in schemas and messages.
    pub fn name(&self) -> &'static str {
        match self {
            DataType::Text => "text",
            DataType::Integer => "integer",
            DataType::Float => "float",
            DataType::Boolean => "boolean",
            DataType::Timestamp => "timestamp",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Full field definition including name, type and nullability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDef {
    /// Field name.
    pub name: String,
    /// Data type.
    #[serde(rename = "type")]
    pub data_type: DataType,
    /// Whether the field must hold a value.
    #[serde(default)]
    pub required: bool,
    /// Value assigned to fresh instances.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    /// Optional field description/comment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl FieldDef {
    /// Create a new nullable field definition.
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            required: false,
            default: None,
            description: None,
        }
    }

    /// Mark the field as required.
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Set the default value for fresh instances.
    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Set the description.
    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    /// Check if this field accepts null.
    pub fn is_nullable(&self) -> bool {
        !self.required
    }

    /// The value a fresh instance starts with.
    pub fn initial_value(&self) -> Value {
        self.default
            .clone()
            .and_then(|v| self.data_type.coerce(v))
            .unwrap_or(Value::Null)
    }
}

impl fmt::Display for FieldDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.name, self.data_type)?;
        if self.required {
            write!(f, " required")?;
        }
        if let Some(default) = &self.default {
            write!(f, " default {}", default)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_type_matches() {
        assert!(DataType::Text.matches(&Value::from("hello")));
        assert!(!DataType::Text.matches(&Value::Integer(1)));
        assert!(DataType::Integer.matches(&Value::Integer(42)));
        assert!(!DataType::Integer.matches(&Value::Float(3.14)));
        assert!(DataType::Boolean.matches(&Value::Null));
    }

    #[test]
    fn test_coerce() {
        assert_eq!(DataType::Float.coerce(Value::Integer(2)), Some(Value::Float(2.0)));
        assert_eq!(DataType::Integer.coerce(Value::Float(2.0)), None);

        let at = DataType::Timestamp
            .coerce(Value::from("2012-08-27T11:42:15.514Z"))
            .unwrap();
        assert_eq!(at.as_timestamp().unwrap().timestamp_millis(), 1_346_067_735_514);
        assert_eq!(
            DataType::Timestamp.coerce(Value::Integer(1_346_067_735_514)),
            Some(at)
        );
        assert_eq!(DataType::Timestamp.coerce(Value::from("yesterday")), None);
    }

    #[test]
    fn test_initial_value() {
        let plain = FieldDef::new("comment", DataType::Text);
        assert_eq!(plain.initial_value(), Value::Null);

        let paid = FieldDef::new("paid", DataType::Boolean).with_default(false);
        assert_eq!(paid.initial_value(), Value::Boolean(false));

        let summ = FieldDef::new("summ", DataType::Float).with_default(0i64);
        assert_eq!(summ.initial_value(), Value::Float(0.0));
    }

    #[test]
    fn test_field_def_serialization() {
        let field: FieldDef =
            serde_json::from_str(r#"{"name": "id", "type": "integer", "required": true}"#).unwrap();
        assert_eq!(field.data_type, DataType::Integer);
        assert!(!field.is_nullable());
        assert_eq!(field.to_string(), "id integer required");
    }
}
