//! Entity definitions and validation.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::types::{DataType, FieldDef};
use crate::storage::{EntityName, InvalidNameError, Value};

/// A foreign-key relationship from a dependent entity to a principal entity.
///
/// Declared on the dependent. The relationship is required when its field is
/// required, nullable otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    /// Accessor name on the dependent (e.g. `good`).
    pub name: String,
    /// Foreign-key field on the dependent (e.g. `good_id`).
    pub field: String,
    /// Principal entity whose key the field references.
    pub target: EntityName,
    /// Name of the "children of" collection on the principal (e.g. `orders`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inverse: Option<String>,
}

/// A query placeholder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDef {
    /// Placeholder name.
    pub name: String,
    /// Declared type; supplied values are coerced to it.
    #[serde(rename = "type")]
    pub data_type: DataType,
    /// Value used when the caller leaves the parameter out.
    #[serde(default)]
    pub default: Value,
    /// Field the parameter filters on by equality.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl ParameterDef {
    /// Create a parameter with a null default.
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            default: Value::Null,
            field: None,
        }
    }

    /// Set the default value.
    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = value.into();
        self
    }

    /// Bind the parameter to an equality filter on a field.
    pub fn filtering(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }
}

/// Entity definition: the mapping the source indexer supplies per entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityDefinition {
    /// Entity name.
    pub name: EntityName,
    /// Key field name.
    pub key: String,
    /// Field definitions.
    pub fields: Vec<FieldDef>,
    /// Relationships to principal entities.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub relationships: Vec<Relationship>,
    /// Query placeholders.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<ParameterDef>,
    /// Rejects inserts, updates and deletes when set.
    #[serde(default)]
    pub read_only: bool,
    /// Entity description/comment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl EntityDefinition {
    /// Get a field definition by name.
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// The key field definition.
    pub fn key_field(&self) -> Option<&FieldDef> {
        self.field(&self.key)
    }

    /// Field names in declaration order.
    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    /// Get a relationship by accessor name.
    pub fn relationship(&self, name: &str) -> Option<&Relationship> {
        self.relationships.iter().find(|r| r.name == name)
    }

    /// Relationships whose foreign key is the given field.
    pub fn relationships_on<'a>(&'a self, field: &'a str) -> impl Iterator<Item = &'a Relationship> + 'a {
        self.relationships.iter().filter(move |r| r.field == field)
    }

    /// Whether a relationship's accessor must resolve.
    pub fn is_required(&self, relationship: &Relationship) -> bool {
        self.field(&relationship.field).is_some_and(|f| f.required)
    }

    /// Get a parameter by name.
    pub fn parameter(&self, name: &str) -> Option<&ParameterDef> {
        self.parameters.iter().find(|p| p.name == name)
    }

    /// Validate the definition on its own (fields, key, local references).
    ///
    /// Cross-entity checks (relationship targets) belong to the catalog.
    pub fn validate(&self) -> Result<(), SchemaError> {
        let mut seen = HashSet::new();
        for field in &self.fields {
            if !seen.insert(field.name.as_str()) {
                return Err(SchemaError::DuplicateField {
                    entity: self.name.to_string(),
                    field: field.name.clone(),
                });
            }
            if let Some(default) = &field.default {
                if field.data_type.coerce(default.clone()).is_none() {
                    return Err(SchemaError::InvalidDefault {
                        entity: self.name.to_string(),
                        field: field.name.clone(),
                    });
                }
            }
        }

        let key = self.key_field().ok_or_else(|| SchemaError::InvalidKey {
            entity: self.name.to_string(),
            reason: format!("key field '{}' is not declared", self.key),
        })?;
        if !key.data_type.is_key_type() {
            return Err(SchemaError::InvalidKey {
                entity: self.name.to_string(),
                reason: format!("key field '{}' has type {}", key.name, key.data_type),
            });
        }
        if !key.required {
            return Err(SchemaError::InvalidKey {
                entity: self.name.to_string(),
                reason: format!("key field '{}' must be required", key.name),
            });
        }

        let mut names = HashSet::new();
        for rel in &self.relationships {
            if !names.insert(rel.name.as_str()) {
                return Err(SchemaError::DuplicateRelationship {
                    entity: self.name.to_string(),
                    relationship: rel.name.clone(),
                });
            }
            let field = self.field(&rel.field).ok_or_else(|| SchemaError::FieldNotFound {
                entity: self.name.to_string(),
                field: rel.field.clone(),
            })?;
            if !field.data_type.is_key_type() {
                return Err(SchemaError::InvalidRelationship {
                    entity: self.name.to_string(),
                    relationship: rel.name.clone(),
                    reason: format!("field '{}' has type {}", field.name, field.data_type),
                });
            }
            if rel.field == self.key {
                return Err(SchemaError::InvalidRelationship {
                    entity: self.name.to_string(),
                    relationship: rel.name.clone(),
                    reason: "the key field cannot be a foreign key".to_string(),
                });
            }
        }

        let mut params = HashSet::new();
        for param in &self.parameters {
            if !params.insert(param.name.as_str()) {
                return Err(SchemaError::DuplicateParameter {
                    entity: self.name.to_string(),
                    parameter: param.name.clone(),
                });
            }
            if param.data_type.coerce(param.default.clone()).is_none() {
                return Err(SchemaError::InvalidDefault {
                    entity: self.name.to_string(),
                    field: param.name.clone(),
                });
            }
            if let Some(field) = &param.field {
                if self.field(field).is_none() {
                    return Err(SchemaError::FieldNotFound {
                        entity: self.name.to_string(),
                        field: field.clone(),
                    });
                }
            }
        }

        Ok(())
    }
}

/// Schema-related errors.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SchemaError {
    #[error("invalid entity name: {0}")]
    InvalidName(#[from] InvalidNameError),

    #[error("duplicate field '{field}' in entity '{entity}'")]
    DuplicateField { entity: String, field: String },

    #[error("field '{field}' is not found in entity '{entity}'")]
    FieldNotFound { entity: String, field: String },

    #[error("invalid key in entity '{entity}': {reason}")]
    InvalidKey { entity: String, reason: String },

    #[error("invalid default for '{field}' in entity '{entity}'")]
    InvalidDefault { entity: String, field: String },

    #[error("duplicate relationship '{relationship}' in entity '{entity}'")]
    DuplicateRelationship { entity: String, relationship: String },

    #[error("invalid relationship '{relationship}' in entity '{entity}': {reason}")]
    InvalidRelationship {
        entity: String,
        relationship: String,
        reason: String,
    },

    #[error("duplicate inverse '{inverse}' on entity '{entity}'")]
    DuplicateInverse { entity: String, inverse: String },

    #[error("duplicate parameter '{parameter}' in entity '{entity}'")]
    DuplicateParameter { entity: String, parameter: String },

    #[error("entity already exists: {0}")]
    EntityExists(String),

    #[error("entity not found: {0}")]
    EntityNotFound(String),

    #[error("catalog load error: {0}")]
    Load(String),
}

/// Relationship as declared on the builder, target not yet validated.
struct PendingReference {
    name: String,
    field: String,
    target: String,
    inverse: Option<String>,
}

/// Builder for creating entity definitions.
pub struct EntityBuilder {
    name: String,
    key: Option<String>,
    fields: Vec<FieldDef>,
    references: Vec<PendingReference>,
    parameters: Vec<ParameterDef>,
    read_only: bool,
    description: Option<String>,
}

impl EntityBuilder {
    /// Start building a new entity.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key: None,
            fields: Vec::new(),
            references: Vec::new(),
            parameters: Vec::new(),
            read_only: false,
            description: None,
        }
    }

    /// Add a field.
    pub fn field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    /// Add a required key field and make it the entity key.
    pub fn key(mut self, name: impl Into<String>, data_type: DataType) -> Self {
        let name = name.into();
        self.fields.push(FieldDef::new(name.clone(), data_type).required());
        self.key = Some(name);
        self
    }

    /// Add a nullable field.
    pub fn add_field(mut self, name: impl Into<String>, data_type: DataType) -> Self {
        self.fields.push(FieldDef::new(name, data_type));
        self
    }

    /// Add a required field.
    pub fn add_required_field(mut self, name: impl Into<String>, data_type: DataType) -> Self {
        self.fields.push(FieldDef::new(name, data_type).required());
        self
    }

    /// Declare a relationship over an already added field.
    pub fn reference(
        mut self,
        name: impl Into<String>,
        field: impl Into<String>,
        target: impl Into<String>,
        inverse: Option<&str>,
    ) -> Self {
        self.references.push(PendingReference {
            name: name.into(),
            field: field.into(),
            target: target.into(),
            inverse: inverse.map(str::to_string),
        });
        self
    }

    /// Add a query placeholder.
    pub fn parameter(mut self, parameter: ParameterDef) -> Self {
        self.parameters.push(parameter);
        self
    }

    /// Mark the entity read-only.
    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    /// Set the description.
    pub fn description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    /// Build the definition.
    pub fn build(self) -> Result<EntityDefinition, SchemaError> {
        let name = EntityName::new(self.name)?;
        let key = self.key.ok_or_else(|| SchemaError::InvalidKey {
            entity: name.to_string(),
            reason: "no key field declared".to_string(),
        })?;
        let relationships = self
            .references
            .into_iter()
            .map(|r| {
                Ok(Relationship {
                    name: r.name,
                    field: r.field,
                    target: EntityName::new(r.target)?,
                    inverse: r.inverse,
                })
            })
            .collect::<Result<Vec<_>, SchemaError>>()?;
        let definition = EntityDefinition {
            name,
            key,
            fields: self.fields,
            relationships,
            parameters: self.parameters,
            read_only: self.read_only,
            description: self.description,
        };
        definition.validate()?;
        Ok(definition)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn orders() -> EntityDefinition {
        EntityBuilder::new("orders")
            .key("id", DataType::Integer)
            .add_required_field("customer_id", DataType::Integer)
            .add_field("seller_id", DataType::Integer)
            .add_field("comment", DataType::Text)
            .reference("customer", "customer_id", "customers", Some("orders"))
            .reference("seller", "seller_id", "customers", Some("sales"))
            .parameter(ParameterDef::new("customer", DataType::Integer).filtering("customer_id"))
            .description("Customer orders")
            .build()
            .unwrap()
    }

    #[test]
    fn test_entity_validation() {
        let def = orders();
        assert!(def.validate().is_ok());
        assert_eq!(def.key, "id");
        assert_eq!(def.field_names(), vec!["id", "customer_id", "seller_id", "comment"]);
    }

    #[test]
    fn test_relationship_nullability() {
        let def = orders();
        let customer = def.relationship("customer").unwrap();
        let seller = def.relationship("seller").unwrap();
        assert!(def.is_required(customer));
        assert!(!def.is_required(seller));
        assert_eq!(def.relationships_on("seller_id").count(), 1);
    }

    #[test]
    fn test_duplicate_field() {
        let result = EntityBuilder::new("bad")
            .key("id", DataType::Integer)
            .add_field("name", DataType::Text)
            .add_field("name", DataType::Integer)
            .build();

        assert!(matches!(result, Err(SchemaError::DuplicateField { .. })));
    }

    #[test]
    fn test_invalid_key() {
        let missing = EntityBuilder::new("bad").add_field("name", DataType::Text).build();
        assert!(matches!(missing, Err(SchemaError::InvalidKey { .. })));

        let float_key = EntityBuilder::new("bad").key("id", DataType::Float).build();
        assert!(matches!(float_key, Err(SchemaError::InvalidKey { .. })));
    }

    #[test]
    fn test_relationship_on_unknown_field() {
        let result = EntityBuilder::new("orders")
            .key("id", DataType::Integer)
            .reference("good", "good_id", "goods", None)
            .build();

        assert!(matches!(result, Err(SchemaError::FieldNotFound { .. })));
    }

    #[test]
    fn test_relationship_on_key_field() {
        let result = EntityBuilder::new("profiles")
            .key("id", DataType::Integer)
            .reference("owner", "id", "users", None)
            .build();

        assert!(matches!(result, Err(SchemaError::InvalidRelationship { .. })));
    }

    #[test]
    fn test_parameter_validation() {
        let result = EntityBuilder::new("orders")
            .key("id", DataType::Integer)
            .parameter(ParameterDef::new("since", DataType::Timestamp).filtering("moment"))
            .build();
        assert!(matches!(result, Err(SchemaError::FieldNotFound { .. })));

        let result = EntityBuilder::new("orders")
            .key("id", DataType::Integer)
            .parameter(ParameterDef::new("limit", DataType::Integer).with_default("ten"))
            .build();
        assert!(matches!(result, Err(SchemaError::InvalidDefault { .. })));
    }

    #[test]
    fn test_definition_serialization() {
        let def = orders();
        let json = serde_json::to_string_pretty(&def).unwrap();
        let deserialized: EntityDefinition = serde_json::from_str(&json).unwrap();

        assert_eq!(def, deserialized);
    }
}
