//! Catalog manager for entity definitions.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;

use super::schema::{EntityDefinition, SchemaError};
use crate::storage::EntityName;

/// The catalog maps entity names to their definitions.
///
/// Clones share the same registry.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    entities: Arc<RwLock<BTreeMap<EntityName, Arc<EntityDefinition>>>>,
}

impl Catalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a catalog from a JSON array of entity definitions.
    ///
    /// Every definition is validated on its own, then the whole catalog is
    /// checked for dangling relationship targets.
    pub fn from_json(json: &str) -> Result<Self, SchemaError> {
        let definitions: Vec<EntityDefinition> =
            serde_json::from_str(json).map_err(|e| SchemaError::Load(e.to_string()))?;

        let catalog = Self::new();
        for definition in definitions {
            catalog.register(definition)?;
        }
        catalog.validate()?;
        Ok(catalog)
    }

    /// Load a catalog file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SchemaError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| SchemaError::Load(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&json)
    }

    /// Serialize every definition as a JSON array.
    pub fn to_json(&self) -> Result<String, SchemaError> {
        let definitions: Vec<EntityDefinition> =
            self.definitions().iter().map(|d| d.as_ref().clone()).collect();
        serde_json::to_string_pretty(&definitions).map_err(|e| SchemaError::Load(e.to_string()))
    }

    /// Register a new entity definition.
    pub fn register(&self, definition: EntityDefinition) -> Result<Arc<EntityDefinition>, SchemaError> {
        definition.validate()?;

        let mut entities = self.entities.write();
        if entities.contains_key(&definition.name) {
            return Err(SchemaError::EntityExists(definition.name.to_string()));
        }
        let definition = Arc::new(definition);
        entities.insert(definition.name.clone(), Arc::clone(&definition));
        Ok(definition)
    }

    /// Get an entity definition by name.
    pub fn get(&self, name: &str) -> Result<Arc<EntityDefinition>, SchemaError> {
        self.entities
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| SchemaError::EntityNotFound(name.to_string()))
    }

    /// Check if an entity exists.
    pub fn contains(&self, name: &str) -> bool {
        self.entities.read().contains_key(name)
    }

    /// List all entity names.
    pub fn list(&self) -> Vec<EntityName> {
        self.entities.read().keys().cloned().collect()
    }

    /// All definitions, ordered by name.
    pub fn definitions(&self) -> Vec<Arc<EntityDefinition>> {
        self.entities.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entities.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.read().is_empty()
    }

    /// Check cross-entity consistency.
    ///
    /// Relationship targets must be registered, foreign-key fields must have the
    /// target key's type, and inverse names must be unique per target.
    pub fn validate(&self) -> Result<(), SchemaError> {
        let entities = self.entities.read();
        let mut inverses: HashMap<(&str, &str), &str> = HashMap::new();

        for definition in entities.values() {
            for rel in &definition.relationships {
                let target = entities.get(&rel.target).ok_or_else(|| SchemaError::InvalidRelationship {
                    entity: definition.name.to_string(),
                    relationship: rel.name.clone(),
                    reason: format!("target entity '{}' is not registered", rel.target),
                })?;

                let field_type = definition.field(&rel.field).map(|f| f.data_type);
                let key_type = target.key_field().map(|f| f.data_type);
                if field_type != key_type {
                    return Err(SchemaError::InvalidRelationship {
                        entity: definition.name.to_string(),
                        relationship: rel.name.clone(),
                        reason: format!(
                            "field '{}' does not match the key type of '{}'",
                            rel.field, rel.target
                        ),
                    });
                }

                if let Some(inverse) = &rel.inverse {
                    let slot = (rel.target.as_str(), inverse.as_str());
                    if inverses.insert(slot, definition.name.as_str()).is_some() {
                        return Err(SchemaError::DuplicateInverse {
                            entity: rel.target.to_string(),
                            inverse: inverse.clone(),
                        });
                    }
                }
            }
        }

        Ok(())
    }
}
