//! The object graph.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use super::config::ModelConfig;
use super::entity::EntitySet;
use super::error::{ModelError, ModelResult};
use super::groups::GroupIndex;
use super::ordering::{assemble, dependency_order};
use crate::catalog::{Catalog, DataType, EntityDefinition, Relationship};
use crate::changes::{Change, ChangeDecoder};
use crate::executor::{resolve_parameters, Backend, Parameters};
use crate::storage::{coerce_field, next_id, EntityName, Key, Row, RowError, Value};

/// An in-memory graph of entity rows over a persistence backend.
///
/// Rows are loaded with [`Model::query`], navigated through their
/// relationships, mutated through the model's entry points and written back
/// with [`Model::save`], which submits only the net changes as one batch.
///
/// The entity set is fixed when the model is created; entities registered
/// with the catalog afterwards are not visible to it.
pub struct Model<B: Backend> {
    catalog: Catalog,
    backend: B,
    config: ModelConfig,
    order: Vec<Arc<EntityDefinition>>,
    entities: BTreeMap<EntityName, EntitySet>,
    groups: GroupIndex,
    /// (principal, inverse name) -> (dependent, relationship)
    inverses: BTreeMap<(EntityName, String), (EntityName, String)>,
    commands: Vec<Change>,
}

impl<B: Backend> Model<B> {
    /// Create a model with the default configuration.
    pub fn new(catalog: Catalog, backend: B) -> ModelResult<Self> {
        Self::with_config(catalog, backend, ModelConfig::default())
    }

    pub fn with_config(catalog: Catalog, backend: B, config: ModelConfig) -> ModelResult<Self> {
        catalog.validate()?;
        let definitions = catalog.definitions();

        let mut inverses = BTreeMap::new();
        for definition in &definitions {
            for rel in &definition.relationships {
                if let Some(inverse) = &rel.inverse {
                    inverses.insert(
                        (rel.target.clone(), inverse.clone()),
                        (definition.name.clone(), rel.name.clone()),
                    );
                }
            }
        }

        let entities = definitions
            .iter()
            .map(|d| (d.name.clone(), EntitySet::new(Arc::clone(d))))
            .collect();

        Ok(Self {
            order: dependency_order(&definitions),
            catalog,
            backend,
            config,
            entities,
            groups: GroupIndex::new(),
            inverses,
            commands: Vec::new(),
        })
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    /// Live view of one entity's rows.
    pub fn entity(&self, name: &str) -> ModelResult<&EntitySet> {
        self.entities
            .get(name)
            .ok_or_else(|| ModelError::EntityNotFound(name.to_string()))
    }

    /// A detached row of the entity with field defaults applied.
    pub fn new_instance(&self, name: &str) -> ModelResult<Row> {
        Ok(Row::new(Arc::clone(self.entity(name)?.definition())))
    }

    /// Run the entity's query and merge the result into the identity map.
    ///
    /// A reload of an entity without pending edits replaces its rows: values
    /// are refreshed in place and rows missing from the result are evicted.
    /// With pending edits the result is merged instead: edited and removed
    /// rows are left alone and nothing is evicted. Rows keep their instance
    /// either way.
    ///
    /// Returns the rows of the result, as they are now in the map.
    #[tracing::instrument(level = "debug", skip(self, parameters))]
    pub async fn query(&mut self, name: &str, parameters: &Parameters) -> ModelResult<BTreeMap<Key, &Row>> {
        let definition = Arc::clone(self.entity(name)?.definition());
        let resolved = resolve_parameters(&definition, parameters)?;
        let records = self
            .backend
            .read(&definition, &resolved)
            .await
            .map_err(ModelError::Backend)?;

        let mut rows = Vec::with_capacity(records.len());
        for columns in records {
            let row = Row::from_columns(Arc::clone(&definition), columns)?;
            let key = row
                .key()
                .ok_or_else(|| RowError::MissingKey(definition.name.clone()))?;
            rows.push((key, row));
        }

        let keys = self.merge(&definition, rows)?;
        let set = self.entity(name)?;
        Ok(keys
            .into_iter()
            .filter_map(|key| set.get(&key).map(|row| (key, row)))
            .collect())
    }

    fn merge(&mut self, definition: &EntityDefinition, rows: Vec<(Key, Row)>) -> ModelResult<Vec<Key>> {
        let evict = self.config.evict_on_reload;
        let Self { entities, groups, .. } = self;
        let set = entities
            .get_mut(&definition.name)
            .ok_or_else(|| ModelError::EntityNotFound(definition.name.to_string()))?;

        let replace = !set.is_dirty();
        let mut seen = BTreeSet::new();
        let mut keys = Vec::with_capacity(rows.len());
        let (mut added, mut refreshed, mut evicted) = (0usize, 0usize, 0usize);

        for (key, row) in rows {
            keys.push(key.clone());
            seen.insert(key.clone());
            if set.is_pending(&key) {
                continue;
            }
            match set.get(&key).map(|existing| existing.same_values(&row)) {
                Some(true) => {}
                Some(false) => {
                    let columns = row.to_columns();
                    if let Some(previous) = set.refresh(&key, columns.clone()) {
                        groups.unindex_row(definition, &key, &previous);
                        groups.index_row(definition, &key, &columns);
                        refreshed += 1;
                    }
                }
                None => {
                    groups.index_row(definition, &key, row.columns());
                    set.load(key, row);
                    added += 1;
                }
            }
        }

        if replace && evict && set.is_loaded() {
            let stale: Vec<Key> = set.keys().filter(|k| !seen.contains(*k)).cloned().collect();
            for key in stale {
                if let Some(row) = set.evict(&key) {
                    groups.unindex_row(definition, &key, row.columns());
                    evicted += 1;
                }
            }
        }
        set.mark_loaded();

        tracing::debug!(
            entity = %definition.name,
            rows = keys.len(),
            added,
            refreshed,
            evicted,
            merged = !replace,
            "query merged"
        );
        Ok(keys)
    }

    /// Put a row into its entity's identity map.
    ///
    /// A row without a key gets a generated one when the key is an integer.
    /// A row with the key of an existing row replaces it; against a persisted
    /// row the net change is an update. References are not checked here.
    pub fn insert(&mut self, mut row: Row) -> ModelResult<Key> {
        let definition = self.writable(row.entity().as_str())?;
        if row.key().is_none() && definition.key_field().is_some_and(|f| f.data_type == DataType::Integer) {
            row.set(&definition.key, next_id())?;
        }
        let key = row
            .key()
            .ok_or_else(|| RowError::MissingKey(definition.name.clone()))?;

        let (set, groups) = self.parts(&definition.name)?;
        if let Some(replaced) = set.insert(key.clone(), row) {
            groups.unindex_row(&definition, &key, replaced.columns());
        }
        if let Some(row) = set.get(&key) {
            groups.index_row(&definition, &key, row.columns());
        }
        Ok(key)
    }

    /// Remove a row from the map. Persisted rows are deleted on save.
    pub fn remove(&mut self, name: &str, key: &Key) -> ModelResult<Row> {
        let definition = self.writable(name)?;
        let (set, groups) = self.parts(&definition.name)?;
        let row = set.remove(key).ok_or_else(|| ModelError::RowNotFound {
            entity: name.to_string(),
            key: key.to_string(),
        })?;
        groups.unindex_row(&definition, key, row.columns());
        Ok(row)
    }

    /// Remove every row of an entity. Returns how many were removed.
    pub fn clear(&mut self, name: &str) -> ModelResult<usize> {
        let keys: Vec<Key> = self.entity(name)?.keys().cloned().collect();
        for key in &keys {
            self.remove(name, key)?;
        }
        Ok(keys.len())
    }

    /// Write one field of a row.
    ///
    /// The row leaves the groups of its old foreign keys and joins the groups
    /// of the new ones. Writing the key field moves the row to its new key;
    /// a key held by another row, or by a row removed since the last save, is
    /// refused with [`ModelError::StaleKey`].
    /// Returns the key the row lives under afterwards.
    pub fn set(&mut self, name: &str, key: &Key, field: &str, value: impl Into<Value>) -> ModelResult<Key> {
        let check = self.config.check_references;
        self.write_field(name, key, field, value.into(), check)
    }

    /// Point a relationship at a principal row, or clear it with `None`.
    ///
    /// The principal must be in the map, whatever the configuration says.
    pub fn set_reference(
        &mut self,
        name: &str,
        key: &Key,
        relationship: &str,
        target: Option<&Key>,
    ) -> ModelResult<Key> {
        let definition = Arc::clone(self.entity(name)?.definition());
        let rel = self.relationship(&definition, relationship)?.clone();
        let value = target.map(Key::to_value).unwrap_or(Value::Null);
        if target.is_some() {
            self.check_resolvable(&definition, key, &rel, &value)?;
        }
        self.write_field(name, key, &rel.field, value, false)
    }

    fn write_field(&mut self, name: &str, key: &Key, field: &str, value: Value, check: bool) -> ModelResult<Key> {
        let definition = self.writable(name)?;
        let value = coerce_field(&definition, field, value)?;
        if value.is_null() && definition.field(field).is_some_and(|f| f.required) {
            return Err(RowError::NullValue {
                entity: definition.name.clone(),
                field: field.to_string(),
            }
            .into());
        }

        let set = self.entity(name)?;
        let old_columns = set
            .get(key)
            .ok_or_else(|| ModelError::RowNotFound {
                entity: name.to_string(),
                key: key.to_string(),
            })?
            .to_columns();

        if check {
            for rel in definition.relationships_on(field) {
                if definition.is_required(rel) {
                    self.check_resolvable(&definition, key, rel, &value)?;
                }
            }
        }

        if field == definition.key {
            if let Some(new_key) = Key::from_value(&value) {
                // a key whose delete is pending stays taken until the save
                if &new_key != key && (set.contains_key(&new_key) || set.is_removed(&new_key)) {
                    return Err(ModelError::StaleKey {
                        entity: name.to_string(),
                        key: new_key.to_string(),
                    });
                }
            }
        }

        let (set, groups) = self.parts(&definition.name)?;
        groups.unindex_row(&definition, key, &old_columns);
        let Some(new_key) = set.write(key, field, value) else {
            groups.index_row(&definition, key, &old_columns);
            return Err(ModelError::Corrupted(format!(
                "'{}' row {} rejected a checked write to '{}'",
                name, key, field
            )));
        };
        if let Some(row) = set.get(&new_key) {
            groups.index_row(&definition, &new_key, row.columns());
        }
        Ok(new_key)
    }

    fn check_resolvable(
        &self,
        definition: &EntityDefinition,
        key: &Key,
        rel: &Relationship,
        value: &Value,
    ) -> ModelResult<()> {
        let Some(target_key) = Key::from_value(value) else {
            return Ok(());
        };
        if self.entity(rel.target.as_str())?.contains_key(&target_key) {
            return Ok(());
        }
        Err(ModelError::UnresolvedReference {
            entity: definition.name.to_string(),
            row: key.to_string(),
            relationship: rel.name.clone(),
            target: rel.target.to_string(),
            key: target_key.to_string(),
        })
    }

    /// Resolve a relationship of a row to its principal.
    ///
    /// Required relationships fail with [`ModelError::UnresolvedReference`]
    /// when the foreign key is null or names a row that is not in the map.
    /// Nullable ones yield `None` while unset.
    pub fn reference(&self, row: &Row, relationship: &str) -> ModelResult<Option<&Row>> {
        let definition = row.definition();
        let rel = self.relationship(definition, relationship)?;
        let target = self.entity(rel.target.as_str())?;
        let unresolved = |key: String| ModelError::UnresolvedReference {
            entity: definition.name.to_string(),
            row: row.key().map_or_else(|| "(new)".to_string(), |k| k.to_string()),
            relationship: rel.name.clone(),
            target: rel.target.to_string(),
            key,
        };

        match row.get(&rel.field).and_then(Key::from_value) {
            None if definition.is_required(rel) => Err(unresolved("null".to_string())),
            None => Ok(None),
            Some(principal) => target
                .get(&principal)
                .map(Some)
                .ok_or_else(|| unresolved(principal.to_string())),
        }
    }

    /// [`Model::reference`] for a row addressed by entity and key.
    pub fn reference_of(&self, name: &str, key: &Key, relationship: &str) -> ModelResult<Option<&Row>> {
        let row = self.entity(name)?.get(key).ok_or_else(|| ModelError::RowNotFound {
            entity: name.to_string(),
            key: key.to_string(),
        })?;
        self.reference(row, relationship)
    }

    /// The dependent rows whose relationship points at `principal`.
    pub fn group(&self, dependent: &str, relationship: &str, principal: &Key) -> ModelResult<Vec<&Row>> {
        let set = self.entity(dependent)?;
        self.relationship(set.definition(), relationship)?;
        Ok(self
            .groups
            .members(set.name(), relationship, principal)
            .filter_map(|key| set.get(key))
            .collect())
    }

    /// The dependents of a principal row, through an inverse name such as
    /// `orders` on `customers`.
    pub fn children(&self, principal: &str, key: &Key, inverse: &str) -> ModelResult<Vec<&Row>> {
        let name = self.entity(principal)?.name().clone();
        let (dependent, relationship) = self
            .inverses
            .get(&(name, inverse.to_string()))
            .ok_or_else(|| ModelError::RelationshipNotFound {
                entity: principal.to_string(),
                relationship: inverse.to_string(),
            })?;
        self.group(dependent.as_str(), relationship, key)
    }

    /// Queue a command to run with the next save.
    ///
    /// Parameters are resolved against the entity's placeholders.
    pub fn command(&mut self, name: &str, parameters: &Parameters) -> ModelResult<()> {
        let definition = Arc::clone(self.entity(name)?.definition());
        let parameters = resolve_parameters(&definition, parameters)?;
        self.commands.push(Change::Command {
            entity: definition.name.clone(),
            parameters,
            filter: None,
        });
        Ok(())
    }

    /// The batch the next save would submit, in submission order.
    pub fn pending_changes(&self) -> Vec<Change> {
        let changes = self
            .entities
            .iter()
            .map(|(name, set)| (name.clone(), set.changes()))
            .filter(|(_, changes)| !changes.is_empty())
            .collect();
        assemble(&self.order, changes, &self.commands)
    }

    pub fn is_dirty(&self) -> bool {
        !self.commands.is_empty() || self.entities.values().any(EntitySet::is_dirty)
    }

    /// Forget every pending change. Current values become the baseline.
    pub fn drop_changes(&mut self) {
        for set in self.entities.values_mut() {
            set.accept_changes();
        }
        self.commands.clear();
    }

    /// Forget one entity's pending changes and queued commands.
    pub fn drop_entity_changes(&mut self, name: &str) -> ModelResult<()> {
        self.entities
            .get_mut(name)
            .ok_or_else(|| ModelError::EntityNotFound(name.to_string()))?
            .accept_changes();
        self.commands.retain(|c| c.entity().as_str() != name);
        Ok(())
    }

    /// Submit the pending changes as one batch.
    ///
    /// On success the baselines are accepted and the affected-row total is
    /// returned. On failure nothing in memory changes, so the save can be
    /// repeated.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn save(&mut self) -> ModelResult<usize> {
        let batch = self.pending_changes();
        if batch.is_empty() {
            tracing::debug!("nothing to save");
            return Ok(0);
        }
        if self.config.validate_changes {
            for change in &batch {
                validate_change(&self.catalog, change)?;
            }
        }

        tracing::info!(changes = batch.len(), "saving model");
        let affected = self.backend.submit(&batch).await.map_err(ModelError::from)?;

        self.drop_changes();
        tracing::info!(changes = batch.len(), affected, "model saved");
        Ok(affected)
    }

    /// Apply an externally built batch without touching the graph.
    ///
    /// Every change is validated against the catalog first.
    #[tracing::instrument(level = "debug", skip(self, changes), fields(changes = changes.len()))]
    pub async fn submit(&self, changes: &[Change]) -> ModelResult<usize> {
        for change in changes {
            validate_change(&self.catalog, change)?;
        }
        let affected = self.backend.submit(changes).await.map_err(ModelError::from)?;
        tracing::info!(changes = changes.len(), affected, "changes submitted");
        Ok(affected)
    }

    /// Decode a JSON batch against the catalog and submit it.
    pub async fn submit_json(&self, json: &str) -> ModelResult<usize> {
        let changes = ChangeDecoder::with_catalog(&self.catalog).decode_str(json)?;
        self.submit(&changes).await
    }

    fn writable(&self, name: &str) -> ModelResult<Arc<EntityDefinition>> {
        let definition = self.entity(name)?.definition();
        if definition.read_only {
            return Err(ModelError::ReadOnly(name.to_string()));
        }
        Ok(Arc::clone(definition))
    }

    fn relationship<'d>(&self, definition: &'d EntityDefinition, name: &str) -> ModelResult<&'d Relationship> {
        definition
            .relationship(name)
            .ok_or_else(|| ModelError::RelationshipNotFound {
                entity: definition.name.to_string(),
                relationship: name.to_string(),
            })
    }

    fn parts(&mut self, name: &EntityName) -> ModelResult<(&mut EntitySet, &mut GroupIndex)> {
        let set = self
            .entities
            .get_mut(name)
            .ok_or_else(|| ModelError::EntityNotFound(name.to_string()))?;
        Ok((set, &mut self.groups))
    }
}

/// Check a change against the catalog: the entity and its fields exist,
/// values fit their fields, updates and deletes carry the key, and data
/// changes do not target read-only entities.
pub fn validate_change(catalog: &Catalog, change: &Change) -> ModelResult<()> {
    let name = change.entity().as_str();
    let definition = catalog
        .get(name)
        .map_err(|_| ModelError::EntityNotFound(name.to_string()))?;

    if let Change::Command { parameters, .. } = change {
        if let Some(unknown) = parameters.keys().find(|p| definition.parameter(p).is_none()) {
            return Err(ModelError::UnknownParameter {
                entity: name.to_string(),
                parameter: unknown.clone(),
            });
        }
        return Ok(());
    }

    if definition.read_only {
        return Err(ModelError::ReadOnly(name.to_string()));
    }
    for columns in change.data().into_iter().chain(change.keys()) {
        for (field, value) in columns {
            coerce_field(&definition, field, value.clone())?;
        }
    }

    let identified = match change {
        Change::Insert { data, .. } => data.get(&definition.key),
        _ => change.keys().and_then(|keys| keys.get(&definition.key)),
    };
    if identified.map_or(true, Value::is_null) {
        return Err(RowError::MissingKey(definition.name.clone()).into());
    }
    Ok(())
}
