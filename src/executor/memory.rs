//! In-memory reference backend.
//!
//! Tables live behind a shared lock. A batch is applied to a copy of the
//! tables and swapped in only when every change succeeded, so a failing
//! change leaves nothing behind.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use super::backend::{matches_parameters, Backend, Parameters};
use super::error::{BackendError, BackendResult};
use crate::catalog::{Catalog, EntityDefinition};
use crate::changes::Change;
use crate::storage::{coerce_field, Columns, EntityName, Key, Row, Value};

/// Rows of one entity, by key.
pub type Table = BTreeMap<Key, Columns>;

/// Every table of the backend.
pub type Tables = BTreeMap<EntityName, Table>;

/// Runs a command against the tables and returns the affected-row count.
pub type CommandHandler =
    Arc<dyn Fn(&mut Tables, &Parameters, Option<&str>) -> BackendResult<usize> + Send + Sync>;

#[derive(Default)]
struct State {
    tables: Tables,
    batches: Vec<Vec<Change>>,
}

/// A backend holding its tables in memory.
///
/// Clones share the same tables. Inserts check key uniqueness, and foreign
/// keys are enforced immediately after each change unless disabled.
#[derive(Clone)]
pub struct MemoryBackend {
    catalog: Catalog,
    state: Arc<RwLock<State>>,
    commands: Arc<RwLock<HashMap<EntityName, CommandHandler>>>,
    available: Arc<AtomicBool>,
    enforce_foreign_keys: bool,
}

impl MemoryBackend {
    /// Create an empty backend for the catalog's entities.
    pub fn new(catalog: Catalog) -> Self {
        Self {
            catalog,
            state: Arc::new(RwLock::new(State::default())),
            commands: Arc::new(RwLock::new(HashMap::new())),
            available: Arc::new(AtomicBool::new(true)),
            enforce_foreign_keys: true,
        }
    }

    /// Turn foreign-key enforcement on or off.
    pub fn with_foreign_keys(mut self, enforce: bool) -> Self {
        self.enforce_foreign_keys = enforce;
        self
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Install the handler run for commands on `entity`.
    pub fn register_command<F>(&self, entity: EntityName, handler: F)
    where
        F: Fn(&mut Tables, &Parameters, Option<&str>) -> BackendResult<usize> + Send + Sync + 'static,
    {
        self.commands.write().insert(entity, Arc::new(handler));
    }

    /// Load rows directly, bypassing batches and foreign-key checks.
    pub fn seed(&self, entity: &str, rows: impl IntoIterator<Item = Columns>) -> BackendResult<()> {
        let definition = self.definition(entity)?;
        let mut state = self.state.write();
        let table = state.tables.entry(definition.name.clone()).or_default();
        for columns in rows {
            let row = Row::from_columns(Arc::clone(&definition), columns)?;
            let key = row.key().ok_or_else(|| BackendError::MissingKey(entity.to_string()))?;
            table.insert(key, row.to_columns());
        }
        Ok(())
    }

    /// Snapshot of an entity's rows in key order.
    pub fn rows(&self, entity: &str) -> Vec<Columns> {
        self.state
            .read()
            .tables
            .get(entity)
            .map(|table| table.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Snapshot of a single row.
    pub fn row(&self, entity: &str, key: &Key) -> Option<Columns> {
        self.state.read().tables.get(entity).and_then(|t| t.get(key).cloned())
    }

    /// Every batch applied so far, oldest first.
    pub fn submitted(&self) -> Vec<Vec<Change>> {
        self.state.read().batches.clone()
    }

    /// Simulate losing or regaining the connection.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn ensure_available(&self) -> BackendResult<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(BackendError::Unavailable("memory backend is offline".to_string()))
        }
    }

    fn definition(&self, entity: &str) -> BackendResult<Arc<EntityDefinition>> {
        self.catalog
            .get(entity)
            .map_err(|_| BackendError::EntityNotFound(entity.to_string()))
    }

    fn apply(&self, tables: &mut Tables, change: &Change) -> BackendResult<usize> {
        if let Change::Command { entity, parameters, filter } = change {
            let handler = self.commands.read().get(entity).cloned().ok_or_else(|| {
                BackendError::Command {
                    entity: entity.to_string(),
                    reason: "no handler registered".to_string(),
                }
            })?;
            return handler(tables, parameters, filter.as_deref());
        }

        let definition = self.definition(change.entity().as_str())?;
        match change {
            Change::Insert { data, .. } => self.insert(tables, &definition, data),
            Change::Update { keys, data, .. } => self.update(tables, &definition, keys, data),
            Change::Delete { keys, .. } => self.delete(tables, &definition, keys),
            Change::Command { .. } => Ok(0),
        }
    }

    fn insert(&self, tables: &mut Tables, definition: &Arc<EntityDefinition>, data: &Columns) -> BackendResult<usize> {
        let row = Row::from_columns(Arc::clone(definition), data.clone())?;
        row.check_required()?;
        let key = row.key().ok_or_else(|| BackendError::MissingKey(definition.name.to_string()))?;

        let table = tables.entry(definition.name.clone()).or_default();
        if table.contains_key(&key) {
            return Err(BackendError::DuplicateKey {
                entity: definition.name.to_string(),
                key: key.to_string(),
            });
        }
        let columns = row.to_columns();
        table.insert(key.clone(), columns.clone());

        self.check_references(tables, definition, &key, &columns)?;
        Ok(1)
    }

    fn update(
        &self,
        tables: &mut Tables,
        definition: &Arc<EntityDefinition>,
        keys: &Columns,
        data: &Columns,
    ) -> BackendResult<usize> {
        let key = key_of(definition, keys)?;
        let Some(mut columns) = tables.get(&definition.name).and_then(|t| t.get(&key)).cloned() else {
            return Ok(0);
        };

        for (field, value) in data {
            let value = coerce_field(definition, field, value.clone())?;
            if value.is_null() && definition.field(field).is_some_and(|f| f.required) {
                return Err(BackendError::InvalidData {
                    entity: definition.name.to_string(),
                    reason: format!("field '{}' cannot be null", field),
                });
            }
            columns.insert(field.clone(), value);
        }

        let new_key = key_of(definition, &columns)?;
        if new_key != key {
            if tables.get(&definition.name).is_some_and(|t| t.contains_key(&new_key)) {
                return Err(BackendError::DuplicateKey {
                    entity: definition.name.to_string(),
                    key: new_key.to_string(),
                });
            }
            self.check_unreferenced(tables, definition, &key)?;
        }

        let table = tables.entry(definition.name.clone()).or_default();
        table.remove(&key);
        table.insert(new_key.clone(), columns.clone());

        self.check_references(tables, definition, &new_key, &columns)?;
        Ok(1)
    }

    fn delete(&self, tables: &mut Tables, definition: &Arc<EntityDefinition>, keys: &Columns) -> BackendResult<usize> {
        let key = key_of(definition, keys)?;
        if !tables.get(&definition.name).is_some_and(|t| t.contains_key(&key)) {
            return Ok(0);
        }
        self.check_unreferenced(tables, definition, &key)?;

        if let Some(table) = tables.get_mut(&definition.name) {
            table.remove(&key);
        }
        Ok(1)
    }

    /// Every non-null foreign key of the row must resolve.
    fn check_references(
        &self,
        tables: &Tables,
        definition: &EntityDefinition,
        key: &Key,
        columns: &Columns,
    ) -> BackendResult<()> {
        if !self.enforce_foreign_keys {
            return Ok(());
        }
        for rel in &definition.relationships {
            let Some(target_key) = columns.get(&rel.field).and_then(Key::from_value) else {
                continue;
            };
            if !tables.get(&rel.target).is_some_and(|t| t.contains_key(&target_key)) {
                return Err(BackendError::ForeignKeyViolation {
                    entity: definition.name.to_string(),
                    key: key.to_string(),
                    field: rel.field.clone(),
                    target: rel.target.to_string(),
                    value: target_key.to_string(),
                });
            }
        }
        Ok(())
    }

    /// No dependent row may still reference the key.
    fn check_unreferenced(&self, tables: &Tables, definition: &EntityDefinition, key: &Key) -> BackendResult<()> {
        if !self.enforce_foreign_keys {
            return Ok(());
        }
        let value = key.to_value();
        for dependent in self.catalog.definitions() {
            for rel in dependent.relationships.iter().filter(|r| r.target == definition.name) {
                let referenced = tables.get(&dependent.name).is_some_and(|t| {
                    t.iter().any(|(dep_key, row)| {
                        row.get(&rel.field) == Some(&value)
                            && !(dependent.name == definition.name && dep_key == key)
                    })
                });
                if referenced {
                    return Err(BackendError::StillReferenced {
                        entity: definition.name.to_string(),
                        key: key.to_string(),
                        dependent: dependent.name.to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}

fn key_of(definition: &EntityDefinition, columns: &Columns) -> BackendResult<Key> {
    columns
        .get(&definition.key)
        .and_then(Key::from_value)
        .ok_or_else(|| BackendError::MissingKey(definition.name.to_string()))
}

impl Backend for MemoryBackend {
    async fn read(&self, definition: &EntityDefinition, parameters: &Parameters) -> BackendResult<Vec<Columns>> {
        self.ensure_available()?;
        let definition = self.definition(definition.name.as_str())?;

        let state = self.state.read();
        let rows = state
            .tables
            .get(&definition.name)
            .map(|table| {
                table
                    .values()
                    .filter(|row| matches_parameters(&definition, row, parameters))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        Ok(rows)
    }

    async fn submit(&self, changes: &[Change]) -> BackendResult<usize> {
        self.ensure_available()?;

        let mut state = self.state.write();
        let mut tables = state.tables.clone();
        let mut affected = 0;
        for change in changes {
            affected += self.apply(&mut tables, change)?;
        }

        state.tables = tables;
        state.batches.push(changes.to_vec());
        Ok(affected)
    }
}
