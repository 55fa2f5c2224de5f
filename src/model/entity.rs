//! Identity map and dirty tracking for one entity.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use super::ordering::{EntityChanges, Pending};
use crate::catalog::EntityDefinition;
use crate::changes::Change;
use crate::storage::{Columns, EntityName, Key, Row, Value};

#[derive(Debug)]
struct Slot {
    row: Row,
    /// Values last read from or written to the backend; `None` for rows that
    /// were never persisted.
    baseline: Option<Columns>,
}

/// The rows of one entity, by key, with their pending changes.
///
/// Every key maps to exactly one row object. The dirty state is kept as an
/// `inserted` key set, an `updated` key set and a `removed` map from baseline
/// key to baseline values, next to a baseline snapshot per row.
#[derive(Debug)]
pub struct EntitySet {
    definition: Arc<EntityDefinition>,
    rows: BTreeMap<Key, Slot>,
    inserted: BTreeSet<Key>,
    updated: BTreeSet<Key>,
    removed: BTreeMap<Key, Columns>,
    loaded: bool,
}

impl EntitySet {
    pub fn new(definition: Arc<EntityDefinition>) -> Self {
        Self {
            definition,
            rows: BTreeMap::new(),
            inserted: BTreeSet::new(),
            updated: BTreeSet::new(),
            removed: BTreeMap::new(),
            loaded: false,
        }
    }

    pub fn name(&self) -> &EntityName {
        &self.definition.name
    }

    pub fn definition(&self) -> &Arc<EntityDefinition> {
        &self.definition
    }

    /// Look up a row. Absent keys yield `None`.
    pub fn get(&self, key: &Key) -> Option<&Row> {
        self.rows.get(key).map(|slot| &slot.row)
    }

    pub fn contains_key(&self, key: &Key) -> bool {
        self.rows.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &Key> + '_ {
        self.rows.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Key, &Row)> + '_ {
        self.rows.iter().map(|(key, slot)| (key, &slot.row))
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Whether the entity has been queried at least once.
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Whether any insert, update or removal is pending.
    pub fn is_dirty(&self) -> bool {
        !self.inserted.is_empty() || !self.updated.is_empty() || !self.removed.is_empty()
    }

    /// Whether the row under `key` has unsaved edits or is a removed baseline.
    pub fn is_pending(&self, key: &Key) -> bool {
        self.inserted.contains(key) || self.updated.contains(key) || self.removed.contains_key(key)
    }

    /// Whether a persisted row under `key` is waiting to be deleted.
    pub fn is_removed(&self, key: &Key) -> bool {
        self.removed.contains_key(key)
    }

    pub fn pending_inserts(&self) -> usize {
        self.inserted.len()
    }

    pub fn pending_updates(&self) -> usize {
        self.updated.len()
    }

    pub fn pending_removals(&self) -> usize {
        self.removed.len()
    }

    pub(crate) fn mark_loaded(&mut self) {
        self.loaded = true;
    }

    pub(crate) fn mark_inserted(&mut self, key: Key) {
        self.updated.remove(&key);
        self.inserted.insert(key);
    }

    /// Record an edit of a persisted row. Rows still pending insertion stay
    /// inserts, and rows whose values are back at their baseline are clean.
    pub(crate) fn mark_updated(&mut self, key: Key) {
        if self.inserted.contains(&key) {
            return;
        }
        let unchanged = self
            .rows
            .get(&key)
            .is_some_and(|slot| slot.baseline.as_ref() == Some(slot.row.columns()));
        if unchanged {
            self.updated.remove(&key);
        } else {
            self.updated.insert(key);
        }
    }

    pub(crate) fn mark_removed(&mut self, key: &Key, baseline: Option<Columns>) {
        self.inserted.remove(key);
        self.updated.remove(key);
        if let Some(baseline) = baseline {
            if let Some(baseline_key) = self.baseline_key(&baseline) {
                self.removed.insert(baseline_key, baseline);
            }
        }
    }

    fn baseline_key(&self, baseline: &Columns) -> Option<Key> {
        baseline.get(&self.definition.key).and_then(Key::from_value)
    }

    /// Put a row under its key, returning the row it replaces.
    ///
    /// A replaced row hands its baseline on, and a key whose removal is
    /// pending gets its baseline back, so the net change is an update.
    pub(crate) fn insert(&mut self, key: Key, row: Row) -> Option<Row> {
        let (baseline, replaced) = match self.rows.remove(&key) {
            Some(slot) => (slot.baseline, Some(slot.row)),
            None => (self.removed.remove(&key), None),
        };

        let persisted = baseline.is_some();
        self.rows.insert(key.clone(), Slot { row, baseline });
        if persisted {
            self.mark_updated(key);
        } else {
            self.mark_inserted(key);
        }
        replaced
    }

    /// Take a row out of the map and record its removal.
    pub(crate) fn remove(&mut self, key: &Key) -> Option<Row> {
        let slot = self.rows.remove(key)?;
        self.mark_removed(key, slot.baseline);
        Some(slot.row)
    }

    /// Write one field and track the edit. The caller has checked the value
    /// and, for key writes, that the new key is free.
    ///
    /// Returns the key the row lives under afterwards.
    pub(crate) fn write(&mut self, key: &Key, field: &str, value: Value) -> Option<Key> {
        let mut slot = self.rows.remove(key)?;
        if slot.row.set(field, value).is_err() {
            self.rows.insert(key.clone(), slot);
            return None;
        }

        let new_key = slot.row.key().unwrap_or_else(|| key.clone());
        self.rows.insert(new_key.clone(), slot);
        if &new_key != key {
            if self.inserted.remove(key) {
                self.inserted.insert(new_key.clone());
            }
            self.updated.remove(key);
        }
        self.mark_updated(new_key.clone());
        Some(new_key)
    }

    /// Add a row read from the backend. Its values become the baseline.
    pub(crate) fn load(&mut self, key: Key, row: Row) {
        let baseline = Some(row.to_columns());
        self.rows.insert(key, Slot { row, baseline });
    }

    /// Replace a clean row's values with fresh backend values, keeping the
    /// row object. Returns the previous values.
    pub(crate) fn refresh(&mut self, key: &Key, columns: Columns) -> Option<Columns> {
        let slot = self.rows.get_mut(key)?;
        let previous = slot.row.to_columns();
        slot.row.replace_columns(columns.clone());
        slot.baseline = Some(columns);
        Some(previous)
    }

    /// Drop a row without recording a removal.
    pub(crate) fn evict(&mut self, key: &Key) -> Option<Row> {
        self.rows.remove(key).map(|slot| slot.row)
    }

    /// The pending changes of this entity.
    ///
    /// Inserts carry the full row, updates only the fields that differ from
    /// the baseline and deletes the baseline key. Updates with no net
    /// difference are left out.
    pub fn changes(&self) -> EntityChanges {
        let entity = &self.definition.name;
        let key_field = &self.definition.key;
        let mut changes = EntityChanges::default();

        for key in &self.inserted {
            if let Some(slot) = self.rows.get(key) {
                let data = slot.row.to_columns();
                changes.inserts.push(Pending {
                    change: Change::Insert {
                        entity: entity.clone(),
                        data: data.clone(),
                    },
                    columns: data,
                });
            }
        }

        for key in &self.updated {
            let Some(slot) = self.rows.get(key) else {
                continue;
            };
            let Some(baseline) = &slot.baseline else {
                continue;
            };
            let data: Columns = slot
                .row
                .columns()
                .iter()
                .filter(|(field, value)| baseline.get(*field) != Some(*value))
                .map(|(field, value)| (field.clone(), value.clone()))
                .collect();
            if data.is_empty() {
                continue;
            }
            let mut keys = Columns::new();
            keys.insert(key_field.clone(), baseline.get(key_field).cloned().unwrap_or_default());
            changes.updates.push(Change::Update {
                entity: entity.clone(),
                keys,
                data,
            });
        }

        for (key, baseline) in &self.removed {
            let mut keys = Columns::new();
            keys.insert(key_field.clone(), key.to_value());
            changes.deletes.push(Pending {
                change: Change::Delete {
                    entity: entity.clone(),
                    keys,
                },
                columns: baseline.clone(),
            });
        }

        changes
    }

    /// Accept the current values as the new baseline and forget every pending
    /// change.
    pub fn accept_changes(&mut self) {
        for key in self.inserted.iter().chain(self.updated.iter()) {
            if let Some(slot) = self.rows.get_mut(key) {
                slot.baseline = Some(slot.row.to_columns());
            }
        }
        self.inserted.clear();
        self.updated.clear();
        self.removed.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{self, columns};

    fn goods() -> EntitySet {
        EntitySet::new(testing::catalog().get("goods").unwrap())
    }

    fn good(set: &EntitySet, id: i64, name: &str) -> Row {
        Row::from_columns(
            Arc::clone(set.definition()),
            columns([("id", id.into()), ("name", name.into())]),
        )
        .unwrap()
    }

    #[test]
    fn test_insert_then_remove_emits_nothing() {
        let mut set = goods();
        let row = good(&set, 1, "Good 1");
        set.insert(Key::Integer(1), row);
        assert!(set.is_dirty());

        set.remove(&Key::Integer(1));
        assert!(!set.is_dirty());
        assert!(set.changes().is_empty());
    }

    #[test]
    fn test_update_carries_only_changed_fields() {
        let mut set = goods();
        let row = good(&set, 1, "Good 1");
        set.load(Key::Integer(1), row);

        set.write(&Key::Integer(1), "name", "Good 2".into()).unwrap();
        let changes = set.changes();
        assert_eq!(
            changes.updates,
            vec![Change::Update {
                entity: EntityName::new("goods").unwrap(),
                keys: columns([("id", 1.into())]),
                data: columns([("name", "Good 2".into())]),
            }]
        );

        set.write(&Key::Integer(1), "name", "Good 1".into()).unwrap();
        assert!(!set.is_dirty());
    }

    #[test]
    fn test_remove_then_insert_is_update() {
        let mut set = goods();
        let row = good(&set, 1, "Good 1");
        set.load(Key::Integer(1), row);

        set.remove(&Key::Integer(1));
        assert_eq!(set.pending_removals(), 1);

        let same = good(&set, 1, "Good 1");
        set.insert(Key::Integer(1), same);
        assert!(!set.is_dirty());

        let renamed = good(&set, 1, "Good 1 updated");
        let replaced = set.insert(Key::Integer(1), renamed);
        assert!(replaced.is_some());
        let changes = set.changes();
        assert!(changes.inserts.is_empty() && changes.deletes.is_empty());
        assert_eq!(changes.updates.len(), 1);
    }

    #[test]
    fn test_key_write_moves_entry() {
        let mut set = goods();
        let row = good(&set, 1, "Good 1");
        let instance = row.instance();
        set.load(Key::Integer(1), row);

        let new_key = set.write(&Key::Integer(1), "id", 5.into()).unwrap();
        assert_eq!(new_key, Key::Integer(5));
        assert!(set.get(&Key::Integer(1)).is_none());
        assert_eq!(set.get(&Key::Integer(5)).unwrap().instance(), instance);

        let changes = set.changes();
        assert_eq!(changes.updates[0].keys(), Some(&columns([("id", 1.into())])));
        assert_eq!(changes.updates[0].data(), Some(&columns([("id", 5.into())])));
    }

    #[test]
    fn test_accept_changes() {
        let mut set = goods();
        let row = good(&set, 1, "Good 1");
        set.insert(Key::Integer(1), row);
        set.accept_changes();

        assert!(!set.is_dirty());
        set.remove(&Key::Integer(1));
        assert_eq!(set.changes().deletes.len(), 1);
    }

    #[test]
    fn test_refresh_keeps_instance() {
        let mut set = goods();
        let row = good(&set, 1, "Good 1");
        let instance = row.instance();
        set.load(Key::Integer(1), row);

        let previous = set
            .refresh(&Key::Integer(1), columns([("id", 1.into()), ("name", "Fresh".into())]))
            .unwrap();
        assert_eq!(previous.get("name"), Some(&Value::from("Good 1")));
        let row = set.get(&Key::Integer(1)).unwrap();
        assert_eq!(row.instance(), instance);
        assert_eq!(row.get("name"), Some(&Value::from("Fresh")));
        assert!(!set.is_dirty());
    }
}
