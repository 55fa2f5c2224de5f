//! Save ordering.
//!
//! Principals are written before their dependents and deleted after them.
//! Entity order comes from a topological sort of the relationship graph; rows
//! of an entity that references itself are ordered by their parent links.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;

use crate::catalog::EntityDefinition;
use crate::changes::Change;
use crate::storage::{Columns, EntityName, Key};

/// Order entities principals first.
///
/// Entities caught in a reference cycle cannot be ordered; they are appended
/// by name after the rest.
pub fn dependency_order(definitions: &[Arc<EntityDefinition>]) -> Vec<Arc<EntityDefinition>> {
    let by_name: BTreeMap<&EntityName, &Arc<EntityDefinition>> =
        definitions.iter().map(|d| (&d.name, d)).collect();

    // principal -> dependents, and how many principals each entity waits for
    let mut dependents: BTreeMap<&EntityName, BTreeSet<&EntityName>> = BTreeMap::new();
    let mut waiting: BTreeMap<&EntityName, usize> = by_name.keys().map(|name| (*name, 0)).collect();
    for definition in definitions {
        let principals: BTreeSet<&EntityName> = definition
            .relationships
            .iter()
            .map(|r| &r.target)
            .filter(|target| **target != definition.name && by_name.contains_key(target))
            .collect();
        for principal in principals {
            dependents.entry(principal).or_default().insert(&definition.name);
            *waiting.entry(&definition.name).or_default() += 1;
        }
    }

    let mut ready: BTreeSet<&EntityName> = waiting
        .iter()
        .filter(|(_, count)| **count == 0)
        .map(|(name, _)| *name)
        .collect();
    let mut ordered = Vec::with_capacity(definitions.len());
    while let Some(name) = ready.pop_first() {
        ordered.push(name);
        for dependent in dependents.get(name).into_iter().flatten() {
            if let Some(count) = waiting.get_mut(dependent) {
                *count -= 1;
                if *count == 0 {
                    ready.insert(*dependent);
                }
            }
        }
    }

    if ordered.len() < by_name.len() {
        let placed: HashSet<&EntityName> = ordered.iter().copied().collect();
        let cyclic: Vec<&EntityName> = by_name.keys().copied().filter(|n| !placed.contains(n)).collect();
        tracing::warn!(
            entities = ?cyclic.iter().map(|n| n.as_str()).collect::<Vec<_>>(),
            "reference cycle between entities, saving them in name order"
        );
        ordered.extend(cyclic);
    }

    ordered
        .into_iter()
        .filter_map(|name| by_name.get(name).map(|d| Arc::clone(d)))
        .collect()
}

/// A pending insert or delete with the row values that place it.
#[derive(Debug, Clone)]
pub struct Pending {
    pub change: Change,
    pub columns: Columns,
}

/// Changes of one entity, split by kind.
#[derive(Debug, Default)]
pub struct EntityChanges {
    pub inserts: Vec<Pending>,
    pub updates: Vec<Change>,
    pub deletes: Vec<Pending>,
}

impl EntityChanges {
    pub fn is_empty(&self) -> bool {
        self.inserts.is_empty() && self.updates.is_empty() && self.deletes.is_empty()
    }
}

/// Assemble one batch: inserts in dependency order, then updates in
/// dependency order, then deletes in reverse dependency order, then commands.
pub fn assemble(
    order: &[Arc<EntityDefinition>],
    mut changes: BTreeMap<EntityName, EntityChanges>,
    commands: &[Change],
) -> Vec<Change> {
    let mut per_entity: Vec<(&Arc<EntityDefinition>, EntityChanges)> = order
        .iter()
        .filter_map(|d| changes.remove(&d.name).map(|c| (d, c)))
        .collect();

    let mut batch = Vec::new();
    for (definition, entity) in per_entity.iter_mut() {
        batch.extend(parents_first(definition, std::mem::take(&mut entity.inserts)));
    }
    for (_, entity) in per_entity.iter_mut() {
        batch.append(&mut entity.updates);
    }
    for (definition, entity) in per_entity.iter_mut().rev() {
        let mut deletes = parents_first(definition, std::mem::take(&mut entity.deletes));
        deletes.reverse();
        batch.extend(deletes);
    }
    batch.extend(commands.iter().cloned());
    batch
}

/// Order rows of one entity so that a row follows the rows it references
/// through self relationships. Rows caught in a cycle keep their order.
fn parents_first(definition: &EntityDefinition, rows: Vec<Pending>) -> Vec<Change> {
    let self_fields: Vec<&str> = definition
        .relationships
        .iter()
        .filter(|r| r.target == definition.name)
        .map(|r| r.field.as_str())
        .collect();
    if self_fields.is_empty() || rows.len() < 2 {
        return rows.into_iter().map(|p| p.change).collect();
    }

    let key_of = |p: &Pending| p.columns.get(&definition.key).and_then(Key::from_value);
    let mut remaining: Vec<Pending> = rows;
    let mut ordered = Vec::with_capacity(remaining.len());
    loop {
        let pending_keys: HashSet<Key> = remaining.iter().filter_map(key_of).collect();
        let (ready, blocked): (Vec<Pending>, Vec<Pending>) = remaining.into_iter().partition(|p| {
            let own = key_of(p);
            self_fields.iter().all(|field| {
                match p.columns.get(*field).and_then(Key::from_value) {
                    Some(parent) => own.as_ref() == Some(&parent) || !pending_keys.contains(&parent),
                    None => true,
                }
            })
        });
        if ready.is_empty() {
            ordered.extend(blocked.into_iter().map(|p| p.change));
            break;
        }
        ordered.extend(ready.into_iter().map(|p| p.change));
        if blocked.is_empty() {
            break;
        }
        remaining = blocked;
    }
    ordered
}
