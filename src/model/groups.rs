//! Reverse group index.
//!
//! For every relationship the index keeps, per principal key, the keys of
//! the dependent rows whose foreign key currently points at it. A row sits in
//! at most one group per relationship.

use std::collections::{BTreeMap, BTreeSet};

use crate::catalog::EntityDefinition;
use crate::storage::{Columns, EntityName, Key};

type GroupKey = (EntityName, String);

#[derive(Debug, Default)]
pub struct GroupIndex {
    groups: BTreeMap<GroupKey, BTreeMap<Key, BTreeSet<Key>>>,
}

impl GroupIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a row to the groups its foreign keys select.
    pub fn index_row(&mut self, definition: &EntityDefinition, key: &Key, columns: &Columns) {
        for rel in &definition.relationships {
            if let Some(principal) = columns.get(&rel.field).and_then(Key::from_value) {
                self.groups
                    .entry((definition.name.clone(), rel.name.clone()))
                    .or_default()
                    .entry(principal)
                    .or_default()
                    .insert(key.clone());
            }
        }
    }

    /// Remove a row from the groups its foreign keys select.
    pub fn unindex_row(&mut self, definition: &EntityDefinition, key: &Key, columns: &Columns) {
        for rel in &definition.relationships {
            let Some(principal) = columns.get(&rel.field).and_then(Key::from_value) else {
                continue;
            };
            let slot = (definition.name.clone(), rel.name.clone());
            let Some(by_principal) = self.groups.get_mut(&slot) else {
                continue;
            };
            if let Some(members) = by_principal.get_mut(&principal) {
                members.remove(key);
                if members.is_empty() {
                    by_principal.remove(&principal);
                }
            }
        }
    }

    /// Keys of the dependents in one group.
    pub fn members(&self, entity: &EntityName, relationship: &str, principal: &Key) -> impl Iterator<Item = &Key> + '_ {
        self.groups
            .get(&(entity.clone(), relationship.to_string()))
            .and_then(|by_principal| by_principal.get(principal))
            .into_iter()
            .flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Value;
    use crate::testing::{self, columns};

    #[test]
    fn test_index_and_move() {
        let catalog = testing::catalog();
        let orders = catalog.get("orders").unwrap();
        let mut index = GroupIndex::new();

        let row = columns([
            ("id", 10.into()),
            ("customer_id", 1.into()),
            ("seller_id", Value::Null),
            ("good_id", 2.into()),
        ]);
        let key = Key::Integer(10);
        index.index_row(&orders, &key, &row);

        let members: Vec<&Key> = index.members(&orders.name, "customer", &Key::Integer(1)).collect();
        assert_eq!(members, vec![&key]);
        assert_eq!(index.members(&orders.name, "seller", &Key::Integer(1)).count(), 0);

        let mut moved = row.clone();
        moved.insert("customer_id".to_string(), 3.into());
        index.unindex_row(&orders, &key, &row);
        index.index_row(&orders, &key, &moved);

        assert_eq!(index.members(&orders.name, "customer", &Key::Integer(1)).count(), 0);
        assert_eq!(index.members(&orders.name, "customer", &Key::Integer(3)).count(), 1);
        assert_eq!(index.members(&orders.name, "good", &Key::Integer(2)).count(), 1);
    }
}
