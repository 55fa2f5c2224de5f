//! Typed rows bound to an entity definition.
//!
//! A row is the in-memory form of one query result record. It carries the
//! definition it was built for, so every write can be checked against the
//! declared field types.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::catalog::EntityDefinition;
use crate::storage::error::{RowError, RowResult};
use crate::storage::types::{EntityName, Key};
use crate::storage::value::{Columns, Value};

static NEXT_INSTANCE: AtomicU64 = AtomicU64::new(1);

/// A row of an entity.
///
/// Rows are not `Clone`: each one has a process-unique instance id, and two
/// rows with the same id are the same object.
#[derive(Debug)]
pub struct Row {
    definition: Arc<EntityDefinition>,
    instance: u64,
    fields: Columns,
}

impl Row {
    /// create a detached row with the field defaults applied
    pub fn new(definition: Arc<EntityDefinition>) -> Self {
        let fields = definition
            .fields
            .iter()
            .map(|f| (f.name.clone(), f.initial_value()))
            .collect();
        Self::with_fields(definition, fields)
    }

    /// build a row from raw columns, the row factory contract
    ///
    /// every column must be a declared field and every value must fit (or be
    /// coercible to) the field type. fields left out get their initial value.
    pub fn from_columns(definition: Arc<EntityDefinition>, columns: Columns) -> RowResult<Self> {
        let mut fields = Columns::new();
        for (name, value) in columns {
            let value = coerce_field(&definition, &name, value)?;
            fields.insert(name, value);
        }
        for field in &definition.fields {
            fields
                .entry(field.name.clone())
                .or_insert_with(|| field.initial_value());
        }
        Ok(Self::with_fields(definition, fields))
    }

    fn with_fields(definition: Arc<EntityDefinition>, fields: Columns) -> Self {
        Self {
            definition,
            instance: NEXT_INSTANCE.fetch_add(1, Ordering::Relaxed),
            fields,
        }
    }

    /// snapshot of every field, the inverse of [`Row::from_columns`]
    pub fn to_columns(&self) -> Columns {
        self.fields.clone()
    }

    /// borrow the field map
    pub fn columns(&self) -> &Columns {
        &self.fields
    }

    /// get a field value by name
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// the current key, `None` while the key field is null
    pub fn key(&self) -> Option<Key> {
        self.fields.get(&self.definition.key).and_then(Key::from_value)
    }

    /// process-unique identity of this row object
    pub fn instance(&self) -> u64 {
        self.instance
    }

    pub fn entity(&self) -> &EntityName {
        &self.definition.name
    }

    pub fn definition(&self) -> &Arc<EntityDefinition> {
        &self.definition
    }

    /// write a field, returning the previous value
    ///
    /// the value is coerced to the declared type; required fields reject null.
    pub fn set(&mut self, field: &str, value: impl Into<Value>) -> RowResult<Value> {
        let value = coerce_field(&self.definition, field, value.into())?;
        if value.is_null() && self.definition.field(field).is_some_and(|f| f.required) {
            return Err(RowError::NullValue {
                entity: self.definition.name.clone(),
                field: field.to_string(),
            });
        }
        Ok(self.fields.insert(field.to_string(), value).unwrap_or_default())
    }

    /// check that the key and every required field hold a value
    pub fn check_required(&self) -> RowResult<()> {
        if self.key().is_none() {
            return Err(RowError::MissingKey(self.definition.name.clone()));
        }
        for field in self.definition.fields.iter().filter(|f| f.required) {
            if self.fields.get(&field.name).map_or(true, Value::is_null) {
                return Err(RowError::NullValue {
                    entity: self.definition.name.clone(),
                    field: field.name.clone(),
                });
            }
        }
        Ok(())
    }

    /// whether both rows hold the same field values
    pub fn same_values(&self, other: &Row) -> bool {
        self.fields == other.fields
    }

    /// replace the field values in place, keeping the instance
    pub(crate) fn replace_columns(&mut self, fields: Columns) {
        self.fields = fields;
    }
}

/// check a value against a declared field, coercing where possible
pub(crate) fn coerce_field(definition: &EntityDefinition, field: &str, value: Value) -> RowResult<Value> {
    let def = definition.field(field).ok_or_else(|| RowError::UnknownField {
        entity: definition.name.clone(),
        field: field.to_string(),
    })?;
    let actual = value.type_name();
    def.data_type
        .coerce(value)
        .ok_or_else(|| RowError::TypeMismatch {
            entity: definition.name.clone(),
            field: field.to_string(),
            expected: def.data_type.to_string(),
            actual: actual.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{DataType, EntityBuilder, FieldDef};

    fn goods() -> Arc<EntityDefinition> {
        Arc::new(
            EntityBuilder::new("goods")
                .key("id", DataType::Integer)
                .add_field("name", DataType::Text)
                .field(FieldDef::new("price", DataType::Float).with_default(0i64))
                .add_required_field("kind", DataType::Text)
                .build()
                .unwrap(),
        )
    }

    #[test]
    fn test_new_applies_defaults() {
        let row = Row::new(goods());
        assert_eq!(row.get("price"), Some(&Value::Float(0.0)));
        assert_eq!(row.get("name"), Some(&Value::Null));
        assert_eq!(row.key(), None);
    }

    #[test]
    fn test_from_columns_coerces() {
        let mut columns = Columns::new();
        columns.insert("id".to_string(), Value::Integer(1));
        columns.insert("price".to_string(), Value::Integer(12));
        let row = Row::from_columns(goods(), columns.clone()).unwrap();

        assert_eq!(row.key(), Some(Key::Integer(1)));
        assert_eq!(row.get("price"), Some(&Value::Float(12.0)));
        assert_eq!(row.to_columns().len(), 4);
    }

    #[test]
    fn test_from_columns_rejects_unknown_field() {
        let mut columns = Columns::new();
        columns.insert("colour".to_string(), Value::from("red"));
        let err = Row::from_columns(goods(), columns).unwrap_err();
        assert!(matches!(err, RowError::UnknownField { .. }));
    }

    #[test]
    fn test_set_validates_type() {
        let mut row = Row::new(goods());
        let old = row.set("name", "Good 1").unwrap();
        assert_eq!(old, Value::Null);

        let err = row.set("name", 5i64).unwrap_err();
        assert!(matches!(err, RowError::TypeMismatch { .. }));
        assert_eq!(row.get("name"), Some(&Value::from("Good 1")));

        let err = row.set("kind", Value::Null).unwrap_err();
        assert!(matches!(err, RowError::NullValue { .. }));
    }

    #[test]
    fn test_check_required() {
        let mut row = Row::new(goods());
        assert!(matches!(row.check_required(), Err(RowError::MissingKey(_))));

        row.set("id", 1i64).unwrap();
        assert!(matches!(row.check_required(), Err(RowError::NullValue { .. })));

        row.set("kind", "food").unwrap();
        assert!(row.check_required().is_ok());
    }

    #[test]
    fn test_instances_are_unique() {
        let a = Row::new(goods());
        let b = Row::new(goods());
        assert_ne!(a.instance(), b.instance());
        assert!(a.same_values(&b));
    }
}
