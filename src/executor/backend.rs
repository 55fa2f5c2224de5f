//! The persistence executor contract.

use std::future::Future;

use super::error::{BackendResult, ParameterError};
use crate::catalog::EntityDefinition;
use crate::changes::Change;
use crate::storage::{Columns, Value};

/// Query parameter values, keyed by placeholder name.
pub type Parameters = Columns;

/// Reads entity rows and applies change batches.
///
/// Implementations must apply a batch atomically: either every change takes
/// effect and the affected-row total is returned, or none does.
pub trait Backend: Send + Sync {
    /// Run the entity's query with resolved parameters.
    fn read(
        &self,
        definition: &EntityDefinition,
        parameters: &Parameters,
    ) -> impl Future<Output = BackendResult<Vec<Columns>>> + Send;

    /// Apply a batch in order and report the number of affected rows.
    fn submit(&self, changes: &[Change]) -> impl Future<Output = BackendResult<usize>> + Send;
}

/// Resolve caller parameters against the entity's placeholders.
///
/// Every supplied name must be declared. Placeholders left out take their
/// default, and every value is coerced to the declared type.
pub fn resolve_parameters(
    definition: &EntityDefinition,
    supplied: &Parameters,
) -> Result<Parameters, ParameterError> {
    if let Some(unknown) = supplied.keys().find(|name| definition.parameter(name).is_none()) {
        return Err(ParameterError::Unknown {
            entity: definition.name.to_string(),
            parameter: unknown.clone(),
        });
    }

    definition
        .parameters
        .iter()
        .map(|param| {
            let value = supplied
                .get(&param.name)
                .cloned()
                .unwrap_or_else(|| param.default.clone());
            let actual = value.type_name();
            let value = param.data_type.coerce(value).ok_or_else(|| ParameterError::TypeMismatch {
                entity: definition.name.to_string(),
                parameter: param.name.clone(),
                expected: param.data_type.to_string(),
                actual: actual.to_string(),
            })?;
            Ok((param.name.clone(), value))
        })
        .collect()
}

/// Whether a row passes the equality filters of its bound parameters.
///
/// Null parameter values do not filter.
pub fn matches_parameters(definition: &EntityDefinition, row: &Columns, parameters: &Parameters) -> bool {
    definition.parameters.iter().all(|param| {
        let Some(field) = &param.field else {
            return true;
        };
        match parameters.get(&param.name) {
            None | Some(Value::Null) => true,
            Some(expected) => row.get(field) == Some(expected),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{DataType, EntityBuilder, ParameterDef};

    fn orders() -> EntityDefinition {
        EntityBuilder::new("orders")
            .key("id", DataType::Integer)
            .add_field("customer_id", DataType::Integer)
            .add_field("summ", DataType::Float)
            .parameter(ParameterDef::new("customer", DataType::Integer).filtering("customer_id"))
            .parameter(ParameterDef::new("threshold", DataType::Float).with_default(10i64))
            .build()
            .unwrap()
    }

    #[test]
    fn test_defaults_fill_gaps() {
        let resolved = resolve_parameters(&orders(), &Parameters::new()).unwrap();
        assert_eq!(resolved.get("customer"), Some(&Value::Null));
        assert_eq!(resolved.get("threshold"), Some(&Value::Float(10.0)));
    }

    #[test]
    fn test_supplied_values_are_coerced() {
        let mut supplied = Parameters::new();
        supplied.insert("threshold".to_string(), Value::Integer(3));
        let resolved = resolve_parameters(&orders(), &supplied).unwrap();
        assert_eq!(resolved.get("threshold"), Some(&Value::Float(3.0)));

        supplied.insert("customer".to_string(), Value::from("seven"));
        let err = resolve_parameters(&orders(), &supplied).unwrap_err();
        assert!(matches!(err, ParameterError::TypeMismatch { .. }));
    }

    #[test]
    fn test_unknown_parameter() {
        let mut supplied = Parameters::new();
        supplied.insert("limit".to_string(), Value::Integer(3));
        let err = resolve_parameters(&orders(), &supplied).unwrap_err();
        assert_eq!(
            err,
            ParameterError::Unknown {
                entity: "orders".to_string(),
                parameter: "limit".to_string()
            }
        );
    }

    #[test]
    fn test_matches_bound_parameters() {
        let def = orders();
        let mut row = Columns::new();
        row.insert("customer_id".to_string(), Value::Integer(1));

        let mut params = resolve_parameters(&def, &Parameters::new()).unwrap();
        assert!(matches_parameters(&def, &row, &params));

        params.insert("customer".to_string(), Value::Integer(2));
        assert!(!matches_parameters(&def, &row, &params));

        params.insert("customer".to_string(), Value::Integer(1));
        assert!(matches_parameters(&def, &row, &params));
    }
}
