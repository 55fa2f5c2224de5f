//! JSON wire codec for change batches.
//!
//! A batch is an array of records:
//!
//! ```text
//! [{"kind": "insert", "entity": "goods", "data": {"id": 1, "name": "Good 1"}},
//!  {"kind": "update", "entity": "goods", "keys": {"id": 1}, "data": {"name": "Good 2"}},
//!  {"kind": "delete", "entity": "goods", "keys": {"id": 1}},
//!  {"kind": "command", "entity": "reprice", "parameters": {"factor": 1.1}}]
//! ```

use serde_json::{Map, Value as Json};

use super::change::{Change, ChangeKind};
use super::error::{DecodeError, DecodeResult};
use crate::catalog::{Catalog, DataType, EntityDefinition};
use crate::storage::{Columns, EntityName, Value};

/// Encode a batch into its wire form.
///
/// Timestamps are written as RFC 3339 text. Only a decoder built with
/// [`ChangeDecoder::with_catalog`] turns them back into timestamps, so a
/// round trip through [`ChangeDecoder::untyped`] is not exact for them.
pub fn encode(changes: &[Change]) -> Json {
    Json::Array(changes.iter().map(encode_change).collect())
}

/// Encode a batch as a compact JSON string.
pub fn to_json_string(changes: &[Change]) -> String {
    encode(changes).to_string()
}

fn encode_change(change: &Change) -> Json {
    let mut record = Map::new();
    record.insert("kind".to_string(), Json::from(change.kind().as_str()));
    record.insert("entity".to_string(), Json::from(change.entity().as_str()));
    match change {
        Change::Insert { data, .. } => {
            record.insert("data".to_string(), encode_columns(data));
        }
        Change::Update { keys, data, .. } => {
            record.insert("keys".to_string(), encode_columns(keys));
            record.insert("data".to_string(), encode_columns(data));
        }
        Change::Delete { keys, .. } => {
            record.insert("keys".to_string(), encode_columns(keys));
        }
        Change::Command { parameters, filter, .. } => {
            record.insert("parameters".to_string(), encode_columns(parameters));
            if let Some(filter) = filter {
                record.insert("filter".to_string(), Json::from(filter.as_str()));
            }
        }
    }
    Json::Object(record)
}

fn encode_columns(columns: &Columns) -> Json {
    Json::Object(columns.iter().map(|(k, v)| (k.clone(), v.to_json())).collect())
}

/// Decodes change batches, optionally reviving values by declared type.
///
/// Without a catalog, values map by their JSON shape and timestamps stay
/// text, so encoded timestamps do not round-trip exactly. With one, each
/// value is converted to its field's declared type and unknown entities and
/// fields are rejected; batches from [`encode`] then decode to equal changes.
#[derive(Debug, Clone, Copy)]
pub struct ChangeDecoder<'a> {
    catalog: Option<&'a Catalog>,
}

impl ChangeDecoder<'static> {
    pub fn untyped() -> Self {
        Self { catalog: None }
    }
}

impl<'a> ChangeDecoder<'a> {
    pub fn with_catalog(catalog: &'a Catalog) -> Self {
        Self {
            catalog: Some(catalog),
        }
    }

    /// Decode a batch from a JSON string.
    pub fn decode_str(&self, json: &str) -> DecodeResult<Vec<Change>> {
        let value: Json = serde_json::from_str(json)?;
        self.decode_value(&value)
    }

    /// Decode a batch from parsed JSON.
    ///
    /// The first invalid record fails the whole batch.
    pub fn decode_value(&self, json: &Json) -> DecodeResult<Vec<Change>> {
        let records = json.as_array().ok_or(DecodeError::NotAnArray)?;
        records
            .iter()
            .enumerate()
            .map(|(index, record)| self.decode_record(index, record))
            .collect()
    }

    fn decode_record(&self, index: usize, record: &Json) -> DecodeResult<Change> {
        let record = record.as_object().ok_or_else(|| DecodeError::InvalidRecord {
            index,
            reason: "record is not an object".to_string(),
        })?;

        let kind = match record.get("kind") {
            Some(Json::String(kind)) => kind
                .parse::<ChangeKind>()
                .map_err(|kind| DecodeError::UnknownKind { index, kind })?,
            Some(other) => {
                return Err(DecodeError::UnknownKind {
                    index,
                    kind: other.to_string(),
                })
            }
            None => return Err(DecodeError::MissingDiscriminator { index }),
        };

        let raw_entity = match record.get("entity") {
            Some(Json::String(entity)) => entity.as_str(),
            _ => return Err(DecodeError::MissingEntity { index }),
        };
        let entity = EntityName::new(raw_entity).map_err(|_| DecodeError::UnknownEntity {
            index,
            entity: raw_entity.to_string(),
        })?;
        let definition = match self.catalog {
            Some(catalog) => Some(catalog.get(raw_entity).map_err(|_| DecodeError::UnknownEntity {
                index,
                entity: raw_entity.to_string(),
            })?),
            None => None,
        };

        let ctx = RecordContext {
            index,
            entity: &entity,
            definition: definition.as_deref(),
        };

        match kind {
            ChangeKind::Insert => Ok(Change::Insert {
                data: ctx.section(record, "data", Section::Fields)?,
                entity,
            }),
            ChangeKind::Update => {
                let keys = ctx.keys(record)?;
                Ok(Change::Update {
                    data: ctx.section(record, "data", Section::Fields)?,
                    keys,
                    entity,
                })
            }
            ChangeKind::Delete => Ok(Change::Delete {
                keys: ctx.keys(record)?,
                entity,
            }),
            ChangeKind::Command => {
                let filter = match record.get("filter") {
                    None | Some(Json::Null) => None,
                    Some(Json::String(filter)) => Some(filter.clone()),
                    Some(_) => {
                        return Err(DecodeError::InvalidRecord {
                            index,
                            reason: "filter is not a string".to_string(),
                        })
                    }
                };
                Ok(Change::Command {
                    parameters: ctx.section(record, "parameters", Section::Parameters)?,
                    filter,
                    entity,
                })
            }
        }
    }
}

#[derive(Clone, Copy)]
enum Section {
    Fields,
    Parameters,
}

struct RecordContext<'r> {
    index: usize,
    entity: &'r EntityName,
    definition: Option<&'r EntityDefinition>,
}

impl RecordContext<'_> {
    /// Decode the `keys` section, which must name at least the key field.
    fn keys(&self, record: &Map<String, Json>) -> DecodeResult<Columns> {
        let keys = self.section(record, "keys", Section::Fields)?;
        let missing = match self.definition {
            Some(definition) => keys.get(&definition.key).map_or(true, Value::is_null),
            None => keys.is_empty(),
        };
        if missing {
            return Err(DecodeError::MissingKeys {
                index: self.index,
                entity: self.entity.to_string(),
            });
        }
        Ok(keys)
    }

    /// Decode an object section. An absent section is empty.
    fn section(&self, record: &Map<String, Json>, name: &str, section: Section) -> DecodeResult<Columns> {
        let object = match record.get(name) {
            None | Some(Json::Null) => return Ok(Columns::new()),
            Some(Json::Object(object)) => object,
            Some(_) => {
                return Err(DecodeError::InvalidRecord {
                    index: self.index,
                    reason: format!("'{}' is not an object", name),
                })
            }
        };

        object
            .iter()
            .map(|(field, raw)| Ok((field.clone(), self.value(field, raw, section)?)))
            .collect()
    }

    fn value(&self, field: &str, raw: &Json, section: Section) -> DecodeResult<Value> {
        if raw.is_array() || raw.is_object() {
            return Err(DecodeError::UnsupportedValue {
                index: self.index,
                entity: self.entity.to_string(),
                field: field.to_string(),
                raw: raw.to_string(),
            });
        }

        let Some(definition) = self.definition else {
            return Value::from_json(raw).ok_or_else(|| self.unsupported(field, raw));
        };

        let declared = match section {
            Section::Fields => definition.field(field).map(|f| f.data_type),
            Section::Parameters => definition.parameter(field).map(|p| p.data_type),
        };
        let data_type = declared.ok_or_else(|| DecodeError::UnknownField {
            index: self.index,
            entity: self.entity.to_string(),
            field: field.to_string(),
        })?;

        self.revive(field, raw, data_type)
    }

    /// Convert a raw JSON scalar to the declared type.
    fn revive(&self, field: &str, raw: &Json, data_type: DataType) -> DecodeResult<Value> {
        let value = Value::from_json(raw).ok_or_else(|| self.unsupported(field, raw))?;
        if value.is_null() {
            return Ok(value);
        }

        let timestamp_source = matches!(value, Value::Text(_) | Value::Integer(_));
        match data_type.coerce(value) {
            Some(value) => Ok(value),
            None if data_type == DataType::Timestamp && timestamp_source => {
                Err(DecodeError::InvalidTimestamp {
                    index: self.index,
                    entity: self.entity.to_string(),
                    field: field.to_string(),
                    raw: raw.to_string(),
                })
            }
            None => Err(DecodeError::TypeMismatch {
                index: self.index,
                entity: self.entity.to_string(),
                field: field.to_string(),
                expected: data_type.to_string(),
                raw: raw.to_string(),
            }),
        }
    }

    fn unsupported(&self, field: &str, raw: &Json) -> DecodeError {
        DecodeError::UnsupportedValue {
            index: self.index,
            entity: self.entity.to_string(),
            field: field.to_string(),
            raw: raw.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Key;
    use crate::testing;
    use serde_json::json;

    #[test]
    fn test_decode_example_record() {
        let changes = ChangeDecoder::untyped()
            .decode_str(r#"[{"kind":"insert","entity":"goods","data":{"id":1,"name":"Good 1"}}]"#)
            .unwrap();

        assert_eq!(changes.len(), 1);
        let Change::Insert { entity, data } = &changes[0] else {
            panic!("expected an insert, got {:?}", changes[0]);
        };
        assert_eq!(entity.as_str(), "goods");
        assert_eq!(data.get("id"), Some(&Value::Integer(1)));
        assert_eq!(data.get("name"), Some(&Value::from("Good 1")));
    }

    #[test]
    fn test_unknown_kind_fails_whole_batch() {
        let json = json!([
            {"kind": "insert", "entity": "goods", "data": {"id": 1}},
            {"kind": "upsert", "entity": "goods", "data": {"id": 2}}
        ]);
        let err = ChangeDecoder::untyped().decode_value(&json).unwrap_err();

        assert!(matches!(err, DecodeError::UnknownKind { index: 1, ref kind } if kind == "upsert"));
        assert_eq!(err.index(), Some(1));
    }

    #[test]
    fn test_kind_case_insensitive_and_defaults() {
        let json = json!([
            {"kind": "Command", "entity": "reprice"},
            {"kind": "DELETE", "entity": "goods", "keys": {"id": 4}}
        ]);
        let changes = ChangeDecoder::untyped().decode_value(&json).unwrap();

        assert_eq!(
            changes[0],
            Change::Command {
                entity: EntityName::new("reprice").unwrap(),
                parameters: Columns::new(),
                filter: None,
            }
        );
        assert_eq!(changes[1].keys().unwrap().get("id"), Some(&Key::Integer(4).to_value()));
    }

    #[test]
    fn test_structural_errors() {
        let decoder = ChangeDecoder::untyped();

        assert!(matches!(decoder.decode_str("{oops"), Err(DecodeError::Json(_))));
        assert!(matches!(decoder.decode_value(&json!({})), Err(DecodeError::NotAnArray)));
        assert!(matches!(
            decoder.decode_value(&json!([1])),
            Err(DecodeError::InvalidRecord { index: 0, .. })
        ));
        assert!(matches!(
            decoder.decode_value(&json!([{"entity": "goods"}])),
            Err(DecodeError::MissingDiscriminator { index: 0 })
        ));
        assert!(matches!(
            decoder.decode_value(&json!([{"kind": "insert"}])),
            Err(DecodeError::MissingEntity { index: 0 })
        ));
        assert!(matches!(
            decoder.decode_value(&json!([{"kind": "update", "entity": "goods", "data": {"name": "x"}}])),
            Err(DecodeError::MissingKeys { index: 0, .. })
        ));
        assert!(matches!(
            decoder.decode_value(&json!([{"kind": "insert", "entity": "goods", "data": {"tags": [1, 2]}}])),
            Err(DecodeError::UnsupportedValue { index: 0, .. })
        ));
    }

    #[test]
    fn test_untyped_keeps_timestamps_as_text() {
        let json = json!([{"kind": "insert", "entity": "orders",
            "data": {"moment": "2012-08-27T11:42:15.514Z"}}]);
        let changes = ChangeDecoder::untyped().decode_value(&json).unwrap();

        let data = changes[0].data().unwrap();
        assert_eq!(data.get("moment"), Some(&Value::from("2012-08-27T11:42:15.514Z")));
    }

    #[test]
    fn test_catalog_revives_declared_types() {
        let catalog = testing::catalog();
        let json = json!([
            {"kind": "insert", "entity": "orders", "data": {
                "id": 10, "customer_id": 1, "good_id": 2,
                "moment": "2012-08-27T11:42:15.514Z", "summ": 56, "paid": true
            }},
            {"kind": "update", "entity": "orders", "keys": {"id": 10},
                "data": {"moment": 1346067735514i64}}
        ]);
        let changes = ChangeDecoder::with_catalog(&catalog).decode_value(&json).unwrap();

        let inserted = changes[0].data().unwrap();
        let moment = inserted.get("moment").unwrap().as_timestamp().unwrap();
        assert_eq!(moment.timestamp_millis(), 1_346_067_735_514);
        assert_eq!(inserted.get("summ"), Some(&Value::Float(56.0)));

        let updated = changes[1].data().unwrap();
        assert_eq!(updated.get("moment"), inserted.get("moment"));
    }

    #[test]
    fn test_catalog_rejects_unknown_names() {
        let catalog = testing::catalog();
        let decoder = ChangeDecoder::with_catalog(&catalog);

        assert!(matches!(
            decoder.decode_value(&json!([{"kind": "insert", "entity": "invoices", "data": {}}])),
            Err(DecodeError::UnknownEntity { index: 0, .. })
        ));
        assert!(matches!(
            decoder.decode_value(&json!([{"kind": "insert", "entity": "goods", "data": {"colour": "red"}}])),
            Err(DecodeError::UnknownField { index: 0, .. })
        ));
        assert!(matches!(
            decoder.decode_value(&json!([{"kind": "delete", "entity": "goods", "keys": {"title": "x"}}])),
            Err(DecodeError::UnknownField { index: 0, .. })
        ));
    }

    #[test]
    fn test_catalog_value_errors() {
        let catalog = testing::catalog();
        let decoder = ChangeDecoder::with_catalog(&catalog);

        let err = decoder
            .decode_value(&json!([{"kind": "insert", "entity": "orders", "data": {"moment": "last tuesday"}}]))
            .unwrap_err();
        assert!(matches!(err, DecodeError::InvalidTimestamp { ref field, .. } if field == "moment"));

        let err = decoder
            .decode_value(&json!([{"kind": "insert", "entity": "orders", "data": {"paid": "yes"}}]))
            .unwrap_err();
        assert!(matches!(err, DecodeError::TypeMismatch { ref expected, .. } if expected == "boolean"));
    }

    #[test]
    fn test_encode_wire_shape() {
        let mut data = Columns::new();
        data.insert("id".to_string(), Value::Integer(1));
        data.insert("name".to_string(), Value::from("Good 1"));
        let changes = vec![Change::Insert {
            entity: EntityName::new("goods").unwrap(),
            data,
        }];

        assert_eq!(
            encode(&changes),
            json!([{"kind": "insert", "entity": "goods", "data": {"id": 1, "name": "Good 1"}}])
        );

        let decoded = ChangeDecoder::untyped().decode_str(&to_json_string(&changes)).unwrap();
        assert_eq!(decoded, changes);
    }

    #[test]
    fn test_float_precision_survives_wire() {
        let mut data = Columns::new();
        data.insert("summ".to_string(), Value::Float(78.9000015258789));
        let changes = vec![Change::Insert {
            entity: EntityName::new("orders").unwrap(),
            data,
        }];

        let decoded = ChangeDecoder::untyped().decode_str(&to_json_string(&changes)).unwrap();
        assert_eq!(decoded[0].data().unwrap().get("summ"), Some(&Value::Float(78.9000015258789)));
    }

    #[test]
    fn test_mixed_batch_round_trip() {
        let catalog = testing::catalog();
        let entity = EntityName::new("orders").unwrap();
        let moment = Value::from_epoch_millis(1_346_067_735_514).unwrap();

        let mut data = Columns::new();
        data.insert("id".to_string(), Value::Integer(10));
        data.insert("customer_id".to_string(), Value::Integer(3));
        data.insert("good_id".to_string(), Value::Integer(1));
        data.insert("summ".to_string(), Value::Float(78.9000015258789));
        data.insert("paid".to_string(), Value::Boolean(true));
        data.insert("moment".to_string(), moment.clone());
        data.insert("comment".to_string(), Value::Null);

        let mut keys = Columns::new();
        keys.insert("id".to_string(), Value::Integer(10));
        let mut changed = Columns::new();
        changed.insert("moment".to_string(), moment.clone());
        changed.insert("paid".to_string(), Value::Boolean(false));

        let changes = vec![
            Change::Insert { entity: entity.clone(), data },
            Change::Update { entity: entity.clone(), keys: keys.clone(), data: changed },
            Change::Delete { entity, keys },
        ];

        let wire = to_json_string(&changes);
        let decoded = ChangeDecoder::with_catalog(&catalog).decode_str(&wire).unwrap();
        assert_eq!(decoded, changes);

        // without a catalog the timestamp comes back as its text form
        let untyped = ChangeDecoder::untyped().decode_str(&wire).unwrap();
        assert_eq!(
            untyped[0].data().unwrap().get("moment"),
            Some(&Value::from("2012-08-27T11:42:15.514Z"))
        );
        assert_ne!(untyped, changes);
    }
}
