//! Shared fixtures for unit tests.

use crate::catalog::{Catalog, DataType, EntityBuilder, FieldDef, ParameterDef};
use crate::storage::{Columns, Value};

/// Goods, customers and their orders, plus a self-referencing category tree.
pub(crate) fn catalog() -> Catalog {
    let catalog = Catalog::new();
    catalog
        .register(
            EntityBuilder::new("goods")
                .key("id", DataType::Integer)
                .add_field("name", DataType::Text)
                .build()
                .unwrap(),
        )
        .unwrap();
    catalog
        .register(
            EntityBuilder::new("customers")
                .key("id", DataType::Integer)
                .add_field("name", DataType::Text)
                .build()
                .unwrap(),
        )
        .unwrap();
    catalog
        .register(
            EntityBuilder::new("orders")
                .key("id", DataType::Integer)
                .add_required_field("customer_id", DataType::Integer)
                .add_field("seller_id", DataType::Integer)
                .add_required_field("good_id", DataType::Integer)
                .add_field("comment", DataType::Text)
                .add_field("moment", DataType::Timestamp)
                .field(FieldDef::new("paid", DataType::Boolean).with_default(false))
                .add_field("summ", DataType::Float)
                .reference("customer", "customer_id", "customers", Some("orders"))
                .reference("seller", "seller_id", "customers", Some("sales"))
                .reference("good", "good_id", "goods", Some("orders"))
                .parameter(ParameterDef::new("customer", DataType::Integer).filtering("customer_id"))
                .build()
                .unwrap(),
        )
        .unwrap();
    catalog
        .register(
            EntityBuilder::new("categories")
                .key("id", DataType::Integer)
                .add_field("name", DataType::Text)
                .add_field("parent_id", DataType::Integer)
                .reference("parent", "parent_id", "categories", Some("children"))
                .build()
                .unwrap(),
        )
        .unwrap();
    catalog
        .register(
            EntityBuilder::new("reprice")
                .key("id", DataType::Integer)
                .parameter(ParameterDef::new("name", DataType::Text).with_default("repriced"))
                .read_only()
                .build()
                .unwrap(),
        )
        .unwrap();
    catalog.validate().unwrap();
    catalog
}

/// Build columns from field/value pairs.
pub(crate) fn columns<const N: usize>(pairs: [(&str, Value); N]) -> Columns {
    pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
}
