//! Conversion between stores and structured documents.
//!
//! Objects/tables become interior nodes (key order preserved), scalars become
//! scalar leaves, arrays of scalars become vectors and arrays of arrays become
//! matrices. Arrays of objects become interior nodes named `"0"`, `"1"`, ...
//! `null` entries are skipped.

use super::{join_path, ConfigurationStore, NodeId, NodeKind, StoreError, StoreResult};
use crate::types::{Scalar, Value};

/// Intermediate shape shared by the JSON and TOML readers.
enum Element {
    Table(Vec<(String, Element)>),
    List(Vec<Element>),
    Scalar(Scalar),
    Null,
}

impl From<&serde_json::Value> for Element {
    fn from(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Element::Null,
            serde_json::Value::Bool(b) => Element::Scalar(Scalar::Bool(*b)),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Element::Scalar(Scalar::Int(i))
                } else if let Some(u) = n.as_u64() {
                    Element::Scalar(Scalar::UInt(u))
                } else {
                    Element::Scalar(Scalar::Float(n.as_f64().unwrap_or(f64::NAN)))
                }
            }
            serde_json::Value::String(s) => Element::Scalar(Scalar::Text(s.clone())),
            serde_json::Value::Array(items) => {
                Element::List(items.iter().map(Element::from).collect())
            }
            serde_json::Value::Object(map) => Element::Table(
                map.iter()
                    .map(|(k, v)| (k.clone(), Element::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<&toml::Value> for Element {
    fn from(value: &toml::Value) -> Self {
        match value {
            toml::Value::Boolean(b) => Element::Scalar(Scalar::Bool(*b)),
            toml::Value::Integer(i) => Element::Scalar(Scalar::Int(*i)),
            toml::Value::Float(f) => Element::Scalar(Scalar::Float(*f)),
            toml::Value::String(s) => Element::Scalar(Scalar::Text(s.clone())),
            toml::Value::Datetime(d) => Element::Scalar(Scalar::Text(d.to_string())),
            toml::Value::Array(items) => {
                Element::List(items.iter().map(Element::from).collect())
            }
            toml::Value::Table(table) => Element::Table(
                table
                    .iter()
                    .map(|(k, v)| (k.clone(), Element::from(v)))
                    .collect(),
            ),
        }
    }
}

fn list_to_value(items: &[Element], path: &str) -> StoreResult<Value> {
    let scalars = |row: &[Element]| -> StoreResult<Vec<Scalar>> {
        row.iter()
            .map(|e| match e {
                Element::Scalar(s) => Ok(s.clone()),
                _ => Err(StoreError::UnsupportedValue(path.to_string())),
            })
            .collect()
    };

    if !items.is_empty() && items.iter().all(|e| matches!(e, Element::List(_))) {
        let rows = items
            .iter()
            .map(|e| match e {
                Element::List(row) => scalars(row),
                _ => Err(StoreError::UnsupportedValue(path.to_string())),
            })
            .collect::<StoreResult<Vec<_>>>()?;
        return Ok(Value::Matrix(rows));
    }
    Ok(Value::Vector(scalars(items)?))
}

fn insert(
    store: &mut ConfigurationStore,
    parent: NodeId,
    name: &str,
    element: &Element,
) -> StoreResult<()> {
    match element {
        Element::Null => Ok(()),
        Element::Scalar(s) => store.write(parent, name, Value::Scalar(s.clone())).map(|_| ()),
        Element::Table(entries) => {
            let node = store.create_node(parent, name, NodeKind::Interior)?;
            for (key, value) in entries {
                insert(store, node, key, value)?;
            }
            Ok(())
        }
        Element::List(items)
            if !items.is_empty() && items.iter().all(|e| matches!(e, Element::Table(_))) =>
        {
            let node = store.create_node(parent, name, NodeKind::Interior)?;
            for (index, item) in items.iter().enumerate() {
                insert(store, node, &index.to_string(), item)?;
            }
            Ok(())
        }
        Element::List(items) => {
            let path = join_path(&store.path(parent), name);
            let value = list_to_value(items, &path)?;
            store.write(parent, name, value).map(|_| ())
        }
    }
}

fn from_element(element: &Element) -> StoreResult<ConfigurationStore> {
    let Element::Table(entries) = element else {
        return Err(StoreError::NotInterior("<document root>".to_string()));
    };
    let mut store = ConfigurationStore::new();
    for (key, value) in entries {
        insert(&mut store, ConfigurationStore::ROOT, key, value)?;
    }
    Ok(store)
}

/// Build a store from a JSON document whose root is an object.
pub fn from_json(value: &serde_json::Value) -> StoreResult<ConfigurationStore> {
    from_element(&Element::from(value))
}

/// Build a store from a TOML document.
pub fn from_toml(value: &toml::Value) -> StoreResult<ConfigurationStore> {
    from_element(&Element::from(value))
}

fn scalar_to_json(scalar: &Scalar) -> serde_json::Value {
    match scalar {
        Scalar::Bool(b) => serde_json::Value::Bool(*b),
        Scalar::Int(i) => serde_json::Value::from(*i),
        Scalar::UInt(u) => serde_json::Value::from(*u),
        Scalar::Float(f) => serde_json::Number::from_f64(*f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Scalar::Text(text) => serde_json::Value::String(text.clone()),
    }
}

fn value_to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Scalar(s) => scalar_to_json(s),
        Value::Vector(items) => items.iter().map(scalar_to_json).collect(),
        Value::Matrix(rows) => rows
            .iter()
            .map(|row| row.iter().map(scalar_to_json).collect::<serde_json::Value>())
            .collect(),
    }
}

/// Render the subtree below `id` as JSON.
pub fn node_to_json(store: &ConfigurationStore, id: NodeId) -> serde_json::Value {
    if store.is_leaf(id) {
        return store
            .value(id)
            .map(value_to_json)
            .unwrap_or(serde_json::Value::Null);
    }
    let mut map = serde_json::Map::new();
    for child in store.children(id) {
        let name = store.name(child).unwrap_or("").to_string();
        map.insert(name, node_to_json(store, child));
    }
    serde_json::Value::Object(map)
}

/// Render a whole store as a JSON object.
pub fn to_json(store: &ConfigurationStore) -> serde_json::Value {
    node_to_json(store, ConfigurationStore::ROOT)
}
