//! Permission table: normalized path → [`PermissionRecord`].
//!
//! A table is built once per fetch and then only read. Callers swap whole
//! tables (behind an `Arc`) rather than editing entries in place.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::path::normalize_path;
use crate::permissions::PermissionRecord;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PermissionTableError {
    #[error("permission table must be a JSON object, got {0}")]
    NotAnObject(&'static str),

    #[error("permission key {0:?} is empty after normalization")]
    EmptyKey(String),

    #[error("permission keys {first:?} and {second:?} normalize to the same path")]
    DuplicateKey { first: String, second: String },

    #[error("permission entry {key:?} must be an object")]
    EntryNotAnObject { key: String },

    #[error("permission entry {key:?} has non-boolean flag {flag:?}")]
    InvalidFlag { key: String, flag: &'static str },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct PermissionTable {
    entries: BTreeMap<String, PermissionRecord>,
}

impl PermissionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table from `(path, record)` pairs, normalizing every key.
    pub fn from_entries<I, K>(entries: I) -> Result<Self, PermissionTableError>
    where
        I: IntoIterator<Item = (K, PermissionRecord)>,
        K: AsRef<str>,
    {
        let mut table = Self::new();
        let mut originals: BTreeMap<String, String> = BTreeMap::new();

        for (raw, record) in entries {
            let raw = raw.as_ref();
            let key = normalize_path(raw);
            if key.is_empty() {
                return Err(PermissionTableError::EmptyKey(raw.to_string()));
            }
            if let Some(first) = originals.get(key) {
                return Err(PermissionTableError::DuplicateKey {
                    first: first.clone(),
                    second: raw.to_string(),
                });
            }
            originals.insert(key.to_string(), raw.to_string());
            table.entries.insert(key.to_string(), record);
        }

        Ok(table)
    }

    /// Validate the raw `permissoes` payload returned by the Auth API.
    ///
    /// `null` is accepted as an empty table.
    pub fn from_wire(value: &Value) -> Result<Self, PermissionTableError> {
        let object = match value {
            Value::Object(map) => map,
            Value::Null => return Ok(Self::new()),
            other => return Err(PermissionTableError::NotAnObject(json_kind(other))),
        };

        let mut records = Vec::with_capacity(object.len());
        for (key, entry) in object {
            records.push((key.as_str(), parse_record(key, entry)?));
        }
        Self::from_entries(records)
    }

    pub fn get(&self, normalized: &str) -> Option<&PermissionRecord> {
        self.entries.get(normalized)
    }

    pub fn contains(&self, normalized: &str) -> bool {
        self.entries.contains_key(normalized)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in ascending key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &PermissionRecord)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

fn parse_record(key: &str, entry: &Value) -> Result<PermissionRecord, PermissionTableError> {
    let Value::Object(fields) = entry else {
        return Err(PermissionTableError::EntryNotAnObject {
            key: key.to_string(),
        });
    };

    let flag = |name: &'static str| -> Result<bool, PermissionTableError> {
        match fields.get(name) {
            None | Some(Value::Null) => Ok(false),
            Some(Value::Bool(b)) => Ok(*b),
            Some(_) => Err(PermissionTableError::InvalidFlag {
                key: key.to_string(),
                flag: name,
            }),
        }
    };

    Ok(PermissionRecord {
        view: flag("view")?,
        create: flag("create")?,
        update: flag("update")?,
        delete: flag("delete")?,
    })
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn from_wire_normalizes_keys() {
        let table = PermissionTable::from_wire(&json!({
            "/dashboard/": {"view": true},
            "courses/categories": {"view": true, "create": true, "update": false, "delete": false},
        }))
        .unwrap();

        assert_eq!(table.len(), 2);
        assert!(table.contains("dashboard"));
        assert!(table.get("courses/categories").unwrap().create);
    }

    #[test]
    fn from_wire_rejects_duplicate_after_normalization() {
        let err = PermissionTable::from_wire(&json!({
            "dashboard": {"view": true},
            "/dashboard": {"view": false},
        }))
        .unwrap_err();

        assert!(matches!(err, PermissionTableError::DuplicateKey { .. }));
    }

    #[test]
    fn from_wire_rejects_non_boolean_flags() {
        let err = PermissionTable::from_wire(&json!({
            "dashboard": {"view": "yes"},
        }))
        .unwrap_err();

        assert_eq!(
            err,
            PermissionTableError::InvalidFlag {
                key: "dashboard".to_string(),
                flag: "view",
            }
        );
    }

    #[test]
    fn from_wire_rejects_empty_keys_and_bad_shapes() {
        assert!(matches!(
            PermissionTable::from_wire(&json!({"/": {"view": true}})),
            Err(PermissionTableError::EmptyKey(_))
        ));
        assert!(matches!(
            PermissionTable::from_wire(&json!(["dashboard"])),
            Err(PermissionTableError::NotAnObject("an array"))
        ));
        assert!(matches!(
            PermissionTable::from_wire(&json!({"dashboard": true})),
            Err(PermissionTableError::EntryNotAnObject { .. })
        ));
    }

    #[test]
    fn null_payload_is_an_empty_table() {
        assert!(PermissionTable::from_wire(&Value::Null).unwrap().is_empty());
    }
}
