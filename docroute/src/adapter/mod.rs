//! Storage backends consumed by the router, the migration engine and the backup task.
//!
//! Every backend exposes the same small contract: read the whole document,
//! read one top-level key, write or delete keys, and write/delete/append records. Collections are
//! arrays of records addressed by their `id` field; singletons are plain objects.

mod file;
mod persist;
mod tree;

pub use file::FileStore;
pub use persist::atomic_write;
pub use tree::{TreeStore, DEFAULT_SINGLETON_NAMESPACE};

use crate::error::{DocRouteError, Result};
use async_trait::async_trait;
use serde_json::{Map, Value};

/// A backend-agnostic document store.
///
/// Implementations must be safe to share across tasks. The adapter is the
/// only arbiter of concurrent writes to the same record: last write wins.
#[async_trait]
pub trait DocumentAdapter: Send + Sync {
    /// The whole top-level object.
    async fn read_all(&self) -> Result<Map<String, Value>>;

    /// The value stored under one top-level key, `Ok(None)` if absent.
    async fn read_key(&self, key: &str) -> Result<Option<Value>>;

    /// One record of a collection, matched by id.
    async fn read_record(&self, collection: &str, id: &str) -> Result<Option<Value>>;

    /// Replace the whole value of a top-level key.
    async fn write_key(&self, key: &str, value: Value) -> Result<()>;

    /// Remove a whole top-level key. Returns whether it existed.
    async fn delete_key(&self, key: &str) -> Result<bool>;

    /// Replace (or create) the record with the given id. Returns the stored record.
    async fn write_record(&self, collection: &str, id: &str, record: Value) -> Result<Value>;

    /// Remove the record with the given id. Returns whether it existed.
    async fn delete_record(&self, collection: &str, id: &str) -> Result<bool>;

    /// Append a record that already carries its `id`. Returns the stored record.
    async fn append(&self, collection: &str, record: Value) -> Result<Value>;

    /// A human-readable name, used in logging.
    fn name(&self) -> &str;
}

/// The `id` of a record in string form. Numbers and strings are both accepted.
pub fn record_id(record: &Value) -> Option<String> {
    match record.get("id")? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Ensure `record` is an object and stamp `id` on it.
///
/// When `existing` is given its JSON type is kept, so a numeric id stays numeric
/// after a replace addressed through the string form of the URL.
pub(crate) fn stamp_id(mut record: Value, id: &str, existing: Option<&Value>) -> Result<Value> {
    let obj = record
        .as_object_mut()
        .ok_or_else(|| DocRouteError::InvalidRecord("record must be a JSON object".into()))?;
    let id_value = match existing {
        Some(v @ Value::Number(_)) => v.clone(),
        _ => Value::String(id.to_string()),
    };
    obj.insert("id".to_string(), id_value);
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_id_forms() {
        assert_eq!(record_id(&json!({"id": "abc"})), Some("abc".into()));
        assert_eq!(record_id(&json!({"id": 7})), Some("7".into()));
        assert_eq!(record_id(&json!({"id": null})), None);
        assert_eq!(record_id(&json!({"name": "x"})), None);
        assert_eq!(record_id(&json!([1, 2])), None);
    }

    #[test]
    fn test_stamp_id_keeps_numeric_type() {
        let stamped = stamp_id(json!({"name": "A"}), "1", Some(&json!(1))).unwrap();
        assert_eq!(stamped, json!({"name": "A", "id": 1}));

        let stamped = stamp_id(json!({"id": "other"}), "x1", None).unwrap();
        assert_eq!(stamped["id"], "x1");

        assert!(stamp_id(json!("scalar"), "1", None).is_err());
    }
}
