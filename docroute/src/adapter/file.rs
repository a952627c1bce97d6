use super::persist::atomic_write;
use super::{record_id, stamp_id, DocumentAdapter};
use crate::error::{DocRouteError, Result};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

/// A flat-file store: one JSON object on disk, held in memory.
/// Every mutation rewrites the whole file atomically.
pub struct FileStore {
    path: PathBuf,
    data: RwLock<Map<String, Value>>,
}

impl FileStore {
    /// Open the file at `path`. A missing file starts as an empty object and is
    /// created on the first write; a file whose root is not an object is an error.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let data = match tokio::fs::read(&path).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Map::new(),
            Ok(bytes) => match serde_json::from_slice::<Value>(&bytes)? {
                Value::Object(map) => map,
                _ => {
                    return Err(DocRouteError::Storage(format!(
                        "{} must contain a JSON object at the root",
                        path.display()
                    )))
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::warn!("Store file {} not found, starting empty", path.display());
                Map::new()
            }
            Err(e) => return Err(e.into()),
        };

        Ok(FileStore {
            path,
            data: RwLock::new(data),
        })
    }

    /// Create a store seeded with `document`, writing it to `path` immediately.
    pub async fn create(path: impl AsRef<Path>, document: Map<String, Value>) -> Result<Self> {
        let store = FileStore {
            path: path.as_ref().to_path_buf(),
            data: RwLock::new(document),
        };
        let data = store.data.read().await;
        store.save(&data).await?;
        drop(data);
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn save(&self, data: &Map<String, Value>) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(data)?;
        atomic_write(&self.path, bytes).await
    }

    /// Apply `f` to a copy of the document and persist it. The in-memory state
    /// only changes once the file write succeeded.
    async fn mutate<T>(
        &self,
        f: impl FnOnce(&mut Map<String, Value>) -> Result<Option<T>>,
    ) -> Result<Option<T>> {
        let mut guard = self.data.write().await;
        let mut next = guard.clone();
        let out = f(&mut next)?;
        if out.is_some() {
            self.save(&next).await?;
            *guard = next;
        }
        Ok(out)
    }
}

fn records<'a>(data: &'a Map<String, Value>, collection: &str) -> Result<Option<&'a Vec<Value>>> {
    match data.get(collection) {
        None => Ok(None),
        Some(Value::Array(items)) => Ok(Some(items)),
        Some(_) => Err(shape_mismatch(collection)),
    }
}

fn records_mut<'a>(data: &'a mut Map<String, Value>, collection: &str) -> Result<&'a mut Vec<Value>> {
    match data
        .entry(collection.to_string())
        .or_insert_with(|| Value::Array(Vec::new()))
    {
        Value::Array(items) => Ok(items),
        _ => Err(shape_mismatch(collection)),
    }
}

fn position(items: &[Value], id: &str) -> Option<usize> {
    items.iter().position(|r| record_id(r).as_deref() == Some(id))
}

fn shape_mismatch(key: &str) -> DocRouteError {
    DocRouteError::ShapeMismatch {
        key: key.to_string(),
        expected: "an array of records",
    }
}

#[async_trait]
impl DocumentAdapter for FileStore {
    async fn read_all(&self) -> Result<Map<String, Value>> {
        Ok(self.data.read().await.clone())
    }

    async fn read_key(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.data.read().await.get(key).cloned())
    }

    async fn read_record(&self, collection: &str, id: &str) -> Result<Option<Value>> {
        let data = self.data.read().await;
        let found = records(&data, collection)?
            .and_then(|items| position(items, id).map(|i| items[i].clone()));
        Ok(found)
    }

    async fn write_key(&self, key: &str, value: Value) -> Result<()> {
        self.mutate(|data| {
            data.insert(key.to_string(), value);
            Ok(Some(()))
        })
        .await?;
        Ok(())
    }

    async fn delete_key(&self, key: &str) -> Result<bool> {
        let removed = self
            .mutate(|data| {
                let before = data.len();
                data.retain(|k, _| k != key);
                Ok((data.len() < before).then_some(()))
            })
            .await?;
        Ok(removed.is_some())
    }

    async fn write_record(&self, collection: &str, id: &str, record: Value) -> Result<Value> {
        let stored = self
            .mutate(|data| {
                let items = records_mut(data, collection)?;
                let stored = match position(items, id) {
                    Some(i) => {
                        let stored = stamp_id(record, id, items[i].get("id"))?;
                        items[i] = stored.clone();
                        stored
                    }
                    None => {
                        let stored = stamp_id(record, id, None)?;
                        items.push(stored.clone());
                        stored
                    }
                };
                Ok(Some(stored))
            })
            .await?;
        stored.ok_or_else(|| DocRouteError::Storage("write produced no record".into()))
    }

    async fn delete_record(&self, collection: &str, id: &str) -> Result<bool> {
        let removed = self
            .mutate(|data| {
                let Some(Value::Array(items)) = data.get_mut(collection) else {
                    return Ok(None);
                };
                match position(items, id) {
                    Some(i) => {
                        items.remove(i);
                        Ok(Some(()))
                    }
                    None => Ok(None),
                }
            })
            .await?;
        Ok(removed.is_some())
    }

    async fn append(&self, collection: &str, record: Value) -> Result<Value> {
        let id = record_id(&record).ok_or_else(|| {
            DocRouteError::InvalidRecord("appended record must carry an id".into())
        })?;
        let stored = self
            .mutate(|data| {
                let items = records_mut(data, collection)?;
                if position(items, &id).is_some() {
                    return Err(DocRouteError::DuplicateId {
                        collection: collection.to_string(),
                        id: id.clone(),
                    });
                }
                items.push(record.clone());
                Ok(Some(record))
            })
            .await?;
        stored.ok_or_else(|| DocRouteError::Storage("append produced no record".into()))
    }

    fn name(&self) -> &str {
        "file"
    }
}
