use super::persist::atomic_write;
use super::{record_id, stamp_id, DocumentAdapter};
use crate::error::{DocRouteError, Result};
use crate::migration::HierarchicalStore;
use crate::schema::AutoIdStrategy;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::path::{Path, PathBuf};

pub const DEFAULT_SINGLETON_NAMESPACE: &str = "singletons";

const DOC_EXT: &str = "json";

/// A hierarchical document store on disk.
///
/// ```text
/// <root>/<collection>/<doc_id>.json
/// <root>/<namespace>/<key>.json      (singletons)
/// ```
///
/// Reading the whole tree yields the same top-level shape as a flat file:
/// each collection directory becomes an array ordered by document id and
/// each singleton document becomes an object.
pub struct TreeStore {
    root: PathBuf,
    namespace: String,
    ids: AutoIdStrategy,
}

impl TreeStore {
    /// Open (creating if needed) a tree rooted at `root`.
    pub async fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&root).await?;
        Ok(TreeStore {
            root,
            namespace: DEFAULT_SINGLETON_NAMESPACE.to_string(),
            ids: AutoIdStrategy::default(),
        })
    }

    pub fn with_namespace(mut self, namespace: &str) -> Self {
        self.namespace = namespace.to_string();
        self
    }

    pub fn with_id_strategy(mut self, ids: AutoIdStrategy) -> Self {
        self.ids = ids;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    fn collection_dir(&self, collection: &str) -> Result<PathBuf> {
        check_segment(collection)?;
        if collection == self.namespace {
            return Err(DocRouteError::ShapeMismatch {
                key: collection.to_string(),
                expected: "a collection outside the singleton namespace",
            });
        }
        Ok(self.root.join(collection))
    }

    fn document_path(&self, collection: &str, doc_id: &str) -> Result<PathBuf> {
        check_segment(doc_id)?;
        Ok(self
            .collection_dir(collection)?
            .join(format!("{doc_id}.{DOC_EXT}")))
    }

    fn singleton_path(&self, key: &str) -> Result<PathBuf> {
        check_segment(key)?;
        Ok(self
            .root
            .join(&self.namespace)
            .join(format!("{key}.{DOC_EXT}")))
    }

    async fn list_collection(&self, dir: &Path) -> Result<Vec<Value>> {
        let mut docs = Vec::new();
        for (doc_id, path) in list_documents(dir).await? {
            match read_json(&path).await {
                Ok(Some(doc)) => docs.push(with_id(doc, &doc_id)),
                Ok(None) => {}
                Err(e) => log::warn!("Skipping unreadable document {}: {e}", path.display()),
            }
        }
        Ok(docs)
    }
}

/// Reject ids and keys that cannot be used as a single path component.
fn check_segment(segment: &str) -> Result<()> {
    let bad = segment.is_empty()
        || segment.starts_with('.')
        || segment.contains(['/', '\\', '\0']);
    if bad {
        return Err(DocRouteError::InvalidId(segment.to_string()));
    }
    Ok(())
}

/// Documents without an `id` field (auto-addressed) expose their document id.
fn with_id(mut doc: Value, doc_id: &str) -> Value {
    if let Value::Object(obj) = &mut doc {
        if !obj.contains_key("id") {
            obj.insert("id".to_string(), Value::String(doc_id.to_string()));
        }
    }
    doc
}

async fn read_json(path: &Path) -> Result<Option<Value>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

async fn write_json(path: &Path, value: &Value) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(value)?;
    atomic_write(path, bytes).await
}

/// `(doc_id, path)` for every document file in `dir`, ordered by id.
async fn list_documents(dir: &Path) -> Result<Vec<(String, PathBuf)>> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut docs = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some(DOC_EXT) {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        if stem.starts_with('.') {
            continue;
        }
        docs.push((stem.to_string(), path.clone()));
    }
    docs.sort_by(|a, b| compare_ids(&a.0, &b.0));
    Ok(docs)
}

/// Numeric ids sort numerically and before everything else; the rest sort lexically.
fn compare_ids(a: &str, b: &str) -> Ordering {
    match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}

#[async_trait]
impl DocumentAdapter for TreeStore {
    async fn read_all(&self) -> Result<Map<String, Value>> {
        let mut dirs = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if !name.starts_with('.') {
                    dirs.push(name.to_string());
                }
            }
        }
        dirs.sort();

        let mut root = Map::new();
        for name in dirs.iter().filter(|n| **n != self.namespace) {
            let docs = self.list_collection(&self.root.join(name)).await?;
            root.insert(name.clone(), Value::Array(docs));
        }

        for (key, path) in list_documents(&self.root.join(&self.namespace)).await? {
            if root.contains_key(&key) {
                log::warn!("Singleton '{key}' shadowed by a collection of the same name");
                continue;
            }
            if let Some(doc) = read_json(&path).await? {
                root.insert(key, doc);
            }
        }

        Ok(root)
    }

    async fn read_key(&self, key: &str) -> Result<Option<Value>> {
        check_segment(key)?;
        if key != self.namespace {
            let dir = self.root.join(key);
            if tokio::fs::metadata(&dir).await.map(|m| m.is_dir()).unwrap_or(false) {
                return Ok(Some(Value::Array(self.list_collection(&dir).await?)));
            }
        }
        read_json(&self.singleton_path(key)?).await
    }

    async fn read_record(&self, collection: &str, id: &str) -> Result<Option<Value>> {
        let path = self.document_path(collection, id)?;
        Ok(read_json(&path).await?.map(|doc| with_id(doc, id)))
    }

    async fn write_key(&self, key: &str, value: Value) -> Result<()> {
        write_json(&self.singleton_path(key)?, &value).await
    }

    async fn delete_key(&self, key: &str) -> Result<bool> {
        check_segment(key)?;
        let mut existed = false;
        if key != self.namespace {
            match tokio::fs::remove_dir_all(self.root.join(key)).await {
                Ok(()) => existed = true,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        match tokio::fs::remove_file(self.singleton_path(key)?).await {
            Ok(()) => existed = true,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        Ok(existed)
    }

    async fn write_record(&self, collection: &str, id: &str, record: Value) -> Result<Value> {
        let path = self.document_path(collection, id)?;
        let existing = read_json(&path).await?;
        let stored = stamp_id(record, id, existing.as_ref().and_then(|d| d.get("id")))?;
        write_json(&path, &stored).await?;
        Ok(stored)
    }

    async fn delete_record(&self, collection: &str, id: &str) -> Result<bool> {
        let path = self.document_path(collection, id)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn append(&self, collection: &str, record: Value) -> Result<Value> {
        let id = record_id(&record).ok_or_else(|| {
            DocRouteError::InvalidRecord("appended record must carry an id".into())
        })?;
        let path = self.document_path(collection, &id)?;
        if tokio::fs::try_exists(&path).await? {
            return Err(DocRouteError::DuplicateId {
                collection: collection.to_string(),
                id,
            });
        }
        write_json(&path, &record).await?;
        Ok(record)
    }

    fn name(&self) -> &str {
        "tree"
    }
}

#[async_trait]
impl HierarchicalStore for TreeStore {
    async fn create_collection(&self, collection: &str) -> Result<()> {
        tokio::fs::create_dir_all(self.collection_dir(collection)?).await?;
        Ok(())
    }

    async fn set_document(&self, collection: &str, doc_id: &str, data: &Value) -> Result<()> {
        let path = if collection == self.namespace {
            self.singleton_path(doc_id)?
        } else {
            self.document_path(collection, doc_id)?
        };
        write_json(&path, data).await
    }

    fn new_document_id(&self, _collection: &str) -> String {
        self.ids.generate()
    }

    fn singleton_namespace(&self) -> &str {
        &self.namespace
    }
}
