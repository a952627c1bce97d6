use crate::adapter::{DocumentAdapter, DEFAULT_SINGLETON_NAMESPACE};
use crate::error::{DocRouteError, Result};
use crate::schema::{AutoIdStrategy, ResourceCatalog, ResourceKind};
use serde_json::{Map, Value};
use std::sync::Arc;

/// How many fresh ids to try before giving up on a collision.
const MAX_ID_ATTEMPTS: usize = 8;

#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// Path prefix under which singleton resources are addressed.
    pub singleton_namespace: String,
    pub id_strategy: AutoIdStrategy,
}

impl Default for StoreOptions {
    fn default() -> Self {
        StoreOptions {
            singleton_namespace: DEFAULT_SINGLETON_NAMESPACE.to_string(),
            id_strategy: AutoIdStrategy::default(),
        }
    }
}

/// The main entry point for docroute.
/// Wraps a storage adapter together with the resource catalog derived from
/// its contents at load time, and hands out collection and singleton handles.
///
/// Cloning is cheap; clones share the adapter and the catalog.
#[derive(Clone)]
pub struct Store {
    adapter: Arc<dyn DocumentAdapter>,
    catalog: Arc<ResourceCatalog>,
    options: Arc<StoreOptions>,
}

impl Store {
    /// Load the whole document through `adapter` and classify its keys.
    pub async fn open(adapter: Arc<dyn DocumentAdapter>, options: StoreOptions) -> Result<Self> {
        let root = adapter.read_all().await?;
        let catalog = ResourceCatalog::from_document(&root);

        log::info!(
            "Loaded {} store: {} collection(s), {} singleton(s), {} ignored key(s)",
            adapter.name(),
            catalog.collection_keys().len(),
            catalog.singleton_keys().len(),
            catalog.ignored_keys().len()
        );
        for key in catalog.ignored_keys() {
            log::warn!("Key '{key}' is neither an array nor an object; no routes generated");
        }

        Ok(Store {
            adapter,
            catalog: Arc::new(catalog),
            options: Arc::new(options),
        })
    }

    /// Re-read the backend and derive a fresh catalog (e.g. after a migration).
    pub async fn reload(&self) -> Result<Self> {
        Store::open(self.adapter.clone(), (*self.options).clone()).await
    }

    pub fn catalog(&self) -> &ResourceCatalog {
        &self.catalog
    }

    pub fn options(&self) -> &StoreOptions {
        &self.options
    }

    pub fn adapter(&self) -> &Arc<dyn DocumentAdapter> {
        &self.adapter
    }

    /// Get a handle to a collection resource.
    pub fn collection(&self, name: &str) -> Result<Collection<'_>> {
        match self.catalog.kind_of(name) {
            Some(ResourceKind::Collection) => Ok(Collection {
                store: self,
                name: name.to_string(),
            }),
            _ => Err(DocRouteError::UnknownResource(name.to_string())),
        }
    }

    /// Get a handle to a singleton resource.
    pub fn singleton(&self, name: &str) -> Result<Singleton<'_>> {
        match self.catalog.kind_of(name) {
            Some(ResourceKind::Singleton) => Ok(Singleton {
                store: self,
                name: name.to_string(),
            }),
            _ => Err(DocRouteError::UnknownResource(name.to_string())),
        }
    }

    /// The full current document, as used for backups.
    pub async fn snapshot(&self) -> Result<Value> {
        Ok(Value::Object(self.adapter.read_all().await?))
    }

    /// Backend name and the resource partition.
    pub fn status(&self) -> Value {
        serde_json::json!({
            "backend": self.adapter.name(),
            "collections": self.catalog.collection_keys(),
            "singletons": self.catalog.singleton_keys(),
            "ignored": self.catalog.ignored_keys(),
            "singleton_namespace": self.options.singleton_namespace,
        })
    }
}

/// A handle to a collection resource: an array of records addressed by `id`.
pub struct Collection<'a> {
    store: &'a Store,
    name: String,
}

impl<'a> Collection<'a> {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// All records, or an empty list if the key has disappeared from the backend.
    pub async fn list(&self) -> Result<Value> {
        match self.store.adapter.read_key(&self.name).await? {
            None => Ok(Value::Array(Vec::new())),
            Some(v @ Value::Array(_)) => Ok(v),
            Some(_) => Err(DocRouteError::ShapeMismatch {
                key: self.name.clone(),
                expected: "an array of records",
            }),
        }
    }

    pub async fn get(&self, id: &str) -> Result<Value> {
        self.store
            .adapter
            .read_record(&self.name, id)
            .await?
            .ok_or_else(|| DocRouteError::NotFound {
                collection: self.name.clone(),
                id: id.to_string(),
            })
    }

    /// Insert a new record, assigning an id when the body has none.
    /// Returns the stored record.
    pub async fn insert(&self, body: Value) -> Result<Value> {
        let mut record = require_object(body)?;
        let has_id = match record.get("id") {
            Some(Value::String(s)) => !s.is_empty(),
            Some(Value::Number(_)) => true,
            _ => false,
        };
        if !has_id {
            let id = self.fresh_id().await?;
            record.insert("id".to_string(), Value::String(id));
        }
        self.store.adapter.append(&self.name, Value::Object(record)).await
    }

    /// Replace the record at `id`, creating it if absent.
    pub async fn replace(&self, id: &str, body: Value) -> Result<Value> {
        let record = require_object(body)?;
        self.store
            .adapter
            .write_record(&self.name, id, Value::Object(record))
            .await
    }

    /// Delete the record at `id`. Deleting a missing record is not an error.
    pub async fn delete(&self, id: &str) -> Result<()> {
        let existed = self.store.adapter.delete_record(&self.name, id).await?;
        if !existed {
            log::debug!("Delete of missing record {}/{id}", self.name);
        }
        Ok(())
    }

    async fn fresh_id(&self) -> Result<String> {
        for _ in 0..MAX_ID_ATTEMPTS {
            let id = self.store.options.id_strategy.generate();
            if self.store.adapter.read_record(&self.name, &id).await?.is_none() {
                return Ok(id);
            }
        }
        Err(DocRouteError::Other(format!(
            "Could not generate a unique id for '{}'",
            self.name
        )))
    }
}

/// A handle to a singleton resource: one record addressed by its key.
pub struct Singleton<'a> {
    store: &'a Store,
    name: String,
}

impl<'a> Singleton<'a> {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The record, or `None` if nothing is stored under the key.
    pub async fn get(&self) -> Result<Option<Value>> {
        self.store.adapter.read_key(&self.name).await
    }

    /// Fully replace the record. Returns the stored record.
    pub async fn put(&self, body: Value) -> Result<Value> {
        let record = Value::Object(require_object(body)?);
        self.store.adapter.write_key(&self.name, record.clone()).await?;
        Ok(record)
    }
}

fn require_object(body: Value) -> Result<Map<String, Value>> {
    match body {
        Value::Object(map) => Ok(map),
        other => Err(DocRouteError::InvalidRecord(format!(
            "expected a JSON object, got {}",
            json_type(&other)
        ))),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
