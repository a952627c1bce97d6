use crate::adapter::record_id;
use crate::error::{DocRouteError, Result};
use crate::schema::{classify, Classification, ResourceKind};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use std::path::Path;

/// Destination of a migration: documents addressed by `(collection, doc_id)`.
#[async_trait]
pub trait HierarchicalStore: Send + Sync {
    /// Make sure `collection` exists, even when no document is written to it.
    async fn create_collection(&self, collection: &str) -> Result<()>;

    /// Write `data` at `collection/doc_id`, fully overwriting any previous document.
    async fn set_document(&self, collection: &str, doc_id: &str, data: &Value) -> Result<()>;

    /// A fresh, unused document id for `collection`.
    fn new_document_id(&self, collection: &str) -> String;

    /// Collection that holds singleton documents, one per top-level key.
    fn singleton_namespace(&self) -> &str {
        crate::adapter::DEFAULT_SINGLETON_NAMESPACE
    }
}

/// One planned unit of work, derived from the classification of a top-level key.
#[derive(Debug, Clone, PartialEq)]
pub enum MigrationStep {
    WriteCollection {
        key: String,
        records: usize,
        explicit_ids: usize,
    },
    WriteSingleton {
        key: String,
    },
    /// A collection whose name is taken by the singleton namespace.
    Conflict {
        key: String,
    },
    Skip {
        key: String,
    },
}

impl MigrationStep {
    pub fn key(&self) -> &str {
        match self {
            MigrationStep::WriteCollection { key, .. }
            | MigrationStep::WriteSingleton { key }
            | MigrationStep::Conflict { key }
            | MigrationStep::Skip { key } => key,
        }
    }

    /// Human-readable description of this step.
    pub fn describe(&self) -> String {
        match self {
            MigrationStep::WriteCollection {
                key,
                records,
                explicit_ids,
            } => {
                let generated = records - explicit_ids;
                format!(
                    "Collection '{}': {} record(s), {} at explicit ids, {} at generated ids",
                    key, records, explicit_ids, generated
                )
            }
            MigrationStep::WriteSingleton { key } => {
                format!("Singleton '{}' written to the singleton namespace", key)
            }
            MigrationStep::Conflict { key } => {
                format!("Collection '{}' skipped (name taken by the singleton namespace)", key)
            }
            MigrationStep::Skip { key } => {
                format!("Key '{}' skipped (neither array nor object)", key)
            }
        }
    }
}

/// Plan a migration into a destination whose singletons live under `namespace`,
/// without touching it.
pub fn plan(source: &Map<String, Value>, namespace: &str) -> Vec<MigrationStep> {
    source
        .iter()
        .map(|(key, value)| match (classify(value), value) {
            (Classification::Collection, _) if key == namespace => {
                MigrationStep::Conflict { key: key.clone() }
            }
            (Classification::Collection, Value::Array(items)) => MigrationStep::WriteCollection {
                key: key.clone(),
                records: items.len(),
                explicit_ids: items.iter().filter(|i| explicit_id(i).is_some()).count(),
            },
            (Classification::Singleton, _) => MigrationStep::WriteSingleton { key: key.clone() },
            _ => MigrationStep::Skip { key: key.clone() },
        })
        .collect()
}

/// Per-key outcome of a migration run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyReport {
    pub key: String,
    pub kind: ResourceKind,
    pub written: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MigrationReport {
    pub keys: Vec<KeyReport>,
    pub skipped: Vec<String>,
}

impl MigrationReport {
    pub fn key(&self, key: &str) -> Option<&KeyReport> {
        self.keys.iter().find(|k| k.key == key)
    }

    pub fn total_written(&self) -> usize {
        self.keys.iter().map(|k| k.written).sum()
    }

    pub fn total_failed(&self) -> usize {
        self.keys.iter().map(|k| k.failed).sum()
    }
}

/// Read a flat JSON file whose root must be an object.
pub async fn load_source(path: &Path) -> Result<Map<String, Value>> {
    let bytes = tokio::fs::read(path).await?;
    match serde_json::from_slice(&bytes)? {
        Value::Object(map) => Ok(map),
        _ => Err(DocRouteError::Other(format!(
            "{} must contain a JSON object at the root",
            path.display()
        ))),
    }
}

/// Copy every classified key of `source` into `dest`.
///
/// Every collection is created in `dest`, empty ones included. Records with
/// an `id` are written at that id, so re-running overwrites rather than
/// duplicates. A failed write is logged and counted; the run always
/// continues with the next record. A collection named like the singleton
/// namespace is skipped.
pub async fn migrate<D>(source: &Map<String, Value>, dest: &D) -> MigrationReport
where
    D: HierarchicalStore + ?Sized,
{
    let mut report = MigrationReport::default();

    for (key, value) in source {
        match (classify(value), value) {
            (Classification::Collection, _) if key == dest.singleton_namespace() => {
                log::warn!(
                    "Skipping collection '{key}': its name is taken by the singleton namespace"
                );
                report.skipped.push(key.clone());
            }
            (Classification::Collection, Value::Array(items)) => {
                let mut outcome = KeyReport {
                    key: key.clone(),
                    kind: ResourceKind::Collection,
                    written: 0,
                    failed: 0,
                };
                if let Err(e) = dest.create_collection(key).await {
                    log::error!("Failed to create collection '{key}': {e}");
                    outcome.failed = items.len();
                    report.keys.push(outcome);
                    continue;
                }
                for item in items {
                    match write_record(dest, key, item).await {
                        Ok(()) => outcome.written += 1,
                        Err(e) => {
                            log::error!("Failed to migrate a record of '{key}': {e}");
                            outcome.failed += 1;
                        }
                    }
                }
                log::info!(
                    "Migrated collection: {key} ({} written, {} failed)",
                    outcome.written,
                    outcome.failed
                );
                report.keys.push(outcome);
            }
            (Classification::Singleton, _) => {
                let namespace = dest.singleton_namespace();
                let mut outcome = KeyReport {
                    key: key.clone(),
                    kind: ResourceKind::Singleton,
                    written: 0,
                    failed: 0,
                };
                match dest.set_document(namespace, key, value).await {
                    Ok(()) => {
                        log::info!("Migrated singleton object: {key}");
                        outcome.written = 1;
                    }
                    Err(e) => {
                        log::error!("Failed to migrate singleton '{key}': {e}");
                        outcome.failed = 1;
                    }
                }
                report.keys.push(outcome);
            }
            _ => {
                log::warn!("Skipping '{key}': neither an array nor an object");
                report.skipped.push(key.clone());
            }
        }
    }

    log::info!(
        "Migration complete: {} written, {} failed, {} key(s) skipped",
        report.total_written(),
        report.total_failed(),
        report.skipped.len()
    );
    report
}

async fn write_record<D>(dest: &D, collection: &str, item: &Value) -> Result<()>
where
    D: HierarchicalStore + ?Sized,
{
    if !item.is_object() {
        return Err(DocRouteError::InvalidRecord(format!(
            "collection element is not an object: {item}"
        )));
    }
    let doc_id = match explicit_id(item) {
        Some(id) => id,
        None => dest.new_document_id(collection),
    };
    dest.set_document(collection, &doc_id, item).await
}

/// The id a record should be stored under, if it names one.
fn explicit_id(item: &Value) -> Option<String> {
    record_id(item).filter(|id| !id.is_empty())
}
