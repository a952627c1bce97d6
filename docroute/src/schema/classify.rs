use super::types::{Classification, ResourceDescriptor, ResourceKind};
use serde_json::{Map, Value};

/// Classify a single top-level value by its shape.
pub fn classify(value: &Value) -> Classification {
    match value {
        Value::Array(_) => Classification::Collection,
        Value::Object(_) => Classification::Singleton,
        _ => Classification::Ignored,
    }
}

/// Classify every key of a store's top-level object, in key order.
pub fn classify_document(root: &Map<String, Value>) -> Vec<(String, Classification)> {
    root.iter()
        .map(|(key, value)| (key.clone(), classify(value)))
        .collect()
}

/// The resource descriptors derived from one pass over a store's top-level value.
/// Built at load time and never mutated afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceCatalog {
    resources: Vec<ResourceDescriptor>,
    ignored: Vec<String>,
}

impl ResourceCatalog {
    pub fn from_document(root: &Map<String, Value>) -> Self {
        let mut catalog = ResourceCatalog::default();
        for (key, classification) in classify_document(root) {
            match classification.kind() {
                Some(kind) => catalog.resources.push(ResourceDescriptor { key, kind }),
                None => catalog.ignored.push(key),
            }
        }
        catalog
    }

    pub fn resources(&self) -> &[ResourceDescriptor] {
        &self.resources
    }

    pub fn kind_of(&self, key: &str) -> Option<ResourceKind> {
        self.resources
            .iter()
            .find(|r| r.key == key)
            .map(|r| r.kind)
    }

    pub fn collection_keys(&self) -> Vec<&str> {
        self.keys_of(ResourceKind::Collection)
    }

    pub fn singleton_keys(&self) -> Vec<&str> {
        self.keys_of(ResourceKind::Singleton)
    }

    /// Keys that produced no resource (null or scalar values).
    pub fn ignored_keys(&self) -> &[String] {
        &self.ignored
    }

    fn keys_of(&self, kind: ResourceKind) -> Vec<&str> {
        self.resources
            .iter()
            .filter(|r| r.kind == kind)
            .map(|r| r.key.as_str())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_classify_shapes() {
        assert_eq!(classify(&json!([])), Classification::Collection);
        assert_eq!(classify(&json!([{"id": 1}])), Classification::Collection);
        assert_eq!(classify(&json!([1, "two"])), Classification::Collection);
        assert_eq!(classify(&json!({})), Classification::Singleton);
        assert_eq!(classify(&json!({"theme": "dark"})), Classification::Singleton);
        assert_eq!(classify(&json!(null)), Classification::Ignored);
        assert_eq!(classify(&json!(42)), Classification::Ignored);
        assert_eq!(classify(&json!("text")), Classification::Ignored);
        assert_eq!(classify(&json!(true)), Classification::Ignored);
    }

    #[test]
    fn test_classification_is_stable() {
        let value = json!({"users": [], "settings": {}, "version": 3});
        let root = value.as_object().unwrap();
        assert_eq!(classify_document(root), classify_document(root));
        assert_eq!(
            ResourceCatalog::from_document(root),
            ResourceCatalog::from_document(root)
        );
    }

    #[test]
    fn test_catalog_partitions_keys() {
        let value = json!({
            "users": [{"id": 1, "name": "A"}],
            "settings": {"theme": "dark"},
            "orders": [],
            "motd": "hello",
            "nothing": null,
        });
        let catalog = ResourceCatalog::from_document(value.as_object().unwrap());

        assert_eq!(catalog.collection_keys(), vec!["users", "orders"]);
        assert_eq!(catalog.singleton_keys(), vec!["settings"]);
        assert_eq!(catalog.ignored_keys(), &["motd".to_string(), "nothing".to_string()]);
        assert_eq!(catalog.kind_of("settings"), Some(ResourceKind::Singleton));
        assert_eq!(catalog.kind_of("motd"), None);
    }

    #[test]
    fn test_summary_objects_are_singletons_by_shape() {
        let value = json!({"adminDashboardSummary": {"totalUsers": 10}});
        let catalog = ResourceCatalog::from_document(value.as_object().unwrap());
        assert_eq!(
            catalog.kind_of("adminDashboardSummary"),
            Some(ResourceKind::Singleton)
        );
    }
}
