//! Route synthesis: turns the resource catalog of a [`Store`] into a table of
//! `(method, path template) -> handler` entries, built once at load time.
//!
//! The table is transport-agnostic. An HTTP server registers every entry with
//! its router; [`RouteTable::dispatch`] matches a request directly, which is
//! what the tests and the CLI use.

use crate::error::DocRouteError;
use crate::path_template::PathTemplate;
use crate::schema::ResourceKind;
use crate::store::Store;
use futures::future::{BoxFuture, FutureExt};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        })
    }
}

/// The operation a synthesized route performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    List,
    Get,
    Create,
    Replace,
    Delete,
    SingletonGet,
    SingletonPut,
}

impl Action {
    pub fn is_singleton(self) -> bool {
        matches!(self, Action::SingletonGet | Action::SingletonPut)
    }

    fn invoke(self, store: Store, key: String, req: RouteRequest) -> BoxFuture<'static, Reply> {
        match self {
            Action::List => list(store, key).boxed(),
            Action::Get => get(store, key, req).boxed(),
            Action::Create => create(store, key, req).boxed(),
            Action::Replace => replace(store, key, req).boxed(),
            Action::Delete => delete(store, key, req).boxed(),
            Action::SingletonGet => singleton_get(store, key).boxed(),
            Action::SingletonPut => singleton_put(store, key, req).boxed(),
        }
    }
}

/// Transport-independent request: captured path parameters and an optional JSON body.
#[derive(Debug, Clone, Default)]
pub struct RouteRequest {
    pub params: HashMap<String, String>,
    pub body: Option<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyStatus {
    Ok,
    Created,
    NoContent,
    BadRequest,
    NotFound,
    Conflict,
    InternalError,
}

impl ReplyStatus {
    pub fn code(self) -> u16 {
        match self {
            ReplyStatus::Ok => 200,
            ReplyStatus::Created => 201,
            ReplyStatus::NoContent => 204,
            ReplyStatus::BadRequest => 400,
            ReplyStatus::NotFound => 404,
            ReplyStatus::Conflict => 409,
            ReplyStatus::InternalError => 500,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub status: ReplyStatus,
    pub body: Option<Value>,
}

impl Reply {
    pub fn ok(body: Value) -> Self {
        Reply {
            status: ReplyStatus::Ok,
            body: Some(body),
        }
    }

    pub fn created(body: Value) -> Self {
        Reply {
            status: ReplyStatus::Created,
            body: Some(body),
        }
    }

    pub fn no_content() -> Self {
        Reply {
            status: ReplyStatus::NoContent,
            body: None,
        }
    }

    /// Map a store error to a reply. Internal failures are logged with the
    /// resource key and reported generically.
    pub fn from_error(resource: &str, e: &DocRouteError) -> Self {
        let status = match e {
            DocRouteError::NotFound { .. } | DocRouteError::UnknownResource(_) => {
                ReplyStatus::NotFound
            }
            DocRouteError::InvalidRecord(_) | DocRouteError::InvalidId(_) => {
                ReplyStatus::BadRequest
            }
            DocRouteError::DuplicateId { .. } | DocRouteError::ShapeMismatch { .. } => {
                ReplyStatus::Conflict
            }
            _ => {
                log::error!("Error handling '{resource}': {e}");
                return Reply {
                    status: ReplyStatus::InternalError,
                    body: Some(serde_json::json!({ "error": "Internal server error" })),
                };
            }
        };
        Reply {
            status,
            body: Some(serde_json::json!({ "error": e.to_string() })),
        }
    }
}

/// First path segments owned by the fixed routes (`/ping`, `/api/...`).
/// Collections with these names get no routes.
pub const RESERVED_SEGMENTS: &[&str] = &["ping", "api"];

pub type Handler = Arc<dyn Fn(RouteRequest) -> BoxFuture<'static, Reply> + Send + Sync>;

/// One synthesized route.
#[derive(Clone)]
pub struct Route {
    pub method: Method,
    pub template: PathTemplate,
    pub resource: String,
    pub action: Action,
    pub handler: Handler,
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("method", &self.method)
            .field("path", &self.template.raw)
            .field("resource", &self.resource)
            .field("action", &self.action)
            .finish()
    }
}

/// Serializable summary of a route, for listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteInfo {
    pub method: Method,
    pub path: String,
    pub resource: String,
    pub action: Action,
}

#[derive(Clone, Default)]
pub struct RouteTable {
    routes: Vec<Route>,
    collections: Vec<String>,
    singletons: Vec<String>,
}

impl RouteTable {
    /// Generate routes for every resource in the store's catalog.
    pub fn build(store: &Store) -> Self {
        let namespace = store.options().singleton_namespace.clone();
        let mut table = RouteTable::default();

        for resource in store.catalog().resources() {
            let key = resource.key.as_str();
            if !is_routable(key) {
                log::warn!("Key '{key}' cannot be used as a path segment; no routes generated");
                continue;
            }

            match resource.kind {
                ResourceKind::Collection => {
                    if is_reserved(key) {
                        log::warn!(
                            "Collection '{key}' clashes with a fixed route; no routes generated"
                        );
                        continue;
                    }
                    if key == namespace {
                        log::warn!(
                            "Collection '{key}' shares its name with the singleton namespace; \
                             singleton routes take precedence"
                        );
                    }
                    let base = PathTemplate::from_parts(&[key], None);
                    let item = PathTemplate::from_parts(&[key], Some("id"));
                    table.push(store, Method::Get, base.clone(), key, Action::List);
                    table.push(store, Method::Get, item.clone(), key, Action::Get);
                    table.push(store, Method::Post, base, key, Action::Create);
                    table.push(store, Method::Put, item.clone(), key, Action::Replace);
                    table.push(store, Method::Delete, item, key, Action::Delete);
                    table.collections.push(key.to_string());
                }
                ResourceKind::Singleton => {
                    let path = PathTemplate::from_parts(&[namespace.as_str(), key], None);
                    table.push(store, Method::Get, path.clone(), key, Action::SingletonGet);
                    table.push(store, Method::Put, path, key, Action::SingletonPut);
                    table.singletons.push(key.to_string());
                }
            }
        }

        // Singleton paths are more specific than `/<namespace>/{id}`
        table.routes.sort_by_key(|r| !r.action.is_singleton());

        log::info!(
            "Synthesized {} route(s) for {} collection(s) and {} singleton(s)",
            table.routes.len(),
            table.collections.len(),
            table.singletons.len()
        );
        table
    }

    fn push(&mut self, store: &Store, method: Method, template: PathTemplate, key: &str, action: Action) {
        let bound_store = store.clone();
        let bound_key = key.to_string();
        let handler: Handler =
            Arc::new(move |req| action.invoke(bound_store.clone(), bound_key.clone(), req));
        self.routes.push(Route {
            method,
            template,
            resource: key.to_string(),
            action,
            handler,
        });
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    /// Keys served as collections, in store order.
    pub fn collection_keys(&self) -> &[String] {
        &self.collections
    }

    /// Keys served as singletons, in store order.
    pub fn singleton_keys(&self) -> &[String] {
        &self.singletons
    }

    pub fn describe(&self) -> Vec<RouteInfo> {
        self.routes
            .iter()
            .map(|r| RouteInfo {
                method: r.method,
                path: r.template.raw.clone(),
                resource: r.resource.clone(),
                action: r.action,
            })
            .collect()
    }

    /// Find the route matching `method` and `path`, and run it.
    /// Returns `None` when no synthesized route matches.
    pub async fn dispatch(&self, method: Method, path: &str, body: Option<Value>) -> Option<Reply> {
        for route in &self.routes {
            if route.method != method {
                continue;
            }
            if let Some(params) = route.template.matches(path) {
                let req = RouteRequest { params, body };
                return Some((route.handler)(req).await);
            }
        }
        None
    }
}

fn is_routable(key: &str) -> bool {
    !key.is_empty()
        && !key.starts_with('.')
        && !key.contains(['/', '\\', '{', '}', '?', '#', '%'])
        && !key.chars().any(char::is_whitespace)
}

pub fn is_reserved(segment: &str) -> bool {
    RESERVED_SEGMENTS.contains(&segment)
}

fn id_param(req: &RouteRequest) -> Result<&str, DocRouteError> {
    req.params
        .get("id")
        .map(String::as_str)
        .ok_or_else(|| DocRouteError::InvalidId(String::new()))
}

fn body(req: RouteRequest) -> Result<Value, DocRouteError> {
    req.body
        .ok_or_else(|| DocRouteError::InvalidRecord("missing JSON body".into()))
}

async fn list(store: Store, key: String) -> Reply {
    let result = async { store.collection(&key)?.list().await }.await;
    match result {
        Ok(items) => Reply::ok(items),
        Err(e) => Reply::from_error(&key, &e),
    }
}

async fn get(store: Store, key: String, req: RouteRequest) -> Reply {
    let result = async {
        let id = id_param(&req)?;
        store.collection(&key)?.get(id).await
    }
    .await;
    match result {
        Ok(record) => Reply::ok(record),
        Err(e) => Reply::from_error(&key, &e),
    }
}

async fn create(store: Store, key: String, req: RouteRequest) -> Reply {
    let result = async { store.collection(&key)?.insert(body(req)?).await }.await;
    match result {
        Ok(record) => Reply::created(record),
        Err(e) => Reply::from_error(&key, &e),
    }
}

async fn replace(store: Store, key: String, req: RouteRequest) -> Reply {
    let result = async {
        let id = id_param(&req)?.to_string();
        store.collection(&key)?.replace(&id, body(req)?).await
    }
    .await;
    match result {
        Ok(record) => Reply::ok(record),
        Err(e) => Reply::from_error(&key, &e),
    }
}

async fn delete(store: Store, key: String, req: RouteRequest) -> Reply {
    let result = async {
        let id = id_param(&req)?;
        store.collection(&key)?.delete(id).await
    }
    .await;
    match result {
        Ok(()) => Reply::no_content(),
        Err(e) => Reply::from_error(&key, &e),
    }
}

async fn singleton_get(store: Store, key: String) -> Reply {
    let result = async { store.singleton(&key)?.get().await }.await;
    match result {
        Ok(record) => Reply::ok(record.unwrap_or(Value::Null)),
        Err(e) => Reply::from_error(&key, &e),
    }
}

async fn singleton_put(store: Store, key: String, req: RouteRequest) -> Reply {
    let result = async { store.singleton(&key)?.put(body(req)?).await }.await;
    match result {
        Ok(record) => Reply::ok(record),
        Err(e) => Reply::from_error(&key, &e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::FileStore;
    use crate::store::StoreOptions;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tempfile::TempDir;

    async fn setup_table(seed: Value) -> (TempDir, RouteTable) {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("db.json");
        std::fs::write(&path, serde_json::to_vec(&seed).unwrap()).unwrap();
        let adapter = FileStore::open(&path).await.unwrap();
        let store = Store::open(Arc::new(adapter), StoreOptions::default())
            .await
            .unwrap();
        (tmp, RouteTable::build(&store))
    }

    fn seed() -> Value {
        json!({
            "users": [{"id": 1, "name": "A"}],
            "settings": {"theme": "dark"},
            "count": 5,
        })
    }

    #[tokio::test]
    async fn test_route_shapes() {
        let (_tmp, table) = setup_table(seed()).await;
        let routes: Vec<(String, String)> = table
            .describe()
            .into_iter()
            .map(|r| (r.method.to_string(), r.path))
            .collect();

        assert_eq!(
            routes,
            vec![
                ("GET".to_string(), "/singletons/settings".to_string()),
                ("PUT".to_string(), "/singletons/settings".to_string()),
                ("GET".to_string(), "/users".to_string()),
                ("GET".to_string(), "/users/{id}".to_string()),
                ("POST".to_string(), "/users".to_string()),
                ("PUT".to_string(), "/users/{id}".to_string()),
                ("DELETE".to_string(), "/users/{id}".to_string()),
            ]
        );
        assert_eq!(table.collection_keys(), &["users".to_string()]);
        assert_eq!(table.singleton_keys(), &["settings".to_string()]);
    }

    #[tokio::test]
    async fn test_no_post_or_delete_for_singletons() {
        let (_tmp, table) = setup_table(seed()).await;
        let post = table
            .dispatch(Method::Post, "/singletons/settings", Some(json!({})))
            .await;
        assert!(post.is_none());
        assert!(table.dispatch(Method::Delete, "/singletons/settings", None).await.is_none());
        assert!(table.dispatch(Method::Get, "/count", None).await.is_none());
    }

    #[tokio::test]
    async fn test_post_then_get_round_trip() {
        let (_tmp, table) = setup_table(seed()).await;

        let created = table
            .dispatch(Method::Post, "/users", Some(json!({"name": "B", "age": 3})))
            .await
            .unwrap();
        assert_eq!(created.status, ReplyStatus::Created);
        let body = created.body.unwrap();
        let id = body["id"].as_str().unwrap().to_string();

        let fetched = table
            .dispatch(Method::Get, &format!("/users/{id}"), None)
            .await
            .unwrap();
        assert_eq!(fetched.status, ReplyStatus::Ok);
        assert_eq!(fetched.body.unwrap(), json!({"name": "B", "age": 3, "id": id}));
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let (_tmp, table) = setup_table(seed()).await;
        for _ in 0..2 {
            let reply = table.dispatch(Method::Delete, "/users/1", None).await.unwrap();
            assert_eq!(reply, Reply::no_content());
        }
        let missing = table.dispatch(Method::Get, "/users/1", None).await.unwrap();
        assert_eq!(missing.status, ReplyStatus::NotFound);
    }

    #[tokio::test]
    async fn test_put_creates_missing_record() {
        let (_tmp, table) = setup_table(seed()).await;
        let reply = table
            .dispatch(Method::Put, "/users/9", Some(json!({"name": "Z"})))
            .await
            .unwrap();
        assert_eq!(reply.status, ReplyStatus::Ok);
        assert_eq!(reply.body.unwrap(), json!({"name": "Z", "id": "9"}));

        let list = table.dispatch(Method::Get, "/users", None).await.unwrap();
        assert_eq!(list.body.unwrap().as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_singleton_put_and_get() {
        let (_tmp, table) = setup_table(seed()).await;
        table
            .dispatch(Method::Put, "/singletons/settings", Some(json!({"theme": "light"})))
            .await
            .unwrap();
        let reply = table
            .dispatch(Method::Get, "/singletons/settings", None)
            .await
            .unwrap();
        assert_eq!(reply, Reply::ok(json!({"theme": "light"})));
    }

    #[tokio::test]
    async fn test_bad_bodies_are_rejected() {
        let (_tmp, table) = setup_table(seed()).await;
        let reply = table.dispatch(Method::Post, "/users", None).await.unwrap();
        assert_eq!(reply.status, ReplyStatus::BadRequest);

        let reply = table
            .dispatch(Method::Put, "/users/1", Some(json!("nope")))
            .await
            .unwrap();
        assert_eq!(reply.status, ReplyStatus::BadRequest);
    }

    #[test]
    fn test_error_mapping() {
        let e = DocRouteError::Storage("disk full".into());
        let reply = Reply::from_error("users", &e);
        assert_eq!(reply.status.code(), 500);
        assert_eq!(reply.body.unwrap()["error"], "Internal server error");

        let e = DocRouteError::DuplicateId {
            collection: "users".into(),
            id: "1".into(),
        };
        assert_eq!(Reply::from_error("users", &e).status.code(), 409);
    }

    #[tokio::test]
    async fn test_reserved_collection_names_get_no_routes() {
        let (_tmp, table) = setup_table(json!({
            "api": [{"id": 1}],
            "ping": [],
            "users": [],
            "settings": {},
        }))
        .await;

        assert_eq!(table.collection_keys(), &["users".to_string()]);
        assert!(table.dispatch(Method::Get, "/ping", None).await.is_none());
        assert!(table.dispatch(Method::Get, "/api/1", None).await.is_none());
        assert!(table.describe().iter().all(|r| r.resource != "api" && r.resource != "ping"));
        assert!(is_reserved("api"));
        assert!(!is_reserved("users"));
    }

    #[test]
    fn test_is_routable() {
        assert!(is_routable("users"));
        assert!(is_routable("assetOrders"));
        assert!(!is_routable("a/b"));
        assert!(!is_routable("with space"));
        assert!(!is_routable(""));
    }
}
