pub mod error;
pub mod schema;
pub mod path_template;
pub mod adapter;
pub mod store;
pub mod routes;
pub mod migration;
pub mod backup;

pub use adapter::{DocumentAdapter, FileStore, TreeStore};
pub use error::{DocRouteError, Result};
pub use routes::{Method, Reply, ReplyStatus, RouteTable};
pub use schema::{AutoIdStrategy, Classification, ResourceCatalog, ResourceKind};
pub use store::{Store, StoreOptions};
