mod classify;
mod types;

pub use classify::{classify, classify_document, ResourceCatalog};
pub use types::{AutoIdStrategy, Classification, ResourceDescriptor, ResourceKind};
