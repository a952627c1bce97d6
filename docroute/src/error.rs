use thiserror::Error;

#[derive(Error, Debug)]
pub enum DocRouteError {
    #[error("Resource not found: {0}")]
    UnknownResource(String),

    #[error("Record not found: {collection}/{id}")]
    NotFound { collection: String, id: String },

    #[error("Duplicate id in {collection}: {id}")]
    DuplicateId { collection: String, id: String },

    #[error("Shape mismatch on '{key}': expected {expected}")]
    ShapeMismatch { key: String, expected: &'static str },

    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("Invalid document id: {0:?}")]
    InvalidId(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, DocRouteError>;
