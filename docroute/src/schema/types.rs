use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How a top-level value is treated by the router and the migration engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    Collection,
    Singleton,
    Ignored,
}

impl Classification {
    /// The resource kind this classification synthesizes, if any.
    pub fn kind(self) -> Option<ResourceKind> {
        match self {
            Classification::Collection => Some(ResourceKind::Collection),
            Classification::Singleton => Some(ResourceKind::Singleton),
            Classification::Ignored => None,
        }
    }
}

/// Kind of a synthesized resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Collection,
    Singleton,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::Collection => f.write_str("collection"),
            ResourceKind::Singleton => f.write_str("singleton"),
        }
    }
}

/// A `(key, kind)` pair derived from the store's top-level value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    pub key: String,
    pub kind: ResourceKind,
}

/// Strategy for ids assigned to records created without one
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutoIdStrategy {
    #[default]
    Ulid,
    Uuid,
    Nanoid,
}

impl AutoIdStrategy {
    pub fn generate(self) -> String {
        match self {
            AutoIdStrategy::Ulid => ulid::Ulid::new().to_string().to_lowercase(),
            AutoIdStrategy::Uuid => uuid::Uuid::new_v4().to_string(),
            AutoIdStrategy::Nanoid => nanoid::nanoid!(),
        }
    }
}

impl FromStr for AutoIdStrategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ulid" => Ok(AutoIdStrategy::Ulid),
            "uuid" => Ok(AutoIdStrategy::Uuid),
            "nanoid" => Ok(AutoIdStrategy::Nanoid),
            other => Err(format!("unknown id strategy '{other}' (expected ulid, uuid or nanoid)")),
        }
    }
}
