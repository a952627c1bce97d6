use docroute::adapter::DEFAULT_SINGLETON_NAMESPACE;
use docroute::backup::BackupSchedule;
use docroute::routes::is_reserved;
use docroute::{AutoIdStrategy, DocRouteError, Result};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Which storage backend to serve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// One flat JSON file.
    File,
    /// A directory per collection, one file per document.
    Tree,
}

impl Backend {
    fn default_data(self) -> &'static str {
        match self {
            Backend::File => "db.json",
            Backend::Tree => "data",
        }
    }
}

impl FromStr for Backend {
    type Err = DocRouteError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "file" => Ok(Backend::File),
            "tree" => Ok(Backend::Tree),
            other => Err(DocRouteError::Config(format!(
                "unknown backend '{other}' (expected file or tree)"
            ))),
        }
    }
}

/// Server settings, read from the environment.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub backend: Backend,
    pub data: PathBuf,
    pub singleton_namespace: String,
    pub id_strategy: AutoIdStrategy,
    pub backup_dir: PathBuf,
    pub backup_schedule: BackupSchedule,
    /// `None` when the keep-alive prober is disabled.
    pub keepalive: Option<Duration>,
    pub workers: usize,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from any key lookup. Unset and empty values fall back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let port = parse_or(get("PORT"), "PORT", 3000u16)?;
        let backend = match get("DOCROUTE_BACKEND") {
            Some(v) => v.parse()?,
            None => Backend::File,
        };
        let data = get("DOCROUTE_DATA").unwrap_or_else(|| backend.default_data().to_string());

        let singleton_namespace =
            get("DOCROUTE_SINGLETON_NAMESPACE").unwrap_or_else(|| DEFAULT_SINGLETON_NAMESPACE.to_string());
        if singleton_namespace.contains('/') {
            return Err(DocRouteError::Config(format!(
                "DOCROUTE_SINGLETON_NAMESPACE must be a single path segment, got '{singleton_namespace}'"
            )));
        }
        if is_reserved(&singleton_namespace) {
            return Err(DocRouteError::Config(format!(
                "DOCROUTE_SINGLETON_NAMESPACE '{singleton_namespace}' clashes with a fixed route"
            )));
        }

        let id_strategy = match get("DOCROUTE_ID_STRATEGY") {
            Some(v) => v.parse().map_err(DocRouteError::Config)?,
            None => AutoIdStrategy::default(),
        };

        let backup_schedule = BackupSchedule::parse(
            get("DOCROUTE_BACKUP_TIME").as_deref().unwrap_or("02:00"),
            get("DOCROUTE_BACKUP_TZ").as_deref().unwrap_or("UTC"),
        )?;

        let keepalive_secs = parse_or(get("DOCROUTE_KEEPALIVE_SECS"), "DOCROUTE_KEEPALIVE_SECS", 600u64)?;
        let workers = parse_or(get("DOCROUTE_WORKERS"), "DOCROUTE_WORKERS", 1usize)?;
        if workers == 0 {
            return Err(DocRouteError::Config("DOCROUTE_WORKERS must be at least 1".into()));
        }

        Ok(ServerConfig {
            host: get("DOCROUTE_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port,
            backend,
            data: PathBuf::from(data),
            singleton_namespace,
            id_strategy,
            backup_dir: PathBuf::from(get("DOCROUTE_BACKUP_DIR").unwrap_or_else(|| "backups".to_string())),
            backup_schedule,
            keepalive: (keepalive_secs > 0).then(|| Duration::from_secs(keepalive_secs)),
            workers,
        })
    }

    /// URL of the health endpoint, as seen from this host.
    pub fn ping_url(&self) -> String {
        format!("http://127.0.0.1:{}/ping", self.port)
    }
}

fn parse_or<T>(value: Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match value {
        None => Ok(default),
        Some(v) => v
            .trim()
            .parse()
            .map_err(|e| DocRouteError::Config(format!("invalid {key} '{v}': {e}"))),
    }
}
