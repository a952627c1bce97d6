use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use docroute::adapter::DEFAULT_SINGLETON_NAMESPACE;
use docroute::backup::run_backup;
use docroute::migration::{self, plan};
use docroute::{DocumentAdapter, FileStore, RouteTable, Store, StoreOptions, TreeStore};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

/// docroute CLI: inspect, migrate and back up a docroute data store
#[derive(Parser)]
#[command(name = "docroute", version, about)]
struct Cli {
    /// Path to the store (a JSON file, or a directory for the tree backend)
    #[arg(long, default_value = "db.json")]
    data: PathBuf,

    /// Storage backend of --data
    #[arg(long, default_value = "file")]
    backend: BackendArg,

    /// Path prefix of singleton resources
    #[arg(long, default_value = DEFAULT_SINGLETON_NAMESPACE)]
    namespace: String,

    /// Output format
    #[arg(long, default_value = "yaml")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum BackendArg {
    File,
    Tree,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    Yaml,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Show how every top-level key is classified
    Classify,

    /// List the routes the server would expose
    Routes,

    /// Show backend and resource summary
    Status,

    /// List the records of a collection
    List {
        /// Collection name
        collection: String,
    },

    /// Get a record by ID, or a singleton when no ID is given
    Get {
        /// Collection or singleton name
        resource: String,
        /// Record ID
        id: Option<String>,
    },

    /// Insert a new record into a collection
    Insert {
        /// Collection name
        collection: String,
        /// Field values (e.g. --field name="Alice Chen")
        #[arg(long = "field", value_parser = parse_key_value)]
        fields: Vec<(String, String)>,
    },

    /// Delete a record
    Delete {
        /// Collection name
        collection: String,
        /// Record ID
        id: String,
        /// Show what would be deleted without actually deleting
        #[arg(long)]
        dry_run: bool,
    },

    /// Copy a flat JSON file into a hierarchical document tree
    Migrate {
        /// Flat JSON source file
        #[arg(long, default_value = "db.json")]
        source: PathBuf,
        /// Destination directory
        #[arg(long, default_value = "data")]
        dest: PathBuf,
        /// Show what would be written without writing
        #[arg(long)]
        dry_run: bool,
    },

    /// Write a snapshot of the store now
    Backup {
        /// Backup directory
        #[arg(long, default_value = "backups")]
        dir: PathBuf,
        /// Snapshot date (default: today, UTC)
        #[arg(long)]
        date: Option<NaiveDate>,
    },
}

fn parse_key_value(s: &str) -> Result<(String, String), String> {
    let pos = s.find('=').ok_or_else(|| {
        format!("Invalid key=value pair: no '=' found in '{s}'")
    })?;
    Ok((s[..pos].to_string(), s[pos + 1..].to_string()))
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("ERROR:{e}");
        process::exit(1);
    }
}

async fn open_adapter(cli: &Cli) -> docroute::Result<Arc<dyn DocumentAdapter>> {
    log::debug!("Opening store at {}", cli.data.display());
    let adapter: Arc<dyn DocumentAdapter> = match cli.backend {
        BackendArg::File => Arc::new(FileStore::open(&cli.data).await?),
        BackendArg::Tree => Arc::new(TreeStore::open(&cli.data).await?.with_namespace(&cli.namespace)),
    };
    Ok(adapter)
}

async fn open_store(cli: &Cli) -> docroute::Result<Store> {
    let options = StoreOptions {
        singleton_namespace: cli.namespace.clone(),
        ..Default::default()
    };
    Store::open(open_adapter(cli).await?, options).await
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match &cli.command {
        Command::Classify => {
            let store = open_store(&cli).await?;
            let catalog = store.catalog();
            print_output(
                &serde_json::json!({
                    "resources": catalog.resources(),
                    "ignored": catalog.ignored_keys(),
                }),
                &cli.format,
            )?;
        }

        Command::Routes => {
            let store = open_store(&cli).await?;
            let table = RouteTable::build(&store);
            print_output(&serde_json::to_value(table.describe())?, &cli.format)?;
        }

        Command::Status => {
            let store = open_store(&cli).await?;
            print_output(&store.status(), &cli.format)?;
        }

        Command::List { collection } => {
            let store = open_store(&cli).await?;
            let records = store.collection(collection)?.list().await?;
            print_output(&records, &cli.format)?;
        }

        Command::Get { resource, id } => {
            let store = open_store(&cli).await?;
            let value = match id {
                Some(id) => store.collection(resource)?.get(id).await?,
                None => store
                    .singleton(resource)?
                    .get()
                    .await?
                    .unwrap_or(serde_json::Value::Null),
            };
            print_output(&value, &cli.format)?;
        }

        Command::Insert { collection, fields } => {
            let store = open_store(&cli).await?;
            let stored = store
                .collection(collection)?
                .insert(fields_to_value(fields))
                .await?;
            print_output(&stored, &cli.format)?;
        }

        Command::Delete {
            collection,
            id,
            dry_run,
        } => {
            let store = open_store(&cli).await?;
            let records = store.collection(collection)?;
            if *dry_run {
                let record = records.get(id).await?;
                print_output(
                    &serde_json::json!({
                        "dry_run": true,
                        "would_delete": { "collection": collection, "id": id },
                        "record": record,
                    }),
                    &cli.format,
                )?;
            } else {
                records.delete(id).await?;
                print_output(&serde_json::json!({ "ok": true, "deleted": id }), &cli.format)?;
            }
        }

        Command::Migrate {
            source,
            dest,
            dry_run,
        } => {
            let document = migration::load_source(source).await?;
            if *dry_run {
                let steps: Vec<String> = plan(&document, &cli.namespace)
                    .iter()
                    .map(|s| s.describe())
                    .collect();
                print_output(
                    &serde_json::json!({ "dry_run": true, "steps": steps }),
                    &cli.format,
                )?;
            } else {
                let tree = TreeStore::open(dest).await?.with_namespace(&cli.namespace);
                let report = migration::migrate(&document, &tree).await;
                log::info!(
                    "Migrated {} into {}: {} written, {} failed",
                    source.display(),
                    dest.display(),
                    report.total_written(),
                    report.total_failed()
                );
                print_output(&serde_json::to_value(&report)?, &cli.format)?;
                if report.total_failed() > 0 {
                    return Err(format!("{} record(s) failed to migrate", report.total_failed()).into());
                }
            }
        }

        Command::Backup { dir, date } => {
            let adapter = open_adapter(&cli).await?;
            let date = date.unwrap_or_else(|| Utc::now().date_naive());
            let path = run_backup(adapter.as_ref(), dir, date).await?;
            log::info!("Backup of {} written to {}", cli.data.display(), path.display());
            print_output(
                &serde_json::json!({ "ok": true, "path": path.display().to_string() }),
                &cli.format,
            )?;
        }
    }

    Ok(())
}

fn print_output(
    value: &serde_json::Value,
    format: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
        OutputFormat::Yaml => print!("{}", serde_yaml::to_string(value)?),
    }
    Ok(())
}

fn fields_to_value(fields: &[(String, String)]) -> serde_json::Value {
    let mut map = serde_json::Map::new();
    for (key, val) in fields {
        // Try to parse as JSON value (for numbers, booleans, arrays, objects)
        let json_val = serde_json::from_str(val).unwrap_or(serde_json::Value::String(val.clone()));
        map.insert(key.clone(), json_val);
    }
    serde_json::Value::Object(map)
}
