use actix_web::{middleware, web, App, HttpServer};
use docroute::backup::BackupScheduler;
use docroute::{DocumentAdapter, FileStore, RouteTable, Store, StoreOptions, TreeStore};
use std::sync::Arc;

mod config;
mod handlers;
mod keepalive;

use config::{Backend, ServerConfig};

/// Shared application state
pub struct AppState {
    pub table: RouteTable,
}

async fn open_adapter(config: &ServerConfig) -> docroute::Result<Arc<dyn DocumentAdapter>> {
    log::info!("Opening {:?} store at: {}", config.backend, config.data.display());
    let adapter: Arc<dyn DocumentAdapter> = match config.backend {
        Backend::File => Arc::new(FileStore::open(&config.data).await?),
        Backend::Tree => Arc::new(
            TreeStore::open(&config.data)
                .await?
                .with_namespace(&config.singleton_namespace)
                .with_id_strategy(config.id_strategy),
        ),
    };
    Ok(adapter)
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenvy::dotenv().ok();
    env_logger::init();
    log::info!("Starting docroute server");

    let config = ServerConfig::from_env().map_err(std::io::Error::other)?;

    let adapter = open_adapter(&config).await.map_err(std::io::Error::other)?;
    let options = StoreOptions {
        singleton_namespace: config.singleton_namespace.clone(),
        id_strategy: config.id_strategy,
    };
    let store = Store::open(adapter.clone(), options)
        .await
        .map_err(std::io::Error::other)?;
    let table = RouteTable::build(&store);
    for route in table.describe() {
        log::debug!("  {} {} -> {}", route.method, route.path, route.resource);
    }

    let state = web::Data::new(AppState { table });

    log::info!("Listening on {}:{}", config.host, config.port);
    let server = HttpServer::new(move || {
        let state = state.clone();
        App::new()
            .wrap(middleware::Logger::default())
            .app_data(state.clone())
            .configure(|cfg| handlers::configure(cfg, &state.table))
    })
    .workers(config.workers)
    .bind((config.host.as_str(), config.port))?
    .run();

    let backup = BackupScheduler::new(adapter, &config.backup_dir, config.backup_schedule).spawn();
    let pinger = config
        .keepalive
        .map(|every| keepalive::spawn(config.ping_url(), every));

    let result = server.await;

    backup.abort();
    if let Some(pinger) = pinger {
        pinger.abort();
    }
    log::info!("HTTP server closed");
    result
}
