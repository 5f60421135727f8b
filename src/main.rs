//! WAN Show bingo backend entrypoint wiring ingestion, timers, SSE and storage.

use std::{env, net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::Router;
use tokio::{net::TcpListener, sync::watch};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wanshow_bingo_back::{
    config::AppConfig,
    dao::show_store::{MemoryShowStore, ShowStore},
    routes,
    services::{aggregate_consumer, aggregate_source, storage_supervisor, timer_service},
    state::{AppState, SharedState, aggregate_queue},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();
    let (sender, receiver) = aggregate_queue(config.ingestion.queue_capacity);
    let source_enabled = config.ingestion.source_enabled;
    let app_state = AppState::new(config, sender, env::var("HOST_PASSWORD").ok());
    if app_state.host_password().is_none() {
        warn!("HOST_PASSWORD not set; snapshot pushes are disabled");
    }

    install_storage(&app_state).await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let consumer = tokio::spawn(aggregate_consumer::run(
        app_state.clone(),
        receiver,
        shutdown_rx.clone(),
    ));
    let sweep = tokio::spawn(timer_service::run(app_state.clone(), shutdown_rx.clone()));
    if source_enabled {
        tokio::spawn(aggregate_source::run(app_state.clone(), shutdown_rx));
    }

    let app = build_router(app_state);

    let port = env::var("PORT")
        .or_else(|_| env::var("SERVER_PORT"))
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "starting server");

    let listener = TcpListener::bind(addr).await.context("binding server")?;
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving axum")?;

    let _ = shutdown_tx.send(true);
    for (name, task) in [("consumer", consumer), ("timer sweep", sweep)] {
        if let Err(err) = task.await {
            warn!(task = name, error = %err, "background task ended abnormally");
        }
    }

    Ok(())
}

/// Pick the storage backend from `STORAGE_BACKEND`; MongoDB runs under the supervisor.
async fn install_storage(state: &SharedState) -> anyhow::Result<()> {
    let backend = env::var("STORAGE_BACKEND").unwrap_or_else(|_| default_backend().into());

    match backend.as_str() {
        #[cfg(feature = "mongo-store")]
        "mongo" => {
            info!("using MongoDB storage");
            tokio::spawn(storage_supervisor::run(state.clone(), connect_mongo));
        }
        other => {
            if other != "memory" {
                warn!(backend = other, "unknown storage backend; using in-memory storage");
            }
            let path = &state.config().storage.tile_catalog_path;
            let store = MemoryShowStore::from_catalog_file(path)
                .context("loading the tile catalog for in-memory storage")?;
            info!(catalog = %path.display(), "using in-memory storage");
            state.set_show_store(Arc::new(store)).await;
        }
    }
    Ok(())
}

fn default_backend() -> &'static str {
    if cfg!(feature = "mongo-store") {
        "mongo"
    } else {
        "memory"
    }
}

#[cfg(feature = "mongo-store")]
async fn connect_mongo() -> Result<Arc<dyn ShowStore>, wanshow_bingo_back::dao::storage::StorageError>
{
    use wanshow_bingo_back::dao::show_store::mongodb::{MongoConfig, MongoShowStore};

    let config = MongoConfig::from_env().await?;
    let store = MongoShowStore::connect(config).await?;
    Ok(Arc::new(store))
}

/// Build the top-level router and attach cross-cutting middleware layers.
fn build_router(state: SharedState) -> Router<()> {
    routes::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Configure tracing subscribers so logs include spans by default.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for Ctrl+C or SIGTERM and shut the server down gracefully.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = term.recv() => {},
                }
            }
            Err(err) => {
                warn!(error = %err, "failed to install SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
