//! Starport Back binary entrypoint wiring the player store, the persistence triggers, and REST.

use std::{env, net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use starport_back::{
    config::AppConfig,
    dao::player_store::{PlayerStore, memory::MemoryPlayerStore},
    routes,
    services::{autosave, player_data_manager::PlayerDataManager, session_service, storage_supervisor},
    state::{AppState, SharedState},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();
    let store = connect_store().await?;
    let manager = PlayerDataManager::new(store, config.manager_settings());
    let app_state = AppState::new(manager, config);

    tokio::spawn(storage_supervisor::run(app_state.clone()));
    tokio::spawn(autosave::run(app_state.clone()));

    // Build the HTTP router once the shared state is ready.
    let app = build_router(app_state.clone());

    let port = env::var("PORT")
        .or_else(|_| env::var("SERVER_PORT"))
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "starting server");

    let listener = TcpListener::bind(addr).await.context("binding server")?;
    let service = app.into_make_service();
    axum::serve(listener, service)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving axum")?;

    let sessions = app_state.sessions().len();
    let failures = session_service::flush_all(&app_state).await;
    info!(sessions, failures, "final flush complete");

    Ok(())
}

/// Build the player store selected by `STORE_BACKEND`.
async fn connect_store() -> anyhow::Result<Arc<dyn PlayerStore>> {
    let backend = env::var("STORE_BACKEND").unwrap_or_else(|_| "mongo".into());
    match backend.as_str() {
        "memory" => {
            warn!("using the in-memory player store; state is lost on exit");
            Ok(Arc::new(MemoryPlayerStore::new()))
        }
        #[cfg(feature = "mongo-store")]
        "mongo" => {
            use starport_back::dao::player_store::mongodb::{MongoPlayerStore, connect};

            let uri = env::var("MONGO_URI").unwrap_or_else(|_| "mongodb://localhost:27017".into());
            let db_name = env::var("MONGO_DB").ok();
            let mongo = connect(&uri, db_name.as_deref())
                .await
                .context("connecting to MongoDB")?;
            let store = MongoPlayerStore::new(mongo);
            store
                .ensure_indexes()
                .await
                .context("ensuring MongoDB indexes")?;
            info!("connected to MongoDB player store");
            Ok(Arc::new(store))
        }
        other => anyhow::bail!("unsupported STORE_BACKEND `{other}`"),
    }
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

        let mut term = signal(SignalKind::terminate()).expect("install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = term.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    info!("shutdown requested; flushing open sessions");
}
