//! Kiosk session server binary entrypoint wiring REST, storage, and sweeper layers.

use std::{env, net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod dao;
mod dto;
mod error;
mod routes;
mod services;
mod state;

use config::AppConfig;
use dao::session_store::memory::MemorySessionStore;
use state::{AppState, SharedState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let app_state = AppState::new(AppConfig::load());

    tokio::spawn(run_storage(app_state.clone()));
    tokio::spawn(services::session_sweeper::run(app_state.clone()));
    // Build the HTTP router once the shared state is ready.
    let app = build_router(app_state);

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

    Ok(())
}

/// Install the storage backend selected by the environment.
///
/// With `COUCH_BASE_URL` set (and the feature compiled in) the CouchDB
/// backend runs under the reconnecting supervisor; otherwise the
/// process-local in-memory store is installed immediately.
async fn run_storage(state: SharedState) {
    #[cfg(feature = "couch-store")]
    if env::var("COUCH_BASE_URL").is_ok() {
        use dao::session_store::SessionStore;
        use dao::session_store::couchdb::{CouchConfig, CouchSessionStore};
        use dao::storage::StorageError;

        services::storage_supervisor::run(state, || async {
            let config = CouchConfig::from_env()?;
            let store = CouchSessionStore::connect(config).await?;
            Ok::<Arc<dyn SessionStore>, StorageError>(Arc::new(store))
        })
        .await;
        return;
    }

    info!("using in-memory session store");
    state
        .install_session_store(Arc::new(MemorySessionStore::new()))
        .await;
}

/// Build the top-level router and attach cross-cutting middleware layers.
fn build_router(state: state::SharedState) -> Router<()> {
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
}
