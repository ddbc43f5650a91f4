//! Trivia Party Back binary entrypoint wiring REST, SSE, the session store and the deadline sweeper.

use std::{env, net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use trivia_party_back::{
    config::AppConfig,
    dao::session_store::memory::MemorySessionStore,
    routes,
    services::{expiry_supervisor, moderation::RustrictModerator},
    state::{AppState, SharedState},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let app_state = AppState::new(AppConfig::load(), Arc::new(RustrictModerator));

    match env::var("MONGO_URI").ok() {
        Some(uri) => spawn_mongo_store(app_state.clone(), uri),
        None => {
            info!("MONGO_URI not set; sessions are kept in memory only");
            app_state
                .set_session_store(Arc::new(MemorySessionStore::new()))
                .await;
        }
    }

    tokio::spawn(expiry_supervisor::run(app_state.clone()));

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

/// Connect to MongoDB in the background; the server stays degraded until it answers.
#[cfg(feature = "mongo-store")]
fn spawn_mongo_store(state: SharedState, uri: String) {
    use trivia_party_back::dao::{
        session_store::{
            SessionStore,
            mongodb::{MongoConfig, MongoSessionStore},
        },
        storage::StorageError,
    };
    use trivia_party_back::services::storage_supervisor;

    let db_name = env::var("MONGO_DB").ok();
    tokio::spawn(storage_supervisor::run(state, move || {
        let uri = uri.clone();
        let db_name = db_name.clone();
        async move {
            let config = MongoConfig::from_uri(&uri, db_name.as_deref()).await?;
            let store = MongoSessionStore::connect(config).await?;
            Ok::<_, StorageError>(Arc::new(store) as Arc<dyn SessionStore>)
        }
    }));
}

#[cfg(not(feature = "mongo-store"))]
fn spawn_mongo_store(state: SharedState, _uri: String) {
    tracing::warn!("MONGO_URI set but the mongo-store feature is disabled; using memory store");
    tokio::spawn(async move {
        state
            .set_session_store(Arc::new(MemorySessionStore::new()))
            .await;
    });
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
                error!(error = %err, "failed to install SIGTERM handler; waiting for Ctrl+C only");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
