//! esports-mentions binary entrypoint wiring REST, SSE, notification and storage layers.

use std::{env, net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::Router;
use futures::future::BoxFuture;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[cfg(feature = "couch-store")]
use esports_mentions::dao::store::couchdb::{CouchConfig, CouchPlatformStore};
#[cfg(feature = "mongo-store")]
use esports_mentions::dao::store::mongodb::{MongoConfig, MongoPlatformStore};
use esports_mentions::{
    config::{AppConfig, BackendKind},
    dao::{
        storage::StorageError,
        store::{PlatformStore, memory::MemoryStore},
    },
    routes,
    services::{notifier, sse_service, storage_supervisor},
    state::{AppState, SharedState},
};

type ConnectFuture = BoxFuture<'static, Result<Arc<dyn PlatformStore>, StorageError>>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();
    let backend = BackendKind::from_env();
    info!(?backend, "selected storage backend");

    let (app_state, notifications) = AppState::new(config);

    tokio::spawn(notifier::run(app_state.clone(), notifications));
    tokio::spawn(sse_service::forward_system_status(app_state.clone()));
    tokio::spawn(storage_supervisor::run(app_state.clone(), connector(backend)));
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

/// Connection factory handed to the storage supervisor.
fn connector(backend: BackendKind) -> impl FnMut() -> ConnectFuture + Send + 'static {
    let memory = MemoryStore::new();
    move || -> ConnectFuture {
        match backend {
            BackendKind::Memory => {
                let store = memory.clone();
                Box::pin(async move { Ok(Arc::new(store) as Arc<dyn PlatformStore>) })
            }
            #[cfg(feature = "mongo-store")]
            BackendKind::Mongo => Box::pin(async {
                let config = MongoConfig::from_env().await?;
                let store = MongoPlatformStore::connect(config).await?;
                Ok::<Arc<dyn PlatformStore>, StorageError>(Arc::new(store))
            }),
            #[cfg(feature = "couch-store")]
            BackendKind::Couch => Box::pin(async {
                let config = CouchConfig::from_env()?;
                let store = CouchPlatformStore::connect(config).await?;
                Ok::<Arc<dyn PlatformStore>, StorageError>(Arc::new(store))
            }),
            #[allow(unreachable_patterns)]
            other => Box::pin(async move {
                Err(StorageError::unavailable(
                    format!("{other:?} backend not compiled in"),
                    std::io::Error::other("missing cargo feature"),
                ))
            }),
        }
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

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = term.recv() => {},
                }
            }
            Err(err) => {
                warn!(error = %err, "failed to install SIGTERM handler; waiting for Ctrl+C only");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
    info!("shutdown signal received");
}
