//! HTTP application composition and the two-phase startup sequence.
//!
//! Startup connects to the database first and binds the listener only once that
//! succeeds. Failures come back as [`StartupError`]; deciding to exit the process
//! is left to the binary.

use std::future::Future;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::DefaultBodyLimit,
    middleware::from_fn_with_state,
    routing::get,
    Router,
};
use thiserror::Error;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use crate::auth::{AuthError, IdentityResolver};
use crate::config::{AppConfig, ConfigError};
use crate::database::{Database, DatabaseConnector, DatabaseError};
use crate::handlers;
use crate::middleware::attach_auth_context;

/// JSON request bodies above this size are rejected with 413.
pub const JSON_BODY_LIMIT: usize = 100 * 1024;

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: Database,
    pub resolver: Arc<dyn IdentityResolver>,
}

/// Fatal errors: any of these stops the process with exit status 1.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("{0}")]
    Config(#[from] ConfigError),

    #[error("Failed to initialise authentication: {0}")]
    Auth(#[from] AuthError),

    #[error("Error connecting to MongoDB: {0}")]
    Database(#[from] DatabaseError),

    #[error("Failed to start server: could not bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },

    #[error("Failed to start server: {0}")]
    Serve(std::io::Error),
}

/// Binds the network listener during startup.
#[async_trait]
pub trait ListenerBinder: Send + Sync {
    async fn bind(&self, addr: SocketAddr) -> std::io::Result<TcpListener>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TcpBinder;

#[async_trait]
impl ListenerBinder for TcpBinder {
    async fn bind(&self, addr: SocketAddr) -> std::io::Result<TcpListener> {
        TcpListener::bind(addr).await
    }
}

/// Build the router.
pub fn app(state: AppState) -> Router {
    let routes = Router::new()
        // Public
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        // Protected
        .nest("/api/users", handlers::users::router())
        .fallback(handlers::not_found);
    with_middleware(routes, state)
}

/// Wrap `routes` in the shared middleware stack.
///
/// Layers run outermost first: tracing, CORS, body limit, session context, then routes.
pub fn with_middleware(routes: Router<AppState>, state: AppState) -> Router {
    routes
        .layer(from_fn_with_state(state.resolver.clone(), attach_auth_context))
        .layer(DefaultBodyLimit::max(JSON_BODY_LIMIT))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Connect, bind, then serve until `shutdown` resolves.
///
/// The binder is never called unless the database connection succeeded.
pub async fn start<C, B, F>(
    config: Arc<AppConfig>,
    resolver: Arc<dyn IdentityResolver>,
    connector: &C,
    binder: &B,
    shutdown: F,
) -> Result<(), StartupError>
where
    C: DatabaseConnector + ?Sized,
    B: ListenerBinder + ?Sized,
    F: Future<Output = ()> + Send + 'static,
{
    let db = connector.connect(config.mongo_uri.expose()).await?;
    info!("Connected to database successfully: {}", db.name());

    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, config.port));
    let listener = binder
        .bind(addr)
        .await
        .map_err(|source| StartupError::Bind { addr, source })?;
    info!("server is running on {}", config.port);

    let state = AppState {
        config,
        db: db.clone(),
        resolver,
    };

    let served = axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(StartupError::Serve);

    info!("Server stopped");
    db.close().await;
    served
}

/// Resolves on SIGINT or SIGTERM.
pub async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
            (Ok(mut sigterm), Ok(mut sigint)) => {
                tokio::select! {
                    _ = sigterm.recv() => {}
                    _ = sigint.recv() => {}
                }
            }
            _ => {
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
    info!("Shutdown signal received");
}
