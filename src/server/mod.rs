//! HTTP Service
//!
//! Exposes the usage tracker over JSON/HTTP. The caller is identified by the
//! bearer token of the `Authorization` header; every usage route is scoped to
//! that owner.
//!
//! # Routes
//!
//! | Method | Path                       | Operation                          |
//! |--------|----------------------------|------------------------------------|
//! | GET    | `/`                        | banner                             |
//! | GET    | `/health`                  | liveness                           |
//! | GET    | `/metrics`                 | Prometheus text (when enabled)     |
//! | GET    | `/models`                  | catalog                            |
//! | GET    | `/models/{name}`           | one definition                     |
//! | POST   | `/models/{name}/track`     | record consumption                 |
//! | GET    | `/models/{name}/usage`     | current usage                      |
//! | DELETE | `/models/{name}/usage`     | forget usage of one model          |
//! | GET    | `/models/{name}/remaining` | remaining quota                    |
//! | GET    | `/me`                      | all usage of the owner             |
//! | DELETE | `/me`                      | forget all (or `?models=a,b`)      |
//! | POST   | `/select`                  | models with quota, by priority     |

pub mod auth;
pub mod error;
pub mod handlers;

use anyhow::{Context, Result};
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::Config;
use crate::quota::{store, Catalog, UsageTracker};

pub use error::ApiError;

/// State shared by all handlers
#[derive(Debug, Clone)]
pub struct AppState {
    pub tracker: Arc<UsageTracker>,

    /// Whether `/metrics` is routed
    pub metrics_enabled: bool,
}

impl AppState {
    pub fn new(tracker: UsageTracker) -> Self {
        Self {
            tracker: Arc::new(tracker),
            metrics_enabled: true,
        }
    }

    pub fn with_metrics(mut self, enabled: bool) -> Self {
        self.metrics_enabled = enabled;
        self
    }

    /// Load the catalog and build the configured store
    ///
    /// # Errors
    ///
    /// Fails if the catalog cannot be loaded or the store cannot be built.
    pub fn from_config(config: &Config) -> Result<Self> {
        let catalog = Catalog::load_from_path(&config.catalog.path).with_context(|| {
            format!("Failed to load model catalog from {:?}", config.catalog.path)
        })?;
        info!(
            models = catalog.len(),
            path = %config.catalog.path.display(),
            "Loaded model catalog"
        );

        let store = store::from_config(&config.store).context("Failed to build usage store")?;
        info!(backend = %config.store.backend, "Usage store ready");

        let tracker = UsageTracker::new(store, Arc::new(catalog))
            .with_store_timeout(config.store.call_timeout());

        Ok(Self::new(tracker).with_metrics(config.metrics.enabled))
    }
}

/// Build the application router
pub fn router(state: AppState) -> Router {
    let mut router = Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .route("/models", get(handlers::list_models))
        .route("/models/{name}", get(handlers::get_model))
        .route("/models/{name}/track", post(handlers::track))
        .route(
            "/models/{name}/usage",
            get(handlers::get_usage).delete(handlers::delete_usage),
        )
        .route("/models/{name}/remaining", get(handlers::remaining))
        .route(
            "/me",
            get(handlers::list_usages).delete(handlers::delete_usages),
        )
        .route("/select", post(handlers::select));

    if state.metrics_enabled {
        router = router.route("/metrics", get(handlers::metrics_text));
    }

    router.layer(TraceLayer::new_for_http()).with_state(state)
}

/// Serve the router on the configured address until Ctrl-C
pub async fn start_server(config: &Config, state: AppState) -> Result<()> {
    if state.metrics_enabled {
        crate::metrics::init().context("Failed to initialize metrics")?;
    }

    let addr = config.server.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("Listening on {}", addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
