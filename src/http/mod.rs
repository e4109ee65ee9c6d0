use std::net::SocketAddr;
use std::sync::Arc;
use anyhow::Context;
use axum::extract::DefaultBodyLimit;
use axum::{middleware, Router};
use axum_macros::FromRef;
use tokio::sync::RwLock;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
pub use error::{ApiError, ApiJson, QueryPairs};
use crate::config::Config;
use crate::http::rate_limit::RateLimiter;
use crate::store::BlogStore;

mod error;
mod controllers;
pub mod rate_limit;

pub type Result<T, E = ApiError> = std::result::Result<T, E>;

pub type SharedStore = Arc<RwLock<BlogStore>>;

#[derive(Clone, FromRef)]
pub struct ApiContext {
    pub cfg: Arc<Config>,
    pub store: SharedStore,
    pub limiter: Arc<RateLimiter>,
}

impl ApiContext {
    pub fn new(config: Config, store: BlogStore) -> Self {
        let limiter = RateLimiter::new(&config.rate_limit);
        Self {
            cfg: Arc::new(config),
            store: Arc::new(RwLock::new(store)),
            limiter: Arc::new(limiter),
        }
    }
}

pub fn router(ctx: ApiContext) -> Router {
    controllers::router()
        .fallback(controllers::not_found)
        .layer(middleware::from_fn_with_state(ctx.limiter.clone(), rate_limit::limit_by_ip))
        .layer(DefaultBodyLimit::max(ctx.cfg.api.body_limit))
        .layer(CorsLayer::new()
            .allow_methods(Any)
            .allow_headers(Any)
            .allow_origin(Any))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(ctx)
}

pub async fn serve(ctx: ApiContext) -> anyhow::Result<()> {
    let addr = ctx.cfg.api.bind_addr;
    let pruning = tokio::spawn(rate_limit::prune_periodically(ctx.limiter.clone()));
    let app = router(ctx);

    let listener = tokio::net::TcpListener::bind(addr).await
        .with_context(|| format!("failed to bind to address {addr}"))?;
    info!("listening on {}", &addr);
    let result = axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("error running HTTP server");
    pruning.abort();
    info!("HTTP server stopped");
    result
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for Ctrl+C: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => { signal.recv().await; }
            Err(err) => {
                tracing::error!("failed to listen for SIGTERM: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received, draining connections...");
}
