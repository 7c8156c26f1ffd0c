//! REST API over the habitat store.
//!
//! Handlers are thin: they translate HTTP into storage and paginator calls
//! and map typed errors onto status codes (see [`error::ApiError`]).

mod auth;
mod community;
mod error;
mod posts;

use anyhow::{Context, Result};
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::feed::{PageLimits, Paginator};
use crate::storage::Database;

pub use auth::{AuthUser, Claims, MaybeAuthUser, TokenError, TokenManager};
pub use error::{ApiError, ApiResult};

/// Shared handler state. Every field is a cheap `Clone` handle.
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub paginator: Paginator,
    pub tokens: TokenManager,
    pub limits: PageLimits,
    pub max_images: usize,
}

impl AppState {
    pub fn new(db: Database, tokens: TokenManager, limits: PageLimits, max_images: usize) -> Self {
        Self {
            paginator: Paginator::new(db.clone()),
            db,
            tokens,
            limits,
            max_images,
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/posts", post(posts::create_post))
        .route("/posts/habitats/:habitat_id", get(posts::list_feed))
        .route(
            "/posts/:id",
            get(posts::get_post)
                .patch(posts::update_post)
                .delete(posts::delete_post),
        )
        .route("/posts/:id/hearts", post(posts::toggle_heart))
        .route("/comments", post(posts::create_comment))
        .route("/users", post(community::create_user))
        .route("/users/:id", get(community::get_user))
        .route("/users/:id/posts", get(community::list_user_posts))
        .route(
            "/species",
            get(community::list_species).post(community::create_species),
        )
        .route(
            "/habitats",
            get(community::list_habitats).post(community::create_habitat),
        )
        .route("/habitats/:id", get(community::get_habitat))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

async fn health_check() -> &'static str {
    "ok"
}

/// Bind `addr` and serve until Ctrl+C or SIGTERM, letting in-flight
/// requests finish.
pub async fn serve(addr: &str, state: AppState) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    let local = listener.local_addr().context("Listener has no local address")?;
    tracing::info!(addr = %local, "Habitat API listening");

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("Received Ctrl+C, shutting down"),
            Err(e) => {
                tracing::warn!(error = %e, "Ctrl+C handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM, shutting down");
            }
            Err(e) => {
                tracing::warn!(error = %e, "SIGTERM handler unavailable");
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
}
