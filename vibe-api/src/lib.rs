//! Read-only REST API over the post store.
//!
//! Every route reads straight from the [`PostStore`] pool; nothing here goes
//! through the actors, so queries never wait behind ingestion.
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::{Router, routing::get};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use vibe_actors::{KeywordCategorizer, PostStore};

pub use error::ApiError;

/// A configured ingestion source as shown by `/api/v1/sources`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceInfo {
    pub id: String,
    pub platform: String,
    pub source_name: String,
    pub enabled: bool,
    pub interval_secs: u64,
}

pub struct AppState {
    pub store: PostStore,
    pub categorizer: Arc<KeywordCategorizer>,
    pub sources: Vec<SourceInfo>,
}

pub fn router(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .route("/posts", get(routes::api_posts))
        .route("/posts/counts", get(routes::api_post_counts))
        .route("/posts/{id}", get(routes::api_post_detail))
        .route("/categories", get(routes::api_categories))
        .route("/sources", get(routes::api_sources));

    Router::new()
        .route("/health", get(routes::health))
        .nest("/api/v1", api)
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
        // Method, path and status only; query strings stay out of the logs.
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    path = %request.uri().path(),
                )
            }),
        )
}

/// Serve the API on `bind` until `shutdown` fires.
pub async fn serve(
    bind: &str,
    state: Arc<AppState>,
    mut shutdown: broadcast::Receiver<()>,
) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!(addr = %listener.local_addr()?, "api.listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
        })
        .await?;
    info!("api.stopped");
    Ok(())
}
