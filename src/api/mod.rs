//! HTTP API layer
//!
//! One route module per resource group, each exposing `router()`. Shared
//! state is injected through axum's `State` extractor; handlers validate,
//! call into the repositories and serialize plain JSON.

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};
use sqlx::SqlitePool;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::activity::ActivityLogger;
use crate::chain::ChainClient;
use crate::config::AppConfig;
use crate::storage::UploadStore;
use crate::zk::ProofVerifier;

pub mod auth_routes;
pub mod chain_routes;
pub mod dataset_routes;
pub mod download_routes;
pub mod influence_routes;
pub mod kanban_routes;
pub mod like_routes;
pub mod log_routes;
pub mod nft_routes;
pub mod project_routes;
pub mod publication_dataset_routes;
pub mod publication_routes;
pub mod review_routes;
pub mod user_routes;

/// Shared application state, cheap to clone per request
#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub config: AppConfig,
    pub chain: Arc<dyn ChainClient>,
    pub verifier: Arc<dyn ProofVerifier>,
    pub activity: ActivityLogger,
    pub http: reqwest::Client,
    pub uploads: UploadStore,
}

/// Assemble the full application router
pub fn router(state: AppState) -> Router {
    let uploads_root = state.uploads.root().to_path_buf();

    Router::new()
        .nest("/api/auth", auth_routes::router())
        .nest("/api/users", user_routes::router())
        .nest("/api/projects", project_routes::router())
        .nest("/api/kanban", kanban_routes::router())
        .nest("/api/datasets", dataset_routes::router())
        .nest("/api/reviews", review_routes::router())
        .nest("/api/publications", publication_routes::router())
        .nest("/api/publication-datasets", publication_dataset_routes::router())
        .nest("/api/nfts", nft_routes::router())
        .nest("/api/likes", like_routes::router())
        .nest("/api/logs", log_routes::router())
        .nest("/api/influence", influence_routes::router())
        .merge(chain_routes::router())
        .merge(download_routes::router())
        .route("/api/health", get(health))
        .nest_service("/uploads", ServeDir::new(uploads_root))
        // Uploads go up to 100 MB per file
        .layer(DefaultBodyLimit::max(100 * 1024 * 1024))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "timestamp": crate::database::now_timestamp(),
    }))
}
