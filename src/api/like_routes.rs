//! Like routes
//!
//! Targets are projects, datasets or publications. The status endpoint
//! answers for a batch of items keyed `type_id`, with or without a
//! wallet for personalization.

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{Map, Value};

use super::AppState;
use crate::database::like_repository::{LikeTarget, ToggleResult, TrendingItem, UserLike};
use crate::database::{LikeRepository, UserRepository};
use crate::error::{ApiError, ApiResult};

// ============================================================================
// Request types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ToggleRequest {
    pub user_wallet_address: Option<String>,
    pub target_type: Option<String>,
    pub target_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct StatusItem {
    #[serde(rename = "type")]
    pub target_type: String,
    pub id: i64,
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub user_wallet_address: Option<String>,
    #[serde(default)]
    pub items: Vec<StatusItem>,
}

#[derive(Debug, Deserialize)]
pub struct UserLikesQuery {
    #[serde(rename = "type")]
    pub target_type: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct TrendingQuery {
    #[serde(rename = "type")]
    pub target_type: Option<String>,
    pub limit: Option<i64>,
}

// ============================================================================
// Router
// ============================================================================

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/toggle", post(toggle))
        .route("/status", post(status))
        .route("/user/:wallet_address", get(user_likes))
        .route("/trending", get(trending))
}

// ============================================================================
// Handlers
// ============================================================================

async fn toggle(
    State(state): State<AppState>,
    Json(request): Json<ToggleRequest>,
) -> ApiResult<Json<ToggleResult>> {
    let (wallet, target_type, target_id) = match (
        request.user_wallet_address,
        request.target_type,
        request.target_id,
    ) {
        (Some(wallet), Some(target_type), Some(target_id)) => (wallet, target_type, target_id),
        _ => {
            return Err(ApiError::bad_request(
                "User wallet address, target type, and target ID are required",
            ))
        }
    };
    let target = LikeTarget::parse(&target_type)?;

    let users = UserRepository::new(state.pool.clone());
    let user = users
        .find_by_wallet(&wallet)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    let likes = LikeRepository::new(state.pool.clone());
    Ok(Json(likes.toggle(user.id, target, target_id).await?))
}

/// Batch like status, keyed `<type>_<id>`. Without a wallet all items
/// report unliked with their public counts.
async fn status(
    State(state): State<AppState>,
    Json(request): Json<StatusRequest>,
) -> ApiResult<Json<Value>> {
    let user_id = match &request.user_wallet_address {
        Some(wallet) => {
            let users = UserRepository::new(state.pool.clone());
            let user = users
                .find_by_wallet(wallet)
                .await?
                .ok_or_else(|| ApiError::not_found("User not found"))?;
            Some(user.id)
        }
        None => None,
    };

    let likes = LikeRepository::new(state.pool.clone());
    let mut results = Map::new();
    for item in &request.items {
        let target = LikeTarget::parse(&item.target_type)?;
        let status = likes.status(user_id, target, item.id).await?;
        results.insert(
            format!("{}_{}", item.target_type, item.id),
            serde_json::to_value(status)?,
        );
    }

    Ok(Json(Value::Object(results)))
}

async fn user_likes(
    State(state): State<AppState>,
    Path(wallet_address): Path<String>,
    Query(query): Query<UserLikesQuery>,
) -> ApiResult<Json<Vec<UserLike>>> {
    let users = UserRepository::new(state.pool.clone());
    let user = users
        .find_by_wallet(&wallet_address)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    // Reject unknown type filters before they reach the SQL
    if let Some(target_type) = &query.target_type {
        LikeTarget::parse(target_type)?;
    }

    let likes = LikeRepository::new(state.pool.clone());
    let rows = likes
        .user_likes(
            user.id,
            query.target_type.as_deref(),
            query.limit.unwrap_or(50),
            query.offset.unwrap_or(0),
        )
        .await?;
    Ok(Json(rows))
}

async fn trending(
    State(state): State<AppState>,
    Query(query): Query<TrendingQuery>,
) -> ApiResult<Json<Vec<TrendingItem>>> {
    let likes = LikeRepository::new(state.pool.clone());
    let limit = query.limit.unwrap_or(10);

    let rows = match query.target_type.as_deref() {
        None | Some("all") => likes.trending_all(limit).await?,
        Some(target_type) => {
            let target = LikeTarget::parse(target_type)?;
            likes.trending_for(target, limit).await?
        }
    };
    Ok(Json(rows))
}
