//! Public user profile and dashboard routes

use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};

use super::AppState;
use crate::database::project_repository::ProjectWithOwner;
use crate::database::user_repository::{DashboardStats, PublicUser};
use crate::database::{ProjectRepository, UserRepository};
use crate::error::{ApiError, ApiResult};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/wallet/:wallet_address", get(profile_by_wallet))
        .route("/wallet/:wallet_address/dashboard-stats", get(dashboard_by_wallet))
        .route("/username/:username", get(profile_by_username))
        .route("/:user_id/projects", get(public_projects))
        .route("/:user_id/dashboard-stats", get(dashboard_by_id))
}

// ============================================================================
// Handlers
// ============================================================================

/// Public profile lookup; wallet matching ignores case
async fn profile_by_wallet(
    State(state): State<AppState>,
    Path(wallet_address): Path<String>,
) -> ApiResult<Json<PublicUser>> {
    let repo = UserRepository::new(state.pool.clone());
    let user = repo
        .find_by_wallet_ci(&wallet_address)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;
    Ok(Json(user.into()))
}

async fn profile_by_username(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> ApiResult<Json<PublicUser>> {
    let repo = UserRepository::new(state.pool.clone());
    let user = repo
        .find_by_username(&username)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;
    Ok(Json(user.into()))
}

/// Public projects owned by the user
async fn public_projects(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> ApiResult<Json<Vec<ProjectWithOwner>>> {
    let projects = ProjectRepository::new(state.pool.clone());
    Ok(Json(projects.public_projects_for_owner(user_id).await?))
}

async fn dashboard_by_id(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> ApiResult<Json<DashboardStats>> {
    let repo = UserRepository::new(state.pool.clone());
    if repo.find_by_id(user_id).await?.is_none() {
        return Err(ApiError::not_found("User not found"));
    }
    Ok(Json(repo.dashboard_stats(user_id).await?))
}

async fn dashboard_by_wallet(
    State(state): State<AppState>,
    Path(wallet_address): Path<String>,
) -> ApiResult<Json<DashboardStats>> {
    let repo = UserRepository::new(state.pool.clone());
    let user = repo
        .find_by_wallet_ci(&wallet_address)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;
    Ok(Json(repo.dashboard_stats(user.id).await?))
}
