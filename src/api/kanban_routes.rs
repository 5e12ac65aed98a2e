//! Kanban board routes

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

use super::AppState;
use crate::database::kanban_repository::Board;
use crate::database::{KanbanRepository, UserRepository};
use crate::error::{ApiError, ApiResult};

#[derive(Debug, Deserialize)]
pub struct CreateCardRequest {
    pub column_id: Option<i64>,
    pub content: Option<String>,
    pub creator_wallet_address: Option<String>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/iterations/:project_id/current", get(current_board))
        .route("/cards", post(create_card))
}

// ============================================================================
// Handlers
// ============================================================================

/// Current board for a project; first access creates the iteration and
/// its default columns.
async fn current_board(
    State(state): State<AppState>,
    Path(project_id): Path<i64>,
) -> ApiResult<Json<Board>> {
    let repo = KanbanRepository::new(state.pool.clone());
    Ok(Json(repo.current_board(project_id).await?))
}

async fn create_card(
    State(state): State<AppState>,
    Json(request): Json<CreateCardRequest>,
) -> ApiResult<Response> {
    let (column_id, content, wallet) = match (
        request.column_id,
        request.content.filter(|c| !c.is_empty()),
        request.creator_wallet_address,
    ) {
        (Some(column_id), Some(content), Some(wallet)) => (column_id, content, wallet),
        _ => {
            return Err(ApiError::bad_request(
                "Column ID, content, and creator wallet address are required.",
            ))
        }
    };

    let users = UserRepository::new(state.pool.clone());
    let creator = users
        .find_by_wallet(&wallet)
        .await?
        .ok_or_else(|| ApiError::not_found("Creator not found."))?;

    let repo = KanbanRepository::new(state.pool.clone());
    let card_id = repo.create_card(column_id, &content, creator.id).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "Card created successfully.", "cardId": card_id })),
    )
        .into_response())
}
