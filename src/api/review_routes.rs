//! Peer review routes
//!
//! Responses carry both the stored snake_case columns and the camelCase
//! aliases the review dashboard consumes, with authors and keywords
//! parsed back into arrays.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};

use super::AppState;
use crate::database::review_repository::{NewReview, ReviewUpdate, ReviewWithReviewer};
use crate::database::{ReviewRepository, UserRepository};
use crate::error::{ApiError, ApiResult};

// ============================================================================
// Request types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateReviewRequest {
    pub paper_title: Option<String>,
    pub authors: Option<Value>,
    #[serde(rename = "abstract")]
    pub abstract_text: Option<String>,
    pub keywords: Option<Value>,
    pub category: Option<String>,
    pub journal: Option<String>,
    pub urgency: Option<String>,
    pub reviewer_wallet_address: Option<String>,
    pub deadline: Option<String>,
    pub estimated_hours: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateReviewRequest {
    pub status: Option<String>,
    pub progress: Option<i64>,
    pub review_content: Option<String>,
    pub rating: Option<f64>,
    pub revision_requested: Option<bool>,
    #[serde(default)]
    pub is_draft_save: bool,
}

// ============================================================================
// Router
// ============================================================================

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_review))
        .route("/user/:wallet_address", get(reviews_for_user))
        .route("/:review_id", get(get_review).put(update_review).delete(delete_review))
        .route("/:review_id/start", post(start_review))
}

/// Row plus the camelCase aliases and parsed JSON arrays clients expect
fn format_review(review: &ReviewWithReviewer) -> Result<Value, serde_json::Error> {
    let mut body = serde_json::to_value(review)?;

    let authors: Value = review
        .review
        .authors
        .as_deref()
        .and_then(|raw| serde_json::from_str(raw).ok())
        .unwrap_or_else(|| json!([]));
    let keywords: Value = review
        .review
        .keywords
        .as_deref()
        .and_then(|raw| serde_json::from_str(raw).ok())
        .unwrap_or_else(|| json!([]));

    body["paperTitle"] = json!(review.review.paper_title);
    body["assignedAt"] = json!(review.review.assigned_at);
    body["reviewId"] = json!(review.review.review_id);
    body["estimatedHours"] = json!(review.review.estimated_hours);
    body["completedAt"] = json!(review.review.completed_at);
    body["submittedAt"] = json!(review.review.submitted_at);
    body["reviewContent"] = json!(review.review.review_content);
    body["startedAt"] = json!(review.review.started_at);
    body["authors"] = authors;
    body["keywords"] = keywords;
    Ok(body)
}

// ============================================================================
// Handlers
// ============================================================================

async fn reviews_for_user(
    State(state): State<AppState>,
    Path(wallet_address): Path<String>,
) -> ApiResult<Json<Vec<Value>>> {
    let users = UserRepository::new(state.pool.clone());
    let user = users
        .find_by_wallet(&wallet_address)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    let reviews = ReviewRepository::new(state.pool.clone());
    let rows = reviews.list_for_reviewer(user.id).await?;
    let formatted = rows
        .iter()
        .map(format_review)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Json(formatted))
}

async fn get_review(
    State(state): State<AppState>,
    Path(review_id): Path<i64>,
) -> ApiResult<Json<Value>> {
    let reviews = ReviewRepository::new(state.pool.clone());
    let review = reviews
        .find(review_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Review not found"))?;
    Ok(Json(format_review(&review)?))
}

async fn create_review(
    State(state): State<AppState>,
    Json(request): Json<CreateReviewRequest>,
) -> ApiResult<Response> {
    let (paper_title, authors, wallet) = match (
        request.paper_title,
        request.authors,
        request.reviewer_wallet_address,
    ) {
        (Some(title), Some(authors), Some(wallet)) => (title, authors, wallet),
        _ => {
            return Err(ApiError::bad_request(
                "Paper title, authors, and reviewer wallet address are required",
            ))
        }
    };

    let users = UserRepository::new(state.pool.clone());
    let reviewer = users
        .find_by_wallet(&wallet)
        .await?
        .ok_or_else(|| ApiError::not_found("Reviewer not found"))?;

    let new = NewReview {
        paper_title,
        authors_json: authors.to_string(),
        abstract_text: request.abstract_text,
        keywords_json: request.keywords.unwrap_or_else(|| json!([])).to_string(),
        category: request.category,
        journal: request.journal,
        urgency: request.urgency.unwrap_or_else(|| "Medium".into()),
        reviewer_id: reviewer.id,
        deadline: request.deadline,
        estimated_hours: request.estimated_hours.unwrap_or(8),
    };

    let reviews = ReviewRepository::new(state.pool.clone());
    let review = reviews.create(&new).await?;

    Ok((StatusCode::CREATED, Json(format_review(&review)?)).into_response())
}

async fn update_review(
    State(state): State<AppState>,
    Path(review_id): Path<i64>,
    Json(request): Json<UpdateReviewRequest>,
) -> ApiResult<Json<Value>> {
    let update = ReviewUpdate {
        status: request.status,
        progress: request.progress,
        review_content: request.review_content,
        rating: request.rating,
        revision_requested: request.revision_requested,
        is_draft_save: request.is_draft_save,
    };

    let reviews = ReviewRepository::new(state.pool.clone());
    let review = reviews
        .update(review_id, &update)
        .await?
        .ok_or_else(|| ApiError::not_found("Review not found"))?;
    Ok(Json(format_review(&review)?))
}

/// Move a Pending review into In Progress, stamping `started_at`
async fn start_review(
    State(state): State<AppState>,
    Path(review_id): Path<i64>,
) -> ApiResult<Json<Value>> {
    let reviews = ReviewRepository::new(state.pool.clone());
    if reviews.find(review_id).await?.is_none() {
        return Err(ApiError::not_found("Review not found"));
    }

    let review = reviews
        .start(review_id)
        .await?
        .ok_or_else(|| ApiError::bad_request("Review is not in pending status"))?;
    Ok(Json(format_review(&review)?))
}

async fn delete_review(
    State(state): State<AppState>,
    Path(review_id): Path<i64>,
) -> ApiResult<Json<Value>> {
    let reviews = ReviewRepository::new(state.pool.clone());
    if !reviews.delete(review_id).await? {
        return Err(ApiError::not_found("Review not found"));
    }
    Ok(Json(json!({ "message": "Review deleted successfully" })))
}
