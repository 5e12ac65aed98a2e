//! Publication to dataset linking routes

use axum::extract::{Path, Query, State};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};

use super::AppState;
use crate::database::publication_repository::{AvailableDataset, LinkedDataset, LinkedPublication};
use crate::database::{DatasetRepository, PublicationRepository};
use crate::error::{ApiError, ApiResult};

#[derive(Debug, Deserialize)]
pub struct LinkRequest {
    pub publication_id: Option<i64>,
    pub dataset_id: Option<i64>,
    pub relationship_type: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AvailableQuery {
    pub publication_id: Option<i64>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/publication/:publication_id/datasets", get(datasets_for_publication))
        .route("/dataset/:dataset_id/publications", get(publications_for_dataset))
        .route("/link", post(link))
        .route("/unlink", delete(unlink))
        .route("/user/:user_id/available-datasets", get(available_datasets))
}

// ============================================================================
// Handlers
// ============================================================================

async fn datasets_for_publication(
    State(state): State<AppState>,
    Path(publication_id): Path<i64>,
) -> ApiResult<Json<Vec<LinkedDataset>>> {
    let publications = PublicationRepository::new(state.pool.clone());
    Ok(Json(publications.linked_datasets(publication_id).await?))
}

async fn publications_for_dataset(
    State(state): State<AppState>,
    Path(dataset_id): Path<i64>,
) -> ApiResult<Json<Vec<LinkedPublication>>> {
    let publications = PublicationRepository::new(state.pool.clone());
    Ok(Json(publications.linked_publications(dataset_id).await?))
}

/// Link a paper to a dataset it uses. Relinking an existing pair
/// replaces the relationship.
async fn link(
    State(state): State<AppState>,
    Json(request): Json<LinkRequest>,
) -> ApiResult<Json<Value>> {
    let (publication_id, dataset_id) = match (request.publication_id, request.dataset_id) {
        (Some(p), Some(d)) => (p, d),
        _ => {
            return Err(ApiError::bad_request(
                "Publication ID and Dataset ID are required",
            ))
        }
    };

    let publications = PublicationRepository::new(state.pool.clone());
    if !publications.exists(publication_id).await? {
        return Err(ApiError::not_found("Publication not found"));
    }

    let datasets = DatasetRepository::new(state.pool.clone());
    if datasets.find(dataset_id).await?.is_none() {
        return Err(ApiError::not_found("Dataset not found"));
    }

    let relationship_type = request.relationship_type.as_deref().unwrap_or("used");
    let link_id = publications
        .link_dataset(
            publication_id,
            dataset_id,
            relationship_type,
            request.description.as_deref(),
        )
        .await?;

    Ok(Json(json!({
        "id": link_id,
        "publication_id": publication_id,
        "dataset_id": dataset_id,
        "relationship_type": relationship_type,
        "description": request.description,
        "message": "Successfully linked publication and dataset",
    })))
}

async fn unlink(
    State(state): State<AppState>,
    Json(request): Json<LinkRequest>,
) -> ApiResult<Json<Value>> {
    let (publication_id, dataset_id) = match (request.publication_id, request.dataset_id) {
        (Some(p), Some(d)) => (p, d),
        _ => {
            return Err(ApiError::bad_request(
                "Publication ID and Dataset ID are required",
            ))
        }
    };

    let publications = PublicationRepository::new(state.pool.clone());
    if !publications.unlink_dataset(publication_id, dataset_id).await? {
        return Err(ApiError::not_found("Link not found"));
    }

    Ok(Json(json!({ "message": "Successfully unlinked publication and dataset" })))
}

/// Datasets the user owns that can still be linked to the publication
/// named in the query.
async fn available_datasets(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    Query(query): Query<AvailableQuery>,
) -> ApiResult<Json<Vec<AvailableDataset>>> {
    let publications = PublicationRepository::new(state.pool.clone());
    let rows = publications
        .available_datasets(user_id, query.publication_id)
        .await?;
    Ok(Json(rows))
}
