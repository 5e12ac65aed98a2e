//! Chain status and proxy routes.
//!
//! `/api/blockchain/status` reports the simulated chain client;
//! `/api/chain/*` forwards to the configured off-chain sync service and
//! relays its responses, mapping connection failures to 502.

use axum::body::Body;
use axum::extract::{Path, RawQuery, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

use super::AppState;
use crate::chain::MOCK_CONTRACT_ADDRESS;
use crate::error::{ApiError, ApiResult};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/blockchain/status", get(blockchain_status))
        .route("/api/chain/health", get(chain_health))
        .route("/api/chain/research/latest", get(research_latest))
        .route("/api/chain/research/by-author/:address", get(research_by_author))
        .route("/api/chain/research/:research_id", get(research_by_id))
        .route("/api/chain/research/:research_id/verify", post(verify_research))
        .route("/api/chain/dataset/:dataset_id", get(chain_dataset))
}

async fn blockchain_status(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "enabled": state.chain.enabled(),
        "chainApiHealthy": false,
        "network": state.chain.network(),
        "chainApiBaseUrl": state.config.chain_api_base(),
        "contracts": {
            "ResearchNFT": MOCK_CONTRACT_ADDRESS,
        },
    }))
}

/// Forward a request to the chain API, relaying its status and body
async fn forward(
    state: &AppState,
    method: reqwest::Method,
    target_path: &str,
    query: Option<&str>,
    body: Option<Value>,
) -> ApiResult<Response> {
    let mut url = format!("{}{}", state.config.chain_api_base(), target_path);
    if let Some(query) = query {
        url.push('?');
        url.push_str(query);
    }

    let mut request = state
        .http
        .request(method.clone(), &url)
        .timeout(std::time::Duration::from_secs(10));
    if let Some(body) = body {
        request = request.json(&body);
    }

    let response = request.send().await.map_err(|e| {
        tracing::error!(%method, target_path, "chain api proxy error: {e}");
        ApiError::Upstream("Chain API request failed".to_string())
    })?;

    let status =
        StatusCode::from_u16(response.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
    let bytes = response
        .bytes()
        .await
        .map_err(|_| ApiError::Upstream("Chain API request failed".to_string()))?;

    Ok((
        status,
        [(axum::http::header::CONTENT_TYPE, "application/json")],
        Body::from(bytes),
    )
        .into_response())
}

// ============================================================================
// Proxied endpoints
// ============================================================================

async fn chain_health(State(state): State<AppState>, RawQuery(query): RawQuery) -> ApiResult<Response> {
    forward(&state, reqwest::Method::GET, "/health", query.as_deref(), None).await
}

async fn research_latest(
    State(state): State<AppState>,
    RawQuery(query): RawQuery,
) -> ApiResult<Response> {
    forward(
        &state,
        reqwest::Method::GET,
        "/api/research/latest",
        query.as_deref(),
        None,
    )
    .await
}

async fn research_by_id(
    State(state): State<AppState>,
    Path(research_id): Path<String>,
    RawQuery(query): RawQuery,
) -> ApiResult<Response> {
    forward(
        &state,
        reqwest::Method::GET,
        &format!("/api/research/{research_id}"),
        query.as_deref(),
        None,
    )
    .await
}

async fn research_by_author(
    State(state): State<AppState>,
    Path(address): Path<String>,
    RawQuery(query): RawQuery,
) -> ApiResult<Response> {
    forward(
        &state,
        reqwest::Method::GET,
        &format!("/api/research/by-author/{address}"),
        query.as_deref(),
        None,
    )
    .await
}

async fn verify_research(
    State(state): State<AppState>,
    Path(research_id): Path<String>,
    Json(body): Json<Value>,
) -> ApiResult<Response> {
    forward(
        &state,
        reqwest::Method::POST,
        &format!("/api/research/{research_id}/verify"),
        None,
        Some(body),
    )
    .await
}

async fn chain_dataset(
    State(state): State<AppState>,
    Path(dataset_id): Path<String>,
) -> ApiResult<Response> {
    forward(
        &state,
        reqwest::Method::GET,
        &format!("/api/dataset/{dataset_id}"),
        None,
        None,
    )
    .await
}
