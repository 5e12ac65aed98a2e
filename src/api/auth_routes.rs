//! Wallet login, profile management and ORCID verification routes
//!
//! There is no session layer; callers identify themselves by wallet
//! address on every request. Login is an upsert keyed on the address.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use base64::prelude::{Engine, BASE64_STANDARD};
use serde::Deserialize;
use serde_json::{json, Value};

use super::AppState;
use crate::activity::ActivityEntry;
use crate::database::user_repository::ProfileUpdate;
use crate::database::UserRepository;
use crate::error::{ApiError, ApiResult};

// ============================================================================
// Request types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(rename = "walletAddress")]
    pub wallet_address: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ProfileRequest {
    #[serde(rename = "walletAddress")]
    pub wallet_address: Option<String>,
    pub email: Option<String>,
    pub username: Option<String>,
    pub github_username: Option<String>,
    pub personal_website: Option<String>,
    pub organization: Option<String>,
    pub research_interests: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct InterestsRequest {
    #[serde(rename = "walletAddress")]
    pub wallet_address: Option<String>,
    pub interests: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct OrcidStartQuery {
    #[serde(rename = "walletAddress")]
    pub wallet_address: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct OrcidCallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
}

/// Token response subset returned by the ORCID token endpoint
#[derive(Debug, Deserialize)]
struct OrcidTokenResponse {
    orcid: String,
}

/// EVM address shape: 0x followed by 40 hex digits
fn is_evm_address(s: &str) -> bool {
    s.len() == 42
        && s.starts_with("0x")
        && s[2..].chars().all(|c| c.is_ascii_hexdigit())
}

// ============================================================================
// Router
// ============================================================================

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/login", post(login))
        .route("/profile", put(update_profile))
        .route("/interests", put(update_interests))
        .route("/orcid", get(orcid_start))
        .route("/orcid/callback", get(orcid_callback))
}

// ============================================================================
// Handlers
// ============================================================================

/// Fetch-or-create a user by wallet address. 200 for an existing user,
/// 201 when the row (and its derived DID) was just created.
async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> ApiResult<Response> {
    let wallet = request
        .wallet_address
        .filter(|w| is_evm_address(w))
        .ok_or_else(|| ApiError::bad_request("Valid wallet address is required."))?;

    let repo = UserRepository::new(state.pool.clone());
    let (user, created) = repo.login_or_create(&wallet).await?;

    if created {
        state
            .activity
            .log(
                ActivityEntry::new("login", "user", "First login, account created")
                    .user(user.id, user.username.clone())
                    .wallet(wallet),
            )
            .await;
        Ok((
            StatusCode::CREATED,
            Json(json!({ "message": "User created successfully.", "user": user })),
        )
            .into_response())
    } else {
        Ok(Json(json!({ "message": "Login successful.", "user": user })).into_response())
    }
}

async fn update_profile(
    State(state): State<AppState>,
    Json(request): Json<ProfileRequest>,
) -> ApiResult<Json<Value>> {
    let wallet = request
        .wallet_address
        .ok_or_else(|| ApiError::bad_request("Wallet address is required."))?;
    let (email, username) = match (request.email, request.username) {
        (Some(email), Some(username)) => (email, username),
        _ => return Err(ApiError::bad_request("Email and username are required.")),
    };

    let update = ProfileUpdate {
        email,
        username,
        github_username: request.github_username,
        personal_website: request.personal_website,
        organization: request.organization,
        research_interests: request.research_interests,
    };

    let repo = UserRepository::new(state.pool.clone());
    let user = repo
        .update_profile(&wallet, &update)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found."))?;

    Ok(Json(json!({ "message": "Profile updated successfully.", "user": user })))
}

async fn update_interests(
    State(state): State<AppState>,
    Json(request): Json<InterestsRequest>,
) -> ApiResult<Json<Value>> {
    let wallet = request
        .wallet_address
        .ok_or_else(|| ApiError::bad_request("Wallet address is required."))?;
    let interests = serde_json::to_string(&request.interests.unwrap_or(Value::Null))?;

    let repo = UserRepository::new(state.pool.clone());
    let user = repo
        .update_interests(&wallet, &interests)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found."))?;

    Ok(Json(json!({ "message": "Interests updated successfully.", "user": user })))
}

/// Redirect to the ORCID authorize page, carrying the wallet address in
/// a base64 state payload.
async fn orcid_start(
    State(state): State<AppState>,
    Query(query): Query<OrcidStartQuery>,
) -> ApiResult<Redirect> {
    let wallet = query
        .wallet_address
        .ok_or_else(|| ApiError::bad_request("Wallet address is required"))?;

    let orcid = &state.config.orcid;
    let client_id = orcid
        .client_id
        .as_deref()
        .ok_or_else(|| ApiError::bad_request("ORCID verification is not configured"))?;
    let redirect_uri = orcid.redirect_uri.as_deref().unwrap_or_default();

    let oauth_state = BASE64_STANDARD.encode(json!({ "walletAddress": wallet }).to_string());
    let url = format!(
        "{}?client_id={}&response_type=code&scope=/authenticate&redirect_uri={}&state={}",
        orcid.authorize_url, client_id, redirect_uri, oauth_state
    );

    Ok(Redirect::temporary(&url))
}

/// Exchange the authorization code for a token, record the verified
/// ORCID iD and bounce back to the frontend profile page.
async fn orcid_callback(
    State(state): State<AppState>,
    Query(query): Query<OrcidCallbackQuery>,
) -> ApiResult<Redirect> {
    let code = query
        .code
        .ok_or_else(|| ApiError::bad_request("Authorization code is missing"))?;
    let oauth_state = query
        .state
        .ok_or_else(|| ApiError::bad_request("State parameter is missing"))?;

    let decoded = BASE64_STANDARD
        .decode(oauth_state.as_bytes())
        .map_err(|_| ApiError::bad_request("Invalid state parameter"))?;
    let decoded: Value = serde_json::from_slice(&decoded)?;
    let wallet = decoded["walletAddress"]
        .as_str()
        .ok_or_else(|| ApiError::bad_request("Invalid state parameter"))?
        .to_string();

    let orcid = &state.config.orcid;
    let token: OrcidTokenResponse = state
        .http
        .post(&orcid.token_url)
        .query(&[
            ("client_id", orcid.client_id.as_deref().unwrap_or_default()),
            ("client_secret", orcid.client_secret.as_deref().unwrap_or_default()),
            ("grant_type", "authorization_code"),
            ("code", &code),
            ("redirect_uri", orcid.redirect_uri.as_deref().unwrap_or_default()),
        ])
        .header("Accept", "application/json")
        .send()
        .await
        .map_err(|e| ApiError::Upstream(format!("ORCID token exchange failed: {e}")))?
        .json()
        .await
        .map_err(|e| ApiError::Upstream(format!("ORCID token response malformed: {e}")))?;

    let repo = UserRepository::new(state.pool.clone());
    repo.set_orcid_verified(&wallet, &token.orcid).await?;

    Ok(Redirect::temporary(&format!(
        "{}/profile",
        state.config.frontend_url
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_validation() {
        assert!(is_evm_address("0x1234567890abcdef1234567890abcdef12345678"));
        assert!(is_evm_address("0xABCDEF7890abcdef1234567890abcdef12345678"));
        assert!(!is_evm_address("1234567890abcdef1234567890abcdef12345678"));
        assert!(!is_evm_address("0x123"));
        assert!(!is_evm_address("0xZZ34567890abcdef1234567890abcdef12345678"));
    }
}
