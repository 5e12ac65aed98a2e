//! Dataset routes: listing, explore, multi-file upload, permissions,
//! simulated encryption and proof protection, analytics and download.
//!
//! Ownership checks are wallet-based: mutating operations require the
//! owner's wallet address in the request and return 404 rather than 403
//! when the dataset belongs to someone else, so callers cannot probe for
//! ids they do not own.

use axum::body::Body;
use axum::extract::{Multipart, Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio_util::io::ReaderStream;

use super::AppState;
use crate::activity::ActivityEntry;
use crate::database::dataset_repository::{
    DatasetUpdate, ExploreDataset, NewDataset, NewDatasetFile, PermissionRow, UserDataset,
};
use crate::database::user_repository::UserRow;
use crate::database::{DatasetRepository, UserRepository};
use crate::error::{ApiError, ApiResult};

const ALLOWED_EXTENSIONS: [&str; 7] = [".csv", ".json", ".xlsx", ".txt", ".parquet", ".h5", ".zip"];
const MAX_UPLOAD_FILES: usize = 10;

// ============================================================================
// Request types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ListDatasetsQuery {
    pub wallet_address: Option<String>,
    pub project_id: Option<i64>,
    pub privacy_level: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ExploreQuery {
    pub category: Option<String>,
    pub search: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RecommendationsQuery {
    pub user_id: Option<i64>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct WalletQuery {
    pub wallet_address: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct OwnerWalletQuery {
    pub owner_wallet_address: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateDatasetRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub privacy_level: Option<String>,
    pub category: Option<String>,
    pub tags: Option<Value>,
    pub owner_wallet_address: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct OwnerWalletRequest {
    pub owner_wallet_address: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct GrantPermissionRequest {
    pub owner_wallet_address: Option<String>,
    pub target_wallet_address: Option<String>,
    pub permission_type: Option<String>,
    pub access_conditions: Option<Value>,
    pub expires_at: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct EncryptRequest {
    pub creator_wallet_address: Option<String>,
    pub algorithm: Option<String>,
    pub key_size: Option<i64>,
    pub access_controls: Option<Value>,
    pub key_management: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct GenerateProofRequest {
    pub creator_wallet_address: Option<String>,
    pub proof_type: Option<String>,
    pub public_inputs: Option<Vec<Value>>,
}

#[derive(Debug, Deserialize)]
pub struct VerifyProofRequest {
    pub public_inputs: Option<Vec<Value>>,
}

#[derive(Debug, Deserialize)]
pub struct LogUsageRequest {
    pub action_type: Option<String>,
    pub wallet_address: Option<String>,
}

// ============================================================================
// Router
// ============================================================================

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_datasets))
        .route("/upload", post(upload_dataset))
        .route("/explore", get(explore))
        .route("/explore/recommendations", get(recommendations))
        .route("/explore/:dataset_id", get(explore_detail))
        .route("/zk-proof/:proof_id/verify", post(verify_proof))
        .route(
            "/:dataset_id",
            get(get_dataset).put(update_dataset).delete(delete_dataset),
        )
        .route("/:dataset_id/permissions", get(list_permissions).post(grant_permission))
        .route("/:dataset_id/permissions/:permission_id", delete(revoke_permission))
        .route("/:dataset_id/encrypt", post(encrypt_dataset))
        .route("/:dataset_id/zk-proof", get(get_proof).post(generate_proof))
        .route("/:dataset_id/analytics", get(analytics))
        .route("/:dataset_id/download", get(download))
        .route("/:dataset_id/usage", post(log_usage))
}

async fn require_user(state: &AppState, wallet: &str) -> ApiResult<UserRow> {
    let users = UserRepository::new(state.pool.clone());
    users
        .find_by_wallet_ci(wallet)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))
}

/// Owner-gated fetch; a foreign dataset id looks like a missing one
async fn require_owned(
    state: &AppState,
    dataset_id: i64,
    owner_id: i64,
) -> ApiResult<crate::database::dataset_repository::DatasetRow> {
    let datasets = DatasetRepository::new(state.pool.clone());
    datasets
        .find_owned(dataset_id, owner_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Dataset not found or access denied"))
}

// ============================================================================
// Listing and explore
// ============================================================================

/// Datasets the wallet owns or holds a live permission on
async fn list_datasets(
    State(state): State<AppState>,
    Query(query): Query<ListDatasetsQuery>,
) -> ApiResult<Json<Vec<UserDataset>>> {
    let wallet = query
        .wallet_address
        .ok_or_else(|| ApiError::bad_request("Wallet address is required"))?;
    let user = require_user(&state, &wallet).await?;

    let datasets = DatasetRepository::new(state.pool.clone());
    Ok(Json(
        datasets
            .list_for_user(
                user.id,
                &user.wallet_address,
                query.project_id,
                query.privacy_level.as_deref(),
            )
            .await?,
    ))
}

/// Ready public datasets, plus NFT-backed private ones
async fn explore(
    State(state): State<AppState>,
    Query(query): Query<ExploreQuery>,
) -> ApiResult<Json<Vec<ExploreDataset>>> {
    let datasets = DatasetRepository::new(state.pool.clone());
    Ok(Json(
        datasets
            .explore(query.category.as_deref(), query.search.as_deref())
            .await?,
    ))
}

/// Interest-matched public datasets with a random-sample fallback
async fn recommendations(
    State(state): State<AppState>,
    Query(query): Query<RecommendationsQuery>,
) -> ApiResult<Json<Vec<ExploreDataset>>> {
    let limit = query.limit.unwrap_or(20);
    let offset = query.offset.unwrap_or(0);
    let datasets = DatasetRepository::new(state.pool.clone());

    if let Some(user_id) = query.user_id {
        let users = UserRepository::new(state.pool.clone());
        let interests = users
            .find_by_id(user_id)
            .await?
            .and_then(|u| u.research_interests)
            .and_then(|raw| serde_json::from_str::<Vec<String>>(&raw).ok())
            .unwrap_or_default();

        if !interests.is_empty() {
            let mut matched = datasets
                .matching_public_datasets(&interests, Some(user_id), limit, offset)
                .await?;
            if matched.is_empty() && offset == 0 {
                matched = datasets
                    .matching_public_datasets(&interests, None, limit, offset)
                    .await?;
            }
            if !matched.is_empty() {
                return Ok(Json(matched));
            }
        }
    }

    Ok(Json(
        datasets
            .random_public_datasets(query.user_id, limit, offset)
            .await?,
    ))
}

async fn explore_detail(
    State(state): State<AppState>,
    Path(dataset_id): Path<i64>,
) -> ApiResult<Json<Value>> {
    let datasets = DatasetRepository::new(state.pool.clone());
    let dataset = datasets
        .explore_detail(dataset_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Dataset not found or not accessible"))?;

    let files = datasets.files(dataset_id).await?;
    let total_size: i64 = files.iter().map(|f| f.file_size).sum();

    let mut body = serde_json::to_value(&dataset)?;
    body["files"] = serde_json::to_value(&files)?;
    body["total_size"] = json!(total_size);
    Ok(Json(body))
}

/// Dataset detail with access control: public datasets are open, private
/// ones need ownership or an unexpired permission. A permitted view is
/// logged and counted.
async fn get_dataset(
    State(state): State<AppState>,
    Path(dataset_id): Path<i64>,
    Query(query): Query<WalletQuery>,
) -> ApiResult<Json<Value>> {
    let datasets = DatasetRepository::new(state.pool.clone());
    let dataset = datasets
        .find_detail(dataset_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Dataset not found"))?;

    let mut has_access = dataset.dataset.privacy_level == "public";
    let mut viewer: Option<UserRow> = None;

    if let Some(wallet) = &query.wallet_address {
        let users = UserRepository::new(state.pool.clone());
        viewer = users.find_by_wallet_ci(wallet).await?;
        if let (false, Some(user)) = (has_access, &viewer) {
            has_access = user.id == dataset.dataset.owner_id
                || datasets
                    .has_valid_permission(dataset_id, user.id, wallet)
                    .await?;
        }
    }

    if !has_access {
        return Err(ApiError::forbidden("Access denied"));
    }

    if let Some(user) = &viewer {
        datasets.record_view(dataset_id, user.id).await?;
    }

    let files = datasets.files(dataset_id).await?;
    let tags = parse_tags(dataset.dataset.tags.as_deref());

    let mut body = serde_json::to_value(&dataset)?;
    body["files"] = serde_json::to_value(&files)?;
    body["tags"] = json!(tags);
    Ok(Json(body))
}

/// Tags may be stored as a JSON array or as legacy comma-separated text
fn parse_tags(raw: Option<&str>) -> Vec<String> {
    let Some(raw) = raw else {
        return Vec::new();
    };
    if let Ok(tags) = serde_json::from_str::<Vec<String>>(raw) {
        return tags;
    }
    raw.split(',')
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect()
}

// ============================================================================
// Upload
// ============================================================================

struct UploadForm {
    name: Option<String>,
    description: Option<String>,
    owner_wallet_address: Option<String>,
    project_id: Option<i64>,
    external_link: Option<String>,
    privacy_level: String,
    category: String,
    tags: String,
    status: String,
    files: Vec<(String, Option<String>, Vec<u8>)>,
}

async fn read_upload_form(multipart: &mut Multipart) -> ApiResult<UploadForm> {
    let mut form = UploadForm {
        name: None,
        description: None,
        owner_wallet_address: None,
        project_id: None,
        external_link: None,
        privacy_level: "public".into(),
        category: "Other".into(),
        tags: "[]".into(),
        status: "ready".into(),
        files: Vec::new(),
    };

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Malformed multipart body: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        if name == "datasets" {
            if form.files.len() >= MAX_UPLOAD_FILES {
                return Err(ApiError::bad_request("Too many files; at most 10 allowed"));
            }
            let original = field.file_name().unwrap_or("upload").to_string();
            let ext = original
                .rsplit_once('.')
                .map(|(_, e)| format!(".{}", e.to_lowercase()))
                .unwrap_or_default();
            if !ALLOWED_EXTENSIONS.contains(&ext.as_str()) {
                return Err(ApiError::bad_request(format!(
                    "Invalid file type. Allowed types: {}",
                    ALLOWED_EXTENSIONS.join(", ")
                )));
            }
            let mime = field.content_type().map(|m| m.to_string());
            let bytes = field
                .bytes()
                .await
                .map_err(|e| ApiError::bad_request(format!("Failed to read file: {e}")))?;
            form.files.push((original, mime, bytes.to_vec()));
            continue;
        }

        let text = field
            .text()
            .await
            .map_err(|e| ApiError::bad_request(format!("Malformed field: {e}")))?;
        match name.as_str() {
            "name" => form.name = Some(text),
            "description" => form.description = Some(text),
            "owner_wallet_address" => form.owner_wallet_address = Some(text),
            "project_id" => form.project_id = text.parse().ok(),
            "external_link" => form.external_link = Some(text),
            "privacy_level" => form.privacy_level = text,
            "category" => form.category = text,
            "tags" => form.tags = text,
            "status" => form.status = text,
            _ => {}
        }
    }

    Ok(form)
}

/// Create a dataset from a multipart upload of up to ten data files.
///
/// A draft with no files stores metadata only. With files attached the
/// largest file becomes the primary one, the row starts in 'processing'
/// and flips to 'ready' shortly after, simulating ingest.
async fn upload_dataset(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<Json<Value>> {
    let form = read_upload_form(&mut multipart).await?;

    let name = form
        .name
        .clone()
        .filter(|n| !n.is_empty())
        .ok_or_else(|| ApiError::bad_request("Dataset name is required"))?;
    let wallet = form
        .owner_wallet_address
        .clone()
        .ok_or_else(|| ApiError::bad_request("Owner wallet address is required"))?;
    let user = require_user(&state, &wallet).await?;

    // Normalize tags to a JSON array string, tolerating bad input
    let tags_json = match serde_json::from_str::<Value>(&form.tags) {
        Ok(Value::Array(tags)) => Value::Array(tags).to_string(),
        _ => "[]".to_string(),
    };

    let new = NewDataset {
        name: name.clone(),
        description: form.description.clone(),
        owner_id: user.id,
        project_id: form.project_id,
        external_link: form.external_link.clone(),
        privacy_level: form.privacy_level.clone(),
        category: form.category.clone(),
        tags_json,
        status: form.status.clone(),
    };

    let datasets = DatasetRepository::new(state.pool.clone());

    if form.status == "draft" && form.files.is_empty() {
        let id = datasets.create_draft(&new).await?;
        return Ok(Json(json!({
            "id": id,
            "message": "Draft saved successfully",
            "status": "draft",
        })));
    }

    if form.files.is_empty() {
        return Err(ApiError::bad_request("No files uploaded"));
    }

    let primary_index = form
        .files
        .iter()
        .enumerate()
        .max_by_key(|(_, (_, _, bytes))| bytes.len())
        .map(|(i, _)| i)
        .unwrap_or(0);

    let mut stored_files = Vec::with_capacity(form.files.len());
    for (index, (original, mime, bytes)) in form.files.iter().enumerate() {
        let stored = state
            .uploads
            .save(Some("datasets"), "datasets", original, bytes)
            .await?;
        let file_type = original.rsplit_once('.').map(|(_, e)| e.to_lowercase());
        stored_files.push(NewDatasetFile {
            file_name: stored.disk_name,
            original_name: original.clone(),
            file_path: stored.relative_path,
            file_size: stored.size,
            file_type,
            mime_type: mime.clone(),
            is_primary: index == primary_index,
        });
    }

    let total_files = stored_files.len();
    let total_size: i64 = stored_files.iter().map(|f| f.file_size).sum();
    let dataset_id = datasets.create_with_files(&new, &stored_files).await?;

    state
        .activity
        .log(
            ActivityEntry::new("upload", "dataset", format!("Uploaded dataset '{}'", name))
                .user(user.id, user.username)
                .wallet(wallet)
                .resource(dataset_id, name),
        )
        .await;

    // Simulated ingest: flip to ready after a short delay
    let pool = state.pool.clone();
    tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_secs(2)).await;
        let repo = DatasetRepository::new(pool);
        if let Err(error) = repo.mark_ready(dataset_id).await {
            tracing::warn!(%error, dataset_id, "failed to mark dataset ready");
        }
    });

    Ok(Json(json!({
        "id": dataset_id,
        "message": format!("Dataset uploaded successfully with {} file(s)", total_files),
        "status": "processing",
        "totalFiles": total_files,
        "totalSize": total_size,
    })))
}

// ============================================================================
// Update and delete
// ============================================================================

async fn update_dataset(
    State(state): State<AppState>,
    Path(dataset_id): Path<i64>,
    Json(request): Json<UpdateDatasetRequest>,
) -> ApiResult<Json<Value>> {
    let wallet = request
        .owner_wallet_address
        .ok_or_else(|| ApiError::bad_request("Owner wallet address is required"))?;
    let user = require_user(&state, &wallet).await?;
    require_owned(&state, dataset_id, user.id).await?;

    let tags_json = request.tags.map(|tags| match tags {
        Value::Array(_) => tags.to_string(),
        Value::String(raw) => match serde_json::from_str::<Value>(&raw) {
            Ok(parsed @ Value::Array(_)) => parsed.to_string(),
            _ => "[]".to_string(),
        },
        _ => "[]".to_string(),
    });

    let update = DatasetUpdate {
        name: request.name,
        description: request.description,
        privacy_level: request.privacy_level,
        category: request.category,
        tags_json,
    };

    let datasets = DatasetRepository::new(state.pool.clone());
    if !datasets.update(dataset_id, &update).await? {
        return Err(ApiError::bad_request("No fields to update"));
    }
    Ok(Json(json!({ "message": "Dataset updated successfully" })))
}

/// Delete a dataset, its stored files and all dependent rows
async fn delete_dataset(
    State(state): State<AppState>,
    Path(dataset_id): Path<i64>,
    Json(request): Json<OwnerWalletRequest>,
) -> ApiResult<Json<Value>> {
    let wallet = request
        .owner_wallet_address
        .ok_or_else(|| ApiError::bad_request("Owner wallet address is required"))?;
    let user = require_user(&state, &wallet).await?;
    require_owned(&state, dataset_id, user.id).await?;

    let datasets = DatasetRepository::new(state.pool.clone());

    // Remove files from disk best-effort; the rows go regardless
    for file in datasets.files(dataset_id).await? {
        if let Err(error) = tokio::fs::remove_file(&file.file_path).await {
            tracing::warn!(%error, path = %file.file_path, "failed to delete dataset file");
        }
    }

    datasets.delete(dataset_id).await?;
    Ok(Json(json!({ "message": "Dataset deleted successfully" })))
}

// ============================================================================
// Permissions
// ============================================================================

async fn list_permissions(
    State(state): State<AppState>,
    Path(dataset_id): Path<i64>,
    Query(query): Query<OwnerWalletQuery>,
) -> ApiResult<Json<Vec<PermissionRow>>> {
    let wallet = query
        .owner_wallet_address
        .ok_or_else(|| ApiError::bad_request("Owner wallet address is required"))?;
    let user = require_user(&state, &wallet).await?;
    require_owned(&state, dataset_id, user.id).await?;

    let datasets = DatasetRepository::new(state.pool.clone());
    Ok(Json(datasets.permissions(dataset_id).await?))
}

/// Grant access to a wallet; the grantee need not be registered yet
async fn grant_permission(
    State(state): State<AppState>,
    Path(dataset_id): Path<i64>,
    Json(request): Json<GrantPermissionRequest>,
) -> ApiResult<Json<Value>> {
    let owner_wallet = request
        .owner_wallet_address
        .ok_or_else(|| ApiError::bad_request("Owner wallet address is required"))?;
    let target_wallet = request
        .target_wallet_address
        .ok_or_else(|| ApiError::bad_request("Target wallet address is required"))?;

    let user = require_user(&state, &owner_wallet).await?;
    require_owned(&state, dataset_id, user.id).await?;

    let users = UserRepository::new(state.pool.clone());
    let target_user = users.find_by_wallet_ci(&target_wallet).await?;
    let conditions = request.access_conditions.map(|c| c.to_string());

    let datasets = DatasetRepository::new(state.pool.clone());
    let permission_id = datasets
        .grant_permission(
            dataset_id,
            target_user.map(|u| u.id),
            &target_wallet,
            request.permission_type.as_deref().unwrap_or("read"),
            conditions.as_deref(),
            user.id,
            request.expires_at.as_deref(),
        )
        .await?;

    Ok(Json(json!({
        "id": permission_id,
        "message": "Permission granted successfully",
    })))
}

async fn revoke_permission(
    State(state): State<AppState>,
    Path((dataset_id, permission_id)): Path<(i64, i64)>,
    Json(request): Json<OwnerWalletRequest>,
) -> ApiResult<Json<Value>> {
    let wallet = request
        .owner_wallet_address
        .ok_or_else(|| ApiError::bad_request("Owner wallet address is required"))?;
    let user = require_user(&state, &wallet).await?;
    require_owned(&state, dataset_id, user.id).await?;

    let datasets = DatasetRepository::new(state.pool.clone());
    datasets.revoke_permission(permission_id, dataset_id).await?;
    Ok(Json(json!({ "message": "Permission revoked successfully" })))
}

// ============================================================================
// Encryption and proofs
// ============================================================================

/// Mark a dataset encrypted, storing fabricated key material metadata
async fn encrypt_dataset(
    State(state): State<AppState>,
    Path(dataset_id): Path<i64>,
    Json(request): Json<EncryptRequest>,
) -> ApiResult<Json<Value>> {
    let wallet = request
        .creator_wallet_address
        .ok_or_else(|| ApiError::bad_request("Creator wallet address is required"))?;
    let user = require_user(&state, &wallet).await?;
    require_owned(&state, dataset_id, user.id).await?;

    let algorithm = request.algorithm.unwrap_or_else(|| "AES-256-GCM".into());
    let encryption_id = uuid::Uuid::new_v4().to_string();
    let mut fingerprint = [0u8; 32];
    rand::Rng::fill(&mut rand::thread_rng(), &mut fingerprint);
    let key_fingerprint = hex::encode(fingerprint);

    let metadata = json!({
        "algorithm": algorithm,
        "key_size": request.key_size.unwrap_or(256),
        "access_controls": request.access_controls.unwrap_or_else(|| json!([])),
        "key_management": request.key_management.unwrap_or_else(|| "self_managed".into()),
        "encrypted_at": chrono::Utc::now().to_rfc3339(),
    });

    let datasets = DatasetRepository::new(state.pool.clone());
    datasets.set_encrypted(dataset_id, &metadata.to_string()).await?;

    Ok(Json(json!({
        "encryption_id": encryption_id,
        "algorithm": algorithm,
        "key_fingerprint": key_fingerprint,
        "message": "Dataset encrypted successfully",
    })))
}

/// Generate a simulated proof and link it to the dataset
async fn generate_proof(
    State(state): State<AppState>,
    Path(dataset_id): Path<i64>,
    Json(request): Json<GenerateProofRequest>,
) -> ApiResult<Json<Value>> {
    let wallet = request
        .creator_wallet_address
        .ok_or_else(|| ApiError::bad_request("Creator wallet address is required"))?;
    let user = require_user(&state, &wallet).await?;
    require_owned(&state, dataset_id, user.id).await?;

    let proof = state.verifier.generate();
    let public_inputs = serde_json::to_string(&request.public_inputs.unwrap_or_default())?;

    let datasets = DatasetRepository::new(state.pool.clone());
    let proof_id = datasets
        .attach_proof(
            dataset_id,
            user.id,
            request.proof_type.as_deref().unwrap_or("privacy"),
            &proof,
            &public_inputs,
        )
        .await?;

    Ok(Json(json!({
        "id": proof_id,
        "message": "ZK proof generated successfully",
        "proof_id": proof_id,
        "verification_key": proof.verification_key,
    })))
}

/// Proof details; private datasets only reveal them to their owner
async fn get_proof(
    State(state): State<AppState>,
    Path(dataset_id): Path<i64>,
    Query(query): Query<WalletQuery>,
) -> ApiResult<Json<Value>> {
    let wallet = query
        .wallet_address
        .ok_or_else(|| ApiError::bad_request("Wallet address is required"))?;
    let user = require_user(&state, &wallet).await?;

    let datasets = DatasetRepository::new(state.pool.clone());
    let dataset = datasets
        .find(dataset_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Dataset not found"))?;

    if dataset.privacy_level == "private" && dataset.owner_id != user.id {
        return Err(ApiError::forbidden("Access denied"));
    }

    let proof_id = dataset
        .zk_proof_id
        .ok_or_else(|| ApiError::not_found("No ZK proof found for this dataset"))?;
    let proof = datasets
        .proof(proof_id)
        .await?
        .ok_or_else(|| ApiError::not_found("ZK proof not found"))?;

    let public_inputs: Value = proof
        .public_inputs
        .as_deref()
        .and_then(|raw| serde_json::from_str(raw).ok())
        .unwrap_or_else(|| json!([]));

    Ok(Json(json!({
        "proof_id": proof.id,
        "dataset_id": dataset.id,
        "proof_type": proof.proof_type,
        "verification_key": proof.verification_key,
        "public_inputs": public_inputs,
        "circuit_hash": proof.circuit_hash,
        "status": proof.status,
        "verification_count": proof.verification_count,
        "created_at": proof.created_at,
        "verified_at": proof.verified_at,
    })))
}

/// Run the simulated verifier against a stored proof and record the result
async fn verify_proof(
    State(state): State<AppState>,
    Path(proof_id): Path<i64>,
    Json(request): Json<VerifyProofRequest>,
) -> ApiResult<Json<Value>> {
    let datasets = DatasetRepository::new(state.pool.clone());
    let proof = datasets
        .proof(proof_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Proof not found"))?;

    let valid = state.verifier.verify(request.public_inputs.as_deref());
    if valid {
        datasets.mark_proof_verified(proof_id).await?;
    } else {
        datasets.mark_proof_failed(proof_id).await?;
    }

    Ok(Json(json!({
        "valid": valid,
        "proof_id": proof_id,
        "verification_count": proof.verification_count + if valid { 1 } else { 0 },
    })))
}

// ============================================================================
// Analytics, download and usage
// ============================================================================

async fn analytics(
    State(state): State<AppState>,
    Path(dataset_id): Path<i64>,
    Query(query): Query<OwnerWalletQuery>,
) -> ApiResult<Json<Value>> {
    let wallet = query
        .owner_wallet_address
        .ok_or_else(|| ApiError::bad_request("Owner wallet address is required"))?;
    let user = require_user(&state, &wallet).await?;
    let dataset = require_owned(&state, dataset_id, user.id).await?;

    let datasets = DatasetRepository::new(state.pool.clone());
    Ok(Json(serde_json::to_value(
        datasets.analytics(&dataset).await?,
    )?))
}

/// Stream the primary file back as an attachment
async fn download(
    State(state): State<AppState>,
    Path(dataset_id): Path<i64>,
) -> ApiResult<Response> {
    let datasets = DatasetRepository::new(state.pool.clone());
    let file = datasets
        .primary_file(dataset_id)
        .await?
        .ok_or_else(|| ApiError::not_found("No primary file found"))?;

    let handle = tokio::fs::File::open(&file.file_path)
        .await
        .map_err(|_| ApiError::not_found("File not found on disk"))?;
    let stream = ReaderStream::new(handle);

    let disposition = format!("attachment; filename=\"{}\"", file.original_name);
    let content_type = file
        .mime_type
        .unwrap_or_else(|| "application/octet-stream".into());

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, content_type),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        Body::from_stream(stream),
    )
        .into_response())
}

async fn log_usage(
    State(state): State<AppState>,
    Path(dataset_id): Path<i64>,
    Json(request): Json<LogUsageRequest>,
) -> ApiResult<Json<Value>> {
    let (action_type, wallet) = match (request.action_type, request.wallet_address) {
        (Some(action_type), Some(wallet)) => (action_type, wallet),
        _ => {
            return Err(ApiError::bad_request(
                "action_type and wallet_address are required",
            ))
        }
    };
    let user = require_user(&state, &wallet).await?;

    let datasets = DatasetRepository::new(state.pool.clone());
    if datasets.find(dataset_id).await?.is_none() {
        return Err(ApiError::not_found("Dataset not found"));
    }
    datasets
        .log_usage(dataset_id, Some(user.id), &action_type, "{}")
        .await?;

    Ok(Json(json!({ "message": "Usage logged successfully" })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_parsing_handles_both_formats() {
        assert_eq!(parse_tags(Some(r#"["a","b"]"#)), vec!["a", "b"]);
        assert_eq!(parse_tags(Some("a, b , ")), vec!["a", "b"]);
        assert!(parse_tags(None).is_empty());
        assert!(parse_tags(Some("")).is_empty());
    }
}
