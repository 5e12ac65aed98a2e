//! Project routes: CRUD, collaborators, file repository, milestones and
//! the project NFT lifecycle.
//!
//! Explore listings are public; everything else trusts the wallet address
//! supplied in the request body, matching the rest of the API.

use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Map, Value};

use super::AppState;
use crate::activity::ActivityEntry;
use crate::database::project_repository::{
    ExploreProject, MilestoneRow, NewMilestone, NewProject, ProjectFileRow, ProjectRow,
    ProjectUpdate, UserProject,
};
use crate::database::{now_timestamp, NftRepository, ProjectRepository, UserRepository};
use crate::error::{ApiError, ApiResult};

// ============================================================================
// Request types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateProjectRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub creator_wallet_address: Option<String>,
    pub visibility: Option<String>,
    pub status: Option<String>,
    pub category: Option<String>,
    pub start_date: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListProjectsQuery {
    pub wallet_address: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RecommendationsQuery {
    pub user_id: Option<i64>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct AddCollaboratorRequest {
    pub wallet_address: Option<String>,
    pub role: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RepositoryQuery {
    #[serde(rename = "parentId")]
    pub parent_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct CreateFolderRequest {
    pub name: Option<String>,
    pub parent_id: Option<i64>,
    pub uploader_wallet_address: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MilestoneRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub milestone_type: Option<String>,
    pub date: Option<String>,
    pub status: Option<String>,
    pub creator_wallet_address: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MintProjectNftRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub price: Option<f64>,
    pub royalty: Option<f64>,
    pub tags: Option<Value>,
    #[serde(rename = "walletAddress")]
    pub wallet_address: Option<String>,
}

// ============================================================================
// Router
// ============================================================================

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_project).get(list_projects))
        .route("/explore", get(explore))
        .route("/explore/public", get(explore_public))
        .route("/explore/recommendations", get(recommendations))
        .route("/:project_id", get(get_project).put(update_project))
        .route("/:project_id/collaborators", post(add_collaborator))
        .route("/:project_id/collaborators/:user_id", delete(remove_collaborator))
        .route("/:project_id/repository", get(repository_listing))
        .route("/:project_id/repository/folders", post(create_folder))
        .route("/:project_id/repository/files", post(upload_files))
        .route("/:project_id/milestones", get(list_milestones).post(create_milestone))
        .route(
            "/:project_id/milestones/:milestone_id",
            put(update_milestone).delete(delete_milestone),
        )
        .route("/:project_id/nft", get(project_nft).put(update_project_nft))
        .route("/:project_id/nft/mint", post(mint_project_nft))
        .route("/:project_id/nfts", get(project_nfts))
}

// ============================================================================
// Projects
// ============================================================================

async fn create_project(
    State(state): State<AppState>,
    Json(request): Json<CreateProjectRequest>,
) -> ApiResult<Response> {
    let name = request
        .name
        .filter(|n| !n.is_empty())
        .ok_or_else(|| ApiError::bad_request("Project name is required"))?;
    let wallet = request
        .creator_wallet_address
        .ok_or_else(|| ApiError::bad_request("Creator wallet address is required"))?;

    let users = UserRepository::new(state.pool.clone());
    let user = users
        .find_by_wallet(&wallet)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    let new = NewProject {
        name,
        description: request.description,
        owner_id: user.id,
        visibility: request.visibility.unwrap_or_else(|| "Private".into()),
        status: request.status.unwrap_or_else(|| "Unknown".into()),
        category: request.category.unwrap_or_else(|| "Other".into()),
        start_date: request.start_date.unwrap_or_else(now_timestamp),
    };

    let projects = ProjectRepository::new(state.pool.clone());
    let project = projects.create(&new).await?;

    state
        .activity
        .log(
            ActivityEntry::new("create", "project", format!("Created project '{}'", project.name))
                .user(user.id, user.username)
                .wallet(wallet)
                .resource(project.id, project.name.clone()),
        )
        .await;

    Ok((StatusCode::CREATED, Json(project)).into_response())
}

/// Projects the wallet owns or collaborates on, with the derived role
async fn list_projects(
    State(state): State<AppState>,
    Query(query): Query<ListProjectsQuery>,
) -> ApiResult<Json<Vec<UserProject>>> {
    let wallet = query
        .wallet_address
        .ok_or_else(|| ApiError::bad_request("Wallet address is required"))?;

    let users = UserRepository::new(state.pool.clone());
    let user = users
        .find_by_wallet(&wallet)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    let projects = ProjectRepository::new(state.pool.clone());
    Ok(Json(projects.projects_for_user(user.id).await?))
}

async fn explore(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let projects = ProjectRepository::new(state.pool.clone());
    Ok(Json(serde_json::to_value(projects.explore_all().await?)?))
}

/// Public projects plus NFT-backed private ones
async fn explore_public(State(state): State<AppState>) -> ApiResult<Json<Vec<ExploreProject>>> {
    let projects = ProjectRepository::new(state.pool.clone());
    Ok(Json(projects.explore_public().await?))
}

/// Interest-matched public projects, falling back to a random sample.
///
/// When a user id is given and their stored interests match nothing from
/// other researchers, the first page retries without the owner exclusion
/// before giving up on matching entirely.
async fn recommendations(
    State(state): State<AppState>,
    Query(query): Query<RecommendationsQuery>,
) -> ApiResult<Json<Vec<ExploreProject>>> {
    let limit = query.limit.unwrap_or(20);
    let offset = query.offset.unwrap_or(0);
    let projects = ProjectRepository::new(state.pool.clone());

    if let Some(user_id) = query.user_id {
        let users = UserRepository::new(state.pool.clone());
        let interests = users
            .find_by_id(user_id)
            .await?
            .and_then(|u| u.research_interests)
            .and_then(|raw| serde_json::from_str::<Vec<String>>(&raw).ok())
            .unwrap_or_default();

        if !interests.is_empty() {
            let mut matched = projects
                .matching_public_projects(&interests, Some(user_id), limit, offset)
                .await?;
            if matched.is_empty() && offset == 0 {
                matched = projects
                    .matching_public_projects(&interests, None, limit, offset)
                    .await?;
            }
            if !matched.is_empty() {
                return Ok(Json(matched));
            }
        }
    }

    Ok(Json(
        projects
            .random_public_projects(query.user_id, limit, offset)
            .await?,
    ))
}

/// Project detail with its collaborator list (implicit owner included)
async fn get_project(
    State(state): State<AppState>,
    Path(project_id): Path<i64>,
) -> ApiResult<Json<Value>> {
    let projects = ProjectRepository::new(state.pool.clone());
    let project = projects
        .find_with_owner(project_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Project not found"))?;
    let collaborators = projects.collaborators(project_id).await?;

    let mut body = serde_json::to_value(&project)?;
    body["collaborators"] = serde_json::to_value(&collaborators)?;
    Ok(Json(body))
}

async fn update_project(
    State(state): State<AppState>,
    Path(project_id): Path<i64>,
    Json(update): Json<ProjectUpdate>,
) -> ApiResult<Json<ProjectRow>> {
    let projects = ProjectRepository::new(state.pool.clone());
    let project = projects
        .update(project_id, &update)
        .await?
        .ok_or_else(|| ApiError::not_found("Project not found"))?;
    Ok(Json(project))
}

// ============================================================================
// Collaborators
// ============================================================================

async fn add_collaborator(
    State(state): State<AppState>,
    Path(project_id): Path<i64>,
    Json(request): Json<AddCollaboratorRequest>,
) -> ApiResult<Response> {
    let wallet = request
        .wallet_address
        .ok_or_else(|| ApiError::bad_request("Wallet address is required"))?;
    let role = request.role.unwrap_or_else(|| "member".into());

    let users = UserRepository::new(state.pool.clone());
    let user = users
        .find_by_wallet(&wallet)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    let projects = ProjectRepository::new(state.pool.clone());
    if projects.is_collaborator(project_id, user.id).await? {
        return Err(ApiError::bad_request("User is already a collaborator"));
    }
    projects.add_collaborator(project_id, user.id, &role).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "Collaborator added successfully" })),
    )
        .into_response())
}

async fn remove_collaborator(
    State(state): State<AppState>,
    Path((project_id, user_id)): Path<(i64, i64)>,
) -> ApiResult<Json<Value>> {
    let projects = ProjectRepository::new(state.pool.clone());
    let role = projects
        .collaborator_role(project_id, user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Collaborator not found"))?;

    if role == "owner" {
        return Err(ApiError::forbidden("Cannot remove project owner"));
    }
    projects.remove_collaborator(project_id, user_id).await?;

    Ok(Json(json!({ "message": "Collaborator removed successfully" })))
}

// ============================================================================
// File repository
// ============================================================================

/// One level of the project file tree
async fn repository_listing(
    State(state): State<AppState>,
    Path(project_id): Path<i64>,
    Query(query): Query<RepositoryQuery>,
) -> ApiResult<Json<Vec<ProjectFileRow>>> {
    let projects = ProjectRepository::new(state.pool.clone());
    Ok(Json(projects.files(project_id, query.parent_id).await?))
}

async fn create_folder(
    State(state): State<AppState>,
    Path(project_id): Path<i64>,
    Json(request): Json<CreateFolderRequest>,
) -> ApiResult<Response> {
    let name = request
        .name
        .filter(|n| !n.is_empty())
        .ok_or_else(|| ApiError::bad_request("Folder name is required"))?;
    let wallet = request
        .uploader_wallet_address
        .ok_or_else(|| ApiError::bad_request("Uploader wallet address is required"))?;

    let users = UserRepository::new(state.pool.clone());
    let uploader = users
        .find_by_wallet(&wallet)
        .await?
        .ok_or_else(|| ApiError::not_found("Uploader not found."))?;

    let projects = ProjectRepository::new(state.pool.clone());
    projects
        .create_folder(project_id, request.parent_id, uploader.id, &name)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "Folder created successfully." })),
    )
        .into_response())
}

/// Multipart upload into the file tree; the `files` field may repeat
async fn upload_files(
    State(state): State<AppState>,
    Path(project_id): Path<i64>,
    mut multipart: Multipart,
) -> ApiResult<Response> {
    let mut files: Vec<(String, Vec<u8>)> = Vec::new();
    let mut parent_id: Option<i64> = None;
    let mut uploader_wallet: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Malformed multipart body: {e}")))?
    {
        match field.name().unwrap_or_default() {
            "files" => {
                let name = field.file_name().unwrap_or("upload").to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("Failed to read file: {e}")))?;
                files.push((name, bytes.to_vec()));
            }
            "parent_id" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("Malformed field: {e}")))?;
                parent_id = text.parse().ok();
            }
            "uploader_wallet_address" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("Malformed field: {e}")))?;
                uploader_wallet = Some(text);
            }
            _ => {}
        }
    }

    if files.is_empty() {
        return Err(ApiError::bad_request("No files were uploaded."));
    }
    let wallet = uploader_wallet
        .ok_or_else(|| ApiError::bad_request("Uploader wallet address is required"))?;

    let users = UserRepository::new(state.pool.clone());
    let uploader = users
        .find_by_wallet(&wallet)
        .await?
        .ok_or_else(|| ApiError::not_found("Uploader not found."))?;

    let projects = ProjectRepository::new(state.pool.clone());
    for (original_name, bytes) in &files {
        let stored = state.uploads.save(None, "files", original_name, bytes).await?;
        projects
            .add_file(
                project_id,
                parent_id,
                uploader.id,
                original_name,
                &stored.relative_path,
                stored.size,
            )
            .await?;
    }

    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "Files uploaded successfully." })),
    )
        .into_response())
}

// ============================================================================
// Milestones
// ============================================================================

async fn list_milestones(
    State(state): State<AppState>,
    Path(project_id): Path<i64>,
) -> ApiResult<Json<Vec<MilestoneRow>>> {
    let projects = ProjectRepository::new(state.pool.clone());
    Ok(Json(projects.milestones(project_id).await?))
}

async fn create_milestone(
    State(state): State<AppState>,
    Path(project_id): Path<i64>,
    Json(request): Json<MilestoneRequest>,
) -> ApiResult<Response> {
    let (title, milestone_type, date, wallet) = match (
        request.title,
        request.milestone_type,
        request.date,
        request.creator_wallet_address,
    ) {
        (Some(title), Some(t), Some(date), Some(wallet)) => (title, t, date, wallet),
        _ => {
            return Err(ApiError::bad_request(
                "Title, type, date, and creator wallet address are required",
            ))
        }
    };

    let users = UserRepository::new(state.pool.clone());
    let creator = users
        .find_by_wallet(&wallet)
        .await?
        .ok_or_else(|| ApiError::not_found("Creator not found"))?;

    let projects = ProjectRepository::new(state.pool.clone());
    let milestone = projects
        .create_milestone(
            project_id,
            &NewMilestone {
                title,
                description: request.description,
                milestone_type,
                date,
                status: request.status.unwrap_or_else(|| "planned".into()),
                creator_id: creator.id,
            },
        )
        .await?;

    Ok((StatusCode::CREATED, Json(milestone)).into_response())
}

async fn update_milestone(
    State(state): State<AppState>,
    Path((project_id, milestone_id)): Path<(i64, i64)>,
    Json(request): Json<MilestoneRequest>,
) -> ApiResult<Json<MilestoneRow>> {
    let projects = ProjectRepository::new(state.pool.clone());
    if !projects.milestone_belongs_to(milestone_id, project_id).await? {
        return Err(ApiError::not_found("Milestone not found"));
    }

    let (title, milestone_type, date, status) = match (
        request.title,
        request.milestone_type,
        request.date,
        request.status,
    ) {
        (Some(title), Some(t), Some(date), Some(status)) => (title, t, date, status),
        _ => return Err(ApiError::bad_request("Title, type, date, and status are required")),
    };

    let milestone = projects
        .update_milestone(
            milestone_id,
            project_id,
            &title,
            request.description.as_deref(),
            &milestone_type,
            &date,
            &status,
        )
        .await?
        .ok_or_else(|| ApiError::not_found("Milestone not found"))?;

    Ok(Json(milestone))
}

async fn delete_milestone(
    State(state): State<AppState>,
    Path((project_id, milestone_id)): Path<(i64, i64)>,
) -> ApiResult<Json<Value>> {
    let projects = ProjectRepository::new(state.pool.clone());
    if !projects.milestone_belongs_to(milestone_id, project_id).await? {
        return Err(ApiError::not_found("Milestone not found"));
    }
    projects.delete_milestone(milestone_id, project_id).await?;

    Ok(Json(json!({ "message": "Milestone deleted successfully" })))
}

// ============================================================================
// Project NFT
// ============================================================================

fn parse_metadata(metadata_uri: Option<&str>) -> Map<String, Value> {
    metadata_uri
        .and_then(|raw| serde_json::from_str::<Value>(raw).ok())
        .and_then(|v| match v {
            Value::Object(map) => Some(map),
            _ => None,
        })
        .unwrap_or_default()
}

fn project_summary(project: &ProjectRow) -> Value {
    json!({
        "id": project.id,
        "title": project.name,
        "description": project.description,
        "status": project.status,
        "category": project.category,
        "isCompleted": project.status == "Completed",
    })
}

/// Minimal percent-encoding for placeholder image URLs
pub(super) fn encode_uri_component(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}

/// NFT status for a project: whether one exists, plus its parsed metadata
async fn project_nft(
    State(state): State<AppState>,
    Path(project_id): Path<i64>,
) -> ApiResult<Json<Value>> {
    let projects = ProjectRepository::new(state.pool.clone());
    let project = projects
        .find(project_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Project not found"))?;

    let nfts = NftRepository::new(state.pool.clone());
    let Some(nft) = nfts.find_for_project(project_id).await? else {
        return Ok(Json(json!({
            "hasNFT": false,
            "project": project_summary(&project),
            "nft": null,
        })));
    };

    let metadata = parse_metadata(nft.nft.metadata_uri.as_deref());
    let nft_data = json!({
        "id": nft.nft.id,
        "tokenId": nft.nft.token_id,
        "contractAddress": nft.nft.contract_address,
        "metadata": metadata,
        "owner": {
            "id": nft.nft.owner_id,
            "username": nft.owner_username,
            "walletAddress": nft.owner_wallet_address,
        },
        "mintedAt": nft.nft.created_at,
        "title": metadata.get("title").cloned().unwrap_or_else(|| json!(project.name)),
        "description": metadata.get("description").cloned()
            .unwrap_or_else(|| json!(project.description)),
        "image": metadata.get("image").cloned().unwrap_or(Value::Null),
        "price": metadata.get("price").cloned().unwrap_or(json!(0)),
        "royalty": metadata.get("royalty").cloned().unwrap_or(json!(0)),
        "tags": metadata.get("tags").cloned().unwrap_or_else(|| json!([])),
        "views": metadata.get("views").cloned().unwrap_or(json!(0)),
    });

    Ok(Json(json!({
        "hasNFT": true,
        "project": project_summary(&project),
        "nft": nft_data,
    })))
}

/// Mint a completed project as a simulated NFT.
///
/// Public projects stay open access: minting one with a price is refused.
async fn mint_project_nft(
    State(state): State<AppState>,
    Path(project_id): Path<i64>,
    Json(request): Json<MintProjectNftRequest>,
) -> ApiResult<Response> {
    let (title, description, wallet) = match (
        request.title,
        request.description,
        request.wallet_address,
    ) {
        (Some(title), Some(description), Some(wallet)) => (title, description, wallet),
        _ => {
            return Err(ApiError::bad_request(
                "Title, description, and wallet address are required",
            ))
        }
    };
    let price = request.price.unwrap_or(0.0);

    let projects = ProjectRepository::new(state.pool.clone());
    let project = projects
        .find(project_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Project not found"))?;

    if project.status != "Completed" {
        return Err(ApiError::bad_request(
            "Project must be completed before minting as NFT",
        ));
    }
    if project.visibility == "Public" && price > 0.0 {
        return Err(ApiError::bad_request(
            "Public projects must have open access (price = 0) when minting NFTs. Cannot set price for public projects.",
        ));
    }

    let nfts = NftRepository::new(state.pool.clone());
    if nfts.exists_for_project(project_id).await? {
        return Err(ApiError::bad_request("NFT already exists for this project"));
    }

    let users = UserRepository::new(state.pool.clone());
    let user = users
        .find_by_wallet(&wallet)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    let token = state.chain.mint();
    let metadata = json!({
        "title": title,
        "description": description,
        "image": format!(
            "https://via.placeholder.com/400x300/1a1a2e/eee?text={}",
            encode_uri_component(&title)
        ),
        "price": price,
        "royalty": request.royalty.unwrap_or(0.0),
        "tags": request.tags.unwrap_or_else(|| json!([])),
        "views": 0,
        "projectId": project_id,
        "mintedAt": chrono::Utc::now().to_rfc3339(),
    });

    let nft = nfts
        .record_mint(project_id, &token, &metadata.to_string(), user.id, "Project")
        .await?;

    state
        .activity
        .log(
            ActivityEntry::new("mint", "nft", format!("Minted project '{}' as NFT", project.name))
                .user(user.id, user.username)
                .wallet(wallet)
                .resource(project.id, project.name.clone()),
        )
        .await;

    let mut nft_data = json!({
        "id": nft.nft.id,
        "tokenId": nft.nft.token_id,
        "contractAddress": nft.nft.contract_address,
        "metadata": metadata,
        "owner": {
            "id": nft.nft.owner_id,
            "username": nft.owner_username,
            "walletAddress": nft.owner_wallet_address,
        },
        "mintedAt": nft.nft.created_at,
    });
    if let (Value::Object(out), Value::Object(fields)) = (&mut nft_data, &metadata) {
        for (key, value) in fields {
            out.insert(key.clone(), value.clone());
        }
    }

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Project successfully minted as NFT",
            "nft": nft_data,
        })),
    )
        .into_response())
}

/// Merge arbitrary metadata fields into the stored NFT metadata blob
async fn update_project_nft(
    State(state): State<AppState>,
    Path(project_id): Path<i64>,
    Json(updates): Json<Value>,
) -> ApiResult<Json<Value>> {
    let nfts = NftRepository::new(state.pool.clone());
    let nft = nfts
        .find_for_project(project_id)
        .await?
        .ok_or_else(|| ApiError::not_found("NFT not found for this project"))?;

    let mut metadata = parse_metadata(nft.nft.metadata_uri.as_deref());
    if let Value::Object(fields) = updates {
        for (key, value) in fields {
            metadata.insert(key, value);
        }
    }
    metadata.insert("updatedAt".into(), json!(chrono::Utc::now().to_rfc3339()));

    let metadata = Value::Object(metadata);
    nfts.update_project_metadata(project_id, &metadata.to_string())
        .await?;

    Ok(Json(json!({
        "message": "NFT updated successfully",
        "metadata": metadata,
    })))
}

/// All tokens minted against a project, metadata flattened into each row
async fn project_nfts(
    State(state): State<AppState>,
    Path(project_id): Path<i64>,
) -> ApiResult<Json<Vec<Value>>> {
    let nfts = NftRepository::new(state.pool.clone());
    let rows = nfts.list_for_project(project_id).await?;

    let formatted = rows
        .into_iter()
        .map(|nft| {
            let metadata = parse_metadata(nft.nft.metadata_uri.as_deref());
            let mut body = json!({
                "id": nft.nft.id,
                "token_id": nft.nft.token_id,
                "contract_address": nft.nft.contract_address,
                "asset_type": nft.nft.asset_type,
                "project_id": nft.nft.project_id,
                "owner_id": nft.nft.owner_id,
                "owner_username": nft.owner_username,
                "owner_wallet_address": nft.owner_wallet_address,
                "created_at": nft.nft.created_at,
                "views": metadata.get("views").cloned().unwrap_or(json!(0)),
            });
            if let Value::Object(out) = &mut body {
                for (key, value) in metadata {
                    out.entry(key).or_insert(value);
                }
            }
            body
        })
        .collect();

    Ok(Json(formatted))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uri_component_encoding() {
        assert_eq!(encode_uri_component("plain"), "plain");
        assert_eq!(encode_uri_component("two words"), "two%20words");
        assert_eq!(encode_uri_component("a/b?c"), "a%2Fb%3Fc");
    }

    #[test]
    fn metadata_parsing_tolerates_garbage() {
        assert!(parse_metadata(None).is_empty());
        assert!(parse_metadata(Some("not json")).is_empty());
        assert!(parse_metadata(Some("[1,2]")).is_empty());
        let map = parse_metadata(Some(r#"{"price": 2}"#));
        assert_eq!(map.get("price"), Some(&json!(2)));
    }
}
