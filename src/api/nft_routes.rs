//! NFT routes: minting for any owned asset, the marketplace view and
//! simulated purchases.
//!
//! Tokens are simulated through the configured chain client; metadata is
//! stored as JSON text and flattened into detail responses.

use std::collections::HashMap;

use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Map, Value};

use super::AppState;
use crate::chain::fake_ipfs_cid;
use crate::database::nft_repository::{MarketplaceListing, NftWithOwner};
use crate::database::{
    DatasetRepository, NftRepository, ProjectRepository, PublicationRepository, UserRepository,
};
use crate::error::{ApiError, ApiResult};

// ============================================================================
// Request types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct MarketplaceQuery {
    pub status: Option<String>,
    pub category: Option<String>,
    #[serde(rename = "assetType")]
    pub asset_type: Option<String>,
    pub search: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct ListNftRequest {
    pub price: Option<f64>,
    pub duration: Option<String>,
    pub royalty: Option<f64>,
    pub description: Option<String>,
    #[serde(rename = "walletAddress")]
    pub wallet_address: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PurchaseRequest {
    pub marketplace_id: Option<i64>,
    pub buyer_wallet_address: Option<String>,
}

// ============================================================================
// Router
// ============================================================================

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(marketplace))
        .route("/mint", post(mint))
        .route("/user/:wallet_address", get(nfts_for_user))
        .route("/marketplace/project/:project_id", get(marketplace_for_project))
        .route("/marketplace/purchase", post(purchase))
        .route("/:nft_id", get(get_nft))
        .route("/:nft_id/list", post(list_for_sale))
        .route("/:nft_id/view", post(log_view))
}

fn parse_metadata(raw: Option<&str>) -> Map<String, Value> {
    raw.and_then(|r| serde_json::from_str::<Value>(r).ok())
        .and_then(|v| match v {
            Value::Object(map) => Some(map),
            _ => None,
        })
        .unwrap_or_default()
}

/// Base camelCase shape shared by list and detail responses
fn format_nft(nft: &NftWithOwner) -> Value {
    json!({
        "id": nft.nft.id,
        "tokenId": nft.nft.token_id,
        "contractAddress": nft.nft.contract_address,
        "metadataUri": nft.nft.metadata_uri,
        "assetType": nft.nft.asset_type,
        "projectId": nft.nft.project_id,
        "owner": {
            "id": nft.nft.owner_id,
            "username": nft.owner_username,
            "walletAddress": nft.owner_wallet_address,
        },
        "mintedAt": nft.nft.created_at,
    })
}

/// Base shape with the stored metadata fields merged in. Base fields win
/// on key collisions.
fn format_nft_with_metadata(nft: &NftWithOwner) -> Value {
    let mut body = format_nft(nft);
    if let Value::Object(map) = &mut body {
        for (key, value) in parse_metadata(nft.nft.metadata_uri.as_deref()) {
            map.entry(key).or_insert(value);
        }
    }
    body
}

// ============================================================================
// Handlers
// ============================================================================

async fn nfts_for_user(
    State(state): State<AppState>,
    Path(wallet_address): Path<String>,
) -> ApiResult<Json<Vec<Value>>> {
    let users = UserRepository::new(state.pool.clone());
    let user = users
        .find_by_wallet(&wallet_address)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    let nfts = NftRepository::new(state.pool.clone());
    let rows = nfts.list_for_owner(user.id).await?;
    Ok(Json(rows.iter().map(format_nft).collect()))
}

/// Marketplace feed. Status, category and search live inside the token
/// metadata, so they filter after the rows are flattened.
async fn marketplace(
    State(state): State<AppState>,
    Query(query): Query<MarketplaceQuery>,
) -> ApiResult<Json<Vec<Value>>> {
    let nfts = NftRepository::new(state.pool.clone());
    let rows = nfts
        .list_all(
            query.asset_type.as_deref(),
            query.limit.unwrap_or(50),
            query.offset.unwrap_or(0),
        )
        .await?;

    let mut formatted: Vec<Value> = rows.iter().map(format_nft_with_metadata).collect();

    if let Some(status) = &query.status {
        formatted.retain(|nft| nft["status"].as_str() == Some(status));
    }
    if let Some(category) = &query.category {
        formatted.retain(|nft| nft["category"].as_str() == Some(category));
    }
    if let Some(search) = &query.search {
        let needle = search.to_lowercase();
        formatted.retain(|nft| {
            ["title", "description", "category"].iter().any(|key| {
                nft[key]
                    .as_str()
                    .map(|v| v.to_lowercase().contains(&needle))
                    .unwrap_or(false)
            })
        });
    }

    Ok(Json(formatted))
}

async fn get_nft(
    State(state): State<AppState>,
    Path(nft_id): Path<i64>,
) -> ApiResult<Json<Value>> {
    let nfts = NftRepository::new(state.pool.clone());
    let nft = nfts
        .find(nft_id)
        .await?
        .ok_or_else(|| ApiError::not_found("NFT not found"))?;
    Ok(Json(format_nft_with_metadata(&nft)))
}

async fn marketplace_for_project(
    State(state): State<AppState>,
    Path(project_id): Path<i64>,
) -> ApiResult<Json<Vec<MarketplaceListing>>> {
    let nfts = NftRepository::new(state.pool.clone());
    Ok(Json(nfts.marketplace_for_project(project_id).await?))
}

/// Mint any owned asset as a token. The multipart form carries the asset
/// reference, metadata fields and an optional cover image.
async fn mint(State(state): State<AppState>, mut multipart: Multipart) -> ApiResult<Response> {
    let mut fields: HashMap<String, String> = HashMap::new();
    let mut cover_image_uploaded = false;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Malformed multipart body: {e}")))?
    {
        let Some(name) = field.name().map(String::from) else {
            continue;
        };
        if name == "coverImage" {
            let original_name = field.file_name().unwrap_or("cover").to_string();
            let bytes = field
                .bytes()
                .await
                .map_err(|e| ApiError::bad_request(format!("Failed to read file: {e}")))?;
            state
                .uploads
                .save(None, "coverImage", &original_name, &bytes)
                .await?;
            cover_image_uploaded = true;
        } else {
            let value = field
                .text()
                .await
                .map_err(|e| ApiError::bad_request(format!("Failed to read field: {e}")))?;
            fields.insert(name, value);
        }
    }

    let required = ["assetType", "selectedAsset", "title", "description", "contentCID"];
    if required.iter().any(|key| {
        fields.get(*key).map(|v| v.is_empty()).unwrap_or(true)
    }) {
        return Err(ApiError::bad_request(
            "Asset type, selected asset, title, description, and content CID are required",
        ));
    }

    let asset_type = fields["assetType"].clone();
    let selected_asset: i64 = fields["selectedAsset"]
        .parse()
        .map_err(|_| ApiError::bad_request("Invalid asset ID"))?;

    let authors: Vec<Value> = fields
        .get("authors")
        .and_then(|raw| serde_json::from_str(raw).ok())
        .ok_or_else(|| ApiError::bad_request("Invalid authors format"))?;
    if authors.is_empty() {
        return Err(ApiError::bad_request("At least one author is required"));
    }

    // First author becomes the token owner
    let owner_wallet = authors[0]["address"].as_str().unwrap_or_default().to_string();
    let users = UserRepository::new(state.pool.clone());
    let owner = users
        .find_by_wallet(&owner_wallet)
        .await?
        .ok_or_else(|| ApiError::not_found("Owner not found"))?;

    let open_access = fields.get("openAccess").map(|v| v == "true").unwrap_or(false);

    match asset_type.as_str() {
        "Dataset" => {
            let datasets = DatasetRepository::new(state.pool.clone());
            let dataset = datasets
                .find_owned(selected_asset, owner.id)
                .await?
                .ok_or_else(|| ApiError::not_found("Asset not found or not owned by user"))?;
            if dataset.privacy_level == "public" && !open_access {
                return Err(ApiError::bad_request(
                    "Public datasets must have open access when minting NFTs. Cannot set restricted access for public datasets.",
                ));
            }
        }
        "Project" => {
            let projects = ProjectRepository::new(state.pool.clone());
            let project = projects
                .find(selected_asset)
                .await?
                .filter(|p| p.owner_id == owner.id)
                .ok_or_else(|| ApiError::not_found("Asset not found or not owned by user"))?;
            if project.visibility == "Public" && !open_access {
                return Err(ApiError::bad_request(
                    "Public projects must have open access when minting NFTs. Cannot set restricted access for public projects.",
                ));
            }
        }
        "Publication" => {
            let publications = PublicationRepository::new(state.pool.clone());
            publications
                .find(selected_asset)
                .await?
                .filter(|p| p.publication.author_id == owner.id)
                .ok_or_else(|| ApiError::not_found("Asset not found or not owned by user"))?;
        }
        _ => return Err(ApiError::not_found("Asset not found or not owned by user")),
    }

    let token = state.chain.mint();

    let cover_image = if cover_image_uploaded {
        Some(fake_ipfs_cid())
    } else {
        fields.get("coverImageCID").cloned()
    };
    let image = cover_image
        .or_else(|| fields.get("previewImageCID").cloned())
        .unwrap_or_else(|| {
            format!(
                "https://via.placeholder.com/400x300/1a1a2e/eee?text={}",
                super::project_routes::encode_uri_component(&fields["title"])
            )
        });

    let keywords: Value = fields
        .get("keywords")
        .and_then(|raw| serde_json::from_str(raw).ok())
        .unwrap_or_else(|| json!([]));

    let metadata = json!({
        "title": fields["title"],
        "description": fields["description"],
        "category": fields.get("category"),
        "keywords": keywords,
        "image": image,
        "assetType": asset_type,
        "selectedAsset": selected_asset,
        "authors": authors,
        "contentCID": fields["contentCID"],
        "openAccess": open_access,
        "accessPrice": fields
            .get("accessPrice")
            .and_then(|v| v.parse::<f64>().ok())
            .unwrap_or(0.0),
        "isLimitedEdition": fields.get("isLimitedEdition").map(|v| v == "true").unwrap_or(false),
        "editionSize": fields
            .get("editionSize")
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(0),
        "status": "Minted",
        "views": 0,
        "mintedAt": chrono::Utc::now().to_rfc3339(),
    });

    let nfts = NftRepository::new(state.pool.clone());
    let nft = nfts
        .record_mint(
            selected_asset,
            &token,
            &metadata.to_string(),
            owner.id,
            &asset_type,
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Asset successfully minted as NFT",
            "nft": format_nft_with_metadata(&nft),
        })),
    )
        .into_response())
}

/// Put an owned token up for sale
async fn list_for_sale(
    State(state): State<AppState>,
    Path(nft_id): Path<i64>,
    Json(request): Json<ListNftRequest>,
) -> ApiResult<Json<Value>> {
    let (price, _duration, wallet) = match (
        request.price,
        request.duration,
        request.wallet_address,
    ) {
        (Some(price), Some(duration), Some(wallet)) => (price, duration, wallet),
        _ => {
            return Err(ApiError::bad_request(
                "Price, duration, and wallet address are required",
            ))
        }
    };

    let nfts = NftRepository::new(state.pool.clone());
    let nft = nfts
        .find(nft_id)
        .await?
        .ok_or_else(|| ApiError::not_found("NFT not found"))?;

    if nft.owner_wallet_address != wallet {
        return Err(ApiError::forbidden("You do not own this NFT"));
    }

    nfts.create_listing(nft_id, nft.nft.owner_id, price, "ETH").await?;

    Ok(Json(json!({
        "message": "NFT listed for sale successfully",
        "nft": {
            "id": nft.nft.id,
            "metadataUri": nft.nft.metadata_uri,
            "status": "Listed",
            "price": price,
        },
    })))
}

async fn log_view(
    State(state): State<AppState>,
    Path(nft_id): Path<i64>,
) -> ApiResult<Json<Value>> {
    let nfts = NftRepository::new(state.pool.clone());
    if nfts.find(nft_id).await?.is_none() {
        return Err(ApiError::not_found("NFT not found"));
    }

    tracing::debug!(nft_id, "nft viewed");
    Ok(Json(json!({ "success": true, "message": "View logged" })))
}

/// Simulated purchase: transfers ownership and closes the listing in one
/// transaction.
async fn purchase(
    State(state): State<AppState>,
    Json(request): Json<PurchaseRequest>,
) -> ApiResult<Json<Value>> {
    let (marketplace_id, buyer_wallet) = match (
        request.marketplace_id,
        request.buyer_wallet_address,
    ) {
        (Some(id), Some(wallet)) => (id, wallet),
        _ => {
            return Err(ApiError::bad_request(
                "Marketplace ID and buyer wallet address are required",
            ))
        }
    };

    let users = UserRepository::new(state.pool.clone());
    let buyer = users
        .find_by_wallet(&buyer_wallet)
        .await?
        .ok_or_else(|| ApiError::not_found("Buyer not found"))?;

    let nfts = NftRepository::new(state.pool.clone());
    let listing = nfts
        .purchasable_listing(marketplace_id)
        .await?
        .ok_or_else(|| ApiError::not_found("NFT listing not found or not available for sale"))?;

    if listing.seller_id == buyer.id {
        return Err(ApiError::bad_request("Cannot buy your own NFT"));
    }

    nfts.purchase(&listing, buyer.id).await?;

    Ok(Json(json!({
        "success": true,
        "message": format!(
            "Successfully purchased NFT for {} {}",
            listing.price, listing.currency
        ),
        "transaction": {
            "nft_id": listing.nft_id,
            "price": listing.price,
            "currency": listing.currency,
            "seller": listing.seller_username,
            "buyer_id": buyer.id,
        },
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_flattening_prefers_base_fields() {
        let nft = NftWithOwner {
            nft: crate::database::nft_repository::NftRow {
                id: 7,
                project_id: 3,
                token_id: Some("0xabc".into()),
                contract_address: Some("0xdef".into()),
                metadata_uri: Some(r#"{"title":"Genome Atlas","id":999}"#.into()),
                owner_id: 1,
                asset_type: "Dataset".into(),
                created_at: "2026-01-01 00:00:00".into(),
            },
            owner_username: Some("ada".into()),
            owner_wallet_address: "0x1".into(),
        };

        let body = format_nft_with_metadata(&nft);
        assert_eq!(body["title"], "Genome Atlas");
        // Column values win over metadata keys
        assert_eq!(body["id"], 7);
    }
}
