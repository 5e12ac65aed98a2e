//! Publication routes: CRUD, the public explore feed, DOI metadata lookup
//! through Crossref and PDF upload.
//!
//! Responses use the camelCase shape the publishing UI consumes rather
//! than the raw column names.

use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};

use super::AppState;
use crate::database::publication_repository::{
    NewPublication, PublicationUpdate, PublicationWithAuthor,
};
use crate::database::{PublicationRepository, UserRepository};
use crate::error::{ApiError, ApiResult};

// ============================================================================
// Request types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct CreatePublicationRequest {
    pub title: Option<String>,
    pub authors: Option<Value>,
    #[serde(rename = "abstract")]
    pub abstract_text: Option<String>,
    pub keywords: Option<Value>,
    pub category: Option<String>,
    pub status: Option<String>,
    pub author_wallet_address: Option<String>,
    pub doi: Option<String>,
    pub preprint_server: Option<String>,
    pub published_at: Option<String>,
    pub citation_count: Option<i64>,
    pub download_count: Option<i64>,
    pub views: Option<i64>,
    pub is_imported: Option<bool>,
    pub original_url: Option<String>,
    pub publisher: Option<String>,
    pub volume: Option<String>,
    pub impact_factor: Option<f64>,
    pub import_notes: Option<String>,
    pub pdf_path: Option<String>,
    pub pdf_file_name: Option<String>,
    pub pdf_file_size: Option<i64>,
    pub pdf_mime_type: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdatePublicationRequest {
    pub title: Option<String>,
    pub authors: Option<Value>,
    #[serde(rename = "abstract")]
    pub abstract_text: Option<String>,
    pub keywords: Option<Value>,
    pub category: Option<String>,
    pub status: Option<String>,
    pub doi: Option<String>,
    pub peer_review_id: Option<String>,
    pub review_comments: Option<String>,
    pub preprint_server: Option<String>,
    pub published_at: Option<String>,
    pub submitted_at: Option<String>,
}

// ============================================================================
// Router
// ============================================================================

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_publication))
        .route("/explore/public", get(explore_public))
        .route("/user/:wallet_address", get(publications_for_user))
        .route("/doi/:doi", get(doi_lookup))
        .route("/upload", post(upload_pdf))
        .route(
            "/:publication_id",
            get(get_publication)
                .put(update_publication)
                .delete(delete_publication),
        )
}

fn parse_json_array(raw: Option<&str>) -> Value {
    raw.and_then(|r| serde_json::from_str(r).ok())
        .unwrap_or_else(|| json!([]))
}

/// camelCase view of a publication row
fn format_publication(publication: &PublicationWithAuthor) -> Value {
    let p = &publication.publication;
    json!({
        "id": p.id,
        "title": p.title,
        "authors": parse_json_array(Some(&p.authors)),
        "abstract": p.abstract_text,
        "keywords": parse_json_array(p.keywords.as_deref()),
        "category": p.category,
        "status": p.status,
        "createdAt": p.created_at,
        "publishedAt": p.published_at,
        "submittedAt": p.submitted_at,
        "lastModified": p.last_modified,
        "doi": p.doi,
        "citationCount": p.citation_count,
        "downloadCount": p.download_count,
        "views": p.views,
        "shares": p.shares,
        "likeCount": p.like_count,
        "reviewDeadline": p.review_deadline,
        "peerReviewId": p.peer_review_id,
        "reviewComments": p.review_comments,
        "preprintServer": p.preprint_server,
        "isImported": p.is_imported,
        "originalUrl": p.original_url,
        "publisher": p.publisher,
        "volume": p.volume,
        "impactFactor": p.impact_factor,
        "importNotes": p.import_notes,
        "pdfPath": p.pdf_path,
        "pdfFileName": p.pdf_file_name,
        "authorUsername": publication.author_username,
        "authorWalletAddress": publication.author_wallet_address,
    })
}

// ============================================================================
// Handlers
// ============================================================================

/// Published and preprint papers, newest first
async fn explore_public(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<Vec<Value>>> {
    let publications = PublicationRepository::new(state.pool.clone());
    let rows = publications
        .explore_public(query.limit.unwrap_or(20), query.offset.unwrap_or(0))
        .await?;
    Ok(Json(rows.iter().map(format_publication).collect()))
}

async fn publications_for_user(
    State(state): State<AppState>,
    Path(wallet_address): Path<String>,
) -> ApiResult<Json<Vec<Value>>> {
    let users = UserRepository::new(state.pool.clone());
    let user = users
        .find_by_wallet(&wallet_address)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    let publications = PublicationRepository::new(state.pool.clone());
    let rows = publications.list_for_author(user.id).await?;
    Ok(Json(rows.iter().map(format_publication).collect()))
}

async fn get_publication(
    State(state): State<AppState>,
    Path(publication_id): Path<i64>,
) -> ApiResult<Json<Value>> {
    let publications = PublicationRepository::new(state.pool.clone());
    let publication = publications
        .find(publication_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Publication not found"))?;
    Ok(Json(format_publication(&publication)))
}

async fn create_publication(
    State(state): State<AppState>,
    Json(request): Json<CreatePublicationRequest>,
) -> ApiResult<Response> {
    let (title, authors, wallet) = match (
        request.title,
        request.authors,
        request.author_wallet_address,
    ) {
        (Some(title), Some(authors), Some(wallet)) => (title, authors, wallet),
        _ => {
            return Err(ApiError::bad_request(
                "Title, authors, and author wallet address are required",
            ))
        }
    };

    let users = UserRepository::new(state.pool.clone());
    let author = users
        .find_by_wallet(&wallet)
        .await?
        .ok_or_else(|| ApiError::not_found("Author not found"))?;

    let new = NewPublication {
        title,
        authors_json: authors.to_string(),
        abstract_text: request.abstract_text,
        keywords_json: request.keywords.unwrap_or_else(|| json!([])).to_string(),
        category: request.category,
        status: request.status.unwrap_or_else(|| "Draft".into()),
        author_id: author.id,
        doi: request.doi,
        published_at: request.published_at,
        citation_count: request.citation_count.unwrap_or(0),
        download_count: request.download_count.unwrap_or(0),
        views: request.views.unwrap_or(0),
        is_imported: request.is_imported.unwrap_or(false),
        original_url: request.original_url,
        publisher: request.publisher,
        volume: request.volume,
        impact_factor: request.impact_factor,
        import_notes: request.import_notes,
        pdf_path: request.pdf_path,
        pdf_file_name: request.pdf_file_name,
        pdf_file_size: request.pdf_file_size,
        pdf_mime_type: request.pdf_mime_type,
        preprint_server: request.preprint_server,
    };

    let publications = PublicationRepository::new(state.pool.clone());
    let publication = publications.create(&new).await?;

    Ok((StatusCode::CREATED, Json(format_publication(&publication))).into_response())
}

async fn update_publication(
    State(state): State<AppState>,
    Path(publication_id): Path<i64>,
    Json(request): Json<UpdatePublicationRequest>,
) -> ApiResult<Json<Value>> {
    let update = PublicationUpdate {
        title: request.title,
        authors_json: request.authors.map(|a| a.to_string()),
        abstract_text: request.abstract_text,
        keywords_json: request.keywords.map(|k| k.to_string()),
        category: request.category,
        status: request.status,
        doi: request.doi,
        peer_review_id: request.peer_review_id,
        review_comments: request.review_comments,
        preprint_server: request.preprint_server,
        published_at: request.published_at,
        submitted_at: request.submitted_at,
    };

    let publications = PublicationRepository::new(state.pool.clone());
    let publication = publications
        .update(publication_id, &update)
        .await?
        .ok_or_else(|| ApiError::not_found("Publication not found"))?;
    Ok(Json(format_publication(&publication)))
}

async fn delete_publication(
    State(state): State<AppState>,
    Path(publication_id): Path<i64>,
) -> ApiResult<Json<Value>> {
    let publications = PublicationRepository::new(state.pool.clone());
    if !publications.delete(publication_id).await? {
        return Err(ApiError::not_found("Publication not found"));
    }
    Ok(Json(json!({ "message": "Publication deleted successfully" })))
}

// ============================================================================
// DOI lookup
// ============================================================================

/// DOI shape: `10.` followed by a 4-9 digit registrant and a suffix
fn is_valid_doi(doi: &str) -> bool {
    let Some(rest) = doi.strip_prefix("10.") else {
        return false;
    };
    let Some((registrant, suffix)) = rest.split_once('/') else {
        return false;
    };
    (4..=9).contains(&registrant.len())
        && registrant.chars().all(|c| c.is_ascii_digit())
        && !suffix.is_empty()
        && suffix.chars().all(|c| {
            c.is_ascii_alphanumeric() || "-._;()/:".contains(c)
        })
}

fn strip_html_tags(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_tag = false;
    for c in s.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            c if !in_tag => out.push(c),
            _ => {}
        }
    }
    out
}

fn categorize_subjects(subjects: &[String]) -> Option<&'static str> {
    let lower: Vec<String> = subjects.iter().map(|s| s.to_lowercase()).collect();
    let any = |needles: &[&str]| lower.iter().any(|s| needles.iter().any(|n| s.contains(n)));

    if any(&["computer", "software", "algorithm"]) {
        Some("Computer Science")
    } else if any(&["biology", "life", "genetic"]) {
        Some("Biology")
    } else if any(&["medicine", "medical", "health"]) {
        Some("Medicine")
    } else if any(&["physics", "quantum"]) {
        Some("Physics")
    } else if any(&["chemistry", "chemical"]) {
        Some("Chemistry")
    } else if any(&["environment", "climate"]) {
        Some("Environmental Science")
    } else {
        None
    }
}

fn crossref_author_name(author: &Value) -> String {
    match (author["given"].as_str(), author["family"].as_str()) {
        (Some(given), Some(family)) => format!("{given} {family}"),
        _ => author["name"]
            .as_str()
            .or(author["family"].as_str())
            .unwrap_or("Unknown Author")
            .to_string(),
    }
}

/// Fetch publication metadata for a DOI from Crossref and condense it
/// into the import form's shape.
async fn doi_lookup(
    State(state): State<AppState>,
    Path(doi): Path<String>,
) -> ApiResult<Json<Value>> {
    if !is_valid_doi(&doi) {
        return Err(ApiError::bad_request("Invalid DOI format"));
    }

    let response = state
        .http
        .get(format!("https://api.crossref.org/works/{doi}"))
        .header("Accept", "application/json")
        .header("User-Agent", "DeSci-Platform/1.0 (mailto:contact@desci-platform.org)")
        .send()
        .await
        .map_err(|e| ApiError::Upstream(format!("DOI lookup failed: {e}")))?;

    if response.status() == reqwest::StatusCode::NOT_FOUND {
        return Err(ApiError::not_found("DOI not found in database"));
    }
    if !response.status().is_success() {
        return Err(ApiError::Upstream(format!(
            "Failed to fetch DOI information: {}",
            response.status()
        )));
    }

    let data: Value = response
        .json()
        .await
        .map_err(|e| ApiError::Upstream(format!("DOI response malformed: {e}")))?;
    let work = &data["message"];
    if work.is_null() {
        return Err(ApiError::not_found("No publication data found for this DOI"));
    }

    let authors: Vec<String> = work["author"]
        .as_array()
        .map(|list| list.iter().map(crossref_author_name).collect())
        .unwrap_or_default();

    let subjects: Vec<String> = work["subject"]
        .as_array()
        .map(|list| {
            list.iter()
                .filter_map(|s| s.as_str().map(String::from))
                .collect()
        })
        .unwrap_or_default();

    let published_date = work["published"]["date-parts"][0]
        .as_array()
        .and_then(|parts| {
            let year = parts.first()?.as_i64()?;
            let month = parts.get(1).and_then(|m| m.as_i64()).unwrap_or(1);
            let day = parts.get(2).and_then(|d| d.as_i64()).unwrap_or(1);
            Some(format!("{year:04}-{month:02}-{day:02}T00:00:00.000Z"))
        });

    let mut volume_info = Vec::new();
    if let Some(volume) = work["volume"].as_str() {
        volume_info.push(format!("Vol. {volume}"));
    }
    if let Some(issue) = work["issue"].as_str() {
        volume_info.push(format!("Issue {issue}"));
    }
    if let Some(page) = work["page"].as_str() {
        volume_info.push(format!("pp. {page}"));
    }

    Ok(Json(json!({
        "title": work["title"][0].as_str(),
        "authors": authors,
        "abstract": work["abstract"].as_str().map(strip_html_tags),
        "publishedDate": published_date,
        "source": work["container-title"][0].as_str(),
        "publisher": work["publisher"].as_str(),
        "volume": if volume_info.is_empty() { None } else { Some(volume_info.join(", ")) },
        "keywords": subjects.iter().take(10).collect::<Vec<_>>(),
        "category": categorize_subjects(&subjects),
        "citationCount": work["is-referenced-by-count"].as_i64().unwrap_or(0),
        "originalUrl": work["URL"].as_str(),
    })))
}

// ============================================================================
// PDF upload
// ============================================================================

/// Store a publication PDF and return its disk location for a later
/// create/update call.
async fn upload_pdf(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<Json<Value>> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Malformed multipart body: {e}")))?
    {
        if field.name() != Some("pdf") {
            continue;
        }

        if field.content_type() != Some("application/pdf") {
            return Err(ApiError::bad_request("Only PDF files are allowed"));
        }

        let original_name = field.file_name().unwrap_or("upload.pdf").to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::bad_request(format!("Failed to read file: {e}")))?;

        let stored = state
            .uploads
            .save(None, "publication", &original_name, &bytes)
            .await?;

        return Ok(Json(json!({
            "file_name": stored.disk_name,
            "file_path": stored.relative_path,
            "mime_type": "application/pdf",
            "file_size": stored.size,
            "original_name": original_name,
        })));
    }

    Err(ApiError::bad_request("PDF file is required"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doi_validation() {
        assert!(is_valid_doi("10.1038/nature12373"));
        assert!(is_valid_doi("10.48550/arXiv.2301.00001"));
        assert!(!is_valid_doi("doi:10.1038/nature12373"));
        assert!(!is_valid_doi("10.12/short-registrant"));
        assert!(!is_valid_doi("10.1038/"));
        assert!(!is_valid_doi("11.1038/nature12373"));
    }

    #[test]
    fn html_stripping() {
        assert_eq!(strip_html_tags("<p>Plain <b>bold</b></p>"), "Plain bold");
        assert_eq!(strip_html_tags("no tags"), "no tags");
    }

    #[test]
    fn subject_categorization() {
        let cs = vec!["Algorithm Design".to_string()];
        assert_eq!(categorize_subjects(&cs), Some("Computer Science"));
        let none = vec!["History".to_string()];
        assert_eq!(categorize_subjects(&none), None);
    }
}
