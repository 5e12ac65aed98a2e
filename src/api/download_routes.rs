//! Generic download endpoint for files in the uploads directory

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use tokio_util::io::ReaderStream;

use super::AppState;
use crate::error::ApiResult;

pub fn router() -> Router<AppState> {
    Router::new().route("/api/download/:filename", get(download))
}

/// Stream a stored file back as an attachment. The store rejects names
/// that resolve outside the uploads directory before any disk access.
async fn download(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> ApiResult<Response> {
    let path = state.uploads.resolve(&filename)?;

    let file = match tokio::fs::File::open(&path).await {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok((
                StatusCode::NOT_FOUND,
                Json(json!({ "msg": "File not found" })),
            )
                .into_response());
        }
        Err(e) => return Err(e.into()),
    };

    let stream = ReaderStream::new(file);
    Ok((
        StatusCode::OK,
        [(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{filename}\""),
        )],
        Body::from_stream(stream),
    )
        .into_response())
}
