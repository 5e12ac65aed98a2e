//! Activity log admin routes: filtered listing, statistics, the critical
//! feed, retention cleanup and CSV/JSON export.

use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};

use super::AppState;
use crate::database::activity_log_repository::{CriticalLog, ExportRow, LogFilter, LogStats};
use crate::database::ActivityLogRepository;
use crate::error::ApiResult;

// ============================================================================
// Request types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub severity: Option<String>,
    #[serde(rename = "actionType")]
    pub action_type: Option<String>,
    #[serde(rename = "resourceType")]
    pub resource_type: Option<String>,
    #[serde(rename = "userId")]
    pub user_id: Option<i64>,
    #[serde(rename = "startDate")]
    pub start_date: Option<String>,
    #[serde(rename = "endDate")]
    pub end_date: Option<String>,
    pub search: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    #[serde(rename = "timeRange")]
    pub time_range: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CriticalQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct CleanupQuery {
    #[serde(rename = "olderThan")]
    pub older_than: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ExportQuery {
    #[serde(rename = "startDate")]
    pub start_date: Option<String>,
    #[serde(rename = "endDate")]
    pub end_date: Option<String>,
    pub format: Option<String>,
}

// ============================================================================
// Router
// ============================================================================

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_logs))
        .route("/stats", get(stats))
        .route("/critical", get(critical))
        .route("/cleanup", delete(cleanup))
        .route("/export", get(export))
}

// ============================================================================
// Handlers
// ============================================================================

/// Paginated log listing. Stored metadata JSON is parsed back into an
/// object for the response.
async fn list_logs(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Value>> {
    let filter = LogFilter {
        severity: query.severity,
        action_type: query.action_type,
        resource_type: query.resource_type,
        user_id: query.user_id,
        start_date: query.start_date,
        end_date: query.end_date,
        search: query.search,
    };

    let repo = ActivityLogRepository::new(state.pool.clone());
    let page = repo
        .list(&filter, query.page.unwrap_or(1), query.limit.unwrap_or(50))
        .await?;

    let logs: Vec<Value> = page
        .logs
        .iter()
        .map(|log| {
            let mut body = json!(log);
            body["metadata"] = log
                .metadata
                .as_deref()
                .and_then(|raw| serde_json::from_str(raw).ok())
                .unwrap_or(Value::Null);
            body
        })
        .collect();

    Ok(Json(json!({ "logs": logs, "pagination": page.pagination })))
}

async fn stats(
    State(state): State<AppState>,
    Query(query): Query<StatsQuery>,
) -> ApiResult<Json<LogStats>> {
    let repo = ActivityLogRepository::new(state.pool.clone());
    let stats = repo.stats(query.time_range.as_deref().unwrap_or("24h")).await?;
    Ok(Json(stats))
}

async fn critical(
    State(state): State<AppState>,
    Query(query): Query<CriticalQuery>,
) -> ApiResult<Json<Vec<CriticalLog>>> {
    let repo = ActivityLogRepository::new(state.pool.clone());
    Ok(Json(repo.critical(query.limit.unwrap_or(20)).await?))
}

async fn cleanup(
    State(state): State<AppState>,
    Query(query): Query<CleanupQuery>,
) -> ApiResult<Json<Value>> {
    let repo = ActivityLogRepository::new(state.pool.clone());
    let deleted = repo
        .cleanup(query.older_than.as_deref().unwrap_or("30d"))
        .await?;
    Ok(Json(json!({
        "message": "Log cleanup completed",
        "deletedRows": deleted,
    })))
}

fn csv_escape(value: &str) -> String {
    value.replace('"', "\"\"")
}

fn to_csv(rows: &[ExportRow]) -> String {
    let mut csv = String::from(
        "Timestamp,Username,Action Type,Resource Type,Resource Name,Description,Severity,IP Address\n",
    );
    for row in rows {
        let line = [
            row.timestamp.as_str(),
            row.username.as_deref().unwrap_or(""),
            row.action_type.as_str(),
            row.resource_type.as_str(),
            row.resource_name.as_deref().unwrap_or(""),
            row.action_description.as_str(),
            row.severity.as_str(),
            row.ip_address.as_deref().unwrap_or(""),
        ]
        .map(|field| format!("\"{}\"", csv_escape(field)))
        .join(",");
        csv.push_str(&line);
        csv.push('\n');
    }
    csv
}

async fn export(
    State(state): State<AppState>,
    Query(query): Query<ExportQuery>,
) -> ApiResult<Response> {
    let repo = ActivityLogRepository::new(state.pool.clone());
    let rows = repo
        .export(query.start_date.as_deref(), query.end_date.as_deref())
        .await?;

    if query.format.as_deref() == Some("csv") {
        let filename = format!(
            "activity_logs_{}.csv",
            chrono::Utc::now().format("%Y-%m-%d")
        );
        return Ok((
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, "text/csv".to_string()),
                (
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"{filename}\""),
                ),
            ],
            to_csv(&rows),
        )
            .into_response());
    }

    Ok(Json(rows).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_quotes_every_field_and_escapes_quotes() {
        let rows = vec![ExportRow {
            timestamp: "2026-01-01 12:00:00".into(),
            username: Some("ada".into()),
            action_type: "create".into(),
            resource_type: "project".into(),
            resource_name: Some("say \"hi\"".into()),
            action_description: "created project".into(),
            severity: "info".into(),
            ip_address: None,
        }];

        let csv = to_csv(&rows);
        let mut lines = csv.lines();
        assert!(lines.next().unwrap().starts_with("Timestamp,Username"));
        let row = lines.next().unwrap();
        assert!(row.contains("\"say \"\"hi\"\"\""));
        assert!(row.ends_with(",\"\""));
    }
}
