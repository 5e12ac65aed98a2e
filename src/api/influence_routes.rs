//! Influence score routes
//!
//! Scores are recomputed from contribution rows on every request; the
//! arithmetic lives in `crate::influence` and the row queries in the
//! influence repository.

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};

use super::AppState;
use crate::database::{InfluenceRepository, UserRepository};
use crate::error::{ApiError, ApiResult};
use crate::influence::{self, level_for, points, total_score, WEIGHTS};

// ============================================================================
// Request types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct LeaderboardQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct ActivityRequest {
    #[serde(rename = "activityType")]
    pub activity_type: Option<String>,
}

// ============================================================================
// Router
// ============================================================================

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/user/:user_id", get(user_influence))
        .route("/user/:user_id/activity", post(record_activity))
        .route("/leaderboard", get(leaderboard))
}

fn activity_points(activity_type: &str) -> i64 {
    match activity_type {
        "PUBLICATION_PUBLISHED" => points::PUBLICATION_PUBLISHED,
        "PUBLICATION_DRAFT" => points::PUBLICATION_DRAFT,
        "DATASET_UPLOADED" => points::DATASET_UPLOADED,
        "PROJECT_COMPLETED" => points::PROJECT_COMPLETED,
        "PROJECT_ACTIVE" => points::PROJECT_ACTIVE,
        "NFT_MINTED" => points::NFT_MINTED,
        "COLLABORATION" => points::COLLABORATION,
        "PEER_REVIEW" => points::REVIEW,
        "GOVERNANCE_BASE" => points::GOVERNANCE_BASE,
        _ => 0,
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// Full influence document: score, level, rank among all users,
/// per-category breakdown and recent contributions.
async fn user_influence(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> ApiResult<Json<Value>> {
    let users = UserRepository::new(state.pool.clone());
    let user = users
        .find_by_id(user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    let repo = InfluenceRepository::new(state.pool.clone());
    let contributions = repo.contributions(user_id).await?;
    let score = total_score(&contributions.scores);

    // Rank requires scoring every user; fine at this scale
    let mut scores = Vec::new();
    for candidate in repo.scored_users().await? {
        let candidate_score = total_score(&repo.contributions(candidate.id).await?.scores);
        scores.push((candidate.id, candidate_score));
    }
    scores.sort_by(|a, b| b.1.cmp(&a.1));
    let rank = scores
        .iter()
        .position(|(id, _)| *id == user_id)
        .map(|i| i as i64 + 1)
        .unwrap_or(1);
    let total_users = scores.len() as i64;
    let percentile = if total_users > 0 {
        (total_users - rank) * 100 / total_users
    } else {
        0
    };

    let recent = repo.recent_activities(user_id).await?;

    Ok(Json(json!({
        "userId": user_id,
        "username": user.username.as_deref().unwrap_or("Anonymous"),
        "walletAddress": user.wallet_address,
        "totalScore": score,
        "level": level_for(score),
        "rank": {
            "current": rank,
            "total": total_users,
            "percentile": percentile,
        },
        "weights": WEIGHTS,
        "scores": contributions.scores,
        "contributions": contributions.details,
        "recentActivities": recent,
        "lastUpdated": chrono::Utc::now().to_rfc3339(),
        "networkName": state.chain.network(),
        "status": "Verified",
    })))
}

async fn leaderboard(
    State(state): State<AppState>,
    Query(query): Query<LeaderboardQuery>,
) -> ApiResult<Json<Value>> {
    let repo = InfluenceRepository::new(state.pool.clone());

    let mut entries = Vec::new();
    for user in repo.scored_users().await? {
        let score = total_score(&repo.contributions(user.id).await?.scores);
        entries.push((user, score));
    }
    entries.sort_by(|a, b| b.1.cmp(&a.1));

    let total_users = entries.len();
    let leaderboard: Vec<Value> = entries
        .into_iter()
        .enumerate()
        .take(query.limit.unwrap_or(10))
        .map(|(index, (user, score))| {
            json!({
                "userId": user.id,
                "username": user.username.as_deref().unwrap_or("Anonymous"),
                "walletAddress": user.wallet_address,
                "totalScore": score,
                "level": level_for(score),
                "rank": index + 1,
            })
        })
        .collect();

    Ok(Json(json!({
        "leaderboard": leaderboard,
        "totalUsers": total_users,
        "generatedAt": chrono::Utc::now().to_rfc3339(),
    })))
}

/// Echo a hypothetical activity's point value on top of the current score
async fn record_activity(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    Json(request): Json<ActivityRequest>,
) -> ApiResult<Json<Value>> {
    let activity_type = request.activity_type.unwrap_or_default();
    let score_added = activity_points(&activity_type);

    let repo = InfluenceRepository::new(state.pool.clone());
    let contributions = repo.contributions(user_id).await?;
    let new_total = influence::total_score(&contributions.scores) + score_added;

    Ok(Json(json!({
        "success": true,
        "activityType": activity_type,
        "scoreAdded": score_added,
        "newTotalScore": new_total,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_activity_types_score_zero() {
        assert_eq!(activity_points("PUBLICATION_PUBLISHED"), 100);
        assert_eq!(activity_points("PEER_REVIEW"), 40);
        assert_eq!(activity_points("SOMETHING_ELSE"), 0);
    }
}
