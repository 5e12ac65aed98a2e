//! Like persistence repository
//!
//! Likes target projects, datasets or publications. Each target row
//! carries a cached `like_count`; the toggle keeps cache and like rows
//! consistent by updating both inside one transaction.

use serde::Serialize;
use sqlx::SqlitePool;

use crate::error::{ApiError, ApiResult};

// ============================================================================
// Types
// ============================================================================

/// Entity kinds that can be liked
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LikeTarget {
    Project,
    Dataset,
    Publication,
}

impl LikeTarget {
    pub fn parse(s: &str) -> ApiResult<Self> {
        match s {
            "project" => Ok(Self::Project),
            "dataset" => Ok(Self::Dataset),
            "publication" => Ok(Self::Publication),
            other => Err(ApiError::bad_request(format!("Invalid target type: {other}"))),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Project => "project",
            Self::Dataset => "dataset",
            Self::Publication => "publication",
        }
    }

    fn table(self) -> &'static str {
        match self {
            Self::Project => "projects",
            Self::Dataset => "datasets",
            Self::Publication => "publications",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ToggleResult {
    pub success: bool,
    #[serde(rename = "isLiked")]
    pub is_liked: bool,
    #[serde(rename = "likeCount")]
    pub like_count: i64,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct LikeStatus {
    #[serde(rename = "isLiked")]
    pub is_liked: bool,
    #[serde(rename = "likeCount")]
    pub like_count: i64,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct UserLike {
    pub target_type: String,
    pub target_id: i64,
    pub created_at: String,
    pub name: Option<String>,
    pub description: Option<String>,
    pub owner_username: Option<String>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct TrendingItem {
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub target_type: String,
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub like_count: i64,
    pub owner: Option<String>,
}

// ============================================================================
// Repository
// ============================================================================

pub struct LikeRepository {
    pool: SqlitePool,
}

impl LikeRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert or delete the like row and adjust the target's cached count,
    /// all in one transaction. After commit the cache equals the row count.
    pub async fn toggle(
        &self,
        user_id: i64,
        target: LikeTarget,
        target_id: i64,
    ) -> Result<ToggleResult, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let existing: Option<i64> = sqlx::query_scalar(
            "SELECT id FROM likes WHERE user_id = ? AND target_type = ? AND target_id = ?",
        )
        .bind(user_id)
        .bind(target.as_str())
        .bind(target_id)
        .fetch_optional(&mut *tx)
        .await?;

        let is_liked = match existing {
            Some(like_id) => {
                sqlx::query("DELETE FROM likes WHERE id = ?")
                    .bind(like_id)
                    .execute(&mut *tx)
                    .await?;
                false
            }
            None => {
                sqlx::query("INSERT INTO likes (user_id, target_type, target_id) VALUES (?, ?, ?)")
                    .bind(user_id)
                    .bind(target.as_str())
                    .bind(target_id)
                    .execute(&mut *tx)
                    .await?;
                true
            }
        };

        let like_count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM likes WHERE target_type = ? AND target_id = ?",
        )
        .bind(target.as_str())
        .bind(target_id)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(&format!(
            "UPDATE {} SET like_count = ? WHERE id = ?",
            target.table()
        ))
        .bind(like_count)
        .bind(target_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(ToggleResult {
            success: true,
            is_liked,
            like_count,
            message: if is_liked {
                "Item liked successfully".to_string()
            } else {
                "Item unliked successfully".to_string()
            },
        })
    }

    /// Like status for one item, optionally personalized
    pub async fn status(
        &self,
        user_id: Option<i64>,
        target: LikeTarget,
        target_id: i64,
    ) -> Result<LikeStatus, sqlx::Error> {
        let is_liked = match user_id {
            Some(user_id) => {
                let like: Option<i64> = sqlx::query_scalar(
                    "SELECT id FROM likes WHERE user_id = ? AND target_type = ? AND target_id = ?",
                )
                .bind(user_id)
                .bind(target.as_str())
                .bind(target_id)
                .fetch_optional(&self.pool)
                .await?;
                like.is_some()
            }
            None => false,
        };

        let like_count: Option<i64> = sqlx::query_scalar(&format!(
            "SELECT like_count FROM {} WHERE id = ?",
            target.table()
        ))
        .bind(target_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(LikeStatus {
            is_liked,
            like_count: like_count.unwrap_or(0),
        })
    }

    /// Everything the user has liked, newest first
    pub async fn user_likes(
        &self,
        user_id: i64,
        target_type: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<UserLike>, sqlx::Error> {
        let type_filter = if target_type.is_some() {
            " AND l.target_type = ?"
        } else {
            ""
        };

        let sql = format!(
            "SELECT
                l.target_type,
                l.target_id,
                l.created_at,
                CASE
                  WHEN l.target_type = 'project' THEN p.name
                  WHEN l.target_type = 'dataset' THEN d.name
                  WHEN l.target_type = 'publication' THEN pub.title
                END as name,
                CASE
                  WHEN l.target_type = 'project' THEN p.description
                  WHEN l.target_type = 'dataset' THEN d.description
                  WHEN l.target_type = 'publication' THEN pub.abstract
                END as description,
                CASE
                  WHEN l.target_type = 'project' THEN u1.username
                  WHEN l.target_type = 'dataset' THEN u2.username
                  WHEN l.target_type = 'publication' THEN u3.username
                END as owner_username
             FROM likes l
             LEFT JOIN projects p ON l.target_type = 'project' AND l.target_id = p.id
             LEFT JOIN datasets d ON l.target_type = 'dataset' AND l.target_id = d.id
             LEFT JOIN publications pub ON l.target_type = 'publication' AND l.target_id = pub.id
             LEFT JOIN users u1 ON p.owner_id = u1.id
             LEFT JOIN users u2 ON d.owner_id = u2.id
             LEFT JOIN users u3 ON pub.author_id = u3.id
             WHERE l.user_id = ?{type_filter}
             ORDER BY l.created_at DESC
             LIMIT ? OFFSET ?"
        );

        let mut query = sqlx::query_as::<_, UserLike>(&sql).bind(user_id);
        if let Some(t) = target_type {
            query = query.bind(t);
        }
        query
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
    }

    /// Most-liked items across all target types
    pub async fn trending_all(&self, limit: i64) -> Result<Vec<TrendingItem>, sqlx::Error> {
        sqlx::query_as::<_, TrendingItem>(
            "SELECT 'project' as type, p.id, p.name, p.description, p.like_count,
                    u.username as owner
             FROM projects p
             JOIN users u ON p.owner_id = u.id
             WHERE p.like_count > 0
             UNION ALL
             SELECT 'dataset' as type, d.id, d.name, d.description, d.like_count,
                    u.username as owner
             FROM datasets d
             JOIN users u ON d.owner_id = u.id
             WHERE d.like_count > 0
             UNION ALL
             SELECT 'publication' as type, pub.id, pub.title as name,
                    pub.abstract as description, pub.like_count, u.username as owner
             FROM publications pub
             JOIN users u ON pub.author_id = u.id
             WHERE pub.like_count > 0
             ORDER BY like_count DESC
             LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
    }

    /// Most-liked items of a single target type
    pub async fn trending_for(
        &self,
        target: LikeTarget,
        limit: i64,
    ) -> Result<Vec<TrendingItem>, sqlx::Error> {
        let (name_field, desc_field, owner_field) = match target {
            LikeTarget::Publication => ("title", "abstract", "author_id"),
            _ => ("name", "description", "owner_id"),
        };

        let sql = format!(
            "SELECT '{}' as type, t.id, t.{name_field} as name,
                    t.{desc_field} as description, t.like_count, u.username as owner
             FROM {} t
             JOIN users u ON t.{owner_field} = u.id
             WHERE t.like_count > 0
             ORDER BY t.like_count DESC
             LIMIT ?",
            target.as_str(),
            target.table()
        );

        sqlx::query_as::<_, TrendingItem>(&sql)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{migrations, project_repository::NewProject, ProjectRepository, UserRepository};

    async fn seeded() -> (SqlitePool, i64, i64) {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        migrations::run(&pool).await.unwrap();
        let users = UserRepository::new(pool.clone());
        let (user, _) = users
            .login_or_create("0x4444444444444444444444444444444444444444")
            .await
            .unwrap();
        let projects = ProjectRepository::new(pool.clone());
        let project = projects
            .create(&NewProject {
                name: "likeable".into(),
                description: None,
                owner_id: user.id,
                visibility: "Public".into(),
                status: "Active".into(),
                category: "Other".into(),
                start_date: crate::database::now_timestamp(),
            })
            .await
            .unwrap();
        (pool, user.id, project.id)
    }

    async fn stored_count(pool: &SqlitePool, project_id: i64) -> i64 {
        sqlx::query_scalar("SELECT like_count FROM projects WHERE id = ?")
            .bind(project_id)
            .fetch_one(pool)
            .await
            .unwrap()
    }

    async fn row_count(pool: &SqlitePool, project_id: i64) -> i64 {
        sqlx::query_scalar(
            "SELECT COUNT(*) FROM likes WHERE target_type = 'project' AND target_id = ?",
        )
        .bind(project_id)
        .fetch_one(pool)
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn toggle_twice_returns_to_zero_and_cache_stays_consistent() {
        let (pool, user_id, project_id) = seeded().await;
        let repo = LikeRepository::new(pool.clone());

        let first = repo.toggle(user_id, LikeTarget::Project, project_id).await.unwrap();
        assert!(first.is_liked);
        assert_eq!(first.like_count, 1);
        assert_eq!(stored_count(&pool, project_id).await, row_count(&pool, project_id).await);

        let second = repo.toggle(user_id, LikeTarget::Project, project_id).await.unwrap();
        assert!(!second.is_liked);
        assert_eq!(second.like_count, 0);
        assert_eq!(stored_count(&pool, project_id).await, 0);
        assert_eq!(row_count(&pool, project_id).await, 0);
    }

    #[tokio::test]
    async fn anonymous_status_reports_count_only() {
        let (pool, user_id, project_id) = seeded().await;
        let repo = LikeRepository::new(pool);

        repo.toggle(user_id, LikeTarget::Project, project_id).await.unwrap();

        let status = repo.status(None, LikeTarget::Project, project_id).await.unwrap();
        assert!(!status.is_liked);
        assert_eq!(status.like_count, 1);

        let status = repo.status(Some(user_id), LikeTarget::Project, project_id).await.unwrap();
        assert!(status.is_liked);
    }

    #[test]
    fn target_parsing_rejects_unknown_types() {
        assert!(LikeTarget::parse("project").is_ok());
        assert!(LikeTarget::parse("user").is_err());
    }
}
