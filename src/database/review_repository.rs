//! Peer review persistence repository
//!
//! Reviews move Pending -> In Progress -> Completed. Status changes stamp
//! the matching timestamp columns; a draft save on a Pending review
//! implicitly starts it.

use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::Serialize;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use super::now_timestamp;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ReviewRow {
    pub id: i64,
    pub review_id: String,
    pub paper_title: String,
    pub authors: Option<String>,
    #[sqlx(rename = "abstract")]
    #[serde(rename = "abstract")]
    pub abstract_text: Option<String>,
    pub keywords: Option<String>,
    pub category: Option<String>,
    pub journal: Option<String>,
    pub urgency: String,
    pub reviewer_id: i64,
    pub status: String,
    pub progress: i64,
    pub review_content: Option<String>,
    pub rating: Option<f64>,
    pub revision_requested: bool,
    pub deadline: Option<String>,
    pub estimated_hours: i64,
    pub assigned_at: String,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
    pub submitted_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Review joined with its reviewer
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ReviewWithReviewer {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub review: ReviewRow,
    pub reviewer_username: Option<String>,
    pub reviewer_wallet_address: String,
}

/// A new review assignment; authors and keywords are JSON array text
#[derive(Debug, Clone)]
pub struct NewReview {
    pub paper_title: String,
    pub authors_json: String,
    pub abstract_text: Option<String>,
    pub keywords_json: String,
    pub category: Option<String>,
    pub journal: Option<String>,
    pub urgency: String,
    pub reviewer_id: i64,
    pub deadline: Option<String>,
    pub estimated_hours: i64,
}

/// Partial review update; absent fields keep their values
#[derive(Debug, Clone, Default)]
pub struct ReviewUpdate {
    pub status: Option<String>,
    pub progress: Option<i64>,
    pub review_content: Option<String>,
    pub rating: Option<f64>,
    pub revision_requested: Option<bool>,
    pub is_draft_save: bool,
}

fn generate_review_id() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(9)
        .map(|c| (c as char).to_ascii_lowercase())
        .collect();
    format!("REV-{}-{}", chrono::Utc::now().timestamp_millis(), suffix)
}

// ============================================================================
// Repository
// ============================================================================

pub struct ReviewRepository {
    pool: SqlitePool,
}

impl ReviewRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Reviews assigned to a reviewer, nearest deadline first
    pub async fn list_for_reviewer(
        &self,
        reviewer_id: i64,
    ) -> Result<Vec<ReviewWithReviewer>, sqlx::Error> {
        sqlx::query_as::<_, ReviewWithReviewer>(
            "SELECT r.*, u.username as reviewer_username,
                    u.wallet_address as reviewer_wallet_address
             FROM reviews r
             JOIN users u ON r.reviewer_id = u.id
             WHERE r.reviewer_id = ?
             ORDER BY r.deadline ASC, r.created_at DESC",
        )
        .bind(reviewer_id)
        .fetch_all(&self.pool)
        .await
    }

    pub async fn find(&self, id: i64) -> Result<Option<ReviewWithReviewer>, sqlx::Error> {
        sqlx::query_as::<_, ReviewWithReviewer>(
            "SELECT r.*, u.username as reviewer_username,
                    u.wallet_address as reviewer_wallet_address
             FROM reviews r
             JOIN users u ON r.reviewer_id = u.id
             WHERE r.id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
    }

    /// Create a review assignment with a generated external review id
    pub async fn create(&self, new: &NewReview) -> Result<ReviewWithReviewer, sqlx::Error> {
        let review_id = generate_review_id();
        let now = now_timestamp();

        let result = sqlx::query(
            "INSERT INTO reviews (
                paper_title, authors, abstract, keywords, category, journal,
                urgency, reviewer_id, deadline, estimated_hours, review_id,
                created_at, updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&new.paper_title)
        .bind(&new.authors_json)
        .bind(&new.abstract_text)
        .bind(&new.keywords_json)
        .bind(&new.category)
        .bind(&new.journal)
        .bind(&new.urgency)
        .bind(new.reviewer_id)
        .bind(&new.deadline)
        .bind(new.estimated_hours)
        .bind(&review_id)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        self.find(result.last_insert_rowid())
            .await?
            .ok_or(sqlx::Error::RowNotFound)
    }

    /// Dynamic update of supplied fields. Completing stamps completed_at,
    /// starting stamps started_at once, and a draft save on a Pending
    /// review moves it to In Progress.
    pub async fn update(
        &self,
        id: i64,
        update: &ReviewUpdate,
    ) -> Result<Option<ReviewWithReviewer>, sqlx::Error> {
        let now = now_timestamp();
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE reviews SET ");
        let mut any = false;

        if let Some(status) = &update.status {
            qb.push("status = ").push_bind(status);
            any = true;

            if status == "Completed" {
                qb.push(", completed_at = ").push_bind(now.clone());
            }
            if status == "In Progress" {
                let started_at: Option<Option<String>> =
                    sqlx::query_scalar("SELECT started_at FROM reviews WHERE id = ?")
                        .bind(id)
                        .fetch_optional(&self.pool)
                        .await?;
                if matches!(started_at, Some(None)) {
                    qb.push(", started_at = ").push_bind(now.clone());
                }
            }
        }

        if let Some(progress) = update.progress {
            if any {
                qb.push(", ");
            }
            qb.push("progress = ").push_bind(progress);
            any = true;
        }
        if let Some(content) = &update.review_content {
            if any {
                qb.push(", ");
            }
            qb.push("review_content = ").push_bind(content);
            any = true;
        }
        if let Some(rating) = update.rating {
            if any {
                qb.push(", ");
            }
            qb.push("rating = ").push_bind(rating);
            any = true;
        }
        if let Some(revision_requested) = update.revision_requested {
            if any {
                qb.push(", ");
            }
            qb.push("revision_requested = ").push_bind(revision_requested);
            any = true;
        }

        if update.is_draft_save && update.status.is_none() {
            let status: Option<String> =
                sqlx::query_scalar("SELECT status FROM reviews WHERE id = ?")
                    .bind(id)
                    .fetch_optional(&self.pool)
                    .await?;
            if status.as_deref() == Some("Pending") {
                if any {
                    qb.push(", ");
                }
                qb.push("status = ").push_bind("In Progress");
                qb.push(", started_at = ").push_bind(now.clone());
                any = true;
            }
        }

        if any {
            qb.push(", ");
        }
        qb.push("updated_at = ").push_bind(now);
        qb.push(" WHERE id = ").push_bind(id);

        let result = qb.build().execute(&self.pool).await?;
        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.find(id).await
    }

    /// Move a Pending review to In Progress. `Ok(None)` when missing,
    /// `Err` is never used for the not-pending case; the caller checks
    /// the current status via `find` first.
    pub async fn start(&self, id: i64) -> Result<Option<ReviewWithReviewer>, sqlx::Error> {
        let now = now_timestamp();
        let result = sqlx::query(
            "UPDATE reviews
             SET status = 'In Progress', started_at = ?, updated_at = ?
             WHERE id = ? AND status = 'Pending'",
        )
        .bind(&now)
        .bind(&now)
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.find(id).await
    }

    pub async fn delete(&self, id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM reviews WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{migrations, UserRepository};

    async fn seeded() -> (SqlitePool, i64) {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        migrations::run(&pool).await.unwrap();
        let users = UserRepository::new(pool.clone());
        let (user, _) = users
            .login_or_create("0x8888888888888888888888888888888888888888")
            .await
            .unwrap();
        (pool, user.id)
    }

    fn assignment(reviewer_id: i64) -> NewReview {
        NewReview {
            paper_title: "Proofs at Scale".into(),
            authors_json: r#"["A. Author"]"#.into(),
            abstract_text: None,
            keywords_json: "[]".into(),
            category: Some("Cryptography".into()),
            journal: None,
            urgency: "Medium".into(),
            reviewer_id,
            deadline: Some("2099-06-01".into()),
            estimated_hours: 8,
        }
    }

    #[tokio::test]
    async fn create_assigns_external_id_and_defaults() {
        let (pool, reviewer_id) = seeded().await;
        let repo = ReviewRepository::new(pool);

        let review = repo.create(&assignment(reviewer_id)).await.unwrap();
        assert!(review.review.review_id.starts_with("REV-"));
        assert_eq!(review.review.status, "Pending");
        assert_eq!(review.review.progress, 0);
        assert!(review.review.started_at.is_none());
    }

    #[tokio::test]
    async fn start_only_from_pending() {
        let (pool, reviewer_id) = seeded().await;
        let repo = ReviewRepository::new(pool);

        let review = repo.create(&assignment(reviewer_id)).await.unwrap();
        let started = repo.start(review.review.id).await.unwrap().unwrap();
        assert_eq!(started.review.status, "In Progress");
        assert!(started.review.started_at.is_some());

        // Already started, the guarded update matches nothing
        assert!(repo.start(review.review.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn draft_save_implicitly_starts_pending_review() {
        let (pool, reviewer_id) = seeded().await;
        let repo = ReviewRepository::new(pool);

        let review = repo.create(&assignment(reviewer_id)).await.unwrap();
        let updated = repo
            .update(
                review.review.id,
                &ReviewUpdate {
                    review_content: Some("notes so far".into()),
                    is_draft_save: true,
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .unwrap();

        assert_eq!(updated.review.status, "In Progress");
        assert!(updated.review.started_at.is_some());
        assert_eq!(updated.review.review_content.as_deref(), Some("notes so far"));
    }

    #[tokio::test]
    async fn completing_stamps_timestamp() {
        let (pool, reviewer_id) = seeded().await;
        let repo = ReviewRepository::new(pool);

        let review = repo.create(&assignment(reviewer_id)).await.unwrap();
        let updated = repo
            .update(
                review.review.id,
                &ReviewUpdate {
                    status: Some("Completed".into()),
                    progress: Some(100),
                    rating: Some(4.0),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .unwrap();

        assert_eq!(updated.review.status, "Completed");
        assert!(updated.review.completed_at.is_some());
        assert_eq!(updated.review.rating, Some(4.0));
    }
}
