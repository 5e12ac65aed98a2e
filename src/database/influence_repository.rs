//! Contribution queries behind the influence score.
//!
//! Pulls a user's publications, datasets, projects and tokens and turns
//! them into the per-category point totals that `crate::influence`
//! weighs. The queries here are the only place contribution points are
//! assigned.

use serde::Serialize;
use sqlx::SqlitePool;

use crate::influence::{points, CategoryScores};

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct PublicationContribution {
    pub id: i64,
    pub title: String,
    pub status: String,
    pub score: i64,
    #[serde(rename = "type")]
    pub kind: String,
    pub date: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DatasetContribution {
    pub id: i64,
    pub title: String,
    pub score: i64,
    #[serde(rename = "type")]
    pub kind: String,
    pub date: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProjectContribution {
    pub id: i64,
    pub title: String,
    pub status: String,
    pub score: i64,
    #[serde(rename = "type")]
    pub kind: String,
    pub date: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct NftContribution {
    pub id: i64,
    #[serde(rename = "tokenId")]
    pub token_id: Option<String>,
    #[serde(rename = "assetType")]
    pub asset_type: String,
    pub score: i64,
    #[serde(rename = "type")]
    pub kind: String,
    pub date: String,
}

/// Per-category contribution listings shown on the influence page
#[derive(Debug, Clone, Default, Serialize)]
pub struct ContributionDetails {
    pub publications: Vec<PublicationContribution>,
    pub datasets: Vec<DatasetContribution>,
    pub projects: Vec<ProjectContribution>,
    pub nfts: Vec<NftContribution>,
}

#[derive(Debug, Clone)]
pub struct Contributions {
    pub scores: CategoryScores,
    pub details: ContributionDetails,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ScoredUser {
    pub id: i64,
    pub username: Option<String>,
    pub wallet_address: String,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct RecentActivity {
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub kind: String,
    pub name: Option<String>,
    pub created_at: String,
}

// ============================================================================
// Repository
// ============================================================================

pub struct InfluenceRepository {
    pool: SqlitePool,
}

impl InfluenceRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Point totals and itemized contributions for one user
    pub async fn contributions(&self, user_id: i64) -> Result<Contributions, sqlx::Error> {
        let mut scores = CategoryScores::base();
        let mut details = ContributionDetails::default();

        let publications: Vec<(i64, String, String, String)> = sqlx::query_as(
            "SELECT id, title, status, created_at FROM publications
             WHERE author_id = ? ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        let publication_count = publications.len() as i64;
        for (id, title, status, created_at) in publications {
            let score = match status.as_str() {
                "Published" => points::PUBLICATION_PUBLISHED,
                "Draft" => points::PUBLICATION_DRAFT,
                _ => continue,
            };
            scores.publications += score;
            details.publications.push(PublicationContribution {
                id,
                title,
                kind: status.to_lowercase(),
                status,
                score,
                date: created_at,
            });
        }

        let datasets: Vec<(i64, String, String)> = sqlx::query_as(
            "SELECT id, name, created_at FROM datasets
             WHERE owner_id = ? ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        let dataset_count = datasets.len() as i64;
        for (id, name, created_at) in datasets {
            scores.datasets += points::DATASET_UPLOADED;
            details.datasets.push(DatasetContribution {
                id,
                title: name,
                score: points::DATASET_UPLOADED,
                kind: "uploaded".into(),
                date: created_at,
            });
        }

        let projects: Vec<(i64, String, String, String)> = sqlx::query_as(
            "SELECT id, name, status, created_at FROM projects
             WHERE owner_id = ? ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        let project_count = projects.len() as i64;
        for (id, name, status, created_at) in projects {
            let score = match status.as_str() {
                "Completed" => points::PROJECT_COMPLETED,
                "Active" => points::PROJECT_ACTIVE,
                _ => continue,
            };
            scores.collaborations += score;
            details.projects.push(ProjectContribution {
                id,
                title: name,
                kind: status.to_lowercase(),
                status,
                score,
                date: created_at,
            });
        }

        let nfts: Vec<(i64, Option<String>, String, String)> = sqlx::query_as(
            "SELECT id, token_id, asset_type, created_at FROM nfts
             WHERE owner_id = ? ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        for (id, token_id, asset_type, created_at) in nfts {
            // Minted tokens count toward the collaboration category
            scores.collaborations += points::NFT_MINTED;
            details.nfts.push(NftContribution {
                id,
                token_id,
                asset_type,
                score: points::NFT_MINTED,
                kind: "minted".into(),
                date: created_at,
            });
        }

        scores.set_simulated_reviews(publication_count + dataset_count + project_count);

        Ok(Contributions { scores, details })
    }

    /// Users eligible for scoring and the leaderboard
    pub async fn scored_users(&self) -> Result<Vec<ScoredUser>, sqlx::Error> {
        sqlx::query_as::<_, ScoredUser>(
            "SELECT id, username, wallet_address FROM users
             WHERE wallet_address IS NOT NULL",
        )
        .fetch_all(&self.pool)
        .await
    }

    pub async fn user_count(&self) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE wallet_address IS NOT NULL")
            .fetch_one(&self.pool)
            .await
    }

    /// Latest contributions across publications, datasets and tokens,
    /// merged newest first.
    pub async fn recent_activities(
        &self,
        user_id: i64,
    ) -> Result<Vec<RecentActivity>, sqlx::Error> {
        let mut activities = sqlx::query_as::<_, RecentActivity>(
            "SELECT * FROM (
                SELECT 'publication' as type, title as name, created_at
                FROM publications WHERE author_id = ?
                ORDER BY created_at DESC LIMIT 3
             )
             UNION ALL
             SELECT * FROM (
                SELECT 'dataset' as type, name, created_at
                FROM datasets WHERE owner_id = ?
                ORDER BY created_at DESC LIMIT 3
             )
             UNION ALL
             SELECT * FROM (
                SELECT 'nft' as type, token_id as name, created_at
                FROM nfts WHERE owner_id = ?
                ORDER BY created_at DESC LIMIT 3
             )",
        )
        .bind(user_id)
        .bind(user_id)
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        activities.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        activities.truncate(10);
        Ok(activities)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{migrations, UserRepository};
    use crate::influence::total_score;

    async fn seeded() -> (SqlitePool, i64) {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        migrations::run(&pool).await.unwrap();
        let users = UserRepository::new(pool.clone());
        let (user, _) = users
            .login_or_create("0x5555555555555555555555555555555555555555")
            .await
            .unwrap();
        (pool, user.id)
    }

    #[tokio::test]
    async fn empty_user_scores_governance_base_only() {
        let (pool, user_id) = seeded().await;
        let repo = InfluenceRepository::new(pool);

        let contributions = repo.contributions(user_id).await.unwrap();
        assert_eq!(contributions.scores.publications, 0);
        assert_eq!(contributions.scores.governance, points::GOVERNANCE_BASE);
        assert_eq!(total_score(&contributions.scores), 5);
        assert!(contributions.details.publications.is_empty());
    }

    #[tokio::test]
    async fn publication_status_assigns_points() {
        let (pool, user_id) = seeded().await;

        for (title, status) in [("a", "Published"), ("b", "Draft"), ("c", "Under Review")] {
            sqlx::query(
                "INSERT INTO publications (title, authors, status, author_id)
                 VALUES (?, '[]', ?, ?)",
            )
            .bind(title)
            .bind(status)
            .bind(user_id)
            .execute(&pool)
            .await
            .unwrap();
        }

        let repo = InfluenceRepository::new(pool);
        let contributions = repo.contributions(user_id).await.unwrap();

        // 100 for published + 20 for draft; under-review contributes nothing
        assert_eq!(contributions.scores.publications, 120);
        assert_eq!(contributions.details.publications.len(), 2);
        // 3 contributions simulate floor(0.9) = 0 reviews
        assert_eq!(contributions.scores.reviews, 0);
    }
}
