//! User persistence repository
//!
//! Users are keyed by wallet address; a decentralized identifier is derived
//! from the address at first login and never changes.

use serde::Serialize;
use sqlx::SqlitePool;

// ============================================================================
// Types
// ============================================================================

/// Full user row, including private fields
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct UserRow {
    pub id: i64,
    pub wallet_address: String,
    pub did: Option<String>,
    pub username: Option<String>,
    pub email: Option<String>,
    pub github_username: Option<String>,
    pub organization: Option<String>,
    pub research_interests: Option<String>,
    pub personal_website: Option<String>,
    pub orcid_id: Option<String>,
    pub is_academically_verified: bool,
    pub created_at: String,
}

/// Public view of a user; email and other private fields excluded
#[derive(Debug, Clone, Serialize)]
pub struct PublicUser {
    pub id: i64,
    pub username: Option<String>,
    pub wallet_address: String,
    pub did: Option<String>,
    pub organization: Option<String>,
    pub research_interests: Option<String>,
    pub personal_website: Option<String>,
    pub orcid_id: Option<String>,
    pub github_username: Option<String>,
    pub is_academically_verified: bool,
    pub created_at: String,
}

impl From<UserRow> for PublicUser {
    fn from(user: UserRow) -> Self {
        Self {
            id: user.id,
            username: user.username,
            wallet_address: user.wallet_address,
            did: user.did,
            organization: user.organization,
            research_interests: user.research_interests,
            personal_website: user.personal_website,
            orcid_id: user.orcid_id,
            github_username: user.github_username,
            is_academically_verified: user.is_academically_verified,
            created_at: user.created_at,
        }
    }
}

/// Profile fields settable through the profile update endpoint
#[derive(Debug, Clone)]
pub struct ProfileUpdate {
    pub email: String,
    pub username: String,
    pub github_username: Option<String>,
    pub personal_website: Option<String>,
    pub organization: Option<String>,
    pub research_interests: Option<String>,
}

/// One entry in the dashboard recent-activity feed
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct RecentActivity {
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub activity_type: String,
    pub title: String,
    pub description: String,
    pub timestamp: String,
}

/// Aggregated dashboard statistics for one user
#[derive(Debug, Clone, Serialize)]
pub struct DashboardStats {
    pub projects: ProjectCounts,
    pub reviews: i64,
    pub citations: i64,
    /// Not computed yet; clients render the absence
    pub reputation: Option<i64>,
    #[serde(rename = "recentActivities")]
    pub recent_activities: Vec<RecentActivity>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProjectCounts {
    pub total: i64,
    pub active: i64,
}

// ============================================================================
// Repository
// ============================================================================

pub struct UserRepository {
    pool: SqlitePool,
}

impl UserRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn find_by_wallet(&self, wallet_address: &str) -> Result<Option<UserRow>, sqlx::Error> {
        sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE wallet_address = ?")
            .bind(wallet_address)
            .fetch_optional(&self.pool)
            .await
    }

    /// Case-insensitive wallet lookup for public profile routes
    pub async fn find_by_wallet_ci(
        &self,
        wallet_address: &str,
    ) -> Result<Option<UserRow>, sqlx::Error> {
        sqlx::query_as::<_, UserRow>(
            "SELECT * FROM users WHERE LOWER(wallet_address) = LOWER(?)",
        )
        .bind(wallet_address)
        .fetch_optional(&self.pool)
        .await
    }

    pub async fn find_by_username(&self, username: &str) -> Result<Option<UserRow>, sqlx::Error> {
        sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE username = ?")
            .bind(username)
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn find_by_id(&self, id: i64) -> Result<Option<UserRow>, sqlx::Error> {
        sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    /// Fetch the user for a wallet, creating one (with a derived DID) on
    /// first login. Returns the row and whether it was newly created.
    pub async fn login_or_create(
        &self,
        wallet_address: &str,
    ) -> Result<(UserRow, bool), sqlx::Error> {
        if let Some(user) = self.find_by_wallet(wallet_address).await? {
            return Ok((user, false));
        }

        let did = format!("did:ethr:{}", wallet_address);
        sqlx::query("INSERT INTO users (wallet_address, did) VALUES (?, ?)")
            .bind(wallet_address)
            .bind(&did)
            .execute(&self.pool)
            .await?;

        let user = sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE wallet_address = ?")
            .bind(wallet_address)
            .fetch_one(&self.pool)
            .await?;
        Ok((user, true))
    }

    /// Update profile fields; `None` when no such wallet exists
    pub async fn update_profile(
        &self,
        wallet_address: &str,
        update: &ProfileUpdate,
    ) -> Result<Option<UserRow>, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE users
             SET email = ?, username = ?, github_username = ?, personal_website = ?,
                 organization = ?, research_interests = ?
             WHERE wallet_address = ?",
        )
        .bind(&update.email)
        .bind(&update.username)
        .bind(&update.github_username)
        .bind(&update.personal_website)
        .bind(&update.organization)
        .bind(&update.research_interests)
        .bind(wallet_address)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.find_by_wallet(wallet_address).await
    }

    /// Replace the stored research interests (JSON array text)
    pub async fn update_interests(
        &self,
        wallet_address: &str,
        interests_json: &str,
    ) -> Result<Option<UserRow>, sqlx::Error> {
        let result = sqlx::query("UPDATE users SET research_interests = ? WHERE wallet_address = ?")
            .bind(interests_json)
            .bind(wallet_address)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.find_by_wallet(wallet_address).await
    }

    /// Record a verified ORCID iD for the wallet
    pub async fn set_orcid_verified(
        &self,
        wallet_address: &str,
        orcid_id: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE users SET orcid_id = ?, is_academically_verified = 1 WHERE wallet_address = ?",
        )
        .bind(orcid_id)
        .bind(wallet_address)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Dashboard statistics: project counts, review count, summed citations
    /// and a merged recent-activity feed.
    pub async fn dashboard_stats(&self, user_id: i64) -> Result<DashboardStats, sqlx::Error> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(DISTINCT p.id)
             FROM projects p
             LEFT JOIN project_collaborators pc ON p.id = pc.project_id
             WHERE p.owner_id = ? OR pc.user_id = ?",
        )
        .bind(user_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        let active: i64 = sqlx::query_scalar(
            "SELECT COUNT(DISTINCT p.id)
             FROM projects p
             LEFT JOIN project_collaborators pc ON p.id = pc.project_id
             WHERE (p.owner_id = ? OR pc.user_id = ?)
               AND p.status NOT IN ('Completed', 'Cancelled')",
        )
        .bind(user_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        let reviews: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM reviews WHERE reviewer_id = ?")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;

        let citations: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(citation_count), 0) FROM publications WHERE author_id = ?",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        let recent_activities = sqlx::query_as::<_, RecentActivity>(
            "SELECT
                'project_created' as type,
                p.name as title,
                'You created project \"' || p.name || '\"' as description,
                p.created_at as timestamp
             FROM projects p
             WHERE p.owner_id = ?

             UNION ALL

             SELECT
                'project_updated' as type,
                p.name as title,
                'You updated project \"' || p.name || '\"' as description,
                p.updated_at as timestamp
             FROM projects p
             WHERE p.owner_id = ? AND p.updated_at != p.created_at

             UNION ALL

             SELECT
                'dataset_uploaded' as type,
                d.name as title,
                'You uploaded dataset \"' || d.name || '\"' as description,
                d.created_at as timestamp
             FROM datasets d
             WHERE d.owner_id = ?

             ORDER BY timestamp DESC
             LIMIT 10",
        )
        .bind(user_id)
        .bind(user_id)
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(DashboardStats {
            projects: ProjectCounts { total, active },
            reviews,
            citations,
            reputation: None,
            recent_activities,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::migrations;

    async fn test_pool() -> SqlitePool {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        migrations::run(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn login_creates_then_reuses() {
        let repo = UserRepository::new(test_pool().await);
        let wallet = "0x00000000000000000000000000000000000000aa";

        let (created, was_new) = repo.login_or_create(wallet).await.unwrap();
        assert!(was_new);
        assert_eq!(created.did.as_deref(), Some("did:ethr:0x00000000000000000000000000000000000000aa"));

        let (again, was_new) = repo.login_or_create(wallet).await.unwrap();
        assert!(!was_new);
        assert_eq!(again.id, created.id);
    }

    #[tokio::test]
    async fn profile_update_requires_existing_user() {
        let repo = UserRepository::new(test_pool().await);
        let update = ProfileUpdate {
            email: "a@b.c".into(),
            username: "alice".into(),
            github_username: None,
            personal_website: None,
            organization: None,
            research_interests: None,
        };
        assert!(repo.update_profile("0xmissing", &update).await.unwrap().is_none());

        let (user, _) = repo.login_or_create("0xabc0000000000000000000000000000000000abc").await.unwrap();
        let updated = repo
            .update_profile(&user.wallet_address, &update)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.username.as_deref(), Some("alice"));
        assert_eq!(updated.email.as_deref(), Some("a@b.c"));
    }

    #[tokio::test]
    async fn wallet_lookup_is_case_insensitive() {
        let repo = UserRepository::new(test_pool().await);
        let (user, _) = repo.login_or_create("0xAbCd000000000000000000000000000000000001").await.unwrap();
        let found = repo
            .find_by_wallet_ci("0xABCD000000000000000000000000000000000001")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, user.id);
    }
}
