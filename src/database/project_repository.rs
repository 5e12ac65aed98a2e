//! Project persistence repository
//!
//! Projects, their collaborator rows, the file repository tree and
//! milestones. The owner never gets a collaborator row; listings that
//! need one synthesize it with a UNION at query time.

use serde::{Deserialize, Serialize};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use super::now_timestamp;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ProjectRow {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub visibility: String,
    pub status: String,
    pub category: String,
    pub start_date: Option<String>,
    pub owner_id: i64,
    pub like_count: i64,
    pub created_at: String,
    pub updated_at: String,
}

/// Project joined with its owner's public identity
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ProjectWithOwner {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub project: ProjectRow,
    pub owner_username: Option<String>,
    pub owner_wallet_address: String,
}

/// Explore-page project with proof/NFT counts
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ExploreProject {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub project: ProjectWithOwner,
    pub proofs_count: i64,
    pub nfts_count: i64,
    pub has_nft: bool,
}

/// Project as seen from a member's list, with their derived role
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct UserProject {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub project: ProjectWithOwner,
    pub user_role: Option<String>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct CollaboratorRow {
    pub wallet_address: String,
    pub username: Option<String>,
    pub user_id: i64,
    pub role: String,
    pub joined_at: String,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ProjectFileRow {
    pub id: i64,
    pub project_id: i64,
    pub parent_id: Option<i64>,
    pub uploader_id: i64,
    pub file_name: String,
    pub file_path: Option<String>,
    pub file_size: Option<i64>,
    pub file_type: String,
    pub description: Option<String>,
    pub uploaded_at: String,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct MilestoneRow {
    pub id: i64,
    pub project_id: i64,
    pub title: String,
    pub description: Option<String>,
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub milestone_type: String,
    pub date: String,
    pub status: String,
    pub creator_id: i64,
    pub created_at: String,
    pub updated_at: String,
    pub creator_username: Option<String>,
    pub creator_wallet_address: String,
}

/// Fields a project create request may carry
#[derive(Debug, Clone)]
pub struct NewProject {
    pub name: String,
    pub description: Option<String>,
    pub owner_id: i64,
    pub visibility: String,
    pub status: String,
    pub category: String,
    pub start_date: String,
}

/// Partial update; absent fields keep their current value
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProjectUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub visibility: Option<String>,
    pub status: Option<String>,
    pub category: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewMilestone {
    pub title: String,
    pub description: Option<String>,
    pub milestone_type: String,
    pub date: String,
    pub status: String,
    pub creator_id: i64,
}

// ============================================================================
// Repository
// ============================================================================

pub struct ProjectRepository {
    pool: SqlitePool,
}

impl ProjectRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, new: &NewProject) -> Result<ProjectRow, sqlx::Error> {
        let now = now_timestamp();
        let result = sqlx::query(
            "INSERT INTO projects (
                name, description, owner_id, visibility, status, category, start_date,
                created_at, updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&new.name)
        .bind(&new.description)
        .bind(new.owner_id)
        .bind(&new.visibility)
        .bind(&new.status)
        .bind(&new.category)
        .bind(&new.start_date)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        sqlx::query_as::<_, ProjectRow>("SELECT * FROM projects WHERE id = ?")
            .bind(result.last_insert_rowid())
            .fetch_one(&self.pool)
            .await
    }

    pub async fn find(&self, id: i64) -> Result<Option<ProjectRow>, sqlx::Error> {
        sqlx::query_as::<_, ProjectRow>("SELECT * FROM projects WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn find_with_owner(&self, id: i64) -> Result<Option<ProjectWithOwner>, sqlx::Error> {
        sqlx::query_as::<_, ProjectWithOwner>(
            "SELECT p.*, u.username as owner_username, u.wallet_address as owner_wallet_address
             FROM projects p
             JOIN users u ON p.owner_id = u.id
             WHERE p.id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
    }

    /// Stored collaborator rows plus the implicit owner row
    pub async fn collaborators(&self, project_id: i64) -> Result<Vec<CollaboratorRow>, sqlx::Error> {
        sqlx::query_as::<_, CollaboratorRow>(
            "SELECT u.wallet_address, u.username, u.id as user_id,
                    pc.role, pc.added_at as joined_at
             FROM project_collaborators pc
             JOIN users u ON pc.user_id = u.id
             WHERE pc.project_id = ?

             UNION

             SELECT u.wallet_address, u.username, u.id as user_id,
                    'owner' as role, p.created_at as joined_at
             FROM projects p
             JOIN users u ON p.owner_id = u.id
             WHERE p.id = ?

             ORDER BY role DESC, joined_at ASC",
        )
        .bind(project_id)
        .bind(project_id)
        .fetch_all(&self.pool)
        .await
    }

    pub async fn is_collaborator(&self, project_id: i64, user_id: i64) -> Result<bool, sqlx::Error> {
        let found: Option<i64> = sqlx::query_scalar(
            "SELECT 1 FROM project_collaborators WHERE project_id = ? AND user_id = ?",
        )
        .bind(project_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(found.is_some())
    }

    pub async fn add_collaborator(
        &self,
        project_id: i64,
        user_id: i64,
        role: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO project_collaborators (project_id, user_id, role, added_at)
             VALUES (?, ?, ?, ?)",
        )
        .bind(project_id)
        .bind(user_id)
        .bind(role)
        .bind(now_timestamp())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn collaborator_role(
        &self,
        project_id: i64,
        user_id: i64,
    ) -> Result<Option<String>, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT role FROM project_collaborators WHERE project_id = ? AND user_id = ?",
        )
        .bind(project_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
    }

    pub async fn remove_collaborator(
        &self,
        project_id: i64,
        user_id: i64,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM project_collaborators WHERE project_id = ? AND user_id = ?")
            .bind(project_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn explore_all(&self) -> Result<Vec<ProjectWithOwner>, sqlx::Error> {
        sqlx::query_as::<_, ProjectWithOwner>(
            "SELECT p.*, u.username as owner_username, u.wallet_address as owner_wallet_address
             FROM projects p
             JOIN users u ON p.owner_id = u.id
             ORDER BY p.updated_at DESC",
        )
        .fetch_all(&self.pool)
        .await
    }

    /// Public projects, plus private ones that are backed by an NFT
    pub async fn explore_public(&self) -> Result<Vec<ExploreProject>, sqlx::Error> {
        sqlx::query_as::<_, ExploreProject>(
            "SELECT
                p.*,
                u.username as owner_username,
                u.wallet_address as owner_wallet_address,
                COALESCE((SELECT COUNT(*) FROM proofs WHERE project_id = p.id), 0) as proofs_count,
                COALESCE((SELECT COUNT(*) FROM nfts WHERE project_id = p.id), 0) as nfts_count,
                CASE WHEN EXISTS(SELECT 1 FROM nfts WHERE project_id = p.id) THEN 1 ELSE 0 END as has_nft
             FROM projects p
             JOIN users u ON p.owner_id = u.id
             WHERE p.visibility = 'Public'
                OR (p.visibility = 'Private' AND EXISTS(SELECT 1 FROM nfts WHERE project_id = p.id))
             ORDER BY p.updated_at DESC",
        )
        .fetch_all(&self.pool)
        .await
    }

    /// Public projects whose category, name or description matches any of
    /// the given interest keywords.
    pub async fn matching_public_projects(
        &self,
        interests: &[String],
        exclude_owner: Option<i64>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<ExploreProject>, sqlx::Error> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT
                p.*,
                u.username as owner_username,
                u.wallet_address as owner_wallet_address,
                COALESCE((SELECT COUNT(*) FROM proofs WHERE project_id = p.id), 0) as proofs_count,
                COALESCE((SELECT COUNT(*) FROM nfts WHERE project_id = p.id), 0) as nfts_count,
                CASE WHEN EXISTS(SELECT 1 FROM nfts WHERE project_id = p.id) THEN 1 ELSE 0 END as has_nft
             FROM projects p
             JOIN users u ON p.owner_id = u.id
             WHERE p.visibility = 'Public'",
        );

        if let Some(owner_id) = exclude_owner {
            qb.push(" AND p.owner_id != ").push_bind(owner_id);
        }

        if !interests.is_empty() {
            qb.push(" AND (");
            for (i, interest) in interests.iter().enumerate() {
                let pattern = format!("%{}%", interest.to_lowercase());
                if i > 0 {
                    qb.push(" OR ");
                }
                qb.push("LOWER(p.category) LIKE ").push_bind(pattern.clone());
                qb.push(" OR LOWER(p.name) LIKE ").push_bind(pattern.clone());
                qb.push(" OR LOWER(p.description) LIKE ").push_bind(pattern);
            }
            qb.push(")");
        }

        qb.push(" ORDER BY p.updated_at DESC LIMIT ")
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind(offset);

        qb.build_query_as::<ExploreProject>()
            .fetch_all(&self.pool)
            .await
    }

    /// Random public projects, used when interest matching finds nothing
    pub async fn random_public_projects(
        &self,
        exclude_owner: Option<i64>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<ExploreProject>, sqlx::Error> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT
                p.*,
                u.username as owner_username,
                u.wallet_address as owner_wallet_address,
                COALESCE((SELECT COUNT(*) FROM proofs WHERE project_id = p.id), 0) as proofs_count,
                COALESCE((SELECT COUNT(*) FROM nfts WHERE project_id = p.id), 0) as nfts_count,
                CASE WHEN EXISTS(SELECT 1 FROM nfts WHERE project_id = p.id) THEN 1 ELSE 0 END as has_nft
             FROM projects p
             JOIN users u ON p.owner_id = u.id
             WHERE p.visibility = 'Public'",
        );

        if let Some(owner_id) = exclude_owner {
            qb.push(" AND p.owner_id != ").push_bind(owner_id);
        }

        qb.push(" ORDER BY RANDOM() LIMIT ")
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind(offset);

        qb.build_query_as::<ExploreProject>()
            .fetch_all(&self.pool)
            .await
    }

    /// Apply only the supplied fields; always bumps `updated_at`
    pub async fn update(
        &self,
        id: i64,
        update: &ProjectUpdate,
    ) -> Result<Option<ProjectRow>, sqlx::Error> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE projects SET ");
        let mut any = false;

        if let Some(name) = &update.name {
            qb.push("name = ").push_bind(name);
            any = true;
        }
        if let Some(description) = &update.description {
            if any {
                qb.push(", ");
            }
            qb.push("description = ").push_bind(description);
            any = true;
        }
        if let Some(visibility) = &update.visibility {
            if any {
                qb.push(", ");
            }
            qb.push("visibility = ").push_bind(visibility);
            any = true;
        }
        if let Some(status) = &update.status {
            if any {
                qb.push(", ");
            }
            qb.push("status = ").push_bind(status);
            any = true;
        }
        if let Some(category) = &update.category {
            if any {
                qb.push(", ");
            }
            qb.push("category = ").push_bind(category);
            any = true;
        }

        if any {
            qb.push(", ");
        }
        qb.push("updated_at = ").push_bind(now_timestamp());
        qb.push(" WHERE id = ").push_bind(id);

        qb.build().execute(&self.pool).await?;
        self.find(id).await
    }

    /// Everything the user owns or collaborates on, with their role
    pub async fn projects_for_user(&self, user_id: i64) -> Result<Vec<UserProject>, sqlx::Error> {
        sqlx::query_as::<_, UserProject>(
            "SELECT DISTINCT p.*, u.username as owner_username,
                    u.wallet_address as owner_wallet_address,
                    CASE WHEN p.owner_id = ? THEN 'owner' ELSE pc.role END as user_role
             FROM projects p
             JOIN users u ON p.owner_id = u.id
             LEFT JOIN project_collaborators pc ON p.id = pc.project_id AND pc.user_id = ?
             WHERE p.owner_id = ? OR pc.user_id = ?
             ORDER BY p.updated_at DESC",
        )
        .bind(user_id)
        .bind(user_id)
        .bind(user_id)
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
    }

    pub async fn public_projects_for_owner(
        &self,
        owner_id: i64,
    ) -> Result<Vec<ProjectWithOwner>, sqlx::Error> {
        sqlx::query_as::<_, ProjectWithOwner>(
            "SELECT p.*, u.username as owner_username, u.wallet_address as owner_wallet_address
             FROM projects p
             JOIN users u ON p.owner_id = u.id
             WHERE p.owner_id = ? AND p.visibility = 'Public'
             ORDER BY p.updated_at DESC",
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await
    }

    // ------------------------------------------------------------------
    // File repository tree
    // ------------------------------------------------------------------

    /// One level of the repository tree; directories sort before files
    pub async fn files(
        &self,
        project_id: i64,
        parent_id: Option<i64>,
    ) -> Result<Vec<ProjectFileRow>, sqlx::Error> {
        sqlx::query_as::<_, ProjectFileRow>(
            "SELECT * FROM project_files
             WHERE project_id = ? AND (parent_id = ? OR (? IS NULL AND parent_id IS NULL))
             ORDER BY file_type DESC, file_name ASC",
        )
        .bind(project_id)
        .bind(parent_id)
        .bind(parent_id)
        .fetch_all(&self.pool)
        .await
    }

    pub async fn create_folder(
        &self,
        project_id: i64,
        parent_id: Option<i64>,
        uploader_id: i64,
        name: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO project_files (project_id, parent_id, uploader_id, file_name, file_type)
             VALUES (?, ?, ?, ?, 'directory')",
        )
        .bind(project_id)
        .bind(parent_id)
        .bind(uploader_id)
        .bind(name)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn add_file(
        &self,
        project_id: i64,
        parent_id: Option<i64>,
        uploader_id: i64,
        file_name: &str,
        file_path: &str,
        file_size: i64,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO project_files
             (project_id, parent_id, uploader_id, file_name, file_path, file_size, file_type)
             VALUES (?, ?, ?, ?, ?, ?, 'file')",
        )
        .bind(project_id)
        .bind(parent_id)
        .bind(uploader_id)
        .bind(file_name)
        .bind(file_path)
        .bind(file_size)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Milestones
    // ------------------------------------------------------------------

    pub async fn milestones(&self, project_id: i64) -> Result<Vec<MilestoneRow>, sqlx::Error> {
        sqlx::query_as::<_, MilestoneRow>(
            "SELECT m.*, u.username as creator_username, u.wallet_address as creator_wallet_address
             FROM milestones m
             JOIN users u ON m.creator_id = u.id
             WHERE m.project_id = ?
             ORDER BY date DESC",
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await
    }

    pub async fn create_milestone(
        &self,
        project_id: i64,
        new: &NewMilestone,
    ) -> Result<MilestoneRow, sqlx::Error> {
        let now = now_timestamp();
        let result = sqlx::query(
            "INSERT INTO milestones
             (project_id, title, description, type, date, status, creator_id, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(project_id)
        .bind(&new.title)
        .bind(&new.description)
        .bind(&new.milestone_type)
        .bind(&new.date)
        .bind(&new.status)
        .bind(new.creator_id)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        self.milestone(result.last_insert_rowid())
            .await?
            .ok_or(sqlx::Error::RowNotFound)
    }

    pub async fn milestone(&self, id: i64) -> Result<Option<MilestoneRow>, sqlx::Error> {
        sqlx::query_as::<_, MilestoneRow>(
            "SELECT m.*, u.username as creator_username, u.wallet_address as creator_wallet_address
             FROM milestones m
             JOIN users u ON m.creator_id = u.id
             WHERE m.id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
    }

    pub async fn milestone_belongs_to(
        &self,
        milestone_id: i64,
        project_id: i64,
    ) -> Result<bool, sqlx::Error> {
        let found: Option<i64> =
            sqlx::query_scalar("SELECT id FROM milestones WHERE id = ? AND project_id = ?")
                .bind(milestone_id)
                .bind(project_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(found.is_some())
    }

    pub async fn update_milestone(
        &self,
        milestone_id: i64,
        project_id: i64,
        title: &str,
        description: Option<&str>,
        milestone_type: &str,
        date: &str,
        status: &str,
    ) -> Result<Option<MilestoneRow>, sqlx::Error> {
        sqlx::query(
            "UPDATE milestones
             SET title = ?, description = ?, type = ?, date = ?, status = ?, updated_at = ?
             WHERE id = ? AND project_id = ?",
        )
        .bind(title)
        .bind(description)
        .bind(milestone_type)
        .bind(date)
        .bind(status)
        .bind(now_timestamp())
        .bind(milestone_id)
        .bind(project_id)
        .execute(&self.pool)
        .await?;

        self.milestone(milestone_id).await
    }

    pub async fn delete_milestone(
        &self,
        milestone_id: i64,
        project_id: i64,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM milestones WHERE id = ? AND project_id = ?")
            .bind(milestone_id)
            .bind(project_id)
            .execute(&self.pool)
            .await?;
        Ok(())
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
        let (owner, _) = users
            .login_or_create("0x1111111111111111111111111111111111111111")
            .await
            .unwrap();
        (pool, owner.id)
    }

    fn new_project(owner_id: i64) -> NewProject {
        NewProject {
            name: "Protein folding".into(),
            description: Some("structure prediction".into()),
            owner_id,
            visibility: "Private".into(),
            status: "Unknown".into(),
            category: "Other".into(),
            start_date: now_timestamp(),
        }
    }

    #[tokio::test]
    async fn create_applies_defaults_and_owner() {
        let (pool, owner_id) = seeded().await;
        let repo = ProjectRepository::new(pool);

        let project = repo.create(&new_project(owner_id)).await.unwrap();
        assert_eq!(project.visibility, "Private");
        assert_eq!(project.status, "Unknown");
        assert_eq!(project.owner_id, owner_id);
        assert_eq!(project.like_count, 0);
    }

    #[tokio::test]
    async fn collaborator_listing_includes_implicit_owner() {
        let (pool, owner_id) = seeded().await;
        let users = UserRepository::new(pool.clone());
        let repo = ProjectRepository::new(pool);

        let project = repo.create(&new_project(owner_id)).await.unwrap();
        let (member, _) = users
            .login_or_create("0x2222222222222222222222222222222222222222")
            .await
            .unwrap();
        repo.add_collaborator(project.id, member.id, "editor").await.unwrap();

        let collaborators = repo.collaborators(project.id).await.unwrap();
        assert_eq!(collaborators.len(), 2);
        assert!(collaborators.iter().any(|c| c.role == "owner" && c.user_id == owner_id));
        assert!(collaborators.iter().any(|c| c.role == "editor" && c.user_id == member.id));
    }

    #[tokio::test]
    async fn partial_update_leaves_other_fields() {
        let (pool, owner_id) = seeded().await;
        let repo = ProjectRepository::new(pool);
        let project = repo.create(&new_project(owner_id)).await.unwrap();

        let update = ProjectUpdate {
            status: Some("Completed".into()),
            ..Default::default()
        };
        let updated = repo.update(project.id, &update).await.unwrap().unwrap();
        assert_eq!(updated.status, "Completed");
        assert_eq!(updated.name, project.name);
        assert_eq!(updated.visibility, "Private");
    }

    #[tokio::test]
    async fn explore_public_excludes_private_without_nft() {
        let (pool, owner_id) = seeded().await;
        let repo = ProjectRepository::new(pool.clone());

        repo.create(&new_project(owner_id)).await.unwrap();
        let mut public = new_project(owner_id);
        public.visibility = "Public".into();
        let public = repo.create(&public).await.unwrap();

        let listed = repo.explore_public().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].project.project.id, public.id);
    }

    #[tokio::test]
    async fn repository_listing_scopes_by_parent() {
        let (pool, owner_id) = seeded().await;
        let repo = ProjectRepository::new(pool);
        let project = repo.create(&new_project(owner_id)).await.unwrap();

        repo.create_folder(project.id, None, owner_id, "data").await.unwrap();
        let root = repo.files(project.id, None).await.unwrap();
        assert_eq!(root.len(), 1);
        let folder_id = root[0].id;

        repo.add_file(project.id, Some(folder_id), owner_id, "a.csv", "uploads/a.csv", 10)
            .await
            .unwrap();
        assert_eq!(repo.files(project.id, None).await.unwrap().len(), 1);
        assert_eq!(repo.files(project.id, Some(folder_id)).await.unwrap().len(), 1);
    }
}
