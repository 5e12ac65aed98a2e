//! Dataset persistence repository
//!
//! Datasets carry primary-file metadata plus a `dataset_files` list for
//! multi-file uploads. Access control is resolved per query: public level,
//! ownership, or a non-expired permission row keyed by user id or bare
//! wallet address. Simulated proof rows live in `zk_proofs`.

use serde::Serialize;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use super::now_timestamp;
use crate::zk::GeneratedProof;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct DatasetRow {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub owner_id: i64,
    pub project_id: Option<i64>,
    pub privacy_level: String,
    pub file_path: Option<String>,
    pub file_name: Option<String>,
    pub file_size: Option<i64>,
    pub file_type: Option<String>,
    pub category: String,
    pub tags: Option<String>,
    pub access_count: i64,
    pub download_count: i64,
    pub like_count: i64,
    pub status: String,
    pub is_encrypted: bool,
    pub encryption_key_hash: Option<String>,
    pub encryption_status: Option<String>,
    pub encryption_metadata: Option<String>,
    pub external_link: Option<String>,
    pub total_files: i64,
    pub total_size: i64,
    pub zk_proof_id: Option<i64>,
    pub created_at: String,
    pub updated_at: String,
}

/// Dataset as listed for its owner or a permitted user
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct UserDataset {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub dataset: DatasetRow,
    pub owner_username: Option<String>,
    pub project_name: Option<String>,
    pub effective_privacy_level: String,
    pub access_type: Option<String>,
}

/// Dataset as listed on the explore page
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ExploreDataset {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub dataset: DatasetRow,
    pub owner_username: Option<String>,
    pub project_name: Option<String>,
}

/// Single dataset with proof status, for the detail endpoints
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct DatasetDetail {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub dataset: DatasetRow,
    pub owner_username: Option<String>,
    pub project_name: Option<String>,
    pub zk_proof_status: Option<String>,
    pub effective_privacy_level: String,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct DatasetFileRow {
    pub id: i64,
    pub dataset_id: i64,
    pub file_name: String,
    pub original_name: String,
    pub file_path: String,
    pub file_size: i64,
    pub file_type: Option<String>,
    pub mime_type: Option<String>,
    pub file_order: i64,
    pub is_primary: bool,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct PermissionRow {
    pub id: i64,
    pub dataset_id: i64,
    pub user_id: Option<i64>,
    pub wallet_address: Option<String>,
    pub permission_type: String,
    pub access_conditions: Option<String>,
    pub granted_by: i64,
    pub expires_at: Option<String>,
    pub created_at: String,
    pub username: Option<String>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ZkProofRow {
    pub id: i64,
    pub dataset_id: i64,
    pub creator_id: i64,
    pub proof_type: String,
    pub proof_data: String,
    pub verification_key: Option<String>,
    pub public_inputs: Option<String>,
    pub circuit_hash: Option<String>,
    pub status: String,
    pub verification_count: i64,
    pub created_at: String,
    pub verified_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct UsageRow {
    pub id: i64,
    pub dataset_id: i64,
    pub user_id: Option<i64>,
    pub wallet_address: Option<String>,
    pub action_type: String,
    pub query_hash: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub metadata: Option<String>,
    pub created_at: String,
    pub username: Option<String>,
    pub user_wallet_address: Option<String>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ActionCount {
    pub action_type: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct DailyUsage {
    pub date: String,
    pub usage_count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DatasetAnalytics {
    pub dataset_id: i64,
    pub total_usage: i64,
    pub usage_by_action: Vec<ActionCount>,
    pub recent_usage: Vec<UsageRow>,
    pub daily_usage: Vec<DailyUsage>,
    pub access_count: i64,
    pub download_count: i64,
}

/// Metadata for a dataset create; files are added separately
#[derive(Debug, Clone)]
pub struct NewDataset {
    pub name: String,
    pub description: Option<String>,
    pub owner_id: i64,
    pub project_id: Option<i64>,
    pub external_link: Option<String>,
    pub privacy_level: String,
    pub category: String,
    pub tags_json: String,
    pub status: String,
}

#[derive(Debug, Clone)]
pub struct NewDatasetFile {
    pub file_name: String,
    pub original_name: String,
    pub file_path: String,
    pub file_size: i64,
    pub file_type: Option<String>,
    pub mime_type: Option<String>,
    pub is_primary: bool,
}

/// Partial dataset update; absent fields keep their values
#[derive(Debug, Clone, Default)]
pub struct DatasetUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub privacy_level: Option<String>,
    pub category: Option<String>,
    pub tags_json: Option<String>,
}

// ============================================================================
// Repository
// ============================================================================

pub struct DatasetRepository {
    pool: SqlitePool,
}

impl DatasetRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Datasets the user owns or holds a live permission for
    pub async fn list_for_user(
        &self,
        user_id: i64,
        wallet_address: &str,
        project_id: Option<i64>,
        privacy_level: Option<&str>,
    ) -> Result<Vec<UserDataset>, sqlx::Error> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT DISTINCT
                d.*,
                u.username as owner_username,
                p.name as project_name,
                CASE WHEN d.zk_proof_id IS NOT NULL THEN 'zk_proof_protected'
                     ELSE d.privacy_level END as effective_privacy_level,
                CASE WHEN d.owner_id = ",
        );
        qb.push_bind(user_id);
        qb.push(
            " THEN 'owner'
                     WHEN dp.permission_type IS NOT NULL THEN dp.permission_type
                     ELSE NULL END as access_type
             FROM datasets d
             LEFT JOIN users u ON d.owner_id = u.id
             LEFT JOIN projects p ON d.project_id = p.id
             LEFT JOIN dataset_permissions dp ON (
                d.id = dp.dataset_id
                AND (dp.user_id = ",
        );
        qb.push_bind(user_id);
        qb.push(" OR dp.wallet_address = ");
        qb.push_bind(wallet_address);
        qb.push(
            ")
                AND (dp.expires_at IS NULL OR dp.expires_at > datetime('now'))
             )
             WHERE (d.owner_id = ",
        );
        qb.push_bind(user_id);
        qb.push(" OR dp.id IS NOT NULL)");

        if let Some(project_id) = project_id {
            qb.push(" AND d.project_id = ").push_bind(project_id);
        }

        // ZK-protected is an effective level, not a stored one
        match privacy_level {
            Some("zk_proof_protected") => {
                qb.push(" AND d.zk_proof_id IS NOT NULL");
            }
            Some(level) => {
                qb.push(" AND d.privacy_level = ")
                    .push_bind(level.to_string())
                    .push(" AND d.zk_proof_id IS NULL");
            }
            None => {}
        }

        qb.push(" ORDER BY d.updated_at DESC");

        qb.build_query_as::<UserDataset>().fetch_all(&self.pool).await
    }

    /// Ready datasets visible on explore: public, or restricted with a
    /// dataset NFT behind them.
    pub async fn explore(
        &self,
        category: Option<&str>,
        search: Option<&str>,
    ) -> Result<Vec<ExploreDataset>, sqlx::Error> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT d.*, u.username as owner_username, p.name as project_name
             FROM datasets d
             LEFT JOIN users u ON d.owner_id = u.id
             LEFT JOIN projects p ON d.project_id = p.id
             WHERE d.status = 'ready' AND (
                d.privacy_level = 'public'
                OR (d.privacy_level IN ('private', 'encrypted', 'zk_proof_protected')
                    AND EXISTS(SELECT 1 FROM nfts n WHERE n.project_id = d.project_id
                               AND n.token_id LIKE 'DATASET_%'))
             )",
        );

        if let Some(category) = category {
            qb.push(" AND d.category = ").push_bind(category.to_string());
        }
        if let Some(search) = search {
            let pattern = format!("%{search}%");
            qb.push(" AND (d.name LIKE ")
                .push_bind(pattern.clone())
                .push(" OR d.description LIKE ")
                .push_bind(pattern)
                .push(")");
        }

        qb.push(" ORDER BY d.access_count DESC, d.updated_at DESC LIMIT 50");

        qb.build_query_as::<ExploreDataset>().fetch_all(&self.pool).await
    }

    /// Public ready datasets matching interest keywords
    pub async fn matching_public_datasets(
        &self,
        interests: &[String],
        exclude_owner: Option<i64>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<ExploreDataset>, sqlx::Error> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT d.*, u.username as owner_username, p.name as project_name
             FROM datasets d
             LEFT JOIN users u ON d.owner_id = u.id
             LEFT JOIN projects p ON d.project_id = p.id
             WHERE d.privacy_level = 'public' AND d.status = 'ready'",
        );

        if let Some(owner_id) = exclude_owner {
            qb.push(" AND d.owner_id != ").push_bind(owner_id);
        }

        if !interests.is_empty() {
            qb.push(" AND (");
            for (i, interest) in interests.iter().enumerate() {
                let pattern = format!("%{}%", interest.to_lowercase());
                if i > 0 {
                    qb.push(" OR ");
                }
                qb.push("LOWER(d.category) LIKE ").push_bind(pattern.clone());
                qb.push(" OR LOWER(d.name) LIKE ").push_bind(pattern.clone());
                qb.push(" OR LOWER(d.description) LIKE ").push_bind(pattern.clone());
                qb.push(" OR LOWER(d.tags) LIKE ").push_bind(pattern);
            }
            qb.push(")");
        }

        qb.push(" ORDER BY d.access_count DESC, d.updated_at DESC LIMIT ")
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind(offset);

        qb.build_query_as::<ExploreDataset>().fetch_all(&self.pool).await
    }

    pub async fn random_public_datasets(
        &self,
        exclude_owner: Option<i64>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<ExploreDataset>, sqlx::Error> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT d.*, u.username as owner_username, p.name as project_name
             FROM datasets d
             LEFT JOIN users u ON d.owner_id = u.id
             LEFT JOIN projects p ON d.project_id = p.id
             WHERE d.privacy_level = 'public' AND d.status = 'ready'",
        );

        if let Some(owner_id) = exclude_owner {
            qb.push(" AND d.owner_id != ").push_bind(owner_id);
        }

        qb.push(" ORDER BY RANDOM() LIMIT ")
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind(offset);

        qb.build_query_as::<ExploreDataset>().fetch_all(&self.pool).await
    }

    /// Public detail view, restricted to explore-visible datasets
    pub async fn explore_detail(&self, id: i64) -> Result<Option<DatasetDetail>, sqlx::Error> {
        sqlx::query_as::<_, DatasetDetail>(
            "SELECT d.*, u.username as owner_username, p.name as project_name,
                    zk.status as zk_proof_status,
                    CASE WHEN d.zk_proof_id IS NOT NULL THEN 'privacy_protected'
                         ELSE d.privacy_level END as effective_privacy_level
             FROM datasets d
             LEFT JOIN users u ON d.owner_id = u.id
             LEFT JOIN projects p ON d.project_id = p.id
             LEFT JOIN zk_proofs zk ON d.zk_proof_id = zk.id
             WHERE d.id = ? AND d.status = 'ready' AND (
                d.privacy_level = 'public'
                OR (d.privacy_level IN ('private', 'encrypted', 'zk_proof_protected')
                    AND EXISTS(SELECT 1 FROM nfts n WHERE n.project_id = d.project_id
                               AND n.token_id LIKE 'DATASET_%'))
             )",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
    }

    pub async fn find(&self, id: i64) -> Result<Option<DatasetRow>, sqlx::Error> {
        sqlx::query_as::<_, DatasetRow>("SELECT * FROM datasets WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn find_detail(&self, id: i64) -> Result<Option<DatasetDetail>, sqlx::Error> {
        sqlx::query_as::<_, DatasetDetail>(
            "SELECT d.*, u.username as owner_username, p.name as project_name,
                    zk.status as zk_proof_status,
                    CASE WHEN d.zk_proof_id IS NOT NULL THEN 'privacy_protected'
                         ELSE d.privacy_level END as effective_privacy_level
             FROM datasets d
             LEFT JOIN users u ON d.owner_id = u.id
             LEFT JOIN projects p ON d.project_id = p.id
             LEFT JOIN zk_proofs zk ON d.zk_proof_id = zk.id
             WHERE d.id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
    }

    pub async fn find_owned(&self, id: i64, owner_id: i64) -> Result<Option<DatasetRow>, sqlx::Error> {
        sqlx::query_as::<_, DatasetRow>("SELECT * FROM datasets WHERE id = ? AND owner_id = ?")
            .bind(id)
            .bind(owner_id)
            .fetch_optional(&self.pool)
            .await
    }

    /// A permission row that has not expired, matched by user id or wallet
    pub async fn has_valid_permission(
        &self,
        dataset_id: i64,
        user_id: i64,
        wallet_address: &str,
    ) -> Result<bool, sqlx::Error> {
        let found: Option<i64> = sqlx::query_scalar(
            "SELECT id FROM dataset_permissions
             WHERE dataset_id = ? AND (user_id = ? OR wallet_address = ?)
               AND (expires_at IS NULL OR expires_at > datetime('now'))",
        )
        .bind(dataset_id)
        .bind(user_id)
        .bind(wallet_address)
        .fetch_optional(&self.pool)
        .await?;
        Ok(found.is_some())
    }

    pub async fn log_usage(
        &self,
        dataset_id: i64,
        user_id: Option<i64>,
        action_type: &str,
        metadata_json: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO dataset_usage (dataset_id, user_id, action_type, metadata)
             VALUES (?, ?, ?, ?)",
        )
        .bind(dataset_id)
        .bind(user_id)
        .bind(action_type)
        .bind(metadata_json)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// View logging for authenticated reads: usage row plus access bump
    pub async fn record_view(&self, dataset_id: i64, user_id: i64) -> Result<(), sqlx::Error> {
        self.log_usage(dataset_id, Some(user_id), "view", "{}").await?;
        sqlx::query("UPDATE datasets SET access_count = access_count + 1 WHERE id = ?")
            .bind(dataset_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn files(&self, dataset_id: i64) -> Result<Vec<DatasetFileRow>, sqlx::Error> {
        sqlx::query_as::<_, DatasetFileRow>(
            "SELECT * FROM dataset_files WHERE dataset_id = ? ORDER BY file_order",
        )
        .bind(dataset_id)
        .fetch_all(&self.pool)
        .await
    }

    pub async fn primary_file(&self, dataset_id: i64) -> Result<Option<DatasetFileRow>, sqlx::Error> {
        sqlx::query_as::<_, DatasetFileRow>(
            "SELECT * FROM dataset_files WHERE dataset_id = ? AND is_primary = 1",
        )
        .bind(dataset_id)
        .fetch_optional(&self.pool)
        .await
    }

    /// Metadata-only draft, no files attached yet
    pub async fn create_draft(&self, new: &NewDataset) -> Result<i64, sqlx::Error> {
        let now = now_timestamp();
        let result = sqlx::query(
            "INSERT INTO datasets (
                name, description, owner_id, project_id, external_link, privacy_level,
                category, tags, total_files, total_size, status, created_at, updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, 0, 0, ?, ?, ?)",
        )
        .bind(&new.name)
        .bind(&new.description)
        .bind(new.owner_id)
        .bind(new.project_id)
        .bind(&new.external_link)
        .bind(&new.privacy_level)
        .bind(&new.category)
        .bind(&new.tags_json)
        .bind(&new.status)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    /// Dataset row plus one `dataset_files` row per upload, atomically.
    /// The primary file's metadata is copied onto the dataset row.
    pub async fn create_with_files(
        &self,
        new: &NewDataset,
        files: &[NewDatasetFile],
    ) -> Result<i64, sqlx::Error> {
        let primary = files
            .iter()
            .find(|f| f.is_primary)
            .or_else(|| files.first())
            .ok_or(sqlx::Error::RowNotFound)?;
        let total_size: i64 = files.iter().map(|f| f.file_size).sum();
        let now = now_timestamp();

        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            "INSERT INTO datasets (
                name, description, owner_id, project_id, external_link, privacy_level,
                file_path, file_name, file_size, file_type, category, tags,
                total_files, total_size, status, created_at, updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&new.name)
        .bind(&new.description)
        .bind(new.owner_id)
        .bind(new.project_id)
        .bind(&new.external_link)
        .bind(&new.privacy_level)
        .bind(&primary.file_path)
        .bind(&primary.original_name)
        .bind(primary.file_size)
        .bind(&primary.mime_type)
        .bind(&new.category)
        .bind(&new.tags_json)
        .bind(files.len() as i64)
        .bind(total_size)
        .bind(&new.status)
        .bind(&now)
        .bind(&now)
        .execute(&mut *tx)
        .await?;

        let dataset_id = result.last_insert_rowid();

        for (order, file) in files.iter().enumerate() {
            sqlx::query(
                "INSERT INTO dataset_files (
                    dataset_id, file_name, original_name, file_path, file_size,
                    file_type, mime_type, file_order, is_primary
                 ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(dataset_id)
            .bind(&file.file_name)
            .bind(&file.original_name)
            .bind(&file.file_path)
            .bind(file.file_size)
            .bind(&file.file_type)
            .bind(&file.mime_type)
            .bind(order as i64)
            .bind(file.is_primary)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(dataset_id)
    }

    pub async fn mark_ready(&self, id: i64) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE datasets SET status = 'ready', updated_at = ? WHERE id = ?")
            .bind(now_timestamp())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Dynamic update of supplied fields. Switching to a privacy level
    /// that needs further processing resets status to 'uploaded'.
    pub async fn update(&self, id: i64, update: &DatasetUpdate) -> Result<bool, sqlx::Error> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE datasets SET ");
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
        if let Some(privacy_level) = &update.privacy_level {
            if any {
                qb.push(", ");
            }
            qb.push("privacy_level = ").push_bind(privacy_level);
            if privacy_level == "zk_proof_protected" || privacy_level == "encrypted" {
                qb.push(", status = ").push_bind("uploaded");
            }
            any = true;
        }
        if let Some(category) = &update.category {
            if any {
                qb.push(", ");
            }
            qb.push("category = ").push_bind(category);
            any = true;
        }
        if let Some(tags) = &update.tags_json {
            if any {
                qb.push(", ");
            }
            qb.push("tags = ").push_bind(tags);
            any = true;
        }

        if !any {
            return Ok(false);
        }

        qb.push(", updated_at = ").push_bind(now_timestamp());
        qb.push(" WHERE id = ").push_bind(id);
        qb.build().execute(&self.pool).await?;
        Ok(true)
    }

    /// Remove the dataset and every dependent row in one transaction
    pub async fn delete(&self, id: i64) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM dataset_usage WHERE dataset_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM dataset_permissions WHERE dataset_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM dataset_files WHERE dataset_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM zk_proofs WHERE dataset_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM datasets WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await
    }

    // ------------------------------------------------------------------
    // Permissions
    // ------------------------------------------------------------------

    pub async fn permissions(&self, dataset_id: i64) -> Result<Vec<PermissionRow>, sqlx::Error> {
        sqlx::query_as::<_, PermissionRow>(
            "SELECT dp.id, dp.dataset_id, dp.user_id, dp.wallet_address,
                    dp.permission_type, dp.access_conditions, dp.granted_by,
                    dp.expires_at, dp.created_at, u.username
             FROM dataset_permissions dp
             LEFT JOIN users u ON dp.user_id = u.id
             WHERE dp.dataset_id = ?
             ORDER BY dp.created_at DESC",
        )
        .bind(dataset_id)
        .fetch_all(&self.pool)
        .await
    }

    /// Grantee may not be a registered user yet; the bare wallet address
    /// still matches at access-check time.
    pub async fn grant_permission(
        &self,
        dataset_id: i64,
        target_user_id: Option<i64>,
        target_wallet_address: &str,
        permission_type: &str,
        access_conditions_json: Option<&str>,
        granted_by: i64,
        expires_at: Option<&str>,
    ) -> Result<i64, sqlx::Error> {
        let result = sqlx::query(
            "INSERT INTO dataset_permissions (
                dataset_id, user_id, wallet_address, permission_type,
                access_conditions, granted_by, expires_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(dataset_id)
        .bind(target_user_id)
        .bind(target_wallet_address)
        .bind(permission_type)
        .bind(access_conditions_json)
        .bind(granted_by)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn revoke_permission(
        &self,
        permission_id: i64,
        dataset_id: i64,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM dataset_permissions WHERE id = ? AND dataset_id = ?")
            .bind(permission_id)
            .bind(dataset_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Encryption and proofs
    // ------------------------------------------------------------------

    pub async fn set_encrypted(&self, id: i64, metadata_json: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE datasets SET encryption_status = 'encrypted', encryption_metadata = ?,
                    status = 'ready', updated_at = ?
             WHERE id = ?",
        )
        .bind(metadata_json)
        .bind(now_timestamp())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Store a generated proof and link it to the dataset
    pub async fn attach_proof(
        &self,
        dataset_id: i64,
        creator_id: i64,
        proof_type: &str,
        proof: &GeneratedProof,
        public_inputs_json: &str,
    ) -> Result<i64, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            "INSERT INTO zk_proofs (
                dataset_id, creator_id, proof_type, proof_data,
                verification_key, public_inputs, circuit_hash, status
             ) VALUES (?, ?, ?, ?, ?, ?, ?, 'verified')",
        )
        .bind(dataset_id)
        .bind(creator_id)
        .bind(proof_type)
        .bind(&proof.proof_data)
        .bind(&proof.verification_key)
        .bind(public_inputs_json)
        .bind(&proof.circuit_hash)
        .execute(&mut *tx)
        .await?;

        let proof_id = result.last_insert_rowid();

        sqlx::query(
            "UPDATE datasets SET zk_proof_id = ?, status = 'ready', updated_at = ? WHERE id = ?",
        )
        .bind(proof_id)
        .bind(now_timestamp())
        .bind(dataset_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(proof_id)
    }

    pub async fn proof(&self, proof_id: i64) -> Result<Option<ZkProofRow>, sqlx::Error> {
        sqlx::query_as::<_, ZkProofRow>("SELECT * FROM zk_proofs WHERE id = ?")
            .bind(proof_id)
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn mark_proof_verified(&self, proof_id: i64) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE zk_proofs SET status = 'verified',
                    verification_count = verification_count + 1, verified_at = ?
             WHERE id = ?",
        )
        .bind(now_timestamp())
        .bind(proof_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn mark_proof_failed(&self, proof_id: i64) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE zk_proofs SET status = 'failed' WHERE id = ?")
            .bind(proof_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Analytics
    // ------------------------------------------------------------------

    pub async fn analytics(&self, dataset: &DatasetRow) -> Result<DatasetAnalytics, sqlx::Error> {
        let total_usage: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM dataset_usage WHERE dataset_id = ?")
                .bind(dataset.id)
                .fetch_one(&self.pool)
                .await?;

        let usage_by_action = sqlx::query_as::<_, ActionCount>(
            "SELECT action_type, COUNT(*) as count
             FROM dataset_usage
             WHERE dataset_id = ?
             GROUP BY action_type
             ORDER BY count DESC",
        )
        .bind(dataset.id)
        .fetch_all(&self.pool)
        .await?;

        let recent_usage = sqlx::query_as::<_, UsageRow>(
            "SELECT du.*, u.username, u.wallet_address as user_wallet_address
             FROM dataset_usage du
             LEFT JOIN users u ON du.user_id = u.id
             WHERE du.dataset_id = ?
             ORDER BY du.created_at DESC
             LIMIT 50",
        )
        .bind(dataset.id)
        .fetch_all(&self.pool)
        .await?;

        let daily_usage = sqlx::query_as::<_, DailyUsage>(
            "SELECT DATE(created_at) as date, COUNT(*) as usage_count
             FROM dataset_usage
             WHERE dataset_id = ? AND created_at >= datetime('now', '-30 days')
             GROUP BY DATE(created_at)
             ORDER BY date DESC",
        )
        .bind(dataset.id)
        .fetch_all(&self.pool)
        .await?;

        Ok(DatasetAnalytics {
            dataset_id: dataset.id,
            total_usage,
            usage_by_action,
            recent_usage,
            daily_usage,
            access_count: dataset.access_count,
            download_count: dataset.download_count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{migrations, UserRepository};
    use crate::zk::{MockProofVerifier, ProofVerifier};

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

    fn draft(owner_id: i64, privacy_level: &str) -> NewDataset {
        NewDataset {
            name: "cells".into(),
            description: Some("imaging data".into()),
            owner_id,
            project_id: None,
            external_link: None,
            privacy_level: privacy_level.into(),
            category: "Biology".into(),
            tags_json: "[]".into(),
            status: "ready".into(),
        }
    }

    #[tokio::test]
    async fn upload_with_files_marks_primary_and_totals() {
        let (pool, owner_id) = seeded().await;
        let repo = DatasetRepository::new(pool);

        let files = vec![
            NewDatasetFile {
                file_name: "datasets-1-a.csv".into(),
                original_name: "a.csv".into(),
                file_path: "uploads/datasets/datasets-1-a.csv".into(),
                file_size: 100,
                file_type: Some("csv".into()),
                mime_type: Some("text/csv".into()),
                is_primary: false,
            },
            NewDatasetFile {
                file_name: "datasets-2-b.csv".into(),
                original_name: "b.csv".into(),
                file_path: "uploads/datasets/datasets-2-b.csv".into(),
                file_size: 900,
                file_type: Some("csv".into()),
                mime_type: Some("text/csv".into()),
                is_primary: true,
            },
        ];
        let id = repo
            .create_with_files(&draft(owner_id, "public"), &files)
            .await
            .unwrap();

        let dataset = repo.find(id).await.unwrap().unwrap();
        assert_eq!(dataset.total_files, 2);
        assert_eq!(dataset.total_size, 1000);
        assert_eq!(dataset.file_name.as_deref(), Some("b.csv"));

        let primary = repo.primary_file(id).await.unwrap().unwrap();
        assert_eq!(primary.original_name, "b.csv");
    }

    #[tokio::test]
    async fn permission_expiry_controls_access() {
        let (pool, owner_id) = seeded().await;
        let users = UserRepository::new(pool.clone());
        let (stranger, _) = users
            .login_or_create("0x6666666666666666666666666666666666666666")
            .await
            .unwrap();
        let repo = DatasetRepository::new(pool);

        let id = repo.create_draft(&draft(owner_id, "private")).await.unwrap();

        assert!(!repo
            .has_valid_permission(id, stranger.id, &stranger.wallet_address)
            .await
            .unwrap());

        // Unexpired grant
        repo.grant_permission(id, Some(stranger.id), &stranger.wallet_address, "read", None, owner_id, Some("2099-01-01 00:00:00"))
            .await
            .unwrap();
        assert!(repo
            .has_valid_permission(id, stranger.id, &stranger.wallet_address)
            .await
            .unwrap());

        // Expired grants do not count
        let (late, _) = users
            .login_or_create("0x7777777777777777777777777777777777777777")
            .await
            .unwrap();
        repo.grant_permission(id, Some(late.id), &late.wallet_address, "read", None, owner_id, Some("2000-01-01 00:00:00"))
            .await
            .unwrap();
        assert!(!repo
            .has_valid_permission(id, late.id, &late.wallet_address)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn attach_proof_links_dataset() {
        let (pool, owner_id) = seeded().await;
        let repo = DatasetRepository::new(pool);

        let id = repo.create_draft(&draft(owner_id, "private")).await.unwrap();
        let generated = MockProofVerifier.generate();
        let proof_id = repo
            .attach_proof(id, owner_id, "privacy", &generated, "[]")
            .await
            .unwrap();

        let dataset = repo.find(id).await.unwrap().unwrap();
        assert_eq!(dataset.zk_proof_id, Some(proof_id));
        assert_eq!(dataset.status, "ready");

        let proof = repo.proof(proof_id).await.unwrap().unwrap();
        assert_eq!(proof.status, "verified");
        assert_eq!(proof.verification_count, 0);

        repo.mark_proof_verified(proof_id).await.unwrap();
        let proof = repo.proof(proof_id).await.unwrap().unwrap();
        assert_eq!(proof.verification_count, 1);
        assert!(proof.verified_at.is_some());
    }

    #[tokio::test]
    async fn delete_removes_dependents() {
        let (pool, owner_id) = seeded().await;
        let repo = DatasetRepository::new(pool.clone());

        let id = repo.create_draft(&draft(owner_id, "public")).await.unwrap();
        repo.log_usage(id, Some(owner_id), "view", "{}").await.unwrap();
        repo.delete(id).await.unwrap();

        assert!(repo.find(id).await.unwrap().is_none());
        let usage: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM dataset_usage WHERE dataset_id = ?")
            .bind(id)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(usage, 0);
    }
}
