//! Publication persistence repository
//!
//! Publications are authored by one user; authors and keywords columns
//! hold JSON array text. The `publication_datasets` table links papers to
//! the datasets they use, one row per pair.

use serde::Serialize;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use super::now_timestamp;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct PublicationRow {
    pub id: i64,
    pub title: String,
    pub authors: String,
    #[sqlx(rename = "abstract")]
    #[serde(rename = "abstract")]
    pub abstract_text: Option<String>,
    pub keywords: Option<String>,
    pub category: Option<String>,
    pub status: String,
    pub author_id: i64,
    pub created_at: String,
    pub published_at: Option<String>,
    pub submitted_at: Option<String>,
    pub last_modified: Option<String>,
    pub doi: Option<String>,
    pub citation_count: i64,
    pub download_count: i64,
    pub views: i64,
    pub shares: i64,
    pub like_count: i64,
    pub review_deadline: Option<String>,
    pub peer_review_id: Option<String>,
    pub review_comments: Option<String>,
    pub preprint_server: Option<String>,
    pub is_imported: bool,
    pub original_url: Option<String>,
    pub publisher: Option<String>,
    pub volume: Option<String>,
    pub impact_factor: Option<f64>,
    pub import_notes: Option<String>,
    pub pdf_path: Option<String>,
    pub pdf_file_name: Option<String>,
    pub pdf_file_size: Option<i64>,
    pub pdf_mime_type: Option<String>,
    pub updated_at: String,
}

/// Publication joined with its author
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct PublicationWithAuthor {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub publication: PublicationRow,
    pub author_username: Option<String>,
    pub author_wallet_address: String,
}

/// Dataset linked to a publication
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct LinkedDataset {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub category: String,
    pub privacy_level: String,
    pub owner_id: i64,
    pub relationship_type: String,
    pub relationship_description: Option<String>,
    pub linked_at: String,
}

/// Publication linked to a dataset
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct LinkedPublication {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub publication: PublicationRow,
    pub relationship_type: String,
    pub relationship_description: Option<String>,
    pub linked_at: String,
}

/// Dataset candidate for linking, as shown in the paper editor
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct AvailableDataset {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub category: String,
    pub created_at: String,
}

/// New publication; authors and keywords are JSON array text
#[derive(Debug, Clone, Default)]
pub struct NewPublication {
    pub title: String,
    pub authors_json: String,
    pub abstract_text: Option<String>,
    pub keywords_json: String,
    pub category: Option<String>,
    pub status: String,
    pub author_id: i64,
    pub doi: Option<String>,
    pub published_at: Option<String>,
    pub citation_count: i64,
    pub download_count: i64,
    pub views: i64,
    pub is_imported: bool,
    pub original_url: Option<String>,
    pub publisher: Option<String>,
    pub volume: Option<String>,
    pub impact_factor: Option<f64>,
    pub import_notes: Option<String>,
    pub pdf_path: Option<String>,
    pub pdf_file_name: Option<String>,
    pub pdf_file_size: Option<i64>,
    pub pdf_mime_type: Option<String>,
    pub preprint_server: Option<String>,
}

/// Partial publication update; absent fields keep their values
#[derive(Debug, Clone, Default)]
pub struct PublicationUpdate {
    pub title: Option<String>,
    pub authors_json: Option<String>,
    pub abstract_text: Option<String>,
    pub keywords_json: Option<String>,
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
// Repository
// ============================================================================

pub struct PublicationRepository {
    pool: SqlitePool,
}

impl PublicationRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Published and preprint papers for the explore page, newest first
    pub async fn explore_public(
        &self,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<PublicationWithAuthor>, sqlx::Error> {
        sqlx::query_as::<_, PublicationWithAuthor>(
            "SELECT p.*, u.username as author_username,
                    u.wallet_address as author_wallet_address
             FROM publications p
             JOIN users u ON p.author_id = u.id
             WHERE p.status IN ('Published', 'Preprint')
             ORDER BY p.created_at DESC
             LIMIT ? OFFSET ?",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
    }

    pub async fn list_for_author(
        &self,
        author_id: i64,
    ) -> Result<Vec<PublicationWithAuthor>, sqlx::Error> {
        sqlx::query_as::<_, PublicationWithAuthor>(
            "SELECT p.*, u.username as author_username,
                    u.wallet_address as author_wallet_address
             FROM publications p
             JOIN users u ON p.author_id = u.id
             WHERE p.author_id = ?
             ORDER BY p.created_at DESC",
        )
        .bind(author_id)
        .fetch_all(&self.pool)
        .await
    }

    pub async fn find(&self, id: i64) -> Result<Option<PublicationWithAuthor>, sqlx::Error> {
        sqlx::query_as::<_, PublicationWithAuthor>(
            "SELECT p.*, u.username as author_username,
                    u.wallet_address as author_wallet_address
             FROM publications p
             JOIN users u ON p.author_id = u.id
             WHERE p.id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
    }

    pub async fn exists(&self, id: i64) -> Result<bool, sqlx::Error> {
        let found: Option<i64> = sqlx::query_scalar("SELECT id FROM publications WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(found.is_some())
    }

    pub async fn create(&self, new: &NewPublication) -> Result<PublicationWithAuthor, sqlx::Error> {
        let result = sqlx::query(
            "INSERT INTO publications (
                title, authors, abstract, keywords, category, status, author_id,
                doi, published_at, citation_count, download_count, views,
                is_imported, original_url, publisher, volume, impact_factor, import_notes,
                pdf_path, pdf_file_name, pdf_file_size, pdf_mime_type,
                preprint_server
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&new.title)
        .bind(&new.authors_json)
        .bind(&new.abstract_text)
        .bind(&new.keywords_json)
        .bind(&new.category)
        .bind(&new.status)
        .bind(new.author_id)
        .bind(&new.doi)
        .bind(&new.published_at)
        .bind(new.citation_count)
        .bind(new.download_count)
        .bind(new.views)
        .bind(new.is_imported)
        .bind(&new.original_url)
        .bind(&new.publisher)
        .bind(&new.volume)
        .bind(new.impact_factor)
        .bind(&new.import_notes)
        .bind(&new.pdf_path)
        .bind(&new.pdf_file_name)
        .bind(new.pdf_file_size)
        .bind(&new.pdf_mime_type)
        .bind(&new.preprint_server)
        .execute(&self.pool)
        .await?;

        self.find(result.last_insert_rowid())
            .await?
            .ok_or(sqlx::Error::RowNotFound)
    }

    /// Dynamic update of supplied fields; always refreshes last_modified
    pub async fn update(
        &self,
        id: i64,
        update: &PublicationUpdate,
    ) -> Result<Option<PublicationWithAuthor>, sqlx::Error> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE publications SET ");
        let mut any = false;

        macro_rules! push_field {
            ($field:expr, $column:literal) => {
                if let Some(value) = &$field {
                    if any {
                        qb.push(", ");
                    }
                    qb.push(concat!($column, " = ")).push_bind(value);
                    any = true;
                }
            };
        }

        push_field!(update.title, "title");
        push_field!(update.authors_json, "authors");
        push_field!(update.abstract_text, "abstract");
        push_field!(update.keywords_json, "keywords");
        push_field!(update.category, "category");
        push_field!(update.status, "status");
        push_field!(update.doi, "doi");
        push_field!(update.peer_review_id, "peer_review_id");
        push_field!(update.review_comments, "review_comments");
        push_field!(update.preprint_server, "preprint_server");
        push_field!(update.published_at, "published_at");
        push_field!(update.submitted_at, "submitted_at");

        let now = now_timestamp();
        if any {
            qb.push(", ");
        }
        qb.push("updated_at = ").push_bind(now.clone());
        qb.push(", last_modified = ").push_bind(now);
        qb.push(" WHERE id = ").push_bind(id);

        let result = qb.build().execute(&self.pool).await?;
        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.find(id).await
    }

    pub async fn delete(&self, id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM publications WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // ------------------------------------------------------------------
    // Dataset links
    // ------------------------------------------------------------------

    pub async fn linked_datasets(
        &self,
        publication_id: i64,
    ) -> Result<Vec<LinkedDataset>, sqlx::Error> {
        sqlx::query_as::<_, LinkedDataset>(
            "SELECT d.id, d.name, d.description, d.category, d.privacy_level, d.owner_id,
                    pd.relationship_type,
                    pd.description as relationship_description,
                    pd.created_at as linked_at
             FROM publication_datasets pd
             JOIN datasets d ON pd.dataset_id = d.id
             WHERE pd.publication_id = ?
             ORDER BY pd.created_at DESC",
        )
        .bind(publication_id)
        .fetch_all(&self.pool)
        .await
    }

    pub async fn linked_publications(
        &self,
        dataset_id: i64,
    ) -> Result<Vec<LinkedPublication>, sqlx::Error> {
        sqlx::query_as::<_, LinkedPublication>(
            "SELECT p.*, pd.relationship_type,
                    pd.description as relationship_description,
                    pd.created_at as linked_at
             FROM publication_datasets pd
             JOIN publications p ON pd.publication_id = p.id
             WHERE pd.dataset_id = ?
             ORDER BY pd.created_at DESC",
        )
        .bind(dataset_id)
        .fetch_all(&self.pool)
        .await
    }

    /// Link a paper and a dataset; re-linking an existing pair replaces
    /// the relationship metadata.
    pub async fn link_dataset(
        &self,
        publication_id: i64,
        dataset_id: i64,
        relationship_type: &str,
        description: Option<&str>,
    ) -> Result<i64, sqlx::Error> {
        let result = sqlx::query(
            "INSERT OR REPLACE INTO publication_datasets
                (publication_id, dataset_id, relationship_type, description)
             VALUES (?, ?, ?, ?)",
        )
        .bind(publication_id)
        .bind(dataset_id)
        .bind(relationship_type)
        .bind(description)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn unlink_dataset(
        &self,
        publication_id: i64,
        dataset_id: i64,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM publication_datasets WHERE publication_id = ? AND dataset_id = ?",
        )
        .bind(publication_id)
        .bind(dataset_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Datasets a user owns that are not yet linked to the given paper
    pub async fn available_datasets(
        &self,
        owner_id: i64,
        exclude_publication: Option<i64>,
    ) -> Result<Vec<AvailableDataset>, sqlx::Error> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT id, name, description, category, created_at
             FROM datasets WHERE owner_id = ",
        );
        qb.push_bind(owner_id);

        if let Some(publication_id) = exclude_publication {
            qb.push(
                " AND id NOT IN (
                    SELECT dataset_id FROM publication_datasets WHERE publication_id = ",
            );
            qb.push_bind(publication_id);
            qb.push(")");
        }

        qb.push(" ORDER BY created_at DESC");
        qb.build_query_as::<AvailableDataset>().fetch_all(&self.pool).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::dataset_repository::{DatasetRepository, NewDataset};
    use crate::database::{migrations, UserRepository};

    async fn seeded() -> (SqlitePool, i64) {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        migrations::run(&pool).await.unwrap();
        let users = UserRepository::new(pool.clone());
        let (user, _) = users
            .login_or_create("0x9999999999999999999999999999999999999999")
            .await
            .unwrap();
        (pool, user.id)
    }

    fn paper(author_id: i64, status: &str) -> NewPublication {
        NewPublication {
            title: "Open Data in Practice".into(),
            authors_json: r#"["B. Author"]"#.into(),
            keywords_json: "[]".into(),
            status: status.into(),
            author_id,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn explore_shows_only_published_and_preprint() {
        let (pool, author_id) = seeded().await;
        let repo = PublicationRepository::new(pool);

        repo.create(&paper(author_id, "Draft")).await.unwrap();
        repo.create(&paper(author_id, "Published")).await.unwrap();
        repo.create(&paper(author_id, "Preprint")).await.unwrap();

        let public = repo.explore_public(20, 0).await.unwrap();
        assert_eq!(public.len(), 2);
        assert!(public
            .iter()
            .all(|p| p.publication.status == "Published" || p.publication.status == "Preprint"));

        let mine = repo.list_for_author(author_id).await.unwrap();
        assert_eq!(mine.len(), 3);
    }

    #[tokio::test]
    async fn update_refreshes_last_modified() {
        let (pool, author_id) = seeded().await;
        let repo = PublicationRepository::new(pool);

        let created = repo.create(&paper(author_id, "Draft")).await.unwrap();
        let updated = repo
            .update(
                created.publication.id,
                &PublicationUpdate {
                    status: Some("Published".into()),
                    doi: Some("10.1234/example".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .unwrap();

        assert_eq!(updated.publication.status, "Published");
        assert_eq!(updated.publication.doi.as_deref(), Some("10.1234/example"));
        assert!(updated.publication.last_modified.is_some());

        assert!(repo
            .update(999_999, &PublicationUpdate::default())
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn link_is_unique_per_pair() {
        let (pool, author_id) = seeded().await;
        let repo = PublicationRepository::new(pool.clone());
        let datasets = DatasetRepository::new(pool);

        let publication = repo.create(&paper(author_id, "Published")).await.unwrap();
        let dataset_id = datasets
            .create_draft(&NewDataset {
                name: "measurements".into(),
                description: None,
                owner_id: author_id,
                project_id: None,
                external_link: None,
                privacy_level: "public".into(),
                category: "Physics".into(),
                tags_json: "[]".into(),
                status: "ready".into(),
            })
            .await
            .unwrap();

        repo.link_dataset(publication.publication.id, dataset_id, "used", None)
            .await
            .unwrap();
        repo.link_dataset(publication.publication.id, dataset_id, "derived", Some("reprocessed"))
            .await
            .unwrap();

        let linked = repo.linked_datasets(publication.publication.id).await.unwrap();
        assert_eq!(linked.len(), 1);
        assert_eq!(linked[0].relationship_type, "derived");

        // Linked datasets drop out of the available list
        let available = repo
            .available_datasets(author_id, Some(publication.publication.id))
            .await
            .unwrap();
        assert!(available.is_empty());

        assert!(repo
            .unlink_dataset(publication.publication.id, dataset_id)
            .await
            .unwrap());
    }
}
