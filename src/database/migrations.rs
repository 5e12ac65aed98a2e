//! Versioned schema migrations.
//!
//! Each migration is an ordered list of statements applied at most once;
//! applied versions are recorded in `schema_migrations`. Running the
//! migrator against an up-to-date database is a no-op.

use sqlx::SqlitePool;
use tracing::info;

struct Migration {
    version: i64,
    name: &'static str,
    statements: &'static [&'static str],
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "users",
        statements: &["CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            wallet_address TEXT NOT NULL UNIQUE,
            did TEXT UNIQUE,
            username TEXT,
            email TEXT,
            github_username TEXT,
            organization TEXT,
            research_interests TEXT,
            personal_website TEXT,
            orcid_id TEXT,
            is_academically_verified BOOLEAN DEFAULT 0,
            created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
        )"],
    },
    Migration {
        version: 2,
        name: "projects",
        statements: &["CREATE TABLE IF NOT EXISTS projects (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            description TEXT,
            visibility TEXT DEFAULT 'Private',
            status TEXT DEFAULT 'Unknown',
            category TEXT DEFAULT 'Other',
            start_date TEXT,
            owner_id INTEGER NOT NULL,
            like_count INTEGER DEFAULT 0,
            created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
            FOREIGN KEY (owner_id) REFERENCES users (id)
        )"],
    },
    Migration {
        version: 3,
        name: "project_collaborators",
        statements: &["CREATE TABLE IF NOT EXISTS project_collaborators (
            project_id INTEGER NOT NULL,
            user_id INTEGER NOT NULL,
            role TEXT NOT NULL DEFAULT 'viewer',
            added_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
            PRIMARY KEY (project_id, user_id),
            FOREIGN KEY (project_id) REFERENCES projects (id),
            FOREIGN KEY (user_id) REFERENCES users (id)
        )"],
    },
    Migration {
        version: 4,
        name: "iterations_and_kanban",
        statements: &[
            "CREATE TABLE IF NOT EXISTS iterations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                project_id INTEGER NOT NULL,
                name TEXT NOT NULL,
                start_date DATE,
                end_date DATE,
                is_current BOOLEAN DEFAULT 0,
                created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (project_id) REFERENCES projects (id)
            )",
            "CREATE TABLE IF NOT EXISTS kanban_columns (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                iteration_id INTEGER NOT NULL,
                title TEXT NOT NULL,
                position INTEGER NOT NULL,
                created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (iteration_id) REFERENCES iterations (id)
            )",
            "CREATE TABLE IF NOT EXISTS kanban_cards (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                column_id INTEGER NOT NULL,
                content TEXT NOT NULL,
                position INTEGER NOT NULL,
                creator_id INTEGER NOT NULL,
                created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (column_id) REFERENCES kanban_columns (id),
                FOREIGN KEY (creator_id) REFERENCES users (id)
            )",
        ],
    },
    Migration {
        version: 5,
        name: "project_files",
        statements: &["CREATE TABLE IF NOT EXISTS project_files (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            project_id INTEGER NOT NULL,
            parent_id INTEGER,
            uploader_id INTEGER NOT NULL,
            file_name TEXT NOT NULL,
            file_path TEXT,
            file_size INTEGER,
            file_type TEXT NOT NULL,
            description TEXT,
            uploaded_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
            FOREIGN KEY (project_id) REFERENCES projects (id),
            FOREIGN KEY (uploader_id) REFERENCES users (id),
            FOREIGN KEY (parent_id) REFERENCES project_files (id)
        )"],
    },
    Migration {
        version: 6,
        name: "proofs_and_milestones",
        statements: &[
            "CREATE TABLE IF NOT EXISTS proofs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                project_id INTEGER NOT NULL,
                title TEXT NOT NULL,
                description TEXT,
                proof_data TEXT,
                creator_id INTEGER NOT NULL,
                created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (project_id) REFERENCES projects (id),
                FOREIGN KEY (creator_id) REFERENCES users (id)
            )",
            "CREATE TABLE IF NOT EXISTS milestones (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                project_id INTEGER NOT NULL,
                title TEXT NOT NULL,
                description TEXT,
                type TEXT NOT NULL DEFAULT 'milestone',
                date TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'planned',
                creator_id INTEGER NOT NULL,
                created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (project_id) REFERENCES projects (id),
                FOREIGN KEY (creator_id) REFERENCES users (id)
            )",
        ],
    },
    Migration {
        version: 7,
        name: "nfts_and_marketplace",
        statements: &[
            "CREATE TABLE IF NOT EXISTS nfts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                project_id INTEGER NOT NULL,
                token_id TEXT,
                contract_address TEXT,
                metadata_uri TEXT,
                owner_id INTEGER NOT NULL,
                asset_type TEXT DEFAULT 'Project',
                created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (owner_id) REFERENCES users (id)
            )",
            "CREATE TABLE IF NOT EXISTS nft_marketplace (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                nft_id INTEGER NOT NULL,
                seller_id INTEGER NOT NULL,
                buyer_id INTEGER,
                price REAL NOT NULL DEFAULT 0,
                currency TEXT DEFAULT 'ETH',
                status TEXT NOT NULL DEFAULT 'for_sale',
                sale_date TIMESTAMP,
                created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (nft_id) REFERENCES nfts (id),
                FOREIGN KEY (seller_id) REFERENCES users (id),
                FOREIGN KEY (buyer_id) REFERENCES users (id)
            )",
        ],
    },
    Migration {
        version: 8,
        name: "datasets",
        statements: &[
            "CREATE TABLE IF NOT EXISTS datasets (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                description TEXT,
                owner_id INTEGER NOT NULL,
                project_id INTEGER,
                privacy_level TEXT NOT NULL DEFAULT 'public',
                file_path TEXT,
                file_name TEXT,
                file_size INTEGER,
                file_type TEXT,
                category TEXT DEFAULT 'Other',
                tags TEXT,
                access_count INTEGER DEFAULT 0,
                download_count INTEGER DEFAULT 0,
                like_count INTEGER DEFAULT 0,
                status TEXT NOT NULL DEFAULT 'processing',
                is_encrypted BOOLEAN DEFAULT FALSE,
                encryption_key_hash TEXT,
                encryption_status TEXT,
                encryption_metadata TEXT,
                external_link TEXT,
                total_files INTEGER DEFAULT 1,
                total_size INTEGER DEFAULT 0,
                zk_proof_id INTEGER,
                created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (owner_id) REFERENCES users (id),
                FOREIGN KEY (project_id) REFERENCES projects (id)
            )",
            "CREATE TABLE IF NOT EXISTS dataset_files (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                dataset_id INTEGER NOT NULL,
                file_name TEXT NOT NULL,
                original_name TEXT NOT NULL,
                file_path TEXT NOT NULL,
                file_size INTEGER NOT NULL,
                file_type TEXT,
                mime_type TEXT,
                file_order INTEGER DEFAULT 0,
                is_primary BOOLEAN DEFAULT FALSE,
                created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (dataset_id) REFERENCES datasets (id) ON DELETE CASCADE
            )",
            "CREATE TABLE IF NOT EXISTS dataset_permissions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                dataset_id INTEGER NOT NULL,
                user_id INTEGER,
                wallet_address TEXT,
                permission_type TEXT NOT NULL DEFAULT 'read',
                access_conditions TEXT,
                granted_by INTEGER NOT NULL,
                expires_at TIMESTAMP,
                created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (dataset_id) REFERENCES datasets (id),
                FOREIGN KEY (user_id) REFERENCES users (id),
                FOREIGN KEY (granted_by) REFERENCES users (id)
            )",
            "CREATE TABLE IF NOT EXISTS zk_proofs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                dataset_id INTEGER NOT NULL,
                creator_id INTEGER NOT NULL,
                proof_type TEXT NOT NULL DEFAULT 'privacy',
                proof_data TEXT NOT NULL,
                verification_key TEXT,
                public_inputs TEXT,
                circuit_hash TEXT,
                status TEXT NOT NULL DEFAULT 'pending',
                verification_count INTEGER DEFAULT 0,
                created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
                verified_at TIMESTAMP,
                FOREIGN KEY (dataset_id) REFERENCES datasets (id),
                FOREIGN KEY (creator_id) REFERENCES users (id)
            )",
            "CREATE TABLE IF NOT EXISTS dataset_usage (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                dataset_id INTEGER NOT NULL,
                user_id INTEGER,
                wallet_address TEXT,
                action_type TEXT NOT NULL,
                query_hash TEXT,
                ip_address TEXT,
                user_agent TEXT,
                metadata TEXT,
                created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (dataset_id) REFERENCES datasets (id),
                FOREIGN KEY (user_id) REFERENCES users (id)
            )",
        ],
    },
    Migration {
        version: 9,
        name: "reviews_and_citations",
        statements: &[
            "CREATE TABLE IF NOT EXISTS reviews (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                paper_title TEXT NOT NULL,
                authors TEXT NOT NULL,
                abstract TEXT,
                keywords TEXT,
                category TEXT,
                journal TEXT,
                status TEXT NOT NULL DEFAULT 'Pending',
                urgency TEXT NOT NULL DEFAULT 'Medium',
                reviewer_id INTEGER NOT NULL,
                assigned_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
                deadline TIMESTAMP,
                estimated_hours INTEGER DEFAULT 8,
                review_id TEXT UNIQUE,
                progress INTEGER DEFAULT 0,
                started_at TIMESTAMP,
                completed_at TIMESTAMP,
                submitted_at TIMESTAMP,
                rating REAL,
                review_content TEXT,
                revision_requested BOOLEAN DEFAULT FALSE,
                created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (reviewer_id) REFERENCES users (id)
            )",
            "CREATE TABLE IF NOT EXISTS citations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                citing_paper_title TEXT NOT NULL,
                citing_authors TEXT,
                cited_paper_title TEXT NOT NULL,
                cited_authors TEXT,
                citation_context TEXT,
                citation_type TEXT DEFAULT 'reference',
                user_id INTEGER,
                publication_id INTEGER,
                created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (user_id) REFERENCES users (id),
                FOREIGN KEY (publication_id) REFERENCES publications (id)
            )",
        ],
    },
    Migration {
        version: 10,
        name: "publications",
        statements: &[
            "CREATE TABLE IF NOT EXISTS publications (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                authors TEXT NOT NULL,
                abstract TEXT,
                keywords TEXT,
                category TEXT,
                status TEXT NOT NULL DEFAULT 'Draft',
                author_id INTEGER NOT NULL,
                created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
                published_at TIMESTAMP,
                submitted_at TIMESTAMP,
                last_modified TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
                doi TEXT,
                citation_count INTEGER DEFAULT 0,
                download_count INTEGER DEFAULT 0,
                views INTEGER DEFAULT 0,
                shares INTEGER DEFAULT 0,
                like_count INTEGER DEFAULT 0,
                review_deadline TIMESTAMP,
                peer_review_id TEXT,
                review_comments TEXT,
                preprint_server TEXT,
                is_imported BOOLEAN DEFAULT FALSE,
                original_url TEXT,
                publisher TEXT,
                volume TEXT,
                impact_factor REAL,
                import_notes TEXT,
                pdf_path TEXT,
                pdf_file_name TEXT,
                pdf_file_size INTEGER,
                pdf_mime_type TEXT,
                updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (author_id) REFERENCES users (id)
            )",
            "CREATE TABLE IF NOT EXISTS publication_datasets (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                publication_id INTEGER NOT NULL,
                dataset_id INTEGER NOT NULL,
                relationship_type TEXT DEFAULT 'used',
                description TEXT,
                created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
                UNIQUE (publication_id, dataset_id),
                FOREIGN KEY (publication_id) REFERENCES publications (id),
                FOREIGN KEY (dataset_id) REFERENCES datasets (id)
            )",
        ],
    },
    Migration {
        version: 11,
        name: "likes",
        statements: &["CREATE TABLE IF NOT EXISTS likes (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL,
            target_type TEXT NOT NULL,
            target_id INTEGER NOT NULL,
            created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
            UNIQUE (user_id, target_type, target_id),
            FOREIGN KEY (user_id) REFERENCES users (id)
        )"],
    },
    Migration {
        version: 12,
        name: "activity_logs",
        statements: &["CREATE TABLE IF NOT EXISTS activity_logs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER,
            username TEXT,
            wallet_address TEXT,
            action_type TEXT NOT NULL,
            resource_type TEXT NOT NULL,
            resource_id INTEGER,
            resource_name TEXT,
            action_description TEXT NOT NULL,
            metadata TEXT,
            ip_address TEXT,
            user_agent TEXT,
            timestamp TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
            severity TEXT NOT NULL DEFAULT 'info',
            FOREIGN KEY (user_id) REFERENCES users (id)
        )"],
    },
];

/// Apply all pending migrations in order
pub async fn run(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
        )",
    )
    .execute(pool)
    .await?;

    for migration in MIGRATIONS {
        let applied: Option<i64> =
            sqlx::query_scalar("SELECT version FROM schema_migrations WHERE version = ?")
                .bind(migration.version)
                .fetch_optional(pool)
                .await?;
        if applied.is_some() {
            continue;
        }

        let mut tx = pool.begin().await?;
        for statement in migration.statements {
            sqlx::query(statement).execute(&mut *tx).await?;
        }
        sqlx::query("INSERT INTO schema_migrations (version, name) VALUES (?, ?)")
            .bind(migration.version)
            .bind(migration.name)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        info!(version = migration.version, name = migration.name, "applied migration");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn memory_pool() -> SqlitePool {
        SqlitePool::connect("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn migrations_run_and_are_idempotent() {
        let pool = memory_pool().await;
        run(&pool).await.unwrap();
        // Second run must be a no-op
        run(&pool).await.unwrap();

        let applied: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM schema_migrations")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(applied as usize, MIGRATIONS.len());

        // Spot-check a few tables exist
        for table in ["users", "projects", "likes", "activity_logs", "zk_proofs"] {
            let count: i64 = sqlx::query_scalar(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?",
            )
            .bind(table)
            .fetch_one(&pool)
            .await
            .unwrap();
            assert_eq!(count, 1, "missing table {table}");
        }
    }

    #[tokio::test]
    async fn versions_are_strictly_increasing() {
        let pool = memory_pool().await;
        run(&pool).await.unwrap();
        let mut last = 0;
        for m in MIGRATIONS {
            assert!(m.version > last, "migration versions must increase");
            last = m.version;
        }
    }
}
