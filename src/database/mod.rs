//! Database connection and management module
//!
//! Connection pooling, migrations, and the per-domain repositories the
//! API layer talks to.

use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::{info, warn};

pub mod migrations;

pub mod activity_log_repository;
pub mod dataset_repository;
pub mod influence_repository;
pub mod kanban_repository;
pub mod like_repository;
pub mod nft_repository;
pub mod project_repository;
pub mod publication_repository;
pub mod review_repository;
pub mod user_repository;

pub use activity_log_repository::ActivityLogRepository;
pub use dataset_repository::DatasetRepository;
pub use influence_repository::InfluenceRepository;
pub use kanban_repository::KanbanRepository;
pub use like_repository::LikeRepository;
pub use nft_repository::NftRepository;
pub use project_repository::ProjectRepository;
pub use publication_repository::PublicationRepository;
pub use review_repository::ReviewRepository;
pub use user_repository::UserRepository;

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub connection_timeout: Duration,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://descihub.db".to_string()),
            max_connections: std::env::var("DATABASE_POOL_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(5),
            connection_timeout: Duration::from_secs(30),
        }
    }
}

/// Database connection manager
pub struct DatabaseManager {
    pool: SqlitePool,
}

impl DatabaseManager {
    /// Create a new database manager with the given configuration
    pub async fn new(config: DatabaseConfig) -> Result<Self, sqlx::Error> {
        info!("Connecting to database: {}", config.database_url);

        let options: SqliteConnectOptions = config
            .database_url
            .parse::<SqliteConnectOptions>()?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.connection_timeout)
            .connect_with(options)
            .await
            .map_err(|e| {
                warn!("Failed to connect to database: {}", e);
                e
            })?;

        info!("Database connection pool created successfully");

        Ok(Self { pool })
    }

    /// Create a new database manager with default configuration
    pub async fn with_default_config() -> Result<Self, sqlx::Error> {
        Self::new(DatabaseConfig::default()).await
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Test database connectivity
    pub async fn test_connection(&self) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map(|_| ())
    }

    /// Apply any pending schema migrations
    pub async fn run_migrations(&self) -> Result<(), sqlx::Error> {
        migrations::run(&self.pool).await
    }

    /// Close the database connection pool
    pub async fn close(self) {
        info!("Closing database connection pool");
        self.pool.close().await;
    }
}

/// Current timestamp in the `YYYY-MM-DD HH:MM:SS` form SQLite's
/// `CURRENT_TIMESTAMP` produces, so application-written and
/// default-written timestamps compare consistently.
pub fn now_timestamp() -> String {
    chrono::Utc::now().format("%Y-%m-%d %H:%M:%S").to_string()
}
