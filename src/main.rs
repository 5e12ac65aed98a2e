use std::sync::Arc;

use tracing::info;

use descihub::activity::ActivityLogger;
use descihub::api::{self, AppState};
use descihub::chain::MockChainClient;
use descihub::config::AppConfig;
use descihub::database::{DatabaseConfig, DatabaseManager};
use descihub::storage::UploadStore;
use descihub::zk::MockProofVerifier;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "descihub=info,tower_http=info".into()),
        )
        .init();

    dotenvy::dotenv().ok();

    let config = AppConfig::default();

    let database = DatabaseManager::new(DatabaseConfig {
        database_url: config.database_url.clone(),
        ..DatabaseConfig::default()
    })
    .await?;
    database.run_migrations().await?;
    let pool = database.pool().clone();

    let uploads = UploadStore::open(&config.uploads_dir).await?;

    let state = AppState {
        pool: pool.clone(),
        chain: Arc::new(MockChainClient),
        verifier: Arc::new(MockProofVerifier),
        activity: ActivityLogger::new(pool),
        http: reqwest::Client::new(),
        uploads,
        config,
    };

    let port = state.config.port;
    let app = api::router(state);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    info!("Backend server listening at http://localhost:{port}");
    axum::serve(listener, app).await?;

    Ok(())
}
