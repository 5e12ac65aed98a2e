//! Environment-driven configuration for the server binary.

/// Server configuration, read once at startup
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// SQLite database URL, e.g. `sqlite://descihub.db`
    pub database_url: String,
    pub port: u16,
    /// Directory uploaded files are written to and served from
    pub uploads_dir: String,
    /// Base URL of the off-chain sync service proxied under /api/chain
    pub chain_api_base_url: String,
    /// Frontend URL the ORCID callback redirects back to
    pub frontend_url: String,
    pub orcid: OrcidConfig,
}

/// ORCID OAuth settings; verification is skipped when unset
#[derive(Debug, Clone)]
pub struct OrcidConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub redirect_uri: Option<String>,
    pub authorize_url: String,
    pub token_url: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://descihub.db".to_string()),
            port: std::env::var("PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(3000),
            uploads_dir: std::env::var("UPLOADS_DIR").unwrap_or_else(|_| "uploads".to_string()),
            chain_api_base_url: std::env::var("CHAIN_API_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:8545".to_string()),
            frontend_url: std::env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:5173".to_string()),
            orcid: OrcidConfig {
                client_id: std::env::var("ORCID_CLIENT_ID").ok(),
                client_secret: std::env::var("ORCID_CLIENT_SECRET").ok(),
                redirect_uri: std::env::var("ORCID_REDIRECT_URI").ok(),
                ..OrcidConfig::default()
            },
        }
    }
}

impl Default for OrcidConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            redirect_uri: None,
            authorize_url: "https://sandbox.orcid.org/oauth/authorize".to_string(),
            token_url: "https://sandbox.orcid.org/oauth/token".to_string(),
        }
    }
}

impl AppConfig {
    /// Chain API base with any trailing slashes stripped
    pub fn chain_api_base(&self) -> &str {
        self.chain_api_base_url.trim_end_matches('/')
    }
}
