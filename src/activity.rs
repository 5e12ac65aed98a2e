//! Best-effort activity logging.
//!
//! Every interesting mutation writes a row to `activity_logs`. Logging
//! must never fail the request that triggered it, so the logger swallows
//! database errors after reporting them through tracing.

use serde_json::Value;
use sqlx::SqlitePool;

/// Severity recorded with each activity row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Success => "success",
            Severity::Warning => "warning",
            Severity::Error => "error",
        }
    }
}

/// One activity row waiting to be written
#[derive(Debug, Clone)]
pub struct ActivityEntry {
    pub user_id: Option<i64>,
    pub username: Option<String>,
    pub wallet_address: Option<String>,
    pub action_type: String,
    pub resource_type: String,
    pub resource_id: Option<i64>,
    pub resource_name: Option<String>,
    pub action_description: String,
    pub metadata: Option<Value>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub severity: Severity,
}

impl ActivityEntry {
    pub fn new(
        action_type: impl Into<String>,
        resource_type: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            user_id: None,
            username: None,
            wallet_address: None,
            action_type: action_type.into(),
            resource_type: resource_type.into(),
            resource_id: None,
            resource_name: None,
            action_description: description.into(),
            metadata: None,
            ip_address: None,
            user_agent: None,
            severity: Severity::Info,
        }
    }

    pub fn user(mut self, user_id: i64, username: Option<String>) -> Self {
        self.user_id = Some(user_id);
        self.username = username;
        self
    }

    pub fn wallet(mut self, wallet_address: impl Into<String>) -> Self {
        self.wallet_address = Some(wallet_address.into());
        self
    }

    pub fn resource(mut self, id: i64, name: impl Into<String>) -> Self {
        self.resource_id = Some(id);
        self.resource_name = Some(name.into());
        self
    }

    pub fn metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }
}

/// Writer handle, cheap to clone into request handlers
#[derive(Clone)]
pub struct ActivityLogger {
    pool: SqlitePool,
}

impl ActivityLogger {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert the entry, degrading gracefully when it cannot be written.
    ///
    /// A referenced user that no longer exists is logged without the user
    /// reference instead of tripping the foreign key.
    pub async fn log(&self, entry: ActivityEntry) {
        let mut user_id = entry.user_id;
        if let Some(id) = user_id {
            match sqlx::query_scalar::<_, i64>("SELECT id FROM users WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await
            {
                Ok(Some(_)) => {}
                Ok(None) => {
                    tracing::warn!(user_id = id, "user not found, logging without user reference");
                    user_id = None;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "user lookup failed, logging without user reference");
                    user_id = None;
                }
            }
        }

        let metadata = entry.metadata.as_ref().map(Value::to_string);

        let result = sqlx::query(
            "INSERT INTO activity_logs (
                user_id, username, wallet_address, action_type, resource_type,
                resource_id, resource_name, action_description, metadata,
                ip_address, user_agent, severity
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(user_id)
        .bind(&entry.username)
        .bind(&entry.wallet_address)
        .bind(&entry.action_type)
        .bind(&entry.resource_type)
        .bind(entry.resource_id)
        .bind(&entry.resource_name)
        .bind(&entry.action_description)
        .bind(metadata)
        .bind(&entry.ip_address)
        .bind(&entry.user_agent)
        .bind(entry.severity.as_str())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => tracing::debug!(
                severity = entry.severity.as_str(),
                action = %entry.action_type,
                resource = %entry.resource_type,
                "{}",
                entry.action_description
            ),
            Err(e) => tracing::error!(error = %e, "failed to record activity"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults() {
        let entry = ActivityEntry::new("create", "project", "Created project \"x\"");
        assert_eq!(entry.severity, Severity::Info);
        assert!(entry.user_id.is_none());

        let entry = entry.user(7, Some("alice".into())).severity(Severity::Success);
        assert_eq!(entry.user_id, Some(7));
        assert_eq!(entry.severity.as_str(), "success");
    }
}
