//! Activity log query repository
//!
//! Writes go through `crate::activity::ActivityLogger`; this repository
//! covers the admin-facing read side: filtered pagination, statistics,
//! cleanup and export.

use serde::Serialize;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct LogRow {
    pub id: i64,
    pub user_id: Option<i64>,
    pub username: Option<String>,
    pub wallet_address: Option<String>,
    pub action_type: String,
    pub resource_type: String,
    pub resource_id: Option<i64>,
    pub resource_name: Option<String>,
    pub action_description: String,
    pub metadata: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub timestamp: String,
    pub severity: String,
}

/// Filters accepted by the paginated log listing
#[derive(Debug, Clone, Default)]
pub struct LogFilter {
    pub severity: Option<String>,
    pub action_type: Option<String>,
    pub resource_type: Option<String>,
    pub user_id: Option<i64>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub search: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Pagination {
    pub page: i64,
    pub limit: i64,
    pub total: i64,
    #[serde(rename = "totalPages")]
    pub total_pages: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct LogPage {
    pub logs: Vec<LogRow>,
    pub pagination: Pagination,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct SeverityCount {
    pub severity: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ActionCount {
    pub action_type: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ResourceCount {
    pub resource_type: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct HourlyCount {
    pub hour: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ActiveUser {
    pub username: String,
    pub activity_count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct LogStats {
    #[serde(rename = "timeRange")]
    pub time_range: String,
    #[serde(rename = "severityStats")]
    pub severity_stats: Vec<SeverityCount>,
    #[serde(rename = "actionStats")]
    pub action_stats: Vec<ActionCount>,
    #[serde(rename = "resourceStats")]
    pub resource_stats: Vec<ResourceCount>,
    #[serde(rename = "hourlyActivity")]
    pub hourly_activity: Vec<HourlyCount>,
    #[serde(rename = "activeUsers")]
    pub active_users: Vec<ActiveUser>,
}

/// Slimmer row for the critical-log feed
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct CriticalLog {
    pub id: i64,
    pub user_id: Option<i64>,
    pub username: Option<String>,
    pub action_type: String,
    pub resource_type: String,
    pub resource_name: Option<String>,
    pub action_description: String,
    pub timestamp: String,
    pub severity: String,
}

/// Export row, shared by the CSV and JSON formats
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ExportRow {
    pub timestamp: String,
    pub username: Option<String>,
    pub action_type: String,
    pub resource_type: String,
    pub resource_name: Option<String>,
    pub action_description: String,
    pub severity: String,
    pub ip_address: Option<String>,
}

fn time_condition(range: &str) -> &'static str {
    match range {
        "1h" => "timestamp >= datetime('now', '-1 hour')",
        "7d" => "timestamp >= datetime('now', '-7 days')",
        "30d" => "timestamp >= datetime('now', '-30 days')",
        _ => "timestamp >= datetime('now', '-1 day')",
    }
}

fn cleanup_condition(older_than: &str) -> &'static str {
    match older_than {
        "7d" => "timestamp < datetime('now', '-7 days')",
        "90d" => "timestamp < datetime('now', '-90 days')",
        "1y" => "timestamp < datetime('now', '-1 year')",
        _ => "timestamp < datetime('now', '-30 days')",
    }
}

// ============================================================================
// Repository
// ============================================================================

pub struct ActivityLogRepository {
    pool: SqlitePool,
}

impl ActivityLogRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn push_filter(qb: &mut QueryBuilder<'_, Sqlite>, filter: &LogFilter) {
        let mut first = true;
        let mut sep = |qb: &mut QueryBuilder<'_, Sqlite>| {
            qb.push(if first { " WHERE " } else { " AND " });
            first = false;
        };

        if let Some(severity) = &filter.severity {
            sep(qb);
            qb.push("severity = ").push_bind(severity.clone());
        }
        if let Some(action_type) = &filter.action_type {
            sep(qb);
            qb.push("action_type = ").push_bind(action_type.clone());
        }
        if let Some(resource_type) = &filter.resource_type {
            sep(qb);
            qb.push("resource_type = ").push_bind(resource_type.clone());
        }
        if let Some(user_id) = filter.user_id {
            sep(qb);
            qb.push("user_id = ").push_bind(user_id);
        }
        if let Some(start_date) = &filter.start_date {
            sep(qb);
            qb.push("timestamp >= ").push_bind(start_date.clone());
        }
        if let Some(end_date) = &filter.end_date {
            sep(qb);
            qb.push("timestamp <= ").push_bind(end_date.clone());
        }
        if let Some(search) = &filter.search {
            let pattern = format!("%{search}%");
            sep(qb);
            qb.push("(action_description LIKE ")
                .push_bind(pattern.clone())
                .push(" OR resource_name LIKE ")
                .push_bind(pattern.clone())
                .push(" OR username LIKE ")
                .push_bind(pattern)
                .push(")");
        }
    }

    /// Filtered page of logs, newest first, with a total for the pager
    pub async fn list(
        &self,
        filter: &LogFilter,
        page: i64,
        limit: i64,
    ) -> Result<LogPage, sqlx::Error> {
        let mut count_qb: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT COUNT(*) FROM activity_logs");
        Self::push_filter(&mut count_qb, filter);
        let total: i64 = count_qb.build_query_scalar().fetch_one(&self.pool).await?;

        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT * FROM activity_logs");
        Self::push_filter(&mut qb, filter);
        qb.push(" ORDER BY timestamp DESC LIMIT ")
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind((page - 1) * limit);
        let logs = qb.build_query_as::<LogRow>().fetch_all(&self.pool).await?;

        Ok(LogPage {
            logs,
            pagination: Pagination {
                page,
                limit,
                total,
                total_pages: (total + limit - 1) / limit,
            },
        })
    }

    /// Aggregate counts over the selected time range
    pub async fn stats(&self, time_range: &str) -> Result<LogStats, sqlx::Error> {
        let condition = time_condition(time_range);

        let severity_stats = sqlx::query_as::<_, SeverityCount>(&format!(
            "SELECT severity, COUNT(*) as count FROM activity_logs
             WHERE {condition} GROUP BY severity"
        ))
        .fetch_all(&self.pool)
        .await?;

        let action_stats = sqlx::query_as::<_, ActionCount>(&format!(
            "SELECT action_type, COUNT(*) as count FROM activity_logs
             WHERE {condition} GROUP BY action_type ORDER BY count DESC LIMIT 10"
        ))
        .fetch_all(&self.pool)
        .await?;

        let resource_stats = sqlx::query_as::<_, ResourceCount>(&format!(
            "SELECT resource_type, COUNT(*) as count FROM activity_logs
             WHERE {condition} GROUP BY resource_type ORDER BY count DESC"
        ))
        .fetch_all(&self.pool)
        .await?;

        let hourly_activity = sqlx::query_as::<_, HourlyCount>(
            "SELECT strftime('%H', timestamp) as hour, COUNT(*) as count
             FROM activity_logs
             WHERE timestamp >= datetime('now', '-24 hours')
             GROUP BY strftime('%H', timestamp)
             ORDER BY hour",
        )
        .fetch_all(&self.pool)
        .await?;

        let active_users = sqlx::query_as::<_, ActiveUser>(&format!(
            "SELECT username, COUNT(*) as activity_count FROM activity_logs
             WHERE {condition} AND username IS NOT NULL
             GROUP BY username ORDER BY activity_count DESC LIMIT 10"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(LogStats {
            time_range: time_range.to_string(),
            severity_stats,
            action_stats,
            resource_stats,
            hourly_activity,
            active_users,
        })
    }

    pub async fn critical(&self, limit: i64) -> Result<Vec<CriticalLog>, sqlx::Error> {
        sqlx::query_as::<_, CriticalLog>(
            "SELECT id, user_id, username, action_type, resource_type, resource_name,
                    action_description, timestamp, severity
             FROM activity_logs
             WHERE severity IN ('error', 'warning')
             ORDER BY timestamp DESC
             LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
    }

    /// Remove logs older than the retention window; returns rows deleted
    pub async fn cleanup(&self, older_than: &str) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(&format!(
            "DELETE FROM activity_logs WHERE {}",
            cleanup_condition(older_than)
        ))
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn export(
        &self,
        start_date: Option<&str>,
        end_date: Option<&str>,
    ) -> Result<Vec<ExportRow>, sqlx::Error> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT timestamp, username, action_type, resource_type, resource_name,
                    action_description, severity, ip_address
             FROM activity_logs",
        );
        let mut any = false;
        if let Some(start_date) = start_date {
            qb.push(" WHERE timestamp >= ").push_bind(start_date.to_string());
            any = true;
        }
        if let Some(end_date) = end_date {
            qb.push(if any { " AND " } else { " WHERE " });
            qb.push("timestamp <= ").push_bind(end_date.to_string());
        }
        qb.push(" ORDER BY timestamp DESC");
        qb.build_query_as::<ExportRow>().fetch_all(&self.pool).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::{ActivityEntry, ActivityLogger, Severity};
    use crate::database::migrations;

    async fn seeded() -> SqlitePool {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        migrations::run(&pool).await.unwrap();
        let logger = ActivityLogger::new(pool.clone());

        logger
            .log(
                ActivityEntry::new("create", "project", "created project").resource(1, "alpha"),
            )
            .await;
        logger
            .log(
                ActivityEntry::new("delete", "dataset", "delete failed")
                    .severity(Severity::Error),
            )
            .await;
        logger
            .log(ActivityEntry::new("update", "project", "renamed project"))
            .await;
        pool
    }

    #[tokio::test]
    async fn pagination_envelope_counts_filtered_rows() {
        let pool = seeded().await;
        let repo = ActivityLogRepository::new(pool);

        let page = repo.list(&LogFilter::default(), 1, 2).await.unwrap();
        assert_eq!(page.pagination.total, 3);
        assert_eq!(page.pagination.total_pages, 2);
        assert_eq!(page.logs.len(), 2);

        let filtered = repo
            .list(
                &LogFilter {
                    resource_type: Some("project".into()),
                    ..Default::default()
                },
                1,
                50,
            )
            .await
            .unwrap();
        assert_eq!(filtered.pagination.total, 2);

        let searched = repo
            .list(
                &LogFilter {
                    search: Some("renamed".into()),
                    ..Default::default()
                },
                1,
                50,
            )
            .await
            .unwrap();
        assert_eq!(searched.pagination.total, 1);
    }

    #[tokio::test]
    async fn critical_feed_only_errors_and_warnings() {
        let pool = seeded().await;
        let repo = ActivityLogRepository::new(pool);

        let critical = repo.critical(20).await.unwrap();
        assert_eq!(critical.len(), 1);
        assert_eq!(critical[0].severity, "error");
    }

    #[tokio::test]
    async fn stats_group_by_severity_and_action() {
        let pool = seeded().await;
        let repo = ActivityLogRepository::new(pool);

        let stats = repo.stats("24h").await.unwrap();
        assert_eq!(stats.time_range, "24h");
        let info = stats
            .severity_stats
            .iter()
            .find(|s| s.severity == "info")
            .unwrap();
        assert_eq!(info.count, 2);
        assert!(!stats.action_stats.is_empty());
    }

    #[tokio::test]
    async fn cleanup_spares_recent_rows() {
        let pool = seeded().await;
        let repo = ActivityLogRepository::new(pool);

        let deleted = repo.cleanup("30d").await.unwrap();
        assert_eq!(deleted, 0);

        let page = repo.list(&LogFilter::default(), 1, 50).await.unwrap();
        assert_eq!(page.pagination.total, 3);
    }
}
