//! Moderation log repository
//!
//! The log is append-only. Entries are written by the other repositories
//! inside the same transaction as the change they describe, through
//! [`insert_log`].

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, SqliteConnection};
use std::sync::Arc;

use crate::db::DbPool;
use crate::models::{ContentStatus, ListParams, ModerationAction, ModerationLog, PagedResult};

/// Log entry about to be written
#[derive(Debug, Clone)]
pub struct NewLogEntry<'a> {
    pub actor_id: Option<i64>,
    pub action: ModerationAction,
    pub target_type: &'a str,
    pub target_id: i64,
    pub from_status: Option<ContentStatus>,
    pub to_status: Option<ContentStatus>,
    pub reason: Option<&'a str>,
    pub batch_id: Option<&'a str>,
    pub metadata: Option<serde_json::Value>,
}

impl<'a> NewLogEntry<'a> {
    /// Entry describing a comment status change
    pub fn comment(
        target_id: i64,
        action: ModerationAction,
        from: ContentStatus,
        to: ContentStatus,
    ) -> Self {
        Self {
            actor_id: None,
            action,
            target_type: "comment",
            target_id,
            from_status: Some(from),
            to_status: Some(to),
            reason: None,
            batch_id: None,
            metadata: None,
        }
    }

    /// Entry describing a review status change
    pub fn review(
        target_id: i64,
        action: ModerationAction,
        from: ContentStatus,
        to: ContentStatus,
    ) -> Self {
        Self {
            target_type: "review",
            ..Self::comment(target_id, action, from, to)
        }
    }
}

/// Write one log entry on an open connection or transaction
pub async fn insert_log(conn: &mut SqliteConnection, entry: &NewLogEntry<'_>) -> Result<()> {
    sqlx::query(
        r#"INSERT INTO moderation_logs
           (actor_id, action, target_type, target_id, from_status, to_status, reason, batch_id, metadata, created_at)
           VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(entry.actor_id)
    .bind(entry.action.to_string())
    .bind(entry.target_type)
    .bind(entry.target_id)
    .bind(entry.from_status.map(|s| s.to_string()))
    .bind(entry.to_status.map(|s| s.to_string()))
    .bind(entry.reason)
    .bind(entry.batch_id)
    .bind(entry.metadata.as_ref().map(|m| m.to_string()))
    .bind(Utc::now())
    .execute(conn)
    .await
    .context("Failed to write moderation log")?;
    Ok(())
}

/// Filter for listing log entries
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct LogFilter {
    pub target_type: Option<String>,
    pub target_id: Option<i64>,
    pub batch_id: Option<String>,
}

#[async_trait]
pub trait ModerationLogRepository: Send + Sync {
    async fn list(&self, filter: &LogFilter, params: &ListParams) -> Result<PagedResult<ModerationLog>>;
}

pub struct SqlxModerationLogRepository {
    pool: DbPool,
}

impl SqlxModerationLogRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DbPool) -> Arc<dyn ModerationLogRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl ModerationLogRepository for SqlxModerationLogRepository {
    async fn list(&self, filter: &LogFilter, params: &ListParams) -> Result<PagedResult<ModerationLog>> {
        // NULL parameters disable the corresponding condition
        const WHERE: &str = "(?1 IS NULL OR target_type = ?1) AND (?2 IS NULL OR target_id = ?2) AND (?3 IS NULL OR batch_id = ?3)";

        let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM moderation_logs WHERE {}", WHERE))
            .bind(&filter.target_type)
            .bind(filter.target_id)
            .bind(&filter.batch_id)
            .fetch_one(&self.pool)
            .await
            .context("Failed to count moderation logs")?;

        let rows = sqlx::query(&format!(
            "SELECT * FROM moderation_logs WHERE {} ORDER BY id DESC LIMIT ?4 OFFSET ?5",
            WHERE
        ))
        .bind(&filter.target_type)
        .bind(filter.target_id)
        .bind(&filter.batch_id)
        .bind(params.limit())
        .bind(params.offset())
        .fetch_all(&self.pool)
        .await
        .context("Failed to list moderation logs")?;

        let items = rows.iter().map(row_to_log).collect();
        Ok(PagedResult::new(items, total, params))
    }
}

fn row_to_log(row: &sqlx::sqlite::SqliteRow) -> ModerationLog {
    let action: String = row.get("action");
    let metadata: Option<String> = row.get("metadata");
    ModerationLog {
        id: row.get("id"),
        actor_id: row.get("actor_id"),
        action: action.parse().unwrap_or(ModerationAction::ManualStatus),
        target_type: row.get("target_type"),
        target_id: row.get("target_id"),
        from_status: row.get("from_status"),
        to_status: row.get("to_status"),
        reason: row.get("reason"),
        batch_id: row.get("batch_id"),
        metadata: metadata.and_then(|m| serde_json::from_str(&m).ok()),
        created_at: row.get("created_at"),
    }
}
