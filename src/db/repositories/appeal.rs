//! Appeal repository
//!
//! At most one pending appeal exists per comment; the partial unique index
//! `idx_appeals_one_pending` enforces it and a violation surfaces as
//! [`AppealInsert::Duplicate`].

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;
use std::sync::Arc;

use super::moderation_log::{insert_log, NewLogEntry};
use crate::db::DbPool;
use crate::models::{
    Appeal, AppealDecision, AppealStatus, ContentStatus, ListParams, ModerationAction, PagedResult,
};

#[derive(Debug, Clone)]
pub enum AppealInsert {
    Created(Appeal),
    /// A pending appeal already exists for the comment
    Duplicate,
}

#[derive(Debug, Clone)]
pub struct AppealResolution {
    pub appeal: Appeal,
    pub comment_author: i64,
    pub comment_change: Option<(ContentStatus, ContentStatus)>,
}

#[derive(Debug, Clone)]
pub enum AppealResolveOutcome {
    Resolved(AppealResolution),
    NotFound,
    AlreadyResolved(AppealStatus),
}

#[derive(Debug, Clone)]
pub struct AppealReview<'a> {
    pub appeal_id: i64,
    pub decision: AppealDecision,
    pub reviewer_id: i64,
    pub note: Option<&'a str>,
}

#[async_trait]
pub trait AppealRepository: Send + Sync {
    async fn create(&self, comment_id: i64, user_id: i64, reason: &str) -> Result<AppealInsert>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Appeal>>;

    /// Appeals filed by a user, newest first
    async fn list_by_user(&self, user_id: i64, params: &ListParams) -> Result<PagedResult<Appeal>>;

    /// Appeals, oldest first, optionally filtered by status
    async fn list(&self, status: Option<AppealStatus>, params: &ListParams) -> Result<PagedResult<Appeal>>;

    async fn resolve(&self, review: &AppealReview<'_>) -> Result<AppealResolveOutcome>;

    /// Expire pending appeals created before `cutoff`, stamping them
    /// resolved at `now`
    async fn expire_stale(&self, cutoff: DateTime<Utc>, now: DateTime<Utc>) -> Result<u64>;

    async fn count_pending(&self) -> Result<i64>;
}

pub struct SqlxAppealRepository {
    pool: DbPool,
}

impl SqlxAppealRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DbPool) -> Arc<dyn AppealRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl AppealRepository for SqlxAppealRepository {
    async fn create(&self, comment_id: i64, user_id: i64, reason: &str) -> Result<AppealInsert> {
        let inserted = sqlx::query(
            r#"
            INSERT INTO appeals (comment_id, user_id, reason, status, created_at)
            VALUES (?, ?, ?, 'pending', ?)
            "#,
        )
        .bind(comment_id)
        .bind(user_id)
        .bind(reason)
        .bind(Utc::now())
        .execute(&self.pool)
        .await;

        let id = match inserted {
            Ok(result) => result.last_insert_rowid(),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                return Ok(AppealInsert::Duplicate);
            }
            Err(e) => return Err(anyhow::Error::new(e).context("Failed to create appeal")),
        };

        let appeal = self
            .get_by_id(id)
            .await?
            .context("Appeal not found after creation")?;
        Ok(AppealInsert::Created(appeal))
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Appeal>> {
        let row = sqlx::query("SELECT * FROM appeals WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to get appeal by ID")?;
        Ok(row.as_ref().map(row_to_appeal))
    }

    async fn list_by_user(&self, user_id: i64, params: &ListParams) -> Result<PagedResult<Appeal>> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM appeals WHERE user_id = ?")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
            .context("Failed to count appeals")?;

        let rows = sqlx::query(
            "SELECT * FROM appeals WHERE user_id = ? ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
        )
        .bind(user_id)
        .bind(params.limit())
        .bind(params.offset())
        .fetch_all(&self.pool)
        .await
        .context("Failed to list appeals")?;

        Ok(PagedResult::new(rows.iter().map(row_to_appeal).collect(), total, params))
    }

    async fn list(&self, status: Option<AppealStatus>, params: &ListParams) -> Result<PagedResult<Appeal>> {
        let status = status.map(|s| s.to_string());

        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM appeals WHERE (?1 IS NULL OR status = ?1)")
            .bind(&status)
            .fetch_one(&self.pool)
            .await
            .context("Failed to count appeals")?;

        let rows = sqlx::query(
            r#"
            SELECT * FROM appeals
            WHERE (?1 IS NULL OR status = ?1)
            ORDER BY created_at ASC, id ASC
            LIMIT ?2 OFFSET ?3
            "#,
        )
        .bind(&status)
        .bind(params.limit())
        .bind(params.offset())
        .fetch_all(&self.pool)
        .await
        .context("Failed to list appeals")?;

        Ok(PagedResult::new(rows.iter().map(row_to_appeal).collect(), total, params))
    }

    async fn resolve(&self, review: &AppealReview<'_>) -> Result<AppealResolveOutcome> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        let row = sqlx::query(
            r#"
            SELECT a.comment_id, a.status, c.author_id, c.status AS comment_status
            FROM appeals a JOIN comments c ON c.id = a.comment_id
            WHERE a.id = ?
            "#,
        )
        .bind(review.appeal_id)
        .fetch_optional(&mut *tx)
        .await
        .context("Failed to load appeal")?;

        let Some(row) = row else {
            return Ok(AppealResolveOutcome::NotFound);
        };

        let status: String = row.get("status");
        let status: AppealStatus = status.parse().unwrap_or_default();
        if status != AppealStatus::Pending {
            return Ok(AppealResolveOutcome::AlreadyResolved(status));
        }

        let comment_id: i64 = row.get("comment_id");
        let comment_author: i64 = row.get("author_id");
        let comment_status: String = row.get("comment_status");
        let comment_status: ContentStatus = comment_status.parse().unwrap_or_default();
        let now = Utc::now();

        let (new_status, action) = match review.decision {
            AppealDecision::Grant => (AppealStatus::Granted, ModerationAction::AppealGranted),
            AppealDecision::Deny => (AppealStatus::Denied, ModerationAction::AppealDenied),
        };

        sqlx::query(
            "UPDATE appeals SET status = ?, reviewer_id = ?, reviewer_note = ?, resolved_at = ? WHERE id = ?",
        )
        .bind(new_status.to_string())
        .bind(review.reviewer_id)
        .bind(review.note)
        .bind(now)
        .bind(review.appeal_id)
        .execute(&mut *tx)
        .await
        .context("Failed to update appeal")?;

        let comment_change = match review.decision {
            AppealDecision::Grant if comment_status.is_appealable() => {
                sqlx::query("UPDATE comments SET status = 'approved', moderated_at = ?, updated_at = ? WHERE id = ?")
                    .bind(now)
                    .bind(now)
                    .bind(comment_id)
                    .execute(&mut *tx)
                    .await
                    .context("Failed to restore appealed comment")?;
                Some((comment_status, ContentStatus::Approved))
            }
            _ => None,
        };

        // Denials are logged too, with the status unchanged
        let to = comment_change.map(|(_, to)| to).unwrap_or(comment_status);
        let mut entry = NewLogEntry::comment(comment_id, action, comment_status, to);
        entry.actor_id = Some(review.reviewer_id);
        entry.reason = review.note;
        entry.metadata = Some(serde_json::json!({ "appeal_id": review.appeal_id }));
        insert_log(&mut *tx, &entry).await?;

        tx.commit().await.context("Failed to commit appeal resolution")?;

        let appeal = self
            .get_by_id(review.appeal_id)
            .await?
            .context("Appeal vanished during resolution")?;

        Ok(AppealResolveOutcome::Resolved(AppealResolution {
            appeal,
            comment_author,
            comment_change,
        }))
    }

    async fn expire_stale(&self, cutoff: DateTime<Utc>, now: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE appeals SET status = 'expired', resolved_at = ? WHERE status = 'pending' AND created_at < ?",
        )
        .bind(now)
        .bind(cutoff)
        .execute(&self.pool)
        .await
        .context("Failed to expire appeals")?;
        Ok(result.rows_affected())
    }

    async fn count_pending(&self) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM appeals WHERE status = 'pending'")
            .fetch_one(&self.pool)
            .await
            .context("Failed to count pending appeals")
    }
}

fn row_to_appeal(row: &sqlx::sqlite::SqliteRow) -> Appeal {
    let status: String = row.get("status");
    Appeal {
        id: row.get("id"),
        comment_id: row.get("comment_id"),
        user_id: row.get("user_id"),
        reason: row.get("reason"),
        status: status.parse().unwrap_or_default(),
        reviewer_id: row.get("reviewer_id"),
        reviewer_note: row.get("reviewer_note"),
        resolved_at: row.get("resolved_at"),
        created_at: row.get("created_at"),
    }
}
