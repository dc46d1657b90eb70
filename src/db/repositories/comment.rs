//! Comment repository
//!
//! Besides plain CRUD this repository owns the two write paths of the
//! moderation pipeline: single status transitions and bulk batches. Both run
//! inside one transaction together with the moderation log rows they produce.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;
use std::sync::Arc;

use super::moderation_log::{insert_log, NewLogEntry};
use crate::db::DbPool;
use crate::models::{
    BulkChange, BulkOutcome, Comment, CommentTarget, ContentStatus, CreateCommentInput,
    ListParams, ModerationAction, PagedResult, StatusTransition, TransitionOutcome,
};

/// Result of a bulk batch
#[derive(Debug, Clone)]
pub enum BulkResult {
    Committed(BulkOutcome),
    /// Nothing was written because these IDs do not exist
    Missing(Vec<i64>),
}

/// A bulk batch to apply atomically
#[derive(Debug, Clone)]
pub struct BulkRequest<'a> {
    pub ids: &'a [i64],
    pub to: ContentStatus,
    pub actor_id: i64,
    pub reason: Option<&'a str>,
    pub batch_id: &'a str,
}

#[async_trait]
pub trait CommentRepository: Send + Sync {
    async fn create(&self, author_id: i64, input: &CreateCommentInput) -> Result<Comment>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Comment>>;

    /// Approved comments of a target, oldest first
    async fn list_public(
        &self,
        target_type: CommentTarget,
        target_id: i64,
        params: &ListParams,
    ) -> Result<PagedResult<Comment>>;

    /// Comments in a given status, oldest first
    async fn list_by_status(
        &self,
        status: ContentStatus,
        params: &ListParams,
    ) -> Result<PagedResult<Comment>>;

    /// Apply a status change and its log entry in one transaction
    async fn apply_transition(&self, transition: &StatusTransition) -> Result<TransitionOutcome>;

    /// Apply one status to many comments in one transaction
    async fn bulk_transition(&self, request: &BulkRequest<'_>) -> Result<BulkResult>;

    /// Pending comments without a score created before `older_than`
    async fn list_unscored_pending(&self, older_than: DateTime<Utc>, limit: i64) -> Result<Vec<Comment>>;

    /// Approve pending comments created before `cutoff` that have no reports
    /// and score below `max_score` (or no score). Returns `(id, author_id)`.
    async fn approve_expired_pending(
        &self,
        cutoff: DateTime<Utc>,
        max_score: f64,
    ) -> Result<Vec<(i64, i64)>>;

    async fn count_by_status(&self, status: ContentStatus) -> Result<i64>;
}

pub struct SqlxCommentRepository {
    pool: DbPool,
}

impl SqlxCommentRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DbPool) -> Arc<dyn CommentRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl CommentRepository for SqlxCommentRepository {
    async fn create(&self, author_id: i64, input: &CreateCommentInput) -> Result<Comment> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO comments (author_id, target_type, target_id, parent_id, content, status, report_count, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, 'pending', 0, ?, ?)
            "#,
        )
        .bind(author_id)
        .bind(input.target_type.to_string())
        .bind(input.target_id)
        .bind(input.parent_id)
        .bind(&input.content)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .context("Failed to create comment")?;

        self.get_by_id(result.last_insert_rowid())
            .await?
            .context("Comment not found after creation")
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Comment>> {
        let row = sqlx::query("SELECT * FROM comments WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to get comment by ID")?;
        Ok(row.as_ref().map(row_to_comment))
    }

    async fn list_public(
        &self,
        target_type: CommentTarget,
        target_id: i64,
        params: &ListParams,
    ) -> Result<PagedResult<Comment>> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM comments WHERE target_type = ? AND target_id = ? AND status = 'approved'",
        )
        .bind(target_type.to_string())
        .bind(target_id)
        .fetch_one(&self.pool)
        .await
        .context("Failed to count comments")?;

        let rows = sqlx::query(
            r#"
            SELECT * FROM comments
            WHERE target_type = ? AND target_id = ? AND status = 'approved'
            ORDER BY created_at ASC, id ASC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(target_type.to_string())
        .bind(target_id)
        .bind(params.limit())
        .bind(params.offset())
        .fetch_all(&self.pool)
        .await
        .context("Failed to list comments")?;

        Ok(PagedResult::new(rows.iter().map(row_to_comment).collect(), total, params))
    }

    async fn list_by_status(
        &self,
        status: ContentStatus,
        params: &ListParams,
    ) -> Result<PagedResult<Comment>> {
        let total = self.count_by_status(status).await?;

        let rows = sqlx::query(
            "SELECT * FROM comments WHERE status = ? ORDER BY created_at ASC, id ASC LIMIT ? OFFSET ?",
        )
        .bind(status.to_string())
        .bind(params.limit())
        .bind(params.offset())
        .fetch_all(&self.pool)
        .await
        .context("Failed to list comments by status")?;

        Ok(PagedResult::new(rows.iter().map(row_to_comment).collect(), total, params))
    }

    async fn apply_transition(&self, transition: &StatusTransition) -> Result<TransitionOutcome> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        let current: Option<String> = sqlx::query_scalar("SELECT status FROM comments WHERE id = ?")
            .bind(transition.comment_id)
            .fetch_optional(&mut *tx)
            .await
            .context("Failed to read comment status")?;

        let Some(current) = current else {
            return Ok(TransitionOutcome::NotFound);
        };
        let current: ContentStatus = current.parse().unwrap_or_default();
        let now = Utc::now();

        // The score is recorded even when the status stays put
        if let Some((score, labels)) = &transition.analysis {
            sqlx::query("UPDATE comments SET toxicity_score = ?, labels = ?, updated_at = ? WHERE id = ?")
                .bind(score)
                .bind(serde_json::to_string(labels)?)
                .bind(now)
                .bind(transition.comment_id)
                .execute(&mut *tx)
                .await
                .context("Failed to store analysis")?;
        }

        let allowed = transition.allowed_from.is_empty() || transition.allowed_from.contains(&current);
        if current == transition.to || !allowed {
            tx.commit().await.context("Failed to commit transaction")?;
            return Ok(TransitionOutcome::Skipped { current });
        }

        sqlx::query("UPDATE comments SET status = ?, moderated_at = ?, updated_at = ? WHERE id = ?")
            .bind(transition.to.to_string())
            .bind(now)
            .bind(now)
            .bind(transition.comment_id)
            .execute(&mut *tx)
            .await
            .context("Failed to update comment status")?;

        let mut entry = NewLogEntry::comment(transition.comment_id, transition.action, current, transition.to);
        entry.actor_id = transition.actor_id;
        entry.reason = transition.reason.as_deref();
        entry.metadata = transition
            .analysis
            .as_ref()
            .map(|(score, labels)| serde_json::json!({ "score": score, "labels": labels }));
        insert_log(&mut *tx, &entry).await?;

        tx.commit().await.context("Failed to commit transaction")?;

        Ok(TransitionOutcome::Applied {
            from: current,
            to: transition.to,
        })
    }

    async fn bulk_transition(&self, request: &BulkRequest<'_>) -> Result<BulkResult> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        let mut found = Vec::with_capacity(request.ids.len());
        let mut missing = Vec::new();
        for &id in request.ids {
            let row = sqlx::query("SELECT author_id, status FROM comments WHERE id = ?")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await
                .context("Failed to read comment for bulk update")?;
            match row {
                Some(row) => {
                    let status: String = row.get("status");
                    found.push((id, row.get::<i64, _>("author_id"), status.parse().unwrap_or_default()));
                }
                None => missing.push(id),
            }
        }

        if !missing.is_empty() {
            return Ok(BulkResult::Missing(missing));
        }

        let now = Utc::now();
        let mut updated = Vec::new();
        let mut skipped = Vec::new();
        for (id, author_id, from) in found {
            if from == request.to {
                skipped.push(id);
                continue;
            }

            sqlx::query("UPDATE comments SET status = ?, moderated_at = ?, updated_at = ? WHERE id = ?")
                .bind(request.to.to_string())
                .bind(now)
                .bind(now)
                .bind(id)
                .execute(&mut *tx)
                .await
                .context("Failed to update comment in bulk")?;

            let mut entry = NewLogEntry::comment(id, ModerationAction::Bulk, from, request.to);
            entry.actor_id = Some(request.actor_id);
            entry.reason = request.reason;
            entry.batch_id = Some(request.batch_id);
            insert_log(&mut *tx, &entry).await?;

            updated.push(BulkChange {
                comment_id: id,
                author_id,
                from,
            });
        }

        tx.commit().await.context("Failed to commit bulk update")?;

        Ok(BulkResult::Committed(BulkOutcome {
            batch_id: request.batch_id.to_string(),
            updated,
            skipped,
        }))
    }

    async fn list_unscored_pending(&self, older_than: DateTime<Utc>, limit: i64) -> Result<Vec<Comment>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM comments
            WHERE status = 'pending' AND toxicity_score IS NULL AND created_at < ?
            ORDER BY created_at ASC
            LIMIT ?
            "#,
        )
        .bind(older_than)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list unscored comments")?;

        Ok(rows.iter().map(row_to_comment).collect())
    }

    async fn approve_expired_pending(
        &self,
        cutoff: DateTime<Utc>,
        max_score: f64,
    ) -> Result<Vec<(i64, i64)>> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        let rows = sqlx::query(
            r#"
            SELECT id, author_id FROM comments
            WHERE status = 'pending' AND created_at < ? AND report_count = 0
              AND (toxicity_score IS NULL OR toxicity_score < ?)
            "#,
        )
        .bind(cutoff)
        .bind(max_score)
        .fetch_all(&mut *tx)
        .await
        .context("Failed to select expired comments")?;

        let now = Utc::now();
        let mut approved = Vec::with_capacity(rows.len());
        for row in rows {
            let id: i64 = row.get("id");
            sqlx::query("UPDATE comments SET status = 'approved', moderated_at = ?, updated_at = ? WHERE id = ?")
                .bind(now)
                .bind(now)
                .bind(id)
                .execute(&mut *tx)
                .await
                .context("Failed to approve expired comment")?;

            let mut entry = NewLogEntry::comment(
                id,
                ModerationAction::ExpiryApprove,
                ContentStatus::Pending,
                ContentStatus::Approved,
            );
            entry.reason = Some("pending window expired");
            insert_log(&mut *tx, &entry).await?;

            approved.push((id, row.get("author_id")));
        }

        tx.commit().await.context("Failed to commit expiry approvals")?;
        Ok(approved)
    }

    async fn count_by_status(&self, status: ContentStatus) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM comments WHERE status = ?")
            .bind(status.to_string())
            .fetch_one(&self.pool)
            .await
            .context("Failed to count comments")
    }
}

pub(crate) fn row_to_comment(row: &sqlx::sqlite::SqliteRow) -> Comment {
    let target_type: String = row.get("target_type");
    let status: String = row.get("status");
    let labels: Option<String> = row.get("labels");
    Comment {
        id: row.get("id"),
        author_id: row.get("author_id"),
        target_type: target_type.parse().unwrap_or(CommentTarget::Thread),
        target_id: row.get("target_id"),
        parent_id: row.get("parent_id"),
        content: row.get("content"),
        status: status.parse().unwrap_or_default(),
        toxicity_score: row.get("toxicity_score"),
        labels: labels
            .and_then(|l| serde_json::from_str(&l).ok())
            .unwrap_or_default(),
        report_count: row.get("report_count"),
        moderated_at: row.get("moderated_at"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}
