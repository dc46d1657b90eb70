//! Comment report repository
//!
//! Filing a report bumps the comment's `report_count` in the same
//! transaction. Resolving a report may move the comment as well; those
//! changes are logged alongside.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;
use std::sync::Arc;

use super::moderation_log::{insert_log, NewLogEntry};
use crate::db::DbPool;
use crate::models::{
    ContentStatus, ListParams, ModerationAction, PagedResult, Report, ReportAction, ReportReason,
    ReportStatus,
};

/// Result of filing a report
#[derive(Debug, Clone)]
pub enum FileOutcome {
    Filed { report: Report, report_count: i64 },
    /// The reporter already reported this comment
    Duplicate,
    CommentMissing,
}

/// A resolved report and its side effects
#[derive(Debug, Clone)]
pub struct Resolution {
    pub report: Report,
    pub comment_author: i64,
    /// Reporters whose reports were closed by this resolution
    pub reporters: Vec<i64>,
    /// Comment status change, if any
    pub comment_change: Option<(ContentStatus, ContentStatus)>,
}

#[derive(Debug, Clone)]
pub enum ResolveOutcome {
    Resolved(Resolution),
    NotFound,
    AlreadyResolved(ReportStatus),
}

/// A moderator's decision on one report
#[derive(Debug, Clone)]
pub struct ResolveRequest<'a> {
    pub report_id: i64,
    pub action: ReportAction,
    pub moderator_id: i64,
    pub note: Option<&'a str>,
}

#[async_trait]
pub trait ReportRepository: Send + Sync {
    async fn create(
        &self,
        comment_id: i64,
        reporter_id: i64,
        reason: ReportReason,
        details: Option<&str>,
    ) -> Result<FileOutcome>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Report>>;

    /// Reports, newest first, optionally filtered by status
    async fn list(&self, status: Option<ReportStatus>, params: &ListParams) -> Result<PagedResult<Report>>;

    async fn resolve(&self, request: &ResolveRequest<'_>) -> Result<ResolveOutcome>;

    /// Archive pending reports created before `cutoff` whose comment is not
    /// awaiting review, stamping them resolved at `now`
    async fn archive_stale(&self, cutoff: DateTime<Utc>, now: DateTime<Utc>) -> Result<u64>;

    async fn count_pending(&self) -> Result<i64>;

    async fn count_upheld_by_reporter(&self, reporter_id: i64) -> Result<i64>;
}

pub struct SqlxReportRepository {
    pool: DbPool,
}

impl SqlxReportRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DbPool) -> Arc<dyn ReportRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl ReportRepository for SqlxReportRepository {
    async fn create(
        &self,
        comment_id: i64,
        reporter_id: i64,
        reason: ReportReason,
        details: Option<&str>,
    ) -> Result<FileOutcome> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM comments WHERE id = ?")
            .bind(comment_id)
            .fetch_optional(&mut *tx)
            .await
            .context("Failed to look up reported comment")?;
        if exists.is_none() {
            return Ok(FileOutcome::CommentMissing);
        }

        let inserted = sqlx::query(
            r#"
            INSERT INTO comment_reports (comment_id, reporter_id, reason, details, status, created_at)
            VALUES (?, ?, ?, ?, 'pending', ?)
            "#,
        )
        .bind(comment_id)
        .bind(reporter_id)
        .bind(reason.to_string())
        .bind(details)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await;

        let report_id = match inserted {
            Ok(result) => result.last_insert_rowid(),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                return Ok(FileOutcome::Duplicate);
            }
            Err(e) => return Err(anyhow::Error::new(e).context("Failed to create report")),
        };

        let report_count: i64 = sqlx::query_scalar(
            "UPDATE comments SET report_count = report_count + 1, updated_at = ? WHERE id = ? RETURNING report_count",
        )
        .bind(Utc::now())
        .bind(comment_id)
        .fetch_one(&mut *tx)
        .await
        .context("Failed to bump report count")?;

        tx.commit().await.context("Failed to commit report")?;

        let report = self
            .get_by_id(report_id)
            .await?
            .context("Report not found after creation")?;
        Ok(FileOutcome::Filed { report, report_count })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Report>> {
        let row = sqlx::query("SELECT * FROM comment_reports WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to get report by ID")?;
        Ok(row.as_ref().map(row_to_report))
    }

    async fn list(&self, status: Option<ReportStatus>, params: &ListParams) -> Result<PagedResult<Report>> {
        let status = status.map(|s| s.to_string());

        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM comment_reports WHERE (?1 IS NULL OR status = ?1)")
            .bind(&status)
            .fetch_one(&self.pool)
            .await
            .context("Failed to count reports")?;

        let rows = sqlx::query(
            r#"
            SELECT * FROM comment_reports
            WHERE (?1 IS NULL OR status = ?1)
            ORDER BY created_at DESC, id DESC
            LIMIT ?2 OFFSET ?3
            "#,
        )
        .bind(&status)
        .bind(params.limit())
        .bind(params.offset())
        .fetch_all(&self.pool)
        .await
        .context("Failed to list reports")?;

        Ok(PagedResult::new(rows.iter().map(row_to_report).collect(), total, params))
    }

    async fn resolve(&self, request: &ResolveRequest<'_>) -> Result<ResolveOutcome> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        let row = sqlx::query(
            r#"
            SELECT r.comment_id, r.reporter_id, r.status, c.author_id, c.status AS comment_status
            FROM comment_reports r JOIN comments c ON c.id = r.comment_id
            WHERE r.id = ?
            "#,
        )
        .bind(request.report_id)
        .fetch_optional(&mut *tx)
        .await
        .context("Failed to load report")?;

        let Some(row) = row else {
            return Ok(ResolveOutcome::NotFound);
        };

        let status: String = row.get("status");
        let status: ReportStatus = status.parse().unwrap_or_default();
        if status != ReportStatus::Pending {
            return Ok(ResolveOutcome::AlreadyResolved(status));
        }

        let comment_id: i64 = row.get("comment_id");
        let comment_author: i64 = row.get("author_id");
        let comment_status: String = row.get("comment_status");
        let comment_status: ContentStatus = comment_status.parse().unwrap_or_default();
        let now = Utc::now();

        let (reporters, comment_change) = match request.action {
            ReportAction::Uphold => {
                // Upholding one report settles every open report on the comment
                let reporters: Vec<i64> = sqlx::query_scalar(
                    r#"
                    UPDATE comment_reports
                    SET status = 'upheld', resolved_by = ?, resolution_note = ?, resolved_at = ?
                    WHERE comment_id = ? AND status = 'pending'
                    RETURNING reporter_id
                    "#,
                )
                .bind(request.moderator_id)
                .bind(request.note)
                .bind(now)
                .bind(comment_id)
                .fetch_all(&mut *tx)
                .await
                .context("Failed to uphold reports")?;

                let change = if comment_status != ContentStatus::Rejected {
                    Some((comment_status, ContentStatus::Rejected))
                } else {
                    None
                };
                (reporters, change)
            }
            ReportAction::Dismiss => {
                sqlx::query(
                    r#"
                    UPDATE comment_reports
                    SET status = 'dismissed', resolved_by = ?, resolution_note = ?, resolved_at = ?
                    WHERE id = ?
                    "#,
                )
                .bind(request.moderator_id)
                .bind(request.note)
                .bind(now)
                .bind(request.report_id)
                .execute(&mut *tx)
                .await
                .context("Failed to dismiss report")?;

                // Dismissed reports no longer count against the comment
                sqlx::query("UPDATE comments SET report_count = MAX(report_count - 1, 0) WHERE id = ?")
                    .bind(comment_id)
                    .execute(&mut *tx)
                    .await
                    .context("Failed to lower report count")?;

                let remaining: i64 = sqlx::query_scalar(
                    "SELECT COUNT(*) FROM comment_reports WHERE comment_id = ? AND status = 'pending'",
                )
                .bind(comment_id)
                .fetch_one(&mut *tx)
                .await
                .context("Failed to count open reports")?;

                let change = if remaining == 0 && comment_status == ContentStatus::Flagged {
                    Some((ContentStatus::Flagged, ContentStatus::Approved))
                } else {
                    None
                };
                (vec![row.get("reporter_id")], change)
            }
        };

        if let Some((from, to)) = comment_change {
            sqlx::query("UPDATE comments SET status = ?, moderated_at = ?, updated_at = ? WHERE id = ?")
                .bind(to.to_string())
                .bind(now)
                .bind(now)
                .bind(comment_id)
                .execute(&mut *tx)
                .await
                .context("Failed to update reported comment")?;

            let action = match request.action {
                ReportAction::Uphold => ModerationAction::ReportUpheld,
                ReportAction::Dismiss => ModerationAction::ReportDismissed,
            };
            let mut entry = NewLogEntry::comment(comment_id, action, from, to);
            entry.actor_id = Some(request.moderator_id);
            entry.reason = request.note;
            entry.metadata = Some(serde_json::json!({ "report_id": request.report_id }));
            insert_log(&mut *tx, &entry).await?;
        }

        tx.commit().await.context("Failed to commit report resolution")?;

        let report = self
            .get_by_id(request.report_id)
            .await?
            .context("Report vanished during resolution")?;

        Ok(ResolveOutcome::Resolved(Resolution {
            report,
            comment_author,
            reporters,
            comment_change,
        }))
    }

    async fn archive_stale(&self, cutoff: DateTime<Utc>, now: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE comment_reports SET status = 'archived', resolved_at = ?
            WHERE status = 'pending' AND created_at < ?
              AND comment_id IN (SELECT id FROM comments WHERE status != 'flagged')
            "#,
        )
        .bind(now)
        .bind(cutoff)
        .execute(&self.pool)
        .await
        .context("Failed to archive stale reports")?;
        Ok(result.rows_affected())
    }

    async fn count_pending(&self) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM comment_reports WHERE status = 'pending'")
            .fetch_one(&self.pool)
            .await
            .context("Failed to count pending reports")
    }

    async fn count_upheld_by_reporter(&self, reporter_id: i64) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM comment_reports WHERE reporter_id = ? AND status = 'upheld'")
            .bind(reporter_id)
            .fetch_one(&self.pool)
            .await
            .context("Failed to count upheld reports")
    }
}

fn row_to_report(row: &sqlx::sqlite::SqliteRow) -> Report {
    let reason: String = row.get("reason");
    let status: String = row.get("status");
    Report {
        id: row.get("id"),
        comment_id: row.get("comment_id"),
        reporter_id: row.get("reporter_id"),
        reason: reason.parse().unwrap_or(ReportReason::Other),
        details: row.get("details"),
        status: status.parse().unwrap_or_default(),
        resolved_by: row.get("resolved_by"),
        resolution_note: row.get("resolution_note"),
        resolved_at: row.get("resolved_at"),
        created_at: row.get("created_at"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::test_support::{backdate, insert_comment, insert_user, set_comment_status, setup_pool};

    async fn comment_state(pool: &DbPool, id: i64) -> (String, i64) {
        let row = sqlx::query("SELECT status, report_count FROM comments WHERE id = ?")
            .bind(id)
            .fetch_one(pool)
            .await
            .unwrap();
        (row.get("status"), row.get("report_count"))
    }

    #[tokio::test]
    async fn test_file_counts_and_rejects_duplicates() {
        let pool = setup_pool().await;
        let author = insert_user(&pool, "author").await;
        let reporter = insert_user(&pool, "reporter").await;
        let comment = insert_comment(&pool, author).await;
        let repo = SqlxReportRepository::new(pool.clone());

        let first = repo.create(comment, reporter, ReportReason::Spam, None).await.unwrap();
        assert!(matches!(first, FileOutcome::Filed { report_count: 1, .. }));

        let dup = repo.create(comment, reporter, ReportReason::Hate, None).await.unwrap();
        assert!(matches!(dup, FileOutcome::Duplicate));
        assert_eq!(comment_state(&pool, comment).await.1, 1);

        let missing = repo.create(999, reporter, ReportReason::Spam, None).await.unwrap();
        assert!(matches!(missing, FileOutcome::CommentMissing));
    }

    #[tokio::test]
    async fn test_uphold_closes_all_open_reports_and_rejects() {
        let pool = setup_pool().await;
        let author = insert_user(&pool, "author").await;
        let r1 = insert_user(&pool, "r1").await;
        let r2 = insert_user(&pool, "r2").await;
        let moderator = insert_user(&pool, "mod").await;
        let comment = insert_comment(&pool, author).await;
        let repo = SqlxReportRepository::new(pool.clone());

        let FileOutcome::Filed { report, .. } = repo.create(comment, r1, ReportReason::Spam, None).await.unwrap() else {
            panic!("expected filed report");
        };
        repo.create(comment, r2, ReportReason::Spam, Some("ads")).await.unwrap();

        let outcome = repo
            .resolve(&ResolveRequest {
                report_id: report.id,
                action: ReportAction::Uphold,
                moderator_id: moderator,
                note: Some("spam"),
            })
            .await
            .unwrap();

        let ResolveOutcome::Resolved(resolution) = outcome else {
            panic!("expected resolution");
        };
        assert_eq!(resolution.report.status, ReportStatus::Upheld);
        assert_eq!(resolution.comment_author, author);
        assert_eq!(resolution.reporters.len(), 2);
        assert_eq!(
            resolution.comment_change,
            Some((ContentStatus::Pending, ContentStatus::Rejected))
        );
        assert_eq!(comment_state(&pool, comment).await.0, "rejected");
        assert_eq!(repo.count_pending().await.unwrap(), 0);
        assert_eq!(repo.count_upheld_by_reporter(r2).await.unwrap(), 1);

        let again = repo
            .resolve(&ResolveRequest {
                report_id: report.id,
                action: ReportAction::Dismiss,
                moderator_id: moderator,
                note: None,
            })
            .await
            .unwrap();
        assert!(matches!(again, ResolveOutcome::AlreadyResolved(ReportStatus::Upheld)));
    }

    #[tokio::test]
    async fn test_dismiss_last_report_restores_flagged_comment() {
        let pool = setup_pool().await;
        let author = insert_user(&pool, "author").await;
        let reporter = insert_user(&pool, "reporter").await;
        let moderator = insert_user(&pool, "mod").await;
        let comment = insert_comment(&pool, author).await;
        let repo = SqlxReportRepository::new(pool.clone());

        let FileOutcome::Filed { report, .. } = repo.create(comment, reporter, ReportReason::Other, None).await.unwrap() else {
            panic!("expected filed report");
        };
        set_comment_status(&pool, comment, "flagged").await;

        let outcome = repo
            .resolve(&ResolveRequest {
                report_id: report.id,
                action: ReportAction::Dismiss,
                moderator_id: moderator,
                note: None,
            })
            .await
            .unwrap();
        let ResolveOutcome::Resolved(resolution) = outcome else {
            panic!("expected resolution");
        };
        assert_eq!(
            resolution.comment_change,
            Some((ContentStatus::Flagged, ContentStatus::Approved))
        );
        assert_eq!(comment_state(&pool, comment).await, ("approved".to_string(), 0));
    }

    #[tokio::test]
    async fn test_archive_skips_flagged_comments() {
        let pool = setup_pool().await;
        let author = insert_user(&pool, "author").await;
        let reporter = insert_user(&pool, "reporter").await;
        let plain = insert_comment(&pool, author).await;
        let flagged = insert_comment(&pool, author).await;
        let repo = SqlxReportRepository::new(pool.clone());

        for comment in [plain, flagged] {
            let FileOutcome::Filed { report, .. } = repo.create(comment, reporter, ReportReason::Spam, None).await.unwrap() else {
                panic!("expected filed report");
            };
            backdate(&pool, "comment_reports", report.id, chrono::Duration::days(40)).await;
        }
        set_comment_status(&pool, flagged, "flagged").await;

        let now = Utc::now() - chrono::Duration::hours(6);
        let archived = repo.archive_stale(now - chrono::Duration::days(30), now).await.unwrap();
        assert_eq!(archived, 1);
        assert_eq!(repo.count_pending().await.unwrap(), 1);

        let page = repo.list(Some(ReportStatus::Archived), &ListParams::default()).await.unwrap();
        assert_eq!(page.items[0].comment_id, plain);
        assert_eq!(page.items[0].resolved_at.map(|t| t.timestamp()), Some(now.timestamp()));
    }
}
