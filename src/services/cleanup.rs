//! Periodic cleanup sweep
//!
//! Picks up comments the analysis queue dropped, approves pending comments
//! whose review window passed, and closes out stale reports, appeals and
//! sessions.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::sync::Arc;

use super::moderation::ModerationService;
use crate::config::ModerationConfig;
use crate::db::repositories::{AppealRepository, CommentRepository, ReportRepository, SessionRepository};
use crate::models::{ContentStatus, TransitionOutcome};

/// Comments re-analyzed per sweep
const REANALYZE_BATCH: i64 = 50;

#[derive(Debug, thiserror::Error)]
pub enum CleanupServiceError {
    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Rows touched by each step of a sweep
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub reanalyzed: u64,
    pub auto_approved: u64,
    pub reports_archived: u64,
    pub appeals_expired: u64,
    pub sessions_deleted: u64,
}

pub struct CleanupService {
    moderation: Arc<ModerationService>,
    comments: Arc<dyn CommentRepository>,
    reports: Arc<dyn ReportRepository>,
    appeals: Arc<dyn AppealRepository>,
    sessions: Arc<dyn SessionRepository>,
    config: ModerationConfig,
}

impl CleanupService {
    pub fn new(
        moderation: Arc<ModerationService>,
        comments: Arc<dyn CommentRepository>,
        reports: Arc<dyn ReportRepository>,
        appeals: Arc<dyn AppealRepository>,
        sessions: Arc<dyn SessionRepository>,
        config: ModerationConfig,
    ) -> Self {
        Self {
            moderation,
            comments,
            reports,
            appeals,
            sessions,
            config,
        }
    }

    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<SweepReport, CleanupServiceError> {
        let mut report = SweepReport::default();

        let grace = now - Duration::minutes(self.config.reanalyze_after_minutes);
        for comment in self.comments.list_unscored_pending(grace, REANALYZE_BATCH).await? {
            match self.moderation.process(comment.id).await {
                Ok(Some(TransitionOutcome::Applied { .. })) => report.reanalyzed += 1,
                Ok(_) => {}
                Err(e) => tracing::warn!(comment_id = comment.id, "Re-analysis failed: {}", e),
            }
        }

        let expiry = now - Duration::hours(self.config.pending_expiry_hours);
        let approved = self
            .comments
            .approve_expired_pending(expiry, self.moderation.policy().flag_threshold())
            .await?;
        for &(comment_id, author_id) in &approved {
            self.moderation
                .effects()
                .record_reputation(comment_id, author_id, ContentStatus::Approved)
                .await;
        }
        report.auto_approved = approved.len() as u64;

        report.reports_archived = self
            .reports
            .archive_stale(now - Duration::days(self.config.report_archive_days), now)
            .await?;

        report.appeals_expired = self
            .appeals
            .expire_stale(now - Duration::days(self.config.appeal_expiry_days), now)
            .await?;

        report.sessions_deleted = self.sessions.delete_expired(now).await?;

        tracing::info!(
            reanalyzed = report.reanalyzed,
            auto_approved = report.auto_approved,
            reports_archived = report.reports_archived,
            appeals_expired = report.appeals_expired,
            sessions_deleted = report.sessions_deleted,
            "Cleanup sweep finished"
        );
        Ok(report)
    }
}

/// Run the sweep every `interval_secs` until the task is aborted
pub fn spawn_cleanup_loop(cleanup: Arc<CleanupService>, interval_secs: u64) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(std::time::Duration::from_secs(interval_secs));
        // The first tick completes immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if let Err(e) = cleanup.sweep(Utc::now()).await {
                tracing::error!("Cleanup sweep failed: {}", e);
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::test_support::{
        backdate, insert_comment, insert_user, insert_user_with_role, set_comment_status,
    };
    use crate::services::test_support::{fixture, user};

    async fn set_score(pool: &crate::db::DbPool, comment_id: i64, score: f64) {
        sqlx::query("UPDATE comments SET toxicity_score = ? WHERE id = ?")
            .bind(score)
            .bind(comment_id)
            .execute(pool)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_sweep_reanalyzes_dropped_comments() {
        let fx = fixture().await;
        let author = insert_user(&fx.pool, "author").await;
        let old = insert_comment(&fx.pool, author).await;
        backdate(&fx.pool, "comments", old, Duration::minutes(30)).await;
        let fresh = insert_comment(&fx.pool, author).await;

        let report = fx.services.cleanup.sweep(Utc::now()).await.unwrap();
        assert_eq!(report.reanalyzed, 1);

        let moderation = &fx.services.moderation;
        let moderator = user(&fx.pool, insert_user_with_role(&fx.pool, "mod", "moderator").await).await;
        assert_eq!(
            moderation.get_comment(old, None).await.unwrap().status,
            ContentStatus::Approved
        );
        assert_eq!(
            moderation.get_comment(fresh, Some(&moderator)).await.unwrap().status,
            ContentStatus::Pending
        );
    }

    #[tokio::test]
    async fn test_sweep_approves_expired_low_score_comments() {
        let fx = fixture().await;
        let author = insert_user(&fx.pool, "author").await;

        let clean = insert_comment(&fx.pool, author).await;
        set_score(&fx.pool, clean, 0.1).await;
        backdate(&fx.pool, "comments", clean, Duration::hours(80)).await;

        let suspicious = insert_comment(&fx.pool, author).await;
        set_score(&fx.pool, suspicious, 0.7).await;
        backdate(&fx.pool, "comments", suspicious, Duration::hours(80)).await;

        let report = fx.services.cleanup.sweep(Utc::now()).await.unwrap();
        assert_eq!(report.auto_approved, 1);
        assert_eq!(fx.services.reputation.total(author).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_sweep_closes_stale_reports_appeals_and_sessions() {
        let fx = fixture().await;
        let author = insert_user(&fx.pool, "author").await;
        let reporter = insert_user(&fx.pool, "reporter").await;
        let comment = insert_comment(&fx.pool, author).await;
        set_comment_status(&fx.pool, comment, "rejected").await;

        let now = Utc::now();
        let report_id = sqlx::query(
            "INSERT INTO comment_reports (comment_id, reporter_id, reason, status, created_at) VALUES (?, ?, 'spam', 'pending', ?)",
        )
        .bind(comment)
        .bind(reporter)
        .bind(now)
        .execute(&fx.pool)
        .await
        .unwrap()
        .last_insert_rowid();
        backdate(&fx.pool, "comment_reports", report_id, Duration::days(31)).await;

        let appeal_id = sqlx::query(
            "INSERT INTO appeals (comment_id, user_id, reason, status, created_at) VALUES (?, ?, 'please reconsider', 'pending', ?)",
        )
        .bind(comment)
        .bind(author)
        .bind(now)
        .execute(&fx.pool)
        .await
        .unwrap()
        .last_insert_rowid();
        backdate(&fx.pool, "appeals", appeal_id, Duration::days(15)).await;

        sqlx::query("INSERT INTO sessions (id, user_id, expires_at, created_at) VALUES ('old', ?, ?, ?)")
            .bind(author)
            .bind(now - Duration::hours(1))
            .bind(now - Duration::days(8))
            .execute(&fx.pool)
            .await
            .unwrap();

        let report = fx.services.cleanup.sweep(now).await.unwrap();
        assert_eq!(
            report,
            SweepReport {
                reanalyzed: 0,
                auto_approved: 0,
                reports_archived: 1,
                appeals_expired: 1,
                sessions_deleted: 1,
            }
        );
    }
}
