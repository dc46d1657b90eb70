//! Report service
//!
//! Users report comments; enough reports pull a comment into review and
//! alert moderators, who then uphold or dismiss.

use std::sync::Arc;

use super::moderation::ModerationEffects;
use super::policy::ModerationPolicy;
use crate::db::repositories::{CommentRepository, FileOutcome, ReportRepository, ResolveOutcome, ResolveRequest};
use crate::models::{
    ActivityKind, ContentStatus, ListParams, ModerationAction, NotificationKind, OutgoingNotification, PagedResult,
    Priority, Report, ReportAction, ReportReason, ReportStatus, StatusTransition, TransitionOutcome, User,
};

const MAX_DETAILS_CHARS: usize = 1000;

#[derive(Debug, thiserror::Error)]
pub enum ReportServiceError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

pub struct ReportService {
    repo: Arc<dyn ReportRepository>,
    comments: Arc<dyn CommentRepository>,
    policy: ModerationPolicy,
    effects: Arc<ModerationEffects>,
}

impl ReportService {
    pub fn new(
        repo: Arc<dyn ReportRepository>,
        comments: Arc<dyn CommentRepository>,
        policy: ModerationPolicy,
        effects: Arc<ModerationEffects>,
    ) -> Self {
        Self {
            repo,
            comments,
            policy,
            effects,
        }
    }

    /// File a report against a comment
    pub async fn file(
        &self,
        reporter: &User,
        comment_id: i64,
        reason: ReportReason,
        details: Option<String>,
    ) -> Result<Report, ReportServiceError> {
        let comment = self
            .comments
            .get_by_id(comment_id)
            .await?
            .ok_or(ReportServiceError::NotFound("Comment"))?;

        if comment.author_id == reporter.id {
            return Err(ReportServiceError::ValidationError(
                "You cannot report your own comment".to_string(),
            ));
        }
        if comment.status == ContentStatus::Rejected {
            return Err(ReportServiceError::Conflict("Comment has already been removed".to_string()));
        }

        let details = details.map(|d| d.trim().to_string()).filter(|d| !d.is_empty());
        if details.as_ref().is_some_and(|d| d.chars().count() > MAX_DETAILS_CHARS) {
            return Err(ReportServiceError::ValidationError(format!(
                "Details must be at most {} characters",
                MAX_DETAILS_CHARS
            )));
        }

        let (report, report_count) = match self
            .repo
            .create(comment_id, reporter.id, reason, details.as_deref())
            .await?
        {
            FileOutcome::Filed { report, report_count } => (report, report_count),
            FileOutcome::Duplicate => {
                return Err(ReportServiceError::Conflict("You already reported this comment".to_string()))
            }
            FileOutcome::CommentMissing => return Err(ReportServiceError::NotFound("Comment")),
        };

        tracing::info!(report_id = report.id, comment_id, report_count, "Report filed");

        if self.policy.reports_require_review(report_count) {
            self.escalate(comment_id, comment.author_id, report_count).await?;
        }

        Ok(report)
    }

    /// Flag the comment once the report threshold is reached and alert
    /// moderators
    async fn escalate(&self, comment_id: i64, author_id: i64, report_count: i64) -> Result<(), ReportServiceError> {
        let transition = StatusTransition::new(comment_id, ContentStatus::Flagged, ModerationAction::ReportThreshold)
            .from_states(&[ContentStatus::Pending, ContentStatus::Approved])
            .reason(format!("{} reports", report_count));

        let flagged = match self.comments.apply_transition(&transition).await? {
            TransitionOutcome::Applied { from, to } => {
                self.effects.notify_author(comment_id, author_id, from, to).await;
                true
            }
            _ => false,
        };

        let urgent = report_count >= self.policy.urgent_report_count();
        if flagged || report_count == self.policy.urgent_report_count() {
            let priority = if urgent { Priority::Urgent } else { Priority::High };
            let body = format!("Comment #{} has {} open reports.", comment_id, report_count);
            if let Err(e) = self
                .effects
                .notifications()
                .notify_moderators(NotificationKind::ContentFlagged, priority, "Reported comment needs review", &body)
                .await
            {
                tracing::warn!(comment_id, "Failed to alert moderators: {}", e);
            }
        }
        Ok(())
    }

    pub async fn list(
        &self,
        status: Option<ReportStatus>,
        params: &ListParams,
    ) -> Result<PagedResult<Report>, ReportServiceError> {
        Ok(self.repo.list(status, params).await?)
    }

    /// Uphold or dismiss a pending report
    pub async fn resolve(
        &self,
        moderator: &User,
        report_id: i64,
        action: ReportAction,
        note: Option<String>,
    ) -> Result<Report, ReportServiceError> {
        let note = note.map(|n| n.trim().to_string()).filter(|n| !n.is_empty());
        let request = ResolveRequest {
            report_id,
            action,
            moderator_id: moderator.id,
            note: note.as_deref(),
        };

        let resolution = match self.repo.resolve(&request).await? {
            ResolveOutcome::Resolved(resolution) => resolution,
            ResolveOutcome::NotFound => return Err(ReportServiceError::NotFound("Report")),
            ResolveOutcome::AlreadyResolved(status) => {
                return Err(ReportServiceError::Conflict(format!("Report is already {}", status)))
            }
        };

        let comment_id = resolution.report.comment_id;
        tracing::info!(
            report_id,
            comment_id,
            moderator_id = moderator.id,
            status = %resolution.report.status,
            "Report resolved"
        );

        if action == ReportAction::Uphold {
            for &reporter in &resolution.reporters {
                self.effects
                    .reputation()
                    .record_best_effort(reporter, ActivityKind::ReportUpheld, Some(report_id))
                    .await;
            }
        }

        if let Some((from, to)) = resolution.comment_change {
            self.effects
                .status_changed(comment_id, resolution.comment_author, from, to)
                .await;
        }

        let verdict = match action {
            ReportAction::Uphold => "upheld",
            ReportAction::Dismiss => "dismissed",
        };
        for &reporter in &resolution.reporters {
            self.effects
                .notifications()
                .notify_best_effort(OutgoingNotification::new(
                    reporter,
                    NotificationKind::ReportResolved,
                    Priority::Low,
                    "Your report was reviewed",
                    format!("Your report on comment #{} was {}.", comment_id, verdict),
                ))
                .await;
        }

        Ok(resolution.report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::test_support::{insert_comment, insert_user, insert_user_with_role, set_comment_status};
    use crate::models::Notification;
    use crate::services::test_support::{fixture, user, Fixture};

    async fn inbox(fx: &Fixture, user_id: i64) -> PagedResult<Notification> {
        fx.services
            .notifications
            .list(user_id, false, &ListParams::default())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_report_rules() {
        let fx = fixture().await;
        let author = user(&fx.pool, insert_user(&fx.pool, "author").await).await;
        let reporter = user(&fx.pool, insert_user(&fx.pool, "reporter").await).await;
        let comment = insert_comment(&fx.pool, author.id).await;
        let reports = &fx.services.reports;

        let err = reports.file(&author, comment, ReportReason::Spam, None).await;
        assert!(matches!(err, Err(ReportServiceError::ValidationError(_))));

        let err = reports.file(&reporter, 999, ReportReason::Spam, None).await;
        assert!(matches!(err, Err(ReportServiceError::NotFound(_))));

        reports.file(&reporter, comment, ReportReason::Spam, Some("ads".into())).await.unwrap();
        let err = reports.file(&reporter, comment, ReportReason::Hate, None).await;
        assert!(matches!(err, Err(ReportServiceError::Conflict(_))));

        set_comment_status(&fx.pool, comment, "rejected").await;
        let other = user(&fx.pool, insert_user(&fx.pool, "other").await).await;
        let err = reports.file(&other, comment, ReportReason::Spam, None).await;
        assert!(matches!(err, Err(ReportServiceError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_threshold_flags_and_alerts_moderators() {
        let fx = fixture().await;
        let author = insert_user(&fx.pool, "author").await;
        let moderator = insert_user_with_role(&fx.pool, "mod", "moderator").await;
        let comment = insert_comment(&fx.pool, author).await;
        set_comment_status(&fx.pool, comment, "approved").await;

        for name in ["r1", "r2", "r3"] {
            let reporter = user(&fx.pool, insert_user(&fx.pool, name).await).await;
            fx.services.reports.file(&reporter, comment, ReportReason::Harassment, None).await.unwrap();
        }

        let stored = fx.services.moderation.get_comment(comment, None).await;
        assert!(stored.is_err(), "flagged comments are hidden from the public");

        let alerts = fx
            .services
            .notifications
            .list(moderator, false, &ListParams::default())
            .await
            .unwrap();
        assert_eq!(alerts.total, 1);
        assert_eq!(alerts.items[0].priority, Priority::High);
    }

    #[tokio::test]
    async fn test_twice_the_threshold_sends_one_urgent_alert() {
        let fx = fixture().await;
        let author = insert_user(&fx.pool, "author").await;
        let moderator = insert_user_with_role(&fx.pool, "mod", "moderator").await;
        let comment = insert_comment(&fx.pool, author).await;
        set_comment_status(&fx.pool, comment, "approved").await;

        for (i, name) in ["r1", "r2", "r3", "r4", "r5", "r6"].into_iter().enumerate() {
            let reporter = user(&fx.pool, insert_user(&fx.pool, name).await).await;
            fx.services.reports.file(&reporter, comment, ReportReason::Spam, None).await.unwrap();

            let expected = match i + 1 {
                1 | 2 => 0,
                3..=5 => 1,
                _ => 2,
            };
            assert_eq!(inbox(&fx, moderator).await.total, expected, "alerts after {} reports", i + 1);
        }

        let alerts = inbox(&fx, moderator).await;
        let urgent = alerts.items.iter().filter(|n| n.priority == Priority::Urgent).count();
        let high = alerts.items.iter().filter(|n| n.priority == Priority::High).count();
        assert_eq!((urgent, high), (1, 1));
        assert_eq!(alerts.items[0].priority, Priority::Urgent);
    }

    #[tokio::test]
    async fn test_uphold_rewards_reporters_and_penalizes_author() {
        let fx = fixture().await;
        let author = insert_user(&fx.pool, "author").await;
        let reporter = user(&fx.pool, insert_user(&fx.pool, "reporter").await).await;
        let moderator = user(&fx.pool, insert_user_with_role(&fx.pool, "mod", "moderator").await).await;
        let comment = insert_comment(&fx.pool, author).await;

        let report = fx.services.reports.file(&reporter, comment, ReportReason::Spam, None).await.unwrap();
        let resolved = fx
            .services
            .reports
            .resolve(&moderator, report.id, ReportAction::Uphold, Some("spam link".into()))
            .await
            .unwrap();
        assert_eq!(resolved.status, ReportStatus::Upheld);

        assert_eq!(fx.services.reputation.total(reporter.id).await.unwrap(), 3);
        assert_eq!(fx.services.reputation.total(author).await.unwrap(), -5);

        let err = fx
            .services
            .reports
            .resolve(&moderator, report.id, ReportAction::Dismiss, None)
            .await;
        assert!(matches!(err, Err(ReportServiceError::Conflict(_))));
    }
}
