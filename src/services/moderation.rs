//! Comment moderation service
//!
//! Intake, the automated analysis pipeline, manual status changes and the
//! moderator views (queue counts, audit log). Side effects of a status
//! change (reputation and author notifications) go through
//! [`ModerationEffects`] so reports, appeals, bulk actions and the sweep
//! apply them the same way.

use serde::Serialize;
use std::sync::Arc;

use super::analysis::{Analysis, ToxicityAnalyzer};
use super::notification::NotificationService;
use super::policy::ModerationPolicy;
use super::queue::AnalysisQueue;
use super::rate_limiter::RateLimiter;
use super::reputation::ReputationService;
use crate::db::repositories::{
    AppealRepository, CommentRepository, LogFilter, ModerationLogRepository, ProductRepository, ReportRepository,
};
use crate::models::{
    ActivityKind, Comment, CommentTarget, ContentStatus, CreateCommentInput, Decision, ListParams,
    ModerationAction, ModerationLog, NotificationKind, OutgoingNotification, PagedResult, Priority, QueueStats,
    StatusTransition, TransitionOutcome, User,
};

const MAX_COMMENT_CHARS: usize = 5000;

#[derive(Debug, thiserror::Error)]
pub enum ModerationServiceError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Too many comments, slow down")]
    RateLimited,

    #[error("Analysis failed: {0}")]
    AnalysisFailed(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Result of an on-demand analysis
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub comment_id: i64,
    pub analysis: Analysis,
    pub decision: Decision,
    /// Status written when the decision was applied
    pub applied: Option<ContentStatus>,
}

/// Reputation and notification follow-ups of comment status changes
pub struct ModerationEffects {
    reputation: Arc<ReputationService>,
    notifications: Arc<NotificationService>,
}

impl ModerationEffects {
    pub fn new(reputation: Arc<ReputationService>, notifications: Arc<NotificationService>) -> Self {
        Self {
            reputation,
            notifications,
        }
    }

    pub fn reputation(&self) -> &ReputationService {
        &self.reputation
    }

    pub fn notifications(&self) -> &NotificationService {
        &self.notifications
    }

    /// Credit or debit the author for a comment reaching `to`
    pub async fn record_reputation(&self, comment_id: i64, author_id: i64, to: ContentStatus) {
        let kind = match to {
            ContentStatus::Approved => ActivityKind::CommentApproved,
            ContentStatus::Rejected => ActivityKind::CommentRejected,
            ContentStatus::Pending | ContentStatus::Flagged => return,
        };
        self.reputation.record_best_effort(author_id, kind, Some(comment_id)).await;
    }

    /// Tell the author what happened to their comment
    pub async fn notify_author(&self, comment_id: i64, author_id: i64, from: ContentStatus, to: ContentStatus) {
        let (kind, priority, title) = match (from, to) {
            (_, ContentStatus::Rejected) => (NotificationKind::ContentRejected, Priority::Normal, "Your comment was removed"),
            (_, ContentStatus::Flagged) => (NotificationKind::ContentFlagged, Priority::Low, "Your comment is under review"),
            (ContentStatus::Flagged | ContentStatus::Rejected, ContentStatus::Approved) => {
                (NotificationKind::ContentRestored, Priority::Normal, "Your comment was restored")
            }
            _ => return,
        };
        let body = format!("Comment #{} is now {}.", comment_id, to);
        self.notifications
            .notify_best_effort(OutgoingNotification::new(author_id, kind, priority, title, body))
            .await;
    }

    pub async fn status_changed(&self, comment_id: i64, author_id: i64, from: ContentStatus, to: ContentStatus) {
        self.record_reputation(comment_id, author_id, to).await;
        self.notify_author(comment_id, author_id, from, to).await;
    }
}

pub struct ModerationService {
    comments: Arc<dyn CommentRepository>,
    products: Arc<dyn ProductRepository>,
    reports: Arc<dyn ReportRepository>,
    appeals: Arc<dyn AppealRepository>,
    logs: Arc<dyn ModerationLogRepository>,
    analyzer: Arc<dyn ToxicityAnalyzer>,
    policy: ModerationPolicy,
    effects: Arc<ModerationEffects>,
    limiter: Arc<RateLimiter>,
    queue: AnalysisQueue,
}

impl ModerationService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        comments: Arc<dyn CommentRepository>,
        products: Arc<dyn ProductRepository>,
        reports: Arc<dyn ReportRepository>,
        appeals: Arc<dyn AppealRepository>,
        logs: Arc<dyn ModerationLogRepository>,
        analyzer: Arc<dyn ToxicityAnalyzer>,
        policy: ModerationPolicy,
        effects: Arc<ModerationEffects>,
        limiter: Arc<RateLimiter>,
        queue: AnalysisQueue,
    ) -> Self {
        Self {
            comments,
            products,
            reports,
            appeals,
            logs,
            analyzer,
            policy,
            effects,
            limiter,
            queue,
        }
    }

    /// Validate and store a new comment as pending, then queue it for
    /// analysis
    pub async fn create_comment(
        &self,
        author: &User,
        mut input: CreateCommentInput,
    ) -> Result<Comment, ModerationServiceError> {
        input.content = input.content.trim().to_string();
        let chars = input.content.chars().count();
        if chars == 0 {
            return Err(ModerationServiceError::ValidationError("Content cannot be empty".to_string()));
        }
        if chars > MAX_COMMENT_CHARS {
            return Err(ModerationServiceError::ValidationError(format!(
                "Content must be at most {} characters",
                MAX_COMMENT_CHARS
            )));
        }
        if input.target_id <= 0 {
            return Err(ModerationServiceError::ValidationError("Invalid target id".to_string()));
        }

        if input.target_type == CommentTarget::Product
            && self.products.get_by_id(input.target_id).await?.is_none()
        {
            return Err(ModerationServiceError::NotFound("Product"));
        }

        if let Some(parent_id) = input.parent_id {
            let parent = self
                .comments
                .get_by_id(parent_id)
                .await?
                .ok_or(ModerationServiceError::NotFound("Parent comment"))?;
            if parent.target_type != input.target_type || parent.target_id != input.target_id {
                return Err(ModerationServiceError::ValidationError(
                    "Parent comment belongs to a different target".to_string(),
                ));
            }
        }

        if !self.limiter.try_acquire(&author.id.to_string()).await {
            return Err(ModerationServiceError::RateLimited);
        }

        let comment = self.comments.create(author.id, &input).await?;
        tracing::info!(comment_id = comment.id, author_id = author.id, "Comment created");

        self.queue.enqueue(comment.id);
        Ok(comment)
    }

    /// Pipeline entry point used by the analysis worker
    pub async fn process(&self, comment_id: i64) -> Result<Option<TransitionOutcome>, ModerationServiceError> {
        let Some(comment) = self.comments.get_by_id(comment_id).await? else {
            tracing::debug!(comment_id, "Comment vanished before analysis");
            return Ok(None);
        };
        if comment.status != ContentStatus::Pending {
            tracing::debug!(comment_id, status = %comment.status, "Comment no longer pending, skipping");
            return Ok(None);
        }

        let analysis = self.analyze_text(&comment.content).await?;
        let (_, outcome) = self
            .auto_moderate(&comment, &analysis, &[ContentStatus::Pending], None)
            .await?;
        Ok(Some(outcome))
    }

    /// Decide on `comment` and apply the decision if its current status is
    /// in `allowed_from`
    pub async fn auto_moderate(
        &self,
        comment: &Comment,
        analysis: &Analysis,
        allowed_from: &[ContentStatus],
        actor_id: Option<i64>,
    ) -> Result<(Decision, TransitionOutcome), ModerationServiceError> {
        let reputation = self.effects.reputation().total(comment.author_id).await.unwrap_or_else(|e| {
            tracing::warn!(author_id = comment.author_id, "Reputation lookup failed: {}", e);
            0
        });
        let decision = self.policy.decide(analysis.score, comment.report_count, reputation);

        let mut transition = StatusTransition::new(comment.id, decision.target_status(), ModerationAction::AutoModerate)
            .from_states(allowed_from)
            .reason(format!("{} score {:.2}", analysis.provider, analysis.score))
            .with_analysis(analysis.score, analysis.labels.clone());
        if let Some(actor) = actor_id {
            transition = transition.by(actor);
        }

        let outcome = self.comments.apply_transition(&transition).await?;
        if let TransitionOutcome::Applied { from, to } = outcome {
            tracing::info!(comment_id = comment.id, score = analysis.score, %from, %to, "Comment auto-moderated");
            self.effects.status_changed(comment.id, comment.author_id, from, to).await;
        }
        Ok((decision, outcome))
    }

    /// Analyze a comment on demand; with `apply` also apply the decision to a
    /// pending or flagged comment
    pub async fn analyze_comment(
        &self,
        moderator: &User,
        comment_id: i64,
        apply: bool,
    ) -> Result<AnalysisReport, ModerationServiceError> {
        let comment = self
            .comments
            .get_by_id(comment_id)
            .await?
            .ok_or(ModerationServiceError::NotFound("Comment"))?;

        let analysis = self.analyze_text(&comment.content).await?;

        if !apply {
            let reputation = self.effects.reputation().total(comment.author_id).await.unwrap_or(0);
            let decision = self.policy.decide(analysis.score, comment.report_count, reputation);
            return Ok(AnalysisReport {
                comment_id,
                analysis,
                decision,
                applied: None,
            });
        }

        if !matches!(comment.status, ContentStatus::Pending | ContentStatus::Flagged) {
            return Err(ModerationServiceError::Conflict(format!(
                "Cannot re-moderate a {} comment",
                comment.status
            )));
        }

        let (decision, outcome) = self
            .auto_moderate(
                &comment,
                &analysis,
                &[ContentStatus::Pending, ContentStatus::Flagged],
                Some(moderator.id),
            )
            .await?;
        let applied = match outcome {
            TransitionOutcome::Applied { to, .. } => Some(to),
            TransitionOutcome::Skipped { current } => Some(current),
            TransitionOutcome::NotFound => return Err(ModerationServiceError::NotFound("Comment")),
        };

        Ok(AnalysisReport {
            comment_id,
            analysis,
            decision,
            applied,
        })
    }

    /// Manual status change by a moderator
    pub async fn set_status(
        &self,
        moderator: &User,
        comment_id: i64,
        to: ContentStatus,
        reason: Option<String>,
    ) -> Result<Comment, ModerationServiceError> {
        if to == ContentStatus::Pending {
            return Err(ModerationServiceError::ValidationError(
                "Comments cannot be moved back to pending".to_string(),
            ));
        }

        let mut transition = StatusTransition::new(comment_id, to, ModerationAction::ManualStatus).by(moderator.id);
        if let Some(reason) = reason.filter(|r| !r.trim().is_empty()) {
            transition = transition.reason(reason);
        }

        let comment = match self.comments.apply_transition(&transition).await? {
            TransitionOutcome::NotFound => return Err(ModerationServiceError::NotFound("Comment")),
            TransitionOutcome::Skipped { current } => {
                return Err(ModerationServiceError::Conflict(format!("Comment is already {}", current)))
            }
            TransitionOutcome::Applied { from, to } => {
                tracing::info!(comment_id, moderator_id = moderator.id, %from, %to, "Comment status set");
                let comment = self
                    .comments
                    .get_by_id(comment_id)
                    .await?
                    .ok_or(ModerationServiceError::NotFound("Comment"))?;
                self.effects.status_changed(comment_id, comment.author_id, from, to).await;
                comment
            }
        };

        Ok(comment)
    }

    /// Approved comments are public; other states are visible to the author
    /// and moderators only
    pub async fn get_comment(&self, id: i64, viewer: Option<&User>) -> Result<Comment, ModerationServiceError> {
        let comment = self
            .comments
            .get_by_id(id)
            .await?
            .ok_or(ModerationServiceError::NotFound("Comment"))?;

        let visible = comment.status.is_public()
            || viewer.is_some_and(|u| u.id == comment.author_id || u.is_moderator());
        if visible {
            Ok(comment)
        } else {
            Err(ModerationServiceError::NotFound("Comment"))
        }
    }

    pub async fn list_public(
        &self,
        target_type: CommentTarget,
        target_id: i64,
        params: &ListParams,
    ) -> Result<PagedResult<Comment>, ModerationServiceError> {
        Ok(self.comments.list_public(target_type, target_id, params).await?)
    }

    pub async fn list_by_status(
        &self,
        status: ContentStatus,
        params: &ListParams,
    ) -> Result<PagedResult<Comment>, ModerationServiceError> {
        Ok(self.comments.list_by_status(status, params).await?)
    }

    pub async fn queue_stats(&self) -> Result<QueueStats, ModerationServiceError> {
        Ok(QueueStats {
            pending_comments: self.comments.count_by_status(ContentStatus::Pending).await?,
            flagged_comments: self.comments.count_by_status(ContentStatus::Flagged).await?,
            pending_reports: self.reports.count_pending().await?,
            pending_appeals: self.appeals.count_pending().await?,
        })
    }

    pub async fn list_logs(
        &self,
        filter: &LogFilter,
        params: &ListParams,
    ) -> Result<PagedResult<ModerationLog>, ModerationServiceError> {
        Ok(self.logs.list(filter, params).await?)
    }

    pub fn policy(&self) -> &ModerationPolicy {
        &self.policy
    }

    pub fn effects(&self) -> &Arc<ModerationEffects> {
        &self.effects
    }

    async fn analyze_text(&self, text: &str) -> Result<Analysis, ModerationServiceError> {
        self.analyzer
            .analyze(text)
            .await
            .map_err(|e| ModerationServiceError::AnalysisFailed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::test_support::{insert_comment, insert_user, insert_user_with_role, set_comment_status};
    use crate::services::test_support::{fixture, user};

    fn thread_comment(content: &str) -> CreateCommentInput {
        CreateCommentInput {
            target_type: CommentTarget::Thread,
            target_id: 1,
            parent_id: None,
            content: content.to_string(),
        }
    }

    #[tokio::test]
    async fn test_create_validates_and_enqueues() {
        let mut fx = fixture().await;
        let author = user(&fx.pool, insert_user(&fx.pool, "alice").await).await;

        let err = fx.services.moderation.create_comment(&author, thread_comment("   ")).await;
        assert!(matches!(err, Err(ModerationServiceError::ValidationError(_))));

        let long = "a".repeat(5001);
        let err = fx.services.moderation.create_comment(&author, thread_comment(&long)).await;
        assert!(matches!(err, Err(ModerationServiceError::ValidationError(_))));

        let comment = fx
            .services
            .moderation
            .create_comment(&author, thread_comment("  hello there  "))
            .await
            .unwrap();
        assert_eq!(comment.status, ContentStatus::Pending);
        assert_eq!(comment.content, "hello there");
        assert_eq!(fx.receiver.try_recv().unwrap(), comment.id);
    }

    #[tokio::test]
    async fn test_product_target_must_exist() {
        let fx = fixture().await;
        let author = user(&fx.pool, insert_user(&fx.pool, "alice").await).await;
        let input = CreateCommentInput {
            target_type: CommentTarget::Product,
            target_id: 42,
            parent_id: None,
            content: "nice".to_string(),
        };
        let err = fx.services.moderation.create_comment(&author, input).await;
        assert!(matches!(err, Err(ModerationServiceError::NotFound("Product"))));
    }

    #[tokio::test]
    async fn test_parent_must_share_target() {
        let fx = fixture().await;
        let author = user(&fx.pool, insert_user(&fx.pool, "alice").await).await;
        let parent = insert_comment(&fx.pool, author.id).await;

        let input = CreateCommentInput {
            target_type: CommentTarget::Thread,
            target_id: 2,
            parent_id: Some(parent),
            content: "reply".to_string(),
        };
        let err = fx.services.moderation.create_comment(&author, input).await;
        assert!(matches!(err, Err(ModerationServiceError::ValidationError(_))));

        let input = CreateCommentInput {
            parent_id: Some(parent),
            ..thread_comment("reply")
        };
        assert!(fx.services.moderation.create_comment(&author, input).await.is_ok());
    }

    #[tokio::test]
    async fn test_comment_rate_limit() {
        let fx = fixture().await;
        let author = user(&fx.pool, insert_user(&fx.pool, "alice").await).await;
        for _ in 0..10 {
            fx.services.moderation.create_comment(&author, thread_comment("hi")).await.unwrap();
        }
        let err = fx.services.moderation.create_comment(&author, thread_comment("hi")).await;
        assert!(matches!(err, Err(ModerationServiceError::RateLimited)));
    }

    #[tokio::test]
    async fn test_pipeline_approves_clean_comment() {
        let fx = fixture().await;
        let author = user(&fx.pool, insert_user(&fx.pool, "alice").await).await;
        let comment = fx
            .services
            .moderation
            .create_comment(&author, thread_comment("Thanks, this was really helpful"))
            .await
            .unwrap();

        let outcome = fx.services.moderation.process(comment.id).await.unwrap();
        assert_eq!(
            outcome,
            Some(TransitionOutcome::Applied {
                from: ContentStatus::Pending,
                to: ContentStatus::Approved
            })
        );

        let stored = fx.services.moderation.get_comment(comment.id, None).await.unwrap();
        assert!(stored.toxicity_score.is_some());
        assert_eq!(fx.services.reputation.total(author.id).await.unwrap(), 2);

        // A second run is a no-op
        assert_eq!(fx.services.moderation.process(comment.id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_pipeline_rejects_threats() {
        let fx = fixture().await;
        let author = user(&fx.pool, insert_user(&fx.pool, "alice").await).await;
        let comment = fx
            .services
            .moderation
            .create_comment(&author, thread_comment("I will kill you. You are an idiot"))
            .await
            .unwrap();

        fx.services.moderation.process(comment.id).await.unwrap();
        let stored = fx.services.moderation.get_comment(comment.id, Some(&author)).await.unwrap();
        assert_eq!(stored.status, ContentStatus::Rejected);
        assert!(stored.labels.contains(&"threat".to_string()));

        let notes = fx
            .services
            .notifications
            .list(author.id, true, &ListParams::default())
            .await
            .unwrap();
        assert_eq!(notes.items[0].kind, NotificationKind::ContentRejected);
    }

    #[tokio::test]
    async fn test_manual_status_rejects_noop() {
        let fx = fixture().await;
        let author = insert_user(&fx.pool, "alice").await;
        let moderator = user(&fx.pool, insert_user_with_role(&fx.pool, "mod", "moderator").await).await;
        let comment = insert_comment(&fx.pool, author).await;

        let updated = fx
            .services
            .moderation
            .set_status(&moderator, comment, ContentStatus::Flagged, Some("check".into()))
            .await
            .unwrap();
        assert_eq!(updated.status, ContentStatus::Flagged);

        let err = fx
            .services
            .moderation
            .set_status(&moderator, comment, ContentStatus::Flagged, None)
            .await;
        assert!(matches!(err, Err(ModerationServiceError::Conflict(_))));

        let err = fx.services.moderation.set_status(&moderator, 999, ContentStatus::Approved, None).await;
        assert!(matches!(err, Err(ModerationServiceError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_visibility_of_unapproved_comments() {
        let fx = fixture().await;
        let author = user(&fx.pool, insert_user(&fx.pool, "alice").await).await;
        let other = user(&fx.pool, insert_user(&fx.pool, "bob").await).await;
        let moderator = user(&fx.pool, insert_user_with_role(&fx.pool, "mod", "moderator").await).await;
        let comment = insert_comment(&fx.pool, author.id).await;

        let moderation = &fx.services.moderation;
        assert!(moderation.get_comment(comment, None).await.is_err());
        assert!(moderation.get_comment(comment, Some(&other)).await.is_err());
        assert!(moderation.get_comment(comment, Some(&author)).await.is_ok());
        assert!(moderation.get_comment(comment, Some(&moderator)).await.is_ok());

        set_comment_status(&fx.pool, comment, "approved").await;
        assert!(moderation.get_comment(comment, None).await.is_ok());
    }

    #[tokio::test]
    async fn test_analyze_without_apply_leaves_status() {
        let fx = fixture().await;
        let author = insert_user(&fx.pool, "alice").await;
        let moderator = user(&fx.pool, insert_user_with_role(&fx.pool, "mod", "moderator").await).await;
        let comment = insert_comment(&fx.pool, author).await;

        let report = fx.services.moderation.analyze_comment(&moderator, comment, false).await.unwrap();
        assert_eq!(report.decision, Decision::Approve);
        assert_eq!(report.applied, None);

        let report = fx.services.moderation.analyze_comment(&moderator, comment, true).await.unwrap();
        assert_eq!(report.applied, Some(ContentStatus::Approved));

        let err = fx.services.moderation.analyze_comment(&moderator, comment, true).await;
        assert!(matches!(err, Err(ModerationServiceError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_queue_stats() {
        let fx = fixture().await;
        let author = insert_user(&fx.pool, "alice").await;
        insert_comment(&fx.pool, author).await;
        let flagged = insert_comment(&fx.pool, author).await;
        set_comment_status(&fx.pool, flagged, "flagged").await;

        let stats = fx.services.moderation.queue_stats().await.unwrap();
        assert_eq!(stats.pending_comments, 1);
        assert_eq!(stats.flagged_comments, 1);
        assert_eq!(stats.pending_reports, 0);
    }
}
