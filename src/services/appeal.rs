//! Appeal service

use std::sync::Arc;

use super::moderation::ModerationEffects;
use crate::db::repositories::{AppealInsert, AppealRepository, AppealResolveOutcome, AppealReview, CommentRepository};
use crate::models::{
    ActivityKind, Appeal, AppealDecision, AppealStatus, ListParams, NotificationKind, OutgoingNotification,
    PagedResult, Priority, User,
};

const MIN_REASON_CHARS: usize = 10;
const MAX_REASON_CHARS: usize = 2000;

#[derive(Debug, thiserror::Error)]
pub enum AppealServiceError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Only the author may appeal this comment")]
    Forbidden,

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

pub struct AppealService {
    repo: Arc<dyn AppealRepository>,
    comments: Arc<dyn CommentRepository>,
    effects: Arc<ModerationEffects>,
}

impl AppealService {
    pub fn new(
        repo: Arc<dyn AppealRepository>,
        comments: Arc<dyn CommentRepository>,
        effects: Arc<ModerationEffects>,
    ) -> Self {
        Self { repo, comments, effects }
    }

    /// Appeal a flagged or rejected comment
    pub async fn submit(&self, user: &User, comment_id: i64, reason: &str) -> Result<Appeal, AppealServiceError> {
        let reason = reason.trim();
        let chars = reason.chars().count();
        if !(MIN_REASON_CHARS..=MAX_REASON_CHARS).contains(&chars) {
            return Err(AppealServiceError::ValidationError(format!(
                "Reason must be between {} and {} characters",
                MIN_REASON_CHARS, MAX_REASON_CHARS
            )));
        }

        let comment = self
            .comments
            .get_by_id(comment_id)
            .await?
            .ok_or(AppealServiceError::NotFound("Comment"))?;

        if comment.author_id != user.id {
            return Err(AppealServiceError::Forbidden);
        }
        if !comment.status.is_appealable() {
            return Err(AppealServiceError::Conflict(format!(
                "A {} comment cannot be appealed",
                comment.status
            )));
        }

        let appeal = match self.repo.create(comment_id, user.id, reason).await? {
            AppealInsert::Created(appeal) => appeal,
            AppealInsert::Duplicate => {
                return Err(AppealServiceError::Conflict(
                    "An appeal for this comment is already pending".to_string(),
                ))
            }
        };

        tracing::info!(appeal_id = appeal.id, comment_id, user_id = user.id, "Appeal submitted");

        let body = format!("Appeal #{} on comment #{} awaits review.", appeal.id, comment_id);
        if let Err(e) = self
            .effects
            .notifications()
            .notify_moderators(NotificationKind::AppealSubmitted, Priority::High, "New appeal", &body)
            .await
        {
            tracing::warn!(appeal_id = appeal.id, "Failed to alert moderators: {}", e);
        }

        Ok(appeal)
    }

    pub async fn list_mine(&self, user: &User, params: &ListParams) -> Result<PagedResult<Appeal>, AppealServiceError> {
        Ok(self.repo.list_by_user(user.id, params).await?)
    }

    pub async fn list(
        &self,
        status: Option<AppealStatus>,
        params: &ListParams,
    ) -> Result<PagedResult<Appeal>, AppealServiceError> {
        Ok(self.repo.list(status, params).await?)
    }

    /// Grant or deny a pending appeal
    pub async fn resolve(
        &self,
        moderator: &User,
        appeal_id: i64,
        decision: AppealDecision,
        note: Option<String>,
    ) -> Result<Appeal, AppealServiceError> {
        let note = note.map(|n| n.trim().to_string()).filter(|n| !n.is_empty());
        let review = AppealReview {
            appeal_id,
            decision,
            reviewer_id: moderator.id,
            note: note.as_deref(),
        };

        let resolution = match self.repo.resolve(&review).await? {
            AppealResolveOutcome::Resolved(resolution) => resolution,
            AppealResolveOutcome::NotFound => return Err(AppealServiceError::NotFound("Appeal")),
            AppealResolveOutcome::AlreadyResolved(status) => {
                return Err(AppealServiceError::Conflict(format!("Appeal is already {}", status)))
            }
        };

        let appeal = resolution.appeal;
        tracing::info!(appeal_id, moderator_id = moderator.id, status = %appeal.status, "Appeal resolved");

        if resolution.comment_change.is_some() {
            self.effects
                .reputation()
                .record_best_effort(resolution.comment_author, ActivityKind::AppealGranted, Some(appeal_id))
                .await;
        }

        let body = match (&appeal.status, &appeal.reviewer_note) {
            (AppealStatus::Granted, _) => format!("Your appeal on comment #{} was granted.", appeal.comment_id),
            (_, Some(note)) => format!("Your appeal on comment #{} was denied: {}", appeal.comment_id, note),
            _ => format!("Your appeal on comment #{} was denied.", appeal.comment_id),
        };
        self.effects
            .notifications()
            .notify_best_effort(OutgoingNotification::new(
                resolution.comment_author,
                NotificationKind::AppealResolved,
                Priority::Normal,
                "Your appeal was reviewed",
                body,
            ))
            .await;

        Ok(appeal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::test_support::{insert_comment, insert_user, insert_user_with_role, set_comment_status};
    use crate::models::ContentStatus;
    use crate::services::test_support::{fixture, user};

    const REASON: &str = "This was a quote, not an insult";

    #[tokio::test]
    async fn test_submit_rules() {
        let fx = fixture().await;
        let author = user(&fx.pool, insert_user(&fx.pool, "author").await).await;
        let other = user(&fx.pool, insert_user(&fx.pool, "other").await).await;
        let comment = insert_comment(&fx.pool, author.id).await;
        let appeals = &fx.services.appeals;

        let err = appeals.submit(&author, comment, REASON).await;
        assert!(matches!(err, Err(AppealServiceError::Conflict(_))), "pending comments are not appealable");

        set_comment_status(&fx.pool, comment, "rejected").await;
        assert!(matches!(
            appeals.submit(&author, comment, "too short").await,
            Err(AppealServiceError::ValidationError(_))
        ));
        assert!(matches!(
            appeals.submit(&other, comment, REASON).await,
            Err(AppealServiceError::Forbidden)
        ));

        appeals.submit(&author, comment, REASON).await.unwrap();
        assert!(matches!(
            appeals.submit(&author, comment, REASON).await,
            Err(AppealServiceError::Conflict(_))
        ));
        assert_eq!(appeals.list_mine(&author, &ListParams::default()).await.unwrap().total, 1);
    }

    #[tokio::test]
    async fn test_grant_restores_and_rewards() {
        let fx = fixture().await;
        let author = user(&fx.pool, insert_user(&fx.pool, "author").await).await;
        let moderator = user(&fx.pool, insert_user_with_role(&fx.pool, "mod", "moderator").await).await;
        let comment = insert_comment(&fx.pool, author.id).await;
        set_comment_status(&fx.pool, comment, "rejected").await;

        let appeal = fx.services.appeals.submit(&author, comment, REASON).await.unwrap();
        let resolved = fx
            .services
            .appeals
            .resolve(&moderator, appeal.id, AppealDecision::Grant, None)
            .await
            .unwrap();
        assert_eq!(resolved.status, AppealStatus::Granted);

        let restored = fx.services.moderation.get_comment(comment, None).await.unwrap();
        assert_eq!(restored.status, ContentStatus::Approved);
        assert_eq!(fx.services.reputation.total(author.id).await.unwrap(), 5);

        let notes = fx
            .services
            .notifications
            .list(author.id, false, &ListParams::default())
            .await
            .unwrap();
        assert_eq!(notes.items[0].kind, NotificationKind::AppealResolved);

        let err = fx
            .services
            .appeals
            .resolve(&moderator, appeal.id, AppealDecision::Deny, None)
            .await;
        assert!(matches!(err, Err(AppealServiceError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_deny_leaves_comment() {
        let fx = fixture().await;
        let author = user(&fx.pool, insert_user(&fx.pool, "author").await).await;
        let moderator = user(&fx.pool, insert_user_with_role(&fx.pool, "mod", "moderator").await).await;
        let comment = insert_comment(&fx.pool, author.id).await;
        set_comment_status(&fx.pool, comment, "flagged").await;

        let appeal = fx.services.appeals.submit(&author, comment, REASON).await.unwrap();
        fx.services
            .appeals
            .resolve(&moderator, appeal.id, AppealDecision::Deny, Some("still rude".into()))
            .await
            .unwrap();

        let stored = fx.services.moderation.get_comment(comment, Some(&author)).await.unwrap();
        assert_eq!(stored.status, ContentStatus::Flagged);
        assert_eq!(fx.services.reputation.total(author.id).await.unwrap(), 0);
    }
}
