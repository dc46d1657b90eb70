//! Bulk moderation
//!
//! Applies one action to many comments in a single transaction. Either
//! every listed comment exists and the batch commits, or nothing is written.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use super::moderation::ModerationEffects;
use crate::db::repositories::{BulkRequest, BulkResult, CommentRepository};
use crate::models::{BulkAction, BulkOutcome, ContentStatus, NotificationKind, OutgoingNotification, Priority, User};

#[derive(Debug, thiserror::Error)]
pub enum BulkServiceError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Comments not found: {0:?}")]
    NotFound(Vec<i64>),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

pub struct BulkService {
    comments: Arc<dyn CommentRepository>,
    effects: Arc<ModerationEffects>,
    max_items: usize,
}

impl BulkService {
    pub fn new(comments: Arc<dyn CommentRepository>, effects: Arc<ModerationEffects>, max_items: usize) -> Self {
        Self {
            comments,
            effects,
            max_items,
        }
    }

    pub async fn apply(
        &self,
        moderator: &User,
        comment_ids: &[i64],
        action: BulkAction,
        reason: Option<String>,
    ) -> Result<BulkOutcome, BulkServiceError> {
        let ids = dedup_preserving_order(comment_ids);
        if ids.is_empty() {
            return Err(BulkServiceError::ValidationError("comment_ids cannot be empty".to_string()));
        }
        if ids.len() > self.max_items {
            return Err(BulkServiceError::ValidationError(format!(
                "At most {} comments per batch",
                self.max_items
            )));
        }

        let reason = reason.map(|r| r.trim().to_string()).filter(|r| !r.is_empty());
        let batch_id = uuid::Uuid::new_v4().to_string();
        let to = action.target_status();
        let request = BulkRequest {
            ids: &ids,
            to,
            actor_id: moderator.id,
            reason: reason.as_deref(),
            batch_id: &batch_id,
        };

        let outcome = match self.comments.bulk_transition(&request).await? {
            BulkResult::Committed(outcome) => outcome,
            BulkResult::Missing(missing) => {
                tracing::info!(batch_id = %batch_id, ?missing, "Bulk batch rolled back");
                return Err(BulkServiceError::NotFound(missing));
            }
        };

        tracing::info!(
            batch_id = %batch_id,
            moderator_id = moderator.id,
            updated = outcome.updated.len(),
            skipped = outcome.skipped.len(),
            "Bulk moderation committed"
        );

        let mut by_author: BTreeMap<i64, (NotificationKind, Vec<i64>)> = BTreeMap::new();
        for change in &outcome.updated {
            self.effects
                .record_reputation(change.comment_id, change.author_id, to)
                .await;
            if let Some(kind) = author_notice(change.from, to) {
                by_author
                    .entry(change.author_id)
                    .or_insert_with(|| (kind, Vec::new()))
                    .1
                    .push(change.comment_id);
            }
        }

        let notifications = self.effects.notifications();
        for (author_id, (kind, comment_ids)) in by_author {
            let listed: Vec<String> = comment_ids.iter().map(|id| format!("#{}", id)).collect();
            notifications
                .notify_best_effort(OutgoingNotification::new(
                    author_id,
                    kind,
                    Priority::Normal,
                    "Your comments were moderated",
                    format!("Comments {} are now {}.", listed.join(", "), to),
                ))
                .await;
        }

        notifications
            .notify_best_effort(OutgoingNotification::new(
                moderator.id,
                NotificationKind::BulkCompleted,
                Priority::Low,
                "Bulk moderation finished",
                format!(
                    "Batch {}: {} updated, {} skipped.",
                    batch_id,
                    outcome.updated.len(),
                    outcome.skipped.len()
                ),
            ))
            .await;

        Ok(outcome)
    }
}

/// Notice owed to an author for one row. Approving a comment that was never
/// hidden sends nothing.
fn author_notice(from: ContentStatus, to: ContentStatus) -> Option<NotificationKind> {
    match (from, to) {
        (_, ContentStatus::Rejected) => Some(NotificationKind::ContentRejected),
        (_, ContentStatus::Flagged) => Some(NotificationKind::ContentFlagged),
        (ContentStatus::Flagged | ContentStatus::Rejected, ContentStatus::Approved) => {
            Some(NotificationKind::ContentRestored)
        }
        _ => None,
    }
}

fn dedup_preserving_order(ids: &[i64]) -> Vec<i64> {
    let mut seen = HashSet::with_capacity(ids.len());
    ids.iter().copied().filter(|id| seen.insert(*id)).collect()
}
