//! Reputation service
//!
//! Records point-earning activities and awards badges the first time a
//! threshold is crossed.

use std::sync::Arc;

use crate::db::repositories::{ReportRepository, ReputationRepository, UserRepository};
use crate::models::{ActivityKind, Badge, ReputationActivity, ReputationSummary};

const CONTRIBUTOR_POINTS: i64 = 10;
const TRUSTED_POINTS: i64 = 50;
const GUARDIAN_UPHELD_REPORTS: i64 = 5;
const RECENT_ACTIVITY_LIMIT: i64 = 20;

#[derive(Debug, thiserror::Error)]
pub enum ReputationServiceError {
    #[error("User not found")]
    NotFound,

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

pub struct ReputationService {
    repo: Arc<dyn ReputationRepository>,
    report_repo: Arc<dyn ReportRepository>,
    user_repo: Arc<dyn UserRepository>,
}

impl ReputationService {
    pub fn new(
        repo: Arc<dyn ReputationRepository>,
        report_repo: Arc<dyn ReportRepository>,
        user_repo: Arc<dyn UserRepository>,
    ) -> Self {
        Self {
            repo,
            report_repo,
            user_repo,
        }
    }

    /// Record an activity and award any badge it unlocks.
    /// Returns the badges newly awarded.
    pub async fn record(
        &self,
        user_id: i64,
        kind: ActivityKind,
        reference_id: Option<i64>,
    ) -> Result<Vec<Badge>, ReputationServiceError> {
        let activity = self.repo.record(user_id, kind, reference_id).await?;
        tracing::debug!(user_id, kind = %kind, points = activity.points, "Reputation recorded");
        self.check_badges(user_id, kind).await
    }

    /// Like `record`, but only logs failures
    pub async fn record_best_effort(&self, user_id: i64, kind: ActivityKind, reference_id: Option<i64>) {
        if let Err(e) = self.record(user_id, kind, reference_id).await {
            tracing::warn!(user_id, kind = %kind, "Failed to record reputation: {}", e);
        }
    }

    pub async fn total(&self, user_id: i64) -> Result<i64, ReputationServiceError> {
        Ok(self.repo.total(user_id).await?)
    }

    pub async fn summary(&self, user_id: i64) -> Result<ReputationSummary, ReputationServiceError> {
        if self.user_repo.get_by_id(user_id).await?.is_none() {
            return Err(ReputationServiceError::NotFound);
        }

        let total = self.repo.total(user_id).await?;
        let badges = self.repo.badges(user_id).await?;
        let recent: Vec<ReputationActivity> = self.repo.recent(user_id, RECENT_ACTIVITY_LIMIT).await?;

        Ok(ReputationSummary {
            user_id,
            total,
            badges,
            recent,
        })
    }

    async fn check_badges(&self, user_id: i64, kind: ActivityKind) -> Result<Vec<Badge>, ReputationServiceError> {
        let mut earned = Vec::new();
        let total = self.repo.total(user_id).await?;

        if total >= CONTRIBUTOR_POINTS {
            earned.push(Badge::Contributor);
        }
        if total >= TRUSTED_POINTS {
            earned.push(Badge::Trusted);
        }
        if kind == ActivityKind::ReportUpheld
            && self.report_repo.count_upheld_by_reporter(user_id).await? >= GUARDIAN_UPHELD_REPORTS
        {
            earned.push(Badge::Guardian);
        }

        let mut awarded = Vec::new();
        for badge in earned {
            if self.repo.award_badge(user_id, badge).await? {
                tracing::info!(user_id, badge = %badge, "Badge awarded");
                awarded.push(badge);
            }
        }
        Ok(awarded)
    }
}
