//! Reputation activity and badge repository

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::Row;
use std::sync::Arc;

use crate::db::DbPool;
use crate::models::{ActivityKind, AwardedBadge, Badge, ReputationActivity};

#[async_trait]
pub trait ReputationRepository: Send + Sync {
    /// Append an activity worth `kind.points()`
    async fn record(&self, user_id: i64, kind: ActivityKind, reference_id: Option<i64>) -> Result<ReputationActivity>;

    /// Sum of all points of a user
    async fn total(&self, user_id: i64) -> Result<i64>;

    async fn recent(&self, user_id: i64, limit: i64) -> Result<Vec<ReputationActivity>>;

    /// Award a badge once; returns false if the user already holds it
    async fn award_badge(&self, user_id: i64, badge: Badge) -> Result<bool>;

    async fn badges(&self, user_id: i64) -> Result<Vec<AwardedBadge>>;
}

pub struct SqlxReputationRepository {
    pool: DbPool,
}

impl SqlxReputationRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DbPool) -> Arc<dyn ReputationRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl ReputationRepository for SqlxReputationRepository {
    async fn record(&self, user_id: i64, kind: ActivityKind, reference_id: Option<i64>) -> Result<ReputationActivity> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO reputation_activities (user_id, kind, points, reference_id, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(user_id)
        .bind(kind.to_string())
        .bind(kind.points())
        .bind(reference_id)
        .bind(now)
        .execute(&self.pool)
        .await
        .context("Failed to record reputation activity")?;

        Ok(ReputationActivity {
            id: result.last_insert_rowid(),
            user_id,
            kind,
            points: kind.points(),
            reference_id,
            created_at: now,
        })
    }

    async fn total(&self, user_id: i64) -> Result<i64> {
        sqlx::query_scalar("SELECT COALESCE(SUM(points), 0) FROM reputation_activities WHERE user_id = ?")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
            .context("Failed to sum reputation")
    }

    async fn recent(&self, user_id: i64, limit: i64) -> Result<Vec<ReputationActivity>> {
        let rows = sqlx::query(
            "SELECT * FROM reputation_activities WHERE user_id = ? ORDER BY created_at DESC, id DESC LIMIT ?",
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list reputation activities")?;

        Ok(rows
            .iter()
            .filter_map(|row| {
                let kind: String = row.get("kind");
                Some(ReputationActivity {
                    id: row.get("id"),
                    user_id: row.get("user_id"),
                    kind: kind.parse().ok()?,
                    points: row.get("points"),
                    reference_id: row.get("reference_id"),
                    created_at: row.get("created_at"),
                })
            })
            .collect())
    }

    async fn award_badge(&self, user_id: i64, badge: Badge) -> Result<bool> {
        let result = sqlx::query("INSERT OR IGNORE INTO badges (user_id, badge, awarded_at) VALUES (?, ?, ?)")
            .bind(user_id)
            .bind(badge.to_string())
            .bind(Utc::now())
            .execute(&self.pool)
            .await
            .context("Failed to award badge")?;
        Ok(result.rows_affected() > 0)
    }

    async fn badges(&self, user_id: i64) -> Result<Vec<AwardedBadge>> {
        let rows = sqlx::query("SELECT badge, awarded_at FROM badges WHERE user_id = ? ORDER BY awarded_at ASC")
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .context("Failed to list badges")?;

        Ok(rows
            .iter()
            .filter_map(|row| {
                let badge: String = row.get("badge");
                Some(AwardedBadge {
                    badge: badge.parse().ok()?,
                    awarded_at: row.get("awarded_at"),
                })
            })
            .collect())
    }
}
