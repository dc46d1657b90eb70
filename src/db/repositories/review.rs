//! Product review repository

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::Row;
use std::sync::Arc;

use super::moderation_log::{insert_log, NewLogEntry};
use crate::db::DbPool;
use crate::models::{ContentStatus, ListParams, ModerationAction, PagedResult, Review, TransitionOutcome};

/// Review about to be stored, already analyzed
#[derive(Debug, Clone)]
pub struct NewReview<'a> {
    pub product_id: i64,
    pub user_id: i64,
    pub rating: i64,
    pub body: &'a str,
    pub status: ContentStatus,
    pub verified_purchase: bool,
    pub toxicity_score: Option<f64>,
}

#[derive(Debug, Clone)]
pub enum ReviewInsert {
    Created(Review),
    /// The user already reviewed the product
    Duplicate,
}

#[async_trait]
pub trait ReviewRepository: Send + Sync {
    async fn create(&self, review: &NewReview<'_>) -> Result<ReviewInsert>;

    /// Approved reviews of a product, newest first
    async fn list_public(&self, product_id: i64, params: &ListParams) -> Result<PagedResult<Review>>;

    /// Number of approved reviews and their mean rating
    async fn rating_summary(&self, product_id: i64) -> Result<(i64, Option<f64>)>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Review>>;

    /// Reviews in a status across all products, oldest first
    async fn list_by_status(&self, status: ContentStatus, params: &ListParams) -> Result<PagedResult<Review>>;

    /// Move a review to `to` by a moderator's hand, logging the change in the
    /// same transaction
    async fn set_status(
        &self,
        review_id: i64,
        to: ContentStatus,
        actor_id: i64,
        reason: Option<&str>,
    ) -> Result<TransitionOutcome>;

    async fn count_by_status(&self, status: ContentStatus) -> Result<i64>;
}

pub struct SqlxReviewRepository {
    pool: DbPool,
}

impl SqlxReviewRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DbPool) -> Arc<dyn ReviewRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl ReviewRepository for SqlxReviewRepository {
    async fn create(&self, review: &NewReview<'_>) -> Result<ReviewInsert> {
        let now = Utc::now();
        let inserted = sqlx::query(
            r#"
            INSERT INTO reviews (product_id, user_id, rating, body, status, verified_purchase, toxicity_score, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(review.product_id)
        .bind(review.user_id)
        .bind(review.rating)
        .bind(review.body)
        .bind(review.status.to_string())
        .bind(review.verified_purchase)
        .bind(review.toxicity_score)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await;

        let id = match inserted {
            Ok(result) => result.last_insert_rowid(),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                return Ok(ReviewInsert::Duplicate);
            }
            Err(e) => return Err(anyhow::Error::new(e).context("Failed to create review")),
        };

        Ok(ReviewInsert::Created(Review {
            id,
            product_id: review.product_id,
            user_id: review.user_id,
            rating: review.rating,
            body: review.body.to_string(),
            status: review.status,
            verified_purchase: review.verified_purchase,
            toxicity_score: review.toxicity_score,
            created_at: now,
            updated_at: now,
        }))
    }

    async fn list_public(&self, product_id: i64, params: &ListParams) -> Result<PagedResult<Review>> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM reviews WHERE product_id = ? AND status = 'approved'")
            .bind(product_id)
            .fetch_one(&self.pool)
            .await
            .context("Failed to count reviews")?;

        let rows = sqlx::query(
            r#"
            SELECT * FROM reviews
            WHERE product_id = ? AND status = 'approved'
            ORDER BY created_at DESC, id DESC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(product_id)
        .bind(params.limit())
        .bind(params.offset())
        .fetch_all(&self.pool)
        .await
        .context("Failed to list reviews")?;

        Ok(PagedResult::new(rows.iter().map(row_to_review).collect(), total, params))
    }

    async fn rating_summary(&self, product_id: i64) -> Result<(i64, Option<f64>)> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS n, AVG(rating) AS mean FROM reviews WHERE product_id = ? AND status = 'approved'",
        )
        .bind(product_id)
        .fetch_one(&self.pool)
        .await
        .context("Failed to summarize ratings")?;
        Ok((row.get("n"), row.get("mean")))
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Review>> {
        let row = sqlx::query("SELECT * FROM reviews WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to get review")?;
        Ok(row.as_ref().map(row_to_review))
    }

    async fn list_by_status(&self, status: ContentStatus, params: &ListParams) -> Result<PagedResult<Review>> {
        let total = self.count_by_status(status).await?;

        let rows = sqlx::query(
            "SELECT * FROM reviews WHERE status = ? ORDER BY created_at ASC, id ASC LIMIT ? OFFSET ?",
        )
        .bind(status.to_string())
        .bind(params.limit())
        .bind(params.offset())
        .fetch_all(&self.pool)
        .await
        .context("Failed to list reviews by status")?;

        Ok(PagedResult::new(rows.iter().map(row_to_review).collect(), total, params))
    }

    async fn set_status(
        &self,
        review_id: i64,
        to: ContentStatus,
        actor_id: i64,
        reason: Option<&str>,
    ) -> Result<TransitionOutcome> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        let current: Option<String> = sqlx::query_scalar("SELECT status FROM reviews WHERE id = ?")
            .bind(review_id)
            .fetch_optional(&mut *tx)
            .await
            .context("Failed to read review status")?;

        let Some(current) = current else {
            return Ok(TransitionOutcome::NotFound);
        };
        let current: ContentStatus = current.parse().unwrap_or_default();
        if current == to {
            return Ok(TransitionOutcome::Skipped { current });
        }

        sqlx::query("UPDATE reviews SET status = ?, updated_at = ? WHERE id = ?")
            .bind(to.to_string())
            .bind(Utc::now())
            .bind(review_id)
            .execute(&mut *tx)
            .await
            .context("Failed to update review status")?;

        let mut entry = NewLogEntry::review(review_id, ModerationAction::ManualStatus, current, to);
        entry.actor_id = Some(actor_id);
        entry.reason = reason;
        insert_log(&mut *tx, &entry).await?;

        tx.commit().await.context("Failed to commit transaction")?;

        Ok(TransitionOutcome::Applied { from: current, to })
    }

    async fn count_by_status(&self, status: ContentStatus) -> Result<i64> {
        let total = sqlx::query_scalar("SELECT COUNT(*) FROM reviews WHERE status = ?")
            .bind(status.to_string())
            .fetch_one(&self.pool)
            .await
            .context("Failed to count reviews")?;
        Ok(total)
    }
}

fn row_to_review(row: &sqlx::sqlite::SqliteRow) -> Review {
    let status: String = row.get("status");
    Review {
        id: row.get("id"),
        product_id: row.get("product_id"),
        user_id: row.get("user_id"),
        rating: row.get("rating"),
        body: row.get("body"),
        status: status.parse().unwrap_or_default(),
        verified_purchase: row.get("verified_purchase"),
        toxicity_score: row.get("toxicity_score"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::test_support::{insert_product, insert_user, insert_user_with_role, setup_pool};

    fn review(product_id: i64, user_id: i64, rating: i64, status: ContentStatus) -> NewReview<'static> {
        NewReview {
            product_id,
            user_id,
            rating,
            body: "solid build",
            status,
            verified_purchase: false,
            toxicity_score: Some(0.0),
        }
    }

    #[tokio::test]
    async fn test_one_review_per_user() {
        let pool = setup_pool().await;
        let seller = insert_user(&pool, "seller").await;
        let user = insert_user(&pool, "buyer").await;
        let product = insert_product(&pool, seller, 1).await;
        let repo = SqlxReviewRepository::new(pool);

        let first = repo.create(&review(product, user, 5, ContentStatus::Approved)).await.unwrap();
        assert!(matches!(first, ReviewInsert::Created(_)));
        let second = repo.create(&review(product, user, 1, ContentStatus::Approved)).await.unwrap();
        assert!(matches!(second, ReviewInsert::Duplicate));
    }

    #[tokio::test]
    async fn test_summary_counts_only_approved() {
        let pool = setup_pool().await;
        let seller = insert_user(&pool, "seller").await;
        let a = insert_user(&pool, "a").await;
        let b = insert_user(&pool, "b").await;
        let c = insert_user(&pool, "c").await;
        let product = insert_product(&pool, seller, 1).await;
        let repo = SqlxReviewRepository::new(pool);

        repo.create(&review(product, a, 5, ContentStatus::Approved)).await.unwrap();
        repo.create(&review(product, b, 2, ContentStatus::Approved)).await.unwrap();
        repo.create(&review(product, c, 1, ContentStatus::Rejected)).await.unwrap();

        let (count, mean) = repo.rating_summary(product).await.unwrap();
        assert_eq!(count, 2);
        assert_eq!(mean, Some(3.5));

        let page = repo.list_public(product, &ListParams::default()).await.unwrap();
        assert_eq!(page.total, 2);
        assert!(page.items.iter().all(|r| r.status == ContentStatus::Approved));
    }

    #[tokio::test]
    async fn test_set_status_moves_review_and_logs() {
        let pool = setup_pool().await;
        let seller = insert_user(&pool, "seller").await;
        let user = insert_user(&pool, "buyer").await;
        let moderator = insert_user_with_role(&pool, "mod", "moderator").await;
        let product = insert_product(&pool, seller, 1).await;
        let repo = SqlxReviewRepository::new(pool.clone());

        let ReviewInsert::Created(flagged) = repo.create(&review(product, user, 4, ContentStatus::Flagged)).await.unwrap()
        else {
            panic!("expected review");
        };
        let queue = repo.list_by_status(ContentStatus::Flagged, &ListParams::default()).await.unwrap();
        assert_eq!(queue.total, 1);
        assert_eq!(queue.items[0].id, flagged.id);

        let outcome = repo
            .set_status(flagged.id, ContentStatus::Approved, moderator, Some("fine on reread"))
            .await
            .unwrap();
        assert!(matches!(
            outcome,
            TransitionOutcome::Applied {
                from: ContentStatus::Flagged,
                to: ContentStatus::Approved
            }
        ));
        assert_eq!(repo.count_by_status(ContentStatus::Flagged).await.unwrap(), 0);
        assert_eq!(repo.list_public(product, &ListParams::default()).await.unwrap().total, 1);

        let again = repo.set_status(flagged.id, ContentStatus::Approved, moderator, None).await.unwrap();
        assert!(matches!(again, TransitionOutcome::Skipped { current: ContentStatus::Approved }));
        let missing = repo.set_status(999, ContentStatus::Approved, moderator, None).await.unwrap();
        assert!(matches!(missing, TransitionOutcome::NotFound));

        let (target_type, actor, reason): (String, i64, String) = sqlx::query_as(
            "SELECT target_type, actor_id, reason FROM moderation_logs WHERE target_id = ?",
        )
        .bind(flagged.id)
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!((target_type.as_str(), actor, reason.as_str()), ("review", moderator, "fine on reread"));
    }
}
