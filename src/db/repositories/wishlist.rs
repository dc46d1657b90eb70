//! Wishlist repository

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::Row;
use std::sync::Arc;

use super::product::row_to_product;
use crate::db::DbPool;
use crate::models::{ListParams, PagedResult, WishlistItem};

#[async_trait]
pub trait WishlistRepository: Send + Sync {
    /// Add a product; false if it was already on the list
    async fn add(&self, user_id: i64, product_id: i64) -> Result<bool>;

    async fn remove(&self, user_id: i64, product_id: i64) -> Result<bool>;

    /// Saved products, most recently added first
    async fn list(&self, user_id: i64, params: &ListParams) -> Result<PagedResult<WishlistItem>>;
}

pub struct SqlxWishlistRepository {
    pool: DbPool,
}

impl SqlxWishlistRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DbPool) -> Arc<dyn WishlistRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl WishlistRepository for SqlxWishlistRepository {
    async fn add(&self, user_id: i64, product_id: i64) -> Result<bool> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO wishlist_items (user_id, product_id, created_at) VALUES (?, ?, ?)",
        )
        .bind(user_id)
        .bind(product_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .context("Failed to add wishlist item")?;
        Ok(result.rows_affected() > 0)
    }

    async fn remove(&self, user_id: i64, product_id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM wishlist_items WHERE user_id = ? AND product_id = ?")
            .bind(user_id)
            .bind(product_id)
            .execute(&self.pool)
            .await
            .context("Failed to remove wishlist item")?;
        Ok(result.rows_affected() > 0)
    }

    async fn list(&self, user_id: i64, params: &ListParams) -> Result<PagedResult<WishlistItem>> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM wishlist_items WHERE user_id = ?")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
            .context("Failed to count wishlist items")?;

        let rows = sqlx::query(
            r#"
            SELECT p.*, w.created_at AS added_at
            FROM wishlist_items w JOIN products p ON p.id = w.product_id
            WHERE w.user_id = ?
            ORDER BY w.created_at DESC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(user_id)
        .bind(params.limit())
        .bind(params.offset())
        .fetch_all(&self.pool)
        .await
        .context("Failed to list wishlist")?;

        let items = rows
            .iter()
            .map(|row| WishlistItem {
                product: row_to_product(row),
                added_at: row.get("added_at"),
            })
            .collect();
        Ok(PagedResult::new(items, total, params))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::test_support::{insert_product, insert_user, setup_pool};

    #[tokio::test]
    async fn test_add_is_idempotent() {
        let pool = setup_pool().await;
        let seller = insert_user(&pool, "seller").await;
        let user = insert_user(&pool, "alice").await;
        let product = insert_product(&pool, seller, 1).await;
        let repo = SqlxWishlistRepository::new(pool);

        assert!(repo.add(user, product).await.unwrap());
        assert!(!repo.add(user, product).await.unwrap());

        let page = repo.list(user, &ListParams::default()).await.unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].product.id, product);

        assert!(repo.remove(user, product).await.unwrap());
        assert!(!repo.remove(user, product).await.unwrap());
    }
}
