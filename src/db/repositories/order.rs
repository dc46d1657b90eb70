//! Order repository
//!
//! Stock moves together with orders: placing an order decrements it and
//! moving an order into a stock-restoring status puts the quantity back,
//! each inside one transaction.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::Row;
use std::sync::Arc;

use crate::db::DbPool;
use crate::models::{ListParams, Order, OrderStatus, PagedResult};

#[derive(Debug, Clone)]
pub enum PlaceOrder {
    Placed(Order),
    /// Product missing or archived
    ProductUnavailable,
    InsufficientStock { available: i64 },
    /// Price times quantity does not fit in an i64
    TotalTooLarge,
}

#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn create(&self, buyer_id: i64, product_id: i64, quantity: i64) -> Result<PlaceOrder>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Order>>;

    /// Orders of a buyer, newest first
    async fn list_by_buyer(&self, buyer_id: i64, params: &ListParams) -> Result<PagedResult<Order>>;

    /// Move an order from `from` to `to`. Returns false if the order is no
    /// longer in `from`.
    async fn transition(&self, id: i64, from: OrderStatus, to: OrderStatus) -> Result<bool>;

    /// Whether the buyer has a delivered order of the product
    async fn has_delivered(&self, buyer_id: i64, product_id: i64) -> Result<bool>;
}

pub struct SqlxOrderRepository {
    pool: DbPool,
}

impl SqlxOrderRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DbPool) -> Arc<dyn OrderRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl OrderRepository for SqlxOrderRepository {
    async fn create(&self, buyer_id: i64, product_id: i64, quantity: i64) -> Result<PlaceOrder> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;
        let now = Utc::now();

        // The conditional update takes the write lock before anything is read
        let reserved: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE products SET stock = stock - ?, updated_at = ?
            WHERE id = ? AND status = 'active' AND stock >= ?
            RETURNING price_cents
            "#,
        )
        .bind(quantity)
        .bind(now)
        .bind(product_id)
        .bind(quantity)
        .fetch_optional(&mut *tx)
        .await
        .context("Failed to reserve stock")?;

        let Some(price) = reserved else {
            let stock: Option<i64> =
                sqlx::query_scalar("SELECT stock FROM products WHERE id = ? AND status = 'active'")
                    .bind(product_id)
                    .fetch_optional(&mut *tx)
                    .await
                    .context("Failed to load product for order")?;
            return Ok(match stock {
                Some(available) => PlaceOrder::InsufficientStock { available },
                None => PlaceOrder::ProductUnavailable,
            });
        };

        // Dropping the transaction rolls the reservation back
        let Some(total_cents) = price.checked_mul(quantity) else {
            return Ok(PlaceOrder::TotalTooLarge);
        };

        let result = sqlx::query(
            r#"
            INSERT INTO orders (buyer_id, product_id, quantity, total_cents, status, created_at, updated_at)
            VALUES (?, ?, ?, ?, 'pending', ?, ?)
            "#,
        )
        .bind(buyer_id)
        .bind(product_id)
        .bind(quantity)
        .bind(total_cents)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await
        .context("Failed to create order")?;

        tx.commit().await.context("Failed to commit order")?;

        Ok(PlaceOrder::Placed(Order {
            id: result.last_insert_rowid(),
            buyer_id,
            product_id,
            quantity,
            total_cents,
            status: OrderStatus::Pending,
            created_at: now,
            updated_at: now,
        }))
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Order>> {
        let row = sqlx::query("SELECT * FROM orders WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to get order by ID")?;
        Ok(row.as_ref().map(row_to_order))
    }

    async fn list_by_buyer(&self, buyer_id: i64, params: &ListParams) -> Result<PagedResult<Order>> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orders WHERE buyer_id = ?")
            .bind(buyer_id)
            .fetch_one(&self.pool)
            .await
            .context("Failed to count orders")?;

        let rows = sqlx::query(
            "SELECT * FROM orders WHERE buyer_id = ? ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
        )
        .bind(buyer_id)
        .bind(params.limit())
        .bind(params.offset())
        .fetch_all(&self.pool)
        .await
        .context("Failed to list orders")?;

        Ok(PagedResult::new(rows.iter().map(row_to_order).collect(), total, params))
    }

    async fn transition(&self, id: i64, from: OrderStatus, to: OrderStatus) -> Result<bool> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;
        let now = Utc::now();

        let row = sqlx::query(
            "UPDATE orders SET status = ?, updated_at = ? WHERE id = ? AND status = ? RETURNING product_id, quantity",
        )
        .bind(to.to_string())
        .bind(now)
        .bind(id)
        .bind(from.to_string())
        .fetch_optional(&mut *tx)
        .await
        .context("Failed to update order status")?;

        let Some(row) = row else {
            return Ok(false);
        };

        if to.restores_stock() {
            sqlx::query("UPDATE products SET stock = stock + ?, updated_at = ? WHERE id = ?")
                .bind(row.get::<i64, _>("quantity"))
                .bind(now)
                .bind(row.get::<i64, _>("product_id"))
                .execute(&mut *tx)
                .await
                .context("Failed to restore stock")?;
        }

        tx.commit().await.context("Failed to commit order transition")?;
        Ok(true)
    }

    async fn has_delivered(&self, buyer_id: i64, product_id: i64) -> Result<bool> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM orders WHERE buyer_id = ? AND product_id = ? AND status = 'delivered'",
        )
        .bind(buyer_id)
        .bind(product_id)
        .fetch_one(&self.pool)
        .await
        .context("Failed to check delivered orders")?;
        Ok(count > 0)
    }
}

fn row_to_order(row: &sqlx::sqlite::SqliteRow) -> Order {
    let status: String = row.get("status");
    Order {
        id: row.get("id"),
        buyer_id: row.get("buyer_id"),
        product_id: row.get("product_id"),
        quantity: row.get("quantity"),
        total_cents: row.get("total_cents"),
        status: status.parse().unwrap_or_default(),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::test_support::{insert_product, insert_user, setup_pool};

    async fn stock_of(pool: &DbPool, product_id: i64) -> i64 {
        sqlx::query_scalar("SELECT stock FROM products WHERE id = ?")
            .bind(product_id)
            .fetch_one(pool)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_order_reserves_stock() {
        let pool = setup_pool().await;
        let seller = insert_user(&pool, "seller").await;
        let buyer = insert_user(&pool, "buyer").await;
        let product = insert_product(&pool, seller, 5).await;
        let repo = SqlxOrderRepository::new(pool.clone());

        let PlaceOrder::Placed(order) = repo.create(buyer, product, 2).await.unwrap() else {
            panic!("expected order");
        };
        assert_eq!(order.total_cents, 2000);
        assert_eq!(stock_of(&pool, product).await, 3);

        let short = repo.create(buyer, product, 4).await.unwrap();
        assert!(matches!(short, PlaceOrder::InsufficientStock { available: 3 }));
        assert!(matches!(repo.create(buyer, 999, 1).await.unwrap(), PlaceOrder::ProductUnavailable));
    }

    #[tokio::test]
    async fn test_overflowing_total_is_refused_and_stock_kept() {
        let pool = setup_pool().await;
        let seller = insert_user(&pool, "seller").await;
        let buyer = insert_user(&pool, "buyer").await;
        let product = insert_product(&pool, seller, 5).await;
        sqlx::query("UPDATE products SET price_cents = ? WHERE id = ?")
            .bind(i64::MAX / 2 + 1)
            .bind(product)
            .execute(&pool)
            .await
            .unwrap();
        let repo = SqlxOrderRepository::new(pool.clone());

        assert!(matches!(repo.create(buyer, product, 2).await.unwrap(), PlaceOrder::TotalTooLarge));
        assert_eq!(stock_of(&pool, product).await, 5);

        let orders: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orders")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(orders, 0);
    }

    #[tokio::test]
    async fn test_archived_product_is_unavailable() {
        let pool = setup_pool().await;
        let seller = insert_user(&pool, "seller").await;
        let buyer = insert_user(&pool, "buyer").await;
        let product = insert_product(&pool, seller, 5).await;
        sqlx::query("UPDATE products SET status = 'archived' WHERE id = ?")
            .bind(product)
            .execute(&pool)
            .await
            .unwrap();
        let repo = SqlxOrderRepository::new(pool.clone());

        assert!(matches!(repo.create(buyer, product, 1).await.unwrap(), PlaceOrder::ProductUnavailable));
        assert_eq!(stock_of(&pool, product).await, 5);
    }

    #[tokio::test]
    async fn test_cancel_restores_stock_once() {
        let pool = setup_pool().await;
        let seller = insert_user(&pool, "seller").await;
        let buyer = insert_user(&pool, "buyer").await;
        let product = insert_product(&pool, seller, 5).await;
        let repo = SqlxOrderRepository::new(pool.clone());

        let PlaceOrder::Placed(order) = repo.create(buyer, product, 2).await.unwrap() else {
            panic!("expected order");
        };
        assert!(repo.transition(order.id, OrderStatus::Pending, OrderStatus::Cancelled).await.unwrap());
        assert_eq!(stock_of(&pool, product).await, 5);

        // Stale source status: nothing changes
        assert!(!repo.transition(order.id, OrderStatus::Pending, OrderStatus::Cancelled).await.unwrap());
        assert_eq!(stock_of(&pool, product).await, 5);
    }

    #[tokio::test]
    async fn test_has_delivered() {
        let pool = setup_pool().await;
        let seller = insert_user(&pool, "seller").await;
        let buyer = insert_user(&pool, "buyer").await;
        let product = insert_product(&pool, seller, 5).await;
        let repo = SqlxOrderRepository::new(pool);

        let PlaceOrder::Placed(order) = repo.create(buyer, product, 1).await.unwrap() else {
            panic!("expected order");
        };
        assert!(!repo.has_delivered(buyer, product).await.unwrap());
        for (from, to) in [
            (OrderStatus::Pending, OrderStatus::Paid),
            (OrderStatus::Paid, OrderStatus::Shipped),
            (OrderStatus::Shipped, OrderStatus::Delivered),
        ] {
            assert!(repo.transition(order.id, from, to).await.unwrap());
        }
        assert!(repo.has_delivered(buyer, product).await.unwrap());
    }
}
