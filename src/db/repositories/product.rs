//! Product repository

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::Row;
use std::sync::Arc;

use crate::db::DbPool;
use crate::models::{CreateProductInput, ListParams, PagedResult, Product, ProductStatus, UpdateProductInput};

#[async_trait]
pub trait ProductRepository: Send + Sync {
    async fn create(&self, seller_id: i64, input: &CreateProductInput) -> Result<Product>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Product>>;

    /// Active products, newest first
    async fn list_active(&self, params: &ListParams) -> Result<PagedResult<Product>>;

    /// Apply the set fields of `input`; `None` if the product does not exist
    async fn update(&self, id: i64, input: &UpdateProductInput) -> Result<Option<Product>>;

    async fn set_status(&self, id: i64, status: ProductStatus) -> Result<bool>;
}

pub struct SqlxProductRepository {
    pool: DbPool,
}

impl SqlxProductRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DbPool) -> Arc<dyn ProductRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl ProductRepository for SqlxProductRepository {
    async fn create(&self, seller_id: i64, input: &CreateProductInput) -> Result<Product> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO products (seller_id, name, description, price_cents, stock, status, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, 'active', ?, ?)
            "#,
        )
        .bind(seller_id)
        .bind(&input.name)
        .bind(&input.description)
        .bind(input.price_cents)
        .bind(input.stock)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .context("Failed to create product")?;

        self.get_by_id(result.last_insert_rowid())
            .await?
            .context("Product not found after creation")
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Product>> {
        let row = sqlx::query("SELECT * FROM products WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to get product by ID")?;
        Ok(row.as_ref().map(row_to_product))
    }

    async fn list_active(&self, params: &ListParams) -> Result<PagedResult<Product>> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products WHERE status = 'active'")
            .fetch_one(&self.pool)
            .await
            .context("Failed to count products")?;

        let rows = sqlx::query(
            "SELECT * FROM products WHERE status = 'active' ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
        )
        .bind(params.limit())
        .bind(params.offset())
        .fetch_all(&self.pool)
        .await
        .context("Failed to list products")?;

        Ok(PagedResult::new(rows.iter().map(row_to_product).collect(), total, params))
    }

    async fn update(&self, id: i64, input: &UpdateProductInput) -> Result<Option<Product>> {
        let result = sqlx::query(
            r#"
            UPDATE products SET
                name = COALESCE(?, name),
                description = COALESCE(?, description),
                price_cents = COALESCE(?, price_cents),
                stock = COALESCE(?, stock),
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&input.name)
        .bind(&input.description)
        .bind(input.price_cents)
        .bind(input.stock)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await
        .context("Failed to update product")?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_by_id(id).await
    }

    async fn set_status(&self, id: i64, status: ProductStatus) -> Result<bool> {
        let result = sqlx::query("UPDATE products SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status.to_string())
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to update product status")?;
        Ok(result.rows_affected() > 0)
    }
}

pub(crate) fn row_to_product(row: &sqlx::sqlite::SqliteRow) -> Product {
    let status: String = row.get("status");
    Product {
        id: row.get("id"),
        seller_id: row.get("seller_id"),
        name: row.get("name"),
        description: row.get("description"),
        price_cents: row.get("price_cents"),
        stock: row.get("stock"),
        status: status.parse().unwrap_or_default(),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::test_support::{insert_user, setup_pool};

    fn input(name: &str) -> CreateProductInput {
        CreateProductInput {
            name: name.to_string(),
            description: "desc".to_string(),
            price_cents: 1500,
            stock: 3,
        }
    }

    #[tokio::test]
    async fn test_partial_update_keeps_other_fields() {
        let pool = setup_pool().await;
        let seller = insert_user(&pool, "seller").await;
        let repo = SqlxProductRepository::new(pool);

        let product = repo.create(seller, &input("Lamp")).await.unwrap();
        let updated = repo
            .update(
                product.id,
                &UpdateProductInput {
                    price_cents: Some(1200),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .unwrap();

        assert_eq!(updated.price_cents, 1200);
        assert_eq!(updated.name, "Lamp");
        assert_eq!(updated.stock, 3);
        assert!(repo.update(999, &UpdateProductInput::default()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_archived_products_not_listed() {
        let pool = setup_pool().await;
        let seller = insert_user(&pool, "seller").await;
        let repo = SqlxProductRepository::new(pool);

        let lamp = repo.create(seller, &input("Lamp")).await.unwrap();
        repo.create(seller, &input("Chair")).await.unwrap();
        assert!(repo.set_status(lamp.id, ProductStatus::Archived).await.unwrap());

        let page = repo.list_active(&ListParams::default()).await.unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].name, "Chair");
    }
}
