//! In-app notification repository

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::Row;
use std::sync::Arc;

use crate::db::DbPool;
use crate::models::{ListParams, Notification, NotificationKind, OutgoingNotification, PagedResult, Priority};

#[async_trait]
pub trait NotificationRepository: Send + Sync {
    async fn insert(&self, notification: &OutgoingNotification) -> Result<Notification>;

    /// Notifications of a user, most urgent first, then newest
    async fn list_for_user(
        &self,
        user_id: i64,
        unread_only: bool,
        params: &ListParams,
    ) -> Result<PagedResult<Notification>>;

    /// Mark one notification read; false if it does not belong to the user
    async fn mark_read(&self, id: i64, user_id: i64) -> Result<bool>;

    async fn mark_all_read(&self, user_id: i64) -> Result<u64>;

    async fn count_unread(&self, user_id: i64) -> Result<i64>;
}

pub struct SqlxNotificationRepository {
    pool: DbPool,
}

impl SqlxNotificationRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DbPool) -> Arc<dyn NotificationRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl NotificationRepository for SqlxNotificationRepository {
    async fn insert(&self, notification: &OutgoingNotification) -> Result<Notification> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO notifications (user_id, kind, priority, title, body, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(notification.user_id)
        .bind(notification.kind.to_string())
        .bind(notification.priority.to_string())
        .bind(&notification.title)
        .bind(&notification.body)
        .bind(now)
        .execute(&self.pool)
        .await
        .context("Failed to insert notification")?;

        Ok(Notification {
            id: result.last_insert_rowid(),
            user_id: notification.user_id,
            kind: notification.kind,
            priority: notification.priority,
            title: notification.title.clone(),
            body: notification.body.clone(),
            read_at: None,
            created_at: now,
        })
    }

    async fn list_for_user(
        &self,
        user_id: i64,
        unread_only: bool,
        params: &ListParams,
    ) -> Result<PagedResult<Notification>> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM notifications WHERE user_id = ?1 AND (?2 = 0 OR read_at IS NULL)",
        )
        .bind(user_id)
        .bind(unread_only)
        .fetch_one(&self.pool)
        .await
        .context("Failed to count notifications")?;

        let rows = sqlx::query(
            r#"
            SELECT * FROM notifications
            WHERE user_id = ?1 AND (?2 = 0 OR read_at IS NULL)
            ORDER BY CASE priority
                         WHEN 'urgent' THEN 3
                         WHEN 'high' THEN 2
                         WHEN 'normal' THEN 1
                         ELSE 0
                     END DESC,
                     created_at DESC, id DESC
            LIMIT ?3 OFFSET ?4
            "#,
        )
        .bind(user_id)
        .bind(unread_only)
        .bind(params.limit())
        .bind(params.offset())
        .fetch_all(&self.pool)
        .await
        .context("Failed to list notifications")?;

        Ok(PagedResult::new(rows.iter().map(row_to_notification).collect(), total, params))
    }

    async fn mark_read(&self, id: i64, user_id: i64) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE notifications SET read_at = COALESCE(read_at, ?) WHERE id = ? AND user_id = ?",
        )
        .bind(Utc::now())
        .bind(id)
        .bind(user_id)
        .execute(&self.pool)
        .await
        .context("Failed to mark notification read")?;
        Ok(result.rows_affected() > 0)
    }

    async fn mark_all_read(&self, user_id: i64) -> Result<u64> {
        let result = sqlx::query("UPDATE notifications SET read_at = ? WHERE user_id = ? AND read_at IS NULL")
            .bind(Utc::now())
            .bind(user_id)
            .execute(&self.pool)
            .await
            .context("Failed to mark notifications read")?;
        Ok(result.rows_affected())
    }

    async fn count_unread(&self, user_id: i64) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM notifications WHERE user_id = ? AND read_at IS NULL")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
            .context("Failed to count unread notifications")
    }
}

fn row_to_notification(row: &sqlx::sqlite::SqliteRow) -> Notification {
    let kind: String = row.get("kind");
    let priority: String = row.get("priority");
    Notification {
        id: row.get("id"),
        user_id: row.get("user_id"),
        kind: kind.parse().unwrap_or(NotificationKind::ContentFlagged),
        priority: priority.parse().unwrap_or(Priority::Normal),
        title: row.get("title"),
        body: row.get("body"),
        read_at: row.get("read_at"),
        created_at: row.get("created_at"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::test_support::{insert_user, setup_pool};

    fn note(user_id: i64, priority: Priority, title: &str) -> OutgoingNotification {
        OutgoingNotification::new(user_id, NotificationKind::ContentFlagged, priority, title, "body")
    }

    #[tokio::test]
    async fn test_urgent_listed_first() {
        let pool = setup_pool().await;
        let user = insert_user(&pool, "alice").await;
        let repo = SqlxNotificationRepository::new(pool);

        repo.insert(&note(user, Priority::Low, "low")).await.unwrap();
        repo.insert(&note(user, Priority::Urgent, "urgent")).await.unwrap();
        repo.insert(&note(user, Priority::Normal, "normal")).await.unwrap();

        let page = repo.list_for_user(user, false, &ListParams::default()).await.unwrap();
        let titles: Vec<_> = page.items.iter().map(|n| n.title.as_str()).collect();
        assert_eq!(titles, vec!["urgent", "normal", "low"]);
    }

    #[tokio::test]
    async fn test_mark_read_is_scoped_to_owner() {
        let pool = setup_pool().await;
        let alice = insert_user(&pool, "alice").await;
        let bob = insert_user(&pool, "bob").await;
        let repo = SqlxNotificationRepository::new(pool);

        let n = repo.insert(&note(alice, Priority::High, "hi")).await.unwrap();
        repo.insert(&note(alice, Priority::High, "again")).await.unwrap();

        assert!(!repo.mark_read(n.id, bob).await.unwrap());
        assert!(repo.mark_read(n.id, alice).await.unwrap());
        assert_eq!(repo.count_unread(alice).await.unwrap(), 1);

        let unread = repo.list_for_user(alice, true, &ListParams::default()).await.unwrap();
        assert_eq!(unread.total, 1);
        assert_eq!(unread.items[0].title, "again");

        assert_eq!(repo.mark_all_read(alice).await.unwrap(), 1);
        assert_eq!(repo.count_unread(alice).await.unwrap(), 0);
    }
}
