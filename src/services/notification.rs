//! Notification service
//!
//! Every notification is stored in-app. High and urgent ones are also sent
//! by email when SMTP is configured; delivery runs on a spawned task and
//! failures are only logged.

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use futures::future::join_all;
use lettre::{
    message::header::ContentType, transport::smtp::authentication::Credentials, AsyncSmtpTransport,
    AsyncTransport, Message, Tokio1Executor,
};
use std::sync::Arc;

use crate::config::NotificationConfig;
use crate::db::repositories::{NotificationRepository, UserRepository};
use crate::models::{ListParams, Notification, NotificationKind, OutgoingNotification, PagedResult, Priority};

#[derive(Debug, thiserror::Error)]
pub enum NotificationServiceError {
    #[error("Notification not found")]
    NotFound,

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Where a notification is delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    InApp,
    Email,
}

/// Channels used for a priority
pub fn route(priority: Priority) -> &'static [Channel] {
    match priority {
        Priority::Low | Priority::Normal => &[Channel::InApp],
        Priority::High | Priority::Urgent => &[Channel::InApp, Channel::Email],
    }
}

/// Outgoing email transport
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> anyhow::Result<()>;
}

/// SMTP delivery through lettre
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: String,
}

impl SmtpMailer {
    /// Build a mailer from configuration; `None` when email is disabled
    pub fn from_config(config: &NotificationConfig) -> anyhow::Result<Option<Self>> {
        if !config.email_enabled {
            return Ok(None);
        }

        let host = config
            .smtp_host
            .as_deref()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| anyhow!("notifications.smtp_host is required when email is enabled"))?;

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::relay(host)
            .map_err(|e| anyhow!("Failed to create SMTP transport: {}", e))?
            .port(config.smtp_port);
        if let (Some(user), Some(pass)) = (&config.smtp_username, &config.smtp_password) {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }

        Ok(Some(Self {
            transport: builder.build(),
            from: config.from.clone(),
        }))
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, to: &str, subject: &str, body: &str) -> anyhow::Result<()> {
        let email = Message::builder()
            .from(self.from.parse().map_err(|e| anyhow!("Invalid from address: {}", e))?)
            .to(to.parse().map_err(|e| anyhow!("Invalid to address: {}", e))?)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())
            .context("Failed to build email")?;

        self.transport
            .send(email)
            .await
            .map_err(|e| anyhow!("Failed to send email: {}", e))?;
        Ok(())
    }
}

pub struct NotificationService {
    repo: Arc<dyn NotificationRepository>,
    user_repo: Arc<dyn UserRepository>,
    mailer: Option<Arc<dyn Mailer>>,
}

impl NotificationService {
    pub fn new(
        repo: Arc<dyn NotificationRepository>,
        user_repo: Arc<dyn UserRepository>,
        mailer: Option<Arc<dyn Mailer>>,
    ) -> Self {
        Self { repo, user_repo, mailer }
    }

    /// Store a notification and deliver it on every channel its priority
    /// routes to
    pub async fn notify(&self, outgoing: OutgoingNotification) -> Result<Notification, NotificationServiceError> {
        let stored = self.repo.insert(&outgoing).await?;

        if route(outgoing.priority).contains(&Channel::Email) {
            self.spawn_email(&stored).await;
        }

        tracing::debug!(
            user_id = stored.user_id,
            kind = %stored.kind,
            priority = %stored.priority,
            "Notification stored"
        );
        Ok(stored)
    }

    /// Notify without failing the caller; errors are logged
    pub async fn notify_best_effort(&self, outgoing: OutgoingNotification) {
        let user_id = outgoing.user_id;
        if let Err(e) = self.notify(outgoing).await {
            tracing::warn!(user_id, "Failed to deliver notification: {}", e);
        }
    }

    /// Send the same notification to every active moderator
    pub async fn notify_moderators(
        &self,
        kind: NotificationKind,
        priority: Priority,
        title: &str,
        body: &str,
    ) -> Result<usize, NotificationServiceError> {
        let moderators = self.user_repo.list_moderator_ids().await?;
        join_all(moderators.iter().map(|&moderator| {
            self.notify_best_effort(OutgoingNotification::new(moderator, kind, priority, title, body))
        }))
        .await;
        Ok(moderators.len())
    }

    pub async fn list(
        &self,
        user_id: i64,
        unread_only: bool,
        params: &ListParams,
    ) -> Result<PagedResult<Notification>, NotificationServiceError> {
        Ok(self.repo.list_for_user(user_id, unread_only, params).await?)
    }

    pub async fn mark_read(&self, id: i64, user_id: i64) -> Result<(), NotificationServiceError> {
        if self.repo.mark_read(id, user_id).await? {
            Ok(())
        } else {
            Err(NotificationServiceError::NotFound)
        }
    }

    pub async fn mark_all_read(&self, user_id: i64) -> Result<u64, NotificationServiceError> {
        Ok(self.repo.mark_all_read(user_id).await?)
    }

    async fn spawn_email(&self, notification: &Notification) {
        let Some(mailer) = self.mailer.clone() else {
            return;
        };

        let user = match self.user_repo.get_by_id(notification.user_id).await {
            Ok(Some(user)) if !user.email.is_empty() => user,
            Ok(_) => return,
            Err(e) => {
                tracing::warn!(user_id = notification.user_id, "Failed to look up email recipient: {}", e);
                return;
            }
        };

        let subject = format!("[{}] {}", notification.priority, notification.title);
        let body = notification.body.clone();
        let user_id = user.id;
        tokio::spawn(async move {
            if let Err(e) = mailer.send(&user.email, &subject, &body).await {
                tracing::warn!(user_id, "Email notification failed: {}", e);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::test_support::{insert_user, insert_user_with_role, setup_pool};
    use crate::db::repositories::{SqlxNotificationRepository, SqlxUserRepository};
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct RecordingMailer {
        sent: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl Mailer for RecordingMailer {
        async fn send(&self, to: &str, subject: &str, _body: &str) -> anyhow::Result<()> {
            self.sent.lock().await.push((to.to_string(), subject.to_string()));
            Ok(())
        }
    }

    async fn wait_for_mail(mailer: &RecordingMailer, expected: usize) {
        for _ in 0..50 {
            if mailer.sent.lock().await.len() >= expected {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
    }

    #[test]
    fn test_routing_table() {
        assert_eq!(route(Priority::Low), &[Channel::InApp]);
        assert_eq!(route(Priority::Normal), &[Channel::InApp]);
        assert_eq!(route(Priority::High), &[Channel::InApp, Channel::Email]);
        assert_eq!(route(Priority::Urgent), &[Channel::InApp, Channel::Email]);
    }

    #[tokio::test]
    async fn test_high_priority_also_emails() {
        let pool = setup_pool().await;
        let user = insert_user(&pool, "alice").await;
        let mailer = Arc::new(RecordingMailer::default());
        let service = NotificationService::new(
            SqlxNotificationRepository::boxed(pool.clone()),
            SqlxUserRepository::boxed(pool),
            Some(mailer.clone()),
        );

        service
            .notify(OutgoingNotification::new(user, NotificationKind::ContentRejected, Priority::Normal, "n", "b"))
            .await
            .unwrap();
        service
            .notify(OutgoingNotification::new(user, NotificationKind::ContentRejected, Priority::Urgent, "u", "b"))
            .await
            .unwrap();

        wait_for_mail(&mailer, 1).await;
        let sent = mailer.sent.lock().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "alice@example.com");
        assert_eq!(sent[0].1, "[urgent] u");
    }

    #[tokio::test]
    async fn test_without_mailer_only_in_app() {
        let pool = setup_pool().await;
        let user = insert_user(&pool, "alice").await;
        let service = NotificationService::new(
            SqlxNotificationRepository::boxed(pool.clone()),
            SqlxUserRepository::boxed(pool),
            None,
        );

        service
            .notify(OutgoingNotification::new(user, NotificationKind::AppealResolved, Priority::High, "t", "b"))
            .await
            .unwrap();
        let page = service.list(user, true, &ListParams::default()).await.unwrap();
        assert_eq!(page.total, 1);
    }

    #[tokio::test]
    async fn test_notify_moderators_and_read_state() {
        let pool = setup_pool().await;
        let moderator = insert_user_with_role(&pool, "mod", "moderator").await;
        let admin = insert_user_with_role(&pool, "root", "admin").await;
        insert_user(&pool, "member").await;
        let service = NotificationService::new(
            SqlxNotificationRepository::boxed(pool.clone()),
            SqlxUserRepository::boxed(pool),
            None,
        );

        let sent = service
            .notify_moderators(NotificationKind::AppealSubmitted, Priority::High, "Appeal", "body")
            .await
            .unwrap();
        assert_eq!(sent, 2);

        let page = service.list(moderator, false, &ListParams::default()).await.unwrap();
        let id = page.items[0].id;
        assert!(matches!(service.mark_read(id, admin).await, Err(NotificationServiceError::NotFound)));
        service.mark_read(id, moderator).await.unwrap();
        assert_eq!(service.mark_all_read(admin).await.unwrap(), 1);
    }
}
