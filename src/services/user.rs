//! User service
//!
//! Registration (the first account becomes admin), login with per-username
//! rate limiting, session validation and admin role/status management.

use anyhow::Context;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

use crate::db::repositories::{SessionRepository, UserRepository};
use crate::models::{Session, User, UserRole, UserStatus};
use crate::services::password::{hash_password, verify_password};
use crate::services::rate_limiter::RateLimiter;

/// Default session lifetime in days
const DEFAULT_SESSION_EXPIRATION_DAYS: i64 = 7;

const MIN_PASSWORD_LEN: usize = 8;

#[derive(Debug, thiserror::Error)]
pub enum UserServiceError {
    #[error("Authentication failed: {0}")]
    AuthenticationError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("User already exists: {0}")]
    UserExists(String),

    #[error("Too many login attempts, try again later")]
    RateLimited,

    #[error("User not found")]
    NotFound,

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

#[derive(Debug, Clone)]
pub struct RegisterInput {
    pub username: String,
    pub email: String,
    pub password: String,
}

impl RegisterInput {
    pub fn new(username: impl Into<String>, email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            email: email.into(),
            password: password.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoginInput {
    /// Username or email
    pub username_or_email: String,
    pub password: String,
}

impl LoginInput {
    pub fn new(username_or_email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username_or_email: username_or_email.into(),
            password: password.into(),
        }
    }
}

pub struct UserService {
    user_repo: Arc<dyn UserRepository>,
    session_repo: Arc<dyn SessionRepository>,
    login_limiter: Arc<RateLimiter>,
    session_lifetime: Duration,
}

impl UserService {
    pub fn new(
        user_repo: Arc<dyn UserRepository>,
        session_repo: Arc<dyn SessionRepository>,
        login_limiter: Arc<RateLimiter>,
    ) -> Self {
        Self {
            user_repo,
            session_repo,
            login_limiter,
            session_lifetime: Duration::days(DEFAULT_SESSION_EXPIRATION_DAYS),
        }
    }

    /// Register a new account. The first account in the system becomes admin.
    pub async fn register(&self, input: RegisterInput) -> Result<User, UserServiceError> {
        let input = RegisterInput {
            username: input.username.trim().to_string(),
            email: input.email.trim().to_lowercase(),
            password: input.password,
        };
        validate_register_input(&input)?;

        if self.user_repo.get_by_username(&input.username).await?.is_some() {
            return Err(UserServiceError::UserExists(format!(
                "Username '{}' is already taken",
                input.username
            )));
        }
        if self.user_repo.get_by_email(&input.email).await?.is_some() {
            return Err(UserServiceError::UserExists(format!(
                "Email '{}' is already registered",
                input.email
            )));
        }

        let role = if self.user_repo.count().await? == 0 {
            UserRole::Admin
        } else {
            UserRole::User
        };

        let password_hash = hash_password(&input.password).context("Failed to hash password")?;
        let user = User::new(input.username, input.email, password_hash, role);
        let created = self.user_repo.create(&user).await.context("Failed to create user")?;

        tracing::info!(user_id = created.id, role = %created.role, "User registered");
        Ok(created)
    }

    /// Check credentials and open a session.
    ///
    /// Failed attempts count against the username; after five failures in
    /// fifteen minutes further attempts are refused without checking the
    /// password.
    pub async fn login(&self, input: LoginInput) -> Result<(Session, User), UserServiceError> {
        let key = input.username_or_email.trim().to_string();
        if self.login_limiter.is_limited(&key).await {
            tracing::warn!(login = %key, "Login rate limited");
            return Err(UserServiceError::RateLimited);
        }

        let user = match self.find_user_by_username_or_email(&key).await? {
            Some(user) => user,
            None => {
                self.login_limiter.record(&key).await;
                return Err(invalid_credentials());
            }
        };

        if !verify_password(&input.password, &user.password_hash).context("Failed to verify password")? {
            self.login_limiter.record(&key).await;
            return Err(invalid_credentials());
        }

        if user.is_suspended() {
            return Err(UserServiceError::AuthenticationError(
                "This account has been suspended".to_string(),
            ));
        }

        self.login_limiter.clear(&key).await;

        let session = Session::issue(user.id, self.session_lifetime);
        let session = self.session_repo.create(&session).await.context("Failed to create session")?;
        Ok((session, user))
    }

    pub async fn logout(&self, token: &str) -> Result<(), UserServiceError> {
        self.session_repo.delete(token).await.context("Failed to delete session")?;
        Ok(())
    }

    /// Resolve a session token to its user.
    ///
    /// Expired sessions are deleted; suspended users get `None`.
    pub async fn validate_session(&self, token: &str) -> Result<Option<User>, UserServiceError> {
        let Some(session) = self.session_repo.get_by_id(token).await.context("Failed to get session")? else {
            return Ok(None);
        };

        if session.is_expired() {
            if let Err(e) = self.session_repo.delete(token).await {
                tracing::warn!("Failed to delete expired session: {}", e);
            }
            return Ok(None);
        }

        let user = self
            .user_repo
            .get_by_id(session.user_id)
            .await
            .context("Failed to get user")?;
        Ok(user.filter(|u| !u.is_suspended()))
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<User>, UserServiceError> {
        Ok(self.user_repo.get_by_id(id).await.context("Failed to get user by ID")?)
    }

    /// Change a user's role; admins cannot change their own role
    pub async fn set_role(&self, acting: &User, target_id: i64, role: UserRole) -> Result<User, UserServiceError> {
        if acting.id == target_id {
            return Err(UserServiceError::ValidationError(
                "You cannot change your own role".to_string(),
            ));
        }
        if !self.user_repo.update_role(target_id, role).await? {
            return Err(UserServiceError::NotFound);
        }
        tracing::info!(actor = acting.id, target = target_id, role = %role, "User role changed");
        self.get_by_id(target_id).await?.ok_or(UserServiceError::NotFound)
    }

    /// Suspend or reactivate a user. Suspension ends all their sessions.
    pub async fn set_status(&self, acting: &User, target_id: i64, status: UserStatus) -> Result<User, UserServiceError> {
        if acting.id == target_id {
            return Err(UserServiceError::ValidationError(
                "You cannot change your own status".to_string(),
            ));
        }
        if !self.user_repo.update_status(target_id, status).await? {
            return Err(UserServiceError::NotFound);
        }
        if status == UserStatus::Suspended {
            let dropped = self.session_repo.delete_by_user(target_id).await?;
            tracing::info!(target = target_id, sessions = dropped, "User suspended");
        }
        self.get_by_id(target_id).await?.ok_or(UserServiceError::NotFound)
    }

    /// Delete sessions that expired before `now`
    pub async fn cleanup_expired_sessions(&self, now: DateTime<Utc>) -> Result<u64, UserServiceError> {
        Ok(self
            .session_repo
            .delete_expired(now)
            .await
            .context("Failed to delete expired sessions")?)
    }

    async fn find_user_by_username_or_email(&self, login: &str) -> Result<Option<User>, UserServiceError> {
        if let Some(user) = self.user_repo.get_by_username(login).await? {
            return Ok(Some(user));
        }
        Ok(self.user_repo.get_by_email(&login.to_lowercase()).await?)
    }
}

fn invalid_credentials() -> UserServiceError {
    UserServiceError::AuthenticationError("Invalid username or password".to_string())
}

fn validate_register_input(input: &RegisterInput) -> Result<(), UserServiceError> {
    let name_len = input.username.chars().count();
    if !(3..=50).contains(&name_len) {
        return Err(UserServiceError::ValidationError(
            "Username must be between 3 and 50 characters".to_string(),
        ));
    }
    if !input
        .username
        .chars()
        .all(|c| c.is_alphanumeric() || c == '_' || c == '-')
    {
        return Err(UserServiceError::ValidationError(
            "Username may only contain letters, digits, '_' and '-'".to_string(),
        ));
    }
    if !input.email.contains('@') || input.email.starts_with('@') || input.email.ends_with('@') {
        return Err(UserServiceError::ValidationError("Invalid email format".to_string()));
    }
    if input.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(UserServiceError::ValidationError(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::test_support::setup_pool;
    use crate::db::repositories::{SqlxSessionRepository, SqlxUserRepository};

    async fn setup_service() -> UserService {
        let pool = setup_pool().await;
        UserService::new(
            SqlxUserRepository::boxed(pool.clone()),
            SqlxSessionRepository::boxed(pool),
            Arc::new(RateLimiter::for_logins()),
        )
    }

    #[tokio::test]
    async fn test_first_user_becomes_admin() {
        let service = setup_service().await;

        let first = service
            .register(RegisterInput::new("admin", "admin@example.com", "password123"))
            .await
            .unwrap();
        let second = service
            .register(RegisterInput::new("bob", "bob@example.com", "password123"))
            .await
            .unwrap();

        assert_eq!(first.role, UserRole::Admin);
        assert_eq!(second.role, UserRole::User);
    }

    #[tokio::test]
    async fn test_register_validation_and_duplicates() {
        let service = setup_service().await;

        let short = service.register(RegisterInput::new("ab", "ab@example.com", "password123")).await;
        assert!(matches!(short, Err(UserServiceError::ValidationError(_))));
        let weak = service.register(RegisterInput::new("abc", "abc@example.com", "short")).await;
        assert!(matches!(weak, Err(UserServiceError::ValidationError(_))));
        let email = service.register(RegisterInput::new("abc", "nope", "password123")).await;
        assert!(matches!(email, Err(UserServiceError::ValidationError(_))));

        service
            .register(RegisterInput::new("alice", "alice@example.com", "password123"))
            .await
            .unwrap();
        let dup = service
            .register(RegisterInput::new("alice", "other@example.com", "password123"))
            .await;
        assert!(matches!(dup, Err(UserServiceError::UserExists(_))));
        let dup_email = service
            .register(RegisterInput::new("alice2", "ALICE@example.com", "password123"))
            .await;
        assert!(matches!(dup_email, Err(UserServiceError::UserExists(_))));
    }

    #[tokio::test]
    async fn test_login_and_session_roundtrip() {
        let service = setup_service().await;
        service
            .register(RegisterInput::new("alice", "alice@example.com", "password123"))
            .await
            .unwrap();

        let (session, user) = service.login(LoginInput::new("alice@example.com", "password123")).await.unwrap();
        assert_eq!(user.username, "alice");

        let resolved = service.validate_session(&session.id).await.unwrap().unwrap();
        assert_eq!(resolved.id, user.id);

        service.logout(&session.id).await.unwrap();
        assert!(service.validate_session(&session.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_login_rate_limited_after_five_failures() {
        let service = setup_service().await;
        service
            .register(RegisterInput::new("alice", "alice@example.com", "password123"))
            .await
            .unwrap();

        for _ in 0..5 {
            let result = service.login(LoginInput::new("alice", "wrong-password")).await;
            assert!(matches!(result, Err(UserServiceError::AuthenticationError(_))));
        }
        let limited = service.login(LoginInput::new("alice", "password123")).await;
        assert!(matches!(limited, Err(UserServiceError::RateLimited)));
    }

    #[tokio::test]
    async fn test_suspension_blocks_login_and_sessions() {
        let service = setup_service().await;
        let admin = service
            .register(RegisterInput::new("admin", "admin@example.com", "password123"))
            .await
            .unwrap();
        let bob = service
            .register(RegisterInput::new("bob", "bob@example.com", "password123"))
            .await
            .unwrap();
        let (session, _) = service.login(LoginInput::new("bob", "password123")).await.unwrap();

        let suspended = service.set_status(&admin, bob.id, UserStatus::Suspended).await.unwrap();
        assert!(suspended.is_suspended());
        assert!(service.validate_session(&session.id).await.unwrap().is_none());

        let login = service.login(LoginInput::new("bob", "password123")).await;
        assert!(matches!(login, Err(UserServiceError::AuthenticationError(_))));

        let own = service.set_status(&admin, admin.id, UserStatus::Suspended).await;
        assert!(matches!(own, Err(UserServiceError::ValidationError(_))));
    }

    #[tokio::test]
    async fn test_set_role() {
        let service = setup_service().await;
        let admin = service
            .register(RegisterInput::new("admin", "admin@example.com", "password123"))
            .await
            .unwrap();
        let bob = service
            .register(RegisterInput::new("bob", "bob@example.com", "password123"))
            .await
            .unwrap();

        let promoted = service.set_role(&admin, bob.id, UserRole::Moderator).await.unwrap();
        assert!(promoted.is_moderator());
        assert!(matches!(
            service.set_role(&admin, 999, UserRole::Moderator).await,
            Err(UserServiceError::NotFound)
        ));
    }
}
