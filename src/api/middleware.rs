//! API middleware
//!
//! Contains middleware for:
//! - Authentication (session token validation)
//! - Authorization (moderator and admin gates)
//!
//! and the JSON error type every handler returns.

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::models::User;
use crate::services::{
    AppealService, AppealServiceError, BulkService, BulkServiceError, CleanupService, CleanupServiceError,
    MarketplaceService, MarketplaceServiceError, ModerationService, ModerationServiceError, NotificationService,
    NotificationServiceError, ReportService, ReportServiceError, ReputationService, ReputationServiceError,
    Services, UserService, UserServiceError,
};

/// Application state containing shared services
#[derive(Clone)]
pub struct AppState {
    pub user_service: Arc<UserService>,
    pub moderation_service: Arc<ModerationService>,
    pub report_service: Arc<ReportService>,
    pub appeal_service: Arc<AppealService>,
    pub bulk_service: Arc<BulkService>,
    pub cleanup_service: Arc<CleanupService>,
    pub notification_service: Arc<NotificationService>,
    pub reputation_service: Arc<ReputationService>,
    pub marketplace_service: Arc<MarketplaceService>,
    /// Shared secret accepted by the cleanup endpoint
    pub cron_secret: Option<Arc<str>>,
}

impl AppState {
    pub fn new(services: &Services, cron_secret: Option<String>) -> Self {
        Self {
            user_service: services.users.clone(),
            moderation_service: services.moderation.clone(),
            report_service: services.reports.clone(),
            appeal_service: services.appeals.clone(),
            bulk_service: services.bulk.clone(),
            cleanup_service: services.cleanup.clone(),
            notification_service: services.notifications.clone(),
            reputation_service: services.reputation.clone(),
            marketplace_service: services.marketplace.clone(),
            cron_secret: cron_secret.filter(|s| !s.is_empty()).map(Arc::from),
        }
    }
}

/// Authenticated user extracted from request
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub User);

/// User of the request, if a valid session was presented
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<User>);

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .cloned()
            .ok_or_else(|| ApiError::unauthorized("Authentication required"))
    }
}

impl<S> FromRequestParts<S> for MaybeUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(MaybeUser(parts.extensions.get::<AuthenticatedUser>().map(|u| u.0.clone())))
    }
}

/// Error response for API errors
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    pub fn with_details(
        code: impl Into<String>,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
                details: Some(details),
            },
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new("UNAUTHORIZED", message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new("FORBIDDEN", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("NOT_FOUND", message)
    }

    pub fn validation_error(message: impl Into<String>) -> Self {
        Self::new("VALIDATION_ERROR", message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new("CONFLICT", message)
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new("RATE_LIMITED", message)
    }

    /// Log the cause and answer with a generic message
    pub fn internal(err: impl std::fmt::Display) -> Self {
        tracing::error!("Internal error: {}", err);
        Self::new("INTERNAL_ERROR", "Internal server error")
    }

    pub fn status(&self) -> StatusCode {
        match self.error.code.as_str() {
            "VALIDATION_ERROR" => StatusCode::BAD_REQUEST,
            "UNAUTHORIZED" => StatusCode::UNAUTHORIZED,
            "FORBIDDEN" => StatusCode::FORBIDDEN,
            "NOT_FOUND" => StatusCode::NOT_FOUND,
            "CONFLICT" => StatusCode::CONFLICT,
            "RATE_LIMITED" => StatusCode::TOO_MANY_REQUESTS,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(self)).into_response()
    }
}

// ============================================================================
// Service error mapping
// ============================================================================

impl From<UserServiceError> for ApiError {
    fn from(err: UserServiceError) -> Self {
        match err {
            UserServiceError::AuthenticationError(msg) => ApiError::unauthorized(msg),
            UserServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            UserServiceError::UserExists(msg) => ApiError::conflict(msg),
            UserServiceError::RateLimited => ApiError::with_details(
                "RATE_LIMITED",
                "Too many failed login attempts, try again later",
                serde_json::json!({ "retry_after": 900 }),
            ),
            UserServiceError::NotFound => ApiError::not_found("User not found"),
            UserServiceError::InternalError(e) => ApiError::internal(e),
        }
    }
}

impl From<ModerationServiceError> for ApiError {
    fn from(err: ModerationServiceError) -> Self {
        match err {
            ModerationServiceError::NotFound(what) => ApiError::not_found(format!("{} not found", what)),
            ModerationServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            ModerationServiceError::Conflict(msg) => ApiError::conflict(msg),
            ModerationServiceError::RateLimited => ApiError::rate_limited("Too many comments, slow down"),
            ModerationServiceError::AnalysisFailed(msg) => ApiError::internal(msg),
            ModerationServiceError::InternalError(e) => ApiError::internal(e),
        }
    }
}

impl From<ReportServiceError> for ApiError {
    fn from(err: ReportServiceError) -> Self {
        match err {
            ReportServiceError::NotFound(what) => ApiError::not_found(format!("{} not found", what)),
            ReportServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            ReportServiceError::Conflict(msg) => ApiError::conflict(msg),
            ReportServiceError::InternalError(e) => ApiError::internal(e),
        }
    }
}

impl From<AppealServiceError> for ApiError {
    fn from(err: AppealServiceError) -> Self {
        match err {
            AppealServiceError::NotFound(what) => ApiError::not_found(format!("{} not found", what)),
            AppealServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            AppealServiceError::Forbidden => ApiError::forbidden("Only the author may appeal this comment"),
            AppealServiceError::Conflict(msg) => ApiError::conflict(msg),
            AppealServiceError::InternalError(e) => ApiError::internal(e),
        }
    }
}

impl From<BulkServiceError> for ApiError {
    fn from(err: BulkServiceError) -> Self {
        match err {
            BulkServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            BulkServiceError::NotFound(missing) => ApiError::with_details(
                "NOT_FOUND",
                "Some comments do not exist; nothing was changed",
                serde_json::json!({ "missing_ids": missing }),
            ),
            BulkServiceError::InternalError(e) => ApiError::internal(e),
        }
    }
}

impl From<CleanupServiceError> for ApiError {
    fn from(err: CleanupServiceError) -> Self {
        match err {
            CleanupServiceError::InternalError(e) => ApiError::internal(e),
        }
    }
}

impl From<NotificationServiceError> for ApiError {
    fn from(err: NotificationServiceError) -> Self {
        match err {
            NotificationServiceError::NotFound => ApiError::not_found("Notification not found"),
            NotificationServiceError::InternalError(e) => ApiError::internal(e),
        }
    }
}

impl From<ReputationServiceError> for ApiError {
    fn from(err: ReputationServiceError) -> Self {
        match err {
            ReputationServiceError::NotFound => ApiError::not_found("User not found"),
            ReputationServiceError::InternalError(e) => ApiError::internal(e),
        }
    }
}

impl From<MarketplaceServiceError> for ApiError {
    fn from(err: MarketplaceServiceError) -> Self {
        match err {
            MarketplaceServiceError::NotFound(what) => ApiError::not_found(format!("{} not found", what)),
            MarketplaceServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            MarketplaceServiceError::Forbidden(msg) => ApiError::forbidden(msg),
            MarketplaceServiceError::Conflict(msg) => ApiError::conflict(msg),
            e @ MarketplaceServiceError::InvalidTransition { .. } => ApiError::with_details(
                "CONFLICT",
                e.to_string(),
                serde_json::json!({ "code": "INVALID_TRANSITION" }),
            ),
            MarketplaceServiceError::InternalError(e) => ApiError::internal(e),
        }
    }
}

// ============================================================================
// Authentication
// ============================================================================

/// Extract session token from request
pub(crate) fn extract_session_token(request: &Request) -> Option<String> {
    if let Some(auth_header) = request.headers().get(header::AUTHORIZATION) {
        if let Ok(auth_str) = auth_header.to_str() {
            if let Some(token) = auth_str.strip_prefix("Bearer ") {
                return Some(token.to_string());
            }
        }
    }

    if let Some(cookie_header) = request.headers().get(header::COOKIE) {
        if let Ok(cookie_str) = cookie_header.to_str() {
            for cookie in cookie_str.split(';') {
                let cookie = cookie.trim();
                if let Some(token) = cookie.strip_prefix("session=") {
                    return Some(token.to_string());
                }
            }
        }
    }

    None
}

/// Authentication middleware
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_session_token(&request)
        .ok_or_else(|| ApiError::unauthorized("Missing authentication token"))?;

    let user = state
        .user_service
        .validate_session(&token)
        .await?
        .ok_or_else(|| ApiError::unauthorized("Invalid or expired session"))?;

    request.extensions_mut().insert(AuthenticatedUser(user));
    Ok(next.run(request).await)
}

/// Optional authentication middleware
pub async fn optional_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    if let Some(token) = extract_session_token(&request) {
        if let Ok(Some(user)) = state.user_service.validate_session(&token).await {
            request.extensions_mut().insert(AuthenticatedUser(user));
        }
    }
    next.run(request).await
}

/// Moderator authorization middleware (admins pass too)
pub async fn require_moderator(request: Request, next: Next) -> Result<Response, ApiError> {
    let user = request
        .extensions()
        .get::<AuthenticatedUser>()
        .ok_or_else(|| ApiError::unauthorized("Authentication required"))?;

    if !user.0.is_moderator() {
        return Err(ApiError::forbidden("Moderator privileges required"));
    }

    Ok(next.run(request).await)
}

/// Admin authorization middleware
pub async fn require_admin(request: Request, next: Next) -> Result<Response, ApiError> {
    let user = request
        .extensions()
        .get::<AuthenticatedUser>()
        .ok_or_else(|| ApiError::unauthorized("Authentication required"))?;

    if !user.0.is_admin() {
        return Err(ApiError::forbidden("Admin privileges required"));
    }

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    #[test]
    fn test_error_codes_map_to_status() {
        assert_eq!(ApiError::validation_error("x").status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::unauthorized("x").status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::forbidden("x").status(), StatusCode::FORBIDDEN);
        assert_eq!(ApiError::not_found("x").status(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::conflict("x").status(), StatusCode::CONFLICT);
        assert_eq!(ApiError::rate_limited("x").status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(ApiError::new("SOMETHING", "x").status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_internal_errors_are_not_leaked() {
        let err: ApiError = ModerationServiceError::InternalError(anyhow::anyhow!("db exploded")).into();
        assert_eq!(err.error.message, "Internal server error");
    }

    #[test]
    fn test_extract_session_token() {
        let request = Request::builder()
            .header(header::AUTHORIZATION, "Bearer abc")
            .body(Body::empty())
            .unwrap();
        assert_eq!(extract_session_token(&request).as_deref(), Some("abc"));

        let request = Request::builder()
            .header(header::COOKIE, "theme=dark; session=xyz")
            .body(Body::empty())
            .unwrap();
        assert_eq!(extract_session_token(&request).as_deref(), Some("xyz"));

        let request = Request::builder().body(Body::empty()).unwrap();
        assert_eq!(extract_session_token(&request), None);
    }
}
