//! Moderation API endpoints (moderators and admins)
//!
//! - GET /api/v1/moderation/comments?status - Comments by status
//! - POST /api/v1/moderation/comments/{id}/analyze?apply - On-demand analysis
//! - PUT /api/v1/moderation/comments/{id}/status - Manual status change
//! - GET /api/v1/moderation/reviews?status - Reviews by status
//! - PUT /api/v1/moderation/reviews/{id}/status - Manual review status change
//! - GET /api/v1/moderation/reports?status - Report queue
//! - PUT /api/v1/moderation/reports/{id} - Uphold or dismiss a report
//! - GET /api/v1/moderation/appeals?status - Appeal queue
//! - PUT /api/v1/moderation/appeals/{id} - Grant or deny an appeal
//! - POST /api/v1/moderation/bulk - Bulk moderation
//! - GET /api/v1/moderation/queue - Outstanding work counts
//! - GET /api/v1/moderation/logs - Moderation log
//! - POST /api/v1/moderation/cleanup - Run the cleanup sweep (cron secret or admin)

use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    routing::{get, post, put},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use subtle::ConstantTimeEq;

use crate::api::common::PaginationQuery;
use crate::api::middleware::{ApiError, AppState, AuthenticatedUser, MaybeUser};
use crate::db::repositories::LogFilter;
use crate::models::{
    Appeal, AppealDecision, AppealStatus, BulkAction, BulkOutcome, Comment, ContentStatus, ModerationLog,
    PagedResult, QueueStats, Report, ReportAction, ReportStatus, Review,
};
use crate::services::{AnalysisReport, SweepReport};

/// Header carrying the shared secret for scheduled cleanup calls
pub const CRON_SECRET_HEADER: &str = "x-cron-secret";

#[derive(Debug, Deserialize)]
pub struct ContentStatusQuery {
    #[serde(default = "default_review_status")]
    pub status: ContentStatus,
}

fn default_review_status() -> ContentStatus {
    ContentStatus::Flagged
}

#[derive(Debug, Deserialize)]
pub struct AnalyzeQuery {
    #[serde(default)]
    pub apply: bool,
}

#[derive(Debug, Deserialize)]
pub struct SetStatusRequest {
    pub status: ContentStatus,
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReportStatusQuery {
    pub status: Option<ReportStatus>,
}

#[derive(Debug, Deserialize)]
pub struct ResolveReportRequest {
    pub action: ReportAction,
    pub note: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AppealStatusQuery {
    pub status: Option<AppealStatus>,
}

#[derive(Debug, Deserialize)]
pub struct ResolveAppealRequest {
    pub decision: AppealDecision,
    pub note: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct BulkRequest {
    pub comment_ids: Vec<i64>,
    pub action: BulkAction,
    pub reason: Option<String>,
}

/// Routes behind `require_auth` + `require_moderator`
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/comments", get(list_comments))
        .route("/comments/{id}/analyze", post(analyze_comment))
        .route("/comments/{id}/status", put(set_comment_status))
        .route("/reviews", get(list_reviews))
        .route("/reviews/{id}/status", put(set_review_status))
        .route("/reports", get(list_reports))
        .route("/reports/{id}", put(resolve_report))
        .route("/appeals", get(list_appeals))
        .route("/appeals/{id}", put(resolve_appeal))
        .route("/bulk", post(bulk_moderate))
        .route("/queue", get(queue_stats))
        .route("/logs", get(list_logs))
}

/// GET /api/v1/moderation/comments
async fn list_comments(
    State(state): State<AppState>,
    Query(filter): Query<ContentStatusQuery>,
    Query(page): Query<PaginationQuery>,
) -> Result<Json<PagedResult<Comment>>, ApiError> {
    let comments = state
        .moderation_service
        .list_by_status(filter.status, &page.params())
        .await?;
    Ok(Json(comments))
}

/// POST /api/v1/moderation/comments/{id}/analyze
async fn analyze_comment(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
    Query(query): Query<AnalyzeQuery>,
) -> Result<Json<AnalysisReport>, ApiError> {
    let report = state
        .moderation_service
        .analyze_comment(&user.0, id, query.apply)
        .await?;
    Ok(Json(report))
}

/// PUT /api/v1/moderation/comments/{id}/status
async fn set_comment_status(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
    Json(body): Json<SetStatusRequest>,
) -> Result<Json<Comment>, ApiError> {
    let comment = state
        .moderation_service
        .set_status(&user.0, id, body.status, body.reason)
        .await?;
    Ok(Json(comment))
}

/// GET /api/v1/moderation/reviews
async fn list_reviews(
    State(state): State<AppState>,
    Query(filter): Query<ContentStatusQuery>,
    Query(page): Query<PaginationQuery>,
) -> Result<Json<PagedResult<Review>>, ApiError> {
    let reviews = state
        .marketplace_service
        .list_reviews_by_status(filter.status, &page.params())
        .await?;
    Ok(Json(reviews))
}

/// PUT /api/v1/moderation/reviews/{id}/status
async fn set_review_status(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
    Json(body): Json<SetStatusRequest>,
) -> Result<Json<Review>, ApiError> {
    let review = state
        .marketplace_service
        .set_review_status(&user.0, id, body.status, body.reason)
        .await?;
    Ok(Json(review))
}

/// GET /api/v1/moderation/reports
async fn list_reports(
    State(state): State<AppState>,
    Query(filter): Query<ReportStatusQuery>,
    Query(page): Query<PaginationQuery>,
) -> Result<Json<PagedResult<Report>>, ApiError> {
    Ok(Json(state.report_service.list(filter.status, &page.params()).await?))
}

/// PUT /api/v1/moderation/reports/{id}
async fn resolve_report(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
    Json(body): Json<ResolveReportRequest>,
) -> Result<Json<Report>, ApiError> {
    let report = state
        .report_service
        .resolve(&user.0, id, body.action, body.note)
        .await?;
    Ok(Json(report))
}

/// GET /api/v1/moderation/appeals
async fn list_appeals(
    State(state): State<AppState>,
    Query(filter): Query<AppealStatusQuery>,
    Query(page): Query<PaginationQuery>,
) -> Result<Json<PagedResult<Appeal>>, ApiError> {
    Ok(Json(state.appeal_service.list(filter.status, &page.params()).await?))
}

/// PUT /api/v1/moderation/appeals/{id}
async fn resolve_appeal(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
    Json(body): Json<ResolveAppealRequest>,
) -> Result<Json<Appeal>, ApiError> {
    let appeal = state
        .appeal_service
        .resolve(&user.0, id, body.decision, body.note)
        .await?;
    Ok(Json(appeal))
}

/// POST /api/v1/moderation/bulk
async fn bulk_moderate(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<BulkRequest>,
) -> Result<Json<BulkOutcome>, ApiError> {
    let outcome = state
        .bulk_service
        .apply(&user.0, &body.comment_ids, body.action, body.reason)
        .await?;
    Ok(Json(outcome))
}

/// GET /api/v1/moderation/queue
async fn queue_stats(State(state): State<AppState>) -> Result<Json<QueueStats>, ApiError> {
    Ok(Json(state.moderation_service.queue_stats().await?))
}

/// GET /api/v1/moderation/logs
async fn list_logs(
    State(state): State<AppState>,
    Query(filter): Query<LogFilter>,
    Query(page): Query<PaginationQuery>,
) -> Result<Json<PagedResult<ModerationLog>>, ApiError> {
    Ok(Json(state.moderation_service.list_logs(&filter, &page.params()).await?))
}

/// POST /api/v1/moderation/cleanup
///
/// Mounted behind `optional_auth`: scheduled callers present the cron
/// secret, people need an admin session.
pub async fn run_cleanup(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
    headers: HeaderMap,
) -> Result<Json<SweepReport>, ApiError> {
    let given = headers.get(CRON_SECRET_HEADER).map(|v| v.as_bytes());
    if !cron_secret_matches(state.cron_secret.as_deref(), given) {
        match user {
            Some(user) if user.is_admin() => {}
            Some(_) => return Err(ApiError::forbidden("Admin privileges required")),
            None => return Err(ApiError::unauthorized("Cron secret or admin session required")),
        }
    }

    let report = state.cleanup_service.sweep(Utc::now()).await?;
    Ok(Json(report))
}

/// Compare the presented cron secret without leaking where it differs
fn cron_secret_matches(expected: Option<&str>, given: Option<&[u8]>) -> bool {
    match (expected, given) {
        (Some(expected), Some(given)) => expected.as_bytes().ct_eq(given).into(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cron_secret_matching() {
        assert!(cron_secret_matches(Some("tick-tock"), Some(b"tick-tock")));
        assert!(!cron_secret_matches(Some("tick-tock"), Some(b"tick-tick")));
        assert!(!cron_secret_matches(Some("tick-tock"), Some(b"tick")));
        assert!(!cron_secret_matches(Some("tick-tock"), Some(b"")));
        assert!(!cron_secret_matches(Some("tick-tock"), None));
        assert!(!cron_secret_matches(None, Some(b"tick-tock")));
    }
}
