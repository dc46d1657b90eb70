//! Comment API endpoints
//!
//! - GET /api/v1/comments?target_type&target_id - Approved comments of a target
//! - GET /api/v1/comments/{id} - Single comment (non-approved ones only for the author and moderators)
//! - POST /api/v1/comments - Submit a comment for moderation
//! - POST /api/v1/comments/{id}/report - Report a comment

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;

use crate::api::common::PaginationQuery;
use crate::api::middleware::{ApiError, AppState, AuthenticatedUser, MaybeUser};
use crate::models::{Comment, CommentTarget, CreateCommentInput, PagedResult, Report, ReportReason};

/// Query parameters for listing comments of a target
#[derive(Debug, Deserialize)]
pub struct TargetQuery {
    pub target_type: CommentTarget,
    pub target_id: i64,
}

/// Request body for reporting a comment
#[derive(Debug, Deserialize)]
pub struct ReportRequest {
    pub reason: ReportReason,
    pub details: Option<String>,
}

/// GET /api/v1/comments
pub async fn list_comments(
    State(state): State<AppState>,
    Query(target): Query<TargetQuery>,
    Query(page): Query<PaginationQuery>,
) -> Result<Json<PagedResult<Comment>>, ApiError> {
    let comments = state
        .moderation_service
        .list_public(target.target_type, target.target_id, &page.params())
        .await?;
    Ok(Json(comments))
}

/// GET /api/v1/comments/{id}
pub async fn get_comment(
    State(state): State<AppState>,
    MaybeUser(viewer): MaybeUser,
    Path(id): Path<i64>,
) -> Result<Json<Comment>, ApiError> {
    let comment = state.moderation_service.get_comment(id, viewer.as_ref()).await?;
    Ok(Json(comment))
}

/// POST /api/v1/comments
///
/// The comment is stored as pending and analyzed in the background.
pub async fn create_comment(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<CreateCommentInput>,
) -> Result<impl IntoResponse, ApiError> {
    let comment = state.moderation_service.create_comment(&user.0, body).await?;
    Ok((StatusCode::CREATED, Json(comment)))
}

/// POST /api/v1/comments/{id}/report
pub async fn report_comment(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
    Json(body): Json<ReportRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let report: Report = state
        .report_service
        .file(&user.0, id, body.reason, body.details)
        .await?;
    Ok((StatusCode::CREATED, Json(report)))
}
