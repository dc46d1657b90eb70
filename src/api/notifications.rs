//! Notification API endpoints
//!
//! - GET /api/v1/notifications?unread_only - Inbox, urgent first
//! - POST /api/v1/notifications/{id}/read - Mark one as read
//! - POST /api/v1/notifications/read-all - Mark all as read

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::common::{OkResponse, PaginationQuery};
use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::{Notification, PagedResult};

#[derive(Debug, Deserialize)]
pub struct InboxQuery {
    #[serde(default)]
    pub unread_only: bool,
}

#[derive(Debug, Serialize)]
pub struct MarkedResponse {
    pub marked: u64,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_notifications))
        .route("/{id}/read", post(mark_read))
        .route("/read-all", post(mark_all_read))
}

async fn list_notifications(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(inbox): Query<InboxQuery>,
    Query(page): Query<PaginationQuery>,
) -> Result<Json<PagedResult<Notification>>, ApiError> {
    let notifications = state
        .notification_service
        .list(user.0.id, inbox.unread_only, &page.params())
        .await?;
    Ok(Json(notifications))
}

async fn mark_read(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<OkResponse>, ApiError> {
    state.notification_service.mark_read(id, user.0.id).await?;
    Ok(Json(OkResponse::new()))
}

async fn mark_all_read(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<MarkedResponse>, ApiError> {
    let marked = state.notification_service.mark_all_read(user.0.id).await?;
    Ok(Json(MarkedResponse { marked }))
}
