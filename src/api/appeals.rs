//! Appeal API endpoints
//!
//! - POST /api/v1/appeals - Appeal a rejected or flagged comment
//! - GET /api/v1/appeals/mine - Appeals filed by the current user

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use crate::api::common::PaginationQuery;
use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::{Appeal, PagedResult};

#[derive(Debug, Deserialize)]
pub struct CreateAppealRequest {
    pub comment_id: i64,
    pub reason: String,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_appeal))
        .route("/mine", get(list_my_appeals))
}

async fn create_appeal(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<CreateAppealRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let appeal = state
        .appeal_service
        .submit(&user.0, body.comment_id, &body.reason)
        .await?;
    Ok((StatusCode::CREATED, Json(appeal)))
}

async fn list_my_appeals(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(page): Query<PaginationQuery>,
) -> Result<Json<PagedResult<Appeal>>, ApiError> {
    Ok(Json(state.appeal_service.list_mine(&user.0, &page.params()).await?))
}
