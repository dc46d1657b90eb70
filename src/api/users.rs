//! User API endpoints
//!
//! - GET /api/v1/users/{id}/reputation - Public reputation summary
//! - PUT /api/v1/admin/users/{id}/role - Change a user's role (admin)
//! - PUT /api/v1/admin/users/{id}/status - Suspend or reactivate a user (admin)

use axum::{
    extract::{Path, State},
    routing::put,
    Json, Router,
};
use serde::Deserialize;

use crate::api::auth::UserResponse;
use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::{ReputationSummary, UserRole, UserStatus};

#[derive(Debug, Deserialize)]
pub struct UpdateRoleRequest {
    pub role: UserRole,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: UserStatus,
}

/// Routes behind `require_auth` + `require_admin`
pub fn admin_router() -> Router<AppState> {
    Router::new()
        .route("/users/{id}/role", put(update_role))
        .route("/users/{id}/status", put(update_status))
}

/// GET /api/v1/users/{id}/reputation
pub async fn get_reputation(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<ReputationSummary>, ApiError> {
    Ok(Json(state.reputation_service.summary(id).await?))
}

async fn update_role(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
    Json(body): Json<UpdateRoleRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    let updated = state.user_service.set_role(&user.0, id, body.role).await?;
    Ok(Json(updated.into()))
}

async fn update_status(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
    Json(body): Json<UpdateStatusRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    let updated = state.user_service.set_status(&user.0, id, body.status).await?;
    Ok(Json(updated.into()))
}
