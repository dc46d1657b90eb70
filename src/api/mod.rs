//! API layer - HTTP handlers and routing
//!
//! All endpoints live under `/api/v1`:
//! - Auth: registration, login, sessions
//! - Comments and reports
//! - Appeals
//! - Moderation (moderators and admins)
//! - Notifications and reputation
//! - Marketplace: products, reviews, orders, wishlist
//! - Admin user management

pub mod appeals;
pub mod auth;
pub mod comments;
pub mod common;
pub mod marketplace;
pub mod middleware;
pub mod moderation;
pub mod notifications;
pub mod users;

use axum::{
    http::{header, HeaderName, HeaderValue, Method},
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub use middleware::{ApiError, AppState};

/// Build the main API router
pub fn build_api_router(state: AppState) -> Router<AppState> {
    // Admin routes (need admin role)
    let admin_routes = Router::new()
        .nest("/admin", users::admin_router())
        .route_layer(axum_middleware::from_fn(middleware::require_admin))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ));

    // Moderation routes (moderators and admins)
    let moderation_routes = Router::new()
        .nest("/moderation", moderation::router())
        .route_layer(axum_middleware::from_fn(middleware::require_moderator))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ));

    // Protected routes (need auth but no particular role)
    let protected_routes = Router::new()
        .nest("/auth", auth::protected_router())
        .nest("/appeals", appeals::router())
        .nest("/notifications", notifications::router())
        .route("/comments", post(comments::create_comment))
        .route("/comments/{id}/report", post(comments::report_comment))
        .merge(marketplace::protected_router())
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ));

    // Routes that look at the session when one is presented
    let optional_routes = Router::new()
        .route("/comments/{id}", get(comments::get_comment))
        .route("/moderation/cleanup", post(moderation::run_cleanup))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::optional_auth,
        ));

    // Public routes
    Router::new()
        .nest("/auth", auth::public_router())
        .route("/comments", get(comments::list_comments))
        .route("/users/{id}/reputation", get(users::get_reputation))
        .merge(marketplace::public_router())
        .merge(optional_routes)
        .merge(admin_routes)
        .merge(moderation_routes)
        .merge(protected_routes)
}

/// Build the complete router with middleware
pub fn build_router(state: AppState, cors_origin: &str) -> Router {
    Router::new()
        .nest("/api/v1", build_api_router(state.clone()))
        .layer(cors_layer(cors_origin))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// CORS with cookie credentials for the configured origin
fn cors_layer(cors_origin: &str) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            header::COOKIE,
            HeaderName::from_static(moderation::CRON_SECRET_HEADER),
        ]);

    match cors_origin.parse::<HeaderValue>() {
        Ok(origin) => cors.allow_origin(origin).allow_credentials(true),
        Err(e) => {
            tracing::warn!(origin = cors_origin, "Invalid CORS origin, cross-origin requests disabled: {}", e);
            cors
        }
    }
}
