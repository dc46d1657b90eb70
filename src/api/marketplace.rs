//! Marketplace API endpoints
//!
//! Products:
//! - GET /api/v1/products - Active products
//! - GET /api/v1/products/{id} - Product with rating summary
//! - POST /api/v1/products - Create a product
//! - PUT /api/v1/products/{id} - Update (seller or admin)
//! - DELETE /api/v1/products/{id} - Archive (seller or admin)
//!
//! Reviews:
//! - GET /api/v1/products/{id}/reviews - Approved reviews
//! - POST /api/v1/products/{id}/reviews - Review a product
//!
//! Orders:
//! - POST /api/v1/orders - Place an order
//! - GET /api/v1/orders - My orders
//! - GET /api/v1/orders/{id} - Order (buyer, seller or admin)
//! - PUT /api/v1/orders/{id}/status - Move an order along
//!
//! Wishlist:
//! - GET /api/v1/wishlist
//! - POST /api/v1/wishlist/{product_id}
//! - DELETE /api/v1/wishlist/{product_id}

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::common::PaginationQuery;
use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::{
    CreateOrderInput, CreateProductInput, CreateReviewInput, Order, OrderStatus, PagedResult, Product, Review,
    UpdateProductInput, WishlistItem,
};
use crate::services::ProductDetail;

#[derive(Debug, Deserialize)]
pub struct UpdateOrderStatusRequest {
    pub status: OrderStatus,
}

#[derive(Debug, Serialize)]
pub struct WishlistResponse {
    pub product_id: i64,
    pub added: bool,
}

/// Routes open to everyone
pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/products", get(list_products))
        .route("/products/{id}", get(get_product))
        .route("/products/{id}/reviews", get(list_reviews))
}

/// Routes behind `require_auth`
pub fn protected_router() -> Router<AppState> {
    Router::new()
        .route("/products", post(create_product))
        .route("/products/{id}", put(update_product).delete(archive_product))
        .route("/products/{id}/reviews", post(create_review))
        .route("/orders", post(place_order).get(list_orders))
        .route("/orders/{id}", get(get_order))
        .route("/orders/{id}/status", put(update_order_status))
        .route("/wishlist", get(list_wishlist))
        .route("/wishlist/{product_id}", post(add_to_wishlist).delete(remove_from_wishlist))
}

// ============================================================================
// Products
// ============================================================================

async fn list_products(
    State(state): State<AppState>,
    Query(page): Query<PaginationQuery>,
) -> Result<Json<PagedResult<Product>>, ApiError> {
    Ok(Json(state.marketplace_service.list_products(&page.params()).await?))
}

async fn get_product(State(state): State<AppState>, Path(id): Path<i64>) -> Result<Json<ProductDetail>, ApiError> {
    Ok(Json(state.marketplace_service.get_product(id).await?))
}

async fn create_product(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<CreateProductInput>,
) -> Result<impl IntoResponse, ApiError> {
    let product = state.marketplace_service.create_product(&user.0, body).await?;
    Ok((StatusCode::CREATED, Json(product)))
}

async fn update_product(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
    Json(body): Json<UpdateProductInput>,
) -> Result<Json<Product>, ApiError> {
    Ok(Json(state.marketplace_service.update_product(&user.0, id, body).await?))
}

async fn archive_product(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.marketplace_service.archive_product(&user.0, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Reviews
// ============================================================================

async fn list_reviews(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(page): Query<PaginationQuery>,
) -> Result<Json<PagedResult<Review>>, ApiError> {
    Ok(Json(state.marketplace_service.list_reviews(id, &page.params()).await?))
}

async fn create_review(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
    Json(body): Json<CreateReviewInput>,
) -> Result<impl IntoResponse, ApiError> {
    let review = state.marketplace_service.create_review(&user.0, id, body).await?;
    Ok((StatusCode::CREATED, Json(review)))
}

// ============================================================================
// Orders
// ============================================================================

async fn place_order(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<CreateOrderInput>,
) -> Result<impl IntoResponse, ApiError> {
    let order = state.marketplace_service.place_order(&user.0, body).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

async fn list_orders(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(page): Query<PaginationQuery>,
) -> Result<Json<PagedResult<Order>>, ApiError> {
    Ok(Json(state.marketplace_service.list_my_orders(&user.0, &page.params()).await?))
}

async fn get_order(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<Order>, ApiError> {
    Ok(Json(state.marketplace_service.get_order(&user.0, id).await?))
}

async fn update_order_status(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
    Json(body): Json<UpdateOrderStatusRequest>,
) -> Result<Json<Order>, ApiError> {
    let order = state
        .marketplace_service
        .update_order_status(&user.0, id, body.status)
        .await?;
    Ok(Json(order))
}

// ============================================================================
// Wishlist
// ============================================================================

async fn list_wishlist(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(page): Query<PaginationQuery>,
) -> Result<Json<PagedResult<WishlistItem>>, ApiError> {
    Ok(Json(state.marketplace_service.list_wishlist(&user.0, &page.params()).await?))
}

async fn add_to_wishlist(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(product_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let added = state.marketplace_service.add_to_wishlist(&user.0, product_id).await?;
    let status = if added { StatusCode::CREATED } else { StatusCode::OK };
    Ok((status, Json(WishlistResponse { product_id, added })))
}

async fn remove_from_wishlist(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(product_id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.marketplace_service.remove_from_wishlist(&user.0, product_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
