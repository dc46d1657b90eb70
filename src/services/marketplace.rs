//! Marketplace service
//!
//! Products, orders, reviews and wishlists. Reviews go through the same
//! analyzer and policy as comments, synchronously.

use serde::Serialize;
use std::sync::Arc;

use super::analysis::ToxicityAnalyzer;
use super::moderation::ModerationEffects;
use super::policy::ModerationPolicy;
use crate::db::repositories::{
    NewReview, OrderRepository, PlaceOrder, ProductRepository, ReviewInsert, ReviewRepository, WishlistRepository,
};
use crate::models::{
    ActivityKind, ContentStatus, CreateOrderInput, CreateProductInput, CreateReviewInput, ListParams,
    NotificationKind, Order, OrderActor, OrderStatus, OutgoingNotification, PagedResult, Priority, Product,
    ProductStatus, Review, TransitionOutcome, UpdateProductInput, User, WishlistItem,
};

const MAX_NAME_CHARS: usize = 200;
const MAX_DESCRIPTION_CHARS: usize = 5000;
const MAX_REVIEW_CHARS: usize = 2000;
const MAX_ORDER_QUANTITY: i64 = 1000;

#[derive(Debug, thiserror::Error)]
pub enum MarketplaceServiceError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Cannot move order from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Product with its review aggregate
#[derive(Debug, Clone, Serialize)]
pub struct ProductDetail {
    #[serde(flatten)]
    pub product: Product,
    pub review_count: i64,
    pub average_rating: Option<f64>,
}

pub struct MarketplaceService {
    products: Arc<dyn ProductRepository>,
    orders: Arc<dyn OrderRepository>,
    reviews: Arc<dyn ReviewRepository>,
    wishlist: Arc<dyn WishlistRepository>,
    analyzer: Arc<dyn ToxicityAnalyzer>,
    policy: ModerationPolicy,
    effects: Arc<ModerationEffects>,
}

impl MarketplaceService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        products: Arc<dyn ProductRepository>,
        orders: Arc<dyn OrderRepository>,
        reviews: Arc<dyn ReviewRepository>,
        wishlist: Arc<dyn WishlistRepository>,
        analyzer: Arc<dyn ToxicityAnalyzer>,
        policy: ModerationPolicy,
        effects: Arc<ModerationEffects>,
    ) -> Self {
        Self {
            products,
            orders,
            reviews,
            wishlist,
            analyzer,
            policy,
            effects,
        }
    }

    // ------------------------------------------------------------------
    // Products
    // ------------------------------------------------------------------

    pub async fn create_product(
        &self,
        seller: &User,
        mut input: CreateProductInput,
    ) -> Result<Product, MarketplaceServiceError> {
        input.name = validate_name(&input.name)?;
        validate_description(&input.description)?;
        validate_amount("price_cents", input.price_cents)?;
        validate_amount("stock", input.stock)?;

        let product = self.products.create(seller.id, &input).await?;
        tracing::info!(product_id = product.id, seller_id = seller.id, "Product created");
        Ok(product)
    }

    pub async fn list_products(&self, params: &ListParams) -> Result<PagedResult<Product>, MarketplaceServiceError> {
        Ok(self.products.list_active(params).await?)
    }

    pub async fn get_product(&self, id: i64) -> Result<ProductDetail, MarketplaceServiceError> {
        let product = self.find_product(id).await?;
        let (review_count, average_rating) = self.reviews.rating_summary(id).await?;
        Ok(ProductDetail {
            product,
            review_count,
            average_rating,
        })
    }

    pub async fn update_product(
        &self,
        user: &User,
        id: i64,
        mut input: UpdateProductInput,
    ) -> Result<Product, MarketplaceServiceError> {
        let product = self.find_product(id).await?;
        if !user.can_manage(product.seller_id) {
            return Err(MarketplaceServiceError::Forbidden("Only the seller may edit this product".to_string()));
        }

        if let Some(name) = &input.name {
            input.name = Some(validate_name(name)?);
        }
        if let Some(description) = &input.description {
            validate_description(description)?;
        }
        if let Some(price) = input.price_cents {
            validate_amount("price_cents", price)?;
        }
        if let Some(stock) = input.stock {
            validate_amount("stock", stock)?;
        }

        self.products
            .update(id, &input)
            .await?
            .ok_or(MarketplaceServiceError::NotFound("Product"))
    }

    pub async fn archive_product(&self, user: &User, id: i64) -> Result<(), MarketplaceServiceError> {
        let product = self.find_product(id).await?;
        if !user.can_manage(product.seller_id) {
            return Err(MarketplaceServiceError::Forbidden(
                "Only the seller may archive this product".to_string(),
            ));
        }
        if product.status == ProductStatus::Archived {
            return Err(MarketplaceServiceError::Conflict("Product is already archived".to_string()));
        }

        self.products.set_status(id, ProductStatus::Archived).await?;
        tracing::info!(product_id = id, user_id = user.id, "Product archived");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Orders
    // ------------------------------------------------------------------

    pub async fn place_order(&self, buyer: &User, input: CreateOrderInput) -> Result<Order, MarketplaceServiceError> {
        if !(1..=MAX_ORDER_QUANTITY).contains(&input.quantity) {
            return Err(MarketplaceServiceError::ValidationError(format!(
                "Quantity must be between 1 and {}",
                MAX_ORDER_QUANTITY
            )));
        }

        match self.orders.create(buyer.id, input.product_id, input.quantity).await? {
            PlaceOrder::Placed(order) => {
                tracing::info!(order_id = order.id, buyer_id = buyer.id, "Order placed");
                Ok(order)
            }
            PlaceOrder::ProductUnavailable => Err(MarketplaceServiceError::NotFound("Product")),
            PlaceOrder::InsufficientStock { available } => Err(MarketplaceServiceError::Conflict(format!(
                "Only {} in stock",
                available
            ))),
            PlaceOrder::TotalTooLarge => Err(MarketplaceServiceError::ValidationError(
                "Order total is too large".to_string(),
            )),
        }
    }

    pub async fn list_my_orders(
        &self,
        buyer: &User,
        params: &ListParams,
    ) -> Result<PagedResult<Order>, MarketplaceServiceError> {
        Ok(self.orders.list_by_buyer(buyer.id, params).await?)
    }

    pub async fn get_order(&self, user: &User, id: i64) -> Result<Order, MarketplaceServiceError> {
        let (order, _) = self.order_with_actor(user, id).await?;
        Ok(order)
    }

    pub async fn update_order_status(
        &self,
        user: &User,
        id: i64,
        to: OrderStatus,
    ) -> Result<Order, MarketplaceServiceError> {
        let (order, actor) = self.order_with_actor(user, id).await?;
        let from = order.status;

        if !from.can_transition_to(to) {
            return Err(MarketplaceServiceError::InvalidTransition { from, to });
        }
        if !from.actor_may_transition(to, actor) {
            return Err(MarketplaceServiceError::Forbidden(format!(
                "You may not move this order to {}",
                to
            )));
        }

        if !self.orders.transition(id, from, to).await? {
            return Err(MarketplaceServiceError::Conflict("Order was updated concurrently".to_string()));
        }
        tracing::info!(order_id = id, user_id = user.id, %from, %to, "Order status changed");

        if actor != OrderActor::Buyer {
            self.effects
                .notifications()
                .notify_best_effort(OutgoingNotification::new(
                    order.buyer_id,
                    NotificationKind::OrderUpdated,
                    Priority::Normal,
                    "Order updated",
                    format!("Order #{} is now {}.", id, to),
                ))
                .await;
        }

        self.orders
            .get_by_id(id)
            .await?
            .ok_or(MarketplaceServiceError::NotFound("Order"))
    }

    /// Load an order and work out in which role `user` acts on it
    async fn order_with_actor(&self, user: &User, id: i64) -> Result<(Order, OrderActor), MarketplaceServiceError> {
        let order = self
            .orders
            .get_by_id(id)
            .await?
            .ok_or(MarketplaceServiceError::NotFound("Order"))?;

        if user.is_admin() {
            return Ok((order, OrderActor::Admin));
        }
        if order.buyer_id == user.id {
            return Ok((order, OrderActor::Buyer));
        }
        let seller_id = self.products.get_by_id(order.product_id).await?.map(|p| p.seller_id);
        if seller_id == Some(user.id) {
            return Ok((order, OrderActor::Seller));
        }
        Err(MarketplaceServiceError::Forbidden("Not your order".to_string()))
    }

    // ------------------------------------------------------------------
    // Reviews
    // ------------------------------------------------------------------

    pub async fn create_review(
        &self,
        user: &User,
        product_id: i64,
        input: CreateReviewInput,
    ) -> Result<Review, MarketplaceServiceError> {
        if !(1..=5).contains(&input.rating) {
            return Err(MarketplaceServiceError::ValidationError(
                "Rating must be between 1 and 5".to_string(),
            ));
        }
        let body = input.body.trim();
        let chars = body.chars().count();
        if chars == 0 || chars > MAX_REVIEW_CHARS {
            return Err(MarketplaceServiceError::ValidationError(format!(
                "Review must be between 1 and {} characters",
                MAX_REVIEW_CHARS
            )));
        }

        self.find_product(product_id).await?;
        let verified_purchase = self.orders.has_delivered(user.id, product_id).await?;

        // An analyzer outage leaves the review pending for a moderator
        let (status, toxicity_score) = match self.analyzer.analyze(body).await {
            Ok(analysis) => {
                let reputation = self.effects.reputation().total(user.id).await.unwrap_or(0);
                let decision = self.policy.decide(analysis.score, 0, reputation);
                (decision.target_status(), Some(analysis.score))
            }
            Err(e) => {
                tracing::warn!(product_id, user_id = user.id, "Review analysis failed: {}", e);
                (ContentStatus::Pending, None)
            }
        };

        let new_review = NewReview {
            product_id,
            user_id: user.id,
            rating: input.rating,
            body,
            status,
            verified_purchase,
            toxicity_score,
        };

        let review = match self.reviews.create(&new_review).await? {
            ReviewInsert::Created(review) => review,
            ReviewInsert::Duplicate => {
                return Err(MarketplaceServiceError::Conflict(
                    "You already reviewed this product".to_string(),
                ))
            }
        };

        tracing::info!(review_id = review.id, product_id, status = %review.status, "Review created");
        if review.status == ContentStatus::Approved {
            self.effects
                .reputation()
                .record_best_effort(user.id, ActivityKind::ReviewPosted, Some(review.id))
                .await;
        }
        Ok(review)
    }

    pub async fn list_reviews(
        &self,
        product_id: i64,
        params: &ListParams,
    ) -> Result<PagedResult<Review>, MarketplaceServiceError> {
        self.find_product(product_id).await?;
        Ok(self.reviews.list_public(product_id, params).await?)
    }

    /// Review queue for moderators
    pub async fn list_reviews_by_status(
        &self,
        status: ContentStatus,
        params: &ListParams,
    ) -> Result<PagedResult<Review>, MarketplaceServiceError> {
        Ok(self.reviews.list_by_status(status, params).await?)
    }

    /// Manual moderation of a review
    pub async fn set_review_status(
        &self,
        moderator: &User,
        review_id: i64,
        to: ContentStatus,
        reason: Option<String>,
    ) -> Result<Review, MarketplaceServiceError> {
        if to == ContentStatus::Pending {
            return Err(MarketplaceServiceError::ValidationError(
                "Reviews cannot be moved back to pending".to_string(),
            ));
        }
        let reason = reason.map(|r| r.trim().to_string()).filter(|r| !r.is_empty());

        let from = match self
            .reviews
            .set_status(review_id, to, moderator.id, reason.as_deref())
            .await?
        {
            TransitionOutcome::Applied { from, .. } => from,
            TransitionOutcome::Skipped { current } => {
                return Err(MarketplaceServiceError::Conflict(format!("Review is already {}", current)))
            }
            TransitionOutcome::NotFound => return Err(MarketplaceServiceError::NotFound("Review")),
        };

        let review = self
            .reviews
            .get_by_id(review_id)
            .await?
            .ok_or(MarketplaceServiceError::NotFound("Review"))?;
        tracing::info!(review_id, moderator_id = moderator.id, %from, %to, "Review status set");

        // Only a review leaving the queue earns credit
        if to == ContentStatus::Approved && matches!(from, ContentStatus::Pending | ContentStatus::Flagged) {
            self.effects
                .reputation()
                .record_best_effort(review.user_id, ActivityKind::ReviewPosted, Some(review.id))
                .await;
        }

        let notice = match (from, to) {
            (_, ContentStatus::Rejected) => Some((NotificationKind::ContentRejected, "Your review was removed")),
            (_, ContentStatus::Flagged) => Some((NotificationKind::ContentFlagged, "Your review is under review")),
            (ContentStatus::Pending | ContentStatus::Flagged, ContentStatus::Approved) => {
                Some((NotificationKind::ContentRestored, "Your review is now public"))
            }
            (ContentStatus::Rejected, ContentStatus::Approved) => {
                Some((NotificationKind::ContentRestored, "Your review was restored"))
            }
            _ => None,
        };
        if let Some((kind, title)) = notice {
            self.effects
                .notifications()
                .notify_best_effort(OutgoingNotification::new(
                    review.user_id,
                    kind,
                    Priority::Normal,
                    title,
                    format!("Your review #{} is now {}.", review.id, to),
                ))
                .await;
        }

        Ok(review)
    }

    // ------------------------------------------------------------------
    // Wishlist
    // ------------------------------------------------------------------

    pub async fn add_to_wishlist(&self, user: &User, product_id: i64) -> Result<bool, MarketplaceServiceError> {
        let product = self.find_product(product_id).await?;
        if product.status != ProductStatus::Active {
            return Err(MarketplaceServiceError::NotFound("Product"));
        }
        Ok(self.wishlist.add(user.id, product_id).await?)
    }

    pub async fn remove_from_wishlist(&self, user: &User, product_id: i64) -> Result<(), MarketplaceServiceError> {
        if self.wishlist.remove(user.id, product_id).await? {
            Ok(())
        } else {
            Err(MarketplaceServiceError::NotFound("Wishlist item"))
        }
    }

    pub async fn list_wishlist(
        &self,
        user: &User,
        params: &ListParams,
    ) -> Result<PagedResult<WishlistItem>, MarketplaceServiceError> {
        Ok(self.wishlist.list(user.id, params).await?)
    }

    async fn find_product(&self, id: i64) -> Result<Product, MarketplaceServiceError> {
        self.products
            .get_by_id(id)
            .await?
            .ok_or(MarketplaceServiceError::NotFound("Product"))
    }
}

fn validate_name(name: &str) -> Result<String, MarketplaceServiceError> {
    let name = name.trim();
    let chars = name.chars().count();
    if chars == 0 || chars > MAX_NAME_CHARS {
        return Err(MarketplaceServiceError::ValidationError(format!(
            "Name must be between 1 and {} characters",
            MAX_NAME_CHARS
        )));
    }
    Ok(name.to_string())
}

fn validate_description(description: &str) -> Result<(), MarketplaceServiceError> {
    if description.chars().count() > MAX_DESCRIPTION_CHARS {
        return Err(MarketplaceServiceError::ValidationError(format!(
            "Description must be at most {} characters",
            MAX_DESCRIPTION_CHARS
        )));
    }
    Ok(())
}

fn validate_amount(field: &str, value: i64) -> Result<(), MarketplaceServiceError> {
    if value < 0 {
        return Err(MarketplaceServiceError::ValidationError(format!("{} cannot be negative", field)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::test_support::{insert_product, insert_user, insert_user_with_role};
    use crate::db::repositories::SqlxReviewRepository;
    use crate::services::test_support::{fixture, user};

    fn product_input(name: &str, price: i64, stock: i64) -> CreateProductInput {
        CreateProductInput {
            name: name.to_string(),
            description: String::new(),
            price_cents: price,
            stock,
        }
    }

    #[tokio::test]
    async fn test_product_validation_and_ownership() {
        let fx = fixture().await;
        let seller = user(&fx.pool, insert_user(&fx.pool, "seller").await).await;
        let other = user(&fx.pool, insert_user(&fx.pool, "other").await).await;
        let admin = user(&fx.pool, insert_user_with_role(&fx.pool, "root", "admin").await).await;
        let market = &fx.services.marketplace;

        assert!(matches!(
            market.create_product(&seller, product_input("  ", 100, 1)).await,
            Err(MarketplaceServiceError::ValidationError(_))
        ));
        assert!(matches!(
            market.create_product(&seller, product_input("Lamp", -1, 1)).await,
            Err(MarketplaceServiceError::ValidationError(_))
        ));

        let product = market.create_product(&seller, product_input(" Lamp ", 2500, 3)).await.unwrap();
        assert_eq!(product.name, "Lamp");

        let update = UpdateProductInput {
            price_cents: Some(2000),
            ..Default::default()
        };
        assert!(matches!(
            market.update_product(&other, product.id, update.clone()).await,
            Err(MarketplaceServiceError::Forbidden(_))
        ));
        let updated = market.update_product(&admin, product.id, update).await.unwrap();
        assert_eq!(updated.price_cents, 2000);

        market.archive_product(&seller, product.id).await.unwrap();
        assert_eq!(market.list_products(&ListParams::default()).await.unwrap().total, 0);
        assert!(matches!(
            market.archive_product(&seller, product.id).await,
            Err(MarketplaceServiceError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_order_lifecycle() {
        let fx = fixture().await;
        let seller = user(&fx.pool, insert_user(&fx.pool, "seller").await).await;
        let buyer = user(&fx.pool, insert_user(&fx.pool, "buyer").await).await;
        let stranger = user(&fx.pool, insert_user(&fx.pool, "stranger").await).await;
        let product = insert_product(&fx.pool, seller.id, 2).await;
        let market = &fx.services.marketplace;

        assert!(matches!(
            market.place_order(&buyer, CreateOrderInput { product_id: product, quantity: 0 }).await,
            Err(MarketplaceServiceError::ValidationError(_))
        ));
        assert!(matches!(
            market.place_order(&buyer, CreateOrderInput { product_id: product, quantity: 3 }).await,
            Err(MarketplaceServiceError::Conflict(_))
        ));

        let order = market
            .place_order(&buyer, CreateOrderInput { product_id: product, quantity: 2 })
            .await
            .unwrap();
        assert_eq!(order.total_cents, 2000);

        assert!(matches!(
            market.get_order(&stranger, order.id).await,
            Err(MarketplaceServiceError::Forbidden(_))
        ));
        assert!(matches!(
            market.update_order_status(&seller, order.id, OrderStatus::Paid).await,
            Err(MarketplaceServiceError::Forbidden(_))
        ));
        assert!(matches!(
            market.update_order_status(&seller, order.id, OrderStatus::Cancelled).await,
            Err(MarketplaceServiceError::Forbidden(_))
        ));
        assert!(matches!(
            market.update_order_status(&buyer, order.id, OrderStatus::Pending).await,
            Err(MarketplaceServiceError::InvalidTransition { .. })
        ));

        market.update_order_status(&buyer, order.id, OrderStatus::Paid).await.unwrap();
        market.update_order_status(&seller, order.id, OrderStatus::Shipped).await.unwrap();
        let delivered = market
            .update_order_status(&seller, order.id, OrderStatus::Delivered)
            .await
            .unwrap();
        assert_eq!(delivered.status, OrderStatus::Delivered);

        let notes = fx
            .services
            .notifications
            .list(buyer.id, false, &ListParams::default())
            .await
            .unwrap();
        assert_eq!(notes.total, 2);
    }

    #[tokio::test]
    async fn test_overflowing_total_is_rejected() {
        let fx = fixture().await;
        let seller = user(&fx.pool, insert_user(&fx.pool, "seller").await).await;
        let buyer = user(&fx.pool, insert_user(&fx.pool, "buyer").await).await;
        let market = &fx.services.marketplace;

        let product = market
            .create_product(&seller, product_input("Yacht", i64::MAX / 2 + 1, 10))
            .await
            .unwrap();
        assert!(matches!(
            market.place_order(&buyer, CreateOrderInput { product_id: product.id, quantity: 2 }).await,
            Err(MarketplaceServiceError::ValidationError(_))
        ));
        assert_eq!(market.get_product(product.id).await.unwrap().product.stock, 10);
    }

    #[tokio::test]
    async fn test_cancel_restores_stock() {
        let fx = fixture().await;
        let seller = user(&fx.pool, insert_user(&fx.pool, "seller").await).await;
        let buyer = user(&fx.pool, insert_user(&fx.pool, "buyer").await).await;
        let product = insert_product(&fx.pool, seller.id, 5).await;
        let market = &fx.services.marketplace;

        let order = market
            .place_order(&buyer, CreateOrderInput { product_id: product, quantity: 5 })
            .await
            .unwrap();
        assert_eq!(market.get_product(product).await.unwrap().product.stock, 0);

        market.update_order_status(&buyer, order.id, OrderStatus::Cancelled).await.unwrap();
        assert_eq!(market.get_product(product).await.unwrap().product.stock, 5);
    }

    #[tokio::test]
    async fn test_reviews() {
        let fx = fixture().await;
        let seller = user(&fx.pool, insert_user(&fx.pool, "seller").await).await;
        let buyer = user(&fx.pool, insert_user(&fx.pool, "buyer").await).await;
        let troll = user(&fx.pool, insert_user(&fx.pool, "troll").await).await;
        let product = insert_product(&fx.pool, seller.id, 5).await;
        let market = &fx.services.marketplace;

        assert!(matches!(
            market
                .create_review(&buyer, product, CreateReviewInput { rating: 6, body: "great".into() })
                .await,
            Err(MarketplaceServiceError::ValidationError(_))
        ));

        let review = market
            .create_review(&buyer, product, CreateReviewInput { rating: 5, body: "Works great".into() })
            .await
            .unwrap();
        assert_eq!(review.status, ContentStatus::Approved);
        assert!(!review.verified_purchase);
        assert_eq!(fx.services.reputation.total(buyer.id).await.unwrap(), 5);

        assert!(matches!(
            market
                .create_review(&buyer, product, CreateReviewInput { rating: 4, body: "again".into() })
                .await,
            Err(MarketplaceServiceError::Conflict(_))
        ));

        let hostile = market
            .create_review(
                &troll,
                product,
                CreateReviewInput {
                    rating: 1,
                    body: "I will kill you. You are an idiot".into(),
                },
            )
            .await
            .unwrap();
        assert_eq!(hostile.status, ContentStatus::Rejected);

        let listed = market.list_reviews(product, &ListParams::default()).await.unwrap();
        assert_eq!(listed.total, 1);
        let detail = market.get_product(product).await.unwrap();
        assert_eq!(detail.review_count, 1);
        assert_eq!(detail.average_rating, Some(5.0));
    }

    #[tokio::test]
    async fn test_moderators_can_release_held_reviews() {
        let fx = fixture().await;
        let seller = user(&fx.pool, insert_user(&fx.pool, "seller").await).await;
        let buyer = user(&fx.pool, insert_user(&fx.pool, "buyer").await).await;
        let moderator = user(&fx.pool, insert_user_with_role(&fx.pool, "mod", "moderator").await).await;
        let product = insert_product(&fx.pool, seller.id, 1).await;
        let market = &fx.services.marketplace;

        let held = SqlxReviewRepository::new(fx.pool.clone())
            .create(&NewReview {
                product_id: product,
                user_id: buyer.id,
                rating: 2,
                body: "borderline wording",
                status: ContentStatus::Flagged,
                verified_purchase: false,
                toxicity_score: Some(0.7),
            })
            .await
            .unwrap();
        let ReviewInsert::Created(held) = held else {
            panic!("expected review");
        };

        let queue = market
            .list_reviews_by_status(ContentStatus::Flagged, &ListParams::default())
            .await
            .unwrap();
        assert_eq!(queue.total, 1);

        assert!(matches!(
            market.set_review_status(&moderator, held.id, ContentStatus::Pending, None).await,
            Err(MarketplaceServiceError::ValidationError(_))
        ));
        assert!(matches!(
            market.set_review_status(&moderator, 999, ContentStatus::Approved, None).await,
            Err(MarketplaceServiceError::NotFound(_))
        ));

        let released = market
            .set_review_status(&moderator, held.id, ContentStatus::Approved, Some("reads fine".into()))
            .await
            .unwrap();
        assert_eq!(released.status, ContentStatus::Approved);
        assert_eq!(market.list_reviews(product, &ListParams::default()).await.unwrap().total, 1);
        assert_eq!(fx.services.reputation.total(buyer.id).await.unwrap(), 5);

        let notes = fx
            .services
            .notifications
            .list(buyer.id, false, &ListParams::default())
            .await
            .unwrap();
        assert_eq!(notes.items[0].kind, NotificationKind::ContentRestored);

        assert!(matches!(
            market.set_review_status(&moderator, held.id, ContentStatus::Approved, None).await,
            Err(MarketplaceServiceError::Conflict(_))
        ));

        market
            .set_review_status(&moderator, held.id, ContentStatus::Rejected, None)
            .await
            .unwrap();
        assert_eq!(market.list_reviews(product, &ListParams::default()).await.unwrap().total, 0);
        market
            .set_review_status(&moderator, held.id, ContentStatus::Approved, None)
            .await
            .unwrap();
        assert_eq!(fx.services.reputation.total(buyer.id).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_wishlist() {
        let fx = fixture().await;
        let seller = user(&fx.pool, insert_user(&fx.pool, "seller").await).await;
        let shopper = user(&fx.pool, insert_user(&fx.pool, "shopper").await).await;
        let product = insert_product(&fx.pool, seller.id, 1).await;
        let market = &fx.services.marketplace;

        assert!(matches!(
            market.add_to_wishlist(&shopper, 999).await,
            Err(MarketplaceServiceError::NotFound(_))
        ));
        assert!(market.add_to_wishlist(&shopper, product).await.unwrap());
        assert!(!market.add_to_wishlist(&shopper, product).await.unwrap());
        assert_eq!(market.list_wishlist(&shopper, &ListParams::default()).await.unwrap().total, 1);

        market.remove_from_wishlist(&shopper, product).await.unwrap();
        assert!(matches!(
            market.remove_from_wishlist(&shopper, product).await,
            Err(MarketplaceServiceError::NotFound(_))
        ));
    }
}
