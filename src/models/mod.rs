//! Data models
//!
//! Database entities, request inputs and the small value types (statuses,
//! decisions, priorities) shared by repositories, services and handlers.

mod appeal;
mod comment;
mod moderation;
mod notification;
mod order;
mod pagination;
mod product;
mod report;
mod reputation;
mod session;
mod user;

pub use appeal::{Appeal, AppealDecision, AppealStatus};
pub use comment::{Comment, CommentTarget, ContentStatus, CreateCommentInput};
pub use moderation::{
    BulkAction, BulkChange, BulkOutcome, Decision, ModerationAction, ModerationLog, QueueStats,
    StatusTransition, TransitionOutcome,
};
pub use notification::{Notification, NotificationKind, OutgoingNotification, Priority};
pub use order::{CreateOrderInput, Order, OrderActor, OrderStatus};
pub use pagination::{ListParams, PagedResult};
pub use product::{
    CreateProductInput, CreateReviewInput, Product, ProductStatus, Review, UpdateProductInput,
    WishlistItem,
};
pub use report::{Report, ReportAction, ReportReason, ReportStatus};
pub use reputation::{ActivityKind, AwardedBadge, Badge, ReputationActivity, ReputationSummary};
pub use session::Session;
pub use user::{User, UserRole, UserStatus};
