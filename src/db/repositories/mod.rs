//! Database repositories
//!
//! Repository pattern implementations for database access. Each repository
//! owns the SQL of one entity; multi-row moderation changes run in a single
//! transaction and write their moderation log rows on the same connection.

pub mod appeal;
pub mod comment;
pub mod moderation_log;
pub mod notification;
pub mod order;
pub mod product;
pub mod report;
pub mod reputation;
pub mod review;
pub mod session;
pub mod user;
pub mod wishlist;

pub use appeal::{AppealInsert, AppealRepository, AppealResolveOutcome, AppealReview, SqlxAppealRepository};
pub use comment::{BulkRequest, BulkResult, CommentRepository, SqlxCommentRepository};
pub use moderation_log::{LogFilter, ModerationLogRepository, SqlxModerationLogRepository};
pub use notification::{NotificationRepository, SqlxNotificationRepository};
pub use order::{OrderRepository, PlaceOrder, SqlxOrderRepository};
pub use product::{ProductRepository, SqlxProductRepository};
pub use report::{FileOutcome, ReportRepository, ResolveOutcome, ResolveRequest, SqlxReportRepository};
pub use reputation::{ReputationRepository, SqlxReputationRepository};
pub use review::{NewReview, ReviewInsert, ReviewRepository, SqlxReviewRepository};
pub use session::{SessionRepository, SqlxSessionRepository};
pub use user::{SqlxUserRepository, UserRepository};
pub use wishlist::{SqlxWishlistRepository, WishlistRepository};
