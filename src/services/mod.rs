//! Services layer - Business logic
//!
//! Services implement the business rules on top of the repositories:
//! - Validation and authorization checks
//! - The moderation pipeline (analysis, policy, reports, appeals, bulk, sweep)
//! - Reputation and notification side effects

pub mod analysis;
pub mod appeal;
pub mod bulk;
pub mod cleanup;
pub mod marketplace;
pub mod moderation;
pub mod notification;
pub mod password;
pub mod policy;
pub mod queue;
pub mod rate_limiter;
pub mod report;
pub mod reputation;
pub mod user;

pub use analysis::{build_analyzer, Analysis, AnalysisError, ToxicityAnalyzer};
pub use appeal::{AppealService, AppealServiceError};
pub use bulk::{BulkService, BulkServiceError};
pub use cleanup::{spawn_cleanup_loop, CleanupService, CleanupServiceError, SweepReport};
pub use marketplace::{MarketplaceService, MarketplaceServiceError, ProductDetail};
pub use moderation::{AnalysisReport, ModerationEffects, ModerationService, ModerationServiceError};
pub use notification::{Mailer, NotificationService, NotificationServiceError, SmtpMailer};
pub use password::{hash_password, verify_password};
pub use policy::ModerationPolicy;
pub use queue::{spawn_worker, AnalysisQueue};
pub use rate_limiter::RateLimiter;
pub use report::{ReportService, ReportServiceError};
pub use reputation::{ReputationService, ReputationServiceError};
pub use user::{LoginInput, RegisterInput, UserService, UserServiceError};

use std::sync::Arc;
use tokio::sync::mpsc;

use crate::config::ModerationConfig;
use crate::db::repositories::{
    SqlxAppealRepository, SqlxCommentRepository, SqlxModerationLogRepository, SqlxNotificationRepository,
    SqlxOrderRepository, SqlxProductRepository, SqlxReportRepository, SqlxReputationRepository,
    SqlxReviewRepository, SqlxSessionRepository, SqlxUserRepository, SqlxWishlistRepository,
};
use crate::db::DbPool;

/// Every service, wired against one database pool
#[derive(Clone)]
pub struct Services {
    pub users: Arc<UserService>,
    pub moderation: Arc<ModerationService>,
    pub reports: Arc<ReportService>,
    pub appeals: Arc<AppealService>,
    pub bulk: Arc<BulkService>,
    pub cleanup: Arc<CleanupService>,
    pub notifications: Arc<NotificationService>,
    pub reputation: Arc<ReputationService>,
    pub marketplace: Arc<MarketplaceService>,
    pub login_limiter: Arc<RateLimiter>,
    pub comment_limiter: Arc<RateLimiter>,
}

impl Services {
    /// Build the service graph. The returned receiver feeds the analysis
    /// worker (see [`spawn_worker`]).
    pub fn build(
        pool: DbPool,
        config: &ModerationConfig,
        analyzer: Arc<dyn ToxicityAnalyzer>,
        mailer: Option<Arc<dyn Mailer>>,
    ) -> (Self, mpsc::Receiver<i64>) {
        let user_repo = SqlxUserRepository::boxed(pool.clone());
        let session_repo = SqlxSessionRepository::boxed(pool.clone());
        let comment_repo = SqlxCommentRepository::boxed(pool.clone());
        let report_repo = SqlxReportRepository::boxed(pool.clone());
        let appeal_repo = SqlxAppealRepository::boxed(pool.clone());
        let product_repo = SqlxProductRepository::boxed(pool.clone());

        let login_limiter = Arc::new(RateLimiter::for_logins());
        let comment_limiter = Arc::new(RateLimiter::for_comments(config.comments_per_minute));
        let policy = ModerationPolicy::new(config);

        let users = Arc::new(UserService::new(
            user_repo.clone(),
            session_repo.clone(),
            login_limiter.clone(),
        ));
        let notifications = Arc::new(NotificationService::new(
            SqlxNotificationRepository::boxed(pool.clone()),
            user_repo.clone(),
            mailer,
        ));
        let reputation = Arc::new(ReputationService::new(
            SqlxReputationRepository::boxed(pool.clone()),
            report_repo.clone(),
            user_repo,
        ));
        let effects = Arc::new(ModerationEffects::new(reputation.clone(), notifications.clone()));

        let (queue, receiver) = AnalysisQueue::new(config.queue_capacity);
        let moderation = Arc::new(ModerationService::new(
            comment_repo.clone(),
            product_repo.clone(),
            report_repo.clone(),
            appeal_repo.clone(),
            SqlxModerationLogRepository::boxed(pool.clone()),
            analyzer.clone(),
            policy.clone(),
            effects.clone(),
            comment_limiter.clone(),
            queue,
        ));

        let reports = Arc::new(ReportService::new(
            report_repo.clone(),
            comment_repo.clone(),
            policy.clone(),
            effects.clone(),
        ));
        let appeals = Arc::new(AppealService::new(appeal_repo.clone(), comment_repo.clone(), effects.clone()));
        let bulk = Arc::new(BulkService::new(comment_repo.clone(), effects.clone(), config.max_bulk_items));
        let cleanup = Arc::new(CleanupService::new(
            moderation.clone(),
            comment_repo,
            report_repo,
            appeal_repo,
            session_repo,
            config.clone(),
        ));
        let marketplace = Arc::new(MarketplaceService::new(
            product_repo,
            SqlxOrderRepository::boxed(pool.clone()),
            SqlxReviewRepository::boxed(pool.clone()),
            SqlxWishlistRepository::boxed(pool),
            analyzer,
            policy,
            effects,
        ));

        let services = Self {
            users,
            moderation,
            reports,
            appeals,
            bulk,
            cleanup,
            notifications,
            reputation,
            marketplace,
            login_limiter,
            comment_limiter,
        };
        (services, receiver)
    }
}

/// Fixtures shared by service tests
#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::db::repositories::test_support::setup_pool;
    use crate::db::repositories::UserRepository;
    use crate::models::User;
    use analysis::HeuristicAnalyzer;

    pub struct Fixture {
        pub pool: DbPool,
        pub services: Services,
        pub receiver: mpsc::Receiver<i64>,
    }

    /// Services on a fresh database with the heuristic analyzer and no email
    pub async fn fixture() -> Fixture {
        let pool = setup_pool().await;
        let (services, receiver) = Services::build(
            pool.clone(),
            &ModerationConfig::default(),
            Arc::new(HeuristicAnalyzer::new()),
            None,
        );
        Fixture {
            pool,
            services,
            receiver,
        }
    }

    pub async fn user(pool: &DbPool, id: i64) -> User {
        SqlxUserRepository::new(pool.clone())
            .get_by_id(id)
            .await
            .expect("Failed to load user")
            .expect("User not found")
    }
}
