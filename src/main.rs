//! Agora - marketplace and forum backend

use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use agora::{
    api::{self, AppState},
    config::Config,
    db,
    services::{build_analyzer, spawn_cleanup_loop, spawn_worker, Mailer, Services, SmtpMailer},
};

/// Rate limiter pruning interval in seconds
const LIMITER_CLEANUP_SECS: u64 = 300;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "agora=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Agora...");

    // Load configuration
    let config = Config::load_with_env(Path::new("config.yml"))?;
    tracing::info!("Configuration loaded");

    // Initialize database
    let pool = db::create_pool(&config.database).await?;
    tracing::info!("Database connected: {}", config.database.url);

    // Run migrations
    let applied = db::migrations::run_migrations(&pool).await?;
    tracing::info!(applied, "Database migrations completed");

    let analyzer = build_analyzer(&config.analyzer)?;
    tracing::info!("Toxicity analyzer: {:?}", config.analyzer.provider);

    let mailer: Option<Arc<dyn Mailer>> = match SmtpMailer::from_config(&config.notifications)? {
        Some(mailer) => {
            tracing::info!("Email notifications enabled");
            Some(Arc::new(mailer))
        }
        None => None,
    };

    let (services, receiver) = Services::build(pool, &config.moderation, analyzer, mailer);

    // Background tasks
    spawn_worker(receiver, services.moderation.clone());

    if config.moderation.cleanup_interval_secs > 0 {
        spawn_cleanup_loop(services.cleanup.clone(), config.moderation.cleanup_interval_secs);
        tracing::info!(
            interval_secs = config.moderation.cleanup_interval_secs,
            "Cleanup sweep scheduled"
        );
    }

    {
        let login_limiter = services.login_limiter.clone();
        let comment_limiter = services.comment_limiter.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(LIMITER_CLEANUP_SECS));
            loop {
                interval.tick().await;
                login_limiter.cleanup().await;
                comment_limiter.cleanup().await;
            }
        });
    }

    let state = AppState::new(&services, config.moderation.cron_secret.clone());

    // Build router
    let app = api::build_router(state, &config.server.cors_origin);

    // Start server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on http://{}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
