//! askci server

use anyhow::Result;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use askci::{
    api::{self, AppState},
    cache::MemoryCache,
    config::Config,
    db::{self, repositories::Repositories},
    github::ReqwestGitHubClient,
    services::{
        rate_limiter::{RateLimiter, ViewRateLimiter, LOGIN_RATE},
        ArticleService, ReadmeParser, SyncService, UserService,
    },
    tasks::TaskQueue,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "askci=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting askci...");

    // Load configuration
    let config = Config::load_with_env(Path::new("config.yml"))?;
    tracing::info!("Configuration loaded");

    // Initialize database
    let pool = db::create_pool(&config.database).await?;
    tracing::info!("Database connected: {:?}", config.database.driver);

    // Run migrations
    db::migrations::run_migrations(&pool).await?;
    tracing::info!("Database migrations completed");

    let repos = Repositories::sqlx(&pool);
    let cache = Arc::new(MemoryCache::new(&config.cache));
    let github = Arc::new(ReqwestGitHubClient::new(
        &config.github,
        config.server.webhook_url(),
    )?);
    let parser = Arc::new(ReadmeParser::new()?);

    // Background jobs
    let sync = Arc::new(
        SyncService::new(&repos, github.clone(), parser.clone()).with_cache(cache.clone()),
    );
    let (queue, _worker) = TaskQueue::start(sync);

    let article_service = Arc::new(ArticleService::new(
        repos.clone(),
        github,
        parser,
        cache,
        queue.clone(),
        &config.askci,
    ));
    let user_service = Arc::new(UserService::new(
        repos.users.clone(),
        repos.sessions.clone(),
        repos.pull_requests.clone(),
    ));

    let view_limiter = Arc::new(ViewRateLimiter::new(
        &config.askci.view_rate_limit,
        config.askci.view_rate_limit_block,
    )?);
    let login_limiter = Arc::new(RateLimiter::from_rate(LOGIN_RATE)?);

    // Start cleanup task (runs every 5 minutes)
    {
        let view_limiter = view_limiter.clone();
        let login_limiter = login_limiter.clone();
        let user_service = user_service.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(300));
            loop {
                interval.tick().await;
                view_limiter.cleanup().await;
                login_limiter.cleanup().await;
                match user_service.cleanup_expired_sessions().await {
                    Ok(0) => {}
                    Ok(n) => tracing::debug!("Removed {} expired sessions", n),
                    Err(e) => tracing::warn!("Failed to clean up sessions: {}", e),
                }
            }
        });
    }

    let state = AppState {
        user_service,
        article_service,
        queue,
        view_limiter,
        login_limiter,
    };

    // Build router
    let app = api::build_router(state, &config.server.cors_origin)?;

    // Start server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on http://{}", addr);
    tracing::info!("GitHub webhooks deliver to {}", config.server.webhook_url());

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
