//! API layer - HTTP handlers and routing
//!
//! JSON endpoints under `/api/v1`:
//! - Article endpoints (listing, details, review requests, create/import)
//! - Tag endpoints
//! - User/Auth endpoints, including the GitHub connection
//! - Staff endpoints for template repositories
//! - Downloads
//!
//! and the GitHub webhook receiver under `/webhooks/github`.

pub mod admin;
pub mod articles;
pub mod auth;
pub mod common;
pub mod downloads;
pub mod middleware;
pub mod tags;
pub mod webhooks;

use axum::{
    http::{header, HeaderValue, Method},
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub use middleware::{ApiError, AppState, AuthenticatedUser, OptionalUser};

/// Build the main API router
pub fn build_api_router(state: AppState) -> Router<AppState> {
    let limit_views =
        || axum_middleware::from_fn_with_state(state.clone(), middleware::limit_views);
    let require_auth =
        || axum_middleware::from_fn_with_state(state.clone(), middleware::require_auth);

    // Admin routes (need staff)
    let admin_limited = Router::new()
        .route("/admin/templates/update", post(admin::update_templates))
        .route_layer(limit_views());
    let admin_routes = Router::new()
        .nest("/admin", admin::router())
        .merge(admin_limited)
        .route_layer(axum_middleware::from_fn(middleware::require_admin))
        .route_layer(require_auth());

    // Protected routes (need auth but not staff)
    let protected_limited = Router::new()
        .route("/articles", post(articles::create_article))
        .route("/articles/new", get(articles::new_article_options))
        .route(
            "/articles/import",
            get(articles::import_options).post(articles::import_article),
        )
        .route("/articles/{name}", axum::routing::delete(articles::delete_article))
        .route_layer(limit_views());
    let protected_routes = Router::new()
        .nest("/auth", auth::protected_router())
        .route("/articles/{name}/questions", post(articles::new_question))
        .route("/articles/{name}/pr", get(articles::get_pull_request))
        .merge(protected_limited)
        .route_layer(require_auth());

    // Article views count against the per-IP limit
    let viewed_routes = Router::new()
        .route("/articles", get(articles::list_articles))
        .route("/articles/{name}", get(articles::get_article))
        .route_layer(limit_views());

    // Public routes
    let public_routes = Router::new()
        .route("/articles/{name}/review", post(articles::request_review))
        .route("/articles/{name}/README.md", get(downloads::article_readme))
        .nest("/tags", tags::router())
        .nest("/downloads", downloads::router())
        .nest("/auth", auth::public_router())
        .merge(viewed_routes)
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::optional_auth,
        ));

    public_routes.merge(admin_routes).merge(protected_routes)
}

/// Build the complete router with middleware
pub fn build_router(state: AppState, cors_origin: &str) -> anyhow::Result<Router> {
    let origin = cors_origin
        .parse::<HeaderValue>()
        .map_err(|e| anyhow::anyhow!("Invalid CORS origin '{}': {}", cors_origin, e))?;
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::COOKIE])
        .allow_credentials(true);

    Ok(Router::new()
        .nest("/api/v1", build_api_router(state.clone()))
        .nest("/webhooks/github", webhooks::router())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state))
}
