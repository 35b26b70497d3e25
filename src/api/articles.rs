//! Article API endpoints
//!
//! - GET /api/v1/articles - List articles with pagination
//! - GET /api/v1/articles/{name} - Article details (view rate limited)
//! - POST /api/v1/articles/{name}/review - Submit README changes for review
//! - GET /api/v1/articles/new - Namespaces and templates for a new article
//! - POST /api/v1/articles - Create an article from a template
//! - GET|POST /api/v1/articles/import - Import an existing repository
//! - DELETE /api/v1/articles/{name} - Delete an article (owner only)
//! - POST /api/v1/articles/{name}/questions - Ask a question as a GitHub issue
//! - GET /api/v1/articles/{name}/pr - The caller's pending or open pull request

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::api::common::PaginationQuery;
use crate::api::middleware::{ApiError, AppState, AuthenticatedUser, OptionalUser};
use crate::models::{Article, PagedResult, PullRequest, TemplateRepository};
use crate::services::article::{ArticleDetails, NewArticleInput};

/// `{"message": …}` answer of the review flow
#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct ReviewRequest {
    #[serde(default)]
    pub markdown: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct QuestionRequest {
    pub question: String,
}

#[derive(Debug, Deserialize)]
pub struct ImportRequest {
    /// Selected `owner/name` repositories; only the first is imported
    pub repos: Vec<String>,
    /// Template uuid
    pub template: String,
}

/// What the new article form needs
#[derive(Debug, Serialize)]
pub struct NewArticleOptions {
    pub has_opening: bool,
    pub namespaces: Vec<String>,
    pub templates: Vec<TemplateRepository>,
}

#[derive(Debug, Serialize)]
pub struct ImportOptions {
    pub repos: Vec<serde_json::Value>,
    pub templates: Vec<TemplateRepository>,
}

#[derive(Debug, Serialize)]
pub struct PullRequestResponse {
    pub pull_request: Option<PullRequest>,
}

/// GET /api/v1/articles
pub async fn list_articles(
    State(state): State<AppState>,
    Query(query): Query<PaginationQuery>,
) -> Result<Json<PagedResult<Article>>, ApiError> {
    let result = state.article_service.all_articles(&query.params()).await?;
    Ok(Json(result))
}

/// GET /api/v1/articles/{name}
pub async fn get_article(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<ArticleDetails>, ApiError> {
    Ok(Json(state.article_service.article_details(&name).await?))
}

/// POST /api/v1/articles/{name}/review
///
/// Problems the user can fix are answered as a 200 `{"message": …}`; only an
/// unknown article or a GitHub failure is an error.
pub async fn request_review(
    State(state): State<AppState>,
    OptionalUser(user): OptionalUser,
    Path(name): Path<String>,
    Json(body): Json<ReviewRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    let message = state
        .article_service
        .request_review(user.as_ref(), &name, body.markdown.as_deref())
        .await?;
    Ok(Json(MessageResponse { message }))
}

/// DELETE /api/v1/articles/{name}
pub async fn delete_article(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(name): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.article_service.delete_article(&user.0, &name).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/v1/articles/new
pub async fn new_article_options(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<NewArticleOptions>, ApiError> {
    let has_opening = state
        .article_service
        .has_articles_opening(Some(&user.0))
        .await?;
    let namespaces = if has_opening {
        state.article_service.admin_namespaces(&user.0).await?
    } else {
        Vec::new()
    };
    let templates = state.article_service.templates().await?;

    Ok(Json(NewArticleOptions {
        has_opening,
        namespaces,
        templates,
    }))
}

/// POST /api/v1/articles
pub async fn create_article(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<NewArticleInput>,
) -> Result<impl IntoResponse, ApiError> {
    let article = state.article_service.new_article(&user.0, body).await?;
    Ok((StatusCode::CREATED, Json(article)))
}

/// GET /api/v1/articles/import
pub async fn import_options(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<ImportOptions>, ApiError> {
    let repos = state.article_service.import_candidates(&user.0).await?;
    let templates = state.article_service.templates().await?;
    Ok(Json(ImportOptions { repos, templates }))
}

/// POST /api/v1/articles/import
pub async fn import_article(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<ImportRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let article = state
        .article_service
        .import_article(&user.0, &body.repos, &body.template)
        .await?;
    Ok((StatusCode::CREATED, Json(article)))
}

/// POST /api/v1/articles/{name}/questions
pub async fn new_question(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(name): Path<String>,
    Json(body): Json<QuestionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let issue = state
        .article_service
        .new_question(&user.0, &name, &body.question)
        .await?;
    Ok((StatusCode::CREATED, Json(issue)))
}

/// GET /api/v1/articles/{name}/pr
pub async fn get_pull_request(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(name): Path<String>,
) -> Result<Json<PullRequestResponse>, ApiError> {
    let details = state.article_service.article_details(&name).await?;
    let pull_request = state
        .user_service
        .get_pr(&user.0, details.article.id)
        .await?;
    Ok(Json(PullRequestResponse { pull_request }))
}
