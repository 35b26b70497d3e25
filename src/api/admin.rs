//! Staff API endpoints
//!
//! - GET /api/v1/admin/templates - Templates and the articles generated from them
//! - POST /api/v1/admin/templates - Register a template repository
//! - POST /api/v1/admin/templates/update - Ask articles to pull template changes
//!   (counts against the per-IP view limit, see `api::build_api_router`)

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::TemplateRepository;

#[derive(Debug, Serialize)]
pub struct TemplateArticle {
    pub name: String,
    pub template_id: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct TemplatesResponse {
    pub templates: Vec<TemplateRepository>,
    pub articles: Vec<TemplateArticle>,
}

#[derive(Debug, Deserialize)]
pub struct AddTemplateRequest {
    pub owner: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateTemplatesRequest {
    /// Template uuids
    #[serde(default)]
    pub templates: Vec<String>,
    /// Article names
    #[serde(default)]
    pub articles: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct UpdateTemplatesResponse {
    pub count: usize,
    pub message: String,
}

/// Build the admin router (requires staff)
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/templates", get(list_templates).post(add_template))
}

/// GET /api/v1/admin/templates
async fn list_templates(
    State(state): State<AppState>,
) -> Result<Json<TemplatesResponse>, ApiError> {
    let templates = state.article_service.templates().await?;
    let articles = state
        .article_service
        .list_all()
        .await?
        .into_iter()
        .map(|article| TemplateArticle {
            name: article.name,
            template_id: article.template_id,
        })
        .collect();
    Ok(Json(TemplatesResponse {
        templates,
        articles,
    }))
}

/// POST /api/v1/admin/templates
async fn add_template(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<AddTemplateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let template = state
        .article_service
        .add_template(&user.0, body.owner.trim(), body.name.trim())
        .await?;
    Ok((StatusCode::CREATED, Json(template)))
}

/// POST /api/v1/admin/templates/update
pub async fn update_templates(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<UpdateTemplatesRequest>,
) -> Result<Json<UpdateTemplatesResponse>, ApiError> {
    let count = state
        .article_service
        .update_templates(&user.0, &body.templates, &body.articles)
        .await?;
    Ok(Json(UpdateTemplatesResponse {
        count,
        message: format!("{} terms requested for update.", count),
    }))
}
