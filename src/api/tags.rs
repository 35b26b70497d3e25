//! Tag API endpoints
//!
//! - GET /api/v1/tags - All tags
//! - GET /api/v1/tags/{name} - A tag and the articles carrying it

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use serde::Serialize;

use crate::api::middleware::{ApiError, AppState};
use crate::models::Tag;
use crate::services::article::TagDetails;

/// Response for tag list
#[derive(Debug, Serialize)]
pub struct TagListResponse {
    pub tags: Vec<Tag>,
}

/// Build the tags router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_tags))
        .route("/{name}", get(get_tag))
}

/// GET /api/v1/tags
async fn list_tags(State(state): State<AppState>) -> Result<Json<TagListResponse>, ApiError> {
    let tags = state.article_service.all_tags().await?;
    Ok(Json(TagListResponse { tags }))
}

/// GET /api/v1/tags/{name}
async fn get_tag(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<TagDetails>, ApiError> {
    Ok(Json(state.article_service.tag_details(&name).await?))
}
