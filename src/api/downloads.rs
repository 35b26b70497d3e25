//! Download endpoints
//!
//! - GET /api/v1/downloads/articles.json - Every article as JSON
//! - GET /api/v1/downloads/repos.csv - Article repositories as CSV
//! - GET /api/v1/articles/{name}/README.md - Raw README of an article

use axum::{
    extract::{Path, State},
    http::header,
    response::IntoResponse,
    routing::get,
    Json, Router,
};

use crate::api::middleware::{ApiError, AppState};

/// Build the downloads router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/articles.json", get(articles_json))
        .route("/repos.csv", get(repos_csv))
}

async fn articles_json(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.article_service.export_articles().await?))
}

async fn repos_csv(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let csv = state.article_service.repositories_csv().await?;
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (header::CONTENT_DISPOSITION, "attachment; filename=\"repos.csv\""),
        ],
        csv,
    ))
}

/// GET /api/v1/articles/{name}/README.md
pub async fn article_readme(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let text = state.article_service.article_readme(&name).await?;
    Ok(([(header::CONTENT_TYPE, "text/markdown; charset=utf-8")], text))
}
