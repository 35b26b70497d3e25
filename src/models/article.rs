//! Article model
//!
//! This module provides:
//! - `Article` entity, a knowledge article backed by a GitHub repository
//! - `CreateArticleInput` for new and imported articles
//! - Pagination types for list queries

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Prefix every article repository name starts with
pub const ARTICLE_REPO_PREFIX: &str = "askci-term-";

/// Article entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Article {
    pub id: i64,
    pub uuid: String,
    /// The term; unique across the site
    pub name: String,
    pub summary: String,
    /// Raw README markdown
    pub text: String,
    /// Rendered README
    pub content_html: String,
    /// GitHub repository object
    pub repo: serde_json::Value,
    /// GitHub repository id
    pub repo_id: i64,
    pub owner_id: i64,
    pub template_id: Option<i64>,
    /// Installed webhooks keyed by purpose ("push-deploy", "pull_request", "repository")
    pub webhook: serde_json::Value,
    /// Webhook signing secret
    #[serde(skip_serializing, default)]
    pub secret: String,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

impl Article {
    /// `owner/name` of the backing repository
    pub fn full_name(&self) -> Option<&str> {
        self.repo.get("full_name").and_then(|v| v.as_str())
    }

    /// Browser URL of the backing repository
    pub fn html_url(&self) -> Option<&str> {
        self.repo.get("html_url").and_then(|v| v.as_str())
    }

    /// Ids of every webhook recorded for this article
    pub fn webhook_ids(&self) -> Vec<i64> {
        self.webhook
            .as_object()
            .map(|hooks| {
                hooks
                    .values()
                    .filter_map(|hook| hook.get("id").and_then(|id| id.as_i64()))
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Input for creating an article
#[derive(Debug, Clone)]
pub struct CreateArticleInput {
    pub name: String,
    pub summary: String,
    pub repo: serde_json::Value,
    pub owner_id: i64,
    pub template_id: Option<i64>,
    pub webhook: serde_json::Value,
    pub secret: String,
}

impl CreateArticleInput {
    /// GitHub repository id from the repository object
    pub fn repo_id(&self) -> Option<i64> {
        self.repo.get("id").and_then(|v| v.as_i64())
    }
}

/// Pagination parameters for list queries
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListParams {
    /// Page number (1-indexed)
    pub page: u32,
    /// Number of items per page
    pub per_page: u32,
}

impl Default for ListParams {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: 10,
        }
    }
}

impl ListParams {
    pub fn new(page: u32, per_page: u32) -> Self {
        Self {
            page: page.max(1),
            per_page: per_page.clamp(1, 100),
        }
    }

    /// Offset for database queries
    pub fn offset(&self) -> i64 {
        i64::from(self.page.saturating_sub(1)) * i64::from(self.per_page)
    }

    /// Limit for database queries
    pub fn limit(&self) -> i64 {
        self.per_page as i64
    }
}

/// Paginated result container
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PagedResult<T> {
    pub items: Vec<T>,
    /// Total number of items across all pages
    pub total: i64,
    pub page: u32,
    pub per_page: u32,
}

impl<T> PagedResult<T> {
    pub fn new(items: Vec<T>, total: i64, params: &ListParams) -> Self {
        Self {
            items,
            total,
            page: params.page,
            per_page: params.per_page,
        }
    }

    pub fn total_pages(&self) -> u32 {
        if self.per_page == 0 {
            return 0;
        }
        ((self.total as u32) + self.per_page - 1) / self.per_page
    }

    pub fn has_next(&self) -> bool {
        self.page < self.total_pages()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn article_with(repo: serde_json::Value, webhook: serde_json::Value) -> Article {
        Article {
            id: 1,
            uuid: "uuid".to_string(),
            name: "singularity".to_string(),
            summary: String::new(),
            text: String::new(),
            content_html: String::new(),
            repo,
            repo_id: 42,
            owner_id: 1,
            template_id: None,
            webhook,
            secret: "secret".to_string(),
            created_at: Utc::now(),
            modified_at: Utc::now(),
        }
    }

    #[test]
    fn test_full_name_and_url() {
        let article = article_with(
            json!({
                "full_name": "hpsee/askci-term-singularity",
                "html_url": "https://github.com/hpsee/askci-term-singularity",
            }),
            json!({}),
        );
        assert_eq!(article.full_name(), Some("hpsee/askci-term-singularity"));
        assert_eq!(
            article.html_url(),
            Some("https://github.com/hpsee/askci-term-singularity")
        );
    }

    #[test]
    fn test_webhook_ids_skip_failed_hooks() {
        let article = article_with(
            json!({}),
            json!({
                "push-deploy": {"id": 1},
                "pull_request": {"id": 2},
                "repository": {"errors": "Validation Failed"}
            }),
        );
        let mut ids = article.webhook_ids();
        ids.sort();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn test_list_params_clamped() {
        let params = ListParams::new(0, 1000);
        assert_eq!(params.page, 1);
        assert_eq!(params.per_page, 100);
        assert_eq!(params.offset(), 0);

        let params = ListParams::new(3, 10);
        assert_eq!(params.offset(), 20);
        assert_eq!(params.limit(), 10);
    }

    #[test]
    fn test_list_params_offset_on_last_page_number() {
        let params = ListParams::new(u32::MAX, 100);
        assert_eq!(params.offset(), (i64::from(u32::MAX) - 1) * 100);
    }

    #[test]
    fn test_paged_result_total_pages() {
        let params = ListParams::new(1, 10);
        let result: PagedResult<i32> = PagedResult::new(vec![], 21, &params);
        assert_eq!(result.total_pages(), 3);
        assert!(result.has_next());
    }
}
