//! GitHub REST API wrapper
//!
//! Every GitHub interaction goes through the `GitHubApi` trait so services can
//! be exercised against a fake. Repository objects are passed around as the
//! raw JSON GitHub returns, which is also what gets stored on articles.
//!
//! Calls made on behalf of a user take that user's personal access token.

mod client;
#[cfg(test)]
pub mod fake;

pub use client::ReqwestGitHubClient;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// `repository_dispatch` event asking the article workflow to open a pull request
pub const REQUEST_REVIEW_EVENT: &str = "request-review";

/// `repository_dispatch` event asking the article workflow to pull template changes
pub const UPDATE_TEMPLATE_EVENT: &str = "update-template";

/// Events the default "push-deploy" webhook subscribes to
pub const PUSH_DEPLOY_EVENTS: &[&str] = &["push", "deployment"];

#[async_trait]
pub trait GitHubApi: Send + Sync {
    /// Raw README.md of a repository on the configured branch
    async fn fetch_readme(&self, full_name: &str) -> Result<String>;

    /// Generate `repository` (`owner/name`) from a template repository.
    /// Returns `None` when GitHub refuses.
    async fn copy_repository_template(
        &self,
        token: &str,
        template: &Value,
        repository: &str,
        description: &str,
    ) -> Result<Option<Value>>;

    /// Install a webhook pointing at this service. The answer is returned as
    /// is; a failed creation carries an `errors` key.
    async fn create_webhook(
        &self,
        token: &str,
        repo: &Value,
        secret: &str,
        events: &[&str],
    ) -> Result<Value>;

    async fn delete_webhook(&self, token: &str, repo: &Value, webhook_id: i64) -> Result<()>;

    /// The user's login followed by every organization they administer
    async fn get_admin_namespaces(&self, token: &str) -> Result<Vec<String>>;

    async fn get_repo(&self, token: &str, owner: &str, name: &str) -> Result<Value>;

    async fn get_repository_topics(&self, token: Option<&str>, repo: &Value)
        -> Result<Vec<String>>;

    /// Every repository the user can access
    async fn list_repos(&self, token: &str) -> Result<Vec<Value>>;

    /// Dispatch a review request carrying the proposed README. Returns the
    /// HTTP status code; 204 means GitHub accepted the dispatch.
    async fn request_review(
        &self,
        token: &str,
        github_username: &str,
        repo: &Value,
        markdown: &str,
    ) -> Result<u16>;

    /// Watch a repository so the user gets notified about it
    async fn subscribe_to(&self, token: &str, repo: &Value) -> Result<()>;

    /// Dispatch an `update-template` event. Returns the HTTP status code.
    async fn dispatch_template_update(
        &self,
        token: &str,
        repo: &Value,
        template: &Value,
    ) -> Result<u16>;

    /// Open an issue, returning the created issue object
    async fn create_issue(&self, token: &str, repo: &Value, title: &str, body: &str)
        -> Result<Value>;
}

pub type DynGitHubApi = Arc<dyn GitHubApi>;

/// `owner/name` of a GitHub repository object
pub fn full_name(repo: &Value) -> Result<&str> {
    repo.get("full_name")
        .and_then(|v| v.as_str())
        .context("GitHub repository object has no full_name")
}

/// Whether the authenticated user administers a repository object
pub fn is_admin(repo: &Value) -> bool {
    repo.pointer("/permissions/admin")
        .and_then(|v| v.as_bool())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_full_name() {
        assert_eq!(full_name(&json!({"full_name": "a/b"})).unwrap(), "a/b");
        assert!(full_name(&json!({"name": "b"})).is_err());
    }

    #[test]
    fn test_is_admin() {
        assert!(is_admin(&json!({"permissions": {"admin": true}})));
        assert!(!is_admin(&json!({"permissions": {"admin": false}})));
        assert!(!is_admin(&json!({})));
    }
}
