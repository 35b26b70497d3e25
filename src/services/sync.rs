//! Webhook-driven synchronization
//!
//! These functions run on the background task queue after GitHub notifies
//! us about a repository. A missing article or user means the event is stale
//! and is dropped without error.

use crate::cache::{article_key, MemoryCache};
use crate::db::repositories::{
    ArticleRepository, ContentRepository, PullRequestRepository, Repositories,
    TemplateRepositoryStore, UserRepository,
};
use crate::github::DynGitHubApi;
use crate::models::{Article, PullRequestStatus};
use crate::services::readme::ReadmeParser;
use anyhow::Context;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("GitHub error: {0}")]
    GitHubError(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// A `pull_request` webhook delivery, reduced to what the sync needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequestEvent {
    pub article_uuid: String,
    pub number: i64,
    pub url: String,
    /// GitHub login of the pull request author
    pub user: String,
    pub action: String,
    pub merged_at: Option<String>,
}

/// Status a pull request moves to for a webhook action; `None` leaves it
/// unchanged
pub fn status_for_action(action: &str, merged_at: Option<&str>) -> Option<PullRequestStatus> {
    match action {
        "opened" | "edited" | "ready_for_review" | "reopened" => Some(PullRequestStatus::Open),
        "closed" => match merged_at {
            Some(merged) if !merged.is_empty() => Some(PullRequestStatus::Closed),
            _ => Some(PullRequestStatus::Reject),
        },
        "assigned" | "unassigned" | "review_requested" | "review_request_removed" | "labeled"
        | "unlabeled" => {
            tracing::info!("No action taken for {}", action);
            None
        }
        _ => None,
    }
}

pub struct SyncService {
    articles: Arc<dyn ArticleRepository>,
    contents: Arc<dyn ContentRepository>,
    pull_requests: Arc<dyn PullRequestRepository>,
    users: Arc<dyn UserRepository>,
    templates: Arc<dyn TemplateRepositoryStore>,
    github: DynGitHubApi,
    parser: Arc<ReadmeParser>,
    cache: Option<Arc<MemoryCache>>,
}

impl SyncService {
    pub fn new(repos: &Repositories, github: DynGitHubApi, parser: Arc<ReadmeParser>) -> Self {
        Self {
            articles: repos.articles.clone(),
            contents: repos.contents.clone(),
            pull_requests: repos.pull_requests.clone(),
            users: repos.users.clone(),
            templates: repos.templates.clone(),
            github,
            parser,
            cache: None,
        }
    }

    /// Invalidate cached article details after every sync
    pub fn with_cache(mut self, cache: Arc<MemoryCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    async fn invalidate(&self, article: &Article) {
        if let Some(cache) = &self.cache {
            cache.delete(&article_key(&article.name)).await;
        }
    }

    /// Re-fetch the README of an article and rebuild its questions and examples
    pub async fn update_article(&self, article_uuid: &str) -> Result<(), SyncError> {
        let Some(article) = self.articles.get_by_uuid(article_uuid).await? else {
            tracing::debug!("update_article: no article {}", article_uuid);
            return Ok(());
        };

        let full_name = article
            .full_name()
            .context("Article repository has no full_name")?
            .to_string();
        let content = self
            .github
            .fetch_readme(&full_name)
            .await
            .map_err(|e| SyncError::GitHubError(e.to_string()))?;

        let parsed = self.parser.parse_readme(&content);

        self.contents.clear_article(article.id).await?;
        for text in &parsed.questions {
            let question = self.contents.get_or_create_question(text).await?;
            self.contents.add_question(article.id, question.id).await?;
        }
        for example in &parsed.examples {
            let example = self
                .contents
                .get_or_create_example(&example.text, &example.code)
                .await?;
            self.contents.add_example(article.id, example.id).await?;
        }

        self.articles
            .update_content(article.id, &content, &parsed.html)
            .await?;
        self.invalidate(&article).await;

        tracing::info!(
            "Updated {} from {}: {} questions, {} examples",
            article.name,
            full_name,
            parsed.questions.len(),
            parsed.examples.len()
        );
        Ok(())
    }

    /// Reconcile a `pull_request` webhook with the local pull request row
    pub async fn update_pullrequest(&self, event: &PullRequestEvent) -> Result<(), SyncError> {
        let Some(article) = self.articles.get_by_uuid(&event.article_uuid).await? else {
            return Ok(());
        };
        let Some(user) = self.users.get_by_github_username(&event.user).await? else {
            tracing::debug!("update_pullrequest: no user connected as {}", event.user);
            return Ok(());
        };

        let existing = self
            .pull_requests
            .get_by_article_number(article.id, event.number)
            .await?;

        let mut pull_request = match existing {
            Some(pull_request) => pull_request,
            None if event.action == "opened" => {
                match self
                    .pull_requests
                    .find_unnumbered_pending(article.id, user.id)
                    .await?
                {
                    Some(pending) => pending,
                    None => {
                        self.pull_requests
                            .create(
                                article.id,
                                user.id,
                                Some(event.number),
                                Some(&event.url),
                                PullRequestStatus::Pending,
                            )
                            .await?
                    }
                }
            }
            None => return Ok(()),
        };

        pull_request.number = Some(event.number);
        pull_request.url = Some(event.url.clone());
        if let Some(status) = status_for_action(&event.action, event.merged_at.as_deref()) {
            pull_request.status = status;
        }

        self.pull_requests.update(&pull_request).await?;
        self.invalidate(&article).await;

        tracing::info!(
            "Pull request #{} on {} is {}",
            event.number,
            article.name,
            pull_request.status
        );
        Ok(())
    }

    /// Ask an article repository to pull changes from its template
    pub async fn update_template(&self, article_name: &str) -> Result<(), SyncError> {
        let Some(article) = self.articles.get_by_name(article_name).await? else {
            return Ok(());
        };
        let Some(template_id) = article.template_id else {
            tracing::warn!("{} has no template repository", article.name);
            return Ok(());
        };
        let Some(template) = self.templates.get_by_id(template_id).await? else {
            return Ok(());
        };
        let owner = self.users.get_by_id(article.owner_id).await?;
        let Some(token) = owner.and_then(|o| o.github_token).filter(|t| !t.is_empty()) else {
            tracing::warn!("Owner of {} has no GitHub connection", article.name);
            return Ok(());
        };

        let status = self
            .github
            .dispatch_template_update(&token, &article.repo, &template.repo)
            .await
            .map_err(|e| SyncError::GitHubError(e.to_string()))?;

        if status != 204 {
            return Err(SyncError::GitHubError(format!(
                "update-template dispatch for {} returned {}",
                article.name, status
            )));
        }
        Ok(())
    }
}
