//! Article service
//!
//! The article workflows behind the HTTP routes:
//! - listing and detail views (details are cached until the next sync)
//! - review requests, which dispatch the submitted markdown to the article
//!   repository and record a pending pull request
//! - creating articles from a template repository, or importing an existing
//!   `askci-term-*` repository, with their three webhooks
//! - tags mirrored from repository topics
//! - staff-triggered template updates, issues for new questions and downloads

use crate::cache::{article_key, MemoryCache};
use crate::config::AskciConfig;
use crate::db::repositories::Repositories;
use crate::github::{self, DynGitHubApi, PUSH_DEPLOY_EVENTS};
use crate::models::{
    Article, CreateArticleInput, Example, ListParams, PagedResult, PullRequest,
    PullRequestStatus, Question, Tag, TemplateRepository, User, ARTICLE_REPO_PREFIX,
};
use crate::services::readme::ReadmeParser;
use crate::tasks::{Job, TaskQueue};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

const NOT_AUTHENTICATED: &str = "You must be authenticated to perform this action.";
const NOT_CONNECTED: &str = "You must connect with GitHub to make this request.";
const NOT_ALLOWED: &str = "You are not allowed to perform that action.";

/// Error types for article service operations
#[derive(Debug, thiserror::Error)]
pub enum ArticleServiceError {
    #[error("Article not found: {0}")]
    NotFound(String),

    /// The user may not perform the action; the message is user-facing
    #[error("{0}")]
    Forbidden(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    /// GitHub refused or failed the request
    #[error("GitHub error: {0}")]
    GitHubError(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// An article with everything its detail page shows
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArticleDetails {
    pub article: Article,
    pub questions: Vec<Question>,
    pub examples: Vec<Example>,
    pub tags: Vec<Tag>,
    /// Pending and open pull requests
    pub pull_requests: Vec<PullRequest>,
}

/// A tag and the articles carrying it
#[derive(Debug, Clone, Serialize)]
pub struct TagDetails {
    pub tag: Tag,
    pub articles: Vec<Article>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewArticleInput {
    /// User or organization the repository is created in
    pub namespace: String,
    pub summary: String,
    pub term: String,
    /// Template uuid; the latest template when missing
    #[serde(default)]
    pub template: Option<String>,
}

/// Lowercase a term and collapse everything outside `[a-z0-9]` into single dashes
pub fn lowercase_cleaned_name(name: &str) -> String {
    let mut cleaned = String::with_capacity(name.len());
    for c in name.trim().to_lowercase().chars() {
        if c.is_ascii_alphanumeric() {
            cleaned.push(c);
        } else if !cleaned.is_empty() && !cleaned.ends_with('-') {
            cleaned.push('-');
        }
    }
    cleaned.trim_end_matches('-').to_string()
}

/// Quote a CSV field when it needs it
fn csv_field(value: &str) -> String {
    if value.contains(&[',', '"', '\n'][..]) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

pub struct ArticleService {
    repos: Repositories,
    github: DynGitHubApi,
    parser: Arc<ReadmeParser>,
    cache: Arc<MemoryCache>,
    queue: TaskQueue,
    user_articles_limit: i64,
}

impl ArticleService {
    pub fn new(
        repos: Repositories,
        github: DynGitHubApi,
        parser: Arc<ReadmeParser>,
        cache: Arc<MemoryCache>,
        queue: TaskQueue,
        config: &AskciConfig,
    ) -> Self {
        Self {
            repos,
            github,
            parser,
            cache,
            queue,
            user_articles_limit: config.user_articles_limit,
        }
    }

    async fn get_article(&self, name: &str) -> Result<Article, ArticleServiceError> {
        self.repos
            .articles
            .get_by_name(name)
            .await
            .context("Failed to get article")?
            .ok_or_else(|| ArticleServiceError::NotFound(name.to_string()))
    }

    /// Most recently modified first
    pub async fn all_articles(
        &self,
        params: &ListParams,
    ) -> Result<PagedResult<Article>, ArticleServiceError> {
        let items = self
            .repos
            .articles
            .list(params.offset(), params.limit())
            .await
            .context("Failed to list articles")?;
        let total = self
            .repos
            .articles
            .count()
            .await
            .context("Failed to count articles")?;
        Ok(PagedResult::new(items, total, params))
    }

    /// Every article, unpaginated, for the staff overview
    pub async fn list_all(&self) -> Result<Vec<Article>, ArticleServiceError> {
        Ok(self
            .repos
            .articles
            .list_all()
            .await
            .context("Failed to list articles")?)
    }

    pub async fn article_details(&self, name: &str) -> Result<ArticleDetails, ArticleServiceError> {
        let key = article_key(name);
        match self.cache.get::<ArticleDetails>(&key).await {
            Ok(Some(details)) => return Ok(details),
            Ok(None) => {}
            Err(e) => tracing::warn!("Ignoring unreadable cache entry {}: {}", key, e),
        }

        let article = self.get_article(name).await?;
        let questions = self
            .repos
            .contents
            .questions_for_article(article.id)
            .await
            .context("Failed to load questions")?;
        let examples = self
            .repos
            .contents
            .examples_for_article(article.id)
            .await
            .context("Failed to load examples")?;
        let tags = self
            .repos
            .tags
            .get_by_article_id(article.id)
            .await
            .context("Failed to load tags")?;
        let pull_requests = self
            .repos
            .pull_requests
            .list_for_article(article.id)
            .await
            .context("Failed to load pull requests")?
            .into_iter()
            .filter(|pr| pr.status.is_active())
            .collect();

        let details = ArticleDetails {
            article,
            questions,
            examples,
            tags,
            pull_requests,
        };
        if let Err(e) = self.cache.set(&key, &details).await {
            tracing::warn!("Failed to cache {}: {}", key, e);
        }
        Ok(details)
    }

    /// Submit markdown for review; the answer is the message shown to the user
    pub async fn request_review(
        &self,
        user: Option<&User>,
        name: &str,
        markdown: Option<&str>,
    ) -> Result<String, ArticleServiceError> {
        let article = self.get_article(name).await?;

        let Some(user) = user else {
            return Ok(NOT_AUTHENTICATED.to_string());
        };
        let Some(token) = user.github_token.as_deref().filter(|t| !t.is_empty()) else {
            return Ok(NOT_CONNECTED.to_string());
        };
        let markdown = match markdown {
            Some(m) if !m.is_empty() => m,
            _ => return Ok("You must submit some markdown content for review".to_string()),
        };
        if markdown == article.text {
            return Ok("You must change the content to request review.".to_string());
        }
        if let Err(message) = self.parser.test_markdown(markdown) {
            return Ok(message);
        }

        if let Some(pr) = self
            .repos
            .pull_requests
            .find_active(article.id, user.id)
            .await
            .context("Failed to look up pull request")?
        {
            let mut message = "You already have a review pending for this article!".to_string();
            if let Some(url) = &pr.url {
                message.push_str(&format!(" See or edit the pull request at {}", url));
            }
            return Ok(message);
        }

        let login = user.github_username.as_deref().unwrap_or(&user.username);
        let status = self
            .github
            .request_review(token, login, &article.repo, markdown)
            .await
            .map_err(|e| ArticleServiceError::GitHubError(e.to_string()))?;

        if status != 204 {
            tracing::warn!("Review dispatch for {} returned {}", article.name, status);
            return Ok("There was an issue with requesting changes.".to_string());
        }

        if let Err(e) = self.github.subscribe_to(token, &article.repo).await {
            tracing::warn!("Failed to subscribe {} to {}: {}", login, article.name, e);
        }
        self.repos
            .pull_requests
            .create(article.id, user.id, None, None, PullRequestStatus::Pending)
            .await
            .context("Failed to record pull request")?;
        self.cache.delete(&article_key(&article.name)).await;

        tracing::info!(
            "{} submitted changes for review to {}",
            login,
            article.full_name().unwrap_or(&article.name)
        );
        Ok("success".to_string())
    }

    /// Owner only: remove the webhooks on GitHub, then the article
    pub async fn delete_article(&self, user: &User, name: &str) -> Result<(), ArticleServiceError> {
        let article = self.get_article(name).await?;
        if article.owner_id != user.id {
            return Err(ArticleServiceError::Forbidden(NOT_ALLOWED.to_string()));
        }
        let token = connected_token(user)?;

        for webhook_id in article.webhook_ids() {
            self.github
                .delete_webhook(token, &article.repo, webhook_id)
                .await
                .map_err(|e| ArticleServiceError::GitHubError(e.to_string()))?;
        }
        self.repos
            .articles
            .delete(article.id)
            .await
            .context("Failed to delete article")?;
        self.cache.delete(&article_key(&article.name)).await;

        tracing::info!("{} has been deleted.", article.name);
        Ok(())
    }

    /// Whether the user may create or import another article
    pub async fn has_articles_opening(
        &self,
        user: Option<&User>,
    ) -> Result<bool, ArticleServiceError> {
        let Some(user) = user else {
            return Ok(false);
        };
        match self.check_opening(user).await {
            Ok(()) => Ok(true),
            Err(ArticleServiceError::Forbidden(reason)) => {
                tracing::debug!("{}", reason);
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    async fn check_opening(&self, user: &User) -> Result<(), ArticleServiceError> {
        if !user.has_github_create() {
            return Err(ArticleServiceError::Forbidden(format!(
                "{} does not have appropriate GitHub permissions to create a knowledge repository.",
                user.username
            )));
        }
        let owned = self
            .repos
            .articles
            .count_by_owner(user.id)
            .await
            .context("Failed to count articles")?;
        if owned >= self.user_articles_limit {
            return Err(ArticleServiceError::Forbidden(
                "You are not allowed to create more articles.".to_string(),
            ));
        }
        Ok(())
    }

    /// Namespaces offered on the new article form
    pub async fn admin_namespaces(&self, user: &User) -> Result<Vec<String>, ArticleServiceError> {
        let token = connected_token(user)?;
        self.github
            .get_admin_namespaces(token)
            .await
            .map_err(|e| ArticleServiceError::GitHubError(e.to_string()))
    }

    pub async fn templates(&self) -> Result<Vec<TemplateRepository>, ArticleServiceError> {
        Ok(self
            .repos
            .templates
            .list()
            .await
            .context("Failed to list templates")?)
    }

    /// Generate `<namespace>/askci-term-<term>` from a template and register it
    pub async fn new_article(
        &self,
        user: &User,
        input: NewArticleInput,
    ) -> Result<Article, ArticleServiceError> {
        self.check_opening(user).await?;
        let token = connected_token(user)?;

        let term = lowercase_cleaned_name(&input.term);
        let namespace = input.namespace.trim();
        if term.is_empty() {
            return Err(ArticleServiceError::ValidationError(
                "The term must contain letters or numbers.".to_string(),
            ));
        }
        if namespace.is_empty() {
            return Err(ArticleServiceError::ValidationError(
                "A namespace is required.".to_string(),
            ));
        }
        self.ensure_name_free(&term).await?;

        let template = match input.template.as_deref() {
            Some(uuid) => self
                .repos
                .templates
                .get_by_uuid(uuid)
                .await
                .context("Failed to get template")?
                .ok_or_else(|| {
                    ArticleServiceError::NotFound("That template doesn't exist".to_string())
                })?,
            None => self
                .repos
                .templates
                .latest()
                .await
                .context("Failed to get template")?
                .ok_or_else(|| {
                    ArticleServiceError::ValidationError(
                        "No template repository is configured.".to_string(),
                    )
                })?,
        };

        let repository = format!("{}/{}{}", namespace, ARTICLE_REPO_PREFIX, term);
        let repo = self
            .github
            .copy_repository_template(token, &template.repo, &repository, &input.summary)
            .await
            .map_err(|e| ArticleServiceError::GitHubError(e.to_string()))?
            .ok_or_else(|| {
                ArticleServiceError::GitHubError(format!(
                    "There was an error creating {}. Make sure that the template {} organization is authenticated with the application here.",
                    repository,
                    template.full_name().unwrap_or(&template.name)
                ))
            })?;

        self.register_article(user, token, repo, term, input.summary, &template)
            .await
    }

    /// Repositories the user could import: administered, named `askci-term*`,
    /// not yet an article and not a template
    pub async fn import_candidates(&self, user: &User) -> Result<Vec<Value>, ArticleServiceError> {
        self.check_opening(user).await?;
        let token = connected_token(user)?;

        let repos = self
            .github
            .list_repos(token)
            .await
            .map_err(|e| ArticleServiceError::GitHubError(e.to_string()))?;
        let template_names: HashSet<String> =
            self.templates().await?.into_iter().map(|t| t.name).collect();
        let imported: HashSet<i64> = self
            .repos
            .articles
            .list_all()
            .await
            .context("Failed to list articles")?
            .into_iter()
            .map(|a| a.repo_id)
            .collect();

        Ok(repos
            .into_iter()
            .filter(|repo| github::is_admin(repo))
            .filter(|repo| {
                repo.get("id")
                    .and_then(|id| id.as_i64())
                    .map_or(false, |id| !imported.contains(&id))
            })
            .filter(|repo| {
                repo.get("name").and_then(|n| n.as_str()).map_or(false, |name| {
                    name.starts_with("askci-term") && !template_names.contains(name)
                })
            })
            .collect())
    }

    /// Import the first selected `owner/name` repository
    pub async fn import_article(
        &self,
        user: &User,
        repos: &[String],
        template_uuid: &str,
    ) -> Result<Article, ArticleServiceError> {
        self.check_opening(user).await?;
        let token = connected_token(user)?;

        let template = self
            .repos
            .templates
            .get_by_uuid(template_uuid)
            .await
            .context("Failed to get template")?
            .ok_or_else(|| {
                ArticleServiceError::NotFound("That template doesn't exist".to_string())
            })?;

        let selected = repos.first().ok_or_else(|| {
            ArticleServiceError::ValidationError("Select a repository to import.".to_string())
        })?;
        let (owner, reponame) = selected.split_once('/').ok_or_else(|| {
            ArticleServiceError::ValidationError(format!("{} is not owner/name", selected))
        })?;

        let repo = self
            .github
            .get_repo(token, owner, reponame)
            .await
            .map_err(|e| ArticleServiceError::GitHubError(e.to_string()))?;
        if !github::is_admin(&repo) {
            return Err(ArticleServiceError::Forbidden(
                "You must be an admin on the repository to import it.".to_string(),
            ));
        }
        if let Some(id) = repo.get("id").and_then(|v| v.as_i64()) {
            if self
                .repos
                .articles
                .get_by_repo_id(id)
                .await
                .context("Failed to check repository")?
                .is_some()
            {
                return Err(ArticleServiceError::ValidationError(format!(
                    "{} is already an article.",
                    selected
                )));
            }
        }

        let term = reponame.replace(ARTICLE_REPO_PREFIX, "");
        self.ensure_name_free(&term).await?;
        let summary = repo
            .get("description")
            .and_then(|d| d.as_str())
            .unwrap_or_default()
            .to_string();

        self.register_article(user, token, repo, term, summary, &template)
            .await
    }

    async fn ensure_name_free(&self, term: &str) -> Result<(), ArticleServiceError> {
        if self
            .repos
            .articles
            .get_by_name(term)
            .await
            .context("Failed to check article name")?
            .is_some()
        {
            return Err(ArticleServiceError::ValidationError(format!(
                "An article named {} already exists.",
                term
            )));
        }
        Ok(())
    }

    /// Install the webhooks, create the article, tag it and queue its first sync
    async fn register_article(
        &self,
        user: &User,
        token: &str,
        repo: Value,
        term: String,
        summary: String,
        template: &TemplateRepository,
    ) -> Result<Article, ArticleServiceError> {
        let secret = Uuid::new_v4().to_string();
        let mut webhooks = serde_json::Map::new();
        for (purpose, events) in [
            ("push-deploy", PUSH_DEPLOY_EVENTS),
            ("pull_request", &["pull_request"][..]),
            ("repository", &["repository"][..]),
        ] {
            let webhook = self
                .github
                .create_webhook(token, &repo, &secret, events)
                .await
                .map_err(|e| ArticleServiceError::GitHubError(e.to_string()))?;
            webhooks.insert(purpose.to_string(), webhook);
        }

        if let Some(errors) = webhooks.get("push-deploy").and_then(|w| w.get("errors")) {
            return Err(ArticleServiceError::GitHubError(format!("Errors: {}", errors)));
        }

        let article = self
            .repos
            .articles
            .create(&CreateArticleInput {
                name: term,
                summary,
                repo,
                owner_id: user.id,
                template_id: Some(template.id),
                webhook: Value::Object(webhooks),
                secret,
            })
            .await
            .context("Failed to create article")?;

        self.add_article_tags(&article).await?;
        self.queue.enqueue(Job::UpdateArticle {
            article_uuid: article.uuid.clone(),
        });

        tracing::info!(
            "{} has been created! Refresh the page for updated content.",
            article.name
        );
        Ok(article)
    }

    /// Replace the tags of an article with its repository topics
    pub async fn add_article_tags(
        &self,
        article: &Article,
    ) -> Result<Vec<Tag>, ArticleServiceError> {
        let listed: Vec<String> = article
            .repo
            .get("topics")
            .and_then(|t| t.as_array())
            .map(|topics| {
                topics
                    .iter()
                    .filter_map(|t| t.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();

        let topics = if listed.is_empty() {
            let owner = self
                .repos
                .users
                .get_by_id(article.owner_id)
                .await
                .context("Failed to get article owner")?;
            let token = owner.as_ref().and_then(|o| o.github_token.as_deref());
            self.github
                .get_repository_topics(token, &article.repo)
                .await
                .map_err(|e| ArticleServiceError::GitHubError(e.to_string()))?
        } else {
            listed
        };

        let mut tags = Vec::with_capacity(topics.len());
        for topic in &topics {
            tags.push(
                self.repos
                    .tags
                    .get_or_create(topic)
                    .await
                    .context("Failed to create tag")?,
            );
        }
        let ids: Vec<i64> = tags.iter().map(|t| t.id).collect();
        self.repos
            .tags
            .set_for_article(article.id, &ids)
            .await
            .context("Failed to set article tags")?;
        self.cache.delete(&article_key(&article.name)).await;
        Ok(tags)
    }

    /// Staff only: queue template updates for the named articles whose
    /// template is among the selected ones
    pub async fn update_templates(
        &self,
        user: &User,
        template_uuids: &[String],
        article_names: &[String],
    ) -> Result<usize, ArticleServiceError> {
        if !user.is_admin() {
            return Err(ArticleServiceError::Forbidden(
                "You don't have permission to perform this action.".to_string(),
            ));
        }

        let mut selected = HashSet::new();
        for uuid in template_uuids {
            if let Some(template) = self
                .repos
                .templates
                .get_by_uuid(uuid)
                .await
                .context("Failed to get template")?
            {
                selected.insert(template.id);
            }
        }

        let mut count = 0;
        for name in article_names {
            let Some(article) = self
                .repos
                .articles
                .get_by_name(name)
                .await
                .context("Failed to get article")?
            else {
                continue;
            };
            if article.template_id.map_or(false, |id| selected.contains(&id)) {
                self.queue.enqueue(Job::UpdateTemplate {
                    article: article.name,
                });
                count += 1;
            }
        }

        tracing::info!("{} terms requested for update.", count);
        Ok(count)
    }

    /// Open an issue on the article repository asking the question
    pub async fn new_question(
        &self,
        user: &User,
        name: &str,
        question: &str,
    ) -> Result<Value, ArticleServiceError> {
        let article = self.get_article(name).await?;
        let token = connected_token(user)?;
        let question = question.trim();
        if question.is_empty() {
            return Err(ArticleServiceError::ValidationError(
                "The question cannot be empty.".to_string(),
            ));
        }

        let login = user.github_username.as_deref().unwrap_or(&user.username);
        let body = format!("Question about {} asked by @{}.", article.name, login);
        self.github
            .create_issue(token, &article.repo, question, &body)
            .await
            .map_err(|e| ArticleServiceError::GitHubError(e.to_string()))
    }

    /// Every article, by name
    pub async fn export_articles(&self) -> Result<Value, ArticleServiceError> {
        let articles = self
            .repos
            .articles
            .list_all()
            .await
            .context("Failed to list articles")?;
        let exported: Vec<Value> = articles
            .iter()
            .map(|a| {
                json!({
                    "name": a.name,
                    "uuid": a.uuid,
                    "summary": a.summary,
                    "repository": a.full_name(),
                    "url": a.html_url(),
                    "modified": a.modified_at,
                })
            })
            .collect();
        Ok(Value::Array(exported))
    }

    /// `name,full_name,html_url` per article, with a header row
    pub async fn repositories_csv(&self) -> Result<String, ArticleServiceError> {
        let articles = self
            .repos
            .articles
            .list_all()
            .await
            .context("Failed to list articles")?;
        let mut csv = String::from("name,full_name,html_url\n");
        for article in &articles {
            csv.push_str(&format!(
                "{},{},{}\n",
                csv_field(&article.name),
                csv_field(article.full_name().unwrap_or_default()),
                csv_field(article.html_url().unwrap_or_default())
            ));
        }
        Ok(csv)
    }

    /// Raw README markdown of an article
    pub async fn article_readme(&self, name: &str) -> Result<String, ArticleServiceError> {
        Ok(self.get_article(name).await?.text)
    }

    pub async fn all_tags(&self) -> Result<Vec<Tag>, ArticleServiceError> {
        Ok(self.repos.tags.list().await.context("Failed to list tags")?)
    }

    pub async fn tag_details(&self, name: &str) -> Result<TagDetails, ArticleServiceError> {
        let tag = self
            .repos
            .tags
            .get_by_name(name)
            .await
            .context("Failed to get tag")?
            .ok_or_else(|| ArticleServiceError::NotFound(format!("tag {}", name)))?;
        let articles = self
            .repos
            .articles
            .list_by_tag(tag.id)
            .await
            .context("Failed to list tagged articles")?;
        Ok(TagDetails { tag, articles })
    }

    /// The article a webhook delivery is about
    pub async fn article_by_repo_id(&self, repo_id: i64) -> Result<Article, ArticleServiceError> {
        self.repos
            .articles
            .get_by_repo_id(repo_id)
            .await
            .context("Failed to get article by repository")?
            .ok_or_else(|| ArticleServiceError::NotFound(format!("repository {}", repo_id)))
    }

    /// Apply a `repository` webhook: renames and edits store the new
    /// repository object, deletion removes the article
    pub async fn repository_event(
        &self,
        article: &Article,
        action: &str,
        repository: &Value,
    ) -> Result<&'static str, ArticleServiceError> {
        let outcome = match action {
            "renamed" | "edited" => {
                self.repos
                    .articles
                    .update_repo(article.id, repository)
                    .await
                    .context("Failed to update repository")?;
                "updated"
            }
            "deleted" => {
                self.repos
                    .articles
                    .delete(article.id)
                    .await
                    .context("Failed to delete article")?;
                tracing::info!("Repository of {} was deleted, removed the article", article.name);
                "deleted"
            }
            _ => return Ok("ignored"),
        };
        self.cache.delete(&article_key(&article.name)).await;
        Ok(outcome)
    }

    /// Staff only: register `owner/name` as a template repository
    pub async fn add_template(
        &self,
        user: &User,
        owner: &str,
        name: &str,
    ) -> Result<TemplateRepository, ArticleServiceError> {
        if !user.is_admin() {
            return Err(ArticleServiceError::Forbidden(
                "You don't have permission to perform this action.".to_string(),
            ));
        }
        let token = connected_token(user)?;
        let repo = self
            .github
            .get_repo(token, owner, name)
            .await
            .map_err(|e| ArticleServiceError::GitHubError(e.to_string()))?;
        let template = self
            .repos
            .templates
            .create(name, &repo)
            .await
            .context("Failed to create template")?;
        tracing::info!("Added template repository {}/{}", owner, name);
        Ok(template)
    }
}

fn connected_token(user: &User) -> Result<&str, ArticleServiceError> {
    user.github_token
        .as_deref()
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ArticleServiceError::Forbidden(NOT_CONNECTED.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::github::fake::FakeGitHub;
    use crate::services::testing::{TestContext, TEMPLATE_NAME};
    use proptest::prelude::*;

    const VALID_README: &str = "# MPI\n\n<span id=\"question-what-is-mpi\"></span>\n";

    #[test]
    fn test_lowercase_cleaned_name() {
        assert_eq!(lowercase_cleaned_name("MPI"), "mpi");
        assert_eq!(lowercase_cleaned_name("  Message Passing  "), "message-passing");
        assert_eq!(lowercase_cleaned_name("c++ / rust"), "c-rust");
        assert_eq!(lowercase_cleaned_name("!!!"), "");
    }

    proptest! {
        #[test]
        fn prop_cleaned_name_is_repository_safe(name in "\\PC{0,40}") {
            let cleaned = lowercase_cleaned_name(&name);
            prop_assert!(cleaned
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-'));
            prop_assert!(!cleaned.starts_with('-') && !cleaned.ends_with('-'));
            prop_assert!(!cleaned.contains("--"));
        }
    }

    #[test]
    fn test_csv_field_quotes() {
        assert_eq!(csv_field("plain"), "plain");
        assert_eq!(csv_field("a,b"), "\"a,b\"");
        assert_eq!(csv_field("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[tokio::test]
    async fn test_all_articles_paginates() {
        let ctx = TestContext::new().await;
        let owner = ctx.create_user("octocat", true).await;
        for name in ["mpi", "slurm", "singularity"] {
            ctx.create_article(name, &owner).await;
        }
        let (service, _jobs) = ctx.article_service();

        let page = service.all_articles(&ListParams::new(1, 2)).await.unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.items.len(), 2);
        let page = service.all_articles(&ListParams::new(2, 2)).await.unwrap();
        assert_eq!(page.items.len(), 1);
    }

    #[tokio::test]
    async fn test_article_details_and_cache_invalidation() {
        let ctx = TestContext::new().await;
        let owner = ctx.create_user("octocat", true).await;
        let article = ctx.create_article("mpi", &owner).await;
        let (service, _jobs) = ctx.article_service();

        let details = service.article_details("mpi").await.unwrap();
        assert!(details.questions.is_empty());

        ctx.github.set_readme("octocat/askci-term-mpi", VALID_README);
        ctx.sync().update_article(&article.uuid).await.unwrap();

        let details = service.article_details("mpi").await.unwrap();
        assert_eq!(details.questions.len(), 1);
        assert_eq!(details.article.text, VALID_README);

        let missing = service.article_details("nope").await;
        assert!(matches!(missing, Err(ArticleServiceError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_request_review_messages_in_order() {
        let ctx = TestContext::new().await;
        let owner = ctx.create_user("octocat", true).await;
        let stranger = ctx.create_user("stranger", false).await;
        let article = ctx.create_article("mpi", &owner).await;
        ctx.github.set_readme("octocat/askci-term-mpi", VALID_README);
        ctx.sync().update_article(&article.uuid).await.unwrap();
        let (service, _jobs) = ctx.article_service();

        let ask = |user: Option<&User>, md: Option<&str>| {
            let service = &service;
            let user = user.cloned();
            let md = md.map(str::to_string);
            async move {
                service
                    .request_review(user.as_ref(), "mpi", md.as_deref())
                    .await
                    .unwrap()
            }
        };

        assert_eq!(ask(None, Some("x")).await, NOT_AUTHENTICATED);
        assert_eq!(ask(Some(&stranger), Some("x")).await, NOT_CONNECTED);
        assert_eq!(
            ask(Some(&owner), None).await,
            "You must submit some markdown content for review"
        );
        assert_eq!(
            ask(Some(&owner), Some(VALID_README)).await,
            "You must change the content to request review."
        );
        assert_eq!(
            ask(Some(&owner), Some("<span id=\"question-bad_id\"></span>")).await,
            "question-bad_id is not a valid identifier: use only letters, numbers and dashes."
        );

        let changed = "# MPI\n\n<span id=\"question-why-mpi\"></span>\n";
        assert_eq!(ask(Some(&owner), Some(changed)).await, "success");
        assert!(ctx
            .github
            .calls()
            .contains(&"request_review octocat/askci-term-mpi octocat".to_string()));
        assert!(ctx
            .github
            .calls()
            .contains(&"subscribe_to octocat/askci-term-mpi".to_string()));

        assert_eq!(
            ask(Some(&owner), Some(changed)).await,
            "You already have a review pending for this article!"
        );

        let mut pr = ctx
            .pull_requests
            .find_active(article.id, owner.id)
            .await
            .unwrap()
            .unwrap();
        pr.url = Some("https://github.com/octocat/askci-term-mpi/pull/1".to_string());
        ctx.pull_requests.update(&pr).await.unwrap();
        assert_eq!(
            ask(Some(&owner), Some(changed)).await,
            "You already have a review pending for this article! See or edit the pull request at https://github.com/octocat/askci-term-mpi/pull/1"
        );
    }

    #[tokio::test]
    async fn test_request_review_dispatch_failure() {
        let ctx = TestContext::with_github(FakeGitHub::new().with_dispatch_status(422)).await;
        let owner = ctx.create_user("octocat", true).await;
        let article = ctx.create_article("mpi", &owner).await;
        let (service, _jobs) = ctx.article_service();

        let message = service
            .request_review(Some(&owner), "mpi", Some(VALID_README))
            .await
            .unwrap();
        assert_eq!(message, "There was an issue with requesting changes.");
        assert!(ctx
            .pull_requests
            .find_active(article.id, owner.id)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_delete_article_owner_only() {
        let ctx = TestContext::new().await;
        let owner = ctx.create_user("octocat", true).await;
        let other = ctx.create_user("stranger", true).await;
        let article = ctx.create_article("mpi", &owner).await;
        let (service, _jobs) = ctx.article_service();

        let denied = service.delete_article(&other, "mpi").await;
        assert!(matches!(denied, Err(ArticleServiceError::Forbidden(_))));

        service.delete_article(&owner, "mpi").await.unwrap();
        let deletes: Vec<String> = ctx
            .github
            .calls()
            .into_iter()
            .filter(|c| c.starts_with("delete_webhook"))
            .collect();
        assert_eq!(deletes.len(), 3);
        assert!(ctx.articles.get_by_id(article.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_has_articles_opening() {
        let ctx = TestContext::new().await;
        let connected = ctx.create_user("octocat", true).await;
        let plain = ctx.create_user("plain", false).await;
        let (service, _jobs) = ctx.article_service();

        assert!(!service.has_articles_opening(None).await.unwrap());
        assert!(!service.has_articles_opening(Some(&plain)).await.unwrap());
        assert!(service.has_articles_opening(Some(&connected)).await.unwrap());

        for i in 0..AskciConfig::default().user_articles_limit {
            ctx.create_article(&format!("term{}", i), &connected).await;
        }
        assert!(!service.has_articles_opening(Some(&connected)).await.unwrap());
    }

    #[tokio::test]
    async fn test_new_article_installs_webhooks_and_queues_sync() {
        let github = FakeGitHub::new()
            .with_topics("octocat/askci-term-message-passing", &["hpc", "mpi"]);
        let ctx = TestContext::with_github(github).await;
        let owner = ctx.create_user("octocat", true).await;
        ctx.template().await;
        let (service, mut jobs) = ctx.article_service();

        let article = service
            .new_article(
                &owner,
                NewArticleInput {
                    namespace: "octocat".to_string(),
                    summary: "Message passing".to_string(),
                    term: "Message Passing".to_string(),
                    template: None,
                },
            )
            .await
            .unwrap();

        assert_eq!(article.name, "message-passing");
        assert_eq!(article.full_name(), Some("octocat/askci-term-message-passing"));
        assert_eq!(article.webhook_ids().len(), 3);
        assert!(ctx.github.calls().contains(&format!(
            "copy_repository_template askci/{} -> octocat/askci-term-message-passing",
            TEMPLATE_NAME
        )));
        assert!(ctx
            .github
            .calls()
            .contains(
                &"create_webhook octocat/askci-term-message-passing push,deployment".to_string()
            ));

        let tags = ctx.tags.get_by_article_id(article.id).await.unwrap();
        let names: Vec<&str> = tags.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["hpc", "mpi"]);

        let (_, job) = jobs.try_recv().unwrap();
        assert_eq!(
            job,
            Job::UpdateArticle {
                article_uuid: article.uuid.clone()
            }
        );
    }

    #[tokio::test]
    async fn test_new_article_webhook_errors_abort() {
        let github = FakeGitHub::new().with_webhook_errors("Hook already exists");
        let ctx = TestContext::with_github(github).await;
        let owner = ctx.create_user("octocat", true).await;
        ctx.template().await;
        let (service, mut jobs) = ctx.article_service();

        let result = service
            .new_article(
                &owner,
                NewArticleInput {
                    namespace: "octocat".to_string(),
                    summary: "s".to_string(),
                    term: "mpi".to_string(),
                    template: None,
                },
            )
            .await;

        assert!(matches!(
            result,
            Err(ArticleServiceError::GitHubError(m)) if m.contains("Hook already exists")
        ));
        assert_eq!(ctx.articles.count().await.unwrap(), 0);
        assert!(jobs.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_new_article_generation_refused() {
        let ctx = TestContext::with_github(FakeGitHub::new().refusing_generate()).await;
        let owner = ctx.create_user("octocat", true).await;
        ctx.template().await;
        let (service, _jobs) = ctx.article_service();

        let result = service
            .new_article(
                &owner,
                NewArticleInput {
                    namespace: "octocat".to_string(),
                    summary: "s".to_string(),
                    term: "mpi".to_string(),
                    template: None,
                },
            )
            .await;
        assert!(matches!(
            result,
            Err(ArticleServiceError::GitHubError(m))
                if m.starts_with("There was an error creating octocat/askci-term-mpi")
        ));
    }

    #[tokio::test]
    async fn test_import_candidates_filter() {
        let github = FakeGitHub::new()
            .with_repo(FakeGitHub::repo(500, "octocat", "askci-term-lammps", true))
            .with_repo(FakeGitHub::repo(501, "octocat", "askci-term-gromacs", false))
            .with_repo(FakeGitHub::repo(502, "octocat", "dotfiles", true))
            .with_repo(FakeGitHub::repo(503, "octocat", TEMPLATE_NAME, true))
            .with_repo(FakeGitHub::repo(100, "octocat", "askci-term-mpi", true));
        let ctx = TestContext::with_github(github).await;
        let owner = ctx.create_user("octocat", true).await;
        ctx.create_article("mpi", &owner).await;
        let (service, _jobs) = ctx.article_service();

        let candidates = service.import_candidates(&owner).await.unwrap();
        let names: Vec<&str> = candidates
            .iter()
            .filter_map(|r| r["name"].as_str())
            .collect();
        assert_eq!(names, vec!["askci-term-lammps"]);
    }

    #[tokio::test]
    async fn test_import_article() {
        let mut lammps = FakeGitHub::repo(500, "octocat", "askci-term-lammps", true);
        lammps["topics"] = json!(["md"]);
        let github = FakeGitHub::new()
            .with_repo(lammps)
            .with_repo(FakeGitHub::repo(501, "octocat", "askci-term-gromacs", false));
        let ctx = TestContext::with_github(github).await;
        let owner = ctx.create_user("octocat", true).await;
        let template = ctx.template().await;
        let (service, mut jobs) = ctx.article_service();

        let denied = service
            .import_article(&owner, &["octocat/askci-term-gromacs".to_string()], &template.uuid)
            .await;
        assert!(matches!(denied, Err(ArticleServiceError::Forbidden(_))));

        let missing_template = service
            .import_article(&owner, &["octocat/askci-term-lammps".to_string()], "nope")
            .await;
        assert!(matches!(missing_template, Err(ArticleServiceError::NotFound(_))));

        let article = service
            .import_article(
                &owner,
                &[
                    "octocat/askci-term-lammps".to_string(),
                    "octocat/askci-term-gromacs".to_string(),
                ],
                &template.uuid,
            )
            .await
            .unwrap();
        assert_eq!(article.name, "lammps");
        assert_eq!(article.summary, "askci-term-lammps description");
        assert_eq!(article.template_id, Some(template.id));

        // topics came from the repository object, not the API
        assert!(!ctx
            .github
            .calls()
            .iter()
            .any(|c| c.starts_with("get_repository_topics")));
        let tags = ctx.tags.get_by_article_id(article.id).await.unwrap();
        assert_eq!(tags[0].name, "md");
        assert!(jobs.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_update_templates_counts_matching() {
        let ctx = TestContext::new().await;
        let owner = ctx.create_user("octocat", true).await;
        let admin = ctx.create_admin("admin").await;
        let template = ctx.template().await;
        ctx.create_article("mpi", &owner).await;
        ctx.create_article("slurm", &owner).await;
        let (service, mut jobs) = ctx.article_service();

        let denied = service
            .update_templates(&owner, &[template.uuid.clone()], &["mpi".to_string()])
            .await;
        assert!(matches!(denied, Err(ArticleServiceError::Forbidden(_))));

        let count = service
            .update_templates(
                &admin,
                &[template.uuid.clone()],
                &["mpi".to_string(), "slurm".to_string(), "ghost".to_string()],
            )
            .await
            .unwrap();
        assert_eq!(count, 2);
        let (_, job) = jobs.try_recv().unwrap();
        assert_eq!(job, Job::UpdateTemplate { article: "mpi".to_string() });

        let none = service
            .update_templates(&admin, &[], &["mpi".to_string()])
            .await
            .unwrap();
        assert_eq!(none, 0);
    }

    #[tokio::test]
    async fn test_new_question_opens_issue() {
        let ctx = TestContext::new().await;
        let owner = ctx.create_user("octocat", true).await;
        ctx.create_article("mpi", &owner).await;
        let (service, _jobs) = ctx.article_service();

        let issue = service
            .new_question(&owner, "mpi", " How do I run MPI on two nodes? ")
            .await
            .unwrap();
        assert_eq!(issue["title"], "How do I run MPI on two nodes?");
        assert!(ctx
            .github
            .calls()
            .contains(
                &"create_issue octocat/askci-term-mpi How do I run MPI on two nodes?".to_string()
            ));

        let empty = service.new_question(&owner, "mpi", "  ").await;
        assert!(matches!(empty, Err(ArticleServiceError::ValidationError(_))));
    }

    #[tokio::test]
    async fn test_downloads_and_tags() {
        let ctx = TestContext::new().await;
        let owner = ctx.create_user("octocat", true).await;
        let mpi = ctx.create_article("mpi", &owner).await;
        ctx.create_article("slurm", &owner).await;
        let (service, _jobs) = ctx.article_service();

        let csv = service.repositories_csv().await.unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "name,full_name,html_url");
        assert_eq!(
            lines[1],
            "mpi,octocat/askci-term-mpi,https://github.com/octocat/askci-term-mpi"
        );
        assert_eq!(lines.len(), 3);

        let exported = service.export_articles().await.unwrap();
        assert_eq!(exported.as_array().map(Vec::len), Some(2));

        let hpc = ctx.tags.get_or_create("hpc").await.unwrap();
        ctx.tags.set_for_article(mpi.id, &[hpc.id]).await.unwrap();
        let details = service.tag_details("hpc").await.unwrap();
        assert_eq!(details.articles.len(), 1);
        assert_eq!(details.articles[0].name, "mpi");
        assert!(matches!(
            service.tag_details("nope").await,
            Err(ArticleServiceError::NotFound(_))
        ));

        assert_eq!(service.article_readme("mpi").await.unwrap(), "");
    }

    #[tokio::test]
    async fn test_repository_events() {
        let ctx = TestContext::new().await;
        let owner = ctx.create_user("octocat", true).await;
        let article = ctx.create_article("mpi", &owner).await;
        let (service, _jobs) = ctx.article_service();

        let found = service.article_by_repo_id(article.repo_id).await.unwrap();
        assert_eq!(found.id, article.id);
        assert!(matches!(
            service.article_by_repo_id(9999).await,
            Err(ArticleServiceError::NotFound(_))
        ));

        let renamed = FakeGitHub::repo(article.repo_id, "askci", "askci-term-mpi", true);
        let outcome = service
            .repository_event(&article, "renamed", &renamed)
            .await
            .unwrap();
        assert_eq!(outcome, "updated");
        let stored = ctx.articles.get_by_id(article.id).await.unwrap().unwrap();
        assert_eq!(stored.full_name(), Some("askci/askci-term-mpi"));

        let outcome = service
            .repository_event(&article, "transferred", &renamed)
            .await
            .unwrap();
        assert_eq!(outcome, "ignored");

        let outcome = service
            .repository_event(&article, "deleted", &renamed)
            .await
            .unwrap();
        assert_eq!(outcome, "deleted");
        assert!(ctx.articles.get_by_id(article.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_add_template_requires_staff() {
        let repo = FakeGitHub::repo(7, "askci", "askci-term-template-v2", true);
        let ctx = TestContext::with_github(FakeGitHub::new().with_repo(repo)).await;
        let user = ctx.create_user("octocat", true).await;
        let (service, _jobs) = ctx.article_service();

        let denied = service
            .add_template(&user, "askci", "askci-term-template-v2")
            .await;
        assert!(matches!(denied, Err(ArticleServiceError::Forbidden(_))));

        let admin = ctx.create_admin("admin").await;
        ctx.users
            .update_github(admin.id, Some("admin"), Some("token-admin"))
            .await
            .unwrap();
        let admin = ctx.users.get_by_id(admin.id).await.unwrap().unwrap();
        let template = service
            .add_template(&admin, "askci", "askci-term-template-v2")
            .await
            .unwrap();
        assert_eq!(template.full_name(), Some("askci/askci-term-template-v2"));
        assert_eq!(service.templates().await.unwrap().len(), 1);
    }
}
