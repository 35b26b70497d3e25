//! Fixtures shared by service, task and router tests

use crate::cache::MemoryCache;
use crate::config::AskciConfig;
use crate::db::repositories::Repositories;
use crate::db::{create_test_pool, migrations, DynDatabasePool};
use crate::github::fake::FakeGitHub;
use crate::models::{Article, CreateArticleInput, TemplateRepository, User};
use crate::services::article::ArticleService;
use crate::services::readme::ReadmeParser;
use crate::services::sync::SyncService;
use crate::services::user::UserService;
use crate::tasks::{JobReceiver, TaskQueue};
use serde_json::json;
use std::ops::Deref;
use std::sync::Arc;
use std::time::Duration;

pub const TEMPLATE_NAME: &str = "askci-term-template";

pub struct TestContext {
    pub pool: DynDatabasePool,
    pub repos: Repositories,
    pub github: Arc<FakeGitHub>,
    pub parser: Arc<ReadmeParser>,
    pub cache: Arc<MemoryCache>,
}

impl Deref for TestContext {
    type Target = Repositories;

    fn deref(&self) -> &Repositories {
        &self.repos
    }
}

impl TestContext {
    pub async fn new() -> Self {
        Self::with_github(FakeGitHub::new()).await
    }

    pub async fn with_github(github: FakeGitHub) -> Self {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");

        Self {
            repos: Repositories::sqlx(&pool),
            pool,
            github: Arc::new(github),
            parser: Arc::new(ReadmeParser::new().expect("README regexes compile")),
            cache: Arc::new(MemoryCache::with_capacity_and_ttl(
                100,
                Duration::from_secs(60),
            )),
        }
    }

    /// A user; `connected` users have a GitHub login equal to their username
    pub async fn create_user(&self, username: &str, connected: bool) -> User {
        let user = self
            .users
            .create(&User::new(
                username.to_string(),
                format!("{}@example.com", username),
                "hash".to_string(),
            ))
            .await
            .expect("Failed to create user");

        if connected {
            self.users
                .update_github(user.id, Some(username), Some(&format!("token-{}", username)))
                .await
                .expect("Failed to connect GitHub");
        }
        self.users
            .get_by_id(user.id)
            .await
            .expect("Failed to reload user")
            .expect("user exists")
    }

    pub async fn create_admin(&self, username: &str) -> User {
        let mut user = User::new(
            username.to_string(),
            format!("{}@example.com", username),
            "hash".to_string(),
        );
        user.is_staff = true;
        user.is_superuser = true;
        self.users.create(&user).await.expect("Failed to create admin")
    }

    pub async fn template(&self) -> TemplateRepository {
        let existing = self.templates.list().await.expect("Failed to list templates");
        if let Some(template) = existing.into_iter().find(|t| t.name == TEMPLATE_NAME) {
            return template;
        }
        self.templates
            .create(
                TEMPLATE_NAME,
                &json!({
                    "id": 1,
                    "name": TEMPLATE_NAME,
                    "full_name": format!("askci/{}", TEMPLATE_NAME),
                    "html_url": format!("https://github.com/askci/{}", TEMPLATE_NAME),
                }),
            )
            .await
            .expect("Failed to create template")
    }

    /// An article whose repository lives in the owner's GitHub namespace
    pub async fn create_article(&self, name: &str, owner: &User) -> Article {
        let template = self.template().await;
        let repo_id = 100 + self.articles.count().await.expect("Failed to count articles");
        let namespace = owner.github_username.as_deref().unwrap_or(&owner.username);
        let repo = FakeGitHub::repo(repo_id, namespace, &format!("askci-term-{}", name), true);

        self.articles
            .create(&CreateArticleInput {
                name: name.to_string(),
                summary: format!("{} summary", name),
                repo,
                owner_id: owner.id,
                template_id: Some(template.id),
                webhook: json!({
                    "push-deploy": {"id": repo_id * 10 + 1},
                    "pull_request": {"id": repo_id * 10 + 2},
                    "repository": {"id": repo_id * 10 + 3},
                }),
                secret: format!("secret-{}", name),
            })
            .await
            .expect("Failed to create article")
    }

    pub fn sync(&self) -> SyncService {
        SyncService::new(&self.repos, self.github.clone(), self.parser.clone())
            .with_cache(self.cache.clone())
    }

    pub fn user_service(&self) -> UserService {
        UserService::new(
            self.users.clone(),
            self.sessions.clone(),
            self.pull_requests.clone(),
        )
    }

    /// An article service whose jobs land in the returned receiver
    pub fn article_service(&self) -> (ArticleService, JobReceiver) {
        let (queue, receiver) = TaskQueue::channel();
        let service = ArticleService::new(
            self.repos.clone(),
            self.github.clone(),
            self.parser.clone(),
            self.cache.clone(),
            queue,
            &AskciConfig::default(),
        );
        (service, receiver)
    }
}
