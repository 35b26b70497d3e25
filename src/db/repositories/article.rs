//! Article repository
//!
//! Database operations for articles.
//!
//! This module provides:
//! - `ArticleRepository` trait defining the interface for article data access
//! - `SqlxArticleRepository` implementing the trait for SQLite and MySQL
//!
//! The GitHub repository and webhook objects are stored as JSON text.

use crate::config::DatabaseDriver;
use crate::db::pool::{mysql, sqlite};
use crate::db::DynDatabasePool;
use crate::models::{Article, CreateArticleInput};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::Row;
use std::sync::Arc;
use uuid::Uuid;

use super::{bind_mysql, bind_sqlite, BindValue};

/// Article repository trait
#[async_trait]
pub trait ArticleRepository: Send + Sync {
    /// Create a new article
    async fn create(&self, input: &CreateArticleInput) -> Result<Article>;

    /// Get article by ID
    async fn get_by_id(&self, id: i64) -> Result<Option<Article>>;

    /// Get article by UUID
    async fn get_by_uuid(&self, uuid: &str) -> Result<Option<Article>>;

    /// Get article by term name
    async fn get_by_name(&self, name: &str) -> Result<Option<Article>>;

    /// Get article by GitHub repository id
    async fn get_by_repo_id(&self, repo_id: i64) -> Result<Option<Article>>;

    /// List articles with pagination, most recently modified first
    async fn list(&self, offset: i64, limit: i64) -> Result<Vec<Article>>;

    /// Every article, ordered by name
    async fn list_all(&self) -> Result<Vec<Article>>;

    /// Articles carrying a tag, ordered by name
    async fn list_by_tag(&self, tag_id: i64) -> Result<Vec<Article>>;

    /// Count total articles
    async fn count(&self) -> Result<i64>;

    /// Count articles owned by a user
    async fn count_by_owner(&self, owner_id: i64) -> Result<i64>;

    /// Store a freshly fetched README and bump `modified_at`
    async fn update_content(&self, id: i64, text: &str, content_html: &str) -> Result<()>;

    /// Replace the stored GitHub repository object
    async fn update_repo(&self, id: i64, repo: &serde_json::Value) -> Result<()>;

    /// Delete an article
    async fn delete(&self, id: i64) -> Result<()>;
}

/// SQLx-based article repository implementation
///
/// Supports both SQLite and MySQL databases.
pub struct SqlxArticleRepository {
    pool: DynDatabasePool,
}

impl SqlxArticleRepository {
    /// Create a new SQLx article repository
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn ArticleRepository> {
        Arc::new(Self::new(pool))
    }

    async fn fetch(&self, tail: &str, binds: &[BindValue<'_>]) -> Result<Vec<Article>> {
        let sql = format!("{} {}", SELECT_ARTICLE, tail);
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let rows = bind_sqlite(sqlx::query(&sql), binds)
                    .fetch_all(sqlite(&self.pool)?)
                    .await
                    .context("Failed to query articles")?;
                rows.iter().map(row_to_article_sqlite).collect()
            }
            DatabaseDriver::Mysql => {
                let rows = bind_mysql(sqlx::query(&sql), binds)
                    .fetch_all(mysql(&self.pool)?)
                    .await
                    .context("Failed to query articles")?;
                rows.iter().map(row_to_article_mysql).collect()
            }
        }
    }

    async fn fetch_one(&self, tail: &str, binds: &[BindValue<'_>]) -> Result<Option<Article>> {
        Ok(self.fetch(tail, binds).await?.into_iter().next())
    }

    async fn count_where(&self, tail: &str, binds: &[BindValue<'_>]) -> Result<i64> {
        let sql = format!("SELECT COUNT(*) as count FROM articles {}", tail);
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let row = bind_sqlite(sqlx::query(&sql), binds)
                    .fetch_one(sqlite(&self.pool)?)
                    .await
                    .context("Failed to count articles")?;
                Ok(row.get("count"))
            }
            DatabaseDriver::Mysql => {
                let row = bind_mysql(sqlx::query(&sql), binds)
                    .fetch_one(mysql(&self.pool)?)
                    .await
                    .context("Failed to count articles")?;
                Ok(row.get("count"))
            }
        }
    }

    async fn execute(&self, sql: &str, binds: &[BindValue<'_>], what: &'static str) -> Result<u64> {
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => bind_sqlite(sqlx::query(sql), binds)
                .execute(sqlite(&self.pool)?)
                .await
                .context(what)?
                .rows_affected(),
            DatabaseDriver::Mysql => bind_mysql(sqlx::query(sql), binds)
                .execute(mysql(&self.pool)?)
                .await
                .context(what)?
                .rows_affected(),
        };
        Ok(affected)
    }
}

const SELECT_ARTICLE: &str = r#"
    SELECT id, uuid, name, summary, text, content_html, repo, repo_id, owner_id,
           template_id, webhook, secret, created_at, modified_at
    FROM articles
"#;

#[async_trait]
impl ArticleRepository for SqlxArticleRepository {
    async fn create(&self, input: &CreateArticleInput) -> Result<Article> {
        let repo_id = input
            .repo_id()
            .context("GitHub repository object has no id")?;
        let uuid = Uuid::new_v4().to_string();
        let now = Utc::now();
        let repo_json = serde_json::to_string(&input.repo)?;
        let webhook_json = serde_json::to_string(&input.webhook)?;

        let sql = r#"
            INSERT INTO articles (uuid, name, summary, text, content_html, repo, repo_id,
                                  owner_id, template_id, webhook, secret, created_at, modified_at)
            VALUES (?, ?, ?, '', '', ?, ?, ?, ?, ?, ?, ?, ?)
        "#;

        let id = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(&uuid)
                .bind(&input.name)
                .bind(&input.summary)
                .bind(&repo_json)
                .bind(repo_id)
                .bind(input.owner_id)
                .bind(input.template_id)
                .bind(&webhook_json)
                .bind(&input.secret)
                .bind(now)
                .bind(now)
                .execute(sqlite(&self.pool)?)
                .await
                .context("Failed to create article")?
                .last_insert_rowid(),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(&uuid)
                .bind(&input.name)
                .bind(&input.summary)
                .bind(&repo_json)
                .bind(repo_id)
                .bind(input.owner_id)
                .bind(input.template_id)
                .bind(&webhook_json)
                .bind(&input.secret)
                .bind(now)
                .bind(now)
                .execute(mysql(&self.pool)?)
                .await
                .context("Failed to create article")?
                .last_insert_id() as i64,
        };

        Ok(Article {
            id,
            uuid,
            name: input.name.clone(),
            summary: input.summary.clone(),
            text: String::new(),
            content_html: String::new(),
            repo: input.repo.clone(),
            repo_id,
            owner_id: input.owner_id,
            template_id: input.template_id,
            webhook: input.webhook.clone(),
            secret: input.secret.clone(),
            created_at: now,
            modified_at: now,
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Article>> {
        self.fetch_one("WHERE id = ?", &[BindValue::Int(id)]).await
    }

    async fn get_by_uuid(&self, uuid: &str) -> Result<Option<Article>> {
        self.fetch_one("WHERE uuid = ?", &[BindValue::Str(uuid)]).await
    }

    async fn get_by_name(&self, name: &str) -> Result<Option<Article>> {
        self.fetch_one("WHERE name = ?", &[BindValue::Str(name)]).await
    }

    async fn get_by_repo_id(&self, repo_id: i64) -> Result<Option<Article>> {
        self.fetch_one("WHERE repo_id = ?", &[BindValue::Int(repo_id)])
            .await
    }

    async fn list(&self, offset: i64, limit: i64) -> Result<Vec<Article>> {
        self.fetch(
            "ORDER BY modified_at DESC, id DESC LIMIT ? OFFSET ?",
            &[BindValue::Int(limit), BindValue::Int(offset)],
        )
        .await
    }

    async fn list_all(&self) -> Result<Vec<Article>> {
        self.fetch("ORDER BY name ASC", &[]).await
    }

    async fn list_by_tag(&self, tag_id: i64) -> Result<Vec<Article>> {
        self.fetch(
            "WHERE id IN (SELECT article_id FROM article_tags WHERE tag_id = ?) ORDER BY name ASC",
            &[BindValue::Int(tag_id)],
        )
        .await
    }

    async fn count(&self) -> Result<i64> {
        self.count_where("", &[]).await
    }

    async fn count_by_owner(&self, owner_id: i64) -> Result<i64> {
        self.count_where("WHERE owner_id = ?", &[BindValue::Int(owner_id)])
            .await
    }

    async fn update_content(&self, id: i64, text: &str, content_html: &str) -> Result<()> {
        let now = Utc::now();
        let sql = "UPDATE articles SET text = ?, content_html = ?, modified_at = ? WHERE id = ?";
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query(sql)
                    .bind(text)
                    .bind(content_html)
                    .bind(now)
                    .bind(id)
                    .execute(sqlite(&self.pool)?)
                    .await
                    .context("Failed to update article content")?;
            }
            DatabaseDriver::Mysql => {
                sqlx::query(sql)
                    .bind(text)
                    .bind(content_html)
                    .bind(now)
                    .bind(id)
                    .execute(mysql(&self.pool)?)
                    .await
                    .context("Failed to update article content")?;
            }
        }
        Ok(())
    }

    async fn update_repo(&self, id: i64, repo: &serde_json::Value) -> Result<()> {
        let repo_json = serde_json::to_string(repo)?;
        self.execute(
            "UPDATE articles SET repo = ? WHERE id = ?",
            &[BindValue::Str(&repo_json), BindValue::Int(id)],
            "Failed to update article repository",
        )
        .await?;
        Ok(())
    }

    async fn delete(&self, id: i64) -> Result<()> {
        self.execute(
            "DELETE FROM articles WHERE id = ?",
            &[BindValue::Int(id)],
            "Failed to delete article",
        )
        .await?;
        Ok(())
    }
}

// ============================================================================
// Row mapping
// ============================================================================

fn parse_json(raw: &str, what: &str) -> Result<serde_json::Value> {
    if raw.is_empty() {
        return Ok(serde_json::Value::Object(Default::default()));
    }
    serde_json::from_str(raw).with_context(|| format!("Invalid article {} JSON", what))
}

fn row_to_article_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<Article> {
    let repo: String = row.get("repo");
    let webhook: String = row.get("webhook");

    Ok(Article {
        id: row.get("id"),
        uuid: row.get("uuid"),
        name: row.get("name"),
        summary: row.get("summary"),
        text: row.get("text"),
        content_html: row.get("content_html"),
        repo: parse_json(&repo, "repo")?,
        repo_id: row.get("repo_id"),
        owner_id: row.get("owner_id"),
        template_id: row.get("template_id"),
        webhook: parse_json(&webhook, "webhook")?,
        secret: row.get("secret"),
        created_at: row.get("created_at"),
        modified_at: row.get("modified_at"),
    })
}

fn row_to_article_mysql(row: &sqlx::mysql::MySqlRow) -> Result<Article> {
    let repo: String = row.get("repo");
    let webhook: String = row.get("webhook");

    Ok(Article {
        id: row.get("id"),
        uuid: row.get("uuid"),
        name: row.get("name"),
        summary: row.get("summary"),
        text: row.get("text"),
        content_html: row.get("content_html"),
        repo: parse_json(&repo, "repo")?,
        repo_id: row.get("repo_id"),
        owner_id: row.get("owner_id"),
        template_id: row.get("template_id"),
        webhook: parse_json(&webhook, "webhook")?,
        secret: row.get("secret"),
        created_at: row.get("created_at"),
        modified_at: row.get("modified_at"),
    })
}
