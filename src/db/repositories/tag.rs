//! Tag repository
//!
//! Database operations for tags and the `article_tags` association.
//!
//! This module provides:
//! - `TagRepository` trait defining the interface for tag data access
//! - `SqlxTagRepository` implementing the trait for SQLite and MySQL

use crate::config::DatabaseDriver;
use crate::db::pool::{mysql, sqlite};
use crate::db::DynDatabasePool;
use crate::models::Tag;
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

/// Tag repository trait
#[async_trait]
pub trait TagRepository: Send + Sync {
    /// Get tag by name
    async fn get_by_name(&self, name: &str) -> Result<Option<Tag>>;

    /// Get the tag with this name, creating it when missing
    async fn get_or_create(&self, name: &str) -> Result<Tag>;

    /// List all tags, ordered by name
    async fn list(&self) -> Result<Vec<Tag>>;

    /// Replace the tags of an article
    async fn set_for_article(&self, article_id: i64, tag_ids: &[i64]) -> Result<()>;

    /// Get tags for an article
    async fn get_by_article_id(&self, article_id: i64) -> Result<Vec<Tag>>;
}

/// SQLx-based tag repository implementation
///
/// Supports both SQLite and MySQL databases.
pub struct SqlxTagRepository {
    pool: DynDatabasePool,
}

impl SqlxTagRepository {
    /// Create a new SQLx tag repository
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn TagRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl TagRepository for SqlxTagRepository {
    async fn get_by_name(&self, name: &str) -> Result<Option<Tag>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => get_tag_by_name_sqlite(sqlite(&self.pool)?, name).await,
            DatabaseDriver::Mysql => get_tag_by_name_mysql(mysql(&self.pool)?, name).await,
        }
    }

    async fn get_or_create(&self, name: &str) -> Result<Tag> {
        if let Some(tag) = self.get_by_name(name).await? {
            return Ok(tag);
        }
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let pool = sqlite(&self.pool)?;
                sqlx::query("INSERT OR IGNORE INTO tags (name) VALUES (?)")
                    .bind(name)
                    .execute(pool)
                    .await
                    .context("Failed to create tag")?;
                get_tag_by_name_sqlite(pool, name)
                    .await?
                    .context("Tag missing after insert")
            }
            DatabaseDriver::Mysql => {
                let pool = mysql(&self.pool)?;
                sqlx::query("INSERT IGNORE INTO tags (name) VALUES (?)")
                    .bind(name)
                    .execute(pool)
                    .await
                    .context("Failed to create tag")?;
                get_tag_by_name_mysql(pool, name)
                    .await?
                    .context("Tag missing after insert")
            }
        }
    }

    async fn list(&self) -> Result<Vec<Tag>> {
        let sql = "SELECT id, name FROM tags ORDER BY name ASC";
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let rows = sqlx::query(sql)
                    .fetch_all(sqlite(&self.pool)?)
                    .await
                    .context("Failed to list tags")?;
                Ok(rows
                    .iter()
                    .map(|row| Tag {
                        id: row.get("id"),
                        name: row.get("name"),
                    })
                    .collect())
            }
            DatabaseDriver::Mysql => {
                let rows = sqlx::query(sql)
                    .fetch_all(mysql(&self.pool)?)
                    .await
                    .context("Failed to list tags")?;
                Ok(rows
                    .iter()
                    .map(|row| Tag {
                        id: row.get("id"),
                        name: row.get("name"),
                    })
                    .collect())
            }
        }
    }

    async fn set_for_article(&self, article_id: i64, tag_ids: &[i64]) -> Result<()> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                set_article_tags_sqlite(sqlite(&self.pool)?, article_id, tag_ids).await
            }
            DatabaseDriver::Mysql => {
                set_article_tags_mysql(mysql(&self.pool)?, article_id, tag_ids).await
            }
        }
    }

    async fn get_by_article_id(&self, article_id: i64) -> Result<Vec<Tag>> {
        let sql = r#"
            SELECT t.id, t.name
            FROM tags t
            INNER JOIN article_tags at ON t.id = at.tag_id
            WHERE at.article_id = ?
            ORDER BY t.name ASC
        "#;
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let rows = sqlx::query(sql)
                    .bind(article_id)
                    .fetch_all(sqlite(&self.pool)?)
                    .await
                    .context("Failed to get tags by article ID")?;
                Ok(rows
                    .iter()
                    .map(|row| Tag {
                        id: row.get("id"),
                        name: row.get("name"),
                    })
                    .collect())
            }
            DatabaseDriver::Mysql => {
                let rows = sqlx::query(sql)
                    .bind(article_id)
                    .fetch_all(mysql(&self.pool)?)
                    .await
                    .context("Failed to get tags by article ID")?;
                Ok(rows
                    .iter()
                    .map(|row| Tag {
                        id: row.get("id"),
                        name: row.get("name"),
                    })
                    .collect())
            }
        }
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn get_tag_by_name_sqlite(pool: &SqlitePool, name: &str) -> Result<Option<Tag>> {
    let row = sqlx::query("SELECT id, name FROM tags WHERE name = ?")
        .bind(name)
        .fetch_optional(pool)
        .await
        .context("Failed to get tag by name")?;

    Ok(row.map(|row| Tag {
        id: row.get("id"),
        name: row.get("name"),
    }))
}

async fn set_article_tags_sqlite(
    pool: &SqlitePool,
    article_id: i64,
    tag_ids: &[i64],
) -> Result<()> {
    sqlx::query("DELETE FROM article_tags WHERE article_id = ?")
        .bind(article_id)
        .execute(pool)
        .await
        .context("Failed to clear article tags")?;

    for tag_id in tag_ids {
        sqlx::query("INSERT OR IGNORE INTO article_tags (article_id, tag_id) VALUES (?, ?)")
            .bind(article_id)
            .bind(tag_id)
            .execute(pool)
            .await
            .context("Failed to add tag to article")?;
    }

    Ok(())
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn get_tag_by_name_mysql(pool: &MySqlPool, name: &str) -> Result<Option<Tag>> {
    let row = sqlx::query("SELECT id, name FROM tags WHERE name = ?")
        .bind(name)
        .fetch_optional(pool)
        .await
        .context("Failed to get tag by name")?;

    Ok(row.map(|row| Tag {
        id: row.get("id"),
        name: row.get("name"),
    }))
}

async fn set_article_tags_mysql(pool: &MySqlPool, article_id: i64, tag_ids: &[i64]) -> Result<()> {
    sqlx::query("DELETE FROM article_tags WHERE article_id = ?")
        .bind(article_id)
        .execute(pool)
        .await
        .context("Failed to clear article tags")?;

    for tag_id in tag_ids {
        sqlx::query("INSERT IGNORE INTO article_tags (article_id, tag_id) VALUES (?, ?)")
            .bind(article_id)
            .bind(tag_id)
            .execute(pool)
            .await
            .context("Failed to add tag to article")?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{ArticleRepository, SqlxArticleRepository};
    use crate::db::repositories::{SqlxUserRepository, UserRepository};
    use crate::db::{create_test_pool, migrations};
    use crate::models::{CreateArticleInput, User};
    use serde_json::json;

    async fn setup() -> (DynDatabasePool, SqlxTagRepository) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let repo = SqlxTagRepository::new(pool.clone());
        (pool, repo)
    }

    async fn create_article(pool: &DynDatabasePool) -> i64 {
        let owner = SqlxUserRepository::new(pool.clone())
            .create(&User::new("o".into(), "o@example.com".into(), "h".into()))
            .await
            .unwrap();
        SqlxArticleRepository::new(pool.clone())
            .create(&CreateArticleInput {
                name: "mpi".to_string(),
                summary: String::new(),
                repo: json!({"id": 1, "full_name": "o/askci-term-mpi"}),
                owner_id: owner.id,
                template_id: None,
                webhook: json!({}),
                secret: "s".to_string(),
            })
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn test_get_or_create_reuses_existing() {
        let (_pool, repo) = setup().await;

        let first = repo.get_or_create("hpc").await.unwrap();
        let second = repo.get_or_create("hpc").await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(repo.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_set_for_article_replaces_tags() {
        let (pool, repo) = setup().await;
        let article_id = create_article(&pool).await;

        let hpc = repo.get_or_create("hpc").await.unwrap();
        let mpi = repo.get_or_create("mpi").await.unwrap();
        let slurm = repo.get_or_create("slurm").await.unwrap();

        repo.set_for_article(article_id, &[hpc.id, mpi.id]).await.unwrap();
        let names: Vec<String> = repo
            .get_by_article_id(article_id)
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.name)
            .collect();
        assert_eq!(names, vec!["hpc", "mpi"]);

        repo.set_for_article(article_id, &[slurm.id]).await.unwrap();
        let tags = repo.get_by_article_id(article_id).await.unwrap();
        assert_eq!(tags, vec![slurm]);
    }
}
