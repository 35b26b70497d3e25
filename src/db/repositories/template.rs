//! Template repository
//!
//! Database operations for the GitHub template repositories articles are
//! generated from. The GitHub repository object is stored as JSON text.

use crate::config::DatabaseDriver;
use crate::db::pool::{mysql, sqlite};
use crate::db::DynDatabasePool;
use crate::models::TemplateRepository;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::Row;
use std::sync::Arc;
use uuid::Uuid;

use super::{bind_mysql, bind_sqlite, BindValue};

/// Template repository trait
#[async_trait]
pub trait TemplateRepositoryStore: Send + Sync {
    /// Record a template repository from its GitHub repository object
    async fn create(&self, name: &str, repo: &serde_json::Value) -> Result<TemplateRepository>;

    async fn get_by_id(&self, id: i64) -> Result<Option<TemplateRepository>>;

    async fn get_by_uuid(&self, uuid: &str) -> Result<Option<TemplateRepository>>;

    /// All templates, oldest first
    async fn list(&self) -> Result<Vec<TemplateRepository>>;

    /// The most recently added template, used for new articles
    async fn latest(&self) -> Result<Option<TemplateRepository>>;
}

pub struct SqlxTemplateRepository {
    pool: DynDatabasePool,
}

impl SqlxTemplateRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn TemplateRepositoryStore> {
        Arc::new(Self::new(pool))
    }

    async fn fetch_where(
        &self,
        clause: &str,
        binds: &[BindValue<'_>],
    ) -> Result<Vec<TemplateRepository>> {
        let sql = format!(
            "SELECT id, uuid, name, repo, created_at FROM template_repositories {}",
            clause
        );
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let rows = bind_sqlite(sqlx::query(&sql), binds)
                    .fetch_all(sqlite(&self.pool)?)
                    .await
                    .context("Failed to query template repositories")?;
                rows.iter()
                    .map(|row| {
                        to_template(
                            row.get("id"),
                            row.get("uuid"),
                            row.get("name"),
                            row.get("repo"),
                            row.get("created_at"),
                        )
                    })
                    .collect()
            }
            DatabaseDriver::Mysql => {
                let rows = bind_mysql(sqlx::query(&sql), binds)
                    .fetch_all(mysql(&self.pool)?)
                    .await
                    .context("Failed to query template repositories")?;
                rows.iter()
                    .map(|row| {
                        to_template(
                            row.get("id"),
                            row.get("uuid"),
                            row.get("name"),
                            row.get("repo"),
                            row.get("created_at"),
                        )
                    })
                    .collect()
            }
        }
    }
}

fn to_template(
    id: i64,
    uuid: String,
    name: String,
    repo: String,
    created_at: chrono::DateTime<Utc>,
) -> Result<TemplateRepository> {
    Ok(TemplateRepository {
        id,
        uuid,
        name,
        repo: serde_json::from_str(&repo).context("Invalid template repository JSON")?,
        created_at,
    })
}

#[async_trait]
impl TemplateRepositoryStore for SqlxTemplateRepository {
    async fn create(&self, name: &str, repo: &serde_json::Value) -> Result<TemplateRepository> {
        let uuid = Uuid::new_v4().to_string();
        let now = Utc::now();
        let repo_json = serde_json::to_string(repo)?;
        let sql = r#"
            INSERT INTO template_repositories (uuid, name, repo, created_at)
            VALUES (?, ?, ?, ?)
        "#;

        let id = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(&uuid)
                .bind(name)
                .bind(&repo_json)
                .bind(now)
                .execute(sqlite(&self.pool)?)
                .await
                .context("Failed to create template repository")?
                .last_insert_rowid(),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(&uuid)
                .bind(name)
                .bind(&repo_json)
                .bind(now)
                .execute(mysql(&self.pool)?)
                .await
                .context("Failed to create template repository")?
                .last_insert_id() as i64,
        };

        Ok(TemplateRepository {
            id,
            uuid,
            name: name.to_string(),
            repo: repo.clone(),
            created_at: now,
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<TemplateRepository>> {
        Ok(self
            .fetch_where("WHERE id = ?", &[BindValue::Int(id)])
            .await?
            .into_iter()
            .next())
    }

    async fn get_by_uuid(&self, uuid: &str) -> Result<Option<TemplateRepository>> {
        Ok(self
            .fetch_where("WHERE uuid = ?", &[BindValue::Str(uuid)])
            .await?
            .into_iter()
            .next())
    }

    async fn list(&self) -> Result<Vec<TemplateRepository>> {
        self.fetch_where("ORDER BY id ASC", &[]).await
    }

    async fn latest(&self) -> Result<Option<TemplateRepository>> {
        Ok(self
            .fetch_where("ORDER BY id DESC LIMIT 1", &[])
            .await?
            .into_iter()
            .next())
    }
}
