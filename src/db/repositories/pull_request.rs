//! Pull request repository
//!
//! Database operations for the local mirror of article pull requests.

use crate::config::DatabaseDriver;
use crate::db::pool::{mysql, sqlite};
use crate::db::DynDatabasePool;
use crate::models::{PullRequest, PullRequestStatus};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::Row;
use std::str::FromStr;
use std::sync::Arc;

use super::{bind_mysql, bind_sqlite, BindValue};

/// Pull request repository trait
#[async_trait]
pub trait PullRequestRepository: Send + Sync {
    /// Record a pull request
    async fn create(
        &self,
        article_id: i64,
        owner_id: i64,
        number: Option<i64>,
        url: Option<&str>,
        status: PullRequestStatus,
    ) -> Result<PullRequest>;

    /// The article's pull request with this GitHub number
    async fn get_by_article_number(&self, article_id: i64, number: i64)
        -> Result<Option<PullRequest>>;

    /// Oldest pending pull request of a user on an article that GitHub has
    /// not numbered yet
    async fn find_unnumbered_pending(
        &self,
        article_id: i64,
        owner_id: i64,
    ) -> Result<Option<PullRequest>>;

    /// The user's pending or open pull request on an article
    async fn find_active(&self, article_id: i64, owner_id: i64) -> Result<Option<PullRequest>>;

    /// Persist number, url and status
    async fn update(&self, pull_request: &PullRequest) -> Result<()>;

    /// Every pull request of an article, newest first
    async fn list_for_article(&self, article_id: i64) -> Result<Vec<PullRequest>>;
}

pub struct SqlxPullRequestRepository {
    pool: DynDatabasePool,
}

impl SqlxPullRequestRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn PullRequestRepository> {
        Arc::new(Self::new(pool))
    }

    async fn fetch(&self, tail: &str, binds: &[BindValue<'_>]) -> Result<Vec<PullRequest>> {
        let sql = format!(
            "SELECT id, article_id, owner_id, number, url, status, created_at, updated_at \
             FROM pull_requests {}",
            tail
        );
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let rows = bind_sqlite(sqlx::query(&sql), binds)
                    .fetch_all(sqlite(&self.pool)?)
                    .await
                    .context("Failed to query pull requests")?;
                rows.iter().map(row_to_pull_request_sqlite).collect()
            }
            DatabaseDriver::Mysql => {
                let rows = bind_mysql(sqlx::query(&sql), binds)
                    .fetch_all(mysql(&self.pool)?)
                    .await
                    .context("Failed to query pull requests")?;
                rows.iter().map(row_to_pull_request_mysql).collect()
            }
        }
    }
}

#[async_trait]
impl PullRequestRepository for SqlxPullRequestRepository {
    async fn create(
        &self,
        article_id: i64,
        owner_id: i64,
        number: Option<i64>,
        url: Option<&str>,
        status: PullRequestStatus,
    ) -> Result<PullRequest> {
        let now = Utc::now();
        let sql = r#"
            INSERT INTO pull_requests (article_id, owner_id, number, url, status, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
        "#;

        let id = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(article_id)
                .bind(owner_id)
                .bind(number)
                .bind(url)
                .bind(status.as_str())
                .bind(now)
                .bind(now)
                .execute(sqlite(&self.pool)?)
                .await
                .context("Failed to create pull request")?
                .last_insert_rowid(),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(article_id)
                .bind(owner_id)
                .bind(number)
                .bind(url)
                .bind(status.as_str())
                .bind(now)
                .bind(now)
                .execute(mysql(&self.pool)?)
                .await
                .context("Failed to create pull request")?
                .last_insert_id() as i64,
        };

        Ok(PullRequest {
            id,
            article_id,
            owner_id,
            number,
            url: url.map(str::to_string),
            status,
            created_at: now,
            updated_at: now,
        })
    }

    async fn get_by_article_number(
        &self,
        article_id: i64,
        number: i64,
    ) -> Result<Option<PullRequest>> {
        Ok(self
            .fetch(
                "WHERE article_id = ? AND number = ? ORDER BY id ASC",
                &[BindValue::Int(article_id), BindValue::Int(number)],
            )
            .await?
            .into_iter()
            .next())
    }

    async fn find_unnumbered_pending(
        &self,
        article_id: i64,
        owner_id: i64,
    ) -> Result<Option<PullRequest>> {
        Ok(self
            .fetch(
                "WHERE article_id = ? AND owner_id = ? AND number IS NULL AND status = 'pending' \
                 ORDER BY id ASC",
                &[BindValue::Int(article_id), BindValue::Int(owner_id)],
            )
            .await?
            .into_iter()
            .next())
    }

    async fn find_active(&self, article_id: i64, owner_id: i64) -> Result<Option<PullRequest>> {
        Ok(self
            .fetch(
                "WHERE article_id = ? AND owner_id = ? AND status IN ('pending', 'open') \
                 ORDER BY id DESC",
                &[BindValue::Int(article_id), BindValue::Int(owner_id)],
            )
            .await?
            .into_iter()
            .next())
    }

    async fn update(&self, pull_request: &PullRequest) -> Result<()> {
        let now = Utc::now();
        let sql = r#"
            UPDATE pull_requests SET number = ?, url = ?, status = ?, updated_at = ?
            WHERE id = ?
        "#;
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query(sql)
                    .bind(pull_request.number)
                    .bind(&pull_request.url)
                    .bind(pull_request.status.as_str())
                    .bind(now)
                    .bind(pull_request.id)
                    .execute(sqlite(&self.pool)?)
                    .await
                    .context("Failed to update pull request")?;
            }
            DatabaseDriver::Mysql => {
                sqlx::query(sql)
                    .bind(pull_request.number)
                    .bind(&pull_request.url)
                    .bind(pull_request.status.as_str())
                    .bind(now)
                    .bind(pull_request.id)
                    .execute(mysql(&self.pool)?)
                    .await
                    .context("Failed to update pull request")?;
            }
        }
        Ok(())
    }

    async fn list_for_article(&self, article_id: i64) -> Result<Vec<PullRequest>> {
        self.fetch(
            "WHERE article_id = ? ORDER BY id DESC",
            &[BindValue::Int(article_id)],
        )
        .await
    }
}

fn row_to_pull_request_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<PullRequest> {
    let status: String = row.get("status");

    Ok(PullRequest {
        id: row.get("id"),
        article_id: row.get("article_id"),
        owner_id: row.get("owner_id"),
        number: row.get("number"),
        url: row.get("url"),
        status: PullRequestStatus::from_str(&status)?,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn row_to_pull_request_mysql(row: &sqlx::mysql::MySqlRow) -> Result<PullRequest> {
    let status: String = row.get("status");

    Ok(PullRequest {
        id: row.get("id"),
        article_id: row.get("article_id"),
        owner_id: row.get("owner_id"),
        number: row.get("number"),
        url: row.get("url"),
        status: PullRequestStatus::from_str(&status)?,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{ArticleRepository, SqlxArticleRepository};
    use crate::db::repositories::{SqlxUserRepository, UserRepository};
    use crate::db::{create_test_pool, migrations};
    use crate::models::{CreateArticleInput, User};
    use serde_json::json;

    async fn setup() -> (SqlxPullRequestRepository, i64, i64) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let owner = SqlxUserRepository::new(pool.clone())
            .create(&User::new("o".into(), "o@example.com".into(), "h".into()))
            .await
            .unwrap();
        let article = SqlxArticleRepository::new(pool.clone())
            .create(&CreateArticleInput {
                name: "mpi".to_string(),
                summary: String::new(),
                repo: json!({"id": 1}),
                owner_id: owner.id,
                template_id: None,
                webhook: json!({}),
                secret: "s".to_string(),
            })
            .await
            .unwrap();
        (SqlxPullRequestRepository::new(pool), article.id, owner.id)
    }

    #[tokio::test]
    async fn test_pending_then_numbered() {
        let (repo, article_id, owner_id) = setup().await;

        let pending = repo
            .create(article_id, owner_id, None, None, PullRequestStatus::Pending)
            .await
            .unwrap();
        assert!(repo.get_by_article_number(article_id, 3).await.unwrap().is_none());

        let mut adopted = repo
            .find_unnumbered_pending(article_id, owner_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(adopted.id, pending.id);

        adopted.number = Some(3);
        adopted.url = Some("https://github.com/o/askci-term-mpi/pull/3".to_string());
        adopted.status = PullRequestStatus::Open;
        repo.update(&adopted).await.unwrap();

        let found = repo.get_by_article_number(article_id, 3).await.unwrap().unwrap();
        assert_eq!(found.status, PullRequestStatus::Open);
        assert!(repo
            .find_unnumbered_pending(article_id, owner_id)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_find_active_ignores_finished() {
        let (repo, article_id, owner_id) = setup().await;

        repo.create(article_id, owner_id, Some(1), None, PullRequestStatus::Closed)
            .await
            .unwrap();
        repo.create(article_id, owner_id, Some(2), None, PullRequestStatus::Reject)
            .await
            .unwrap();
        assert!(repo.find_active(article_id, owner_id).await.unwrap().is_none());

        let open = repo
            .create(article_id, owner_id, Some(4), Some("u"), PullRequestStatus::Open)
            .await
            .unwrap();
        assert_eq!(
            repo.find_active(article_id, owner_id).await.unwrap().unwrap().id,
            open.id
        );
        assert_eq!(repo.list_for_article(article_id).await.unwrap().len(), 3);
    }
}
