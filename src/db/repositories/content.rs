//! Content repository
//!
//! Questions and examples extracted from article READMEs, with their
//! `article_questions` / `article_examples` associations.

use crate::config::DatabaseDriver;
use crate::db::pool::{mysql, sqlite};
use crate::db::DynDatabasePool;
use crate::models::{Example, Question};
use anyhow::{Context, Result};
use async_trait::async_trait;
use data_encoding::HEXLOWER;
use sha2::{Digest, Sha256};
use sqlx::Row;
use std::sync::Arc;

use super::{bind_mysql, bind_sqlite, BindValue};

#[async_trait]
pub trait ContentRepository: Send + Sync {
    /// Get the question with this text, creating it when missing
    async fn get_or_create_question(&self, text: &str) -> Result<Question>;

    /// Get the example with this text and code, creating it when missing
    async fn get_or_create_example(&self, text: &str, code: &str) -> Result<Example>;

    async fn add_question(&self, article_id: i64, question_id: i64) -> Result<()>;

    async fn add_example(&self, article_id: i64, example_id: i64) -> Result<()>;

    /// Drop every question/example association of an article, then delete the
    /// questions and examples no article references any more
    async fn clear_article(&self, article_id: i64) -> Result<()>;

    async fn questions_for_article(&self, article_id: i64) -> Result<Vec<Question>>;

    async fn examples_for_article(&self, article_id: i64) -> Result<Vec<Example>>;
}

pub struct SqlxContentRepository {
    pool: DynDatabasePool,
}

impl SqlxContentRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn ContentRepository> {
        Arc::new(Self::new(pool))
    }

    async fn execute(&self, sql: &str, binds: &[BindValue<'_>], what: &'static str) -> Result<()> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                bind_sqlite(sqlx::query(sql), binds)
                    .execute(sqlite(&self.pool)?)
                    .await
                    .context(what)?;
            }
            DatabaseDriver::Mysql => {
                bind_mysql(sqlx::query(sql), binds)
                    .execute(mysql(&self.pool)?)
                    .await
                    .context(what)?;
            }
        }
        Ok(())
    }

    async fn fetch_questions(&self, sql: &str, binds: &[BindValue<'_>]) -> Result<Vec<Question>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let rows = bind_sqlite(sqlx::query(sql), binds)
                    .fetch_all(sqlite(&self.pool)?)
                    .await
                    .context("Failed to query questions")?;
                Ok(rows
                    .iter()
                    .map(|row| Question {
                        id: row.get("id"),
                        text: row.get("text"),
                    })
                    .collect())
            }
            DatabaseDriver::Mysql => {
                let rows = bind_mysql(sqlx::query(sql), binds)
                    .fetch_all(mysql(&self.pool)?)
                    .await
                    .context("Failed to query questions")?;
                Ok(rows
                    .iter()
                    .map(|row| Question {
                        id: row.get("id"),
                        text: row.get("text"),
                    })
                    .collect())
            }
        }
    }

    async fn fetch_examples(&self, sql: &str, binds: &[BindValue<'_>]) -> Result<Vec<Example>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let rows = bind_sqlite(sqlx::query(sql), binds)
                    .fetch_all(sqlite(&self.pool)?)
                    .await
                    .context("Failed to query examples")?;
                Ok(rows
                    .iter()
                    .map(|row| Example {
                        id: row.get("id"),
                        text: row.get("text"),
                        code: row.get("code"),
                    })
                    .collect())
            }
            DatabaseDriver::Mysql => {
                let rows = bind_mysql(sqlx::query(sql), binds)
                    .fetch_all(mysql(&self.pool)?)
                    .await
                    .context("Failed to query examples")?;
                Ok(rows
                    .iter()
                    .map(|row| Example {
                        id: row.get("id"),
                        text: row.get("text"),
                        code: row.get("code"),
                    })
                    .collect())
            }
        }
    }

    /// `code` is TEXT, so `(text, code)` uniqueness is enforced on its digest
    fn code_hash(code: &str) -> String {
        HEXLOWER.encode(&Sha256::digest(code.as_bytes()))
    }

    fn insert_ignore(&self) -> &'static str {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => "INSERT OR IGNORE",
            DatabaseDriver::Mysql => "INSERT IGNORE",
        }
    }
}

#[async_trait]
impl ContentRepository for SqlxContentRepository {
    async fn get_or_create_question(&self, text: &str) -> Result<Question> {
        let select = "SELECT id, text FROM questions WHERE text = ?";
        if let Some(question) = self
            .fetch_questions(select, &[BindValue::Str(text)])
            .await?
            .into_iter()
            .next()
        {
            return Ok(question);
        }

        let insert = format!("{} INTO questions (text) VALUES (?)", self.insert_ignore());
        self.execute(&insert, &[BindValue::Str(text)], "Failed to create question")
            .await?;

        self.fetch_questions(select, &[BindValue::Str(text)])
            .await?
            .into_iter()
            .next()
            .context("Question missing after insert")
    }

    async fn get_or_create_example(&self, text: &str, code: &str) -> Result<Example> {
        let select = "SELECT id, text, code FROM examples WHERE text = ? AND code_hash = ?";
        let hash = Self::code_hash(code);
        let binds = [BindValue::Str(text), BindValue::Str(&hash)];
        if let Some(example) = self.fetch_examples(select, &binds).await?.into_iter().next() {
            return Ok(example);
        }

        let insert = format!(
            "{} INTO examples (text, code, code_hash) VALUES (?, ?, ?)",
            self.insert_ignore()
        );
        self.execute(
            &insert,
            &[BindValue::Str(text), BindValue::Str(code), BindValue::Str(&hash)],
            "Failed to create example",
        )
        .await?;

        self.fetch_examples(select, &binds)
            .await?
            .into_iter()
            .next()
            .context("Example missing after insert")
    }

    async fn add_question(&self, article_id: i64, question_id: i64) -> Result<()> {
        let sql = format!(
            "{} INTO article_questions (article_id, question_id) VALUES (?, ?)",
            self.insert_ignore()
        );
        self.execute(
            &sql,
            &[BindValue::Int(article_id), BindValue::Int(question_id)],
            "Failed to add question to article",
        )
        .await
    }

    async fn add_example(&self, article_id: i64, example_id: i64) -> Result<()> {
        let sql = format!(
            "{} INTO article_examples (article_id, example_id) VALUES (?, ?)",
            self.insert_ignore()
        );
        self.execute(
            &sql,
            &[BindValue::Int(article_id), BindValue::Int(example_id)],
            "Failed to add example to article",
        )
        .await
    }

    async fn clear_article(&self, article_id: i64) -> Result<()> {
        let id = [BindValue::Int(article_id)];
        self.execute(
            "DELETE FROM article_questions WHERE article_id = ?",
            &id,
            "Failed to clear article questions",
        )
        .await?;
        self.execute(
            "DELETE FROM article_examples WHERE article_id = ?",
            &id,
            "Failed to clear article examples",
        )
        .await?;
        self.execute(
            "DELETE FROM questions WHERE id NOT IN (SELECT question_id FROM article_questions)",
            &[],
            "Failed to delete orphaned questions",
        )
        .await?;
        self.execute(
            "DELETE FROM examples WHERE id NOT IN (SELECT example_id FROM article_examples)",
            &[],
            "Failed to delete orphaned examples",
        )
        .await
    }

    async fn questions_for_article(&self, article_id: i64) -> Result<Vec<Question>> {
        self.fetch_questions(
            r#"
            SELECT q.id, q.text
            FROM questions q
            INNER JOIN article_questions aq ON q.id = aq.question_id
            WHERE aq.article_id = ?
            ORDER BY q.id ASC
            "#,
            &[BindValue::Int(article_id)],
        )
        .await
    }

    async fn examples_for_article(&self, article_id: i64) -> Result<Vec<Example>> {
        self.fetch_examples(
            r#"
            SELECT e.id, e.text, e.code
            FROM examples e
            INNER JOIN article_examples ae ON e.id = ae.example_id
            WHERE ae.article_id = ?
            ORDER BY e.id ASC
            "#,
            &[BindValue::Int(article_id)],
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{ArticleRepository, SqlxArticleRepository};
    use crate::db::repositories::{SqlxUserRepository, UserRepository};
    use crate::db::{create_test_pool, migrations};
    use crate::models::{CreateArticleInput, User};
    use serde_json::json;

    async fn setup() -> (SqlxContentRepository, i64, i64) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let owner = SqlxUserRepository::new(pool.clone())
            .create(&User::new("o".into(), "o@example.com".into(), "h".into()))
            .await
            .unwrap();
        let articles = SqlxArticleRepository::new(pool.clone());
        let mut ids = Vec::new();
        for (repo_id, name) in [(1, "mpi"), (2, "slurm")] {
            let article = articles
                .create(&CreateArticleInput {
                    name: name.to_string(),
                    summary: String::new(),
                    repo: json!({"id": repo_id}),
                    owner_id: owner.id,
                    template_id: None,
                    webhook: json!({}),
                    secret: "s".to_string(),
                })
                .await
                .unwrap();
            ids.push(article.id);
        }
        (SqlxContentRepository::new(pool), ids[0], ids[1])
    }

    #[tokio::test]
    async fn test_get_or_create_is_idempotent() {
        let (repo, _, _) = setup().await;

        let q1 = repo.get_or_create_question("question-what-is-mpi").await.unwrap();
        let q2 = repo.get_or_create_question("question-what-is-mpi").await.unwrap();
        assert_eq!(q1, q2);

        let e1 = repo.get_or_create_example("example-run", "mpirun -n 4").await.unwrap();
        let e2 = repo.get_or_create_example("example-run", "mpirun -n 4").await.unwrap();
        let e3 = repo.get_or_create_example("example-run", "srun -n 4").await.unwrap();
        assert_eq!(e1, e2);
        assert_ne!(e1.id, e3.id);
    }

    #[tokio::test]
    async fn test_examples_unique_on_text_and_code() {
        let (repo, _, _) = setup().await;
        repo.get_or_create_example("example-run", "mpirun -n 4").await.unwrap();

        let hash = SqlxContentRepository::code_hash("mpirun -n 4");
        let duplicate = repo
            .execute(
                "INSERT INTO examples (text, code, code_hash) VALUES (?, ?, ?)",
                &[
                    BindValue::Str("example-run"),
                    BindValue::Str("mpirun -n 4"),
                    BindValue::Str(&hash),
                ],
                "Failed to create example",
            )
            .await;
        assert!(duplicate.is_err());

        let other = repo.get_or_create_example("example-other", "mpirun -n 4").await.unwrap();
        assert_eq!(other.code, "mpirun -n 4");
    }

    #[tokio::test]
    async fn test_clear_article_keeps_shared_content() {
        let (repo, mpi, slurm) = setup().await;

        let shared = repo.get_or_create_question("question-shared").await.unwrap();
        let only_mpi = repo.get_or_create_question("question-only-mpi").await.unwrap();
        let example = repo.get_or_create_example("example-one", "echo").await.unwrap();

        repo.add_question(mpi, shared.id).await.unwrap();
        repo.add_question(mpi, only_mpi.id).await.unwrap();
        repo.add_question(slurm, shared.id).await.unwrap();
        repo.add_example(mpi, example.id).await.unwrap();
        // duplicate links are ignored
        repo.add_question(mpi, shared.id).await.unwrap();

        assert_eq!(repo.questions_for_article(mpi).await.unwrap().len(), 2);
        assert_eq!(repo.examples_for_article(mpi).await.unwrap(), vec![example]);

        repo.clear_article(mpi).await.unwrap();
        assert!(repo.questions_for_article(mpi).await.unwrap().is_empty());
        assert!(repo.examples_for_article(mpi).await.unwrap().is_empty());
        assert_eq!(repo.questions_for_article(slurm).await.unwrap(), vec![shared.clone()]);

        // the orphaned question is gone, so it is recreated with a new id
        let recreated = repo.get_or_create_question("question-only-mpi").await.unwrap();
        assert_ne!(recreated.id, only_mpi.id);
        let kept = repo.get_or_create_question("question-shared").await.unwrap();
        assert_eq!(kept.id, shared.id);
    }
}
