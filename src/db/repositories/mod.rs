//! Database repositories
//!
//! Repository pattern implementations for database access.
//! Each repository handles CRUD operations for a specific entity.

pub mod article;
pub mod content;
pub mod pull_request;
pub mod session;
pub mod tag;
pub mod template;
pub mod user;

pub use article::{ArticleRepository, SqlxArticleRepository};
pub use content::{ContentRepository, SqlxContentRepository};
pub use pull_request::{PullRequestRepository, SqlxPullRequestRepository};
pub use session::{SessionRepository, SqlxSessionRepository};
pub use tag::{SqlxTagRepository, TagRepository};
pub use template::{SqlxTemplateRepository, TemplateRepositoryStore};
pub use user::{SqlxUserRepository, UserRepository};

use super::DynDatabasePool;
use sqlx::mysql::{MySql, MySqlArguments};
use sqlx::query::Query;
use sqlx::sqlite::{Sqlite, SqliteArguments};
use std::sync::Arc;

/// Every repository over one pool, shared by the services
#[derive(Clone)]
pub struct Repositories {
    pub users: Arc<dyn UserRepository>,
    pub sessions: Arc<dyn SessionRepository>,
    pub templates: Arc<dyn TemplateRepositoryStore>,
    pub articles: Arc<dyn ArticleRepository>,
    pub tags: Arc<dyn TagRepository>,
    pub contents: Arc<dyn ContentRepository>,
    pub pull_requests: Arc<dyn PullRequestRepository>,
}

impl Repositories {
    pub fn sqlx(pool: &DynDatabasePool) -> Self {
        Self {
            users: SqlxUserRepository::boxed(pool.clone()),
            sessions: SqlxSessionRepository::boxed(pool.clone()),
            templates: SqlxTemplateRepository::boxed(pool.clone()),
            articles: SqlxArticleRepository::boxed(pool.clone()),
            tags: SqlxTagRepository::boxed(pool.clone()),
            contents: SqlxContentRepository::boxed(pool.clone()),
            pull_requests: SqlxPullRequestRepository::boxed(pool.clone()),
        }
    }
}

/// A positional parameter for queries assembled at runtime
#[derive(Debug, Clone, Copy)]
pub(crate) enum BindValue<'a> {
    Int(i64),
    Str(&'a str),
}

pub(crate) fn bind_sqlite<'q>(
    mut query: Query<'q, Sqlite, SqliteArguments<'q>>,
    values: &[BindValue<'q>],
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    for value in values {
        query = match *value {
            BindValue::Int(v) => query.bind(v),
            BindValue::Str(v) => query.bind(v),
        };
    }
    query
}

pub(crate) fn bind_mysql<'q>(
    mut query: Query<'q, MySql, MySqlArguments>,
    values: &[BindValue<'q>],
) -> Query<'q, MySql, MySqlArguments> {
    for value in values {
        query = match *value {
            BindValue::Int(v) => query.bind(v),
            BindValue::Str(v) => query.bind(v),
        };
    }
    query
}
