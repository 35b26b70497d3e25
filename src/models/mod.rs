//! Data models
//!
//! Database entities (User, Session, TemplateRepository, Article, Tag,
//! Question, Example, PullRequest) and the input/pagination types used
//! around them.

mod article;
mod content;
mod pull_request;
mod session;
mod tag;
mod template;
mod user;

pub use article::{Article, CreateArticleInput, ListParams, PagedResult, ARTICLE_REPO_PREFIX};
pub use content::{Example, Question};
pub use pull_request::{PullRequest, PullRequestStatus};
pub use session::Session;
pub use tag::Tag;
pub use template::TemplateRepository;
pub use user::User;
