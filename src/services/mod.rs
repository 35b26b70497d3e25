//! Services layer - Business logic
//!
//! Services sit between the HTTP handlers and the repositories:
//! - README parsing into questions and examples
//! - webhook-driven synchronization of articles and pull requests
//! - article, template and tag workflows
//! - users, sessions and rate limiting

pub mod article;
pub mod password;
pub mod rate_limiter;
pub mod readme;
pub mod sync;
#[cfg(test)]
pub mod testing;
pub mod user;

pub use article::{
    lowercase_cleaned_name, ArticleDetails, ArticleService, ArticleServiceError, NewArticleInput,
    TagDetails,
};
pub use password::{hash_password, verify_password};
pub use rate_limiter::{parse_rate, RateLimiter, ViewRateLimiter, LOGIN_RATE};
pub use readme::ReadmeParser;
pub use sync::{PullRequestEvent, SyncError, SyncService};
pub use user::{LoginInput, RegisterInput, UserService, UserServiceError};
