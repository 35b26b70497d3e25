//! User model
//!
//! A registered askci user. A user "connects GitHub" by storing their GitHub
//! login and a personal access token; every GitHub call made on their behalf
//! uses that token.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// User entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    /// Username (unique)
    pub username: String,
    /// Email address (unique)
    pub email: String,
    /// Password hash (argon2)
    #[serde(skip_serializing)]
    pub password_hash: String,
    /// GitHub login, matched against pull request authors
    pub github_username: Option<String>,
    /// GitHub personal access token
    #[serde(skip_serializing)]
    pub github_token: Option<String>,
    pub is_staff: bool,
    pub is_superuser: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Create a new User. The password must already be hashed.
    pub fn new(username: String, email: String, password_hash: String) -> Self {
        let now = Utc::now();
        Self {
            id: 0, // Will be set by the database
            username,
            email,
            password_hash,
            github_username: None,
            github_token: None,
            is_staff: false,
            is_superuser: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the user can create repositories and webhooks on GitHub
    pub fn has_github_create(&self) -> bool {
        self.github_token
            .as_deref()
            .map_or(false, |token| !token.is_empty())
    }

    /// Staff or superuser
    pub fn is_admin(&self) -> bool {
        self.is_staff || self.is_superuser
    }
}
