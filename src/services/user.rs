//! User service
//!
//! Registration, login sessions and the GitHub connection of a user:
//! - the first registered user becomes staff and superuser
//! - login answers a session whose id is the bearer token (7 day expiry)
//! - connecting GitHub stores a login and a personal access token

use crate::db::repositories::{PullRequestRepository, SessionRepository, UserRepository};
use crate::models::{PullRequest, Session, User};
use crate::services::password::{hash_password, verify_password};
use anyhow::Context;
use chrono::{Duration, Utc};
use std::sync::Arc;
use uuid::Uuid;

/// Default session expiration time in days
const DEFAULT_SESSION_EXPIRATION_DAYS: i64 = 7;

/// Error types for user service operations
#[derive(Debug, thiserror::Error)]
pub enum UserServiceError {
    /// Authentication failed (invalid credentials)
    #[error("Authentication failed: {0}")]
    AuthenticationError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Username, email or GitHub login already taken
    #[error("User already exists: {0}")]
    UserExists(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

pub struct UserService {
    user_repo: Arc<dyn UserRepository>,
    session_repo: Arc<dyn SessionRepository>,
    pull_requests: Arc<dyn PullRequestRepository>,
    session_expiration_days: i64,
}

impl UserService {
    pub fn new(
        user_repo: Arc<dyn UserRepository>,
        session_repo: Arc<dyn SessionRepository>,
        pull_requests: Arc<dyn PullRequestRepository>,
    ) -> Self {
        Self {
            user_repo,
            session_repo,
            pull_requests,
            session_expiration_days: DEFAULT_SESSION_EXPIRATION_DAYS,
        }
    }

    pub fn with_session_expiration(mut self, days: i64) -> Self {
        self.session_expiration_days = days;
        self
    }

    /// Register a new user
    ///
    /// # Errors
    ///
    /// - `ValidationError` if a field is empty or the email has no `@`
    /// - `UserExists` if username or email is already taken
    pub async fn register(&self, input: RegisterInput) -> Result<User, UserServiceError> {
        validate_register_input(&input)?;

        if self
            .user_repo
            .get_by_username(&input.username)
            .await
            .context("Failed to check username")?
            .is_some()
        {
            return Err(UserServiceError::UserExists(format!(
                "Username '{}' is already taken",
                input.username
            )));
        }
        if self
            .user_repo
            .get_by_email(&input.email)
            .await
            .context("Failed to check email")?
            .is_some()
        {
            return Err(UserServiceError::UserExists(format!(
                "Email '{}' is already registered",
                input.email
            )));
        }

        let is_first = self.is_first_user().await?;
        let password_hash = hash_password(&input.password).context("Failed to hash password")?;

        let mut user = User::new(input.username, input.email, password_hash);
        user.is_staff = is_first;
        user.is_superuser = is_first;

        let created = self
            .user_repo
            .create(&user)
            .await
            .context("Failed to create user")?;

        tracing::info!("Registered user {} (admin: {})", created.username, is_first);
        Ok(created)
    }

    /// Check credentials and open a new session
    pub async fn login(&self, input: LoginInput) -> Result<Session, UserServiceError> {
        let user = match self
            .user_repo
            .get_by_username(&input.username_or_email)
            .await
            .context("Failed to get user by username")?
        {
            Some(user) => Some(user),
            None => self
                .user_repo
                .get_by_email(&input.username_or_email)
                .await
                .context("Failed to get user by email")?,
        };

        let invalid =
            || UserServiceError::AuthenticationError("Invalid username or password".to_string());
        let user = user.ok_or_else(invalid)?;

        if !verify_password(&input.password, &user.password_hash)
            .context("Failed to verify password")?
        {
            return Err(invalid());
        }

        let now = Utc::now();
        let session = Session {
            id: Uuid::new_v4().to_string(),
            user_id: user.id,
            expires_at: now + Duration::days(self.session_expiration_days),
            created_at: now,
        };
        let created = self
            .session_repo
            .create(&session)
            .await
            .context("Failed to create session")?;
        Ok(created)
    }

    pub async fn logout(&self, session_id: &str) -> Result<(), UserServiceError> {
        self.session_repo
            .delete(session_id)
            .await
            .context("Failed to delete session")?;
        Ok(())
    }

    /// The user behind a session token; `None` for unknown or expired sessions
    pub async fn validate_session(&self, token: &str) -> Result<Option<User>, UserServiceError> {
        let Some(session) = self
            .session_repo
            .get_by_id(token)
            .await
            .context("Failed to get session")?
        else {
            return Ok(None);
        };

        if session.is_expired() {
            if let Err(e) = self.session_repo.delete(token).await {
                tracing::warn!("Failed to delete expired session: {}", e);
            }
            return Ok(None);
        }

        let user = self
            .user_repo
            .get_by_id(session.user_id)
            .await
            .context("Failed to get user")?;
        Ok(user)
    }

    pub async fn is_first_user(&self) -> Result<bool, UserServiceError> {
        let count = self
            .user_repo
            .count()
            .await
            .context("Failed to count users")?;
        Ok(count == 0)
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<User>, UserServiceError> {
        Ok(self
            .user_repo
            .get_by_id(id)
            .await
            .context("Failed to get user by ID")?)
    }

    /// Store the GitHub login and personal access token of a user
    pub async fn connect_github(
        &self,
        user: &User,
        github_username: &str,
        token: &str,
    ) -> Result<User, UserServiceError> {
        let github_username = github_username.trim();
        let token = token.trim();
        if github_username.is_empty() || token.is_empty() {
            return Err(UserServiceError::ValidationError(
                "A GitHub username and token are required".to_string(),
            ));
        }

        if let Some(other) = self
            .user_repo
            .get_by_github_username(github_username)
            .await
            .context("Failed to check GitHub username")?
        {
            if other.id != user.id {
                return Err(UserServiceError::UserExists(format!(
                    "GitHub account '{}' is connected to another user",
                    github_username
                )));
            }
        }

        self.user_repo
            .update_github(user.id, Some(github_username), Some(token))
            .await
            .context("Failed to connect GitHub")?;

        self.reload(user.id).await
    }

    pub async fn disconnect_github(&self, user: &User) -> Result<User, UserServiceError> {
        self.user_repo
            .update_github(user.id, None, None)
            .await
            .context("Failed to disconnect GitHub")?;
        self.reload(user.id).await
    }

    /// The pending or open pull request a user has on an article
    pub async fn get_pr(
        &self,
        user: &User,
        article_id: i64,
    ) -> Result<Option<PullRequest>, UserServiceError> {
        Ok(self
            .pull_requests
            .find_active(article_id, user.id)
            .await
            .context("Failed to look up pull request")?)
    }

    pub async fn cleanup_expired_sessions(&self) -> Result<i64, UserServiceError> {
        Ok(self
            .session_repo
            .delete_expired()
            .await
            .context("Failed to delete expired sessions")?)
    }

    async fn reload(&self, id: i64) -> Result<User, UserServiceError> {
        self.user_repo
            .get_by_id(id)
            .await
            .context("Failed to reload user")?
            .ok_or_else(|| UserServiceError::InternalError(anyhow::anyhow!("user {} vanished", id)))
    }
}

fn validate_register_input(input: &RegisterInput) -> Result<(), UserServiceError> {
    if input.username.trim().is_empty() {
        return Err(UserServiceError::ValidationError(
            "Username cannot be empty".to_string(),
        ));
    }
    if input.email.trim().is_empty() {
        return Err(UserServiceError::ValidationError(
            "Email cannot be empty".to_string(),
        ));
    }
    if input.password.is_empty() {
        return Err(UserServiceError::ValidationError(
            "Password cannot be empty".to_string(),
        ));
    }
    if !input.email.contains('@') {
        return Err(UserServiceError::ValidationError(
            "Invalid email format".to_string(),
        ));
    }
    Ok(())
}

/// Input for user registration
#[derive(Debug, Clone)]
pub struct RegisterInput {
    pub username: String,
    pub email: String,
    pub password: String,
}

impl RegisterInput {
    pub fn new(
        username: impl Into<String>,
        email: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            email: email.into(),
            password: password.into(),
        }
    }
}

/// Input for user login
#[derive(Debug, Clone)]
pub struct LoginInput {
    pub username_or_email: String,
    pub password: String,
}

impl LoginInput {
    pub fn new(username_or_email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username_or_email: username_or_email.into(),
            password: password.into(),
        }
    }
}
