//! Authentication API endpoints
//!
//! Handles HTTP requests for user authentication:
//! - POST /api/v1/auth/register - User registration
//! - POST /api/v1/auth/login - User login
//! - POST /api/v1/auth/logout - User logout
//! - GET /api/v1/auth/me - Get current user
//! - PUT /api/v1/auth/github - Connect a GitHub account
//! - DELETE /api/v1/auth/github - Disconnect it

use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::middleware::{extract_session_token, ApiError, AppState, AuthenticatedUser};
use crate::models::User;
use crate::services::user::{LoginInput, RegisterInput, UserServiceError};

/// Session cookie lifetime in seconds (7 days)
const SESSION_MAX_AGE: i64 = 7 * 24 * 60 * 60;

/// Request body for user registration
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

/// Request body for user login
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username_or_email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct ConnectGitHubRequest {
    pub github_username: String,
    /// Personal access token
    pub token: String,
}

/// Response for successful authentication
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub user: UserResponse,
    pub token: String,
}

/// Response for user info
#[derive(Debug, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub github_username: Option<String>,
    pub github_connected: bool,
    pub is_staff: bool,
    pub is_superuser: bool,
    pub created_at: String,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            github_connected: user.has_github_create(),
            id: user.id,
            username: user.username,
            email: user.email,
            github_username: user.github_username,
            is_staff: user.is_staff,
            is_superuser: user.is_superuser,
            created_at: user.created_at.to_rfc3339(),
        }
    }
}

/// Build protected auth routes (requires auth middleware)
pub fn protected_router() -> Router<AppState> {
    Router::new()
        .route("/logout", post(logout))
        .route("/me", get(get_current_user))
        .route("/github", put(connect_github).delete(disconnect_github))
}

/// Build public auth routes (no auth required)
pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
}

fn session_cookie(token: &str, max_age: i64) -> Result<HeaderMap, ApiError> {
    let cookie = format!(
        "session={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        token, max_age
    );
    let mut headers = HeaderMap::new();
    headers.insert(
        header::SET_COOKIE,
        HeaderValue::from_str(&cookie).map_err(|e| ApiError::internal_error(e.to_string()))?,
    );
    Ok(headers)
}

/// POST /api/v1/auth/register - User registration
///
/// The first registered user becomes staff and superuser.
async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let password = body.password.clone();
    let input = RegisterInput::new(body.username, body.email, body.password);
    let user = state.user_service.register(input).await?;

    let session = state
        .user_service
        .login(LoginInput::new(&user.username, &password))
        .await?;

    Ok((
        StatusCode::CREATED,
        session_cookie(&session.id, SESSION_MAX_AGE)?,
        Json(AuthResponse {
            user: user.into(),
            token: session.id,
        }),
    ))
}

/// POST /api/v1/auth/login - User login
///
/// Failed attempts are counted per username; too many lock the name out for
/// the rest of the window.
async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let key = body.username_or_email.trim().to_lowercase();
    if state.login_limiter.is_limited(&key).await {
        tracing::warn!("Login rate limit exceeded for {}", key);
        return Err(ApiError::rate_limited(
            "Too many failed logins, please try again in 15 minutes",
            900,
        ));
    }

    let input = LoginInput::new(body.username_or_email, body.password);
    let session = match state.user_service.login(input).await {
        Ok(session) => session,
        Err(e) => {
            if matches!(e, UserServiceError::AuthenticationError(_)) {
                state.login_limiter.record(key).await;
            }
            return Err(e.into());
        }
    };

    let user = state
        .user_service
        .validate_session(&session.id)
        .await?
        .ok_or_else(|| ApiError::internal_error("Session validation failed"))?;
    state.login_limiter.clear(&key).await;

    Ok((
        session_cookie(&session.id, SESSION_MAX_AGE)?,
        Json(AuthResponse {
            user: user.into(),
            token: session.id,
        }),
    ))
}

/// POST /api/v1/auth/logout - User logout
async fn logout(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    if let Some(token) = extract_session_token(&headers) {
        state.user_service.logout(&token).await?;
    }
    Ok((
        session_cookie("", 0)?,
        Json(serde_json::json!({ "message": "Logged out" })),
    ))
}

/// GET /api/v1/auth/me - Get current user
async fn get_current_user(user: AuthenticatedUser) -> Json<UserResponse> {
    Json(user.0.into())
}

/// PUT /api/v1/auth/github
async fn connect_github(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<ConnectGitHubRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    let user = state
        .user_service
        .connect_github(&user.0, &body.github_username, &body.token)
        .await?;
    tracing::info!("{} connected GitHub as {}", user.username, body.github_username.trim());
    Ok(Json(user.into()))
}

/// DELETE /api/v1/auth/github
async fn disconnect_github(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<UserResponse>, ApiError> {
    let user = state.user_service.disconnect_github(&user.0).await?;
    Ok(Json(user.into()))
}
