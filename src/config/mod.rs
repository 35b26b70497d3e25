//! Configuration management
//!
//! This module handles loading and parsing configuration for askci.
//! Configuration can be loaded from:
//! - config.yml file
//! - Environment variables (override file settings)
//!
//! Missing optional values are filled with sensible defaults.

use serde::{Deserialize, Serialize};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Cache configuration
    #[serde(default)]
    pub cache: CacheConfig,
    /// GitHub API configuration
    #[serde(default)]
    pub github: GitHubConfig,
    /// Article policy and view limits
    #[serde(default)]
    pub askci: AskciConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
    /// CORS allowed origin (for cookie-based auth)
    #[serde(default = "default_cors_origin")]
    pub cors_origin: String,
    /// Public base URL GitHub delivers webhooks to
    #[serde(default = "default_public_url")]
    pub public_url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origin: default_cors_origin(),
            public_url: default_public_url(),
        }
    }
}

impl ServerConfig {
    /// URL installed as the webhook delivery target on article repositories
    pub fn webhook_url(&self) -> String {
        format!("{}/webhooks/github", self.public_url.trim_end_matches('/'))
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_cors_origin() -> String {
    "http://localhost:3000".to_string()
}

fn default_public_url() -> String {
    "http://127.0.0.1:8080".to_string()
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database driver (sqlite or mysql)
    #[serde(default)]
    pub driver: DatabaseDriver,
    /// Database connection URL
    #[serde(default = "default_database_url")]
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            driver: DatabaseDriver::default(),
            url: default_database_url(),
        }
    }
}

fn default_database_url() -> String {
    "data/askci.db".to_string()
}

/// Database driver type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseDriver {
    /// SQLite (default)
    #[default]
    Sqlite,
    /// MySQL
    Mysql,
}

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Cache TTL in seconds
    #[serde(default = "default_ttl")]
    pub ttl_seconds: u64,
    /// Maximum number of cached entries
    #[serde(default = "default_max_capacity")]
    pub max_capacity: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: default_ttl(),
            max_capacity: default_max_capacity(),
        }
    }
}

fn default_ttl() -> u64 {
    3600
}

fn default_max_capacity() -> u64 {
    10_000
}

/// GitHub API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubConfig {
    /// REST API base URL
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Raw content base URL (README downloads)
    #[serde(default = "default_raw_url")]
    pub raw_url: String,
    /// Branch the README is read from
    #[serde(default = "default_branch")]
    pub branch: String,
    /// User agent sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            raw_url: default_raw_url(),
            branch: default_branch(),
            user_agent: default_user_agent(),
            timeout_seconds: default_timeout(),
        }
    }
}

fn default_api_url() -> String {
    "https://api.github.com".to_string()
}

fn default_raw_url() -> String {
    "https://raw.githubusercontent.com".to_string()
}

fn default_branch() -> String {
    "master".to_string()
}

fn default_user_agent() -> String {
    "askci".to_string()
}

fn default_timeout() -> u64 {
    30
}

/// Article policy and view limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AskciConfig {
    /// Maximum number of articles a single user may own
    #[serde(default = "default_user_articles_limit")]
    pub user_articles_limit: i64,
    /// View rate limit per client IP, `<count>/<period>` (e.g. "100/1m")
    #[serde(default = "default_view_rate_limit")]
    pub view_rate_limit: String,
    /// Reject requests over the limit (otherwise only log them)
    #[serde(default = "default_view_rate_limit_block")]
    pub view_rate_limit_block: bool,
}

impl Default for AskciConfig {
    fn default() -> Self {
        Self {
            user_articles_limit: default_user_articles_limit(),
            view_rate_limit: default_view_rate_limit(),
            view_rate_limit_block: default_view_rate_limit_block(),
        }
    }
}

fn default_user_articles_limit() -> i64 {
    10
}

fn default_view_rate_limit() -> String {
    "100/1m".to_string()
}

fn default_view_rate_limit_block() -> bool {
    true
}

/// Error type for configuration parsing
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    FileRead {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse config file '{path}': {message}")]
    ParseError {
        path: String,
        message: String,
    },
}

impl Config {
    /// Load configuration from file
    ///
    /// If the file doesn't exist, returns default configuration.
    /// If the file exists but is invalid YAML, returns an error with details.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.display().to_string(),
            source: e,
        })?;

        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: Config = serde_yaml::from_str(&content).map_err(|e| {
            ConfigError::ParseError {
                path: path.display().to_string(),
                message: format_yaml_error(&e),
            }
        })?;

        Ok(config)
    }

    /// Load configuration from file with environment variable overrides
    ///
    /// Environment variables follow the pattern:
    /// - ASKCI_SERVER_HOST
    /// - ASKCI_SERVER_PORT
    /// - ASKCI_SERVER_PUBLIC_URL
    /// - ASKCI_DATABASE_DRIVER
    /// - ASKCI_DATABASE_URL
    /// - ASKCI_GITHUB_API_URL
    /// - ASKCI_GITHUB_RAW_URL
    /// - ASKCI_GITHUB_BRANCH
    /// - ASKCI_USER_ARTICLES_LIMIT
    /// - ASKCI_VIEW_RATE_LIMIT
    /// - ASKCI_VIEW_RATE_LIMIT_BLOCK
    pub fn load_with_env(path: &std::path::Path) -> anyhow::Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration
    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("ASKCI_SERVER_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("ASKCI_SERVER_PORT") {
            if let Ok(port) = port.parse::<u16>() {
                self.server.port = port;
            }
        }
        if let Ok(cors_origin) = std::env::var("ASKCI_SERVER_CORS_ORIGIN") {
            self.server.cors_origin = cors_origin;
        }
        if let Ok(public_url) = std::env::var("ASKCI_SERVER_PUBLIC_URL") {
            self.server.public_url = public_url;
        }

        if let Ok(driver) = std::env::var("ASKCI_DATABASE_DRIVER") {
            match driver.to_lowercase().as_str() {
                "sqlite" => self.database.driver = DatabaseDriver::Sqlite,
                "mysql" => self.database.driver = DatabaseDriver::Mysql,
                _ => {} // Ignore invalid values
            }
        }
        if let Ok(url) = std::env::var("ASKCI_DATABASE_URL") {
            self.database.url = url;
        }

        if let Ok(api_url) = std::env::var("ASKCI_GITHUB_API_URL") {
            self.github.api_url = api_url;
        }
        if let Ok(raw_url) = std::env::var("ASKCI_GITHUB_RAW_URL") {
            self.github.raw_url = raw_url;
        }
        if let Ok(branch) = std::env::var("ASKCI_GITHUB_BRANCH") {
            self.github.branch = branch;
        }

        if let Ok(limit) = std::env::var("ASKCI_USER_ARTICLES_LIMIT") {
            if let Ok(limit) = limit.parse::<i64>() {
                self.askci.user_articles_limit = limit;
            }
        }
        if let Ok(rate) = std::env::var("ASKCI_VIEW_RATE_LIMIT") {
            self.askci.view_rate_limit = rate;
        }
        if let Ok(block) = std::env::var("ASKCI_VIEW_RATE_LIMIT_BLOCK") {
            match block.to_lowercase().as_str() {
                "true" | "1" | "yes" => self.askci.view_rate_limit_block = true,
                "false" | "0" | "no" => self.askci.view_rate_limit_block = false,
                _ => {}
            }
        }
    }
}

/// Format YAML parsing error with location and context
fn format_yaml_error(e: &serde_yaml::Error) -> String {
    if let Some(location) = e.location() {
        format!(
            "at line {}, column {}: {}",
            location.line(),
            location.column(),
            e
        )
    } else {
        e.to_string()
    }
}

#[cfg(test)]
static CONFIG_ENV_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());
