//! Pull request model
//!
//! Local mirror of a GitHub pull request's review status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Review status of a pull request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PullRequestStatus {
    /// Review requested, GitHub has not opened the pull request yet
    #[default]
    Pending,
    /// Open on GitHub
    Open,
    /// Merged
    Closed,
    /// Closed without merging
    Reject,
}

impl PullRequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PullRequestStatus::Pending => "pending",
            PullRequestStatus::Open => "open",
            PullRequestStatus::Closed => "closed",
            PullRequestStatus::Reject => "reject",
        }
    }

    /// Pending and open requests block a new review request by the same user
    pub fn is_active(&self) -> bool {
        matches!(self, PullRequestStatus::Pending | PullRequestStatus::Open)
    }
}

impl fmt::Display for PullRequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PullRequestStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(PullRequestStatus::Pending),
            "open" => Ok(PullRequestStatus::Open),
            "closed" => Ok(PullRequestStatus::Closed),
            "reject" => Ok(PullRequestStatus::Reject),
            _ => Err(anyhow::anyhow!("Invalid pull request status: {}", s)),
        }
    }
}

/// Pull request entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullRequest {
    pub id: i64,
    pub article_id: i64,
    pub owner_id: i64,
    /// GitHub pull request number, unknown while pending
    pub number: Option<i64>,
    /// GitHub pull request URL, unknown while pending
    pub url: Option<String>,
    pub status: PullRequestStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
