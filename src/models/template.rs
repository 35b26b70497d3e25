//! Template repository model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A GitHub template repository new article repositories are generated from
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateRepository {
    pub id: i64,
    pub uuid: String,
    /// Repository name (without owner)
    pub name: String,
    /// GitHub repository object
    pub repo: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl TemplateRepository {
    /// `owner/name` of the template repository
    pub fn full_name(&self) -> Option<&str> {
        self.repo.get("full_name").and_then(|v| v.as_str())
    }
}
