//! Structured README content: questions and examples
//!
//! Both are extracted from `<span id="...">` anchors in an article README and
//! may be shared between articles.

use serde::{Deserialize, Serialize};

/// A question anchored in a README; `text` is the span identifier
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Question {
    pub id: i64,
    pub text: String,
}

/// An example anchored in a README, with the code block that follows it
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Example {
    pub id: i64,
    pub text: String,
    pub code: String,
}
