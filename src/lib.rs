//! askci - collaborative knowledge articles backed by GitHub repositories
//!
//! Every article is a GitHub repository named `askci-term-<term>`. Its README
//! is parsed into questions and examples, edits are proposed as pull requests
//! and GitHub webhooks keep the local copy in sync.

pub mod api;
pub mod cache;
pub mod config;
pub mod db;
pub mod github;
pub mod models;
pub mod services;
pub mod tasks;
