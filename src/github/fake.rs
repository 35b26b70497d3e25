//! In-memory `GitHubApi` for tests
//!
//! Answers are configured up front; every call is recorded in `calls`.

use super::{full_name, GitHubApi};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;

pub struct FakeGitHub {
    /// README text by repository full name
    pub readmes: Mutex<HashMap<String, String>>,
    /// Topics by repository full name
    pub topics: Mutex<HashMap<String, Vec<String>>>,
    /// Repositories returned by `list_repos` and `get_repo`
    pub repos: Mutex<Vec<Value>>,
    pub namespaces: Vec<String>,
    /// Status code answered to dispatches
    pub dispatch_status: u16,
    /// When set, webhook creation answers with this `errors` value
    pub webhook_errors: Option<String>,
    /// When false, template generation is refused
    pub allow_generate: bool,
    pub calls: Mutex<Vec<String>>,
    next_id: AtomicI64,
}

impl Default for FakeGitHub {
    fn default() -> Self {
        Self {
            readmes: Mutex::new(HashMap::new()),
            topics: Mutex::new(HashMap::new()),
            repos: Mutex::new(Vec::new()),
            namespaces: vec!["octocat".to_string()],
            dispatch_status: 204,
            webhook_errors: None,
            allow_generate: true,
            calls: Mutex::new(Vec::new()),
            next_id: AtomicI64::new(1000),
        }
    }
}

impl FakeGitHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_readme(self, full_name: &str, readme: &str) -> Self {
        self.set_readme(full_name, readme);
        self
    }

    pub fn set_readme(&self, full_name: &str, readme: &str) {
        if let Ok(mut readmes) = self.readmes.lock() {
            readmes.insert(full_name.to_string(), readme.to_string());
        }
    }

    pub fn with_topics(self, full_name: &str, topics: &[&str]) -> Self {
        if let Ok(mut all) = self.topics.lock() {
            all.insert(
                full_name.to_string(),
                topics.iter().map(|t| t.to_string()).collect(),
            );
        }
        self
    }

    pub fn with_dispatch_status(mut self, status: u16) -> Self {
        self.dispatch_status = status;
        self
    }

    pub fn with_webhook_errors(mut self, errors: &str) -> Self {
        self.webhook_errors = Some(errors.to_string());
        self
    }

    pub fn refusing_generate(mut self) -> Self {
        self.allow_generate = false;
        self
    }

    pub fn with_repo(self, repo: Value) -> Self {
        if let Ok(mut repos) = self.repos.lock() {
            repos.push(repo);
        }
        self
    }

    /// A GitHub repository object as `list_repos` would answer it
    pub fn repo(id: i64, owner: &str, name: &str, admin: bool) -> Value {
        json!({
            "id": id,
            "name": name,
            "full_name": format!("{}/{}", owner, name),
            "html_url": format!("https://github.com/{}/{}", owner, name),
            "description": format!("{} description", name),
            "owner": {"login": owner},
            "permissions": {"admin": admin},
        })
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    fn record(&self, call: String) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }

    fn next_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }
}

#[async_trait]
impl GitHubApi for FakeGitHub {
    async fn fetch_readme(&self, full_name: &str) -> Result<String> {
        self.record(format!("fetch_readme {}", full_name));
        self.readmes
            .lock()
            .map_err(|_| anyhow!("poisoned"))?
            .get(full_name)
            .cloned()
            .ok_or_else(|| anyhow!("README fetch for {} returned 404", full_name))
    }

    async fn copy_repository_template(
        &self,
        _token: &str,
        template: &Value,
        repository: &str,
        description: &str,
    ) -> Result<Option<Value>> {
        self.record(format!(
            "copy_repository_template {} -> {}",
            full_name(template)?,
            repository
        ));
        if !self.allow_generate {
            return Ok(None);
        }
        let (owner, name) = repository
            .split_once('/')
            .ok_or_else(|| anyhow!("bad repository {}", repository))?;
        let mut repo = Self::repo(self.next_id(), owner, name, true);
        repo["description"] = json!(description);
        Ok(Some(repo))
    }

    async fn create_webhook(
        &self,
        _token: &str,
        repo: &Value,
        _secret: &str,
        events: &[&str],
    ) -> Result<Value> {
        self.record(format!("create_webhook {} {}", full_name(repo)?, events.join(",")));
        if let Some(errors) = &self.webhook_errors {
            return Ok(json!({"message": "Validation Failed", "errors": errors}));
        }
        Ok(json!({"id": self.next_id(), "events": events}))
    }

    async fn delete_webhook(&self, _token: &str, repo: &Value, webhook_id: i64) -> Result<()> {
        self.record(format!("delete_webhook {} {}", full_name(repo)?, webhook_id));
        Ok(())
    }

    async fn get_admin_namespaces(&self, _token: &str) -> Result<Vec<String>> {
        self.record("get_admin_namespaces".to_string());
        Ok(self.namespaces.clone())
    }

    async fn get_repo(&self, _token: &str, owner: &str, name: &str) -> Result<Value> {
        let wanted = format!("{}/{}", owner, name);
        self.record(format!("get_repo {}", wanted));
        self.repos
            .lock()
            .map_err(|_| anyhow!("poisoned"))?
            .iter()
            .find(|r| r["full_name"] == wanted.as_str())
            .cloned()
            .ok_or_else(|| anyhow!("GitHub error: GET /repos/{} returned 404", wanted))
    }

    async fn get_repository_topics(
        &self,
        _token: Option<&str>,
        repo: &Value,
    ) -> Result<Vec<String>> {
        let name = full_name(repo)?;
        self.record(format!("get_repository_topics {}", name));
        Ok(self
            .topics
            .lock()
            .map_err(|_| anyhow!("poisoned"))?
            .get(name)
            .cloned()
            .unwrap_or_default())
    }

    async fn list_repos(&self, _token: &str) -> Result<Vec<Value>> {
        self.record("list_repos".to_string());
        Ok(self.repos.lock().map_err(|_| anyhow!("poisoned"))?.clone())
    }

    async fn request_review(
        &self,
        _token: &str,
        github_username: &str,
        repo: &Value,
        _markdown: &str,
    ) -> Result<u16> {
        self.record(format!("request_review {} {}", full_name(repo)?, github_username));
        Ok(self.dispatch_status)
    }

    async fn subscribe_to(&self, _token: &str, repo: &Value) -> Result<()> {
        self.record(format!("subscribe_to {}", full_name(repo)?));
        Ok(())
    }

    async fn dispatch_template_update(
        &self,
        _token: &str,
        repo: &Value,
        template: &Value,
    ) -> Result<u16> {
        self.record(format!(
            "dispatch_template_update {} {}",
            full_name(repo)?,
            full_name(template)?
        ));
        Ok(self.dispatch_status)
    }

    async fn create_issue(
        &self,
        _token: &str,
        repo: &Value,
        title: &str,
        _body: &str,
    ) -> Result<Value> {
        let name = full_name(repo)?;
        self.record(format!("create_issue {} {}", name, title));
        let number = self.next_id();
        Ok(json!({
            "number": number,
            "title": title,
            "html_url": format!("https://github.com/{}/issues/{}", name, number),
        }))
    }
}
