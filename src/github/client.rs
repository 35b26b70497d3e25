//! `GitHubApi` over the GitHub REST API using reqwest

use super::{full_name, GitHubApi, REQUEST_REVIEW_EVENT, UPDATE_TEMPLATE_EVENT};
use crate::config::GitHubConfig;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

const GITHUB_JSON: &str = "application/vnd.github+json";
const PER_PAGE: usize = 100;

pub struct ReqwestGitHubClient {
    client: Client,
    api_url: String,
    raw_url: String,
    branch: String,
    /// Where installed webhooks deliver to
    webhook_url: String,
}

#[derive(Debug, Deserialize)]
struct AuthenticatedUser {
    login: String,
}

#[derive(Debug, Deserialize)]
struct OrgMembership {
    role: String,
    organization: Organization,
}

#[derive(Debug, Deserialize)]
struct Organization {
    login: String,
}

#[derive(Debug, Deserialize)]
struct Topics {
    #[serde(default)]
    names: Vec<String>,
}

impl ReqwestGitHubClient {
    pub fn new(config: &GitHubConfig, webhook_url: String) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(GITHUB_JSON));

        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(config.timeout_seconds))
            .default_headers(headers)
            .build()
            .context("Failed to build GitHub HTTP client")?;

        Ok(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            raw_url: config.raw_url.trim_end_matches('/').to_string(),
            branch: config.branch.clone(),
            webhook_url,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_url, path)
    }

    fn authed(&self, builder: RequestBuilder, token: &str) -> RequestBuilder {
        builder.header("Authorization", format!("token {}", token))
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        token: Option<&str>,
        path: &str,
    ) -> Result<T> {
        let mut request = self.client.get(self.url(path));
        if let Some(token) = token {
            request = self.authed(request, token);
        }
        let response = request
            .send()
            .await
            .with_context(|| format!("GitHub request failed: GET {}", path))?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("GitHub error: GET {} returned {}", path, status);
        }
        response
            .json()
            .await
            .with_context(|| format!("Failed to parse GitHub response for {}", path))
    }

    async fn dispatch(
        &self,
        token: &str,
        repo: &Value,
        event_type: &str,
        payload: Value,
    ) -> Result<u16> {
        let path = format!("/repos/{}/dispatches", full_name(repo)?);
        let response = self
            .authed(self.client.post(self.url(&path)), token)
            .json(&json!({"event_type": event_type, "client_payload": payload}))
            .send()
            .await
            .with_context(|| format!("GitHub request failed: POST {}", path))?;

        let status = response.status();
        if status != StatusCode::NO_CONTENT {
            tracing::warn!("Dispatch {} to {} returned {}", event_type, path, status);
        }
        Ok(status.as_u16())
    }
}

#[async_trait]
impl GitHubApi for ReqwestGitHubClient {
    async fn fetch_readme(&self, full_name: &str) -> Result<String> {
        let url = format!("{}/{}/{}/README.md", self.raw_url, full_name, self.branch);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("Failed to fetch {}", url))?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("README fetch {} returned {}", url, status);
        }
        response.text().await.context("Failed to read README body")
    }

    async fn copy_repository_template(
        &self,
        token: &str,
        template: &Value,
        repository: &str,
        description: &str,
    ) -> Result<Option<Value>> {
        let (owner, name) = repository
            .split_once('/')
            .with_context(|| format!("Repository must be owner/name: {}", repository))?;
        let path = format!("/repos/{}/generate", full_name(template)?);

        let response = self
            .authed(self.client.post(self.url(&path)), token)
            .json(&json!({"owner": owner, "name": name, "description": description}))
            .send()
            .await
            .with_context(|| format!("GitHub request failed: POST {}", path))?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!("Generating {} from template returned {}", repository, status);
            return Ok(None);
        }
        Ok(Some(response.json().await.context("Failed to parse generated repository")?))
    }

    async fn create_webhook(
        &self,
        token: &str,
        repo: &Value,
        secret: &str,
        events: &[&str],
    ) -> Result<Value> {
        let path = format!("/repos/{}/hooks", full_name(repo)?);
        let body = json!({
            "name": "web",
            "active": true,
            "events": events,
            "config": {
                "url": self.webhook_url,
                "content_type": "json",
                "secret": secret,
            },
        });

        let response = self
            .authed(self.client.post(self.url(&path)), token)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("GitHub request failed: POST {}", path))?;

        // Validation failures come back as a JSON body with `errors`
        response.json().await.context("Failed to parse webhook response")
    }

    async fn delete_webhook(&self, token: &str, repo: &Value, webhook_id: i64) -> Result<()> {
        let path = format!("/repos/{}/hooks/{}", full_name(repo)?, webhook_id);
        let response = self
            .authed(self.client.delete(self.url(&path)), token)
            .send()
            .await
            .with_context(|| format!("GitHub request failed: DELETE {}", path))?;

        let status = response.status();
        if !status.is_success() && status != StatusCode::NOT_FOUND {
            anyhow::bail!("GitHub error: DELETE {} returned {}", path, status);
        }
        Ok(())
    }

    async fn get_admin_namespaces(&self, token: &str) -> Result<Vec<String>> {
        let user: AuthenticatedUser = self.get_json(Some(token), "/user").await?;
        let memberships: Vec<OrgMembership> = self
            .get_json(Some(token), "/user/memberships/orgs?state=active")
            .await?;

        let mut namespaces = vec![user.login];
        namespaces.extend(
            memberships
                .into_iter()
                .filter(|m| m.role == "admin")
                .map(|m| m.organization.login),
        );
        Ok(namespaces)
    }

    async fn get_repo(&self, token: &str, owner: &str, name: &str) -> Result<Value> {
        self.get_json(Some(token), &format!("/repos/{}/{}", owner, name))
            .await
    }

    async fn get_repository_topics(
        &self,
        token: Option<&str>,
        repo: &Value,
    ) -> Result<Vec<String>> {
        let topics: Topics = self
            .get_json(token, &format!("/repos/{}/topics", full_name(repo)?))
            .await?;
        Ok(topics.names)
    }

    async fn list_repos(&self, token: &str) -> Result<Vec<Value>> {
        let mut repos = Vec::new();
        let mut page = 1;
        loop {
            let batch: Vec<Value> = self
                .get_json(
                    Some(token),
                    &format!("/user/repos?per_page={}&page={}", PER_PAGE, page),
                )
                .await?;
            let done = batch.len() < PER_PAGE;
            repos.extend(batch);
            if done {
                break;
            }
            page += 1;
        }
        Ok(repos)
    }

    async fn request_review(
        &self,
        token: &str,
        github_username: &str,
        repo: &Value,
        markdown: &str,
    ) -> Result<u16> {
        self.dispatch(
            token,
            repo,
            REQUEST_REVIEW_EVENT,
            json!({"markdown": markdown, "user": github_username}),
        )
        .await
    }

    async fn subscribe_to(&self, token: &str, repo: &Value) -> Result<()> {
        let path = format!("/repos/{}/subscription", full_name(repo)?);
        let response = self
            .authed(self.client.put(self.url(&path)), token)
            .json(&json!({"subscribed": true, "ignored": false}))
            .send()
            .await
            .with_context(|| format!("GitHub request failed: PUT {}", path))?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("GitHub error: PUT {} returned {}", path, status);
        }
        Ok(())
    }

    async fn dispatch_template_update(
        &self,
        token: &str,
        repo: &Value,
        template: &Value,
    ) -> Result<u16> {
        self.dispatch(
            token,
            repo,
            UPDATE_TEMPLATE_EVENT,
            json!({"template": full_name(template)?}),
        )
        .await
    }

    async fn create_issue(
        &self,
        token: &str,
        repo: &Value,
        title: &str,
        body: &str,
    ) -> Result<Value> {
        let path = format!("/repos/{}/issues", full_name(repo)?);
        let response = self
            .authed(self.client.post(self.url(&path)), token)
            .json(&json!({"title": title, "body": body}))
            .send()
            .await
            .with_context(|| format!("GitHub request failed: POST {}", path))?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("GitHub error: POST {} returned {}", path, status);
        }
        response.json().await.context("Failed to parse created issue")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urls_trim_trailing_slash() {
        let config = GitHubConfig {
            api_url: "https://api.github.com/".to_string(),
            raw_url: "https://raw.githubusercontent.com/".to_string(),
            ..GitHubConfig::default()
        };
        let client =
            ReqwestGitHubClient::new(&config, "http://localhost/webhooks/github".to_string())
                .unwrap();

        assert_eq!(client.url("/user"), "https://api.github.com/user");
        assert_eq!(client.raw_url, "https://raw.githubusercontent.com");
        assert_eq!(client.branch, "master");
    }
}
