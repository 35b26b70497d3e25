//! GitHub webhook receiver
//!
//! POST /webhooks/github
//!
//! Every article repository carries three webhooks sharing the article
//! secret. A delivery is matched to its article by `repository.id`, then
//! authenticated with `X-Hub-Signature-256` before anything is queued.

use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    routing::post,
    Json, Router,
};
use data_encoding::HEXLOWER_PERMISSIVE;
use hmac::{Hmac, Mac};
use serde_json::{json, Value};
use sha2::Sha256;

use crate::api::middleware::{ApiError, AppState};
use crate::models::Article;
use crate::services::sync::PullRequestEvent;
use crate::tasks::Job;

type HmacSha256 = Hmac<Sha256>;

const EVENT_HEADER: &str = "x-github-event";
const SIGNATURE_HEADER: &str = "x-hub-signature-256";

pub fn router() -> Router<AppState> {
    Router::new().route("/", post(receive))
}

/// Check a `sha256=<hex>` signature of `body` against `secret`
pub fn verify_signature(secret: &str, body: &[u8], signature: &str) -> bool {
    let Some(hex) = signature.trim().strip_prefix("sha256=") else {
        return false;
    };
    let Ok(expected) = HEXLOWER_PERMISSIVE.decode(hex.as_bytes()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

async fn receive(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let event = header(&headers, EVENT_HEADER)
        .ok_or_else(|| ApiError::validation_error("Missing X-GitHub-Event header"))?
        .to_string();
    let payload: Value = serde_json::from_slice(&body)
        .map_err(|e| ApiError::validation_error(format!("Invalid payload: {}", e)))?;
    let repo_id = payload
        .pointer("/repository/id")
        .and_then(|id| id.as_i64())
        .ok_or_else(|| ApiError::validation_error("Payload has no repository id"))?;

    let article = state.article_service.article_by_repo_id(repo_id).await?;

    let signature = header(&headers, SIGNATURE_HEADER)
        .ok_or_else(|| ApiError::forbidden("Missing signature"))?;
    if !verify_signature(&article.secret, &body, signature) {
        tracing::warn!("Rejected {} delivery for {}: bad signature", event, article.name);
        return Err(ApiError::forbidden("Invalid signature"));
    }

    tracing::debug!("Received {} event for {}", event, article.name);
    let message = match event.as_str() {
        "ping" => "pong".to_string(),
        "push" | "deployment" => {
            let id = state.queue.enqueue(Job::UpdateArticle {
                article_uuid: article.uuid.clone(),
            });
            format!("Queued update {}", id)
        }
        "pull_request" => {
            let id = state
                .queue
                .enqueue(Job::UpdatePullRequest(pull_request_event(&article, &payload)?));
            format!("Queued pull request update {}", id)
        }
        "repository" => {
            let action = payload["action"].as_str().unwrap_or_default();
            state
                .article_service
                .repository_event(&article, action, &payload["repository"])
                .await?
                .to_string()
        }
        _ => "ignored".to_string(),
    };

    Ok(Json(json!({ "message": message })))
}

fn pull_request_event(article: &Article, payload: &Value) -> Result<PullRequestEvent, ApiError> {
    let missing = |field: &str| ApiError::validation_error(format!("Payload has no {}", field));
    let pull_request = payload
        .get("pull_request")
        .ok_or_else(|| missing("pull_request"))?;

    Ok(PullRequestEvent {
        article_uuid: article.uuid.clone(),
        number: payload["number"]
            .as_i64()
            .or_else(|| pull_request["number"].as_i64())
            .ok_or_else(|| missing("number"))?,
        url: pull_request["html_url"]
            .as_str()
            .ok_or_else(|| missing("pull_request.html_url"))?
            .to_string(),
        user: pull_request
            .pointer("/user/login")
            .and_then(|login| login.as_str())
            .ok_or_else(|| missing("pull_request.user.login"))?
            .to_string(),
        action: payload["action"]
            .as_str()
            .ok_or_else(|| missing("action"))?
            .to_string(),
        merged_at: pull_request["merged_at"].as_str().map(str::to_string),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sign(secret: &str, body: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        format!(
            "sha256={}",
            data_encoding::HEXLOWER.encode(&mac.finalize().into_bytes())
        )
    }

    #[test]
    fn test_verify_signature() {
        let body = br#"{"zen":"Keep it logically awesome."}"#;
        let signature = sign("secret-mpi", body);

        assert!(verify_signature("secret-mpi", body, &signature));
        let uppercase = format!("sha256={}", signature["sha256=".len()..].to_uppercase());
        assert!(verify_signature("secret-mpi", body, &uppercase));
        assert!(!verify_signature("secret-slurm", body, &signature));
        assert!(!verify_signature("secret-mpi", b"{}", &signature));
        assert!(!verify_signature("secret-mpi", body, signature.trim_start_matches("sha256=")));
        assert!(!verify_signature("secret-mpi", body, "sha256=zz"));
    }

    #[test]
    fn test_pull_request_event_fields() {
        let article_uuid = "8b0b6c1e-0000-4000-8000-000000000001";
        let payload = json!({
            "action": "closed",
            "number": 7,
            "pull_request": {
                "number": 7,
                "html_url": "https://github.com/octocat/askci-term-mpi/pull/7",
                "user": {"login": "octocat"},
                "merged_at": "2020-04-01T12:00:00Z",
            },
            "repository": {"id": 100},
        });
        let article: Article = serde_json::from_value(json!({
            "id": 1,
            "uuid": article_uuid,
            "name": "mpi",
            "summary": "",
            "text": "",
            "content_html": "",
            "repo": {"id": 100},
            "repo_id": 100,
            "owner_id": 1,
            "template_id": null,
            "webhook": {},
            "created_at": "2020-04-01T12:00:00Z",
            "modified_at": "2020-04-01T12:00:00Z",
        }))
        .unwrap();

        let event = pull_request_event(&article, &payload).unwrap();
        assert_eq!(event.article_uuid, article_uuid);
        assert_eq!(event.number, 7);
        assert_eq!(event.user, "octocat");
        assert_eq!(event.action, "closed");
        assert_eq!(event.merged_at.as_deref(), Some("2020-04-01T12:00:00Z"));

        let without_pr = json!({"action": "opened", "number": 7});
        assert!(pull_request_event(&article, &without_pr).is_err());
    }
}
