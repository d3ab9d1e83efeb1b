// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! GitHub REST API client.

use std::time::Duration;

use reqwest::{
    header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT},
    Client, StatusCode,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;

pub const GITHUB_API_BASE_URL: &str = "https://api.github.com/";
const GITHUB_ACCEPT: &str = "application/vnd.github.v3+json";
const GITHUB_USER_AGENT: &str = "communications-server";

/// Retries after the first attempt for transient failures.
pub const MAX_RETRIES: u32 = 3;
pub const RETRY_DELAY: Duration = Duration::from_millis(300);

#[derive(Debug, thiserror::Error)]
pub enum GitHubError {
    #[error("GitHub request failed: {0}")]
    Request(String),

    #[error("GitHub returned {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("GitHub response was invalid: {0}")]
    Decode(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitHubUser {
    pub id: u64,
    pub login: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub public_repos: u32,
    pub html_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitHubRepository {
    pub id: u64,
    pub name: String,
    pub full_name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub html_url: String,
    #[serde(default)]
    pub stargazers_count: u32,
}

/// Network errors, 408, 429 and 5xx are worth retrying.
fn is_transient(status: StatusCode) -> bool {
    status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
}

#[derive(Debug, Clone)]
pub struct GitHubClient {
    base_url: Url,
    http: Client,
    max_retries: u32,
    retry_delay: Duration,
}

impl GitHubClient {
    pub fn new() -> Result<Self, GitHubError> {
        Self::with_base_url(GITHUB_API_BASE_URL)
    }

    pub fn with_base_url(base_url: &str) -> Result<Self, GitHubError> {
        let mut base_url =
            Url::parse(base_url).map_err(|e| GitHubError::Request(format!("invalid base URL: {e}")))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(GITHUB_ACCEPT));
        headers.insert(USER_AGENT, HeaderValue::from_static(GITHUB_USER_AGENT));

        let http = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| GitHubError::Request(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            base_url,
            http,
            max_retries: MAX_RETRIES,
            retry_delay: RETRY_DELAY,
        })
    }

    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    pub async fn get_user(&self, login: &str) -> Result<GitHubUser, GitHubError> {
        self.get_json(&format!("users/{login}")).await
    }

    pub async fn list_repositories(&self, owner: &str) -> Result<Vec<GitHubRepository>, GitHubError> {
        self.get_json(&format!("users/{owner}/repos")).await
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, GitHubError> {
        let url = self
            .base_url
            .join(path)
            .map_err(|e| GitHubError::Request(format!("invalid path '{path}': {e}")))?;

        let mut attempt = 0;
        loop {
            let error = match self.http.get(url.clone()).send().await {
                Ok(response) if response.status().is_success() => {
                    return response
                        .json::<T>()
                        .await
                        .map_err(|e| GitHubError::Decode(e.to_string()));
                }
                Ok(response) => {
                    let status = response.status();
                    let body = response.text().await.unwrap_or_default();
                    let error = GitHubError::Status { status, body };
                    if !is_transient(status) {
                        return Err(error);
                    }
                    error
                }
                Err(e) => GitHubError::Request(e.to_string()),
            };

            if attempt >= self.max_retries {
                warn!(url = %url, attempts = attempt + 1, error = %error, "GitHub request failed");
                return Err(error);
            }
            attempt += 1;
            debug!(url = %url, attempt, error = %error, "Retrying GitHub request");
            tokio::time::sleep(self.retry_delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> GitHubClient {
        GitHubClient::with_base_url(&server.uri())
            .unwrap()
            .with_retry_delay(Duration::from_millis(1))
    }

    #[tokio::test]
    async fn get_user_sends_default_headers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users/octocat"))
            .and(header("accept", GITHUB_ACCEPT))
            .and(header("user-agent", GITHUB_USER_AGENT))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": 583231,
                "login": "octocat",
                "name": "The Octocat",
                "public_repos": 8,
                "html_url": "https://github.com/octocat"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let user = client(&server).get_user("octocat").await.unwrap();
        assert_eq!(user.login, "octocat");
        assert_eq!(user.public_repos, 8);
    }

    #[tokio::test]
    async fn transient_errors_are_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users/octocat/repos"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/users/octocat/repos"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
                "id": 1,
                "name": "hello-world",
                "full_name": "octocat/hello-world",
                "html_url": "https://github.com/octocat/hello-world"
            }])))
            .mount(&server)
            .await;

        let repos = client(&server).list_repositories("octocat").await.unwrap();
        assert_eq!(repos.len(), 1);
        assert_eq!(repos[0].full_name, "octocat/hello-world");
    }

    #[tokio::test]
    async fn retries_stop_after_limit() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users/octocat"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .expect(u64::from(MAX_RETRIES) + 1)
            .mount(&server)
            .await;

        let err = client(&server).get_user("octocat").await.unwrap_err();
        assert!(matches!(
            err,
            GitHubError::Status { status, .. } if status == StatusCode::INTERNAL_SERVER_ERROR
        ));
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users/ghost"))
            .respond_with(ResponseTemplate::new(404).set_body_string("Not Found"))
            .expect(1)
            .mount(&server)
            .await;

        let err = client(&server).get_user("ghost").await.unwrap_err();
        match err {
            GitHubError::Status { status, body } => {
                assert_eq!(status, StatusCode::NOT_FOUND);
                assert_eq!(body, "Not Found");
            }
            other => panic!("expected status error, got {other:?}"),
        }
    }

    #[test]
    fn transient_statuses() {
        assert!(is_transient(StatusCode::REQUEST_TIMEOUT));
        assert!(is_transient(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_transient(StatusCode::BAD_GATEWAY));
        assert!(!is_transient(StatusCode::NOT_FOUND));
    }
}
