//! Release hosting service.
//!
//! [`GitHubClient`] talks to the GitHub REST API with a token.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderValue, ACCEPT};
use reqwest::{Client, Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::release::{ReleasePayload, RemoteRelease, RepoId};

/// Public GitHub API.
pub const API_BASE: &str = "https://api.github.com";

/// A pull request as far as changelogs care.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequest {
    pub number: u64,
    /// Login of the author.
    pub author: Option<String>,
    /// Label names.
    pub labels: Vec<String>,
}

/// Remote operations the pipeline depends on.
#[async_trait]
pub trait ReleaseHost: Send + Sync {
    /// Releases of `repo`, drafts included.
    async fn list_releases(&self, repo: &RepoId) -> Result<Vec<RemoteRelease>>;

    async fn create_release(&self, repo: &RepoId, payload: &ReleasePayload) -> Result<RemoteRelease>;

    async fn edit_release(
        &self,
        repo: &RepoId,
        id: u64,
        payload: &ReleasePayload,
    ) -> Result<RemoteRelease>;

    async fn pull_request(&self, repo: &RepoId, number: u64) -> Result<PullRequest>;

    /// Logins of the author and committer of a commit, when linked to accounts.
    async fn commit_authors(&self, repo: &RepoId, sha: &str) -> Result<Vec<String>>;

    /// Login of the authenticated user.
    async fn current_user(&self) -> Result<String>;
}

#[derive(Deserialize)]
struct User {
    login: String,
}

#[derive(Deserialize)]
struct Label {
    name: String,
}

#[derive(Deserialize)]
struct RawPullRequest {
    number: u64,
    user: Option<User>,
    #[serde(default)]
    labels: Vec<Label>,
}

#[derive(Deserialize)]
struct RawCommit {
    author: Option<User>,
    committer: Option<User>,
}

fn http_error(e: reqwest::Error) -> Error {
    Error::GitHub(format!("HTTP request failed: {}", e))
}

/// [`ReleaseHost`] backed by the GitHub REST API.
#[derive(Debug, Clone)]
pub struct GitHubClient {
    client: Client,
    base_url: String,
    token: String,
}

impl GitHubClient {
    pub fn new(token: impl Into<String>) -> Result<Self> {
        Self::with_base_url(API_BASE, token)
    }

    /// Targets another API root, such as GitHub Enterprise.
    pub fn with_base_url(base_url: impl Into<String>, token: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(format!("release-pilot/{}", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(http_error)?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.base_url, path))
            .bearer_auth(&self.token)
            .header(ACCEPT, HeaderValue::from_static("application/vnd.github+json"))
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = request.send().await.map_err(http_error)?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::GitHub(format!(
                "API error: HTTP {}: {}",
                status.as_u16(),
                body.trim()
            )));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| Error::GitHub(format!("invalid response: {}", e)))
    }

    /// Returns true if the token is accepted by the API.
    pub async fn validate_token(&self) -> bool {
        match self.current_user().await {
            Ok(login) => {
                tracing::debug!(login = %login, "token is valid");
                true
            }
            Err(e) => {
                tracing::debug!(error = %e, "token rejected");
                false
            }
        }
    }
}

#[async_trait]
impl ReleaseHost for GitHubClient {
    async fn list_releases(&self, repo: &RepoId) -> Result<Vec<RemoteRelease>> {
        let path = format!("/repos/{}/releases?per_page=100", repo);
        self.send(self.request(Method::GET, &path)).await
    }

    async fn create_release(&self, repo: &RepoId, payload: &ReleasePayload) -> Result<RemoteRelease> {
        let path = format!("/repos/{}/releases", repo);
        self.send(self.request(Method::POST, &path).json(payload))
            .await
    }

    async fn edit_release(
        &self,
        repo: &RepoId,
        id: u64,
        payload: &ReleasePayload,
    ) -> Result<RemoteRelease> {
        let path = format!("/repos/{}/releases/{}", repo, id);
        self.send(self.request(Method::PATCH, &path).json(payload))
            .await
    }

    async fn pull_request(&self, repo: &RepoId, number: u64) -> Result<PullRequest> {
        let path = format!("/repos/{}/pulls/{}", repo, number);
        let raw: RawPullRequest = self.send(self.request(Method::GET, &path)).await?;
        Ok(PullRequest {
            number: raw.number,
            author: raw.user.map(|u| u.login),
            labels: raw.labels.into_iter().map(|l| l.name).collect(),
        })
    }

    async fn commit_authors(&self, repo: &RepoId, sha: &str) -> Result<Vec<String>> {
        let path = format!("/repos/{}/commits/{}", repo, sha);
        let raw: RawCommit = self.send(self.request(Method::GET, &path)).await?;
        Ok([raw.author, raw.committer]
            .into_iter()
            .flatten()
            .map(|u| u.login)
            .collect())
    }

    async fn current_user(&self) -> Result<String> {
        let user: User = self.send(self.request(Method::GET, "/user")).await?;
        Ok(user.login)
    }
}
