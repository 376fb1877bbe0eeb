//! GitHub token acquisition.
//!
//! The token comes from the environment, then from the token cache in the
//! user configuration directory, then from a browser authorization flow that
//! polls the token endpoint until the user has approved the application.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::backoff::ExponentialBackoff;
use crate::config::AuthConfig;
use crate::error::{Error, Result};
use crate::github::GitHubClient;
use crate::open::UrlOpener;
use crate::progress::Progress;

/// Environment variables checked for a token, in order.
pub const TOKEN_ENV: &[&str] = &["GITHUB_TOKEN", "GH_TOKEN"];

/// Persistent token cache.
pub trait TokenStore: Send + Sync {
    fn load(&self) -> Result<Option<String>>;
    fn save(&self, token: &str) -> Result<()>;
    fn clear(&self) -> Result<()>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoredSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    token: Option<String>,
}

/// Token cache kept in a TOML file.
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<config dir>/<package name>/config.toml`.
    pub fn user_default() -> Result<Self> {
        let dir = dirs::config_dir()
            .ok_or_else(|| Error::Auth("cannot locate the user config directory".to_string()))?;
        Ok(Self::new(
            dir.join(env!("CARGO_PKG_NAME")).join("config.toml"),
        ))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write(&self, settings: &StoredSettings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let text = toml::to_string(settings).map_err(|e| Error::Auth(e.to_string()))?;
        std::fs::write(&self.path, text)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o600))?;
        }
        Ok(())
    }
}

impl TokenStore for FileTokenStore {
    fn load(&self) -> Result<Option<String>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let text = std::fs::read_to_string(&self.path)?;
        let settings: StoredSettings = toml::from_str(&text).map_err(|e| {
            Error::Auth(format!("invalid token cache {}: {}", self.path.display(), e))
        })?;
        Ok(settings.token.filter(|token| !token.trim().is_empty()))
    }

    fn save(&self, token: &str) -> Result<()> {
        self.write(&StoredSettings {
            token: Some(token.to_string()),
        })
    }

    fn clear(&self) -> Result<()> {
        self.write(&StoredSettings::default())
    }
}

/// Waits between polls.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Sleeps on the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Token endpoint of the authorization flow.
#[async_trait]
pub trait TokenEndpoint: Send + Sync {
    /// Returns the token once the user approved the request identified by `state`.
    async fn poll(&self, state: &str) -> Result<Option<String>>;
}

#[derive(Deserialize)]
struct TokenResponse {
    token: Option<String>,
    error: Option<String>,
}

/// [`TokenEndpoint`] queried over HTTP with a `state` parameter.
#[derive(Debug, Clone)]
pub struct HttpTokenEndpoint {
    client: reqwest::Client,
    url: String,
}

impl HttpTokenEndpoint {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl TokenEndpoint for HttpTokenEndpoint {
    async fn poll(&self, state: &str) -> Result<Option<String>> {
        let response = self
            .client
            .get(&self.url)
            .query(&[("state", state)])
            .send()
            .await
            .map_err(|e| Error::Auth(e.to_string()))?;

        if !response.status().is_success() {
            tracing::debug!(status = %response.status(), "token not ready");
            return Ok(None);
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| Error::Auth(e.to_string()))?;
        if let Some(error) = body.error {
            tracing::debug!(error = %error, "token endpoint reported an error");
            return Ok(None);
        }
        Ok(body.token.filter(|token| !token.is_empty()))
    }
}

/// Checks that a token is still accepted.
#[async_trait]
pub trait TokenValidator: Send + Sync {
    async fn is_valid(&self, token: &str) -> bool;
}

/// Validates tokens against the GitHub API.
#[derive(Debug, Clone)]
pub struct GitHubTokenValidator {
    base_url: String,
}

impl GitHubTokenValidator {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl TokenValidator for GitHubTokenValidator {
    async fn is_valid(&self, token: &str) -> bool {
        match GitHubClient::with_base_url(self.base_url.clone(), token) {
            Ok(client) => client.validate_token().await,
            Err(e) => {
                tracing::debug!(error = %e, "cannot build client to validate token");
                false
            }
        }
    }
}

/// Polls the token endpoint within an attempt budget.
pub struct TokenPoller<'a> {
    endpoint: &'a dyn TokenEndpoint,
    sleeper: &'a dyn Sleeper,
    backoff: ExponentialBackoff,
}

impl<'a> TokenPoller<'a> {
    pub fn new(
        endpoint: &'a dyn TokenEndpoint,
        sleeper: &'a dyn Sleeper,
        backoff: ExponentialBackoff,
    ) -> Self {
        Self {
            endpoint,
            sleeper,
            backoff,
        }
    }

    /// Polls until a token arrives or the budget is spent.
    pub async fn poll(mut self, state: &str) -> Result<String> {
        loop {
            match self.endpoint.poll(state).await {
                Ok(Some(token)) => {
                    tracing::debug!(attempt = self.backoff.used() + 1, "received token");
                    return Ok(token);
                }
                Ok(None) => {}
                Err(e) => tracing::debug!(error = %e, "token poll failed"),
            }

            match self.backoff.next_delay() {
                Some(delay) => self.sleeper.sleep(delay).await,
                None => break,
            }
        }

        Err(Error::Auth(format!(
            "Couldn't load token after {} attempts.",
            self.backoff.used()
        )))
    }
}

/// Authorization page URL for `state`.
pub fn authorize_url(config: &AuthConfig, state: &str) -> Result<String> {
    let url = reqwest::Url::parse_with_params(
        &config.authorize_url,
        &[
            ("client_id", config.client_id.as_str()),
            ("scope", "repo"),
            ("state", state),
        ],
    )
    .map_err(|e| Error::Config(format!("invalid auth.authorize_url: {}", e)))?;
    Ok(url.into())
}

/// Resolves the token used for the hosting service.
pub struct Authenticator {
    config: AuthConfig,
    store: Box<dyn TokenStore>,
    endpoint: Box<dyn TokenEndpoint>,
    validator: Box<dyn TokenValidator>,
    sleeper: Box<dyn Sleeper>,
    opener: Arc<dyn UrlOpener>,
    progress: Progress,
}

impl Authenticator {
    /// Production wiring: HTTP token endpoint, GitHub validation, tokio timer.
    pub fn new(
        config: AuthConfig,
        store: Box<dyn TokenStore>,
        opener: Arc<dyn UrlOpener>,
        progress: Progress,
    ) -> Self {
        let endpoint = HttpTokenEndpoint::new(config.token_url.clone());
        Self {
            config,
            store,
            endpoint: Box::new(endpoint),
            validator: Box::new(GitHubTokenValidator::new(crate::github::API_BASE)),
            sleeper: Box::new(TokioSleeper),
            opener,
            progress,
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl TokenEndpoint + 'static) -> Self {
        self.endpoint = Box::new(endpoint);
        self
    }

    pub fn with_validator(mut self, validator: impl TokenValidator + 'static) -> Self {
        self.validator = Box::new(validator);
        self
    }

    pub fn with_sleeper(mut self, sleeper: impl Sleeper + 'static) -> Self {
        self.sleeper = Box::new(sleeper);
        self
    }

    /// Returns a token from `env`, the cache or the browser flow, in that order.
    pub async fn token<E>(&self, env: E) -> Result<String>
    where
        E: Fn(&str) -> Option<String>,
    {
        let from_env = TOKEN_ENV
            .iter()
            .find_map(|name| env(name).filter(|token| !token.trim().is_empty()));
        if let Some(token) = from_env {
            tracing::debug!("using token from the environment");
            return Ok(token);
        }

        if let Some(token) = self.store.load()? {
            if self.validator.is_valid(&token).await {
                return Ok(token);
            }
            tracing::debug!("cached token is no longer valid");
            self.store.clear()?;
        }

        let token = self.request_token().await?;
        self.store.save(&token)?;
        Ok(token)
    }

    async fn request_token(&self) -> Result<String> {
        let state = Uuid::new_v4().simple().to_string();
        let url = authorize_url(&self.config, &state)?;

        self.progress.info("Opening GitHub authentication page");
        if let Err(e) = self.opener.open(&url).await {
            tracing::debug!(error = %e, "cannot open browser");
            self.progress.log(format!("Authorize the application at {}", url));
        }

        let backoff = ExponentialBackoff::new(
            self.config.interval(),
            self.config.max_interval(),
            self.config.attempts,
        );
        let poller = TokenPoller::new(self.endpoint.as_ref(), self.sleeper.as_ref(), backoff);
        self.progress
            .track("Waiting for GitHub authorization", poller.poll(&state))
            .await
    }
}
