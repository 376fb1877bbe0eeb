//! Release configuration.
//!
//! Settings come from a TOML file in the repository (`release.toml` or
//! `.github/release.toml`), then command-line flags are applied on top.
//! Configuration is validated before the pipeline is built.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::changes::{default_change_types, ChangeType, IGNORE};
use crate::error::{Error, Result};

/// Locations searched for the configuration file, in order.
pub const CONFIG_PATHS: &[&str] = &["release.toml", ".github/release.toml"];

/// Handle of the labels-mode fallback section.
pub const FALLBACK_HANDLE: &str = "__fallback";

/// Validation result containing all found issues.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    /// List of validation errors (fatal).
    pub errors: Vec<String>,
    /// List of validation warnings (non-fatal).
    pub warnings: Vec<String>,
}

impl ValidationResult {
    /// Returns true if validation passed (no errors).
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }

    pub fn add_warning(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }

    /// Merges another validation result into this one.
    pub fn merge(&mut self, other: ValidationResult) {
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }

    /// Converts to a Result, failing if there are errors. Warnings are returned.
    pub fn into_result(self) -> Result<Vec<String>> {
        if self.is_valid() {
            Ok(self.warnings)
        } else {
            Err(Error::Config(self.errors.join("; ")))
        }
    }
}

/// Trait for validatable configuration types.
pub trait Validate {
    /// Validates the configuration and returns any issues found.
    fn validate(&self) -> ValidationResult;
}

/// How commits are classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Inline markers, then interactive prompting.
    #[default]
    Types,
    /// Labels of the pull request a commit references.
    Labels,
}

/// What to do with the release URL once published.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpenMode {
    /// Open the page in the default browser.
    #[default]
    Browser,
    /// Print the URL.
    Print,
}

/// A changelog section fed by a pull request label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelSection {
    /// Label name on the pull request.
    pub name: String,
    /// Heading; the label name when absent.
    #[serde(default)]
    pub title: Option<String>,
}

/// Labels-mode settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelsConfig {
    /// Sections in changelog order. The first matching label wins.
    #[serde(default)]
    pub labels: Vec<LabelSection>,
    /// Heading for commits without a matching label.
    #[serde(default = "default_fallback")]
    pub fallback: String,
}

fn default_fallback() -> String {
    "Misc".to_string()
}

impl Default for LabelsConfig {
    fn default() -> Self {
        Self {
            labels: Vec::new(),
            fallback: default_fallback(),
        }
    }
}

/// Browser authentication settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// OAuth application id.
    #[serde(default = "default_client_id")]
    pub client_id: String,
    /// Page the user authorizes the application on.
    #[serde(default = "default_authorize_url")]
    pub authorize_url: String,
    /// Endpoint polled for the token, with the `state` query parameter.
    #[serde(default = "default_token_url")]
    pub token_url: String,
    /// Maximum number of token polls.
    #[serde(default = "default_attempts")]
    pub attempts: u32,
    /// First poll delay in milliseconds.
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    /// Maximum poll delay in milliseconds.
    #[serde(default = "default_max_interval_ms")]
    pub max_interval_ms: u64,
}

fn default_client_id() -> String {
    "08bd4d4e3725ce1c0465".to_string()
}

fn default_authorize_url() -> String {
    "https://github.com/login/oauth/authorize".to_string()
}

fn default_token_url() -> String {
    "https://release-auth.zeit.sh".to_string()
}

fn default_attempts() -> u32 {
    500
}

fn default_interval_ms() -> u64 {
    500
}

fn default_max_interval_ms() -> u64 {
    5_000
}

impl AuthConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn max_interval(&self) -> Duration {
        Duration::from_millis(self.max_interval_ms)
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            client_id: default_client_id(),
            authorize_url: default_authorize_url(),
            token_url: default_token_url(),
            attempts: default_attempts(),
            interval_ms: default_interval_ms(),
            max_interval_ms: default_max_interval_ms(),
        }
    }
}

impl Validate for AuthConfig {
    fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        if self.attempts == 0 {
            result.add_error("auth.attempts must be at least 1");
        }
        if self.interval_ms > self.max_interval_ms {
            result.add_error("auth.interval_ms must not exceed auth.max_interval_ms");
        }
        if self.client_id.trim().is_empty() {
            result.add_error("auth.client_id cannot be empty");
        }
        if self.attempts > 2_000 {
            result.add_warning("auth.attempts over 2000 may keep the CLI waiting for hours");
        }

        result
    }
}

/// Settings for one release run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseConfig {
    /// Change categories in changelog order.
    #[serde(default = "default_change_types")]
    pub change_types: Vec<ChangeType>,
    #[serde(default)]
    pub mode: Mode,
    #[serde(default)]
    pub labels: LabelsConfig,
    /// Render a flat list without category headings or questions.
    #[serde(default)]
    pub skip_questions: bool,
    /// Changelog transform program.
    #[serde(default)]
    pub hook: Option<PathBuf>,
    /// Colon-separated plugin list.
    #[serde(default)]
    pub plugins: Option<String>,
    #[serde(default)]
    pub open: OpenMode,
    /// Changelog template overriding the built-in one.
    #[serde(default)]
    pub template: Option<String>,
    /// Revision tags are looked up from.
    #[serde(default = "default_rev")]
    pub rev: String,
    #[serde(default)]
    pub auth: AuthConfig,

    /// Mark the release as a prerelease (`--pre`).
    #[serde(skip)]
    pub pre: bool,
    /// Replace an existing release (`--overwrite`).
    #[serde(skip)]
    pub overwrite: bool,
    /// Publish instead of leaving a draft (`--publish`).
    #[serde(skip)]
    pub publish: bool,
    /// Repository directory.
    #[serde(skip)]
    pub working_dir: PathBuf,
}

fn default_rev() -> String {
    "HEAD".to_string()
}

impl Default for ReleaseConfig {
    fn default() -> Self {
        Self {
            change_types: default_change_types(),
            mode: Mode::default(),
            labels: LabelsConfig::default(),
            skip_questions: false,
            hook: None,
            plugins: None,
            open: OpenMode::default(),
            template: None,
            rev: default_rev(),
            auth: AuthConfig::default(),
            pre: false,
            overwrite: false,
            publish: false,
            working_dir: PathBuf::from("."),
        }
    }
}

impl ReleaseConfig {
    /// Finds the first configuration file under `dir`.
    pub fn discover(dir: &Path) -> Option<PathBuf> {
        CONFIG_PATHS
            .iter()
            .map(|candidate| dir.join(candidate))
            .find(|path| path.is_file())
    }

    /// Parses a configuration file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {}", path.display(), e)))?;
        toml::from_str(&text)
            .map_err(|e| Error::Config(format!("invalid {}: {}", path.display(), e)))
    }

    /// Loads `explicit` if given, else the discovered file, else defaults.
    pub fn load(dir: &Path, explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(path) => {
                let path = dir.join(path);
                if !path.is_file() {
                    return Err(Error::Config(format!(
                        "config file {} does not exist",
                        path.display()
                    )));
                }
                Some(path)
            }
            None => Self::discover(dir),
        };

        let mut config = match path {
            Some(path) => {
                tracing::debug!(path = %path.display(), "loading config file");
                Self::from_file(&path)?
            }
            None => Self::default(),
        };
        config.working_dir = dir.to_path_buf();
        Ok(config)
    }

    /// Categories commits are grouped into for the configured mode.
    pub fn categories(&self) -> Vec<ChangeType> {
        match self.mode {
            Mode::Types => self.change_types.clone(),
            Mode::Labels => self
                .labels
                .labels
                .iter()
                .map(|section| {
                    ChangeType::new(
                        section.name.clone(),
                        section.title.clone().unwrap_or_else(|| section.name.clone()),
                        "",
                    )
                })
                .chain(std::iter::once(ChangeType::new(
                    FALLBACK_HANDLE,
                    self.labels.fallback.clone(),
                    "",
                )))
                .collect(),
        }
    }
}

impl Validate for ReleaseConfig {
    fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        match self.mode {
            Mode::Types => {
                if self.change_types.is_empty() {
                    result.add_error("change_types cannot be empty");
                }
                let mut seen = HashSet::new();
                for change_type in &self.change_types {
                    if change_type.handle.trim().is_empty() {
                        result.add_error("change type handle cannot be empty");
                    } else if change_type.handle == IGNORE {
                        result.add_error(format!("change type handle '{}' is reserved", IGNORE));
                    } else if !seen.insert(change_type.handle.as_str()) {
                        result.add_error(format!(
                            "duplicate change type handle '{}'",
                            change_type.handle
                        ));
                    }
                }
            }
            Mode::Labels => {
                if self.labels.labels.is_empty() {
                    result.add_error("labels mode requires at least one label");
                }
                if self.labels.fallback.trim().is_empty() {
                    result.add_error("labels.fallback cannot be empty");
                }
                if self.skip_questions {
                    result.add_warning("skip_questions has no effect in labels mode");
                }
            }
        }

        if let Some(template) = &self.template {
            if template.trim().is_empty() {
                result.add_warning("template is empty, the built-in template is used");
            }
        }

        if self.rev.trim().is_empty() {
            result.add_error("rev cannot be empty");
        }

        result.merge(self.auth.validate());
        result
    }
}
