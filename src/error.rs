//! Error types for the release pipeline.

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for release operations.
#[derive(Error, Debug)]
pub enum Error {
    /// The working directory is not inside a git repository.
    #[error("Directory is not a Git repository.")]
    NotARepository,

    /// Git invocation failed.
    #[error("git operation failed: {0}")]
    Git(String),

    /// IO error while talking to a collaborator.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A precondition for releasing does not hold (tags, sync, commits).
    #[error("{0}")]
    Precondition(String),

    /// A release for the target tag already exists and overwrite was not requested.
    #[error("Release already exists:\n    - delete the existing release;\n    - or run \"release --overwrite\"")]
    ReleaseExists {
        /// URL of the existing release, when known.
        url: Option<String>,
    },

    /// The existing-release lookup failed.
    #[error("Couldn't check if release exists.")]
    ReleaseCheck,

    /// Creating or editing the remote release failed.
    #[error("Failed to upload release.")]
    Upload,

    /// GitHub API operation failed.
    #[error("GitHub operation failed: {0}")]
    GitHub(String),

    /// Authentication could not produce a usable token.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// The user-supplied changelog hook failed.
    #[error("release hook failed: {0}")]
    Hook(String),

    /// Plugin loading or validation failed.
    #[error("plugin error: {0}")]
    Plugin(String),

    /// The release record was used before the fields it depends on were set.
    #[error("{0}")]
    State(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Changelog template failed to render.
    #[error("failed to render changelog: {0}")]
    Template(String),

    /// Interactive classification failed.
    #[error("prompt failed: {0}")]
    Prompt(String),

    /// Version bump failed.
    #[error("failed to bump version in {path}: {reason}")]
    Bump { path: PathBuf, reason: String },
}

impl Error {
    /// Returns true when the error is an expected alternate outcome rather than a defect.
    pub fn is_expected_outcome(&self) -> bool {
        matches!(self, Error::ReleaseExists { .. })
    }

    /// Shorthand for a precondition failure.
    pub fn precondition(msg: impl Into<String>) -> Self {
        Error::Precondition(msg.into())
    }
}

/// Result type alias for release operations.
pub type Result<T> = std::result::Result<T, Error>;
