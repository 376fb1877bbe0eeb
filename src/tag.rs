//! Release tags: a version attached to a commit.

use std::sync::OnceLock;

use chrono::{DateTime, FixedOffset};
use regex::Regex;
use semver::Version;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::version::parse_version;

fn hash_pattern() -> &'static Regex {
    static HASH: OnceLock<Regex> = OnceLock::new();
    HASH.get_or_init(|| Regex::new(r"^[0-9a-f]{7,40}$").expect("static regex"))
}

/// A version tag pointing at a commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    /// Semantic version carried by the tag.
    pub version: Version,
    /// Commit hash the tag points at.
    pub hash: String,
    /// Whether the tag name is spelled with a leading `v`.
    pub has_prefix: bool,
    /// Commit date, when known.
    pub date: Option<DateTime<FixedOffset>>,
}

impl Tag {
    /// Creates a tag, validating the commit hash.
    pub fn new(version: Version, hash: impl Into<String>, has_prefix: bool) -> Result<Self> {
        let hash = hash.into();
        if !hash_pattern().is_match(&hash) {
            return Err(Error::State(format!("\"{}\" is an invalid sha1 hash", hash)));
        }

        Ok(Self {
            version,
            hash,
            has_prefix,
            date: None,
        })
    }

    /// Creates a tag from its git name (`v1.2.3` or `1.2.3`).
    pub fn from_name(name: &str, hash: impl Into<String>) -> Result<Self> {
        let version = parse_version(name)
            .ok_or_else(|| Error::State(format!("\"{}\" is not a semantic version.", name)))?;
        Self::new(version, hash, name.trim().starts_with('v'))
    }

    /// Attaches the commit date.
    pub fn with_date(mut self, date: DateTime<FixedOffset>) -> Self {
        self.date = Some(date);
        self
    }

    /// Returns the tag name as it appears in git.
    pub fn name(&self) -> String {
        if self.has_prefix {
            format!("v{}", self.version)
        } else {
            self.version.to_string()
        }
    }

    /// Returns true if the tag is a prerelease version.
    pub fn is_prerelease(&self) -> bool {
        !self.version.pre.is_empty()
    }
}
