//! Commits collected between two release tags.

use serde::{Deserialize, Serialize};

use crate::version::is_release_marker;

/// A git identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct Person {
    pub name: String,
    pub email: String,
}

impl Person {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }
}

/// A commit in the release range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    /// Full commit hash.
    pub hash: String,
    /// First line of the message.
    pub title: String,
    /// Remainder of the message.
    pub description: String,
    /// Commit author.
    pub author: Person,
    /// Commit committer, when different from the author.
    pub committer: Option<Person>,
    /// Change category handle, once known.
    pub classification: Option<String>,
}

impl Commit {
    /// Creates an unclassified commit.
    pub fn new(
        hash: impl Into<String>,
        title: impl Into<String>,
        description: impl Into<String>,
        author: Person,
    ) -> Self {
        Self {
            hash: hash.into(),
            title: title.into(),
            description: description.into(),
            author,
            committer: None,
            classification: None,
        }
    }

    /// Sets the classification.
    pub fn classified(mut self, handle: impl Into<String>) -> Self {
        self.classification = Some(handle.into());
        self
    }

    /// Returns the first seven characters of the hash.
    pub fn short_hash(&self) -> &str {
        let end = self
            .hash
            .char_indices()
            .nth(7)
            .map(|(i, _)| i)
            .unwrap_or(self.hash.len());
        &self.hash[..end]
    }

    /// Returns the text used for the changelog entry: the title, or the first
    /// meaningful description line when the title is empty.
    pub fn message(&self) -> Option<String> {
        if !self.title.trim().is_empty() {
            return Some(self.title.clone());
        }

        self.description
            .lines()
            .map(|line| line.replacen("* ", "", 1))
            .map(|line| line.trim().to_string())
            .find(|line| line.len() > 1)
    }
}

/// Drops release marker commits (commits whose title is a version).
///
/// Applying the filter to its own output returns the same list.
pub fn skip_release_markers(commits: Vec<Commit>) -> Vec<Commit> {
    commits
        .into_iter()
        .filter(|commit| !is_release_marker(&commit.title))
        .collect()
}
