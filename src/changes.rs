//! Change categories and commit classification helpers.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::commit::Commit;
use crate::version::Bump;

/// Handle reserved for commits that should not appear in the changelog.
pub const IGNORE: &str = "ignore";

/// A change category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeType {
    /// Short handle, also the inline marker: `(handle)`.
    pub handle: String,
    /// Heading name.
    pub name: String,
    /// Description shown when prompting.
    #[serde(default)]
    pub description: String,
}

impl ChangeType {
    pub fn new(
        handle: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            handle: handle.into(),
            name: name.into(),
            description: description.into(),
        }
    }
}

/// The semver taxonomy used when no other is configured.
pub fn default_change_types() -> Vec<ChangeType> {
    vec![
        ChangeType::new("major", "Major Change", "incompatible API change"),
        ChangeType::new("minor", "Minor Change", "backwards-compatible functionality"),
        ChangeType::new("patch", "Patch", "backwards-compatible bug fix"),
    ]
}

/// Commits sharing one category, in category order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeGroup {
    pub change_type: ChangeType,
    pub commits: Vec<Commit>,
}

/// Partitions classified, non-ignored commits by category.
///
/// Groups follow `types` order; empty groups are dropped.
pub fn group_by_type(commits: &[Commit], types: &[ChangeType]) -> Vec<ChangeGroup> {
    types
        .iter()
        .map(|change_type| ChangeGroup {
            change_type: change_type.clone(),
            commits: commits
                .iter()
                .filter(|commit| commit.classification.as_deref() == Some(&change_type.handle))
                .cloned()
                .collect(),
        })
        .filter(|group| !group.commits.is_empty())
        .collect()
}

/// Finds an inline `(handle)` marker for one of `types` or `(ignore)`.
pub fn inline_marker(text: &str, types: &[ChangeType]) -> Option<String> {
    types
        .iter()
        .map(|t| t.handle.as_str())
        .chain(std::iter::once(IGNORE))
        .find(|handle| text.contains(&format!("({})", handle)))
        .map(str::to_string)
}

/// Looks for an inline marker in the commit title, then its description.
pub fn commit_marker(commit: &Commit, types: &[ChangeType]) -> Option<String> {
    inline_marker(&commit.title, types).or_else(|| inline_marker(&commit.description, types))
}

fn reference_pattern() -> &'static Regex {
    static REFERENCE: OnceLock<Regex> = OnceLock::new();
    REFERENCE.get_or_init(|| Regex::new(r" \(#(\d+)\)").expect("static regex"))
}

/// Extracts a pull request reference such as ` (#42)` from a title.
pub fn pull_request_reference(title: &str) -> Option<u64> {
    reference_pattern()
        .captures(title)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Removes category markers and pull request references, capitalizes and trims.
pub fn clean_title(title: &str, types: &[ChangeType]) -> String {
    let mut cleaned = title.to_string();

    if let Some(handle) = inline_marker(&cleaned, types) {
        cleaned = cleaned.replacen(&format!("({})", handle), "", 1);
    }
    cleaned = reference_pattern().replace(&cleaned, "").into_owned();

    let trimmed = cleaned.trim();
    let mut chars = trimmed.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Categories offered when prompting, narrowed by the release bump.
///
/// For the semver taxonomy a minor release cannot contain major changes and
/// a patch release cannot contain major or minor ones.
pub fn choices_for(types: &[ChangeType], bump: Option<Bump>) -> Vec<ChangeType> {
    let is_semver = types.len() == 3
        && types.iter().map(|t| t.handle.as_str()).eq(["major", "minor", "patch"]);
    if !is_semver {
        return types.to_vec();
    }

    let skip = match bump {
        Some(Bump::Minor) => 1,
        Some(Bump::Patch) => 2,
        _ => 0,
    };
    types[skip..].to_vec()
}
