//! The in-progress release record shared by every pipeline task.
//!
//! Fields are populated once, in pipeline order: repository and tags first,
//! then commits, groups, credits, the rendered body and finally the remote
//! release returned by the hosting service.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};

use crate::changes::ChangeGroup;
use crate::commit::Commit;
use crate::error::{Error, Result};
use crate::tag::Tag;
use crate::version::Bump;

/// Owner and name of a hosted repository.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepoId {
    pub owner: String,
    pub name: String,
}

impl RepoId {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for RepoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// A release as stored by the hosting service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteRelease {
    pub id: u64,
    pub tag_name: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub draft: bool,
    #[serde(default)]
    pub prerelease: bool,
    #[serde(rename = "html_url", default)]
    pub url: Option<String>,
}

/// Body sent to the hosting service to create or edit a release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleasePayload {
    pub tag_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_commitish: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    pub draft: bool,
    pub prerelease: bool,
}

/// The release being prepared.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Release {
    /// Repository the release belongs to.
    pub repo: Option<RepoId>,
    /// Tag being released.
    target: Option<Tag>,
    /// Tag of the previous release.
    previous: Option<Tag>,
    /// Commits in the release range, oldest first.
    pub commits: Vec<Commit>,
    /// Classified commits grouped by category.
    pub changes: Vec<ChangeGroup>,
    /// Contributor logins, deduplicated, in discovery order.
    credits: Vec<String>,
    /// Rendered changelog.
    pub body: Option<String>,
    /// Existing or newly published remote release.
    pub remote: Option<RemoteRelease>,
    /// Prerelease override (`--pre`).
    pub pre: Option<bool>,
    /// Draft override (`--publish` sets it to false).
    pub draft: Option<bool>,
    /// Actions plugins asked to skip.
    suppressed: BTreeSet<String>,
}

impl Release {
    /// Creates an empty release record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the target and previous tags. Tags are set once per run.
    pub fn set_tags(&mut self, target: Tag, previous: Tag) -> Result<()> {
        if self.target.is_some() || self.previous.is_some() {
            return Err(Error::State("The release tags are already set.".to_string()));
        }
        self.target = Some(target);
        self.previous = Some(previous);
        Ok(())
    }

    /// Tag being released.
    pub fn target(&self) -> Option<&Tag> {
        self.target.as_ref()
    }

    /// Tag of the previous release.
    pub fn previous(&self) -> Option<&Tag> {
        self.previous.as_ref()
    }

    /// Remote release id, when the release exists remotely.
    pub fn id(&self) -> Option<u64> {
        self.remote.as_ref().map(|r| r.id)
    }

    /// Remote release name.
    pub fn name(&self) -> Option<&str> {
        self.remote.as_ref().and_then(|r| r.name.as_deref())
    }

    /// Name of the tag being released.
    pub fn tag_name(&self) -> Option<String> {
        self.target.as_ref().map(Tag::name)
    }

    /// Commit the release tag points at.
    pub fn target_commitish(&self) -> Option<&str> {
        self.target.as_ref().map(|t| t.hash.as_str())
    }

    /// Draft state: explicit override, then remote state, then draft.
    pub fn is_draft(&self) -> bool {
        self.draft
            .or_else(|| self.remote.as_ref().map(|r| r.draft))
            .unwrap_or(true)
    }

    /// Prerelease state: explicit override, then remote state, then the target version.
    pub fn is_prerelease(&self) -> bool {
        self.pre
            .or_else(|| self.remote.as_ref().map(|r| r.prerelease))
            .unwrap_or_else(|| self.target.as_ref().is_some_and(Tag::is_prerelease))
    }

    fn tags(&self) -> Result<(&Tag, &Tag)> {
        let target = self
            .target
            .as_ref()
            .ok_or_else(|| Error::State("The release tag is not set.".to_string()))?;
        let previous = self
            .previous
            .as_ref()
            .ok_or_else(|| Error::State("The previous release tag is not set.".to_string()))?;
        Ok((target, previous))
    }

    /// Commit range of the release: `<previous tag>..<target hash>`.
    pub fn range(&self) -> Result<String> {
        let (target, previous) = self.tags()?;
        Ok(format!("{}..{}", previous.name(), target.hash))
    }

    /// Version bump between the previous and the target tag.
    pub fn bump(&self) -> Result<Option<Bump>> {
        let (target, previous) = self.tags()?;
        Ok(Bump::between(&target.version, &previous.version))
    }

    /// Body for the hosting service.
    pub fn payload(&self) -> Result<ReleasePayload> {
        let tag_name = self.tag_name().ok_or_else(|| {
            Error::State("Cannot create/edit a release without a tag name.".to_string())
        })?;
        if self.repo.is_none() {
            return Err(Error::State(
                "Cannot create/edit a release without a repo or a repo owner.".to_string(),
            ));
        }

        Ok(ReleasePayload {
            tag_name,
            target_commitish: self.target_commitish().map(str::to_string),
            name: self.name().map(str::to_string),
            body: self.body.clone(),
            draft: self.is_draft(),
            prerelease: self.is_prerelease(),
        })
    }

    /// Release page URL; the edit page when `edit` is set.
    pub fn url(&self, edit: bool) -> Option<String> {
        let url = self.remote.as_ref()?.url.as_ref()?;
        if edit {
            Some(url.replace("/tag/", "/edit/"))
        } else {
            Some(url.clone())
        }
    }

    /// Contributor logins.
    pub fn credits(&self) -> &[String] {
        &self.credits
    }

    /// Adds a contributor unless already credited.
    pub fn add_credit(&mut self, login: impl Into<String>) {
        let login = login.into();
        if !self.credits.contains(&login) {
            self.credits.push(login);
        }
    }

    /// Removes a contributor.
    pub fn remove_credit(&mut self, login: &str) {
        self.credits.retain(|l| l != login);
    }

    /// Marks a named action as not required for this run.
    pub fn suppress(&mut self, action: impl Into<String>) {
        self.suppressed.insert(action.into());
    }

    /// Returns true if a plugin suppressed the action.
    pub fn is_suppressed(&self, action: &str) -> bool {
        self.suppressed.contains(action)
    }
}

/// Handle to the single release record of a pipeline run.
///
/// Cloning the handle shares the record. Accessors take closures so the lock
/// is never held across an `.await`.
#[derive(Debug, Clone, Default)]
pub struct SharedRelease(Arc<Mutex<Release>>);

impl SharedRelease {
    /// Wraps a release record.
    pub fn new(release: Release) -> Self {
        Self(Arc::new(Mutex::new(release)))
    }

    /// Reads the record.
    pub fn read<R>(&self, f: impl FnOnce(&Release) -> R) -> R {
        let guard = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        f(&guard)
    }

    /// Mutates the record.
    pub fn write<R>(&self, f: impl FnOnce(&mut Release) -> R) -> R {
        let mut guard = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    /// Returns a copy of the record.
    pub fn snapshot(&self) -> Release {
        self.read(Release::clone)
    }

    /// Returns true if both handles point at the same record.
    pub fn ptr_eq(&self, other: &SharedRelease) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}
