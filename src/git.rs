//! Version control queries.
//!
//! [`GitCli`] shells out to `git` in the repository directory.

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::DateTime;
use tokio::process::Command;

use crate::commit::{Commit, Person};
use crate::error::{Error, Result};
use crate::release::RepoId;
use crate::tag::Tag;

/// Repository queries the pipeline depends on.
#[async_trait]
pub trait Vcs: Send + Sync {
    /// Version tags reachable from `rev`, newest version first.
    async fn list_tags(&self, rev: &str) -> Result<Vec<Tag>>;

    /// Returns false when tracked files are modified or commits are not on any remote.
    ///
    /// Untracked files, stashes and the branch name are ignored.
    async fn is_synced(&self) -> Result<bool>;

    /// Commits in `range`, oldest first.
    async fn list_commits(&self, range: &str) -> Result<Vec<Commit>>;

    /// Hosted repository the `origin` remote points at.
    async fn repository(&self) -> Result<RepoId>;
}

/// [`Vcs`] backed by the git command line.
#[derive(Debug, Clone)]
pub struct GitCli {
    repo_path: PathBuf,
}

const FIELD: char = '\u{1f}';
const RECORD: char = '\u{1e}';

impl GitCli {
    pub fn new(repo_path: impl Into<PathBuf>) -> Self {
        Self {
            repo_path: repo_path.into(),
        }
    }

    async fn git(&self, args: &[&str]) -> Result<String> {
        tracing::debug!(args = ?args, "running git");
        let output = Command::new("git")
            .current_dir(&self.repo_path)
            .args(args)
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stderr.contains("not a git repository") {
                return Err(Error::NotARepository);
            }
            return Err(Error::Git(format!(
                "git {} failed: {}",
                args.join(" "),
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

fn parse_tag_line(line: &str) -> Option<Tag> {
    let mut fields = line.split('\t');
    let name = fields.next()?;
    let object = fields.next()?;
    let peeled = fields.next().unwrap_or_default();
    let date = fields.next().unwrap_or_default();

    // Annotated tags point at a tag object; the peeled hash is the commit.
    let hash = if peeled.is_empty() { object } else { peeled };
    let tag = Tag::from_name(name, hash).ok()?;
    Some(match DateTime::parse_from_rfc3339(date) {
        Ok(date) => tag.with_date(date),
        Err(_) => tag,
    })
}

fn parse_commit_record(record: &str) -> Option<Commit> {
    let mut fields = record.trim_start_matches('\n').splitn(7, FIELD);
    let hash = fields.next()?;
    let author = Person::new(fields.next()?, fields.next()?);
    let committer = Person::new(fields.next()?, fields.next()?);
    let title = fields.next()?;
    let description = fields.next().unwrap_or_default().trim();

    if hash.is_empty() {
        return None;
    }

    let mut commit = Commit::new(hash, title, description, author);
    if committer != commit.author {
        commit.committer = Some(committer);
    }
    Some(commit)
}

/// Extracts owner and name from a GitHub remote URL (https, ssh or scp-like).
pub fn parse_remote_url(url: &str) -> Option<RepoId> {
    let url = url.trim();
    let path = if let Some((_, rest)) = url.split_once("://") {
        // https://host/owner/name, ssh://git@host/owner/name
        rest.split_once('/')?.1
    } else {
        // git@host:owner/name
        url.split_once(':')?.1
    };

    let path = path.trim_end_matches('/').trim_end_matches(".git");
    let mut parts = path.split('/').filter(|part| !part.is_empty());
    let owner = parts.next()?;
    let name = parts.next()?;
    if parts.next().is_some() {
        return None;
    }
    Some(RepoId::new(owner, name))
}

#[async_trait]
impl Vcs for GitCli {
    async fn list_tags(&self, rev: &str) -> Result<Vec<Tag>> {
        let merged = format!("--merged={}", rev);
        let out = self
            .git(&[
                "for-each-ref",
                &merged,
                "--format=%(refname:strip=2)%09%(objectname)%09%(*objectname)%09%(creatordate:iso-strict)",
                "refs/tags",
            ])
            .await?;

        let mut tags: Vec<Tag> = out.lines().filter_map(parse_tag_line).collect();
        tags.sort_by(|a, b| b.version.cmp(&a.version));
        tracing::debug!(count = tags.len(), rev = %rev, "listed version tags");
        Ok(tags)
    }

    async fn is_synced(&self) -> Result<bool> {
        let status = self
            .git(&["status", "--porcelain", "--untracked-files=no"])
            .await?;
        if !status.trim().is_empty() {
            tracing::debug!("working tree has uncommitted changes");
            return Ok(false);
        }

        let ahead = self
            .git(&["rev-list", "--count", "HEAD", "--not", "--remotes"])
            .await?;
        let ahead: u64 = ahead
            .trim()
            .parse()
            .map_err(|_| Error::Git(format!("unexpected rev-list output: {}", ahead.trim())))?;
        if ahead > 0 {
            tracing::debug!(ahead, "commits not pushed to any remote");
        }
        Ok(ahead == 0)
    }

    async fn list_commits(&self, range: &str) -> Result<Vec<Commit>> {
        let out = self
            .git(&[
                "log",
                "--reverse",
                "--format=%H%x1f%an%x1f%ae%x1f%cn%x1f%ce%x1f%s%x1f%b%x1e",
                range,
            ])
            .await?;

        Ok(out.split(RECORD).filter_map(parse_commit_record).collect())
    }

    async fn repository(&self) -> Result<RepoId> {
        let url = self.git(&["remote", "get-url", "origin"]).await?;
        parse_remote_url(&url)
            .ok_or_else(|| Error::precondition("Could not determine GitHub repository."))
    }
}
