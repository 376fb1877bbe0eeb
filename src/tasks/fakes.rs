//! In-memory collaborators for task tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::Context;
use crate::changelog::TemplateRenderer;
use crate::commit::{Commit, Person};
use crate::config::ReleaseConfig;
use crate::error::{Error, Result};
use crate::git::Vcs;
use crate::github::{PullRequest, ReleaseHost};
use crate::open::PrintOpener;
use crate::progress::{Buffer, Progress};
use crate::prompt::{OnAnswer, Prompter, Question};
use crate::release::{ReleasePayload, RemoteRelease, RepoId};
use crate::tag::Tag;

pub(crate) struct FakeVcs {
    pub tags: Vec<Tag>,
    pub commits: Vec<Commit>,
    pub synced: bool,
    pub ranges: Mutex<Vec<String>>,
}

impl FakeVcs {
    /// `v1.0.1` on top of `v1.0.0` with three commits, one marked major.
    pub fn two_tags() -> Self {
        let ada = Person::new("Ada", "ada@example.com");
        let bob = Person::new("Bob", "bob@example.com");
        Self {
            tags: vec![
                Tag::from_name("v1.0.1", "bbbbbbb").unwrap(),
                Tag::from_name("v1.0.0", "aaaaaaa").unwrap(),
            ],
            commits: vec![
                Commit::new("1111111", "Drop the old API (major)", "", ada.clone()),
                Commit::new("2222222", "Add a flag (#12)", "", bob),
                Commit::new("3333333", "Fix a typo", "", ada),
            ],
            synced: true,
            ranges: Mutex::new(Vec::new()),
        }
    }

    pub fn with_commits(mut self, commits: Vec<Commit>) -> Self {
        self.commits = commits;
        self
    }
}

#[async_trait]
impl Vcs for FakeVcs {
    async fn list_tags(&self, _rev: &str) -> Result<Vec<Tag>> {
        Ok(self.tags.clone())
    }

    async fn is_synced(&self) -> Result<bool> {
        Ok(self.synced)
    }

    async fn list_commits(&self, range: &str) -> Result<Vec<Commit>> {
        self.ranges.lock().unwrap().push(range.to_string());
        Ok(self.commits.clone())
    }

    async fn repository(&self) -> Result<RepoId> {
        Ok(RepoId::new("octo", "widgets"))
    }
}

#[derive(Default)]
pub(crate) struct FakeHost {
    pub releases: Vec<RemoteRelease>,
    pub pulls: HashMap<u64, PullRequest>,
    pub authors: HashMap<String, Vec<String>>,
    pub user: String,
    pub fail_listing: bool,
    pub fail_upload: bool,
    created: Mutex<Vec<ReleasePayload>>,
    edited: Mutex<Vec<(u64, ReleasePayload)>>,
    author_lookups: Mutex<Vec<String>>,
}

impl FakeHost {
    pub fn created(&self) -> Vec<ReleasePayload> {
        self.created.lock().unwrap().clone()
    }

    pub fn edited(&self) -> Vec<(u64, ReleasePayload)> {
        self.edited.lock().unwrap().clone()
    }

    pub fn author_lookups(&self) -> Vec<String> {
        self.author_lookups.lock().unwrap().clone()
    }

    fn stored(&self, id: u64, payload: &ReleasePayload) -> RemoteRelease {
        RemoteRelease {
            id,
            tag_name: payload.tag_name.clone(),
            name: payload.name.clone(),
            draft: payload.draft,
            prerelease: payload.prerelease,
            url: Some(format!(
                "https://github.com/octo/widgets/releases/tag/{}",
                payload.tag_name
            )),
        }
    }
}

#[async_trait]
impl ReleaseHost for FakeHost {
    async fn list_releases(&self, _repo: &RepoId) -> Result<Vec<RemoteRelease>> {
        if self.fail_listing {
            return Err(Error::GitHub("503 Service Unavailable".to_string()));
        }
        Ok(self.releases.clone())
    }

    async fn create_release(&self, _repo: &RepoId, payload: &ReleasePayload) -> Result<RemoteRelease> {
        if self.fail_upload {
            return Err(Error::GitHub("422 Unprocessable Entity".to_string()));
        }
        self.created.lock().unwrap().push(payload.clone());
        Ok(self.stored(1, payload))
    }

    async fn edit_release(
        &self,
        _repo: &RepoId,
        id: u64,
        payload: &ReleasePayload,
    ) -> Result<RemoteRelease> {
        if self.fail_upload {
            return Err(Error::GitHub("422 Unprocessable Entity".to_string()));
        }
        self.edited.lock().unwrap().push((id, payload.clone()));
        Ok(self.stored(id, payload))
    }

    async fn pull_request(&self, _repo: &RepoId, number: u64) -> Result<PullRequest> {
        self.pulls
            .get(&number)
            .cloned()
            .ok_or_else(|| Error::GitHub(format!("pull request #{} not found", number)))
    }

    async fn commit_authors(&self, _repo: &RepoId, sha: &str) -> Result<Vec<String>> {
        self.author_lookups.lock().unwrap().push(sha.to_string());
        self.authors
            .get(sha)
            .cloned()
            .ok_or_else(|| Error::GitHub(format!("commit {} not found", sha)))
    }

    async fn current_user(&self) -> Result<String> {
        Ok(self.user.clone())
    }
}

/// Answers questions from a fixed script.
pub(crate) struct ScriptedPrompter {
    answers: Vec<String>,
    pub asked: Mutex<Vec<Question>>,
}

impl ScriptedPrompter {
    pub fn new(answers: &[&str]) -> Self {
        Self {
            answers: answers.iter().map(|a| a.to_string()).collect(),
            asked: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl Prompter for ScriptedPrompter {
    async fn ask(&self, questions: &[Question], on_answer: OnAnswer<'_>) -> Result<Vec<String>> {
        self.asked.lock().unwrap().extend_from_slice(questions);
        if questions.len() > self.answers.len() {
            return Err(Error::Prompt("ran out of scripted answers".to_string()));
        }
        for (index, answer) in self.answers.iter().take(questions.len()).enumerate() {
            on_answer(index, answer.as_str());
        }
        Ok(self.answers[..questions.len()].to_vec())
    }
}

pub(crate) struct Harness {
    pub ctx: Context,
    pub host: Arc<FakeHost>,
    pub vcs: Arc<FakeVcs>,
    pub prompter: Arc<ScriptedPrompter>,
    pub output: Buffer,
}

pub(crate) fn harness(vcs: FakeVcs, host: FakeHost, answers: &[&str]) -> Harness {
    let (progress, output) = Progress::buffered();
    let host = Arc::new(host);
    let vcs = Arc::new(vcs);
    let prompter = Arc::new(ScriptedPrompter::new(answers));
    let ctx = Context::new(
        ReleaseConfig::default(),
        vcs.clone(),
        host.clone(),
        prompter.clone(),
        Arc::new(TemplateRenderer::new()),
        Arc::new(PrintOpener::new(progress.clone())),
        progress,
    );
    Harness {
        ctx,
        host,
        vcs,
        prompter,
        output,
    }
}
