//! Commit classification and grouping.

use std::sync::Arc;

use super::Context;
use crate::changes::{choices_for, group_by_type, pull_request_reference, ChangeType, IGNORE};
use crate::config::{Mode, FALLBACK_HANDLE};
use crate::error::Result;
use crate::github::ReleaseHost;
use crate::pipeline::{tap, BoxTask};
use crate::progress::Progress;
use crate::prompt::{type_choices, Prompter, Question};
use crate::release::{RepoId, SharedRelease};

/// Classifies every commit that has no category yet.
///
/// In types mode the user is asked, in one session, about each unmarked
/// commit. In labels mode the labels of the referenced pull request decide.
/// Flat changelogs skip classification.
pub fn prompt_types(ctx: &Context) -> Result<BoxTask> {
    if ctx.config.skip_questions {
        return Ok(tap(|_release: SharedRelease| async { Ok(()) }));
    }

    match ctx.config.mode {
        Mode::Types => Ok(ask_types(
            Arc::clone(&ctx.prompter),
            ctx.progress.clone(),
            Arc::new(ctx.config.change_types.clone()),
        )),
        Mode::Labels => Ok(classify_by_labels(
            Arc::clone(&ctx.host),
            Arc::new(ctx.config.categories()),
        )),
    }
}

fn ask_types(
    prompter: Arc<dyn Prompter>,
    progress: Progress,
    types: Arc<Vec<ChangeType>>,
) -> BoxTask {
    tap(move |release: SharedRelease| {
        let prompter = Arc::clone(&prompter);
        let progress = progress.clone();
        let types = Arc::clone(&types);
        async move {
            let (pending, titles, bump) = release.read(|r| {
                let pending: Vec<usize> = r
                    .commits
                    .iter()
                    .enumerate()
                    .filter(|(_, c)| c.classification.is_none())
                    .map(|(i, _)| i)
                    .collect();
                let titles: Vec<String> = pending
                    .iter()
                    .map(|&i| r.commits[i].title.clone())
                    .collect();
                (pending, titles, r.bump())
            });
            if pending.is_empty() {
                return Ok(());
            }

            let choices = type_choices(&choices_for(&types, bump?));
            let questions: Vec<Question> = titles
                .into_iter()
                .map(|message| Question {
                    message,
                    choices: choices.clone(),
                })
                .collect();

            progress.headline("! Please enter the type of change for each commit:");

            let record = |index: usize, answer: &str| {
                if let Some(&position) = pending.get(index) {
                    release.write(|r| r.commits[position].classification = Some(answer.to_string()));
                }
            };
            let answers = prompter.ask(&questions, &record).await?;
            for (index, answer) in answers.iter().enumerate() {
                record(index, answer.as_str());
            }
            Ok(())
        }
    })
}

fn first_matching_label(labels: &[String], types: &[ChangeType]) -> String {
    types
        .iter()
        .map(|t| &t.handle)
        .find(|handle| handle.as_str() != FALLBACK_HANDLE && labels.contains(handle))
        .cloned()
        .unwrap_or_else(|| FALLBACK_HANDLE.to_string())
}

async fn labels_of(host: &dyn ReleaseHost, repo: Option<&RepoId>, title: &str) -> Vec<String> {
    let (Some(repo), Some(number)) = (repo, pull_request_reference(title)) else {
        return Vec::new();
    };
    match host.pull_request(repo, number).await {
        Ok(pull) => pull.labels,
        Err(e) => {
            tracing::debug!(number, error = %e, "pull request lookup failed");
            Vec::new()
        }
    }
}

fn classify_by_labels(host: Arc<dyn ReleaseHost>, types: Arc<Vec<ChangeType>>) -> BoxTask {
    tap(move |release: SharedRelease| {
        let host = Arc::clone(&host);
        let types = Arc::clone(&types);
        async move {
            let (repo, pending) = release.read(|r| {
                let pending: Vec<(usize, String)> = r
                    .commits
                    .iter()
                    .enumerate()
                    .filter(|(_, c)| c.classification.is_none())
                    .map(|(i, c)| (i, c.title.clone()))
                    .collect();
                (r.repo.clone(), pending)
            });

            for (position, title) in pending {
                let labels = labels_of(host.as_ref(), repo.as_ref(), &title).await;
                let handle = first_matching_label(&labels, &types);
                release.write(|r| r.commits[position].classification = Some(handle));
            }
            Ok(())
        }
    })
}

/// Groups classified commits by category, in category order.
pub fn group_changes(ctx: &Context) -> Result<BoxTask> {
    let types = Arc::new(ctx.config.categories());
    Ok(tap(move |release: SharedRelease| {
        let types = Arc::clone(&types);
        async move {
            release.write(|r| {
                r.changes = group_by_type(&r.commits, &types);
                tracing::debug!(
                    groups = r.changes.len(),
                    ignored = r.commits.iter().filter(|c| c.classification.as_deref() == Some(IGNORE)).count(),
                    "grouped changes"
                );
            });
            Ok(())
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commit::{Commit, Person};
    use crate::config::{LabelSection, ReleaseConfig};
    use crate::github::PullRequest;
    use crate::release::Release;
    use crate::tag::Tag;
    use crate::tasks::fakes::{harness, FakeHost, FakeVcs};

    fn release_with(commits: Vec<Commit>, target: &str) -> SharedRelease {
        let mut release = Release::new();
        release
            .set_tags(
                Tag::from_name(target, "bbbbbbb").unwrap(),
                Tag::from_name("v1.0.0", "aaaaaaa").unwrap(),
            )
            .unwrap();
        release.repo = Some(RepoId::new("octo", "widgets"));
        release.commits = commits;
        SharedRelease::new(release)
    }

    fn commit(hash: &str, title: &str) -> Commit {
        Commit::new(hash, title, "", Person::new("Ada", "ada@example.com"))
    }

    #[tokio::test]
    async fn only_unmarked_commits_are_asked_about() {
        let h = harness(FakeVcs::two_tags(), FakeHost::default(), &["minor", "patch"]);
        let release = release_with(
            vec![
                commit("1111111", "Drop v1 (major)").classified("major"),
                commit("2222222", "Add flag"),
                commit("3333333", "Fix typo"),
            ],
            "v2.0.0",
        );

        let release = prompt_types(&h.ctx).unwrap().run(release).await.unwrap();

        let asked = h.prompter.asked.lock().unwrap().clone();
        assert_eq!(asked.len(), 2);
        assert_eq!(asked[0].message, "Add flag");
        let classes: Vec<_> = release.read(|r| {
            r.commits
                .iter()
                .map(|c| c.classification.clone().unwrap())
                .collect()
        });
        assert_eq!(classes, ["major", "minor", "patch"]);
    }

    #[tokio::test]
    async fn choices_follow_the_bump() {
        let h = harness(FakeVcs::two_tags(), FakeHost::default(), &["patch"]);
        let release = release_with(vec![commit("2222222", "Fix typo")], "v1.0.1");

        prompt_types(&h.ctx).unwrap().run(release).await.unwrap();

        let asked = h.prompter.asked.lock().unwrap().clone();
        let values: Vec<_> = asked[0].choices.iter().map(|c| c.value.as_str()).collect();
        assert_eq!(values, ["patch", "ignore"]);
    }

    #[tokio::test]
    async fn flat_mode_asks_nothing() {
        let mut h = harness(FakeVcs::two_tags(), FakeHost::default(), &[]);
        h.ctx.config.skip_questions = true;
        let release = release_with(vec![commit("2222222", "Fix typo")], "v1.0.1");

        prompt_types(&h.ctx).unwrap().run(release).await.unwrap();
        assert!(h.prompter.asked.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn labels_pick_the_first_configured_section() {
        let mut host = FakeHost::default();
        host.pulls.insert(
            12,
            PullRequest {
                number: 12,
                author: Some("bob".to_string()),
                labels: vec!["docs".to_string(), "bug".to_string()],
            },
        );
        let mut h = harness(FakeVcs::two_tags(), host, &[]);
        let mut config = ReleaseConfig {
            mode: Mode::Labels,
            ..ReleaseConfig::default()
        };
        config.labels.labels = ["bug", "docs"]
            .iter()
            .map(|name| LabelSection {
                name: name.to_string(),
                title: None,
            })
            .collect();
        h.ctx.config = config;

        let release = release_with(
            vec![
                commit("1111111", "Fix crash (#12)"),
                commit("2222222", "Tweak build"),
                commit("3333333", "Old (#99)"),
            ],
            "v1.0.1",
        );
        let release = prompt_types(&h.ctx).unwrap().run(release).await.unwrap();
        let release = group_changes(&h.ctx).unwrap().run(release).await.unwrap();

        release.read(|r| {
            let classes: Vec<_> = r
                .commits
                .iter()
                .map(|c| c.classification.clone().unwrap())
                .collect();
            assert_eq!(classes, ["bug", FALLBACK_HANDLE, FALLBACK_HANDLE]);

            let names: Vec<_> = r.changes.iter().map(|g| g.change_type.name.as_str()).collect();
            assert_eq!(names, ["bug", "Misc"]);
        });
        assert!(h.prompter.asked.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn grouping_drops_ignored_commits() {
        let h = harness(FakeVcs::two_tags(), FakeHost::default(), &[]);
        let release = release_with(
            vec![
                commit("1111111", "a").classified("patch"),
                commit("2222222", "b").classified(IGNORE),
                commit("3333333", "c").classified("major"),
            ],
            "v2.0.0",
        );

        let release = group_changes(&h.ctx).unwrap().run(release).await.unwrap();
        let groups: Vec<_> = release.read(|r| {
            r.changes
                .iter()
                .map(|g| (g.change_type.handle.clone(), g.commits.len()))
                .collect()
        });
        assert_eq!(groups, [("major".to_string(), 1), ("patch".to_string(), 1)]);
    }
}
