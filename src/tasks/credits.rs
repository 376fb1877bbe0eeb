//! Contributor attribution.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use futures_util::future::join_all;

use super::Context;
use crate::changes::pull_request_reference;
use crate::error::{Error, Result};
use crate::github::ReleaseHost;
use crate::pipeline::{tap, BoxTask};
use crate::release::{RepoId, SharedRelease};

async fn commit_logins(host: &dyn ReleaseHost, repo: &RepoId, sha: &str) -> Vec<String> {
    match host.commit_authors(repo, sha).await {
        Ok(logins) => logins,
        Err(e) => {
            tracing::debug!(sha = %sha, error = %e, "commit author lookup failed");
            Vec::new()
        }
    }
}

async fn pull_request_author(host: &dyn ReleaseHost, repo: &RepoId, number: u64) -> Vec<String> {
    match host.pull_request(repo, number).await {
        Ok(pull) => pull.author.into_iter().collect(),
        Err(e) => {
            tracing::debug!(number, error = %e, "pull request lookup failed");
            Vec::new()
        }
    }
}

/// Credits the accounts behind the commits and referenced pull requests.
///
/// One lookup is made per distinct author or committer e-mail. The user
/// cutting the release is not credited.
pub fn get_credits(ctx: &Context) -> Result<BoxTask> {
    let host = Arc::clone(&ctx.host);
    let progress = ctx.progress.clone();

    Ok(tap(move |release: SharedRelease| {
        let host = Arc::clone(&host);
        let progress = progress.clone();
        async move {
            let (repo, by_email, pulls) = release.read(|r| {
                let mut by_email = BTreeMap::new();
                let mut pulls = Vec::new();
                for commit in &r.commits {
                    for person in std::iter::once(&commit.author).chain(commit.committer.as_ref()) {
                        by_email.insert(person.email.clone(), commit.hash.clone());
                    }
                    if let Some(number) = pull_request_reference(&commit.title) {
                        if !pulls.contains(&number) {
                            pulls.push(number);
                        }
                    }
                }
                (r.repo.clone(), by_email, pulls)
            });
            let shas: BTreeSet<String> = by_email.into_values().collect();
            let repo = repo.ok_or_else(|| {
                Error::State("The repository must be known to load contributors.".to_string())
            })?;

            let lookup = async {
                let host = host.as_ref();
                let commits = join_all(shas.iter().map(|sha| commit_logins(host, &repo, sha)));
                let pulls = join_all(pulls.iter().map(|&n| pull_request_author(host, &repo, n)));
                let (commits, pulls) = futures_util::future::join(commits, pulls).await;

                let me = match host.current_user().await {
                    Ok(login) => Some(login),
                    Err(e) => {
                        tracing::debug!(error = %e, "could not load the current user");
                        None
                    }
                };
                Ok((commits, pulls, me))
            };
            let (commits, pulls, me) = progress.track("Loading contributors", lookup).await?;

            release.write(|r| {
                for login in commits.into_iter().chain(pulls).flatten() {
                    r.add_credit(login);
                }
                if let Some(me) = &me {
                    r.remove_credit(me);
                }
            });
            Ok(())
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commit::{Commit, Person};
    use crate::github::PullRequest;
    use crate::release::Release;
    use crate::tasks::fakes::{harness, FakeHost, FakeVcs};

    #[tokio::test]
    async fn credits_are_deduplicated_and_exclude_the_releaser() {
        let ada = Person::new("Ada", "ada@example.com");
        let bob = Person::new("Bob", "bob@example.com");
        let mut with_committer = Commit::new("3333333", "Fix (#7)", "", bob.clone());
        with_committer.committer = Some(ada.clone());

        let mut host = FakeHost::default();
        host.user = "ada".to_string();
        host.authors.insert("2222222".to_string(), vec!["bob".to_string()]);
        host.authors
            .insert("3333333".to_string(), vec!["bob".to_string(), "ada".to_string()]);
        host.pulls.insert(
            7,
            PullRequest {
                number: 7,
                author: Some("carol".to_string()),
                labels: Vec::new(),
            },
        );
        let h = harness(FakeVcs::two_tags(), host, &[]);

        let mut release = Release::new();
        release.repo = Some(RepoId::new("octo", "widgets"));
        release.commits = vec![
            Commit::new("1111111", "First", "", ada),
            Commit::new("2222222", "Second", "", bob),
            with_committer,
        ];

        let release = get_credits(&h.ctx)
            .unwrap()
            .run(SharedRelease::new(release))
            .await
            .unwrap();

        assert_eq!(release.read(|r| r.credits().to_vec()), ["bob", "carol"]);
        // Both e-mails were last seen on the third commit.
        assert_eq!(h.host.author_lookups(), ["3333333"]);
    }

    #[tokio::test]
    async fn failed_lookups_are_skipped() {
        let h = harness(FakeVcs::two_tags(), FakeHost::default(), &[]);
        let mut release = Release::new();
        release.repo = Some(RepoId::new("octo", "widgets"));
        release.commits = vec![Commit::new(
            "1111111",
            "First (#3)",
            "",
            Person::new("Ada", "ada@example.com"),
        )];

        let release = get_credits(&h.ctx)
            .unwrap()
            .run(SharedRelease::new(release))
            .await
            .unwrap();
        assert!(release.read(|r| r.credits().is_empty()));
    }
}
