//! Commit loading.

use std::sync::Arc;

use super::Context;
use crate::changes::commit_marker;
use crate::commit::skip_release_markers;
use crate::error::{Error, Result};
use crate::pipeline::{tap, BoxTask};
use crate::release::SharedRelease;

/// Loads the commits of the release range, minus release markers.
///
/// Commits carrying an inline `(handle)` marker are classified right away.
pub fn get_commits(ctx: &Context) -> Result<BoxTask> {
    let vcs = Arc::clone(&ctx.vcs);
    let progress = ctx.progress.clone();
    let types = Arc::new(ctx.config.categories());

    Ok(tap(move |release: SharedRelease| {
        let vcs = Arc::clone(&vcs);
        let progress = progress.clone();
        let types = Arc::clone(&types);
        async move {
            let range = release.read(|r| r.range())?;
            let commits = progress
                .track("Loading commit history", vcs.list_commits(&range))
                .await?;

            let commits: Vec<_> = skip_release_markers(commits)
                .into_iter()
                .map(|mut commit| {
                    if commit.classification.is_none() {
                        commit.classification = commit_marker(&commit, &types);
                    }
                    commit
                })
                .collect();

            if commits.is_empty() {
                return Err(Error::precondition(
                    "No changes happened since the last release.",
                ));
            }

            tracing::debug!(range = %range, count = commits.len(), "loaded commits");
            release.write(|r| r.commits = commits);
            Ok(())
        }
    }))
}
