//! Repository identity, sync check and tag discovery.

use std::sync::Arc;

use super::Context;
use crate::error::{Error, Result};
use crate::pipeline::{parallel, tap, BoxTask};
use crate::release::SharedRelease;

/// Resolves the repository and checks it is in sync, concurrently.
pub fn start(ctx: &Context) -> Result<BoxTask> {
    parallel(ctx, &[&resolve_repository, &in_sync])
}

/// Records the hosted repository behind `origin`.
pub fn resolve_repository(ctx: &Context) -> Result<BoxTask> {
    let vcs = Arc::clone(&ctx.vcs);
    Ok(tap(move |release: SharedRelease| {
        let vcs = Arc::clone(&vcs);
        async move {
            let repo = vcs.repository().await?;
            tracing::debug!(repo = %repo, "resolved repository");
            release.write(|r| r.repo = Some(repo));
            Ok(())
        }
    }))
}

/// Fails unless the working tree matches the remote.
pub fn in_sync(ctx: &Context) -> Result<BoxTask> {
    let vcs = Arc::clone(&ctx.vcs);
    Ok(tap(move |_release: SharedRelease| {
        let vcs = Arc::clone(&vcs);
        async move {
            if !vcs.is_synced().await? {
                return Err(Error::precondition(
                    "Your branch needs to be up-to-date with origin.",
                ));
            }
            Ok(())
        }
    }))
}

/// Picks the newest tag as the target and the one before it as the previous release.
pub fn latest_tag(ctx: &Context) -> Result<BoxTask> {
    let vcs = Arc::clone(&ctx.vcs);
    let rev = ctx.config.rev.clone();
    Ok(tap(move |release: SharedRelease| {
        let vcs = Arc::clone(&vcs);
        let rev = rev.clone();
        async move {
            let mut tags = vcs.list_tags(&rev).await?.into_iter();
            let target = tags
                .next()
                .ok_or_else(|| Error::precondition("No tag available for release."))?;
            let previous = tags
                .next()
                .ok_or_else(|| Error::precondition("The first release should be created manually."))?;

            tracing::debug!(target = %target.name(), previous = %previous.name(), "selected tags");
            release.write(|r| r.set_tags(target, previous))
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::release::Release;
    use crate::tasks::fakes::{harness, FakeHost, FakeVcs};

    #[tokio::test]
    async fn start_resolves_the_repository() {
        let h = harness(FakeVcs::two_tags(), FakeHost::default(), &[]);
        let release = start(&h.ctx)
            .unwrap()
            .run(SharedRelease::default())
            .await
            .unwrap();
        assert_eq!(
            release.read(|r| r.repo.as_ref().map(ToString::to_string)),
            Some("octo/widgets".to_string())
        );
    }

    #[tokio::test]
    async fn unsynced_branch_stops_the_run() {
        let mut vcs = FakeVcs::two_tags();
        vcs.synced = false;
        let h = harness(vcs, FakeHost::default(), &[]);

        let err = start(&h.ctx)
            .unwrap()
            .run(SharedRelease::default())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Your branch needs to be up-to-date with origin.");
    }

    #[tokio::test]
    async fn tags_are_set_newest_first() {
        let h = harness(FakeVcs::two_tags(), FakeHost::default(), &[]);
        let release = latest_tag(&h.ctx)
            .unwrap()
            .run(SharedRelease::new(Release::new()))
            .await
            .unwrap();

        release.read(|r| {
            assert_eq!(r.tag_name().as_deref(), Some("v1.0.1"));
            assert_eq!(r.previous().map(|t| t.name()).as_deref(), Some("v1.0.0"));
        });
    }

    #[tokio::test]
    async fn a_single_tag_is_not_enough() {
        let mut vcs = FakeVcs::two_tags();
        vcs.tags.truncate(1);
        let h = harness(vcs, FakeHost::default(), &[]);

        let err = latest_tag(&h.ctx)
            .unwrap()
            .run(SharedRelease::default())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "The first release should be created manually.");

        let mut vcs = FakeVcs::two_tags();
        vcs.tags.clear();
        let h = harness(vcs, FakeHost::default(), &[]);
        let err = latest_tag(&h.ctx)
            .unwrap()
            .run(SharedRelease::default())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "No tag available for release.");
    }
}
