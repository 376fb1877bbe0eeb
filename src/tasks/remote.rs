//! Talking to the release host: existing release check, upload and opening.

use std::sync::Arc;

use super::Context;
use crate::error::{Error, Result};
use crate::pipeline::{tap, BoxTask};
use crate::release::{RepoId, SharedRelease};

fn tag_and_repo(release: &SharedRelease) -> Result<(String, RepoId)> {
    release.read(|r| {
        let tag = r
            .tag_name()
            .ok_or_else(|| Error::State("The release tag is not set.".to_string()))?;
        let repo = r
            .repo
            .clone()
            .ok_or_else(|| Error::State("The repository is not known.".to_string()))?;
        Ok((tag, repo))
    })
}

/// Looks for an existing release of the target tag.
///
/// Without `--overwrite` an existing release ends the run: it is opened and
/// [`Error::ReleaseExists`] is returned.
pub fn can_release(ctx: &Context) -> Result<BoxTask> {
    let host = Arc::clone(&ctx.host);
    let opener = Arc::clone(&ctx.opener);
    let progress = ctx.progress.clone();
    let overwrite = ctx.config.overwrite;

    Ok(tap(move |release: SharedRelease| {
        let host = Arc::clone(&host);
        let opener = Arc::clone(&opener);
        let progress = progress.clone();
        async move {
            let (tag, repo) = tag_and_repo(&release)?;

            let lookup = async {
                host.list_releases(&repo).await.map_err(|e| {
                    tracing::debug!(error = %e, "listing releases failed");
                    Error::ReleaseCheck
                })
            };
            let existing = progress
                .track(format!("Loading existing release for {}", tag), lookup)
                .await?
                .into_iter()
                .find(|remote| remote.tag_name == tag);

            let Some(existing) = existing else {
                progress.info(format!("No existing release for {}", tag));
                return Ok(());
            };

            if overwrite {
                progress.info(format!("A release for {} already exists", tag));
                release.write(|r| r.remote = Some(existing));
                return Ok(());
            }

            let url = existing.url.clone();
            if let Some(url) = &url {
                progress.info("Opening release in browser");
                if let Err(e) = opener.open(url).await {
                    tracing::debug!(error = %e, "could not open the existing release");
                }
            }
            Err(Error::ReleaseExists { url })
        }
    }))
}

/// Creates the release, or edits the one found by [`can_release`].
pub fn publish(ctx: &Context) -> Result<BoxTask> {
    let host = Arc::clone(&ctx.host);
    let progress = ctx.progress.clone();

    Ok(tap(move |release: SharedRelease| {
        let host = Arc::clone(&host);
        let progress = progress.clone();
        async move {
            let (payload, repo, id) = release.read(|r| -> Result<_> {
                let repo = r.repo.clone().ok_or_else(|| {
                    Error::State("Cannot create/edit a release without a repo or a repo owner.".to_string())
                })?;
                Ok((r.payload()?, repo, r.id()))
            })?;

            let label = format!(
                "Uploading {}release {}",
                if payload.prerelease { "pre" } else { "" },
                payload.tag_name
            );
            let upload = async {
                let saved = match id {
                    Some(id) => host.edit_release(&repo, id, &payload).await,
                    None => host.create_release(&repo, &payload).await,
                };
                saved.map_err(|e| {
                    tracing::debug!(error = %e, "uploading the release failed");
                    Error::Upload
                })
            };
            let remote = progress.track(label, upload).await?;

            tracing::debug!(id = remote.id, tag = %remote.tag_name, "release saved");
            release.write(|r| r.remote = Some(remote));
            Ok(())
        }
    }))
}

/// Shows the release page: the editor for drafts, the release otherwise.
pub fn open_release(ctx: &Context) -> Result<BoxTask> {
    let opener = Arc::clone(&ctx.opener);
    let progress = ctx.progress.clone();

    Ok(tap(move |release: SharedRelease| {
        let opener = Arc::clone(&opener);
        let progress = progress.clone();
        async move {
            let Some(url) = release.read(|r| r.url(r.is_draft())) else {
                progress.warn("The release has no page to open");
                return Ok(());
            };
            progress.headline("Done! 🎉");
            opener.open(&url).await
        }
    }))
}
