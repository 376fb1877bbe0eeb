//! Changelog rendering and the user hook.

use std::sync::Arc;

use super::Context;
use crate::changelog::ChangelogContext;
use crate::error::{Error, Result};
use crate::hook::HookContext;
use crate::pipeline::{tap, BoxTask};
use crate::release::SharedRelease;

/// Renders the changelog into the release body.
pub fn render_changes(ctx: &Context) -> Result<BoxTask> {
    let renderer = Arc::clone(&ctx.renderer);
    let types = Arc::new(ctx.config.categories());

    Ok(tap(move |release: SharedRelease| {
        let renderer = Arc::clone(&renderer);
        let types = Arc::clone(&types);
        async move {
            let context = release.read(|r| {
                ChangelogContext::new(r.tag_name(), &r.commits, &r.changes, r.credits(), &types)
            });
            let body = renderer.render(&context)?;
            release.write(|r| r.body = Some(body));
            Ok(())
        }
    }))
}

/// Passes the body through the configured hook, if any.
pub fn apply_hook(ctx: &Context) -> Result<BoxTask> {
    let Some(hook) = ctx.hook.clone() else {
        return Ok(tap(|_release: SharedRelease| async { Ok(()) }));
    };
    let progress = ctx.progress.clone();
    let types = Arc::new(ctx.config.categories());

    Ok(tap(move |release: SharedRelease| {
        let hook = Arc::clone(&hook);
        let progress = progress.clone();
        let types = Arc::clone(&types);
        async move {
            let (body, context) = release.read(|r| {
                let context = HookContext {
                    tag: r.tag_name(),
                    change_types: types.to_vec(),
                    commits: r.commits.clone(),
                    changes: r.changes.clone(),
                    credits: r.credits().to_vec(),
                };
                (r.body.clone(), context)
            });
            let body = body
                .ok_or_else(|| Error::State("The changelog has not been rendered.".to_string()))?;

            let body = progress
                .track("Running release hook", hook.apply(&body, &context))
                .await?;
            release.write(|r| r.body = Some(body));
            Ok(())
        }
    }))
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::changes::{default_change_types, group_by_type};
    use crate::commit::{Commit, Person};
    use crate::hook::ChangelogHook;
    use crate::release::Release;
    use crate::tag::Tag;
    use crate::tasks::fakes::{harness, FakeHost, FakeVcs};

    struct Shout;

    #[async_trait]
    impl ChangelogHook for Shout {
        async fn apply(&self, changelog: &str, context: &HookContext) -> Result<String> {
            Ok(format!(
                "{} ({} commits)",
                changelog.to_uppercase(),
                context.commits.len()
            ))
        }
    }

    struct Broken;

    #[async_trait]
    impl ChangelogHook for Broken {
        async fn apply(&self, _: &str, _: &HookContext) -> Result<String> {
            Err(Error::Hook("exit status: 1".to_string()))
        }
    }

    fn grouped() -> SharedRelease {
        let mut release = Release::new();
        release
            .set_tags(
                Tag::from_name("v1.0.1", "bbbbbbb").unwrap(),
                Tag::from_name("v1.0.0", "aaaaaaa").unwrap(),
            )
            .unwrap();
        release.commits = vec![Commit::new(
            "1111111aaaa",
            "fix crash",
            "",
            Person::new("Ada", "ada@example.com"),
        )
        .classified("patch")];
        release.changes = group_by_type(&release.commits, &default_change_types());
        release.add_credit("bob");
        SharedRelease::new(release)
    }

    #[tokio::test]
    async fn body_is_rendered_from_the_groups() {
        let h = harness(FakeVcs::two_tags(), FakeHost::default(), &[]);
        let release = render_changes(&h.ctx).unwrap().run(grouped()).await.unwrap();
        assert_eq!(
            release.read(|r| r.body.clone()).unwrap(),
            "### Patch\n\n- Fix crash #1111111\n\n### Credits\n\nHuge thanks to @bob for contributing!"
        );
    }

    #[tokio::test]
    async fn hook_replaces_the_body() {
        let h = harness(FakeVcs::two_tags(), FakeHost::default(), &[]);
        let ctx = h.ctx.with_hook(Arc::new(Shout));
        let release = grouped();
        release.write(|r| r.body = Some("notes".to_string()));

        let release = apply_hook(&ctx).unwrap().run(release).await.unwrap();
        assert_eq!(release.read(|r| r.body.clone()).unwrap(), "NOTES (1 commits)");
    }

    #[tokio::test]
    async fn failing_hook_stops_the_run() {
        let h = harness(FakeVcs::two_tags(), FakeHost::default(), &[]);
        let ctx = h.ctx.with_hook(Arc::new(Broken));
        let release = grouped();
        release.write(|r| r.body = Some("notes".to_string()));

        let err = apply_hook(&ctx).unwrap().run(release.clone()).await.unwrap_err();
        assert!(matches!(err, Error::Hook(_)));
        assert_eq!(release.read(|r| r.body.clone()).unwrap(), "notes");
    }

    #[tokio::test]
    async fn without_a_hook_the_body_is_untouched() {
        let h = harness(FakeVcs::two_tags(), FakeHost::default(), &[]);
        let release = grouped();
        let release = apply_hook(&h.ctx).unwrap().run(release).await.unwrap();
        assert_eq!(release.read(|r| r.body.clone()), None);
    }
}
