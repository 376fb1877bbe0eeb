//! The standard release pipeline.
//!
//! Every task is built from a [`Context`] and wrapped by the plugin registry
//! under its action name. [`default_pipeline`] chains them:
//!
//! Start → LatestTag → CanRelease → GetCommits → PromptTypes → GroupChanges →
//! GetCredits → RenderChanges → ApplyHook → Publish → OpenRelease

mod changelog;
mod classify;
mod commits;
mod credits;
mod remote;
mod repository;

#[cfg(test)]
pub(crate) mod fakes;

pub use changelog::{apply_hook, render_changes};
pub use classify::{group_changes, prompt_types};
pub use commits::get_commits;
pub use credits::get_credits;
pub use remote::{can_release, open_release, publish};
pub use repository::{in_sync, latest_tag, resolve_repository, start};

use std::sync::Arc;

use crate::changelog::ChangelogRenderer;
use crate::config::ReleaseConfig;
use crate::error::Result;
use crate::git::Vcs;
use crate::github::ReleaseHost;
use crate::hook::ChangelogHook;
use crate::open::UrlOpener;
use crate::pipeline::{serial, BoxTask, TaskFactory};
use crate::plugins::PluginRegistry;
use crate::progress::Progress;
use crate::prompt::Prompter;
use crate::release::{Release, SharedRelease};

/// Everything tasks are built from.
pub struct Context {
    pub config: ReleaseConfig,
    pub vcs: Arc<dyn Vcs>,
    pub host: Arc<dyn ReleaseHost>,
    pub prompter: Arc<dyn Prompter>,
    pub renderer: Arc<dyn ChangelogRenderer>,
    pub hook: Option<Arc<dyn ChangelogHook>>,
    pub opener: Arc<dyn UrlOpener>,
    pub progress: Progress,
    pub plugins: Arc<PluginRegistry>,
}

impl Context {
    pub fn new(
        config: ReleaseConfig,
        vcs: Arc<dyn Vcs>,
        host: Arc<dyn ReleaseHost>,
        prompter: Arc<dyn Prompter>,
        renderer: Arc<dyn ChangelogRenderer>,
        opener: Arc<dyn UrlOpener>,
        progress: Progress,
    ) -> Self {
        Self {
            config,
            vcs,
            host,
            prompter,
            renderer,
            hook: None,
            opener,
            progress,
            plugins: Arc::new(PluginRegistry::new()),
        }
    }

    pub fn with_hook(mut self, hook: Arc<dyn ChangelogHook>) -> Self {
        self.hook = Some(hook);
        self
    }

    pub fn with_plugins(mut self, plugins: PluginRegistry) -> Self {
        self.plugins = Arc::new(plugins);
        self
    }
}

type Factory = fn(&Context) -> Result<BoxTask>;

/// Wraps `factory` so its task runs as the plugin action `name`.
pub fn action(name: &'static str, factory: Factory) -> impl Fn(&Context) -> Result<BoxTask> + Send + Sync {
    move |ctx: &Context| Ok(ctx.plugins.wrap(name, factory(ctx)?))
}

/// The standard task chain.
pub fn default_pipeline(ctx: &Context) -> Result<BoxTask> {
    serial(
        ctx,
        &[
            &action("Start", start),
            &action("LatestTag", latest_tag),
            &action("CanRelease", can_release),
            &action("GetCommits", get_commits),
            &action("PromptTypes", prompt_types),
            &action("GroupChanges", group_changes),
            &action("GetCredits", get_credits),
            &action("RenderChanges", render_changes),
            &action("ApplyHook", apply_hook),
            &action("Publish", publish),
            &action("OpenRelease", open_release),
        ],
    )
}

/// Builds the pipeline with `factory` and runs it once on a fresh record.
pub async fn run_release(ctx: &Context, factory: &dyn TaskFactory<Context>) -> Result<Release> {
    let task = factory.create(ctx)?;

    let mut release = Release::new();
    if ctx.config.pre {
        release.pre = Some(true);
    }
    if ctx.config.publish {
        release.draft = Some(false);
    }

    let release = task.run(SharedRelease::new(release)).await?;
    Ok(release.snapshot())
}
