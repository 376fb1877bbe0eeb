//! Release Pilot - compose a changelog from tagged commits and publish it as a GitHub release
//!
//! The release runs as a pipeline of asynchronous tasks over one shared
//! release record. Tasks are composed serially or in parallel, and plugins can
//! hook into every named step.

pub mod auth;
pub mod backoff;
pub mod bump;
pub mod changelog;
pub mod changes;
pub mod commit;
pub mod config;
pub mod error;
pub mod git;
pub mod github;
pub mod hook;
pub mod open;
pub mod pipeline;
pub mod plugins;
pub mod progress;
pub mod prompt;
pub mod release;
pub mod tag;
pub mod tasks;
pub mod version;

pub use error::{Error, Result};

pub use auth::{Authenticator, FileTokenStore, TokenStore};
pub use backoff::ExponentialBackoff;
pub use bump::{bump_version, BumpOutcome};
pub use changelog::{ChangelogContext, ChangelogRenderer, TemplateRenderer};
pub use changes::{default_change_types, ChangeGroup, ChangeType, IGNORE};
pub use commit::{Commit, Person};
pub use config::{Mode, OpenMode, ReleaseConfig, Validate, ValidationResult};
pub use git::{GitCli, Vcs};
pub use github::{GitHubClient, PullRequest, ReleaseHost};
pub use hook::{ChangelogHook, CommandHook, HookContext};
pub use open::{PrintOpener, SystemOpener, UrlOpener};
pub use pipeline::{parallel, serial, tap, task_fn, BoxTask, Task, TaskFactory};
pub use plugins::{
    Action, Hook, Plugin, PluginCatalog, PluginInit, PluginLoaders, PluginRegistry,
    PluginSpecifier,
};
pub use progress::Progress;
pub use prompt::{Choice, Prompter, Question, TerminalPrompter};
pub use release::{Release, ReleasePayload, RemoteRelease, RepoId, SharedRelease};
pub use tag::Tag;
pub use tasks::{default_pipeline, run_release, Context};
pub use version::Bump;
