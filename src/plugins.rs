//! Plugin registry and loading.
//!
//! A [`Plugin`] maps action names to [`Hook`]s. The registry runs every
//! plugin's `before` handler ahead of an action and every `after` handler once
//! it settled. `before` handlers and the action itself only run while the
//! action's `required` predicate holds; `after` handlers always run.
//!
//! Plugins are loaded from a colon-separated list of specifiers. Each
//! specifier scheme maps to a loader in [`PluginLoaders`]; loaded plugins are
//! validated before they are registered.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use serde::Deserialize;
use tokio::process::Command;

use crate::config::{Validate, ValidationResult};
use crate::error::{Error, Result};
use crate::hook::pipe_through;
use crate::pipeline::{BoxTask, Task};
use crate::progress::Progress;
use crate::release::SharedRelease;

/// Names of the actions the standard pipeline exposes to plugins.
pub const ACTIONS: &[&str] = &[
    "Start",
    "LatestTag",
    "CanRelease",
    "GetCommits",
    "PromptTypes",
    "GroupChanges",
    "GetCredits",
    "RenderChanges",
    "ApplyHook",
    "Publish",
    "OpenRelease",
];

/// Prefix of catalog plugin names.
pub const PACKAGE_PREFIX: &str = "release-plugin-";

/// Handler run around an action.
pub type HookFn = Arc<dyn Fn(SharedRelease) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Predicate deciding whether an action still needs to run.
pub type RequiredFn = Arc<dyn Fn(&SharedRelease) -> bool + Send + Sync>;

fn hook_fn<F, Fut>(f: F) -> HookFn
where
    F: Fn(SharedRelease) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    Arc::new(move |release: SharedRelease| -> BoxFuture<'static, Result<()>> {
        Box::pin(f(release))
    })
}

/// Handlers a plugin attaches to one action.
#[derive(Clone, Default)]
pub struct Hook {
    pub before: Option<HookFn>,
    pub after: Option<HookFn>,
}

impl Hook {
    fn is_empty(&self) -> bool {
        self.before.is_none() && self.after.is_none()
    }
}

/// A named set of hooks keyed by action name.
#[derive(Clone, Default)]
pub struct Plugin {
    name: String,
    hooks: HashMap<String, Hook>,
}

impl fmt::Debug for Plugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut actions: Vec<_> = self.hooks.keys().collect();
        actions.sort();
        f.debug_struct("Plugin")
            .field("name", &self.name)
            .field("actions", &actions)
            .finish()
    }
}

impl Plugin {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            hooks: HashMap::new(),
        }
    }

    /// Adds a handler run before `action`.
    pub fn before<F, Fut>(mut self, action: &str, f: F) -> Self
    where
        F: Fn(SharedRelease) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.hooks.entry(action.to_string()).or_default().before = Some(hook_fn(f));
        self
    }

    /// Adds a handler run after `action`.
    pub fn after<F, Fut>(mut self, action: &str, f: F) -> Self
    where
        F: Fn(SharedRelease) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.hooks.entry(action.to_string()).or_default().after = Some(hook_fn(f));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Hooks attached to `action`.
    pub fn hook(&self, action: &str) -> Option<&Hook> {
        self.hooks.get(action)
    }
}

impl Validate for Plugin {
    fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        if self.name.trim().is_empty() {
            result.add_error("plugin name cannot be empty");
        }

        if self.hooks.values().all(Hook::is_empty) {
            result.add_error(format!("plugin '{}' has no handlers", self.name));
        }

        let mut unknown: Vec<_> = self
            .hooks
            .keys()
            .filter(|action| !ACTIONS.contains(&action.as_str()))
            .collect();
        unknown.sort();
        for action in unknown {
            result.add_error(format!(
                "plugin '{}' hooks unknown action '{}'",
                self.name, action
            ));
        }

        result
    }
}

/// An action the registry can run.
#[derive(Clone)]
pub struct Action {
    name: String,
    handler: Option<HookFn>,
    required: Option<RequiredFn>,
}

impl Action {
    /// An always-required action with no default handler.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            handler: None,
            required: None,
        }
    }

    /// Sets the default handler.
    pub fn with_handler<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(SharedRelease) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.handler = Some(hook_fn(f));
        self
    }

    /// Sets the predicate deciding if the action still needs to run.
    pub fn with_required<F>(mut self, f: F) -> Self
    where
        F: Fn(&SharedRelease) -> bool + Send + Sync + 'static,
    {
        self.required = Some(Arc::new(f));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Evaluates the `required` predicate. Actions without one are always required.
    pub fn is_required(&self, release: &SharedRelease) -> bool {
        self.required.as_ref().map_or(true, |required| required(release))
    }
}

/// Ordered collection of plugins.
#[derive(Debug, Clone, Default)]
pub struct PluginRegistry {
    plugins: Vec<Plugin>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends plugins, keeping registration order.
    pub fn register(&mut self, plugins: impl IntoIterator<Item = Plugin>) {
        self.plugins.extend(plugins);
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.plugins.iter().map(Plugin::name)
    }

    /// Runs the `before` handlers, the default handler and the `after` handlers.
    ///
    /// A failing handler aborts the run; handlers that already completed are
    /// not undone.
    pub async fn run(&self, action: &Action, release: &SharedRelease) -> Result<()> {
        self.run_before(action, release).await?;
        if action.is_required(release) {
            if let Some(handler) = &action.handler {
                handler(release.clone()).await?;
            }
        }
        self.run_after(action, release).await
    }

    async fn run_before(&self, action: &Action, release: &SharedRelease) -> Result<()> {
        for plugin in &self.plugins {
            // A previous handler may have made the action unnecessary.
            if !action.is_required(release) {
                return Ok(());
            }
            if let Some(before) = plugin.hook(action.name()).and_then(|h| h.before.as_ref()) {
                tracing::debug!(plugin = %plugin.name, action = %action.name, "running before hook");
                before(release.clone()).await?;
            }
        }
        Ok(())
    }

    async fn run_after(&self, action: &Action, release: &SharedRelease) -> Result<()> {
        for plugin in &self.plugins {
            if let Some(after) = plugin.hook(action.name()).and_then(|h| h.after.as_ref()) {
                tracing::debug!(plugin = %plugin.name, action = %action.name, "running after hook");
                after(release.clone()).await?;
            }
        }
        Ok(())
    }

    /// Wraps a task so plugins can hook into it under `name`.
    ///
    /// The task is skipped, and its input passed through, once a plugin
    /// suppresses `name` on the release record.
    pub fn wrap(self: &Arc<Self>, name: &str, task: BoxTask) -> BoxTask {
        let suppressed_name = name.to_string();
        Box::new(Hooked {
            action: Action::new(name).with_required(move |release: &SharedRelease| {
                !release.read(|r| r.is_suppressed(&suppressed_name))
            }),
            task,
            registry: Arc::clone(self),
        })
    }
}

struct Hooked {
    action: Action,
    task: BoxTask,
    registry: Arc<PluginRegistry>,
}

#[async_trait]
impl Task for Hooked {
    async fn run(&self, release: SharedRelease) -> Result<SharedRelease> {
        self.registry.run_before(&self.action, &release).await?;
        let release = if self.action.is_required(&release) {
            self.task.run(release).await?
        } else {
            tracing::debug!(action = %self.action.name, "action suppressed");
            release
        };
        self.registry.run_after(&self.action, &release).await?;
        Ok(release)
    }
}

/// One segment of a plugin list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PluginSpecifier {
    /// `./path`, resolved against the working directory.
    Local(PathBuf),
    /// `/path`.
    Absolute(PathBuf),
    /// `name`, looked up as `release-plugin-<name>`.
    Package(String),
}

/// Specifier kinds, each served by one loader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scheme {
    Local,
    Absolute,
    Package,
}

impl PluginSpecifier {
    pub fn parse(segment: &str) -> Self {
        if segment.starts_with('.') {
            PluginSpecifier::Local(PathBuf::from(segment))
        } else if segment.starts_with('/') {
            PluginSpecifier::Absolute(PathBuf::from(segment))
        } else {
            PluginSpecifier::Package(format!("{}{}", PACKAGE_PREFIX, segment))
        }
    }

    /// Parses a colon-separated list, skipping empty segments.
    pub fn parse_list(list: &str) -> Vec<Self> {
        list.split(':')
            .filter(|segment| !segment.is_empty())
            .map(Self::parse)
            .collect()
    }

    pub fn scheme(&self) -> Scheme {
        match self {
            PluginSpecifier::Local(_) => Scheme::Local,
            PluginSpecifier::Absolute(_) => Scheme::Absolute,
            PluginSpecifier::Package(_) => Scheme::Package,
        }
    }
}

impl fmt::Display for PluginSpecifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PluginSpecifier::Local(path) | PluginSpecifier::Absolute(path) => {
                write!(f, "{}", path.display())
            }
            PluginSpecifier::Package(name) => f.write_str(name),
        }
    }
}

/// Arguments handed to plugin constructors.
#[derive(Debug, Clone)]
pub struct PluginInit {
    pub working_dir: PathBuf,
    pub progress: Progress,
}

/// Builds a plugin from the init arguments.
pub type PluginConstructor = Arc<dyn Fn(&PluginInit) -> Result<Plugin> + Send + Sync>;

/// Turns a specifier into a plugin.
pub type Loader = Arc<dyn Fn(&PluginSpecifier, &PluginInit) -> Result<Plugin> + Send + Sync>;

/// Named plugin constructors available to `Package` specifiers.
#[derive(Clone)]
pub struct PluginCatalog {
    entries: BTreeMap<String, PluginConstructor>,
}

impl fmt::Debug for PluginCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.entries.keys()).finish()
    }
}

impl Default for PluginCatalog {
    fn default() -> Self {
        Self::empty().with_entry(format!("{}dry-run", PACKAGE_PREFIX), dry_run)
    }
}

impl PluginCatalog {
    pub fn empty() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Registers a constructor under its full package name.
    pub fn with_entry<F>(mut self, name: impl Into<String>, constructor: F) -> Self
    where
        F: Fn(&PluginInit) -> Result<Plugin> + Send + Sync + 'static,
    {
        self.entries.insert(name.into(), Arc::new(constructor));
        self
    }

    pub fn get(&self, name: &str) -> Option<&PluginConstructor> {
        self.entries.get(name)
    }
}

/// Prints the changelog instead of publishing it.
fn dry_run(init: &PluginInit) -> Result<Plugin> {
    let progress = init.progress.clone();
    Ok(Plugin::new("dry-run").before("Publish", move |release: SharedRelease| {
        let progress = progress.clone();
        async move {
            let body = release.write(|r| {
                r.suppress("Publish");
                r.suppress("OpenRelease");
                r.body.clone()
            });
            progress.info("Dry run, the release is not uploaded");
            progress.log(body.unwrap_or_default());
            Ok(())
        }
    }))
}

#[derive(Debug, Deserialize)]
struct Manifest {
    name: Option<String>,
    #[serde(default)]
    hooks: BTreeMap<String, ManifestHook>,
}

#[derive(Debug, Deserialize)]
struct ManifestHook {
    before: Option<String>,
    after: Option<String>,
}

fn shell_hook(command: String, dir: PathBuf, action: String) -> HookFn {
    hook_fn(move |release: SharedRelease| {
        let command = command.clone();
        let dir = dir.clone();
        let action = action.clone();
        async move {
            let payload = release
                .read(serde_json::to_vec)
                .map_err(|e| Error::Plugin(e.to_string()))?;

            let mut cmd = Command::new("sh");
            cmd.arg("-c")
                .arg(&command)
                .current_dir(&dir)
                .env("RELEASE_ACTION", &action);

            let output = pipe_through(cmd, payload)
                .await
                .map_err(|e| Error::Plugin(format!("`{}`: {}", command, e)))?;
            if !output.status.success() {
                return Err(Error::Plugin(format!(
                    "`{}` exited with {}: {}",
                    command,
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                )));
            }
            tracing::debug!(
                command = %command,
                stdout = %String::from_utf8_lossy(&output.stdout).trim(),
                "plugin command finished"
            );
            Ok(())
        }
    })
}

/// Reads a TOML plugin manifest.
///
/// ```toml
/// name = "notify"
///
/// [hooks.Publish]
/// after = "./scripts/notify.sh"
/// ```
///
/// Commands run through `sh -c` from the manifest's directory with the release
/// record as JSON on stdin.
pub fn load_manifest(path: &Path) -> Result<Plugin> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| Error::Plugin(format!("cannot read {}: {}", path.display(), e)))?;
    let manifest: Manifest = toml::from_str(&text)
        .map_err(|e| Error::Plugin(format!("invalid manifest {}: {}", path.display(), e)))?;

    let dir = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let name = manifest.name.unwrap_or_else(|| {
        path.file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default()
    });

    let mut plugin = Plugin::new(name);
    for (action, hook) in manifest.hooks {
        let entry = plugin.hooks.entry(action.clone()).or_default();
        entry.before = hook
            .before
            .map(|cmd| shell_hook(cmd, dir.clone(), action.clone()));
        entry.after = hook
            .after
            .map(|cmd| shell_hook(cmd, dir.clone(), action.clone()));
    }
    Ok(plugin)
}

/// Loader per specifier scheme.
#[derive(Clone)]
pub struct PluginLoaders {
    loaders: HashMap<Scheme, Loader>,
}

impl fmt::Debug for PluginLoaders {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.loaders.keys()).finish()
    }
}

impl PluginLoaders {
    /// No loaders; every specifier fails to load.
    pub fn empty() -> Self {
        Self {
            loaders: HashMap::new(),
        }
    }

    /// Manifest files for path specifiers, `catalog` for package names.
    pub fn standard(catalog: PluginCatalog) -> Self {
        Self::empty()
            .with_loader(Scheme::Local, |spec, init| match spec {
                PluginSpecifier::Local(path) => load_manifest(&init.working_dir.join(path)),
                other => Err(Error::Plugin(format!("not a local plugin: {}", other))),
            })
            .with_loader(Scheme::Absolute, |spec, _| match spec {
                PluginSpecifier::Absolute(path) => load_manifest(path),
                other => Err(Error::Plugin(format!("not an absolute plugin path: {}", other))),
            })
            .with_loader(Scheme::Package, move |spec, init| match spec {
                PluginSpecifier::Package(name) => match catalog.get(name) {
                    Some(constructor) => constructor(init),
                    None => Err(Error::Plugin(format!("unknown plugin {}", name))),
                },
                other => Err(Error::Plugin(format!("not a plugin name: {}", other))),
            })
    }

    pub fn with_loader<F>(mut self, scheme: Scheme, loader: F) -> Self
    where
        F: Fn(&PluginSpecifier, &PluginInit) -> Result<Plugin> + Send + Sync + 'static,
    {
        self.loaders.insert(scheme, Arc::new(loader));
        self
    }

    /// Loads and validates one plugin.
    pub fn load(&self, spec: &PluginSpecifier, init: &PluginInit) -> Result<Plugin> {
        let loader = self
            .loaders
            .get(&spec.scheme())
            .ok_or_else(|| Error::Plugin(format!("no loader for {}", spec)))?;
        let plugin = loader(spec, init)?;

        let warnings = plugin
            .validate()
            .into_result()
            .map_err(|e| Error::Plugin(format!("{}: {}", spec, e)))?;
        for warning in warnings {
            tracing::warn!(plugin = %plugin.name, "{}", warning);
        }
        Ok(plugin)
    }

    /// Loads a colon-separated plugin list into a registry, in list order.
    pub fn load_list(&self, list: &str, init: &PluginInit) -> Result<PluginRegistry> {
        let mut registry = PluginRegistry::new();
        for spec in PluginSpecifier::parse_list(list) {
            let plugin = self.load(&spec, init)?;
            tracing::debug!(plugin = %plugin.name, specifier = %spec, "loaded plugin");
            registry.register([plugin]);
        }
        Ok(registry)
    }
}
