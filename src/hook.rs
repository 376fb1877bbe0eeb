//! User-supplied changelog transform.
//!
//! The hook is an external command. It receives the rendered changelog and
//! the release context as JSON on stdin and prints the replacement changelog
//! on stdout.

use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};

use async_trait::async_trait;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::changes::{ChangeGroup, ChangeType};
use crate::commit::Commit;
use crate::error::{Error, Result};

/// Everything a hook may want to know about the release.
#[derive(Debug, Clone, Serialize)]
pub struct HookContext {
    pub tag: Option<String>,
    pub change_types: Vec<ChangeType>,
    pub commits: Vec<Commit>,
    pub changes: Vec<ChangeGroup>,
    pub credits: Vec<String>,
}

#[derive(Serialize)]
struct HookInput<'a> {
    changelog: &'a str,
    context: &'a HookContext,
}

/// Transforms the rendered changelog before it is published.
#[async_trait]
pub trait ChangelogHook: Send + Sync {
    /// Returns the replacement changelog.
    async fn apply(&self, changelog: &str, context: &HookContext) -> Result<String>;
}

/// Runs `command` with `input` written to its stdin and collects its output.
pub(crate) async fn pipe_through(mut command: Command, input: Vec<u8>) -> std::io::Result<Output> {
    command
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = command.spawn()?;
    let writer = child.stdin.take().map(|mut stdin| {
        tokio::spawn(async move {
            // Commands that ignore stdin close the pipe early.
            if let Err(e) = stdin.write_all(&input).await {
                tracing::debug!(error = %e, "stdin closed before the payload was written");
            }
        })
    });

    let output = child.wait_with_output().await?;
    if let Some(writer) = writer {
        let _ = writer.await;
    }
    Ok(output)
}

/// Hook backed by an executable.
#[derive(Debug, Clone)]
pub struct CommandHook {
    program: PathBuf,
    args: Vec<String>,
    working_dir: Option<PathBuf>,
}

impl CommandHook {
    /// Resolves a `--hook` path against `base`. The file must exist.
    pub fn from_path(base: &Path, path: &Path) -> Result<Self> {
        let program = base.join(path);
        if !program.exists() {
            return Err(Error::Hook(format!(
                "The specified --hook file doesn't exist: {}",
                program.display()
            )));
        }
        Ok(Self {
            program,
            args: Vec::new(),
            working_dir: Some(base.to_path_buf()),
        })
    }

    /// Runs an arbitrary program with arguments.
    pub fn with_command<I, S>(program: impl Into<PathBuf>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            working_dir: None,
        }
    }

    /// Path of the hook program.
    pub fn program(&self) -> &Path {
        &self.program
    }
}

#[async_trait]
impl ChangelogHook for CommandHook {
    async fn apply(&self, changelog: &str, context: &HookContext) -> Result<String> {
        let input = serde_json::to_vec(&HookInput { changelog, context })
            .map_err(|e| Error::Hook(e.to_string()))?;

        let mut command = Command::new(&self.program);
        command.args(&self.args);
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }

        tracing::debug!(hook = %self.program.display(), "running changelog hook");
        let output = pipe_through(command, input)
            .await
            .map_err(|e| Error::Hook(format!("{}: {}", self.program.display(), e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Hook(format!(
                "{} exited with {}: {}",
                self.program.display(),
                output.status,
                stderr.trim()
            )));
        }

        let changelog = String::from_utf8_lossy(&output.stdout).trim_end().to_string();
        if changelog.is_empty() {
            return Err(Error::Hook(format!(
                "{} returned an empty changelog",
                self.program.display()
            )));
        }
        Ok(changelog)
    }
}
