//! Presenting release URLs to the user.

use async_trait::async_trait;
use tokio::process::Command;

use crate::error::{Error, Result};
use crate::progress::Progress;

/// Shows a URL to the user.
#[async_trait]
pub trait UrlOpener: Send + Sync {
    async fn open(&self, url: &str) -> Result<()>;
}

/// Opens URLs in the default browser.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemOpener;

fn open_command(url: &str) -> Command {
    if cfg!(target_os = "macos") {
        let mut command = Command::new("open");
        command.arg(url);
        command
    } else if cfg!(target_os = "windows") {
        let mut command = Command::new("cmd");
        command.args(["/C", "start", ""]).arg(url);
        command
    } else {
        let mut command = Command::new("xdg-open");
        command.arg(url);
        command
    }
}

#[async_trait]
impl UrlOpener for SystemOpener {
    async fn open(&self, url: &str) -> Result<()> {
        tracing::debug!(url = %url, "opening browser");
        let status = open_command(url).status().await?;
        if !status.success() {
            return Err(Error::Io(std::io::Error::other(format!(
                "could not open {} ({})",
                url, status
            ))));
        }
        Ok(())
    }
}

/// Prints URLs instead of opening them.
#[derive(Debug, Clone)]
pub struct PrintOpener {
    progress: Progress,
}

impl PrintOpener {
    pub fn new(progress: Progress) -> Self {
        Self { progress }
    }
}

#[async_trait]
impl UrlOpener for PrintOpener {
    async fn open(&self, url: &str) -> Result<()> {
        self.progress.log(url);
        Ok(())
    }
}
