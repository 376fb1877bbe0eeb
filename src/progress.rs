//! Step progress reporting.
//!
//! A [`Progress`] is created once per run and handed to every task through
//! the run configuration. It keeps a stack of the steps currently in flight;
//! only the top-most one is the active indicator.

use std::fmt;
use std::future::Future;
use std::io::{self, IsTerminal, Write};
use std::sync::{Arc, Mutex, PoisonError};

use anstyle::{AnsiColor, Color, Style};

use crate::error::Result;

struct Inner {
    sink: Box<dyn Write + Send>,
    styled: bool,
    steps: Vec<String>,
}

impl Inner {
    fn line(&mut self, style: Style, text: &str) {
        let result = if self.styled {
            writeln!(self.sink, "{style}{text}{style:#}")
        } else {
            writeln!(self.sink, "{text}")
        };
        if let Err(e) = result.and_then(|_| self.sink.flush()) {
            tracing::debug!(error = %e, "failed to write progress line");
        }
    }

    fn pop_step(&mut self, label: &str) {
        if let Some(pos) = self.steps.iter().rposition(|step| step == label) {
            self.steps.remove(pos);
        }
    }

    fn finish(&mut self, label: &str, mark: &str, color: AnsiColor) {
        self.pop_step(label);
        self.line(fg(color), &format!("{mark} {label}"));
    }
}

/// Removes a step that was dropped before it finished.
struct PendingStep<'a> {
    progress: &'a Progress,
    label: String,
    finished: bool,
}

impl Drop for PendingStep<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.progress.lock().pop_step(&self.label);
        }
    }
}

fn fg(color: AnsiColor) -> Style {
    Style::new().fg_color(Some(Color::Ansi(color)))
}

/// Reports step outcomes and messages to the terminal.
///
/// Clones share the same output and step stack.
#[derive(Clone)]
pub struct Progress {
    inner: Arc<Mutex<Inner>>,
}

impl fmt::Debug for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Progress")
            .field("active", &self.active())
            .finish()
    }
}

impl Default for Progress {
    fn default() -> Self {
        Self::stderr()
    }
}

impl Progress {
    /// Reports to stderr, styled when stderr is a terminal.
    pub fn stderr() -> Self {
        let styled = io::stderr().is_terminal();
        Self::with_sink(io::stderr(), styled)
    }

    /// Reports to an arbitrary writer.
    pub fn with_sink(sink: impl Write + Send + 'static, styled: bool) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                sink: Box::new(sink),
                styled,
                steps: Vec::new(),
            })),
        }
    }

    /// Reports into an in-memory buffer, unstyled.
    pub fn buffered() -> (Self, Buffer) {
        let buffer = Buffer::default();
        (Self::with_sink(buffer.clone(), false), buffer)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Label of the active step, if any.
    pub fn active(&self) -> Option<String> {
        self.lock().steps.last().cloned()
    }

    /// Runs `future` as a labelled step, reporting success or failure.
    pub async fn track<T, F>(&self, label: impl Into<String>, future: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let label = label.into();
        self.lock().steps.push(label.clone());
        let mut step = PendingStep {
            progress: self,
            label,
            finished: false,
        };

        let outcome = future.await;
        step.finished = true;
        let mut inner = self.lock();
        match &outcome {
            Ok(_) => inner.finish(&step.label, "✔", AnsiColor::Green),
            Err(_) => inner.finish(&step.label, "✖", AnsiColor::Red),
        }
        outcome
    }

    /// Writes a plain line.
    pub fn log(&self, msg: impl AsRef<str>) -> &Self {
        self.lock().line(Style::new(), msg.as_ref());
        self
    }

    /// Writes an informational line.
    pub fn info(&self, msg: impl AsRef<str>) -> &Self {
        self.lock()
            .line(fg(AnsiColor::Cyan), &format!("  {}", msg.as_ref()));
        self
    }

    /// Writes a warning line.
    pub fn warn(&self, msg: impl AsRef<str>) -> &Self {
        self.lock()
            .line(fg(AnsiColor::Yellow), &format!("  {}", msg.as_ref()));
        self
    }

    /// Writes an error line.
    pub fn error(&self, msg: impl AsRef<str>) -> &Self {
        self.lock()
            .line(fg(AnsiColor::Red), &format!("  {}", msg.as_ref()));
        self
    }

    /// Writes a bold line.
    pub fn headline(&self, msg: impl AsRef<str>) -> &Self {
        self.lock().line(Style::new().bold(), msg.as_ref());
        self
    }

    /// Drops every pending step.
    pub fn clear(&self) -> &Self {
        self.lock().steps.clear();
        self
    }
}

/// Shared in-memory sink.
#[derive(Debug, Clone, Default)]
pub struct Buffer(Arc<Mutex<Vec<u8>>>);

impl Buffer {
    /// Everything written so far.
    pub fn contents(&self) -> String {
        let bytes = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

impl Write for Buffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[tokio::test]
    async fn track_reports_success_and_failure() {
        let (progress, buffer) = Progress::buffered();

        let value = progress.track("Loading tags", async { Ok(3) }).await.unwrap();
        assert_eq!(value, 3);

        let err = progress
            .track("Uploading", async {
                Err::<(), _>(Error::Upload)
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Upload));

        assert_eq!(buffer.contents(), "✔ Loading tags\n✖ Uploading\n");
        assert_eq!(progress.active(), None);
    }

    #[tokio::test]
    async fn nested_steps_keep_a_single_active_indicator() {
        let (progress, _buffer) = Progress::buffered();
        let outer = progress.clone();

        progress
            .track("outer", async {
                assert_eq!(outer.active().as_deref(), Some("outer"));
                outer
                    .track("inner", async {
                        assert_eq!(outer.active().as_deref(), Some("inner"));
                        Ok(())
                    })
                    .await?;
                assert_eq!(outer.active().as_deref(), Some("outer"));
                Ok(())
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn dropped_step_leaves_no_active_indicator() {
        let (progress, buffer) = Progress::buffered();

        let stalled = progress.track("Stalled", std::future::pending::<Result<()>>());
        let timed_out = tokio::time::timeout(std::time::Duration::from_millis(10), stalled).await;

        assert!(timed_out.is_err());
        assert_eq!(progress.active(), None);
        assert_eq!(buffer.contents(), "");
    }

    #[test]
    fn messages_are_indented() {
        let (progress, buffer) = Progress::buffered();
        progress.info("No existing release").warn("careful").log("plain");
        assert_eq!(buffer.contents(), "  No existing release\n  careful\nplain\n");
    }

    #[test]
    fn styled_output_wraps_in_escape_codes() {
        let buffer = Buffer::default();
        let progress = Progress::with_sink(buffer.clone(), true);
        progress.error("boom");
        let out = buffer.contents();
        assert!(out.contains("\u{1b}["));
        assert!(out.contains("  boom"));
    }
}
