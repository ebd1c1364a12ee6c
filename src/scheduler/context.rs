//! Explicit unit of work passed to task handlers.

use super::HandlerError;
use crate::task::domain::{Task, TaskOutput};
use camino::{Utf8Path, Utf8PathBuf};
use std::io::ErrorKind;

/// Staging area for one task execution.
///
/// Holds the claimed task, the single output the handler produced and the
/// files it wrote. Nothing here reaches the task store until the runner
/// commits it.
#[derive(Debug)]
pub struct WorkContext {
    task: Task,
    staged: Option<TaskOutput>,
    artifacts: Vec<Utf8PathBuf>,
}

impl WorkContext {
    /// Opens a unit of work for a claimed task.
    #[must_use]
    pub const fn new(task: Task) -> Self {
        Self {
            task,
            staged: None,
            artifacts: Vec::new(),
        }
    }

    /// Returns the claimed task.
    #[must_use]
    pub const fn task(&self) -> &Task {
        &self.task
    }

    /// Stages the task's output.
    ///
    /// # Errors
    ///
    /// Returns [`HandlerError::AlreadyStaged`] on a second call and
    /// [`HandlerError::OutputKindMismatch`] when the output belongs to
    /// another task kind.
    pub fn stage(&mut self, output: TaskOutput) -> Result<(), HandlerError> {
        if self.staged.is_some() {
            return Err(HandlerError::AlreadyStaged);
        }
        if output.kind() != self.task.kind() {
            return Err(HandlerError::OutputKindMismatch {
                expected: self.task.kind(),
                found: output.kind(),
            });
        }
        self.staged = Some(output);
        Ok(())
    }

    /// Records a file that must be removed if the task fails.
    pub fn register_artifact(&mut self, path: impl Into<Utf8PathBuf>) {
        self.artifacts.push(path.into());
    }

    /// Returns the staged output, if any.
    #[must_use]
    pub const fn staged(&self) -> Option<&TaskOutput> {
        self.staged.as_ref()
    }

    /// Returns the registered artifact paths.
    #[must_use]
    pub fn artifacts(&self) -> &[Utf8PathBuf] {
        &self.artifacts
    }

    /// Splits the unit of work into its staged output and artifacts.
    #[must_use]
    pub fn into_parts(self) -> (Option<TaskOutput>, Vec<Utf8PathBuf>) {
        (self.staged, self.artifacts)
    }
}

/// Deletes the artifacts of a failed unit of work.
///
/// Missing files are ignored; other failures are logged and skipped so the
/// task can still be finalised.
pub(crate) async fn remove_artifacts(paths: &[Utf8PathBuf]) {
    for path in paths {
        remove_artifact(path).await;
    }
}

async fn remove_artifact(path: &Utf8Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => tracing::debug!(%path, "removed artifact of failed task"),
        Err(err) if err.kind() == ErrorKind::NotFound => {}
        Err(err) => tracing::warn!(%path, error = %err, "failed to remove artifact"),
    }
}
