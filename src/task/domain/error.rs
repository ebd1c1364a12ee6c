//! Error types for task domain validation and lifecycle transitions.

use super::{TaskId, TaskKind};
use thiserror::Error;

/// Errors returned while constructing task values or moving a task through
/// its lifecycle.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TaskDomainError {
    /// The keyword list normalised to an empty phrase.
    #[error("keyword phrase must not be empty")]
    EmptyKeywords,

    /// A hyperparameter is outside its accepted range.
    #[error("invalid hyperparameter {name}: {reason}")]
    InvalidHyperparameter {
        /// Hyperparameter name as passed to the compute backend.
        name: &'static str,
        /// Why the value was rejected.
        reason: String,
    },

    /// The task already has a start time.
    #[error("task {0} has already been started")]
    AlreadyStarted(TaskId),

    /// The task has not been started yet.
    #[error("task {0} has not been started")]
    NotStarted(TaskId),

    /// The task already has an end time.
    #[error("task {0} has already finished")]
    AlreadyFinished(TaskId),

    /// The task is not in the started-but-unfinished state.
    #[error("task {0} is not stalled")]
    NotStalled(TaskId),

    /// The produced result does not belong to the task kind.
    #[error("task {task_id} of kind {expected} cannot hold that result")]
    ResultKindMismatch {
        /// Task receiving the result.
        task_id: TaskId,
        /// Kind of the task.
        expected: TaskKind,
    },
}

/// Error returned while parsing task kinds from text.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown task kind: {0}")]
pub struct ParseTaskKindError(pub String);
