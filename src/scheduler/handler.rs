//! Task handler capability and the errors handlers report.

use super::WorkContext;
use crate::task::{
    domain::TaskKind,
    ports::{CorpusError, TaskStoreError},
};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Unit of work for one task kind.
///
/// Implementations read what they need through collaborators they own and
/// stage exactly one output on the [`WorkContext`]. They never write task
/// rows themselves: the runner commits the staged output together with the
/// end time, or discards it and records the failure.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    /// The task kind, and therefore the queue, this handler serves.
    fn kind(&self) -> TaskKind;

    /// Executes the claimed task in `ctx`.
    ///
    /// # Errors
    ///
    /// Any error fails the task. Outputs staged before the error are
    /// discarded and registered artifacts are removed.
    async fn execute(&self, ctx: &mut WorkContext) -> Result<(), HandlerError>;
}

/// Errors returned by task handlers.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// The claimed task carries another kind's payload.
    #[error("{expected} handler received a {found} task")]
    UnexpectedPayload {
        /// Kind served by the handler.
        expected: TaskKind,
        /// Kind of the claimed task.
        found: TaskKind,
    },

    /// An output was already staged in this unit of work.
    #[error("an output has already been staged for this task")]
    AlreadyStaged,

    /// The staged output belongs to another task kind.
    #[error("cannot stage a {found} output on a {expected} task")]
    OutputKindMismatch {
        /// Kind of the task being executed.
        expected: TaskKind,
        /// Kind of the staged output.
        found: TaskKind,
    },

    /// A corpus query failed.
    #[error(transparent)]
    Corpus(#[from] CorpusError),

    /// A task store lookup failed.
    #[error(transparent)]
    Store(#[from] TaskStoreError),

    /// Kind-specific execution failure.
    #[error("{0}")]
    Execution(Arc<dyn std::error::Error + Send + Sync>),
}

impl HandlerError {
    /// Wraps a kind-specific execution error.
    pub fn execution(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Execution(Arc::new(err))
    }
}
