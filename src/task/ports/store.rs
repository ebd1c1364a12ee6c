//! Task Store port: persistence, FIFO discovery and lifecycle bookkeeping.

use crate::task::domain::{
    Dataset, DatasetId, OwnerId, StatusFilter, Task, TaskDomainError, TaskId, TaskKind,
    TaskOutput, TaskResultRef, TrainedModel, TrainedModelId,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;

/// Result type for task store operations.
pub type TaskStoreResult<T> = Result<T, TaskStoreError>;

/// Task persistence contract.
///
/// Every mutating method is its own commit boundary, so a crash between any
/// two calls leaves rows in a well-defined state.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Stores a new queued task.
    ///
    /// # Errors
    ///
    /// Returns [`TaskStoreError::DuplicateTask`] when the identifier exists.
    async fn insert(&self, task: &Task) -> TaskStoreResult<()>;

    /// Finds a task by identifier.
    async fn find_by_id(&self, id: TaskId) -> TaskStoreResult<Option<Task>>;

    /// Returns the oldest task of `kind` that has never been claimed.
    ///
    /// Read-only: calling it twice without an intervening
    /// [`TaskStore::mark_started`] returns the same task.
    async fn next_unclaimed(&self, kind: TaskKind) -> TaskStoreResult<Option<Task>>;

    /// Records the claim time of a task.
    ///
    /// # Errors
    ///
    /// Returns [`TaskStoreError::NotFound`] or a
    /// [`TaskDomainError::AlreadyStarted`] lifecycle error.
    async fn mark_started(&self, id: TaskId, at: DateTime<Utc>) -> TaskStoreResult<()>;

    /// Writes the staged output and finalises the task in one transaction.
    ///
    /// Either the artifact rows, the result reference and the end time are
    /// all written, or none of them are.
    ///
    /// # Errors
    ///
    /// Returns lifecycle errors when the task is unclaimed, already finished
    /// or of another kind, and persistence errors when the write fails.
    async fn complete(
        &self,
        id: TaskId,
        output: &TaskOutput,
        at: DateTime<Utc>,
    ) -> TaskStoreResult<TaskResultRef>;

    /// Finalises the task without a result.
    ///
    /// # Errors
    ///
    /// Returns lifecycle errors when the task is unclaimed or already
    /// finished.
    async fn mark_failed(&self, id: TaskId, at: DateTime<Utc>) -> TaskStoreResult<()>;

    /// Clears the start time of a claimed, unfinished task.
    ///
    /// # Errors
    ///
    /// Returns a [`TaskDomainError::NotStalled`] lifecycle error for tasks
    /// that are queued or finished.
    async fn requeue(&self, id: TaskId) -> TaskStoreResult<()>;

    /// Lists claimed, unfinished tasks of `kind`, oldest first.
    async fn list_stalled(&self, kind: TaskKind) -> TaskStoreResult<Vec<Task>>;

    /// Lists tasks of `kind` submitted by `owner` that pass `filter`, oldest
    /// first.
    async fn list_for_owner(
        &self,
        owner: OwnerId,
        kind: TaskKind,
        filter: StatusFilter,
    ) -> TaskStoreResult<Vec<Task>>;

    /// Finds a committed dataset.
    async fn find_dataset(&self, id: DatasetId) -> TaskStoreResult<Option<Dataset>>;

    /// Finds a committed trained model.
    async fn find_trained_model(&self, id: TrainedModelId)
    -> TaskStoreResult<Option<TrainedModel>>;
}

/// Errors returned by task store implementations.
#[derive(Debug, Clone, Error)]
pub enum TaskStoreError {
    /// A task with the same identifier already exists.
    #[error("duplicate task identifier: {0}")]
    DuplicateTask(TaskId),

    /// The task was not found.
    #[error("task not found: {0}")]
    NotFound(TaskId),

    /// The requested transition is not allowed in the task's current state.
    #[error(transparent)]
    Lifecycle(#[from] TaskDomainError),

    /// Persistence-layer failure.
    #[error("persistence error: {0}")]
    Persistence(Arc<dyn std::error::Error + Send + Sync>),
}

impl TaskStoreError {
    /// Wraps a persistence error.
    pub fn persistence(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Persistence(Arc::new(err))
    }
}
