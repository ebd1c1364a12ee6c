//! Service layer for submitting, listing and recovering tasks.

use crate::task::{
    domain::{
        DatasetId, Hyperparameters, KeywordPhrase, OwnerId, StatusFilter, Task, TaskDomainError,
        TaskId, TaskKind,
    },
    ports::{TaskStore, TaskStoreError},
};
use mockable::Clock;
use std::sync::Arc;
use thiserror::Error;

/// Service-level errors for task submission.
#[derive(Debug, Error)]
pub enum SubmissionError {
    /// Domain validation failed.
    #[error(transparent)]
    Domain(#[from] TaskDomainError),
    /// A train task referenced a dataset that has not been committed.
    #[error("dataset not found: {0}")]
    DatasetNotFound(DatasetId),
    /// The task does not exist.
    #[error("task not found: {0}")]
    TaskNotFound(TaskId),
    /// Store operation failed.
    #[error(transparent)]
    Store(#[from] TaskStoreError),
}

/// Result type for submission service operations.
pub type SubmissionResult<T> = Result<T, SubmissionError>;

/// Inserts tasks into their queues and exposes the listings used by the API
/// layer and by operators.
#[derive(Clone)]
pub struct TaskSubmissionService<S, C>
where
    S: TaskStore,
    C: Clock + Send + Sync,
{
    store: Arc<S>,
    clock: Arc<C>,
}

impl<S, C> TaskSubmissionService<S, C>
where
    S: TaskStore,
    C: Clock + Send + Sync,
{
    /// Creates a new submission service.
    #[must_use]
    pub const fn new(store: Arc<S>, clock: Arc<C>) -> Self {
        Self { store, clock }
    }

    /// Queues a filter task for the phrase formed by `keywords`.
    ///
    /// # Errors
    ///
    /// Returns [`SubmissionError::Domain`] when the keywords are blank and
    /// [`SubmissionError::Store`] when the insert fails.
    pub async fn submit_filter<I, K>(&self, owner: OwnerId, keywords: I) -> SubmissionResult<Task>
    where
        I: IntoIterator<Item = K> + Send,
        K: AsRef<str>,
    {
        let phrase = KeywordPhrase::from_keywords(keywords)?;
        let task = Task::new_filter(owner, phrase.clone(), &*self.clock);
        self.store.insert(&task).await?;
        tracing::info!(task_id = %task.id(), keywords = %phrase, "filter task queued");
        Ok(task)
    }

    /// Queues a train task on a committed dataset.
    ///
    /// # Errors
    ///
    /// Returns [`SubmissionError::DatasetNotFound`] when the dataset does not
    /// exist, [`SubmissionError::Domain`] when the hyperparameters are out of
    /// range and [`SubmissionError::Store`] when persistence fails.
    pub async fn submit_train(
        &self,
        owner: OwnerId,
        dataset: DatasetId,
        hparams: Hyperparameters,
    ) -> SubmissionResult<Task> {
        if self.store.find_dataset(dataset).await?.is_none() {
            return Err(SubmissionError::DatasetNotFound(dataset));
        }
        let task = Task::new_train(owner, dataset, hparams, &*self.clock)?;
        self.store.insert(&task).await?;
        tracing::info!(task_id = %task.id(), %dataset, "train task queued");
        Ok(task)
    }

    /// Retrieves a task by identifier.
    ///
    /// # Errors
    ///
    /// Returns [`SubmissionError::Store`] when the lookup fails.
    pub async fn find(&self, id: TaskId) -> SubmissionResult<Option<Task>> {
        Ok(self.store.find_by_id(id).await?)
    }

    /// Lists an owner's tasks of one kind, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`SubmissionError::Store`] when the lookup fails.
    pub async fn list_for_owner(
        &self,
        owner: OwnerId,
        kind: TaskKind,
        filter: StatusFilter,
    ) -> SubmissionResult<Vec<Task>> {
        Ok(self.store.list_for_owner(owner, kind, filter).await?)
    }

    /// Lists claimed tasks that never finished.
    ///
    /// # Errors
    ///
    /// Returns [`SubmissionError::Store`] when the lookup fails.
    pub async fn list_stalled(&self, kind: TaskKind) -> SubmissionResult<Vec<Task>> {
        Ok(self.store.list_stalled(kind).await?)
    }

    /// Makes a stalled task eligible for claiming again.
    ///
    /// Only call this once the worker that claimed the task is known to be
    /// gone; otherwise the task runs twice.
    ///
    /// # Errors
    ///
    /// Returns [`SubmissionError::TaskNotFound`] for unknown tasks and a
    /// lifecycle [`SubmissionError::Store`] error when the task is not
    /// stalled.
    pub async fn requeue(&self, id: TaskId) -> SubmissionResult<Task> {
        match self.store.requeue(id).await {
            Err(TaskStoreError::NotFound(missing)) => {
                return Err(SubmissionError::TaskNotFound(missing));
            }
            result => result?,
        }
        let task = self
            .store
            .find_by_id(id)
            .await?
            .ok_or(SubmissionError::TaskNotFound(id))?;
        tracing::warn!(task_id = %id, kind = %task.kind(), "stalled task requeued");
        Ok(task)
    }
}
