//! Task aggregate root and its derived lifecycle status.

use super::{
    DatasetId, Hyperparameters, KeywordPhrase, OwnerId, TaskDomainError, TaskId, TaskKind,
    TaskResultRef,
};
use chrono::{DateTime, Utc};
use mockable::Clock;
use serde::{Deserialize, Serialize};

/// Kind-specific input of a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskPayload {
    /// Select the corpus documents tagged with a keyword phrase.
    Filter {
        /// Normalised phrase to match.
        keywords: KeywordPhrase,
    },
    /// Train embeddings on a previously filtered dataset.
    Train {
        /// Dataset whose n-grams form the training corpus.
        dataset: DatasetId,
        /// Training parameters forwarded to the compute backend.
        hparams: Hyperparameters,
    },
}

impl TaskPayload {
    /// Returns the task kind this payload belongs to.
    #[must_use]
    pub const fn kind(&self) -> TaskKind {
        match self {
            Self::Filter { .. } => TaskKind::Filter,
            Self::Train { .. } => TaskKind::Train,
        }
    }
}

/// Lifecycle status derived from the task timestamps and result reference.
///
/// Never stored; always recomputed from the row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Waiting to be claimed.
    Queued,
    /// Claimed, no end time yet. Also the state a task is stuck in when the
    /// worker died mid-run.
    Running,
    /// Finished with a result reference.
    Succeeded,
    /// Finished without a result reference.
    Failed,
}

/// Task aggregate root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    id: TaskId,
    owner: OwnerId,
    payload: TaskPayload,
    result: Option<TaskResultRef>,
    created_at: DateTime<Utc>,
    start_time: Option<DateTime<Utc>>,
    end_time: Option<DateTime<Utc>>,
}

/// Parameter object for reconstructing a persisted task aggregate.
#[derive(Debug, Clone, PartialEq)]
pub struct PersistedTaskData {
    /// Persisted task identifier.
    pub id: TaskId,
    /// Persisted submitting user.
    pub owner: OwnerId,
    /// Persisted kind-specific payload.
    pub payload: TaskPayload,
    /// Persisted result reference, if any.
    pub result: Option<TaskResultRef>,
    /// Persisted creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Persisted claim timestamp.
    pub start_time: Option<DateTime<Utc>>,
    /// Persisted finalisation timestamp.
    pub end_time: Option<DateTime<Utc>>,
}

impl Task {
    /// Creates a queued filter task.
    #[must_use]
    pub fn new_filter(owner: OwnerId, keywords: KeywordPhrase, clock: &impl Clock) -> Self {
        Self::queued(owner, TaskPayload::Filter { keywords }, clock)
    }

    /// Creates a queued train task.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::InvalidHyperparameter`] when the bundle
    /// fails validation.
    pub fn new_train(
        owner: OwnerId,
        dataset: DatasetId,
        hparams: Hyperparameters,
        clock: &impl Clock,
    ) -> Result<Self, TaskDomainError> {
        hparams.validate()?;
        Ok(Self::queued(
            owner,
            TaskPayload::Train { dataset, hparams },
            clock,
        ))
    }

    fn queued(owner: OwnerId, payload: TaskPayload, clock: &impl Clock) -> Self {
        Self {
            id: TaskId::new(),
            owner,
            payload,
            result: None,
            created_at: clock.utc(),
            start_time: None,
            end_time: None,
        }
    }

    /// Reconstructs a task from persisted storage.
    #[must_use]
    pub fn from_persisted(data: PersistedTaskData) -> Self {
        Self {
            id: data.id,
            owner: data.owner,
            payload: data.payload,
            result: data.result,
            created_at: data.created_at,
            start_time: data.start_time,
            end_time: data.end_time,
        }
    }

    /// Returns the task identifier.
    #[must_use]
    pub const fn id(&self) -> TaskId {
        self.id
    }

    /// Returns the submitting user.
    #[must_use]
    pub const fn owner(&self) -> OwnerId {
        self.owner
    }

    /// Returns the kind-specific payload.
    #[must_use]
    pub const fn payload(&self) -> &TaskPayload {
        &self.payload
    }

    /// Returns the task kind.
    #[must_use]
    pub const fn kind(&self) -> TaskKind {
        self.payload.kind()
    }

    /// Returns the result reference, if one has been committed.
    #[must_use]
    pub const fn result(&self) -> Option<TaskResultRef> {
        self.result
    }

    /// Returns the creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns the claim timestamp.
    #[must_use]
    pub const fn start_time(&self) -> Option<DateTime<Utc>> {
        self.start_time
    }

    /// Returns the finalisation timestamp.
    #[must_use]
    pub const fn end_time(&self) -> Option<DateTime<Utc>> {
        self.end_time
    }

    /// Returns `true` once a scheduler has claimed the task.
    #[must_use]
    pub const fn is_claimed(&self) -> bool {
        self.start_time.is_some()
    }

    /// Returns `true` once the task has been finalised.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.end_time.is_some()
    }

    /// Returns `true` when the task finished without producing a result.
    #[must_use]
    pub const fn is_error(&self) -> bool {
        self.is_complete() && self.result.is_none()
    }

    /// Returns `true` when the task was claimed but never finalised.
    #[must_use]
    pub const fn is_stalled(&self) -> bool {
        self.is_claimed() && !self.is_complete()
    }

    /// Returns the derived lifecycle status.
    #[must_use]
    pub const fn status(&self) -> TaskStatus {
        match (self.start_time, self.end_time, self.result) {
            (None, _, _) => TaskStatus::Queued,
            (Some(_), None, _) => TaskStatus::Running,
            (Some(_), Some(_), Some(_)) => TaskStatus::Succeeded,
            (Some(_), Some(_), None) => TaskStatus::Failed,
        }
    }

    /// Records the claim time.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::AlreadyStarted`] when a start time is
    /// already set.
    pub const fn start(&mut self, at: DateTime<Utc>) -> Result<(), TaskDomainError> {
        if self.start_time.is_some() {
            return Err(TaskDomainError::AlreadyStarted(self.id));
        }
        self.start_time = Some(at);
        Ok(())
    }

    /// Finalises the task with its result reference.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::ResultKindMismatch`] when the reference
    /// belongs to another kind, or the errors of [`Self::fail`].
    pub fn complete(
        &mut self,
        result: TaskResultRef,
        at: DateTime<Utc>,
    ) -> Result<(), TaskDomainError> {
        if result.kind() != self.kind() {
            return Err(TaskDomainError::ResultKindMismatch {
                task_id: self.id,
                expected: self.kind(),
            });
        }
        self.ensure_finishable()?;
        self.result = Some(result);
        self.end_time = Some(at);
        Ok(())
    }

    /// Finalises the task without a result.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::NotStarted`] when the task was never
    /// claimed or [`TaskDomainError::AlreadyFinished`] when it already has an
    /// end time.
    pub fn fail(&mut self, at: DateTime<Utc>) -> Result<(), TaskDomainError> {
        self.ensure_finishable()?;
        self.end_time = Some(at);
        Ok(())
    }

    /// Clears the claim of a stalled task so a worker picks it up again.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::NotStalled`] unless the task is claimed and
    /// unfinished.
    pub const fn requeue(&mut self) -> Result<(), TaskDomainError> {
        if !self.is_stalled() {
            return Err(TaskDomainError::NotStalled(self.id));
        }
        self.start_time = None;
        Ok(())
    }

    fn ensure_finishable(&self) -> Result<(), TaskDomainError> {
        if self.start_time.is_none() {
            return Err(TaskDomainError::NotStarted(self.id));
        }
        if self.end_time.is_some() {
            return Err(TaskDomainError::AlreadyFinished(self.id));
        }
        Ok(())
    }
}

/// Optional filters on the derived status flags, as exposed by the task
/// listing endpoints.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusFilter {
    /// Keep only tasks whose `is_complete` equals this value.
    pub is_complete: Option<bool>,
    /// Keep only tasks whose `is_error` equals this value.
    pub is_error: Option<bool>,
}

impl StatusFilter {
    /// Filter that keeps every task.
    #[must_use]
    pub const fn any() -> Self {
        Self {
            is_complete: None,
            is_error: None,
        }
    }

    /// Restricts to complete or incomplete tasks.
    #[must_use]
    pub const fn with_complete(mut self, is_complete: bool) -> Self {
        self.is_complete = Some(is_complete);
        self
    }

    /// Restricts to errored or non-errored tasks.
    #[must_use]
    pub const fn with_error(mut self, is_error: bool) -> Self {
        self.is_error = Some(is_error);
        self
    }

    /// Returns `true` when the task passes every set filter.
    #[must_use]
    pub fn matches(&self, task: &Task) -> bool {
        self.is_complete
            .is_none_or(|expected| task.is_complete() == expected)
            && self.is_error.is_none_or(|expected| task.is_error() == expected)
    }
}
