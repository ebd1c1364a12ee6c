//! Domain model for queued tasks.
//!
//! A task is one row in a per-kind queue. Its status is derived purely from
//! the `start_time`, `end_time` and result reference columns; the aggregate
//! enforces the order in which those may be set.

mod artifacts;
mod error;
mod hparams;
mod ids;
mod keywords;
mod kind;
mod task;

pub use artifacts::{
    CorpusNgram, Dataset, NewDataset, NewTrainedModel, TaskOutput, TaskResultRef, TrainedModel,
    Visualization,
};
pub use error::{ParseTaskKindError, TaskDomainError};
pub use hparams::Hyperparameters;
pub use ids::{DatasetId, DocumentKey, OwnerId, TaskId, TrainedModelId};
pub use keywords::KeywordPhrase;
pub use kind::TaskKind;
pub use task::{PersistedTaskData, StatusFilter, Task, TaskPayload, TaskStatus};
