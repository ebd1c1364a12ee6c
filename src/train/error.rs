//! Errors raised while executing a train task.

use super::{ComputeError, EmbeddingParseError, ProjectionError};
use crate::scheduler::HandlerError;
use thiserror::Error;

/// Failures of the steps between reading the dataset and staging the model.
#[derive(Debug, Error)]
pub enum TrainError {
    /// Preparing the scratch directory or corpus file failed.
    #[error("failed to write training corpus: {0}")]
    Corpus(#[source] std::io::Error),

    /// The compute backend failed.
    #[error(transparent)]
    Compute(#[from] ComputeError),

    /// The backend's vector file is malformed.
    #[error("invalid embeddings: {0}")]
    Embeddings(#[from] EmbeddingParseError),

    /// The backend produced no vectors at all.
    #[error("compute backend produced an empty vocabulary")]
    EmptyVocabulary,

    /// Projecting the vectors failed.
    #[error(transparent)]
    Projection(#[from] ProjectionError),

    /// A blocking step was cancelled or panicked.
    #[error("blocking training step did not finish: {0}")]
    Blocking(#[from] tokio::task::JoinError),
}

impl From<TrainError> for HandlerError {
    fn from(err: TrainError) -> Self {
        Self::execution(err)
    }
}
