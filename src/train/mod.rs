//! Embedding training for datasets produced by filter tasks.
//!
//! A train task runs in four steps:
//!
//! 1. The dataset's n-gram rows are passed through [`PhraseDetector`], which
//!    collapses frequent collocations such as `back pain` into single
//!    tokens, and written to a line-oriented corpus file.
//! 2. A [`ComputeBackend`] trains word vectors on that file. The production
//!    backend runs a container; see [`ContainerComputeBackend`].
//! 3. The resulting vector file is parsed into an [`EmbeddingTable`] and
//!    projected to two dimensions by a [`Projector`].
//! 4. [`TrainHandler`] stages the model, which the scheduler commits
//!    together with the task's end time.

mod backend;
mod container;
mod corpus_file;
mod embeddings;
mod error;
mod handler;
mod phrases;
mod projection;

pub use backend::{ComputeBackend, ComputeError};
pub use container::{
    ContainerComputeBackend, DEFAULT_BACKEND_IMAGE, EVAL_DATA_PATH, SAVE_MOUNT, TRAIN_MOUNT,
};
pub use corpus_file::{CORPUS_FILE_NAME, corpus_lines, write_corpus};
pub use embeddings::{EmbeddingParseError, EmbeddingTable, Neighbour, UnknownWord};
pub use error::TrainError;
pub use handler::TrainHandler;
pub use phrases::{PhraseDetector, Phraser};
pub use projection::{ProjectionError, Projector, TsneProjector};

#[cfg(test)]
mod tests;
