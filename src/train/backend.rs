//! Compute backend port: the external trainer producing word vectors.

use crate::task::domain::Hyperparameters;
use async_trait::async_trait;
use camino::{Utf8Path, Utf8PathBuf};
use std::process::ExitStatus;
use thiserror::Error;

/// Trains word vectors from a corpus file.
///
/// The call blocks the worker until training finishes. On success a vector
/// file exists at `output`; on failure nothing is guaranteed about
/// `output`, and the caller removes it.
#[async_trait]
pub trait ComputeBackend: Send + Sync {
    /// Trains on `corpus` with `hparams` and writes the vectors to `output`.
    ///
    /// # Errors
    ///
    /// Returns [`ComputeError`] when the backend cannot be launched, exits
    /// unsuccessfully, or leaves no vector file behind.
    async fn train(
        &self,
        corpus: &Utf8Path,
        output: &Utf8Path,
        hparams: &Hyperparameters,
    ) -> Result<(), ComputeError>;
}

/// Errors returned by compute backends.
#[derive(Debug, Error)]
pub enum ComputeError {
    /// A path handed to the backend has no usable file or directory part.
    #[error("unusable backend path: {0}")]
    InvalidPath(Utf8PathBuf),

    /// The backend process could not be started.
    #[error("failed to launch compute backend: {0}")]
    Launch(#[source] std::io::Error),

    /// The backend exited unsuccessfully.
    #[error("compute backend exited with {status}: {detail}")]
    Exited {
        /// Exit status of the backend process.
        status: ExitStatus,
        /// Last diagnostic line the backend printed.
        detail: String,
    },

    /// The backend finished without writing a vector file.
    #[error("compute backend wrote no embeddings file to {0}")]
    MissingOutput(Utf8PathBuf),

    /// Moving files into or out of the backend's scratch space failed.
    #[error("compute backend I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// The backend reported a failure of its own.
    #[error("compute backend failed: {0}")]
    Backend(String),
}
