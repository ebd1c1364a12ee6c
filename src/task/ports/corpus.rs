//! Corpus port: read access to the external literature corpus.

use crate::task::domain::{CorpusNgram, DatasetId, DocumentKey, KeywordPhrase};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Result type for corpus reads.
pub type CorpusResult<T> = Result<T, CorpusError>;

/// Read-only queries over the keyword-indexed corpus.
#[async_trait]
pub trait CorpusReader: Send + Sync {
    /// Returns the distinct documents whose normalised keyword field equals
    /// `keywords`, sorted by key.
    async fn matching_documents(&self, keywords: &KeywordPhrase)
    -> CorpusResult<Vec<DocumentKey>>;

    /// Returns every n-gram row of every document in a committed dataset.
    ///
    /// # Errors
    ///
    /// Returns [`CorpusError::UnknownDataset`] when the dataset does not
    /// exist.
    async fn dataset_ngrams(&self, dataset: DatasetId) -> CorpusResult<Vec<CorpusNgram>>;
}

/// Errors returned by corpus adapters.
#[derive(Debug, Clone, Error)]
pub enum CorpusError {
    /// The dataset has not been committed.
    #[error("unknown dataset: {0}")]
    UnknownDataset(DatasetId),

    /// Backend failure.
    #[error("corpus query failed: {0}")]
    Query(Arc<dyn std::error::Error + Send + Sync>),
}

impl CorpusError {
    /// Wraps a backend error.
    pub fn query(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Query(Arc::new(err))
    }
}
