//! Durable artifacts produced by tasks: datasets and trained models.

use super::{DatasetId, DocumentKey, KeywordPhrase, TaskKind, TrainedModelId};
use camino::Utf8PathBuf;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Subset of the corpus selected by a filter task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dataset {
    /// Dataset identifier.
    pub id: DatasetId,
    /// Phrase the dataset was filtered on.
    pub keywords: KeywordPhrase,
    /// Number of corpus documents that matched.
    pub document_count: u64,
    /// When the dataset was committed.
    pub created_at: DateTime<Utc>,
}

/// Trained embedding model produced by a train task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainedModel {
    /// Model identifier.
    pub id: TrainedModelId,
    /// Location of the raw word-vector file.
    pub embeddings_path: Utf8PathBuf,
    /// Two-dimensional projection of the vocabulary.
    pub visualization: Visualization,
    /// When the model was committed.
    pub created_at: DateTime<Utc>,
}

/// Two-dimensional layout of a vocabulary, one point per label.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Visualization {
    /// Words in vocabulary order.
    pub labels: Vec<String>,
    /// Horizontal coordinates.
    pub x: Vec<f64>,
    /// Vertical coordinates.
    pub y: Vec<f64>,
}

impl Visualization {
    /// Number of plotted points.
    #[must_use]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Returns `true` when nothing is plotted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// One n-gram row of a document in a dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorpusNgram {
    /// Lower-cased n-gram text, tokens separated by single spaces.
    pub ngram: String,
    /// Occurrences of the n-gram in its document.
    pub count: u64,
}

impl CorpusNgram {
    /// Creates an n-gram row.
    #[must_use]
    pub fn new(ngram: impl Into<String>, count: u64) -> Self {
        Self {
            ngram: ngram.into(),
            count,
        }
    }
}

/// Dataset staged by a filter handler and written when the task completes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewDataset {
    /// Identifier reserved for the dataset.
    pub id: DatasetId,
    /// Phrase the dataset was filtered on.
    pub keywords: KeywordPhrase,
    /// Distinct matching documents.
    pub documents: Vec<DocumentKey>,
}

/// Trained model staged by a train handler and written when the task
/// completes.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTrainedModel {
    /// Identifier reserved for the model.
    pub id: TrainedModelId,
    /// Location of the raw word-vector file.
    pub embeddings_path: Utf8PathBuf,
    /// Two-dimensional projection of the vocabulary.
    pub visualization: Visualization,
}

/// The single result a handler stages in its unit of work.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutput {
    /// Output of a filter task.
    Dataset(NewDataset),
    /// Output of a train task.
    Model(NewTrainedModel),
}

impl TaskOutput {
    /// Task kind able to hold this output.
    #[must_use]
    pub const fn kind(&self) -> TaskKind {
        match self {
            Self::Dataset(_) => TaskKind::Filter,
            Self::Model(_) => TaskKind::Train,
        }
    }

    /// Result reference the task points at once the output is committed.
    #[must_use]
    pub const fn result_ref(&self) -> TaskResultRef {
        match self {
            Self::Dataset(dataset) => TaskResultRef::Dataset(dataset.id),
            Self::Model(model) => TaskResultRef::Model(model.id),
        }
    }
}

/// Foreign link from a task to the artifact it produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum TaskResultRef {
    /// Dataset produced by a filter task.
    Dataset(DatasetId),
    /// Model produced by a train task.
    Model(TrainedModelId),
}

impl TaskResultRef {
    /// Task kind that produces this reference.
    #[must_use]
    pub const fn kind(self) -> TaskKind {
        match self {
            Self::Dataset(_) => TaskKind::Filter,
            Self::Model(_) => TaskKind::Train,
        }
    }
}
