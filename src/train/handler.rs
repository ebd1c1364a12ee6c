//! Task handler turning a dataset into a trained embedding model.

use super::{ComputeBackend, EmbeddingTable, Projector, TrainError, write_corpus};
use crate::scheduler::{HandlerError, TaskHandler, WorkContext};
use crate::task::{
    domain::{
        CorpusNgram, Hyperparameters, NewTrainedModel, TaskKind, TaskOutput, TaskPayload,
        TrainedModelId, Visualization,
    },
    ports::CorpusReader,
};
use async_trait::async_trait;
use camino::{Utf8Path, Utf8PathBuf};
use std::sync::Arc;
use tokio::task::spawn_blocking;
use tracing::info;

/// Handler for [`TaskKind::Train`] tasks.
///
/// The vector file is written under `data_root` and registered with the
/// unit of work before the backend runs, so a failure at any later step
/// removes it again.
#[derive(Debug)]
pub struct TrainHandler<R, B, P>
where
    R: CorpusReader,
    B: ComputeBackend,
    P: Projector,
{
    corpus: Arc<R>,
    backend: Arc<B>,
    projector: Arc<P>,
    data_root: Utf8PathBuf,
}

impl<R, B, P> TrainHandler<R, B, P>
where
    R: CorpusReader + 'static,
    B: ComputeBackend + 'static,
    P: Projector + 'static,
{
    /// Creates a handler writing vector files below `data_root`.
    #[must_use]
    pub fn new(
        corpus: Arc<R>,
        backend: Arc<B>,
        projector: Arc<P>,
        data_root: impl Into<Utf8PathBuf>,
    ) -> Self {
        Self {
            corpus,
            backend,
            projector,
            data_root: data_root.into(),
        }
    }

    /// Directory holding the vector files of trained models.
    #[must_use]
    pub fn data_root(&self) -> &Utf8Path {
        &self.data_root
    }

    /// Location of the vector file for `model`.
    #[must_use]
    pub fn embeddings_path(&self, model: TrainedModelId) -> Utf8PathBuf {
        self.data_root.join(format!("embeddings_{model}.txt"))
    }

    async fn train_model(
        &self,
        ngrams: Vec<CorpusNgram>,
        hparams: Hyperparameters,
        embeddings_path: &Utf8Path,
    ) -> Result<Visualization, TrainError> {
        tokio::fs::create_dir_all(&self.data_root)
            .await
            .map_err(TrainError::Corpus)?;
        let scratch = tempfile::tempdir().map_err(TrainError::Corpus)?;
        let scratch_dir = Utf8Path::from_path(scratch.path())
            .map(Utf8Path::to_path_buf)
            .ok_or_else(|| {
                TrainError::Corpus(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    "scratch directory is not UTF-8",
                ))
            })?;

        let corpus_path = spawn_blocking(move || write_corpus(&scratch_dir, &ngrams))
            .await?
            .map_err(TrainError::Corpus)?;
        info!(corpus = %corpus_path, embeddings = %embeddings_path, "training embeddings");
        self.backend
            .train(&corpus_path, embeddings_path, &hparams)
            .await?;

        let path = embeddings_path.to_path_buf();
        let table = spawn_blocking(move || EmbeddingTable::load(&path)).await??;
        if table.is_empty() {
            return Err(TrainError::EmptyVocabulary);
        }
        info!(words = table.len(), dim = table.dim(), "projecting vocabulary");

        let projector = Arc::clone(&self.projector);
        Ok(spawn_blocking(move || projector.project(&table)).await??)
    }
}

#[async_trait]
impl<R, B, P> TaskHandler for TrainHandler<R, B, P>
where
    R: CorpusReader + 'static,
    B: ComputeBackend + 'static,
    P: Projector + 'static,
{
    fn kind(&self) -> TaskKind {
        TaskKind::Train
    }

    async fn execute(&self, ctx: &mut WorkContext) -> Result<(), HandlerError> {
        let task = ctx.task();
        let TaskPayload::Train { dataset, hparams } = task.payload() else {
            return Err(HandlerError::UnexpectedPayload {
                expected: TaskKind::Train,
                found: task.kind(),
            });
        };
        let task_id = task.id();
        let (dataset, hparams) = (*dataset, *hparams);

        let ngrams = self.corpus.dataset_ngrams(dataset).await?;
        info!(%task_id, %dataset, rows = ngrams.len(), "loaded dataset n-grams");

        let model_id = TrainedModelId::new();
        let embeddings_path = self.embeddings_path(model_id);
        ctx.register_artifact(embeddings_path.clone());

        let visualization = self
            .train_model(ngrams, hparams, &embeddings_path)
            .await?;
        info!(%task_id, %model_id, points = visualization.len(), "trained model");
        ctx.stage(TaskOutput::Model(NewTrainedModel {
            id: model_id,
            embeddings_path,
            visualization,
        }))
    }
}
