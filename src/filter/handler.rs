//! Task handler turning a keyword phrase into a dataset.

use crate::scheduler::{HandlerError, TaskHandler, WorkContext};
use crate::task::{
    domain::{DatasetId, NewDataset, TaskKind, TaskOutput, TaskPayload},
    ports::CorpusReader,
};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

/// Handler for [`TaskKind::Filter`] tasks.
///
/// Matching is exact on the normalised phrase, never a substring match, so
/// a phrase with no matching documents yields an empty dataset rather than
/// an error.
#[derive(Debug)]
pub struct FilterHandler<R>
where
    R: CorpusReader,
{
    corpus: Arc<R>,
}

impl<R> FilterHandler<R>
where
    R: CorpusReader,
{
    /// Creates a handler reading from `corpus`.
    #[must_use]
    pub const fn new(corpus: Arc<R>) -> Self {
        Self { corpus }
    }
}

#[async_trait]
impl<R> TaskHandler for FilterHandler<R>
where
    R: CorpusReader + 'static,
{
    fn kind(&self) -> TaskKind {
        TaskKind::Filter
    }

    async fn execute(&self, ctx: &mut WorkContext) -> Result<(), HandlerError> {
        let task = ctx.task();
        let TaskPayload::Filter { keywords } = task.payload() else {
            return Err(HandlerError::UnexpectedPayload {
                expected: TaskKind::Filter,
                found: task.kind(),
            });
        };
        let task_id = task.id();
        let keywords = keywords.clone();

        let documents = self.corpus.matching_documents(&keywords).await?;
        info!(%task_id, %keywords, matched = documents.len(), "filter matched documents");

        ctx.stage(TaskOutput::Dataset(NewDataset {
            id: DatasetId::new(),
            keywords,
            documents,
        }))
    }
}
