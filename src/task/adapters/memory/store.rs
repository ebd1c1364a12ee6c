//! In-memory task store and corpus for scheduler tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::task::{
    domain::{
        CorpusNgram, Dataset, DatasetId, DocumentKey, KeywordPhrase, OwnerId, StatusFilter, Task,
        TaskId, TaskKind, TaskOutput, TaskResultRef, TrainedModel, TrainedModelId,
    },
    ports::{CorpusError, CorpusReader, CorpusResult, TaskStore, TaskStoreError, TaskStoreResult},
};

/// Thread-safe in-memory task store that also serves as the corpus.
///
/// Claim order ties on `created_at` are broken by insertion order.
#[derive(Debug, Clone, Default)]
pub struct InMemoryTaskStore {
    state: Arc<RwLock<InMemoryState>>,
}

#[derive(Debug, Default)]
struct InMemoryState {
    tasks: HashMap<TaskId, Task>,
    insertion_order: Vec<TaskId>,
    datasets: HashMap<DatasetId, Dataset>,
    dataset_documents: HashMap<DatasetId, Vec<DocumentKey>>,
    models: HashMap<TrainedModelId, TrainedModel>,
    document_keywords: Vec<(DocumentKey, String)>,
    document_ngrams: Vec<(DocumentKey, CorpusNgram)>,
    failing_commits: Vec<String>,
}

impl InMemoryState {
    fn tasks_in_order(&self) -> impl Iterator<Item = &Task> {
        self.insertion_order
            .iter()
            .filter_map(|id| self.tasks.get(id))
    }

    fn task_mut(&mut self, id: TaskId) -> TaskStoreResult<&mut Task> {
        self.tasks.get_mut(&id).ok_or(TaskStoreError::NotFound(id))
    }
}

fn lock_error(err: impl std::fmt::Display) -> TaskStoreError {
    TaskStoreError::persistence(std::io::Error::other(err.to_string()))
}

impl InMemoryTaskStore {
    /// Creates an empty store with an empty corpus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> TaskStoreResult<RwLockReadGuard<'_, InMemoryState>> {
        self.state.read().map_err(lock_error)
    }

    fn write(&self) -> TaskStoreResult<RwLockWriteGuard<'_, InMemoryState>> {
        self.state.write().map_err(lock_error)
    }

    /// Tags a corpus document with a raw keyword field.
    ///
    /// # Errors
    ///
    /// Returns a persistence error when lock acquisition fails.
    pub fn add_document_keywords(
        &self,
        document: DocumentKey,
        keywords: impl Into<String>,
    ) -> TaskStoreResult<()> {
        self.write()?
            .document_keywords
            .push((document, keywords.into()));
        Ok(())
    }

    /// Adds an n-gram row to a corpus document.
    ///
    /// # Errors
    ///
    /// Returns a persistence error when lock acquisition fails.
    pub fn add_document_ngram(
        &self,
        document: DocumentKey,
        ngram: CorpusNgram,
    ) -> TaskStoreResult<()> {
        self.write()?.document_ngrams.push((document, ngram));
        Ok(())
    }

    /// Stores a dataset directly, bypassing a filter task.
    ///
    /// # Errors
    ///
    /// Returns a persistence error when lock acquisition fails.
    pub fn seed_dataset(
        &self,
        dataset: Dataset,
        documents: Vec<DocumentKey>,
    ) -> TaskStoreResult<()> {
        let mut state = self.write()?;
        state.dataset_documents.insert(dataset.id, documents);
        state.datasets.insert(dataset.id, dataset);
        Ok(())
    }

    /// Returns the documents recorded as members of a dataset.
    ///
    /// # Errors
    ///
    /// Returns a persistence error when lock acquisition fails.
    pub fn dataset_documents(&self, id: DatasetId) -> TaskStoreResult<Vec<DocumentKey>> {
        Ok(self
            .read()?
            .dataset_documents
            .get(&id)
            .cloned()
            .unwrap_or_default())
    }

    /// Number of datasets written so far.
    ///
    /// # Errors
    ///
    /// Returns a persistence error when lock acquisition fails.
    pub fn dataset_count(&self) -> TaskStoreResult<usize> {
        Ok(self.read()?.datasets.len())
    }

    /// Number of trained models written so far.
    ///
    /// # Errors
    ///
    /// Returns a persistence error when lock acquisition fails.
    pub fn trained_model_count(&self) -> TaskStoreResult<usize> {
        Ok(self.read()?.models.len())
    }

    /// Makes the next [`TaskStore::complete`] call fail before writing
    /// anything, as a failing bulk insert would.
    ///
    /// # Errors
    ///
    /// Returns a persistence error when lock acquisition fails.
    pub fn fail_next_commit(&self, reason: impl Into<String>) -> TaskStoreResult<()> {
        self.write()?.failing_commits.push(reason.into());
        Ok(())
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn insert(&self, task: &Task) -> TaskStoreResult<()> {
        let mut state = self.write()?;
        if state.tasks.contains_key(&task.id()) {
            return Err(TaskStoreError::DuplicateTask(task.id()));
        }
        state.insertion_order.push(task.id());
        state.tasks.insert(task.id(), task.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: TaskId) -> TaskStoreResult<Option<Task>> {
        Ok(self.read()?.tasks.get(&id).cloned())
    }

    async fn next_unclaimed(&self, kind: TaskKind) -> TaskStoreResult<Option<Task>> {
        let state = self.read()?;
        let next = state
            .tasks_in_order()
            .filter(|task| task.kind() == kind && !task.is_claimed())
            .min_by_key(|task| task.created_at())
            .cloned();
        Ok(next)
    }

    async fn mark_started(&self, id: TaskId, at: DateTime<Utc>) -> TaskStoreResult<()> {
        let mut state = self.write()?;
        state.task_mut(id)?.start(at)?;
        Ok(())
    }

    async fn complete(
        &self,
        id: TaskId,
        output: &TaskOutput,
        at: DateTime<Utc>,
    ) -> TaskStoreResult<TaskResultRef> {
        let mut state = self.write()?;
        let mut updated = state.task_mut(id)?.clone();
        let result = output.result_ref();
        updated.complete(result, at)?;

        if !state.failing_commits.is_empty() {
            let reason = state.failing_commits.remove(0);
            return Err(TaskStoreError::persistence(std::io::Error::other(reason)));
        }

        match output {
            TaskOutput::Dataset(new_dataset) => {
                let dataset = Dataset {
                    id: new_dataset.id,
                    keywords: new_dataset.keywords.clone(),
                    document_count: new_dataset.documents.len() as u64,
                    created_at: at,
                };
                state
                    .dataset_documents
                    .insert(dataset.id, new_dataset.documents.clone());
                state.datasets.insert(dataset.id, dataset);
            }
            TaskOutput::Model(new_model) => {
                let model = TrainedModel {
                    id: new_model.id,
                    embeddings_path: new_model.embeddings_path.clone(),
                    visualization: new_model.visualization.clone(),
                    created_at: at,
                };
                state.models.insert(model.id, model);
            }
        }
        state.tasks.insert(id, updated);
        Ok(result)
    }

    async fn mark_failed(&self, id: TaskId, at: DateTime<Utc>) -> TaskStoreResult<()> {
        let mut state = self.write()?;
        state.task_mut(id)?.fail(at)?;
        Ok(())
    }

    async fn requeue(&self, id: TaskId) -> TaskStoreResult<()> {
        let mut state = self.write()?;
        state.task_mut(id)?.requeue()?;
        Ok(())
    }

    async fn list_stalled(&self, kind: TaskKind) -> TaskStoreResult<Vec<Task>> {
        let state = self.read()?;
        let mut stalled: Vec<Task> = state
            .tasks_in_order()
            .filter(|task| task.kind() == kind && task.is_stalled())
            .cloned()
            .collect();
        stalled.sort_by_key(Task::created_at);
        Ok(stalled)
    }

    async fn list_for_owner(
        &self,
        owner: OwnerId,
        kind: TaskKind,
        filter: StatusFilter,
    ) -> TaskStoreResult<Vec<Task>> {
        let state = self.read()?;
        let mut tasks: Vec<Task> = state
            .tasks_in_order()
            .filter(|task| task.owner() == owner && task.kind() == kind && filter.matches(task))
            .cloned()
            .collect();
        tasks.sort_by_key(Task::created_at);
        Ok(tasks)
    }

    async fn find_dataset(&self, id: DatasetId) -> TaskStoreResult<Option<Dataset>> {
        Ok(self.read()?.datasets.get(&id).cloned())
    }

    async fn find_trained_model(
        &self,
        id: TrainedModelId,
    ) -> TaskStoreResult<Option<TrainedModel>> {
        Ok(self.read()?.models.get(&id).cloned())
    }
}

#[async_trait]
impl CorpusReader for InMemoryTaskStore {
    async fn matching_documents(
        &self,
        keywords: &KeywordPhrase,
    ) -> CorpusResult<Vec<DocumentKey>> {
        let state = self.state.read().map_err(|err| {
            CorpusError::query(std::io::Error::other(err.to_string()))
        })?;
        let matches: BTreeSet<DocumentKey> = state
            .document_keywords
            .iter()
            .filter(|(_, field)| keywords.matches(field))
            .map(|(document, _)| document.clone())
            .collect();
        Ok(matches.into_iter().collect())
    }

    async fn dataset_ngrams(&self, dataset: DatasetId) -> CorpusResult<Vec<CorpusNgram>> {
        let state = self.state.read().map_err(|err| {
            CorpusError::query(std::io::Error::other(err.to_string()))
        })?;
        let documents = state
            .dataset_documents
            .get(&dataset)
            .ok_or(CorpusError::UnknownDataset(dataset))?;
        let ngrams = state
            .document_ngrams
            .iter()
            .filter(|(document, _)| documents.contains(document))
            .map(|(_, ngram)| ngram.clone())
            .collect();
        Ok(ngrams)
    }
}
