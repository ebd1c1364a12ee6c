//! `PostgreSQL` task store and corpus reader.

use super::{
    convert::{
        TaskRow, dataset_result, filter_row_to_task, model_result, row_to_dataset,
        row_to_trained_model, task_to_row, train_row_to_task,
    },
    models::{DatasetDocumentRow, DatasetRow, FilterTaskRow, TrainTaskRow, TrainedModelRow},
    schema::{
        dataset_documents, datasets, doc_keywords, doc_ngrams, filter_tasks, train_tasks,
        trained_models,
    },
};
use crate::task::{
    domain::{
        CorpusNgram, Dataset, DatasetId, DocumentKey, KeywordPhrase, OwnerId, StatusFilter, Task,
        TaskDomainError, TaskId, TaskKind, TaskOutput, TaskResultRef, TrainedModel,
        TrainedModelId,
    },
    ports::{CorpusError, CorpusReader, CorpusResult, TaskStore, TaskStoreError, TaskStoreResult},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel::result::{DatabaseErrorKind, Error as DieselError};

/// `PostgreSQL` connection pool type used by task adapters.
pub type TaskPgPool = Pool<ConnectionManager<PgConnection>>;

/// Membership rows written per insert statement.
const MEMBERSHIP_CHUNK: usize = 5_000;

/// `PostgreSQL`-backed task store.
///
/// Reads the external corpus from the `corpus` schema of the same database.
#[derive(Debug, Clone)]
pub struct PostgresTaskStore {
    pool: TaskPgPool,
}

/// Adapter error types that can wrap pool and join failures.
trait BlockingFailure: Send + 'static {
    fn wrap(err: impl std::error::Error + Send + Sync + 'static) -> Self;
}

impl BlockingFailure for TaskStoreError {
    fn wrap(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::persistence(err)
    }
}

impl BlockingFailure for CorpusError {
    fn wrap(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::query(err)
    }
}

impl From<DieselError> for TaskStoreError {
    fn from(err: DieselError) -> Self {
        Self::persistence(err)
    }
}

impl PostgresTaskStore {
    /// Creates a new store from a `PostgreSQL` connection pool.
    #[must_use]
    pub const fn new(pool: TaskPgPool) -> Self {
        Self { pool }
    }

    async fn run_blocking<F, T, E>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut PgConnection) -> Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: BlockingFailure,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut connection = pool.get().map_err(E::wrap)?;
            f(&mut connection)
        })
        .await
        .map_err(E::wrap)?
    }
}

#[async_trait]
impl TaskStore for PostgresTaskStore {
    async fn insert(&self, task: &Task) -> TaskStoreResult<()> {
        let task_id = task.id();
        let row = task_to_row(task)?;

        self.run_blocking(move |connection| -> TaskStoreResult<()> {
            let inserted = match &row {
                TaskRow::Filter(filter_row) => diesel::insert_into(filter_tasks::table)
                    .values(filter_row)
                    .execute(connection),
                TaskRow::Train(train_row) => diesel::insert_into(train_tasks::table)
                    .values(train_row)
                    .execute(connection),
            };
            inserted.map(drop).map_err(|err| match err {
                DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
                    TaskStoreError::DuplicateTask(task_id)
                }
                _ => TaskStoreError::persistence(err),
            })
        })
        .await
    }

    async fn find_by_id(&self, id: TaskId) -> TaskStoreResult<Option<Task>> {
        self.run_blocking(move |connection| find_task(connection, id, false))
            .await
    }

    async fn next_unclaimed(&self, kind: TaskKind) -> TaskStoreResult<Option<Task>> {
        self.run_blocking(move |connection| match kind {
            TaskKind::Filter => filter_tasks::table
                .filter(filter_tasks::start_time.is_null())
                .order((filter_tasks::created_at.asc(), filter_tasks::id.asc()))
                .select(FilterTaskRow::as_select())
                .first::<FilterTaskRow>(connection)
                .optional()?
                .map(filter_row_to_task)
                .transpose(),
            TaskKind::Train => train_tasks::table
                .filter(train_tasks::start_time.is_null())
                .order((train_tasks::created_at.asc(), train_tasks::id.asc()))
                .select(TrainTaskRow::as_select())
                .first::<TrainTaskRow>(connection)
                .optional()?
                .map(train_row_to_task)
                .transpose(),
        })
        .await
    }

    async fn mark_started(&self, id: TaskId, at: DateTime<Utc>) -> TaskStoreResult<()> {
        self.run_blocking(move |connection| transition(connection, id, |task| task.start(at)))
            .await
    }

    async fn complete(
        &self,
        id: TaskId,
        output: &TaskOutput,
        at: DateTime<Utc>,
    ) -> TaskStoreResult<TaskResultRef> {
        let output = output.clone();
        self.run_blocking(move |connection| {
            connection.transaction::<_, TaskStoreError, _>(|tx| {
                let mut task = find_task(tx, id, true)?.ok_or(TaskStoreError::NotFound(id))?;
                let result = output.result_ref();
                task.complete(result, at)?;
                insert_output(tx, &output, at)?;
                write_lifecycle(tx, &task)?;
                Ok(result)
            })
        })
        .await
    }

    async fn mark_failed(&self, id: TaskId, at: DateTime<Utc>) -> TaskStoreResult<()> {
        self.run_blocking(move |connection| transition(connection, id, |task| task.fail(at)))
            .await
    }

    async fn requeue(&self, id: TaskId) -> TaskStoreResult<()> {
        self.run_blocking(move |connection| transition(connection, id, Task::requeue))
            .await
    }

    async fn list_stalled(&self, kind: TaskKind) -> TaskStoreResult<Vec<Task>> {
        self.run_blocking(move |connection| -> TaskStoreResult<Vec<Task>> {
            match kind {
                TaskKind::Filter => filter_tasks::table
                    .filter(filter_tasks::start_time.is_not_null())
                    .filter(filter_tasks::end_time.is_null())
                    .order((filter_tasks::created_at.asc(), filter_tasks::id.asc()))
                    .select(FilterTaskRow::as_select())
                    .load::<FilterTaskRow>(connection)?
                    .into_iter()
                    .map(filter_row_to_task)
                    .collect(),
                TaskKind::Train => train_tasks::table
                    .filter(train_tasks::start_time.is_not_null())
                    .filter(train_tasks::end_time.is_null())
                    .order((train_tasks::created_at.asc(), train_tasks::id.asc()))
                    .select(TrainTaskRow::as_select())
                    .load::<TrainTaskRow>(connection)?
                    .into_iter()
                    .map(train_row_to_task)
                    .collect(),
            }
        })
        .await
    }

    async fn list_for_owner(
        &self,
        owner: OwnerId,
        kind: TaskKind,
        filter: StatusFilter,
    ) -> TaskStoreResult<Vec<Task>> {
        let owner_id = owner.into_inner();
        let tasks = self
            .run_blocking(move |connection| match kind {
                TaskKind::Filter => filter_tasks::table
                    .filter(filter_tasks::owner_id.eq(owner_id))
                    .order((filter_tasks::created_at.asc(), filter_tasks::id.asc()))
                    .select(FilterTaskRow::as_select())
                    .load::<FilterTaskRow>(connection)?
                    .into_iter()
                    .map(filter_row_to_task)
                    .collect::<TaskStoreResult<Vec<_>>>(),
                TaskKind::Train => train_tasks::table
                    .filter(train_tasks::owner_id.eq(owner_id))
                    .order((train_tasks::created_at.asc(), train_tasks::id.asc()))
                    .select(TrainTaskRow::as_select())
                    .load::<TrainTaskRow>(connection)?
                    .into_iter()
                    .map(train_row_to_task)
                    .collect::<TaskStoreResult<Vec<_>>>(),
            })
            .await?;
        Ok(tasks
            .into_iter()
            .filter(|task| filter.matches(task))
            .collect())
    }

    async fn find_dataset(&self, id: DatasetId) -> TaskStoreResult<Option<Dataset>> {
        self.run_blocking(move |connection| {
            datasets::table
                .find(id.into_inner())
                .select(DatasetRow::as_select())
                .first::<DatasetRow>(connection)
                .optional()?
                .map(row_to_dataset)
                .transpose()
        })
        .await
    }

    async fn find_trained_model(
        &self,
        id: TrainedModelId,
    ) -> TaskStoreResult<Option<TrainedModel>> {
        self.run_blocking(move |connection| {
            trained_models::table
                .find(id.into_inner())
                .select(TrainedModelRow::as_select())
                .first::<TrainedModelRow>(connection)
                .optional()?
                .map(row_to_trained_model)
                .transpose()
        })
        .await
    }
}

#[async_trait]
impl CorpusReader for PostgresTaskStore {
    async fn matching_documents(
        &self,
        keywords: &KeywordPhrase,
    ) -> CorpusResult<Vec<DocumentKey>> {
        let phrase = keywords.as_str().to_owned();
        self.run_blocking(move |connection| -> CorpusResult<Vec<DocumentKey>> {
            let keys = doc_keywords::table
                .filter(doc_keywords::keywords_lc.eq(phrase))
                .select(doc_keywords::dkey)
                .distinct()
                .order(doc_keywords::dkey.asc())
                .load::<String>(connection)
                .map_err(CorpusError::query)?;
            Ok(keys.into_iter().map(DocumentKey::new).collect())
        })
        .await
    }

    async fn dataset_ngrams(&self, dataset: DatasetId) -> CorpusResult<Vec<CorpusNgram>> {
        let dataset_id = dataset.into_inner();
        self.run_blocking(move |connection| -> CorpusResult<Vec<CorpusNgram>> {
            let exists = datasets::table
                .find(dataset_id)
                .select(datasets::id)
                .first::<uuid::Uuid>(connection)
                .optional()
                .map_err(CorpusError::query)?;
            if exists.is_none() {
                return Err(CorpusError::UnknownDataset(dataset));
            }

            let rows = doc_ngrams::table
                .inner_join(
                    dataset_documents::table.on(dataset_documents::dkey.eq(doc_ngrams::dkey)),
                )
                .filter(dataset_documents::dataset_id.eq(dataset_id))
                .order((doc_ngrams::dkey.asc(), doc_ngrams::ngram_lc.asc()))
                .select((doc_ngrams::ngram_lc, doc_ngrams::ngram_count))
                .load::<(String, i64)>(connection)
                .map_err(CorpusError::query)?;

            rows.into_iter()
                .map(|(ngram, count)| {
                    let count = u64::try_from(count).map_err(CorpusError::query)?;
                    Ok(CorpusNgram::new(ngram, count))
                })
                .collect()
        })
        .await
    }
}

fn find_task(
    connection: &mut PgConnection,
    id: TaskId,
    lock: bool,
) -> TaskStoreResult<Option<Task>> {
    let uuid = id.into_inner();
    let filter_query = filter_tasks::table
        .find(uuid)
        .select(FilterTaskRow::as_select());
    let filter_row = if lock {
        filter_query.for_update().first::<FilterTaskRow>(connection)
    } else {
        filter_query.first::<FilterTaskRow>(connection)
    }
    .optional()?;
    if let Some(row) = filter_row {
        return filter_row_to_task(row).map(Some);
    }

    let train_query = train_tasks::table
        .find(uuid)
        .select(TrainTaskRow::as_select());
    let train_row = if lock {
        train_query.for_update().first::<TrainTaskRow>(connection)
    } else {
        train_query.first::<TrainTaskRow>(connection)
    }
    .optional()?;
    train_row.map(train_row_to_task).transpose()
}

/// Applies a lifecycle transition under a row lock and writes it back.
fn transition<F>(connection: &mut PgConnection, id: TaskId, apply: F) -> TaskStoreResult<()>
where
    F: FnOnce(&mut Task) -> Result<(), TaskDomainError>,
{
    connection.transaction::<_, TaskStoreError, _>(|tx| {
        let mut task = find_task(tx, id, true)?.ok_or(TaskStoreError::NotFound(id))?;
        apply(&mut task)?;
        write_lifecycle(tx, &task)
    })
}

fn write_lifecycle(connection: &mut PgConnection, task: &Task) -> TaskStoreResult<()> {
    let uuid = task.id().into_inner();
    match task.kind() {
        TaskKind::Filter => diesel::update(filter_tasks::table.find(uuid))
            .set((
                filter_tasks::start_time.eq(task.start_time()),
                filter_tasks::end_time.eq(task.end_time()),
                filter_tasks::dataset_id.eq(dataset_result(task.result())),
            ))
            .execute(connection)?,
        TaskKind::Train => diesel::update(train_tasks::table.find(uuid))
            .set((
                train_tasks::start_time.eq(task.start_time()),
                train_tasks::end_time.eq(task.end_time()),
                train_tasks::model_id.eq(model_result(task.result())),
            ))
            .execute(connection)?,
    };
    Ok(())
}

fn insert_output(
    connection: &mut PgConnection,
    output: &TaskOutput,
    at: DateTime<Utc>,
) -> TaskStoreResult<()> {
    match output {
        TaskOutput::Dataset(dataset) => {
            let dataset_id = dataset.id.into_inner();
            let document_count =
                i64::try_from(dataset.documents.len()).map_err(TaskStoreError::persistence)?;
            diesel::insert_into(datasets::table)
                .values(&DatasetRow {
                    id: dataset_id,
                    keywords: dataset.keywords.as_str().to_owned(),
                    document_count,
                    created_at: at,
                })
                .execute(connection)?;

            for chunk in dataset.documents.chunks(MEMBERSHIP_CHUNK) {
                let rows: Vec<DatasetDocumentRow<'_>> = chunk
                    .iter()
                    .map(|document| DatasetDocumentRow {
                        dataset_id,
                        dkey: document.as_str(),
                    })
                    .collect();
                diesel::insert_into(dataset_documents::table)
                    .values(&rows)
                    .execute(connection)?;
            }
        }
        TaskOutput::Model(model) => {
            let visualization = serde_json::to_value(&model.visualization)
                .map_err(TaskStoreError::persistence)?;
            diesel::insert_into(trained_models::table)
                .values(&TrainedModelRow {
                    id: model.id.into_inner(),
                    embeddings_path: model.embeddings_path.to_string(),
                    visualization,
                    created_at: at,
                })
                .execute(connection)?;
        }
    }
    Ok(())
}
