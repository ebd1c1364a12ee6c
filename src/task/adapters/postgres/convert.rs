//! Conversions between domain aggregates and Diesel rows.

use super::models::{DatasetRow, FilterTaskRow, TrainTaskRow, TrainedModelRow};
use crate::task::{
    domain::{
        Dataset, DatasetId, Hyperparameters, KeywordPhrase, OwnerId, PersistedTaskData, Task,
        TaskId, TaskPayload, TaskResultRef, TrainedModel, TrainedModelId, Visualization,
    },
    ports::{TaskStoreError, TaskStoreResult},
};
use camino::Utf8PathBuf;

/// Row form of a task, one variant per queue table.
#[derive(Debug, Clone)]
pub(super) enum TaskRow {
    Filter(FilterTaskRow),
    Train(TrainTaskRow),
}

pub(super) fn task_to_row(task: &Task) -> TaskStoreResult<TaskRow> {
    let id = task.id().into_inner();
    let owner_id = task.owner().into_inner();
    match task.payload() {
        TaskPayload::Filter { keywords } => Ok(TaskRow::Filter(FilterTaskRow {
            id,
            owner_id,
            keywords: keywords.as_str().to_owned(),
            dataset_id: dataset_result(task.result()),
            created_at: task.created_at(),
            start_time: task.start_time(),
            end_time: task.end_time(),
        })),
        TaskPayload::Train { dataset, hparams } => Ok(TaskRow::Train(TrainTaskRow {
            id,
            owner_id,
            dataset_id: dataset.into_inner(),
            hparams: serde_json::to_value(hparams).map_err(TaskStoreError::persistence)?,
            model_id: model_result(task.result()),
            created_at: task.created_at(),
            start_time: task.start_time(),
            end_time: task.end_time(),
        })),
    }
}

pub(super) fn dataset_result(result: Option<TaskResultRef>) -> Option<uuid::Uuid> {
    match result {
        Some(TaskResultRef::Dataset(id)) => Some(id.into_inner()),
        _ => None,
    }
}

pub(super) fn model_result(result: Option<TaskResultRef>) -> Option<uuid::Uuid> {
    match result {
        Some(TaskResultRef::Model(id)) => Some(id.into_inner()),
        _ => None,
    }
}

pub(super) fn filter_row_to_task(row: FilterTaskRow) -> TaskStoreResult<Task> {
    let keywords = KeywordPhrase::parse(&row.keywords).map_err(TaskStoreError::persistence)?;
    Ok(Task::from_persisted(PersistedTaskData {
        id: TaskId::from_uuid(row.id),
        owner: OwnerId::from_uuid(row.owner_id),
        payload: TaskPayload::Filter { keywords },
        result: row
            .dataset_id
            .map(|id| TaskResultRef::Dataset(DatasetId::from_uuid(id))),
        created_at: row.created_at,
        start_time: row.start_time,
        end_time: row.end_time,
    }))
}

pub(super) fn train_row_to_task(row: TrainTaskRow) -> TaskStoreResult<Task> {
    let hparams = serde_json::from_value::<Hyperparameters>(row.hparams)
        .map_err(TaskStoreError::persistence)?;
    Ok(Task::from_persisted(PersistedTaskData {
        id: TaskId::from_uuid(row.id),
        owner: OwnerId::from_uuid(row.owner_id),
        payload: TaskPayload::Train {
            dataset: DatasetId::from_uuid(row.dataset_id),
            hparams,
        },
        result: row
            .model_id
            .map(|id| TaskResultRef::Model(TrainedModelId::from_uuid(id))),
        created_at: row.created_at,
        start_time: row.start_time,
        end_time: row.end_time,
    }))
}

pub(super) fn row_to_dataset(row: DatasetRow) -> TaskStoreResult<Dataset> {
    Ok(Dataset {
        id: DatasetId::from_uuid(row.id),
        keywords: KeywordPhrase::parse(&row.keywords).map_err(TaskStoreError::persistence)?,
        document_count: u64::try_from(row.document_count)
            .map_err(TaskStoreError::persistence)?,
        created_at: row.created_at,
    })
}

pub(super) fn row_to_trained_model(row: TrainedModelRow) -> TaskStoreResult<TrainedModel> {
    let visualization = serde_json::from_value::<Visualization>(row.visualization)
        .map_err(TaskStoreError::persistence)?;
    Ok(TrainedModel {
        id: TrainedModelId::from_uuid(row.id),
        embeddings_path: Utf8PathBuf::from(row.embeddings_path),
        visualization,
        created_at: row.created_at,
    })
}
