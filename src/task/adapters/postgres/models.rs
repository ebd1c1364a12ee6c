//! Diesel row models for task and artifact persistence.

use super::schema::{dataset_documents, datasets, filter_tasks, train_tasks, trained_models};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde_json::Value;

/// Row of the `filter_tasks` table.
#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = filter_tasks)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct FilterTaskRow {
    /// Task identifier.
    pub id: uuid::Uuid,
    /// Submitting user.
    pub owner_id: uuid::Uuid,
    /// Normalised keyword phrase.
    pub keywords: String,
    /// Dataset produced on success.
    pub dataset_id: Option<uuid::Uuid>,
    /// Insertion timestamp.
    pub created_at: DateTime<Utc>,
    /// Claim timestamp.
    pub start_time: Option<DateTime<Utc>>,
    /// Finalisation timestamp.
    pub end_time: Option<DateTime<Utc>>,
}

/// Row of the `train_tasks` table.
#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = train_tasks)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct TrainTaskRow {
    /// Task identifier.
    pub id: uuid::Uuid,
    /// Submitting user.
    pub owner_id: uuid::Uuid,
    /// Dataset providing the training corpus.
    pub dataset_id: uuid::Uuid,
    /// Hyperparameter JSON payload.
    pub hparams: Value,
    /// Trained model produced on success.
    pub model_id: Option<uuid::Uuid>,
    /// Insertion timestamp.
    pub created_at: DateTime<Utc>,
    /// Claim timestamp.
    pub start_time: Option<DateTime<Utc>>,
    /// Finalisation timestamp.
    pub end_time: Option<DateTime<Utc>>,
}

/// Row of the `datasets` table.
#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = datasets)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct DatasetRow {
    /// Dataset identifier.
    pub id: uuid::Uuid,
    /// Phrase the dataset was filtered on.
    pub keywords: String,
    /// Number of member documents.
    pub document_count: i64,
    /// Commit timestamp.
    pub created_at: DateTime<Utc>,
}

/// Insert model for dataset membership rows.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = dataset_documents)]
pub struct DatasetDocumentRow<'a> {
    /// Owning dataset.
    pub dataset_id: uuid::Uuid,
    /// Corpus document key.
    pub dkey: &'a str,
}

/// Row of the `trained_models` table.
#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = trained_models)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct TrainedModelRow {
    /// Model identifier.
    pub id: uuid::Uuid,
    /// Path of the raw word-vector file.
    pub embeddings_path: String,
    /// Projection payload.
    pub visualization: Value,
    /// Commit timestamp.
    pub created_at: DateTime<Utc>,
}
