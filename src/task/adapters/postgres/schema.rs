//! Diesel schema for task queues, their artifacts and the external corpus.

diesel::table! {
    /// Queued keyword filter tasks.
    filter_tasks (id) {
        /// Task identifier.
        id -> Uuid,
        /// Submitting user.
        owner_id -> Uuid,
        /// Normalised keyword phrase.
        keywords -> Text,
        /// Dataset produced on success.
        dataset_id -> Nullable<Uuid>,
        /// Insertion timestamp, defines claim order.
        created_at -> Timestamptz,
        /// Claim timestamp.
        start_time -> Nullable<Timestamptz>,
        /// Finalisation timestamp.
        end_time -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    /// Queued embedding training tasks.
    train_tasks (id) {
        /// Task identifier.
        id -> Uuid,
        /// Submitting user.
        owner_id -> Uuid,
        /// Dataset providing the training corpus.
        dataset_id -> Uuid,
        /// Hyperparameter bundle.
        hparams -> Jsonb,
        /// Trained model produced on success.
        model_id -> Nullable<Uuid>,
        /// Insertion timestamp, defines claim order.
        created_at -> Timestamptz,
        /// Claim timestamp.
        start_time -> Nullable<Timestamptz>,
        /// Finalisation timestamp.
        end_time -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    /// Datasets produced by filter tasks.
    datasets (id) {
        /// Dataset identifier.
        id -> Uuid,
        /// Phrase the dataset was filtered on.
        keywords -> Text,
        /// Number of member documents.
        document_count -> Int8,
        /// Commit timestamp.
        created_at -> Timestamptz,
    }
}

diesel::table! {
    /// Dataset membership rows.
    dataset_documents (dataset_id, dkey) {
        /// Owning dataset.
        dataset_id -> Uuid,
        /// Corpus document key.
        dkey -> Text,
    }
}

diesel::table! {
    /// Trained models produced by train tasks.
    trained_models (id) {
        /// Model identifier.
        id -> Uuid,
        /// Path of the raw word-vector file.
        embeddings_path -> Text,
        /// `{labels, x, y}` projection payload.
        visualization -> Jsonb,
        /// Commit timestamp.
        created_at -> Timestamptz,
    }
}

diesel::table! {
    /// External corpus: keyword tags per document.
    corpus.doc_keywords (dkey, keywords) {
        /// Document key.
        dkey -> Text,
        /// Keyword field as published.
        keywords -> Text,
        /// Lower-cased, whitespace-normalised keyword field.
        keywords_lc -> Text,
    }
}

diesel::table! {
    /// External corpus: n-gram counts per document.
    corpus.doc_ngrams (dkey, ngram) {
        /// Document key.
        dkey -> Text,
        /// N-gram as published.
        ngram -> Text,
        /// Lower-cased n-gram.
        ngram_lc -> Text,
        /// Occurrences within the document.
        ngram_count -> Int8,
    }
}

diesel::joinable!(filter_tasks -> datasets (dataset_id));
diesel::joinable!(train_tasks -> trained_models (model_id));
diesel::joinable!(dataset_documents -> datasets (dataset_id));

diesel::allow_tables_to_appear_in_same_query!(
    filter_tasks,
    train_tasks,
    datasets,
    dataset_documents,
    trained_models,
    doc_keywords,
    doc_ngrams,
);
