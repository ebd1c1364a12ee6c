//! Corpus reads through the `PostgreSQL` store.

use super::helpers::{
    CleanupGuard, SteppingClock, add_ngram, connect, ensure_template, setup_store, tag_document,
    test_runtime,
};
use chrono::{TimeZone, Utc};
use lexicon::task::{
    domain::{
        CorpusNgram, DatasetId, DocumentKey, KeywordPhrase, NewDataset, OwnerId, Task,
        TaskOutput,
    },
    ports::{CorpusError, CorpusReader, TaskStore},
};
use pg_embedded_setup_unpriv::{TestCluster, test_support::shared_test_cluster};
use rstest::rstest;

#[rstest]
fn keyword_match_is_exact_on_the_normalised_field(shared_test_cluster: &'static TestCluster) {
    ensure_template(shared_test_cluster).expect("template setup");
    let db_name = format!("test_corpus_match_{}", uuid::Uuid::new_v4());
    let _guard = CleanupGuard::new(shared_test_cluster, db_name.clone());
    let store = setup_store(shared_test_cluster, &db_name).expect("store setup");
    let mut conn = connect(shared_test_cluster, &db_name);
    tag_document(&mut conn, "doc-2", "Back  Pain");
    tag_document(&mut conn, "doc-1", "back pain");
    tag_document(&mut conn, "doc-3", "lower back pain");
    tag_document(&mut conn, "doc-1", "Back Pain");

    let rt = test_runtime();
    let phrase = KeywordPhrase::parse("BACK pain").expect("valid phrase");
    let keys = rt
        .block_on(store.matching_documents(&phrase))
        .expect("query ok");

    assert_eq!(keys, vec![DocumentKey::new("doc-1"), DocumentKey::new("doc-2")]);
}

#[rstest]
fn dataset_ngrams_cover_only_member_documents(shared_test_cluster: &'static TestCluster) {
    ensure_template(shared_test_cluster).expect("template setup");
    let db_name = format!("test_corpus_ngrams_{}", uuid::Uuid::new_v4());
    let _guard = CleanupGuard::new(shared_test_cluster, db_name.clone());
    let store = setup_store(shared_test_cluster, &db_name).expect("store setup");
    let mut conn = connect(shared_test_cluster, &db_name);
    add_ngram(&mut conn, "doc-1", "Knee", 2);
    add_ngram(&mut conn, "doc-1", "back pain", 4);
    add_ngram(&mut conn, "doc-2", "hip", 1);
    add_ngram(&mut conn, "doc-9", "elbow", 7);

    let task = Task::new_filter(
        OwnerId::new(),
        KeywordPhrase::parse("back pain").expect("valid phrase"),
        &SteppingClock::new(),
    );
    let output = NewDataset {
        id: DatasetId::new(),
        keywords: KeywordPhrase::parse("back pain").expect("valid phrase"),
        documents: vec![DocumentKey::new("doc-1"), DocumentKey::new("doc-2")],
    };
    let dataset_id = output.id;
    let finished_at = Utc
        .with_ymd_and_hms(2024, 3, 2, 10, 0, 0)
        .single()
        .expect("valid timestamp");

    let rt = test_runtime();
    rt.block_on(store.insert(&task)).expect("insert");
    rt.block_on(store.mark_started(task.id(), finished_at))
        .expect("claim");
    rt.block_on(store.complete(task.id(), &TaskOutput::Dataset(output), finished_at))
        .expect("dataset committed");

    let ngrams = rt
        .block_on(store.dataset_ngrams(dataset_id))
        .expect("query ok");

    assert_eq!(
        ngrams,
        vec![
            CorpusNgram::new("back pain", 4),
            CorpusNgram::new("knee", 2),
            CorpusNgram::new("hip", 1),
        ]
    );
}

#[rstest]
fn ngrams_of_an_unknown_dataset_are_an_error(shared_test_cluster: &'static TestCluster) {
    ensure_template(shared_test_cluster).expect("template setup");
    let db_name = format!("test_corpus_unknown_{}", uuid::Uuid::new_v4());
    let _guard = CleanupGuard::new(shared_test_cluster, db_name.clone());
    let store = setup_store(shared_test_cluster, &db_name).expect("store setup");
    let missing = DatasetId::new();

    let rt = test_runtime();
    let err = rt
        .block_on(store.dataset_ngrams(missing))
        .expect_err("dataset was never committed");

    assert!(matches!(err, CorpusError::UnknownDataset(id) if id == missing));
}
