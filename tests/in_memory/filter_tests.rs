//! Filter worker integration tests over the in-memory corpus.

use super::helpers::{SteppingClock, clock, phrase, runner_with, store};
use lexicon::{
    filter::FilterHandler,
    scheduler::{TickError, TickOutcome},
    task::{
        adapters::memory::InMemoryTaskStore,
        domain::{DocumentKey, OwnerId, Task, TaskResultRef},
        ports::TaskStore,
    },
};
use rstest::rstest;
use std::sync::Arc;

fn tag(store: &InMemoryTaskStore, document: &str, keywords: &str) {
    store
        .add_document_keywords(DocumentKey::new(document), keywords)
        .expect("tag document");
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn filter_task_commits_matching_documents(
    store: Arc<InMemoryTaskStore>,
    clock: Arc<SteppingClock>,
) {
    tag(&store, "doc-1", "Back Pain");
    tag(&store, "doc-2", "lower back pain");
    tag(&store, "doc-3", "knee");
    let task = Task::new_filter(OwnerId::new(), phrase("back  pain"), &*clock);
    store.insert(&task).await.expect("insert task");
    let runner = runner_with(&store, &clock, FilterHandler::new(Arc::clone(&store)));

    let outcome = runner.tick().await.expect("filter succeeds");

    let TickOutcome::Completed {
        result: TaskResultRef::Dataset(dataset),
        ..
    } = outcome
    else {
        panic!("filter task must produce a dataset");
    };
    let stored = store
        .find_dataset(dataset)
        .await
        .expect("lookup")
        .expect("dataset committed");
    assert_eq!(stored.document_count, 1);
    assert_eq!(
        store.dataset_documents(dataset).expect("members"),
        vec![DocumentKey::new("doc-1")]
    );
    let finished = store
        .find_by_id(task.id())
        .await
        .expect("lookup")
        .expect("task exists");
    assert!(finished.is_complete());
    assert!(!finished.is_error());
    assert_eq!(finished.result(), Some(TaskResultRef::Dataset(dataset)));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn phrase_without_matches_yields_an_empty_dataset(
    store: Arc<InMemoryTaskStore>,
    clock: Arc<SteppingClock>,
) {
    tag(&store, "doc-1", "knee");
    let task = Task::new_filter(OwnerId::new(), phrase("elbow"), &*clock);
    store.insert(&task).await.expect("insert task");
    let runner = runner_with(&store, &clock, FilterHandler::new(Arc::clone(&store)));

    let outcome = runner.tick().await.expect("filter succeeds");

    let TickOutcome::Completed {
        result: TaskResultRef::Dataset(dataset),
        ..
    } = outcome
    else {
        panic!("filter task must produce a dataset");
    };
    assert!(store.dataset_documents(dataset).expect("members").is_empty());
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn failed_bulk_insert_leaves_no_dataset(
    store: Arc<InMemoryTaskStore>,
    clock: Arc<SteppingClock>,
) {
    tag(&store, "doc-1", "back pain");
    let task = Task::new_filter(OwnerId::new(), phrase("back pain"), &*clock);
    store.insert(&task).await.expect("insert task");
    store
        .fail_next_commit("bulk insert failed")
        .expect("inject failure");
    let runner = runner_with(&store, &clock, FilterHandler::new(Arc::clone(&store)));

    let err = runner.tick().await.expect_err("commit fails");

    assert!(matches!(err, TickError::Commit { .. }));
    assert_eq!(store.dataset_count().expect("count"), 0);
    let finished = store
        .find_by_id(task.id())
        .await
        .expect("lookup")
        .expect("task exists");
    assert!(finished.end_time().is_some());
    assert!(finished.is_error());
    assert!(finished.result().is_none());
}
