//! Task lifecycle tests for the `PostgreSQL` store.

use super::helpers::{
    CleanupGuard, SteppingClock, connect, ensure_template, membership_count, setup_store,
    test_runtime,
};
use camino::Utf8PathBuf;
use chrono::{TimeZone, Utc};
use lexicon::task::{
    domain::{
        DatasetId, DocumentKey, Hyperparameters, KeywordPhrase, NewDataset, NewTrainedModel,
        OwnerId, Task, TaskDomainError, TaskKind, TaskOutput, TaskResultRef, TrainedModelId,
        Visualization,
    },
    ports::{TaskStore, TaskStoreError},
};
use pg_embedded_setup_unpriv::{TestCluster, test_support::shared_test_cluster};
use rstest::rstest;

fn phrase(text: &str) -> KeywordPhrase {
    KeywordPhrase::parse(text).expect("valid phrase")
}

fn at(hour: u32) -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 2, hour, 0, 0)
        .single()
        .expect("valid timestamp")
}

fn dataset_output(documents: &[&str]) -> NewDataset {
    NewDataset {
        id: DatasetId::new(),
        keywords: phrase("back pain"),
        documents: documents.iter().copied().map(DocumentKey::new).collect(),
    }
}

// ============================================================================
// Claiming
// ============================================================================

#[rstest]
fn unclaimed_tasks_come_back_oldest_first(shared_test_cluster: &'static TestCluster) {
    ensure_template(shared_test_cluster).expect("template setup");
    let db_name = format!("test_claim_order_{}", uuid::Uuid::new_v4());
    let _guard = CleanupGuard::new(shared_test_cluster, db_name.clone());
    let store = setup_store(shared_test_cluster, &db_name).expect("store setup");
    let clock = SteppingClock::new();

    let older = Task::new_filter(OwnerId::new(), phrase("knee"), &clock);
    let newer = Task::new_filter(OwnerId::new(), phrase("hip"), &clock);

    let rt = test_runtime();
    // Insert out of creation order
    rt.block_on(store.insert(&newer)).expect("insert newer");
    rt.block_on(store.insert(&older)).expect("insert older");

    let first = rt
        .block_on(store.next_unclaimed(TaskKind::Filter))
        .expect("query ok")
        .expect("queued task");
    assert_eq!(first.id(), older.id());

    rt.block_on(store.mark_started(older.id(), at(9)))
        .expect("claim older");
    let second = rt
        .block_on(store.next_unclaimed(TaskKind::Filter))
        .expect("query ok")
        .expect("queued task");
    assert_eq!(second.id(), newer.id());

    rt.block_on(store.mark_started(newer.id(), at(10)))
        .expect("claim newer");
    let none = rt
        .block_on(store.next_unclaimed(TaskKind::Filter))
        .expect("query ok");
    assert!(none.is_none());
}

#[rstest]
fn looking_up_the_next_task_does_not_claim_it(shared_test_cluster: &'static TestCluster) {
    ensure_template(shared_test_cluster).expect("template setup");
    let db_name = format!("test_next_idempotent_{}", uuid::Uuid::new_v4());
    let _guard = CleanupGuard::new(shared_test_cluster, db_name.clone());
    let store = setup_store(shared_test_cluster, &db_name).expect("store setup");
    let task = Task::new_filter(OwnerId::new(), phrase("knee"), &SteppingClock::new());

    let rt = test_runtime();
    rt.block_on(store.insert(&task)).expect("insert");

    let first = rt
        .block_on(store.next_unclaimed(TaskKind::Filter))
        .expect("query ok")
        .expect("queued task");
    let again = rt
        .block_on(store.next_unclaimed(TaskKind::Filter))
        .expect("query ok")
        .expect("still queued");

    assert_eq!(first.id(), task.id());
    assert_eq!(again.id(), task.id());
    assert!(again.start_time().is_none());
    let train = rt
        .block_on(store.next_unclaimed(TaskKind::Train))
        .expect("query ok");
    assert!(train.is_none());
}

#[rstest]
fn starting_twice_is_rejected(shared_test_cluster: &'static TestCluster) {
    ensure_template(shared_test_cluster).expect("template setup");
    let db_name = format!("test_start_twice_{}", uuid::Uuid::new_v4());
    let _guard = CleanupGuard::new(shared_test_cluster, db_name.clone());
    let store = setup_store(shared_test_cluster, &db_name).expect("store setup");
    let task = Task::new_filter(OwnerId::new(), phrase("knee"), &SteppingClock::new());

    let rt = test_runtime();
    rt.block_on(store.insert(&task)).expect("insert");
    rt.block_on(store.mark_started(task.id(), at(9)))
        .expect("first claim");

    let err = rt
        .block_on(store.mark_started(task.id(), at(10)))
        .expect_err("second claim fails");

    assert!(matches!(
        err,
        TaskStoreError::Lifecycle(TaskDomainError::AlreadyStarted(id)) if id == task.id()
    ));
    let stored = rt
        .block_on(store.find_by_id(task.id()))
        .expect("lookup")
        .expect("task exists");
    assert_eq!(stored.start_time(), Some(at(9)));
}

#[rstest]
fn duplicate_insert_is_reported(shared_test_cluster: &'static TestCluster) {
    ensure_template(shared_test_cluster).expect("template setup");
    let db_name = format!("test_duplicate_{}", uuid::Uuid::new_v4());
    let _guard = CleanupGuard::new(shared_test_cluster, db_name.clone());
    let store = setup_store(shared_test_cluster, &db_name).expect("store setup");
    let task = Task::new_filter(OwnerId::new(), phrase("knee"), &SteppingClock::new());

    let rt = test_runtime();
    rt.block_on(store.insert(&task)).expect("first insert");
    let err = rt
        .block_on(store.insert(&task))
        .expect_err("second insert fails");

    assert!(matches!(err, TaskStoreError::DuplicateTask(id) if id == task.id()));
}

// ============================================================================
// Completion
// ============================================================================

#[rstest]
fn completion_writes_dataset_members_and_result_together(
    shared_test_cluster: &'static TestCluster,
) {
    ensure_template(shared_test_cluster).expect("template setup");
    let db_name = format!("test_complete_{}", uuid::Uuid::new_v4());
    let _guard = CleanupGuard::new(shared_test_cluster, db_name.clone());
    let store = setup_store(shared_test_cluster, &db_name).expect("store setup");
    let task = Task::new_filter(OwnerId::new(), phrase("back pain"), &SteppingClock::new());
    let output = dataset_output(&["doc-1", "doc-2", "doc-3"]);
    let dataset_id = output.id;

    let rt = test_runtime();
    rt.block_on(store.insert(&task)).expect("insert");
    rt.block_on(store.mark_started(task.id(), at(9)))
        .expect("claim");
    let result = rt
        .block_on(store.complete(task.id(), &TaskOutput::Dataset(output), at(10)))
        .expect("complete");

    assert_eq!(result, TaskResultRef::Dataset(dataset_id));
    let dataset = rt
        .block_on(store.find_dataset(dataset_id))
        .expect("lookup")
        .expect("dataset committed");
    assert_eq!(dataset.document_count, 3);
    assert_eq!(dataset.keywords.as_str(), "back pain");
    assert_eq!(dataset.created_at, at(10));
    let mut conn = connect(shared_test_cluster, &db_name);
    assert_eq!(membership_count(&mut conn, dataset_id), 3);
    let finished = rt
        .block_on(store.find_by_id(task.id()))
        .expect("lookup")
        .expect("task exists");
    assert_eq!(finished.end_time(), Some(at(10)));
    assert_eq!(finished.result(), Some(TaskResultRef::Dataset(dataset_id)));
    assert!(finished.is_complete());
    assert!(!finished.is_error());
}

#[rstest]
fn failed_membership_insert_rolls_back_the_whole_completion(
    shared_test_cluster: &'static TestCluster,
) {
    ensure_template(shared_test_cluster).expect("template setup");
    let db_name = format!("test_complete_rollback_{}", uuid::Uuid::new_v4());
    let _guard = CleanupGuard::new(shared_test_cluster, db_name.clone());
    let store = setup_store(shared_test_cluster, &db_name).expect("store setup");
    let task = Task::new_filter(OwnerId::new(), phrase("back pain"), &SteppingClock::new());
    // The repeated key violates the membership primary key after the
    // dataset row has already been inserted.
    let output = dataset_output(&["doc-1", "doc-2", "doc-1"]);
    let dataset_id = output.id;

    let rt = test_runtime();
    rt.block_on(store.insert(&task)).expect("insert");
    rt.block_on(store.mark_started(task.id(), at(9)))
        .expect("claim");
    let err = rt
        .block_on(store.complete(task.id(), &TaskOutput::Dataset(output), at(10)))
        .expect_err("membership insert fails");

    assert!(matches!(err, TaskStoreError::Persistence(_)));
    let dataset = rt
        .block_on(store.find_dataset(dataset_id))
        .expect("lookup");
    assert!(dataset.is_none());
    let mut conn = connect(shared_test_cluster, &db_name);
    assert_eq!(membership_count(&mut conn, dataset_id), 0);
    let unfinished = rt
        .block_on(store.find_by_id(task.id()))
        .expect("lookup")
        .expect("task exists");
    assert_eq!(unfinished.start_time(), Some(at(9)));
    assert!(unfinished.end_time().is_none());
    assert!(unfinished.result().is_none());

    rt.block_on(store.mark_failed(task.id(), at(11)))
        .expect("failure still recordable");
    let failed = rt
        .block_on(store.find_by_id(task.id()))
        .expect("lookup")
        .expect("task exists");
    assert!(failed.is_error());
}

#[rstest]
fn train_completion_writes_the_model(shared_test_cluster: &'static TestCluster) {
    ensure_template(shared_test_cluster).expect("template setup");
    let db_name = format!("test_complete_train_{}", uuid::Uuid::new_v4());
    let _guard = CleanupGuard::new(shared_test_cluster, db_name.clone());
    let store = setup_store(shared_test_cluster, &db_name).expect("store setup");
    let clock = SteppingClock::new();
    let filter = Task::new_filter(OwnerId::new(), phrase("back pain"), &clock);
    let dataset = dataset_output(&["doc-1"]);
    let dataset_id = dataset.id;

    let rt = test_runtime();
    rt.block_on(store.insert(&filter)).expect("insert filter");
    rt.block_on(store.mark_started(filter.id(), at(8)))
        .expect("claim filter");
    rt.block_on(store.complete(filter.id(), &TaskOutput::Dataset(dataset), at(9)))
        .expect("dataset committed");

    let train = Task::new_train(OwnerId::new(), dataset_id, Hyperparameters::default(), &clock)
        .expect("default hyperparameters are valid");
    let model = NewTrainedModel {
        id: TrainedModelId::new(),
        embeddings_path: Utf8PathBuf::from("fs/embeddings_1.txt"),
        visualization: Visualization {
            labels: vec!["knee".to_owned(), "hip".to_owned()],
            x: vec![0.5, -0.5],
            y: vec![1.0, 0.0],
        },
    };
    let model_id = model.id;
    rt.block_on(store.insert(&train)).expect("insert train");
    let claimed = rt
        .block_on(store.next_unclaimed(TaskKind::Train))
        .expect("query ok")
        .expect("queued train task");
    assert_eq!(claimed.id(), train.id());
    rt.block_on(store.mark_started(train.id(), at(10)))
        .expect("claim train");
    rt.block_on(store.complete(train.id(), &TaskOutput::Model(model), at(11)))
        .expect("model committed");

    let stored = rt
        .block_on(store.find_trained_model(model_id))
        .expect("lookup")
        .expect("model exists");
    assert_eq!(stored.embeddings_path.as_str(), "fs/embeddings_1.txt");
    assert_eq!(stored.visualization.labels, vec!["knee", "hip"]);
    assert_eq!(stored.visualization.x, vec![0.5, -0.5]);
    let finished = rt
        .block_on(store.find_by_id(train.id()))
        .expect("lookup")
        .expect("task exists");
    assert_eq!(finished.result(), Some(TaskResultRef::Model(model_id)));
}

// ============================================================================
// Failure and requeue
// ============================================================================

#[rstest]
fn marking_failed_sets_only_the_end_time(shared_test_cluster: &'static TestCluster) {
    ensure_template(shared_test_cluster).expect("template setup");
    let db_name = format!("test_mark_failed_{}", uuid::Uuid::new_v4());
    let _guard = CleanupGuard::new(shared_test_cluster, db_name.clone());
    let store = setup_store(shared_test_cluster, &db_name).expect("store setup");
    let task = Task::new_filter(OwnerId::new(), phrase("knee"), &SteppingClock::new());

    let rt = test_runtime();
    rt.block_on(store.insert(&task)).expect("insert");
    let unstarted = rt
        .block_on(store.mark_failed(task.id(), at(9)))
        .expect_err("queued task cannot fail");
    assert!(matches!(
        unstarted,
        TaskStoreError::Lifecycle(TaskDomainError::NotStarted(_))
    ));

    rt.block_on(store.mark_started(task.id(), at(9)))
        .expect("claim");
    rt.block_on(store.mark_failed(task.id(), at(10)))
        .expect("fail");

    let failed = rt
        .block_on(store.find_by_id(task.id()))
        .expect("lookup")
        .expect("task exists");
    assert_eq!(failed.start_time(), Some(at(9)));
    assert_eq!(failed.end_time(), Some(at(10)));
    assert!(failed.result().is_none());
    assert!(failed.is_error());

    let again = rt
        .block_on(store.mark_failed(task.id(), at(11)))
        .expect_err("finished task cannot fail again");
    assert!(matches!(
        again,
        TaskStoreError::Lifecycle(TaskDomainError::AlreadyFinished(_))
    ));
}

#[rstest]
fn requeue_returns_a_stalled_task_to_the_queue(shared_test_cluster: &'static TestCluster) {
    ensure_template(shared_test_cluster).expect("template setup");
    let db_name = format!("test_requeue_{}", uuid::Uuid::new_v4());
    let _guard = CleanupGuard::new(shared_test_cluster, db_name.clone());
    let store = setup_store(shared_test_cluster, &db_name).expect("store setup");
    let task = Task::new_filter(OwnerId::new(), phrase("knee"), &SteppingClock::new());

    let rt = test_runtime();
    rt.block_on(store.insert(&task)).expect("insert");
    rt.block_on(store.mark_started(task.id(), at(9)))
        .expect("claim");

    let stalled = rt
        .block_on(store.list_stalled(TaskKind::Filter))
        .expect("list stalled");
    assert_eq!(
        stalled.iter().map(Task::id).collect::<Vec<_>>(),
        vec![task.id()]
    );

    rt.block_on(store.requeue(task.id())).expect("requeue");

    let queued = rt
        .block_on(store.next_unclaimed(TaskKind::Filter))
        .expect("query ok")
        .expect("task queued again");
    assert_eq!(queued.id(), task.id());
    assert!(queued.start_time().is_none());
    let stalled = rt
        .block_on(store.list_stalled(TaskKind::Filter))
        .expect("list stalled");
    assert!(stalled.is_empty());

    rt.block_on(store.mark_started(task.id(), at(10)))
        .expect("reclaim");
    rt.block_on(store.mark_failed(task.id(), at(11)))
        .expect("fail");
    let err = rt
        .block_on(store.requeue(task.id()))
        .expect_err("finished task is not stalled");
    assert!(matches!(
        err,
        TaskStoreError::Lifecycle(TaskDomainError::NotStalled(_))
    ));
}

#[rstest]
fn transitions_on_unknown_tasks_report_not_found(shared_test_cluster: &'static TestCluster) {
    ensure_template(shared_test_cluster).expect("template setup");
    let db_name = format!("test_not_found_{}", uuid::Uuid::new_v4());
    let _guard = CleanupGuard::new(shared_test_cluster, db_name.clone());
    let store = setup_store(shared_test_cluster, &db_name).expect("store setup");
    let missing = Task::new_filter(OwnerId::new(), phrase("knee"), &SteppingClock::new());

    let rt = test_runtime();
    let err = rt
        .block_on(store.mark_started(missing.id(), at(9)))
        .expect_err("unknown task");

    assert!(matches!(err, TaskStoreError::NotFound(id) if id == missing.id()));
}
