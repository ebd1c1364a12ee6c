//! Scheduler integration tests: claiming, finalisation and the run loop.

use super::helpers::{
    Script, ScriptedHandler, SnapshotHandler, SteppingClock, clock, phrase, runner_with, store,
    utf8_tempdir,
};
use lexicon::{
    scheduler::{
        HandlerRegistry, TickError, TickOutcome, WorkerConfig, WorkerEvent, WorkerRunner,
    },
    task::{
        adapters::memory::InMemoryTaskStore,
        domain::{OwnerId, Task, TaskKind, TaskResultRef},
        ports::{TaskStore, TaskStoreError},
    },
};
use rstest::rstest;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::time::timeout;

async fn queue_filter(store: &InMemoryTaskStore, clock: &SteppingClock, text: &str) -> Task {
    let task = Task::new_filter(OwnerId::new(), phrase(text), clock);
    store.insert(&task).await.expect("insert task");
    task
}

async fn reload(store: &InMemoryTaskStore, task: &Task) -> Task {
    store
        .find_by_id(task.id())
        .await
        .expect("lookup")
        .expect("task exists")
}

async fn next_event(events: &mut broadcast::Receiver<WorkerEvent>) -> WorkerEvent {
    timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("event arrives in time")
        .expect("event bus open")
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn empty_queue_is_idle(store: Arc<InMemoryTaskStore>, clock: Arc<SteppingClock>) {
    let runner = runner_with(&store, &clock, ScriptedHandler::new(Script::Stage));

    let outcome = runner.tick().await.expect("tick succeeds");

    assert_eq!(outcome, TickOutcome::Idle);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn ticks_process_tasks_oldest_first(
    store: Arc<InMemoryTaskStore>,
    clock: Arc<SteppingClock>,
) {
    let older = queue_filter(&store, &clock, "back pain").await;
    let newer = queue_filter(&store, &clock, "neck pain").await;
    let runner = runner_with(&store, &clock, ScriptedHandler::new(Script::Stage));

    let first = runner.tick().await.expect("first tick succeeds");
    let second = runner.tick().await.expect("second tick succeeds");
    let third = runner.tick().await.expect("third tick succeeds");

    assert!(matches!(first, TickOutcome::Completed { task_id, .. } if task_id == older.id()));
    assert!(matches!(second, TickOutcome::Completed { task_id, .. } if task_id == newer.id()));
    assert_eq!(third, TickOutcome::Idle);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn successful_tick_records_ordered_timestamps_and_result(
    store: Arc<InMemoryTaskStore>,
    clock: Arc<SteppingClock>,
) {
    let queued = queue_filter(&store, &clock, "back pain").await;
    let runner = runner_with(&store, &clock, ScriptedHandler::new(Script::Stage));

    let outcome = runner.tick().await.expect("tick succeeds");

    let TickOutcome::Completed { result, .. } = outcome else {
        panic!("queued task must complete");
    };
    let task = reload(&store, &queued).await;
    let start = task.start_time().expect("start recorded");
    let end = task.end_time().expect("end recorded");
    assert!(task.created_at() < start);
    assert!(start < end);
    assert!(task.is_complete());
    assert!(!task.is_error());
    assert_eq!(task.result(), Some(result));
    let TaskResultRef::Dataset(dataset) = result else {
        panic!("filter tasks produce datasets");
    };
    let stored = store
        .find_dataset(dataset)
        .await
        .expect("lookup")
        .expect("dataset committed");
    assert_eq!(stored.keywords.as_str(), "back pain");
    assert_eq!(stored.document_count, 0);
}

#[rstest]
#[case::handler_error(Script::Fail)]
#[case::panic(Script::Panic)]
#[case::nothing_staged(Script::StageNothing)]
#[tokio::test(flavor = "multi_thread")]
async fn failed_execution_is_finalised_without_result(
    store: Arc<InMemoryTaskStore>,
    clock: Arc<SteppingClock>,
    #[case] script: Script,
) {
    let queued = queue_filter(&store, &clock, "back pain").await;
    let runner = runner_with(&store, &clock, ScriptedHandler::new(script));

    let err = runner.tick().await.expect_err("failure propagates");

    assert_eq!(err.task_id(), Some(queued.id()));
    let task = reload(&store, &queued).await;
    assert!(task.start_time().is_some());
    assert!(task.end_time().is_some());
    assert!(task.is_complete());
    assert!(task.is_error());
    assert!(task.result().is_none());
    assert_eq!(store.dataset_count().expect("count"), 0);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn errors_and_panics_are_reported_distinctly(
    store: Arc<InMemoryTaskStore>,
    clock: Arc<SteppingClock>,
) {
    queue_filter(&store, &clock, "back pain").await;
    queue_filter(&store, &clock, "neck pain").await;
    queue_filter(&store, &clock, "hip pain").await;

    let failing = runner_with(&store, &clock, ScriptedHandler::new(Script::Fail));
    let handler_err = failing.tick().await.expect_err("handler fails");
    let panicking = runner_with(&store, &clock, ScriptedHandler::new(Script::Panic));
    let panic_err = panicking.tick().await.expect_err("handler panics");
    let silent = runner_with(&store, &clock, ScriptedHandler::new(Script::StageNothing));
    let silent_err = silent.tick().await.expect_err("handler stages nothing");

    assert!(matches!(handler_err, TickError::Handler { .. }));
    assert!(handler_err.to_string().contains("bulk insert failed"));
    assert!(
        matches!(&panic_err, TickError::Panicked { message, .. } if message == "handler exploded")
    );
    assert!(matches!(silent_err, TickError::MissingOutput { .. }));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn failed_commit_leaves_no_result(store: Arc<InMemoryTaskStore>, clock: Arc<SteppingClock>) {
    let queued = queue_filter(&store, &clock, "back pain").await;
    store
        .fail_next_commit("bulk insert failed")
        .expect("inject failure");
    let runner = runner_with(&store, &clock, ScriptedHandler::new(Script::Stage));

    let err = runner.tick().await.expect_err("commit failure propagates");

    assert!(matches!(
        err,
        TickError::Commit {
            source: TaskStoreError::Persistence(_),
            ..
        }
    ));
    let task = reload(&store, &queued).await;
    assert!(task.is_error());
    assert!(task.result().is_none());
    assert_eq!(store.dataset_count().expect("count"), 0);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn artifacts_of_failed_tasks_are_removed(
    store: Arc<InMemoryTaskStore>,
    clock: Arc<SteppingClock>,
) {
    let (_dir, dir_path) = utf8_tempdir();
    let artifact = dir_path.join("embeddings_partial.txt");
    queue_filter(&store, &clock, "back pain").await;
    let runner = runner_with(
        &store,
        &clock,
        ScriptedHandler::new(Script::WriteArtifactThenFail(artifact.clone())),
    );

    let result = runner.tick().await;

    assert!(matches!(result, Err(TickError::Handler { .. })));
    assert!(!artifact.exists());
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn claimed_tasks_are_never_claimed_again(
    store: Arc<InMemoryTaskStore>,
    clock: Arc<SteppingClock>,
) {
    queue_filter(&store, &clock, "back pain").await;
    let runner = runner_with(&store, &clock, ScriptedHandler::new(Script::Fail));

    let first = runner.tick().await;
    let second = runner.tick().await.expect("queue is empty");

    assert!(first.is_err());
    assert_eq!(second, TickOutcome::Idle);
    assert!(
        store
            .next_unclaimed(TaskKind::Filter)
            .await
            .expect("query succeeds")
            .is_none()
    );
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn run_loop_emits_lifecycle_events_and_stops_on_shutdown(
    store: Arc<InMemoryTaskStore>,
    clock: Arc<SteppingClock>,
) {
    let rejected = queue_filter(&store, &clock, "back pain").await;
    let accepted = queue_filter(&store, &clock, "neck pain").await;
    let runner = runner_with(&store, &clock, ScriptedHandler::new(Script::Stage));
    let mut events = runner.events();
    store
        .fail_next_commit("disk full")
        .expect("inject failure");

    let handle = runner.start();

    assert_eq!(
        next_event(&mut events).await,
        WorkerEvent::WorkerStarted {
            kind: TaskKind::Filter
        }
    );
    assert_eq!(
        next_event(&mut events).await,
        WorkerEvent::TaskStarted {
            task_id: rejected.id(),
            kind: TaskKind::Filter
        }
    );
    assert!(matches!(
        next_event(&mut events).await,
        WorkerEvent::TaskFailed { task_id, .. } if task_id == rejected.id()
    ));
    assert_eq!(
        next_event(&mut events).await,
        WorkerEvent::TaskStarted {
            task_id: accepted.id(),
            kind: TaskKind::Filter
        }
    );
    assert!(matches!(
        next_event(&mut events).await,
        WorkerEvent::TaskCompleted { task_id, .. } if task_id == accepted.id()
    ));

    handle.shutdown().await.expect("worker stops cleanly");

    assert_eq!(
        next_event(&mut events).await,
        WorkerEvent::WorkerStopped {
            kind: TaskKind::Filter
        }
    );
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn disabled_worker_never_claims(store: Arc<InMemoryTaskStore>, clock: Arc<SteppingClock>) {
    let queued = queue_filter(&store, &clock, "back pain").await;
    let mut registry = HandlerRegistry::new();
    registry.register(ScriptedHandler::new(Script::Stage));
    let config = WorkerConfig::for_kind(TaskKind::Filter).with_enabled(false);
    let runner = WorkerRunner::new(Arc::clone(&store), Arc::clone(&clock), &registry, config)
        .expect("handler is registered");
    let (_shutdown_tx, mut shutdown_rx) = mpsc::channel(1);

    timeout(Duration::from_secs(5), runner.run(&mut shutdown_rx))
        .await
        .expect("disabled worker returns immediately");

    assert!(!reload(&store, &queued).await.is_claimed());
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn start_is_committed_before_the_handler_runs(
    store: Arc<InMemoryTaskStore>,
    clock: Arc<SteppingClock>,
) {
    let queued = queue_filter(&store, &clock, "back pain").await;
    let handler = SnapshotHandler::new(Arc::clone(&store));
    let runner = runner_with(&store, &clock, handler.clone());

    runner.tick().await.expect("tick succeeds");

    let during = handler.seen().expect("handler saw its task");
    assert!(during.start_time().is_some());
    assert!(during.end_time().is_none());
    assert!(!during.is_complete());
    assert!(during.result().is_none());
    let after = reload(&store, &queued).await;
    assert_eq!(after.start_time(), during.start_time());
    assert!(after.is_complete());
    assert!(!after.is_error());
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn cancelled_tick_still_finalises_the_task(
    store: Arc<InMemoryTaskStore>,
    clock: Arc<SteppingClock>,
) {
    let queued = queue_filter(&store, &clock, "back pain").await;
    let runner = runner_with(&store, &clock, ScriptedHandler::new(Script::Hang));

    let cancelled = timeout(Duration::from_millis(200), runner.tick()).await;

    assert!(cancelled.is_err());
    let finalised = timeout(Duration::from_secs(5), async {
        loop {
            let task = reload(&store, &queued).await;
            if task.is_complete() {
                return task;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("cancelled task is finalised");
    assert!(finalised.start_time().is_some());
    assert!(finalised.is_error());
    assert!(finalised.result().is_none());
}
