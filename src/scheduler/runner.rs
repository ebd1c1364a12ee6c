//! Worker runner: the claim, execute and finalise loop for one queue.

use super::{
    HandlerError, HandlerRegistry, MissingHandler, TaskHandler, WorkContext, WorkerConfig,
    context::remove_artifacts,
};
use crate::task::{
    domain::{TaskId, TaskKind, TaskResultRef},
    ports::{TaskStore, TaskStoreError},
};
use camino::Utf8PathBuf;
use futures::FutureExt;
use mockable::Clock;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{broadcast, mpsc};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};

/// Buffered events per subscriber before the oldest are dropped.
const EVENT_BUS_CAPACITY: usize = 64;

/// Result of one successful scheduler tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// No unclaimed task was waiting.
    Idle,
    /// A task ran and its output was committed.
    Completed {
        /// Task that ran.
        task_id: TaskId,
        /// Artifact the task now references.
        result: TaskResultRef,
    },
}

/// Errors surfaced by a scheduler tick.
///
/// Every variant carrying a `task_id` describes a task that was claimed and
/// then finalised without a result, except [`TickError::Finalize`] where
/// recording the end time itself failed.
#[derive(Debug, Error)]
pub enum TickError {
    /// The queue could not be read or the claim could not be recorded.
    #[error("task store unavailable: {0}")]
    Store(#[source] TaskStoreError),

    /// The handler returned an error.
    #[error("task {task_id} failed: {source}")]
    Handler {
        /// Failed task.
        task_id: TaskId,
        /// Handler error.
        source: HandlerError,
    },

    /// The handler panicked.
    #[error("task {task_id} panicked: {message}")]
    Panicked {
        /// Failed task.
        task_id: TaskId,
        /// Panic payload rendered as text.
        message: String,
    },

    /// The handler returned without staging an output.
    #[error("task {task_id} finished without staging an output")]
    MissingOutput {
        /// Failed task.
        task_id: TaskId,
    },

    /// Writing the staged output failed and nothing was committed.
    #[error("task {task_id} output could not be committed: {source}")]
    Commit {
        /// Failed task.
        task_id: TaskId,
        /// Store error raised by the commit.
        source: TaskStoreError,
    },

    /// The end time of a failed task could not be recorded.
    #[error("task {task_id} could not be finalised after `{failure}`: {source}")]
    Finalize {
        /// Task left without an end time.
        task_id: TaskId,
        /// The failure being recorded.
        failure: Box<TickError>,
        /// Store error raised while recording it.
        source: TaskStoreError,
    },
}

impl TickError {
    /// Returns the claimed task the error refers to, if any.
    #[must_use]
    pub const fn task_id(&self) -> Option<TaskId> {
        match self {
            Self::Store(_) => None,
            Self::Handler { task_id, .. }
            | Self::Panicked { task_id, .. }
            | Self::MissingOutput { task_id }
            | Self::Commit { task_id, .. }
            | Self::Finalize { task_id, .. } => Some(*task_id),
        }
    }
}

/// Event emitted by a worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerEvent {
    /// The run loop started.
    WorkerStarted {
        /// Queue served.
        kind: TaskKind,
    },
    /// A task was claimed and handed to its handler.
    TaskStarted {
        /// Claimed task.
        task_id: TaskId,
        /// Queue the task came from.
        kind: TaskKind,
    },
    /// A task's output was committed.
    TaskCompleted {
        /// Finished task.
        task_id: TaskId,
        /// Queue the task came from.
        kind: TaskKind,
        /// Artifact the task now references.
        result: TaskResultRef,
    },
    /// A task was finalised without a result.
    TaskFailed {
        /// Finished task.
        task_id: TaskId,
        /// Queue the task came from.
        kind: TaskKind,
        /// Rendered failure.
        error: String,
    },
    /// The run loop stopped.
    WorkerStopped {
        /// Queue served.
        kind: TaskKind,
    },
}

/// Handle for controlling a started worker.
#[derive(Debug)]
pub struct WorkerHandle {
    shutdown_tx: mpsc::Sender<()>,
    event_rx: broadcast::Receiver<WorkerEvent>,
    join: JoinHandle<()>,
}

impl WorkerHandle {
    /// Returns a receiver for events emitted from now on.
    #[must_use]
    pub fn events(&self) -> broadcast::Receiver<WorkerEvent> {
        self.event_rx.resubscribe()
    }

    /// Signals the worker to stop at its next poll boundary and waits for
    /// the run loop to exit. A running task is always allowed to finish.
    ///
    /// # Errors
    ///
    /// Returns the [`JoinError`] of the worker task if it panicked.
    pub async fn shutdown(self) -> Result<(), JoinError> {
        if self.shutdown_tx.send(()).await.is_err() {
            debug!("worker already stopped");
        }
        self.join.await
    }
}

/// Serial worker for one task kind.
///
/// At most one task is in flight per runner. The only suspension point
/// outside a handler is the idle sleep between polls.
pub struct WorkerRunner<S, C>
where
    S: TaskStore + 'static,
    C: Clock + Send + Sync + 'static,
{
    store: Arc<S>,
    clock: Arc<C>,
    handler: Arc<dyn TaskHandler>,
    config: WorkerConfig,
    event_tx: broadcast::Sender<WorkerEvent>,
}

impl<S, C> WorkerRunner<S, C>
where
    S: TaskStore + 'static,
    C: Clock + Send + Sync + 'static,
{
    /// Creates a runner for the kind named in `config`.
    ///
    /// # Errors
    ///
    /// Returns [`MissingHandler`] when the registry has no handler for the
    /// configured kind.
    pub fn new(
        store: Arc<S>,
        clock: Arc<C>,
        registry: &HandlerRegistry,
        config: WorkerConfig,
    ) -> Result<Self, MissingHandler> {
        let handler = registry.get(config.kind)?;
        let (event_tx, _) = broadcast::channel(EVENT_BUS_CAPACITY);
        Ok(Self {
            store,
            clock,
            handler,
            config,
            event_tx,
        })
    }

    /// Returns the runner configuration.
    #[must_use]
    pub const fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Returns a receiver for events emitted from now on.
    #[must_use]
    pub fn events(&self) -> broadcast::Receiver<WorkerEvent> {
        self.event_tx.subscribe()
    }

    /// Runs one poll cycle.
    ///
    /// Claims the oldest unclaimed task, commits its start time, executes
    /// the handler and finalises the task. The end time is recorded whether
    /// the handler succeeded, failed or panicked.
    ///
    /// # Errors
    ///
    /// Returns the task's failure after it has been finalised, or
    /// [`TickError::Store`] when nothing could be claimed.
    #[instrument(skip(self), fields(kind = %self.config.kind))]
    pub async fn tick(&self) -> Result<TickOutcome, TickError> {
        let kind = self.config.kind;
        let Some(mut task) = self
            .store
            .next_unclaimed(kind)
            .await
            .map_err(TickError::Store)?
        else {
            debug!("queue empty");
            return Ok(TickOutcome::Idle);
        };

        let task_id = task.id();
        let started_at = self.clock.utc();
        task.start(started_at)
            .map_err(|err| TickError::Store(err.into()))?;
        self.store
            .mark_started(task_id, started_at)
            .await
            .map_err(TickError::Store)?;
        let mut guard = ClaimGuard::arm(Arc::clone(&self.store), Arc::clone(&self.clock), task_id);
        info!(%task_id, %started_at, "task claimed");
        self.emit(WorkerEvent::TaskStarted { task_id, kind });

        let started = Instant::now();
        let mut ctx = WorkContext::new(task);
        let execution = AssertUnwindSafe(self.handler.execute(&mut ctx))
            .catch_unwind()
            .await;
        let (staged, artifacts) = ctx.into_parts();

        let failure = match execution {
            Ok(Ok(())) => match staged {
                Some(output) => {
                    let finished_at = self.clock.utc();
                    match self.store.complete(task_id, &output, finished_at).await {
                        Ok(result) => {
                            guard.disarm();
                            info!(%task_id, ?result, elapsed = ?started.elapsed(), "task completed");
                            self.emit(WorkerEvent::TaskCompleted {
                                task_id,
                                kind,
                                result,
                            });
                            return Ok(TickOutcome::Completed { task_id, result });
                        }
                        Err(source) => TickError::Commit { task_id, source },
                    }
                }
                None => TickError::MissingOutput { task_id },
            },
            Ok(Err(source)) => TickError::Handler { task_id, source },
            Err(payload) => TickError::Panicked {
                task_id,
                message: panic_message(&*payload),
            },
        };

        Err(self.record_failure(&mut guard, failure, &artifacts).await)
    }

    async fn record_failure(
        &self,
        guard: &mut ClaimGuard<S, C>,
        failure: TickError,
        artifacts: &[Utf8PathBuf],
    ) -> TickError {
        let task_id = guard.task_id;
        remove_artifacts(artifacts).await;
        let finished_at = self.clock.utc();
        let recorded = self.store.mark_failed(task_id, finished_at).await;
        guard.disarm();

        match recorded {
            Ok(()) => {
                warn!(%task_id, error = %failure, "task failed");
                self.emit(WorkerEvent::TaskFailed {
                    task_id,
                    kind: self.config.kind,
                    error: failure.to_string(),
                });
                failure
            }
            Err(source) => TickError::Finalize {
                task_id,
                failure: Box::new(failure),
                source,
            },
        }
    }

    /// Polls until a shutdown signal arrives.
    ///
    /// Tick errors are logged and never stop the loop. The shutdown signal
    /// is only observed between ticks.
    #[instrument(skip(self, shutdown_rx), fields(kind = %self.config.kind))]
    pub async fn run(&self, shutdown_rx: &mut mpsc::Receiver<()>) {
        if !self.config.enabled {
            info!("worker is disabled, not starting");
            return;
        }

        let kind = self.config.kind;
        info!(poll_interval = ?self.config.poll_interval, "worker started");
        self.emit(WorkerEvent::WorkerStarted { kind });

        loop {
            if !matches!(shutdown_rx.try_recv(), Err(TryRecvError::Empty)) {
                info!("worker received shutdown signal");
                break;
            }

            let idle = match self.tick().await {
                Ok(TickOutcome::Idle) => true,
                Ok(TickOutcome::Completed { .. }) => false,
                Err(err) => {
                    error!(error = %err, "worker tick failed");
                    true
                }
            };

            if idle {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("worker received shutdown signal");
                        break;
                    }
                    () = sleep(self.config.poll_interval) => {}
                }
            }
        }

        self.emit(WorkerEvent::WorkerStopped { kind });
        info!("worker stopped");
    }

    /// Spawns the run loop and returns a handle for control.
    #[must_use]
    pub fn start(self) -> WorkerHandle {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);
        let event_rx = self.event_tx.subscribe();
        let join = tokio::spawn(async move {
            self.run(&mut shutdown_rx).await;
        });
        WorkerHandle {
            shutdown_tx,
            event_rx,
            join,
        }
    }

    fn emit(&self, event: WorkerEvent) {
        if self.event_tx.send(event).is_err() {
            debug!("no worker event subscribers");
        }
    }
}

/// Records a failure for a claimed task if the tick is dropped before the
/// task is finalised.
struct ClaimGuard<S, C>
where
    S: TaskStore + 'static,
    C: Clock + Send + Sync + 'static,
{
    store: Arc<S>,
    clock: Arc<C>,
    task_id: TaskId,
    armed: bool,
}

impl<S, C> ClaimGuard<S, C>
where
    S: TaskStore + 'static,
    C: Clock + Send + Sync + 'static,
{
    const fn arm(store: Arc<S>, clock: Arc<C>, task_id: TaskId) -> Self {
        Self {
            store,
            clock,
            task_id,
            armed: true,
        }
    }

    const fn disarm(&mut self) {
        self.armed = false;
    }
}

impl<S, C> Drop for ClaimGuard<S, C>
where
    S: TaskStore + 'static,
    C: Clock + Send + Sync + 'static,
{
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let task_id = self.task_id;
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            error!(%task_id, "task cancelled outside a runtime; left stalled");
            return;
        };
        warn!(%task_id, "task cancelled mid-execution; recording failure");
        let store = Arc::clone(&self.store);
        let clock = Arc::clone(&self.clock);
        drop(runtime.spawn(async move {
            if let Err(err) = store.mark_failed(task_id, clock.utc()).await {
                error!(%task_id, error = %err, "failed to finalise cancelled task");
            }
        }));
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|message| (*message).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_owned())
}
