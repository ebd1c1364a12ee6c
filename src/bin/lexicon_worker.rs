//! Runs a Lexicon worker, or inspects its queue, against `PostgreSQL`.
//!
//! Usage:
//!
//! ```text
//! lexicon_worker run --kind <filter|train>
//! lexicon_worker stalled --kind <filter|train>
//! lexicon_worker requeue --kind <filter|train> <task-id>
//! ```
//!
//! Settings are read from flags, falling back to environment variables and
//! a `.env` file in the working directory. `DATABASE_URL` is required. The
//! train worker also honours `LEXICON_DATA_ROOT`, `LEXICON_BACKEND_IMAGE`
//! and `LEXICON_CONTAINER_ENGINE`, and every worker honours
//! `LEXICON_POLL_INTERVAL_MS` and `LEXICON_WORKER_ENABLED`. Log verbosity
//! follows `RUST_LOG` and defaults to `info`.

use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};
use diesel::PgConnection;
use diesel::r2d2::{ConnectionManager, Pool};
use lexicon::filter::FilterHandler;
use lexicon::scheduler::{HandlerRegistry, MissingHandler, WorkerConfig, WorkerRunner};
use lexicon::task::adapters::postgres::{PostgresTaskStore, TaskPgPool};
use lexicon::task::domain::{TaskId, TaskKind};
use lexicon::task::services::{SubmissionError, TaskSubmissionService};
use lexicon::train::{ContainerComputeBackend, DEFAULT_BACKEND_IMAGE, TrainHandler, TsneProjector};
use mockable::DefaultClock;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

/// Boxed error type for the main result.
type BoxError = Box<dyn std::error::Error + Send + Sync>;

type PgSubmissionService = TaskSubmissionService<PostgresTaskStore, DefaultClock>;

/// Errors that can occur while running worker commands.
#[derive(Debug, Error)]
enum WorkerError {
    #[error("failed to load .env file: {0}")]
    Environment(#[source] dotenvy::Error),
    #[error("failed to build connection pool: {0}")]
    Pool(#[source] diesel::r2d2::PoolError),
    #[error(transparent)]
    MissingHandler(#[from] MissingHandler),
    #[error(transparent)]
    Submission(#[from] SubmissionError),
    #[error("task {task_id} is a {found} task, not {expected}")]
    KindMismatch {
        task_id: TaskId,
        expected: TaskKind,
        found: TaskKind,
    },
    #[error("failed to listen for ctrl-c: {0}")]
    Signal(#[source] std::io::Error),
    #[error("worker task ended abnormally: {0}")]
    Join(#[source] tokio::task::JoinError),
}

/// Background worker for the Lexicon task queues.
#[derive(Debug, Parser)]
#[command(name = "lexicon_worker", version, about)]
struct Cli {
    /// `PostgreSQL` connection string.
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    database_url: String,

    /// Maximum number of pooled database connections.
    #[arg(long, env = "LEXICON_POOL_SIZE", default_value_t = 4)]
    pool_size: u32,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Poll one queue until interrupted.
    Run {
        /// Queue to serve.
        #[arg(long)]
        kind: TaskKind,

        /// Directory receiving trained vector files.
        #[arg(long, env = "LEXICON_DATA_ROOT", default_value = "fs")]
        data_root: Utf8PathBuf,

        /// Container image running the embedding trainer.
        #[arg(long, env = "LEXICON_BACKEND_IMAGE", default_value = DEFAULT_BACKEND_IMAGE)]
        backend_image: String,

        /// Container engine binary used to run the trainer.
        #[arg(long, env = "LEXICON_CONTAINER_ENGINE", default_value = "docker")]
        container_engine: String,
    },

    /// List claimed tasks that never finished.
    Stalled {
        /// Queue to inspect.
        #[arg(long)]
        kind: TaskKind,
    },

    /// Make a stalled task claimable again.
    Requeue {
        /// Queue the task belongs to.
        #[arg(long)]
        kind: TaskKind,

        /// Identifier of the stalled task.
        task_id: Uuid,
    },
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    load_dotenv()?;

    let cli = Cli::parse();
    let pool = build_pool(&cli.database_url, cli.pool_size)?;
    let store = Arc::new(PostgresTaskStore::new(pool));
    let clock = Arc::new(DefaultClock);

    match cli.command {
        Command::Run {
            kind,
            data_root,
            backend_image,
            container_engine,
        } => {
            let backend =
                ContainerComputeBackend::new(backend_image).with_program(container_engine);
            let registry = build_registry(&store, backend, data_root);
            run_worker(store, clock, &registry, kind).await?;
        }
        Command::Stalled { kind } => {
            list_stalled(&TaskSubmissionService::new(store, clock), kind).await?;
        }
        Command::Requeue { kind, task_id } => {
            let service = TaskSubmissionService::new(store, clock);
            requeue(&service, kind, TaskId::from_uuid(task_id)).await?;
        }
    }
    Ok(())
}

fn load_dotenv() -> Result<(), WorkerError> {
    match dotenvy::dotenv() {
        Ok(path) => {
            debug!(path = %path.display(), "loaded environment file");
            Ok(())
        }
        Err(err) if err.not_found() => Ok(()),
        Err(err) => Err(WorkerError::Environment(err)),
    }
}

fn build_pool(database_url: &str, pool_size: u32) -> Result<TaskPgPool, WorkerError> {
    Pool::builder()
        .max_size(pool_size)
        .build(ConnectionManager::<PgConnection>::new(database_url))
        .map_err(WorkerError::Pool)
}

fn build_registry(
    store: &Arc<PostgresTaskStore>,
    backend: ContainerComputeBackend,
    data_root: Utf8PathBuf,
) -> HandlerRegistry {
    let mut registry = HandlerRegistry::new();
    registry.register(FilterHandler::new(Arc::clone(store)));
    registry.register(TrainHandler::new(
        Arc::clone(store),
        Arc::new(backend),
        Arc::new(TsneProjector::default()),
        data_root,
    ));
    registry
}

async fn run_worker(
    store: Arc<PostgresTaskStore>,
    clock: Arc<DefaultClock>,
    registry: &HandlerRegistry,
    kind: TaskKind,
) -> Result<(), WorkerError> {
    let config = WorkerConfig::from_env(kind);
    let handle = WorkerRunner::new(store, clock, registry, config)?.start();

    tokio::signal::ctrl_c().await.map_err(WorkerError::Signal)?;
    info!(%kind, "interrupt received, stopping after the current task");
    handle.shutdown().await.map_err(WorkerError::Join)
}

async fn list_stalled(service: &PgSubmissionService, kind: TaskKind) -> Result<(), WorkerError> {
    let stalled = service.list_stalled(kind).await?;
    if stalled.is_empty() {
        info!(%kind, "no stalled tasks");
    }
    for task in stalled {
        warn!(
            %kind,
            task_id = %task.id(),
            created_at = %task.created_at(),
            start_time = ?task.start_time(),
            "stalled task"
        );
    }
    Ok(())
}

async fn requeue(
    service: &PgSubmissionService,
    kind: TaskKind,
    task_id: TaskId,
) -> Result<(), WorkerError> {
    let task = service
        .find(task_id)
        .await?
        .ok_or(SubmissionError::TaskNotFound(task_id))?;
    if task.kind() != kind {
        return Err(WorkerError::KindMismatch {
            task_id,
            expected: kind,
            found: task.kind(),
        });
    }
    service.requeue(task_id).await?;
    info!(%kind, %task_id, "task requeued");
    Ok(())
}
