//! Worker runner for the task queues.
//!
//! One [`WorkerRunner`] serves one task kind. Each tick claims the oldest
//! unclaimed task by committing its start time, hands it to the kind's
//! [`TaskHandler`] inside a [`WorkContext`], and finalises it: the staged
//! output and the end time are committed together on success, and only the
//! end time is recorded on failure.

mod config;
mod context;
mod handler;
mod registry;
mod runner;

pub use config::{POLL_INTERVAL_ENV, WORKER_ENABLED_ENV, WorkerConfig};
pub use context::WorkContext;
pub use handler::{HandlerError, TaskHandler};
pub use registry::{HandlerRegistry, MissingHandler};
pub use runner::{TickError, TickOutcome, WorkerEvent, WorkerHandle, WorkerRunner};

#[cfg(test)]
mod tests;
