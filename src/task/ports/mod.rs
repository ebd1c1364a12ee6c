//! Port contracts for the task queue and the external corpus.
//!
//! Ports define infrastructure-agnostic interfaces used by the scheduler,
//! the task handlers and the submission service.

pub mod corpus;
pub mod store;

pub use corpus::{CorpusError, CorpusReader, CorpusResult};
pub use store::{TaskStore, TaskStoreError, TaskStoreResult};
