//! Lexicon: background task execution for keyword filtering and word
//! embedding training over a literature corpus.
//!
//! Users queue two kinds of long-running work: filter tasks, which select
//! the corpus documents tagged with a keyword phrase, and train tasks, which
//! learn word vectors from such a selection. One worker process per kind
//! polls its queue, claims the oldest task, runs it, and records the outcome
//! with consistent start and end bookkeeping.
//!
//! # Architecture
//!
//! Lexicon follows hexagonal architecture principles:
//!
//! - **Domain**: Task aggregate, identifiers and artifacts, free of I/O
//! - **Ports**: Task store, corpus and compute backend traits
//! - **Adapters**: In-memory and `PostgreSQL` stores, container backend
//!
//! # Modules
//!
//! - [`task`]: Task queue domain, persistence ports and submission service
//! - [`scheduler`]: Polling worker, handler contract and unit of work
//! - [`filter`]: Handler building datasets from keyword phrases
//! - [`train`]: Handler training and projecting word embeddings

pub mod filter;
pub mod scheduler;
pub mod task;
pub mod train;
