//! `PostgreSQL` adapters for task queues, artifacts and the corpus.

mod convert;
mod models;
mod repository;
mod schema;


pub use repository::{PostgresTaskStore, TaskPgPool};
