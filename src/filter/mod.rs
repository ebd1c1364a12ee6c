//! Keyword filter tasks.
//!
//! A filter task selects the corpus documents whose normalised keyword field
//! equals the task's phrase and records them as a new dataset.

mod handler;

pub use handler::FilterHandler;
