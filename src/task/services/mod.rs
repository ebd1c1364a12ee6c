//! Application services for task submission and operator recovery.

mod submission;

pub use submission::{SubmissionError, SubmissionResult, TaskSubmissionService};
