//! Unit tests for the task domain, the in-memory store and the submission
//! service.
