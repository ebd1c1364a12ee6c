//! Task queues for keyword filtering and embedding training.
//!
//! Each task kind has its own queue. A task is claimed by recording its
//! start time, and finalised by recording its end time together with the
//! artifact it produced, or on its own when execution failed. The module
//! follows hexagonal architecture:
//!
//! - Domain types in [`domain`]
//! - Port contracts in [`ports`]
//! - Adapter implementations in [`adapters`]
//! - Submission and recovery services in [`services`]

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod services;

#[cfg(test)]
mod tests;
