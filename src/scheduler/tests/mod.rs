//! Unit tests for worker configuration, the handler registry and the unit of
//! work.
