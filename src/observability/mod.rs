//! Observability
//!
//! Structured audit events for every supervised run.

pub mod audit;
