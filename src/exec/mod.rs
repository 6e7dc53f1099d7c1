//! Execution control
//!
//! Spawns supervised children and observes them while they run.

pub mod sampler;
pub mod supervisor;

pub use supervisor::{ExecutionRequest, Supervisor};
