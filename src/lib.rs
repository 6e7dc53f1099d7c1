//! fdscope: supervised execution with file-descriptor telemetry
//! Runs untrusted programs under a descriptor ceiling and a wall-clock deadline,
//! samples their descriptor tables while they run, and scores the result.
//!
//! # Architecture
//!
//! ## Kernel Primitives ([`kernel`])
//! - [`kernel::procfs`]: Process-table reads with tri-state results
//! - [`kernel::rlimit`]: `RLIMIT_NOFILE` installation in the child
//! - [`kernel::signal`]: Process-group kill and bounded extinction wait
//!
//! ## Execution Control ([`exec`])
//! - [`exec::sampler`]: Background descriptor sampler with bounded stop
//! - [`exec::supervisor`]: Spawn, wait, kill on deadline, assemble the report
//!
//! ## Analysis ([`analysis`])
//! - [`analysis::classifier`]: Descriptor categories and danger ranks
//! - [`analysis::report`]: Counts, density, usage, severity, narrative
//!
//! ## Language Adapters ([`judge`])
//! - [`judge::compiler`]: Bounded compiler invocation
//! - [`judge::languages`]: Python and C adapters
//!
//! ## Safety ([`safety`])
//! - [`safety::workspace`]: Run-scoped source and artifact directories
//!
//! ## Observability ([`observability`])
//! - [`observability::audit`]: Structured run events
//!
//! ## Configuration ([`config`])
//! - [`config::types`]: Shared type definitions, closed enums, error type
//! - [`config::settings`]: Defaults, JSON file, environment overrides
//!
//! ## Utilities ([`utils`])
//! - [`utils::output`]: Bounded output collection
//!
//! # Design Principles
//!
//! 1. **Kernel as truth** - Evidence from `/proc` and wait status
//! 2. **Bounded waits** - No wait on the child, its group, or the sampler is unbounded
//! 3. **Gaps are data** - An unreadable tick is a missing sample, never an error

// Kernel Primitives
pub mod kernel;

// Execution Control
pub mod exec;

// Descriptor classification and severity scoring
pub mod analysis;

// Language adapters (build and run commands)
pub mod judge;

// Safety & Cleanup
pub mod safety;

// Observability
pub mod observability;

// Configuration
pub mod config;

// Utilities
pub mod utils;

// Forensic documents and the summarizer seam
pub mod forensics;

// CLI entrypoint wiring for the fdscope binary.
pub mod cli;

// Re-export commonly used types for convenience
pub use config::types::*;
