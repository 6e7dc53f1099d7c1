//! Safety and cleanup
//!
//! Run-scoped directories that never outlive the run that created them.

pub mod workspace;
