//! Configuration
//!
//! Shared closed types, the error taxonomy, and runtime settings.

pub mod settings;
pub mod types;
