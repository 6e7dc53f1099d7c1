//! Language adapters.
//!
//! The supervisor stays language-agnostic. Adapters decide how a source file
//! is built (if at all) and which command runs it.

pub mod adapter;
pub mod compiler;
pub mod languages;
pub mod registry;

pub use adapter::{run_source, LanguageAdapter, Prepared};
pub use registry::{adapter_for, detect_language};
