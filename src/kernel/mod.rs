//! Thin wrappers around Linux kernel primitives.
//!
//! All `unsafe` code is concentrated here with explicit SAFETY comments.
//! Dependency direction: procfs -> signal, rlimit (standalone)

pub mod procfs;
pub mod rlimit;
pub mod signal;
