//! Utilities
//!
//! Cross-cutting helpers for child output collection.

pub mod output;
