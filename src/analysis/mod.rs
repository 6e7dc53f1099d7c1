//! Descriptor analysis
//!
//! Pure functions that turn a raw descriptor snapshot into a risk-ranked
//! summary. Nothing here touches the process table.

pub mod classifier;
pub mod report;

pub use classifier::{classify, DescriptorCategory};
pub use report::{analyze, AnalysisResult, Severity, SeverityAssessment};
