/// Core types and structures shared across fdscope
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One open descriptor of a process as observed through the process table.
///
/// `target` is the kernel-object reference exactly as `readlink` reported it:
/// a path, or a pseudo-path such as `socket:[123]` or `pipe:[456]`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct DescriptorEntry {
    /// Descriptor number
    #[serde(rename = "fd")]
    pub index: u32,
    /// Kernel object the descriptor refers to
    pub target: String,
}

impl DescriptorEntry {
    pub fn new(index: u32, target: impl Into<String>) -> Self {
        Self {
            index,
            target: target.into(),
        }
    }
}

/// One point of the descriptor-count time series.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct DescriptorSample {
    /// Seconds since the first sample (first sample is always 0.0 after normalization)
    #[serde(rename = "time_sec")]
    pub elapsed_seconds: f64,
    /// Number of open descriptors at that instant
    #[serde(rename = "fd_count")]
    pub count: usize,
}

/// How a supervised run ended - closed set
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum TerminationReason {
    /// Exited on its own with status 0
    #[serde(rename = "normal")]
    Normal,
    /// Exited on its own with a non-zero status, or died from a signal we did not send
    #[serde(rename = "non_zero_exit")]
    NonZeroExit,
    /// Wall-clock deadline expired; the whole process group was killed
    #[serde(rename = "timeout")]
    Timeout,
    /// Build step failed; no process was ever created
    #[serde(rename = "compile_error")]
    CompileError,
}

impl std::fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TerminationReason::Normal => write!(f, "normal"),
            TerminationReason::NonZeroExit => write!(f, "non_zero_exit"),
            TerminationReason::Timeout => write!(f, "timeout"),
            TerminationReason::CompileError => write!(f, "compile_error"),
        }
    }
}

/// Source language of the supervised program
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum Language {
    #[default]
    #[serde(rename = "python")]
    Python,
    #[serde(rename = "c")]
    C,
}

impl Language {
    /// Infer language from a source file extension
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension.to_ascii_lowercase().as_str() {
            "py" => Some(Language::Python),
            "c" => Some(Language::C),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Python => "python",
            Language::C => "c",
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Language {
    type Err = FdscopeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "python" | "py" => Ok(Language::Python),
            "c" => Ok(Language::C),
            other => Err(FdscopeError::Config(format!(
                "unsupported language: {other}"
            ))),
        }
    }
}

/// Terminal artifact of one supervised run
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExecutionReport {
    /// Host pid of the supervised child (absent when compilation failed)
    #[serde(rename = "pid")]
    pub process_id: Option<u32>,
    /// Wall-clock duration of the run in seconds
    pub duration_seconds: f64,
    pub termination_reason: TerminationReason,
    /// Exit status (absent when killed by timeout, killed by a signal, or never compiled)
    pub exit_code: Option<i32>,
    /// Signal that terminated the child when the supervisor did not send it
    pub term_signal: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    /// Descriptor count time series
    #[serde(rename = "fd_samples")]
    pub samples: Vec<DescriptorSample>,
    /// Descriptor table as observed by the last successful sampling tick
    #[serde(rename = "fd_snapshot")]
    pub final_snapshot: Vec<DescriptorEntry>,
    #[serde(rename = "timeout_sec")]
    pub timeout_seconds: u64,
    #[serde(rename = "fd_limit")]
    pub descriptor_limit: u64,
    pub language: Language,
    /// Captured output mentions descriptor exhaustion (EMFILE and friends)
    pub fd_limit_violation_suspected: bool,
    pub sampling_started_at: Option<DateTime<Utc>>,
    pub snapshot_taken_at: Option<DateTime<Utc>>,
}

impl ExecutionReport {
    /// Report for a build that never produced an executable.
    pub fn compile_error(
        language: Language,
        stdout: String,
        stderr: String,
        timeout_seconds: u64,
        descriptor_limit: u64,
    ) -> Self {
        Self {
            process_id: None,
            duration_seconds: 0.0,
            termination_reason: TerminationReason::CompileError,
            exit_code: None,
            term_signal: None,
            stdout,
            stderr,
            samples: Vec::new(),
            final_snapshot: Vec::new(),
            timeout_seconds,
            descriptor_limit,
            language,
            fd_limit_violation_suspected: false,
            sampling_started_at: None,
            snapshot_taken_at: None,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.termination_reason == TerminationReason::Normal
    }
}

/// Custom error types for fdscope
#[derive(Error, Debug)]
pub enum FdscopeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Process error: {0}")]
    Process(String),

    #[error("Resource limit error: {0}")]
    ResourceLimit(String),

    #[error("Process table error: {0}")]
    ProcessTable(String),

    #[error("Process {0} not found or inaccessible")]
    ProcessUnavailable(u32),

    #[error("Compiler error: {0}")]
    Compile(String),

    #[error("Workspace error: {0}")]
    Workspace(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias for fdscope operations
pub type Result<T> = std::result::Result<T, FdscopeError>;

impl From<nix::errno::Errno> for FdscopeError {
    fn from(err: nix::errno::Errno) -> Self {
        FdscopeError::Process(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_termination_reason_display() {
        assert_eq!(format!("{}", TerminationReason::Normal), "normal");
        assert_eq!(format!("{}", TerminationReason::NonZeroExit), "non_zero_exit");
        assert_eq!(format!("{}", TerminationReason::Timeout), "timeout");
        assert_eq!(format!("{}", TerminationReason::CompileError), "compile_error");
    }

    #[test]
    fn test_language_from_extension() {
        assert_eq!(Language::from_extension("py"), Some(Language::Python));
        assert_eq!(Language::from_extension("C"), Some(Language::C));
        assert_eq!(Language::from_extension("java"), None);
        assert!("rust".parse::<Language>().is_err());
    }

    #[test]
    fn test_compile_error_report_has_no_runtime_telemetry() {
        let report = ExecutionReport::compile_error(
            Language::C,
            String::new(),
            "main.c:1: error".to_string(),
            30,
            256,
        );
        assert_eq!(report.termination_reason, TerminationReason::CompileError);
        assert!(report.process_id.is_none());
        assert!(report.exit_code.is_none());
        assert!(report.samples.is_empty());
        assert!(report.final_snapshot.is_empty());
        assert_eq!(report.duration_seconds, 0.0);
        assert!(!report.succeeded());
    }

    #[test]
    fn test_report_serializes_wire_names() {
        let report = ExecutionReport::compile_error(Language::C, String::new(), String::new(), 5, 64);
        let value = serde_json::to_value(&report).expect("serialize report");
        assert_eq!(value["termination_reason"], "compile_error");
        assert_eq!(value["language"], "c");
        assert_eq!(value["fd_limit"], 64);
        assert_eq!(value["timeout_sec"], 5);
        assert!(value["pid"].is_null());
    }
}
