/// Run event logging for fdscope
/// Provides structured, correlatable records of every supervised run
///
/// Events are rendered as one JSON object per line on the `fdscope::audit`
/// log target, so `RUST_LOG=fdscope::audit=info` isolates the trail.
use chrono::{DateTime, Utc};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Log target for audit records
pub const AUDIT_TARGET: &str = "fdscope::audit";

/// Audit event severity levels
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum AuditSeverity {
    High,
    Medium,
    Low,
}

/// Types of run events we track
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RunEventType {
    ExecutionStart,
    ExecutionEnd,
    ForcedKill,
    DescriptorLimitViolation,
    CompileFailure,
    SamplerOverrun,
}

impl RunEventType {
    /// Get the default severity for this event type
    pub fn default_severity(&self) -> AuditSeverity {
        match self {
            RunEventType::ExecutionStart => AuditSeverity::Low,
            RunEventType::ExecutionEnd => AuditSeverity::Low,
            RunEventType::CompileFailure => AuditSeverity::Low,
            RunEventType::SamplerOverrun => AuditSeverity::Medium,
            RunEventType::DescriptorLimitViolation => AuditSeverity::Medium,
            RunEventType::ForcedKill => AuditSeverity::High,
        }
    }
}

/// Correlation identifiers for one supervised run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunCorrelation {
    /// Unique run identifier
    pub run_id: Uuid,
    /// Host pid of the supervised child, once spawned
    pub root_pid: Option<u32>,
}

impl RunCorrelation {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            root_pid: None,
        }
    }

    /// Set root PID after process spawn
    pub fn with_root_pid(mut self, pid: u32) -> Self {
        self.root_pid = Some(pid);
        self
    }
}

impl Default for RunCorrelation {
    fn default() -> Self {
        Self::new()
    }
}

/// Individual run event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunEvent {
    pub event_type: RunEventType,
    pub severity: AuditSeverity,
    pub timestamp: DateTime<Utc>,
    pub details: String,
    pub correlation: RunCorrelation,
    pub command: Option<String>,
    pub file_path: Option<String>,
}

impl RunEvent {
    /// Create a new event with default severity
    pub fn new(event_type: RunEventType, correlation: &RunCorrelation, details: String) -> Self {
        Self {
            event_type,
            severity: event_type.default_severity(),
            timestamp: Utc::now(),
            details,
            correlation: correlation.clone(),
            command: None,
            file_path: None,
        }
    }

    pub fn with_command(mut self, command: String) -> Self {
        self.command = Some(command);
        self
    }

    pub fn with_file_path(mut self, file_path: String) -> Self {
        self.file_path = Some(file_path);
        self
    }

    /// Render the event as a single JSON line
    pub fn to_json_line(&self) -> String {
        match serde_json::to_string(self) {
            Ok(line) => line,
            Err(e) => {
                error!("Failed to serialize audit event: {}", e);
                format!(
                    "{{\"event_type\":\"{:?}\",\"details\":\"unserializable\"}}",
                    self.event_type
                )
            }
        }
    }
}

/// Emit a run event on the audit target
pub fn record(event: RunEvent) {
    let line = event.to_json_line();
    match event.severity {
        AuditSeverity::High | AuditSeverity::Medium => warn!(target: AUDIT_TARGET, "{}", line),
        AuditSeverity::Low => info!(target: AUDIT_TARGET, "{}", line),
    }
}

/// Convenience functions for common run events
pub mod events {
    use super::*;

    pub fn execution_start(correlation: &RunCorrelation, command: String, details: String) {
        record(RunEvent::new(RunEventType::ExecutionStart, correlation, details).with_command(command));
    }

    pub fn execution_end(correlation: &RunCorrelation, details: String) {
        record(RunEvent::new(RunEventType::ExecutionEnd, correlation, details));
    }

    pub fn forced_kill(correlation: &RunCorrelation, details: String) {
        record(RunEvent::new(RunEventType::ForcedKill, correlation, details));
    }

    pub fn descriptor_limit_violation(correlation: &RunCorrelation, limit: u64) {
        record(RunEvent::new(
            RunEventType::DescriptorLimitViolation,
            correlation,
            format!("output suggests the descriptor limit of {limit} was hit"),
        ));
    }

    pub fn compile_failure(correlation: &RunCorrelation, source: String, details: String) {
        record(RunEvent::new(RunEventType::CompileFailure, correlation, details).with_file_path(source));
    }

    pub fn sampler_overrun(correlation: &RunCorrelation, waited_ms: u64) {
        record(RunEvent::new(
            RunEventType::SamplerOverrun,
            correlation,
            format!("sampler did not acknowledge stop within {waited_ms}ms"),
        ));
    }
}
