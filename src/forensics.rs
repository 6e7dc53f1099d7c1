/// Forensic documents built from runs and live processes
///
/// This is the boundary handed to presentation and summarization consumers;
/// everything in it is plain serde data.
use crate::analysis::report::{analyze, AnalysisResult};
use crate::config::types::{
    DescriptorSample, ExecutionReport, FdscopeError, Language, Result, TerminationReason,
};
use crate::kernel::procfs::{ProcRead, ProcessTable};
use chrono::{DateTime, Utc};
use log::warn;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Text used whenever no summary can be produced
pub const SUMMARY_UNAVAILABLE: &str =
    "AI summarization unavailable. Configure a summarizer to enable it.";

/// Execution half of a forensic document, without the time series
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExecutionSummary {
    pub pid: Option<u32>,
    pub duration_seconds: f64,
    pub termination_reason: TerminationReason,
    pub exit_code: Option<i32>,
    pub term_signal: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub timeout_sec: u64,
    pub fd_limit: u64,
    pub language: Language,
    pub fd_limit_violation_suspected: bool,
    pub sampling_started_at: Option<DateTime<Utc>>,
    pub snapshot_taken_at: Option<DateTime<Utc>>,
}

/// Consumer-facing description of one supervised run
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ForensicReport {
    pub execution: ExecutionSummary,
    pub fd_growth: Vec<DescriptorSample>,
    /// Present only when the run left a non-empty descriptor snapshot
    pub fd_analysis: Option<AnalysisResult>,
    /// SHA-256 of the submitted source, hex encoded
    pub source_sha256: Option<String>,
}

/// Compose a run report with the analysis of its final snapshot.
///
/// The run's descriptor limit doubles as the soft limit for usage scoring.
pub fn build_forensic_report(report: ExecutionReport, source: Option<&[u8]>) -> ForensicReport {
    let fd_analysis = if report.final_snapshot.is_empty() {
        None
    } else {
        Some(analyze(&report.final_snapshot, Some(report.descriptor_limit)))
    };

    ForensicReport {
        execution: ExecutionSummary {
            pid: report.process_id,
            duration_seconds: report.duration_seconds,
            termination_reason: report.termination_reason,
            exit_code: report.exit_code,
            term_signal: report.term_signal,
            stdout: report.stdout,
            stderr: report.stderr,
            timeout_sec: report.timeout_seconds,
            fd_limit: report.descriptor_limit,
            language: report.language,
            fd_limit_violation_suspected: report.fd_limit_violation_suspected,
            sampling_started_at: report.sampling_started_at,
            snapshot_taken_at: report.snapshot_taken_at,
        },
        fd_growth: report.samples,
        fd_analysis,
        source_sha256: source.map(fingerprint),
    }
}

/// Hex SHA-256 of a source file's bytes
pub fn fingerprint(content: &[u8]) -> String {
    format!("{:x}", Sha256::digest(content))
}

/// Analyze a live process with its own soft descriptor limit
pub fn inspect_process(table: &ProcessTable, pid: u32) -> Result<AnalysisResult> {
    let fds = match table.descriptors(pid)? {
        ProcRead::Found(fds) => fds,
        ProcRead::NotFound | ProcRead::PermissionDenied => {
            return Err(FdscopeError::ProcessUnavailable(pid))
        }
    };

    let soft_limit = match table.fd_limits(pid)? {
        ProcRead::Found(limits) => limits.soft,
        ProcRead::NotFound | ProcRead::PermissionDenied => None,
    };

    Ok(analyze(&fds.entries, soft_limit))
}

/// Typed failure of a natural-language summarizer
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SummaryError {
    #[error("summarizer credentials are missing or invalid")]
    KeyMissing,

    #[error("summarizer quota exceeded")]
    QuotaExceeded,

    #[error("summarizer response was blocked")]
    Blocked,

    #[error("summarizer network error: {0}")]
    Network(String),

    #[error("summarizer failed: {0}")]
    Unknown(String),
}

/// Optional collaborator that turns a forensic document into prose
pub trait Summarizer: Send + Sync {
    fn summarize(&self, report: &ForensicReport) -> std::result::Result<String, SummaryError>;
}

/// Summary text, or [`SUMMARY_UNAVAILABLE`] when there is no usable summarizer
pub fn summarize_or_fallback(summarizer: Option<&dyn Summarizer>, report: &ForensicReport) -> String {
    let Some(summarizer) = summarizer else {
        return SUMMARY_UNAVAILABLE.to_string();
    };

    match summarizer.summarize(report) {
        Ok(text) if !text.trim().is_empty() => text,
        Ok(_) => SUMMARY_UNAVAILABLE.to_string(),
        Err(e) => {
            warn!("summarization failed: {}", e);
            SUMMARY_UNAVAILABLE.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::DescriptorEntry;

    fn finished_run(snapshot: Vec<DescriptorEntry>) -> ExecutionReport {
        let mut report =
            ExecutionReport::compile_error(Language::Python, "out".into(), String::new(), 30, 4);
        report.termination_reason = TerminationReason::Normal;
        report.process_id = Some(1234);
        report.exit_code = Some(0);
        report.samples = vec![DescriptorSample {
            elapsed_seconds: 0.0,
            count: snapshot.len(),
        }];
        report.final_snapshot = snapshot;
        report
    }

    #[test]
    fn test_analysis_uses_run_limit_as_soft_limit() {
        let run = finished_run(vec![
            DescriptorEntry::new(0, "/dev/null"),
            DescriptorEntry::new(1, "pipe:[1]"),
            DescriptorEntry::new(2, "pipe:[2]"),
            DescriptorEntry::new(3, "socket:[9]"),
        ]);
        let forensic = build_forensic_report(run, Some(b"print(1)\n"));

        let analysis = forensic.fd_analysis.expect("snapshot was non-empty");
        assert_eq!(analysis.usage_percent, Some(100.0));
        assert_eq!(forensic.execution.pid, Some(1234));
        assert_eq!(forensic.fd_growth.len(), 1);
        assert_eq!(
            forensic.source_sha256.as_deref().map(str::len),
            Some(64)
        );
    }

    #[test]
    fn test_empty_snapshot_has_no_analysis() {
        let forensic = build_forensic_report(finished_run(Vec::new()), None);
        assert!(forensic.fd_analysis.is_none());
        assert!(forensic.source_sha256.is_none());
    }

    #[test]
    fn test_fingerprint_known_value() {
        assert_eq!(
            fingerprint(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    struct Fixed(std::result::Result<String, SummaryError>);

    impl Summarizer for Fixed {
        fn summarize(&self, _: &ForensicReport) -> std::result::Result<String, SummaryError> {
            self.0.clone()
        }
    }

    #[test]
    fn test_summarizer_fallbacks() {
        let forensic = build_forensic_report(finished_run(Vec::new()), None);

        assert_eq!(summarize_or_fallback(None, &forensic), SUMMARY_UNAVAILABLE);

        let failing = Fixed(Err(SummaryError::QuotaExceeded));
        assert_eq!(
            summarize_or_fallback(Some(&failing), &forensic),
            SUMMARY_UNAVAILABLE
        );

        let blank = Fixed(Ok("   ".to_string()));
        assert_eq!(summarize_or_fallback(Some(&blank), &forensic), SUMMARY_UNAVAILABLE);

        let working = Fixed(Ok("Low risk.".to_string()));
        assert_eq!(summarize_or_fallback(Some(&working), &forensic), "Low risk.");
    }

    #[test]
    fn test_inspect_missing_process() {
        let dir = tempfile::tempdir().expect("tempdir");
        let table = ProcessTable::with_root(dir.path());
        assert!(matches!(
            inspect_process(&table, 31337),
            Err(FdscopeError::ProcessUnavailable(31337))
        ));
    }

    #[test]
    fn test_inspect_self() {
        let table = ProcessTable::host();
        let analysis = inspect_process(&table, std::process::id()).expect("inspect self");
        assert!(analysis.total >= 3);
        assert!(analysis.usage_percent.is_some());
    }
}
