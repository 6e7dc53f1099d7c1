/// Execution supervisor
///
/// One call to [`Supervisor::run`] owns one child, one sampler thread and one
/// pair of output readers. Nothing is shared between runs, so independent
/// runs may proceed in parallel from different threads.
use crate::config::settings::FdscopeConfig;
use crate::config::types::{
    ExecutionReport, FdscopeError, Language, Result, TerminationReason,
};
use crate::exec::sampler::{normalize_samples, round_millis, start_sampling, SamplerStop};
use crate::kernel::procfs::ProcessTable;
use crate::kernel::rlimit::{check_fd_limit, confine_descriptors};
use crate::kernel::signal::terminate_group;
use crate::observability::audit::{events, RunCorrelation};
use crate::utils::output::{CapturedOutput, OutputCapture};
use chrono::Utc;
use log::{debug, info, warn};
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

/// Output fragments that point at descriptor exhaustion inside the child
pub const FD_EXHAUSTION_INDICATORS: [&str; 3] = ["too many open files", "emfile", "errno 24"];

const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// What to run and under which constraints
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    pub executable: PathBuf,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
    /// `None` or 0 uses the configured default
    pub timeout_seconds: Option<u64>,
    /// `None` or 0 uses the configured default
    pub descriptor_limit: Option<u64>,
    pub language: Language,
}

impl ExecutionRequest {
    pub fn new<P: Into<PathBuf>>(executable: P) -> Self {
        Self {
            executable: executable.into(),
            args: Vec::new(),
            working_dir: None,
            timeout_seconds: None,
            descriptor_limit: None,
            language: Language::default(),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn in_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn with_timeout(mut self, seconds: u64) -> Self {
        self.timeout_seconds = Some(seconds);
        self
    }

    pub fn with_fd_limit(mut self, limit: u64) -> Self {
        self.descriptor_limit = Some(limit);
        self
    }

    pub fn for_language(mut self, language: Language) -> Self {
        self.language = language;
        self
    }

    fn command_line(&self) -> String {
        std::iter::once(self.executable.display().to_string())
            .chain(self.args.iter().cloned())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// How the wait phase ended
enum WaitOutcome {
    Exited(ExitStatus),
    TimedOut,
}

/// Runs programs under a descriptor ceiling and a wall-clock deadline while
/// sampling their descriptor tables
#[derive(Debug, Clone)]
pub struct Supervisor {
    config: FdscopeConfig,
    table: ProcessTable,
}

impl Supervisor {
    pub fn new(config: FdscopeConfig) -> Self {
        Self {
            config,
            table: ProcessTable::host(),
        }
    }

    pub fn config(&self) -> &FdscopeConfig {
        &self.config
    }

    /// Run `request` to completion or deadline and describe what happened.
    ///
    /// Fails only when the run cannot be meaningful: the descriptor ceiling
    /// cannot be installed, the child cannot be spawned, or the process table
    /// is unreadable. Timeouts and non-zero exits are ordinary reports.
    pub fn run(&self, request: &ExecutionRequest) -> Result<ExecutionReport> {
        let timeout_seconds = self.config.effective_timeout(request.timeout_seconds);
        let descriptor_limit = self.config.effective_fd_limit(request.descriptor_limit);

        check_fd_limit(descriptor_limit)?;
        self.table.ensure_readable()?;

        let mut cmd = Command::new(&request.executable);
        cmd.args(&request.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0);
        if let Some(dir) = &request.working_dir {
            cmd.current_dir(dir);
        }
        confine_descriptors(&mut cmd, descriptor_limit);

        let start_time = Instant::now();
        let mut child = cmd.spawn().map_err(|e| {
            FdscopeError::Process(format!(
                "Failed to start {}: {}",
                request.executable.display(),
                e
            ))
        })?;
        let pid = child.id();
        let correlation = RunCorrelation::new().with_root_pid(pid);

        info!(
            "started pid {} ({}) timeout={}s fd_limit={}",
            pid,
            request.executable.display(),
            timeout_seconds,
            descriptor_limit
        );
        events::execution_start(
            &correlation,
            request.command_line(),
            format!("timeout={timeout_seconds}s fd_limit={descriptor_limit}"),
        );

        let capture = OutputCapture::start(
            child.stdout.take(),
            child.stderr.take(),
            self.config.output.clone(),
        );

        let sampling_started_at = Utc::now();
        let sampler = match start_sampling(self.table.clone(), pid, self.config.sample_interval()) {
            Ok(sampler) => sampler,
            Err(e) => {
                self.force_stop(&mut child, pid, &correlation);
                let _ = capture.finish();
                return Err(e);
            }
        };

        let deadline = Duration::from_secs(timeout_seconds);
        let outcome = match self.wait_with_deadline(&mut child, deadline) {
            Ok(outcome) => outcome,
            Err(e) => {
                self.force_stop(&mut child, pid, &correlation);
                let _ = sampler.stop(self.config.sampler_join_timeout());
                let _ = capture.finish();
                return Err(e);
            }
        };

        let (termination_reason, exit_code, term_signal) = match outcome {
            WaitOutcome::Exited(status) => classify_exit(status),
            WaitOutcome::TimedOut => {
                warn!(
                    "pid {} exceeded {}s; killing its process group",
                    pid, timeout_seconds
                );
                self.force_stop(&mut child, pid, &correlation);
                (TerminationReason::Timeout, None, None)
            }
        };
        let duration_seconds = round_millis(start_time.elapsed().as_secs_f64());

        let SamplerStop { output: observed, joined } =
            sampler.stop(self.config.sampler_join_timeout());
        if !joined {
            events::sampler_overrun(&correlation, self.config.sampler_join_timeout_ms);
        }
        let snapshot_taken_at = Utc::now();
        debug!(
            "pid {}: {} samples, {} empty ticks",
            pid,
            observed.samples.len(),
            observed.gaps
        );

        let CapturedOutput {
            stdout,
            stderr,
            truncated,
        } = capture.finish();
        if truncated {
            warn!("output of pid {} was truncated", pid);
        }

        let fd_limit_violation_suspected = output_suggests_fd_exhaustion(&stdout, &stderr);
        if fd_limit_violation_suspected {
            warn!(
                "pid {} output suggests the descriptor limit of {} was hit",
                pid, descriptor_limit
            );
            events::descriptor_limit_violation(&correlation, descriptor_limit);
        }

        info!(
            "pid {} finished: {} in {:.3}s",
            pid, termination_reason, duration_seconds
        );
        events::execution_end(
            &correlation,
            format!(
                "reason={} exit_code={:?} duration={:.3}s",
                termination_reason, exit_code, duration_seconds
            ),
        );

        Ok(ExecutionReport {
            process_id: Some(pid),
            duration_seconds,
            termination_reason,
            exit_code,
            term_signal,
            stdout,
            stderr,
            samples: normalize_samples(&observed.samples),
            final_snapshot: observed.last_snapshot,
            timeout_seconds,
            descriptor_limit,
            language: request.language,
            fd_limit_violation_suspected,
            sampling_started_at: Some(sampling_started_at),
            snapshot_taken_at: Some(snapshot_taken_at),
        })
    }

    /// Wait until the leader has exited and no member of its group remains.
    ///
    /// A background member that outlives the leader keeps the run going; if it
    /// is still there at the deadline the run times out like any other.
    fn wait_with_deadline(&self, child: &mut Child, deadline: Duration) -> Result<WaitOutcome> {
        let pgid = child.id();
        let started = Instant::now();
        let mut leader_status = None;
        loop {
            if leader_status.is_none() {
                leader_status = child.try_wait().map_err(|e| {
                    FdscopeError::Process(format!("Failed to wait for pid {}: {}", pgid, e))
                })?;
                if leader_status.is_some() {
                    debug!("pid {} exited; checking its process group", pgid);
                }
            }
            if let Some(status) = leader_status {
                if !self.group_outlives_leader(pgid) {
                    return Ok(WaitOutcome::Exited(status));
                }
            }
            if started.elapsed() >= deadline {
                return Ok(WaitOutcome::TimedOut);
            }
            thread::sleep(WAIT_POLL_INTERVAL);
        }
    }

    fn group_outlives_leader(&self, pgid: u32) -> bool {
        match self.table.group_members(pgid) {
            Ok(members) => !members.is_empty(),
            Err(e) => {
                warn!("cannot list members of process group {}: {}", pgid, e);
                false
            }
        }
    }

    /// Kill the whole group, then reap the leader
    fn force_stop(&self, child: &mut Child, pid: u32, correlation: &RunCorrelation) {
        let report = terminate_group(&self.table, pid, self.config.group_exit_timeout());
        for note in &report.notes {
            warn!("pid {}: {}", pid, note);
        }
        if let Err(e) = child.wait() {
            warn!("Failed to reap pid {}: {}", pid, e);
        }
        events::forced_kill(
            correlation,
            format!(
                "group_kill_sent={} leader_fallback={} group_gone={} waited_ms={}",
                report.group_kill_sent, report.leader_fallback, report.group_gone, report.waited_ms
            ),
        );
    }
}

/// Map a natural exit onto the termination state machine
fn classify_exit(status: ExitStatus) -> (TerminationReason, Option<i32>, Option<i32>) {
    match status.code() {
        Some(0) => (TerminationReason::Normal, Some(0), None),
        Some(code) => (TerminationReason::NonZeroExit, Some(code), None),
        None => (TerminationReason::NonZeroExit, None, status.signal()),
    }
}

/// True when captured output mentions descriptor exhaustion
pub fn output_suggests_fd_exhaustion(stdout: &str, stderr: &str) -> bool {
    let combined = format!("{stdout}\n{stderr}").to_lowercase();
    FD_EXHAUSTION_INDICATORS
        .iter()
        .any(|needle| combined.contains(needle))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quick_config() -> FdscopeConfig {
        FdscopeConfig {
            sample_interval_ms: 20,
            ..FdscopeConfig::default()
        }
    }

    #[test]
    fn test_exhaustion_indicators() {
        assert!(output_suggests_fd_exhaustion(
            "",
            "OSError: [Errno 24] Too many open files"
        ));
        assert!(output_suggests_fd_exhaustion("open: EMFILE", ""));
        assert!(!output_suggests_fd_exhaustion("all good", "nothing to see"));
    }

    #[test]
    fn test_classify_exit_codes() {
        let ok = ExitStatus::from_raw(0);
        assert_eq!(classify_exit(ok), (TerminationReason::Normal, Some(0), None));

        // wait status encodes the exit code in the high byte
        let three = ExitStatus::from_raw(3 << 8);
        assert_eq!(
            classify_exit(three),
            (TerminationReason::NonZeroExit, Some(3), None)
        );

        let killed = ExitStatus::from_raw(libc::SIGTERM);
        assert_eq!(
            classify_exit(killed),
            (TerminationReason::NonZeroExit, None, Some(libc::SIGTERM))
        );
    }

    #[test]
    fn test_zero_request_uses_defaults() {
        let supervisor = Supervisor::new(quick_config());
        let request = ExecutionRequest::new("/bin/true")
            .with_timeout(0)
            .with_fd_limit(0);
        let report = supervisor.run(&request).expect("run /bin/true");
        assert_eq!(report.timeout_seconds, 30);
        assert_eq!(report.descriptor_limit, 256);
        assert_eq!(report.termination_reason, TerminationReason::Normal);
        assert_eq!(report.exit_code, Some(0));
    }

    #[test]
    fn test_missing_executable_is_hard_failure() {
        let supervisor = Supervisor::new(quick_config());
        let request = ExecutionRequest::new("/nonexistent/fdscope-test-binary");
        assert!(matches!(
            supervisor.run(&request),
            Err(FdscopeError::Process(_))
        ));
    }

    #[test]
    fn test_samples_start_at_zero() {
        let supervisor = Supervisor::new(quick_config());
        let request = ExecutionRequest::new("/bin/sh")
            .with_args(["-c", "sleep 0.3"])
            .with_timeout(5);
        let report = supervisor.run(&request).expect("run sleeper");

        assert_eq!(report.termination_reason, TerminationReason::Normal);
        assert!(!report.samples.is_empty());
        assert_eq!(report.samples[0].elapsed_seconds, 0.0);
        assert!(report
            .samples
            .windows(2)
            .all(|w| w[0].elapsed_seconds <= w[1].elapsed_seconds));
        assert!(report.sampling_started_at.is_some());
        assert!(report.snapshot_taken_at >= report.sampling_started_at);
    }
}
