//! Integration tests for supervised execution
//!
//! These drive real `/bin/sh` children through the public API and check what
//! the kernel reports afterwards.

use fdscope::config::settings::FdscopeConfig;
use fdscope::config::types::{FdscopeError, TerminationReason};
use fdscope::exec::{ExecutionRequest, Supervisor};
use fdscope::forensics::build_forensic_report;
use fdscope::judge::languages::c::CAdapter;
use fdscope::judge::run_source;
use fdscope::kernel::procfs::{parse_fd_limits, ProcessTable};
use fdscope::utils::output::OutputLimits;
use std::time::{Duration, Instant};

fn supervisor() -> Supervisor {
    Supervisor::new(FdscopeConfig {
        sample_interval_ms: 20,
        ..FdscopeConfig::default()
    })
}

fn shell(script: &str) -> ExecutionRequest {
    ExecutionRequest::new("/bin/sh").with_args(["-c", script])
}

fn assert_group_gone(pid: u32) {
    let survivors = ProcessTable::host()
        .group_members(pid)
        .expect("process table readable");
    assert!(survivors.is_empty(), "survivors: {survivors:?}");
}

#[test]
fn test_timeout_kills_whole_group() {
    let request = shell("sleep 30 & sleep 30").with_timeout(1);

    let started = Instant::now();
    let report = supervisor().run(&request).expect("run sleeper");

    assert_eq!(report.termination_reason, TerminationReason::Timeout);
    assert!(report.exit_code.is_none());
    assert!(
        started.elapsed() < Duration::from_secs(10),
        "supervisor must not wait for the sleepers"
    );

    // The child leads its own group, so pid == pgid
    assert_group_gone(report.process_id.expect("pid recorded"));
    assert!(!report.samples.is_empty());
}

#[test]
fn test_background_member_is_awaited_after_leader_exits() {
    let report = supervisor()
        .run(&shell("echo hi; sleep 0.3 &").with_timeout(5))
        .expect("run");

    assert_eq!(report.termination_reason, TerminationReason::Normal);
    assert_eq!(report.exit_code, Some(0));
    assert_eq!(report.stdout, "hi\n");
    assert!(report.duration_seconds >= 0.3);
    assert_group_gone(report.process_id.expect("pid recorded"));
}

#[test]
fn test_background_member_past_deadline_is_killed() {
    let started = Instant::now();
    let report = supervisor()
        .run(&shell("echo hi; sleep 30 &").with_timeout(1))
        .expect("run");

    assert_eq!(report.termination_reason, TerminationReason::Timeout);
    assert!(report.exit_code.is_none());
    assert_eq!(report.stdout, "hi\n");
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_group_gone(report.process_id.expect("pid recorded"));
}

#[test]
fn test_output_kept_when_escaped_process_holds_pipe() {
    // setsid moves the sleeper out of the group, so the group kill misses it
    // and stdout never reaches EOF
    let supervisor = Supervisor::new(FdscopeConfig {
        sample_interval_ms: 20,
        output: OutputLimits {
            collection_timeout_ms: 300,
            ..OutputLimits::default()
        },
        ..FdscopeConfig::default()
    });

    let started = Instant::now();
    let report = supervisor
        .run(&shell("echo before; setsid sleep 5 & sleep 30").with_timeout(1))
        .expect("run");

    assert_eq!(report.termination_reason, TerminationReason::Timeout);
    assert_eq!(report.stdout, "before\n");
    assert!(started.elapsed() < Duration::from_secs(4));
}

#[test]
fn test_descriptor_limit_is_applied_to_child() {
    let request = ExecutionRequest::new("grep")
        .with_args(["Max open files", "/proc/self/limits"])
        .with_fd_limit(8);
    let report = supervisor().run(&request).expect("run grep");

    assert_eq!(report.termination_reason, TerminationReason::Normal);
    assert_eq!(report.descriptor_limit, 8);
    let limits = parse_fd_limits(&report.stdout).expect("limits row in output");
    assert_eq!(limits.soft, Some(8));
    assert_eq!(limits.hard, Some(8));
}

#[test]
fn test_opening_past_the_limit_fails_inside_child() {
    // fds 0-4 fit under a limit of 5; fd 5 does not
    let script = "i=3; while [ $i -lt 12 ]; do eval \"exec $i</dev/null\" || exit 3; i=$((i+1)); done";
    let request = shell(script).with_fd_limit(5).with_timeout(5);

    let report = supervisor().run(&request).expect("supervisor completes");
    assert_eq!(report.termination_reason, TerminationReason::NonZeroExit);
    assert_ne!(report.exit_code, Some(0));
}

#[test]
fn test_exit_codes_map_to_reasons() {
    let ok = supervisor().run(&shell("echo hello")).expect("run echo");
    assert_eq!(ok.termination_reason, TerminationReason::Normal);
    assert_eq!(ok.exit_code, Some(0));
    assert_eq!(ok.stdout, "hello\n");
    assert_group_gone(ok.process_id.expect("pid recorded"));

    let failed = supervisor().run(&shell("echo oops >&2; exit 3")).expect("run exit 3");
    assert_eq!(failed.termination_reason, TerminationReason::NonZeroExit);
    assert_eq!(failed.exit_code, Some(3));
    assert_eq!(failed.stderr, "oops\n");
}

#[test]
fn test_self_inflicted_signal_is_not_timeout() {
    let report = supervisor().run(&shell("kill -9 $$")).expect("run self-kill");
    assert_eq!(report.termination_reason, TerminationReason::NonZeroExit);
    assert!(report.exit_code.is_none());
    assert_eq!(report.term_signal, Some(9));
}

#[test]
fn test_invalid_utf8_output_is_replaced() {
    let report = supervisor()
        .run(&shell("printf 'ok\\377done'"))
        .expect("run printf");
    assert_eq!(report.termination_reason, TerminationReason::Normal);
    assert_eq!(report.stdout, "ok\u{FFFD}done");
}

#[test]
fn test_snapshot_captures_opened_descriptor() {
    let report = supervisor()
        .run(&shell("exec 7</dev/null; sleep 0.5"))
        .expect("run holder");

    assert_eq!(report.termination_reason, TerminationReason::Normal);
    assert!(
        report
            .final_snapshot
            .iter()
            .any(|e| e.index == 7 && e.target == "/dev/null"),
        "snapshot: {:?}",
        report.final_snapshot
    );
    assert_eq!(report.samples[0].elapsed_seconds, 0.0);

    let forensic = build_forensic_report(report, None);
    let analysis = forensic.fd_analysis.expect("non-empty snapshot is analyzed");
    assert!(analysis.total >= 4);
    assert!(analysis.usage_percent.is_some());
}

#[test]
fn test_fd_exhaustion_output_is_flagged() {
    let report = supervisor()
        .run(&shell("echo 'OSError: [Errno 24] Too many open files' >&2; exit 1"))
        .expect("run");
    assert!(report.fd_limit_violation_suspected);
    assert_eq!(report.termination_reason, TerminationReason::NonZeroExit);
}

#[test]
fn test_invalid_c_source_is_compile_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let source = dir.path().join("main.c");
    std::fs::write(&source, "int main( { return 0 }\n").expect("write source");

    match run_source(&supervisor(), &CAdapter, &source, Some(0), Some(64)) {
        Ok(report) => {
            assert_eq!(report.termination_reason, TerminationReason::CompileError);
            assert!(report.process_id.is_none());
            assert!(report.exit_code.is_none());
            assert_eq!(report.duration_seconds, 0.0);
            assert!(report.samples.is_empty());
            assert_eq!(report.timeout_seconds, 30);
            assert_eq!(report.descriptor_limit, 64);
            assert!(!report.stderr.is_empty(), "diagnostics expected");
        }
        // No C compiler on this host
        Err(FdscopeError::Compile(_)) => {}
        Err(e) => panic!("unexpected error: {e}"),
    }
}

#[test]
fn test_process_listing_includes_self() {
    let processes = ProcessTable::host()
        .list_processes()
        .expect("list processes");
    let me = std::process::id();
    assert!(processes.iter().any(|p| p.pid == me));
    assert!(processes
        .windows(2)
        .all(|w| w[0].fd_count >= w[1].fd_count));
}

#[test]
fn test_parallel_runs_are_independent() {
    let handles: Vec<_> = (0..4)
        .map(|i| {
            std::thread::spawn(move || {
                supervisor()
                    .run(&shell(&format!("echo run-{i}; sleep 0.2")))
                    .expect("parallel run")
            })
        })
        .collect();

    for (i, handle) in handles.into_iter().enumerate() {
        let report = handle.join().expect("thread joins");
        assert_eq!(report.stdout, format!("run-{i}\n"));
        assert_eq!(report.termination_reason, TerminationReason::Normal);
    }
}
