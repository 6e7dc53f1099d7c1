/// Build step for compiled languages
///
/// The compiler is launched with argument-vector semantics in its own process
/// group; an overrun kills the group so no `cc1`/`as`/`ld` helper outlives it.
use crate::config::types::{FdscopeError, Result};
use crate::kernel::procfs::ProcessTable;
use crate::kernel::signal::terminate_group;
use crate::utils::output::{OutputCapture, OutputLimits};
use log::{debug, warn};
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

/// Result of one compiler invocation
#[derive(Debug, Clone, PartialEq)]
pub struct CompileOutcome {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    /// Present only on success
    pub executable: Option<PathBuf>,
}

impl CompileOutcome {
    fn failed(stdout: String, stderr: String) -> Self {
        Self {
            success: false,
            stdout,
            stderr,
            executable: None,
        }
    }
}

/// Compile `source` into `output` with `compiler`, bounded by `budget`.
///
/// Only a compiler that cannot be launched at all is an error; diagnostics,
/// non-zero exits and budget overruns are `success == false`.
pub fn compile(
    compiler: &str,
    source: &Path,
    output: &Path,
    budget: Duration,
    limits: &OutputLimits,
) -> Result<CompileOutcome> {
    let mut child = Command::new(compiler)
        .arg(source)
        .arg("-o")
        .arg(output)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .process_group(0)
        .spawn()
        .map_err(|e| FdscopeError::Compile(format!("Failed to launch {}: {}", compiler, e)))?;

    let pid = child.id();
    debug!("compiling {} with {} (pid {})", source.display(), compiler, pid);
    let capture = OutputCapture::start(child.stdout.take(), child.stderr.take(), limits.clone());

    let started = Instant::now();
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break Some(status),
            Ok(None) if started.elapsed() >= budget => break None,
            Ok(None) => thread::sleep(Duration::from_millis(10)),
            Err(e) => {
                let _ = terminate_group(&ProcessTable::host(), pid, Duration::from_secs(1));
                let _ = child.wait();
                return Err(FdscopeError::Compile(format!(
                    "Failed to wait for compiler: {}",
                    e
                )));
            }
        }
    };

    let Some(status) = status else {
        warn!(
            "compiler {} exceeded {:?} budget; killing it",
            compiler, budget
        );
        let _ = terminate_group(&ProcessTable::host(), pid, Duration::from_secs(1));
        let _ = child.wait();
        let captured = capture.finish();
        let mut stderr = captured.stderr;
        if !stderr.is_empty() && !stderr.ends_with('\n') {
            stderr.push('\n');
        }
        stderr.push_str(&format!(
            "compilation exceeded the {:.1}s time budget\n",
            budget.as_secs_f64()
        ));
        return Ok(CompileOutcome::failed(captured.stdout, stderr));
    };

    let captured = capture.finish();
    if status.success() && output.is_file() {
        Ok(CompileOutcome {
            success: true,
            stdout: captured.stdout,
            stderr: captured.stderr,
            executable: Some(output.to_path_buf()),
        })
    } else {
        Ok(CompileOutcome::failed(captured.stdout, captured.stderr))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_compiler_is_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let result = compile(
            "/nonexistent/fdscope-cc",
            &dir.path().join("main.c"),
            &dir.path().join("program"),
            Duration::from_secs(5),
            &OutputLimits::default(),
        );
        assert!(matches!(result, Err(FdscopeError::Compile(_))));
    }

    #[test]
    fn test_failing_compiler_is_not_success() {
        // `false` ignores its arguments and exits 1, like a compiler rejecting the source
        let dir = tempfile::tempdir().expect("tempdir");
        let outcome = compile(
            "false",
            &dir.path().join("main.c"),
            &dir.path().join("program"),
            Duration::from_secs(5),
            &OutputLimits::default(),
        )
        .expect("false can be launched");
        assert!(!outcome.success);
        assert!(outcome.executable.is_none());
    }

    #[test]
    fn test_budget_overrun_is_failure() {
        // `sh main.c -o program` runs the "source" as a script that never finishes
        let dir = tempfile::tempdir().expect("tempdir");
        let source = dir.path().join("main.c");
        std::fs::write(&source, "sleep 30\n").expect("write source");

        let started = Instant::now();
        let outcome = compile(
            "sh",
            &source,
            &dir.path().join("program"),
            Duration::from_millis(200),
            &OutputLimits::default(),
        )
        .expect("sh launches");

        assert!(!outcome.success);
        assert!(outcome.stderr.contains("time budget"));
        assert!(started.elapsed() < Duration::from_secs(10));
    }
}
