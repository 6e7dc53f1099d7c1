use crate::config::settings::FdscopeConfig;
use crate::config::types::{ExecutionReport, Language, Result};
use crate::exec::supervisor::{ExecutionRequest, Supervisor};
use crate::judge::compiler::CompileOutcome;
use crate::observability::audit::{events, RunCorrelation};
use log::info;
use std::path::Path;

/// What an adapter produced from a source file
#[derive(Debug, Clone)]
pub enum Prepared {
    /// Ready to hand to the supervisor
    Runnable(ExecutionRequest),
    /// The build step rejected the source; nothing will run
    CompileFailed(CompileOutcome),
}

/// Language adapter contract: turn a source file into something runnable.
pub trait LanguageAdapter: Send + Sync {
    fn language(&self) -> Language;

    /// Build (if needed) and describe how to run `source`.
    ///
    /// `source` is an absolute path inside a run-scoped directory; build
    /// artifacts are written next to it.
    fn prepare(&self, source: &Path, config: &FdscopeConfig) -> Result<Prepared>;
}

/// Prepare `source` with `adapter` and supervise it.
///
/// A failed build never reaches the supervisor; it becomes a `CompileError`
/// report carrying the effective constraints and the compiler diagnostics.
pub fn run_source(
    supervisor: &Supervisor,
    adapter: &dyn LanguageAdapter,
    source: &Path,
    timeout_seconds: Option<u64>,
    descriptor_limit: Option<u64>,
) -> Result<ExecutionReport> {
    let config = supervisor.config();

    match adapter.prepare(source, config)? {
        Prepared::Runnable(request) => {
            let mut request = request.for_language(adapter.language());
            request.timeout_seconds = timeout_seconds;
            request.descriptor_limit = descriptor_limit;
            supervisor.run(&request)
        }
        Prepared::CompileFailed(outcome) => {
            info!("compilation of {} failed", source.display());
            events::compile_failure(
                &RunCorrelation::new(),
                source.display().to_string(),
                first_line(&outcome.stderr).to_string(),
            );
            Ok(ExecutionReport::compile_error(
                adapter.language(),
                outcome.stdout,
                outcome.stderr,
                config.effective_timeout(timeout_seconds),
                config.effective_fd_limit(descriptor_limit),
            ))
        }
    }
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or_default()
}
