use crate::config::settings::FdscopeConfig;
use crate::config::types::{FdscopeError, Language, Result};
use crate::exec::supervisor::ExecutionRequest;
use crate::judge::adapter::{LanguageAdapter, Prepared};
use crate::judge::compiler::compile;
use std::path::Path;

/// Name of the binary produced next to the source
pub const EXECUTABLE_NAME: &str = "program";

#[derive(Debug, Clone, Default)]
pub struct CAdapter;

impl LanguageAdapter for CAdapter {
    fn language(&self) -> Language {
        Language::C
    }

    fn prepare(&self, source: &Path, config: &FdscopeConfig) -> Result<Prepared> {
        let dir = source.parent().ok_or_else(|| {
            FdscopeError::Config(format!("{} has no parent directory", source.display()))
        })?;
        let output = dir.join(EXECUTABLE_NAME);

        let outcome = compile(
            &config.c_compiler,
            source,
            &output,
            config.compile_timeout(),
            &config.output,
        )?;

        match outcome.executable {
            Some(executable) if outcome.success => Ok(Prepared::Runnable(
                ExecutionRequest::new(executable).in_dir(dir),
            )),
            _ => Ok(Prepared::CompileFailed(outcome)),
        }
    }
}
