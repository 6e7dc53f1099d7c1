use crate::config::settings::FdscopeConfig;
use crate::config::types::{FdscopeError, Language, Result};
use crate::exec::supervisor::ExecutionRequest;
use crate::judge::adapter::{LanguageAdapter, Prepared};
use std::path::Path;

#[derive(Debug, Clone, Default)]
pub struct PythonAdapter;

impl LanguageAdapter for PythonAdapter {
    fn language(&self) -> Language {
        Language::Python
    }

    fn prepare(&self, source: &Path, config: &FdscopeConfig) -> Result<Prepared> {
        let dir = source.parent().ok_or_else(|| {
            FdscopeError::Config(format!("{} has no parent directory", source.display()))
        })?;

        // Interpreted: no build step, the script runs from its own directory
        Ok(Prepared::Runnable(
            ExecutionRequest::new(&config.python_executable)
                .with_args([source.to_string_lossy().into_owned()])
                .in_dir(dir),
        ))
    }
}
