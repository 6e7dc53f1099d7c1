/// Configuration loading from fdscope.json and the environment
use crate::config::types::{FdscopeError, Result};
use crate::utils::output::OutputLimits;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_FD_LIMIT: u64 = 256;
pub const DEFAULT_SAMPLE_INTERVAL_MS: u64 = 100;
pub const DEFAULT_CONFIG_FILE: &str = "fdscope.json";

/// Supervisor, sampler, and build-step settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FdscopeConfig {
    /// Wall-clock budget used when a run does not request one
    pub default_timeout_secs: u64,
    /// RLIMIT_NOFILE used when a run does not request one
    pub default_fd_limit: u64,
    /// Sampler cadence
    pub sample_interval_ms: u64,
    /// Upper bound on waiting for the sampler to acknowledge stop
    pub sampler_join_timeout_ms: u64,
    /// Upper bound on waiting for a killed process group to disappear
    pub group_exit_timeout_ms: u64,
    /// Wall-clock budget for the compiler
    pub compile_timeout_secs: u64,
    pub python_executable: String,
    pub c_compiler: String,
    pub output: OutputLimits,
}

impl Default for FdscopeConfig {
    fn default() -> Self {
        Self {
            default_timeout_secs: DEFAULT_TIMEOUT_SECS,
            default_fd_limit: DEFAULT_FD_LIMIT,
            sample_interval_ms: DEFAULT_SAMPLE_INTERVAL_MS,
            sampler_join_timeout_ms: 1000,
            group_exit_timeout_ms: 1000,
            compile_timeout_secs: 60,
            python_executable: "python3".to_string(),
            c_compiler: "gcc".to_string(),
            output: OutputLimits::default(),
        }
    }
}

impl FdscopeConfig {
    /// Load configuration from a JSON file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            FdscopeError::Config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;

        let config: FdscopeConfig = serde_json::from_str(&content)
            .map_err(|e| FdscopeError::Config(format!("Failed to parse config JSON: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Load ./fdscope.json when present, defaults otherwise
    pub fn load_default() -> Result<Self> {
        let config_path = std::env::current_dir()
            .map_err(|e| FdscopeError::Config(format!("Failed to get current directory: {}", e)))?
            .join(DEFAULT_CONFIG_FILE);

        if config_path.exists() {
            Self::load_from_file(config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Resolve configuration for the CLI: explicit file, then ./fdscope.json, then env overrides
    pub fn resolve(explicit: Option<&PathBuf>) -> Result<Self> {
        let mut config = match explicit {
            Some(path) => Self::load_from_file(path)?,
            None => Self::load_default()?,
        };
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply `FDSCOPE_*` overrides from a variable lookup
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(python) = lookup("FDSCOPE_PYTHON") {
            self.python_executable = python;
        }
        if let Some(cc) = lookup("FDSCOPE_CC") {
            self.c_compiler = cc;
        }
        if let Some(raw) = lookup("FDSCOPE_TIMEOUT_SECS") {
            self.default_timeout_secs = parse_u64("FDSCOPE_TIMEOUT_SECS", &raw)?;
        }
        if let Some(raw) = lookup("FDSCOPE_FD_LIMIT") {
            self.default_fd_limit = parse_u64("FDSCOPE_FD_LIMIT", &raw)?;
        }
        self.validate()
    }

    /// Reject settings that would make every run meaningless
    pub fn validate(&self) -> Result<()> {
        if self.default_timeout_secs == 0 {
            return Err(FdscopeError::Config(
                "default_timeout_secs must be positive".to_string(),
            ));
        }
        if self.default_fd_limit == 0 {
            return Err(FdscopeError::Config(
                "default_fd_limit must be positive".to_string(),
            ));
        }
        if self.sample_interval_ms == 0 {
            return Err(FdscopeError::Config(
                "sample_interval_ms must be positive".to_string(),
            ));
        }
        if self.python_executable.trim().is_empty() || self.c_compiler.trim().is_empty() {
            return Err(FdscopeError::Config(
                "interpreter and compiler paths must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Requested timeout, or the default when absent or zero
    pub fn effective_timeout(&self, requested: Option<u64>) -> u64 {
        requested
            .filter(|secs| *secs > 0)
            .unwrap_or(self.default_timeout_secs)
    }

    /// Requested descriptor limit, or the default when absent or zero
    pub fn effective_fd_limit(&self, requested: Option<u64>) -> u64 {
        requested
            .filter(|limit| *limit > 0)
            .unwrap_or(self.default_fd_limit)
    }

    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }

    pub fn sampler_join_timeout(&self) -> Duration {
        Duration::from_millis(self.sampler_join_timeout_ms)
    }

    pub fn group_exit_timeout(&self) -> Duration {
        Duration::from_millis(self.group_exit_timeout_ms)
    }

    pub fn compile_timeout(&self) -> Duration {
        Duration::from_secs(self.compile_timeout_secs)
    }
}

fn parse_u64(key: &str, raw: &str) -> Result<u64> {
    raw.trim()
        .parse::<u64>()
        .map_err(|e| FdscopeError::Config(format!("{key}={raw:?} is not a valid integer: {e}")))
}
