/// Run-scoped workspace for uploaded sources and build artifacts
///
/// Every run gets a fresh uuid-named directory, so concurrent runs never
/// share a source file or a compiled binary.
use crate::config::types::{FdscopeError, Result};
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Base directory name under the system temp dir
pub const WORKSPACE_ROOT: &str = "fdscope";

/// Workspace manager for isolated run artifacts
#[derive(Debug)]
pub struct Workspace {
    run_id: Uuid,
    run_dir: PathBuf,
    source_file: Option<PathBuf>,
}

impl Workspace {
    /// Create new workspace under `base_dir`
    pub fn new(base_dir: &Path) -> Result<Self> {
        let run_id = Uuid::new_v4();
        let run_dir = base_dir.join(run_id.to_string());

        fs::create_dir_all(&run_dir).map_err(|e| {
            FdscopeError::Workspace(format!(
                "Failed to create workspace directory {}: {}",
                run_dir.display(),
                e
            ))
        })?;

        // Absolute so interpreters and compilers see the same path whatever their cwd
        let run_dir = fs::canonicalize(&run_dir).map_err(|e| {
            FdscopeError::Workspace(format!("Failed to resolve {}: {}", run_dir.display(), e))
        })?;

        Ok(Self {
            run_id,
            run_dir,
            source_file: None,
        })
    }

    /// Create new workspace under `<tmp>/fdscope`
    pub fn in_temp_dir() -> Result<Self> {
        Self::new(&std::env::temp_dir().join(WORKSPACE_ROOT))
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    /// Copy `source` into the workspace under its own file name
    pub fn import_source(&mut self, source: &Path) -> Result<PathBuf> {
        let file_name = source.file_name().ok_or_else(|| {
            FdscopeError::Workspace(format!("{} is not a file path", source.display()))
        })?;
        let target = self.run_dir.join(file_name);

        fs::copy(source, &target).map_err(|e| {
            FdscopeError::Workspace(format!(
                "Failed to copy {} into workspace: {}",
                source.display(),
                e
            ))
        })?;

        self.source_file = Some(target.clone());
        Ok(target)
    }

    pub fn source_file(&self) -> Option<&Path> {
        self.source_file.as_deref()
    }

    /// Remove the run directory (idempotent)
    pub fn cleanup(&self) -> Result<()> {
        match fs::remove_dir_all(&self.run_dir) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(FdscopeError::Workspace(format!(
                "Failed to remove {}: {}",
                self.run_dir.display(),
                e
            ))),
        }
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if let Err(e) = self.cleanup() {
            log::warn!("{}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workspaces_are_distinct_and_removed_on_drop() {
        let base = tempfile::tempdir().expect("tempdir");
        let first = Workspace::new(base.path()).expect("first workspace");
        let second = Workspace::new(base.path()).expect("second workspace");
        assert_ne!(first.run_dir(), second.run_dir());
        assert!(first.run_dir().is_absolute());

        let dir = first.run_dir().to_path_buf();
        assert!(dir.is_dir());
        drop(first);
        assert!(!dir.exists());
    }

    #[test]
    fn test_import_source_keeps_file_name() {
        let base = tempfile::tempdir().expect("tempdir");
        let upload = base.path().join("leak.py");
        fs::write(&upload, "print('hi')\n").expect("write upload");

        let mut workspace = Workspace::new(&base.path().join("runs")).expect("workspace");
        let imported = workspace.import_source(&upload).expect("import");
        assert_eq!(imported.file_name(), upload.file_name());
        assert_eq!(imported.parent(), Some(workspace.run_dir()));
        assert_eq!(
            fs::read_to_string(&imported).expect("read back"),
            "print('hi')\n"
        );
        assert_eq!(workspace.source_file(), Some(imported.as_path()));
    }

    #[test]
    fn test_cleanup_is_idempotent() {
        let base = tempfile::tempdir().expect("tempdir");
        let workspace = Workspace::new(base.path()).expect("workspace");
        workspace.cleanup().expect("first cleanup");
        workspace.cleanup().expect("second cleanup");
    }
}
