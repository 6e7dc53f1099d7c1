/// Descriptor ceiling enforcement for supervised children
///
/// The ceiling is installed between fork and exec with soft == hard, so the
/// child can never raise it again.
use crate::config::types::{FdscopeError, Result};
use nix::sys::resource::{getrlimit, setrlimit, Resource};
use std::os::unix::process::CommandExt;
use std::process::Command;

/// Reject a ceiling the supervisor itself could not install.
///
/// An unprivileged process may lower its hard limit but never raise it, so a
/// request above our own hard ceiling would only surface as an opaque spawn
/// failure inside the child.
pub fn check_fd_limit(limit: u64) -> Result<()> {
    if limit == 0 {
        return Err(FdscopeError::ResourceLimit(
            "descriptor limit must be positive".to_string(),
        ));
    }

    let (_soft, hard) = getrlimit(Resource::RLIMIT_NOFILE)
        .map_err(|e| FdscopeError::ResourceLimit(format!("getrlimit(RLIMIT_NOFILE): {e}")))?;

    let privileged = nix::unistd::geteuid().is_root();
    if limit > hard && !privileged {
        return Err(FdscopeError::ResourceLimit(format!(
            "requested descriptor limit {limit} exceeds the supervisor's hard limit {hard}"
        )));
    }
    Ok(())
}

/// Install the descriptor ceiling on a command about to be spawned
pub fn confine_descriptors(cmd: &mut Command, limit: u64) {
    // SAFETY: the hook only performs a single setrlimit syscall; it does not
    // allocate or take locks, so it is safe to run in the forked child.
    unsafe {
        cmd.pre_exec(move || {
            setrlimit(Resource::RLIMIT_NOFILE, limit, limit).map_err(std::io::Error::from)
        });
    }
}
