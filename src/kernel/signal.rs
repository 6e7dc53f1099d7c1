/// Process-group termination
///
/// Supervised children lead their own process group, so one `killpg` reaches
/// every process they forked.
use crate::kernel::procfs::ProcessTable;
use log::{debug, warn};
use nix::errno::Errno;
use nix::sys::signal::{kill, killpg, Signal};
use nix::unistd::Pid;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// What the forced-termination path actually did
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct KillReport {
    /// SIGKILL delivered to the whole group
    pub group_kill_sent: bool,
    /// Group kill failed and only the leader was signalled
    pub leader_fallback: bool,
    /// No group member survived within the wait bound
    pub group_gone: bool,
    pub waited_ms: u64,
    pub notes: Vec<String>,
}

/// SIGKILL every member of `pgid`, falling back to the leader alone
pub fn kill_process_group(pgid: u32) -> KillReport {
    let mut report = KillReport::default();
    // killpg(0) would hit our own group and 1 is init
    let raw = match i32::try_from(pgid) {
        Ok(raw) if raw > 1 => raw,
        _ => {
            report.notes.push(format!("refusing to signal pgid {pgid}"));
            return report;
        }
    };

    match killpg(Pid::from_raw(raw), Signal::SIGKILL) {
        Ok(()) => report.group_kill_sent = true,
        Err(Errno::ESRCH) => {
            debug!("process group {} already gone", pgid);
            report.group_kill_sent = true;
        }
        Err(e) => {
            report
                .notes
                .push(format!("group SIGKILL failed ({e}); signalling leader only"));
            if let Err(e) = kill(Pid::from_raw(raw), Signal::SIGKILL) {
                if e != Errno::ESRCH {
                    report.notes.push(format!("leader SIGKILL failed: {e}"));
                }
            }
            report.leader_fallback = true;
        }
    }

    report
}

/// Poll until no live (non-zombie) member of `pgid` remains, up to `timeout`
pub fn wait_for_group_exit(table: &ProcessTable, pgid: u32, timeout: Duration) -> bool {
    let start = Instant::now();
    loop {
        match table.group_members(pgid) {
            Ok(members) if members.is_empty() => return true,
            Ok(members) => {
                if start.elapsed() >= timeout {
                    warn!(
                        "process group {} still has {} live member(s) after {:?}",
                        pgid,
                        members.len(),
                        timeout
                    );
                    return false;
                }
            }
            Err(e) => {
                warn!("cannot verify process group {} exit: {}", pgid, e);
                return false;
            }
        }
        std::thread::sleep(Duration::from_millis(10));
    }
}

/// Kill the group and wait (bounded) for it to disappear
pub fn terminate_group(table: &ProcessTable, pgid: u32, timeout: Duration) -> KillReport {
    let start = Instant::now();
    let mut report = kill_process_group(pgid);
    report.group_gone = wait_for_group_exit(table, pgid, timeout);
    report.waited_ms = start.elapsed().as_millis() as u64;
    report
}
