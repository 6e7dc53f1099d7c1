/// Process table access through a `/proc`-style filesystem
///
/// Every per-process read distinguishes "the process (or entry) is gone" and
/// "we may not look" from genuine I/O failures, so callers that sample a live
/// process can skip a tick without hiding logic bugs behind a blanket catch.
use crate::config::types::{DescriptorEntry, FdscopeError, Result};
use log::debug;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::PathBuf;

/// Outcome of an optional read against the process table
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcRead<T> {
    Found(T),
    NotFound,
    PermissionDenied,
}

impl<T> ProcRead<T> {
    /// Fold the two expected absence cases out of an I/O result
    pub fn from_io(result: io::Result<T>) -> io::Result<Self> {
        match result {
            Ok(value) => Ok(ProcRead::Found(value)),
            Err(e) => match e.kind() {
                io::ErrorKind::NotFound => Ok(ProcRead::NotFound),
                io::ErrorKind::PermissionDenied => Ok(ProcRead::PermissionDenied),
                _ if e.raw_os_error() == Some(libc::ESRCH) => Ok(ProcRead::NotFound),
                _ => Err(e),
            },
        }
    }

    pub fn found(self) -> Option<T> {
        match self {
            ProcRead::Found(value) => Some(value),
            _ => None,
        }
    }

    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> ProcRead<U> {
        match self {
            ProcRead::Found(value) => ProcRead::Found(f(value)),
            ProcRead::NotFound => ProcRead::NotFound,
            ProcRead::PermissionDenied => ProcRead::PermissionDenied,
        }
    }
}

/// Descriptor table of one process at one instant
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FdTable {
    /// Number of descriptor slots listed
    pub count: usize,
    /// Resolved entries, ordered by descriptor index
    pub entries: Vec<DescriptorEntry>,
}

/// RLIMIT_NOFILE pair as reported by `/proc/<pid>/limits` (`None` = unlimited)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FdLimits {
    pub soft: Option<u64>,
    pub hard: Option<u64>,
}

/// One row of the host process listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessSummary {
    pub pid: u32,
    pub name: String,
    pub user: String,
    pub fd_count: usize,
}

/// Handle on a process table rooted at a directory (normally `/proc`)
#[derive(Debug, Clone)]
pub struct ProcessTable {
    root: PathBuf,
}

impl Default for ProcessTable {
    fn default() -> Self {
        Self::host()
    }
}

impl ProcessTable {
    /// The host's `/proc`
    pub fn host() -> Self {
        Self::with_root("/proc")
    }

    pub fn with_root<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    /// Fail when the table itself cannot be listed
    pub fn ensure_readable(&self) -> Result<()> {
        self.pids().map(|_| ())
    }

    fn pid_dir(&self, pid: u32) -> PathBuf {
        self.root.join(pid.to_string())
    }

    /// True while the process exists and has not yet become a zombie
    pub fn is_alive(&self, pid: u32) -> bool {
        match self.read_stat(pid) {
            Ok(ProcRead::Found(stat)) => !matches!(stat.state, 'Z' | 'X'),
            // stat is world-readable; if we cannot read it, fall back to existence
            Ok(ProcRead::PermissionDenied) => self.pid_dir(pid).exists(),
            Ok(ProcRead::NotFound) => false,
            Err(e) => {
                debug!("stat read for pid {} failed: {}", pid, e);
                self.pid_dir(pid).exists()
            }
        }
    }

    /// List descriptor slots and resolve their targets.
    ///
    /// A descriptor closed between listing and `readlink` still counts
    /// toward `count` but yields no entry.
    pub fn descriptors(&self, pid: u32) -> io::Result<ProcRead<FdTable>> {
        let fd_dir = self.pid_dir(pid).join("fd");
        let listing = match ProcRead::from_io(fs::read_dir(&fd_dir))? {
            ProcRead::Found(listing) => listing,
            ProcRead::NotFound => return Ok(ProcRead::NotFound),
            ProcRead::PermissionDenied => return Ok(ProcRead::PermissionDenied),
        };

        let mut table = FdTable::default();
        for entry in listing {
            let entry = match ProcRead::from_io(entry)? {
                ProcRead::Found(entry) => entry,
                ProcRead::NotFound => return Ok(ProcRead::NotFound),
                ProcRead::PermissionDenied => return Ok(ProcRead::PermissionDenied),
            };
            let Some(index) = entry
                .file_name()
                .to_str()
                .and_then(|name| name.parse::<u32>().ok())
            else {
                continue;
            };
            table.count += 1;

            match ProcRead::from_io(fs::read_link(entry.path()))? {
                ProcRead::Found(target) => table.entries.push(DescriptorEntry::new(
                    index,
                    target.to_string_lossy().into_owned(),
                )),
                ProcRead::NotFound => {}
                ProcRead::PermissionDenied => return Ok(ProcRead::PermissionDenied),
            }
        }

        table.entries.sort_by_key(|entry| entry.index);
        Ok(ProcRead::Found(table))
    }

    /// Number of open descriptors, without resolving targets
    pub fn descriptor_count(&self, pid: u32) -> io::Result<ProcRead<usize>> {
        let fd_dir = self.pid_dir(pid).join("fd");
        Ok(ProcRead::from_io(fs::read_dir(fd_dir))?.map(|listing| listing.flatten().count()))
    }

    /// Soft/hard descriptor limits of a process
    pub fn fd_limits(&self, pid: u32) -> io::Result<ProcRead<FdLimits>> {
        let content = match ProcRead::from_io(fs::read_to_string(self.pid_dir(pid).join("limits")))? {
            ProcRead::Found(content) => content,
            ProcRead::NotFound => return Ok(ProcRead::NotFound),
            ProcRead::PermissionDenied => return Ok(ProcRead::PermissionDenied),
        };
        Ok(match parse_fd_limits(&content) {
            Some(limits) => ProcRead::Found(limits),
            None => ProcRead::NotFound,
        })
    }

    /// Live (non-zombie) members of a process group
    pub fn group_members(&self, pgid: u32) -> Result<Vec<u32>> {
        let mut members = Vec::new();
        for pid in self.pids()? {
            if let Ok(ProcRead::Found(stat)) = self.read_stat(pid) {
                if stat.pgrp == pgid && !matches!(stat.state, 'Z' | 'X') {
                    members.push(pid);
                }
            }
        }
        Ok(members)
    }

    /// Every readable process on the host, heaviest descriptor users first.
    ///
    /// Processes that vanish or deny access mid-scan are skipped; only a
    /// completely unreadable table is an error.
    pub fn list_processes(&self) -> Result<Vec<ProcessSummary>> {
        let mut processes = Vec::new();

        for pid in self.pids()? {
            match self.summarize(pid) {
                Ok(Some(summary)) => processes.push(summary),
                Ok(None) => {}
                Err(e) => debug!("skipping pid {}: {}", pid, e),
            }
        }

        processes.sort_by(|a, b| b.fd_count.cmp(&a.fd_count).then(a.pid.cmp(&b.pid)));
        Ok(processes)
    }

    fn summarize(&self, pid: u32) -> io::Result<Option<ProcessSummary>> {
        let dir = self.pid_dir(pid);
        let Some(name) = ProcRead::from_io(fs::read_to_string(dir.join("comm")))?.found() else {
            return Ok(None);
        };
        let Some(status) = ProcRead::from_io(fs::read_to_string(dir.join("status")))?.found() else {
            return Ok(None);
        };
        let Some(uid) = parse_status_uid(&status) else {
            return Ok(None);
        };
        let Some(fd_count) = self.descriptor_count(pid)?.found() else {
            return Ok(None);
        };

        Ok(Some(ProcessSummary {
            pid,
            name: name.trim().to_string(),
            user: user_name(uid),
            fd_count,
        }))
    }

    fn pids(&self) -> Result<Vec<u32>> {
        let listing = fs::read_dir(&self.root).map_err(|e| {
            FdscopeError::ProcessTable(format!("Failed to read {}: {}", self.root.display(), e))
        })?;

        Ok(listing
            .flatten()
            .filter_map(|entry| entry.file_name().to_str()?.parse::<u32>().ok())
            .collect())
    }

    fn read_stat(&self, pid: u32) -> io::Result<ProcRead<ProcStat>> {
        let content = match ProcRead::from_io(fs::read_to_string(self.pid_dir(pid).join("stat")))? {
            ProcRead::Found(content) => content,
            ProcRead::NotFound => return Ok(ProcRead::NotFound),
            ProcRead::PermissionDenied => return Ok(ProcRead::PermissionDenied),
        };
        Ok(match parse_stat(&content) {
            Some(stat) => ProcRead::Found(stat),
            None => ProcRead::NotFound,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ProcStat {
    state: char,
    pgrp: u32,
}

/// Parse `pid (comm) state ppid pgrp ...`; comm may itself contain parentheses.
fn parse_stat(content: &str) -> Option<ProcStat> {
    let after_comm = &content[content.rfind(')')? + 1..];
    let mut fields = after_comm.split_whitespace();
    let state = fields.next()?.chars().next()?;
    let _ppid = fields.next()?;
    let pgrp = fields.next()?.parse::<i64>().ok()?;
    Some(ProcStat {
        state,
        pgrp: u32::try_from(pgrp).ok()?,
    })
}

/// Parse the "Max open files" row of a limits file
pub fn parse_fd_limits(content: &str) -> Option<FdLimits> {
    let line = content
        .lines()
        .find(|line| line.starts_with("Max open files"))?;
    let mut values = line["Max open files".len()..].split_whitespace();
    let soft = parse_limit_value(values.next()?)?;
    let hard = parse_limit_value(values.next()?)?;
    Some(FdLimits { soft, hard })
}

fn parse_limit_value(raw: &str) -> Option<Option<u64>> {
    if raw == "unlimited" {
        Some(None)
    } else {
        raw.parse::<u64>().ok().map(Some)
    }
}

fn parse_status_uid(status: &str) -> Option<u32> {
    status
        .lines()
        .find_map(|line| line.strip_prefix("Uid:"))
        .and_then(|rest| rest.split_whitespace().next())
        .and_then(|uid| uid.parse::<u32>().ok())
}

fn user_name(uid: u32) -> String {
    match nix::unistd::User::from_uid(nix::unistd::Uid::from_raw(uid)) {
        Ok(Some(user)) => user.name,
        _ => uid.to_string(),
    }
}
