/// Background descriptor sampler for a live child process
///
/// One thread per supervised run. The thread is the only writer of the sample
/// series and last snapshot; the supervisor reads them only after signalling
/// stop and waiting (bounded) for the thread to acknowledge.
use crate::config::types::{DescriptorEntry, DescriptorSample, FdscopeError, Result};
use crate::kernel::procfs::{ProcRead, ProcessTable};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use log::{debug, warn};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Everything the sampler observed
#[derive(Debug, Clone, Default)]
pub struct SamplerOutput {
    /// Raw samples, seconds since sampling started
    pub samples: Vec<DescriptorSample>,
    /// Descriptor table from the last successful tick
    pub last_snapshot: Vec<DescriptorEntry>,
    /// Ticks that produced no data (process hidden, racing exit, transient error)
    pub gaps: u64,
}

/// Result of stopping a sampler
#[derive(Debug, Clone)]
pub struct SamplerStop {
    pub output: SamplerOutput,
    /// False when the thread did not acknowledge within the join bound
    pub joined: bool,
}

/// Handle on a running sampler
pub struct SamplerHandle {
    pid: u32,
    shutdown: Sender<()>,
    done: Receiver<()>,
    thread: Option<JoinHandle<()>>,
    state: Arc<Mutex<SamplerOutput>>,
}

/// Start polling `pid` every `cadence` until stopped or the process is gone
pub fn start_sampling(table: ProcessTable, pid: u32, cadence: Duration) -> Result<SamplerHandle> {
    let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded(1);
    let (done_tx, done_rx) = crossbeam_channel::bounded(1);
    let state = Arc::new(Mutex::new(SamplerOutput::default()));
    let thread_state = Arc::clone(&state);

    let thread = thread::Builder::new()
        .name(format!("fdscope-sampler-{pid}"))
        .spawn(move || {
            sample_loop(&table, pid, cadence, &shutdown_rx, &thread_state);
            let _ = done_tx.send(());
        })
        .map_err(|e| FdscopeError::Process(format!("spawn sampler thread: {e}")))?;

    Ok(SamplerHandle {
        pid,
        shutdown: shutdown_tx,
        done: done_rx,
        thread: Some(thread),
        state,
    })
}

impl SamplerHandle {
    /// Signal stop, wait up to `join_timeout`, and take what was collected.
    ///
    /// A sampler that does not acknowledge in time is detached; its
    /// contribution is whatever it appended before the bound expired.
    pub fn stop(mut self, join_timeout: Duration) -> SamplerStop {
        let _ = self.shutdown.try_send(());

        let joined = match self.done.recv_timeout(join_timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if let Some(thread) = self.thread.take() {
                    if thread.join().is_err() {
                        warn!("sampler for pid {} panicked", self.pid);
                    }
                }
                true
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    "sampler for pid {} did not stop within {:?}; detaching",
                    self.pid, join_timeout
                );
                false
            }
        };

        let output = std::mem::take(&mut *lock_state(&self.state));
        SamplerStop { output, joined }
    }
}

fn lock_state(state: &Mutex<SamplerOutput>) -> MutexGuard<'_, SamplerOutput> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn sample_loop(
    table: &ProcessTable,
    pid: u32,
    cadence: Duration,
    shutdown: &Receiver<()>,
    state: &Mutex<SamplerOutput>,
) {
    let start = Instant::now();

    loop {
        match shutdown.try_recv() {
            Ok(()) | Err(TryRecvError::Disconnected) => break,
            Err(TryRecvError::Empty) => {}
        }

        if !table.is_alive(pid) {
            debug!("sampler: pid {} is gone", pid);
            break;
        }

        // Read outside the lock so a slow /proc never blocks the supervisor.
        match table.descriptors(pid) {
            Ok(ProcRead::Found(fds)) => {
                let elapsed_seconds = start.elapsed().as_secs_f64();
                let mut guard = lock_state(state);
                guard.samples.push(DescriptorSample {
                    elapsed_seconds,
                    count: fds.count,
                });
                guard.last_snapshot = fds.entries;
            }
            Ok(ProcRead::NotFound) | Ok(ProcRead::PermissionDenied) => {
                lock_state(state).gaps += 1;
            }
            Err(e) => {
                debug!("sampler: descriptor read for pid {} failed: {}", pid, e);
                lock_state(state).gaps += 1;
            }
        }

        match shutdown.recv_timeout(cadence) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {}
        }
    }
}

/// Shift the series so the first sample reads 0.0, rounded to milliseconds
pub fn normalize_samples(samples: &[DescriptorSample]) -> Vec<DescriptorSample> {
    let Some(first) = samples.first() else {
        return Vec::new();
    };
    let t0 = first.elapsed_seconds;
    samples
        .iter()
        .map(|sample| DescriptorSample {
            elapsed_seconds: round_millis((sample.elapsed_seconds - t0).max(0.0)),
            count: sample.count,
        })
        .collect()
}

pub(crate) fn round_millis(seconds: f64) -> f64 {
    (seconds * 1000.0).round() / 1000.0
}
