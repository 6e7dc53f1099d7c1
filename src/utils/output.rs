/// Bounded capture of child stdout/stderr
///
/// Readers start as soon as the child is spawned so a chatty program can never
/// fill its pipe and stall. Each reader appends into a shared buffer as it
/// goes, so the supervisor can collect whatever was buffered even when some
/// stray process keeps the pipe open past the collection deadline.
use serde::{Deserialize, Serialize};
use std::io::{BufReader, Read};
use std::process::{ChildStderr, ChildStdout};
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

/// Output limits configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputLimits {
    /// Per-stream stdout limit (bytes)
    pub stdout_limit: usize,
    /// Per-stream stderr limit (bytes)
    pub stderr_limit: usize,
    /// Collection timeout (milliseconds)
    pub collection_timeout_ms: u64,
}

impl Default for OutputLimits {
    fn default() -> Self {
        OutputLimits {
            stdout_limit: 8 * 1024 * 1024, // 8 MB stdout
            stderr_limit: 2 * 1024 * 1024, // 2 MB stderr
            collection_timeout_ms: 5000,   // 5 seconds
        }
    }
}

/// Decoded output of one run
#[derive(Debug, Clone, Default)]
pub struct CapturedOutput {
    pub stdout: String,
    pub stderr: String,
    /// Either stream hit its byte limit or did not reach EOF in time
    pub truncated: bool,
}

/// Bytes read so far from one stream
#[derive(Debug, Default)]
struct StreamBuffer {
    data: Vec<u8>,
    truncated: bool,
}

/// A background reader: its buffer plus an EOF notification
struct StreamReader {
    buffer: Arc<Mutex<StreamBuffer>>,
    eof: Receiver<()>,
}

/// In-flight capture of both streams
pub struct OutputCapture {
    limits: OutputLimits,
    stdout: Option<StreamReader>,
    stderr: Option<StreamReader>,
}

impl OutputCapture {
    /// Start background readers for whichever streams are present
    pub fn start(
        stdout: Option<ChildStdout>,
        stderr: Option<ChildStderr>,
        limits: OutputLimits,
    ) -> Self {
        let stdout = stdout.map(|stream| spawn_reader(stream, limits.stdout_limit));
        let stderr = stderr.map(|stream| spawn_reader(stream, limits.stderr_limit));
        Self {
            limits,
            stdout,
            stderr,
        }
    }

    /// Wait (bounded) for both readers and decode what they collected.
    ///
    /// A stream that has not reached EOF by the deadline contributes the
    /// bytes read so far and marks the capture truncated. Invalid UTF-8 is
    /// replaced, never rejected.
    pub fn finish(self) -> CapturedOutput {
        let deadline =
            Instant::now() + Duration::from_millis(self.limits.collection_timeout_ms);

        let (stdout, stdout_truncated) = receive_until(self.stdout, deadline);
        let (stderr, stderr_truncated) = receive_until(self.stderr, deadline);

        CapturedOutput {
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
            truncated: stdout_truncated || stderr_truncated,
        }
    }
}

fn spawn_reader<R: Read + Send + 'static>(stream: R, limit: usize) -> StreamReader {
    let buffer = Arc::new(Mutex::new(StreamBuffer::default()));
    let (eof_tx, eof_rx) = channel();
    let thread_buffer = Arc::clone(&buffer);
    thread::spawn(move || {
        collect_stream(stream, limit, &thread_buffer);
        let _ = eof_tx.send(());
    });
    StreamReader {
        buffer,
        eof: eof_rx,
    }
}

fn lock_buffer(buffer: &Mutex<StreamBuffer>) -> MutexGuard<'_, StreamBuffer> {
    buffer.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn receive_until(reader: Option<StreamReader>, deadline: Instant) -> (Vec<u8>, bool) {
    let Some(reader) = reader else {
        return (Vec::new(), false);
    };
    let remaining = deadline.saturating_duration_since(Instant::now());
    let reached_eof = match reader.eof.recv_timeout(remaining) {
        Ok(()) => true,
        Err(RecvTimeoutError::Timeout) => {
            log::warn!("Output collection did not reach EOF within the collection timeout");
            false
        }
        Err(RecvTimeoutError::Disconnected) => false,
    };

    // The reader may still be running; take what it has and leave it an empty buffer
    let mut guard = lock_buffer(&reader.buffer);
    let data = std::mem::take(&mut guard.data);
    (data, guard.truncated || !reached_eof)
}

/// Collect from a single stream with limit
fn collect_stream<R: Read>(stream: R, limit: usize, buffer: &Mutex<StreamBuffer>) {
    let mut reader = BufReader::new(stream);
    let mut chunk = [0u8; 4096];

    loop {
        match reader.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => {
                let mut guard = lock_buffer(buffer);
                if guard.truncated {
                    // Keep draining so the writer never blocks on a full pipe.
                    continue;
                }
                let room = limit.saturating_sub(guard.data.len());
                if n > room {
                    guard.data.extend_from_slice(&chunk[..room]);
                    guard.truncated = true;
                } else {
                    guard.data.extend_from_slice(&chunk[..n]);
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(_) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};
    use std::os::unix::net::UnixStream;

    #[test]
    fn test_output_limits_default() {
        let limits = OutputLimits::default();
        assert_eq!(limits.stdout_limit, 8 * 1024 * 1024);
        assert_eq!(limits.stderr_limit, 2 * 1024 * 1024);
        assert_eq!(limits.collection_timeout_ms, 5000);
    }

    #[test]
    fn test_capture_without_streams_is_empty() {
        let capture = OutputCapture::start(None, None, OutputLimits::default());
        let output = capture.finish();
        assert!(output.stdout.is_empty());
        assert!(output.stderr.is_empty());
        assert!(!output.truncated);
    }

    #[test]
    fn test_collect_stream_truncates_at_limit() {
        let buffer = Mutex::new(StreamBuffer::default());
        collect_stream(Cursor::new(vec![b'x'; 10_000]), 100, &buffer);
        let collected = lock_buffer(&buffer);
        assert_eq!(collected.data.len(), 100);
        assert!(collected.truncated);
    }

    #[test]
    fn test_collect_stream_keeps_short_output() {
        let buffer = Mutex::new(StreamBuffer::default());
        collect_stream(Cursor::new(b"hello\n".to_vec()), 100, &buffer);
        let collected = lock_buffer(&buffer);
        assert_eq!(collected.data, b"hello\n");
        assert!(!collected.truncated);
    }

    #[test]
    fn test_open_stream_yields_bytes_read_so_far() {
        let (mut writer, stream) = UnixStream::pair().expect("socket pair");
        writer.write_all(b"partial").expect("write");
        let reader = spawn_reader(stream, 100);

        let started = Instant::now();
        let (data, truncated) = receive_until(Some(reader), started + Duration::from_millis(300));

        assert_eq!(data, b"partial");
        assert!(truncated, "a stream without EOF is reported truncated");
        assert!(started.elapsed() < Duration::from_secs(2));
        drop(writer);
    }

    #[test]
    fn test_closed_stream_is_complete() {
        let (mut writer, stream) = UnixStream::pair().expect("socket pair");
        writer.write_all(b"done\n").expect("write");
        drop(writer);
        let reader = spawn_reader(stream, 100);

        let (data, truncated) =
            receive_until(Some(reader), Instant::now() + Duration::from_secs(2));
        assert_eq!(data, b"done\n");
        assert!(!truncated);
    }
}
