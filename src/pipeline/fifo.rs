//! Background compression of a stream, written by another process into a named pipe.
//!
//! Opening a FIFO for reading blocks until a writer appears, so the compressor is started from a
//! separate thread. If the writer never appears (for example, the producer failed), the thread is
//! released by a non-blocking writer-side open and the cancellation token.

use std::{
    fs::{self, File, OpenOptions},
    path::{Path, PathBuf},
    process::Stdio,
    os::unix::fs::OpenOptionsExt,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU32, Ordering},
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};
use crate::{
    Error,
    err::{add_path, error},
    ext,
};
use super::{Pipeline, zio::Zipper};

/// Wait this long for the background thread after the producer finished.
const JOIN_TIMEOUT: Duration = Duration::from_secs(10);
const POLL_INTERVAL: Duration = Duration::from_millis(20);
const OPEN_GRACE: Duration = Duration::from_millis(100);

/// Shared state between the controller and the background thread.
#[derive(Default)]
struct State {
    cancel: AtomicBool,
    /// FIFO was opened by the producer.
    opened: AtomicBool,
    /// Compressor process id (0 if not started).
    pid: AtomicU32,
}

/// Compressor, that drains a named pipe into a compressed file.
pub struct FifoCompressor {
    fifo: PathBuf,
    output: PathBuf,
    state: Arc<State>,
    handle: Option<JoinHandle<Result<(), Error>>>,
}

fn drain(fifo: &Path, output: &Path, zipper: &Zipper, log: Option<&Path>, state: &State) -> Result<(), Error> {
    // Blocks until the producer opens the pipe for writing.
    let input = File::open(fifo).map_err(add_path!(fifo))?;
    state.opened.store(true, Ordering::SeqCst);
    if state.cancel.load(Ordering::SeqCst) {
        return Ok(());
    }
    let mut cmd = zipper.compress();
    cmd.stdin(input).stdout(File::create(output).map_err(add_path!(output))?);
    if let Some(log) = log {
        cmd.stderr(OpenOptions::new().create(true).append(true).open(log).map_err(add_path!(log))?);
    } else {
        cmd.stderr(Stdio::inherit());
    }
    let repr = ext::fmt::command(&cmd);
    let mut child = cmd.spawn().map_err(|e| if ext::sys::is_missing_exec(&e) {
        Error::Spawn { command: repr.clone(), err: e }
    } else {
        Error::Io(e, Vec::new())
    })?;
    drop(cmd);
    state.pid.store(child.id(), Ordering::SeqCst);
    let status = child.wait().map_err(add_path!(!))?;
    state.pid.store(0, Ordering::SeqCst);
    if status.success() || state.cancel.load(Ordering::SeqCst) {
        Ok(())
    } else {
        Err(Error::Subprocess {
            command: repr,
            status,
            tail: log.map(|log| ext::sys::log_tail(log, 5)).unwrap_or_default(),
            log: log.map(Path::to_owned),
        })
    }
}

impl FifoCompressor {
    /// Creates named pipe `fifo` and starts a background thread,
    /// that will compress everything written into it into `output`.
    pub fn start(zipper: &Zipper, fifo: &Path, output: &Path, log: Option<&Path>) -> Result<Self, Error> {
        ext::sys::mkfifo(fifo)?;
        let state = Arc::new(State::default());
        let handle = {
            let state = Arc::clone(&state);
            let fifo = fifo.to_owned();
            let output = output.to_owned();
            let zipper = zipper.clone();
            let log = log.map(Path::to_owned);
            thread::Builder::new()
                .name("fifo-compressor".to_owned())
                .spawn(move || drain(&fifo, &output, &zipper, log.as_deref(), &state))
                .map_err(add_path!(!))?
        };
        Ok(Self {
            fifo: fifo.to_owned(),
            output: output.to_owned(),
            state,
            handle: Some(handle),
        })
    }

    pub fn fifo(&self) -> &Path {
        &self.fifo
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    /// Releases the thread if it still waits for a writer.
    fn unblock(&self) {
        self.state.cancel.store(true, Ordering::SeqCst);
        if !self.state.opened.load(Ordering::SeqCst) {
            // Succeeds only while there is a reader waiting; the writer is closed immediately.
            let _ = OpenOptions::new().write(true).custom_flags(libc::O_NONBLOCK).open(&self.fifo);
        }
    }

    /// Gives the background thread some time to register that the pipe was opened.
    fn wait_opened(&self, timeout: Duration) -> bool {
        let start = Instant::now();
        while !self.state.opened.load(Ordering::SeqCst) {
            if start.elapsed() >= timeout {
                return false;
            }
            thread::sleep(POLL_INTERVAL);
        }
        true
    }

    fn terminate(&self) {
        let pid = self.state.pid.load(Ordering::SeqCst);
        if pid != 0 {
            log::debug!("Terminating background compressor {}", pid);
            if let Err(e) = ext::sys::terminate(pid) {
                log::warn!("Could not terminate background compressor {}: {}", pid, e);
            }
        }
    }

    /// Waits for the thread at most `timeout`. Returns the thread result, or None if it is still running.
    fn join_for(&mut self, timeout: Duration) -> Option<Result<(), Error>> {
        let start = Instant::now();
        loop {
            let finished = match self.handle.as_ref() {
                None => return Some(Ok(())),
                Some(handle) => handle.is_finished(),
            };
            if finished {
                let handle = self.handle.take()?;
                return Some(handle.join().unwrap_or_else(|_|
                    Err(error!(RuntimeError, "Background compressor thread panicked"))));
            } else if start.elapsed() >= timeout {
                return None;
            }
            thread::sleep(POLL_INTERVAL);
        }
    }

    /// Finishes compression after the producer exited, and removes the named pipe.
    /// If the producer never opened the pipe, the compressor is cancelled instead.
    pub fn finish(mut self) -> Result<(), Error> {
        if !self.wait_opened(OPEN_GRACE) {
            log::debug!("Nothing was written into {}, cancelling compression", ext::fmt::path(&self.fifo));
            self.unblock();
            self.terminate();
        }
        let res = match self.join_for(JOIN_TIMEOUT) {
            Some(res) => res,
            None => {
                self.unblock();
                self.terminate();
                self.join_for(JOIN_TIMEOUT).unwrap_or_else(|| {
                    log::warn!("Background compressor for {} did not finish", ext::fmt::path(&self.output));
                    Ok(())
                })
            }
        };
        self.remove_fifo();
        res
    }

    fn remove_fifo(&self) {
        if self.fifo.exists() {
            if let Err(e) = fs::remove_file(&self.fifo) {
                log::warn!("Could not remove named pipe {}: {}", ext::fmt::path(&self.fifo), e);
            }
        }
    }
}

impl Drop for FifoCompressor {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.unblock();
            self.terminate();
            let _ = self.join_for(POLL_INTERVAL * 10);
            self.remove_fifo();
        }
    }
}

/// Runs the pipeline, one process of which writes into the compressor's named pipe,
/// and then finishes (or cancels) the compressor.
/// The producer error has priority over the compressor error.
pub fn run_with_fifo(pipeline: Pipeline, compressor: FifoCompressor) -> Result<(), Error> {
    let res = pipeline.run();
    let bg_res = compressor.finish();
    res.and(bg_res)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::Step;
    use std::io::Read;

    fn gunzip(path: &Path) -> String {
        let mut s = String::new();
        ext::sys::open(path).unwrap().read_to_string(&mut s).unwrap();
        s
    }

    #[test]
    fn compress_through_fifo() {
        let dir = tempfile::tempdir().unwrap();
        let fifo = dir.path().join("unmapped.fifo");
        let output = dir.path().join("unmapped.bam.z");
        let zipper = Zipper::parse("gzip", 1).unwrap();
        let compressor = FifoCompressor::start(&zipper, &fifo, &output, None).unwrap();
        let pipeline = Pipeline::new()
            .then(Step::new("sh").arg("-c").arg(format!("printf 'r1\\nr2\\n' > '{}'", fifo.display())));
        run_with_fifo(pipeline, compressor).unwrap();
        assert_eq!(gunzip(&output), "r1\nr2\n");
        assert!(!fifo.exists());
    }

    #[test]
    fn producer_never_writes() {
        let dir = tempfile::tempdir().unwrap();
        let fifo = dir.path().join("unmapped.fifo");
        let output = dir.path().join("unmapped.bam.z");
        let zipper = Zipper::parse("gzip", 1).unwrap();
        let compressor = FifoCompressor::start(&zipper, &fifo, &output, None).unwrap();
        let start = Instant::now();
        let err = run_with_fifo(Pipeline::new().then(Step::new("false")), compressor).unwrap_err();
        assert!(matches!(err, Error::Subprocess { .. }));
        assert!(start.elapsed() < JOIN_TIMEOUT);
        assert!(!fifo.exists());
        assert!(!output.exists());
    }
}
