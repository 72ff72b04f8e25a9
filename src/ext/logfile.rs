//! Log files that become available only after the output directory is known:
//! general log (mirror of stderr messages) and the checkpoint log with all executed commands.

use std::{
    io::Write,
    fs::{File, OpenOptions},
    path::{Path, PathBuf},
    sync::Mutex,
};
use crate::{Error, err::add_path};

lazy_static::lazy_static! {
    static ref LOG_FILE: Mutex<Option<File>> = Mutex::new(None);
}

fn open_append(path: &Path) -> Result<File, Error> {
    OpenOptions::new().create(true).append(true).open(path).map_err(add_path!(path))
}

/// Starts mirroring log messages into `path`.
pub fn set_log_file(path: &Path) -> Result<(), Error> {
    let file = open_append(path)?;
    if let Ok(mut guard) = LOG_FILE.lock() {
        *guard = Some(file);
    }
    Ok(())
}

/// Fern output, that writes messages into the log file once it is set, and ignores them before that.
pub fn log_output() -> fern::Output {
    fern::Output::call(|record| {
        if let Ok(mut guard) = LOG_FILE.lock() {
            if let Some(file) = guard.as_mut() {
                // Logging must never fail the run.
                let _ = writeln!(file, "[{} {:>5}] {}", chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                    record.level(), record.args());
            }
        }
    })
}

/// Append-only checkpoint log: command line of the run, executed commands and stage markers.
/// Every line is appended and flushed separately, so the log survives an interrupted run.
#[derive(Clone, Debug)]
pub struct RunLog {
    path: PathBuf,
}

impl RunLog {
    /// Creates (truncates) the log and writes the command line into it.
    pub fn create(path: &Path, command_line: &str) -> Result<Self, Error> {
        let mut file = File::create(path).map_err(add_path!(path))?;
        writeln!(file, "{}", command_line).and_then(|_| file.sync_data()).map_err(add_path!(path))?;
        Ok(Self { path: path.to_owned() })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends a line to the log.
    pub fn record_line(&self, line: &str) -> Result<(), Error> {
        let mut file = OpenOptions::new().append(true).open(&self.path).map_err(add_path!(self.path))?;
        writeln!(file, "{}", line).and_then(|_| file.flush()).map_err(add_path!(self.path))
    }

    /// Records an executed command both in the debug log and in the checkpoint log.
    pub fn record_command(&self, cmd: &str) -> Result<(), Error> {
        log::debug!("    {}", cmd);
        self.record_line(cmd)
    }
}
