use std::{
    io,
    fmt::Write,
    path::PathBuf,
    process::ExitStatus,
};
use colored::Colorize;
use crate::ext;

/// General enum, representing possible errors.
#[derive(Debug)]
pub enum Error {
    Io(io::Error, Vec<PathBuf>),
    /// Error, produced by an argument parser.
    Lexopt(lexopt::Error),
    /// rust_htslib error.
    Htslib(htslib::errors::Error),
    /// Executable not found.
    NoExec(PathBuf),
    /// Executable could not be started at all (missing binary, bad directory component).
    Spawn {
        command: String,
        err: io::Error,
    },
    /// Subprocess finished with a non-zero exit status.
    /// `log` stores the file with the captured stderr, `tail` - its last lines.
    Subprocess {
        command: String,
        status: ExitStatus,
        log: Option<PathBuf>,
        tail: String,
    },
    /// Cannot resume from the previous run.
    Resume(String),
    InvalidInput(String),
    InvalidData(String),
    ParsingError(String),
    RuntimeError(String),
    /// Non-UTF8 encountered. First field: what is the object (for example, `read name`), second: failed byte string.
    Utf8(&'static str, Vec<u8>)
}

impl From<lexopt::Error> for Error {
    fn from(e: lexopt::Error) -> Self {
        Self::Lexopt(e)
    }
}

impl From<htslib::errors::Error> for Error {
    fn from(e: htslib::errors::Error) -> Self {
        Self::Htslib(e)
    }
}

impl From<regex::Error> for Error {
    fn from(e: regex::Error) -> Self {
        Self::RuntimeError(e.to_string())
    }
}

impl Error {
    /// Returns true if the error signals that the executable is missing or cannot be started.
    pub fn is_spawn_error(&self) -> bool {
        matches!(self, Self::Spawn { .. } | Self::NoExec(_))
    }

    /// Format error message.
    pub fn display(&self) -> String {
        let mut s = String::new();
        match self {
            Self::Io(e, files) => {
                write!(s, "{} in relation to ", "Input/Output error".red()).unwrap();
                if files.is_empty() {
                    write!(s, "unnamed streams").unwrap();
                } else {
                    write!(s, "{}", files.iter().map(|f| ext::fmt::path(f).cyan().to_string())
                        .collect::<Vec<_>>().join(", ")).unwrap();
                }
                write!(s, ": {}", e.kind()).unwrap();
                if let Some(e2) = e.get_ref() {
                    write!(s, ", {}", e2).unwrap();
                }
            }
            Self::Lexopt(e) => write!(s, "{} to parse command-line arguments: {}", "Failed".red(), e).unwrap(),
            Self::Htslib(e) => write!(s, "{}: {}", "Htslib error".red(), e).unwrap(),
            Self::NoExec(path) => write!(s, "{} at {}", "Could not find executable".red(),
                ext::fmt::path(path).cyan()).unwrap(),
            Self::Spawn { command, err } => write!(s, "{} {}: {}\n    Please check your installation and PATH.",
                "Could not start".red(), command.cyan(), err).unwrap(),
            Self::Subprocess { command, status, log, tail } => {
                write!(s, "{} ({}):\n    {}", "Subprocess failed".red(), status, command).unwrap();
                if let Some(log) = log {
                    write!(s, "\n    Log file: {}", ext::fmt::path(log).cyan()).unwrap();
                }
                if !tail.is_empty() {
                    write!(s, "\n{}", tail.trim_end()).unwrap();
                }
            }
            Self::Resume(e) => write!(s, "{}: {}", "Cannot resume".red(), e).unwrap(),
            Self::InvalidInput(e) => write!(s, "{}: {}", "Invalid input".red(), e).unwrap(),
            Self::InvalidData(e) => write!(s, "{}: {}", "Invalid data".red(), e).unwrap(),
            Self::ParsingError(e) => write!(s, "{}: {}", "Parsing error".red(), e).unwrap(),
            Self::RuntimeError(e) => write!(s, "{}: {}", "Runtime error".red(), e).unwrap(),
            Self::Utf8(desc, bytes) => write!(s, "{}: {} cannot be decoded ({}, {:?})",
                "UTF-8 error".red(), desc, String::from_utf8_lossy(bytes), bytes).unwrap(),
        };
        s
    }
}

macro_rules! validate_param {
    ($cond:expr, $($arg:expr),+) => {{
        if !($cond) {
            (
                Err($crate::Error::InvalidInput(format!($($arg),+)))
            ?)
        }
    }};
}
pub(crate) use validate_param;

macro_rules! add_path {
    (!) => {
        |e| $crate::Error::Io(e, Vec::new())
    };
    ($path:expr) => {
        |e| $crate::Error::Io(e, vec![std::convert::AsRef::<std::path::Path>::as_ref(&$path).to_owned()])
    };
    ($($path:expr),+) => {
        |e| {
            let mut v = Vec::new();
            $(
                v.push(std::convert::AsRef::<std::path::Path>::as_ref(&$path).to_owned());
            )*
            $crate::Error::Io(e, v)
        }
    };
}
pub(crate) use add_path;

macro_rules! error {
    ($var:ident, $($arg:expr),+ $(,)?) => {
        $crate::Error::$var(format!($($arg),+))
    }
}
pub(crate) use error;

/// Wrapper around the standard result.
pub type Result<T> = std::result::Result<T, Error>;
