//! Reading and writing files through an external compression program (`gzip`, `pigz`, `bzip2`, ...).

use std::{
    io::{self, Read, Write, BufRead, BufReader, BufWriter},
    fs::File,
    path::{Path, PathBuf},
    process::{Command, Stdio, ChildStdin, ChildStdout},
};
use crate::{
    Error,
    err::{add_path, error},
    ext::{self, sys::ChildGuard},
};

/// External compression program together with its extra arguments (for example, `pigz -p4`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Zipper {
    pub exe: PathBuf,
    pub args: Vec<String>,
}

impl Zipper {
    /// Parses zipper from the command-line value. Returns None for `none` or empty value.
    /// For `pigz` and `pbzip2`, number of threads is added to the arguments.
    pub fn parse(value: &str, threads: u16) -> Option<Self> {
        let mut split = value.split_whitespace();
        let exe = split.next().filter(|s| *s != "none")?;
        let mut args: Vec<String> = split.map(str::to_owned).collect();
        let name = Path::new(exe).file_name().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
        if (name == "pigz" || name == "pbzip2") && threads > 1 && !args.iter().any(|arg| arg.starts_with("-p")) {
            args.push(format!("-p{}", threads));
        }
        Some(Self {
            exe: PathBuf::from(exe),
            args,
        })
    }

    /// Command that compresses stdin into stdout.
    pub fn compress(&self) -> Command {
        let mut cmd = Command::new(&self.exe);
        cmd.args(&self.args).arg("-c");
        cmd
    }

    /// Command that decompresses stdin/file into stdout.
    pub fn decompress(&self) -> Command {
        let mut cmd = Command::new(&self.exe);
        cmd.args(&self.args).arg("-cd");
        cmd
    }

    /// Returns the same zipper, but with a different executable path (after lookup).
    pub fn with_exe(&self, exe: PathBuf) -> Self {
        Self {
            exe,
            args: self.args.clone(),
        }
    }
}

fn check_status(guard: &mut ChildGuard, cmd: &str) -> Result<(), Error> {
    let status = guard.wait().map_err(add_path!(!))?;
    if status.success() {
        Ok(())
    } else {
        Err(Error::Subprocess {
            command: cmd.to_owned(),
            status,
            log: None,
            tail: String::new(),
        })
    }
}

fn spawn(mut cmd: Command) -> Result<(ChildGuard, String), Error> {
    let repr = ext::fmt::command(&cmd);
    let child = cmd.spawn().map_err(|e| if ext::sys::is_missing_exec(&e) {
        Error::Spawn { command: repr.clone(), err: e }
    } else {
        Error::Io(e, Vec::new())
    })?;
    Ok((ChildGuard::new(child), repr))
}

/// Output file, either plain or compressed by an external program.
pub enum ZWriter {
    Plain {
        path: PathBuf,
        writer: BufWriter<File>,
    },
    Packed {
        path: PathBuf,
        writer: BufWriter<ChildStdin>,
        guard: ChildGuard,
        repr: String,
    },
}

impl ZWriter {
    pub fn create(path: &Path, zipper: Option<&Zipper>) -> Result<Self, Error> {
        match zipper {
            None => Ok(Self::Plain {
                path: path.to_owned(),
                writer: ext::sys::create_file(path)?,
            }),
            Some(zipper) => {
                let mut cmd = zipper.compress();
                cmd.stdin(Stdio::piped())
                    .stdout(File::create(path).map_err(add_path!(path))?);
                let (mut guard, repr) = spawn(cmd)?;
                let stdin = guard.child_mut().stdin.take()
                    .ok_or_else(|| error!(RuntimeError, "Cannot write into `{}`", repr))?;
                Ok(Self::Packed {
                    path: path.to_owned(),
                    writer: BufWriter::new(stdin),
                    guard,
                    repr,
                })
            }
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            Self::Plain { path, .. } | Self::Packed { path, .. } => path,
        }
    }

    /// Flushes the output and waits for the compressor.
    pub fn finish(self) -> Result<PathBuf, Error> {
        match self {
            Self::Plain { path, mut writer } => {
                writer.flush().map_err(add_path!(path))?;
                Ok(path)
            }
            Self::Packed { path, writer, mut guard, repr } => {
                // Closing stdin signals the end of the stream.
                writer.into_inner().map_err(|e| Error::Io(e.into_error(), vec![path.clone()]))?;
                check_status(&mut guard, &repr)?;
                Ok(path)
            }
        }
    }
}

impl Write for ZWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Plain { writer, .. } => writer.write(buf),
            Self::Packed { writer, .. } => writer.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Plain { writer, .. } => writer.flush(),
            Self::Packed { writer, .. } => writer.flush(),
        }
    }
}

/// Input file, either read directly (gzip is detected automatically) or decompressed by an external program.
pub enum ZReader {
    Plain(Box<dyn BufRead + Send>),
    Packed {
        reader: BufReader<ChildStdout>,
        guard: ChildGuard,
        repr: String,
    },
}

impl ZReader {
    pub fn open(path: &Path, zipper: Option<&Zipper>) -> Result<Self, Error> {
        match zipper {
            None => Ok(Self::Plain(ext::sys::open(path).map_err(add_path!(path))?)),
            Some(zipper) => {
                let mut cmd = zipper.decompress();
                cmd.arg(path).stdin(Stdio::null()).stdout(Stdio::piped());
                let (mut guard, repr) = spawn(cmd)?;
                let stdout = guard.child_mut().stdout.take()
                    .ok_or_else(|| error!(RuntimeError, "Cannot read from `{}`", repr))?;
                Ok(Self::Packed {
                    reader: BufReader::new(stdout),
                    guard,
                    repr,
                })
            }
        }
    }

    /// Waits for the decompressor (if any), and checks its exit status.
    pub fn finish(self) -> Result<(), Error> {
        match self {
            Self::Plain(_) => Ok(()),
            Self::Packed { reader, mut guard, repr } => {
                drop(reader);
                check_status(&mut guard, &repr)
            }
        }
    }
}

impl Read for ZReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Plain(reader) => reader.read(buf),
            Self::Packed { reader, .. } => reader.read(buf),
        }
    }
}

impl BufRead for ZReader {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        match self {
            Self::Plain(reader) => reader.fill_buf(),
            Self::Packed { reader, .. } => reader.fill_buf(),
        }
    }

    fn consume(&mut self, amt: usize) {
        match self {
            Self::Plain(reader) => reader.consume(amt),
            Self::Packed { reader, .. } => reader.consume(amt),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_zipper() {
        assert_eq!(Zipper::parse("none", 4), None);
        assert_eq!(Zipper::parse("", 4), None);
        let pigz = Zipper::parse("pigz", 4).unwrap();
        assert_eq!(pigz.args, vec!["-p4"]);
        let gzip = Zipper::parse("gzip --fast", 4).unwrap();
        assert_eq!(gzip.exe, PathBuf::from("gzip"));
        assert_eq!(gzip.args, vec!["--fast"]);
    }

    #[test]
    fn gzip_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reads.fq.z");
        let zipper = Zipper::parse("gzip", 1).unwrap();
        let mut writer = ZWriter::create(&path, Some(&zipper)).unwrap();
        writer.write_all(b"@r1\nACGT\n+\nIIII\n").unwrap();
        writer.finish().unwrap();

        // Plain reader detects gzip by itself.
        let mut s = String::new();
        ZReader::open(&path, None).unwrap().read_to_string(&mut s).unwrap();
        assert_eq!(s, "@r1\nACGT\n+\nIIII\n");

        let mut reader = ZReader::open(&path, Some(&zipper)).unwrap();
        let mut s = String::new();
        reader.read_to_string(&mut s).unwrap();
        reader.finish().unwrap();
        assert_eq!(s, "@r1\nACGT\n+\nIIII\n");
    }
}
