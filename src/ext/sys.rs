use std::{
    io::{self, Read, Seek, SeekFrom, BufRead, BufReader, Write, BufWriter, stdin, stdout},
    fs::{self, File},
    path::{Path, PathBuf},
    ffi::{OsStr, CString},
    os::unix::ffi::OsStrExt,
    process::{Child, ExitStatus},
};
use flate2::bufread::MultiGzDecoder;
use htslib::bam::{self, Read as BamRead};
use crate::{Error, err::add_path};

/// Finds an executable, and returns Error, if executable is not available.
pub fn find_exe(p: impl AsRef<Path>) -> Result<PathBuf, Error> {
    which::which(p.as_ref()).map_err(|_| Error::NoExec(p.as_ref().to_owned()))
}

/// Returns
/// - stdin if filename is `-`,
/// - gzip reader if the file starts with gzip magic number,
/// - regular text file otherwise.
pub fn open(filename: &Path) -> io::Result<Box<dyn BufRead + Send>> {
    if filename == OsStr::new("-") || filename == OsStr::new("/dev/stdin") {
        Ok(Box::new(BufReader::new(stdin())))
    } else {
        let mut stream = BufReader::new(File::open(filename)?);
        let mut two_bytes = [0_u8; 2];
        let bytes_read = stream.read(&mut two_bytes)?;
        stream.seek_relative(-(bytes_read as i64))?;
        if bytes_read == 2 && two_bytes[0] == 0x1f && two_bytes[1] == 0x8b {
            Ok(Box::new(BufReader::new(MultiGzDecoder::new(stream))))
        } else {
            Ok(Box::new(stream))
        }
    }
}

/// Creates a buffered file OR stdout if filename is `-`.
pub fn create_uncompressed(filename: &Path) -> io::Result<Box<dyn Write>> {
    if filename == OsStr::new("-") {
        Ok(Box::new(BufWriter::new(stdout())))
    } else {
        Ok(Box::new(BufWriter::new(File::create(filename)?)))
    }
}

/// Creates a buffered file, and converts possible error into `crate::Error`.
pub fn create_file(filename: &Path) -> Result<BufWriter<File>, Error> {
    File::create(filename).map(BufWriter::new).map_err(add_path!(filename))
}

/// Create directory with all parents, if it does not exist yet.
pub fn mkdir(path: impl AsRef<Path>) -> Result<(), Error> {
    let path = path.as_ref();
    if !path.exists() {
        fs::create_dir_all(path).map_err(add_path!(path))
    } else {
        Ok(())
    }
}

/// Returns a path with a new suffix appended to the end.
pub fn append_path(path: &Path, suffix: impl AsRef<OsStr>) -> PathBuf {
    let mut os_string = path.as_os_str().to_owned();
    os_string.push(suffix.as_ref());
    os_string.into()
}

/// Returns true if the file exists and has at least `min_size` bytes.
pub fn file_exists(path: &Path, min_size: u64) -> bool {
    fs::metadata(path).map(|m| m.len() >= min_size).unwrap_or(false)
}

/// Returns file size, or zero if the file does not exist.
pub fn file_size(path: &Path) -> u64 {
    fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}

/// Checks if the file contains any data.
/// BAM files must contain at least one record (header-only files do not count),
/// other files must be longer than 25 bytes.
pub fn nonzero_file(path: &Path) -> Result<bool, Error> {
    if !path.exists() {
        return Ok(false);
    }
    let is_bam = path.extension().map(|ext| ext.eq_ignore_ascii_case("bam")).unwrap_or(false);
    if is_bam {
        let mut reader = bam::Reader::from_path(path)?;
        let mut record = bam::Record::new();
        Ok(reader.read(&mut record).transpose()?.is_some())
    } else {
        Ok(file_size(path) > 25)
    }
}

/// Removes file together with its `.index` companion, ignoring missing files.
pub fn remove_with_index(path: &Path) -> Result<(), Error> {
    if path.exists() {
        fs::remove_file(path).map_err(add_path!(path))?;
        let index = append_path(path, ".index");
        if index.exists() {
            fs::remove_file(&index).map_err(add_path!(index))?;
        }
    }
    Ok(())
}

/// Returns file name without directory and without typical sequence extensions
/// (`.fq`, `.fa*`, `.txt`, `.seq`, `.bwtout`), also stripping one compression extension.
pub fn file_basename(path: &Path) -> String {
    fn is_seq_ext(ext: &str) -> bool {
        matches!(ext, "fq" | "txt" | "seq" | "bwtout") || ext.starts_with("fa")
    }
    fn is_zip_ext(ext: &str) -> bool {
        ext == "z" || ext.starts_with("gz") || ext.starts_with("bz")
    }

    let name = path.file_name().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
    let (stem, ext) = match name.rfind('.') {
        Some(i) if i > 0 => (&name[..i], name[i + 1..].to_ascii_lowercase()),
        _ => return name,
    };
    if is_seq_ext(&ext) {
        return stem.to_owned();
    }
    if is_zip_ext(&ext) {
        if let Some(j) = stem.rfind('.').filter(|&j| j > 0) {
            if is_seq_ext(&stem[j + 1..].to_ascii_lowercase()) {
                return stem[..j].to_owned();
            }
        }
    }
    stem.to_owned()
}

/// Returns last `lines` lines of the log file (only the last 64 Kb are examined).
/// Returns an empty string if the file cannot be read.
pub fn log_tail(path: &Path, lines: usize) -> String {
    const MAX_BYTES: u64 = 65536;
    let read_tail = || -> io::Result<String> {
        let mut file = File::open(path)?;
        let len = file.metadata()?.len();
        file.seek(SeekFrom::Start(len.saturating_sub(MAX_BYTES)))?;
        let mut buf = Vec::new();
        file.read_to_end(&mut buf)?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    };
    let Ok(contents) = read_tail() else { return String::new() };
    let all: Vec<&str> = contents.lines().collect();
    all[all.len().saturating_sub(lines)..].join("\n")
}

/// Returns all lines of the log file that start with `warning` (case insensitive).
pub fn grep_warnings(path: &Path) -> Result<Vec<String>, Error> {
    const PREFIX: &[u8] = b"warning";
    let reader = BufReader::new(File::open(path).map_err(add_path!(path))?);
    let mut res = Vec::new();
    for line in reader.lines() {
        let line = line.map_err(add_path!(path))?;
        if line.len() >= PREFIX.len() && line.as_bytes()[..PREFIX.len()].eq_ignore_ascii_case(PREFIX) {
            res.push(line.trim_end().to_owned());
        }
    }
    Ok(res)
}

/// Creates a named pipe (FIFO), removing any previous file with the same name.
pub fn mkfifo(path: &Path) -> Result<(), Error> {
    if path.exists() {
        fs::remove_file(path).map_err(add_path!(path))?;
    }
    let c_path = CString::new(path.as_os_str().as_bytes())
        .map_err(|_| Error::InvalidInput(format!("Path {} contains NUL byte", path.display())))?;
    // SAFETY: `c_path` is a valid NUL-terminated string.
    if unsafe { libc::mkfifo(c_path.as_ptr(), 0o600) } == 0 {
        Ok(())
    } else {
        Err(Error::Io(io::Error::last_os_error(), vec![path.to_owned()]))
    }
}

/// Sends SIGTERM to the process.
pub fn terminate(pid: u32) -> io::Result<()> {
    // SAFETY: kill does not access memory, invalid pids result in an error code.
    if unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) } == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

/// Returns true if the spawn error means that the executable (or a directory on its path) does not exist.
pub fn is_missing_exec(e: &io::Error) -> bool {
    matches!(e.raw_os_error(), Some(libc::ENOENT) | Some(libc::ENOTDIR))
}

/// RAII child wrapper, that kills the child if it gets dropped while still armed.
pub struct ChildGuard {
    child: Child,
    armed: bool,
}

impl ChildGuard {
    pub fn new(child: Child) -> Self {
        Self {
            child,
            armed: true,
        }
    }

    pub fn child_mut(&mut self) -> &mut Child {
        &mut self.child
    }

    /// Waits for the child and disarms the guard.
    pub fn wait(&mut self) -> io::Result<ExitStatus> {
        let status = self.child.wait()?;
        self.armed = false;
        Ok(status)
    }
}

impl Drop for ChildGuard {
    fn drop(&mut self) {
        if self.armed {
            match self.child.kill() {
                Err(e) => {
                    // InvalidInput means that the process exited already.
                    if e.kind() != io::ErrorKind::InvalidInput {
                        log::error!("Could not kill child process: {}", e);
                    }
                }
                Ok(_) => {
                    log::debug!("Killed child process {}", self.child.id());
                    // Collect the zombie.
                    let _ = self.child.wait();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basenames() {
        assert_eq!(file_basename(Path::new("/tmp/left_kept_reads.bam")), "left_kept_reads");
        assert_eq!(file_basename(Path::new("tmp/left_kept_reads_seg1.fq.z")), "left_kept_reads_seg1");
        assert_eq!(file_basename(Path::new("reads.fastq.gz")), "reads");
        assert_eq!(file_basename(Path::new("reads.txt")), "reads");
        assert_eq!(file_basename(Path::new("archive.tar.gz")), "archive.tar");
        assert_eq!(file_basename(Path::new(".hidden")), ".hidden");
    }

    #[test]
    fn tail_and_warnings() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("tool.log");
        fs::write(&log, "start\nWarning: few reads\nmiddle\nwarning: short\nend\n").unwrap();
        assert_eq!(log_tail(&log, 2), "warning: short\nend");
        assert_eq!(log_tail(&log, 100).lines().count(), 5);
        assert_eq!(grep_warnings(&log).unwrap(), vec!["Warning: few reads", "warning: short"]);
        assert_eq!(log_tail(&dir.path().join("missing.log"), 3), "");
    }

    #[test]
    fn nonzero_plain_files() {
        let dir = tempfile::tempdir().unwrap();
        let small = dir.path().join("small.juncs");
        fs::write(&small, "chr1\t10\t20\t+\n").unwrap();
        assert!(!nonzero_file(&small).unwrap());
        let large = dir.path().join("large.juncs");
        fs::write(&large, "chr1\t100\t2000\t+\nchr1\t3000\t4000\t-\n").unwrap();
        assert!(nonzero_file(&large).unwrap());
        assert!(!nonzero_file(&dir.path().join("absent")).unwrap());
    }

    #[test]
    fn fifo_creation() {
        let dir = tempfile::tempdir().unwrap();
        let fifo = dir.path().join("unmapped.fifo");
        fs::write(&fifo, "old").unwrap();
        mkfifo(&fifo).unwrap();
        use std::os::unix::fs::FileTypeExt;
        assert!(fs::metadata(&fifo).unwrap().file_type().is_fifo());
    }
}
