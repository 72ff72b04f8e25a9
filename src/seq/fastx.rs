use std::{
    io::{self, BufRead},
    cmp::{min, max},
    path::Path,
};
use bio::io::{fasta, fastq};
use crate::{
    Error,
    err::{add_path, error},
    ext,
};

/// Trait, summarizing `fasta::Record` and `fastq::Record`.
pub trait FastxRecord: Sized {
    /// Creates a new, empty record.
    fn new() -> Self;

    /// Checks if the record is empty.
    fn is_empty(&self) -> bool;

    /// Returns the name of the record.
    fn name(&self) -> &str;

    /// Returns the record sequence.
    fn seq(&self) -> &[u8];

    /// Returns qualities, if available.
    fn qual(&self) -> Option<&[u8]>;

    /// Writes one record to the output stream.
    /// Do not output any description, and for FASTA files, write sequence into one line.
    fn write_simple<W: io::Write>(&self, writer: W) -> io::Result<()>;
}

/// Trait, summarizing `fasta::Reader` and `fastq::Reader`.
pub trait FastxReader {
    type Record: FastxRecord;

    /// Reads the next record.
    /// If there is no record left, `record` will be empty.
    fn read_next(&mut self, record: &mut Self::Record) -> io::Result<()>;
}

/// Implement `FastxRecord` for FASTA record.
impl FastxRecord for fasta::Record {
    fn new() -> Self {
        Self::new()
    }

    fn is_empty(&self) -> bool {
        self.is_empty()
    }

    fn name(&self) -> &str {
        self.id()
    }

    fn seq(&self) -> &[u8] {
        self.seq()
    }

    fn qual(&self) -> Option<&[u8]> {
        None
    }

    fn write_simple<W: io::Write>(&self, writer: W) -> io::Result<()> {
        write_fasta(writer, self.id(), self.seq())
    }
}

/// Writes a single-line FASTA record.
pub fn write_fasta<W: io::Write>(mut writer: W, name: &str, seq: &[u8]) -> io::Result<()> {
    writeln!(writer, ">{}", name)?;
    writer.write_all(seq)?;
    writer.write_all(b"\n")
}

/// Writes a FASTQ record with an empty separator line.
pub fn write_fastq<W: io::Write>(mut writer: W, name: &str, seq: &[u8], qual: &[u8]) -> io::Result<()> {
    writeln!(writer, "@{}", name)?;
    writer.write_all(seq)?;
    writer.write_all(b"\n+\n")?;
    writer.write_all(qual)?;
    writer.write_all(b"\n")
}

/// Implement `FastxReader` for FASTA reader.
impl<R: io::BufRead> FastxReader for fasta::Reader<R> {
    type Record = fasta::Record;

    fn read_next(&mut self, record: &mut Self::Record) -> io::Result<()> {
        fasta::FastaRead::read(self, record)
    }
}

/// Implement `FastxRecord` for FASTQ record.
impl FastxRecord for fastq::Record {
    fn new() -> Self {
        Self::new()
    }

    fn is_empty(&self) -> bool {
        self.is_empty()
    }

    fn name(&self) -> &str {
        self.id()
    }

    fn seq(&self) -> &[u8] {
        self.seq()
    }

    fn qual(&self) -> Option<&[u8]> {
        Some(self.qual())
    }

    fn write_simple<W: io::Write>(&self, writer: W) -> io::Result<()> {
        write_fastq(writer, self.id(), self.seq(), self.qual())
    }
}

/// Implement `FastxReader` for FASTQ reader.
impl<R: io::BufRead> FastxReader for fastq::Reader<R> {
    type Record = fastq::Record;

    fn read_next(&mut self, record: &mut Self::Record) -> io::Result<()> {
        fastq::FastqRead::read(self, record).map_err(|e| match e {
            fastq::Error::FileOpen { source, .. } => source,
            fastq::Error::ReadError(err) => err,
            _ => io::Error::new(io::ErrorKind::InvalidData, "Failed to process FASTQ file"),
        })
    }
}

/// Sequence file format.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Format {
    Fasta,
    Fastq,
}

impl Format {
    /// Extension of the segment files.
    pub fn ext(self) -> &'static str {
        match self {
            Self::Fasta => ".fa",
            Self::Fastq => ".fq",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Fasta => "fasta",
            Self::Fastq => "fastq",
        }
    }
}

/// Up to this number of header lines can precede the first record.
const MAX_HEADER_LINES: usize = 10;

/// Detects format by the first record symbol (`>` or `@`), skipping up to 10 header lines.
/// Returns None for an empty stream.
pub fn detect_format(stream: &mut impl BufRead) -> io::Result<Option<Format>> {
    let mut skipped = 0;
    loop {
        let buf = stream.fill_buf()?;
        if buf.is_empty() {
            return Ok(None);
        }
        match buf[0] {
            b'>' => return Ok(Some(Format::Fasta)),
            b'@' => return Ok(Some(Format::Fastq)),
            _ if skipped >= MAX_HEADER_LINES => return Err(io::Error::new(io::ErrorKind::InvalidData,
                "cannot determine record type")),
            _ => {
                let mut line = Vec::new();
                stream.read_until(b'\n', &mut line)?;
                skipped += 1;
            }
        }
    }
}

/// Opens a FASTA/FASTQ file (possibly gzip-compressed) and detects its format.
pub fn open_fastx(path: &Path) -> Result<(Option<Format>, Box<dyn BufRead + Send>), Error> {
    let mut stream = ext::sys::open(path).map_err(add_path!(path))?;
    let format = detect_format(&mut stream)
        .map_err(|e| error!(InvalidData, "Cannot parse reads file {}: {}", ext::fmt::path(path), e))?;
    Ok((format, stream))
}

/// Summary over the first several records of an input file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReadsSample {
    pub format: Format,
    /// Number of records examined.
    pub count: usize,
    /// Shortest and longest examined reads of at least 20 bp.
    pub min_len: Option<usize>,
    pub max_len: Option<usize>,
    /// Number of examined reads shorter than 20 bp.
    pub short_reads: usize,
}

/// Reads shorter than this produce a warning.
pub const SHORT_READ: usize = 20;

fn sample_records<R: FastxReader>(mut reader: R, format: Format, colorspace: bool, n: usize)
    -> io::Result<ReadsSample>
{
    let mut sample = ReadsSample {
        format,
        count: 0,
        min_len: None,
        max_len: None,
        short_reads: 0,
    };
    let mut record = R::Record::new();
    while sample.count < n {
        reader.read_next(&mut record)?;
        if record.is_empty() {
            break;
        }
        sample.count += 1;
        // Colorspace reads start with the primer base.
        let len = record.seq().len().saturating_sub(usize::from(colorspace));
        if len < SHORT_READ {
            sample.short_reads += 1;
        } else {
            sample.min_len = Some(sample.min_len.map_or(len, |m| min(m, len)));
            sample.max_len = Some(sample.max_len.map_or(len, |m| max(m, len)));
        }
    }
    Ok(sample)
}

/// Examines the first `n` records of a reads file: detects format and warns about short reads.
pub fn sample_reads(path: &Path, colorspace: bool, n: usize) -> Result<ReadsSample, Error> {
    let (format, stream) = open_fastx(path)?;
    let format = format.ok_or_else(|| error!(InvalidData, "Reads file {} is empty", ext::fmt::path(path)))?;
    let sample = match format {
        Format::Fasta => sample_records(fasta::Reader::from_bufread(stream), format, colorspace, n),
        Format::Fastq => sample_records(fastq::Reader::from_bufread(stream), format, colorspace, n),
    }.map_err(add_path!(path))?;
    if sample.short_reads > 0 {
        log::warn!("Found a read < {} bp in {}", SHORT_READ, ext::fmt::path(path));
    }
    Ok(sample)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn detect() {
        assert_eq!(detect_format(&mut &b"@r1\nACGT\n+\nIIII\n"[..]).unwrap(), Some(Format::Fastq));
        assert_eq!(detect_format(&mut &b"# comment\n>r1\nACGT\n"[..]).unwrap(), Some(Format::Fasta));
        assert_eq!(detect_format(&mut &b""[..]).unwrap(), None);
        let garbage = "x\n".repeat(20);
        assert!(detect_format(&mut garbage.as_bytes()).is_err());
    }

    #[test]
    fn sample_gzipped_fastq() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reads.fq.gz");
        let mut enc = flate2::write::GzEncoder::new(std::fs::File::create(&path).unwrap(),
            flate2::Compression::default());
        let long = "A".repeat(50);
        let longer = "C".repeat(75);
        write!(enc, "@a\n{long}\n+\n{q1}\n@b\nACGT\n+\nIIII\n@c\n{longer}\n+\n{q2}\n",
            q1 = "I".repeat(50), q2 = "I".repeat(75)).unwrap();
        enc.finish().unwrap();

        let sample = sample_reads(&path, false, 4).unwrap();
        assert_eq!(sample.format, Format::Fastq);
        assert_eq!(sample.count, 3);
        assert_eq!(sample.short_reads, 1);
        assert_eq!(sample.min_len, Some(50));
        assert_eq!(sample.max_len, Some(75));
    }

    #[test]
    fn sample_first_records_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reads.fa");
        let mut contents = String::new();
        for i in 0..10 {
            contents.push_str(&format!(">r{}\n{}\n", i, "G".repeat(30 + i)));
        }
        std::fs::write(&path, contents).unwrap();
        let sample = sample_reads(&path, true, 4).unwrap();
        assert_eq!(sample.format, Format::Fasta);
        assert_eq!(sample.count, 4);
        assert_eq!(sample.min_len, Some(29));
        assert_eq!(sample.max_len, Some(32));
    }
}
