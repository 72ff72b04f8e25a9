//! Splitting reads into fixed-length position-tagged segments.

use std::{
    cmp::min,
    io::{self, Write, BufRead},
    path::{Path, PathBuf},
    os::unix::ffi::OsStrExt,
};
use bio::io::{fasta, fastq};
use crate::{
    Error,
    err::{add_path, error},
    ext,
    pipeline::zio::{Zipper, ZReader, ZWriter},
};
use super::{
    colorspace,
    fastx::{self, FastxRecord, FastxReader, Format},
};

/// The last segment is kept separately if it is at least this long (or `seg_len - 2`, whichever is smaller).
/// Shorter remainders are merged into the previous segment.
const MIN_LAST_SEGMENT: usize = 20;

/// Returns segment boundaries `[0, L, 2L, ..., N]` for a read of length `read_len` and segment length `seg_len`.
/// Segment `i` spans `offsets[i]..offsets[i + 1]`.
pub fn segment_offsets(read_len: usize, seg_len: usize) -> Vec<usize> {
    assert!(seg_len > 0, "Segment length must be positive");
    let mut count = read_len / seg_len;
    let mut offsets: Vec<usize> = (0..=count).map(|i| i * seg_len).collect();
    let rem = read_len % seg_len;
    if rem > 0 && rem >= min(seg_len.saturating_sub(2), MIN_LAST_SEGMENT) {
        offsets.push(read_len);
        count += 1;
    } else if let Some(last) = offsets.last_mut() {
        *last = read_len;
    }
    if count <= 1 {
        vec![0, read_len]
    } else {
        offsets
    }
}

/// Number of segments for a read of length `read_len`.
pub fn num_segments(read_len: usize, seg_len: usize) -> usize {
    segment_offsets(read_len, seg_len).len() - 1
}

/// Longest segment for a read of length `read_len`.
pub fn max_segment_len(read_len: usize, seg_len: usize) -> usize {
    segment_offsets(read_len, seg_len).windows(2).map(|w| w[1] - w[0]).max().unwrap_or(0)
}

/// Segment record name: `<read>|<offset>:<index>:<count>`.
pub fn segment_name(read_name: &str, offset: usize, index: usize, count: usize) -> String {
    format!("{}|{}:{}:{}", read_name, offset, index, count)
}

/// Parses segment record name back into `(read name, offset, index, count)`.
pub fn parse_segment_name(name: &str) -> Option<(&str, usize, usize, usize)> {
    let (read, tag) = name.rsplit_once('|')?;
    let mut split = tag.split(':');
    let offset = split.next()?.parse().ok()?;
    let index = split.next()?.parse().ok()?;
    let count = split.next()?.parse().ok()?;
    if split.next().is_some() {
        return None;
    }
    Some((read, offset, index, count))
}

/// One segment of a read.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Segment {
    pub name: String,
    /// Segment sequence. For colorspace reads: leading basespace call followed by the colors.
    pub seq: Vec<u8>,
    pub qual: Option<Vec<u8>>,
}

/// Splits one read into segments.
/// For colorspace reads, `seq` must start with the primer base; qualities may contain an extra leading value.
/// Returns None if the colorspace read has an ambiguous color at one of the segment boundaries.
pub fn split_read(name: &str, seq: &[u8], qual: Option<&[u8]>, seg_len: usize, color: bool)
    -> Option<Vec<Segment>>
{
    let (decoded, colors) = if color {
        (colorspace::decode(seq), seq.get(1..).unwrap_or_default())
    } else {
        (Vec::new(), seq)
    };
    let read_len = colors.len();
    if read_len == 0 {
        return Some(Vec::new());
    }
    let qual = qual.map(|q| if color && q.len() == read_len + 1 { &q[1..] } else { q });

    let offsets = segment_offsets(read_len, seg_len);
    let count = offsets.len() - 1;
    if color && offsets[1..count].iter().any(|&off| !colorspace::is_valid_color(colors[off])) {
        return None;
    }
    Some(offsets.windows(2).enumerate().map(|(i, w)| {
        let (start, end) = (w[0], w[1]);
        let mut seg_seq = Vec::with_capacity(end - start + 1);
        if color {
            seg_seq.push(decoded[start]);
        }
        seg_seq.extend_from_slice(&colors[start..end]);
        Segment {
            name: segment_name(name, start, i, count),
            seq: seg_seq,
            qual: qual.map(|q| q[min(start, q.len())..min(end, q.len())].to_vec()),
        }
    }).collect())
}

impl Segment {
    pub fn write(&self, writer: impl Write) -> io::Result<()> {
        match &self.qual {
            Some(qual) => fastx::write_fastq(writer, &self.name, &self.seq, qual),
            None => fastx::write_fasta(writer, &self.name, &self.seq),
        }
    }
}

/// Segment files are named `<prefix>_seg<i><ext>`, `i` starting with 1.
pub fn segment_filename(prefix: &Path, index: usize, ext: &str) -> PathBuf {
    ext::sys::append_path(prefix, format!("_seg{}{}", index, ext))
}

/// Extension of the segment files: `.fq`/`.fa`, with `.z` if an external compressor is used.
pub fn segment_ext(format: Format, zipped: bool) -> String {
    format!("{}{}", format.ext(), if zipped { ".z" } else { "" })
}

/// Finds existing segment files `<prefix>_seg*<ext>`, sorted by the segment index.
pub fn existing_segment_files(prefix: &Path, ext: &str) -> Result<Vec<PathBuf>, Error> {
    let prefix_str = prefix.to_str().ok_or_else(|| Error::Utf8("path", prefix.as_os_str().as_bytes().to_vec()))?;
    let pattern = format!("{}_seg*{}", glob::Pattern::escape(prefix_str), ext);
    let mut files = Vec::new();
    for entry in glob::glob(&pattern).map_err(|e| error!(RuntimeError, "Invalid glob pattern {}: {}", pattern, e))? {
        let path = entry.map_err(|e| error!(RuntimeError, "Cannot list segment files: {}", e))?;
        let name = path.file_name().and_then(|s| s.to_str()).unwrap_or_default();
        let base = prefix.file_name().and_then(|s| s.to_str()).unwrap_or_default();
        let index = name.strip_prefix(base)
            .and_then(|s| s.strip_prefix("_seg"))
            .and_then(|s| s.strip_suffix(ext))
            .and_then(|s| s.parse::<usize>().ok());
        if let Some(index) = index {
            files.push((index, path));
        }
    }
    files.sort_unstable();
    Ok(files.into_iter().map(|(_, path)| path).collect())
}

/// Lazily opened segment outputs.
struct SegmentWriters<'a> {
    prefix: &'a Path,
    ext: String,
    zipper: Option<&'a Zipper>,
    writers: Vec<ZWriter>,
}

impl<'a> SegmentWriters<'a> {
    /// Makes sure that there are at least `count` output files.
    fn ensure(&mut self, count: usize) -> Result<(), Error> {
        while self.writers.len() < count {
            let path = segment_filename(self.prefix, self.writers.len() + 1, &self.ext);
            self.writers.push(ZWriter::create(&path, self.zipper)?);
        }
        Ok(())
    }

    fn finish(self) -> Result<Vec<PathBuf>, Error> {
        self.writers.into_iter().map(ZWriter::finish).collect()
    }
}

/// Splitting statistics.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SplitSummary {
    /// Segment files in the order of segment index.
    pub files: Vec<PathBuf>,
    pub reads: u64,
    /// Colorspace reads, skipped due to ambiguous colors at segment boundaries.
    pub skipped: u64,
}

fn split_records<R: FastxReader>(
    mut reader: R,
    writers: &mut SegmentWriters,
    seg_len: usize,
    color: bool,
) -> Result<(u64, u64), Error>
{
    let mut record = R::Record::new();
    let (mut reads, mut skipped) = (0, 0);
    loop {
        reader.read_next(&mut record).map_err(add_path!(!))?;
        if record.is_empty() {
            return Ok((reads, skipped));
        }
        reads += 1;
        let Some(segments) = split_read(record.name(), record.seq(), record.qual(), seg_len, color) else {
            skipped += 1;
            continue;
        };
        writers.ensure(segments.len())?;
        for (segment, writer) in segments.iter().zip(writers.writers.iter_mut()) {
            segment.write(writer).map_err(add_path!(!))?;
        }
    }
}

/// Splits all reads from the FASTA/FASTQ `stream` into segment files `<prefix>_seg<i><ext>`.
/// Segment files are created lazily, when a read with a new number of segments appears.
/// `source` is only used in messages.
pub fn split_stream<R: BufRead>(
    stream: &mut R,
    source: &str,
    prefix: &Path,
    seg_len: usize,
    color: bool,
    zipper: Option<&Zipper>,
) -> Result<SplitSummary, Error>
{
    let format = fastx::detect_format(stream)
        .map_err(|e| error!(InvalidData, "Cannot parse reads from {}: {}", source, e))?;
    let Some(format) = format else {
        log::warn!("No reads in {}", source);
        return Ok(SplitSummary::default());
    };
    let mut writers = SegmentWriters {
        prefix,
        ext: segment_ext(format, zipper.is_some()),
        zipper,
        writers: Vec::new(),
    };
    let (reads, skipped) = match format {
        Format::Fasta => split_records(fasta::Reader::from_bufread(stream), &mut writers, seg_len, color),
        Format::Fastq => split_records(fastq::Reader::from_bufread(stream), &mut writers, seg_len, color),
    }?;
    let files = writers.finish()?;
    if skipped > 0 {
        log::debug!("    {} reads skipped due to ambiguous colors at segment boundaries", skipped);
    }
    Ok(SplitSummary { files, reads, skipped })
}

/// Splits reads from a file (plain, gzip, or compressed by `zipper`) into segment files.
pub fn split_reads(
    reads: &Path,
    prefix: &Path,
    seg_len: usize,
    color: bool,
    zipper: Option<&Zipper>,
) -> Result<SplitSummary, Error>
{
    let mut stream = ZReader::open(reads, zipper)?;
    let summary = split_stream(&mut stream, &ext::fmt::path(reads), prefix, seg_len, color, zipper)?;
    stream.finish()?;
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn fixed_offsets() {
        assert_eq!(segment_offsets(50, 25), vec![0, 25, 50]);
        assert_eq!(segment_offsets(53, 25), vec![0, 25, 53]);
        assert_eq!(segment_offsets(70, 25), vec![0, 25, 50, 70]);
        assert_eq!(segment_offsets(69, 25), vec![0, 25, 69]);
        assert_eq!(segment_offsets(100, 25), vec![0, 25, 50, 75, 100]);
        // Short segment length: threshold is L - 2.
        assert_eq!(segment_offsets(38, 12), vec![0, 12, 24, 38]);
        assert_eq!(segment_offsets(34, 12), vec![0, 12, 24, 34]);
        assert_eq!(segment_offsets(33, 12), vec![0, 12, 33]);
    }

    #[test]
    fn whole_read_segment() {
        assert_eq!(segment_offsets(1, 25), vec![0, 1]);
        assert_eq!(segment_offsets(10, 25), vec![0, 10]);
        assert_eq!(segment_offsets(24, 25), vec![0, 24]);
        assert_eq!(segment_offsets(25, 25), vec![0, 25]);
        assert_eq!(segment_offsets(30, 25), vec![0, 30]);
    }

    #[test]
    fn segment_counts_follow_remainder() {
        for seg_len in [10, 16, 22, 25, 40] {
            for n in 1..300 {
                let offsets = segment_offsets(n, seg_len);
                assert_eq!(offsets[0], 0);
                assert_eq!(*offsets.last().unwrap(), n);
                assert!(offsets.windows(2).all(|w| w[0] < w[1]));
                let rem = n % seg_len;
                let expected = if rem > 0 && rem >= min(seg_len - 2, 20) { n / seg_len + 1 } else { n / seg_len };
                assert_eq!(offsets.len() - 1, expected.max(1), "n = {}, L = {}", n, seg_len);
            }
        }
        assert_eq!(max_segment_len(53, 25), 28);
        assert_eq!(max_segment_len(70, 25), 25);
    }

    #[test]
    fn names() {
        let name = segment_name("read/1", 25, 1, 2);
        assert_eq!(name, "read/1|25:1:2");
        assert_eq!(parse_segment_name(&name), Some(("read/1", 25, 1, 2)));
        assert_eq!(parse_segment_name("read"), None);
    }

    #[test]
    fn basespace_concatenation() {
        let seq: Vec<u8> = b"ACGTTGCAAC".iter().cycle().take(53).copied().collect();
        let qual: Vec<u8> = (0..53).map(|i| b'!' + (i % 40) as u8).collect();
        let segments = split_read("r", &seq, Some(&qual), 25, false).unwrap();
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].name, "r|0:0:2");
        assert_eq!(segments[1].name, "r|25:1:2");
        assert_eq!(segments[1].seq.len(), 28);
        let joined: Vec<u8> = segments.iter().flat_map(|s| s.seq.iter().copied()).collect();
        assert_eq!(joined, seq);
        let joined_qual: Vec<u8> = segments.iter().flat_map(|s| s.qual.clone().unwrap()).collect();
        assert_eq!(joined_qual, qual);
    }

    #[test]
    fn colorspace_concatenation() {
        let bases: Vec<u8> = b"TACGGTCATTGACCA".iter().cycle().take(61).copied().collect();
        // First base serves as the primer.
        let read = colorspace::encode(&bases);
        assert_eq!(read.len(), 61);
        let segments = split_read("c", &read, None, 25, true).unwrap();
        // 60 colors: 25 + 35.
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[1].name, "c|25:1:2");
        let mut joined = Vec::new();
        for segment in &segments {
            let decoded = colorspace::decode(&segment.seq);
            joined.extend_from_slice(&decoded[1..]);
        }
        assert_eq!(joined, bases[1..].to_vec());
    }

    #[test]
    fn colorspace_boundary_ambiguity() {
        let mut read = b"T".to_vec();
        read.extend(std::iter::repeat(b'0').take(50));
        // Color at the segment boundary (offset 25).
        read[1 + 25] = b'.';
        assert_eq!(split_read("c", &read, None, 25, true), None);
        // Ambiguity inside a segment is allowed.
        read[1 + 25] = b'0';
        read[1 + 10] = b'.';
        assert_eq!(split_read("c", &read, None, 25, true).unwrap().len(), 2);
    }

    #[test]
    fn split_file_lazily() {
        let dir = tempfile::tempdir().unwrap();
        let reads = dir.path().join("left_kept_reads.fq");
        let mut contents = String::new();
        for (i, len) in [30, 50, 53, 75].into_iter().enumerate() {
            contents.push_str(&format!("@r{}\n{}\n+\n{}\n", i, "A".repeat(len), "I".repeat(len)));
        }
        fs::write(&reads, contents).unwrap();
        let prefix = dir.path().join("left_kept_reads");
        let summary = split_reads(&reads, &prefix, 25, false, None).unwrap();
        assert_eq!(summary.reads, 4);
        assert_eq!(summary.files.len(), 3);
        let seg1 = fs::read_to_string(segment_filename(&prefix, 1, ".fq")).unwrap();
        assert!(seg1.starts_with("@r0|0:0:1\n"));
        assert_eq!(seg1.lines().count(), 16);
        let seg3 = fs::read_to_string(segment_filename(&prefix, 3, ".fq")).unwrap();
        assert_eq!(seg3, format!("@r3|50:2:3\n{}\n+\n{}\n", "A".repeat(25), "I".repeat(25)));

        let existing = existing_segment_files(&prefix, ".fq").unwrap();
        assert_eq!(existing, summary.files);
    }

    #[test]
    fn existing_sorted_numerically() {
        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path().join("left_kept_reads");
        for i in [1, 2, 10, 3] {
            fs::write(segment_filename(&prefix, i, ".fa"), ">a\nACGT\n").unwrap();
        }
        fs::write(dir.path().join("left_kept_reads_seg1.fq"), "").unwrap();
        let files = existing_segment_files(&prefix, ".fa").unwrap();
        let names: Vec<_> = files.iter().map(|p| p.file_name().unwrap().to_str().unwrap().to_owned()).collect();
        assert_eq!(names, ["left_kept_reads_seg1.fa", "left_kept_reads_seg2.fa",
            "left_kept_reads_seg3.fa", "left_kept_reads_seg10.fa"]);
    }
}
