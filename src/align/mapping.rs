//! Short-read mapping: optional input decoding, aligner, and `fix_map_ordering`,
//! followed by `map2gtf` for the transcriptome mapping.

use std::path::{Path, PathBuf};
use crate::{
    Error,
    ext,
    pipeline::{
        Step, Output,
        fifo::{self, FifoCompressor},
    },
};
use super::{
    Context,
    tools::MapKind,
};

/// Where the reads come from.
pub enum ReadSource {
    /// FASTA/FASTQ file (possibly compressed by the zipper), or BAM file with reads.
    File(PathBuf),
    /// Output of another program. `name` is used for the log file and messages.
    Stream { step: Step, name: PathBuf },
}

impl ReadSource {
    fn name(&self) -> &Path {
        match self {
            Self::File(path) => path,
            Self::Stream { name, .. } => name,
        }
    }
}

/// Parameters of one mapping run.
pub struct MapJob<'a> {
    pub kind: MapKind,
    pub index: &'a Path,
    pub header: &'a Path,
    pub reads: ReadSource,
    /// Mapped reads are written into `<mapped>.bam`.
    pub mapped: PathBuf,
    /// Unmapped reads are written into `<unmapped>.bam` (`.bam.z` if compressed through a named pipe).
    pub unmapped: Option<PathBuf>,
    /// Reads with too many hits (prefilter only).
    pub multihits: Option<&'a Path>,
    /// Genome header and the list of transcripts, needed to convert transcriptome coordinates.
    pub transcripts: Option<(&'a Path, PathBuf)>,
    /// Progress suffix of the message, such as `(2/3)`.
    pub progress: String,
}

/// Output of the mapping.
#[derive(Clone, Debug)]
pub struct Mapped {
    pub mapped: PathBuf,
    pub unmapped: Option<PathBuf>,
}

fn has_ext(path: &Path, ext: &str) -> bool {
    path.to_str().map(|s| s.to_ascii_lowercase().ends_with(ext)).unwrap_or(false)
}

/// Maps reads and returns paths to the mapped and unmapped reads.
/// If the current stage is skipped, only the paths are returned.
pub fn map_reads(ctx: &Context, job: MapJob) -> Result<Mapped, Error> {
    let config = ctx.config;
    let use_fifo = config.use_fifo() && job.unmapped.is_some();
    let mapped = ext::sys::append_path(&job.mapped, ".bam");
    let unmapped = job.unmapped.as_ref()
        .map(|prefix| ext::sys::append_path(prefix, if use_fifo { ".bam.z" } else { ".bam" }));
    let res = Mapped { mapped: mapped.clone(), unmapped: unmapped.clone() };
    if ctx.checkpoint.skipping() {
        return Ok(res);
    }

    let basename = ext::sys::file_basename(job.reads.name());
    let aligner_name = if config.bowtie2() { "Bowtie2" } else { "Bowtie" };
    let index_name = job.index.file_name().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
    log::info!("Mapping {} to {} {} with {} {}", basename,
        if job.kind == MapKind::Transcriptome { "transcriptome" } else { "genome" },
        index_name, aligner_name, job.progress);

    let mut pipeline = ctx.pipeline();
    let input = match job.reads {
        ReadSource::Stream { step, .. } => {
            pipeline.push(step);
            None
        }
        ReadSource::File(path) => {
            let zipped = ctx.tools.zipper.is_some() && has_ext(&path, ".z");
            let bam = has_ext(&path, ".bam") || has_ext(&path, ".bam.z");
            match (zipped, bam) {
                (false, false) => Some(path),
                (false, true) => {
                    pipeline.push(ctx.tools.bam2fastx(config, &path));
                    None
                }
                (true, _) => {
                    if let Some(unzip) = ctx.tools.unzip() {
                        pipeline.push(unzip.stdin(crate::pipeline::Input::File(path)));
                    }
                    if bam {
                        pipeline.push(ctx.tools.bam2fastx(config, Path::new("-")));
                    }
                    None
                }
            }
        }
    };
    let bowtie_log = ctx.logs_dir.join(format!("bowtie.{}.log", basename));
    pipeline.push(ctx.tools.aligner(config, job.kind, job.index, input.as_deref(), job.multihits,
        ctx.run.segment_length).log(bowtie_log));

    let compressor = match (&unmapped, use_fifo, &ctx.tools.zipper) {
        (Some(output), true, Some(zipper)) => {
            let fifo = ext::sys::append_path(job.unmapped.as_deref().unwrap_or(output), ".fifo");
            ctx.checkpoint.run_log().record_command(&format!("{} < {} > {} &",
                ext::fmt::command(&zipper.compress()), ext::fmt::path(&fifo), ext::fmt::path(output)))?;
            Some(FifoCompressor::start(zipper, &fifo, output, Some(&ctx.logs_dir.join("fifo_compress.log")))?)
        }
        _ => None,
    };
    let fixer_unmapped = compressor.as_ref().map(|c| c.fifo().to_owned()).or_else(|| unmapped.clone());
    let fixer_log = ctx.logs_dir.join("fix_map_ordering.log");
    pipeline.push(ctx.tools.fix_map_ordering(config, job.kind, job.header, &mapped, fixer_unmapped.as_deref(),
        job.multihits).log(&fixer_log));

    if let Some((genome_header, transcripts)) = &job.transcripts {
        pipeline.push(ctx.tools.map2gtf(genome_header, transcripts, &mapped)
            .stdout(Output::File(ctx.logs_dir.join(format!("m2g_{}.out", basename))))
            .log(ctx.logs_dir.join(format!("m2g_{}.err", basename))));
    }

    match compressor {
        Some(compressor) => fifo::run_with_fifo(pipeline, compressor)?,
        None => pipeline.run()?,
    }
    Ok(res)
}
