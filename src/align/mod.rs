//! Alignment round coordinator: whole-read mapping, segment mapping, junction discovery,
//! junction index construction, mapping to the junction index and joining of segment hits.

pub mod config;
pub mod tools;
pub mod candidates;
pub mod prep;
pub mod index;
pub mod mapping;
pub mod reports;
#[cfg(test)]
mod stub_tools;

use std::{
    cmp::max,
    fs,
    io::BufReader,
    path::{Path, PathBuf},
    time::Instant,
};
use crate::{
    Error,
    err::{add_path, error},
    ext,
    pipeline::{Pipeline, Input, Output},
    seq::{
        fastx::{self, Format},
        segment,
    },
    stage::{Checkpoint, Stage},
};
use self::{
    candidates::{Candidates, CandidateSet, Kind, Source},
    config::{Config, RunParams},
    index::{Genome, Transcriptome},
    mapping::{MapJob, ReadSource},
    prep::{Inputs, PrepInfo, Prefiltered, SIDES},
    tools::{MapKind, Tools},
};

/// Run parameters and derived values are saved into `<out>/logs/PARAMS_FILE`.
pub const PARAMS_FILE: &str = "params.json";
/// Mirror of the log messages in `<out>/logs/`.
pub const LOG_FILE: &str = "splicemap.log";
/// Number of records, examined in each input file.
const SAMPLE_READS: usize = 4;

/// Everything a pipeline step needs: configuration, external programs, directories and the current stage.
pub struct Context<'a> {
    pub config: &'a Config,
    pub tools: &'a Tools,
    pub checkpoint: Checkpoint,
    pub run: RunParams,
    pub out_dir: PathBuf,
    pub logs_dir: PathBuf,
    pub tmp_dir: PathBuf,
    /// Command line of the run, written into the SAM headers.
    pub command_line: String,
}

impl<'a> Context<'a> {
    /// Creates output directories and the checkpoint log.
    pub fn new(config: &'a Config, tools: &'a Tools, command_line: String, resume: Stage) -> Result<Self, Error> {
        let out_dir = config.out_dir.clone();
        let logs_dir = config.logs_dir();
        let tmp_dir = config.tmp_dir();
        ext::sys::mkdir(&out_dir)?;
        ext::sys::mkdir(&logs_dir)?;
        ext::sys::mkdir(&tmp_dir)?;
        ext::logfile::set_log_file(&logs_dir.join(LOG_FILE))?;
        let checkpoint = Checkpoint::create(&logs_dir, &command_line, resume)?;
        Ok(Self {
            config,
            tools,
            checkpoint,
            run: config.initial_run_params(),
            out_dir, logs_dir, tmp_dir, command_line,
        })
    }

    /// Arguments, shared by all helper programs.
    pub fn common_args(&self) -> Vec<String> {
        self.config.helper_args(&self.run)
    }

    /// New pipeline, recorded in the checkpoint log.
    pub fn pipeline(&self) -> Pipeline {
        Pipeline::recorded(self.checkpoint.run_log())
    }

    /// Moves to `stage`, unless the run is already there.
    fn enter(&mut self, stage: Stage) -> Result<(), Error> {
        if self.checkpoint.current() < stage {
            self.checkpoint.advance(stage)?;
        }
        Ok(())
    }
}

/// Number and lengths of the read segments, and the junction search strategies that follow from them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SegmentPlan {
    pub read_len: u32,
    /// Segment length, equal to the read length if the reads are not split.
    pub segment_length: u32,
    pub num_segments: usize,
    /// Longest segment: reference span on either side of the candidate junctions.
    pub max_seg_len: usize,
    pub coverage_search: bool,
    pub closure_search: bool,
}

impl SegmentPlan {
    /// Reads with fewer than 3 segments need coverage search (unless explicitly disabled).
    /// With 3 or more segments, only the segment search is used, unless other searches are explicitly enabled.
    pub fn new(read_len: u32, seg_len: u32, coverage_search: Option<bool>, closure_search: Option<bool>) -> Self {
        let offsets = segment::segment_offsets(read_len as usize, seg_len as usize);
        let num_segments = offsets.len() - 1;
        if num_segments < 3 {
            let single = num_segments == 1;
            Self {
                read_len,
                segment_length: if single { read_len } else { seg_len },
                num_segments,
                max_seg_len: if single { read_len as usize } else { segment::max_segment_len(read_len as usize,
                    seg_len as usize) },
                coverage_search: coverage_search != Some(false),
                closure_search: closure_search.unwrap_or(false),
            }
        } else {
            Self {
                read_len,
                segment_length: seg_len,
                num_segments,
                max_seg_len: segment::max_segment_len(read_len as usize, seg_len as usize),
                coverage_search: coverage_search == Some(true),
                closure_search: closure_search == Some(true),
            }
        }
    }

    fn to_json(&self) -> json::JsonValue {
        json::object!{
            read_length: self.read_len,
            segment_length: self.segment_length,
            segments: self.num_segments,
            max_segment_length: self.max_seg_len,
            coverage_search: self.coverage_search,
            closure_search: self.closure_search,
        }
    }
}

/// Seed length: explicit value, raised to at least the shortest observed read,
/// or the longest observed read otherwise.
pub fn seed_length(explicit: Option<u32>, info: &PrepInfo) -> u32 {
    match explicit {
        Some(len) => max(len, info.min_read_len()),
        None => info.max_read_len(),
    }
}

/// First-pass mappings of one side.
#[derive(Clone, Debug)]
struct SideMaps {
    /// Whole-read mappings.
    unspliced: PathBuf,
    /// Segment mappings (or whole-read mappings, if the reads were not split).
    seg_maps: Vec<PathBuf>,
    /// Segments without any hits (or unmapped whole reads).
    unmapped_segs: Vec<PathBuf>,
    /// Segment files (or unmapped whole reads).
    segs: Vec<PathBuf>,
    /// True if the unmapped reads were split into several segments.
    split: bool,
}

impl SideMaps {
    /// Reads are not split: whole-read mappings and unmapped reads take the place of the segments.
    fn unsplit(unspliced: PathBuf, unmapped: PathBuf) -> Self {
        Self {
            seg_maps: vec![unspliced.clone()],
            unmapped_segs: vec![unmapped.clone()],
            segs: vec![unmapped],
            unspliced,
            split: false,
        }
    }
}

/// Removes segments without hits after the junction search.
/// Unmapped whole reads are kept, as they are mapped against the junction index later.
fn remove_unmapped_segments(maps: &[Option<SideMaps>]) -> Result<(), Error> {
    for side_maps in maps.iter().flatten().filter(|side_maps| side_maps.split) {
        for unmapped_seg in &side_maps.unmapped_segs {
            ext::sys::remove_with_index(unmapped_seg)?;
        }
    }
    Ok(())
}

/// Converts unmapped reads (BAM, possibly compressed) into segment files `<prefix>_seg<i>.<ext>`.
/// Existing segment files are reused if the stage is skipped.
fn split_unmapped(ctx: &Context, unmapped: &Path, prefix: &Path) -> Result<Vec<PathBuf>, Error> {
    let zipper = ctx.tools.zipper.as_ref();
    if ctx.checkpoint.skipping() {
        for format in [Format::Fastq, Format::Fasta] {
            let files = segment::existing_segment_files(prefix, &segment::segment_ext(format, zipper.is_some()))?;
            if !files.is_empty() {
                return Ok(files);
            }
        }
    }

    log::info!("Splitting reads {} into {} bp segments", ext::sys::file_basename(unmapped), ctx.run.segment_length);
    let mut pipeline = ctx.pipeline();
    let zipped = zipper.is_some() && unmapped.extension().map(|ext| ext == "z").unwrap_or(false);
    match ctx.tools.unzip().filter(|_| zipped) {
        Some(unzip) => {
            pipeline.push(unzip.stdin(Input::File(unmapped.to_owned())));
            pipeline.push(ctx.tools.bam2fastx(ctx.config, Path::new("-")).stdout(Output::Pipe));
        }
        None => {
            pipeline.push(ctx.tools.bam2fastx(ctx.config, unmapped).stdout(Output::Pipe));
        }
    }
    let mut running = pipeline.spawn()?;
    let stdout = running.take_stdout()
        .ok_or_else(|| error!(RuntimeError, "Cannot read converted reads {}", ext::fmt::path(unmapped)))?;
    let mut reader = BufReader::new(stdout);
    let summary = segment::split_stream(&mut reader, &ext::fmt::path(unmapped), prefix,
        ctx.run.segment_length as usize, ctx.config.color, zipper)?;
    drop(reader);
    running.wait()?;
    Ok(summary.files)
}

/// Splits unmapped reads into segment files. Returns None if the reads are mapped as a whole:
/// there is a single segment per read, or no read could be split.
fn split_side(ctx: &Context, plan: &SegmentPlan, unmapped: &Path, prefix: &Path)
    -> Result<Option<Vec<PathBuf>>, Error>
{
    if plan.num_segments <= 1 {
        return Ok(None);
    }
    let segs = split_unmapped(ctx, unmapped, prefix)?;
    if segs.is_empty() {
        log::warn!("No segments produced from {}, reads are mapped as a whole", ext::sys::file_basename(unmapped));
        return Ok(None);
    }
    Ok(Some(segs))
}

/// Maps whole reads against the genome (or recovers prefiltered mappings),
/// then splits unmapped reads into segments and maps them as well.
fn map_side(
    ctx: &mut Context,
    genome: &Genome,
    plan: &SegmentPlan,
    side: usize,
    reads: &Path,
    prefiltered: Option<&Prefiltered>,
) -> Result<(SideMaps, bool), Error>
{
    let base = ext::sys::file_basename(reads);
    let unspliced_prefix = ctx.tmp_dir.join(format!("{}.mapped", base));
    let unmapped_prefix = ctx.tmp_dir.join(format!("{}_unmapped", base));
    let (unspliced, unmapped) = match prefiltered {
        Some(prefiltered) => prep::recover_prefiltered(ctx, genome, side, prefiltered, reads,
            &ext::sys::append_path(&unspliced_prefix, ".bam"), &unmapped_prefix)?,
        None => {
            let job = MapJob {
                kind: MapKind::Reads,
                index: &genome.index,
                header: &genome.header,
                reads: ReadSource::File(reads.to_owned()),
                mapped: unspliced_prefix,
                unmapped: Some(unmapped_prefix),
                multihits: None,
                transcripts: None,
                progress: String::new(),
            };
            let mapped = mapping::map_reads(ctx, job)?;
            let unmapped = mapped.unmapped
                .ok_or_else(|| error!(RuntimeError, "No unmapped reads produced for {}", base))?;
            (mapped.mapped, unmapped)
        }
    };

    let have_ium = ext::sys::nonzero_file(&unmapped)?;
    ctx.enter(Stage::MapSegments)?;
    let segs = if have_ium {
        split_side(ctx, plan, &unmapped, &ctx.tmp_dir.join(&base))?
    } else {
        None
    };
    let Some(segs) = segs else {
        return Ok((SideMaps::unsplit(unspliced, unmapped), have_ium));
    };
    let mut seg_maps = Vec::with_capacity(segs.len());
    let mut unmapped_segs = Vec::with_capacity(segs.len());
    for (i, seg) in segs.iter().enumerate() {
        let seg_base = ext::sys::file_basename(seg);
        let job = MapJob {
            kind: MapKind::Segments,
            index: &genome.index,
            header: &genome.header,
            reads: ReadSource::File(seg.clone()),
            mapped: ctx.tmp_dir.join(&seg_base),
            unmapped: Some(ctx.tmp_dir.join(format!("{}_unmapped", seg_base))),
            multihits: None,
            transcripts: None,
            progress: format!("({}/{})", i + 1, segs.len()),
        };
        let mapped = mapping::map_reads(ctx, job)?;
        seg_maps.push(mapped.mapped);
        unmapped_segs.extend(mapped.unmapped);
    }
    Ok((SideMaps { unspliced, seg_maps, unmapped_segs, segs, split: true }, have_ium))
}

/// Segment-based junction, insertion, deletion and fusion search.
fn junctions_from_segments(
    ctx: &Context,
    genome: &Genome,
    prepared: &[PathBuf],
    maps: &[Option<SideMaps>],
) -> Result<[PathBuf; 4], Error>
{
    if maps.first().map(Option::is_none).unwrap_or(true) {
        return Err(error!(RuntimeError, "Segment search requires left mappings"));
    }
    let outputs = ["segment.juncs", "segment.insertions", "segment.deletions", "segment.fusions"]
        .map(|name| ctx.tmp_dir.join(name));
    if ctx.checkpoint.skipping() && outputs[0].exists() {
        return Ok(outputs);
    }
    log::info!("Searching for junctions via segment mapping");
    if ctx.run.coverage_search {
        log::info!("    Coverage search is turned on, making this step very slow");
        log::info!("    Please try running again with --no-coverage-search if this step takes too much time or memory");
    }

    let mut unmapped_segs = Vec::new();
    let mut sides: Vec<(&Path, &Path, &[PathBuf])> = Vec::with_capacity(2);
    for (side_maps, reads) in maps.iter().zip(prepared) {
        if let Some(side_maps) = side_maps {
            unmapped_segs.extend(side_maps.unmapped_segs.iter().cloned());
            sides.push((reads.as_path(), side_maps.unspliced.as_path(), side_maps.seg_maps.as_slice()));
        }
    }
    ctx.pipeline()
        .then(ctx.tools.segment_juncs(&ctx.common_args(), &genome.header, &unmapped_segs, &genome.fasta,
            &outputs, &sides).log(ctx.logs_dir.join("segment_juncs.log")))
        .run()?;
    Ok(outputs)
}

/// Mate-pair closure junction search. Returns the junctions file.
fn junctions_from_closures(ctx: &Context, genome: &Genome, left: &SideMaps, right: &SideMaps)
    -> Result<PathBuf, Error>
{
    log::info!("Searching for junctions via mate-pair closures");
    let juncs_out = ctx.tmp_dir.join("closure.juncs");
    let fusions_out = ctx.tmp_dir.join("closure.fusions");
    let side_maps = |maps: &SideMaps| -> Vec<PathBuf> {
        std::iter::once(maps.unspliced.clone()).chain(maps.seg_maps.last().cloned()).collect()
    };
    ctx.pipeline()
        .then(ctx.tools.closure_juncs(&ctx.common_args(), &genome.header, &juncs_out, &fusions_out, &genome.fasta,
            &side_maps(left), &side_maps(right)).log(ctx.logs_dir.join("closure.log")))
        .run()?;
    Ok(juncs_out)
}

/// Joins contiguous and spliced segment hits into full-length alignments.
fn join_segments(
    ctx: &Context,
    genome: &Genome,
    reads: &Path,
    candidates: &CandidateSet,
    contig_maps: &[PathBuf],
    spliced_maps: &[PathBuf],
    out: &Path,
) -> Result<(), Error>
{
    if ctx.checkpoint.skipping() {
        return Ok(());
    }
    let log_name = if contig_maps.len() > 1 {
        log::info!("Joining segment hits");
        "long_spanning_reads.segs.log"
    } else {
        log::info!("Processing bowtie hits");
        "long_spanning_reads.log"
    };
    ctx.pipeline()
        .then(ctx.tools.long_spanning_reads(ctx.config, &ctx.common_args(), &genome.header, &genome.fasta, reads,
            &candidates.args(), out, contig_maps, spliced_maps).log(ctx.logs_dir.join(log_name)))
        .run()
}

/// Maps reads against the transcriptome, converting hits into genome coordinates.
/// Returns mapped and unmapped reads for each side (None for sides without reads).
fn map_to_transcriptome(
    ctx: &Context,
    genome: &Genome,
    transcriptome: &Transcriptome,
    reads: &[PathBuf],
) -> Result<Vec<Option<mapping::Mapped>>, Error>
{
    index::build_transcriptome(ctx, &genome.fasta, transcriptome)?;
    let header = index::generate_header(ctx, &transcriptome.index, None)?;
    let transcripts = ext::sys::append_path(&transcriptome.index, ".fa.tlst");
    let mut res = Vec::with_capacity(reads.len());
    for side_reads in reads {
        if ext::sys::file_size(side_reads) < 25 {
            res.push(None);
            continue;
        }
        let base = ext::sys::file_basename(side_reads);
        let job = MapJob {
            kind: MapKind::Transcriptome,
            index: &transcriptome.index,
            header: &header,
            reads: ReadSource::File(side_reads.clone()),
            mapped: ctx.tmp_dir.join(format!("{}.m2g", base)),
            unmapped: Some(ctx.tmp_dir.join(format!("{}.m2g_um", base))),
            multihits: None,
            transcripts: Some((&genome.header, transcripts.clone())),
            progress: String::new(),
        };
        res.push(Some(mapping::map_reads(ctx, job)?));
    }
    Ok(res)
}

/// Two-pass spliced alignment of the prepared reads. Returns final mappings for each side.
#[allow(clippy::too_many_arguments)]
fn spliced_alignment(
    ctx: &mut Context,
    genome: &Genome,
    transcriptome: Option<&Transcriptome>,
    prepared: &[PathBuf],
    plan: &SegmentPlan,
    mut candidates: Candidates,
    prefiltered: &[Prefiltered],
) -> Result<Vec<Vec<PathBuf>>, Error>
{
    let n = prepared.len();
    ctx.checkpoint.advance(Stage::MapStart)?;
    let mut m2g_maps: Vec<Option<PathBuf>> = vec![None; n];
    let mut initial: Vec<Option<PathBuf>> = prepared.iter().cloned().map(Some).collect();
    if let Some(transcriptome) = transcriptome {
        let mapped = map_to_transcriptome(ctx, genome, transcriptome, prepared)?;
        m2g_maps = mapped.iter().map(|m| m.as_ref().map(|m| m.mapped.clone())).collect();
        initial = mapped.into_iter().map(|m| m.and_then(|m| m.unmapped)).collect();
        let only_transcriptome: Vec<Vec<PathBuf>> = m2g_maps.iter()
            .map(|m| m.iter().cloned().collect())
            .collect();
        if ctx.config.transcriptome_only || !initial[0].as_ref().map(|path| path.exists()).unwrap_or(false) {
            return Ok(only_transcriptome);
        }
        let mut any_unmapped = false;
        for path in initial.iter().flatten() {
            any_unmapped |= ext::sys::nonzero_file(path)?;
        }
        if !any_unmapped {
            return Ok(only_transcriptome);
        }
        if ctx.checkpoint.active() {
            log::info!("Resuming pipeline with unmapped reads");
        }
    }

    let mut maps: Vec<Option<SideMaps>> = vec![None; n];
    let mut have_left_ium = false;
    for (i, side_reads) in initial.iter().enumerate() {
        let Some(side_reads) = side_reads else { continue };
        if !ext::sys::nonzero_file(side_reads)? {
            continue;
        }
        let (side_maps, have_ium) = map_side(ctx, genome, plan, i, side_reads, prefiltered.get(i))?;
        if i == 0 {
            have_left_ium = have_ium;
        }
        maps[i] = Some(side_maps);
    }
    ctx.enter(Stage::MapSegments)?;

    let config = ctx.config;
    if config.novel_juncs && have_left_ium {
        ctx.enter(Stage::FindJuncs)?;
        let outputs = junctions_from_segments(ctx, genome, prepared, &maps)?;
        if !config.keep_tmp {
            remove_unmapped_segments(&maps)?;
        }
        candidates.add_segment_search(&outputs, config.novel_indels, config.novel_fusions);

        if ctx.checkpoint.active() && ctx.run.closure_search {
            if let (Some(Some(left)), Some(Some(right))) = (maps.get(0), maps.get(1)) {
                let juncs = junctions_from_closures(ctx, genome, left, right)?;
                candidates.add_nonempty(Kind::Junctions, Source::Closure, &juncs);
            }
        }
    }

    let candidates = candidates.finish();
    ctx.enter(Stage::JuncsDb)?;
    let juncs_index = if candidates.needs_index() {
        let prefix = index::build_juncs_index(ctx, genome, &candidates, plan.max_seg_len)?;
        let header = index::generate_header(ctx, &prefix, None)?;
        Some((prefix, header))
    } else {
        None
    };

    ctx.enter(Stage::Map2Juncs)?;
    let mut res = Vec::with_capacity(n);
    for (i, side_reads) in initial.iter().enumerate() {
        let mut final_maps = Vec::new();
        let Some(side_reads) = side_reads else {
            res.push(final_maps);
            continue;
        };
        let candidates_bam = ctx.tmp_dir.join(format!("{}.candidates.bam", ext::sys::file_basename(side_reads)));
        let side_maps = maps[i].as_ref();
        let have_reads = ext::sys::nonzero_file(side_reads)?;
        // Without candidates, first-pass mappings are used as they are.
        if let (Some(side_maps), Some((prefix, header))) = (side_maps.filter(|_| have_reads), &juncs_index) {
            let mut spliced_maps = Vec::with_capacity(side_maps.segs.len());
            for (j, seg) in side_maps.segs.iter().enumerate() {
                let job = MapJob {
                    kind: MapKind::SegmentsToJuncs,
                    index: prefix,
                    header,
                    reads: ReadSource::File(seg.clone()),
                    mapped: ctx.tmp_dir.join(format!("{}.to_spliced", ext::sys::file_basename(seg))),
                    unmapped: None,
                    multihits: None,
                    transcripts: None,
                    progress: format!("({}/{})", j + 1, side_maps.segs.len()),
                };
                spliced_maps.push(mapping::map_reads(ctx, job)?.mapped);
            }
            join_segments(ctx, genome, side_reads, &candidates, &side_maps.seg_maps, &spliced_maps,
                &candidates_bam)?;
        }

        if let Some(m2g) = &m2g_maps[i] {
            if ext::sys::nonzero_file(m2g)? {
                final_maps.push(m2g.clone());
            }
        }
        if let Some(side_maps) = side_maps {
            if ext::sys::nonzero_file(&side_maps.unspliced)? {
                final_maps.push(side_maps.unspliced.clone());
            }
        }
        if ext::sys::nonzero_file(&candidates_bam)? {
            final_maps.push(candidates_bam);
        } else {
            // Joined hits may be written in per-thread parts `<prefix><i>.bam`.
            let prefix = candidates_bam.with_extension("");
            for j in 0..config.threads {
                if ext::sys::nonzero_file(&ext::sys::append_path(&prefix, format!("{}.bam", j)))? {
                    final_maps.push(prefix);
                    break;
                }
            }
        }
        res.push(final_maps);
    }
    Ok(res)
}

/// Inspects the first records of every input file, failing on unrecognized formats.
fn check_reads(inputs: &Inputs, color: bool) -> Result<(), Error> {
    let mut format: Option<Format> = None;
    for path in inputs.left.iter().chain(&inputs.right) {
        let sample = fastx::sample_reads(path, color, SAMPLE_READS)?;
        match format {
            Some(prev) if prev != sample.format => return Err(error!(InvalidInput,
                "Input files have different formats ({} and {})", prev.name(), sample.format.name())),
            _ => format = Some(sample.format),
        }
    }
    if let Some(format) = format {
        log::debug!("Reads format: {}", format.name());
    }
    Ok(())
}

/// User-provided junctions, insertions and deletions, together with the junctions from the annotation.
fn known_candidates(ctx: &mut Context) -> Result<Candidates, Error> {
    let config = ctx.config;
    let mut candidates = Candidates::new();
    if let (Some(gtf), true) = (ctx.run.gtf.clone(), config.gtf_juncs) {
        if let Some(juncs) = index::gtf_juncs(ctx, &gtf)? {
            candidates.add(Kind::Junctions, Source::Annotation, &juncs);
            ctx.run.gtf_juncs = Some(juncs);
        }
    }
    for (kind, path) in [(Kind::Junctions, &config.raw_juncs), (Kind::Insertions, &config.raw_insertions),
            (Kind::Deletions, &config.raw_deletions)] {
        if let Some(path) = path {
            fs::File::open(path).map_err(add_path!(path))?;
            candidates.add(kind, Source::User, path);
        }
    }
    Ok(candidates)
}

fn save_params(ctx: &Context, inputs: &Inputs, info: &PrepInfo, plan: &SegmentPlan) -> Result<(), Error> {
    let path = ctx.logs_dir.join(PARAMS_FILE);
    let sides: Vec<json::JsonValue> = SIDES.iter().zip(info.sides()).map(|(side, side_info)| json::object!{
        side: *side,
        min_read_length: side_info.min_len,
        max_read_length: side_info.max_len,
        reads_in: side_info.reads_in,
        reads_out: side_info.reads_out,
    }).collect();
    let obj = json::object!{
        version: env!("CARGO_PKG_VERSION"),
        paired: inputs.paired(),
        aligner: if ctx.config.bowtie2() { "bowtie2" } else { "bowtie" },
        colorspace: ctx.config.color,
        sides: sides,
        segments: plan.to_json(),
    };
    let mut file = ext::sys::create_file(&path)?;
    obj.write_pretty(&mut file, 4).map_err(add_path!(path))?;
    Ok(())
}

/// Builds transcriptome files without mapping any reads.
pub fn build_transcriptome_only(ctx: &mut Context, index_prefix: &Path) -> Result<(), Error> {
    let transcriptome = index::resolve_transcriptome(ctx)?
        .ok_or_else(|| error!(InvalidInput, "Annotation (-G) is required to build the transcriptome"))?;
    index::check_index(ctx, index_prefix, "genome")?;
    let fasta = index::reference_fasta(ctx, index_prefix)?;
    index::build_transcriptome(ctx, &fasta, &transcriptome)?;
    log::info!("Transcriptome files prepared. This was the only task requested.");
    Ok(())
}

/// Full run: read preparation, spliced alignment, and the final reports.
pub fn run(ctx: &mut Context, index_prefix: &Path, inputs: &Inputs) -> Result<(), Error> {
    let timer = Instant::now();
    let config = ctx.config;
    let transcriptome = index::resolve_transcriptome(ctx)?;
    if let Some(transcriptome) = &transcriptome {
        ctx.run.gtf = Some(transcriptome.gtf.clone());
    }
    index::check_index(ctx, index_prefix, "genome")?;
    let fasta = index::reference_fasta(ctx, index_prefix)?;
    if ctx.checkpoint.active() {
        log::info!("Generating SAM header for {}", ext::fmt::path(index_prefix));
    }
    let header = index::generate_header(ctx, index_prefix, Some("genome"))?;
    let genome = Genome { index: index_prefix.to_owned(), fasta, header };
    check_reads(inputs, config.color)?;
    let candidates = known_candidates(ctx)?;

    let prefiltered = if config.prefilter_multihits {
        log::info!("Pre-filtering multi-mapped reads");
        prep::prefilter(ctx, &genome, inputs)?
    } else {
        Vec::new()
    };
    ctx.checkpoint.advance(Stage::PrepReads)?;
    let multihits: Vec<PathBuf> = prefiltered.iter().map(|p| p.multihits.clone()).collect();
    let prepared = prep::prepare_reads(ctx, &genome, inputs, &multihits)?;

    let min_read_len = prepared.info.min_read_len();
    if min_read_len < fastx::SHORT_READ as u32 {
        log::warn!("Short reads (<{} bp) make the alignment slow and memory-consuming, \
            as they are likely to be mapped to too many places", fastx::SHORT_READ);
    }
    let read_len = seed_length(config.seed_length, &prepared.info);
    let plan = SegmentPlan::new(read_len, config.segment_length, config.coverage_search, config.closure_search);
    if plan.num_segments <= 1 {
        log::warn!("There is only one segment per read. If the read length is at least 45 bp, \
            please decrease --segment-length to about half the read length, \
            as the alignment works better with multiple segments");
    }
    ctx.run.segment_length = plan.segment_length;
    ctx.run.coverage_search = plan.coverage_search;
    ctx.run.closure_search = plan.closure_search;
    ctx.run.integer_quals = false;
    save_params(ctx, inputs, &prepared.info, &plan)?;

    let maps = spliced_alignment(ctx, &genome, transcriptome.as_ref(), &prepared.kept, &plan, candidates,
        &prefiltered)?;
    ctx.checkpoint.advance(Stage::Reports)?;
    reports::compile_reports(ctx, &genome, &maps, &prepared.kept)?;
    ctx.checkpoint.advance(Stage::AllDone)?;
    if !config.keep_tmp {
        reports::cleanup(&ctx.tmp_dir)?;
    }
    log::info!("Run complete: {} elapsed", ext::fmt::Duration(timer.elapsed()));
    Ok(())
}
