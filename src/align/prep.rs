//! Read preparation: filtering and renaming of the input reads (`prep_reads`),
//! multi-hit prefilter and recovery of the prefiltered mappings.

use std::{
    fs,
    path::{Path, PathBuf},
};
use crate::{
    Error,
    err::{add_path, error},
    ext,
};
use super::{
    Context,
    index::Genome,
    mapping::{self, MapJob, ReadSource},
    tools::{MapKind, join_paths},
};

/// Names of the read sides, used in file names and messages.
pub const SIDES: [&str; 2] = ["left", "right"];

/// Information file, written by `prep_reads` into the output directory.
pub const INFO_FILE: &str = "prep_reads.info";
/// Prepared reads of all sides; `%side%` is replaced with the side name.
const KEPT_READS_TEMPLATE: &str = "%side%_kept_reads.bam";
/// Information file shorter than this is ignored on resume.
const MIN_INFO_SIZE: u64 = 10;
/// Prepared reads file shorter than this cannot be used on resume.
const MIN_KEPT_SIZE: u64 = 40;
/// Reads shorter than this cannot be aligned at all.
const MIN_MAX_LEN: u32 = 16;

/// Input read files, as comma-separated lists on the command line.
#[derive(Clone, Debug, Default)]
pub struct Inputs {
    pub left: Vec<PathBuf>,
    pub left_quals: Vec<PathBuf>,
    pub right: Vec<PathBuf>,
    pub right_quals: Vec<PathBuf>,
}

impl Inputs {
    pub fn paired(&self) -> bool {
        !self.right.is_empty()
    }

    pub fn n_sides(&self) -> usize {
        if self.paired() { 2 } else { 1 }
    }

    /// Read files of the side.
    pub fn side(&self, i: usize) -> &[PathBuf] {
        if i == 0 { &self.left } else { &self.right }
    }

    /// All input files.
    pub fn all_files(&self) -> impl Iterator<Item = &PathBuf> {
        self.left.iter().chain(&self.left_quals).chain(&self.right).chain(&self.right_quals)
    }

    /// Positional arguments of `prep_reads`: reads and qualities for each side (empty lists are skipped).
    pub fn prep_args(&self) -> Vec<PathBuf> {
        [&self.left, &self.left_quals, &self.right, &self.right_quals].into_iter()
            .filter(|list| !list.is_empty())
            .map(|list| PathBuf::from(join_paths(list)))
            .collect()
    }
}

/// Read statistics of one side.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SideInfo {
    pub min_len: u32,
    pub max_len: u32,
    pub reads_in: u64,
    pub reads_out: u64,
}

/// Parsed `prep_reads` information file.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PrepInfo {
    sides: Vec<SideInfo>,
}

fn parse_value<T: std::str::FromStr>(line: Option<&str>) -> Option<T> {
    line?.rsplit('=').next()?.trim().parse().ok()
}

impl PrepInfo {
    /// Parses four `key=value` lines per side. The right side is present only if the fifth line is a `key=value` line.
    pub fn parse(text: &str) -> Result<Self, Error> {
        let fail = || error!(ParsingError, "Error retrieving prep_reads info");
        let mut lines = text.lines().peekable();
        let mut sides = Vec::with_capacity(2);
        for i in 0..SIDES.len() {
            if i > 0 && !lines.peek().map(|line| line.find('=').map(|j| j > 0).unwrap_or(false)).unwrap_or(false) {
                break;
            }
            let info = SideInfo {
                min_len: parse_value(lines.next()).ok_or_else(fail)?,
                max_len: parse_value(lines.next()).ok_or_else(fail)?,
                reads_in: parse_value(lines.next()).ok_or_else(fail)?,
                reads_out: parse_value(lines.next()).ok_or_else(fail)?,
            };
            if info.reads_out == 0 || info.max_len < MIN_MAX_LEN {
                return Err(fail());
            }
            sides.push(info);
        }
        Ok(Self { sides })
    }

    pub fn load(path: &Path) -> Result<Self, Error> {
        let text = fs::read_to_string(path).map_err(add_path!(path))?;
        Self::parse(&text)
    }

    /// Sides with at least one input read. Sides after the first empty one are ignored.
    pub fn sides(&self) -> &[SideInfo] {
        let n = self.sides.iter().position(|side| side.reads_in == 0).unwrap_or(self.sides.len());
        &self.sides[..n]
    }

    /// Minimal read length over all sides with known lengths (0 if unknown).
    pub fn min_read_len(&self) -> u32 {
        self.sides().iter().map(|side| side.min_len).filter(|&len| len > 0).min().unwrap_or(0)
    }

    pub fn max_read_len(&self) -> u32 {
        self.sides().iter().map(|side| side.max_len).max().unwrap_or(0)
    }
}

/// Outcome of the read preparation.
#[derive(Clone, Debug)]
pub struct PreparedReads {
    pub info: PrepInfo,
    /// Prepared reads for each side.
    pub kept: Vec<PathBuf>,
}

fn kept_reads_path(tmp_dir: &Path, side: &str) -> PathBuf {
    tmp_dir.join(KEPT_READS_TEMPLATE.replace("%side%", side))
}

/// Runs `prep_reads` on all inputs, excluding reads in `multihits` (produced by the prefilter).
/// If the stage was completed by a previous run, its information file is reused.
pub fn prepare_reads(
    ctx: &Context,
    genome: &Genome,
    inputs: &Inputs,
    multihits: &[PathBuf],
) -> Result<PreparedReads, Error>
{
    let skipping = ctx.checkpoint.skipping();
    if !skipping {
        for side in SIDES {
            let path = kept_reads_path(&ctx.tmp_dir, side);
            if path.exists() {
                fs::remove_file(&path).map_err(add_path!(path))?;
            }
        }
    }

    let info_file = ctx.out_dir.join(INFO_FILE);
    let out_template = ctx.tmp_dir.join(if inputs.paired() {
        KEPT_READS_TEMPLATE.to_owned()
    } else {
        KEPT_READS_TEMPLATE.replace("%side%", SIDES[0])
    });
    if !(skipping && ext::sys::file_exists(&info_file, MIN_INFO_SIZE)) {
        log::info!("Preparing reads");
        let log_file = ctx.logs_dir.join("prep_reads.log");
        let step = ctx.tools.prep_reads(
            &ctx.common_args(),
            None,
            None,
            Some(&info_file),
            Some(&ext::sys::append_path(&out_template, ".index")),
            multihits,
            Some(&genome.header),
            Some(&out_template),
            &inputs.prep_args(),
        ).log(&log_file);
        ctx.pipeline().then(step).run()?;
        for line in ext::sys::grep_warnings(&log_file)? {
            log::warn!("    {}", line);
        }
    }

    let info = PrepInfo::load(&info_file)?;
    let mut kept = Vec::with_capacity(2);
    for (side, side_info) in SIDES.iter().zip(info.sides()) {
        log::info!("    {:>5} reads: min. length={}, max. length={}, {} kept reads ({} discarded)",
            side, side_info.min_len, side_info.max_len, side_info.reads_out,
            side_info.reads_in.saturating_sub(side_info.reads_out));
        kept.push(kept_reads_path(&ctx.tmp_dir, side));
    }
    if skipping && !kept.first().map(|path| ext::sys::file_exists(path, MIN_KEPT_SIZE)).unwrap_or(false) {
        return Err(Error::Resume("prepared reads file missing, cannot resume!".to_owned()));
    }
    Ok(PreparedReads { info, kept })
}

/// Prefilter output for one side.
#[derive(Clone, Debug)]
pub struct Prefiltered {
    /// Reads with too many hits, excluded from the further analysis.
    pub multihits: PathBuf,
    /// Initial whole-read mappings.
    pub mappings: PathBuf,
    /// Reads without any mapping.
    pub unmapped: PathBuf,
}

/// Maps all reads against the genome, side by side, recording reads with too many hits.
pub fn prefilter(ctx: &Context, genome: &Genome, inputs: &Inputs) -> Result<Vec<Prefiltered>, Error> {
    let n = inputs.n_sides();
    let mut res = Vec::with_capacity(n);
    for (i, side) in SIDES[..n].iter().enumerate() {
        let ext = if ctx.config.bowtie2() { "bam" } else { "fq" };
        let multihits = ctx.tmp_dir.join(format!("{}_multimapped.{}", side, ext));
        let source = ctx.tools.prep_reads(
            &ctx.common_args(),
            Some(i),
            None,
            None,
            None,
            &[],
            Some(&genome.header),
            None,
            &inputs.prep_args(),
        ).log(ctx.logs_dir.join(format!("prep_reads.prefilter_{}.log", side)));
        let job = MapJob {
            kind: MapKind::Prefilter,
            index: &genome.index,
            header: &genome.header,
            reads: ReadSource::Stream { step: source, name: inputs.side(i).first().cloned().unwrap_or_default() },
            mapped: ctx.tmp_dir.join(format!("{}_im", side)),
            unmapped: Some(ctx.tmp_dir.join(format!("{}_ium", side))),
            multihits: Some(&multihits),
            transcripts: None,
            progress: String::new(),
        };
        let mapped = mapping::map_reads(ctx, job)?;
        if !multihits.exists() {
            fs::File::create(&multihits).map_err(add_path!(multihits))?;
        }
        res.push(Prefiltered {
            multihits,
            mappings: mapped.mapped,
            unmapped: mapped.unmapped.ok_or_else(|| error!(RuntimeError, "Prefilter must produce unmapped reads"))?,
        });
    }
    Ok(res)
}

/// Extracts initial mappings and unmapped reads of the prepared `target_reads` from the prefilter output.
/// Returns paths to the mappings and to the unmapped reads (`<unmapped_prefix>.bam`).
pub fn recover_prefiltered(
    ctx: &Context,
    genome: &Genome,
    side: usize,
    prefiltered: &Prefiltered,
    target_reads: &Path,
    out_mappings: &Path,
    unmapped_prefix: &Path,
) -> Result<(PathBuf, PathBuf), Error>
{
    let out_unmapped = ext::sys::append_path(unmapped_prefix, ".bam");
    if ctx.checkpoint.skipping() {
        return Ok((out_mappings.to_owned(), out_unmapped));
    }
    let step = ctx.tools.prep_reads(
        &ctx.common_args(),
        None,
        Some(&prefiltered.mappings),
        Some(out_mappings),
        None,
        &[target_reads.to_owned()],
        Some(&genome.header),
        Some(&out_unmapped),
        &[prefiltered.unmapped.clone()],
    ).log(ctx.logs_dir.join(format!("prep_reads.from_preflt.{}.log", SIDES[side])));
    ctx.pipeline().then(step).run()?;
    Ok((out_mappings.to_owned(), out_unmapped))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        align::{
            tools::Tools,
            stub_tools::{StubRun, PREP_READS},
        },
        stage::Stage,
    };

    const SINGLE: &str = "min_read_len=48\nmax_read_len=50\nreads_in =1000\nreads_out=990\n";

    #[test]
    fn single_end_info() {
        let info = PrepInfo::parse(SINGLE).unwrap();
        assert_eq!(info.sides().len(), 1);
        assert_eq!(info.sides()[0], SideInfo { min_len: 48, max_len: 50, reads_in: 1000, reads_out: 990 });
        assert_eq!(info.min_read_len(), 48);
        assert_eq!(info.max_read_len(), 50);
    }

    #[test]
    fn paired_end_info() {
        let text = format!("{}min_read_len=30\nmax_read_len=75\nreads_in =1000\nreads_out=1000\n", SINGLE);
        let info = PrepInfo::parse(&text).unwrap();
        assert_eq!(info.sides().len(), 2);
        assert_eq!(info.min_read_len(), 30);
        assert_eq!(info.max_read_len(), 75);

        // Trailing text without `=` is not a second side.
        let info = PrepInfo::parse(&format!("{}\n", SINGLE)).unwrap();
        assert_eq!(info.sides().len(), 1);
    }

    #[test]
    fn unknown_min_length() {
        let text = "min_read_len=0\nmax_read_len=50\nreads_in =10\nreads_out=10\n\
            min_read_len=40\nmax_read_len=45\nreads_in =10\nreads_out=10\n";
        let info = PrepInfo::parse(text).unwrap();
        assert_eq!(info.min_read_len(), 40);
        assert_eq!(info.max_read_len(), 50);
    }

    #[test]
    fn invalid_info() {
        assert!(matches!(PrepInfo::parse(""), Err(Error::ParsingError(_))));
        assert!(PrepInfo::parse("min_read_len=48\nmax_read_len=50\n").is_err());
        assert!(PrepInfo::parse("min_read_len=48\nmax_read_len=50\nreads_in =10\nreads_out=0\n").is_err());
        assert!(PrepInfo::parse("min_read_len=10\nmax_read_len=15\nreads_in =10\nreads_out=10\n").is_err());
        assert!(PrepInfo::parse("min_read_len=x\nmax_read_len=50\nreads_in =10\nreads_out=10\n").is_err());
    }

    #[test]
    fn prep_arguments() {
        let inputs = Inputs {
            left: vec![PathBuf::from("a_1.fq"), PathBuf::from("b_1.fq")],
            right: vec![PathBuf::from("a_2.fq")],
            ..Inputs::default()
        };
        assert!(inputs.paired());
        assert_eq!(inputs.prep_args(), [PathBuf::from("a_1.fq,b_1.fq"), PathBuf::from("a_2.fq")]);
        assert_eq!(inputs.all_files().count(), 3);
    }

    const STALE: &str = "min_read_len=30\nmax_read_len=36\nreads_in =100\nreads_out=50\n";

    /// Reads are prepared again if the run resumes at the read preparation,
    /// and are reused if it resumes at a later stage.
    #[test]
    fn prepare_at_resumed_stage() {
        let run = StubRun::new();
        run.tool("prep_reads", PREP_READS);
        let tools = Tools::unchecked(&run.config);
        let genome = run.genome();
        let inputs = Inputs { left: vec![run.dir.path().join("reads.fq")], ..Inputs::default() };
        let info_file = run.config.out_dir.join(INFO_FILE);

        let mut ctx = Context::new(&run.config, &tools, "splicemap align".to_owned(), Stage::PrepReads).unwrap();
        fs::write(&info_file, STALE).unwrap();
        ctx.checkpoint.advance(Stage::PrepReads).unwrap();
        let prepared = prepare_reads(&ctx, &genome, &inputs, &[]).unwrap();
        assert_eq!(run.calls("prep_reads"), 1);
        assert_eq!(prepared.info.sides()[0].reads_out, 990);
        assert!(prepared.kept[0].ends_with("left_kept_reads.bam"));

        let mut ctx = Context::new(&run.config, &tools, "splicemap align".to_owned(), Stage::MapStart).unwrap();
        fs::write(&info_file, STALE).unwrap();
        ctx.checkpoint.advance(Stage::PrepReads).unwrap();
        let prepared = prepare_reads(&ctx, &genome, &inputs, &[]).unwrap();
        assert_eq!(run.calls("prep_reads"), 1);
        assert_eq!(prepared.info.sides()[0].reads_out, 50);

        fs::remove_file(&prepared.kept[0]).unwrap();
        assert!(matches!(prepare_reads(&ctx, &genome, &inputs, &[]), Err(Error::Resume(_))));
    }

    /// Prefiltered mappings are recovered again if the run resumes at the start of the mapping.
    #[test]
    fn recover_at_resumed_stage() {
        let run = StubRun::new();
        run.tool("prep_reads", PREP_READS);
        let tools = Tools::unchecked(&run.config);
        let genome = run.genome();
        let dir = run.dir.path();
        let prefiltered = Prefiltered {
            multihits: dir.join("left_multimapped.bam"),
            mappings: dir.join("left_im.bam"),
            unmapped: dir.join("left_ium.bam"),
        };
        let reads = dir.join("left_kept_reads.bam");
        let out = dir.join("left_kept_reads.mapped.bam");

        for resume in [Stage::MapStart, Stage::MapSegments] {
            let mut ctx = Context::new(&run.config, &tools, "splicemap align".to_owned(), resume).unwrap();
            ctx.checkpoint.advance(Stage::PrepReads).unwrap();
            ctx.checkpoint.advance(Stage::MapStart).unwrap();
            let (mappings, unmapped) = recover_prefiltered(&ctx, &genome, 0, &prefiltered, &reads, &out,
                &dir.join("left_kept_reads_unmapped")).unwrap();
            assert_eq!(mappings, out);
            assert_eq!(unmapped, dir.join("left_kept_reads_unmapped.bam"));
        }
        let calls = run.call_args("prep_reads");
        assert_eq!(calls.len(), 1);
        assert!(calls[0].contains(&format!("--flt-hits={}", dir.join("left_im.bam").display())));
        assert!(calls[0].contains(&format!("--flt-reads={}", reads.display())));
    }
}
