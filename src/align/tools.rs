//! External programs: lookup, version checks, and command builders.
//! Builders only construct [Step]s, executing them is up to the caller.

use std::{
    path::{Path, PathBuf},
    process::Command,
};
use crate::{
    Error,
    err::error,
    ext,
    pipeline::{Step, Output, zio::Zipper},
};
use super::config::Config;

/// Empty input or discarded output, accepted by all helper programs in place of a file.
pub const DEV_NULL: &str = "/dev/null";

/// Kind of the short-read mapping, determines aligner parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MapKind {
    /// Whole reads against the genome.
    Reads,
    /// Whole reads against the genome, recording multi-mapped reads.
    Prefilter,
    /// Whole reads against the transcriptome.
    Transcriptome,
    /// Read segments against the genome.
    Segments,
    /// Read segments against the junction index.
    SegmentsToJuncs,
}

impl MapKind {
    pub fn is_segment(self) -> bool {
        matches!(self, MapKind::Segments | MapKind::SegmentsToJuncs)
    }
}

/// Parses aligner version from its `--version` output.
pub fn parse_version(text: &str) -> Option<(u32, u32, u32)> {
    lazy_static::lazy_static! {
        static ref VERSION: regex::Regex = regex::Regex::new(r"version ([0-9]+)\.([0-9]+)\.([0-9]+)")
            .expect("Version regex must be valid");
    }
    let caps = VERSION.captures(text)?;
    let num = |i: usize| caps.get(i).and_then(|m| m.as_str().parse().ok());
    Some((num(1)?, num(2)?, num(3)?))
}

fn aligner_version(exe: &Path) -> Option<(u32, u32, u32)> {
    let output = Command::new(exe).arg("--version").output().ok()?;
    parse_version(&String::from_utf8_lossy(&output.stdout))
}

/// Locations of all external programs.
#[derive(Clone, Debug)]
pub struct Tools {
    bin_dir: Option<PathBuf>,
    pub aligner: PathBuf,
    pub aligner_build: PathBuf,
    pub aligner_inspect: PathBuf,
    pub samtools: PathBuf,
    pub zipper: Option<Zipper>,
}

impl Tools {
    /// Finds the aligner (falling back to Bowtie 1 if Bowtie 2 is not available) and checks its version,
    /// finds samtools and the compression program.
    pub fn locate(config: &mut Config) -> Result<Self, Error> {
        let bin_dir = config.bin_dir.clone();
        log::info!("Checking for Bowtie");
        let mut found = None;
        if config.bowtie2() {
            if let Ok(exe) = Self::find_in(bin_dir.as_deref(), "bowtie2") {
                found = aligner_version(&exe).map(|version| (exe, version));
            }
            if found.is_none() {
                log::warn!("    Bowtie 2 not found, checking for older version..");
                config.bowtie1 = true;
            }
        }
        if found.is_none() {
            let exe = Self::find_in(bin_dir.as_deref(), "bowtie")?;
            found = aligner_version(&exe).map(|version| (exe, version));
        }
        let (aligner, version) = found.ok_or_else(|| error!(RuntimeError, "Bowtie not found on this system"))?;
        if config.bowtie2() {
            if version < (2, 0, 5) {
                return Err(error!(RuntimeError, "Bowtie 2.0.5 or later is required (found {}.{}.{})",
                    version.0, version.1, version.2));
            }
        } else if version < (0, 12, 9) {
            return Err(error!(RuntimeError, "Bowtie 0.12.9 or later is required (found {}.{}.{})",
                version.0, version.1, version.2));
        }
        log::info!("    Bowtie version: {}.{}.{}", version.0, version.1, version.2);

        let suffix = if config.bowtie2() { "2" } else { "" };
        let zipper = match config.zipper() {
            Some(zipper) => Some(zipper.with_exe(ext::sys::find_exe(&zipper.exe)?)),
            None => None,
        };
        Ok(Self {
            aligner,
            aligner_build: Self::locate_helper(bin_dir.as_deref(), &format!("bowtie{}-build", suffix)),
            aligner_inspect: Self::locate_helper(bin_dir.as_deref(), &format!("bowtie{}-inspect", suffix)),
            samtools: ext::sys::find_exe(&config.samtools)?,
            bin_dir,
            zipper,
        })
    }

    /// Tools without any lookup: every program is started by its name (or from `bin_dir`).
    pub fn unchecked(config: &Config) -> Self {
        let bin_dir = config.bin_dir.clone();
        let suffix = if config.bowtie2() { "2" } else { "" };
        Self {
            aligner: Self::locate_helper(bin_dir.as_deref(), &format!("bowtie{}", suffix)),
            aligner_build: Self::locate_helper(bin_dir.as_deref(), &format!("bowtie{}-build", suffix)),
            aligner_inspect: Self::locate_helper(bin_dir.as_deref(), &format!("bowtie{}-inspect", suffix)),
            samtools: config.samtools.clone(),
            zipper: config.zipper(),
            bin_dir,
        }
    }

    fn find_in(bin_dir: Option<&Path>, name: &str) -> Result<PathBuf, Error> {
        if let Some(dir) = bin_dir {
            let path = dir.join(name);
            if path.is_file() {
                return Ok(path);
            }
        }
        ext::sys::find_exe(name)
    }

    /// Helper programs are looked up lazily: if a program is not found, its bare name is used,
    /// and a missing program is reported when it is started.
    fn locate_helper(bin_dir: Option<&Path>, name: &str) -> PathBuf {
        Self::find_in(bin_dir, name).unwrap_or_else(|_| PathBuf::from(name))
    }

    /// Path to a helper program.
    pub fn helper(&self, name: &str) -> PathBuf {
        Self::locate_helper(self.bin_dir.as_deref(), name)
    }

    /// Decompression step for the intermediate files.
    pub fn unzip(&self) -> Option<Step> {
        self.zipper.as_ref().map(|zipper| Step::new(&zipper.exe).args(&zipper.args).arg("-cd"))
    }

    /// Converts reads, stored in a BAM file, into FASTQ/FASTA stream.
    pub fn bam2fastx(&self, config: &Config, bam: &Path) -> Step {
        let mut step = Step::new(self.helper("bam2fastx")).arg("--all");
        if config.color {
            step = step.arg("--color");
        }
        step.arg(bam)
    }

    /// Short-read aligner command. Reads are taken from `input`, or from stdin if `input` is None.
    /// Bowtie 1 writes reads with too many hits into `multihits` (only used by the prefilter).
    pub fn aligner(
        &self,
        config: &Config,
        kind: MapKind,
        index: &Path,
        input: Option<&Path>,
        multihits: Option<&Path>,
        segment_length: u32,
    ) -> Step {
        let (mismatches, edit_dist) = if kind.is_segment() {
            (config.segment_mismatches, config.segment_mismatches)
        } else {
            (config.read_mismatches, config.read_edit_dist)
        };
        let mismatches = mismatches.min(3);
        let max_hits = match kind {
            MapKind::Transcriptome => config.t_max_hits,
            MapKind::Segments | MapKind::SegmentsToJuncs => config.max_seg_hits(),
            _ => config.max_hits,
        };

        let mut step = Step::new(&self.aligner);
        if config.color {
            step = step.args(["-C", "--col-keepends"]);
        }
        if config.bowtie2() {
            // Bowtie2 does not suppress reads with too many hits, they are filtered by the helper programs.
            let k = if kind.is_segment() || kind == MapKind::Prefilter { max_hits + 1 } else { max_hits };
            step = step.arg("-k").arg(k.to_string());
            let b2 = &config.b2;
            if kind.is_segment() {
                step = step.arg("-N").arg(mismatches.min(1).to_string())
                    .arg("-L").arg(segment_length.min(20).to_string());
            } else {
                step = match b2.preset() {
                    Some(preset) => step.arg(preset.arg()),
                    None => step.arg("-D").arg(b2.d.to_string())
                        .arg("-R").arg(b2.r.to_string())
                        .arg("-N").arg(b2.n.to_string())
                        .arg("-L").arg(b2.l.to_string())
                        .arg("-i").arg(&b2.i),
                };
                let score_min = b2.score_min.clone()
                    .unwrap_or_else(|| format!("C,-{},0", b2.mp.0 * edit_dist + 2));
                step = step.arg("--gbar").arg(b2.gbar.to_string())
                    .arg("--mp").arg(b2.mp.to_string())
                    .arg("--np").arg(b2.np.to_string())
                    .arg("--rdg").arg(b2.rdg.to_string())
                    .arg("--rfg").arg(b2.rfg.to_string())
                    .arg("--score-min").arg(score_min);
            }
        } else {
            let mode = if config.bowtie_n && !kind.is_segment() { "-n" } else { "-v" };
            step = step.arg(mode).arg(mismatches.to_string())
                .arg("-k").arg(max_hits.to_string())
                .arg("-m").arg(max_hits.to_string())
                .arg("-S");
        }
        step = step.arg("-p").arg(config.threads.to_string());
        if config.bowtie2() {
            step = step.arg("--sam-no-hd").arg("-x");
        } else {
            step = step.arg("--sam-nohead")
                .arg("--max").arg(multihits.unwrap_or(Path::new(DEV_NULL)));
        }
        step = step.arg(index);
        match input {
            Some(path) => step.arg(path),
            None => step.arg("-"),
        }
    }

    /// Converts aligner output into an ordered BAM file. For the transcriptome mapping,
    /// output is written to stdout instead of `mapped`.
    pub fn fix_map_ordering(
        &self,
        config: &Config,
        kind: MapKind,
        sam_header: &Path,
        mapped: &Path,
        unmapped: Option<&Path>,
        multihits: Option<&Path>,
    ) -> Step {
        let mut step = Step::new(self.helper("fix_map_ordering"));
        if config.color {
            step = step.arg("--color");
        }
        if config.bowtie2() {
            let realign_edit_dist = if kind.is_segment() { config.segment_mismatches } else { config.realign_edit_dist() };
            let min_score = config.b2.mp.0.saturating_sub(1) * realign_edit_dist;
            step = step.arg("--bowtie2-min-score").arg(min_score.to_string());
            if config.b2_score_filter {
                step = step.arg(format!("-W{}", min_score + config.b2.mp.0));
            }
        }
        step = step.arg("--read-mismatches").arg(config.read_mismatches.to_string())
            .arg("--read-gap-length").arg(config.read_gap_length.to_string())
            .arg("--read-edit-dist").arg(config.read_edit_dist.to_string())
            .arg("--read-realign-edit-dist").arg(config.realign_edit_dist().to_string());
        if kind != MapKind::Transcriptome {
            step = step.arg("--index-outfile").arg(ext::sys::append_path(mapped, ".index"));
        }
        if config.bowtie1 {
            step = step.arg("--bowtie1");
        }
        if kind == MapKind::Prefilter {
            if let (true, Some(multihits)) = (config.bowtie2(), multihits) {
                step = step.arg("--aux-outfile").arg(multihits);
            }
            step = step.arg("--max-multihits").arg(config.max_hits.to_string());
        }
        step = step.arg("--sam-header").arg(sam_header).arg("-");
        step = if kind == MapKind::Transcriptome { step.arg("-") } else { step.arg(mapped) };
        match unmapped {
            Some(path) => step.arg(path),
            None => step,
        }
    }

    /// Converts transcriptome coordinates into genome coordinates (BAM stream on stdin).
    pub fn map2gtf(&self, genome_header: &Path, transcripts: &Path, mapped: &Path) -> Step {
        Step::new(self.helper("map2gtf"))
            .arg("--sam-header").arg(genome_header)
            .arg(transcripts)
            .arg("-")
            .arg(mapped)
    }

    /// Filters and renames input reads. `common` contains arguments, shared by all helpers.
    #[allow(clippy::too_many_arguments)]
    pub fn prep_reads(
        &self,
        common: &[String],
        filter_side: Option<usize>,
        filter_hits: Option<&Path>,
        aux_out: Option<&Path>,
        index_out: Option<&Path>,
        filter_reads: &[PathBuf],
        sam_header: Option<&Path>,
        out: Option<&Path>,
        reads: &[PathBuf],
    ) -> Step {
        let mut step = Step::new(self.helper("prep_reads"));
        if let Some(side) = filter_side {
            step = step.arg(format!("--flt-side={}", side));
        }
        step = step.args(common);
        if let Some(path) = filter_hits {
            step = step.arg(flag_path("--flt-hits=", path));
        }
        if let Some(path) = aux_out {
            step = step.arg(flag_path("--aux-outfile=", path));
        }
        if let Some(path) = index_out {
            step = step.arg(flag_path("--index-outfile=", path));
        }
        if !filter_reads.is_empty() {
            step = step.arg(format!("--flt-reads={}", join_paths(filter_reads)));
        }
        if let Some(path) = sam_header {
            step = step.arg(flag_path("--sam-header=", path));
        }
        if let Some(path) = out {
            step = step.arg(flag_path("--outfile=", path));
        }
        step.args(reads)
    }

    /// Segment-based junction, insertion, deletion and fusion search.
    pub fn segment_juncs(
        &self,
        common: &[String],
        sam_header: &Path,
        unmapped_segs: &[PathBuf],
        ref_fasta: &Path,
        outputs: &[PathBuf; 4],
        sides: &[(&Path, &Path, &[PathBuf])],
    ) -> Step {
        let mut step = Step::new(self.helper("segment_juncs"))
            .args(common)
            .arg("--sam-header").arg(sam_header)
            .arg("--ium-reads").arg(join_paths(unmapped_segs))
            .arg(ref_fasta)
            .args(outputs);
        for &(reads, unspliced, seg_maps) in sides {
            step = step.arg(reads).arg(unspliced).arg(join_paths(seg_maps));
        }
        step
    }

    /// Mate-pair closure junction search.
    pub fn closure_juncs(
        &self,
        common: &[String],
        sam_header: &Path,
        juncs_out: &Path,
        fusions_out: &Path,
        ref_fasta: &Path,
        left_maps: &[PathBuf],
        right_maps: &[PathBuf],
    ) -> Step {
        Step::new(self.helper("closure_juncs"))
            .args(common)
            .arg("--sam-header").arg(sam_header)
            .arg(juncs_out)
            .arg(fusions_out)
            .arg(ref_fasta)
            .arg(join_paths(left_maps))
            .arg(join_paths(right_maps))
    }

    /// Extracts sequences around candidate junctions and indels into FASTA (stdout).
    pub fn juncs_db(&self, min_anchor: u32, max_seg_len: usize, lists: &[String; 4], ref_fasta: &Path) -> Step {
        Step::new(self.helper("juncs_db"))
            .arg(min_anchor.to_string())
            .arg(max_seg_len.to_string())
            .args(lists)
            .arg(ref_fasta)
    }

    /// Builds aligner index from a FASTA file.
    pub fn build_index(&self, config: &Config, fasta: &Path, prefix: &Path) -> Step {
        let mut step = Step::new(&self.aligner_build);
        if config.color {
            step = step.arg("-C");
        }
        step.arg(fasta).arg(prefix)
    }

    /// Reconstructs reference sequences from the aligner index (FASTA to stdout).
    pub fn inspect_index(&self, index: &Path) -> Step {
        Step::new(&self.aligner_inspect).arg(index)
    }

    /// Writes the aligner SAM header for the index into stdout.
    pub fn index_header(&self, config: &Config, index: &Path) -> Step {
        let mut step = Step::new(&self.aligner);
        if config.bowtie1 {
            step = step.arg("--sam");
        }
        if config.color {
            step = step.arg("-C");
        }
        if config.bowtie2() {
            step = step.arg("-x");
        }
        step.arg(index).arg(DEV_NULL)
    }

    /// Joins segment hits into full-length alignments.
    #[allow(clippy::too_many_arguments)]
    pub fn long_spanning_reads(
        &self,
        config: &Config,
        common: &[String],
        sam_header: &Path,
        ref_fasta: &Path,
        reads: &Path,
        lists: &[String; 4],
        out: &Path,
        contig_maps: &[PathBuf],
        spliced_maps: &[PathBuf],
    ) -> Step {
        let mut step = Step::new(self.helper("long_spanning_reads"))
            .args(common)
            .arg("--sam-header").arg(sam_header)
            .args(config.penalty_args())
            .arg(ref_fasta)
            .arg(reads)
            .args(lists)
            .arg(out)
            .arg(join_paths(contig_maps));
        if !spliced_maps.is_empty() {
            step = step.arg(join_paths(spliced_maps));
        }
        step
    }

    /// Extracts known junctions from the annotation (stdout).
    pub fn gtf_juncs(&self, gtf: &Path) -> Step {
        Step::new(self.helper("gtf_juncs")).arg(gtf)
    }

    /// Writes transcript sequences into `out_fasta`.
    pub fn gtf_to_fasta(&self, common: &[String], gtf: &Path, genome: &Path, out_fasta: &Path) -> Step {
        Step::new(self.helper("gtf_to_fasta")).args(common).arg(gtf).arg(genome).arg(out_fasta)
    }

    /// Final report: junction/indel/fusion tracks and per-thread alignment parts.
    #[allow(clippy::too_many_arguments)]
    pub fn tophat_reports(
        &self,
        config: &Config,
        common: &[String],
        sam_header: &Path,
        ref_fasta: &Path,
        outputs: &[PathBuf; 4],
        alignments_prefix: &Path,
        sides: &[(String, &Path)],
    ) -> Step {
        let mut step = Step::new(self.helper("tophat_reports"))
            .args(common)
            .arg("--sam-header").arg(sam_header);
        if config.report_secondary {
            step = step.arg("--report-secondary-alignments");
        }
        if config.report_discordant {
            step = step.arg("--report-discordant-pair-alignments");
        }
        if config.report_mixed {
            step = step.arg("--report-mixed-alignments");
        }
        step = step.arg(flag_path("--samtools=", &self.samtools))
            .args(config.penalty_args())
            .arg(ref_fasta)
            .args(outputs)
            .arg(alignments_prefix);
        for (maps, reads) in sides {
            step = step.arg(maps).arg(reads);
        }
        step
    }

    pub fn samtools_sort(&self, input: &Path, output: &Path) -> Step {
        Step::new(&self.samtools).arg("sort").arg("-o").arg(output).arg(input)
    }

    /// Merges sorted BAM files. Output `-` together with `uncompressed` produces a stream for conversion.
    pub fn samtools_merge(&self, sam_header: &Path, output: &Path, parts: &[PathBuf], uncompressed: bool) -> Step {
        let mut step = Step::new(&self.samtools).args(["merge", "-f", "-h"]).arg(sam_header);
        if uncompressed {
            step = step.arg("-u");
        }
        step.arg(output).args(parts)
    }

    /// Converts BAM (file or `-`) into SAM with header.
    pub fn samtools_view(&self, input: &Path, output: &Path) -> Step {
        Step::new(&self.samtools).args(["view", "-h"]).arg(input).stdout(Output::File(output.to_owned()))
    }

    /// Merges unsorted BAM files by read id.
    pub fn bam_merge(&self, sam_header: &Path, output: &Path, parts: &[PathBuf]) -> Step {
        Step::new(self.helper("bam_merge"))
            .arg("-Q")
            .arg("--sam-header").arg(sam_header)
            .arg(output)
            .args(parts)
    }
}

/// Comma-separated list of paths.
pub fn join_paths<P: AsRef<Path>>(paths: &[P]) -> String {
    paths.iter().map(|p| p.as_ref().to_string_lossy()).collect::<Vec<_>>().join(",")
}

fn flag_path(flag: &str, path: &Path) -> String {
    format!("{}{}", flag, path.to_string_lossy())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(step: &Step) -> Vec<String> {
        step.command().get_args().map(|s| s.to_string_lossy().into_owned()).collect()
    }

    fn tools(config: &Config) -> Tools {
        Tools::unchecked(config)
    }

    #[test]
    fn versions() {
        assert_eq!(parse_version("/usr/bin/bowtie2-align-s version 2.4.5\n64-bit"), Some((2, 4, 5)));
        assert_eq!(parse_version("bowtie version 1.3.1"), Some((1, 3, 1)));
        assert_eq!(parse_version("bowtie2 2.4"), None);
    }

    #[test]
    fn bowtie2_read_mapping() {
        let mut config = Config::default();
        config.threads = 4;
        config.validate(false).unwrap();
        let step = tools(&config).aligner(&config, MapKind::Reads, Path::new("idx/genome"),
            Some(Path::new("left.fq")), None, 25);
        assert_eq!(args(&step), ["-k", "20", "-D", "15", "-R", "2", "-N", "0", "-L", "20", "-i", "S,1,1.25",
            "--gbar", "4", "--mp", "6,2", "--np", "1", "--rdg", "5,3", "--rfg", "5,3", "--score-min", "C,-14,0",
            "-p", "4", "--sam-no-hd", "-x", "idx/genome", "left.fq"]);
    }

    #[test]
    fn bowtie2_segment_mapping() {
        let mut config = Config::default();
        config.b2.add_preset(super::super::config::Preset::VerySensitive);
        config.validate(false).unwrap();
        let step = tools(&config).aligner(&config, MapKind::Segments, Path::new("genome"), None, None, 18);
        assert_eq!(args(&step), ["-k", "41", "-N", "1", "-L", "18", "-p", "1", "--sam-no-hd", "-x", "genome", "-"]);
        let step = tools(&config).aligner(&config, MapKind::Reads, Path::new("genome"), None, None, 18);
        assert!(args(&step).contains(&"--very-sensitive".to_owned()));
    }

    #[test]
    fn bowtie1_mapping() {
        let mut config = Config::default();
        config.bowtie1 = true;
        config.bowtie_n = true;
        config.color = true;
        config.validate(false).unwrap();
        let tools = tools(&config);
        let step = tools.aligner(&config, MapKind::Prefilter, Path::new("genome"), None,
            Some(Path::new("tmp/left_multimapped.fq")), 25);
        assert_eq!(args(&step), ["-C", "--col-keepends", "-n", "2", "-k", "20", "-m", "20", "-S", "-p", "1",
            "--sam-nohead", "--max", "tmp/left_multimapped.fq", "genome", "-"]);
        let step = tools.aligner(&config, MapKind::Segments, Path::new("genome"), Some(Path::new("seg1.fq")), None, 25);
        let seg_args = args(&step);
        assert_eq!(&seg_args[2..4], ["-v", "2"]);
        assert!(seg_args.contains(&DEV_NULL.to_owned()));
    }

    #[test]
    fn fixer_arguments() {
        let mut config = Config::default();
        config.b2_score_filter = true;
        config.validate(false).unwrap();
        let tools = tools(&config);
        let step = tools.fix_map_ordering(&config, MapKind::Reads, Path::new("hdr.sam"), Path::new("tmp/left.mapped.bam"),
            Some(Path::new("tmp/left_unmapped.bam")), None);
        assert_eq!(args(&step), ["--bowtie2-min-score", "15", "-W21", "--read-mismatches", "2", "--read-gap-length", "2",
            "--read-edit-dist", "2", "--read-realign-edit-dist", "3", "--index-outfile", "tmp/left.mapped.bam.index",
            "--sam-header", "hdr.sam", "-", "tmp/left.mapped.bam", "tmp/left_unmapped.bam"]);

        let step = tools.fix_map_ordering(&config, MapKind::Transcriptome, Path::new("t.sam"), Path::new("m2g.bam"),
            None, None);
        let t_args = args(&step);
        assert!(!t_args.contains(&"--index-outfile".to_owned()));
        assert_eq!(&t_args[t_args.len() - 2..], ["-", "-"]);

        let step = tools.fix_map_ordering(&config, MapKind::Prefilter, Path::new("hdr.sam"), Path::new("im.bam"),
            None, Some(Path::new("multi.bam")));
        let p_args = args(&step);
        let pos = p_args.iter().position(|a| a == "--aux-outfile").unwrap();
        assert_eq!(&p_args[pos..pos + 4], ["--aux-outfile", "multi.bam", "--max-multihits", "20"]);
    }

    #[test]
    fn joined_lists() {
        let config = Config::default();
        let tools = tools(&config);
        let lists = ["a.juncs,b.juncs".to_owned(), DEV_NULL.to_owned(), DEV_NULL.to_owned(), DEV_NULL.to_owned()];
        let step = tools.juncs_db(3, 40, &lists, Path::new("ref.fa"));
        assert_eq!(args(&step), ["3", "40", "a.juncs,b.juncs", DEV_NULL, DEV_NULL, DEV_NULL, "ref.fa"]);
        assert_eq!(join_paths(&[PathBuf::from("x"), PathBuf::from("y")]), "x,y");
    }
}
