//! Run configuration: all user parameters, validated once and passed by reference afterwards.

use std::{
    cmp::{min, max},
    fmt,
    path::{Path, PathBuf},
    str::FromStr,
};
use crate::{
    Error,
    err::{validate_param, error},
    pipeline::zio::Zipper,
};

/// Bowtie2 sensitivity preset.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Preset {
    VeryFast,
    Fast,
    Sensitive,
    VerySensitive,
}

impl Preset {
    pub fn arg(self) -> &'static str {
        match self {
            Preset::VeryFast => "--very-fast",
            Preset::Fast => "--fast",
            Preset::Sensitive => "--sensitive",
            Preset::VerySensitive => "--very-sensitive",
        }
    }
}

/// Pair of integers, written as `A,B` (for example, mismatch penalties `6,2`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IntPair(pub u32, pub u32);

impl FromStr for IntPair {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (a, b) = s.split_once(',').ok_or_else(|| format!("Cannot parse '{}': expected <int>,<int>", s))?;
        match (a.parse(), b.parse()) {
            (Ok(a), Ok(b)) => Ok(Self(a, b)),
            _ => Err(format!("Cannot parse '{}': expected <int>,<int>", s)),
        }
    }
}

impl fmt::Display for IntPair {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{},{}", self.0, self.1)
    }
}

/// Checks that the string is a bowtie2 function, for example `S,1,1.25`.
fn is_function(s: &str) -> bool {
    lazy_static::lazy_static! {
        static ref FUNCTION: regex::Regex = regex::Regex::new(r"^[CLSG],-?[0-9]+(\.[0-9]+)?,-?[0-9]+(\.[0-9]+)?$")
            .expect("Function regex must be valid");
    }
    FUNCTION.is_match(s)
}

/// Bowtie2 parameters, used for whole-read mapping.
#[derive(Clone, Debug)]
pub struct Bowtie2Params {
    presets: Vec<Preset>,
    pub n: u8,
    pub l: u32,
    pub i: String,
    pub n_ceil: String,
    pub gbar: u32,
    pub mp: IntPair,
    pub np: u32,
    pub rdg: IntPair,
    pub rfg: IntPair,
    pub score_min: Option<String>,
    pub d: u32,
    pub r: u32,
}

impl Default for Bowtie2Params {
    fn default() -> Self {
        Self {
            presets: Vec::new(),
            n: 0,
            l: 20,
            i: "S,1,1.25".to_owned(),
            n_ceil: "L,0,0.15".to_owned(),
            gbar: 4,
            mp: IntPair(6, 2),
            np: 1,
            rdg: IntPair(5, 3),
            rfg: IntPair(5, 3),
            score_min: None,
            d: 15,
            r: 2,
        }
    }
}

impl Bowtie2Params {
    pub fn add_preset(&mut self, preset: Preset) {
        if !self.presets.contains(&preset) {
            self.presets.push(preset);
        }
    }

    pub fn preset(&self) -> Option<Preset> {
        self.presets.first().copied()
    }

    fn validate(&self) -> Result<(), Error> {
        validate_param!(self.presets.len() <= 1,
            "Use only one of --b2-very-fast, --b2-fast, --b2-sensitive, --b2-very-sensitive");
        validate_param!(self.n <= 1, "--b2-N ({}) must be either 0 or 1", self.n);
        validate_param!(is_function(&self.i), "--b2-i ({}) must be a function (for example, S,1,1.25)", self.i);
        validate_param!(is_function(&self.n_ceil),
            "--b2-n-ceil ({}) must be a function (for example, L,0,0.15)", self.n_ceil);
        if let Some(score_min) = &self.score_min {
            validate_param!(is_function(score_min),
                "--b2-score-min ({}) must be a function (for example, L,-0.6,-0.6)", score_min);
        }
        Ok(())
    }
}

/// Fusion search parameters.
#[derive(Clone, Debug)]
pub struct FusionParams {
    pub search: bool,
    pub anchor_length: u32,
    pub min_dist: u32,
    pub read_mismatches: u32,
    pub multireads: u32,
    pub multipairs: u32,
    pub ignore_chromosomes: Vec<String>,
    pub do_not_resolve_conflicts: bool,
}

impl Default for FusionParams {
    fn default() -> Self {
        Self {
            search: false,
            anchor_length: 20,
            min_dist: 10_000_000,
            read_mismatches: 2,
            multireads: 2,
            multipairs: 2,
            ignore_chromosomes: Vec::new(),
            do_not_resolve_conflicts: false,
        }
    }
}

/// Intron length limits of the individual junction search strategies.
#[derive(Clone, Debug)]
pub struct SearchParams {
    pub min_closure_exon: u32,
    pub min_closure_intron: u32,
    pub max_closure_intron: u32,
    pub min_coverage_intron: u32,
    pub max_coverage_intron: u32,
    pub min_segment_intron: u32,
    pub max_segment_intron: u32,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            min_closure_exon: 100,
            min_closure_intron: 50,
            max_closure_intron: 5000,
            min_coverage_intron: 50,
            max_coverage_intron: 20000,
            min_segment_intron: 50,
            max_segment_intron: 500_000,
        }
    }
}

/// Read group information for the SAM header.
#[derive(Clone, Debug, Default)]
pub struct ReadGroup {
    pub id: Option<String>,
    pub sample: Option<String>,
    pub library: Option<String>,
    pub description: Option<String>,
    pub platform_unit: Option<String>,
    pub center: Option<String>,
    pub date: Option<String>,
    pub platform: Option<String>,
}

impl ReadGroup {
    /// `@RG` header line, if both ID and sample are known.
    pub fn header_line(&self, inner_dist: Option<i32>) -> Option<String> {
        let (id, sample) = (self.id.as_ref()?, self.sample.as_ref()?);
        let mut line = format!("@RG\tID:{}\tSM:{}", id, sample);
        let fields = [("LB", &self.library), ("DS", &self.description), ("PU", &self.platform_unit),
            ("CN", &self.center)];
        for (tag, value) in fields {
            if let Some(value) = value {
                line.push_str(&format!("\t{}:{}", tag, value));
            }
        }
        if let Some(dist) = inner_dist.filter(|&d| d != 0) {
            line.push_str(&format!("\tPI:{}", dist));
        }
        for (tag, value) in [("DT", &self.date), ("PL", &self.platform)] {
            if let Some(value) = value {
                line.push_str(&format!("\t{}:{}", tag, value));
            }
        }
        Some(line)
    }
}

pub const LIBRARY_TYPES: [&str; 3] = ["fr-unstranded", "fr-firststrand", "fr-secondstrand"];

/// All run parameters. Constructed from the command line, validated, and never modified afterwards.
#[derive(Clone, Debug)]
pub struct Config {
    pub out_dir: PathBuf,
    pub tmp_dir: Option<PathBuf>,
    pub threads: u16,
    pub keep_tmp: bool,
    /// Zipper command line (`none` to disable).
    pub zpacker: String,
    pub unmapped_fifo: bool,
    /// Directory with the helper programs (searched before PATH).
    pub bin_dir: Option<PathBuf>,
    pub samtools: PathBuf,

    pub bowtie1: bool,
    /// Use `-n` instead of `-v` alignment mode in bowtie1 whole-read mapping.
    pub bowtie_n: bool,
    pub read_mismatches: u32,
    pub read_gap_length: u32,
    pub read_edit_dist: u32,
    pub read_realign_edit_dist: Option<u32>,
    pub b2: Bowtie2Params,
    /// Score and edit distance filtering of bowtie2 hits.
    pub b2_score_filter: bool,

    pub min_anchor: u32,
    pub splice_mismatches: u32,
    pub min_intron: u32,
    pub max_intron: u32,
    pub min_isoform_fraction: f64,
    pub max_hits: u32,
    pub t_max_hits: u32,
    pub suppress_hits: bool,
    pub prefilter_multihits: bool,
    pub max_insertion_length: u32,
    pub max_deletion_length: u32,
    pub segment_length: u32,
    pub segment_mismatches: u32,
    pub search: SearchParams,

    pub color: bool,
    pub quals: bool,
    pub integer_quals: bool,
    pub solexa_quals: bool,
    pub phred64_quals: bool,
    pub library_type: Option<String>,
    pub seed_length: Option<u32>,
    pub mate_inner_dist: Option<i32>,
    pub mate_std_dev: u32,
    pub read_group: ReadGroup,

    pub gtf: Option<PathBuf>,
    pub transcriptome_index: Option<PathBuf>,
    pub transcriptome_only: bool,
    pub raw_juncs: Option<PathBuf>,
    pub raw_insertions: Option<PathBuf>,
    pub raw_deletions: Option<PathBuf>,
    pub novel_juncs: bool,
    pub novel_indels: bool,
    pub novel_fusions: bool,
    pub gtf_juncs: bool,
    pub coverage_search: Option<bool>,
    pub closure_search: Option<bool>,
    pub microexon_search: bool,
    pub fusion: FusionParams,

    pub sort_bam: bool,
    pub convert_bam: bool,
    pub report_secondary: bool,
    pub report_discordant: bool,
    pub report_mixed: bool,
    pub keep_fasta_order: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            out_dir: PathBuf::from("./splicemap_out"),
            tmp_dir: None,
            threads: 1,
            keep_tmp: false,
            zpacker: "gzip".to_owned(),
            unmapped_fifo: false,
            bin_dir: None,
            samtools: PathBuf::from("samtools"),

            bowtie1: false,
            bowtie_n: false,
            read_mismatches: 2,
            read_gap_length: 2,
            read_edit_dist: 2,
            read_realign_edit_dist: None,
            b2: Bowtie2Params::default(),
            b2_score_filter: false,

            min_anchor: 8,
            splice_mismatches: 0,
            min_intron: 50,
            max_intron: 500_000,
            min_isoform_fraction: 0.15,
            max_hits: 20,
            t_max_hits: 60,
            suppress_hits: false,
            prefilter_multihits: false,
            max_insertion_length: 3,
            max_deletion_length: 3,
            segment_length: 25,
            segment_mismatches: 2,
            search: SearchParams::default(),

            color: false,
            quals: false,
            integer_quals: false,
            solexa_quals: false,
            phred64_quals: false,
            library_type: None,
            seed_length: None,
            mate_inner_dist: None,
            mate_std_dev: 20,
            read_group: ReadGroup::default(),

            gtf: None,
            transcriptome_index: None,
            transcriptome_only: false,
            raw_juncs: None,
            raw_insertions: None,
            raw_deletions: None,
            novel_juncs: true,
            novel_indels: true,
            novel_fusions: true,
            gtf_juncs: true,
            coverage_search: None,
            closure_search: None,
            microexon_search: false,
            fusion: FusionParams::default(),

            sort_bam: true,
            convert_bam: true,
            report_secondary: false,
            report_discordant: true,
            report_mixed: true,
            keep_fasta_order: false,
        }
    }
}

/// Values that become known only during the run, and that are passed to the helper programs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunParams {
    pub segment_length: u32,
    pub coverage_search: bool,
    pub closure_search: bool,
    pub integer_quals: bool,
    /// Junctions, extracted from the annotation.
    pub gtf_juncs: Option<PathBuf>,
    /// Annotation, possibly copied next to the transcriptome index.
    pub gtf: Option<PathBuf>,
}

impl Config {
    /// Validates parameters and fills in derived values.
    pub fn validate(&mut self, paired: bool) -> Result<(), Error> {
        self.threads = max(self.threads, 1);
        validate_param!(self.splice_mismatches <= 2,
            "Splice mismatches ({}) must be 0, 1 or 2", self.splice_mismatches);
        validate_param!(self.min_anchor >= 4, "Min anchor length ({}) must be at least 4", self.min_anchor);
        validate_param!((0.0..=1.0).contains(&self.min_isoform_fraction),
            "Min isoform fraction ({}) must be within [0, 1]", self.min_isoform_fraction);
        validate_param!(self.min_intron > 0, "Min intron length must be positive");
        validate_param!(self.max_intron > 0, "Max intron length must be positive");
        if let Some(seed_len) = self.seed_length {
            validate_param!(seed_len >= 20, "Seed length ({}) must be at least 20", seed_len);
        }
        validate_param!(self.read_group.id.is_some() == self.read_group.sample.is_some(),
            "--rg-id and --rg-sample must be specified or omitted together");
        validate_param!(self.segment_length >= 10, "Segment length ({}) must be at least 10", self.segment_length);
        validate_param!(self.segment_mismatches <= 3,
            "Segment mismatches ({}) must be within [0, 3]", self.segment_mismatches);

        if self.color {
            if !self.bowtie1 {
                log::warn!("Bowtie2 does not support colorspace, assuming --bowtie1");
                self.bowtie1 = true;
            }
            validate_param!(!self.fusion.search, "Fusion search is not supported for colorspace reads");
        }
        self.b2.validate()?;
        if !self.bowtie1 && self.fusion.search {
            log::warn!("Fusion search with Bowtie2 may require much memory and produce many spurious fusions. \
                Please try --bowtie1 if this does not work.");
        }
        if let Some(library_type) = &self.library_type {
            validate_param!(LIBRARY_TYPES.contains(&library_type.as_str()),
                "Library type ({}) must be one of: {}", library_type, LIBRARY_TYPES.join(", "));
        }

        validate_param!(self.max_insertion_length < self.segment_length,
            "Max insertion length ({}) must be less than the segment length ({})",
            self.max_insertion_length, self.segment_length);
        validate_param!(self.max_deletion_length < self.min_intron,
            "Max deletion length ({}) must be less than the min intron length ({})",
            self.max_deletion_length, self.min_intron);
        validate_param!(self.read_mismatches <= self.read_edit_dist && self.read_gap_length <= self.read_edit_dist,
            "Read mismatches ({}) and read gap length ({}) must not exceed read edit distance ({}). \
            Either decrease --read-mismatches or --read-gap-length, or increase --read-edit-dist",
            self.read_mismatches, self.read_gap_length, self.read_edit_dist);

        let search = &mut self.search;
        search.max_closure_intron = min(search.max_closure_intron, self.max_intron);
        search.max_coverage_intron = min(search.max_coverage_intron, self.max_intron);
        search.min_segment_intron = min(search.min_segment_intron, self.min_intron);
        search.max_segment_intron = self.max_intron;

        if self.transcriptome_only {
            self.novel_juncs = false;
            self.novel_indels = false;
        }
        if self.read_realign_edit_dist.is_none() {
            self.read_realign_edit_dist = Some(self.read_edit_dist + 1);
        }
        if paired && self.mate_inner_dist.is_none() {
            self.mate_inner_dist = Some(50);
        }
        if self.zipper().is_none() {
            self.unmapped_fifo = false;
        }
        validate_param!(!self.transcriptome_only || self.gtf.is_some() || self.transcriptome_index.is_some(),
            "Transcriptome-only mapping requires annotation (-G) or transcriptome index (--transcriptome-index)");
        Ok(())
    }

    /// Maximal number of segment hits.
    pub fn max_seg_hits(&self) -> u32 {
        max(10, 2 * self.max_hits)
    }

    pub fn realign_edit_dist(&self) -> u32 {
        self.read_realign_edit_dist.unwrap_or(self.read_edit_dist + 1)
    }

    pub fn bowtie2(&self) -> bool {
        !self.bowtie1
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.out_dir.join("logs")
    }

    pub fn tmp_dir(&self) -> PathBuf {
        self.tmp_dir.clone().unwrap_or_else(|| self.out_dir.join("tmp"))
    }

    /// External compressor for the intermediate files.
    pub fn zipper(&self) -> Option<Zipper> {
        Zipper::parse(&self.zpacker, self.threads)
    }

    /// Named pipe is only used for colorspace unmapped reads.
    pub fn use_fifo(&self) -> bool {
        self.unmapped_fifo && self.color && self.zipper().is_some()
    }

    /// Run parameters before the read lengths are known.
    pub fn initial_run_params(&self) -> RunParams {
        RunParams {
            segment_length: self.segment_length,
            coverage_search: self.coverage_search.unwrap_or(false),
            closure_search: self.closure_search.unwrap_or(false),
            integer_quals: self.integer_quals,
            gtf_juncs: None,
            gtf: self.gtf.clone(),
        }
    }

    /// Arguments, common to all helper programs.
    pub fn helper_args(&self, run: &RunParams) -> Vec<String> {
        let mut args: Vec<String> = vec![
            "--min-anchor".into(), self.min_anchor.to_string(),
            "--splice-mismatches".into(), self.splice_mismatches.to_string(),
            "--min-report-intron".into(), self.min_intron.to_string(),
            "--max-report-intron".into(), self.max_intron.to_string(),
            "--min-isoform-fraction".into(), self.min_isoform_fraction.to_string(),
            "--output-dir".into(), dir_arg(&self.out_dir),
            "--max-multihits".into(), self.max_hits.to_string(),
            "--max-seg-multihits".into(), self.max_seg_hits().to_string(),
            "--segment-length".into(), run.segment_length.to_string(),
            "--segment-mismatches".into(), self.segment_mismatches.to_string(),
            "--min-closure-exon".into(), self.search.min_closure_exon.to_string(),
            "--min-closure-intron".into(), self.search.min_closure_intron.to_string(),
            "--max-closure-intron".into(), self.search.max_closure_intron.to_string(),
            "--min-coverage-intron".into(), self.search.min_coverage_intron.to_string(),
            "--max-coverage-intron".into(), self.search.max_coverage_intron.to_string(),
            "--min-segment-intron".into(), self.search.min_segment_intron.to_string(),
            "--max-segment-intron".into(), self.search.max_segment_intron.to_string(),
            "--read-mismatches".into(), self.read_mismatches.to_string(),
            "--read-gap-length".into(), self.read_gap_length.to_string(),
            "--read-edit-dist".into(), self.read_edit_dist.to_string(),
            "--read-realign-edit-dist".into(), self.realign_edit_dist().to_string(),
            "--max-insertion-length".into(), self.max_insertion_length.to_string(),
            "--max-deletion-length".into(), self.max_deletion_length.to_string(),
        ];
        if self.suppress_hits {
            args.push("--suppress-hits".into());
        }
        if self.bowtie1 {
            args.push("--bowtie1".into());
        }
        let fusion = &self.fusion;
        if fusion.search {
            args.extend(["--fusion-search".into(),
                "--fusion-anchor-length".into(), fusion.anchor_length.to_string(),
                "--fusion-min-dist".into(), fusion.min_dist.to_string(),
                "--fusion-read-mismatches".into(), fusion.read_mismatches.to_string(),
                "--fusion-multireads".into(), fusion.multireads.to_string(),
                "--fusion-multipairs".into(), fusion.multipairs.to_string()]);
            if !fusion.ignore_chromosomes.is_empty() {
                args.extend(["--fusion-ignore-chromosomes".into(), fusion.ignore_chromosomes.join(",")]);
            }
            if fusion.do_not_resolve_conflicts {
                args.push("--fusion-do-not-resolve-conflicts".into());
            }
        }
        if let Some(zipper) = self.zipper() {
            args.extend(["-z".into(), zipper.exe.to_string_lossy().into_owned()]);
        }
        if self.threads > 1 {
            args.push(format!("-p{}", self.threads));
        }
        if let Some(dist) = self.mate_inner_dist {
            args.extend(["--inner-dist-mean".into(), dist.to_string(),
                "--inner-dist-std-dev".into(), self.mate_std_dev.to_string()]);
        }
        if let Some(gtf) = &run.gtf {
            args.extend(["--gtf-annotations".into(), gtf.to_string_lossy().into_owned()]);
            if let Some(juncs) = &run.gtf_juncs {
                args.extend(["--gtf-juncs".into(), juncs.to_string_lossy().into_owned()]);
            }
        }
        if !run.closure_search {
            args.push("--no-closure-search".into());
        }
        if !run.coverage_search {
            args.push("--no-coverage-search".into());
        }
        if !self.microexon_search {
            args.push("--no-microexon-search".into());
        }
        if self.solexa_quals {
            args.push("--solexa-quals".into());
        }
        if self.quals {
            args.push("--quals".into());
        }
        if run.integer_quals {
            args.push("--integer-quals".into());
        }
        if self.color {
            args.push("--color".into());
        }
        if let Some(library_type) = &self.library_type {
            args.extend(["--library-type".into(), library_type.clone()]);
        }
        if let Some(id) = &self.read_group.id {
            args.extend(["--rg-id".into(), id.clone()]);
        }
        if self.phred64_quals {
            args.push("--phred64-quals".into());
        }
        args
    }

    /// Bowtie2 penalties, passed to the programs that re-score alignments.
    pub fn penalty_args(&self) -> Vec<String> {
        vec![
            "--bowtie2-max-penalty".into(), self.b2.mp.0.to_string(),
            "--bowtie2-min-penalty".into(), self.b2.mp.1.to_string(),
            "--bowtie2-penalty-for-N".into(), self.b2.np.to_string(),
            "--bowtie2-read-gap-open".into(), self.b2.rdg.0.to_string(),
            "--bowtie2-read-gap-cont".into(), self.b2.rdg.1.to_string(),
            "--bowtie2-ref-gap-open".into(), self.b2.rfg.0.to_string(),
            "--bowtie2-ref-gap-cont".into(), self.b2.rfg.1.to_string(),
        ]
    }

    /// Main parameters in JSON format.
    pub fn to_json(&self) -> json::JsonValue {
        json::object!{
            out_dir: self.out_dir.to_string_lossy().into_owned(),
            threads: self.threads,
            aligner: if self.bowtie1 { "bowtie" } else { "bowtie2" },
            zpacker: self.zipper().map(|z| z.exe.to_string_lossy().into_owned()),
            color: self.color,
            read_mismatches: self.read_mismatches,
            read_gap_length: self.read_gap_length,
            read_edit_dist: self.read_edit_dist,
            read_realign_edit_dist: self.realign_edit_dist(),
            min_anchor: self.min_anchor,
            splice_mismatches: self.splice_mismatches,
            min_intron: self.min_intron,
            max_intron: self.max_intron,
            max_hits: self.max_hits,
            max_seg_hits: self.max_seg_hits(),
            segment_length: self.segment_length,
            segment_mismatches: self.segment_mismatches,
            max_insertion_length: self.max_insertion_length,
            max_deletion_length: self.max_deletion_length,
            novel_juncs: self.novel_juncs,
            novel_indels: self.novel_indels,
            fusion_search: self.fusion.search,
            gtf: self.gtf.as_ref().map(|p| p.to_string_lossy().into_owned()),
            transcriptome_index: self.transcriptome_index.as_ref().map(|p| p.to_string_lossy().into_owned()),
        }
    }
}

/// Directory argument with a trailing slash, as expected by the helper programs.
fn dir_arg(dir: &Path) -> String {
    let mut s = dir.to_string_lossy().into_owned();
    if !s.ends_with('/') {
        s.push('/');
    }
    s
}

/// Parses an integer pair, and converts the error.
pub fn parse_pair(s: &str) -> Result<IntPair, Error> {
    s.parse().map_err(|e: String| error!(InvalidInput, "{}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pairs_and_functions() {
        assert_eq!("6,2".parse::<IntPair>().unwrap(), IntPair(6, 2));
        assert!("6".parse::<IntPair>().is_err());
        assert!("6,-2".parse::<IntPair>().is_err());
        assert!(is_function("S,1,1.25"));
        assert!(is_function("L,-0.6,-0.6"));
        assert!(!is_function("X,1,1"));
        assert!(!is_function("S,1"));
    }

    #[test]
    fn default_config_is_valid() {
        let mut config = Config::default();
        config.validate(false).unwrap();
        assert_eq!(config.realign_edit_dist(), 3);
        assert_eq!(config.max_seg_hits(), 40);
        assert_eq!(config.mate_inner_dist, None);
        let mut paired = Config::default();
        paired.validate(true).unwrap();
        assert_eq!(paired.mate_inner_dist, Some(50));
    }

    #[test]
    fn invalid_parameters() {
        let check = |f: &dyn Fn(&mut Config)| {
            let mut config = Config::default();
            f(&mut config);
            config.validate(false)
        };
        assert!(check(&|c| c.segment_length = 9).is_err());
        assert!(check(&|c| c.segment_mismatches = 4).is_err());
        assert!(check(&|c| c.splice_mismatches = 3).is_err());
        assert!(check(&|c| c.min_anchor = 3).is_err());
        assert!(check(&|c| c.max_insertion_length = 25).is_err());
        assert!(check(&|c| c.max_deletion_length = 50).is_err());
        assert!(check(&|c| c.read_mismatches = 3).is_err());
        assert!(check(&|c| c.read_group.id = Some("rg".into())).is_err());
        assert!(check(&|c| { c.color = true; c.fusion.search = true; }).is_err());
        assert!(check(&|c| c.library_type = Some("fr-other".into())).is_err());
        assert!(check(&|c| { c.b2.add_preset(Preset::Fast); c.b2.add_preset(Preset::Sensitive); }).is_err());
        assert!(check(&|c| c.b2.i = "S,1".into()).is_err());
    }

    #[test]
    fn colorspace_forces_bowtie1() {
        let mut config = Config::default();
        config.color = true;
        config.validate(false).unwrap();
        assert!(config.bowtie1);
        assert!(config.helper_args(&config.initial_run_params()).contains(&"--bowtie1".to_owned()));
    }

    #[test]
    fn helper_arguments() {
        let mut config = Config::default();
        config.out_dir = PathBuf::from("out");
        config.threads = 4;
        config.validate(false).unwrap();
        let mut run = config.initial_run_params();
        run.segment_length = 50;
        run.coverage_search = true;
        let args = config.helper_args(&run);
        let pos = args.iter().position(|a| a == "--segment-length").unwrap();
        assert_eq!(args[pos + 1], "50");
        let pos = args.iter().position(|a| a == "--output-dir").unwrap();
        assert_eq!(args[pos + 1], "out/");
        assert!(args.contains(&"-p4".to_owned()));
        assert!(args.contains(&"--no-closure-search".to_owned()));
        assert!(!args.contains(&"--no-coverage-search".to_owned()));
        assert_eq!(&args[args.len() - 1], "--no-microexon-search");
    }

    #[test]
    fn read_group_line() {
        let mut rg = ReadGroup::default();
        assert_eq!(rg.header_line(None), None);
        rg.id = Some("run1".into());
        rg.sample = Some("s1".into());
        rg.platform = Some("ILLUMINA".into());
        assert_eq!(rg.header_line(Some(200)).unwrap(), "@RG\tID:run1\tSM:s1\tPI:200\tPL:ILLUMINA");
    }
}
