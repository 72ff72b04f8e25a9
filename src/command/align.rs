//! Align RNA-seq reads and discover splice junctions.

use std::{
    path::PathBuf,
    time::Instant,
};
use colored::Colorize;
use const_format::str_repeat;
use crate::{
    Error,
    err::validate_param,
    ext,
    align::{
        self, Context,
        config::{Config, Preset, LIBRARY_TYPES},
        prep::Inputs,
        tools::Tools,
    },
    stage::{self, Stage},
};

struct Args {
    config: Config,
    /// Positional arguments: index prefix, followed by the read lists.
    positional: Vec<String>,
    index: Option<PathBuf>,
    inputs: Inputs,
    resume: Option<PathBuf>,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            config: Config::default(),
            positional: Vec::new(),
            index: None,
            inputs: Inputs::default(),
            resume: None,
        }
    }
}

fn split_list(list: &str) -> Vec<PathBuf> {
    list.split(',').filter(|s| !s.is_empty()).map(PathBuf::from).collect()
}

impl Args {
    /// Distributes positional arguments: `index left[,..] [right[,..]]`,
    /// or `index left left_quals [right right_quals]` with separate quality files.
    fn assign_positional(&mut self) -> Result<(), Error> {
        let mut positional = std::mem::take(&mut self.positional).into_iter();
        self.index = positional.next().map(PathBuf::from);
        let rest: Vec<String> = positional.collect();
        let inputs = &mut self.inputs;
        if self.config.quals {
            validate_param!(rest.len() <= 4, "Too many positional arguments ({})", rest.len() + 1);
            validate_param!(rest.len() % 2 == 0,
                "Separate quality files (-Q) are required for every read list");
            if rest.len() >= 2 {
                inputs.left = split_list(&rest[0]);
                inputs.left_quals = split_list(&rest[1]);
            }
            if rest.len() == 4 {
                inputs.right = split_list(&rest[2]);
                inputs.right_quals = split_list(&rest[3]);
            }
        } else {
            validate_param!(rest.len() <= 2, "Too many positional arguments ({})", rest.len() + 1);
            if let Some(left) = rest.get(0) {
                inputs.left = split_list(left);
            }
            if let Some(right) = rest.get(1) {
                inputs.right = split_list(right);
            }
        }
        Ok(())
    }

    fn validate(mut self) -> Result<Self, Error> {
        self.assign_positional()?;
        validate_param!(self.index.is_some(), "Genome index prefix is not provided");
        if self.inputs.left.is_empty() {
            validate_param!(self.config.gtf.is_some() && self.config.transcriptome_index.is_some(),
                "Reads are not provided. Without reads, only transcriptome files can be built \
                (requires both -G and --transcriptome-index)");
        }
        for path in self.inputs.all_files() {
            validate_param!(path.exists(), "Reads file {} does not exist", ext::fmt::path(path));
        }
        self.config.validate(self.inputs.paired())?;
        Ok(self)
    }
}

fn print_help(extended: bool) {
    const KEY: usize = 26;
    const VAL: usize = 5;
    const EMPTY: &'static str = str_repeat!(" ", KEY + VAL + 5);

    let defaults = Config::default();
    println!("{}", "Align RNA-seq reads to the genome and discover splice junctions.".yellow());

    println!("\n{} {} align [arguments] index reads1[,...] [reads2[,...]]",
        "Usage:".bold(), super::PROGRAM);
    println!("       {} align -R out_dir", super::PROGRAM);
    if !extended {
        println!("\nThis is a {} help message. Please use {} to see the full help.",
            "short".red(), "-H/--full-help".green());
    }

    println!("\n{}", "Input/output arguments:".bold());
    println!("    {:KEY$} {:VAL$}  Output directory [{}].",
        "-o, --output-dir".green(), "DIR".yellow(), super::fmt_def(defaults.out_dir.display()));
    println!("    {:KEY$} {:VAL$}  Resume an interrupted run from the output directory.\n\
        {EMPTY}  All other arguments are taken from the interrupted run.",
        "-R, --resume".green(), "DIR".yellow());
    println!("    {:KEY$} {:VAL$}  Gene annotation in GTF/GFF3 format.",
        "-G, --GTF".green(), "FILE".yellow());
    println!("    {:KEY$} {:VAL$}  Transcriptome index prefix (built from {} if missing).",
        "    --transcriptome-index".green(), "PATH".yellow(), "-G".green());
    println!("    {:KEY$} {:VAL$}  Map reads only to the transcriptome.",
        "-T, --transcriptome-only".green(), super::flag());
    println!("    {:KEY$} {:VAL$}  Known junctions, insertions and deletions.",
        "-j, --raw-juncs".green(), "FILE".yellow());
    println!("    {:KEY$} {:VAL$}  Known insertions.",
        "    --insertions".green(), "FILE".yellow());
    println!("    {:KEY$} {:VAL$}  Known deletions.",
        "    --deletions".green(), "FILE".yellow());

    println!("\n{}", "Read arguments:".bold());
    println!("    {:KEY$} {:VAL$}  Colorspace reads.",
        "-C, --color".green(), super::flag());
    println!("    {:KEY$} {:VAL$}  Qualities are stored in separate files.",
        "-Q, --quals".green(), super::flag());
    println!("    {:KEY$} {:VAL$}  Expected inner distance between mates [{}].",
        "-r, --mate-inner-dist".green(), "INT".yellow(), super::fmt_def(50));
    println!("    {:KEY$} {:VAL$}  Standard deviation of the inner distance [{}].",
        "    --mate-std-dev".green(), "INT".yellow(), super::fmt_def(defaults.mate_std_dev));
    println!("    {:KEY$} {:VAL$}  Library type: {}.",
        "    --library-type".green(), "STR".yellow(), LIBRARY_TYPES.join(", "));
    println!("    {:KEY$} {:VAL$}  Use at most this many first bases of each read [{}].",
        "-s, --seed-length".green(), "INT".yellow(), super::fmt_def_opt(&defaults.seed_length));

    println!("\n{}", "Alignment arguments:".bold());
    println!("    {:KEY$} {:VAL$}  Use Bowtie 1 instead of Bowtie 2.",
        "    --bowtie1".green(), super::flag());
    println!("    {:KEY$} {:VAL$}  Final read alignments may have at most {} mismatches [{}].",
        "-N, --read-mismatches".green(), "INT".yellow(), "INT".yellow(), super::fmt_def(defaults.read_mismatches));
    println!("    {:KEY$} {:VAL$}  Maximal total length of read gaps [{}].",
        "    --read-gap-length".green(), "INT".yellow(), super::fmt_def(defaults.read_gap_length));
    println!("    {:KEY$} {:VAL$}  Maximal edit distance of the final alignments [{}].",
        "    --read-edit-dist".green(), "INT".yellow(), super::fmt_def(defaults.read_edit_dist));
    println!("    {:KEY$} {:VAL$}  Minimal anchor length around junctions [{}].",
        "-a, --min-anchor".green(), "INT".yellow(), super::fmt_def(defaults.min_anchor));
    println!("    {:KEY$} {:VAL$}  Maximal mismatches in the junction anchors [{}].",
        "-m, --splice-mismatches".green(), "INT".yellow(), super::fmt_def(defaults.splice_mismatches));
    println!("    {:KEY$} {:VAL$}  Minimal intron length [{}].",
        "-i, --min-intron-length".green(), "INT".yellow(), super::fmt_def(defaults.min_intron));
    println!("    {:KEY$} {:VAL$}  Maximal intron length [{}].",
        "-I, --max-intron-length".green(), "INT".yellow(), super::fmt_def(defaults.max_intron));
    println!("    {:KEY$} {:VAL$}  Report at most this many alignments per read [{}].",
        "-g, --max-multihits".green(), "INT".yellow(), super::fmt_def(defaults.max_hits));
    println!("    {:KEY$} {:VAL$}  Filter out multi-mapped reads before the alignment.",
        "-M, --prefilter-multihits".green(), super::flag());
    println!("    {:KEY$} {:VAL$}  Reads are split into segments of this length [{}].",
        "    --segment-length".green(), "INT".yellow(), super::fmt_def(defaults.segment_length));
    println!("    {:KEY$} {:VAL$}  Maximal mismatches in the segment alignments [{}].",
        "    --segment-mismatches".green(), "INT".yellow(), super::fmt_def(defaults.segment_mismatches));

    println!("\n{}", "Junction search:".bold());
    println!("    {:KEY$} {:VAL$}  Only look for known junctions and indels.",
        "    --no-novel-juncs".green(), super::flag());
    println!("    {:KEY$} {:VAL$}  Do not look for novel indels.",
        "    --no-novel-indels".green(), super::flag());
    println!("    {:KEY$} {:VAL$}  Do not use junctions from the annotation.",
        "    --no-gtf-juncs".green(), super::flag());
    println!("    {:KEY$} {:VAL$}  Enable/disable coverage-based junction search\n\
        {EMPTY}  [{}: only for reads with less than 3 segments].",
        "    --(no-)coverage-search".green(), super::flag(), super::fmt_def("auto"));
    println!("    {:KEY$} {:VAL$}  Enable/disable closure-based junction search [{}].",
        "    --(no-)closure-search".green(), super::flag(), super::fmt_def("off"));
    println!("    {:KEY$} {:VAL$}  Search for fusions.",
        "    --fusion-search".green(), super::flag());

    if extended {
        println!("\n{}", "Additional alignment arguments:".bold());
        println!("    {:KEY$} {:VAL$}  Maximal edit distance when realigning reads [{}].",
            "    --read-realign-edit-dist".green(), "INT".yellow(), super::fmt_def("read-edit-dist + 1"));
        println!("    {:KEY$} {:VAL$}  Use Bowtie 1 `-n` mode for the whole-read mapping.",
            "    --bowtie-n".green(), super::flag());
        println!("    {:KEY$} {:VAL$}  Minimal isoform fraction [{}].",
            "-F, --min-isoform-fraction".green(), "FLOAT".yellow(), super::fmt_def(defaults.min_isoform_fraction));
        println!("    {:KEY$} {:VAL$}  Maximal transcriptome hits per read [{}].",
            "-x, --transcriptome-max-hits".green(), "INT".yellow(), super::fmt_def(defaults.t_max_hits));
        println!("    {:KEY$} {:VAL$}  Do not report reads with too many hits.",
            "    --suppress-hits".green(), super::flag());
        println!("    {:KEY$} {:VAL$}  Maximal insertion length [{}].",
            "    --max-insertion-length".green(), "INT".yellow(), super::fmt_def(defaults.max_insertion_length));
        println!("    {:KEY$} {:VAL$}  Maximal deletion length [{}].",
            "    --max-deletion-length".green(), "INT".yellow(), super::fmt_def(defaults.max_deletion_length));
        println!("    {:KEY$} {:VAL$}  Qualities are integers.",
            "    --integer-quals".green(), super::flag());
        println!("    {:KEY$} {:VAL$}  Solexa qualities.",
            "    --solexa-quals".green(), super::flag());
        println!("    {:KEY$} {:VAL$}  Phred+64 qualities.",
            "    --phred64-quals".green(), super::flag());
        println!("    {:KEY$} {:VAL$}  Search for microexons.",
            "    --microexon-search".green(), super::flag());

        println!("\n{}", "Search limits:".bold());
        let search = &defaults.search;
        for (key, val) in [
            ("    --min-closure-exon", search.min_closure_exon),
            ("    --min-closure-intron", search.min_closure_intron),
            ("    --max-closure-intron", search.max_closure_intron),
            ("    --min-coverage-intron", search.min_coverage_intron),
            ("    --max-coverage-intron", search.max_coverage_intron),
            ("    --min-segment-intron", search.min_segment_intron),
            ("    --max-segment-intron", search.max_segment_intron),
        ] {
            println!("    {:KEY$} {:VAL$}  [{}]", key.green(), "INT".yellow(), super::fmt_def(val));
        }

        println!("\n{}", "Fusion search:".bold());
        let fusion = &defaults.fusion;
        for (key, val) in [
            ("    --fusion-anchor-length", fusion.anchor_length),
            ("    --fusion-min-dist", fusion.min_dist),
            ("    --fusion-read-mismatches", fusion.read_mismatches),
            ("    --fusion-multireads", fusion.multireads),
            ("    --fusion-multipairs", fusion.multipairs),
        ] {
            println!("    {:KEY$} {:VAL$}  [{}]", key.green(), "INT".yellow(), super::fmt_def(val));
        }
        println!("    {:KEY$} {:VAL$}  Comma-separated chromosomes, ignored in the fusion search.",
            "    --fusion-ignore-chromosomes".green(), "STR".yellow());
        println!("    {:KEY$} {:VAL$}  Do not resolve conflicting fusions.",
            "    --fusion-do-not-resolve-conflicts".green(), super::flag());

        println!("\n{}", "Bowtie 2 arguments:".bold());
        println!("    {:KEY$} {:VAL$}  Presets (at most one).",
            "    --b2-very-fast, --b2-fast".green(), super::flag());
        println!("    {:KEY$} {:VAL$}",
            "    --b2-sensitive, --b2-very-sensitive".green(), super::flag());
        let b2 = &defaults.b2;
        println!("    {:KEY$} {:VAL$}  Seed mismatches [{}], length [{}] and interval function [{}].",
            "    --b2-N, --b2-L, --b2-i".green(), "".yellow(),
            super::fmt_def(b2.n), super::fmt_def(b2.l), super::fmt_def(&b2.i));
        println!("    {:KEY$} {:VAL$}  Function for the maximal number of Ns [{}].",
            "    --b2-n-ceil".green(), "FUNC".yellow(), super::fmt_def(&b2.n_ceil));
        println!("    {:KEY$} {:VAL$}  Gap barrier [{}], N penalty [{}].",
            "    --b2-gbar, --b2-np".green(), "INT".yellow(), super::fmt_def(b2.gbar), super::fmt_def(b2.np));
        println!("    {:KEY$} {:VAL$}  Mismatch [{}], read gap [{}] and reference gap [{}] penalties.",
            "    --b2-mp, --b2-rdg, --b2-rfg".green(), "INT,INT".yellow(),
            super::fmt_def(b2.mp), super::fmt_def(b2.rdg), super::fmt_def(b2.rfg));
        println!("    {:KEY$} {:VAL$}  Minimal alignment score function.",
            "    --b2-score-min".green(), "FUNC".yellow());
        println!("    {:KEY$} {:VAL$}  Seed extension attempts [{}], reseeds [{}].",
            "    --b2-D, --b2-R".green(), "INT".yellow(), super::fmt_def(b2.d), super::fmt_def(b2.r));
        println!("    {:KEY$} {:VAL$}  Filter hits by alignment score and edit distance.",
            "    --b2-score-filter".green(), super::flag());

        println!("\n{}", "Read group:".bold());
        println!("    {:KEY$} {:VAL$}  Read group ID and sample (both required for the @RG line).",
            "    --rg-id, --rg-sample".green(), "STR".yellow());
        println!("    {:KEY$} {:VAL$}  Other fields: --rg-library, --rg-description,\n\
            {EMPTY}  --rg-platform-unit, --rg-center, --rg-date, --rg-platform.",
            "    --rg-*".green(), "STR".yellow());

        println!("\n{}", "Reporting:".bold());
        println!("    {:KEY$} {:VAL$}  Do not sort the final alignments.",
            "    --no-sort-bam".green(), super::flag());
        println!("    {:KEY$} {:VAL$}  Write final alignments in SAM format.",
            "    --no-convert-bam".green(), super::flag());
        println!("    {:KEY$} {:VAL$}  Keep reference order in the SAM header.",
            "    --keep-fasta-order".green(), super::flag());
        println!("    {:KEY$} {:VAL$}  Report secondary alignments.",
            "    --report-secondary-alignments".green(), super::flag());
        println!("    {:KEY$} {:VAL$}  Do not report discordant/mixed pair alignments.",
            "    --no-discordant, --no-mixed".green(), super::flag());
    }

    println!("\n{}", "Execution arguments:".bold());
    println!("    {:KEY$} {:VAL$}  Number of threads [{}].",
        "-p, --num-threads".green(), "INT".yellow(), super::fmt_def(defaults.threads));
    println!("    {:KEY$} {:VAL$}  Temporary directory [{}].",
        "    --tmp-dir".green(), "DIR".yellow(), super::fmt_def("<out>/tmp"));
    println!("    {:KEY$} {:VAL$}  Keep temporary files.",
        "    --keep-tmp".green(), super::flag());
    println!("    {:KEY$} {:VAL$}  Compression program for temporary files, {} to disable [{}].",
        "-z, --zpacker".green(), "EXE".yellow(), "none".yellow(), super::fmt_def(&defaults.zpacker));
    if extended {
        println!("    {:KEY$} {:VAL$}  Compress unmapped colorspace reads through a named pipe.",
            "-X, --unmapped-fifo".green(), super::flag());
        println!("    {:KEY$} {:VAL$}  Directory with the helper programs.",
            "    --bin-dir".green(), "DIR".yellow());
        println!("    {:KEY$} {:VAL$}  Samtools executable [{}].",
            "    --samtools".green(), "EXE".yellow(), super::fmt_def(defaults.samtools.display()));
    }

    println!("\n{}", "Other arguments:".bold());
    println!("    {:KEY$} {:VAL$}  Show short help message.", "-h, --help".green(), "");
    println!("    {:KEY$} {:VAL$}  Show extended help message.", "-H, --full-help".green(), "");
    println!("    {:KEY$} {:VAL$}  Show version.", "-V, --version".green(), "");
}

fn parse_args(argv: &[String]) -> Result<Args, lexopt::Error> {
    if argv.is_empty() {
        print_help(false);
        std::process::exit(1);
    }
    use lexopt::prelude::*;
    let mut args = Args::default();
    let mut parser = lexopt::Parser::from_args(argv);
    let config = &mut args.config;

    while let Some(arg) = parser.next()? {
        match arg {
            Short('o') | Long("output-dir") => config.out_dir = parser.value()?.parse()?,
            Short('R') | Long("resume") => args.resume = Some(parser.value()?.parse()?),
            Short('G') | Long("GTF") => config.gtf = Some(parser.value()?.parse()?),
            Long("transcriptome-index") => config.transcriptome_index = Some(parser.value()?.parse()?),
            Short('T') | Long("transcriptome-only") => config.transcriptome_only = true,
            Short('j') | Long("raw-juncs") => config.raw_juncs = Some(parser.value()?.parse()?),
            Long("insertions") => config.raw_insertions = Some(parser.value()?.parse()?),
            Long("deletions") => config.raw_deletions = Some(parser.value()?.parse()?),

            Short('C') | Long("color") => config.color = true,
            Short('Q') | Long("quals") => config.quals = true,
            Long("integer-quals") => config.integer_quals = true,
            Long("solexa-quals") | Long("solexa1.3-quals") => config.solexa_quals = true,
            Long("phred64-quals") => config.phred64_quals = true,
            Short('r') | Long("mate-inner-dist") => config.mate_inner_dist = Some(parser.value()?.parse()?),
            Long("mate-std-dev") => config.mate_std_dev = parser.value()?.parse()?,
            Long("library-type") => config.library_type = Some(parser.value()?.parse()?),
            Short('s') | Long("seed-length") => config.seed_length = Some(parser.value()?.parse()?),

            Long("bowtie1") => config.bowtie1 = true,
            Long("bowtie-n") => config.bowtie_n = true,
            Short('N') | Long("read-mismatches") => config.read_mismatches = parser.value()?.parse()?,
            Long("read-gap-length") => config.read_gap_length = parser.value()?.parse()?,
            Long("read-edit-dist") => config.read_edit_dist = parser.value()?.parse()?,
            Long("read-realign-edit-dist") => config.read_realign_edit_dist = Some(parser.value()?.parse()?),
            Short('a') | Long("min-anchor") | Long("min-anchor-length") =>
                config.min_anchor = parser.value()?.parse()?,
            Short('m') | Long("splice-mismatches") => config.splice_mismatches = parser.value()?.parse()?,
            Short('i') | Long("min-intron-length") => config.min_intron = parser.value()?.parse()?,
            Short('I') | Long("max-intron-length") => config.max_intron = parser.value()?.parse()?,
            Short('F') | Long("min-isoform-fraction") => config.min_isoform_fraction = parser.value()?.parse()?,
            Short('g') | Long("max-multihits") => config.max_hits = parser.value()?.parse()?,
            Short('x') | Long("transcriptome-max-hits") => config.t_max_hits = parser.value()?.parse()?,
            Long("suppress-hits") => config.suppress_hits = true,
            Short('M') | Long("prefilter-multihits") => config.prefilter_multihits = true,
            Long("max-insertion-length") => config.max_insertion_length = parser.value()?.parse()?,
            Long("max-deletion-length") => config.max_deletion_length = parser.value()?.parse()?,
            Long("segment-length") => config.segment_length = parser.value()?.parse()?,
            Long("segment-mismatches") => config.segment_mismatches = parser.value()?.parse()?,

            Long("no-novel-juncs") => config.novel_juncs = false,
            Long("no-novel-indels") => config.novel_indels = false,
            Long("no-gtf-juncs") => config.gtf_juncs = false,
            Long("coverage-search") => config.coverage_search = Some(true),
            Long("no-coverage-search") => config.coverage_search = Some(false),
            Long("closure-search") => config.closure_search = Some(true),
            Long("no-closure-search") => config.closure_search = Some(false),
            Long("microexon-search") => config.microexon_search = true,
            Long("min-closure-exon") => config.search.min_closure_exon = parser.value()?.parse()?,
            Long("min-closure-intron") => config.search.min_closure_intron = parser.value()?.parse()?,
            Long("max-closure-intron") => config.search.max_closure_intron = parser.value()?.parse()?,
            Long("min-coverage-intron") => config.search.min_coverage_intron = parser.value()?.parse()?,
            Long("max-coverage-intron") => config.search.max_coverage_intron = parser.value()?.parse()?,
            Long("min-segment-intron") => config.search.min_segment_intron = parser.value()?.parse()?,
            Long("max-segment-intron") => config.search.max_segment_intron = parser.value()?.parse()?,

            Long("fusion-search") => config.fusion.search = true,
            Long("fusion-anchor-length") => config.fusion.anchor_length = parser.value()?.parse()?,
            Long("fusion-min-dist") => config.fusion.min_dist = parser.value()?.parse()?,
            Long("fusion-read-mismatches") => config.fusion.read_mismatches = parser.value()?.parse()?,
            Long("fusion-multireads") => config.fusion.multireads = parser.value()?.parse()?,
            Long("fusion-multipairs") => config.fusion.multipairs = parser.value()?.parse()?,
            Long("fusion-ignore-chromosomes") => config.fusion.ignore_chromosomes = parser.value()?.string()?
                .split(',').filter(|s| !s.is_empty()).map(str::to_owned).collect(),
            Long("fusion-do-not-resolve-conflicts") => config.fusion.do_not_resolve_conflicts = true,

            Long("b2-very-fast") => config.b2.add_preset(Preset::VeryFast),
            Long("b2-fast") => config.b2.add_preset(Preset::Fast),
            Long("b2-sensitive") => config.b2.add_preset(Preset::Sensitive),
            Long("b2-very-sensitive") => config.b2.add_preset(Preset::VerySensitive),
            Long("b2-N") => config.b2.n = parser.value()?.parse()?,
            Long("b2-L") => config.b2.l = parser.value()?.parse()?,
            Long("b2-i") => config.b2.i = parser.value()?.parse()?,
            Long("b2-n-ceil") => config.b2.n_ceil = parser.value()?.parse()?,
            Long("b2-gbar") => config.b2.gbar = parser.value()?.parse()?,
            Long("b2-mp") => config.b2.mp = parser.value()?.parse()?,
            Long("b2-np") => config.b2.np = parser.value()?.parse()?,
            Long("b2-rdg") => config.b2.rdg = parser.value()?.parse()?,
            Long("b2-rfg") => config.b2.rfg = parser.value()?.parse()?,
            Long("b2-score-min") => config.b2.score_min = Some(parser.value()?.parse()?),
            Long("b2-D") => config.b2.d = parser.value()?.parse()?,
            Long("b2-R") => config.b2.r = parser.value()?.parse()?,
            Long("b2-score-filter") => config.b2_score_filter = true,

            Long("rg-id") => config.read_group.id = Some(parser.value()?.parse()?),
            Long("rg-sample") => config.read_group.sample = Some(parser.value()?.parse()?),
            Long("rg-library") => config.read_group.library = Some(parser.value()?.parse()?),
            Long("rg-description") => config.read_group.description = Some(parser.value()?.parse()?),
            Long("rg-platform-unit") => config.read_group.platform_unit = Some(parser.value()?.parse()?),
            Long("rg-center") => config.read_group.center = Some(parser.value()?.parse()?),
            Long("rg-date") => config.read_group.date = Some(parser.value()?.parse()?),
            Long("rg-platform") => config.read_group.platform = Some(parser.value()?.parse()?),

            Long("no-sort-bam") => config.sort_bam = false,
            Long("no-convert-bam") => config.convert_bam = false,
            Long("keep-fasta-order") => config.keep_fasta_order = true,
            Long("report-secondary-alignments") => config.report_secondary = true,
            Long("no-discordant") => config.report_discordant = false,
            Long("no-mixed") => config.report_mixed = false,

            Short('p') | Long("num-threads") | Long("threads") => config.threads = parser.value()?.parse()?,
            Long("tmp-dir") => config.tmp_dir = Some(parser.value()?.parse()?),
            Long("keep-tmp") => config.keep_tmp = true,
            Short('z') | Long("zpacker") => config.zpacker = parser.value()?.parse()?,
            Short('X') | Long("unmapped-fifo") => config.unmapped_fifo = true,
            Long("bin-dir") => config.bin_dir = Some(parser.value()?.parse()?),
            Long("samtools") => config.samtools = parser.value()?.parse()?,

            Value(val) => args.positional.push(val.string()?),
            Short('V') | Long("version") => {
                super::print_version();
                std::process::exit(0);
            }
            Short('h') | Long("help") => {
                print_help(false);
                std::process::exit(0);
            }
            Short('H') | Long("full-help") => {
                print_help(true);
                std::process::exit(0);
            }
            _ => Err(arg.unexpected())?,
        }
    }
    Ok(args)
}

/// Arguments of the subcommand within a full command line: everything after `align`.
fn subcommand_args(argv: &[String]) -> &[String] {
    match argv.iter().position(|arg| arg == "align") {
        Some(i) => &argv[i + 1..],
        None => argv.get(1..).unwrap_or(&[]),
    }
}

/// Loads arguments of the interrupted run in `out_dir`, and finds the stage to continue from.
fn load_resumed(out_dir: PathBuf) -> Result<(Args, Stage, String), Error> {
    let point = stage::resolve_resume(&out_dir.join("logs"))?;
    log::info!("Resuming run in {} from stage {}", ext::fmt::path(&out_dir), point.stage.to_string().yellow());
    let mut args = parse_args(subcommand_args(&point.argv))?;
    validate_param!(args.resume.is_none(), "Recorded command line of the interrupted run contains --resume");
    args.config.out_dir = out_dir;
    Ok((args, point.stage, point.argv.join(" ")))
}

pub(super) fn run(argv: &[String]) -> Result<(), Error> {
    let mut args = parse_args(argv)?;
    super::greet();
    let timer = Instant::now();
    let (args, resume, command_line) = match args.resume.take() {
        Some(out_dir) => load_resumed(out_dir)?,
        None => (args, Stage::Start, std::env::args().collect::<Vec<_>>().join(" ")),
    };
    let mut args = args.validate()?;
    let tools = Tools::locate(&mut args.config)?;
    let config = args.config;
    let index = args.index.unwrap_or_default();

    let mut ctx = Context::new(&config, &tools, command_line, resume)?;
    log::debug!("Output directory: {}", ext::fmt::path(&ctx.out_dir));
    if args.inputs.left.is_empty() {
        align::build_transcriptome_only(&mut ctx, &index)?;
    } else {
        align::run(&mut ctx, &index, &args.inputs)?;
    }
    log::info!("Success. Total time: {}", ext::fmt::Duration(timer.elapsed()));
    Ok(())
}
