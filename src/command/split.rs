//! Split reads into fixed-length segments.

use std::{
    path::PathBuf,
    time::Instant,
};
use colored::Colorize;
use const_format::str_repeat;
use crate::{
    Error,
    err::{validate_param, error},
    ext,
    pipeline::zio::Zipper,
    seq::segment,
};

struct Args {
    input: Option<PathBuf>,
    prefix: Option<PathBuf>,
    segment_length: u32,
    color: bool,
    zpacker: String,
    threads: u16,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            input: None,
            prefix: None,
            segment_length: 25,
            color: false,
            zpacker: "none".to_owned(),
            threads: 1,
        }
    }
}

impl Args {
    fn validate(self) -> Result<Self, Error> {
        validate_param!(self.segment_length >= 10, "Segment length ({}) must be at least 10", self.segment_length);
        Ok(self)
    }
}

fn print_help() {
    const KEY: usize = 20;
    const VAL: usize = 4;
    const EMPTY: &'static str = str_repeat!(" ", KEY + VAL + 5);

    let defaults = Args::default();
    println!("{}", "Split reads into fixed-length segments.".yellow());

    println!("\n{} {} split -i reads.fq -o prefix [arguments]",
        "Usage:".bold(), super::PROGRAM);

    println!("\n{}", "Input/output arguments:".bold());
    println!("    {:KEY$} {:VAL$}  Reads in FASTA or FASTQ format (optionally gzip compressed).",
        "-i, --input".green(), "FILE".yellow());
    println!("    {:KEY$} {:VAL$}  Output prefix. Segment {} of every read is written into\n\
        {EMPTY}  {}.",
        "-o, --output".green(), "PATH".yellow(), "i".yellow(), "<prefix>_seg<i>.{fq,fa}".cyan());

    println!("\n{}", "Optional parameters:".bold());
    println!("    {:KEY$} {:VAL$}  Segment length [{}].",
        "-l, --segment-length".green(), "INT".yellow(), super::fmt_def(defaults.segment_length));
    println!("    {:KEY$} {:VAL$}  Colorspace reads.",
        "-C, --color".green(), super::flag());
    println!("    {:KEY$} {:VAL$}  Compress segments with this program [{}].",
        "-z, --zpacker".green(), "EXE".yellow(), super::fmt_def(&defaults.zpacker));
    println!("    {:KEY$} {:VAL$}  Number of compression threads [{}].",
        "-p, --num-threads".green(), "INT".yellow(), super::fmt_def(defaults.threads));

    println!("\n{}", "Other parameters:".bold());
    println!("    {:KEY$} {:VAL$}  Show this help message.", "-h, --help".green(), "");
    println!("    {:KEY$} {:VAL$}  Show version.", "-V, --version".green(), "");
}

fn parse_args(argv: &[String]) -> Result<Args, lexopt::Error> {
    if argv.is_empty() {
        print_help();
        std::process::exit(1);
    }
    use lexopt::prelude::*;
    let mut args = Args::default();
    let mut parser = lexopt::Parser::from_args(argv);

    while let Some(arg) = parser.next()? {
        match arg {
            Short('i') | Long("input") => args.input = Some(parser.value()?.parse()?),
            Short('o') | Long("output") => args.prefix = Some(parser.value()?.parse()?),
            Short('l') | Long("segment-length") => args.segment_length = parser.value()?.parse()?,
            Short('C') | Long("color") => args.color = true,
            Short('z') | Long("zpacker") => args.zpacker = parser.value()?.parse()?,
            Short('p') | Long("num-threads") | Long("threads") => args.threads = parser.value()?.parse()?,

            Short('V') | Long("version") => {
                super::print_version();
                std::process::exit(0);
            }
            Short('h') | Long("help") => {
                print_help();
                std::process::exit(0);
            }
            _ => Err(arg.unexpected())?,
        }
    }
    Ok(args)
}

pub(super) fn run(argv: &[String]) -> Result<(), Error> {
    let args = parse_args(argv)?.validate()?;
    super::greet();
    let timer = Instant::now();
    let zipper = match Zipper::parse(&args.zpacker, args.threads) {
        Some(zipper) => Some(zipper.with_exe(ext::sys::find_exe(&zipper.exe)?)),
        None => None,
    };
    let input = args.input.as_deref().ok_or_else(|| error!(InvalidInput, "Input reads are not provided (see -i)"))?;
    let prefix = args.prefix.as_deref().ok_or_else(|| error!(InvalidInput, "Output prefix is not provided (see -o)"))?;
    if let Some(parent) = prefix.parent().filter(|p| !p.as_os_str().is_empty()) {
        ext::sys::mkdir(parent)?;
    }
    log::info!("Splitting {} into segments of length {}", ext::fmt::path(input), args.segment_length);
    let summary = segment::split_reads(input, prefix, args.segment_length as usize, args.color, zipper.as_ref())?;
    log::info!("Split {} reads into {} segment files", summary.reads, summary.files.len());
    if summary.skipped > 0 {
        log::warn!("{} reads were skipped due to ambiguous colors at segment boundaries", summary.skipped);
    }
    for file in &summary.files {
        log::debug!("    {}", ext::fmt::path(file));
    }
    log::info!("Success. Total time: {}", ext::fmt::Duration(timer.elapsed()));
    Ok(())
}
