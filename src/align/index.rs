//! Reference indices: presence checks, reference FASTA, SAM headers,
//! transcriptome files and the index of candidate junctions.

use std::{
    fs,
    ffi::OsString,
    path::{Path, PathBuf},
};
use crate::{
    Error,
    err::{add_path, error},
    ext,
    pipeline::Output,
};
use super::{
    Context,
    candidates::CandidateSet,
    config::Config,
};

/// Version of the transcriptome files. Files, written by an older version, are rebuilt.
pub const TRANSCRIPTOME_VERSION: u64 = 209;
/// Shortest anchor around candidate splices, extracted by `juncs_db`.
const JUNCS_DB_ANCHOR: u32 = 3;

/// Genome index together with its reference sequences and SAM header.
#[derive(Clone, Debug)]
pub struct Genome {
    pub index: PathBuf,
    pub fasta: PathBuf,
    pub header: PathBuf,
}

fn index_files(prefix: &Path, ext: &str) -> [PathBuf; 4] {
    [".1.", ".2.", ".rev.1.", ".rev.2."].map(|part| ext::sys::append_path(prefix, format!("{}{}", part, ext)))
}

fn env_prefix(env_dir: Option<&OsString>, prefix: &Path) -> Option<PathBuf> {
    env_dir.map(|dir| {
        let mut s = dir.clone();
        s.push(prefix.as_os_str());
        PathBuf::from(s)
    })
}

fn indices_var(bowtie2: bool) -> &'static str {
    if bowtie2 { "BOWTIE2_INDEXES" } else { "BOWTIE_INDEXES" }
}

/// Checks that all index files are present, either next to `prefix`, or in the `env_dir`.
/// Bowtie2 large indices (`bt2l`) are accepted as well.
pub fn find_index(prefix: &Path, bowtie2: bool, env_dir: Option<&OsString>) -> Result<(), Error> {
    let all_exist = |prefix: &Path, ext: &str| index_files(prefix, ext).iter().all(|path| path.exists());
    let warn_both = |prefix: &Path| {
        if ext::sys::append_path(prefix, ".1.ebwt").exists() && ext::sys::append_path(prefix, ".1.bt2").exists() {
            log::warn!("    Found both Bowtie1 and Bowtie2 indexes");
        }
    };
    let exts: &[&str] = if bowtie2 { &["bt2", "bt2l"] } else { &["ebwt"] };

    for &ext in exts {
        if all_exist(prefix, ext) {
            warn_both(prefix);
            return Ok(());
        }
    }
    if let Some(env_prefix) = env_prefix(env_dir, prefix) {
        for &ext in exts {
            if all_exist(&env_prefix, ext) {
                warn_both(&env_prefix);
                return Ok(());
            }
        }
    }
    Err(error!(InvalidInput, "Could not find Bowtie{} index files ({}.*.{})",
        if bowtie2 { " 2" } else { "" }, ext::fmt::path(prefix), exts[0]))
}

/// Checks index files of the genome or of the transcriptome.
pub fn check_index(ctx: &Context, prefix: &Path, what: &str) -> Result<(), Error> {
    if ctx.checkpoint.active() {
        log::info!("Checking for Bowtie index files ({})", what);
    }
    let bowtie2 = ctx.config.bowtie2();
    find_index(prefix, bowtie2, std::env::var_os(indices_var(bowtie2)).as_ref())
}

/// Finds reference FASTA file `<prefix>.fa`, or reconstructs it from the index.
pub fn reference_fasta(ctx: &Context, prefix: &Path) -> Result<PathBuf, Error> {
    log::info!("Checking for reference FASTA file");
    let fasta = ext::sys::append_path(prefix, ".fa");
    if fasta.exists() {
        return Ok(fasta);
    }
    let env_dir = std::env::var_os(indices_var(ctx.config.bowtie2()));
    if let Some(env_fasta) = env_prefix(env_dir.as_ref(), &fasta) {
        if env_fasta.exists() {
            return Ok(env_fasta);
        }
    }
    log::warn!("    Could not find FASTA file {}", ext::fmt::path(&fasta));
    log::info!("Reconstituting reference FASTA file from Bowtie index");
    let name = prefix.file_name().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
    let out = ctx.tmp_dir.join(format!("{}.fa", name));
    ctx.pipeline()
        .then(ctx.tools.inspect_index(prefix)
            .stdout(Output::File(out.clone()))
            .log(ctx.logs_dir.join("bowtie_inspect_recons.log")))
        .run()?;
    Ok(out)
}

fn sequence_name(line: &str) -> Option<&str> {
    line.split('\t').find_map(|col| col.strip_prefix("SN:"))
}

/// Builds the final SAM header from the aligner header output:
/// `@HD`, optional `@RG`, sequence dictionary (sorted by name unless `keep_order`) and `@PG`.
pub fn build_header(
    raw: &str,
    read_group: Option<String>,
    keep_order: bool,
    command_line: &str,
) -> Result<String, Error>
{
    let mut sequences = Vec::new();
    for line in raw.lines().map(str::trim).filter(|line| line.starts_with("@SQ")) {
        let name = sequence_name(line)
            .ok_or_else(|| error!(InvalidData, "Malformed sequence dictionary in SAM header: {}", line))?;
        sequences.push((name, line));
    }
    if !keep_order {
        sequences.sort_by(|a, b| a.0.cmp(b.0));
    }

    let mut header = String::from("@HD\tVN:1.0\tSO:coordinate\n");
    if let Some(rg) = read_group {
        header.push_str(&rg);
        header.push('\n');
    }
    for (_, line) in sequences {
        header.push_str(line);
        header.push('\n');
    }
    header.push_str(&format!("@PG\tID:{}\tVN:{}\tCL:{}\n", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"),
        command_line));
    Ok(header)
}

/// Generates SAM header `<tmp>/<index name>[_<name>].bwt.samheader.sam` for the index.
/// When the current stage is skipped, only the path is returned.
pub fn generate_header(ctx: &Context, prefix: &Path, name: Option<&str>) -> Result<PathBuf, Error> {
    let index_name = prefix.file_name().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
    let out = ctx.tmp_dir.join(match name {
        Some(name) => format!("{}_{}.bwt.samheader.sam", index_name, name),
        None => format!("{}.bwt.samheader.sam", index_name),
    });
    if ctx.checkpoint.skipping() {
        return Ok(out);
    }
    let raw_file = ctx.tmp_dir.join("temp.samheader.sam");
    ctx.pipeline()
        .then(ctx.tools.index_header(ctx.config, prefix)
            .stdout(Output::File(raw_file.clone()))
            .log(ctx.logs_dir.join("samheader.log")))
        .run()?;
    let raw = fs::read_to_string(&raw_file).map_err(add_path!(raw_file))?;
    let config = ctx.config;
    let header = build_header(&raw, config.read_group.header_line(config.mate_inner_dist), config.keep_fasta_order,
        &ctx.command_line)?;
    fs::write(&out, header).map_err(add_path!(out))?;
    Ok(out)
}

/// Contents of the `<index>.ver` file: version, annotation size and transcript FASTA size.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TranscriptomeVersion {
    pub version: u64,
    pub gtf_size: u64,
    pub fasta_size: u64,
}

impl TranscriptomeVersion {
    pub fn parse(line: &str) -> Option<Self> {
        let mut values = line.split_whitespace().map(|s| s.parse::<u64>().ok());
        Some(Self {
            version: values.next()??,
            gtf_size: values.next()??,
            fasta_size: values.next()??,
        })
    }
}

impl std::fmt::Display for TranscriptomeVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{} {} {}", self.version, self.gtf_size, self.fasta_size)
    }
}

/// Returns true if transcriptome files `<index>.{gff,fa,fa.tlst,ver}` are complete and up to date.
/// If `gtf` is given, it must have the same size as `<index>.gff`.
pub fn validate_transcriptome(index: &Path, gtf: Option<&Path>) -> bool {
    let index_gtf = ext::sys::append_path(index, ".gff");
    if !index_gtf.exists() {
        return false;
    }
    if let Some(gtf) = gtf {
        if gtf != index_gtf && ext::sys::file_size(gtf) != ext::sys::file_size(&index_gtf) {
            return false;
        }
    }
    let fasta = ext::sys::append_path(index, ".fa");
    let Some(ver) = fs::read_to_string(ext::sys::append_path(index, ".ver")).ok()
        .and_then(|s| s.lines().next().and_then(TranscriptomeVersion::parse))
    else {
        return false;
    };
    let fasta_size = ext::sys::file_size(&fasta);
    let gtf_size = ext::sys::file_size(&index_gtf);
    ext::sys::file_size(&ext::sys::append_path(&fasta, ".tlst")) > 0
        && fasta_size > 0 && fasta_size == ver.fasta_size
        && gtf_size > 0 && gtf_size == ver.gtf_size
        && ver.version >= TRANSCRIPTOME_VERSION
}

/// Location of the transcriptome files.
#[derive(Clone, Debug)]
pub struct Transcriptome {
    /// Annotation (copied next to the index, if the index is stored).
    pub gtf: PathBuf,
    pub index: PathBuf,
    /// Directory, where transcriptome files need to be built (None if they are valid already).
    pub build_dir: Option<PathBuf>,
}

/// Finds transcriptome files or decides where to build them.
pub fn resolve_transcriptome(ctx: &Context) -> Result<Option<Transcriptome>, Error> {
    let config = ctx.config;
    let gtf = config.gtf.as_deref();
    if let Some(gtf) = gtf {
        if !gtf.exists() {
            return Err(error!(InvalidInput, "Cannot find transcript file {}", ext::fmt::path(gtf)));
        }
        if ext::sys::file_size(gtf) < 10 {
            return Err(error!(InvalidInput, "Invalid transcript file {}", ext::fmt::path(gtf)));
        }
    }

    let Some(mut index) = config.transcriptome_index.clone() else {
        return Ok(gtf.map(|gtf| Transcriptome {
            gtf: gtf.to_owned(),
            index: ctx.tmp_dir.join(ext::sys::file_basename(gtf)),
            build_dir: Some(ctx.tmp_dir.clone()),
        }));
    };
    if let Some(gtf) = gtf {
        let no_parent = index.parent().map(|p| p.as_os_str().is_empty() || p == Path::new(".")).unwrap_or(true);
        let mut new_subdir = false;
        if no_parent && !index.exists() {
            ext::sys::mkdir(&index)?;
            new_subdir = true;
        }
        if new_subdir || index.is_dir() {
            index = index.join(ext::sys::file_basename(gtf));
        }
    }

    let index_gtf = ext::sys::append_path(&index, ".gff");
    let build_dir = if validate_transcriptome(&index, gtf) {
        check_index(ctx, &index, "transcriptome")?;
        None
    } else {
        let dir = index.parent().map(Path::to_owned).unwrap_or_default();
        if !dir.as_os_str().is_empty() {
            ext::sys::mkdir(&dir)?;
        }
        match gtf {
            Some(gtf) => { fs::copy(gtf, &index_gtf).map_err(add_path!(gtf, index_gtf))?; }
            None => return Err(error!(InvalidInput,
                "Transcriptome index {} is missing or outdated, and no annotation (-G) is provided",
                ext::fmt::path(&index))),
        }
        Some(dir)
    };
    Ok(Some(Transcriptome { gtf: index_gtf, index, build_dir }))
}

/// Writes transcript sequences and builds the transcriptome index.
pub fn build_transcriptome(ctx: &Context, genome_fasta: &Path, transcriptome: &Transcriptome) -> Result<(), Error> {
    if transcriptome.build_dir.is_none() || ctx.checkpoint.skipping() {
        log::info!("Using pre-built transcriptome data..");
        return Ok(());
    }
    let fasta = ext::sys::append_path(&transcriptome.index, ".fa");
    let ver_file = ext::sys::append_path(&transcriptome.index, ".ver");
    log::info!("Building transcriptome data files {}", ext::fmt::path(&transcriptome.index));
    ctx.pipeline()
        .then(ctx.tools.gtf_to_fasta(&ctx.common_args(), &transcriptome.gtf, genome_fasta, &fasta)
            .stdout(Output::File(ctx.logs_dir.join("g2f.out")))
            .log(ctx.logs_dir.join("g2f.err")))
        .run()?;
    let ver = TranscriptomeVersion {
        version: TRANSCRIPTOME_VERSION,
        gtf_size: ext::sys::file_size(&transcriptome.gtf),
        fasta_size: ext::sys::file_size(&fasta),
    };
    fs::write(&ver_file, format!("{}\n", ver)).map_err(add_path!(ver_file))?;

    log::info!("Building Bowtie index from {}", ext::fmt::path(&fasta));
    ctx.pipeline()
        .then(ctx.tools.build_index(ctx.config, &fasta, &transcriptome.index)
            .log(ctx.logs_dir.join("bowtie_build.transcriptome.log")))
        .run()
}

/// Extracts known junctions from the annotation into `<tmp>/<name>.juncs`.
/// Returns None if the annotation contains no junctions.
pub fn gtf_juncs(ctx: &Context, gtf: &Path) -> Result<Option<PathBuf>, Error> {
    log::info!("Reading known junctions from GTF file");
    let name = gtf.file_name().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
    let prefix = name.split('.').next().unwrap_or_default();
    let out = ctx.tmp_dir.join(format!("{}.juncs", prefix));
    let res = ctx.pipeline()
        .then(ctx.tools.gtf_juncs(gtf)
            .stdout(Output::File(out.clone()))
            .log(ctx.logs_dir.join("gtf_juncs.log")))
        .run();
    match res {
        Ok(()) => Ok(Some(out)),
        Err(Error::Subprocess { status, .. }) if status.code() == Some(1) => {
            log::warn!("    Did not find any junctions in GTF file");
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

/// Builds the index of sequences around candidate junctions, insertions, deletions and fusions.
/// The index is reused when the stage is skipped.
pub fn build_juncs_index(
    ctx: &Context,
    genome: &Genome,
    candidates: &CandidateSet,
    max_seg_len: usize,
) -> Result<PathBuf, Error>
{
    let prefix = ctx.tmp_dir.join("segment_juncs");
    let fasta = ext::sys::append_path(&prefix, ".fa");
    if ctx.checkpoint.skipping() && fasta.exists() {
        return Ok(prefix);
    }
    log::info!("Retrieving sequences for splices");
    let config: &Config = ctx.config;
    ctx.pipeline()
        .then(ctx.tools.juncs_db(JUNCS_DB_ANCHOR, max_seg_len, &candidates.index_args(config.bowtie2()),
                &genome.fasta)
            .stdout(Output::File(fasta.clone()))
            .log(ctx.logs_dir.join("juncs_db.log")))
        .run()?;
    log::info!("Indexing splices");
    ctx.pipeline()
        .then(ctx.tools.build_index(config, &fasta, &prefix)
            .stdout(Output::File(ctx.logs_dir.join("bowtie_build.log")))
            .log(ctx.logs_dir.join("bowtie_build.err")))
        .run()?;
    Ok(prefix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path().join("genome");
        assert!(find_index(&prefix, true, None).is_err());
        for path in index_files(&prefix, "bt2l") {
            fs::write(path, "").unwrap();
        }
        assert!(find_index(&prefix, true, None).is_ok());
        assert!(find_index(&prefix, false, None).is_err());

        // Relative prefix, found through the environment directory.
        let env_dir = OsString::from(format!("{}/", dir.path().display()));
        assert!(find_index(Path::new("genome"), true, Some(&env_dir)).is_ok());
        assert!(find_index(Path::new("other"), true, Some(&env_dir)).is_err());
    }

    #[test]
    fn header_sorting() {
        let raw = "@HD\tVN:1.0\tSO:unsorted\n@SQ\tSN:chr2\tLN:200\n@SQ\tSN:chr10\tLN:300\n@SQ\tSN:chr1\tLN:100\n\
            @PG\tID:bowtie2\tPN:bowtie2\tCL:\"bowtie2 -x genome /dev/null\"\n";
        let header = build_header(raw, None, false, "splicemap align genome reads.fq").unwrap();
        let lines: Vec<&str> = header.lines().collect();
        assert_eq!(lines.len(), 5);
        assert_eq!(lines[0], "@HD\tVN:1.0\tSO:coordinate");
        assert_eq!(lines[1], "@SQ\tSN:chr1\tLN:100");
        assert_eq!(lines[2], "@SQ\tSN:chr10\tLN:300");
        assert_eq!(lines[3], "@SQ\tSN:chr2\tLN:200");
        assert!(lines[4].starts_with("@PG\tID:splicemap\tVN:"));
        assert!(lines[4].ends_with("\tCL:splicemap align genome reads.fq"));

        let kept = build_header(raw, Some("@RG\tID:g1\tSM:s1".to_owned()), true, "cmd").unwrap();
        let lines: Vec<&str> = kept.lines().collect();
        assert_eq!(lines[1], "@RG\tID:g1\tSM:s1");
        assert_eq!(lines[2], "@SQ\tSN:chr2\tLN:200");

        assert!(matches!(build_header("@SQ\tLN:100\n", None, false, "cmd"), Err(Error::InvalidData(_))));
    }

    #[test]
    fn transcriptome_files() {
        let dir = tempfile::tempdir().unwrap();
        let index = dir.path().join("genes");
        let gtf = dir.path().join("genes.gtf");
        let gtf_contents = "chr1\tsrc\texon\t100\t200\t.\t+\t.\tgene_id \"g1\"; transcript_id \"t1\";\n";
        fs::write(&gtf, gtf_contents).unwrap();
        assert!(!validate_transcriptome(&index, Some(&gtf)));

        fs::write(ext::sys::append_path(&index, ".gff"), gtf_contents).unwrap();
        fs::write(ext::sys::append_path(&index, ".fa"), ">t1\nACGT\n").unwrap();
        fs::write(ext::sys::append_path(&index, ".fa.tlst"), "0 t1 chr1 + 100-200\n").unwrap();
        let ver = TranscriptomeVersion {
            version: TRANSCRIPTOME_VERSION,
            gtf_size: gtf_contents.len() as u64,
            fasta_size: 9,
        };
        fs::write(ext::sys::append_path(&index, ".ver"), format!("{}\n", ver)).unwrap();
        assert!(validate_transcriptome(&index, Some(&gtf)));
        assert!(validate_transcriptome(&index, None));

        // Annotation differs from the stored one.
        fs::write(&gtf, format!("{}{}", gtf_contents, gtf_contents)).unwrap();
        assert!(!validate_transcriptome(&index, Some(&gtf)));

        // Outdated version.
        fs::write(ext::sys::append_path(&index, ".ver"), format!("208 {} 9\n", gtf_contents.len())).unwrap();
        assert!(!validate_transcriptome(&index, None));
        assert_eq!(TranscriptomeVersion::parse("209 10"), None);
    }
}
