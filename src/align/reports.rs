//! Final reports: junction, insertion, deletion and fusion tracks,
//! and the merged (optionally sorted) alignments.

use std::{
    fs,
    path::{Path, PathBuf},
};
use crate::{
    Error,
    err::add_path,
    ext,
    pipeline::fanout,
};
use super::{
    Context,
    index::Genome,
    prep::SIDES,
    tools::join_paths,
};

/// Output tracks in the order, expected by `tophat_reports`.
pub const TRACKS: [&str; 4] = ["junctions.bed", "insertions.bed", "deletions.bed", "fusions.out"];
pub const ACCEPTED_HITS: &str = "accepted_hits";
pub const UNMAPPED: &str = "unmapped.bam";

/// Per-thread partial files `<prefix><i><suffix>`, `i < threads`, until the first missing file.
pub fn partial_files(prefix: &Path, suffix: &str, threads: u16) -> Vec<PathBuf> {
    (0..threads)
        .map(|i| ext::sys::append_path(prefix, format!("{}{}", i, suffix)))
        .take_while(|path| path.exists())
        .collect()
}

fn remove_all(paths: &[PathBuf]) -> Result<(), Error> {
    for path in paths {
        fs::remove_file(path).map_err(add_path!(path))?;
    }
    Ok(())
}

fn move_file(from: &Path, to: &Path) -> Result<(), Error> {
    if fs::rename(from, to).is_err() {
        // Different file systems.
        fs::copy(from, to).map_err(add_path!(from, to))?;
        fs::remove_file(from).map_err(add_path!(from))?;
    }
    Ok(())
}

/// Runs `tophat_reports` over the final per-side mappings (`maps[i]` for reads `reads[i]`),
/// then sorts and merges partial alignment files into `<out>/accepted_hits.{bam,sam}`,
/// and merges unmapped reads into `<out>/unmapped.bam`.
pub fn compile_reports(ctx: &Context, genome: &Genome, maps: &[Vec<PathBuf>], reads: &[PathBuf]) -> Result<(), Error> {
    log::info!("Reporting output tracks");
    let config = ctx.config;
    let tools = ctx.tools;
    let tracks = TRACKS.map(|name| ctx.out_dir.join(name));
    let parts_prefix = ctx.tmp_dir.join(ACCEPTED_HITS);
    let sides: Vec<(String, &Path)> = maps.iter().zip(reads)
        .map(|(side_maps, side_reads)| (join_paths(side_maps), side_reads.as_path()))
        .collect();
    ctx.pipeline()
        .then(tools.tophat_reports(config, &ctx.common_args(), &genome.header, &genome.fasta, &tracks,
            &parts_prefix, &sides).log(ctx.logs_dir.join("reports.log")))
        .run()?;

    let mut parts = partial_files(&parts_prefix, ".bam", config.threads);
    if parts.is_empty() {
        log::warn!("No alignments were reported");
    } else {
        if config.sort_bam {
            let sorted: Vec<PathBuf> = (0..parts.len())
                .map(|i| ext::sys::append_path(&parts_prefix, format!("{}_sorted.bam", i)))
                .collect();
            let jobs = parts.iter().zip(&sorted).enumerate()
                .map(|(i, (part, out))| ctx.pipeline().then(tools.samtools_sort(part, out)
                    .log(ctx.logs_dir.join(format!("reports.samtools_sort.log{}", i)))))
                .collect();
            fanout::run_all(jobs, usize::from(config.threads))?;
            remove_all(&parts)?;
            parts = sorted;
        }
        merge_alignments(ctx, genome, &parts)?;
    }
    merge_unmapped(ctx, genome, maps.len())
}

fn merge_alignments(ctx: &Context, genome: &Genome, parts: &[PathBuf]) -> Result<(), Error> {
    let config = ctx.config;
    let tools = ctx.tools;
    let bam = ctx.out_dir.join(format!("{}.bam", ACCEPTED_HITS));
    let sam = ctx.out_dir.join(format!("{}.sam", ACCEPTED_HITS));
    let to_sam_log = ctx.logs_dir.join("accepted_hits_bam_to_sam.log");
    if parts.len() == 1 {
        move_file(&parts[0], &bam)?;
        if !config.convert_bam {
            ctx.pipeline().then(tools.samtools_view(&bam, &sam).log(to_sam_log)).run()?;
            fs::remove_file(&bam).map_err(add_path!(bam))?;
        }
        return Ok(());
    }

    let output = if config.convert_bam { bam.as_path() } else { Path::new("-") };
    let merge = if config.sort_bam {
        tools.samtools_merge(&genome.header, output, parts, !config.convert_bam)
    } else {
        tools.bam_merge(&genome.header, output, parts)
    }.log(ctx.logs_dir.join("reports.merge_bam.log"));
    let mut pipeline = ctx.pipeline().then(merge);
    if !config.convert_bam {
        pipeline.push(tools.samtools_view(Path::new("-"), &sam).log(to_sam_log));
    }
    pipeline.run()?;
    remove_all(parts)
}

/// Unmapped reads of each thread and side: `<tmp>/unmapped_<side>_<i>.bam`.
fn merge_unmapped(ctx: &Context, genome: &Genome, n_sides: usize) -> Result<(), Error> {
    let mut parts = Vec::new();
    for i in 0..ctx.config.threads {
        for side in &SIDES[..n_sides] {
            let path = ctx.tmp_dir.join(format!("unmapped_{}_{}.bam", side, i));
            if ext::sys::nonzero_file(&path)? {
                parts.push(path);
            }
        }
    }
    let out = ctx.out_dir.join(UNMAPPED);
    match parts.len() {
        0 => Ok(()),
        1 => move_file(&parts[0], &out),
        _ => {
            ctx.pipeline()
                .then(ctx.tools.bam_merge(&genome.header, &out, &parts).log(ctx.logs_dir.join("bam_merge_um.log")))
                .run()?;
            remove_all(&parts)
        }
    }
}

/// Removes the prepared reads and the intermediate mappings once the run is complete.
pub fn cleanup(tmp_dir: &Path) -> Result<(), Error> {
    if tmp_dir.exists() {
        log::debug!("Removing temporary directory {}", ext::fmt::path(tmp_dir));
        fs::remove_dir_all(tmp_dir).map_err(add_path!(tmp_dir))?;
    }
    Ok(())
}
