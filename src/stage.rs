//! Pipeline stages and the checkpoint log, used to resume interrupted runs.
//!
//! The checkpoint log (`<out>/logs/run.log`) starts with the command line of the run,
//! followed by all executed commands and stage markers `#>stage: <timestamp>`.
//! A resumed run replays the command line, and skips all stages before the last recorded marker.

use std::{
    fmt,
    fs::{self, File},
    io::BufRead,
    path::Path,
};
use crate::{
    Error,
    err::{add_path, error},
    ext::{self, logfile::RunLog},
};

/// Checkpoint log name (inside the logs directory).
pub const RUN_LOG: &str = "run.log";
/// Snapshot of the checkpoint log, made by the first resume attempt.
pub const BACKUP_LOG: &str = "run.resume0.log";
/// Checkpoint log is copied into the backup only if it is at least this long.
const MIN_BACKUP_SIZE: u64 = 10;

/// Pipeline stages, in the order of execution.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    Start,
    PrepReads,
    MapStart,
    MapSegments,
    FindJuncs,
    JuncsDb,
    Map2Juncs,
    Reports,
    AllDone,
}

impl Stage {
    pub const ALL: [Stage; 9] = [Stage::Start, Stage::PrepReads, Stage::MapStart, Stage::MapSegments,
        Stage::FindJuncs, Stage::JuncsDb, Stage::Map2Juncs, Stage::Reports, Stage::AllDone];

    pub fn name(self) -> &'static str {
        match self {
            Stage::Start => "start",
            Stage::PrepReads => "prep_reads",
            Stage::MapStart => "map_start",
            Stage::MapSegments => "map_segments",
            Stage::FindJuncs => "find_juncs",
            Stage::JuncsDb => "juncs_db",
            Stage::Map2Juncs => "map2juncs",
            Stage::Reports => "tophat_reports",
            Stage::AllDone => "alldone",
        }
    }

    pub fn from_name(name: &str) -> Option<Stage> {
        Stage::ALL.iter().copied().find(|stage| stage.name() == name)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Returns the stage name if the line is a stage marker (`#>name:`, optionally followed by a timestamp).
fn parse_marker(line: &str) -> Option<&str> {
    lazy_static::lazy_static! {
        static ref MARKER: regex::Regex = regex::Regex::new(r"^#>([A-Za-z0-9_]+):(?:\s.*)?$")
            .expect("Stage marker regex must be valid");
    }
    MARKER.captures(line.trim_end()).and_then(|caps| caps.get(1)).map(|m| m.as_str())
}

/// Place to continue a previous run from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResumePoint {
    pub stage: Stage,
    /// Original command line, split by whitespace.
    pub argv: Vec<String>,
}

/// Reads the checkpoint log: command line from the first line, and the last stage marker.
/// A log without markers gives stage `start`.
fn read_checkpoint(path: &Path) -> Result<ResumePoint, Error> {
    let f = File::open(path).map_err(|e|
        Error::Resume(format!("failed to open {}: {}", ext::fmt::path(path), e)))?;
    let mut lines = std::io::BufReader::new(f).lines();
    let first = match lines.next() {
        Some(line) => line.map_err(add_path!(path))?,
        None => return Err(Error::Resume(format!("{} is empty", ext::fmt::path(path)))),
    };
    let argv: Vec<String> = first.split_whitespace().map(str::to_owned).collect();
    if argv.is_empty() {
        return Err(Error::Resume(format!("{} does not start with a command line", ext::fmt::path(path))));
    }

    let mut last_tag = None;
    for line in lines {
        let line = line.map_err(add_path!(path))?;
        if let Some(tag) = parse_marker(&line) {
            last_tag = Some(tag.to_owned());
        }
    }
    let stage = match last_tag {
        Some(tag) => Stage::from_name(&tag).ok_or_else(|| Error::Resume(format!("unrecognized run stage '{}'", tag)))?,
        None => Stage::Start,
    };
    Ok(ResumePoint { stage, argv })
}

fn no_stage(path: &Path) -> Error {
    Error::Resume(format!("resuming requested but no valid stage found in {}", ext::fmt::path(path)))
}

/// Reads the checkpoint log: command line from the first line, and the last stage marker.
pub fn parse_checkpoint(path: &Path) -> Result<ResumePoint, Error> {
    let point = read_checkpoint(path)?;
    if point.stage == Stage::Start {
        return Err(no_stage(path));
    }
    Ok(point)
}

/// Finds the stage to resume from, looking into the checkpoint log of `logs_dir`, and its backup snapshot.
/// The first resume attempt creates the snapshot, so that a failed resume can itself be resumed
/// from the furthest known stage, even if the failed attempt did not reach its first stage marker.
pub fn resolve_resume(logs_dir: &Path) -> Result<ResumePoint, Error> {
    let run_log = logs_dir.join(RUN_LOG);
    let backup_log = logs_dir.join(BACKUP_LOG);
    let backup = if backup_log.exists() {
        Some(read_checkpoint(&backup_log)?)
    } else {
        if ext::sys::file_exists(&run_log, MIN_BACKUP_SIZE) {
            fs::copy(&run_log, &backup_log).map_err(add_path!(run_log, backup_log))?;
        }
        None
    };
    let current = match backup {
        Some(_) if !run_log.exists() => None,
        _ => Some(read_checkpoint(&run_log)?),
    };
    let best = match (current, backup) {
        (Some(current), Some(backup)) if backup.stage > current.stage => backup,
        (Some(current), _) => current,
        (None, Some(backup)) => backup,
        (None, None) => return Err(no_stage(&run_log)),
    };
    match best.stage {
        Stage::Start => Err(no_stage(&run_log)),
        Stage::AllDone => Err(Error::Resume("Nothing to resume, the run was already completed".to_owned())),
        _ => Ok(best),
    }
}

/// Tracks the current stage of the run and writes stage markers into the checkpoint log.
pub struct Checkpoint {
    run_log: RunLog,
    current: Stage,
    resume: Stage,
}

impl Checkpoint {
    /// Creates (truncates) the checkpoint log and writes the command line into it.
    /// Executed commands are recorded through [Checkpoint::run_log].
    pub fn create(logs_dir: &Path, command_line: &str, resume: Stage) -> Result<Self, Error> {
        let run_log = RunLog::create(&logs_dir.join(RUN_LOG), command_line)?;
        if resume > Stage::Start {
            log::info!("Resuming run from stage '{}'", resume);
        }
        Ok(Self {
            run_log,
            current: Stage::Start,
            resume,
        })
    }

    pub fn path(&self) -> &Path {
        self.run_log.path()
    }

    pub fn run_log(&self) -> &RunLog {
        &self.run_log
    }

    pub fn current(&self) -> Stage {
        self.current
    }

    pub fn resume_stage(&self) -> Stage {
        self.resume
    }

    /// Stages before the resume point are skipped, the resume stage itself is executed again.
    pub fn should_run(&self, stage: Stage) -> bool {
        stage >= self.resume
    }

    /// Returns true if the current stage must be executed.
    pub fn active(&self) -> bool {
        self.should_run(self.current)
    }

    /// True if the current stage was completed by a previous run.
    pub fn skipping(&self) -> bool {
        !self.active()
    }

    /// Records transition to `stage`, which must be later than the current one.
    pub fn advance(&mut self, stage: Stage) -> Result<(), Error> {
        if stage <= self.current {
            return Err(error!(RuntimeError, "Cannot move from stage '{}' to stage '{}'", self.current, stage));
        }
        self.run_log.record_line(&format!("#>{}: {}", stage, chrono::Local::now().to_rfc3339()))?;
        log::debug!("Stage '{}'{}", stage, if self.should_run(stage) { "" } else { " (skipped)" });
        self.current = stage;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_log(dir: &Path, name: &str, contents: &str) {
        fs::write(dir.join(name), contents).unwrap();
    }

    #[test]
    fn stage_names() {
        for stage in Stage::ALL {
            assert_eq!(Stage::from_name(stage.name()), Some(stage));
        }
        assert_eq!(Stage::from_name("tophat_reports"), Some(Stage::Reports));
        assert_eq!(Stage::from_name("reports"), None);
        assert!(Stage::MapStart < Stage::MapSegments);
    }

    #[test]
    fn markers() {
        assert_eq!(parse_marker("#>map_start:"), Some("map_start"));
        assert_eq!(parse_marker("#>juncs_db: 2026-10-19T10:00:00+02:00"), Some("juncs_db"));
        assert_eq!(parse_marker("#>juncs_db:x"), None);
        assert_eq!(parse_marker("bowtie -p 4 idx -"), None);
        assert_eq!(parse_marker(" #>map_start:"), None);
    }

    #[test]
    fn resume_from_last_marker() {
        let dir = tempfile::tempdir().unwrap();
        write_log(dir.path(), RUN_LOG, "splicemap align -o out idx reads.fq\n\
            #>prep_reads: 2026-10-19T10:00:00+00:00\nprep_reads --foo\n#>map_start:\nbowtie ...\n\
            #>map_segments: 2026-10-19T10:05:00+00:00\nbowtie seg1\n");
        let point = resolve_resume(dir.path()).unwrap();
        assert_eq!(point.stage, Stage::MapSegments);
        assert_eq!(point.argv, ["splicemap", "align", "-o", "out", "idx", "reads.fq"]);
        // Snapshot is created by the first resume attempt.
        assert!(dir.path().join(BACKUP_LOG).exists());

        // A failed resume truncated the log: the snapshot is still further along.
        write_log(dir.path(), RUN_LOG, "splicemap align -o out idx reads.fq\n#>prep_reads:\n");
        assert_eq!(resolve_resume(dir.path()).unwrap().stage, Stage::MapSegments);

        // The resumed run got further than the snapshot.
        write_log(dir.path(), RUN_LOG, "splicemap align -o out idx reads.fq\n#>prep_reads:\n#>juncs_db:\n");
        assert_eq!(resolve_resume(dir.path()).unwrap().stage, Stage::JuncsDb);
    }

    #[test]
    fn failed_resume_before_first_marker() {
        let dir = tempfile::tempdir().unwrap();
        write_log(dir.path(), BACKUP_LOG, "splicemap align -o out idx reads.fq\n#>prep_reads:\n#>map_start:\n\
            #>map_segments: 2026-10-19T10:05:00+00:00\n");
        // The resumed run failed while checking the index: only the command line was written.
        write_log(dir.path(), RUN_LOG, "splicemap align -o out idx reads.fq\n");
        let point = resolve_resume(dir.path()).unwrap();
        assert_eq!(point.stage, Stage::MapSegments);
        assert_eq!(point.argv, ["splicemap", "align", "-o", "out", "idx", "reads.fq"]);

        fs::remove_file(dir.path().join(RUN_LOG)).unwrap();
        assert_eq!(resolve_resume(dir.path()).unwrap().stage, Stage::MapSegments);

        // Unknown stage is never replaced by the snapshot.
        write_log(dir.path(), RUN_LOG, "splicemap align -o out idx reads.fq\n#>polishing:\n");
        assert!(matches!(resolve_resume(dir.path()), Err(Error::Resume(_))));
    }

    #[test]
    fn resume_failures() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(resolve_resume(dir.path()), Err(Error::Resume(_))));

        write_log(dir.path(), RUN_LOG, "");
        assert!(matches!(resolve_resume(dir.path()), Err(Error::Resume(_))));

        write_log(dir.path(), RUN_LOG, "splicemap align idx reads.fq\nbowtie\n");
        assert!(matches!(parse_checkpoint(&dir.path().join(RUN_LOG)), Err(Error::Resume(_))));

        write_log(dir.path(), RUN_LOG, "splicemap align idx reads.fq\n#>prep_reads:\n#>polishing:\n");
        assert!(matches!(parse_checkpoint(&dir.path().join(RUN_LOG)), Err(Error::Resume(_))));

        let done = tempfile::tempdir().unwrap();
        write_log(done.path(), RUN_LOG, "splicemap align idx reads.fq\n#>tophat_reports:\n#>alldone:\n");
        assert!(matches!(resolve_resume(done.path()), Err(Error::Resume(_))));
    }

    #[test]
    fn checkpoint_gates_stages() {
        let dir = tempfile::tempdir().unwrap();
        let mut checkpoint = Checkpoint::create(dir.path(), "splicemap align idx reads.fq", Stage::MapSegments)
            .unwrap();
        let mut executed = Vec::new();
        for &stage in &Stage::ALL[1..] {
            checkpoint.advance(stage).unwrap();
            if checkpoint.active() {
                executed.push(stage);
            }
        }
        assert_eq!(executed.first(), Some(&Stage::MapSegments));
        assert!(!executed.contains(&Stage::MapStart));
        assert!(!executed.contains(&Stage::PrepReads));
        assert!(checkpoint.advance(Stage::Reports).is_err());

        let contents = fs::read_to_string(checkpoint.path()).unwrap();
        let mut lines = contents.lines();
        assert_eq!(lines.next(), Some("splicemap align idx reads.fq"));
        let markers: Vec<&str> = lines.filter_map(parse_marker).collect();
        assert_eq!(markers, ["prep_reads", "map_start", "map_segments", "find_juncs", "juncs_db", "map2juncs",
            "tophat_reports", "alldone"]);
    }

    #[test]
    fn separate_checkpoints() {
        let dirs = [tempfile::tempdir().unwrap(), tempfile::tempdir().unwrap()];
        let mut first = Checkpoint::create(dirs[0].path(), "splicemap align idx a.fq", Stage::Start).unwrap();
        let mut second = Checkpoint::create(dirs[1].path(), "splicemap align idx b.fq", Stage::Start).unwrap();
        first.advance(Stage::PrepReads).unwrap();
        second.advance(Stage::PrepReads).unwrap();
        first.advance(Stage::MapStart).unwrap();
        first.run_log().record_command("bowtie2 -x idx -U a.fq").unwrap();

        let first_log = fs::read_to_string(first.path()).unwrap();
        let second_log = fs::read_to_string(second.path()).unwrap();
        assert_eq!(first_log.lines().filter_map(parse_marker).collect::<Vec<_>>(), ["prep_reads", "map_start"]);
        assert_eq!(second_log.lines().filter_map(parse_marker).collect::<Vec<_>>(), ["prep_reads"]);
        assert!(first_log.contains("a.fq\n") && !second_log.contains("a.fq"));

        // Stage marker that cannot be written fails the transition.
        fs::remove_file(dirs[1].path().join(RUN_LOG)).unwrap();
        assert!(second.advance(Stage::MapStart).is_err());
        assert_eq!(second.current(), Stage::PrepReads);
    }
}
