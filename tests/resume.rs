use std::fs;
use splicemap::{
    Error,
    stage::{self, Checkpoint, Stage, RUN_LOG, BACKUP_LOG},
};

const COMMAND: &str = "splicemap align -p 4 -o out idx left.fq right.fq";

fn markers(contents: &str) -> Vec<String> {
    contents.lines()
        .filter_map(|line| line.strip_prefix("#>"))
        .filter_map(|line| line.split_once(':').map(|(tag, _)| tag.to_owned()))
        .collect()
}

/// Interrupted run is resumed at its last stage, the stage itself is executed again.
/// A resumed run that fails again can be resumed from the furthest known stage.
#[test]
fn resume_interrupted_run() {
    let dir = tempfile::tempdir().unwrap();
    let logs = dir.path().join("logs");
    fs::create_dir(&logs).unwrap();
    fs::write(logs.join(RUN_LOG), format!("{}\n\
        #>prep_reads: 2026-10-19T09:00:00+00:00\nprep_reads --output-dir out/ idx\n\
        #>map_start: 2026-10-19T09:10:00+00:00\nbowtie2 -p 4 -x idx -U -\n\
        #>map_segments: 2026-10-19T09:20:00+00:00\nbowtie2 -p 4 -x idx -U seg1.fq\n", COMMAND)).unwrap();

    let point = stage::resolve_resume(&logs).unwrap();
    assert_eq!(point.stage, Stage::MapSegments);
    assert_eq!(point.argv.join(" "), COMMAND);
    assert!(logs.join(BACKUP_LOG).exists());

    let mut checkpoint = Checkpoint::create(&logs, &point.argv.join(" "), point.stage).unwrap();
    let mut executed = Vec::new();
    let mut skipped = Vec::new();
    for &stage in &[Stage::PrepReads, Stage::MapStart, Stage::MapSegments, Stage::FindJuncs, Stage::JuncsDb] {
        checkpoint.advance(stage).unwrap();
        if checkpoint.active() {
            checkpoint.run_log().record_command(&format!("run {}", stage)).unwrap();
            executed.push(stage);
        } else {
            skipped.push(stage);
        }
    }
    // Second failure during the junction index construction.
    assert_eq!(skipped, [Stage::PrepReads, Stage::MapStart]);
    assert_eq!(executed, [Stage::MapSegments, Stage::FindJuncs, Stage::JuncsDb]);

    let contents = fs::read_to_string(logs.join(RUN_LOG)).unwrap();
    assert_eq!(contents.lines().next(), Some(COMMAND));
    assert_eq!(markers(&contents), ["prep_reads", "map_start", "map_segments", "find_juncs", "juncs_db"]);
    assert!(contents.contains("run map_segments"));
    assert!(!contents.contains("run map_start"));

    // Backup keeps the original log.
    let backup = fs::read_to_string(logs.join(BACKUP_LOG)).unwrap();
    assert_eq!(markers(&backup), ["prep_reads", "map_start", "map_segments"]);
    let point = stage::resolve_resume(&logs).unwrap();
    assert_eq!(point.stage, Stage::JuncsDb);
    assert_eq!(point.argv.join(" "), COMMAND);
}

#[test]
fn nothing_to_resume() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join(RUN_LOG), format!("{}\n#>tophat_reports:\n#>alldone:\n", COMMAND)).unwrap();
    match stage::resolve_resume(dir.path()) {
        Err(Error::Resume(msg)) => assert!(msg.contains("Nothing to resume")),
        other => panic!("Unexpected result {:?}", other),
    }

    let empty = tempfile::tempdir().unwrap();
    assert!(matches!(stage::resolve_resume(empty.path()), Err(Error::Resume(_))));
}
