use std::{
    fs,
    path::PathBuf,
};
use splicemap::align::{
    SegmentPlan,
    candidates::{Candidates, Kind, Source},
    tools::DEV_NULL,
};

fn segment_outputs(dir: &std::path::Path, contents: [&str; 4]) -> [PathBuf; 4] {
    let names = ["segment.juncs", "segment.insertions", "segment.deletions", "segment.fusions"];
    let mut i = 0;
    names.map(|name| {
        let path = dir.join(name);
        fs::write(&path, contents[i]).unwrap();
        i += 1;
        path
    })
}

/// Nothing supplied and nothing found: junction index is not built, all arguments are the sentinel.
#[test]
fn no_evidence_skips_index() {
    let dir = tempfile::tempdir().unwrap();
    let user_juncs = dir.path().join("user.juncs");
    fs::write(&user_juncs, "").unwrap();

    let mut candidates = Candidates::new();
    assert!(!candidates.add_nonempty(Kind::Junctions, Source::User, &user_juncs));
    candidates.add_segment_search(&segment_outputs(dir.path(), [""; 4]), true, true);
    assert!(candidates.is_empty_all());

    let set = candidates.finish();
    assert!(!set.needs_index());
    for arg in set.args().iter().chain(&set.index_args(false)) {
        assert_eq!(arg, DEV_NULL);
    }
}

#[test]
fn sources_are_ordered() {
    let dir = tempfile::tempdir().unwrap();
    let outputs = segment_outputs(dir.path(), ["chr1\t100\t200\t+\n", "", "chr1\t50\t51\t\n", "fusion\n"]);
    let closure = dir.path().join("closure.juncs");
    fs::write(&closure, "chr2\t10\t400\t-\n").unwrap();

    let mut candidates = Candidates::new();
    candidates.add_segment_search(&outputs, false, true);
    assert!(candidates.add_nonempty(Kind::Junctions, Source::Closure, &closure));
    candidates.add(Kind::Junctions, Source::Annotation, dir.path().join("annotation.juncs"));
    candidates.add(Kind::Junctions, Source::User, dir.path().join("user.juncs"));
    assert_eq!(candidates.count(Kind::Junctions), 4);
    // Indels are disabled.
    assert_eq!(candidates.count(Kind::Deletions), 0);

    let set = candidates.finish();
    assert!(set.needs_index());
    let names: Vec<_> = set.files(Kind::Junctions).iter()
        .map(|p| p.file_name().unwrap().to_str().unwrap().to_owned())
        .collect();
    assert_eq!(names, ["user.juncs", "annotation.juncs", "segment.juncs", "closure.juncs"]);
    assert_eq!(set.files(Kind::Deletions), [PathBuf::from(DEV_NULL)]);
    assert_eq!(set.files(Kind::Fusions), [outputs[3].clone()]);

    let args = set.index_args(true);
    assert!(args[0].contains(','));
    assert_eq!(args[1], DEV_NULL);
    assert_eq!(args[2], DEV_NULL);
}

/// Junction search strategies follow from the number of segments.
#[test]
fn strategies_from_read_length() {
    let plan = SegmentPlan::new(50, 25, None, None);
    assert_eq!(plan.num_segments, 2);
    assert!(plan.coverage_search);
    assert!(!plan.closure_search);

    let plan = SegmentPlan::new(50, 25, Some(false), Some(true));
    assert!(!plan.coverage_search);
    assert!(plan.closure_search);

    let plan = SegmentPlan::new(75, 25, None, Some(false));
    assert_eq!(plan.num_segments, 3);
    assert!(!plan.coverage_search);
    assert!(!plan.closure_search);

    let plan = SegmentPlan::new(75, 25, Some(true), Some(true));
    assert!(plan.coverage_search);
    assert!(plan.closure_search);
}
