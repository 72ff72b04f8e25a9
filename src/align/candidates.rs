//! Aggregation of junction, insertion, deletion and fusion candidates from several sources
//! into the fixed set of arguments, used to build the junction index and to join segment hits.

use std::{
    fmt,
    path::{Path, PathBuf},
};
use crate::ext;
use super::tools::{DEV_NULL, join_paths};

/// Candidate kinds, in the order in which the helper programs expect them.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Kind {
    Junctions,
    Insertions,
    Deletions,
    Fusions,
}

impl Kind {
    pub const ALL: [Kind; 4] = [Kind::Junctions, Kind::Insertions, Kind::Deletions, Kind::Fusions];

    fn ix(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            Kind::Junctions => "junctions",
            Kind::Insertions => "insertions",
            Kind::Deletions => "deletions",
            Kind::Fusions => "fusions",
        })
    }
}

/// Where the candidates come from. Within each kind, files are ordered by the source.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Source {
    User,
    Annotation,
    Segments,
    Closure,
}

/// Accumulates candidate files.
#[derive(Default, Debug)]
pub struct Candidates {
    files: [Vec<(Source, PathBuf)>; 4],
}

impl Candidates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, kind: Kind, source: Source, path: impl Into<PathBuf>) {
        self.files[kind.ix()].push((source, path.into()));
    }

    /// Adds the file only if it is not empty. Returns true if the file was added.
    pub fn add_nonempty(&mut self, kind: Kind, source: Source, path: &Path) -> bool {
        if ext::sys::file_size(path) > 0 {
            self.add(kind, source, path);
            true
        } else {
            false
        }
    }

    /// Adds outputs of the segment-based search (junctions, insertions, deletions, fusions).
    pub fn add_segment_search(&mut self, outputs: &[PathBuf; 4], indels: bool, fusions: bool) {
        for (kind, path) in Kind::ALL.into_iter().zip(outputs) {
            let keep = match kind {
                Kind::Junctions => true,
                Kind::Insertions | Kind::Deletions => indels,
                Kind::Fusions => fusions,
            };
            if keep {
                self.add_nonempty(kind, Source::Segments, path);
            }
        }
    }

    /// Number of files of a certain kind.
    pub fn count(&self, kind: Kind) -> usize {
        self.files[kind.ix()].len()
    }

    /// True if no candidates of any kind were found or provided.
    pub fn is_empty_all(&self) -> bool {
        self.files.iter().all(Vec::is_empty)
    }

    /// Orders files by source and replaces missing kinds with the sentinel.
    pub fn finish(mut self) -> CandidateSet {
        let has_candidates = !self.is_empty_all();
        let lists = Kind::ALL.map(|kind| {
            let mut files = std::mem::take(&mut self.files[kind.ix()]);
            if files.is_empty() {
                if kind == Kind::Junctions {
                    log::warn!("Junction database is empty!");
                }
                return vec![PathBuf::from(DEV_NULL)];
            }
            files.sort_by_key(|(source, _)| *source);
            files.into_iter().map(|(_, path)| path).collect()
        });
        CandidateSet { lists, has_candidates }
    }
}

/// Final candidate set: each kind contains at least one path.
#[derive(Clone, Debug)]
pub struct CandidateSet {
    lists: [Vec<PathBuf>; 4],
    has_candidates: bool,
}

impl CandidateSet {
    /// Junction index is built only if at least one candidate file exists.
    pub fn needs_index(&self) -> bool {
        self.has_candidates
    }

    pub fn files(&self, kind: Kind) -> &[PathBuf] {
        &self.lists[kind.ix()]
    }

    /// Comma-separated lists for all four kinds.
    pub fn args(&self) -> [String; 4] {
        Kind::ALL.map(|kind| join_paths(&self.lists[kind.ix()][..]))
    }

    /// Arguments for the junction index construction. Bowtie2 index does not use insertions and deletions.
    pub fn index_args(&self, bowtie2: bool) -> [String; 4] {
        let mut args = self.args();
        if bowtie2 {
            args[Kind::Insertions.ix()] = DEV_NULL.to_owned();
            args[Kind::Deletions.ix()] = DEV_NULL.to_owned();
        }
        args
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn all_empty() {
        let set = Candidates::new().finish();
        assert!(!set.needs_index());
        assert_eq!(set.args(), [DEV_NULL; 4].map(str::to_owned));
        for kind in Kind::ALL {
            assert_eq!(set.files(kind), [PathBuf::from(DEV_NULL)]);
        }
    }

    #[test]
    fn sources_ordered() {
        let mut candidates = Candidates::new();
        candidates.add(Kind::Junctions, Source::Closure, "tmp/closure.juncs");
        candidates.add(Kind::Junctions, Source::Segments, "tmp/segment.juncs");
        candidates.add(Kind::Junctions, Source::Annotation, "tmp/genes.juncs");
        candidates.add(Kind::Junctions, Source::User, "user.juncs");
        candidates.add(Kind::Deletions, Source::User, "user.deletions");
        assert_eq!(candidates.count(Kind::Junctions), 4);
        let set = candidates.finish();
        assert!(set.needs_index());
        let args = set.args();
        assert_eq!(args[0], "user.juncs,tmp/genes.juncs,tmp/segment.juncs,tmp/closure.juncs");
        assert_eq!(args[1], DEV_NULL);
        assert_eq!(args[2], "user.deletions");
        assert_eq!(set.index_args(true)[2], DEV_NULL);
        assert_eq!(set.index_args(false)[2], "user.deletions");
    }

    #[test]
    fn segment_search_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let outputs = ["segment.juncs", "segment.insertions", "segment.deletions", "segment.fusions"]
            .map(|name| dir.path().join(name));
        fs::write(&outputs[0], "chr1\t100\t200\t+\n").unwrap();
        fs::write(&outputs[1], "").unwrap();
        fs::write(&outputs[2], "chr1\t300\t305\t-\n").unwrap();
        // Fusions file is missing altogether.

        let mut candidates = Candidates::new();
        candidates.add_segment_search(&outputs, true, true);
        assert_eq!(candidates.count(Kind::Junctions), 1);
        assert_eq!(candidates.count(Kind::Insertions), 0);
        assert_eq!(candidates.count(Kind::Deletions), 1);
        assert_eq!(candidates.count(Kind::Fusions), 0);

        let mut no_indels = Candidates::new();
        no_indels.add_segment_search(&outputs, false, true);
        assert_eq!(no_indels.count(Kind::Deletions), 0);
        assert!(!no_indels.is_empty_all());
    }
}
