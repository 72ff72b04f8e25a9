//! Output directory, where helper programs are replaced by shell scripts that record their arguments.

use std::{
    fs,
    os::unix::fs::PermissionsExt,
    path::PathBuf,
};
use super::{
    config::Config,
    index::Genome,
};

/// Aligned record, written into `.bam` outputs as SAM text.
pub(crate) const SAM: &str = "@SQ\\tSN:chr1\\tLN:1000\\nr0\\t0\\tchr1\\t100\\t255\\t4M\\t*\\t0\\t0\\tACGT\\tIIII\\n";

/// `SAM` with the escapes expanded.
pub(crate) fn sam_text() -> String {
    SAM.replace("\\t", "\t").replace("\\n", "\n")
}

/// Consumes the input and writes `SAM` into every path after `-`.
pub(crate) const FIX_MAP_ORDERING: &str = "cat > /dev/null
out=0
for arg; do
    if [ $out = 1 ]; then printf '@SAM@' > \"$arg\"; fi
    if [ \"$arg\" = - ]; then out=1; fi
done";

/// Prints index header when asked for it, otherwise consumes the reads.
pub(crate) const ALIGNER: &str = "case \" $* \" in
    *' /dev/null '*) printf '@HD\\tVN:1.0\\n@SQ\\tSN:juncs\\tLN:50\\n' ;;
    *) cat > /dev/null ;;
esac";

/// Writes read information file and prepared reads.
pub(crate) const PREP_READS: &str = "for arg; do
    case \"$arg\" in
        --aux-outfile=*) printf 'min_read_len=48\\nmax_read_len=50\\nreads_in =1000\\nreads_out=990\\n' \
            > \"${arg#--aux-outfile=}\" ;;
        --outfile=*) printf '@SAM@' > \"${arg#--outfile=}\" ;;
    esac
done";

pub(crate) struct StubRun {
    pub dir: tempfile::TempDir,
    pub config: Config,
}

impl StubRun {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let bin = dir.path().join("bin");
        fs::create_dir(&bin).unwrap();
        let config = Config {
            out_dir: dir.path().join("out"),
            bin_dir: Some(bin),
            zpacker: "none".to_owned(),
            ..Config::default()
        };
        Self { dir, config }
    }

    fn calls_file(&self) -> PathBuf {
        self.dir.path().join("calls.txt")
    }

    /// Writes helper `name`, that appends its arguments to the list of calls and runs `body`.
    pub fn tool(&self, name: &str, body: &str) {
        let path = self.config.bin_dir.as_ref().unwrap().join(name);
        let body = body.replace("@SAM@", SAM);
        fs::write(&path, format!("#!/bin/sh\necho \"{} $*\" >> '{}'\n{}\n",
            name, self.calls_file().display(), body)).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    }

    /// Aligner and `fix_map_ordering`, which produce one mapped record for every input.
    pub fn mapping_tools(&self) {
        self.tool("bowtie2", ALIGNER);
        self.tool("fix_map_ordering", FIX_MAP_ORDERING);
    }

    /// Number of calls of the helper.
    pub fn calls(&self, name: &str) -> usize {
        fs::read_to_string(self.calls_file()).unwrap_or_default().lines()
            .filter(|line| line.split(' ').next() == Some(name))
            .count()
    }

    /// Full list of calls of the helper.
    pub fn call_args(&self, name: &str) -> Vec<String> {
        fs::read_to_string(self.calls_file()).unwrap_or_default().lines()
            .filter_map(|line| line.strip_prefix(name).and_then(|rest| rest.strip_prefix(' ')))
            .map(str::to_owned)
            .collect()
    }

    pub fn genome(&self) -> Genome {
        let header = self.dir.path().join("genome.sam");
        fs::write(&header, "@HD\tVN:1.0\n@SQ\tSN:chr1\tLN:1000\n").unwrap();
        Genome {
            index: self.dir.path().join("genome"),
            fasta: self.dir.path().join("genome.fa"),
            header,
        }
    }
}
