//! Bounded fork/join over independent pipelines (for example, sorting of per-thread partial outputs).

use crate::Error;
use super::{Pipeline, Running};

/// Keeps the error with the smallest index.
fn record(first_error: &mut Option<(usize, Error)>, i: usize, res: Result<(), Error>) {
    if let Err(e) = res {
        match first_error {
            Some((j, _)) if *j < i => {}
            _ => *first_error = Some((i, e)),
        }
    }
}

/// Runs pipelines in chunks of at most `max_jobs`.
/// Within a chunk, all pipelines except the last are started in the background,
/// the last one is run synchronously, and then the background ones are waited on.
///
/// All started pipelines are waited on even after a failure; the first error (in input order) is returned.
pub fn run_all(pipelines: Vec<Pipeline>, max_jobs: usize) -> Result<(), Error> {
    let max_jobs = max_jobs.max(1);
    let mut first_error: Option<(usize, Error)> = None;

    let mut pipelines = pipelines.into_iter().enumerate().peekable();
    while pipelines.peek().is_some() {
        let chunk: Vec<(usize, Pipeline)> = pipelines.by_ref().take(max_jobs).collect();
        let n = chunk.len();
        let mut background: Vec<(usize, Running)> = Vec::with_capacity(n - 1);
        let mut chunk = chunk.into_iter();
        for (i, pipeline) in chunk.by_ref().take(n - 1) {
            match pipeline.spawn() {
                Ok(running) => background.push((i, running)),
                Err(e) => record(&mut first_error, i, Err(e)),
            }
        }
        if let Some((i, last)) = chunk.next() {
            record(&mut first_error, i, last.run());
        }
        for (i, running) in background {
            record(&mut first_error, i, running.wait());
        }
        if first_error.is_some() {
            break;
        }
    }
    match first_error {
        Some((_, e)) => Err(e),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{Step, Output};
    use std::fs;

    #[test]
    fn sort_partial_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut pipelines = Vec::new();
        for i in 0..5 {
            let input = dir.path().join(format!("part{}.txt", i));
            fs::write(&input, format!("{}\n{}\n", 10 - i, i)).unwrap();
            let output = dir.path().join(format!("part{}.sorted.txt", i));
            pipelines.push(Pipeline::new().then(Step::new("sort").arg("-n").arg(&input).stdout(Output::File(output))));
        }
        run_all(pipelines, 2).unwrap();
        for i in 0..5 {
            let sorted = fs::read_to_string(dir.path().join(format!("part{}.sorted.txt", i))).unwrap();
            assert_eq!(sorted, format!("{}\n{}\n", i, 10 - i));
        }
    }

    #[test]
    fn first_failure_in_order() {
        let pipelines = vec![
            Pipeline::new().then(Step::new("true")),
            Pipeline::new().then(Step::new("sh").args(["-c", "exit 7"])),
            Pipeline::new().then(Step::new("sh").args(["-c", "exit 9"])),
        ];
        match run_all(pipelines, 4).unwrap_err() {
            Error::Subprocess { status, .. } => assert_eq!(status.code(), Some(7)),
            e => panic!("Unexpected error {:?}", e),
        }
    }
}
