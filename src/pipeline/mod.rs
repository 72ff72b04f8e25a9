//! Chains of external processes, connected by anonymous pipes.
//! All processes are started before any of them is waited on.

pub mod zio;
pub mod fifo;
pub mod fanout;

use std::{
    fmt,
    fs::{File, OpenOptions},
    path::{Path, PathBuf},
    process::{Command, Stdio, ChildStdout, ExitStatus},
    os::unix::process::ExitStatusExt,
};
use crate::{
    Error,
    err::{add_path, error},
    ext::{
        self,
        logfile::RunLog,
        sys::ChildGuard,
    },
};

/// Number of log lines, reported on failure.
const TAIL_LINES: usize = 10;

/// Source of the process standard input.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Input {
    Null,
    File(PathBuf),
    /// Standard output of the previous step.
    Pipe,
}

/// Sink of the process standard output.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Output {
    Null,
    File(PathBuf),
    /// Standard input of the next step, or caller-owned stream for the last step.
    Pipe,
}

/// One process in the pipeline.
pub struct Step {
    cmd: Command,
    stdin: Input,
    stdout: Output,
    /// Standard error is appended to this file (inherited if None).
    log: Option<PathBuf>,
}

impl Step {
    pub fn new(program: impl AsRef<Path>) -> Self {
        Self {
            cmd: Command::new(program.as_ref()),
            stdin: Input::Null,
            stdout: Output::Null,
            log: None,
        }
    }

    pub fn arg(mut self, arg: impl AsRef<std::ffi::OsStr>) -> Self {
        self.cmd.arg(arg);
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where I: IntoIterator<Item = S>,
          S: AsRef<std::ffi::OsStr>,
    {
        self.cmd.args(args);
        self
    }

    pub fn stdin(mut self, stdin: Input) -> Self {
        self.stdin = stdin;
        self
    }

    pub fn stdout(mut self, stdout: Output) -> Self {
        self.stdout = stdout;
        self
    }

    pub fn log(mut self, log: impl Into<PathBuf>) -> Self {
        self.log = Some(log.into());
        self
    }

    pub fn command(&self) -> &Command {
        &self.cmd
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&ext::fmt::command(&self.cmd))?;
        if let Input::File(path) = &self.stdin {
            write!(f, " < {}", ext::fmt::path(path))?;
        }
        if let Output::File(path) = &self.stdout {
            write!(f, " > {}", ext::fmt::path(path))?;
        }
        Ok(())
    }
}

/// Ordered list of processes.
#[derive(Default)]
pub struct Pipeline {
    steps: Vec<Step>,
    /// The command line is recorded here before the processes are started.
    run_log: Option<RunLog>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty pipeline, that records its command line in the checkpoint log.
    pub fn recorded(run_log: &RunLog) -> Self {
        Self {
            steps: Vec::new(),
            run_log: Some(run_log.clone()),
        }
    }

    /// Adds a new step. Input of the step is set to `Pipe` automatically (unless it is a file),
    /// and output of the previous step is set to `Pipe`.
    pub fn push(&mut self, mut step: Step) -> &mut Self {
        if let Some(prev) = self.steps.last_mut() {
            prev.stdout = Output::Pipe;
            if step.stdin == Input::Null {
                step.stdin = Input::Pipe;
            }
        }
        self.steps.push(step);
        self
    }

    pub fn then(mut self, step: Step) -> Self {
        self.push(step);
        self
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Starts all processes in order, without waiting.
    pub fn spawn(self) -> Result<Running, Error> {
        if self.steps.is_empty() {
            return Err(error!(RuntimeError, "Cannot run an empty pipeline"));
        }
        let repr = self.to_string();
        match &self.run_log {
            Some(run_log) => run_log.record_command(&repr)?,
            None => log::debug!("    {}", repr),
        }

        let mut children = Vec::with_capacity(self.steps.len());
        let mut prev_stdout: Option<ChildStdout> = None;
        for step in self.steps.into_iter() {
            let Step { mut cmd, stdin, stdout, log } = step;
            let command = ext::fmt::command(&cmd);
            match stdin {
                Input::Null => { cmd.stdin(Stdio::null()); }
                Input::File(ref path) => { cmd.stdin(File::open(path).map_err(add_path!(path))?); }
                Input::Pipe => {
                    let pipe = prev_stdout.take().ok_or_else(||
                        error!(RuntimeError, "Step `{}` expects piped input, but there is no previous step", command))?;
                    cmd.stdin(Stdio::from(pipe));
                }
            }
            match stdout {
                Output::Null => { cmd.stdout(Stdio::null()); }
                Output::File(ref path) => { cmd.stdout(File::create(path).map_err(add_path!(path))?); }
                Output::Pipe => { cmd.stdout(Stdio::piped()); }
            }
            match log {
                Some(ref path) => {
                    let file = OpenOptions::new().create(true).append(true).open(path).map_err(add_path!(path))?;
                    cmd.stderr(file);
                }
                None => { cmd.stderr(Stdio::inherit()); }
            }

            let mut child = cmd.spawn().map_err(|e| if ext::sys::is_missing_exec(&e) {
                Error::Spawn { command: command.clone(), err: e }
            } else {
                Error::Io(e, vec![PathBuf::from(cmd.get_program())])
            })?;
            // Close parent copies of the pipe ends and redirected files.
            drop(cmd);
            if stdout == Output::Pipe {
                prev_stdout = child.stdout.take();
            }
            children.push(Child { command, guard: ChildGuard::new(child), log });
        }
        Ok(Running {
            children,
            stdout: prev_stdout,
            repr,
        })
    }

    /// Starts all processes and waits for them.
    pub fn run(self) -> Result<(), Error> {
        self.spawn()?.wait()
    }
}

impl fmt::Display for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (i, step) in self.steps.iter().enumerate() {
            if i > 0 {
                f.write_str(" | ")?;
            }
            write!(f, "{}", step)?;
        }
        Ok(())
    }
}

struct Child {
    command: String,
    guard: ChildGuard,
    log: Option<PathBuf>,
}

/// Started pipeline. If dropped without waiting, all remaining processes are killed.
pub struct Running {
    children: Vec<Child>,
    /// Standard output of the last step, if it was piped.
    stdout: Option<ChildStdout>,
    repr: String,
}

fn is_broken_pipe(status: &ExitStatus) -> bool {
    status.signal() == Some(libc::SIGPIPE)
}

impl Running {
    /// Takes the standard output of the last step (if it was piped).
    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.stdout.take()
    }

    /// Waits for the terminal process, then for all upstream processes.
    /// If any process failed, returns an error for the first failed process in pipeline order.
    /// Upstream processes, killed by SIGPIPE, are only reported if nothing else failed.
    pub fn wait(mut self) -> Result<(), Error> {
        // Parent must not keep the read end, otherwise the last step never gets SIGPIPE.
        drop(self.stdout.take());
        let n = self.children.len();
        let mut statuses: Vec<Option<ExitStatus>> = vec![None; n];
        let mut io_error = None;
        for i in std::iter::once(n - 1).chain(0..n - 1) {
            let child = &mut self.children[i];
            match child.guard.wait() {
                Ok(status) => statuses[i] = Some(status),
                Err(e) => if io_error.is_none() {
                    io_error = Some(Error::Io(e, Vec::new()));
                }
            }
        }
        if let Some(e) = io_error {
            return Err(e);
        }

        let failed: Vec<(usize, ExitStatus)> = statuses.iter().enumerate()
            .filter_map(|(i, status)| status.filter(|s| !s.success()).map(|s| (i, s)))
            .collect();
        let culprit = failed.iter().find(|(_, status)| !is_broken_pipe(status)).or_else(|| failed.first());
        match culprit {
            None => Ok(()),
            Some(&(i, status)) => {
                let child = &self.children[i];
                log::error!("Pipeline failed: {}", self.repr);
                Err(Error::Subprocess {
                    command: child.command.clone(),
                    status,
                    tail: child.log.as_ref().map(|log| ext::sys::log_tail(log, TAIL_LINES)).unwrap_or_default(),
                    log: child.log.clone(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn sh(script: &str) -> Step {
        Step::new("sh").args(["-c", script])
    }

    #[test]
    fn three_steps() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.txt");
        let output = dir.path().join("out.txt");
        fs::write(&input, "b\na\nc\n").unwrap();
        Pipeline::new()
            .then(Step::new("cat").stdin(Input::File(input)))
            .then(Step::new("sort"))
            .then(sh("tr a-z A-Z").stdout(Output::File(output.clone())))
            .run().unwrap();
        assert_eq!(fs::read_to_string(&output).unwrap(), "A\nB\nC\n");
    }

    #[test]
    fn failing_step_reported_with_log() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("fail.log");
        let err = Pipeline::new()
            .then(sh("echo hello"))
            .then(sh("cat > /dev/null; echo 'fatal: bad input' >&2; exit 3").log(&log))
            .run().unwrap_err();
        match err {
            Error::Subprocess { command, status, log: Some(path), tail } => {
                assert!(command.starts_with("sh -c"));
                assert_eq!(status.code(), Some(3));
                assert_eq!(path, log);
                assert_eq!(tail, "fatal: bad input");
            }
            e => panic!("Unexpected error {:?}", e),
        }
    }

    #[test]
    fn upstream_failure_reported_first() {
        let err = Pipeline::new()
            .then(sh("exit 5"))
            .then(Step::new("cat"))
            .then(sh("cat > /dev/null; exit 1"))
            .run().unwrap_err();
        match err {
            Error::Subprocess { status, .. } => assert_eq!(status.code(), Some(5)),
            e => panic!("Unexpected error {:?}", e),
        }
    }

    #[test]
    fn missing_executable() {
        let err = Pipeline::new()
            .then(Step::new("/nonexistent/dir/no-such-tool"))
            .run().unwrap_err();
        assert!(err.is_spawn_error());
    }

    #[test]
    fn piped_stdout() {
        use std::io::Read;
        let mut running = Pipeline::new()
            .then(sh("printf 'x\\ny\\n'"))
            .then(Step::new("cat").stdout(Output::Pipe))
            .spawn().unwrap();
        let mut s = String::new();
        running.take_stdout().unwrap().read_to_string(&mut s).unwrap();
        running.wait().unwrap();
        assert_eq!(s, "x\ny\n");
    }

    #[test]
    fn display() {
        let pipeline = Pipeline::new()
            .then(Step::new("gzip").arg("-cd").stdin(Input::File(PathBuf::from("/tmp/reads.fq.gz"))))
            .then(Step::new("bowtie").args(["-p", "4"]).stdout(Output::File(PathBuf::from("/tmp/out.sam"))));
        assert_eq!(pipeline.to_string(), "gzip -cd < /tmp/reads.fq.gz | bowtie -p 4 > /tmp/out.sam");
    }
}
