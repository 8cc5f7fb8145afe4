//! External process execution
//!
//! Every child process goes through a [`CommandRunner`], so the build driver
//! can be exercised without cmake installed and `build --dry-run` can print
//! what would run.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::process::Command;
use std::sync::Mutex;

/// A fully described child process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    /// Working directory of the child; the parent's directory never changes
    pub current_dir: PathBuf,
    /// Extra environment variables
    pub env: BTreeMap<String, String>,
}

impl Invocation {
    pub fn new(program: impl Into<String>, current_dir: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            current_dir: current_dir.into(),
            env: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            if arg.contains(' ') {
                write!(f, " \"{arg}\"")?;
            } else {
                write!(f, " {arg}")?;
            }
        }
        Ok(())
    }
}

/// Outcome of a finished child process
#[derive(Debug, Clone, Default)]
pub struct ProcessOutput {
    pub success: bool,
    /// Exit code, if the process exited normally
    pub code: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl ProcessOutput {
    /// A successful run with no output
    pub fn ok() -> Self {
        Self {
            success: true,
            code: Some(0),
            ..Self::default()
        }
    }

    /// A failed run with the given exit code
    pub fn failed(code: i32) -> Self {
        Self {
            success: false,
            code: Some(code),
            ..Self::default()
        }
    }

    /// Human readable exit status
    pub fn status(&self) -> String {
        match self.code {
            Some(code) => format!("exit code {code}"),
            None => "terminated by signal".to_string(),
        }
    }
}

/// Runs child processes
pub trait CommandRunner {
    /// Run an invocation to completion, capturing its output
    fn run(&self, invocation: &Invocation) -> std::io::Result<ProcessOutput>;

    /// Check that a program can be started
    fn locate(&self, _program: &str) -> bool {
        true
    }
}

/// Runs processes on the host
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, invocation: &Invocation) -> std::io::Result<ProcessOutput> {
        tracing::debug!(
            "Running `{invocation}` in {}",
            invocation.current_dir.display()
        );

        let output = Command::new(&invocation.program)
            .args(&invocation.args)
            .current_dir(&invocation.current_dir)
            .envs(&invocation.env)
            .output()?;

        Ok(ProcessOutput {
            success: output.status.success(),
            code: output.status.code(),
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }

    fn locate(&self, program: &str) -> bool {
        which::which(program).is_ok()
    }
}

type FailurePredicate = Box<dyn Fn(&Invocation) -> Option<i32> + Send + Sync>;

/// Records invocations instead of running them
///
/// Every invocation succeeds unless a failure rule matches it.
#[derive(Default)]
pub struct RecordingRunner {
    calls: Mutex<Vec<Invocation>>,
    fail: Option<FailurePredicate>,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail invocations for which `rule` returns an exit code
    #[must_use]
    pub fn failing_when<F>(mut self, rule: F) -> Self
    where
        F: Fn(&Invocation) -> Option<i32> + Send + Sync + 'static,
    {
        self.fail = Some(Box::new(rule));
        self
    }

    /// Invocations seen so far, in order
    pub fn calls(&self) -> Vec<Invocation> {
        self.calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }
}

impl fmt::Debug for RecordingRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordingRunner")
            .field("calls", &self.calls())
            .field("fail", &self.fail.is_some())
            .finish()
    }
}

impl CommandRunner for RecordingRunner {
    fn run(&self, invocation: &Invocation) -> std::io::Result<ProcessOutput> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(invocation.clone());
        }

        let code = self.fail.as_ref().and_then(|rule| rule(invocation));
        Ok(code.map_or_else(ProcessOutput::ok, ProcessOutput::failed))
    }
}
