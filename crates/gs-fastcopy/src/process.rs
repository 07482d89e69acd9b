//! External process invocation
//!
//! Every external tool (the copy-in command and the gzip family) runs through
//! [`ToolCommand::run`], so all of them report failures the same way: standard
//! output is discarded, standard error is captured, and a non-zero exit turns
//! into a [`ProcessFailure`] value.

use std::ffi::{OsStr, OsString};
use std::fmt;
use std::process::{Command, Stdio};
use thiserror::Error;
use tracing::{debug, trace};

/// Failure of an external command: non-zero exit or failure to start
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{program} {}: stderr: {}", describe_status(.status), .stderr.trim_end())]
pub struct ProcessFailure {
    /// Program that was run
    pub program: String,
    /// Exit code, or `None` if the process could not be started or was killed by a signal
    pub status: Option<i32>,
    /// Captured diagnostic output
    pub stderr: String,
}

fn describe_status(status: &Option<i32>) -> String {
    match status {
        Some(code) => format!("exited with status {}", code),
        None => "did not run to completion".to_string(),
    }
}

/// An external command line
#[derive(Debug, Clone)]
pub struct ToolCommand {
    program: OsString,
    args: Vec<OsString>,
}

impl ToolCommand {
    /// Start a command line for `program`
    pub fn new(program: impl AsRef<OsStr>) -> Self {
        Self {
            program: program.as_ref().to_owned(),
            args: Vec::new(),
        }
    }

    /// Append one argument
    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_owned());
        self
    }

    /// Append several arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args.extend(args.into_iter().map(|a| a.as_ref().to_owned()));
        self
    }

    /// Arguments passed to the program
    pub fn get_args(&self) -> &[OsString] {
        &self.args
    }

    /// Run the command to completion.
    ///
    /// A non-zero exit is not an error by itself at this layer; it comes back
    /// as a [`ProcessFailure`] and the caller decides what it means.
    pub fn run(&self) -> std::result::Result<(), ProcessFailure> {
        debug!("Running {}", self);

        let output = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| ProcessFailure {
                program: self.program.to_string_lossy().into_owned(),
                status: None,
                stderr: e.to_string(),
            })?;

        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        if output.status.success() {
            if !stderr.is_empty() {
                trace!("{} stderr: {}", self.program.to_string_lossy(), stderr.trim_end());
            }
            return Ok(());
        }

        Err(ProcessFailure {
            program: self.program.to_string_lossy().into_owned(),
            status: output.status.code(),
            stderr,
        })
    }
}

impl fmt::Display for ToolCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.to_string_lossy())?;
        for arg in &self.args {
            write!(f, " {}", arg.to_string_lossy())?;
        }
        Ok(())
    }
}
