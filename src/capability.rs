//! External command capability
//!
//! Everything that talks to cluster tooling goes through [`CommandRunner`],
//! so the patching core and the orchestration logic can be exercised without
//! a reachable cluster.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::process::Command;

use tracing::{debug, info};

use crate::error::ToolError;

/// A command to run: program, arguments, working directory and extra environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub dir: Option<PathBuf>,
    pub env: BTreeMap<String, String>,
}

impl CommandSpec {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = Some(dir.into());
        self
    }

    pub fn envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env
            .extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Captured result of a finished process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    /// Exit code, `None` if the process was killed by a signal
    pub code: Option<i32>,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// stdout followed by stderr, the way a terminal would show them.
    pub fn combined(&self) -> String {
        let mut out = self.stdout.clone();
        if !self.stderr.is_empty() {
            if !out.is_empty() && !out.ends_with('\n') {
                out.push('\n');
            }
            out.push_str(&self.stderr);
        }
        out
    }
}

/// Run an external command and capture its output and exit code.
///
/// Implementations report a non-zero exit through [`CommandOutput::code`],
/// not as an error; only failing to start the process is an error.
pub trait CommandRunner {
    fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, ToolError>;

    /// Run with the caller's stdin, stdout and stderr and return the exit code.
    ///
    /// Used for long commands whose output should appear as it is produced.
    /// The default runs [`CommandRunner::run`] and replays the captured output.
    fn run_attached(&self, spec: &CommandSpec) -> Result<Option<i32>, ToolError> {
        let output = self.run(spec)?;
        print!("{}", output.stdout);
        eprint!("{}", output.stderr);
        Ok(output.code)
    }
}

impl<T: CommandRunner + ?Sized> CommandRunner for &T {
    fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, ToolError> {
        (**self).run(spec)
    }

    fn run_attached(&self, spec: &CommandSpec) -> Result<Option<i32>, ToolError> {
        (**self).run_attached(spec)
    }
}

impl<T: CommandRunner + ?Sized> CommandRunner for Box<T> {
    fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, ToolError> {
        (**self).run(spec)
    }

    fn run_attached(&self, spec: &CommandSpec) -> Result<Option<i32>, ToolError> {
        (**self).run_attached(spec)
    }
}

/// Run `spec` and turn a non-zero exit into [`ToolError::CommandFailed`].
///
/// Returns stdout on success.
pub fn run_checked<R: CommandRunner + ?Sized>(
    runner: &R,
    spec: &CommandSpec,
) -> Result<String, ToolError> {
    let output = runner.run(spec)?;
    if !output.success() {
        return Err(ToolError::CommandFailed {
            command: spec.to_string(),
            code: output.code,
            output: output.combined(),
        });
    }
    Ok(output.stdout)
}

/// Locate `tool` on PATH (or accept it as given if it is a path).
pub fn find_tool(tool: &str) -> Result<PathBuf, ToolError> {
    which::which(tool).map_err(|_| ToolError::ToolNotFound {
        tool: tool.to_string(),
    })
}

/// Whether `tool` can be found on PATH.
pub fn tool_available(tool: &str) -> bool {
    find_tool(tool).is_ok()
}

/// [`CommandRunner`] backed by real processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl SystemRunner {
    fn command(spec: &CommandSpec) -> Result<Command, ToolError> {
        let program = find_tool(&spec.program)?;

        let mut cmd = Command::new(&program);
        cmd.args(&spec.args).envs(&spec.env);
        if let Some(dir) = &spec.dir {
            cmd.current_dir(dir);
        }
        Ok(cmd)
    }
}

impl CommandRunner for SystemRunner {
    fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, ToolError> {
        let mut cmd = Self::command(spec)?;

        info!("running: {}", spec);
        let output = cmd.output().map_err(|source| ToolError::Spawn {
            command: spec.to_string(),
            source,
        })?;

        let result = CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            code: output.status.code(),
        };
        debug!(command = %spec, code = ?result.code, "command finished");
        Ok(result)
    }

    fn run_attached(&self, spec: &CommandSpec) -> Result<Option<i32>, ToolError> {
        let mut cmd = Self::command(spec)?;

        info!("running: {}", spec);
        let status = cmd.status().map_err(|source| ToolError::Spawn {
            command: spec.to_string(),
            source,
        })?;

        debug!(command = %spec, code = ?status.code(), "command finished");
        Ok(status.code())
    }
}
