//! Narrow interface over external build tools.
//!
//! The pipeline never inspects raw process internals; every external tool
//! call goes through [`ToolRunner`] and comes back as a structured
//! [`ToolOutput`], so stages can be tested with scripted fakes.

use std::io;
use std::path::PathBuf;
use std::process::{Command, Stdio};

/// A single external tool invocation.
#[derive(Debug, Clone)]
pub struct ToolCommand {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub envs: Vec<(String, String)>,
    /// Capture output instead of inheriting the console. Used for probes;
    /// build invocations stream their output to the user.
    pub quiet: bool,
}

impl ToolCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            envs: Vec::new(),
            quiet: false,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    pub fn quiet(mut self) -> Self {
        self.quiet = true;
        self
    }
}

/// Aggregate result of a tool invocation.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub success: bool,
    pub code: Option<i32>,
}

/// Runs external tools. The only implementation outside tests shells out to
/// the real binaries.
pub trait ToolRunner {
    fn run(&self, cmd: &ToolCommand) -> io::Result<ToolOutput>;

    /// Whether a tool is present and answers `--version`.
    fn probe(&self, program: &str) -> bool {
        self.run(&ToolCommand::new(program).arg("--version").quiet())
            .map(|out| out.success)
            .unwrap_or(false)
    }
}

/// Production runner backed by `std::process::Command`.
#[derive(Debug, Default)]
pub struct SystemToolRunner;

impl ToolRunner for SystemToolRunner {
    fn run(&self, cmd: &ToolCommand) -> io::Result<ToolOutput> {
        let mut command = Command::new(&cmd.program);
        command.args(&cmd.args);
        if let Some(cwd) = &cmd.cwd {
            command.current_dir(cwd);
        }
        for (key, value) in &cmd.envs {
            command.env(key, value);
        }

        let status = if cmd.quiet {
            command
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()?
        } else {
            command
                .stdout(Stdio::inherit())
                .stderr(Stdio::inherit())
                .status()?
        };

        Ok(ToolOutput {
            success: status.success(),
            code: status.code(),
        })
    }
}
