//! Tool and shell invocation.
//!
//! The [`CommandRunner`] trait decouples the pipeline from actually spawning
//! processes. [`SystemShell`] runs commands through `sh -c`; tests use a
//! scripted runner that returns queued outputs without spawning anything.

use std::borrow::Cow;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, info, instrument, warn};

use crate::core::allowlist::CommandAllowlist;
use crate::error::OrchError;
use crate::io::process::{run_command_with_timeout, shell_command};

/// A shell command line to execute.
#[derive(Debug, Clone)]
pub struct ShellRequest {
    pub command: String,
    pub workdir: PathBuf,
    pub timeout: Option<Duration>,
}

/// What a runner observed. `timed_out` outputs are never surfaced as results.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    pub returncode: i32,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
}

/// Abstraction over shell command execution.
pub trait CommandRunner {
    /// Run `request.command` to completion (or timeout). Launch failures are errors;
    /// a non-zero exit is not.
    fn run(&self, request: &ShellRequest) -> Result<ProcessOutput>;
}

/// Runner that spawns `sh -c <command>`.
#[derive(Debug, Clone)]
pub struct SystemShell {
    pub output_limit_bytes: usize,
}

impl CommandRunner for SystemShell {
    #[instrument(skip_all, fields(workdir = %request.workdir.display()))]
    fn run(&self, request: &ShellRequest) -> Result<ProcessOutput> {
        let cmd = shell_command(&request.command, &request.workdir);
        let output = run_command_with_timeout(cmd, request.timeout, self.output_limit_bytes)
            .context("run shell command")?;
        Ok(ProcessOutput {
            returncode: output.exit_code(),
            stdout: output.stdout_text(),
            stderr: output.stderr_text(),
            timed_out: output.timed_out,
        })
    }
}

/// Outcome of a command that ran to completion. Built once per invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    /// The exact command line handed to the shell.
    pub command: String,
    pub returncode: i32,
    pub stdout: String,
    pub stderr: String,
}

pub type ToolResult = CommandResult;
pub type ShellResult = CommandResult;

impl CommandResult {
    pub fn ok(&self) -> bool {
        self.returncode == 0
    }

    /// Stdout followed by stderr (newline separated) when stderr is non-empty.
    pub fn combined_output(&self) -> String {
        if self.stderr.is_empty() {
            self.stdout.clone()
        } else {
            format!("{}\n{}", self.stdout, self.stderr)
        }
    }
}

/// Compose `<base> <quoted prompt>`. The prompt always becomes exactly one shell word.
pub fn compose_tool_command(base: &str, prompt: &str) -> Result<String> {
    let quoted: Cow<'_, str> = shlex::try_quote(prompt).context("quote tool prompt")?;
    Ok(format!("{} {}", base.trim(), quoted))
}

fn execute<R: CommandRunner + ?Sized>(
    runner: &R,
    command: String,
    workdir: &Path,
    timeout: Option<Duration>,
) -> Result<CommandResult> {
    let request = ShellRequest {
        command,
        workdir: workdir.to_path_buf(),
        timeout,
    };
    let output = runner.run(&request)?;
    if output.timed_out {
        let timeout = timeout.unwrap_or_default();
        warn!(command = %request.command, ?timeout, "command timed out");
        return Err(OrchError::TimedOut {
            command: request.command,
            timeout,
        }
        .into());
    }
    debug!(returncode = output.returncode, "command completed");
    Ok(CommandResult {
        command: request.command,
        returncode: output.returncode,
        stdout: output.stdout,
        stderr: output.stderr,
    })
}

/// Runs an AI tool command with a natural-language prompt appended as one argument.
pub struct ToolInvoker<'a, R: ?Sized> {
    runner: &'a R,
    workdir: &'a Path,
    timeout: Option<Duration>,
}

impl<'a, R: CommandRunner + ?Sized> ToolInvoker<'a, R> {
    pub fn new(runner: &'a R, workdir: &'a Path, timeout: Option<Duration>) -> Self {
        Self {
            runner,
            workdir,
            timeout,
        }
    }

    #[instrument(skip_all, fields(tool = base))]
    pub fn invoke(&self, base: &str, prompt: &str) -> Result<ToolResult> {
        let command = compose_tool_command(base, prompt)?;
        info!(prompt_bytes = prompt.len(), "invoking tool");
        let result = execute(self.runner, command, self.workdir, self.timeout)?;
        if !result.ok() {
            warn!(returncode = result.returncode, "tool exited non-zero");
        }
        Ok(result)
    }
}

/// Runs arbitrary commands after they pass the allowlist.
pub struct ShellExecutor<'a, R: ?Sized> {
    runner: &'a R,
    allowlist: &'a CommandAllowlist,
    workdir: &'a Path,
    timeout: Option<Duration>,
}

impl<'a, R: CommandRunner + ?Sized> ShellExecutor<'a, R> {
    pub fn new(
        runner: &'a R,
        allowlist: &'a CommandAllowlist,
        workdir: &'a Path,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            runner,
            allowlist,
            workdir,
            timeout,
        }
    }

    /// Check `command` against the allowlist, then run it.
    ///
    /// A refusal is an [`OrchError::Policy`] and nothing is spawned.
    #[instrument(skip_all, fields(command = %command))]
    pub fn run(&self, command: &str) -> Result<ShellResult> {
        self.allowlist.check(command).map_err(OrchError::Policy)?;
        info!("running allowlisted command");
        execute(self.runner, command.to_string(), self.workdir, self.timeout)
    }
}
