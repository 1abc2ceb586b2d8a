//! Child processes run through `sh -c`, with an optional deadline and a cap on
//! how much output is kept in memory.
//!
//! Each child leads its own process group; a timeout kills the whole group so
//! no grandchild keeps the output pipes open past the deadline.

use std::io::{self, Read};
#[cfg(unix)]
use std::os::unix::process::CommandExt;
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument, warn};
use wait_timeout::ChildExt;

/// One output stream: the bytes kept plus a count of the bytes drained past the cap.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Captured {
    pub bytes: Vec<u8>,
    pub dropped: u64,
}

impl Captured {
    /// Lossy UTF-8, followed by a `[<label> truncated N bytes]` line when bytes were dropped.
    pub fn text(&self, label: &str) -> String {
        let mut text = String::from_utf8_lossy(&self.bytes).into_owned();
        if self.dropped > 0 {
            text.push_str(&format!("\n[{label} truncated {} bytes]\n", self.dropped));
        }
        text
    }
}

#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: Captured,
    pub stderr: Captured,
    /// The deadline passed and the child was killed.
    pub timed_out: bool,
}

impl CommandOutput {
    /// Exit code, or `-1` when the process was terminated by a signal.
    pub fn exit_code(&self) -> i32 {
        self.status.code().unwrap_or(-1)
    }

    pub fn stdout_text(&self) -> String {
        self.stdout.text("stdout")
    }

    pub fn stderr_text(&self) -> String {
        self.stderr.text("stderr")
    }
}

pub fn shell_command(command: &str, workdir: &Path) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command).current_dir(workdir);
    cmd
}

/// Spawn `cmd`, drain both pipes on reader threads and wait for exit.
///
/// At most `output_limit_bytes` per stream are kept; the rest is still read so the
/// child never blocks on a full pipe. With a `timeout` the child is killed once it
/// elapses and the result is flagged `timed_out`.
#[instrument(skip_all, fields(timeout_ms = timeout.map(|t| t.as_millis() as u64), output_limit_bytes))]
pub fn run_command_with_timeout(
    mut cmd: Command,
    timeout: Option<Duration>,
    output_limit_bytes: usize,
) -> Result<CommandOutput> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    #[cfg(unix)]
    cmd.process_group(0);

    let mut child = cmd
        .spawn()
        .inspect_err(|err| warn!(%err, "spawn failed"))
        .context("spawn command")?;
    debug!(pid = child.id(), "child spawned");

    let limit = output_limit_bytes as u64;
    let stdout_reader = spawn_capture(child.stdout.take(), limit, "stdout")?;
    let stderr_reader = spawn_capture(child.stderr.take(), limit, "stderr")?;

    let (status, timed_out) = wait_for(&mut child, timeout)?;
    let stdout = finish_capture(stdout_reader).context("collect stdout")?;
    let stderr = finish_capture(stderr_reader).context("collect stderr")?;

    if stdout.dropped > 0 || stderr.dropped > 0 {
        warn!(
            stdout_dropped = stdout.dropped,
            stderr_dropped = stderr.dropped,
            "output over limit"
        );
    }
    debug!(code = ?status.code(), timed_out, "child exited");
    Ok(CommandOutput {
        status,
        stdout,
        stderr,
        timed_out,
    })
}

fn wait_for(child: &mut Child, timeout: Option<Duration>) -> Result<(ExitStatus, bool)> {
    let Some(limit) = timeout else {
        return Ok((child.wait().context("wait for command")?, false));
    };
    if let Some(status) = child.wait_timeout(limit).context("wait for command")? {
        return Ok((status, false));
    }
    warn!(timeout_ms = limit.as_millis() as u64, "deadline passed, killing process group");
    kill_group(child)?;
    Ok((child.wait().context("reap killed command")?, true))
}

#[cfg(unix)]
fn kill_group(child: &mut Child) -> Result<()> {
    use nix::errno::Errno;
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    let pgid = i32::try_from(child.id()).context("child pid out of range")?;
    match killpg(Pid::from_raw(pgid), Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(err) => {
            warn!(%err, "killpg failed, killing child only");
            child.kill().context("kill command")
        }
    }
}

#[cfg(not(unix))]
fn kill_group(child: &mut Child) -> Result<()> {
    child.kill().context("kill command")
}

fn spawn_capture<R>(pipe: Option<R>, limit: u64, name: &str) -> Result<JoinHandle<Result<Captured>>>
where
    R: Read + Send + 'static,
{
    let pipe = pipe.ok_or_else(|| anyhow!("{name} was not piped"))?;
    Ok(thread::spawn(move || capture_bounded(pipe, limit)))
}

fn finish_capture(handle: JoinHandle<Result<Captured>>) -> Result<Captured> {
    handle
        .join()
        .map_err(|_| anyhow!("output reader thread panicked"))?
}

fn capture_bounded<R: Read>(mut reader: R, limit: u64) -> Result<Captured> {
    let mut bytes = Vec::new();
    reader
        .by_ref()
        .take(limit)
        .read_to_end(&mut bytes)
        .context("read output")?;
    let dropped = io::copy(&mut reader, &mut io::sink()).context("drain output")?;
    Ok(Captured { bytes, dropped })
}
