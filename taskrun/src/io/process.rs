//! Child processes with timeouts and bounded output.

use std::io::{ErrorKind, Read, Write};
use std::path::Path;
use std::process::{Command, ExitStatus, Stdio};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

/// Exit status and bounded output of a finished child.
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    /// Bytes read past the limit and discarded.
    pub stdout_truncated: usize,
    pub stderr_truncated: usize,
    pub timed_out: bool,
}

type Capture = thread::JoinHandle<Result<(Vec<u8>, usize)>>;

/// Spawn `cmd`, feed it `stdin`, and wait up to `timeout` for it to exit.
///
/// Prompts can be larger than a pipe buffer, so stdin is written from its own
/// thread while stdout and stderr are drained. A child still running at the
/// deadline is killed and reported with `timed_out`.
#[instrument(skip_all, fields(timeout_secs = timeout.as_secs(), output_limit_bytes))]
pub fn run_command_with_timeout(
    mut cmd: Command,
    stdin: Option<&[u8]>,
    timeout: Duration,
    output_limit_bytes: usize,
) -> Result<CommandOutput> {
    cmd.stdin(if stdin.is_some() {
        Stdio::piped()
    } else {
        Stdio::null()
    })
    .stdout(Stdio::piped())
    .stderr(Stdio::piped());

    let mut child = cmd.spawn().map_err(|err| {
        error!(%err, "failed to spawn command");
        anyhow!(err).context("spawn command")
    })?;

    let feeder = match (stdin, child.stdin.take()) {
        (Some(input), Some(mut pipe)) => {
            let input = input.to_vec();
            Some(thread::spawn(move || pipe.write_all(&input)))
        }
        (Some(_), None) => return Err(anyhow!("stdin was not piped")),
        (None, _) => None,
    };
    let stdout = capture(child.stdout.take(), output_limit_bytes).context("capture stdout")?;
    let stderr = capture(child.stderr.take(), output_limit_bytes).context("capture stderr")?;

    let (status, timed_out) = match child.wait_timeout(timeout).context("wait for command")? {
        Some(status) => (status, false),
        None => {
            warn!(timeout_secs = timeout.as_secs(), "command timed out, killing");
            child.kill().context("kill command")?;
            (child.wait().context("wait command after kill")?, true)
        }
    };

    if let Some(feeder) = feeder {
        // A child that exits without reading all of stdin closes the pipe early.
        match feeder.join() {
            Ok(Err(err)) if err.kind() != ErrorKind::BrokenPipe => {
                debug!(%err, "stdin write failed");
            }
            Err(_) => return Err(anyhow!("stdin writer thread panicked")),
            _ => {}
        }
    }
    let (stdout, stdout_truncated) = finish_capture(stdout).context("join stdout")?;
    let (stderr, stderr_truncated) = finish_capture(stderr).context("join stderr")?;
    if stdout_truncated > 0 || stderr_truncated > 0 {
        warn!(stdout_truncated, stderr_truncated, "output truncated");
    }

    debug!(exit_code = ?status.code(), timed_out, "command finished");
    Ok(CommandOutput {
        status,
        stdout,
        stderr,
        stdout_truncated,
        stderr_truncated,
        timed_out,
    })
}

fn capture<R: Read + Send + 'static>(pipe: Option<R>, limit: usize) -> Result<Capture> {
    let mut reader = pipe.ok_or_else(|| anyhow!("stream was not piped"))?;
    Ok(thread::spawn(move || -> Result<(Vec<u8>, usize)> {
        let mut kept = Vec::new();
        let mut dropped = 0usize;
        let mut chunk = [0u8; 8192];
        loop {
            let n = reader.read(&mut chunk).context("read output")?;
            if n == 0 {
                return Ok((kept, dropped));
            }
            let keep = n.min(limit.saturating_sub(kept.len()));
            kept.extend_from_slice(&chunk[..keep]);
            dropped += n - keep;
        }
    }))
}

fn finish_capture(handle: Capture) -> Result<(Vec<u8>, usize)> {
    handle
        .join()
        .map_err(|_| anyhow!("output reader thread panicked"))?
}

/// Result of one shell command run by a `run` step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutput {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
}

impl RunOutput {
    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }

    /// Stdout followed by stderr, for reports.
    pub fn combined(&self) -> String {
        match (self.stdout.trim().is_empty(), self.stderr.trim().is_empty()) {
            (_, true) => self.stdout.clone(),
            (true, false) => self.stderr.clone(),
            (false, false) => format!("{}\n{}", self.stdout.trim_end(), self.stderr),
        }
    }
}

/// Abstraction over command execution for `run` steps.
pub trait CommandRunner {
    fn run(&self, command: &str, cwd: &Path, timeout: Duration) -> Result<RunOutput>;
}

/// Runs commands through `sh -c` in the workspace root.
#[derive(Debug, Clone)]
pub struct ShellRunner {
    pub output_limit_bytes: usize,
}

impl CommandRunner for ShellRunner {
    #[instrument(skip(self, cwd, timeout), fields(dir = %cwd.display()))]
    fn run(&self, command: &str, cwd: &Path, timeout: Duration) -> Result<RunOutput> {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command).current_dir(cwd);
        let output = run_command_with_timeout(cmd, None, timeout, self.output_limit_bytes)
            .with_context(|| format!("run `{command}`"))?;
        let mut stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let mut stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        if output.stdout_truncated > 0 {
            stdout.push_str(&format!("\n[stdout truncated {} bytes]\n", output.stdout_truncated));
        }
        if output.stderr_truncated > 0 {
            stderr.push_str(&format!("\n[stderr truncated {} bytes]\n", output.stderr_truncated));
        }
        Ok(RunOutput {
            exit_code: output.status.code(),
            stdout,
            stderr,
            timed_out: output.timed_out,
        })
    }
}
