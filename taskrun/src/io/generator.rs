//! Generator abstraction for plan and file-content generation.
//!
//! The [`Generator`] trait decouples execution from the model backend. The
//! production backend pipes the prompt into a configured command and takes
//! its stdout as the reply; tests use scripted generators that return
//! predetermined replies without spawning processes.

use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info, instrument, warn};

use crate::io::process::run_command_with_timeout;

/// What the generator is asked to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerateKind {
    /// A plan document (JSON).
    Plan,
    /// First draft of a file.
    Content,
    /// A revised file after validation feedback.
    Correction,
}

/// Parameters for one generator call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerateRequest {
    pub kind: GenerateKind,
    /// Fully rendered prompt text.
    pub prompt: String,
    /// Target file for content and correction requests.
    pub path: Option<String>,
}

/// Abstraction over generation backends.
pub trait Generator {
    /// Produce a reply for `request`. Replies are raw text; callers normalize them.
    fn generate(&self, request: &GenerateRequest) -> Result<String>;
}

/// Generator that runs an external command with the prompt on stdin.
#[derive(Debug, Clone)]
pub struct CommandGenerator {
    pub command: Vec<String>,
    pub workdir: PathBuf,
    pub timeout: Duration,
    pub output_limit_bytes: usize,
}

impl Generator for CommandGenerator {
    #[instrument(skip_all, fields(kind = ?request.kind, path = request.path.as_deref()))]
    fn generate(&self, request: &GenerateRequest) -> Result<String> {
        let (program, args) = self
            .command
            .split_first()
            .ok_or_else(|| anyhow!("generator command is empty"))?;
        info!(program = %program, "invoking generator");

        let mut cmd = Command::new(program);
        cmd.args(args).current_dir(&self.workdir);
        let output = run_command_with_timeout(
            cmd,
            Some(request.prompt.as_bytes()),
            self.timeout,
            self.output_limit_bytes,
        )
        .with_context(|| format!("run generator {program}"))?;

        if output.timed_out {
            warn!(timeout_secs = self.timeout.as_secs(), "generator timed out");
            return Err(anyhow!("generator timed out after {:?}", self.timeout));
        }
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(exit_code = ?output.status.code(), "generator failed");
            return Err(anyhow!(
                "generator failed with status {:?}: {}",
                output.status.code(),
                stderr.trim()
            ));
        }
        if output.stdout_truncated > 0 {
            return Err(anyhow!(
                "generator reply exceeded {} bytes",
                self.output_limit_bytes
            ));
        }

        let reply = String::from_utf8(output.stdout).context("generator reply is not UTF-8")?;
        if reply.trim().is_empty() {
            return Err(anyhow!("generator returned an empty reply"));
        }
        debug!(bytes = reply.len(), "generator replied");
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn generator(command: &[&str]) -> CommandGenerator {
        CommandGenerator {
            command: command.iter().map(|s| s.to_string()).collect(),
            workdir: std::env::temp_dir(),
            timeout: Duration::from_secs(10),
            output_limit_bytes: 10_000,
        }
    }

    fn request() -> GenerateRequest {
        GenerateRequest {
            kind: GenerateKind::Content,
            prompt: "export const a = 1;".to_string(),
            path: Some("src/a.ts".to_string()),
        }
    }

    #[test]
    fn pipes_prompt_through_command() {
        let reply = generator(&["cat"]).generate(&request()).expect("generate");
        assert_eq!(reply, "export const a = 1;");
    }

    #[test]
    fn failing_command_is_an_error() {
        let err = generator(&["sh", "-c", "cat >/dev/null; echo boom >&2; exit 1"])
            .generate(&request())
            .expect_err("should fail");
        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn empty_reply_is_an_error() {
        let err = generator(&["sh", "-c", "cat >/dev/null"]).generate(&request()).expect_err("empty");
        assert!(err.to_string().contains("empty reply"));
    }
}
