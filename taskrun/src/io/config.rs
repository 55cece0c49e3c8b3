//! Executor configuration stored under `.taskrun/config.toml`.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::preflight::PreflightConfig;
use crate::io::prompt::DEFAULT_BUDGET_BYTES;
use crate::io::workspace::write_atomic;

/// Executor configuration (TOML).
///
/// Edited by humans; missing fields take the defaults below.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TaskrunConfig {
    /// Extra attempts per step after the first (strategy switches included).
    pub max_step_retries: u32,

    /// Generations allowed per file, first draft included.
    pub max_correction_attempts: u32,

    /// Wall-clock limit for each `run` step.
    pub command_timeout_secs: u64,

    /// Truncate command stdout/stderr beyond this many bytes.
    pub output_limit_bytes: usize,

    /// How often a paused execution checks whether it was resumed.
    pub pause_poll_ms: u64,

    /// Byte budget for rendered prompts; droppable sections go first.
    pub prompt_budget_bytes: usize,

    pub generator: GeneratorConfig,

    pub preflight: PreflightConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Command that reads a prompt on stdin and writes the reply to stdout.
    pub command: Vec<String>,

    pub timeout_secs: u64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            command: vec!["llm".to_string()],
            timeout_secs: 600,
        }
    }
}

impl Default for TaskrunConfig {
    fn default() -> Self {
        Self {
            max_step_retries: 2,
            max_correction_attempts: 3,
            command_timeout_secs: 300,
            output_limit_bytes: 100_000,
            pause_poll_ms: 50,
            prompt_budget_bytes: DEFAULT_BUDGET_BYTES,
            generator: GeneratorConfig::default(),
            preflight: PreflightConfig::default(),
        }
    }
}

impl TaskrunConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_correction_attempts == 0 {
            return Err(anyhow!("max_correction_attempts must be > 0"));
        }
        if self.command_timeout_secs == 0 {
            return Err(anyhow!("command_timeout_secs must be > 0"));
        }
        if self.output_limit_bytes == 0 {
            return Err(anyhow!("output_limit_bytes must be > 0"));
        }
        if self.pause_poll_ms == 0 {
            return Err(anyhow!("pause_poll_ms must be > 0"));
        }
        if self.prompt_budget_bytes == 0 {
            return Err(anyhow!("prompt_budget_bytes must be > 0"));
        }
        if self.generator.timeout_secs == 0 {
            return Err(anyhow!("generator.timeout_secs must be > 0"));
        }
        if self.generator.command.first().is_none_or(|c| c.trim().is_empty()) {
            return Err(anyhow!("generator.command must be a non-empty array"));
        }
        if self.preflight.sentence_path_threshold == 0 {
            return Err(anyhow!("preflight.sentence_path_threshold must be > 0"));
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `TaskrunConfig::default()`.
pub fn load_config(path: &Path) -> Result<TaskrunConfig> {
    if !path.exists() {
        return Ok(TaskrunConfig::default());
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: TaskrunConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &TaskrunConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}
