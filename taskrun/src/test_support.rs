//! Test-only helpers: scripted collaborators, scratch workspaces and step builders.

use std::cell::RefCell;
use std::collections::{BTreeSet, VecDeque};
use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Result, anyhow};
use tempfile::TempDir;

use crate::io::generator::{GenerateRequest, Generator};
use crate::io::process::{CommandRunner, RunOutput};
use crate::io::workspace::LocalWorkspace;
use crate::plan::{Action, Step, StepId};

/// Generator that replays queued replies and records every request.
#[derive(Debug, Default)]
pub struct ScriptedGenerator {
    replies: RefCell<VecDeque<String>>,
    requests: RefCell<Vec<GenerateRequest>>,
}

impl ScriptedGenerator {
    pub fn new<S: Into<String>>(replies: impl IntoIterator<Item = S>) -> Self {
        Self {
            replies: RefCell::new(replies.into_iter().map(Into::into).collect()),
            requests: RefCell::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<GenerateRequest> {
        self.requests.borrow().clone()
    }

    /// Replies not consumed yet.
    pub fn remaining(&self) -> usize {
        self.replies.borrow().len()
    }
}

impl Generator for ScriptedGenerator {
    fn generate(&self, request: &GenerateRequest) -> Result<String> {
        self.requests.borrow_mut().push(request.clone());
        self.replies
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| anyhow!("scripted generator has no reply left"))
    }
}

/// Command runner that records commands and replays queued outputs.
///
/// Once the queue is empty every command gets the fallback output.
#[derive(Debug)]
pub struct FakeRunner {
    outputs: RefCell<VecDeque<RunOutput>>,
    fallback: RunOutput,
    commands: RefCell<Vec<String>>,
}

impl Default for FakeRunner {
    fn default() -> Self {
        Self::with_fallback(output(Some(0), "", ""))
    }
}

impl FakeRunner {
    pub fn with_fallback(fallback: RunOutput) -> Self {
        Self {
            outputs: RefCell::new(VecDeque::new()),
            fallback,
            commands: RefCell::new(Vec::new()),
        }
    }

    /// Every command exits with `code` and prints `stderr`.
    pub fn failing(code: i32, stderr: &str) -> Self {
        Self::with_fallback(output(Some(code), "", stderr))
    }

    /// Queue outputs returned before the fallback.
    pub fn then(self, queued: RunOutput) -> Self {
        self.outputs.borrow_mut().push_back(queued);
        self
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.borrow().clone()
    }
}

impl CommandRunner for FakeRunner {
    fn run(&self, command: &str, _cwd: &Path, _timeout: Duration) -> Result<RunOutput> {
        self.commands.borrow_mut().push(command.to_string());
        Ok(self
            .outputs
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone()))
    }
}

/// Build a [`RunOutput`] for a finished command.
pub fn output(exit_code: Option<i32>, stdout: &str, stderr: &str) -> RunOutput {
    RunOutput {
        exit_code,
        stdout: stdout.to_string(),
        stderr: stderr.to_string(),
        timed_out: false,
    }
}

/// Temp directory workspace seeded with `files` (JSON files get `{}`).
pub fn scratch_workspace(files: &[&str]) -> (TempDir, LocalWorkspace) {
    let temp = tempfile::tempdir().expect("tempdir");
    for file in files {
        let path = temp.path().join(file);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent");
        }
        let contents = if file.ends_with(".json") { "{}\n" } else { "" };
        fs::write(&path, contents).expect("seed file");
    }
    let workspace = LocalWorkspace::new(temp.path());
    (temp, workspace)
}

/// Builder for plan steps with deterministic defaults.
#[derive(Debug, Clone)]
pub struct StepBuilder {
    step: Step,
}

impl StepBuilder {
    fn new(id: StepId, action: Action) -> Self {
        Self {
            step: Step {
                id,
                action,
                path: None,
                command: None,
                prompt: None,
                description: format!("step {id}"),
                depends_on: BTreeSet::new(),
            },
        }
    }

    fn with_path(id: StepId, action: Action, path: &str) -> Self {
        let mut builder = Self::new(id, action);
        builder.step.path = Some(path.to_string());
        builder
    }

    pub fn read(id: StepId, path: &str) -> Self {
        Self::with_path(id, Action::Read, path)
    }

    pub fn write(id: StepId, path: &str) -> Self {
        Self::with_path(id, Action::Write, path)
    }

    pub fn delete(id: StepId, path: &str) -> Self {
        Self::with_path(id, Action::Delete, path)
    }

    pub fn run(id: StepId, command: &str) -> Self {
        let mut builder = Self::new(id, Action::Run);
        builder.step.command = Some(command.to_string());
        builder
    }

    pub fn depends_on(mut self, ids: &[StepId]) -> Self {
        self.step.depends_on.extend(ids.iter().copied());
        self
    }

    pub fn prompt(mut self, prompt: &str) -> Self {
        self.step.prompt = Some(prompt.to_string());
        self
    }

    pub fn build(self) -> Step {
        self.step
    }
}
