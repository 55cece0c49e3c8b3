//! Execution of a single plan step.
//!
//! A step passes pre-flight on its raw form, is normalized, then runs its
//! action under a bounded attempt loop. A `read` of a missing file may be
//! switched to a `write` once; a `write` runs the generate, validate and
//! correct sub-loop before anything touches disk.

use std::time::{Duration, Instant};

use tracing::{debug, info, instrument, warn};

use crate::core::architecture::classify_layer;
use crate::core::normalize::{normalize_content, normalize_path, normalize_step};
use crate::core::pipeline::{ValidationReport, validate_content};
use crate::core::preflight::{PreflightContext, check_step};
use crate::core::strategy::switch_on_missing_read;
use crate::core::types::{ContractError, ErrorCode, Violation};
use crate::io::config::TaskrunConfig;
use crate::io::generator::{GenerateKind, GenerateRequest, Generator};
use crate::io::process::CommandRunner;
use crate::io::prompt::{ContentPromptInputs, ContextFile, CorrectionPromptInputs, PromptBuilder};
use crate::io::workspace::Workspace;
use crate::plan::{Action, Step, StepResult};

/// Collaborators a plan executes against.
pub struct ExecutionEnv<'a, W, G, R> {
    pub workspace: &'a W,
    pub generator: &'a G,
    pub runner: &'a R,
    pub config: &'a TaskrunConfig,
    pub prompts: &'a PromptBuilder,
}

/// What a step can see of the plan it belongs to.
#[derive(Debug, Clone, Copy)]
pub struct PlanContext<'a> {
    pub summary: &'a str,
    /// Steps that already ran, as executed, in execution order.
    pub prior_steps: &'a [Step],
}

/// Result of [`run_step`].
#[derive(Debug, Clone)]
pub struct StepOutcome {
    pub result: StepResult,
    /// The step as it finally ran: normalized, with any strategy switch applied.
    pub executed: Step,
    /// Path written by this step, if any.
    pub written: Option<String>,
    /// Terminal failure, if the step did not succeed.
    pub failure: Option<ContractError>,
}

/// A failed attempt.
#[derive(Debug)]
struct AttemptFailure {
    error: ContractError,
    retryable: bool,
    missing_read: bool,
    output: Option<String>,
}

impl AttemptFailure {
    fn fatal(error: ContractError) -> Self {
        Self {
            error,
            retryable: false,
            missing_read: false,
            output: None,
        }
    }

    fn retryable(message: impl Into<String>) -> Self {
        Self {
            error: ContractError::new(ErrorCode::ExecFailure, message),
            retryable: true,
            missing_read: false,
            output: None,
        }
    }

    /// Two failures with the same signature will not resolve by retrying.
    fn signature(&self) -> String {
        format!(
            "{}|{}|{}",
            self.error.code,
            self.error.message,
            self.output.as_deref().unwrap_or_default()
        )
    }
}

/// Typed contract failures keep their code; anything else is an I/O or
/// process failure and may be retried.
impl From<anyhow::Error> for AttemptFailure {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast_ref::<ContractError>() {
            Some(contract) => Self::fatal(contract.clone()),
            None => Self::retryable(format!("{err:#}")),
        }
    }
}

/// Successful attempt.
#[derive(Debug, Default)]
struct Performed {
    output: Option<String>,
    written: Option<String>,
    warnings: Vec<Violation>,
    suppressed: Vec<Violation>,
}

/// Execute one step and return its result. Never fails: every error is
/// folded into the returned [`StepResult`].
#[instrument(skip_all, fields(step_id = step.id, action = step.action.as_str()))]
pub fn run_step<W: Workspace, G: Generator, R: CommandRunner>(
    step: &Step,
    plan: &PlanContext<'_>,
    env: &ExecutionEnv<'_, W, G, R>,
) -> StepOutcome {
    let start = Instant::now();
    let mut current = step.clone();
    let mut switched = false;

    if let Err(err) = preflight(step, plan, env) {
        let reroutable = err.code == ErrorCode::GreenfieldViolation
            && env.config.preflight.reroute_greenfield_reads
            && step
                .path
                .as_deref()
                .map(normalize_path)
                .and_then(|path| switch_on_missing_read(&path))
                .is_some();
        if !reroutable {
            warn!(code = %err.code, error = %err.message, "pre-flight rejected step");
            return failed(normalize_step(step), err, None, 0, start);
        }
        info!(path = step.path.as_deref(), "rerouting greenfield read to write");
        current.action = Action::Write;
        switched = true;
    }

    let mut current = normalize_step(&current);
    let max_attempts = 1 + env.config.max_step_retries;
    let mut attempts = 0u32;
    let mut last_signature: Option<String> = None;

    loop {
        attempts += 1;
        debug!(attempt = attempts, action = current.action.as_str(), "attempting step");
        let failure = match perform(&current, plan, env) {
            Ok(performed) => return succeeded(current, performed, attempts, start),
            Err(failure) => failure,
        };

        if failure.missing_read && !switched && attempts < max_attempts {
            let path = current.path.as_deref().unwrap_or_default();
            if let Some(matched) = switch_on_missing_read(path) {
                info!(path, heuristic = %matched, "missing read target; switching to write");
                current.action = Action::Write;
                switched = true;
                last_signature = None;
                continue;
            }
        }

        if !failure.retryable || attempts >= max_attempts {
            warn!(
                attempts,
                code = %failure.error.code,
                error = %failure.error.message,
                "step failed"
            );
            return failed(current, failure.error, failure.output, attempts, start);
        }

        let signature = failure.signature();
        if last_signature.as_deref() == Some(signature.as_str()) {
            warn!(attempts, "identical failure on retry; giving up early");
            return failed(current, failure.error, failure.output, attempts, start);
        }
        debug!(attempts, error = %failure.error.message, "retrying step");
        last_signature = Some(signature);
    }
}

fn preflight<W: Workspace, G, R>(
    step: &Step,
    plan: &PlanContext<'_>,
    env: &ExecutionEnv<'_, W, G, R>,
) -> Result<(), ContractError> {
    let workspace_has_artifacts = env.workspace.has_artifacts().map_err(|err| {
        ContractError::new(
            ErrorCode::ExecFailure,
            format!("scan workspace before step {}: {err:#}", step.id),
        )
    })?;
    check_step(
        step,
        &PreflightContext {
            workspace_has_artifacts,
            prior_steps: plan.prior_steps,
            config: &env.config.preflight,
        },
    )
}

fn perform<W: Workspace, G: Generator, R: CommandRunner>(
    step: &Step,
    plan: &PlanContext<'_>,
    env: &ExecutionEnv<'_, W, G, R>,
) -> Result<Performed, AttemptFailure> {
    match step.action {
        Action::Read => perform_read(step, env),
        Action::Write => perform_write(step, plan, env),
        Action::Run => perform_run(step, env),
        Action::Delete => perform_delete(step, env),
    }
}

fn target(step: &Step) -> Result<&str, AttemptFailure> {
    step.path.as_deref().ok_or_else(|| {
        AttemptFailure::fatal(ContractError::new(
            ErrorCode::SchemaViolation,
            format!("{} step {} has no path", step.action.as_str(), step.id),
        ))
    })
}

fn perform_read<W: Workspace, G, R>(
    step: &Step,
    env: &ExecutionEnv<'_, W, G, R>,
) -> Result<Performed, AttemptFailure> {
    let path = target(step)?;
    match env.workspace.read(path)? {
        Some(contents) => Ok(Performed {
            output: Some(clip(contents, env.config.output_limit_bytes)),
            ..Performed::default()
        }),
        None => Err(AttemptFailure {
            missing_read: true,
            ..AttemptFailure::retryable(format!("read target '{path}' does not exist"))
        }),
    }
}

fn perform_delete<W: Workspace, G, R>(
    step: &Step,
    env: &ExecutionEnv<'_, W, G, R>,
) -> Result<Performed, AttemptFailure> {
    let path = target(step)?;
    if env.workspace.delete(path)? {
        return Ok(Performed {
            output: Some(format!("deleted {path}")),
            ..Performed::default()
        });
    }
    Err(AttemptFailure::fatal(ContractError::new(
        ErrorCode::ExecFailure,
        format!("delete target '{path}' does not exist"),
    )))
}

fn perform_run<W: Workspace, G, R: CommandRunner>(
    step: &Step,
    env: &ExecutionEnv<'_, W, G, R>,
) -> Result<Performed, AttemptFailure> {
    let command = step.command.as_deref().ok_or_else(|| {
        AttemptFailure::fatal(ContractError::new(
            ErrorCode::SchemaViolation,
            format!("run step {} has no command", step.id),
        ))
    })?;
    let timeout = Duration::from_secs(env.config.command_timeout_secs);
    let output = env.runner.run(command, env.workspace.root(), timeout)?;
    let combined = clip(output.combined(), env.config.output_limit_bytes);
    if output.success() {
        return Ok(Performed {
            output: Some(combined),
            ..Performed::default()
        });
    }
    let message = if output.timed_out {
        format!("`{command}` timed out after {}s", timeout.as_secs())
    } else {
        match output.exit_code {
            Some(code) => format!("`{command}` exited with status {code}"),
            None => format!("`{command}` was terminated by a signal"),
        }
    };
    Err(AttemptFailure {
        output: Some(combined),
        ..AttemptFailure::retryable(message)
    })
}

fn perform_write<W: Workspace, G: Generator, R>(
    step: &Step,
    plan: &PlanContext<'_>,
    env: &ExecutionEnv<'_, W, G, R>,
) -> Result<Performed, AttemptFailure> {
    let path = target(step)?;
    let context_files = dependency_context(step, plan, env.workspace)?;
    let inputs = ContentPromptInputs {
        path,
        instructions: step.generation_prompt(),
        summary: plan.summary,
        layer: classify_layer(path),
        context_files: &context_files,
    };

    let (content, report) = generate_validated(path, &inputs, env)?;
    env.workspace.write(path, &content)?;
    info!(path, bytes = content.len(), "wrote file");

    Ok(Performed {
        output: Some(format!("wrote {} bytes to {path}", content.len())),
        written: Some(path.to_string()),
        warnings: report.warnings().cloned().collect(),
        suppressed: report.suppressed,
    })
}

/// Generate content for `path` and run the correction loop until it
/// validates or the generation bound is reached.
fn generate_validated<W, G: Generator, R>(
    path: &str,
    inputs: &ContentPromptInputs<'_>,
    env: &ExecutionEnv<'_, W, G, R>,
) -> Result<(String, ValidationReport), AttemptFailure> {
    let prompt = env.prompts.build_content(inputs)?;
    let reply = env.generator.generate(&GenerateRequest {
        kind: GenerateKind::Content,
        prompt,
        path: Some(path.to_string()),
    })?;
    let mut content = normalize_content(&reply);
    let mut report = validate_content(path, &content);
    let mut generations = 1u32;

    while report.has_blocking() && generations < env.config.max_correction_attempts {
        let blocking: Vec<Violation> = report.blocking().cloned().collect();
        debug!(
            path,
            generations,
            violations = blocking.len(),
            "draft rejected; requesting correction"
        );
        let prompt = env.prompts.build_correction(&CorrectionPromptInputs {
            content: inputs.clone(),
            previous: &content,
            violations: &blocking,
            attempt: generations,
        })?;
        let reply = env.generator.generate(&GenerateRequest {
            kind: GenerateKind::Correction,
            prompt,
            path: Some(path.to_string()),
        })?;
        generations += 1;

        let revised = normalize_content(&reply);
        if revised == content {
            warn!(path, generations, "correction returned identical content");
            break;
        }
        content = revised;
        report = validate_content(path, &content);
    }

    let blocking: Vec<Violation> = report.blocking().cloned().collect();
    let Some(first) = blocking.first() else {
        return Ok((content, report));
    };
    let code = first.kind.code();
    warn!(path, generations, %code, "content still invalid; write blocked");
    Err(AttemptFailure::fatal(
        ContractError::new(
            code,
            format!(
                "{path} failed validation after {generations} generation(s); nothing was written"
            ),
        )
        .with_violations(blocking),
    ))
}

/// Current contents of the files this step's dependencies touched.
fn dependency_context<W: Workspace>(
    step: &Step,
    plan: &PlanContext<'_>,
    workspace: &W,
) -> Result<Vec<ContextFile>, AttemptFailure> {
    let mut files: Vec<ContextFile> = Vec::new();
    for prior in plan
        .prior_steps
        .iter()
        .filter(|prior| step.depends_on.contains(&prior.id))
    {
        let Some(path) = prior.path.as_deref() else {
            continue;
        };
        if Some(path) == step.path.as_deref() || files.iter().any(|f| f.path == path) {
            continue;
        }
        if let Some(content) = workspace.read(path)? {
            files.push(ContextFile {
                path: path.to_string(),
                content,
            });
        }
    }
    Ok(files)
}

fn succeeded(executed: Step, performed: Performed, attempts: u32, start: Instant) -> StepOutcome {
    StepOutcome {
        result: StepResult {
            step_id: executed.id,
            success: true,
            action: executed.action,
            output: performed.output,
            error: None,
            code: None,
            duration_ms: elapsed_ms(start),
            attempts,
            violations: performed.warnings,
            suppressed: performed.suppressed,
        },
        written: performed.written,
        executed,
        failure: None,
    }
}

fn failed(
    executed: Step,
    error: ContractError,
    output: Option<String>,
    attempts: u32,
    start: Instant,
) -> StepOutcome {
    StepOutcome {
        result: StepResult {
            step_id: executed.id,
            success: false,
            action: executed.action,
            output,
            error: Some(error.message.clone()),
            code: Some(error.code),
            duration_ms: elapsed_ms(start),
            attempts,
            violations: error.violations.clone(),
            suppressed: Vec::new(),
        },
        executed,
        written: None,
        failure: Some(error),
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// Truncate report output on a char boundary.
fn clip(mut text: String, limit: usize) -> String {
    if text.len() <= limit {
        return text;
    }
    let mut cut = limit;
    while cut > 0 && !text.is_char_boundary(cut) {
        cut -= 1;
    }
    let dropped = text.len() - cut;
    text.truncate(cut);
    text.push_str(&format!("\n[truncated {dropped} bytes]"));
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FakeRunner, ScriptedGenerator, StepBuilder, scratch_workspace};

    const BUTTON: &str = "export function Button({ className }: { className?: string }) {\n  return <button className={className}>ok</button>;\n}\n";

    fn run(
        step: &Step,
        prior: &[Step],
        workspace: &crate::io::workspace::LocalWorkspace,
        generator: &ScriptedGenerator,
        runner: &FakeRunner,
        config: &TaskrunConfig,
    ) -> StepOutcome {
        let prompts = PromptBuilder::default();
        let env = ExecutionEnv {
            workspace,
            generator,
            runner,
            config,
            prompts: &prompts,
        };
        run_step(
            step,
            &PlanContext {
                summary: "test plan",
                prior_steps: prior,
            },
            &env,
        )
    }

    #[test]
    fn write_generates_validates_and_writes() {
        let (_temp, ws) = scratch_workspace(&["package.json"]);
        let generator = ScriptedGenerator::new([format!("```tsx\n{BUTTON}```")]);
        let step = StepBuilder::write(1, "src/components/Button.tsx").build();

        let outcome = run(&step, &[], &ws, &generator, &FakeRunner::default(), &TaskrunConfig::default());
        assert!(outcome.result.success, "{:?}", outcome.result);
        assert_eq!(outcome.written.as_deref(), Some("src/components/Button.tsx"));
        assert_eq!(
            ws.read("src/components/Button.tsx").expect("read").as_deref(),
            Some(BUTTON)
        );
        assert_eq!(generator.requests().len(), 1);
    }

    #[test]
    fn correction_loop_feeds_violations_back() {
        let (_temp, ws) = scratch_workspace(&["package.json"]);
        let generator = ScriptedGenerator::new([
            "import { useState } from 'react';\nexport function total(xs: number[]) {\n  return xs.reduce((a, b) => a + b, 0);\n}\n".to_string(),
            "export function total(xs: number[]) {\n  return xs.reduce((a, b) => a + b, 0);\n}\n".to_string(),
        ]);
        let step = StepBuilder::write(1, "src/services/total.ts").build();

        let outcome = run(&step, &[], &ws, &generator, &FakeRunner::default(), &TaskrunConfig::default());
        assert!(outcome.result.success, "{:?}", outcome.result);
        let requests = generator.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].kind, GenerateKind::Correction);
        assert!(requests[1].prompt.contains("layer.service.no-react-hooks"));
    }

    #[test]
    fn exhausted_corrections_block_the_write() {
        let (_temp, ws) = scratch_workspace(&["package.json"]);
        let bad = "import { useState } from 'react';\nexport const a = 1;\n";
        let generator = ScriptedGenerator::new([
            bad.to_string(),
            bad.replace("a = 1", "a = 2"),
            bad.replace("a = 1", "a = 3"),
        ]);
        let step = StepBuilder::write(1, "src/services/a.ts").build();

        let outcome = run(&step, &[], &ws, &generator, &FakeRunner::default(), &TaskrunConfig::default());
        assert!(!outcome.result.success);
        assert_eq!(outcome.result.code, Some(ErrorCode::LayerViolation));
        assert!(!outcome.result.violations.is_empty());
        assert_eq!(generator.requests().len(), 3);
        assert_eq!(outcome.result.attempts, 1);
        assert!(!ws.exists("src/services/a.ts"));
    }

    #[test]
    fn identical_correction_stops_the_loop() {
        let (_temp, ws) = scratch_workspace(&["package.json"]);
        let bad = "import { useState } from 'react';\nexport const a = 1;\n";
        let generator = ScriptedGenerator::new([bad.to_string(), bad.to_string(), bad.to_string()]);
        let step = StepBuilder::write(1, "src/services/a.ts").build();

        let outcome = run(&step, &[], &ws, &generator, &FakeRunner::default(), &TaskrunConfig::default());
        assert!(!outcome.result.success);
        assert_eq!(generator.requests().len(), 2);
    }

    #[test]
    fn warnings_do_not_block_and_are_attached() {
        let (_temp, ws) = scratch_workspace(&["package.json"]);
        let generator = ScriptedGenerator::new([
            "export function sum(a: number, b: number): number {\n  console.log(a, b);\n  return a + b;\n}\n".to_string(),
        ]);
        let step = StepBuilder::write(1, "src/services/sum.ts").build();

        let outcome = run(&step, &[], &ws, &generator, &FakeRunner::default(), &TaskrunConfig::default());
        assert!(outcome.result.success, "{:?}", outcome.result);
        assert!(outcome.result.violations.iter().any(|v| v.rule_id == "no-console-log"));
        assert!(ws.exists("src/services/sum.ts"));
    }

    #[test]
    fn missing_source_read_switches_to_write_once() {
        let (_temp, ws) = scratch_workspace(&["package.json"]);
        let generator = ScriptedGenerator::new(["export const a = 1;\n".to_string()]);
        let step = StepBuilder::read(1, "src/a.ts").build();

        let outcome = run(&step, &[], &ws, &generator, &FakeRunner::default(), &TaskrunConfig::default());
        assert!(outcome.result.success, "{:?}", outcome.result);
        assert_eq!(outcome.result.action, Action::Write);
        assert_eq!(outcome.executed.action, Action::Write);
        assert_eq!(outcome.result.attempts, 2);
        assert!(ws.exists("src/a.ts"));
    }

    #[test]
    fn missing_read_with_unknown_suffix_is_not_switched() {
        let (_temp, ws) = scratch_workspace(&["package.json"]);
        let generator = ScriptedGenerator::new(Vec::<String>::new());
        let step = StepBuilder::read(1, "logs/server.log").build();

        let outcome = run(&step, &[], &ws, &generator, &FakeRunner::default(), &TaskrunConfig::default());
        assert!(!outcome.result.success);
        assert_eq!(outcome.result.code, Some(ErrorCode::ExecFailure));
        assert_eq!(outcome.result.action, Action::Read);
        assert!(outcome.result.attempts >= 2);
        assert!(generator.requests().is_empty());
    }

    #[test]
    fn switch_needs_a_remaining_attempt() {
        let (_temp, ws) = scratch_workspace(&["package.json"]);
        let generator = ScriptedGenerator::new(Vec::<String>::new());
        let step = StepBuilder::read(1, "src/a.ts").build();
        let config = TaskrunConfig {
            max_step_retries: 0,
            ..TaskrunConfig::default()
        };

        let outcome = run(&step, &[], &ws, &generator, &FakeRunner::default(), &config);
        assert!(!outcome.result.success);
        assert_eq!(outcome.result.attempts, 1);
        assert_eq!(outcome.result.action, Action::Read);
        assert!(!ws.exists("src/a.ts"));
    }

    #[test]
    fn greenfield_read_is_rejected_without_side_effects() {
        let (_temp, ws) = scratch_workspace(&[]);
        let generator = ScriptedGenerator::new(Vec::<String>::new());
        let step = StepBuilder::read(1, "src/a.ts").build();

        let outcome = run(&step, &[], &ws, &generator, &FakeRunner::default(), &TaskrunConfig::default());
        assert_eq!(outcome.result.code, Some(ErrorCode::GreenfieldViolation));
        assert_eq!(outcome.result.attempts, 0);
        assert!(!ws.has_artifacts().expect("scan"));
    }

    #[test]
    fn greenfield_reroute_is_opt_in() {
        let (_temp, ws) = scratch_workspace(&[]);
        let generator = ScriptedGenerator::new(["export const a = 1;\n".to_string()]);
        let step = StepBuilder::read(1, "src/a.ts").build();
        let mut config = TaskrunConfig::default();
        config.preflight.reroute_greenfield_reads = true;

        let outcome = run(&step, &[], &ws, &generator, &FakeRunner::default(), &config);
        assert!(outcome.result.success, "{:?}", outcome.result);
        assert_eq!(outcome.result.action, Action::Write);
        assert_eq!(outcome.result.attempts, 1);
    }

    #[test]
    fn failing_command_retries_then_stops_on_identical_failure() {
        let (_temp, ws) = scratch_workspace(&["package.json"]);
        let runner = FakeRunner::failing(1, "boom");
        let step = StepBuilder::run(1, "npm test").build();

        let outcome = run(&step, &[], &ws, &ScriptedGenerator::default(), &runner, &TaskrunConfig::default());
        assert!(!outcome.result.success);
        assert_eq!(outcome.result.code, Some(ErrorCode::ExecFailure));
        assert_eq!(runner.commands(), vec!["npm test", "npm test"]);
        assert!(outcome.result.output.as_deref().is_some_and(|o| o.contains("boom")));
    }

    #[test]
    fn deleting_a_missing_file_is_not_retried() {
        let (_temp, ws) = scratch_workspace(&["package.json"]);
        let step = StepBuilder::delete(1, "src/gone.ts").build();

        let outcome = run(&step, &[], &ws, &ScriptedGenerator::default(), &FakeRunner::default(), &TaskrunConfig::default());
        assert_eq!(outcome.result.code, Some(ErrorCode::ExecFailure));
        assert_eq!(outcome.result.attempts, 1);
    }

    #[test]
    fn dependency_files_are_passed_as_context() {
        let (_temp, ws) = scratch_workspace(&["package.json"]);
        ws.write("src/theme.ts", "export const theme = { primary: 'blue' };\n")
            .expect("write");
        let generator = ScriptedGenerator::new(["export const b = 1;\n".to_string()]);
        let prior = vec![StepBuilder::write(1, "src/theme.ts").build()];
        let step = StepBuilder::write(2, "src/b.ts").depends_on(&[1]).build();

        let outcome = run(&step, &prior, &ws, &generator, &FakeRunner::default(), &TaskrunConfig::default());
        assert!(outcome.result.success, "{:?}", outcome.result);
        assert!(generator.requests()[0].prompt.contains("primary: 'blue'"));
    }

    #[test]
    fn clip_respects_char_boundaries() {
        let clipped = clip("héllo".to_string(), 2);
        assert!(clipped.starts_with('h'));
        assert!(clipped.contains("[truncated"));
    }
}
