//! Plan execution: ordering, the step loop, pause/cancel checkpoints, the
//! progress channel and the cross-file integration gate.
//!
//! Execution is strictly sequential. Between two steps the executor passes a
//! single checkpoint where it honors pause and cancel requests and reports
//! progress; a step that has started always runs to completion.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::core::graph::{GraphError, order_steps};
use crate::core::integration::check_integration;
use crate::core::types::{ContractError, ErrorCode, Violation};
use crate::io::generator::Generator;
use crate::io::process::CommandRunner;
use crate::io::workspace::Workspace;
use crate::plan::{Action, Plan, PlanStatus, Step, StepId, StepResult};
use crate::step::{ExecutionEnv, PlanContext, run_step};

/// Pause and cancel flags shared between the executor and its controller.
///
/// Clones share the same flags.
#[derive(Debug, Clone, Default)]
pub struct ExecutionControl {
    paused: Arc<AtomicBool>,
    cancelled: Arc<AtomicBool>,
}

impl ExecutionControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stop advancing after the current step.
    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
    }

    /// Fail the plan at the next step boundary.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// One message per step transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum ProgressEvent {
    Started {
        total: usize,
    },
    Paused {
        next_step: StepId,
    },
    Resumed {
        next_step: StepId,
    },
    StepStarted {
        step_id: StepId,
        index: usize,
        total: usize,
        action: Action,
    },
    StepFinished {
        step_id: StepId,
        success: bool,
        code: Option<ErrorCode>,
    },
    IntegrationChecked {
        files: usize,
        violations: usize,
    },
    Cancelled {
        completed_steps: usize,
    },
    Finished {
        success: bool,
        completed_steps: usize,
    },
}

/// The error that stopped a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureReport {
    pub code: ErrorCode,
    /// Step that failed; `None` for plan-level failures (cycle, integration, cancel).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_id: Option<StepId>,
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub violations: Vec<Violation>,
}

impl FailureReport {
    fn new(error: ContractError, step_id: Option<StepId>) -> Self {
        Self {
            code: error.code,
            step_id,
            message: error.message,
            violations: error.violations,
        }
    }
}

/// What a caller enumerates after [`execute_plan`] returns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionReport {
    pub success: bool,
    pub completed_steps: usize,
    pub results: Vec<StepResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<FailureReport>,
}

impl ExecutionReport {
    pub fn from_plan(plan: &Plan, error: Option<FailureReport>) -> Self {
        Self {
            success: error.is_none() && plan.status != PlanStatus::Failed,
            completed_steps: plan.completed_steps(),
            results: plan.results.values().cloned().collect(),
            error,
        }
    }
}

/// The plan handed back in its terminal status, plus its report.
#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    pub plan: Plan,
    pub report: ExecutionReport,
}

struct Progress<'a>(Option<&'a Sender<ProgressEvent>>);

impl Progress<'_> {
    fn emit(&self, event: ProgressEvent) {
        let Some(tx) = self.0 else {
            return;
        };
        if tx.send(event).is_err() {
            debug!("progress receiver dropped");
        }
    }
}

/// Execute `plan` step by step and return it in a terminal status.
///
/// A cyclic plan fails before any step runs. The first failing step fails
/// the plan. Once every step succeeded, the files the plan wrote are checked
/// against each other; a broken cross-file contract fails the plan too.
#[instrument(skip_all, fields(steps = plan.steps.len()))]
pub fn execute_plan<W: Workspace, G: Generator, R: CommandRunner>(
    mut plan: Plan,
    env: &ExecutionEnv<'_, W, G, R>,
    control: &ExecutionControl,
    progress: Option<&Sender<ProgressEvent>>,
) -> ExecutionOutcome {
    let progress = Progress(progress);
    plan.status = PlanStatus::Executing;
    plan.current_step = 0;

    let order = match order_steps(&plan.steps) {
        Ok(order) => order,
        Err(err) => {
            let code = match &err {
                GraphError::Cycle(_) => ErrorCode::CycleError,
                GraphError::UnknownDependency { .. } => ErrorCode::SchemaViolation,
            };
            warn!(%err, "plan rejected before execution");
            let error = ContractError::new(code, err.to_string());
            return finish(plan, Some(FailureReport::new(error, None)), &progress);
        }
    };
    let total = order.len();
    info!(total, "executing plan");
    progress.emit(ProgressEvent::Started { total });

    let poll = Duration::from_millis(env.config.pause_poll_ms);
    let mut executed: Vec<Step> = Vec::with_capacity(total);
    let mut written: Vec<String> = Vec::new();

    for (index, step) in order.iter().enumerate() {
        plan.current_step = index;
        if !checkpoint(control, poll, step.id, &progress) {
            let completed_steps = plan.completed_steps();
            info!(completed_steps, "execution cancelled");
            progress.emit(ProgressEvent::Cancelled { completed_steps });
            let error = ContractError::new(
                ErrorCode::Cancelled,
                format!(
                    "cancelled before step {} after {completed_steps} completed step(s)",
                    step.id
                ),
            );
            return finish(plan, Some(FailureReport::new(error, None)), &progress);
        }

        progress.emit(ProgressEvent::StepStarted {
            step_id: step.id,
            index,
            total,
            action: step.action,
        });
        let outcome = run_step(
            step,
            &PlanContext {
                summary: &plan.summary,
                prior_steps: &executed,
            },
            env,
        );
        progress.emit(ProgressEvent::StepFinished {
            step_id: step.id,
            success: outcome.result.success,
            code: outcome.result.code,
        });

        if let Some(path) = outcome.written {
            if !written.contains(&path) {
                written.push(path);
            }
        }
        executed.push(outcome.executed);
        plan.record(outcome.result);

        if let Some(error) = outcome.failure {
            return finish(plan, Some(FailureReport::new(error, Some(step.id))), &progress);
        }
    }
    plan.current_step = total;

    let failure = integration_gate(env.workspace, &written, &progress);
    finish(plan, failure.map(|error| FailureReport::new(error, None)), &progress)
}

/// Step-boundary checkpoint. Blocks while paused; returns false once cancelled.
fn checkpoint(
    control: &ExecutionControl,
    poll: Duration,
    next_step: StepId,
    progress: &Progress<'_>,
) -> bool {
    if control.is_cancelled() {
        return false;
    }
    if !control.is_paused() {
        return true;
    }
    info!(next_step, "execution paused");
    progress.emit(ProgressEvent::Paused { next_step });
    while control.is_paused() {
        if control.is_cancelled() {
            return false;
        }
        thread::sleep(poll);
    }
    if control.is_cancelled() {
        return false;
    }
    info!(next_step, "execution resumed");
    progress.emit(ProgressEvent::Resumed { next_step });
    true
}

/// Re-read every file the plan wrote and check their contracts.
fn integration_gate<W: Workspace>(
    workspace: &W,
    written: &[String],
    progress: &Progress<'_>,
) -> Option<ContractError> {
    let mut artifacts: Vec<(String, String)> = Vec::with_capacity(written.len());
    for path in written {
        match workspace.read(path) {
            Ok(Some(content)) => artifacts.push((path.clone(), content)),
            Ok(None) => debug!(path, "artifact removed by a later step"),
            Err(err) => {
                return Some(ContractError::new(
                    ErrorCode::ExecFailure,
                    format!("re-read {path} for integration check: {err:#}"),
                ));
            }
        }
    }

    let violations = check_integration(&artifacts);
    progress.emit(ProgressEvent::IntegrationChecked {
        files: artifacts.len(),
        violations: violations.len(),
    });
    if violations.is_empty() {
        debug!(files = artifacts.len(), "integration check passed");
        return None;
    }
    warn!(violations = violations.len(), "integration check failed");
    Some(
        ContractError::new(
            ErrorCode::IntegrationViolation,
            format!(
                "{} cross-file contract violation(s) between files written by this plan",
                violations.len()
            ),
        )
        .with_violations(violations),
    )
}

fn finish(mut plan: Plan, error: Option<FailureReport>, progress: &Progress<'_>) -> ExecutionOutcome {
    plan.status = if error.is_some() {
        PlanStatus::Failed
    } else {
        PlanStatus::Completed
    };
    let report = ExecutionReport::from_plan(&plan, error);
    info!(
        success = report.success,
        completed_steps = report.completed_steps,
        "plan finished"
    );
    progress.emit(ProgressEvent::Finished {
        success: report.success,
        completed_steps: report.completed_steps,
    });
    ExecutionOutcome { plan, report }
}
