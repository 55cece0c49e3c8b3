//! Plan data model shared by the grapher, validators and executor.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::core::types::{ErrorCode, Violation};

/// Identifier of a step inside one plan.
pub type StepId = u32;

/// Operation a step performs against the workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Read,
    Write,
    Run,
    Delete,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Action::Read => "read",
            Action::Write => "write",
            Action::Run => "run",
            Action::Delete => "delete",
        }
    }

    /// True for actions that operate on `path` rather than `command`.
    pub fn targets_path(self) -> bool {
        !matches!(self, Action::Run)
    }
}

/// One atomic operation within a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    #[serde(rename = "stepId")]
    pub id: StepId,
    pub action: Action,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    pub description: String,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub depends_on: BTreeSet<StepId>,
}

impl Step {
    /// Text handed to the content generator when this step writes a file.
    pub fn generation_prompt(&self) -> &str {
        match self.prompt.as_deref() {
            Some(prompt) if !prompt.trim().is_empty() => prompt,
            _ => &self.description,
        }
    }
}

/// Lifecycle of a plan while it is owned by the executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanStatus {
    Pending,
    Executing,
    Completed,
    Failed,
}

impl PlanStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, PlanStatus::Completed | PlanStatus::Failed)
    }
}

/// Outcome of one finished step. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepResult {
    pub step_id: StepId,
    pub success: bool,
    /// Action actually performed (differs from the declared one after a strategy switch).
    pub action: Action,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<ErrorCode>,
    pub duration_ms: u64,
    pub attempts: u32,
    /// Violations attached to the step: blocking ones on failure, warnings on success.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub violations: Vec<Violation>,
    /// Violations the file's domain suppressed; informational only.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suppressed: Vec<Violation>,
}

/// An ordered, dependency-annotated set of steps derived from one request.
///
/// The executor takes a plan by value and hands it back once it reaches a
/// terminal status; nothing else mutates it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    pub summary: String,
    pub steps: Vec<Step>,
    pub status: PlanStatus,
    pub results: BTreeMap<StepId, StepResult>,
    /// Index into the execution order of the step currently running (or next to run).
    pub current_step: usize,
}

impl Plan {
    pub fn new(summary: impl Into<String>, steps: Vec<Step>) -> Self {
        Self {
            summary: summary.into(),
            steps,
            status: PlanStatus::Pending,
            results: BTreeMap::new(),
            current_step: 0,
        }
    }

    pub fn step(&self, id: StepId) -> Option<&Step> {
        self.steps.iter().find(|step| step.id == id)
    }

    /// Number of steps that finished successfully.
    pub fn completed_steps(&self) -> usize {
        self.results.values().filter(|result| result.success).count()
    }

    /// Record a finished step. Results are append-only: a second result for
    /// the same step id is ignored.
    pub(crate) fn record(&mut self, result: StepResult) {
        self.results.entry(result.step_id).or_insert(result);
    }
}

/// Wire shape of a plan at the generator boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanDocument {
    pub summary: String,
    pub steps: Vec<Step>,
}

impl From<PlanDocument> for Plan {
    fn from(doc: PlanDocument) -> Self {
        Plan::new(doc.summary, doc.steps)
    }
}

impl From<&Plan> for PlanDocument {
    fn from(plan: &Plan) -> Self {
        Self {
            summary: plan.summary.clone(),
            steps: plan.steps.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_uses_wire_field_names() {
        let raw = r#"{"stepId":2,"action":"write","path":"src/a.ts","description":"d","dependsOn":[1]}"#;
        let step: Step = serde_json::from_str(raw).expect("parse step");
        assert_eq!(step.id, 2);
        assert_eq!(step.action, Action::Write);
        assert!(step.depends_on.contains(&1));
    }

    #[test]
    fn generation_prompt_falls_back_to_description() {
        let step = Step {
            id: 1,
            action: Action::Write,
            path: Some("src/a.ts".to_string()),
            command: None,
            prompt: Some("   ".to_string()),
            description: "create a".to_string(),
            depends_on: BTreeSet::new(),
        };
        assert_eq!(step.generation_prompt(), "create a");
    }

    #[test]
    fn record_keeps_first_result() {
        let mut plan = Plan::new("s", Vec::new());
        let first = StepResult {
            step_id: 1,
            success: true,
            action: Action::Read,
            output: None,
            error: None,
            code: None,
            duration_ms: 1,
            attempts: 1,
            violations: Vec::new(),
            suppressed: Vec::new(),
        };
        plan.record(first.clone());
        plan.record(StepResult {
            success: false,
            ..first.clone()
        });
        assert_eq!(plan.results.get(&1), Some(&first));
        assert_eq!(plan.completed_steps(), 1);
    }
}
