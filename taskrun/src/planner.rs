//! Turn a natural-language request into a validated plan.

use anyhow::{Context, Result, anyhow};
use tracing::{info, instrument};

use crate::io::generator::{GenerateKind, GenerateRequest, Generator};
use crate::io::plan_store::parse_generated_plan;
use crate::io::prompt::{PlanPromptInputs, PromptBuilder};
use crate::io::workspace::Workspace;
use crate::plan::Plan;

/// Workspace files listed in the plan prompt.
const MAX_LISTED_FILES: usize = 200;

/// Ask the generator for a plan and load it through the schema boundary.
///
/// A reply that is not a valid plan fails with a `SCHEMA_VIOLATION`
/// [`ContractError`](crate::core::types::ContractError) in the error chain.
#[instrument(skip_all)]
pub fn plan_from_request<W: Workspace, G: Generator>(
    request: &str,
    workspace: &W,
    generator: &G,
    prompts: &PromptBuilder,
) -> Result<Plan> {
    if request.trim().is_empty() {
        return Err(anyhow!("request is empty"));
    }
    let files = workspace
        .list_files(MAX_LISTED_FILES)
        .context("list workspace files")?;
    let prompt = prompts.build_plan(&PlanPromptInputs {
        request,
        files: &files,
    })?;
    let reply = generator
        .generate(&GenerateRequest {
            kind: GenerateKind::Plan,
            prompt,
            path: None,
        })
        .context("generate plan")?;
    let doc = parse_generated_plan(&reply)?;
    info!(steps = doc.steps.len(), summary = %doc.summary, "planned request");
    Ok(doc.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{ContractError, ErrorCode};
    use crate::plan::{Action, PlanStatus};
    use crate::test_support::{ScriptedGenerator, scratch_workspace};

    #[test]
    fn builds_plan_from_fenced_reply() {
        let (_temp, ws) = scratch_workspace(&["package.json", "src/index.ts"]);
        let generator = ScriptedGenerator::new([r#"Sure:
```json
{"summary": "add util", "steps": [
  {"stepId": 1, "action": "write", "path": "src/utils/sum.ts", "description": "sum helper"}
]}
```"#]);

        let plan = plan_from_request("add a sum helper", &ws, &generator, &PromptBuilder::default())
            .expect("plan");
        assert_eq!(plan.status, PlanStatus::Pending);
        assert_eq!(plan.steps[0].action, Action::Write);

        let requests = generator.requests();
        assert_eq!(requests[0].kind, GenerateKind::Plan);
        assert!(requests[0].prompt.contains("- src/index.ts"));
        assert!(requests[0].prompt.contains("add a sum helper"));
    }

    #[test]
    fn invalid_reply_is_a_schema_violation() {
        let (_temp, ws) = scratch_workspace(&[]);
        let generator = ScriptedGenerator::new([r#"{"summary": "x", "steps": [{"stepId": 1, "action": "run", "description": "no command"}]}"#]);

        let err = plan_from_request("do it", &ws, &generator, &PromptBuilder::default())
            .expect_err("invalid plan");
        let contract = err.downcast_ref::<ContractError>().expect("contract error");
        assert_eq!(contract.code, ErrorCode::SchemaViolation);
    }

    #[test]
    fn empty_request_is_rejected_without_generating() {
        let (_temp, ws) = scratch_workspace(&[]);
        let generator = ScriptedGenerator::default();
        assert!(plan_from_request("  ", &ws, &generator, &PromptBuilder::default()).is_err());
        assert!(generator.requests().is_empty());
    }
}
