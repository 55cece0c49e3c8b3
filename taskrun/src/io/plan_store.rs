//! Plan load/save helpers with schema + invariant validation.
//!
//! Everything the generator hands back as a plan passes through
//! [`parse_plan`]; a plan that fails the schema or the invariants is a
//! `SCHEMA_VIOLATION` and never reaches the dependency grapher.

use std::fs;
use std::path::Path;
use std::sync::LazyLock;

use anyhow::{Context, Result, anyhow};
use jsonschema::Validator;
use serde_json::Value;
use tracing::debug;

use crate::core::invariants::validate_plan_invariants;
use crate::core::normalize::normalize_content;
use crate::core::types::{ContractError, ErrorCode};
use crate::plan::{Plan, PlanDocument};

/// JSON Schema for plan documents.
pub const PLAN_SCHEMA: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/../schemas/plan/v1.schema.json"
));

static VALIDATOR: LazyLock<Result<Validator, String>> = LazyLock::new(|| {
    let schema: Value = serde_json::from_str(PLAN_SCHEMA).map_err(|err| err.to_string())?;
    jsonschema::validator_for(&schema).map_err(|err| err.to_string())
});

fn schema_violation(message: impl Into<String>) -> ContractError {
    ContractError::new(ErrorCode::SchemaViolation, message)
}

/// Parse a plan from generator output or a plan file.
///
/// Accepts bare JSON or JSON wrapped in a fenced block with surrounding prose.
pub fn parse_plan(raw: &str) -> Result<PlanDocument, ContractError> {
    let json = extract_json(raw)
        .ok_or_else(|| schema_violation("plan reply contains no JSON object"))?;
    let value: Value = serde_json::from_str(json)
        .map_err(|err| schema_violation(format!("plan is not valid JSON: {err}")))?;
    validate_schema(&value)?;
    let doc: PlanDocument = serde_json::from_value(value)
        .map_err(|err| schema_violation(format!("plan does not match the step model: {err}")))?;
    let errors = validate_plan_invariants(&doc.steps);
    if !errors.is_empty() {
        return Err(schema_violation(format!(
            "plan invariants failed: {}",
            errors.join("; ")
        )));
    }
    debug!(steps = doc.steps.len(), "parsed plan");
    Ok(doc)
}

fn validate_schema(value: &Value) -> Result<(), ContractError> {
    let validator = VALIDATOR
        .as_ref()
        .map_err(|err| schema_violation(format!("plan schema is invalid: {err}")))?;
    if validator.is_valid(value) {
        return Ok(());
    }
    let messages = validator
        .iter_errors(value)
        .map(|err| err.to_string())
        .collect::<Vec<_>>();
    Err(schema_violation(format!(
        "plan schema validation failed: {}",
        messages.join("; ")
    )))
}

/// The outermost `{ ... }` of the reply.
fn extract_json(raw: &str) -> Option<&str> {
    let trimmed = raw.trim();
    if trimmed.starts_with('{') && trimmed.ends_with('}') {
        return Some(trimmed);
    }
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    (start < end).then(|| &raw[start..=end])
}

/// Load and validate a plan file.
pub fn load_plan_file(path: &Path) -> Result<Plan> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read plan {}", path.display()))?;
    let doc = parse_plan(&contents)
        .map_err(anyhow::Error::new)
        .with_context(|| format!("load plan {}", path.display()))?;
    Ok(doc.into())
}

/// Write a plan document as pretty JSON.
pub fn write_plan_file(path: &Path, doc: &PlanDocument) -> Result<()> {
    let mut buf = serde_json::to_string_pretty(doc).context("serialize plan")?;
    buf.push('\n');
    crate::io::workspace::write_atomic(path, &buf)
}

/// Parse a plan the generator returned, keeping the raw reply in the error.
pub fn parse_generated_plan(reply: &str) -> Result<PlanDocument> {
    let unfenced = normalize_content(reply);
    parse_plan(&unfenced).map_err(|err| {
        let snippet: String = reply.chars().take(400).collect();
        anyhow!(err).context(format!("generator reply was: {snippet}"))
    })
}
