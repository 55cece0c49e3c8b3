//! Plan invariants not expressible via JSON Schema.

use std::collections::HashSet;

use crate::plan::{Action, Step};

/// Check plan invariants the schema cannot express:
/// - No duplicate step ids
/// - `read`/`write`/`delete` carry a non-blank `path`, `run` a non-blank `command`
/// - Every `dependsOn` id names a step in the plan
/// - No step depends on itself
pub fn validate_plan_invariants(steps: &[Step]) -> Vec<String> {
    let mut errors = Vec::new();
    if steps.is_empty() {
        errors.push("plan has no steps".to_string());
        return errors;
    }

    let mut seen = HashSet::new();
    for step in steps {
        if !seen.insert(step.id) {
            errors.push(format!("duplicate step id {}", step.id));
        }
    }

    for step in steps {
        let label = format!("step {} ({})", step.id, step.action.as_str());
        match step.action {
            Action::Read | Action::Write | Action::Delete => {
                if is_blank(step.path.as_deref()) {
                    errors.push(format!("{label}: missing path"));
                }
            }
            Action::Run => {
                if is_blank(step.command.as_deref()) {
                    errors.push(format!("{label}: missing command"));
                }
            }
        }

        for dep in &step.depends_on {
            if *dep == step.id {
                errors.push(format!("{label}: depends on itself"));
            } else if !seen.contains(dep) {
                errors.push(format!("{label}: depends on unknown step {dep}"));
            }
        }
    }

    errors
}

fn is_blank(value: Option<&str>) -> bool {
    value.is_none_or(|value| value.trim().is_empty())
}
