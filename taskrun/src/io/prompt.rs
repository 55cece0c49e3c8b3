//! Prompt builder for plan, content and correction requests.
//!
//! Templates mark their sections with `<!-- section:KEY required|droppable -->`.
//! When a rendered prompt exceeds the byte budget, droppable sections go
//! first, in a fixed order, and the last section is truncated as a last resort.

use std::sync::LazyLock;

use anyhow::{Context, Result};
use minijinja::{Environment, context};
use regex::Regex;
use serde::Serialize;
use tracing::debug;

use crate::core::architecture::Layer;
use crate::core::types::Violation;

const PLAN_TEMPLATE: &str = include_str!("prompts/plan.md");
const CONTENT_TEMPLATE: &str = include_str!("prompts/content.md");
const CORRECTION_TEMPLATE: &str = include_str!("prompts/correction.md");

/// Sections dropped when over budget, least important first.
const DROP_ORDER: &[&str] = &["workspace", "context", "summary", "draft"];

/// Default prompt budget in bytes.
pub const DEFAULT_BUDGET_BYTES: usize = 60_000;

static SECTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<!--\s*section:(\w+)\s+(required|droppable)\s*-->").expect("valid section regex")
});

/// A file shown to the generator for context.
#[derive(Debug, Clone, Serialize)]
pub struct ContextFile {
    pub path: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize)]
struct ViolationContext<'a> {
    rule_id: &'a str,
    message: &'a str,
    suggestion: Option<&'a str>,
}

/// Inputs for a plan request.
#[derive(Debug, Clone)]
pub struct PlanPromptInputs<'a> {
    pub request: &'a str,
    /// Existing workspace files, relative to the root.
    pub files: &'a [String],
}

/// Inputs for a file-content request.
#[derive(Debug, Clone)]
pub struct ContentPromptInputs<'a> {
    pub path: &'a str,
    pub instructions: &'a str,
    pub summary: &'a str,
    pub layer: Option<Layer>,
    pub context_files: &'a [ContextFile],
}

/// Inputs for a correction request after validation rejected a draft.
#[derive(Debug, Clone)]
pub struct CorrectionPromptInputs<'a> {
    pub content: ContentPromptInputs<'a>,
    pub previous: &'a str,
    pub violations: &'a [Violation],
    /// 1-based correction attempt number.
    pub attempt: u32,
}

fn environment() -> Result<Environment<'static>> {
    let mut env = Environment::new();
    env.add_template("plan", PLAN_TEMPLATE)
        .context("load plan template")?;
    env.add_template("content", CONTENT_TEMPLATE)
        .context("load content template")?;
    env.add_template("correction", CORRECTION_TEMPLATE)
        .context("load correction template")?;
    Ok(env)
}

/// A parsed section from rendered template output.
#[derive(Debug, Clone)]
struct ParsedSection {
    key: String,
    required: bool,
    content: String,
}

fn parse_sections(rendered: &str) -> Vec<ParsedSection> {
    let markers: Vec<_> = SECTION_RE.captures_iter(rendered).collect();
    let mut sections = Vec::new();
    for (i, caps) in markers.iter().enumerate() {
        let (Some(whole), Some(key), Some(kind)) = (caps.get(0), caps.get(1), caps.get(2)) else {
            continue;
        };
        let end = markers
            .get(i + 1)
            .and_then(|next| next.get(0))
            .map_or(rendered.len(), |next| next.start());
        let content = rendered[whole.end()..end].trim().to_string();
        let required = kind.as_str() == "required";
        if !content.is_empty() || required {
            sections.push(ParsedSection {
                key: key.as_str().to_string(),
                required,
                content,
            });
        }
    }
    sections
}

fn apply_budget(sections: &mut Vec<ParsedSection>, budget: usize) {
    let total_len = |secs: &[ParsedSection]| -> usize { secs.iter().map(|s| s.content.len()).sum() };

    for key in DROP_ORDER {
        if total_len(sections) <= budget {
            return;
        }
        if let Some(idx) = sections.iter().position(|s| s.key == *key && !s.required) {
            debug!(
                section = key,
                bytes_dropped = sections[idx].content.len(),
                "dropped section for budget"
            );
            sections.remove(idx);
        }
    }

    let total = total_len(sections);
    let Some(last) = sections.last_mut() else {
        return;
    };
    if total <= budget {
        return;
    }
    let allowed = budget.saturating_sub(total - last.content.len());
    let mut cut = allowed.saturating_sub(12);
    while cut > 0 && !last.content.is_char_boundary(cut) {
        cut -= 1;
    }
    last.content.truncate(cut);
    last.content.push_str("\n[truncated]");
    debug!(section = last.key, after_len = last.content.len(), "truncated section for budget");
}

fn render_sections(sections: &[ParsedSection]) -> String {
    let mut out = sections
        .iter()
        .map(|s| s.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");
    out.push('\n');
    out
}

/// Builds prompts within a byte budget.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    budget_bytes: usize,
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_BUDGET_BYTES)
    }
}

impl PromptBuilder {
    pub fn new(budget_bytes: usize) -> Self {
        Self { budget_bytes }
    }

    fn finish(&self, rendered: &str) -> String {
        let mut sections = parse_sections(rendered);
        apply_budget(&mut sections, self.budget_bytes);
        render_sections(&sections)
    }

    pub fn build_plan(&self, input: &PlanPromptInputs<'_>) -> Result<String> {
        let env = environment()?;
        let rendered = env.get_template("plan")?.render(context! {
            request => input.request.trim(),
            files => input.files,
        })?;
        Ok(self.finish(&rendered))
    }

    pub fn build_content(&self, input: &ContentPromptInputs<'_>) -> Result<String> {
        let env = environment()?;
        let rendered = env.get_template("content")?.render(context! {
            path => input.path,
            instructions => input.instructions.trim(),
            summary => (!input.summary.trim().is_empty()).then(|| input.summary.trim()),
            layer => input.layer.map(|layer| layer.to_string()),
            context_files => input.context_files,
        })?;
        Ok(self.finish(&rendered))
    }

    pub fn build_correction(&self, input: &CorrectionPromptInputs<'_>) -> Result<String> {
        let env = environment()?;
        let violations: Vec<ViolationContext<'_>> = input
            .violations
            .iter()
            .map(|v| ViolationContext {
                rule_id: &v.rule_id,
                message: &v.message,
                suggestion: v.suggestion.as_deref(),
            })
            .collect();
        let rendered = env.get_template("correction")?.render(context! {
            path => input.content.path,
            attempt => input.attempt,
            violations => violations,
            instructions => input.content.instructions.trim(),
            previous => input.previous.trim_end(),
            context_files => input.content.context_files,
        })?;
        Ok(self.finish(&rendered))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{Severity, ViolationKind};

    fn content_inputs<'a>(context_files: &'a [ContextFile]) -> ContentPromptInputs<'a> {
        ContentPromptInputs {
            path: "src/components/Button.tsx",
            instructions: "A button with a label prop.",
            summary: "Build a UI kit",
            layer: Some(Layer::Component),
            context_files,
        }
    }

    #[test]
    fn content_prompt_sections_are_ordered() {
        let files = vec![ContextFile {
            path: "src/theme.ts".to_string(),
            content: "export const theme = {};".to_string(),
        }];
        let prompt = PromptBuilder::default()
            .build_content(&content_inputs(&files))
            .expect("build");
        let contract = prompt.find("### Writer Contract").expect("contract");
        let task = prompt.find("### Task").expect("task");
        let summary = prompt.find("### Plan Summary").expect("summary");
        let context = prompt.find("#### src/theme.ts").expect("context");
        assert!(contract < task && task < summary && summary < context);
        assert!(prompt.contains("component layer"));
        assert!(!prompt.contains("<!--"));
    }

    #[test]
    fn empty_optional_sections_are_omitted() {
        let mut inputs = content_inputs(&[]);
        inputs.summary = " ";
        let prompt = PromptBuilder::default().build_content(&inputs).expect("build");
        assert!(!prompt.contains("### Plan Summary"));
        assert!(!prompt.contains("### Related Files"));
    }

    #[test]
    fn budget_drops_context_before_required_sections() {
        let files = vec![ContextFile {
            path: "src/big.ts".to_string(),
            content: "x".repeat(5_000),
        }];
        let prompt = PromptBuilder::new(700)
            .build_content(&content_inputs(&files))
            .expect("build");
        assert!(!prompt.contains("### Related Files"));
        assert!(prompt.contains("### Writer Contract"));
        assert!(prompt.contains("### Task"));
    }

    #[test]
    fn correction_prompt_lists_violations() {
        let violations = vec![Violation {
            kind: ViolationKind::Semantic,
            rule_id: "unused-import".to_string(),
            message: "import `x` is never used".to_string(),
            severity: Severity::Error,
            file_path: "src/components/Button.tsx".to_string(),
            suggestion: Some("remove the import".to_string()),
        }];
        let prompt = PromptBuilder::default()
            .build_correction(&CorrectionPromptInputs {
                content: content_inputs(&[]),
                previous: "import x from './x';\n",
                violations: &violations,
                attempt: 2,
            })
            .expect("build");
        assert!(prompt.contains("attempt 2"));
        assert!(prompt.contains("- [unused-import] import `x` is never used (fix: remove the import)"));
        assert!(prompt.contains("import x from './x';"));
    }

    #[test]
    fn plan_prompt_mentions_empty_workspace() {
        let prompt = PromptBuilder::default()
            .build_plan(&PlanPromptInputs {
                request: "add a login form",
                files: &[],
            })
            .expect("build");
        assert!(prompt.contains("add a login form"));
        assert!(prompt.contains("The project is empty"));

        let files = vec!["package.json".to_string()];
        let prompt = PromptBuilder::default()
            .build_plan(&PlanPromptInputs {
                request: "add a login form",
                files: &files,
            })
            .expect("build");
        assert!(prompt.contains("- package.json"));
    }
}
