//! Surface cleanup for generator output.
//!
//! Runs after pre-flight accepted a step. It only strips artifacts (quotes,
//! stray punctuation, code fences, placeholder roots); it never turns prose
//! into a path.

use std::sync::LazyLock;

use regex::Regex;

use crate::plan::Step;

/// Leading roots generators invent when they do not know the workspace name.
const PLACEHOLDER_ROOTS: &[&str] = &[
    "path/to/project/",
    "path/to/your/project/",
    "path/to/",
    "your-project/",
    "my-project/",
    "project-root/",
];

static FENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```[A-Za-z0-9_+.-]*[^\n]*\n(.*?)\n?```").expect("valid fence regex")
});

/// Return a copy of `step` with path and command cleaned.
pub fn normalize_step(step: &Step) -> Step {
    let mut normalized = step.clone();
    normalized.path = step.path.as_deref().map(normalize_path);
    normalized.command = step.command.as_deref().map(normalize_command);
    normalized
}

/// Strip surrounding quotes, backticks and trailing sentence punctuation.
pub fn strip_surface(raw: &str) -> &str {
    let mut trimmed = raw.trim();
    loop {
        let next = trimmed
            .trim_matches(|c| matches!(c, '`' | '"' | '\''))
            .trim_end_matches(|c| matches!(c, '.' | ',' | ';' | ':' | ')' | '!' | '?'))
            .trim();
        if next.len() == trimmed.len() {
            return trimmed;
        }
        trimmed = next;
    }
}

/// Clean a path: surface punctuation, separators, leading `./` or `/`,
/// and placeholder roots.
pub fn normalize_path(raw: &str) -> String {
    let mut path = strip_surface(raw).replace('\\', "/");

    while path.contains("//") {
        path = path.replace("//", "/");
    }
    loop {
        let before = path.len();
        path = path
            .trim_start_matches("./")
            .trim_start_matches('/')
            .to_string();
        for root in PLACEHOLDER_ROOTS {
            if let Some(rest) = path.strip_prefix(root) {
                path = rest.to_string();
            }
        }
        if path.len() == before {
            break;
        }
    }
    path
}

/// Clean a shell command: inline code markers and prompt prefixes.
pub fn normalize_command(raw: &str) -> String {
    let trimmed = raw.trim().trim_matches('`').trim();
    trimmed
        .strip_prefix("$ ")
        .or_else(|| trimmed.strip_prefix("> "))
        .unwrap_or(trimmed)
        .trim()
        .to_string()
}

/// Extract file content from a generator reply.
///
/// If the reply wraps code in a markdown fence, the first fenced block wins
/// and surrounding prose is dropped. Output always ends with one newline.
pub fn normalize_content(raw: &str) -> String {
    let body = match FENCE_RE.captures(raw).and_then(|caps| caps.get(1)) {
        Some(block) => block.as_str(),
        None => raw,
    };
    let mut content = body.trim_matches('\n').trim_end().to_string();
    content.push('\n');
    content
}
