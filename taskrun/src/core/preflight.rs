//! State-aware contracts checked before a step mutates anything.
//!
//! Pre-flight sees the raw step as the generator produced it (before
//! normalization), whether the workspace already holds artifacts, and the
//! steps of this plan that ran before it. Every rule is a hard rejection.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::core::normalize::strip_surface;
use crate::core::types::{ContractError, ErrorCode};
use crate::plan::{Action, Step};

/// Tunables for the pre-flight rules.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PreflightConfig {
    /// Paths longer than this are checked for sentence-like wording on `read`.
    pub sentence_path_threshold: usize,
    /// Let the strategy switcher turn a greenfield `read` into a `write`.
    pub reroute_greenfield_reads: bool,
}

impl Default for PreflightConfig {
    fn default() -> Self {
        Self {
            sentence_path_threshold: 48,
            reroute_greenfield_reads: false,
        }
    }
}

/// Inputs pre-flight evaluates a step against.
#[derive(Debug, Clone, Copy)]
pub struct PreflightContext<'a> {
    /// True if the target root holds any artifact before this step runs.
    pub workspace_has_artifacts: bool,
    /// Steps of the same plan that already ran, in execution order.
    pub prior_steps: &'a [Step],
    pub config: &'a PreflightConfig,
}

const MAX_PATH_SPACES: usize = 1;

const PLACEHOLDER_TOKENS: &[&str] = &["...", "\u{2026}", "<", ">", "{", "}", "${"];

const SENTENCE_WORDS: &[&str] = &[
    "a", "an", "and", "as", "at", "by", "file", "for", "from", "how", "in", "into", "is", "it", "of",
    "on", "or", "that", "the", "then", "this", "to", "which", "with",
];

static TYPE_SUFFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| {
        Regex::new(r"(?:[^/.\s][^/]*\.[A-Za-z0-9]{1,12}|(?:^|/)\.[A-Za-z0-9][A-Za-z0-9._-]*)$")
            .expect("valid suffix regex")
    });

/// Run every pre-flight rule for `step`. Path rules run first so prose is
/// reported as prose rather than as a missing file.
pub fn check_step(step: &Step, ctx: &PreflightContext<'_>) -> Result<(), ContractError> {
    if !step.action.targets_path() {
        return Ok(());
    }
    let path = step.path.as_deref().unwrap_or_default();

    check_path_shape(path)?;
    if step.action == Action::Read {
        check_action_target(path, ctx.config.sentence_path_threshold)?;
        check_greenfield(step, ctx)?;
    }
    Ok(())
}

/// Reject paths that are prose or templates rather than file paths.
///
/// Spaces and placeholder tokens are judged on the raw text. The suffix is
/// judged after surface quotes and trailing punctuation, which the
/// normalizer strips anyway.
pub fn check_path_shape(path: &str) -> Result<(), ContractError> {
    let trimmed = path.trim();
    if trimmed.is_empty() {
        return Err(ContractError::new(ErrorCode::PathViolation, "path is empty"));
    }
    let spaces = trimmed.chars().filter(|c| c.is_whitespace()).count();
    if spaces > MAX_PATH_SPACES {
        return Err(ContractError::new(
            ErrorCode::PathViolation,
            format!("path '{trimmed}' contains {spaces} spaces; this reads as prose, not a path"),
        ));
    }
    if let Some(token) = PLACEHOLDER_TOKENS.iter().find(|token| trimmed.contains(**token)) {
        return Err(ContractError::new(
            ErrorCode::PathViolation,
            format!("path '{trimmed}' contains placeholder token '{token}'"),
        ));
    }
    if !has_type_suffix(strip_surface(trimmed)) {
        return Err(ContractError::new(
            ErrorCode::PathViolation,
            format!("path '{trimmed}' has no file-type suffix"),
        ));
    }
    Ok(())
}

/// True if the last path segment ends in `.<ext>`.
pub fn has_type_suffix(path: &str) -> bool {
    TYPE_SUFFIX_RE.is_match(path.trim())
}

fn check_action_target(path: &str, threshold: usize) -> Result<(), ContractError> {
    if path.len() <= threshold || !reads_as_sentence(path) {
        return Ok(());
    }
    Err(ContractError::new(
        ErrorCode::ActionMismatch,
        format!(
            "read target '{path}' ({} chars) reads as an instruction rather than a file to read",
            path.len()
        ),
    ))
}

/// Heuristic: two or more filler words, or one filler word separated by a space.
fn reads_as_sentence(path: &str) -> bool {
    let stem = path.rsplit_once('.').map_or(path, |(stem, _)| stem);
    let words: Vec<String> = stem
        .split(|c: char| c.is_whitespace() || matches!(c, '/' | '-' | '_'))
        .filter(|word| !word.is_empty())
        .map(str::to_ascii_lowercase)
        .collect();
    let fillers = words
        .iter()
        .filter(|word| SENTENCE_WORDS.contains(&word.as_str()))
        .count();
    fillers >= 2 || (fillers == 1 && path.contains(' '))
}

fn check_greenfield(step: &Step, ctx: &PreflightContext<'_>) -> Result<(), ContractError> {
    if ctx.workspace_has_artifacts {
        return Ok(());
    }
    if ctx
        .prior_steps
        .iter()
        .any(|prior| prior.action == Action::Write)
    {
        return Ok(());
    }
    Err(ContractError::new(
        ErrorCode::GreenfieldViolation,
        format!(
            "step {} reads '{}' but the workspace is empty and no earlier step writes anything; \
             the plan is missing an initialization step",
            step.id,
            step.path.as_deref().unwrap_or_default()
        ),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn step(id: u32, action: Action, path: &str) -> Step {
        Step {
            id,
            action,
            path: Some(path.to_string()),
            command: None,
            prompt: None,
            description: String::new(),
            depends_on: BTreeSet::new(),
        }
    }

    fn ctx<'a>(has_artifacts: bool, prior: &'a [Step], config: &'a PreflightConfig) -> PreflightContext<'a> {
        PreflightContext {
            workspace_has_artifacts: has_artifacts,
            prior_steps: prior,
            config,
        }
    }

    #[test]
    fn prose_path_is_path_violation() {
        let config = PreflightConfig::default();
        let err = check_step(
            &step(1, Action::Write, "for the Button component."),
            &ctx(true, &[], &config),
        )
        .expect_err("prose path");
        assert_eq!(err.code, ErrorCode::PathViolation);
    }

    #[test]
    fn missing_suffix_and_placeholders_are_rejected() {
        for path in ["src/components/Button", "src/.../Button.tsx", "src/<name>.ts", "src/a."] {
            let err = check_path_shape(path).expect_err(path);
            assert_eq!(err.code, ErrorCode::PathViolation, "{path}");
        }
    }

    #[test]
    fn surface_punctuation_is_left_to_the_normalizer() {
        for path in ["`src/a.ts`.", "\"src/a.ts\",", "src/a.ts,", "'.env';"] {
            assert!(check_path_shape(path).is_ok(), "{path}");
        }
    }

    #[test]
    fn single_space_path_is_allowed() {
        assert!(check_path_shape("docs/Meeting Notes.md").is_ok());
        assert!(check_path_shape(".env.local").is_ok());
        assert!(check_path_shape(".gitignore").is_ok());
        assert!(check_path_shape("src/app/[id]/page.tsx").is_ok());
    }

    #[test]
    fn long_sentence_read_is_action_mismatch() {
        let config = PreflightConfig::default();
        let err = check_step(
            &step(1, Action::Read, "notes/explain-how-the-login-flow-works-for-new-users.md"),
            &ctx(true, &[], &config),
        )
        .expect_err("sentence read");
        assert_eq!(err.code, ErrorCode::ActionMismatch);
    }

    #[test]
    fn long_plain_path_is_fine() {
        let config = PreflightConfig::default();
        let path = "src/components/settings/UserProfileSettingsPanelWithAvatar.tsx";
        assert!(path.len() > config.sentence_path_threshold);
        assert!(check_step(&step(1, Action::Read, path), &ctx(true, &[], &config)).is_ok());
    }

    #[test]
    fn greenfield_read_without_prior_write_is_rejected() {
        let config = PreflightConfig::default();
        let err = check_step(&step(1, Action::Read, "src/App.tsx"), &ctx(false, &[], &config))
            .expect_err("greenfield");
        assert_eq!(err.code, ErrorCode::GreenfieldViolation);
    }

    #[test]
    fn greenfield_read_after_write_is_allowed() {
        let config = PreflightConfig::default();
        let prior = vec![step(1, Action::Write, "src/App.tsx")];
        assert!(check_step(&step(2, Action::Read, "src/App.tsx"), &ctx(false, &prior, &config)).is_ok());
    }

    #[test]
    fn run_steps_skip_path_rules() {
        let config = PreflightConfig::default();
        let run = Step {
            command: Some("npm install".to_string()),
            path: None,
            ..step(1, Action::Run, "")
        };
        assert!(check_step(&run, &ctx(false, &[], &config)).is_ok());
    }
}
