//! Shared deterministic types for taskrun core logic.
//!
//! These types define stable contracts between the validators and the
//! executor. They do not depend on external state or I/O.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Failure taxonomy surfaced in step results and plan reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    SchemaViolation,
    CycleError,
    GreenfieldViolation,
    PathViolation,
    ActionMismatch,
    ExecFailure,
    LayerViolation,
    SemanticViolation,
    IntegrationViolation,
    Cancelled,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::SchemaViolation => "SCHEMA_VIOLATION",
            ErrorCode::CycleError => "CYCLE_ERROR",
            ErrorCode::GreenfieldViolation => "GREENFIELD_VIOLATION",
            ErrorCode::PathViolation => "PATH_VIOLATION",
            ErrorCode::ActionMismatch => "ACTION_MISMATCH",
            ErrorCode::ExecFailure => "EXEC_FAILURE",
            ErrorCode::LayerViolation => "LAYER_VIOLATION",
            ErrorCode::SemanticViolation => "SEMANTIC_VIOLATION",
            ErrorCode::IntegrationViolation => "INTEGRATION_VIOLATION",
            ErrorCode::Cancelled => "CANCELLED",
        }
    }

    /// Pre-flight codes reject a step before it mutates anything.
    pub fn is_preflight(self) -> bool {
        matches!(
            self,
            ErrorCode::GreenfieldViolation | ErrorCode::PathViolation | ErrorCode::ActionMismatch
        )
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How strongly a violation gates a write. Anything above `Warn` blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warn,
    Error,
}

/// Which validator produced a violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViolationKind {
    Layer,
    Semantic,
    Integration,
}

impl ViolationKind {
    pub fn code(self) -> ErrorCode {
        match self {
            ViolationKind::Layer => ErrorCode::LayerViolation,
            ViolationKind::Semantic => ErrorCode::SemanticViolation,
            ViolationKind::Integration => ErrorCode::IntegrationViolation,
        }
    }
}

/// One rule failure from a single validation pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Violation {
    pub kind: ViolationKind,
    /// Identifier of the rule that fired; domain suppression matches on it.
    pub rule_id: String,
    pub message: String,
    pub severity: Severity,
    pub file_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl Violation {
    pub fn is_blocking(&self) -> bool {
        self.severity > Severity::Warn
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} ({}): {}",
            self.kind.code(),
            self.file_path,
            self.rule_id,
            self.message
        )?;
        if let Some(suggestion) = &self.suggestion {
            write!(f, " (fix: {suggestion})")?;
        }
        Ok(())
    }
}

/// Typed failure carried through `anyhow` and recovered with `downcast_ref`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractError {
    pub code: ErrorCode,
    pub message: String,
    pub violations: Vec<Violation>,
}

impl ContractError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            violations: Vec::new(),
        }
    }

    pub fn with_violations(mut self, violations: Vec<Violation>) -> Self {
        self.violations = violations;
        self
    }
}

impl fmt::Display for ContractError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)?;
        for violation in &self.violations {
            write!(f, "\n- {violation}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ContractError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_serialize_as_taxonomy_names() {
        let raw = serde_json::to_string(&ErrorCode::GreenfieldViolation).expect("serialize");
        assert_eq!(raw, "\"GREENFIELD_VIOLATION\"");
        assert_eq!(ErrorCode::CycleError.to_string(), "CYCLE_ERROR");
    }

    #[test]
    fn only_errors_block() {
        let mut violation = Violation {
            kind: ViolationKind::Semantic,
            rule_id: "no-console-log".to_string(),
            message: "console.log left in code".to_string(),
            severity: Severity::Warn,
            file_path: "src/a.ts".to_string(),
            suggestion: None,
        };
        assert!(!violation.is_blocking());
        violation.severity = Severity::Error;
        assert!(violation.is_blocking());
    }

    #[test]
    fn contract_error_lists_violations() {
        let err = ContractError::new(ErrorCode::LayerViolation, "write blocked").with_violations(
            vec![Violation {
                kind: ViolationKind::Layer,
                rule_id: "layer.service.no-react".to_string(),
                message: "service imports react".to_string(),
                severity: Severity::Error,
                file_path: "src/services/user.ts".to_string(),
                suggestion: Some("move hook usage into src/hooks".to_string()),
            }],
        );
        let rendered = err.to_string();
        assert!(rendered.starts_with("LAYER_VIOLATION: write blocked"));
        assert!(rendered.contains("src/services/user.ts"));
        assert!(rendered.contains("fix: move hook usage"));
    }
}
