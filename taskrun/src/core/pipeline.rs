//! Content validation pipeline for one file: layer rules, semantic rules,
//! then domain suppression.

use serde::Serialize;

use crate::core::architecture::{Layer, classify_layer, is_code_path, validate_architecture};
use crate::core::domain::{Domain, apply_suppression, detect_domain};
use crate::core::profile::Candidate;
use crate::core::semantic::validate_semantics;
use crate::core::types::Violation;

/// Outcome of validating one file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub layer: Option<Layer>,
    pub domain: Option<Domain>,
    /// Violations that survived suppression.
    pub violations: Vec<Violation>,
    /// Violations dropped by the file's domain, kept for reporting.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub suppressed: Vec<Violation>,
}

impl ValidationReport {
    /// Violations above `warn`.
    pub fn blocking(&self) -> impl Iterator<Item = &Violation> {
        self.violations.iter().filter(|v| v.is_blocking())
    }

    pub fn has_blocking(&self) -> bool {
        self.blocking().next().is_some()
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Violation> {
        self.violations.iter().filter(|v| !v.is_blocking())
    }
}

/// Validate `content` as the body of `path`. Files the validators do not
/// understand produce an empty report.
pub fn validate_content(path: &str, content: &str) -> ValidationReport {
    if !is_code_path(path) {
        return ValidationReport::default();
    }
    let candidate = Candidate::new(path, content);
    let domain = detect_domain(&candidate);

    let mut violations = validate_architecture(&candidate);
    violations.extend(validate_semantics(&candidate));
    let (violations, suppressed) = apply_suppression(domain, violations);

    tracing::debug!(
        path,
        %domain,
        violations = violations.len(),
        suppressed = suppressed.len(),
        "validated content"
    );
    ValidationReport {
        layer: classify_layer(path),
        domain: Some(domain),
        violations,
        suppressed,
    }
}
