//! Declarative rule profiles and the engine that evaluates them.
//!
//! A profile is data: a selector deciding which files it applies to, regex
//! patterns that must or must not appear, and the violation it reports.
//! Layer, semantic and domain rules are all expressed this way and run
//! through [`evaluate`]; adding a rule means adding a profile, not code.

use std::path::Path;

use regex::Regex;

use crate::core::architecture::{Layer, classify_layer};
use crate::core::types::{Severity, Violation, ViolationKind};

/// A file under validation.
#[derive(Debug, Clone, Copy)]
pub struct Candidate<'a> {
    pub path: &'a str,
    pub content: &'a str,
}

impl<'a> Candidate<'a> {
    pub fn new(path: &'a str, content: &'a str) -> Self {
        Self { path, content }
    }

    /// Lowercased extension without the dot.
    pub fn extension(&self) -> Option<String> {
        Path::new(self.path)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
    }

    pub fn file_name(&self) -> &'a str {
        self.path.rsplit('/').next().unwrap_or(self.path)
    }
}

/// A compiled regex with a human-readable label used in messages.
#[derive(Debug, Clone)]
pub struct Pattern {
    pub label: &'static str,
    regex: Regex,
}

impl Pattern {
    /// Compile a pattern. Panics on an invalid regex.
    pub fn new(label: &'static str, regex: &str) -> Self {
        Self {
            label,
            regex: Regex::new(regex).unwrap_or_else(|err| panic!("invalid pattern {label}: {err}")),
        }
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }

    /// 1-indexed line and matched text of the first match.
    pub fn first_match<'t>(&self, text: &'t str) -> Option<(usize, &'t str)> {
        let found = self.regex.find(text)?;
        let line = text[..found.start()].matches('\n').count() + 1;
        Some((line, found.as_str()))
    }
}

/// Predicate over a candidate file.
#[derive(Debug, Clone)]
pub enum Selector {
    Always,
    /// Lowercased extension is one of these.
    Extension(&'static [&'static str]),
    /// Any `/`-separated directory segment equals one of these.
    DirSegment(&'static [&'static str]),
    FileName(Pattern),
    Content(Pattern),
    Layer(Layer),
    All(Vec<Selector>),
    Any(Vec<Selector>),
    Not(Box<Selector>),
}

impl Selector {
    pub fn matches(&self, candidate: &Candidate<'_>) -> bool {
        match self {
            Selector::Always => true,
            Selector::Extension(exts) => candidate
                .extension()
                .is_some_and(|ext| exts.contains(&ext.as_str())),
            Selector::DirSegment(segments) => {
                let mut dirs: Vec<&str> = candidate.path.split('/').collect();
                dirs.pop();
                dirs.iter().any(|dir| segments.contains(dir))
            }
            Selector::FileName(pattern) => pattern.is_match(candidate.file_name()),
            Selector::Content(pattern) => pattern.is_match(candidate.content),
            Selector::Layer(layer) => classify_layer(candidate.path) == Some(*layer),
            Selector::All(selectors) => selectors.iter().all(|s| s.matches(candidate)),
            Selector::Any(selectors) => selectors.iter().any(|s| s.matches(candidate)),
            Selector::Not(selector) => !selector.matches(candidate),
        }
    }
}

/// One declarative rule.
#[derive(Debug, Clone)]
pub struct ValidationProfile {
    pub id: &'static str,
    pub kind: ViolationKind,
    pub selector: Selector,
    pub required: Vec<Pattern>,
    pub forbidden: Vec<Pattern>,
    pub message: &'static str,
    pub suggestion: Option<&'static str>,
    pub severity: Severity,
}

impl ValidationProfile {
    pub fn new(
        id: &'static str,
        kind: ViolationKind,
        severity: Severity,
        message: &'static str,
    ) -> Self {
        Self {
            id,
            kind,
            selector: Selector::Always,
            required: Vec::new(),
            forbidden: Vec::new(),
            message,
            suggestion: None,
            severity,
        }
    }

    pub fn when(mut self, selector: Selector) -> Self {
        self.selector = selector;
        self
    }

    pub fn require(mut self, pattern: Pattern) -> Self {
        self.required.push(pattern);
        self
    }

    pub fn forbid(mut self, pattern: Pattern) -> Self {
        self.forbidden.push(pattern);
        self
    }

    pub fn suggest(mut self, suggestion: &'static str) -> Self {
        self.suggestion = Some(suggestion);
        self
    }

    /// Violations this profile reports for `candidate` (empty if it does not apply).
    pub fn check(&self, candidate: &Candidate<'_>) -> Vec<Violation> {
        if !self.selector.matches(candidate) {
            return Vec::new();
        }
        let mut violations = Vec::new();
        for pattern in &self.required {
            if !pattern.is_match(candidate.content) {
                violations.push(self.violation(candidate, format!("{} (missing {})", self.message, pattern.label)));
            }
        }
        for pattern in &self.forbidden {
            if let Some((line, found)) = pattern.first_match(candidate.content) {
                violations.push(self.violation(
                    candidate,
                    format!("{} (found {} `{}` on line {line})", self.message, pattern.label, found.trim()),
                ));
            }
        }
        violations
    }

    fn violation(&self, candidate: &Candidate<'_>, message: String) -> Violation {
        Violation {
            kind: self.kind,
            rule_id: self.id.to_string(),
            message,
            severity: self.severity,
            file_path: candidate.path.to_string(),
            suggestion: self.suggestion.map(str::to_string),
        }
    }
}

/// Apply every matching profile and union the violations in profile order.
pub fn evaluate(profiles: &[ValidationProfile], candidate: &Candidate<'_>) -> Vec<Violation> {
    profiles
        .iter()
        .flat_map(|profile| profile.check(candidate))
        .collect()
}
