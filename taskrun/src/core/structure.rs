//! Structural checks over the parsed syntax tree.
//!
//! Rules:
//! - `syntax-error`: the file does not parse.
//! - `unused-import`: an imported binding is never referenced.
//! - `hook-reference`: an imported `use*` hook is referenced without being called.
//! - `effect-deps`: an effect reads state it does not list as a dependency.

use std::collections::BTreeSet;

use tree_sitter::Node;

use crate::core::profile::Candidate;
use crate::core::syntax::{ImportDecl, ParsedSource, imports, line_of, parse, visit};
use crate::core::types::{Severity, Violation, ViolationKind};

/// Data-flow hooks whose second argument is a dependency array.
const DEPENDENCY_HOOKS: &[&str] = &["useEffect", "useLayoutEffect", "useMemo", "useCallback"];

/// Hooks that produce `[value, setter]` pairs.
const STATE_HOOKS: &[&str] = &["useState", "useReducer"];

/// Node kinds that count as a reference to a binding.
const REFERENCE_KINDS: &[&str] = &[
    "identifier",
    "type_identifier",
    "shorthand_property_identifier",
    "nested_identifier",
];

/// Run every structural rule. Files that cannot be parsed as JS/TS yield nothing.
pub fn validate_structure(candidate: &Candidate<'_>) -> Vec<Violation> {
    let Some(parsed) = parse(candidate.path, candidate.content) else {
        return Vec::new();
    };
    let mut violations = Vec::new();
    if let Some(violation) = check_syntax(&parsed) {
        violations.push(violation);
    }
    let decls = imports(&parsed);
    let references = collect_references(&parsed, &decls);
    violations.extend(check_unused_imports(&parsed, &decls, &references));
    violations.extend(check_hook_references(&parsed, &decls));
    violations.extend(check_effect_dependencies(&parsed));
    violations
}

fn violation(
    parsed: &ParsedSource<'_>,
    rule_id: &str,
    severity: Severity,
    message: String,
    suggestion: &str,
) -> Violation {
    Violation {
        kind: ViolationKind::Semantic,
        rule_id: rule_id.to_string(),
        message,
        severity,
        file_path: parsed.path.to_string(),
        suggestion: Some(suggestion.to_string()),
    }
}

fn check_syntax(parsed: &ParsedSource<'_>) -> Option<Violation> {
    let root = parsed.root();
    if !root.has_error() {
        return None;
    }
    let mut first = None;
    visit(root, |node| {
        if first.is_none() && (node.is_error() || node.is_missing()) {
            first = Some(line_of(node));
        }
    });
    let line = first.unwrap_or(1);
    Some(violation(
        parsed,
        "syntax-error",
        Severity::Error,
        format!("file does not parse (first error near line {line})"),
        "return the complete file with balanced braces and valid syntax",
    ))
}

/// Every identifier-like text outside import statements.
fn collect_references<'a>(parsed: &ParsedSource<'a>, decls: &[ImportDecl]) -> BTreeSet<&'a str> {
    let mut references = BTreeSet::new();
    visit(parsed.root(), |node| {
        if !REFERENCE_KINDS.contains(&node.kind()) {
            return;
        }
        if decls.iter().any(|decl| decl.contains_byte(node.start_byte())) {
            return;
        }
        references.insert(parsed.text(node));
    });
    references
}

fn check_unused_imports(
    parsed: &ParsedSource<'_>,
    decls: &[ImportDecl],
    references: &BTreeSet<&str>,
) -> Vec<Violation> {
    let mut violations = Vec::new();
    for decl in decls {
        for binding in &decl.bindings {
            // The classic JSX runtime needs `React` in scope without naming it.
            if binding.local == "React" {
                continue;
            }
            if references.contains(binding.local.as_str()) {
                continue;
            }
            let what = if binding.type_only { "type import" } else { "import" };
            violations.push(violation(
                parsed,
                "unused-import",
                Severity::Error,
                format!(
                    "{what} `{}` from '{}' on line {} is never used",
                    binding.local, decl.source, decl.line
                ),
                "remove the import or use it",
            ));
        }
    }
    violations
}

fn is_hook_name(name: &str) -> bool {
    name.strip_prefix("use")
        .and_then(|rest| rest.chars().next())
        .is_some_and(|c| c.is_ascii_uppercase())
}

fn is_call_target(node: Node<'_>) -> bool {
    node.parent().is_some_and(|parent| {
        parent.kind() == "call_expression"
            && parent
                .child_by_field_name("function")
                .is_some_and(|function| function == node)
    })
}

fn check_hook_references(parsed: &ParsedSource<'_>, decls: &[ImportDecl]) -> Vec<Violation> {
    let hooks: BTreeSet<&str> = decls
        .iter()
        .flat_map(|decl| decl.bindings.iter())
        .filter(|binding| !binding.type_only && is_hook_name(&binding.local))
        .map(|binding| binding.local.as_str())
        .collect();
    if hooks.is_empty() {
        return Vec::new();
    }

    let mut violations = Vec::new();
    visit(parsed.root(), |node| {
        if node.kind() != "identifier" {
            return;
        }
        let name = parsed.text(node);
        if !hooks.contains(name) || decls.iter().any(|decl| decl.contains_byte(node.start_byte())) {
            return;
        }
        // Re-exports name the hook without using it.
        let re_exported = node
            .parent()
            .is_some_and(|parent| parent.kind() == "export_specifier");
        if is_call_target(node) || re_exported {
            return;
        }
        violations.push(violation(
            parsed,
            "hook-reference",
            Severity::Error,
            format!(
                "`{name}` is referenced on line {} but never called",
                line_of(node)
            ),
            "call the hook at the top level of a component or hook: `const value = useThing()`",
        ));
    });
    violations
}

/// Names bound as the first element of `const [value, setValue] = useState(...)`.
fn state_values<'a>(parsed: &ParsedSource<'a>) -> BTreeSet<&'a str> {
    let mut values = BTreeSet::new();
    visit(parsed.root(), |node| {
        if node.kind() != "variable_declarator" {
            return;
        }
        let (Some(pattern), Some(value)) = (
            node.child_by_field_name("name"),
            node.child_by_field_name("value"),
        ) else {
            return;
        };
        if pattern.kind() != "array_pattern" || value.kind() != "call_expression" {
            return;
        }
        let is_state_hook = value
            .child_by_field_name("function")
            .is_some_and(|function| STATE_HOOKS.contains(&parsed.text(function)));
        if !is_state_hook {
            return;
        }
        if let Some(first) = pattern.named_child(0).filter(|n| n.kind() == "identifier") {
            values.insert(parsed.text(first));
        }
    });
    values
}

fn check_effect_dependencies(parsed: &ParsedSource<'_>) -> Vec<Violation> {
    let state = state_values(parsed);
    if state.is_empty() {
        return Vec::new();
    }

    let mut violations = Vec::new();
    visit(parsed.root(), |node| {
        if node.kind() != "call_expression" {
            return;
        }
        let Some(function) = node.child_by_field_name("function") else {
            return;
        };
        let hook = parsed.text(function);
        if !DEPENDENCY_HOOKS.contains(&hook) {
            return;
        }
        let Some(arguments) = node.child_by_field_name("arguments") else {
            return;
        };
        let (Some(callback), Some(deps)) = (arguments.named_child(0), arguments.named_child(1))
        else {
            return;
        };
        if deps.kind() != "array" {
            return;
        }

        let mut declared = BTreeSet::new();
        visit(deps, |dep| {
            if dep.kind() == "identifier" {
                declared.insert(parsed.text(dep));
            }
        });
        let mut missing = BTreeSet::new();
        visit(callback, |inner| {
            if inner.kind() != "identifier" {
                return;
            }
            let name = parsed.text(inner);
            if state.contains(name) && !declared.contains(name) {
                missing.insert(name);
            }
        });
        for name in missing {
            violations.push(violation(
                parsed,
                "effect-deps",
                Severity::Warn,
                format!(
                    "`{hook}` on line {} reads `{name}` but does not list it as a dependency",
                    line_of(node)
                ),
                "add the value to the dependency array",
            ));
        }
    });
    violations
}
