//! Cross-file contract checks over the artifacts one plan produced.
//!
//! For every import between two artifacts of the same plan, the producer's
//! export surface is re-derived statically and compared with what the
//! consumer imports and destructures. Imports of files outside the plan are
//! not checked.

use std::collections::BTreeMap;

use crate::core::architecture::{CODE_EXTENSIONS, is_code_path};
use crate::core::syntax::{ExportSurface, ReturnShape, call_destructures, exports, imports, parse};
use crate::core::types::{Severity, Violation, ViolationKind};

/// Aliases that map onto `src/`.
const SRC_ALIASES: &[&str] = &["@/", "~/"];

/// Check contracts between `artifacts` (path, content) written by one plan.
pub fn check_integration(artifacts: &[(String, String)]) -> Vec<Violation> {
    let code: BTreeMap<&str, &str> = artifacts
        .iter()
        .filter(|(path, _)| is_code_path(path))
        .map(|(path, content)| (path.as_str(), content.as_str()))
        .collect();

    let mut surfaces: BTreeMap<&str, ExportSurface> = BTreeMap::new();
    for (&path, &content) in &code {
        if let Some(parsed) = parse(path, content) {
            surfaces.insert(path, exports(&parsed));
        }
    }

    let mut violations = Vec::new();
    for (&consumer, &content) in &code {
        let Some(parsed) = parse(consumer, content) else {
            continue;
        };
        let decls = imports(&parsed);
        let destructures = call_destructures(&parsed);

        for decl in &decls {
            let Some(producer) = resolve_import(consumer, &decl.source, |p| surfaces.contains_key(p))
            else {
                continue;
            };
            let Some(surface) = surfaces.get(producer.as_str()) else {
                continue;
            };

            for binding in &decl.bindings {
                match binding.imported.as_str() {
                    "*" => {}
                    "default" if !surface.provides("default") => violations.push(violation(
                        consumer,
                        "integration.missing-default-export",
                        format!(
                            "imports a default export from '{}' (line {}), but {producer} has no default export",
                            decl.source, decl.line
                        ),
                        format!("add `export default` to {producer} or switch to a named import"),
                    )),
                    "default" => {}
                    name if !surface.provides(name) => violations.push(violation(
                        consumer,
                        "integration.missing-export",
                        format!(
                            "imports `{name}` from '{}' (line {}), but {producer} does not export it",
                            decl.source, decl.line
                        ),
                        format!("export `{name}` from {producer} or import a name it does export"),
                    )),
                    _ => {}
                }

                let Some(ReturnShape::Keys(keys)) = surface.return_shape(&binding.imported) else {
                    continue;
                };
                for destructure in destructures.iter().filter(|d| d.callee == binding.local) {
                    if destructure.has_rest {
                        continue;
                    }
                    for key in destructure.keys.iter().filter(|key| !keys.contains(*key)) {
                        let available = keys.iter().map(String::as_str).collect::<Vec<_>>().join(", ");
                        violations.push(violation(
                            consumer,
                            "integration.missing-return-key",
                            format!(
                                "destructures `{key}` from `{}()` on line {}, but {producer} returns only {{{available}}}",
                                destructure.callee, destructure.line
                            ),
                            format!("use the returned names ({available}) or return `{key}` from `{}`", binding.imported),
                        ));
                    }
                }
            }
        }
    }
    violations
}

fn violation(consumer: &str, rule_id: &str, message: String, suggestion: String) -> Violation {
    Violation {
        kind: ViolationKind::Integration,
        rule_id: rule_id.to_string(),
        message,
        severity: Severity::Error,
        file_path: consumer.to_string(),
        suggestion: Some(suggestion),
    }
}

/// Resolve an import specifier to one of the known artifact paths.
pub fn resolve_import(consumer: &str, specifier: &str, known: impl Fn(&str) -> bool) -> Option<String> {
    let base = if specifier.starts_with("./") || specifier.starts_with("../") {
        let dir = consumer.rsplit_once('/').map_or("", |(dir, _)| dir);
        join_relative(dir, specifier)?
    } else {
        let rest = SRC_ALIASES
            .iter()
            .find_map(|alias| specifier.strip_prefix(alias))?;
        format!("src/{rest}")
    };

    let mut candidates = vec![base.clone()];
    // ESM TypeScript imports name the emitted `.js` file.
    if let Some(stem) = base.strip_suffix(".js") {
        candidates.push(format!("{stem}.ts"));
        candidates.push(format!("{stem}.tsx"));
    }
    for ext in CODE_EXTENSIONS {
        candidates.push(format!("{base}.{ext}"));
    }
    for ext in CODE_EXTENSIONS {
        candidates.push(format!("{base}/index.{ext}"));
    }
    candidates.into_iter().find(|candidate| known(candidate.as_str()))
}

/// Join `dir` and a `./` or `../` specifier, or `None` if it climbs above the root.
fn join_relative(dir: &str, specifier: &str) -> Option<String> {
    let mut parts: Vec<&str> = dir.split('/').filter(|p| !p.is_empty()).collect();
    for segment in specifier.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop()?;
            }
            other => parts.push(other),
        }
    }
    Some(parts.join("/"))
}
