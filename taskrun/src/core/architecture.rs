//! Architectural layer classification and per-layer rules.
//!
//! A file's layer is derived from its path alone. Each layer carries
//! allow/deny patterns expressed as [`ValidationProfile`]s; the validator
//! reports `LAYER_VIOLATION`s and never edits code.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::core::profile::{Candidate, Pattern, Selector, ValidationProfile, evaluate};
use crate::core::types::{Severity, Violation, ViolationKind};

/// Architectural role of a source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Layer {
    Service,
    Schema,
    Component,
    Hook,
    Utility,
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Layer::Service => "service",
            Layer::Schema => "schema",
            Layer::Component => "component",
            Layer::Hook => "hook",
            Layer::Utility => "utility",
        };
        f.write_str(name)
    }
}

/// Extensions the code validators understand.
pub const CODE_EXTENSIONS: &[&str] = &["ts", "tsx", "js", "jsx", "mjs", "cjs"];

static HOOK_FILE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^use[A-Z][A-Za-z0-9]*\.[a-z]+$").expect("valid hook file regex"));
static PASCAL_FILE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z][A-Za-z0-9]*\.(tsx|jsx)$").expect("valid component file regex"));

/// True if `path` has an extension the code validators handle.
pub fn is_code_path(path: &str) -> bool {
    Candidate::new(path, "")
        .extension()
        .is_some_and(|ext| CODE_EXTENSIONS.contains(&ext.as_str()))
}

/// Classify `path` into a layer. First match wins in the order
/// hook, schema, service, component, utility.
pub fn classify_layer(path: &str) -> Option<Layer> {
    if !is_code_path(path) {
        return None;
    }
    let mut segments: Vec<&str> = path.split('/').collect();
    let file_name = segments.pop().unwrap_or(path);
    let lower = file_name.to_ascii_lowercase();
    let in_dir = |names: &[&str]| segments.iter().any(|seg| names.contains(seg));

    if HOOK_FILE_RE.is_match(file_name) || in_dir(&["hooks"]) {
        return Some(Layer::Hook);
    }
    if in_dir(&["schemas", "schema", "types", "validators"])
        || lower.contains(".schema.")
        || lower.contains(".types.")
        || lower.ends_with(".d.ts")
    {
        return Some(Layer::Schema);
    }
    if in_dir(&["services", "service", "api"]) || lower.contains(".service.") {
        return Some(Layer::Service);
    }
    if in_dir(&["components", "ui", "views"]) || PASCAL_FILE_RE.is_match(file_name) {
        return Some(Layer::Component);
    }
    if in_dir(&["utils", "helpers", "lib", "shared"]) || lower.starts_with("utils.") {
        return Some(Layer::Utility);
    }
    None
}

const REACT_IMPORT: &str = r#"from\s+['"]react(-dom)?['"]"#;
const REACT_HOOK_IMPORT: &str = r#"import\s*(type\s*)?\{[^}]*\buse[A-Z]\w*[^}]*\}\s*from\s*['"]react['"]"#;
const REACT_HOOK_CALL: &str = r"\buse(State|Effect|Context|Reducer|Ref|Memo|Callback|LayoutEffect)\s*\(";
const JSX_TAG: &str = r"</[A-Za-z][\w.]*\s*>|<[A-Za-z][\w.]*(\s[^<>]*)?/>";
const FETCH_CALL: &str = r"\bfetch\s*\(|\baxios\.(get|post|put|patch|delete)\s*\(";

static LAYER_PROFILES: LazyLock<Vec<ValidationProfile>> = LazyLock::new(|| {
    use ViolationKind::Layer as Kind;
    vec![
        ValidationProfile::new(
            "layer.service.no-react-hooks",
            Kind,
            Severity::Error,
            "service-layer file depends on React hooks",
        )
        .when(Selector::Layer(Layer::Service))
        .forbid(Pattern::new("React hook import", REACT_HOOK_IMPORT))
        .forbid(Pattern::new("React hook call", REACT_HOOK_CALL))
        .suggest("keep services framework-free; move state into a hook under hooks/ that calls this service"),
        ValidationProfile::new(
            "layer.service.no-jsx",
            Kind,
            Severity::Error,
            "service-layer file renders markup",
        )
        .when(Selector::Layer(Layer::Service))
        .forbid(Pattern::new("JSX element", JSX_TAG))
        .suggest("return data from the service and render it in a component"),
        ValidationProfile::new(
            "layer.service.no-dom",
            Kind,
            Severity::Warn,
            "service-layer file touches browser globals",
        )
        .when(Selector::Layer(Layer::Service))
        .forbid(Pattern::new("browser global", r"\b(document|window|localStorage|sessionStorage)\."))
        .suggest("inject storage or DOM access from the caller"),
        ValidationProfile::new(
            "layer.schema.no-react",
            Kind,
            Severity::Error,
            "schema file imports React",
        )
        .when(Selector::Layer(Layer::Schema))
        .forbid(Pattern::new("React import", REACT_IMPORT))
        .suggest("schemas describe data only; keep UI imports out of them"),
        ValidationProfile::new(
            "layer.schema.no-side-effects",
            Kind,
            Severity::Error,
            "schema file performs I/O",
        )
        .when(Selector::Layer(Layer::Schema))
        .forbid(Pattern::new("network call", FETCH_CALL))
        .suggest("move requests into a service and validate their results with this schema"),
        ValidationProfile::new(
            "layer.component.style-override",
            Kind,
            Severity::Error,
            "component does not accept a style override",
        )
        .when(Selector::All(vec![
            Selector::Layer(Layer::Component),
            Selector::Content(Pattern::new("JSX element", JSX_TAG)),
        ]))
        .require(Pattern::new("a `className` or `style` prop", r"\b(className|style)\b"))
        .suggest("accept a `className` prop and merge it into the root element"),
        ValidationProfile::new(
            "layer.component.no-direct-fetch",
            Kind,
            Severity::Warn,
            "component fetches data directly",
        )
        .when(Selector::Layer(Layer::Component))
        .forbid(Pattern::new("network call", FETCH_CALL))
        .suggest("load data through a hook or service"),
        ValidationProfile::new(
            "layer.hook.exports-hook",
            Kind,
            Severity::Error,
            "hook file does not export a `use*` function",
        )
        .when(Selector::Layer(Layer::Hook))
        .require(Pattern::new(
            "an exported `use*` function",
            r"export\s+(default\s+)?(function\s+use[A-Z]|const\s+use[A-Z])",
        ))
        .suggest("export the hook as `export function useThing()`"),
        ValidationProfile::new(
            "layer.hook.no-jsx",
            Kind,
            Severity::Error,
            "hook renders markup",
        )
        .when(Selector::Layer(Layer::Hook))
        .forbid(Pattern::new("JSX element", JSX_TAG))
        .suggest("return state and callbacks from the hook; render in a component"),
        ValidationProfile::new(
            "layer.utility.no-react",
            Kind,
            Severity::Error,
            "utility module depends on React",
        )
        .when(Selector::Layer(Layer::Utility))
        .forbid(Pattern::new("React import", REACT_IMPORT))
        .suggest("utilities must be framework-agnostic; move React code into hooks/ or components/"),
    ]
});

/// Layer rules, in evaluation order.
pub fn layer_profiles() -> &'static [ValidationProfile] {
    &LAYER_PROFILES
}

/// Check `candidate` against the rules of its layer.
pub fn validate_architecture(candidate: &Candidate<'_>) -> Vec<Violation> {
    evaluate(layer_profiles(), candidate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_by_path() {
        assert_eq!(classify_layer("src/hooks/useAuth.ts"), Some(Layer::Hook));
        assert_eq!(classify_layer("src/features/useCart.tsx"), Some(Layer::Hook));
        assert_eq!(classify_layer("src/schemas/user.ts"), Some(Layer::Schema));
        assert_eq!(classify_layer("src/user.schema.ts"), Some(Layer::Schema));
        assert_eq!(classify_layer("src/services/userService.ts"), Some(Layer::Service));
        assert_eq!(classify_layer("src/components/Button.tsx"), Some(Layer::Component));
        assert_eq!(classify_layer("src/Profile.tsx"), Some(Layer::Component));
        assert_eq!(classify_layer("src/utils/format.ts"), Some(Layer::Utility));
        assert_eq!(classify_layer("src/main.ts"), None);
        assert_eq!(classify_layer("README.md"), None);
    }

    #[test]
    fn service_must_not_use_react_hooks() {
        let content = "import { useState } from 'react';\nexport function load() { return 1; }\n";
        let violations = validate_architecture(&Candidate::new("src/services/user.ts", content));
        assert!(
            violations
                .iter()
                .any(|v| v.rule_id == "layer.service.no-react-hooks" && v.is_blocking())
        );
        assert!(violations.iter().all(|v| v.suggestion.is_some()));
    }

    #[test]
    fn component_requires_style_override() {
        let bare = "export function Card() {\n  return <div>card</div>;\n}\n";
        let violations = validate_architecture(&Candidate::new("src/components/Card.tsx", bare));
        assert!(violations.iter().any(|v| v.rule_id == "layer.component.style-override"));

        let styled = "export function Card({ className }: { className?: string }) {\n  return <div className={className}>card</div>;\n}\n";
        assert!(validate_architecture(&Candidate::new("src/components/Card.tsx", styled)).is_empty());
    }

    #[test]
    fn component_barrel_without_markup_is_exempt() {
        let barrel = "export * from './Card';\n";
        assert!(validate_architecture(&Candidate::new("src/components/index.ts", barrel)).is_empty());
    }

    #[test]
    fn hook_must_export_hook() {
        let content = "export const helper = () => 1;\n";
        let violations = validate_architecture(&Candidate::new("src/hooks/useThing.ts", content));
        assert!(violations.iter().any(|v| v.rule_id == "layer.hook.exports-hook"));
    }

    #[test]
    fn generic_types_are_not_markup() {
        let content = "export async function load(): Promise<Array<User>> { return []; }\n";
        let violations = validate_architecture(&Candidate::new("src/services/user.ts", content));
        assert!(violations.is_empty(), "{violations:?}");
    }

    #[test]
    fn every_layer_has_rules() {
        for layer in [Layer::Service, Layer::Schema, Layer::Component, Layer::Hook, Layer::Utility] {
            assert!(
                layer_profiles()
                    .iter()
                    .any(|p| p.id.starts_with(&format!("layer.{layer}."))),
                "{layer}"
            );
        }
    }
}
