//! Semantic rules: declarative content profiles followed by the structural pass.

use std::sync::LazyLock;

use crate::core::architecture::CODE_EXTENSIONS;
use crate::core::profile::{Candidate, Pattern, Selector, ValidationProfile, evaluate};
use crate::core::structure::validate_structure;
use crate::core::types::{Severity, Violation, ViolationKind};

static SEMANTIC_PROFILES: LazyLock<Vec<ValidationProfile>> = LazyLock::new(|| {
    use ViolationKind::Semantic as Kind;
    vec![
        ValidationProfile::new(
            "no-placeholder-content",
            Kind,
            Severity::Error,
            "file content is truncated or left as a placeholder",
        )
        .when(Selector::Extension(CODE_EXTENSIONS))
        .forbid(Pattern::new(
            "placeholder",
            r"(?i)//\s*\.\.\.\s*(rest|remaining|existing|other)\b|/\*\s*\.\.\.\s*\*/|\byour code here\b|\bimplementation goes here\b|//\s*TODO:?\s*implement\b",
        ))
        .suggest("emit the complete file; never elide code with comments"),
        ValidationProfile::new(
            "react.hooks-need-import",
            Kind,
            Severity::Error,
            "React hooks are called but never imported",
        )
        .when(Selector::All(vec![
            Selector::Extension(CODE_EXTENSIONS),
            Selector::Content(Pattern::new(
                "React hook call",
                r"(^|[^.\w])use(State|Effect|Context|Reducer|Ref|Memo|Callback|LayoutEffect)\s*[<(]",
            )),
        ]))
        .require(Pattern::new("an import from 'react'", r#"from\s+['"]react['"]"#))
        .suggest("add `import { useState, ... } from 'react'`"),
        ValidationProfile::new(
            "react.async-effect",
            Kind,
            Severity::Error,
            "effect callback is async",
        )
        .when(Selector::Extension(CODE_EXTENSIONS))
        .forbid(Pattern::new("async effect", r"useEffect\(\s*async\b"))
        .suggest("define an async function inside the effect and call it"),
        ValidationProfile::new(
            "jsx-in-ts-file",
            Kind,
            Severity::Error,
            "JSX in a file whose extension does not allow it",
        )
        .when(Selector::Extension(&["ts"]))
        .forbid(Pattern::new(
            "JSX element",
            r"return\s*\(?\s*<[A-Za-z][\w.]*[\s>/]|</[A-Za-z][\w.]*\s*>",
        ))
        .suggest("rename the file to .tsx or move the markup into a component"),
        ValidationProfile::new(
            "zod-schema-export",
            Kind,
            Severity::Error,
            "zod schema module exports nothing",
        )
        .when(Selector::All(vec![
            Selector::Extension(CODE_EXTENSIONS),
            Selector::Content(Pattern::new("zod import", r#"from\s+['"]zod['"]"#)),
        ]))
        .require(Pattern::new("an exported schema", r"\bexport\b"))
        .suggest("export the schema and its inferred type (`z.infer<typeof schema>`)"),
        ValidationProfile::new(
            "no-any",
            Kind,
            Severity::Warn,
            "explicit `any` weakens type checking",
        )
        .when(Selector::Extension(&["ts", "tsx"]))
        .forbid(Pattern::new("`any` annotation", r":\s*any\b|\bas\s+any\b|<any>"))
        .suggest("use a concrete type or `unknown`"),
        ValidationProfile::new(
            "no-console-log",
            Kind,
            Severity::Warn,
            "debug logging left in code",
        )
        .when(Selector::Extension(CODE_EXTENSIONS))
        .forbid(Pattern::new("console.log call", r"\bconsole\.log\s*\("))
        .suggest("remove the log or use the project's logger"),
    ]
});

/// Semantic rule profiles, in evaluation order.
pub fn semantic_profiles() -> &'static [ValidationProfile] {
    &SEMANTIC_PROFILES
}

/// Profile pass, then structural pass where the file parses.
pub fn validate_semantics(candidate: &Candidate<'_>) -> Vec<Violation> {
    let mut violations = evaluate(semantic_profiles(), candidate);
    violations.extend(validate_structure(candidate));
    violations
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules(path: &str, content: &str) -> Vec<String> {
        validate_semantics(&Candidate::new(path, content))
            .into_iter()
            .map(|v| v.rule_id)
            .collect()
    }

    #[test]
    fn clean_component_passes() {
        let content = "import { useState } from 'react';\n\nexport function Counter({ className }: { className?: string }) {\n  const [count, setCount] = useState(0);\n  return <button className={className} onClick={() => setCount(count + 1)}>{count}</button>;\n}\n";
        assert!(rules("src/components/Counter.tsx", content).is_empty());
    }

    #[test]
    fn hooks_without_import() {
        let content = "export function useCount() {\n  const [n] = useState(0);\n  return { n };\n}\n";
        assert!(rules("src/hooks/useCount.ts", content).contains(&"react.hooks-need-import".to_string()));
    }

    #[test]
    fn placeholder_content_is_blocking() {
        let content = "export function a() {\n  // ... rest of the implementation\n}\n";
        let violations = validate_semantics(&Candidate::new("src/a.ts", content));
        assert!(
            violations
                .iter()
                .any(|v| v.rule_id == "no-placeholder-content" && v.is_blocking())
        );
    }

    #[test]
    fn warnings_do_not_block() {
        let content = "export function a(x: any) {\n  console.log(x);\n  return x;\n}\n";
        let violations = validate_semantics(&Candidate::new("src/a.ts", content));
        let ids: Vec<&str> = violations.iter().map(|v| v.rule_id.as_str()).collect();
        assert!(ids.contains(&"no-any"));
        assert!(ids.contains(&"no-console-log"));
        assert!(violations.iter().all(|v| !v.is_blocking()));
    }

    #[test]
    fn jsx_only_flagged_in_ts_files() {
        let content = "export function A() {\n  return <div className=\"a\" />;\n}\n";
        assert!(rules("src/a.ts", content).contains(&"jsx-in-ts-file".to_string()));
        assert!(!rules("src/A.tsx", content).contains(&"jsx-in-ts-file".to_string()));
    }

    #[test]
    fn async_effect_rejected() {
        let content = "import { useEffect } from 'react';\nexport function useLoad() {\n  useEffect(async () => {\n    await fetch('/x');\n  }, []);\n}\n";
        assert!(rules("src/hooks/useLoad.ts", content).contains(&"react.async-effect".to_string()));
    }

    #[test]
    fn non_code_files_are_ignored() {
        assert!(rules("README.md", "console.log(x) // ... rest of").is_empty());
    }
}
