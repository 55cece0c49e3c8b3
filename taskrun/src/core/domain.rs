//! Domain detection and contextual rule suppression.
//!
//! Each file gets exactly one domain, chosen by scanning [`DOMAIN_PROFILES`]
//! in priority order; the first selector that matches wins. Only that
//! domain's `suppresses` list filters the violations of the file.
//!
//! Priority, highest first:
//! 1. data-validation-schema
//! 2. infrastructure-helper
//! 3. ui-component
//! 4. pure-logic (fallback, always matches)
//!
//! A schema module under `lib/` is therefore a schema, and a `.tsx` file
//! that reads `process.env` is infrastructure, not UI.

use std::fmt;
use std::sync::LazyLock;

use serde::{Deserialize, Serialize};

use crate::core::profile::{Candidate, Pattern, Selector};
use crate::core::types::Violation;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Domain {
    DataValidationSchema,
    InfrastructureHelper,
    UiComponent,
    PureLogic,
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Domain::DataValidationSchema => "data-validation-schema",
            Domain::InfrastructureHelper => "infrastructure-helper",
            Domain::UiComponent => "ui-component",
            Domain::PureLogic => "pure-logic",
        };
        f.write_str(name)
    }
}

/// Selector and suppression list for one domain.
#[derive(Debug, Clone)]
pub struct DomainProfile {
    pub domain: Domain,
    pub selector: Selector,
    pub suppresses: &'static [&'static str],
}

static DOMAIN_PROFILES: LazyLock<Vec<DomainProfile>> = LazyLock::new(|| {
    vec![
        DomainProfile {
            domain: Domain::DataValidationSchema,
            selector: Selector::Any(vec![
                Selector::Content(Pattern::new(
                    "validation library import",
                    r#"from\s+['"](zod|yup|joi|valibot|superstruct)['"]"#,
                )),
                Selector::DirSegment(&["schemas", "schema", "validators"]),
                Selector::FileName(Pattern::new("schema file", r"\.schema\.[a-z]+$")),
            ]),
            suppresses: &["no-any", "unused-import"],
        },
        DomainProfile {
            domain: Domain::InfrastructureHelper,
            selector: Selector::Any(vec![
                Selector::DirSegment(&[
                    "lib",
                    "infra",
                    "infrastructure",
                    "config",
                    "adapters",
                    "clients",
                    "server",
                ]),
                Selector::Content(Pattern::new("environment access", r"\bprocess\.env\b")),
            ]),
            suppresses: &["unused-import", "no-console-log"],
        },
        DomainProfile {
            domain: Domain::UiComponent,
            selector: Selector::Any(vec![
                Selector::Extension(&["tsx", "jsx"]),
                Selector::Content(Pattern::new(
                    "JSX element",
                    r"</[A-Za-z][\w.]*\s*>|<[A-Za-z][\w.]*(\s[^<>]*)?/>",
                )),
            ]),
            suppresses: &[],
        },
        DomainProfile {
            domain: Domain::PureLogic,
            selector: Selector::Always,
            suppresses: &[],
        },
    ]
});

/// Domain profiles in priority order.
pub fn domain_profiles() -> &'static [DomainProfile] {
    &DOMAIN_PROFILES
}

fn profile_for(domain: Domain) -> Option<&'static DomainProfile> {
    domain_profiles().iter().find(|p| p.domain == domain)
}

/// First matching domain; `PureLogic` when nothing more specific applies.
pub fn detect_domain(candidate: &Candidate<'_>) -> Domain {
    domain_profiles()
        .iter()
        .find(|profile| profile.selector.matches(candidate))
        .map_or(Domain::PureLogic, |profile| profile.domain)
}

/// Split `violations` into `(kept, suppressed)` for `domain`.
pub fn apply_suppression(
    domain: Domain,
    violations: Vec<Violation>,
) -> (Vec<Violation>, Vec<Violation>) {
    let suppresses = profile_for(domain).map_or(&[][..], |p| p.suppresses);
    violations
        .into_iter()
        .partition(|v| !suppresses.contains(&v.rule_id.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{Severity, ViolationKind};

    fn detect(path: &str, content: &str) -> Domain {
        detect_domain(&Candidate::new(path, content))
    }

    #[test]
    fn priority_order_breaks_ties() {
        // Schema import under lib/: schema outranks infrastructure.
        assert_eq!(
            detect("src/lib/user.ts", "import { z } from 'zod';\n"),
            Domain::DataValidationSchema
        );
        // TSX reading the environment: infrastructure outranks UI.
        assert_eq!(
            detect("src/Config.tsx", "export const url = process.env.API_URL;\n"),
            Domain::InfrastructureHelper
        );
        // JSX in a plain utility name: UI outranks pure logic.
        assert_eq!(
            detect("src/format.js", "export const A = () => <b></b>;\n"),
            Domain::UiComponent
        );
        assert_eq!(
            detect("src/math.ts", "export const add = (a: number, b: number) => a + b;\n"),
            Domain::PureLogic
        );
    }

    #[test]
    fn profiles_end_with_fallback() {
        let last = domain_profiles().last().expect("profiles");
        assert_eq!(last.domain, Domain::PureLogic);
        assert!(matches!(last.selector, Selector::Always));
    }

    #[test]
    fn suppression_only_uses_detected_domain() {
        let unused = Violation {
            kind: ViolationKind::Semantic,
            rule_id: "unused-import".to_string(),
            message: "unused".to_string(),
            severity: Severity::Error,
            file_path: "a.ts".to_string(),
            suggestion: None,
        };
        let (kept, suppressed) = apply_suppression(Domain::InfrastructureHelper, vec![unused.clone()]);
        assert!(kept.is_empty());
        assert_eq!(suppressed.len(), 1);

        let (kept, suppressed) = apply_suppression(Domain::UiComponent, vec![unused]);
        assert_eq!(kept.len(), 1);
        assert!(suppressed.is_empty());
    }
}
