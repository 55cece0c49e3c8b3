//! Corrective strategies applied when a step fails.
//!
//! The only strategy today turns a `read` of a missing file into a `write`
//! when the path clearly names a file the plan should have created: a
//! configuration file or a source file.

use std::fmt;

/// Which heuristic recognized the path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyMatch {
    ConfigFile,
    SourceFile,
}

impl fmt::Display for StrategyMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StrategyMatch::ConfigFile => f.write_str("configuration file"),
            StrategyMatch::SourceFile => f.write_str("source file"),
        }
    }
}

/// Exact file names treated as configuration.
const CONFIG_FILE_NAMES: &[&str] = &[
    "package.json",
    "tsconfig.json",
    "jsconfig.json",
    "cargo.toml",
    "pyproject.toml",
    "requirements.txt",
    "docker-compose.yml",
    "docker-compose.yaml",
    ".env",
    ".gitignore",
    ".npmrc",
    ".nvmrc",
    ".editorconfig",
];

/// File name prefixes treated as configuration (`.eslintrc.cjs`, `.env.local`).
const CONFIG_PREFIXES: &[&str] = &[".env.", ".eslintrc", ".prettierrc", ".babelrc", ".stylelintrc"];

/// Extensions or compound suffixes treated as configuration.
const CONFIG_SUFFIXES: &[&str] = &[
    ".config.js",
    ".config.ts",
    ".config.mjs",
    ".config.cjs",
    ".json",
    ".toml",
    ".yaml",
    ".yml",
    ".ini",
];

/// Source extensions the generator is able to produce.
const SOURCE_EXTENSIONS: &[&str] = &[
    "ts", "tsx", "js", "jsx", "mjs", "cjs", "css", "scss", "html", "vue", "svelte", "py", "rs", "go",
    "md", "sql", "sh",
];

/// Decide whether a failed `read` of `path` should become a `write`.
pub fn switch_on_missing_read(path: &str) -> Option<StrategyMatch> {
    let file_name = path
        .rsplit('/')
        .next()
        .unwrap_or(path)
        .to_ascii_lowercase();
    if file_name.is_empty() {
        return None;
    }

    if CONFIG_FILE_NAMES.contains(&file_name.as_str())
        || CONFIG_PREFIXES
            .iter()
            .any(|prefix| file_name.starts_with(prefix))
        || CONFIG_SUFFIXES
            .iter()
            .any(|suffix| file_name.ends_with(suffix))
    {
        return Some(StrategyMatch::ConfigFile);
    }

    let (stem, ext) = file_name.rsplit_once('.')?;
    if !stem.is_empty() && SOURCE_EXTENSIONS.contains(&ext) {
        return Some(StrategyMatch::SourceFile);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_extensions_switch() {
        assert_eq!(switch_on_missing_read("src/a.ts"), Some(StrategyMatch::SourceFile));
        assert_eq!(
            switch_on_missing_read("src/components/Button.tsx"),
            Some(StrategyMatch::SourceFile)
        );
    }

    #[test]
    fn config_names_switch() {
        assert_eq!(switch_on_missing_read("package.json"), Some(StrategyMatch::ConfigFile));
        assert_eq!(switch_on_missing_read("vite.config.ts"), Some(StrategyMatch::ConfigFile));
        assert_eq!(switch_on_missing_read(".env.local"), Some(StrategyMatch::ConfigFile));
        assert_eq!(switch_on_missing_read("config/app.yaml"), Some(StrategyMatch::ConfigFile));
    }

    #[test]
    fn unrecognized_suffix_does_not_switch() {
        assert_eq!(switch_on_missing_read("logs/server.log"), None);
        assert_eq!(switch_on_missing_read("assets/logo.png"), None);
        assert_eq!(switch_on_missing_read("data/export.csv"), None);
    }
}
