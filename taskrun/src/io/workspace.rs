//! Filesystem access for plan execution.
//!
//! Every path a step names is relative to the workspace root. The
//! [`Workspace`] trait keeps the executor independent of the real disk so
//! tests can run plans against temp directories.

use std::fs;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use tracing::debug;
use walkdir::WalkDir;

/// Directories that never count as workspace artifacts.
const IGNORED_DIRS: &[&str] = &[".taskrun", ".git", "node_modules"];

/// Files the executor reads, writes and deletes.
pub trait Workspace {
    fn root(&self) -> &Path;

    /// Contents of `path`, or `None` if it does not exist.
    fn read(&self, path: &str) -> Result<Option<String>>;

    /// Create or replace `path`, creating parent directories.
    fn write(&self, path: &str, contents: &str) -> Result<()>;

    /// Remove `path`. Returns false if it did not exist.
    fn delete(&self, path: &str) -> Result<bool>;

    fn exists(&self, path: &str) -> bool;

    /// True if the root holds at least one file outside tool directories.
    fn has_artifacts(&self) -> Result<bool>;

    /// Up to `limit` files outside tool directories, relative to the root, sorted.
    fn list_files(&self, limit: usize) -> Result<Vec<String>>;
}

/// Workspace backed by a directory on disk.
#[derive(Debug, Clone)]
pub struct LocalWorkspace {
    root: PathBuf,
}

impl LocalWorkspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Join `path` onto the root, rejecting paths that escape it.
    fn resolve(&self, path: &str) -> Result<PathBuf> {
        let relative = Path::new(path);
        let escapes = relative.components().any(|component| {
            matches!(
                component,
                Component::ParentDir | Component::RootDir | Component::Prefix(_)
            )
        });
        if path.trim().is_empty() || escapes {
            return Err(anyhow!("path '{path}' is outside the workspace root"));
        }
        Ok(self.root.join(relative))
    }
}

impl Workspace for LocalWorkspace {
    fn root(&self) -> &Path {
        &self.root
    }

    fn read(&self, path: &str) -> Result<Option<String>> {
        let full = self.resolve(path)?;
        match fs::read_to_string(&full) {
            Ok(contents) => Ok(Some(contents)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err).with_context(|| format!("read {}", full.display())),
        }
    }

    fn write(&self, path: &str, contents: &str) -> Result<()> {
        let full = self.resolve(path)?;
        debug!(path, bytes = contents.len(), "writing file");
        write_atomic(&full, contents)
    }

    fn delete(&self, path: &str) -> Result<bool> {
        let full = self.resolve(path)?;
        match fs::remove_file(&full) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err).with_context(|| format!("delete {}", full.display())),
        }
    }

    fn exists(&self, path: &str) -> bool {
        self.resolve(path).is_ok_and(|full| full.exists())
    }

    fn has_artifacts(&self) -> Result<bool> {
        if !self.root.exists() {
            return Ok(false);
        }
        for entry in WalkDir::new(&self.root)
            .min_depth(1)
            .into_iter()
            .filter_entry(|e| !is_ignored(e.file_name().to_str().unwrap_or_default()))
        {
            let entry = entry.with_context(|| format!("scan {}", self.root.display()))?;
            if entry.file_type().is_file() {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn list_files(&self, limit: usize) -> Result<Vec<String>> {
        let mut files = Vec::new();
        if !self.root.exists() {
            return Ok(files);
        }
        for entry in WalkDir::new(&self.root)
            .min_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| !is_ignored(e.file_name().to_str().unwrap_or_default()))
        {
            let entry = entry.with_context(|| format!("scan {}", self.root.display()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(&self.root) else {
                continue;
            };
            files.push(relative.to_string_lossy().replace('\\', "/"));
            if files.len() >= limit {
                break;
            }
        }
        Ok(files)
    }
}

fn is_ignored(name: &str) -> bool {
    IGNORED_DIRS.contains(&name)
}

/// Write `contents` to `path` via a sibling temp file and rename.
pub fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .with_context(|| format!("path missing file name {}", path.display()))?;
    let tmp_path = parent.join(format!(".{file_name}.tmp"));
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp file {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_creates_parents_and_reads_back() {
        let temp = tempfile::tempdir().expect("tempdir");
        let ws = LocalWorkspace::new(temp.path());
        ws.write("src/components/Button.tsx", "export {};\n").expect("write");
        assert_eq!(
            ws.read("src/components/Button.tsx").expect("read").as_deref(),
            Some("export {};\n")
        );
        assert!(ws.exists("src/components/Button.tsx"));
        assert!(!temp.path().join("src/components/.Button.tsx.tmp").exists());
    }

    #[test]
    fn missing_files_read_as_none_and_delete_as_false() {
        let temp = tempfile::tempdir().expect("tempdir");
        let ws = LocalWorkspace::new(temp.path());
        assert_eq!(ws.read("nope.ts").expect("read"), None);
        assert!(!ws.delete("nope.ts").expect("delete"));
    }

    #[test]
    fn rejects_paths_outside_root() {
        let temp = tempfile::tempdir().expect("tempdir");
        let ws = LocalWorkspace::new(temp.path());
        assert!(ws.write("../escape.ts", "x").is_err());
        assert!(ws.read("/etc/passwd").is_err());
        assert!(!ws.exists("../escape.ts"));
    }

    #[test]
    fn tool_directories_are_not_artifacts() {
        let temp = tempfile::tempdir().expect("tempdir");
        let ws = LocalWorkspace::new(temp.path());
        assert!(!ws.has_artifacts().expect("scan"));

        fs::create_dir_all(temp.path().join(".taskrun/runs")).expect("mkdir");
        fs::write(temp.path().join(".taskrun/config.toml"), "").expect("write");
        fs::create_dir_all(temp.path().join("node_modules/x")).expect("mkdir");
        fs::write(temp.path().join("node_modules/x/index.js"), "").expect("write");
        assert!(!ws.has_artifacts().expect("scan"));

        fs::write(temp.path().join("package.json"), "{}").expect("write");
        assert!(ws.has_artifacts().expect("scan"));
    }

    #[test]
    fn list_files_is_sorted_relative_and_bounded() {
        let temp = tempfile::tempdir().expect("tempdir");
        let ws = LocalWorkspace::new(temp.path());
        ws.write("src/b.ts", "").expect("write");
        ws.write("src/a.ts", "").expect("write");
        ws.write("package.json", "{}").expect("write");
        fs::create_dir_all(temp.path().join(".git")).expect("mkdir");
        fs::write(temp.path().join(".git/HEAD"), "ref").expect("write");

        assert_eq!(
            ws.list_files(10).expect("list"),
            vec!["package.json", "src/a.ts", "src/b.ts"]
        );
        assert_eq!(ws.list_files(1).expect("list").len(), 1);
    }
}
