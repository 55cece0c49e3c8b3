//! `.taskrun/` layout and scaffolding.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};

use crate::io::config::{TaskrunConfig, write_config};
use crate::io::plan_store::PLAN_SCHEMA;

/// All canonical paths within `.taskrun/` for a project root.
#[derive(Debug, Clone)]
pub struct TaskrunPaths {
    pub root: PathBuf,
    pub taskrun_dir: PathBuf,
    pub config_path: PathBuf,
    pub schema_path: PathBuf,
    pub runs_dir: PathBuf,
    pub gitignore_path: PathBuf,
}

impl TaskrunPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let taskrun_dir = root.join(".taskrun");
        Self {
            root: root.clone(),
            config_path: taskrun_dir.join("config.toml"),
            schema_path: taskrun_dir.join("plan.schema.json"),
            runs_dir: taskrun_dir.join("runs"),
            gitignore_path: taskrun_dir.join(".gitignore"),
            taskrun_dir,
        }
    }
}

/// Options for [`init_taskrun`].
#[derive(Debug, Clone)]
pub struct InitOptions {
    /// Overwrite existing `.taskrun/` files.
    pub force: bool,
}

/// Create `.taskrun/` scaffolding in `root`.
///
/// Fails if `.taskrun/` already exists unless `options.force` is set.
pub fn init_taskrun(root: &Path, options: &InitOptions) -> Result<TaskrunPaths> {
    let paths = TaskrunPaths::new(root);
    if paths.taskrun_dir.exists() && !paths.taskrun_dir.is_dir() {
        return Err(anyhow!("init: .taskrun exists but is not a directory"));
    }
    if paths.taskrun_dir.exists() && !options.force {
        return Err(anyhow!(
            "init: .taskrun already exists (use --force to overwrite)"
        ));
    }

    fs::create_dir_all(&paths.runs_dir)
        .with_context(|| format!("create directory {}", paths.runs_dir.display()))?;
    write_config(&paths.config_path, &TaskrunConfig::default())?;
    write_file(&paths.schema_path, PLAN_SCHEMA)?;
    write_file(&paths.gitignore_path, TASKRUN_GITIGNORE)?;
    Ok(paths)
}

fn write_file(path: &Path, contents: &str) -> Result<()> {
    fs::write(path, contents).with_context(|| format!("write file {}", path.display()))
}

const TASKRUN_GITIGNORE: &str = "runs/\n";
