//! Run logging helpers for `.taskrun/runs/`.
//!
//! Each CLI execution gets one directory holding the final plan, the
//! execution report and a small metadata file.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use serde::Serialize;

use crate::execute::ExecutionReport;
use crate::plan::{Plan, PlanDocument};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunMeta {
    pub run_id: String,
    /// The natural-language request, when the plan came from the generator.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request: Option<String>,
    pub started_at: Option<String>,
    pub ended_at: Option<String>,
    pub duration_ms: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct RunPaths {
    pub dir: PathBuf,
    pub meta_path: PathBuf,
    pub plan_path: PathBuf,
    pub report_path: PathBuf,
}

impl RunPaths {
    pub fn new(root: &Path, run_id: &str) -> Self {
        let dir = root.join(".taskrun").join("runs").join(run_id);
        Self {
            meta_path: dir.join("meta.json"),
            plan_path: dir.join("plan.json"),
            report_path: dir.join("report.json"),
            dir,
        }
    }
}

/// Timestamped run id, unique among existing run directories under `root`.
pub fn generate_run_id(root: &Path) -> Result<String> {
    let base = format!("run-{}", Utc::now().format("%Y%m%d_%H%M%S"));
    for suffix in 1..=999u32 {
        let id = if suffix == 1 {
            base.clone()
        } else {
            format!("{base}-{suffix}")
        };
        if !RunPaths::new(root, &id).dir.exists() {
            return Ok(id);
        }
    }
    Err(anyhow!(
        "unable to generate unique run id from base '{base}' (too many existing runs)"
    ))
}

/// Current time for [`RunMeta`] timestamps.
pub fn timestamp() -> String {
    Utc::now().to_rfc3339()
}

pub struct RunWriteRequest<'a> {
    pub root: &'a Path,
    pub meta: &'a RunMeta,
    pub plan: &'a Plan,
    pub report: &'a ExecutionReport,
}

pub fn write_run(request: &RunWriteRequest<'_>) -> Result<RunPaths> {
    let paths = RunPaths::new(request.root, &request.meta.run_id);
    fs::create_dir_all(&paths.dir)
        .with_context(|| format!("create run dir {}", paths.dir.display()))?;

    write_json(&paths.meta_path, request.meta)?;
    write_json(&paths.plan_path, &PlanDocument::from(request.plan))?;
    write_json(&paths.report_path, request.report)?;
    Ok(paths)
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut buf = serde_json::to_string_pretty(value)
        .with_context(|| format!("serialize {}", path.display()))?;
    buf.push('\n');
    fs::write(path, buf).with_context(|| format!("write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_paths_are_stable() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = RunPaths::new(temp.path(), "run-1");
        assert!(paths.dir.ends_with(Path::new(".taskrun/runs/run-1")));
        assert!(paths.plan_path.ends_with("plan.json"));
        assert!(paths.report_path.ends_with("report.json"));
    }

    #[test]
    fn run_ids_skip_existing_directories() {
        let temp = tempfile::tempdir().expect("tempdir");
        let first = generate_run_id(temp.path()).expect("id");
        assert!(first.starts_with("run-"));
        fs::create_dir_all(RunPaths::new(temp.path(), &first).dir).expect("mkdir");

        let second = generate_run_id(temp.path()).expect("id");
        assert_ne!(first, second);
    }

    #[test]
    fn writes_plan_and_report() {
        let temp = tempfile::tempdir().expect("tempdir");
        let plan = Plan::new("empty", Vec::new());
        let report = ExecutionReport::from_plan(&plan, None);
        let meta = RunMeta {
            run_id: "run-7".to_string(),
            request: Some("do nothing".to_string()),
            started_at: Some(timestamp()),
            ended_at: None,
            duration_ms: Some(3),
        };
        let paths = write_run(&RunWriteRequest {
            root: temp.path(),
            meta: &meta,
            plan: &plan,
            report: &report,
        })
        .expect("write run");

        let raw = fs::read_to_string(&paths.report_path).expect("read report");
        assert!(raw.contains("\"completedSteps\": 0"));
        let raw = fs::read_to_string(&paths.meta_path).expect("read meta");
        assert!(raw.contains("\"request\": \"do nothing\""));
        assert!(paths.plan_path.is_file());
    }
}
