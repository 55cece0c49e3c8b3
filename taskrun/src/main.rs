//! Natural-language task executor.
//!
//! Plans are JSON documents of read/write/run/delete steps. `taskrun exec`
//! runs a plan file against a workspace; `taskrun ask` asks the configured
//! generator for a plan first. Every execution leaves a run log under
//! `.taskrun/runs/`.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use taskrun::core::graph::order_steps;
use taskrun::core::pipeline::validate_content;
use taskrun::core::types::ErrorCode;
use taskrun::execute::{ExecutionControl, ExecutionReport, ProgressEvent, execute_plan};
use taskrun::exit_codes;
use taskrun::io::config::{TaskrunConfig, load_config};
use taskrun::io::generator::CommandGenerator;
use taskrun::io::init::{InitOptions, TaskrunPaths, init_taskrun};
use taskrun::io::plan_store::load_plan_file;
use taskrun::io::process::ShellRunner;
use taskrun::io::prompt::PromptBuilder;
use taskrun::io::run_log::{RunMeta, RunWriteRequest, generate_run_id, timestamp, write_run};
use taskrun::io::workspace::LocalWorkspace;
use taskrun::logging;
use taskrun::plan::{Plan, PlanDocument};
use taskrun::planner::plan_from_request;
use taskrun::step::ExecutionEnv;

#[derive(Parser)]
#[command(
    name = "taskrun",
    version,
    about = "Plan-driven task executor with validated file generation"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create `.taskrun/` with a default config and the plan schema.
    Init {
        /// Overwrite existing files.
        #[arg(short, long)]
        force: bool,
        /// Project root.
        #[arg(long, default_value = ".")]
        root: PathBuf,
    },
    /// Check a plan file against the schema and invariants and print its execution order.
    Validate {
        plan: PathBuf,
    },
    /// Run the content validators over files on disk.
    Check {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Execute a plan file.
    Exec {
        plan: PathBuf,
        /// Workspace root the plan's paths are relative to.
        #[arg(long, default_value = ".")]
        root: PathBuf,
    },
    /// Ask the generator for a plan, then execute it.
    Ask {
        request: String,
        /// Workspace root the plan's paths are relative to.
        #[arg(long, default_value = ".")]
        root: PathBuf,
        /// Print the generated plan without executing it.
        #[arg(long)]
        dry_run: bool,
    },
}

fn main() {
    logging::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{err:#}");
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Init { force, root } => cmd_init(&root, force),
        Command::Validate { plan } => cmd_validate(&plan),
        Command::Check { files } => cmd_check(&files),
        Command::Exec { plan, root } => {
            let plan = load_plan_file(&plan)?;
            cmd_exec(&root, plan, None)
        }
        Command::Ask {
            request,
            root,
            dry_run,
        } => cmd_ask(&root, &request, dry_run),
    }
}

fn cmd_init(root: &Path, force: bool) -> Result<i32> {
    let paths = init_taskrun(root, &InitOptions { force })?;
    println!("initialized {}", paths.taskrun_dir.display());
    Ok(exit_codes::OK)
}

fn cmd_validate(path: &Path) -> Result<i32> {
    let plan = load_plan_file(path)?;
    let ordered = match order_steps(&plan.steps) {
        Ok(ordered) => ordered,
        Err(err) => {
            eprintln!("{}: {err}", ErrorCode::CycleError);
            return Ok(exit_codes::INVALID);
        }
    };
    println!("{}", plan.summary);
    for (index, step) in ordered.iter().enumerate() {
        let target = step
            .path
            .as_deref()
            .or(step.command.as_deref())
            .unwrap_or_default();
        println!(
            "{:>3}. step {} [{}] {target}",
            index + 1,
            step.id,
            step.action.as_str()
        );
    }
    Ok(exit_codes::OK)
}

fn cmd_check(files: &[PathBuf]) -> Result<i32> {
    let mut blocked = false;
    for file in files {
        let content =
            fs::read_to_string(file).with_context(|| format!("read {}", file.display()))?;
        let path = file.to_string_lossy().replace('\\', "/");
        let report = validate_content(&path, &content);
        for violation in &report.violations {
            let level = if violation.is_blocking() { "error" } else { "warn" };
            println!("{level}: {violation}");
        }
        if !report.suppressed.is_empty() {
            let domain = report
                .domain
                .map(|domain| domain.to_string())
                .unwrap_or_default();
            println!(
                "note: {path}: {} violation(s) suppressed for the {domain} domain",
                report.suppressed.len()
            );
        }
        blocked |= report.has_blocking();
    }
    Ok(if blocked {
        exit_codes::FAILED
    } else {
        exit_codes::OK
    })
}

fn cmd_ask(root: &Path, request: &str, dry_run: bool) -> Result<i32> {
    let config = load_root_config(root)?;
    let workspace = LocalWorkspace::new(root);
    let generator = command_generator(root, &config);
    let prompts = PromptBuilder::new(config.prompt_budget_bytes);
    let plan = plan_from_request(request, &workspace, &generator, &prompts)?;
    if dry_run {
        let mut raw = serde_json::to_string_pretty(&PlanDocument::from(&plan))
            .context("serialize plan")?;
        raw.push('\n');
        print!("{raw}");
        return Ok(exit_codes::OK);
    }
    cmd_exec(root, plan, Some(request))
}

fn cmd_exec(root: &Path, plan: Plan, request: Option<&str>) -> Result<i32> {
    let config = load_root_config(root)?;
    let workspace = LocalWorkspace::new(root);
    let generator = command_generator(root, &config);
    let runner = ShellRunner {
        output_limit_bytes: config.output_limit_bytes,
    };
    let prompts = PromptBuilder::new(config.prompt_budget_bytes);
    let env = ExecutionEnv {
        workspace: &workspace,
        generator: &generator,
        runner: &runner,
        config: &config,
        prompts: &prompts,
    };

    let run_id = generate_run_id(root)?;
    let started_at = timestamp();
    let start = Instant::now();

    let (tx, rx) = mpsc::channel();
    let printer = thread::spawn(move || {
        for event in rx {
            print_progress(&event);
        }
    });
    let outcome = execute_plan(plan, &env, &ExecutionControl::new(), Some(&tx));
    drop(tx);
    if printer.join().is_err() {
        eprintln!("progress printer panicked");
    }

    let meta = RunMeta {
        run_id,
        request: request.map(str::to_string),
        started_at: Some(started_at),
        ended_at: Some(timestamp()),
        duration_ms: Some(u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)),
    };
    let paths = write_run(&RunWriteRequest {
        root,
        meta: &meta,
        plan: &outcome.plan,
        report: &outcome.report,
    })?;

    let mut raw = serde_json::to_string_pretty(&outcome.report).context("serialize report")?;
    raw.push('\n');
    print!("{raw}");
    eprintln!("run log: {}", paths.dir.display());
    Ok(exit_code(&outcome.report))
}

fn exit_code(report: &ExecutionReport) -> i32 {
    match &report.error {
        None if report.success => exit_codes::OK,
        Some(error) if error.code == ErrorCode::Cancelled => exit_codes::CANCELLED,
        _ => exit_codes::FAILED,
    }
}

fn load_root_config(root: &Path) -> Result<TaskrunConfig> {
    load_config(&TaskrunPaths::new(root).config_path)
}

fn command_generator(root: &Path, config: &TaskrunConfig) -> CommandGenerator {
    CommandGenerator {
        command: config.generator.command.clone(),
        workdir: root.to_path_buf(),
        timeout: Duration::from_secs(config.generator.timeout_secs),
        output_limit_bytes: config.output_limit_bytes,
    }
}

fn print_progress(event: &ProgressEvent) {
    match event {
        ProgressEvent::Started { total } => eprintln!("executing {total} step(s)"),
        ProgressEvent::StepStarted {
            step_id,
            index,
            total,
            action,
        } => eprintln!("[{}/{total}] step {step_id}: {}", index + 1, action.as_str()),
        ProgressEvent::StepFinished {
            step_id,
            success: false,
            code,
        } => {
            let code = code.map(|code| code.to_string()).unwrap_or_default();
            eprintln!("step {step_id} failed {code}");
        }
        ProgressEvent::IntegrationChecked {
            violations: 1..,
            ..
        } => eprintln!("cross-file integration check failed"),
        ProgressEvent::Cancelled { completed_steps } => {
            eprintln!("cancelled after {completed_steps} step(s)");
        }
        ProgressEvent::Finished {
            success,
            completed_steps,
        } => eprintln!(
            "{} ({completed_steps} step(s) completed)",
            if *success { "done" } else { "failed" }
        ),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_init() {
        let cli = Cli::parse_from(["taskrun", "init"]);
        assert!(matches!(cli.command, Command::Init { force: false, .. }));
    }

    #[test]
    fn parse_init_force() {
        let cli = Cli::parse_from(["taskrun", "init", "--force"]);
        assert!(matches!(cli.command, Command::Init { force: true, .. }));
    }

    #[test]
    fn parse_exec_with_root() {
        let cli = Cli::parse_from(["taskrun", "exec", "plan.json", "--root", "/tmp/app"]);
        let Command::Exec { plan, root } = cli.command else {
            panic!("expected exec");
        };
        assert_eq!(plan, PathBuf::from("plan.json"));
        assert_eq!(root, PathBuf::from("/tmp/app"));
    }

    #[test]
    fn parse_ask_dry_run() {
        let cli = Cli::parse_from(["taskrun", "ask", "add a login form", "--dry-run"]);
        assert!(matches!(cli.command, Command::Ask { dry_run: true, .. }));
    }

    #[test]
    fn check_requires_files() {
        assert!(Cli::try_parse_from(["taskrun", "check"]).is_err());
    }

    #[test]
    fn check_exit_code_reflects_blocking_violations() {
        let temp = tempfile::tempdir().expect("tempdir");
        let good = temp.path().join("sum.ts");
        fs::write(&good, "export const sum = (a: number, b: number) => a + b;\n").expect("write");
        assert_eq!(cmd_check(&[good]).expect("check"), exit_codes::OK);

        let services = temp.path().join("services");
        fs::create_dir_all(&services).expect("mkdir");
        let bad = services.join("user.ts");
        fs::write(&bad, "import { useState } from 'react';\nexport const a = useState(0);\n")
            .expect("write");
        assert_eq!(cmd_check(&[bad]).expect("check"), exit_codes::FAILED);
    }
}
