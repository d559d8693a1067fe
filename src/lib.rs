// src/lib.rs

pub mod backend;
pub mod cli;
pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod fs;
pub mod logging;
pub mod stack;
pub mod types;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use colored::Colorize;
use tracing::{debug, info};

use crate::backend::{ChangeSetSummary, LocalBackend, SharedBackend};
use crate::cli::{ChangeSetCommand, CliArgs, Command};
use crate::config::loader::load_and_validate;
use crate::config::model::ConfigFile;
use crate::dag::StackGraph;
use crate::engine::{changeset, run_deployment, run_termination, BatchReport};
use crate::errors::StackctlError;
use crate::fs::{FileSystem, RealFileSystem};
use crate::stack::{Stack, StackSet};

/// High-level entry point used by `main.rs`.
///
/// Loads and validates the config, builds the local backend under the config
/// directory and dispatches the subcommand. Templates are read only for the
/// stacks a command sends to the backend.
pub async fn run(args: CliArgs) -> Result<()> {
    let config_path = PathBuf::from(&args.config);
    let cfg = load_and_validate(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    let root_dir = config_root_dir(&config_path);

    let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);
    let stacks = StackSet::from_config(&cfg, &root_dir);

    let backend: SharedBackend = Arc::new(LocalBackend::new(
        Arc::clone(&fs),
        root_dir.join(&cfg.backend.state_dir),
        cfg.settle_time,
        cfg.options.status_poll_interval,
    ));
    debug!(project = %cfg.project.name, stacks = stacks.len(), "configuration loaded");

    match args.command {
        Command::Deploy { stacks: names, dry_run } => {
            let mut stacks = stacks;
            stacks.select(&names)?;
            stacks.load_templates(fs.as_ref())?;
            if dry_run {
                print_plan(&cfg, &stacks)?;
                return Ok(());
            }
            let report = run_deployment(backend, Arc::new(stacks), cfg.options).await?;
            finish_batch("deployment", &report)
        }
        Command::Terminate { stacks: names, all } => {
            if names.is_empty() && !all {
                bail!("name the stacks to terminate, or pass --all");
            }
            let mut stacks = stacks;
            stacks.select(&names)?;
            let report = run_termination(backend, Arc::new(stacks), cfg.options).await?;
            finish_batch("termination", &report)
        }
        Command::Status { stacks: names } => print_status(backend, &stacks, &names).await,
        Command::ChangeSet(cmd) => run_change_set(backend, stacks, fs.as_ref(), &cfg, cmd).await,
    }
}

/// Directory that relative paths in the config are resolved against.
///
/// A bare filename like "stackctl.toml" has an empty parent, in which case
/// the current working directory is used.
fn config_root_dir(config_path: &Path) -> PathBuf {
    match config_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    }
}

fn finish_batch(kind: &str, report: &BatchReport) -> Result<()> {
    let unsettled = report.unsettled();
    if unsettled.is_empty() {
        info!("{kind} finished: {} stack(s) complete", report.states.len());
        return Ok(());
    }
    bail!("{kind} did not complete for: {}", unsettled.join(", "))
}

/// Dry-run output: stacks grouped into dependency waves.
fn print_plan(cfg: &ConfigFile, stacks: &StackSet) -> Result<()> {
    let waves = StackGraph::from_stacks(stacks)?.waves()?;

    println!("stackctl plan for project '{}'", cfg.project.name);
    for (index, wave) in waves.iter().enumerate() {
        let selected: Vec<&Stack> = wave
            .iter()
            .filter_map(|name| stacks.get(name))
            .filter(|stack| stack.actioned)
            .collect();
        if selected.is_empty() {
            continue;
        }
        println!("wave {}:", index + 1);
        for stack in selected {
            print!("  - {} ({})", stack.name, stack.remote_name);
            if !stack.depends_on.is_empty() {
                print!(" after {}", stack.depends_on.join(", "));
            }
            println!();
        }
    }

    debug!("dry-run complete (no backend calls)");
    Ok(())
}

async fn print_status(backend: SharedBackend, stacks: &StackSet, names: &[String]) -> Result<()> {
    let mut stacks = stacks.clone();
    stacks.select(names)?;

    for stack in stacks.actioned() {
        let status = match backend.current_status(&stack.remote_name).await {
            Ok(status) => status,
            Err(err) if err.is_not_found() => "NOT DEPLOYED".to_string(),
            Err(err) => return Err(err).with_context(|| format!("describing {}", stack.name)),
        };
        println!("{:<24} {:<32} {}", stack.name.bold(), stack.remote_name, status);
    }
    Ok(())
}

async fn run_change_set(
    backend: SharedBackend,
    mut stacks: StackSet,
    fs: &dyn FileSystem,
    cfg: &ConfigFile,
    cmd: ChangeSetCommand,
) -> Result<()> {
    match cmd {
        ChangeSetCommand::Create { stack, name } => {
            stacks.select(std::slice::from_ref(&stack))?;
            stacks.load_templates(fs)?;
            let stack = lookup(&stacks, &stack)?;
            let summary = changeset::create_and_wait(backend.as_ref(), stack, &name, &cfg.options).await?;
            print_change_set(&summary);
        }
        ChangeSetCommand::Execute { stack, name } => {
            let stack = lookup(&stacks, &stack)?;
            let status = changeset::execute_and_wait(backend, stack, &name, &cfg.options).await?;
            println!("{} - {}", stack.name.bold(), status.green());
        }
        ChangeSetCommand::Describe { stack, name } => {
            let stack = lookup(&stacks, &stack)?;
            print_change_set(&changeset::describe(backend.as_ref(), stack, &name).await?);
        }
        ChangeSetCommand::List { stack } => {
            let stack = lookup(&stacks, &stack)?;
            let summaries = changeset::list(backend.as_ref(), stack).await?;
            if summaries.is_empty() {
                println!("no change sets for {}", stack.name);
            }
            for summary in summaries {
                println!("{:<32} {}", summary.name, summary.status);
            }
        }
        ChangeSetCommand::Delete { stack, name } => {
            let stack = lookup(&stacks, &stack)?;
            changeset::delete(backend.as_ref(), stack, &name).await?;
            println!("deleted change set {name}");
        }
    }
    Ok(())
}

fn lookup<'a>(stacks: &'a StackSet, name: &str) -> Result<&'a Stack> {
    stacks
        .get(name)
        .ok_or_else(|| StackctlError::StackNotFound(name.to_string()).into())
}

fn print_change_set(summary: &ChangeSetSummary) {
    println!("change set {} - {}", summary.name.bold(), summary.status);
    if let Some(reason) = summary.reason.as_deref() {
        println!("  reason: {reason}");
    }
    for change in &summary.changes {
        println!(
            "  {} {} ({})",
            change.action, change.logical_id, change.resource_type
        );
    }
}
