// src/lib.rs

pub mod cli;
pub mod config;
pub mod definition;
pub mod errors;
pub mod events;
pub mod exec;
pub mod logging;
pub mod record;
pub mod run;
pub mod scheduler;
pub mod types;
pub mod workload;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::cli::CliArgs;
use crate::config::{AppConfig, load_and_validate};
use crate::definition::{DefinitionSource, FolderDefinitionSource};
use crate::exec::{Executor, LocalProcessExecutor, cleanup_environment};
use crate::record::recorder_from_config;
use crate::scheduler::Scheduler;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading
/// - definition source, recorder and executor
/// - the scheduler loops
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<()> {
    let config_path = PathBuf::from(&args.config);
    let mut cfg = load_and_validate(&config_path)
        .with_context(|| format!("loading config {}", config_path.display()))?;
    resolve_paths(&mut cfg, &config_root_dir(&config_path));

    let source = Arc::new(FolderDefinitionSource::new(
        cfg.scheduler.dag_path.clone(),
        cfg.defaults.clone(),
    )?);

    if args.dry_run {
        print_dry_run(&cfg, source.as_ref())?;
        return Ok(());
    }

    let executor: Arc<dyn Executor> = Arc::new(LocalProcessExecutor::new());

    if args.cleanup {
        let deleted = cleanup_environment(executor.as_ref()).await?;
        info!(deleted, "cleanup complete");
        return Ok(());
    }

    let recorder = recorder_from_config(&cfg.recorder).await?;
    let scheduler = Scheduler::new(cfg.scheduler.clone(), source, executor, recorder);

    // Ctrl-C → graceful shutdown.
    {
        let scheduler = Arc::clone(&scheduler);
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("failed to listen for Ctrl+C: {e}");
                return;
            }
            scheduler.stop();
        });
    }

    scheduler.collect_definitions().await?;
    scheduler.start(cfg.scheduler.cycle_period).await?;
    scheduler.wait().await;
    Ok(())
}

/// Figure out the directory relative paths in the config are resolved
/// against.
///
/// - If the config path has a non-empty parent (e.g. "deploy/Podflow.toml"),
///   we use that directory.
/// - If it's just a bare filename like "Podflow.toml" (parent = ""),
///   we fall back to the current working directory "."
fn config_root_dir(config_path: &Path) -> PathBuf {
    match config_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    }
}

fn resolve_paths(cfg: &mut AppConfig, root: &Path) {
    if cfg.scheduler.dag_path.is_relative() {
        cfg.scheduler.dag_path = root.join(&cfg.scheduler.dag_path);
    }
    if let Some(path) = cfg.recorder.path.as_mut() {
        if Path::new(path.as_str()).is_relative() {
            *path = root.join(path.as_str()).display().to_string();
        }
    }
}

/// Simple dry-run output: print settings and every loadable workload.
fn print_dry_run(cfg: &AppConfig, source: &dyn DefinitionSource) -> Result<()> {
    println!("podflow dry-run");
    println!("  scheduler.dag_path = {}", cfg.scheduler.dag_path.display());
    println!("  scheduler.cycle_period = {:?}", cfg.scheduler.cycle_period);
    println!("  scheduler.workloads_on = {}", cfg.scheduler.workloads_on);
    println!("  scheduler.metrics_period = {:?}", cfg.scheduler.metrics_period);
    println!("  recorder.kind = {:?}", cfg.recorder.kind);
    println!();

    let loaded = source.load()?;
    println!("workloads ({}):", loaded.len());
    for def in &loaded {
        let d = &def.definition;
        println!("  - {}", d.name);
        println!("      file: {}", def.path.display());
        println!("      namespace: {}", d.namespace);
        println!("      schedule: {}", d.schedule);
        println!("      image: {}", d.image);
        println!("      command: {:?}", d.command);
        println!("      max_active_runs: {}", d.max_active_runs);
        println!("      start: {}", d.start_date_time);
        if let Some(ref end) = d.end_date_time {
            println!("      end: {end}");
        }
        if let Some(limit) = d.time_limit {
            println!("      time_limit: {limit}s");
        }
        if !d.labels.is_empty() {
            println!("      labels: {:?}", d.labels);
        }
    }

    debug!("dry-run complete (no execution)");
    Ok(())
}
