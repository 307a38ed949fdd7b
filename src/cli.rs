// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

/// Command-line arguments for `podflow`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "podflow",
    version,
    about = "Schedule recurring workloads as execution units and track their runs.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `Podflow.toml` in the current working directory.
    #[arg(long, value_name = "PATH", default_value = "Podflow.toml")]
    pub config: String,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `PODFLOW_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse + validate config and definitions, print them, but don't
    /// schedule anything.
    #[arg(long)]
    pub dry_run: bool,

    /// Delete every unit created by podflow, then exit.
    #[arg(long)]
    pub cleanup: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
