// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Command-line arguments for `taskdispatch`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "taskdispatch",
    version,
    about = "Run one job's command with a controlled environment and captured logs.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `Taskdispatch.toml` in the current working directory if it
    /// exists, otherwise the worker environment alone.
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `TASKDISPATCH_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL", global = true)]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Dispatch one job.
    Run(RunArgs),

    /// Print a job's archived logs as JSON.
    Logs(LogsArgs),
}

#[derive(Debug, Clone, Args)]
pub struct RunArgs {
    /// Name of a `[task.<name>]` entry in the config file.
    #[arg(long, value_name = "NAME", required_unless_present = "command", conflicts_with = "command")]
    pub task: Option<String>,

    /// Ad-hoc command template instead of a configured task.
    #[arg(long, value_name = "TEMPLATE")]
    pub command: Option<String>,

    /// Environment variable passed through to an ad-hoc command. Repeatable.
    #[arg(long = "env", value_name = "NAME", requires = "command")]
    pub env_vars: Vec<String>,

    /// Deliver arguments to an ad-hoc command in a JSON file named after
    /// this option.
    #[arg(long, value_name = "OPT", requires = "command")]
    pub json_file_option: Option<String>,

    /// Job identifier.
    #[arg(long, value_name = "ID")]
    pub job_id: String,

    /// Arguments as a JSON object.
    #[arg(long, value_name = "JSON", conflicts_with = "args_file")]
    pub args: Option<String>,

    /// Read the arguments JSON object from a file.
    #[arg(long, value_name = "PATH")]
    pub args_file: Option<PathBuf>,

    /// Resolve and encode, print the command, but don't run it.
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Debug, Clone, Args)]
pub struct LogsArgs {
    /// Job identifier (blob name prefix).
    #[arg(long, value_name = "ID")]
    pub job_id: String,

    /// Rename the job's log pair to `stdout` / `stderr`.
    #[arg(long)]
    pub executable: bool,
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
