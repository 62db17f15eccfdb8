// src/lib.rs

pub mod archive;
pub mod cli;
pub mod config;
pub mod dispatch;
pub mod encode;
pub mod env;
pub mod errors;
pub mod exec;
pub mod fs;
pub mod logging;
pub mod types;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::archive::{DirectoryBlobStore, LogArchiveReader};
use crate::cli::{CliArgs, Command, LogsArgs, RunArgs};
use crate::config::{ConfigFile, load_or_default};
use crate::dispatch::Dispatcher;
use crate::env::{AmbientEnv, EnvSource};
use crate::errors::DispatchError;
use crate::fs::RealFileSystem;
use crate::types::{ArgumentPayload, DeliveryMode, JobId, TaskDefinition};

pub use crate::dispatch::JobRequest;
pub use crate::errors::{JobOutcome, Result as DispatchResult};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading (file plus worker environment)
/// - the dispatcher, for `run`
/// - the log archive reader, for `logs`
/// - Ctrl-C handling, which cancels a running job
pub async fn run(args: CliArgs) -> Result<()> {
    let env: Arc<dyn EnvSource> = Arc::new(AmbientEnv);
    let cfg = load_or_default(args.config.as_deref(), env.as_ref())
        .context("loading configuration")?;

    match args.command {
        Command::Run(run_args) => run_job(&cfg, env, run_args).await,
        Command::Logs(logs_args) => print_logs(&cfg, logs_args).await,
    }
}

/// Process exit code for a failed [`run`]: the child's own exit code when it
/// failed by exiting non-zero, else 1.
pub fn exit_code(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<DispatchError>() {
        Some(DispatchError::ProcessExecutionError { exit_code }) if *exit_code > 0 => *exit_code,
        _ => 1,
    }
}

async fn run_job(cfg: &ConfigFile, env: Arc<dyn EnvSource>, args: RunArgs) -> Result<()> {
    let dispatcher = Dispatcher::from_config(cfg, env)?;
    let job_id = JobId::new(args.job_id.clone())?;
    let payload = read_payload(args.args.as_deref(), args.args_file.as_deref())?;
    let task = task_for(&dispatcher, &args)?;

    if args.dry_run {
        let prepared = dispatcher.prepare(&job_id, &task, &payload)?;
        print_dry_run(&prepared);
        return Ok(());
    }

    let (cancel_tx, cancel_rx) = exec::cancel_token();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl+C");
            return;
        }
        let _ = cancel_tx.send(());
    });

    dispatcher
        .run_job(&job_id, &task, &payload, Some(cancel_rx))
        .await?;
    Ok(())
}

/// The configured task named by `--task`, or an ad-hoc one from
/// `--command`.
fn task_for(dispatcher: &Dispatcher, args: &RunArgs) -> Result<TaskDefinition> {
    if let Some(template) = &args.command {
        return Ok(TaskDefinition::new(template.clone())
            .with_env_vars(args.env_vars.iter().cloned())
            .with_delivery(DeliveryMode::from_flag(args.json_file_option.as_deref())));
    }

    let name = args
        .task
        .as_deref()
        .ok_or_else(|| DispatchError::ConfigError("either --task or --command is required".into()))?;
    let task = dispatcher
        .task(name)
        .ok_or_else(|| DispatchError::ConfigError(format!("unknown task '{name}'")))?;
    Ok(task.clone())
}

/// Parse the job's arguments from `--args` or `--args-file`. Neither means
/// an empty payload.
fn read_payload(inline: Option<&str>, file: Option<&Path>) -> Result<ArgumentPayload> {
    let text = match (inline, file) {
        (Some(text), _) => text.to_string(),
        (None, Some(path)) => std::fs::read_to_string(path)
            .with_context(|| format!("reading arguments file {:?}", path))?,
        (None, None) => return Ok(ArgumentPayload::new()),
    };

    let value: serde_json::Value = serde_json::from_str(&text).map_err(DispatchError::JsonError)?;
    match value {
        serde_json::Value::Object(map) => Ok(map),
        other => Err(DispatchError::InvalidArguments(format!(
            "arguments must be a JSON object, got {other}"
        ))
        .into()),
    }
}

fn print_dry_run(prepared: &dispatch::PreparedJob) {
    println!("taskdispatch dry-run");
    println!("  job_id: {}", prepared.job_id);
    println!("  command: {:?}", prepared.command());
    println!("  log_dir: {}", prepared.log_dir.display());
    println!("  env ({}):", prepared.env.len());
    for name in prepared.env.keys() {
        println!("    - {name}");
    }
    for path in prepared.encoded.artifacts.paths() {
        println!("  temp file: {}", path.display());
    }

    debug!("dry-run complete (no execution)");
}

async fn print_logs(cfg: &ConfigFile, args: LogsArgs) -> Result<()> {
    let store_root = archive_store_root(cfg)?;
    info!(job_id = %args.job_id, root = %store_root.display(), "reading archived logs");

    let reader = LogArchiveReader::new(
        cfg.archive.clone(),
        DirectoryBlobStore::new(store_root, RealFileSystem),
    );

    let logs = if args.executable {
        reader.executable_logs_for_job(&args.job_id).await?
    } else {
        reader.logs_for_job(&args.job_id).await?
    };

    println!("{}", serde_json::to_string_pretty(&logs)?);
    Ok(())
}

/// `{archive.root}/{container}`. An unconfigured archive never touches the
/// store, so a missing root is only an error once credentials are present.
fn archive_store_root(cfg: &ConfigFile) -> Result<PathBuf> {
    let container = cfg.archive.container.clone().unwrap_or_default();
    match &cfg.archive_root {
        Some(root) => Ok(root.join(container)),
        None if cfg.archive.is_configured() => Err(DispatchError::ConfigError(
            "[archive].root must be set to read archived logs".to_string(),
        )
        .into()),
        None => Ok(PathBuf::new()),
    }
}
