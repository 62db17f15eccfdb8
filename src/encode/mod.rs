// src/encode/mod.rs

//! Argument encoding: template → finished command vector.
//!
//! - [`template`] expands placeholders and splits the template into tokens.
//! - [`strategy`] holds the pluggable inline strategies and the working
//!   directory cleanup hook.
//!
//! The [`ArgumentEncoder`] appends the job's arguments according to its
//! [`DeliveryMode`] and hands back the [`TempArtifacts`] it created, which
//! own the removal of those files.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use crate::env::{EnvSource, JOB_UUID_VAR, Layered, MapEnv};
use crate::errors::{DispatchError, Result};
use crate::exec::TempArtifacts;
use crate::types::{ArgumentPayload, CommandVector, DeliveryMode, JobId};

pub mod strategy;
pub mod template;

pub use strategy::{
    HookFuture, InlineStrategy, JsonInline, RemoveWorkdirs, ReservedKeyStrategy,
    WorkdirCleanupHook,
};

/// Output of [`ArgumentEncoder::encode`].
#[derive(Debug)]
pub struct EncodedCommand {
    pub command: CommandVector,
    /// Files written for this command; removed when dropped.
    pub artifacts: TempArtifacts,
}

/// Path of the JSON arguments file for `job_id` under `temp_dir`.
pub fn args_file_path(temp_dir: &Path, job_id: &JobId) -> PathBuf {
    temp_dir.join(format!("{job_id}_args.json"))
}

#[derive(Debug, Clone, Default)]
pub struct ArgumentEncoder {
    strategies: Vec<Arc<dyn InlineStrategy>>,
}

impl ArgumentEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an inline strategy. Strategies are tried in insertion order
    /// before falling back to [`JsonInline`].
    pub fn with_strategy(mut self, strategy: Arc<dyn InlineStrategy>) -> Self {
        self.strategies.push(strategy);
        self
    }

    pub fn strategies(&self) -> &[Arc<dyn InlineStrategy>] {
        &self.strategies
    }

    /// Build the command vector for one job.
    ///
    /// `ambient` is the worker's environment; template placeholders resolve
    /// against it (plus `JOB_UUID`), never against the job's resolved
    /// environment. The only file touched is the JSON arguments file, owned
    /// by the returned [`EncodedCommand`]; strategy side effects wait for
    /// [`before_launch`](Self::before_launch).
    pub fn encode(
        &self,
        ambient: &dyn EnvSource,
        template: &str,
        args: &ArgumentPayload,
        mode: &DeliveryMode,
        job_id: &JobId,
        temp_dir: &Path,
    ) -> Result<EncodedCommand> {
        let job_vars = MapEnv::new().with(JOB_UUID_VAR, job_id.as_str());
        let expanded = template::expand_vars(template, &Layered::new(&job_vars, ambient));
        let mut command = template::tokenize(&expanded)?;
        let mut artifacts = TempArtifacts::new();

        if args.is_empty() {
            debug!(job_id = %job_id, "no arguments to pass");
            return Ok(EncodedCommand { command, artifacts });
        }

        match mode {
            DeliveryMode::None => {
                debug!(job_id = %job_id, "delivery mode none; arguments not passed");
            }
            DeliveryMode::JsonFile { option } => {
                let path = args_file_path(temp_dir, job_id);
                write_args_file(&path, args, &mut artifacts)?;
                command.push(option.clone());
                command.push(path.to_string_lossy().into_owned());
            }
            DeliveryMode::Inline => {
                let strategy = self.inline_strategy(args);
                debug!(job_id = %job_id, strategy = strategy.name(), "encoding inline arguments");
                command.extend(strategy.encode(args, job_id)?);
            }
        }

        Ok(EncodedCommand { command, artifacts })
    }

    /// Run the pre-launch work of the strategy that [`encode`](Self::encode)
    /// picked for the same inputs. A no-op outside inline mode or for an
    /// empty payload.
    pub async fn before_launch(
        &self,
        args: &ArgumentPayload,
        mode: &DeliveryMode,
        job_id: &JobId,
    ) -> Result<()> {
        if args.is_empty() || *mode != DeliveryMode::Inline {
            return Ok(());
        }
        self.inline_strategy(args).before_launch(args, job_id).await
    }

    fn inline_strategy(&self, args: &ArgumentPayload) -> &dyn InlineStrategy {
        self.strategies
            .iter()
            .find(|s| s.matches(args))
            .map(|s| s.as_ref())
            .unwrap_or(&JsonInline)
    }
}

/// Write `args` as JSON to `path`, registering the file as soon as it
/// exists so a failed write still gets cleaned up.
fn write_args_file(path: &Path, args: &ArgumentPayload, artifacts: &mut TempArtifacts) -> Result<()> {
    let to_write_error = |source: std::io::Error| DispatchError::TempArtifactWriteError {
        path: path.to_path_buf(),
        source,
    };

    let mut file = File::create(path).map_err(to_write_error)?;
    artifacts.register(path);

    let mut json = serde_json::to_vec(args)?;
    json.push(b'\n');
    file.write_all(&json).map_err(to_write_error)?;
    file.sync_all().map_err(to_write_error)?;

    debug!(path = %path.display(), bytes = json.len(), "wrote arguments file");
    Ok(())
}
