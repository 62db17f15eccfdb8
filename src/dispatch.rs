// src/dispatch.rs

//! The invocation boundary.
//!
//! A [`Dispatcher`] runs one job per call:
//!
//! 1. validate the job id,
//! 2. resolve the job's environment from the allowlist,
//! 3. encode the command vector (possibly writing a JSON arguments file),
//!    then run the inline strategy's pre-launch work,
//! 4. run the process with output captured under
//!    `{logs_directory}/{job_id}/`,
//! 5. drop the encoded command, which removes every temp file it owns.
//!
//! Steps 1–3 short-circuit on failure; step 5 happens on every path,
//! including a panic in the runner or the dispatch future being dropped.
//! A dispatcher holds no per-job state, so one instance can serve any
//! number of concurrent jobs.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{error, info};

use crate::config::{ConfigFile, LOGS_DIRECTORY_VAR, TEMP_DIRECTORY_VAR};
use crate::encode::{ArgumentEncoder, EncodedCommand};
use crate::env::{self, AmbientEnv, EnvSource};
use crate::errors::{DispatchError, Result};
use crate::exec::{self, CancelToken};
use crate::types::{ArgumentPayload, DeliveryMode, JobId, ResolvedEnvironment, TaskDefinition};

/// One job as handed over by the job-distribution system.
#[derive(Debug, Clone, Default)]
pub struct JobRequest {
    pub job_id: String,
    pub command_template: String,
    pub permitted_env_names: Vec<String>,
    pub args: ArgumentPayload,
    /// Option naming the JSON arguments file; `None` means inline delivery.
    pub delivery_mode_flag: Option<String>,
}

impl JobRequest {
    pub fn task_definition(&self) -> TaskDefinition {
        TaskDefinition::new(self.command_template.clone())
            .with_env_vars(self.permitted_env_names.iter().cloned())
            .with_delivery(DeliveryMode::from_flag(self.delivery_mode_flag.as_deref()))
    }
}

/// A job that has been resolved and encoded but not yet run.
///
/// Dropping it removes the temp files created during encoding.
#[derive(Debug)]
pub struct PreparedJob {
    pub job_id: JobId,
    pub env: ResolvedEnvironment,
    pub encoded: EncodedCommand,
    pub log_dir: PathBuf,
}

impl PreparedJob {
    pub fn command(&self) -> &[String] {
        &self.encoded.command
    }
}

#[derive(Debug, Clone)]
pub struct Dispatcher {
    env: Arc<dyn EnvSource>,
    encoder: ArgumentEncoder,
    logs_directory: PathBuf,
    temp_directory: PathBuf,
    tasks: BTreeMap<String, TaskDefinition>,
}

impl Dispatcher {
    pub fn new(logs_directory: impl Into<PathBuf>, temp_directory: impl Into<PathBuf>) -> Self {
        Self {
            env: Arc::new(AmbientEnv),
            encoder: ArgumentEncoder::new(),
            logs_directory: logs_directory.into(),
            temp_directory: temp_directory.into(),
            tasks: BTreeMap::new(),
        }
    }

    /// Build a dispatcher from validated configuration, reading the worker
    /// environment through `env`.
    pub fn from_config(cfg: &ConfigFile, env: Arc<dyn EnvSource>) -> Result<Self> {
        let logs_directory = cfg.logs_directory.clone().ok_or_else(|| {
            DispatchError::ConfigError(format!(
                "logs directory not configured: set [worker].logs_directory or {LOGS_DIRECTORY_VAR}"
            ))
        })?;
        let temp_directory = cfg.temp_directory.clone().ok_or_else(|| {
            DispatchError::ConfigError(format!(
                "temp directory not configured: set [worker].temp_directory or {TEMP_DIRECTORY_VAR}"
            ))
        })?;

        let mut encoder = ArgumentEncoder::new();
        if let Some(reserved) = &cfg.reserved_keys {
            encoder = encoder.with_strategy(Arc::new(reserved.to_strategy()));
        }

        Ok(Self::new(logs_directory, temp_directory)
            .with_env_source(env)
            .with_encoder(encoder)
            .with_tasks(cfg.tasks.clone()))
    }

    pub fn with_env_source(mut self, env: Arc<dyn EnvSource>) -> Self {
        self.env = env;
        self
    }

    pub fn with_encoder(mut self, encoder: ArgumentEncoder) -> Self {
        self.encoder = encoder;
        self
    }

    pub fn with_tasks(mut self, tasks: BTreeMap<String, TaskDefinition>) -> Self {
        self.tasks = tasks;
        self
    }

    pub fn task(&self, name: &str) -> Option<&TaskDefinition> {
        self.tasks.get(name)
    }

    pub fn tasks(&self) -> impl Iterator<Item = (&str, &TaskDefinition)> {
        self.tasks.iter().map(|(name, task)| (name.as_str(), task))
    }

    /// `{logs_directory}/{job_id}`.
    pub fn log_dir(&self, job_id: &JobId) -> PathBuf {
        self.logs_directory.join(job_id.as_str())
    }

    pub fn temp_directory(&self) -> &Path {
        &self.temp_directory
    }

    /// Resolve and encode without launching anything.
    ///
    /// Strategy side effects such as working directory cleanup are not run
    /// here; the only file created is the JSON arguments file, removed when
    /// the returned job is dropped.
    pub fn prepare(
        &self,
        job_id: &JobId,
        task: &TaskDefinition,
        args: &ArgumentPayload,
    ) -> Result<PreparedJob> {
        let env = env::resolve(self.env.as_ref(), &task.env_vars, job_id)?;
        let encoded = self.encoder.encode(
            self.env.as_ref(),
            &task.command,
            args,
            &task.delivery,
            job_id,
            &self.temp_directory,
        )?;

        Ok(PreparedJob {
            job_id: job_id.clone(),
            env,
            encoded,
            log_dir: self.log_dir(job_id),
        })
    }

    /// Run one job described by `request`.
    pub async fn dispatch(&self, request: JobRequest) -> Result<()> {
        let job_id = JobId::new(request.job_id.clone())?;
        let task = request.task_definition();
        self.run_job(&job_id, &task, &request.args, None).await
    }

    /// Run the configured task `name` as job `job_id`.
    pub async fn dispatch_task(
        &self,
        name: &str,
        job_id: &JobId,
        args: &ArgumentPayload,
        cancel: Option<CancelToken>,
    ) -> Result<()> {
        let task = self
            .tasks
            .get(name)
            .ok_or_else(|| DispatchError::ConfigError(format!("unknown task '{name}'")))?;
        self.run_job(job_id, task, args, cancel).await
    }

    /// Resolve, encode and run `task` as job `job_id`.
    pub async fn run_job(
        &self,
        job_id: &JobId,
        task: &TaskDefinition,
        args: &ArgumentPayload,
        cancel: Option<CancelToken>,
    ) -> Result<()> {
        info!(job_id = %job_id, command = %task.command, "dispatching job");

        let prepared = self.prepare(job_id, task, args).inspect_err(|e| {
            error!(job_id = %job_id, error = %e, "job setup failed");
        })?;

        self.encoder
            .before_launch(args, &task.delivery, job_id)
            .await
            .inspect_err(|e| {
                error!(job_id = %job_id, error = %e, "pre-launch step failed");
            })?;

        let result = exec::run(
            prepared.command(),
            &prepared.env,
            &prepared.log_dir,
            job_id,
            cancel,
        )
        .await;

        // Temp files go away here, before the outcome is reported.
        drop(prepared);

        match result {
            Ok(_) => {
                info!(job_id = %job_id, "job succeeded");
                Ok(())
            }
            Err(e) => {
                error!(job_id = %job_id, error = %e, outcome = ?e.outcome(), "job failed");
                Err(e)
            }
        }
    }
}
