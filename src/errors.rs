// src/errors.rs

//! Crate-wide error type and outcome classification.
//!
//! Every way a dispatch can fail is a variant of [`DispatchError`]. The
//! external job-distribution system only needs to know which terminal
//! outcome a job reached, so [`DispatchError::outcome`] folds the variants
//! into a [`JobOutcome`].

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Environment variable {0} not present in the worker's environment")]
    MissingEnvironmentVariable(String),

    #[error("Invalid job id: {0}")]
    InvalidJobId(String),

    #[error("Invalid command template: {0}")]
    InvalidCommandTemplate(String),

    #[error("Invalid task arguments: {0}")]
    InvalidArguments(String),

    #[error("Failed to write temp artifact {path:?}: {source}")]
    TempArtifactWriteError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Working directory cleanup failed: {0}")]
    WorkdirCleanupError(String),

    #[error("Failed to set up log file {path:?}: {source}")]
    LogSetupError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to launch '{program}': {source}")]
    ProcessLaunchError {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Process exited with non-zero status {exit_code}")]
    ProcessExecutionError { exit_code: i32 },

    #[error("Job was cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Terminal outcome of a failed job as seen by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    /// The process never started.
    LaunchFailure,
    /// The process ran and exited non-zero.
    NonZeroExit(i32),
    /// The run was cancelled through its cancel token.
    Cancelled,
    /// Something failed before a launch was attempted.
    SetupFailure,
}

impl DispatchError {
    pub fn outcome(&self) -> JobOutcome {
        match self {
            DispatchError::ProcessLaunchError { .. } => JobOutcome::LaunchFailure,
            DispatchError::ProcessExecutionError { exit_code } => {
                JobOutcome::NonZeroExit(*exit_code)
            }
            DispatchError::Cancelled => JobOutcome::Cancelled,
            _ => JobOutcome::SetupFailure,
        }
    }

    /// Whether the error reports a job failure rather than a dispatcher fault.
    pub fn is_job_failure(&self) -> bool {
        matches!(self.outcome(), JobOutcome::NonZeroExit(_))
    }
}

pub type Result<T> = std::result::Result<T, DispatchError>;
