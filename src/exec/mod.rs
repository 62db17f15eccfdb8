// src/exec/mod.rs

//! Process execution layer.
//!
//! - [`runner`] launches a job's command with its resolved environment,
//!   captures stdout/stderr to the job's log pair and reports the exit
//!   status.
//! - [`cleanup`] provides [`TempArtifacts`], the guard that removes the
//!   job's temp files once the run is over.

pub mod cleanup;
pub mod runner;

pub use cleanup::{TempArtifacts, remove_artifact};
pub use runner::{CancelToken, LogPair, cancel_token, run};
