// src/archive/reader.rs

//! Fetches archived stdout/stderr logs for completed jobs.
//!
//! Without complete archive credentials the reader returns an empty result
//! instead of failing; callers treat "no logs" and "archive not configured"
//! the same way.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use crate::archive::store::BlobStore;
use crate::env::EnvSource;
use crate::errors::Result;

pub const ACCOUNT_NAME_VAR: &str = "AZURE_STORAGE_ACCOUNT_NAME";
pub const ACCOUNT_KEY_VAR: &str = "AZURE_STORAGE_ACCOUNT_KEY";
pub const CONTAINER_VAR: &str = "AZURE_LOGS_CONTAINER_NAME";

/// Credentials and location of the log archive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArchiveSettings {
    pub account_name: Option<String>,
    pub account_key: Option<String>,
    pub container: Option<String>,
}

impl ArchiveSettings {
    pub fn from_env(env: &dyn EnvSource) -> Self {
        Self {
            account_name: env.var(ACCOUNT_NAME_VAR),
            account_key: env.var(ACCOUNT_KEY_VAR),
            container: env.var(CONTAINER_VAR),
        }
    }

    /// Fill unset fields from `fallback`.
    pub fn or(self, fallback: ArchiveSettings) -> Self {
        Self {
            account_name: self.account_name.or(fallback.account_name),
            account_key: self.account_key.or(fallback.account_key),
            container: self.container.or(fallback.container),
        }
    }

    /// All three values present and non-empty.
    pub fn is_configured(&self) -> bool {
        [&self.account_name, &self.account_key, &self.container]
            .iter()
            .all(|v| v.as_deref().is_some_and(|s| !s.is_empty()))
    }
}

/// One archived log file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogFile {
    pub last_modified: DateTime<Utc>,
    pub text: String,
}

pub type LogFiles = BTreeMap<String, LogFile>;

pub struct LogArchiveReader<S> {
    settings: ArchiveSettings,
    store: S,
}

impl<S: BlobStore> LogArchiveReader<S> {
    pub fn new(settings: ArchiveSettings, store: S) -> Self {
        Self { settings, store }
    }

    /// All archived files whose blob name starts with `prefix`, keyed by the
    /// last path segment of the blob name.
    pub async fn logs_for_job(&self, prefix: &str) -> Result<LogFiles> {
        if !self.settings.is_configured() {
            debug!(prefix, "log archive credentials not configured; returning no logs");
            return Ok(LogFiles::new());
        }

        let mut logs = LogFiles::new();
        for blob in self.store.list_blobs(prefix).await? {
            let file_name = blob.name.rsplit('/').next().unwrap_or(&blob.name).to_string();
            let text = self.store.download_text(&blob.name).await?;
            logs.insert(
                file_name,
                LogFile {
                    last_modified: blob.last_modified,
                    text,
                },
            );
        }

        debug!(prefix, files = logs.len(), "fetched archived logs");
        Ok(logs)
    }

    /// Logs of an executable task with its log pair renamed to `stdout` and
    /// `stderr`.
    pub async fn executable_logs_for_job(&self, job_id: &str) -> Result<LogFiles> {
        let mut logs = self.logs_for_job(job_id).await?;
        if logs.is_empty() {
            return Ok(logs);
        }

        for stream in ["stdout", "stderr"] {
            let archived_name = format!("{job_id}-{stream}.txt");
            match logs.remove(&archived_name) {
                Some(file) => {
                    logs.insert(stream.to_string(), file);
                }
                None => warn!(job_id, file = %archived_name, "archived log missing"),
            }
        }

        Ok(logs)
    }
}
