// src/config/model.rs

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Deserialize;

use crate::archive::ArchiveSettings;
use crate::encode::{RemoveWorkdirs, ReservedKeyStrategy};
use crate::types::TaskDefinition;

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [worker]
/// logs_directory = "/var/log/worker"
/// temp_directory = "/tmp/worker"
///
/// [archive]
/// container = "job-logs"
/// root = "/mnt/archive"
///
/// [inline.reserved_keys]
/// workdir_root = "/srv/pipeline"
///
/// [task.report]
/// command = "python report.py"
/// env_vars = ["API_TOKEN"]
/// json_file_option = "--args-file"
/// ```
///
/// All sections are optional. Unset worker directories and archive
/// credentials fall back to the worker's environment variables.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfigFile {
    #[serde(default)]
    pub worker: WorkerSection,

    #[serde(default)]
    pub archive: ArchiveSection,

    #[serde(default)]
    pub inline: InlineSection,

    /// Tasks keyed by name from `[task.<name>]`.
    #[serde(default)]
    pub task: BTreeMap<String, TaskConfig>,
}

/// `[worker]` section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkerSection {
    /// Root of the per-job log directories (`$WORKER_LOGS_DIRECTORY`).
    #[serde(default)]
    pub logs_directory: Option<PathBuf>,

    /// Where JSON argument files are written (`$WORKER_TEMP_DIRECTORY`).
    #[serde(default)]
    pub temp_directory: Option<PathBuf>,
}

/// `[archive]` section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ArchiveSection {
    #[serde(default)]
    pub account_name: Option<String>,
    #[serde(default)]
    pub account_key: Option<String>,
    #[serde(default)]
    pub container: Option<String>,

    /// Local directory holding one sub-directory per container.
    #[serde(default)]
    pub root: Option<PathBuf>,
}

/// `[inline]` section: strategies consulted in inline delivery mode.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InlineSection {
    #[serde(default)]
    pub reserved_keys: Option<ReservedKeysConfig>,
}

/// `[inline.reserved_keys]`: configuration of [`ReservedKeyStrategy`].
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReservedKeysConfig {
    #[serde(default = "default_marker_key")]
    pub marker_key: String,

    #[serde(default = "default_id_key")]
    pub id_key: String,

    #[serde(default = "default_flag")]
    pub flag: String,

    /// `[key, flag]` pairs, appended in order when `key` is present.
    #[serde(default = "default_conditional_flags")]
    pub conditional_flags: Vec<(String, String)>,

    #[serde(default = "default_rerun_key")]
    pub rerun_key: Option<String>,

    /// Base directory of the working directories removed on rerun. Without
    /// it, rerun requests leave the filesystem alone.
    #[serde(default)]
    pub workdir_root: Option<PathBuf>,

    #[serde(default)]
    pub workdirs: Option<Vec<PathBuf>>,

    #[serde(default)]
    pub workdir_prefix: Option<String>,

    /// Command prefix used to remove directories with elevated rights,
    /// e.g. `["sudo", "rm", "-rf"]`.
    #[serde(default)]
    pub privileged_remove: Vec<String>,
}

fn default_marker_key() -> String {
    ReservedKeyStrategy::default().marker_key
}

fn default_id_key() -> String {
    ReservedKeyStrategy::default().id_key
}

fn default_flag() -> String {
    ReservedKeyStrategy::default().flag
}

fn default_conditional_flags() -> Vec<(String, String)> {
    ReservedKeyStrategy::default().conditional_flags
}

fn default_rerun_key() -> Option<String> {
    ReservedKeyStrategy::default().rerun_key
}

impl Default for ReservedKeysConfig {
    fn default() -> Self {
        Self {
            marker_key: default_marker_key(),
            id_key: default_id_key(),
            flag: default_flag(),
            conditional_flags: default_conditional_flags(),
            rerun_key: default_rerun_key(),
            workdir_root: None,
            workdirs: None,
            workdir_prefix: None,
            privileged_remove: Vec::new(),
        }
    }
}

impl ReservedKeysConfig {
    /// Build the strategy, wiring a [`RemoveWorkdirs`] hook when a
    /// `workdir_root` is configured.
    pub fn to_strategy(&self) -> ReservedKeyStrategy {
        let mut strategy = ReservedKeyStrategy {
            marker_key: self.marker_key.clone(),
            id_key: self.id_key.clone(),
            flag: self.flag.clone(),
            conditional_flags: self.conditional_flags.clone(),
            rerun_key: self.rerun_key.clone(),
            ..ReservedKeyStrategy::default()
        };

        if let Some(root) = &self.workdir_root {
            let mut hook = RemoveWorkdirs::new(root);
            if let Some(dirs) = &self.workdirs {
                hook.dirs = dirs.clone();
            }
            if let Some(prefix) = &self.workdir_prefix {
                hook.prefix = prefix.clone();
            }
            hook.privileged_command = self.privileged_remove.clone();
            strategy = strategy.with_hook(Arc::new(hook));
        }

        strategy
    }
}

/// `[task.<name>]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TaskConfig {
    /// Command template.
    pub command: String,

    /// Environment variables passed through from the worker.
    #[serde(default)]
    pub env_vars: Vec<String>,

    /// Option naming the JSON arguments file. Unset means inline delivery.
    #[serde(default)]
    pub json_file_option: Option<String>,

    /// Never pass arguments to this task.
    #[serde(default)]
    pub no_args: bool,
}

/// Validated configuration.
///
/// Only constructed through `TryFrom<RawConfigFile>` or
/// [`ConfigFile::from_raw`], which apply environment fallbacks and check
/// every task.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub logs_directory: Option<PathBuf>,
    pub temp_directory: Option<PathBuf>,
    pub archive: ArchiveSettings,
    pub archive_root: Option<PathBuf>,
    pub reserved_keys: Option<ReservedKeysConfig>,
    pub tasks: BTreeMap<String, TaskDefinition>,
}
