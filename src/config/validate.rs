// src/config/validate.rs

use std::collections::BTreeMap;

use crate::archive::ArchiveSettings;
use crate::config::model::{ConfigFile, RawConfigFile, TaskConfig};
use crate::env::{AmbientEnv, EnvSource};
use crate::errors::{DispatchError, Result};
use crate::types::{DeliveryMode, TaskDefinition};

pub const LOGS_DIRECTORY_VAR: &str = "WORKER_LOGS_DIRECTORY";
pub const TEMP_DIRECTORY_VAR: &str = "WORKER_TEMP_DIRECTORY";

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = DispatchError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        ConfigFile::from_raw(raw, &AmbientEnv)
    }
}

impl ConfigFile {
    /// Validate `raw`, filling unset directories and archive credentials
    /// from `env`.
    pub fn from_raw(raw: RawConfigFile, env: &dyn EnvSource) -> Result<Self> {
        validate_reserved_keys(&raw)?;
        let tasks = build_tasks(&raw.task)?;

        let logs_directory = raw
            .worker
            .logs_directory
            .or_else(|| env.var(LOGS_DIRECTORY_VAR).map(Into::into));
        let temp_directory = raw
            .worker
            .temp_directory
            .or_else(|| env.var(TEMP_DIRECTORY_VAR).map(Into::into));

        let archive = ArchiveSettings {
            account_name: raw.archive.account_name,
            account_key: raw.archive.account_key,
            container: raw.archive.container,
        }
        .or(ArchiveSettings::from_env(env));

        Ok(ConfigFile {
            logs_directory,
            temp_directory,
            archive,
            archive_root: raw.archive.root,
            reserved_keys: raw.inline.reserved_keys,
            tasks,
        })
    }
}

fn build_tasks(raw: &BTreeMap<String, TaskConfig>) -> Result<BTreeMap<String, TaskDefinition>> {
    raw.iter()
        .map(|(name, task)| -> Result<(String, TaskDefinition)> {
            validate_task(name, task)?;
            Ok((name.clone(), task_definition(task)))
        })
        .collect()
}

fn task_definition(task: &TaskConfig) -> TaskDefinition {
    let delivery = if task.no_args {
        DeliveryMode::None
    } else {
        DeliveryMode::from_flag(task.json_file_option.as_deref())
    };

    TaskDefinition::new(task.command.clone())
        .with_env_vars(task.env_vars.iter().cloned())
        .with_delivery(delivery)
}

fn validate_task(name: &str, task: &TaskConfig) -> Result<()> {
    if task.command.trim().is_empty() {
        return Err(DispatchError::ConfigError(format!(
            "task '{name}' has an empty command"
        )));
    }

    if let Err(e) = shell_words::split(&task.command) {
        return Err(DispatchError::ConfigError(format!(
            "task '{name}' command cannot be tokenized: {e}"
        )));
    }

    for var in &task.env_vars {
        if !is_valid_env_name(var) {
            return Err(DispatchError::ConfigError(format!(
                "task '{name}' lists invalid environment variable name {var:?}"
            )));
        }
    }

    if task.no_args && task.json_file_option.is_some() {
        return Err(DispatchError::ConfigError(format!(
            "task '{name}' sets both `no_args` and `json_file_option`"
        )));
    }

    if task.json_file_option.as_deref() == Some("") {
        return Err(DispatchError::ConfigError(format!(
            "task '{name}' has an empty `json_file_option`"
        )));
    }

    Ok(())
}

fn validate_reserved_keys(raw: &RawConfigFile) -> Result<()> {
    let Some(cfg) = &raw.inline.reserved_keys else {
        return Ok(());
    };

    if cfg.marker_key.is_empty() || cfg.id_key.is_empty() {
        return Err(DispatchError::ConfigError(
            "[inline.reserved_keys] marker_key and id_key must not be empty".to_string(),
        ));
    }

    if let Some(dirs) = &cfg.workdirs {
        if dirs.iter().any(|d| d.is_absolute()) {
            return Err(DispatchError::ConfigError(
                "[inline.reserved_keys] workdirs must be relative to workdir_root".to_string(),
            ));
        }
    }

    Ok(())
}

fn is_valid_env_name(name: &str) -> bool {
    !name.is_empty() && !name.contains('=') && !name.contains('\0')
}
