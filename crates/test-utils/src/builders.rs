#![allow(dead_code)]

use std::path::{Path, PathBuf};

use serde_json::Value;
use taskdispatch::JobRequest;
use taskdispatch::config::{ConfigFile, RawConfigFile, TaskConfig};
use taskdispatch::env::MapEnv;
use taskdispatch::types::ArgumentPayload;

/// Turn a `json!({...})` literal into an argument payload.
///
/// Panics if `value` is not an object.
pub fn payload(value: Value) -> ArgumentPayload {
    match value {
        Value::Object(map) => map,
        other => panic!("argument payload must be a JSON object, got {other}"),
    }
}

/// Minimal worker environment: a usable `PATH` and nothing else.
pub fn worker_env() -> MapEnv {
    MapEnv::new().with("PATH", "/usr/local/bin:/usr/bin:/bin")
}

/// Builder for `JobRequest` to simplify test setup.
pub struct JobRequestBuilder {
    request: JobRequest,
}

impl JobRequestBuilder {
    pub fn new(job_id: &str, command_template: &str) -> Self {
        Self {
            request: JobRequest {
                job_id: job_id.to_string(),
                command_template: command_template.to_string(),
                ..Default::default()
            },
        }
    }

    pub fn env_var(mut self, name: &str) -> Self {
        self.request.permitted_env_names.push(name.to_string());
        self
    }

    pub fn args(mut self, value: Value) -> Self {
        self.request.args = payload(value);
        self
    }

    pub fn json_file_option(mut self, option: &str) -> Self {
        self.request.delivery_mode_flag = Some(option.to_string());
        self
    }

    pub fn build(self) -> JobRequest {
        self.request
    }
}

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile::default(),
        }
    }

    /// Point both worker directories below `root`.
    pub fn with_worker_root(mut self, root: &Path) -> Self {
        self.config.worker.logs_directory = Some(root.join("logs"));
        self.config.worker.temp_directory = Some(root.join("tmp"));
        self
    }

    pub fn with_archive_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.config.archive.root = Some(root.into());
        self
    }

    pub fn with_task(mut self, name: &str, task: TaskConfig) -> Self {
        self.config.task.insert(name.to_string(), task);
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    /// Validate against an empty environment.
    pub fn build(self) -> ConfigFile {
        ConfigFile::from_raw(self.config, &MapEnv::new())
            .expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `TaskConfig`.
pub struct TaskConfigBuilder {
    task: TaskConfig,
}

impl TaskConfigBuilder {
    pub fn new(command: &str) -> Self {
        Self {
            task: TaskConfig {
                command: command.to_string(),
                env_vars: Vec::new(),
                json_file_option: None,
                no_args: false,
            },
        }
    }

    pub fn env_var(mut self, name: &str) -> Self {
        self.task.env_vars.push(name.to_string());
        self
    }

    pub fn json_file_option(mut self, option: &str) -> Self {
        self.task.json_file_option = Some(option.to_string());
        self
    }

    pub fn no_args(mut self) -> Self {
        self.task.no_args = true;
        self
    }

    pub fn build(self) -> TaskConfig {
        self.task
    }
}
