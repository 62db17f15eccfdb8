// src/types.rs

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::errors::{DispatchError, Result};

/// Structured argument payload handed to a task.
pub type ArgumentPayload = serde_json::Map<String, serde_json::Value>;

/// Variable name → value mapping handed to a child process as its whole
/// environment.
pub type ResolvedEnvironment = BTreeMap<String, String>;

/// Fully assembled argv for one job.
pub type CommandVector = Vec<String>;

/// Opaque identifier correlating one execution with its logs, temp files and
/// environment.
///
/// The id is supplied by the caller and is used verbatim in file names, so
/// it must be non-empty and free of path separators.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobId(String);

impl JobId {
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(DispatchError::InvalidJobId("job id must not be empty".to_string()));
        }
        if id == "." || id == ".." || id.contains('/') || id.contains('\\') || id.contains('\0') {
            return Err(DispatchError::InvalidJobId(format!(
                "job id '{id}' must not contain path components"
            )));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for JobId {
    type Err = DispatchError;

    fn from_str(s: &str) -> Result<Self> {
        JobId::new(s)
    }
}

/// How argument data reaches the launched process.
///
/// - `JsonFile`: arguments are written to a JSON file whose path follows
///   `option` on the command line.
/// - `Inline`: arguments are appended to the command line, by default as a
///   single JSON token.
/// - `None`: arguments are never passed.
///
/// Whatever the mode, an empty payload appends nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum DeliveryMode {
    JsonFile { option: String },
    #[default]
    Inline,
    None,
}

impl DeliveryMode {
    /// Map the nullable "JSON file option" flag carried by a job request.
    pub fn from_flag(flag: Option<&str>) -> Self {
        match flag {
            Some(option) if !option.is_empty() => DeliveryMode::JsonFile {
                option: option.to_string(),
            },
            _ => DeliveryMode::Inline,
        }
    }
}

/// Everything needed to run one kind of task, independent of a single job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskDefinition {
    /// Names of the environment variables the task may read from the worker.
    pub env_vars: Vec<String>,
    /// Command template; may contain `$VAR` / `${VAR}` placeholders.
    pub command: String,
    pub delivery: DeliveryMode,
}

impl TaskDefinition {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            env_vars: Vec::new(),
            command: command.into(),
            delivery: DeliveryMode::default(),
        }
    }

    pub fn with_env_vars<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.env_vars = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_delivery(mut self, delivery: DeliveryMode) -> Self {
        self.delivery = delivery;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_id_rejects_path_components() {
        assert!(JobId::new("").is_err());
        assert!(JobId::new("..").is_err());
        assert!(JobId::new("a/b").is_err());
        assert!(JobId::new("a\\b").is_err());
        assert_eq!(JobId::new("3f2a-77").unwrap().as_str(), "3f2a-77");
    }

    #[test]
    fn delivery_mode_from_flag() {
        assert_eq!(
            DeliveryMode::from_flag(Some("--args-file")),
            DeliveryMode::JsonFile {
                option: "--args-file".to_string()
            }
        );
        assert_eq!(DeliveryMode::from_flag(None), DeliveryMode::Inline);
        assert_eq!(DeliveryMode::from_flag(Some("")), DeliveryMode::Inline);
        assert_eq!(DeliveryMode::default(), DeliveryMode::Inline);
    }
}
