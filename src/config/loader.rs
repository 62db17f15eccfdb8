// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::env::EnvSource;
use crate::errors::Result;

/// Load a configuration file from a given path and return the raw `RawConfigFile`.
///
/// This only performs TOML deserialization; it does **not** apply
/// environment fallbacks or validate tasks. Use [`load_and_validate`] for
/// that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let config: RawConfigFile = toml::from_str(&contents)?;

    Ok(config)
}

/// Load a configuration file from path and validate it against `env`.
///
/// - Reads TOML.
/// - Applies defaults (handled by `serde` + `Default` impls).
/// - Fills worker directories and archive credentials from `env` where the
///   file leaves them unset.
/// - Checks every task's command and environment allowlist.
pub fn load_and_validate(path: impl AsRef<Path>, env: &dyn EnvSource) -> Result<ConfigFile> {
    let raw_config = load_from_path(&path)?;
    ConfigFile::from_raw(raw_config, env)
}

/// Load `path` if given, else the default config file if it exists, else
/// an empty configuration backed only by the environment.
pub fn load_or_default(path: Option<&Path>, env: &dyn EnvSource) -> Result<ConfigFile> {
    if let Some(path) = path {
        return load_and_validate(path, env);
    }

    let default_path = default_config_path();
    if default_path.is_file() {
        debug!(path = %default_path.display(), "using default config file");
        return load_and_validate(&default_path, env);
    }

    debug!("no config file; using environment only");
    ConfigFile::from_raw(RawConfigFile::default(), env)
}

/// Default config path: `Taskdispatch.toml` in the current working
/// directory.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("Taskdispatch.toml")
}
