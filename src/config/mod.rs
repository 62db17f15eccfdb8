// src/config/mod.rs

//! Configuration loading and validation for taskdispatch.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Validate tasks and apply environment fallbacks (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{load_and_validate, load_from_path, load_or_default};
pub use model::{
    ArchiveSection, ConfigFile, InlineSection, RawConfigFile, ReservedKeysConfig, TaskConfig,
    WorkerSection,
};
pub use validate::{LOGS_DIRECTORY_VAR, TEMP_DIRECTORY_VAR};
