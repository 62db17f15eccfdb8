// src/env/mod.rs

//! Read-only access to environment variables.
//!
//! The dispatcher never writes to the process environment. Everything that
//! needs to read it goes through an [`EnvSource`], so tests and embedders
//! can supply an in-memory map instead of the real environment.

use std::collections::HashMap;
use std::fmt::Debug;

pub mod resolver;

pub use resolver::{resolve, JOB_UUID_VAR, PATH_VAR};

/// Abstract view of an environment.
pub trait EnvSource: Send + Sync + Debug {
    /// Value of `name`, or `None` if unset or not valid unicode.
    fn var(&self, name: &str) -> Option<String>;
}

/// The environment of the current process.
#[derive(Debug, Clone, Copy, Default)]
pub struct AmbientEnv;

impl EnvSource for AmbientEnv {
    fn var(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

/// A fixed in-memory environment.
#[derive(Debug, Clone, Default)]
pub struct MapEnv {
    vars: HashMap<String, String>,
}

impl MapEnv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(name.into(), value.into());
        self
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(name.into(), value.into());
    }
}

impl<K, V> FromIterator<(K, V)> for MapEnv
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            vars: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

impl EnvSource for MapEnv {
    fn var(&self, name: &str) -> Option<String> {
        self.vars.get(name).cloned()
    }
}

/// Any source layered over another, `overrides` taking precedence.
#[derive(Debug)]
pub struct Layered<'a> {
    overrides: &'a MapEnv,
    base: &'a dyn EnvSource,
}

impl<'a> Layered<'a> {
    pub fn new(overrides: &'a MapEnv, base: &'a dyn EnvSource) -> Self {
        Self { overrides, base }
    }
}

impl EnvSource for Layered<'_> {
    fn var(&self, name: &str) -> Option<String> {
        self.overrides.var(name).or_else(|| self.base.var(name))
    }
}
