// src/env/resolver.rs

//! Builds the isolated environment handed to a job's process.

use tracing::debug;

use crate::env::EnvSource;
use crate::errors::{DispatchError, Result};
use crate::types::{JobId, ResolvedEnvironment};

/// Variable always set to the job id in the child environment.
pub const JOB_UUID_VAR: &str = "JOB_UUID";

/// Search-path variable inherited from the worker when present.
pub const PATH_VAR: &str = "PATH";

/// Resolve the allowlisted variables from `source` into a fresh mapping.
///
/// Fails on the first permitted name that is absent; no partially resolved
/// environment escapes. `JOB_UUID` is injected unconditionally and `PATH`
/// is copied over when the source has it.
pub fn resolve(
    source: &dyn EnvSource,
    permitted_names: &[String],
    job_id: &JobId,
) -> Result<ResolvedEnvironment> {
    let mut environment = ResolvedEnvironment::new();

    for name in permitted_names {
        let value = source
            .var(name)
            .ok_or_else(|| DispatchError::MissingEnvironmentVariable(name.clone()))?;
        environment.insert(name.clone(), value);
    }

    environment.insert(JOB_UUID_VAR.to_string(), job_id.to_string());

    match source.var(PATH_VAR) {
        Some(path) => {
            environment.insert(PATH_VAR.to_string(), path);
        }
        None => debug!(job_id = %job_id, "no PATH in worker environment; child runs without one"),
    }

    debug!(
        job_id = %job_id,
        vars = ?environment.keys().collect::<Vec<_>>(),
        "resolved job environment"
    );

    Ok(environment)
}
