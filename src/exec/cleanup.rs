// src/exec/cleanup.rs

//! Scoped ownership of the temp files written for one job.
//!
//! [`TempArtifacts`] removes every registered path when it is dropped. The
//! dispatcher keeps it alive across encode-then-run, so the files disappear
//! whether the job succeeds, fails, panics, or the dispatch future itself is
//! dropped part-way through.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

/// The set of transient files created for one job.
#[derive(Debug, Default)]
pub struct TempArtifacts {
    paths: Vec<PathBuf>,
}

impl TempArtifacts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of `path`; it will be removed when `self` is dropped.
    pub fn register(&mut self, path: impl Into<PathBuf>) {
        self.paths.push(path.into());
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    /// Remove every registered path now. Safe to call more than once.
    pub fn remove_all(&mut self) {
        for path in self.paths.drain(..) {
            remove_artifact(&path);
        }
    }
}

impl Drop for TempArtifacts {
    fn drop(&mut self) {
        self.remove_all();
    }
}

/// Remove one temp file, logging instead of failing.
///
/// Returns `true` when the file was removed by this call. A file that is
/// already gone or cannot be removed only produces a warning, so cleanup
/// never masks the outcome of the job itself.
pub fn remove_artifact(path: &Path) -> bool {
    match std::fs::remove_file(path) {
        Ok(()) => {
            debug!(path = %path.display(), "removed temp artifact");
            true
        }
        Err(e) if e.kind() == ErrorKind::NotFound => {
            warn!(path = %path.display(), "cleanup warning: temp artifact already removed");
            false
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "cleanup warning: failed to remove temp artifact");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drop_removes_registered_files() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.json");
        let b = dir.path().join("b.json");
        std::fs::write(&a, "{}").unwrap();
        std::fs::write(&b, "{}").unwrap();

        {
            let mut artifacts = TempArtifacts::new();
            artifacts.register(&a);
            artifacts.register(&b);
            assert_eq!(artifacts.len(), 2);
        }

        assert!(!a.exists());
        assert!(!b.exists());
    }

    #[test]
    fn removal_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("args.json");
        std::fs::write(&path, "{}").unwrap();

        assert!(remove_artifact(&path));
        assert!(!remove_artifact(&path));
        assert!(!path.exists());
    }

    #[test]
    fn remove_all_then_drop_does_not_touch_files_twice() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("args.json");
        std::fs::write(&path, "{}").unwrap();

        let mut artifacts = TempArtifacts::new();
        artifacts.register(&path);
        artifacts.remove_all();
        assert!(artifacts.is_empty());
        assert!(!path.exists());
        drop(artifacts);
    }

    #[test]
    fn files_are_removed_when_a_panic_unwinds() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("args.json");
        std::fs::write(&path, "{}").unwrap();

        let guarded = path.clone();
        let result = std::panic::catch_unwind(move || {
            let mut artifacts = TempArtifacts::new();
            artifacts.register(guarded);
            panic!("runner blew up");
        });

        assert!(result.is_err());
        assert!(!path.exists());
    }
}
