#![allow(dead_code)]

pub use taskdispatch_test_utils::{builders, init_tracing, recording_hook, with_timeout};

use std::path::{Path, PathBuf};

/// Scratch worker layout: `{root}/logs` and an existing `{root}/tmp`.
pub struct WorkerDirs {
    pub root: tempfile::TempDir,
}

impl WorkerDirs {
    pub fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(root.path().join("tmp")).unwrap();
        Self { root }
    }

    pub fn logs(&self) -> PathBuf {
        self.root.path().join("logs")
    }

    pub fn tmp(&self) -> PathBuf {
        self.root.path().join("tmp")
    }

    pub fn stdout_of(&self, job_id: &str) -> String {
        read(&self.logs().join(job_id).join(format!("{job_id}-stdout.txt")))
    }

    pub fn stderr_of(&self, job_id: &str) -> String {
        read(&self.logs().join(job_id).join(format!("{job_id}-stderr.txt")))
    }

    pub fn temp_files(&self) -> Vec<PathBuf> {
        std::fs::read_dir(self.tmp())
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect()
    }
}

fn read(path: &Path) -> String {
    std::fs::read_to_string(path).unwrap_or_else(|e| panic!("reading {path:?}: {e}"))
}
