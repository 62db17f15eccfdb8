// src/archive/store.rs

//! Blob storage backends for archived job logs.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use anyhow::{Context, anyhow};
use chrono::{DateTime, Utc};

use crate::errors::Result;
use crate::fs::FileSystem;

pub type BlobFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// One stored object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobInfo {
    /// Full `/`-separated name within the container.
    pub name: String,
    pub last_modified: DateTime<Utc>,
}

/// Trait abstracting the remote object store holding archived logs.
///
/// Production deployments point this at whatever store the workers upload
/// to; tests use [`DirectoryBlobStore`] over a mock filesystem.
pub trait BlobStore: Send + Sync {
    /// All blobs whose name starts with `prefix`, sorted by name.
    fn list_blobs<'a>(&'a self, prefix: &'a str) -> BlobFuture<'a, Vec<BlobInfo>>;

    /// Contents of one blob decoded as UTF-8.
    fn download_text<'a>(&'a self, name: &'a str) -> BlobFuture<'a, String>;
}

/// A container mirrored as a directory tree: blob `a/b.txt` is the file
/// `{root}/a/b.txt`.
#[derive(Debug, Clone)]
pub struct DirectoryBlobStore<F> {
    root: PathBuf,
    fs: F,
}

impl<F: FileSystem> DirectoryBlobStore<F> {
    pub fn new(root: impl Into<PathBuf>, fs: F) -> Self {
        Self {
            root: root.into(),
            fs,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn collect(&self, dir: &Path, out: &mut Vec<PathBuf>) -> anyhow::Result<()> {
        for entry in self.fs.read_dir(dir)? {
            if self.fs.is_dir(&entry) {
                self.collect(&entry, out)?;
            } else {
                out.push(entry);
            }
        }
        Ok(())
    }

    fn blob_name(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.root).ok()?;
        let parts: Vec<&str> = relative
            .components()
            .map(|c| c.as_os_str().to_str())
            .collect::<Option<_>>()?;
        Some(parts.join("/"))
    }

    fn list_sync(&self, prefix: &str) -> anyhow::Result<Vec<BlobInfo>> {
        if !self.fs.exists(&self.root) {
            return Ok(Vec::new());
        }

        let mut files = Vec::new();
        self.collect(&self.root, &mut files)?;

        let mut blobs = Vec::new();
        for path in files {
            let Some(name) = self.blob_name(&path) else {
                continue;
            };
            if !name.starts_with(prefix) {
                continue;
            }
            let modified = self.fs.modified(&path)?;
            blobs.push(BlobInfo {
                name,
                last_modified: DateTime::<Utc>::from(modified),
            });
        }
        blobs.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(blobs)
    }

    fn download_sync(&self, name: &str) -> anyhow::Result<String> {
        if name.split('/').any(|part| part == ".." || part.is_empty()) {
            return Err(anyhow!("invalid blob name {name:?}"));
        }
        let path = name.split('/').fold(self.root.clone(), |acc, part| acc.join(part));
        self.fs
            .read_to_string(&path)
            .with_context(|| format!("downloading blob {name:?}"))
    }
}

impl<F: FileSystem> BlobStore for DirectoryBlobStore<F> {
    fn list_blobs<'a>(&'a self, prefix: &'a str) -> BlobFuture<'a, Vec<BlobInfo>> {
        Box::pin(async move { Ok(self.list_sync(prefix)?) })
    }

    fn download_text<'a>(&'a self, name: &'a str) -> BlobFuture<'a, String> {
        Box::pin(async move { Ok(self.download_sync(name)?) })
    }
}
