// src/fs/mock.rs

use super::FileSystem;
use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

#[derive(Debug, Clone)]
pub enum MockEntry {
    File { content: Vec<u8>, modified: SystemTime },
    Dir(Vec<String>), // List of child names
}

/// In-memory filesystem for tests.
#[derive(Debug, Clone, Default)]
pub struct MockFileSystem {
    files: Arc<Mutex<HashMap<PathBuf, MockEntry>>>,
}

impl MockFileSystem {
    pub fn new() -> Self {
        let mut files = HashMap::new();
        files.insert(PathBuf::from("."), MockEntry::Dir(Vec::new()));

        Self {
            files: Arc::new(Mutex::new(files)),
        }
    }

    pub fn add_file(&self, path: impl AsRef<Path>, content: impl Into<Vec<u8>>) {
        self.add_file_modified_at(path, content, SystemTime::now());
    }

    pub fn add_file_modified_at(
        &self,
        path: impl AsRef<Path>,
        content: impl Into<Vec<u8>>,
        modified: SystemTime,
    ) {
        let path = path.as_ref().to_path_buf();
        let mut files = self.files.lock().unwrap();
        files.insert(
            path.clone(),
            MockEntry::File {
                content: content.into(),
                modified,
            },
        );

        // Parent directories exist implicitly.
        if let Some(parent) = path.parent() {
            let parent = if parent.as_os_str().is_empty() {
                Path::new(".")
            } else {
                parent
            };

            ensure_dir_entry(&mut files, parent);
            add_child(&mut files, parent, &path);
        }
    }
}

fn add_child(files: &mut HashMap<PathBuf, MockEntry>, parent: &Path, child: &Path) {
    if let Some(MockEntry::Dir(children)) = files.get_mut(parent) {
        if let Some(name) = child.file_name().and_then(|n| n.to_str()) {
            if !children.iter().any(|c| c == name) {
                children.push(name.to_string());
            }
        }
    }
}

fn ensure_dir_entry(files: &mut HashMap<PathBuf, MockEntry>, path: &Path) {
    if files.contains_key(path) {
        return;
    }
    files.insert(path.to_path_buf(), MockEntry::Dir(Vec::new()));

    if let Some(parent) = path.parent() {
        let parent = if parent.as_os_str().is_empty() {
            Path::new(".")
        } else {
            parent
        };

        if parent != path {
            ensure_dir_entry(files, parent);
            add_child(files, parent, path);
        }
    }
}

impl FileSystem for MockFileSystem {
    fn read_to_string(&self, path: &Path) -> Result<String> {
        let files = self.files.lock().unwrap();
        match files.get(path) {
            Some(MockEntry::File { content, .. }) => {
                String::from_utf8(content.clone()).map_err(|e| anyhow!("Invalid UTF-8: {}", e))
            }
            Some(MockEntry::Dir(_)) => Err(anyhow!("Is a directory: {:?}", path)),
            None => Err(anyhow!("File not found: {:?}", path)),
        }
    }

    fn exists(&self, path: &Path) -> bool {
        let files = self.files.lock().unwrap();
        files.contains_key(path)
    }

    fn is_dir(&self, path: &Path) -> bool {
        let files = self.files.lock().unwrap();
        matches!(files.get(path), Some(MockEntry::Dir(_)))
    }

    fn modified(&self, path: &Path) -> Result<SystemTime> {
        let files = self.files.lock().unwrap();
        match files.get(path) {
            Some(MockEntry::File { modified, .. }) => Ok(*modified),
            Some(MockEntry::Dir(_)) => Err(anyhow!("Is a directory: {:?}", path)),
            None => Err(anyhow!("File not found: {:?}", path)),
        }
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>> {
        let files = self.files.lock().unwrap();
        match files.get(path) {
            Some(MockEntry::Dir(children)) => {
                let mut entries: Vec<PathBuf> = children.iter().map(|name| path.join(name)).collect();
                entries.sort();
                Ok(entries)
            }
            _ => Err(anyhow!("Not a directory or not found: {:?}", path)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_files_create_parent_entries() {
        let fs = MockFileSystem::new();
        fs.add_file("/archive/job-1/job-1-stdout.txt", "out");

        assert!(fs.is_dir(Path::new("/archive")));
        assert!(fs.is_dir(Path::new("/archive/job-1")));
        assert_eq!(
            fs.read_dir(Path::new("/archive")).unwrap(),
            vec![PathBuf::from("/archive/job-1")]
        );
        assert_eq!(
            fs.read_to_string(Path::new("/archive/job-1/job-1-stdout.txt")).unwrap(),
            "out"
        );
    }
}
