//! Snapshot-based change detection for a directory of route files.
use std::{
    collections::{BTreeSet, HashMap},
    path::{Path, PathBuf},
    sync::Arc,
    time::SystemTime,
};

use crate::ports::file_system::{FileEntry, FileSystem};

/// Files added, modified and removed since the previous scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileChangeSet {
    pub added: BTreeSet<PathBuf>,
    pub modified: BTreeSet<PathBuf>,
    pub removed: BTreeSet<PathBuf>,
}

impl FileChangeSet {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.removed.is_empty()
    }

    /// Total number of changed files.
    pub fn len(&self) -> usize {
        self.added.len() + self.modified.len() + self.removed.len()
    }
}

/// Detects added, modified and removed files of one directory by comparing
/// modification times against the snapshot taken by the previous scan.
///
/// `scan` takes `&mut self`; callers sharing a monitor serialize through a lock.
pub struct DirectoryMonitor {
    directory: PathBuf,
    extension: String,
    file_system: Arc<dyn FileSystem>,
    snapshot: HashMap<PathBuf, SystemTime>,
}

impl DirectoryMonitor {
    pub fn new(
        directory: impl Into<PathBuf>,
        extension: impl Into<String>,
        file_system: Arc<dyn FileSystem>,
    ) -> Self {
        Self {
            directory: directory.into(),
            extension: extension.into(),
            file_system,
            snapshot: HashMap::new(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// Files known after the last scan and their recorded modification time.
    pub fn snapshot(&self) -> &HashMap<PathBuf, SystemTime> {
        &self.snapshot
    }

    /// Compare the directory with the snapshot and record the new state.
    ///
    /// A missing or unreadable directory yields an empty change set and leaves
    /// the snapshot untouched.
    pub fn scan(&mut self) -> FileChangeSet {
        let entries = match self
            .file_system
            .list_files(&self.directory, &self.extension)
        {
            Ok(entries) => entries,
            Err(error) => {
                tracing::warn!(
                    directory = %self.directory.display(),
                    %error,
                    "Unable to list route directory, skipping this scan"
                );
                return FileChangeSet::default();
            }
        };

        let mut changes = FileChangeSet::default();
        let mut current: HashMap<PathBuf, SystemTime> = HashMap::with_capacity(entries.len());
        for FileEntry { path, modified } in entries {
            match self.snapshot.get(&path) {
                None => {
                    changes.added.insert(path.clone());
                }
                Some(previous) if *previous != modified => {
                    changes.modified.insert(path.clone());
                }
                Some(_) => {}
            }
            current.insert(path, modified);
        }
        changes.removed = self
            .snapshot
            .keys()
            .filter(|path| !current.contains_key(*path))
            .cloned()
            .collect();

        self.snapshot = current;
        if !changes.is_empty() {
            tracing::debug!(
                directory = %self.directory.display(),
                added = changes.added.len(),
                modified = changes.modified.len(),
                removed = changes.removed.len(),
                "Detected route file changes"
            );
        }
        changes
    }
}
