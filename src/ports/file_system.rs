use std::{
    path::{Path, PathBuf},
    time::SystemTime,
};

use thiserror::Error;

/// Error type for file system operations
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum FileSystemError {
    /// Error when encountering an IO issue
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Error when path is invalid
    #[error("Invalid path: {0}")]
    InvalidPath(String),
}

/// Result type for file system operations
pub type FileSystemResult<T> = Result<T, FileSystemError>;

/// A configuration file candidate and its last modification time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub path: PathBuf,
    pub modified: SystemTime,
}

/// FileSystem defines the port for reading route configuration files.
///
/// Calls are blocking; the reload path runs them off the async workers.
pub trait FileSystem: Send + Sync + 'static {
    /// List the regular files of `directory` whose extension is `extension`
    ///
    /// # Arguments
    /// * `directory` - The directory to list (not recursive)
    /// * `extension` - File extension without the leading dot
    fn list_files(&self, directory: &Path, extension: &str) -> FileSystemResult<Vec<FileEntry>>;

    /// Read a whole file
    fn read_file(&self, path: &Path) -> FileSystemResult<Vec<u8>>;

    /// Whether `path` currently names a readable file.
    fn exists(&self, path: &Path) -> bool {
        self.read_file(path).is_ok()
    }
}

/// Lower-case slug of a file stem (`"01 API Routes.json"` becomes `"01-api-routes"`).
pub fn slug_from_path(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut slug = String::with_capacity(stem.len());
    for c in stem.chars() {
        if c.is_alphanumeric() {
            slug.extend(c.to_lowercase());
        } else if !slug.ends_with('-') && !slug.is_empty() {
            slug.push('-');
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}
