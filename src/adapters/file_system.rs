use std::{fs, path::Path};

use crate::ports::file_system::{FileEntry, FileSystem, FileSystemError, FileSystemResult};

/// File system adapter reading route files from the local disk
#[derive(Debug, Default, Clone)]
pub struct LocalFileSystem;

impl LocalFileSystem {
    pub fn new() -> Self {
        Self
    }
}

impl FileSystem for LocalFileSystem {
    fn list_files(&self, directory: &Path, extension: &str) -> FileSystemResult<Vec<FileEntry>> {
        let mut entries = Vec::new();
        for entry in fs::read_dir(directory)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(extension) {
                continue;
            }
            // Files can vanish between listing and stat; skip them this round.
            let metadata = match entry.metadata() {
                Ok(metadata) => metadata,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(FileSystemError::IoError(e)),
            };
            if !metadata.is_file() {
                continue;
            }
            entries.push(FileEntry {
                path,
                modified: metadata.modified()?,
            });
        }
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(entries)
    }

    fn read_file(&self, path: &Path) -> FileSystemResult<Vec<u8>> {
        if path.file_name().is_none() {
            return Err(FileSystemError::InvalidPath(path.display().to_string()));
        }
        Ok(fs::read(path)?)
    }

    fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn create_test_file(dir: &TempDir, path: &str, content: &str) -> std::io::Result<()> {
        let full_path = dir.path().join(path);
        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(full_path, content)
    }

    #[test]
    fn test_list_files_filters_by_extension() {
        let temp_dir = TempDir::new().unwrap();
        create_test_file(&temp_dir, "b.json", "{}").unwrap();
        create_test_file(&temp_dir, "a.json", "{}").unwrap();
        create_test_file(&temp_dir, "notes.txt", "ignored").unwrap();
        create_test_file(&temp_dir, "nested.json/inner.json", "{}").unwrap();

        let fs = LocalFileSystem::new();
        let entries = fs.list_files(temp_dir.path(), "json").unwrap();
        let names: Vec<_> = entries
            .iter()
            .map(|e| e.path.file_name().unwrap().to_str().unwrap().to_string())
            .collect();

        assert_eq!(names, vec!["a.json", "b.json"]);
    }

    #[test]
    fn test_list_missing_directory_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let fs = LocalFileSystem::new();
        let result = fs.list_files(&temp_dir.path().join("absent"), "json");
        assert!(matches!(result, Err(FileSystemError::IoError(_))));
    }

    #[test]
    fn test_read_file() {
        let temp_dir = TempDir::new().unwrap();
        create_test_file(&temp_dir, "route.json", "{\"handler\": \"x\"}").unwrap();

        let fs = LocalFileSystem::new();
        let content = fs.read_file(&temp_dir.path().join("route.json")).unwrap();
        assert_eq!(content, b"{\"handler\": \"x\"}");
    }

    #[test]
    fn test_exists_only_for_regular_files() {
        let temp_dir = TempDir::new().unwrap();
        create_test_file(&temp_dir, "route.json", "{}").unwrap();

        let fs = LocalFileSystem::new();
        assert!(fs.exists(&temp_dir.path().join("route.json")));
        assert!(!fs.exists(&temp_dir.path().join("gone.json")));
        assert!(!fs.exists(temp_dir.path()));
    }
}
