//! Native filesystem implementation using tokio::fs.

use async_trait::async_trait;
use mirror_core::fs::{FileEntry, FileSystem, FsError, Result};
use std::io::ErrorKind;
use std::path::PathBuf;
use tokio::fs;

/// Native filesystem rooted at the cloned working tree
pub struct NativeFs {
    base_path: PathBuf,
}

impl NativeFs {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn full_path(&self, path: &str) -> PathBuf {
        if path.is_empty() {
            self.base_path.clone()
        } else {
            self.base_path.join(path)
        }
    }
}

fn io_error(path: &str, e: std::io::Error) -> FsError {
    match e.kind() {
        ErrorKind::NotFound => FsError::NotFound(path.to_string()),
        _ => FsError::Io(format!("{}: {}", path, e)),
    }
}

#[async_trait]
impl FileSystem for NativeFs {
    async fn read(&self, path: &str) -> Result<Vec<u8>> {
        let full_path = self.full_path(path);
        fs::read(&full_path).await.map_err(|e| io_error(path, e))
    }

    async fn write(&self, path: &str, content: &[u8]) -> Result<()> {
        let full_path = self.full_path(path);

        // Create parent directories if needed
        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| io_error(path, e))?;
        }

        fs::write(&full_path, content)
            .await
            .map_err(|e| io_error(path, e))
    }

    async fn list(&self, path: &str) -> Result<Vec<FileEntry>> {
        let full_path = self.full_path(path);
        let mut entries = Vec::new();

        let mut dir = fs::read_dir(&full_path)
            .await
            .map_err(|e| io_error(path, e))?;

        while let Some(entry) = dir.next_entry().await.map_err(|e| io_error(path, e))? {
            let name = entry.file_name().to_string_lossy().to_string();
            let metadata = entry.metadata().await.map_err(|e| io_error(path, e))?;

            entries.push(FileEntry {
                name,
                is_dir: metadata.is_dir(),
            });
        }

        Ok(entries)
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        let full_path = self.full_path(path);
        fs::try_exists(&full_path)
            .await
            .map_err(|e| io_error(path, e))
    }

    async fn mkdir(&self, path: &str) -> Result<()> {
        let full_path = self.full_path(path);
        fs::create_dir_all(&full_path)
            .await
            .map_err(|e| io_error(path, e))
    }

    async fn rename(&self, from: &str, to: &str) -> Result<()> {
        let metadata = fs::metadata(self.full_path(from))
            .await
            .map_err(|e| io_error(from, e))?;
        if metadata.is_dir() {
            return Err(FsError::IsDirectory(from.to_string()));
        }

        fs::rename(self.full_path(from), self.full_path(to))
            .await
            .map_err(|e| io_error(to, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_native_fs_write_list_rename() {
        let temp_dir = TempDir::new().unwrap();
        let fs = NativeFs::new(temp_dir.path().to_path_buf());

        fs.write("papers/a.pdf", b"A").await.unwrap();
        fs.mkdir("papers/other").await.unwrap();

        let mut names: Vec<String> = fs
            .list("papers")
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        names.sort();
        assert_eq!(names, vec!["a.pdf", "other"]);

        fs.rename("papers/a.pdf", "papers/other/a.pdf").await.unwrap();
        assert!(!fs.exists("papers/a.pdf").await.unwrap());
        assert_eq!(fs.read("papers/other/a.pdf").await.unwrap(), b"A");
    }

    #[tokio::test]
    async fn test_native_fs_missing_file_is_not_found() {
        let temp_dir = TempDir::new().unwrap();
        let fs = NativeFs::new(temp_dir.path().to_path_buf());

        assert!(matches!(fs.read("nope.pdf").await, Err(FsError::NotFound(_))));
        assert!(matches!(
            fs.rename("nope.pdf", "other.pdf").await,
            Err(FsError::NotFound(_))
        ));
    }
}
