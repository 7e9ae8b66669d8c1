//! FileSystem trait abstraction for the mirrored working tree.
//!
//! Implementations:
//! - `InMemoryFs` - For testing
//! - `NativeFs` (in zotero-sync) - Uses tokio::fs
//!
//! Paths are `/`-separated and relative to the root the implementation was
//! created with (the cloned repository).

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FsError {
    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Is a directory: {0}")]
    IsDirectory(String),

    #[error("IO error: {0}")]
    Io(String),
}

pub type Result<T> = std::result::Result<T, FsError>;

/// Directory entry
#[derive(Debug, Clone)]
pub struct FileEntry {
    /// File or directory name (not full path)
    pub name: String,
    /// Whether this is a directory
    pub is_dir: bool,
}

/// Platform-independent filesystem abstraction.
#[async_trait]
pub trait FileSystem: Send + Sync {
    /// Read file contents
    async fn read(&self, path: &str) -> Result<Vec<u8>>;

    /// Write file contents (creates parent directories if needed)
    async fn write(&self, path: &str, content: &[u8]) -> Result<()>;

    /// List directory contents
    async fn list(&self, path: &str) -> Result<Vec<FileEntry>>;

    /// Check if path exists
    async fn exists(&self, path: &str) -> Result<bool>;

    /// Create directory (and parents if needed)
    async fn mkdir(&self, path: &str) -> Result<()>;

    /// Move a file. Replaces `to` if it exists; the parent of `to` must exist.
    async fn rename(&self, from: &str, to: &str) -> Result<()>;
}

/// In-memory filesystem for testing
pub struct InMemoryFs {
    files: RwLock<HashMap<String, Vec<u8>>>,
    dirs: RwLock<HashSet<String>>,
}

impl InMemoryFs {
    pub fn new() -> Self {
        let mut dirs = HashSet::new();
        dirs.insert(String::new()); // Root directory
        Self {
            files: RwLock::new(HashMap::new()),
            dirs: RwLock::new(dirs),
        }
    }

    /// All file paths currently stored, sorted.
    pub fn file_paths(&self) -> Vec<String> {
        let files = self.files.read().unwrap();
        let mut paths: Vec<String> = files.keys().cloned().collect();
        paths.sort();
        paths
    }

    fn normalize_path(path: &str) -> String {
        path.trim_matches('/').to_string()
    }

    fn parent_path(path: &str) -> Option<String> {
        let normalized = Self::normalize_path(path);
        if normalized.is_empty() {
            None
        } else {
            match normalized.rfind('/') {
                Some(pos) => Some(normalized[..pos].to_string()),
                None => Some(String::new()),
            }
        }
    }
}

impl Default for InMemoryFs {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FileSystem for InMemoryFs {
    async fn read(&self, path: &str) -> Result<Vec<u8>> {
        let path = Self::normalize_path(path);
        let files = self.files.read().unwrap();
        files
            .get(&path)
            .cloned()
            .ok_or_else(|| FsError::NotFound(path))
    }

    async fn write(&self, path: &str, content: &[u8]) -> Result<()> {
        let path = Self::normalize_path(path);

        if self.dirs.read().unwrap().contains(&path) {
            return Err(FsError::IsDirectory(path));
        }

        // Create parent directories
        if let Some(parent) = Self::parent_path(&path) {
            self.mkdir(&parent).await?;
        }

        let mut files = self.files.write().unwrap();
        files.insert(path, content.to_vec());
        Ok(())
    }

    async fn list(&self, path: &str) -> Result<Vec<FileEntry>> {
        let path = Self::normalize_path(path);
        let prefix = if path.is_empty() {
            String::new()
        } else {
            format!("{}/", path)
        };

        let dirs = self.dirs.read().unwrap();
        if !dirs.contains(&path) {
            return Err(FsError::NotFound(path));
        }

        let mut entries = Vec::new();
        let mut seen = HashSet::new();

        let files = self.files.read().unwrap();
        for file_path in files.keys() {
            if let Some(rest) = file_path.strip_prefix(&prefix) {
                if !rest.contains('/') && seen.insert(rest.to_string()) {
                    entries.push(FileEntry {
                        name: rest.to_string(),
                        is_dir: false,
                    });
                }
            }
        }

        for dir_path in dirs.iter() {
            if let Some(rest) = dir_path.strip_prefix(&prefix) {
                if !rest.is_empty() && !rest.contains('/') && seen.insert(rest.to_string()) {
                    entries.push(FileEntry {
                        name: rest.to_string(),
                        is_dir: true,
                    });
                }
            }
        }

        Ok(entries)
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        let path = Self::normalize_path(path);
        let files = self.files.read().unwrap();
        let dirs = self.dirs.read().unwrap();
        Ok(files.contains_key(&path) || dirs.contains(&path))
    }

    async fn mkdir(&self, path: &str) -> Result<()> {
        let path = Self::normalize_path(path);
        if path.is_empty() {
            return Ok(()); // Root always exists
        }

        // Create parent first
        if let Some(parent) = Self::parent_path(&path) {
            Box::pin(self.mkdir(&parent)).await?;
        }

        let mut dirs = self.dirs.write().unwrap();
        dirs.insert(path);
        Ok(())
    }

    async fn rename(&self, from: &str, to: &str) -> Result<()> {
        let from = Self::normalize_path(from);
        let to = Self::normalize_path(to);

        if let Some(parent) = Self::parent_path(&to) {
            if !self.dirs.read().unwrap().contains(&parent) {
                return Err(FsError::NotFound(parent));
            }
        }

        let mut files = self.files.write().unwrap();
        match files.remove(&from) {
            Some(content) => {
                files.insert(to, content);
                Ok(())
            }
            None if self.dirs.read().unwrap().contains(&from) => Err(FsError::IsDirectory(from)),
            None => Err(FsError::NotFound(from)),
        }
    }
}

// Implement FileSystem for Arc<T> where T: FileSystem
// This allows a test to keep a handle on the filesystem it hands to the driver
#[async_trait]
impl<T: FileSystem> FileSystem for std::sync::Arc<T> {
    async fn read(&self, path: &str) -> Result<Vec<u8>> {
        (**self).read(path).await
    }

    async fn write(&self, path: &str, content: &[u8]) -> Result<()> {
        (**self).write(path, content).await
    }

    async fn list(&self, path: &str) -> Result<Vec<FileEntry>> {
        (**self).list(path).await
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        (**self).exists(path).await
    }

    async fn mkdir(&self, path: &str) -> Result<()> {
        (**self).mkdir(path).await
    }

    async fn rename(&self, from: &str, to: &str) -> Result<()> {
        (**self).rename(from, to).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_inmemory_fs_basic_operations() {
        let fs = InMemoryFs::new();

        fs.write("test.pdf", b"%PDF-1.4").await.unwrap();

        let content = fs.read("test.pdf").await.unwrap();
        assert_eq!(content, b"%PDF-1.4");

        assert!(fs.exists("test.pdf").await.unwrap());
        assert!(!fs.exists("nonexistent.pdf").await.unwrap());
    }

    #[tokio::test]
    async fn test_inmemory_fs_directories() {
        let fs = InMemoryFs::new();

        // Write creates parent directories
        fs.write("papers/other/a.pdf", b"content").await.unwrap();

        assert!(fs.exists("papers").await.unwrap());
        assert!(fs.exists("papers/other").await.unwrap());

        let entries = fs.list("papers").await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "other");
        assert!(entries[0].is_dir);

        let entries = fs.list("papers/other").await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "a.pdf");
        assert!(!entries[0].is_dir);
    }

    #[tokio::test]
    async fn test_inmemory_fs_rename() {
        let fs = InMemoryFs::new();
        fs.write("papers/a.pdf", b"a").await.unwrap();
        fs.mkdir("papers/other").await.unwrap();

        fs.rename("papers/a.pdf", "papers/other/a.pdf").await.unwrap();

        assert!(!fs.exists("papers/a.pdf").await.unwrap());
        assert_eq!(fs.read("papers/other/a.pdf").await.unwrap(), b"a");
    }

    #[tokio::test]
    async fn test_inmemory_fs_rename_requires_parent() {
        let fs = InMemoryFs::new();
        fs.write("a.pdf", b"a").await.unwrap();

        let err = fs.rename("a.pdf", "missing/a.pdf").await.unwrap_err();
        assert!(matches!(err, FsError::NotFound(p) if p == "missing"));
        assert!(fs.exists("a.pdf").await.unwrap());
    }

    #[tokio::test]
    async fn test_inmemory_fs_rename_missing_source() {
        let fs = InMemoryFs::new();
        let err = fs.rename("gone.pdf", "b.pdf").await.unwrap_err();
        assert!(matches!(err, FsError::NotFound(_)));
    }
}
