//! Where things live inside the working tree.

use crate::fs::{FileSystem, Result};
use std::collections::BTreeSet;

/// Extension of tracked attachment files (case-sensitive).
pub const TRACKED_EXTENSION: &str = ".pdf";
/// Default quarantine subdirectory name
pub const DEFAULT_QUARANTINE_DIR: &str = "other";
/// Default ledger filename
pub const DEFAULT_LEDGER_FILE: &str = ".zotero";

/// Export directory layout, relative to the repository root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportLayout {
    /// Export directory ("" for the repository root)
    pub export_dir: String,
    /// Quarantine subdirectory name inside the export directory
    pub quarantine_dir: String,
    /// Ledger filename inside the export directory
    pub ledger_file: String,
}

impl ExportLayout {
    pub fn new(export_dir: impl Into<String>) -> Self {
        Self {
            export_dir: export_dir.into().trim_matches('/').to_string(),
            quarantine_dir: DEFAULT_QUARANTINE_DIR.to_string(),
            ledger_file: DEFAULT_LEDGER_FILE.to_string(),
        }
    }

    pub fn with_quarantine_dir(mut self, dir: impl Into<String>) -> Self {
        self.quarantine_dir = dir.into();
        self
    }

    pub fn with_ledger_file(mut self, file: impl Into<String>) -> Self {
        self.ledger_file = file.into();
        self
    }

    /// Path of a file directly inside the export directory.
    pub fn file_path(&self, file_name: &str) -> String {
        join(&self.export_dir, file_name)
    }

    pub fn quarantine_path(&self) -> String {
        join(&self.export_dir, &self.quarantine_dir)
    }

    pub fn quarantined_file_path(&self, file_name: &str) -> String {
        join(&self.quarantine_path(), file_name)
    }

    pub fn ledger_path(&self) -> String {
        join(&self.export_dir, &self.ledger_file)
    }
}

/// Whether a file name is a tracked attachment.
pub fn is_tracked(file_name: &str) -> bool {
    file_name.len() > TRACKED_EXTENSION.len() && file_name.ends_with(TRACKED_EXTENSION)
}

/// Split `name.ext` into (`name`, `.ext`). Names without a dot have no extension.
pub fn split_extension(file_name: &str) -> (&str, &str) {
    match file_name.rfind('.') {
        Some(pos) if pos > 0 => file_name.split_at(pos),
        _ => (file_name, ""),
    }
}

/// Tracked files directly inside the export directory (subdirectories are not
/// descended into). A missing export directory has no files.
pub async fn list_tracked<F: FileSystem>(
    fs: &F,
    layout: &ExportLayout,
) -> Result<BTreeSet<String>> {
    if !fs.exists(&layout.export_dir).await? {
        return Ok(BTreeSet::new());
    }

    let files = fs
        .list(&layout.export_dir)
        .await?
        .into_iter()
        .filter(|entry| !entry.is_dir && is_tracked(&entry.name))
        .map(|entry| entry.name)
        .collect();
    Ok(files)
}

fn join(dir: &str, name: &str) -> String {
    if dir.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", dir, name)
    }
}
