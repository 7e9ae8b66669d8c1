//! Collision-safe moves into the quarantine subdirectory.

use crate::fs::{FileSystem, Result};
use crate::layout::ExportLayout;
use crate::naming::numbered_name;

/// First free name for `file_name` given a predicate over names already taken:
/// `name`, then `stem.1.ext`, `stem.2.ext`, ...
pub fn resolve_quarantine_name(file_name: &str, is_taken: impl Fn(&str) -> bool) -> String {
    if !is_taken(file_name) {
        return file_name.to_string();
    }
    (1..)
        .map(|n| numbered_name(file_name, n))
        .find(|candidate| !is_taken(candidate))
        .unwrap_or_else(|| unreachable!("unbounded range always yields a free name"))
}

/// Move `file_name` from the export directory into the quarantine subdirectory.
///
/// Never overwrites: if the name is taken in the quarantine directory the file
/// gets the first free `stem.{n}.ext`. Returns the new path.
pub async fn quarantine<F: FileSystem>(
    fs: &F,
    layout: &ExportLayout,
    file_name: &str,
) -> Result<String> {
    let dir = layout.quarantine_path();
    fs.mkdir(&dir).await?;

    let mut taken = Vec::new();
    let mut candidate = file_name.to_string();
    while fs.exists(&layout.quarantined_file_path(&candidate)).await? {
        taken.push(candidate);
        candidate = resolve_quarantine_name(file_name, |name| taken.iter().any(|t| t == name));
    }

    let from = layout.file_path(file_name);
    let to = layout.quarantined_file_path(&candidate);
    fs.rename(&from, &to).await?;
    tracing::info!("Quarantined {} -> {}", from, to);
    Ok(to)
}
