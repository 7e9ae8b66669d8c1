//! Executes the filesystem moves of a reconciliation plan.
//!
//! Quarantines run first so that a stray file sitting on a rename target is out
//! of the way. Renames run in two phases (every source to a staging name, then
//! every staging name to its target), which keeps swaps and chains such as
//! `a -> b, b -> c` from clobbering each other. Fetches and no-ops are left to
//! the caller.

use crate::fs::{FileSystem, FsError, Result};
use crate::layout::ExportLayout;
use crate::quarantine::quarantine;
use crate::reconcile::Action;

/// A move that was performed (paths relative to the repository root).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMove {
    pub from: String,
    pub to: String,
}

/// Moves performed by [`apply_moves`].
#[derive(Debug, Default)]
pub struct MoveReport {
    pub renamed: Vec<FileMove>,
    pub quarantined: Vec<FileMove>,
}

/// Staging name used between the two rename phases.
fn staging_name(file_name: &str) -> String {
    format!(".{}.renaming", file_name)
}

/// Apply every `Quarantine` and `Rename` action in `actions`.
pub async fn apply_moves<F: FileSystem>(
    fs: &F,
    layout: &ExportLayout,
    actions: &[Action],
) -> Result<MoveReport> {
    let mut report = MoveReport::default();

    for action in actions {
        if let Action::Quarantine { file_name } = action {
            let to = quarantine(fs, layout, file_name).await?;
            report.quarantined.push(FileMove {
                from: layout.file_path(file_name),
                to,
            });
        }
    }

    let renames: Vec<(&str, &str)> = actions
        .iter()
        .filter_map(|a| match a {
            Action::Rename { from, to, .. } => Some((from.as_str(), to.as_str())),
            _ => None,
        })
        .collect();

    for (from, _) in &renames {
        let staged = layout.file_path(&staging_name(from));
        if fs.exists(&staged).await? {
            return Err(FsError::Io(format!("staging path already exists: {}", staged)));
        }
        fs.rename(&layout.file_path(from), &staged).await?;
    }

    for (from, to) in &renames {
        let staged = layout.file_path(&staging_name(from));
        let target = layout.file_path(to);
        fs.rename(&staged, &target).await?;
        tracing::info!("Renamed {} -> {}", layout.file_path(from), target);
        report.renamed.push(FileMove {
            from: layout.file_path(from),
            to: target,
        });
    }

    Ok(report)
}
