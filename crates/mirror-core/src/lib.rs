//! mirror-core: Naming and reconciliation engine for mirroring a Zotero collection.
//!
//! This crate provides:
//! - Slug normalization and canonical filenames for remote items
//! - The identity ledger (item id → filename) persisted between runs
//! - Reconciliation of remote items against files already on disk
//! - Collision-safe quarantine and swap-safe renames
//! - A FileSystem trait abstraction (with an in-memory implementation for tests)

pub mod apply;
pub mod fs;
pub mod item;
pub mod layout;
pub mod ledger;
pub mod naming;
pub mod normalize;
pub mod quarantine;
pub mod reconcile;

pub use apply::{apply_moves, FileMove, MoveReport};
pub use fs::{FileEntry, FileSystem, FsError, InMemoryFs};
pub use item::{Creator, RemoteItem};
pub use layout::{list_tracked, ExportLayout};
pub use ledger::{Ledger, LedgerError};
pub use naming::{derive_file_name, derive_path};
pub use normalize::normalize;
pub use reconcile::{reconcile, Action, ReconcileReport, Reconciliation};
