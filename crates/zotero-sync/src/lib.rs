//! zotero-sync library: Exposes the sync components for the binary and tests.
//!
//! The binary wires these together: load [`Config`], clone the repository,
//! then hand a [`NativeFs`], a [`ZoteroClient`] and a [`GitRepo`] to the
//! [`SyncDriver`].

pub mod config;
pub mod driver;
pub mod git;
pub mod native_fs;
pub mod rate_limit;
pub mod zotero;

// Re-export key types for convenience
pub use config::Config;
pub use driver::{SyncDriver, SyncError, SyncOutcome, SyncSettings, SyncState};
pub use git::{GitError, GitRepo, VersionControl};
pub use native_fs::NativeFs;
pub use rate_limit::RateLimiter;
pub use zotero::{RemoteCollection, ZoteroClient, ZoteroError};
