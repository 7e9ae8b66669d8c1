//! One sync run: reconcile the export directory with the remote collection,
//! then commit and push the result.
//!
//! States, in order: Cloned → Reconciled → Fetched → Staged → Committed →
//! Pushed → Verified. Any error aborts the run; the working tree is a private
//! clone, so an aborted run leaves the remote untouched.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use mirror_core::apply_moves;
use mirror_core::fs::{FileSystem, FsError};
use mirror_core::item::RemoteItem;
use mirror_core::layout::{list_tracked, ExportLayout};
use mirror_core::ledger::{self, Ledger, LedgerError};
use mirror_core::reconcile::{reconcile, Action, ReconcileReport, Reconciliation};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::git::{GitError, VersionControl};
use crate::zotero::{RemoteCollection, ZoteroError};

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Zotero error: {0}")]
    Remote(#[from] ZoteroError),

    #[error("Filesystem error: {0}")]
    Fs(#[from] FsError),

    #[error("Git error: {0}")]
    Git(#[from] GitError),

    #[error("Push not confirmed: local HEAD {local}, remote tip {remote}\n{status}")]
    PushVerification {
        local: String,
        remote: String,
        status: String,
    },
}

pub type Result<T> = std::result::Result<T, SyncError>;

/// Progress of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Cloned,
    Reconciled,
    Fetched,
    Staged,
    Committed,
    Pushed,
    Verified,
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SyncState::Cloned => "cloned",
            SyncState::Reconciled => "reconciled",
            SyncState::Fetched => "fetched",
            SyncState::Staged => "staged",
            SyncState::Committed => "committed",
            SyncState::Pushed => "pushed",
            SyncState::Verified => "verified",
        };
        f.write_str(name)
    }
}

/// How a run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The export directory already matched the collection; nothing was committed
    NothingChanged,
    /// A commit was pushed and confirmed on the remote
    Pushed {
        commit: String,
        report: ReconcileReport,
    },
    /// Plan computed and logged, nothing applied
    DryRun(ReconcileReport),
}

/// Settings for a run, taken from [`Config`]
#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub collection_id: String,
    pub layout: ExportLayout,
    pub git_name: String,
    pub git_email: String,
    pub commit_message: String,
    /// Extra push attempts when the remote tip does not match after pushing
    pub push_retries: u32,
    /// Delay before the first push retry; doubles on each attempt
    pub push_backoff: Duration,
    pub dry_run: bool,
}

/// Upper bound for the delay between push retries
const MAX_PUSH_BACKOFF: Duration = Duration::from_secs(30);

impl SyncSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            collection_id: config.zotero_collection_id.clone(),
            layout: config.layout(),
            git_name: config.git_name.clone(),
            git_email: config.git_email.clone(),
            commit_message: config.commit_message.clone(),
            push_retries: config.push_retries,
            push_backoff: Duration::from_secs(1),
            dry_run: false,
        }
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }
}

/// Calculates the delay before push retry `attempt` (1-based) using exponential backoff.
pub fn calculate_backoff(attempt: u32, initial: Duration) -> Duration {
    let delay = initial.saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)));
    delay.min(MAX_PUSH_BACKOFF)
}

/// Runs one sync over a cloned working tree.
pub struct SyncDriver<F: FileSystem, R: RemoteCollection, V: VersionControl> {
    fs: F,
    remote: R,
    vcs: V,
    settings: SyncSettings,
    state: Option<SyncState>,
}

impl<F: FileSystem, R: RemoteCollection, V: VersionControl> SyncDriver<F, R, V> {
    pub fn new(fs: F, remote: R, vcs: V, settings: SyncSettings) -> Self {
        Self {
            fs,
            remote,
            vcs,
            settings,
            state: None,
        }
    }

    /// Last state reached, `None` before the run starts
    pub fn state(&self) -> Option<SyncState> {
        self.state
    }

    fn transition(&mut self, state: SyncState) {
        info!("Sync state: {}", state);
        self.state = Some(state);
    }

    /// Execute the run
    pub async fn run(&mut self) -> Result<SyncOutcome> {
        self.prepare().await?;
        self.transition(SyncState::Cloned);

        let (plan, previous) = self.plan().await?;
        self.transition(SyncState::Reconciled);

        let report = plan.report();
        info!(
            "Plan: {} to fetch, {} to rename, {} to quarantine, {} unchanged",
            report.fetched, report.renamed, report.quarantined, report.unchanged
        );

        if self.settings.dry_run {
            log_plan(&plan);
            return Ok(SyncOutcome::DryRun(report));
        }

        if !plan.has_changes() && plan.ledger == previous {
            info!("Nothing changed");
            return Ok(SyncOutcome::NothingChanged);
        }

        let moves = apply_moves(&self.fs, &self.settings.layout, &plan.actions).await?;
        info!(
            "Moved files: {} renamed, {} quarantined",
            moves.renamed.len(),
            moves.quarantined.len()
        );
        self.fetch(&plan).await?;
        ledger::save(&self.fs, &self.settings.layout.ledger_path(), &plan.ledger).await?;
        self.transition(SyncState::Fetched);

        self.vcs.stage_all().await?;
        self.transition(SyncState::Staged);
        if !self.vcs.is_dirty().await? {
            info!("Nothing changed after staging");
            return Ok(SyncOutcome::NothingChanged);
        }

        self.vcs.commit(&self.settings.commit_message).await?;
        self.transition(SyncState::Committed);

        self.vcs.pull().await?;
        self.vcs.push().await?;
        self.transition(SyncState::Pushed);

        let commit = self.verify_push().await?;
        self.transition(SyncState::Verified);
        info!("Pushed {}", commit);

        Ok(SyncOutcome::Pushed { commit, report })
    }

    /// Committer identity and the directories every run expects
    async fn prepare(&self) -> Result<()> {
        self.vcs
            .configure_identity(&self.settings.git_name, &self.settings.git_email)
            .await?;
        let layout = &self.settings.layout;
        if !layout.export_dir.is_empty() {
            self.fs.mkdir(&layout.export_dir).await?;
        }
        self.fs.mkdir(&layout.quarantine_path()).await?;
        Ok(())
    }

    /// Reconcile the remote collection against the export directory.
    ///
    /// Returns the plan and the ledger it was computed from. The ledger is
    /// loaded before anything is moved, so a corrupt one aborts untouched.
    async fn plan(&self) -> Result<(Reconciliation, Ledger)> {
        let listed = self
            .remote
            .list_top_items_with_attachment(&self.settings.collection_id)
            .await?;
        let items = index_items(listed);

        let layout = &self.settings.layout;
        let existing = list_tracked(&self.fs, layout).await?;
        let previous = ledger::load(&self.fs, &layout.ledger_path()).await?;
        debug!(
            "{} remote items, {} local files, {} ledger entries",
            items.len(),
            existing.len(),
            previous.len()
        );

        let plan = reconcile(&items, &previous, &existing);
        Ok((plan, previous))
    }

    /// Download every planned fetch, one at a time
    async fn fetch(&self, plan: &Reconciliation) -> Result<()> {
        let fetches: Vec<(&str, &str)> = plan.fetches().collect();
        let total = fetches.len();

        for (i, (item_id, file_name)) in fetches.into_iter().enumerate() {
            info!("Downloading {}/{}: {}", i + 1, total, file_name);
            let content = self.remote.download_attachment(item_id).await?;
            self.fs
                .write(&self.settings.layout.file_path(file_name), &content)
                .await?;
        }
        Ok(())
    }

    /// Confirm the push landed: clean tree and remote tip == local HEAD.
    ///
    /// Pushes again with backoff up to `push_retries` times before giving up.
    async fn verify_push(&self) -> Result<String> {
        let mut attempt = 0;

        loop {
            let dirty = self.vcs.is_dirty().await?;
            let local = self.vcs.head_rev().await?;
            let remote = self.vcs.remote_rev().await?;

            if !dirty && remote.as_deref() == Some(local.as_str()) {
                return Ok(local);
            }

            if attempt >= self.settings.push_retries {
                let status = self.vcs.status().await?;
                return Err(SyncError::PushVerification {
                    local,
                    remote: remote.unwrap_or_else(|| "(none)".to_string()),
                    status,
                });
            }

            attempt += 1;
            let delay = calculate_backoff(attempt, self.settings.push_backoff);
            warn!(
                "Push not confirmed (dirty={}, local={}, remote={:?}), retry {}/{} in {:?}",
                dirty, local, remote, attempt, self.settings.push_retries, delay
            );
            tokio::time::sleep(delay).await;

            if let Err(e) = self.vcs.push().await {
                warn!("Push retry {} failed: {}", attempt, e);
            }
        }
    }
}

/// Key items by id; a repeated id keeps its first occurrence
fn index_items(listed: Vec<RemoteItem>) -> BTreeMap<String, RemoteItem> {
    let mut items = BTreeMap::new();
    for item in listed {
        if items.contains_key(&item.id) {
            warn!("Item {} listed more than once, keeping the first", item.id);
            continue;
        }
        items.insert(item.id.clone(), item);
    }
    items
}

fn log_plan(plan: &Reconciliation) {
    for action in &plan.actions {
        match action {
            Action::Fetch { item_id, file_name } => {
                info!("Would fetch {} -> {}", item_id, file_name)
            }
            Action::Rename { from, to, .. } => info!("Would rename {} -> {}", from, to),
            Action::Quarantine { file_name } => info!("Would quarantine {}", file_name),
            Action::Noop { .. } => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_and_caps() {
        let initial = Duration::from_secs(1);
        assert_eq!(calculate_backoff(1, initial), Duration::from_secs(1));
        assert_eq!(calculate_backoff(2, initial), Duration::from_secs(2));
        assert_eq!(calculate_backoff(4, initial), Duration::from_secs(8));
        assert_eq!(calculate_backoff(10, initial), MAX_PUSH_BACKOFF);
        assert_eq!(calculate_backoff(3, Duration::ZERO), Duration::ZERO);
    }

    #[test]
    fn test_index_items_keeps_first_duplicate() {
        let item = |title: &str| RemoteItem {
            id: "ATT1".to_string(),
            creators: Vec::new(),
            date: None,
            title: title.to_string(),
            has_pdf: true,
        };
        let items = index_items(vec![item("first"), item("second")]);

        assert_eq!(items.len(), 1);
        assert_eq!(items["ATT1"].title, "first");
    }

    #[test]
    fn test_state_display() {
        assert_eq!(SyncState::Cloned.to_string(), "cloned");
        assert_eq!(SyncState::Verified.to_string(), "verified");
    }
}
