//! zotero-git-sync: Mirror the PDF attachments of a Zotero collection into a
//! git repository.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

use zotero_sync::{
    Config, GitRepo, NativeFs, RateLimiter, SyncDriver, SyncOutcome, SyncSettings, ZoteroClient,
};

#[derive(Parser, Debug)]
#[command(name = "zotero-git-sync")]
#[command(about = "Mirror a Zotero collection's PDFs into a git repository")]
struct Args {
    /// Path to the YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Compute and log the plan without changing anything
    #[arg(long)]
    dry_run: bool,

    /// Enable verbose logging
    #[arg(long)]
    verbose: bool,

    /// Zotero API key, overrides `zoteroApiKey` from the config file
    #[arg(long, env = "ZOTERO_API_KEY", hide_env_values = true)]
    api_key: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let default_filter = if args.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = Config::load(&args.config)?.with_api_key(args.api_key);
    config.validate()?;

    // Private working tree, removed when the run ends
    let workdir = tempfile::Builder::new()
        .prefix("zotero-git-sync-")
        .tempdir()
        .context("Failed to create working directory")?;
    let checkout = workdir.path().join("repo");

    let repo = GitRepo::shallow_clone(&config.git_repository_url, &checkout)
        .await
        .context("Failed to clone repository")?;

    let limiter = RateLimiter::new(config.rate_limit.quota, config.rate_limit.window());
    let client = ZoteroClient::new(
        &config.api_base,
        &config.zotero_api_key,
        &config.zotero_user_id,
        config.max_retries,
        limiter,
    )?;

    let settings = SyncSettings::from_config(&config).with_dry_run(args.dry_run);
    let mut driver = SyncDriver::new(NativeFs::new(checkout), client, repo, settings);

    match driver.run().await.context("Sync failed")? {
        SyncOutcome::NothingChanged => info!("Nothing changed"),
        SyncOutcome::Pushed { commit, report } => info!(
            "Pushed {}: {} fetched, {} renamed, {} quarantined",
            commit, report.fetched, report.renamed, report.quarantined
        ),
        SyncOutcome::DryRun(report) => info!(
            "Dry run: {} to fetch, {} to rename, {} to quarantine",
            report.fetched, report.renamed, report.quarantined
        ),
    }

    Ok(())
}
