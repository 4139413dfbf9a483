//! Sync command - Upload changed files to a SharePoint document library
//!
//! Provides the `spsync sync` CLI command which:
//! 1. Loads configuration and applies command-line overrides
//! 2. Acquires an access token (pre-issued or client credentials)
//! 3. Resolves the document library and creates the Graph adapter
//! 4. Runs the SyncEngine and displays the summary

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context as _, Result};
use clap::Args;
use spsync_core::config::Config;
use spsync_core::domain::{OrphanState, UploadOutcome};
use spsync_core::ports::IContentTransform;
use spsync_core::stats::format_bytes;
use spsync_graph::auth::ClientCredentials;
use spsync_graph::client::GraphClient;
use spsync_graph::provider::GraphRemoteLibrary;
use spsync_graph::rate_limit::RateLimitSummary;
use spsync_sync::engine::{EngineOptions, SyncEngine};
use spsync_sync::summary::SyncSummary;
use spsync_sync::transform::CommandTransform;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::output::{get_formatter, OutputFormat, OutputFormatter};
use crate::Context;

/// Sync command with clap options
#[derive(Debug, Default, Args)]
pub struct SyncCommand {
    /// Include patterns (replace local.include)
    pub patterns: Vec<String>,

    /// Local folder to sync
    #[arg(long)]
    pub root: Option<PathBuf>,

    /// Exclude patterns, comma separated (replace local.exclude)
    #[arg(long, value_delimiter = ',')]
    pub exclude: Vec<String>,

    /// Let `**` match across folders
    #[arg(short, long)]
    pub recursive: bool,

    /// Upload every file, even unchanged ones
    #[arg(long)]
    pub force: bool,

    /// Reconcile orphans (report only unless --no-dry-run)
    #[arg(long)]
    pub delete: bool,

    /// Actually delete orphans instead of reporting them
    #[arg(long, requires = "delete")]
    pub no_dry_run: bool,

    /// SharePoint host, e.g. contoso.sharepoint.com
    #[arg(long)]
    pub host: Option<String>,

    /// Site name under /sites/
    #[arg(long)]
    pub site: Option<String>,

    /// Library name followed by the remote root folder, e.g. Documents/Reports
    #[arg(long)]
    pub upload_path: Option<String>,

    #[arg(long, env = "SPSYNC_TENANT_ID")]
    pub tenant_id: Option<String>,

    #[arg(long, env = "SPSYNC_CLIENT_ID")]
    pub client_id: Option<String>,

    #[arg(long, env = "SPSYNC_CLIENT_SECRET", hide_env_values = true)]
    pub client_secret: Option<String>,

    /// Pre-issued bearer token; skips client-credentials authentication
    #[arg(long, env = "SPSYNC_ACCESS_TOKEN", hide_env_values = true)]
    pub access_token: Option<String>,

    /// Total attempts per request before giving up
    #[arg(long)]
    pub max_retries: Option<u32>,

    #[arg(long)]
    pub hash_workers: Option<usize>,

    #[arg(long)]
    pub upload_workers: Option<usize>,

    /// Chunk size in bytes for session uploads
    #[arg(long)]
    pub chunk_size: Option<u64>,

    /// Content transform command, e.g. "pandoc -f gfm -t html"
    #[arg(long)]
    pub transform: Option<String>,

    /// Skip files whose transform fails instead of uploading the original
    #[arg(long)]
    pub transform_required: bool,
}

impl SyncCommand {
    /// Execute the sync command
    pub async fn execute(&self, ctx: &Context) -> Result<ExitCode> {
        let formatter = get_formatter(ctx.format, ctx.quiet);

        // Step 1: Load config and apply overrides
        let mut config = super::load_config(ctx)?;
        self.apply_overrides(&mut config);

        let errors = config.validate();
        if !errors.is_empty() {
            for error in &errors {
                formatter.error(&error.to_string());
            }
            bail!(
                "Invalid configuration ({} error{})",
                errors.len(),
                if errors.len() == 1 { "" } else { "s" }
            );
        }
        info!(config_path = %ctx.config_path.display(), "Loaded configuration");

        // Step 2: Authenticate
        let token = self.access_token(&config).await?;

        // Step 3: Resolve the library
        let client = GraphClient::new(token, &config.remote.graph_endpoint);
        let library = GraphRemoteLibrary::connect(client, &config.remote, &config.metadata.column)
            .await
            .with_context(|| {
                format!(
                    "Failed to resolve library '{}' on {}/sites/{}",
                    config.remote.upload_path, config.remote.host, config.remote.site
                )
            })?;
        let library = Arc::new(library);

        let transform = CommandTransform::from_config(&config.transform)?
            .map(|t| Arc::new(t) as Arc<dyn IContentTransform>);

        // Step 4: Run
        let cancel = CancellationToken::new();
        tokio::spawn(cancel_on_interrupt(cancel.clone()));

        formatter.info(&format!(
            "Syncing {} to {}/{}",
            config.local.root.display(),
            config.remote.host,
            config.remote.upload_path
        ));

        let engine = SyncEngine::new(library.clone(), EngineOptions::from_config(&config), transform);
        let summary = engine.run(cancel).await?;
        let rate_limits = library.rate_limit_summary();

        // Step 5: Display results
        if ctx.format == OutputFormat::Json {
            formatter.print_json(&serde_json::json!({
                "success": !summary.has_failures(),
                "summary": summary,
                "rate_limits": rate_limits,
            }));
        } else {
            print_summary(formatter.as_ref(), &summary, &rate_limits);
        }

        Ok(if summary.has_failures() {
            ExitCode::FAILURE
        } else {
            ExitCode::SUCCESS
        })
    }

    /// Command-line values win over the configuration file
    fn apply_overrides(&self, config: &mut Config) {
        if !self.patterns.is_empty() {
            config.local.include = self.patterns.clone();
        }
        if let Some(root) = &self.root {
            config.local.root = root.clone();
        }
        if !self.exclude.is_empty() {
            config.local.exclude = self.exclude.clone();
        }
        config.local.recursive |= self.recursive;
        config.sync.force_upload |= self.force;

        if self.delete {
            config.delete.enabled = true;
        }
        if self.no_dry_run {
            config.delete.dry_run = false;
        }

        if let Some(host) = &self.host {
            config.remote.host = host.clone();
        }
        if let Some(site) = &self.site {
            config.remote.site = site.clone();
        }
        if let Some(path) = &self.upload_path {
            config.remote.upload_path = path.clone();
        }
        if let Some(tenant) = &self.tenant_id {
            config.remote.tenant_id = Some(tenant.clone());
        }
        if let Some(client_id) = &self.client_id {
            config.remote.client_id = Some(client_id.clone());
        }

        if let Some(n) = self.max_retries {
            config.sync.max_retries = n;
        }
        if let Some(n) = self.hash_workers {
            config.sync.hash_workers = Some(n);
        }
        if let Some(n) = self.upload_workers {
            config.sync.upload_workers = n;
        }
        if let Some(bytes) = self.chunk_size {
            config.transfer.chunk_size_bytes = bytes;
        }

        if let Some(command) = &self.transform {
            config.transform.command = command.split_whitespace().map(String::from).collect();
        }
        config.transform.required |= self.transform_required;
    }

    async fn access_token(&self, config: &Config) -> Result<String> {
        if let Some(token) = &self.access_token {
            return Ok(token.clone());
        }

        let tenant = config
            .remote
            .tenant_id
            .as_deref()
            .context("No tenant id: set remote.tenant_id or SPSYNC_TENANT_ID")?;
        let client_id = config
            .remote
            .client_id
            .as_deref()
            .context("No client id: set remote.client_id or SPSYNC_CLIENT_ID")?;
        let secret = self
            .client_secret
            .as_deref()
            .context("No client secret: pass --client-secret or set SPSYNC_CLIENT_SECRET")?;

        let credentials = ClientCredentials::new(tenant, client_id, secret)
            .with_endpoints(&config.remote.login_endpoint, &config.remote.graph_endpoint);
        let token = credentials.acquire_token().await?;
        Ok(token.secret)
    }
}

async fn cancel_on_interrupt(cancel: CancellationToken) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            warn!("Interrupted, stopping after in-flight requests");
            cancel.cancel();
        }
        Err(e) => warn!(error = %e, "Failed to install Ctrl+C handler"),
    }
}

fn print_summary(formatter: &dyn OutputFormatter, summary: &SyncSummary, rate_limits: &RateLimitSummary) {
    for line in summary_lines(summary, rate_limits) {
        formatter.info(&line);
    }

    for file in summary.failed_files() {
        if let Some(UploadOutcome::Failed(kind)) = &file.outcome {
            formatter.item_failed(file.relative_path.as_str(), &kind.to_string());
        }
    }
    for failure in &summary.read_errors {
        formatter.item_failed(failure.relative_path.as_str(), &failure.error);
    }
    for orphan in &summary.orphans {
        if let OrphanState::DeleteFailed(e) = orphan.state() {
            formatter.item_failed(
                orphan.entry.relative_path.as_str(),
                &format!("delete failed: {e}"),
            );
        }
    }

    if summary.delete_enabled && summary.dry_run && !summary.orphans.is_empty() {
        formatter.warn(&format!(
            "{} orphan(s) left in place; rerun with --no-dry-run to delete them",
            summary.orphans.len()
        ));
    }

    let seconds = summary.duration_ms as f64 / 1000.0;
    if summary.has_failures() {
        formatter.error(&format!("Sync finished with failures in {seconds:.1}s"));
    } else {
        formatter.success(&format!("Sync complete in {seconds:.1}s"));
    }
}

/// Human-readable statistics block
fn summary_lines(summary: &SyncSummary, rate_limits: &RateLimitSummary) -> Vec<String> {
    let stats = &summary.stats;
    let mut lines = vec![
        format!("New:         {}", stats.new_files),
        format!("Updated:     {}", stats.updated_files),
        format!("Unchanged:   {}", stats.unchanged_files),
        format!("Skipped:     {}", stats.skipped_files),
        format!("Failed:      {}", stats.failed_files),
        format!("Read errors: {}", stats.read_errors),
        format!(
            "Transferred: {} ({} not sent, {:.1}% saved)",
            format_bytes(stats.bytes_uploaded),
            format_bytes(stats.bytes_skipped),
            stats.efficiency_percent()
        ),
    ];

    if summary.metadata_enabled {
        lines.push(format!(
            "Fingerprints: {} written, {} failed",
            stats.metadata_written, stats.metadata_failed
        ));
    } else {
        lines.push("Fingerprints: column unavailable, compared by size".to_string());
    }

    if summary.delete_enabled {
        if summary.dry_run {
            lines.push(format!(
                "Orphans:     {} found (dry run, nothing deleted)",
                stats.orphans_reported
            ));
            for orphan in &summary.orphans {
                lines.push(format!("  - {}", orphan.entry.relative_path));
            }
        } else {
            lines.push(format!(
                "Orphans:     {} deleted, {} failed",
                stats.deleted, stats.delete_failed
            ));
        }
    }

    if stats.retries > 0 || rate_limits.throttled_requests > 0 {
        lines.push(format!(
            "Throttling:  {} retries, {} of {} requests throttled, peak usage {:.0}%",
            stats.retries,
            rate_limits.throttled_requests,
            rate_limits.total_requests,
            rate_limits.max_usage
        ));
    }

    lines
}
