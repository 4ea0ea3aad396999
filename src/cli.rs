//! Command-line interface and pipeline wiring

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::auth;
use crate::classifier;
use crate::client::GmailTransport;
use crate::config::Config;
use crate::error::Result;
use crate::reply::{ReplyComposer, ReplyTemplates};
use crate::triage::{CycleReport, TriageOrchestrator};

#[derive(Parser, Debug)]
#[command(name = "gmail-triage")]
#[command(version = "0.1.0")]
#[command(about = "Classify, reply to and label unread Gmail messages", long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: PathBuf,

    /// Path to OAuth2 credentials file
    #[arg(long, default_value = "credentials.json")]
    pub credentials: PathBuf,

    /// Path to token cache file
    #[arg(long, default_value = ".gmail-triage/token.json")]
    pub token_cache: PathBuf,

    /// Verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Poll the inbox and triage unread messages until interrupted
    Start {
        /// Poll interval in milliseconds (overrides poll.interval_ms)
        #[arg(long)]
        interval_ms: Option<u64>,
    },

    /// Run a single triage cycle and print what was processed
    Once,

    /// Authenticate with Gmail API
    Auth {
        /// Force re-authentication even if token exists
        #[arg(long)]
        force: bool,
    },

    /// Generate example configuration file
    InitConfig {
        /// Path to create config file
        #[arg(short, long, default_value = "config.toml")]
        output: PathBuf,

        /// Overwrite existing file
        #[arg(long)]
        force: bool,
    },
}

/// Authenticate and assemble the orchestrator from configuration
pub async fn build_orchestrator(cli: &Cli, config: &Config) -> Result<TriageOrchestrator> {
    if let Some(parent) = cli.token_cache.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let classifier = classifier::from_config(&config.classification)?;

    let (hub, authenticator) =
        auth::initialize_gmail_hub(&cli.credentials, &cli.token_cache).await?;
    info!("Gmail API authenticated");

    let transport = GmailTransport::new(
        hub,
        config.poll.max_concurrent_requests,
        Duration::from_secs(config.poll.request_timeout_secs),
    );

    let composer = ReplyComposer::new(ReplyTemplates::from(&config.replies));

    Ok(TriageOrchestrator::new(
        Arc::new(authenticator),
        Arc::new(transport),
        Arc::from(classifier),
        composer,
    )
    .with_batch_size(config.poll.batch_size)
    .with_concurrency(config.poll.max_concurrent_requests))
}

/// Truncate a string to max_len characters, adding "..." if truncated
fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        format!("{}...", s.chars().take(max_len.saturating_sub(3)).collect::<String>())
    }
}

/// Human-readable summary of one cycle
pub fn format_report(report: &CycleReport) -> String {
    let mut out = String::new();
    out.push_str("========================================\n");
    out.push_str(&format!("Cycle {}\n", report.cycle_id));
    out.push_str("========================================\n");

    if report.is_empty() {
        out.push_str("No messages processed\n");
    } else {
        for p in &report.processed {
            out.push_str(&format!(
                "{:<18} {:<30} {:<40} reply: {:?}, label: {:?}, read: {:?}\n",
                p.category.label_name(),
                truncate_string(&p.message.from, 30),
                truncate_string(&p.message.subject, 40),
                p.reply,
                p.label,
                p.mark_read
            ));
        }
    }

    out.push_str(&format!(
        "Processed: {}  Replied: {}  Labeled: {}  Marked read: {}  Fetch failures: {}\n",
        report.len(),
        report.replies_sent(),
        report.labeled(),
        report.marked_read(),
        report.fetch_failures
    ));
    out
}
