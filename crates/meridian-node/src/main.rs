//! Meridian node CLI
//!
//! Applies a feed of organization broadcasts to a local directory snapshot.

use anyhow::{Context as _, Result};
use clap::{Args, Parser, Subcommand};
use meridian_core::Context;
use meridian_directory::MemoryDirectory;
use meridian_node::{
    build_processor, load_snapshot, read_feed, write_snapshot, FeedError, NodeConfig,
};
use std::path::PathBuf;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "meridian-node")]
#[command(about = "Meridian - organization directory node", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file path (defaults are used when omitted)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply a JSON-lines feed of organization claims
    Apply(ApplyCommand),

    /// Load and validate the configuration, then print it
    CheckConfig,
}

#[derive(Args)]
struct ApplyCommand {
    /// Feed file, one entry per line
    #[arg(short, long)]
    feed: PathBuf,

    /// Directory snapshot to start from and write back to
    #[arg(short, long)]
    snapshot: Option<PathBuf>,

    /// Index of the first feed entry to apply
    #[arg(long, default_value = "0")]
    start: usize,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt().with_env_filter(log_level).init();

    let config = NodeConfig::load_or_default(cli.config.as_deref())?;

    match cli.command {
        Commands::Apply(cmd) => apply(cmd, &config).await,
        Commands::CheckConfig => {
            let rendered =
                toml::to_string_pretty(&config).context("failed to render configuration")?;
            println!("{rendered}");
            Ok(())
        }
    }
}

async fn apply(cmd: ApplyCommand, config: &NodeConfig) -> Result<()> {
    let directory = match &cmd.snapshot {
        Some(path) => load_snapshot(path)?,
        None => MemoryDirectory::new(),
    };
    let entries = read_feed(&cmd.feed)?;
    info!(
        entries = entries.len(),
        start = cmd.start,
        feed = %cmd.feed.display(),
        "applying feed"
    );

    let processor = build_processor(config, directory.clone())?;
    let outcome = processor
        .process(&Context::background(), &entries, cmd.start)
        .await;

    // Everything applied before a halt is consistent, so it is kept.
    if let Some(path) = &cmd.snapshot {
        let written = write_snapshot(&directory, path).await?;
        info!(records = written, path = %path.display(), "snapshot saved");
    }

    match outcome {
        Ok(summary) => {
            println!(
                "applied {} entries: {} accepted, {} rejected ({} deferred)",
                summary.cursor.saturating_sub(cmd.start),
                summary.accepted,
                summary.rejected,
                summary.deferred
            );
            Ok(())
        }
        Err(FeedError::Halted { summary, source }) => {
            if source.is_context_error() {
                warn!(cursor = summary.cursor, "processing interrupted before the feed ended");
            }
            error!(cursor = summary.cursor, "resume with --start {}", summary.cursor);
            Err(anyhow::anyhow!(
                "halted at entry {} after {} accepted, {} rejected: {source}",
                summary.cursor,
                summary.accepted,
                summary.rejected
            ))
        }
        Err(err) => Err(err.into()),
    }
}
