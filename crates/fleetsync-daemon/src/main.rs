//! Fleetsync Daemon - Main entry point
//!
//! Loads device facts, reconciles them into the inventory, and either exits
//! after one run or keeps syncing on a schedule behind a small status API.

mod api;
mod config;
mod facts;
mod server;
mod state;

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "fleetsync")]
#[command(about = "Reconcile network device facts into a Nautobot inventory")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "fleetsync.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Directory of fact documents (overrides [facts] path)
    #[arg(short, long)]
    facts: Option<PathBuf>,

    /// Run a single sync and exit
    #[arg(long)]
    once: bool,

    /// Print the run report as JSON instead of a table
    #[arg(long)]
    json: bool,

    /// Reconcile against an empty in-memory inventory instead of Nautobot
    #[arg(long)]
    dry_run: bool,

    /// Write a default configuration file to --config and exit
    #[arg(long)]
    write_default_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("Fleetsync v{}", env!("CARGO_PKG_VERSION"));

    if args.write_default_config {
        config::save_default_config(&args.config)?;
        info!(path = %args.config.display(), "Wrote default configuration");
        return Ok(());
    }

    let config = config::load_config(&args.config)?;
    let facts_path = args
        .facts
        .clone()
        .unwrap_or_else(|| PathBuf::from(&config.facts.path));

    info!(
        inventory = %config.inventory.url,
        facts = %facts_path.display(),
        concurrency = config.sync.concurrency,
        dry_run = args.dry_run,
        "Configuration loaded"
    );

    let state = state::AppState::new(config.clone(), facts_path, args.dry_run)?;

    if args.once || args.dry_run {
        // Single run mode
        let report = state.sync().await?;
        if args.json {
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            print!("{}", report.render_table());
        }
    } else {
        // Daemon mode - status API and scheduled syncs
        server::run(state, &config.daemon.bind).await?;
    }

    Ok(())
}
