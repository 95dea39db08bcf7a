//! Backup Uploader - Main entry point

use anyhow::{Context, Result};
use backup_uploader::config::{Config, RunOptions};
use backup_uploader::executor::reprocess::{Confirm, NoConfirm};
use backup_uploader::executor::{BackupExecutor, RunOutcome};
use backup_uploader::prompt::TerminalPrompt;
use backup_uploader::store::{ObjectStore, S3Store};
use backup_uploader::utils;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", default_value = "backup-uploader.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,

    /// Shorthand for --log-level debug
    #[arg(long)]
    debug: bool,

    /// Check connectivity and report what would be stored, without storing anything
    #[arg(long)]
    dryrun: bool,

    /// Retry the files listed in the failure manifest of a previous run
    #[arg(long)]
    reprocess: bool,

    /// Reprocess without asking for confirmation
    #[arg(long)]
    no_confirm: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let config = Config::from_file(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;

    // Initialize logging
    let log_level = if args.debug {
        "debug"
    } else {
        args.log_level.as_deref().unwrap_or(&config.log.level)
    };
    utils::logger::init(log_level, &config.log.format)?;

    let options = RunOptions {
        dry_run: args.dryrun,
        reprocess: args.reprocess,
        no_confirm: args.no_confirm,
    };
    config.validate(&options)?;

    let store: Arc<dyn ObjectStore> = Arc::new(S3Store::new(&config.store)?);
    let executor = BackupExecutor::new(Arc::new(config), options, store);

    let confirm: Box<dyn Confirm + Send> = if options.no_confirm {
        Box::new(NoConfirm)
    } else {
        Box::new(TerminalPrompt::stdio())
    };

    match executor.execute(confirm).await {
        Ok(RunOutcome::NothingToDo) => {}
        Ok(RunOutcome::DryRun(report)) => println!("{}", report),
        Ok(RunOutcome::Completed(summary)) => {
            println!("{}", summary.manifest.failed_listing());
        }
        Err(e) => {
            tracing::error!("Run aborted: {}", e);
            return Err(e.into());
        }
    }

    Ok(())
}
