//! Export saved Redash queries to `.sql` files and keep them in git.
//!
//! # Usage
//! ```bash
//! redash2git -u https://redash.example.com -k $KEY            # export and stage
//! redash2git -u https://redash.example.com -o queries --commit # export and commit
//! redash2git -u https://redash.example.com --no-git            # files only
//! ```

mod api;
mod config;
mod editor;
mod export;
mod git;
mod ignores;
mod models;
mod sync;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::api::RedashClient;
use crate::config::{expand_path, ExportConfig};
use crate::editor::EditorPrompt;
use crate::git::RealGit;
use crate::ignores::DEFAULT_IGNORE_FILE;
use crate::sync::{SyncOutcome, Synchronizer};

#[derive(Parser, Debug)]
#[command(name = "redash2git")]
#[command(about = "Export saved Redash queries to .sql files and track them in git")]
#[command(version)]
struct Cli {
    /// Redash URL
    #[arg(short, long)]
    url: String,

    /// Redash API key
    #[arg(short, long, env = "REDASH_API_KEY", hide_env_values = true)]
    key: String,

    /// Output directory
    #[arg(short, long, default_value = "data")]
    output_dir: PathBuf,

    /// Commit staged changes (asks for a message in $EDITOR)
    #[arg(short, long, overrides_with = "no_commit")]
    commit: bool,

    /// Leave changes staged without committing
    #[arg(long, overrides_with = "commit")]
    no_commit: bool,

    /// File with glob patterns of paths never to stage or remove
    #[arg(long, default_value = DEFAULT_IGNORE_FILE)]
    ignore_file: String,

    /// Refuse to run if the output directory exists and is not empty
    #[arg(long)]
    require_empty: bool,

    /// Only write the query files, skip git
    #[arg(long)]
    no_git: bool,
}

impl Cli {
    fn into_config(self) -> ExportConfig {
        ExportConfig {
            url: self.url,
            api_key: self.key,
            output_dir: self.output_dir,
            ignore_file: expand_path(&self.ignore_file),
            commit: self.commit && !self.no_commit,
            require_empty: self.require_empty,
            git: !self.no_git,
        }
    }
}

fn main() -> Result<()> {
    let config = Cli::parse().into_config();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("redash2git=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    if config.require_empty && export::is_non_empty_dir(&config.output_dir)? {
        println!("{} is not empty.", config.output_dir.display());
        std::process::exit(-1);
    }

    run(&config)
}

fn run(config: &ExportConfig) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    let client = RedashClient::new(&config.url, &config.api_key)?;
    let records = runtime.block_on(client.fetch_all())?;
    let written = export::write_queries(&records, &config.output_dir)?;

    if !config.git {
        println!(
            "Wrote {} queries to {}",
            written.len(),
            config.output_dir.display()
        );
        return Ok(());
    }

    let cwd = std::env::current_dir().context("Failed to read current directory")?;
    let ignored = ignores::read_ignores(&config.ignore_file, &cwd)?;
    info!(count = ignored.len(), "ignored paths");

    let synchronizer = Synchronizer::new(RealGit::new(), EditorPrompt::from_env());
    let report = synchronizer.sync(&config.output_dir, &written, &ignored, config.commit)?;

    match report.outcome {
        SyncOutcome::NothingToDo => println!("Nothing to do."),
        SyncOutcome::Staged => println!(
            "Staged {} file(s), removed {}. Not committing (use --commit).",
            report.staged.len(),
            report.removed.len()
        ),
        SyncOutcome::Committed => println!(
            "Committed {} file(s), removed {}.",
            report.staged.len(),
            report.removed.len()
        ),
    }

    Ok(())
}
