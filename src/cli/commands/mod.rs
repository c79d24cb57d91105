//! CLI command definitions and dispatch.
//!
//! Each group of subcommands lives in its own submodule:
//! - `scan`: Library scanning and file watching
//! - `catalog`: Migration, cover export and listing

mod catalog;
mod scan;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tokio::runtime::Runtime;

use crate::config::{self, Config};

pub use catalog::{cmd_cover, cmd_folders, cmd_list, cmd_migrate};
pub use scan::{cmd_scan, cmd_watch};

/// Music library indexer
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Database path (overrides the config file)
    #[arg(long, global = true, env = "MUSIC_INDEX_DB")]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand)]
pub enum Commands {
    /// Register folders, index their audio files, then watch for changes
    Scan {
        /// Library folders to scan
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        /// Exit after the scan instead of watching
        #[arg(long)]
        no_watch: bool,
    },
    /// Watch registered folders and keep the index up to date
    Watch,
    /// Normalize names and merge duplicate artists and albums
    Migrate,
    /// Export a track's cover art
    Cover {
        /// Track ID (see `list`)
        track_id: i64,
        /// Output file (default: cover-<TRACK_ID>.jpg)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// List all tracks in the database
    List,
    /// List registered library folders
    Folders,
}

/// Run the specified CLI command.
pub fn run_command(cli: &Cli) -> anyhow::Result<()> {
    let rt = Runtime::new()?;

    let config = with_db_override(config::load(), cli.db.as_ref());

    match &cli.command {
        Commands::Scan { paths, no_watch } => cmd_scan(&rt, config, paths, *no_watch),
        Commands::Watch => cmd_watch(&rt, &config),
        Commands::Migrate => cmd_migrate(&rt, &config),
        Commands::Cover { track_id, output } => {
            cmd_cover(&rt, &config, *track_id, output.as_deref())
        }
        Commands::List => cmd_list(&rt, &config),
        Commands::Folders => cmd_folders(&rt, &config),
    }
}

/// Apply the `--db` override on top of a loaded config.
pub(crate) fn with_db_override(mut config: Config, db: Option<&PathBuf>) -> Config {
    if let Some(db) = db {
        config.database.path = Some(db.clone());
    }
    config
}
