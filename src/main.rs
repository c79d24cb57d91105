//! Music Index - keeps a SQLite index of a local audio library.
//!
//! Scans library folders, reads tags from audio files, merges duplicate
//! artists and albums, watches folders for changes and serves embedded cover
//! art from a disk cache. Everything is driven from CLI commands.

pub mod cli;
pub mod config;
pub mod cover;
pub mod db;
pub mod error;
pub mod library;
pub mod metadata;
pub mod model;
pub mod scanner;
#[cfg(test)]
pub mod test_utils;

use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Log targets shown at `info` when `RUST_LOG` is unset.
///
/// Events carry explicit targets like `library::index`, so the crate name
/// alone would filter them out.
const DEFAULT_LOG_DIRECTIVES: &str =
    "warn,music_index=info,library=info,scanner=info,db=info,cover=info,config=info,metadata=info";

fn log_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_DIRECTIVES))
}

fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();

    // Initialize logging
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(log_filter())
        .init();

    cli::run_command(&args)
}
