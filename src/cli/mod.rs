//! Command-line interface for music-index.
//!
//! This module provides CLI commands for scanning and watching library
//! folders, running the duplicate-merging migration, and inspecting the index.

mod commands;

pub use commands::{Cli, Commands, run_command};
