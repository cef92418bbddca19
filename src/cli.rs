use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::commands::DEFAULT_CAPLIST_DAYS;

/// Tracks clan citadel caps by polling member activity feeds.
#[derive(Parser, Debug)]
#[command(name = "capwatch", version, about = "Tracks clan citadel caps")]
pub struct Cli {
    /// Path to config file (default: $CAPWATCH_CONFIG or ~/.capwatch/config.json)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    /// Poll on a fixed interval until Ctrl-C
    Run,
    /// Run a single polling pass and print its report
    Once,
    /// List members that capped in the last N days
    Caplist {
        #[arg(long, default_value_t = DEFAULT_CAPLIST_DAYS)]
        days: u32,
    },
    /// List members whose activity log is private
    Private,
    /// Record a cap manually
    SetCapped {
        /// Display name
        name: String,
        /// Cap time as DD-Mon-YYYY HH:MM (UTC); defaults to now
        #[arg(long)]
        at: Option<String>,
        /// Operator recording the cap
        #[arg(long)]
        by: String,
    },
    /// Move a renamed member's history to their new name
    Remap { old: String, new: String },
}
