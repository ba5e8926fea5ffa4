//! CLI commands and argument parsing

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Synchronized consumer CLI
#[derive(Parser, Debug)]
#[command(name = "synchronized-consumer")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Consumer configuration file (YAML or JSON)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, global = true, default_value = "json")]
    pub format: OutputFormat,

    /// Verbose output (debug logging)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Consume the primary topics in step with the synchronizing group
    Run {
        /// Commit after each message asynchronously instead of synchronously
        #[arg(long)]
        async_commit: bool,
    },

    /// Validate the configuration file
    Validate,

    /// Print the effective client properties of both clients
    Properties,

    /// Decode a commit log record
    Decode {
        /// Record key (`group:topic:partition`)
        #[arg(long)]
        key: String,

        /// Record value (offset); omit for a tombstone
        #[arg(long)]
        value: Option<String>,
    },
}

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// JSON output (one message per line)
    Json,
    /// Human-readable output
    Pretty,
}
