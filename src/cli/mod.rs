//! CLI module
//!
//! Command-line interface for the synchronized consumer.
//!
//! # Commands
//!
//! - `run` - Consume until Ctrl-C, logging and committing each message
//! - `validate` - Load and validate a configuration file
//! - `properties` - Show the effective client properties
//! - `decode` - Decode a commit log record

mod commands;
mod runner;

pub use commands::{Cli, Commands, OutputFormat};
pub use runner::{LoggingHandler, Runner};
