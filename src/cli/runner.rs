//! CLI runner - executes commands

use crate::cli::commands::{Cli, Commands, OutputFormat};
use crate::client::CommitMode;
use crate::commit_log::CommitLogEntry;
use crate::config::{new_instance_id, ConsumerConfig};
use crate::consumer::{Committer, MessageHandler, SynchronizedConsumer};
use crate::error::{Error, Result};
use crate::types::ConsumedMessage;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tracing::{info, warn, Level};

/// CLI runner
pub struct Runner {
    cli: Cli,
}

impl Runner {
    /// Create a new runner
    pub fn new(cli: Cli) -> Self {
        Self { cli }
    }

    /// Log level to initialise tracing with.
    ///
    /// `--verbose` wins; otherwise the configured level, if the file loads.
    pub fn log_level(&self) -> Level {
        if self.cli.verbose {
            return Level::DEBUG;
        }
        self.load_config()
            .map(|config| config.log_level.into())
            .unwrap_or(Level::INFO)
    }

    /// Run the CLI command
    pub async fn run(&self) -> Result<()> {
        match &self.cli.command {
            Commands::Run { async_commit } => {
                let mode = if *async_commit {
                    CommitMode::Async
                } else {
                    CommitMode::Sync
                };
                self.consume(mode).await
            }
            Commands::Validate => self.validate(),
            Commands::Properties => self.properties(),
            Commands::Decode { key, value } => self.decode(key, value.as_deref()),
        }
    }

    /// Load configuration
    fn load_config(&self) -> Result<ConsumerConfig> {
        let path = self
            .cli
            .config
            .as_ref()
            .ok_or_else(|| Error::config("Configuration file not specified (use -c flag)"))?;
        ConsumerConfig::from_file(path)
    }

    /// Consume until Ctrl-C
    async fn consume(&self, mode: CommitMode) -> Result<()> {
        let config = self.load_config()?;
        let mut consumer = SynchronizedConsumer::new(config)?.start()?;
        let mut handler = LoggingHandler::new(mode);

        let outcome = consumer.run_until(&mut handler, shutdown_signal()).await;
        let stats = consumer.close()?;
        outcome?;

        self.output_message(&json!({
            "type": "STATS",
            "stats": stats,
        }));
        Ok(())
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        let config = self.load_config()?;

        self.output_message(&json!({
            "type": "LOG",
            "log": {
                "level": "INFO",
                "message": format!(
                    "Configuration is valid: {} topic(s) synchronized with group '{}' via '{}'",
                    config.topics.len(),
                    config.synchronize_commit_group,
                    config.commit_log_topic
                )
            }
        }));

        Ok(())
    }

    /// Show effective client properties
    fn properties(&self) -> Result<()> {
        let config = self.load_config()?;
        let main: BTreeMap<_, _> = config.main_client_properties().into_iter().collect();
        // A running consumer draws its own instance id.
        let commit_log: BTreeMap<_, _> = config
            .commit_log_client_properties(&new_instance_id())
            .into_iter()
            .collect();

        self.output_message(&json!({
            "type": "PROPERTIES",
            "main": main,
            "commit_log": commit_log,
        }));

        Ok(())
    }

    /// Decode a commit log record
    fn decode(&self, key: &str, value: Option<&str>) -> Result<()> {
        let entry = CommitLogEntry::decode(Some(key.as_bytes()), value.map(str::as_bytes))?;

        self.output_message(&json!({
            "type": "COMMIT",
            "commit": serde_json::to_value(&entry)?,
        }));

        Ok(())
    }

    /// Output a message
    fn output_message(&self, msg: &Value) {
        match self.cli.format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string(msg).unwrap_or_default());
            }
            OutputFormat::Pretty => {
                println!("{}", serde_json::to_string_pretty(msg).unwrap_or_default());
            }
        }
    }
}

/// Resolves on Ctrl-C; never resolves if the signal cannot be installed
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}

// ============================================================================
// Logging Handler
// ============================================================================

/// Handler logging every message and committing it afterwards
#[derive(Debug, Clone, Copy)]
pub struct LoggingHandler {
    mode: CommitMode,
    handled: u64,
}

impl LoggingHandler {
    /// Create a handler committing with `mode`
    pub fn new(mode: CommitMode) -> Self {
        Self { mode, handled: 0 }
    }

    /// Messages handled so far
    pub fn handled(&self) -> u64 {
        self.handled
    }
}

#[async_trait]
impl MessageHandler for LoggingHandler {
    async fn handle(
        &mut self,
        message: &ConsumedMessage,
        committer: &mut Committer<'_>,
    ) -> Result<()> {
        info!(
            topic = %message.topic,
            partition = message.partition,
            offset = message.offset,
            key = message.key_str().unwrap_or_default(),
            bytes = message.payload.as_ref().map_or(0, |p| p.len()),
            timestamp = ?message.timestamp(),
            "message"
        );
        committer.commit_message(message, self.mode)?;
        self.handled += 1;
        Ok(())
    }
}
