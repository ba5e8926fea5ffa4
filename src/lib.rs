// Allow common clippy pedantic lints that aren't critical for this codebase
#![allow(clippy::must_use_candidate)]
#![allow(clippy::unused_async)]
#![allow(clippy::needless_pass_by_value)]

//! # Synchronized Consumer
//!
//! A Kafka consumer that never gets ahead of another consumer group.
//!
//! Every consumed partition is paced against the offsets a synchronizing
//! group commits, read back from a commit log topic. A partition is only
//! fetched while this consumer is behind that group; it is paused as soon as
//! it catches up or when the group's position is unknown.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use synchronized_consumer::{ConsumerConfig, LoggingHandler, SynchronizedConsumer};
//! use synchronized_consumer::client::CommitMode;
//!
//! #[tokio::main]
//! async fn main() -> synchronized_consumer::Result<()> {
//!     let config = ConsumerConfig::from_file("consumer.yaml")?;
//!     let mut consumer = SynchronizedConsumer::new(config)?.start()?;
//!
//!     let mut handler = LoggingHandler::new(CommitMode::Sync);
//!     consumer.run_until(&mut handler, async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     }).await?;
//!
//!     consumer.close()?;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                    SynchronizedConsumer                      │
//! │   poll main ─► validate ─► handle() ─► set_local_offset      │
//! │   poll commit log ─► decode ─► set_remote_offset             │
//! └──────────────────────────────────────────────────────────────┘
//!                │                                 │
//! ┌──────────────┴───────────┐     ┌───────────────┴──────────────┐
//! │  PartitionStateManager   │────►│  FlowController (listener)   │
//! │  local/remote per        │     │  pause / resume main client  │
//! │  partition               │     │                              │
//! └──────────────────────────┘     └──────────────────────────────┘
//! ```

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]

// ============================================================================
// Module declarations
// ============================================================================

/// Error types for the consumer
pub mod error;

/// Common types and type aliases
pub mod types;

/// Partition state tracking
pub mod state;

/// Commit log record codec
pub mod commit_log;

/// Broker client abstraction
pub mod client;

/// Configuration
pub mod config;

/// Synchronized consumer and poll loop
pub mod consumer;

/// Command-line interface
pub mod cli;

// ============================================================================
// Re-exports
// ============================================================================

pub use error::{Error, Result};
pub use types::*;

// Re-export commonly used types
pub use cli::LoggingHandler;
pub use config::{ConsumerConfig, PollConfig};
pub use consumer::{Committer, ConsumerStats, MessageHandler, SynchronizedConsumer};
pub use state::{PartitionState, PartitionStateListener, PartitionStateManager};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");
