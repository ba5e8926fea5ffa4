//! Error types for the synchronized consumer
//!
//! This module defines the error hierarchy for the entire crate.
//! All public APIs return `Result<T, Error>` where Error is defined here.

use thiserror::Error;

/// The main error type for the synchronized consumer
#[derive(Error, Debug)]
pub enum Error {
    // ============================================================================
    // Configuration Errors
    // ============================================================================
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Missing required config field: {field}")]
    MissingConfigField { field: String },

    #[error("Invalid config value for '{field}': {message}")]
    InvalidConfigValue { field: String, message: String },

    #[error("Failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    // ============================================================================
    // Broker Errors
    // ============================================================================
    #[error("Kafka error: {0}")]
    Kafka(#[from] rdkafka::error::KafkaError),

    #[error("Broker client error: {message}")]
    Client { message: String },

    // ============================================================================
    // Synchronization Errors
    // ============================================================================
    #[error(
        "Offset validation failed for {topic}[{partition}]: expected offset {expected}, received {received}"
    )]
    OffsetValidation {
        topic: String,
        partition: i32,
        expected: i64,
        received: i64,
    },

    #[error("Received message for {topic}[{partition}] from unrecognized source: {client}")]
    UnrecognizedSource {
        client: String,
        topic: String,
        partition: i32,
    },

    // ============================================================================
    // Commit Log Errors
    // ============================================================================
    #[error("Malformed commit log key '{key}': {message}")]
    MalformedCommitLogKey { key: String, message: String },

    #[error("Invalid commit log offset '{value}': {message}")]
    InvalidCommitLogOffset { value: String, message: String },

    // ============================================================================
    // Handler Errors
    // ============================================================================
    #[error("Message handler failed: {message}")]
    Handler { message: String },

    // ============================================================================
    // I/O Errors
    // ============================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("File not found: {path}")]
    FileNotFound { path: String },

    // ============================================================================
    // Generic Errors
    // ============================================================================
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a missing field error
    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingConfigField {
            field: field.into(),
        }
    }

    /// Create an invalid config value error
    pub fn invalid_value(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfigValue {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a broker client error
    pub fn client(message: impl Into<String>) -> Self {
        Self::Client {
            message: message.into(),
        }
    }

    /// Create an offset validation error
    pub fn offset_validation(
        topic: impl Into<String>,
        partition: i32,
        expected: i64,
        received: i64,
    ) -> Self {
        Self::OffsetValidation {
            topic: topic.into(),
            partition,
            expected,
            received,
        }
    }

    /// Create an unrecognized source error
    pub fn unrecognized_source(
        client: impl Into<String>,
        topic: impl Into<String>,
        partition: i32,
    ) -> Self {
        Self::UnrecognizedSource {
            client: client.into(),
            topic: topic.into(),
            partition,
        }
    }

    /// Create a malformed commit log key error
    pub fn malformed_key(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MalformedCommitLogKey {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Create an invalid commit log offset error
    pub fn invalid_offset(value: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidCommitLogOffset {
            value: value.into(),
            message: message.into(),
        }
    }

    /// Create a handler error
    pub fn handler(message: impl Into<String>) -> Self {
        Self::Handler {
            message: message.into(),
        }
    }

    /// Check if this error must stop the consumer.
    ///
    /// Only undecodable commit log records may be dropped; everything else
    /// terminates the poll loop.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Error::MalformedCommitLogKey { .. } | Error::InvalidCommitLogOffset { .. }
        )
    }
}

/// Result type alias for the synchronized consumer
pub type Result<T> = std::result::Result<T, Error>;

/// Extension trait for adding context to errors
pub trait ResultExt<T> {
    /// Add context to an error
    fn context(self, message: impl Into<String>) -> Result<T>;

    /// Add context with a closure (lazy evaluation)
    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T>;
}

impl<T, E: Into<Error>> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, message: impl Into<String>) -> Result<T> {
        self.map_err(|e| {
            let inner = e.into();
            Error::Other(format!("{}: {}", message.into(), inner))
        })
    }

    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T> {
        self.map_err(|e| {
            let inner = e.into();
            Error::Other(format!("{}: {}", f(), inner))
        })
    }
}
