//! Common types used throughout the synchronized consumer
//!
//! This module contains shared type definitions, type aliases,
//! and utility types used across multiple modules.

use bytes::Bytes;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

// ============================================================================
// Type Aliases
// ============================================================================

/// Generic key-value map with string keys and values
pub type StringMap = HashMap<String, String>;

/// Offset within a partition (Kafka offsets are signed 64-bit)
pub type Offset = i64;

// ============================================================================
// Partition Key
// ============================================================================

/// Identity of a tracked topic partition
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PartitionKey {
    /// Topic name
    pub topic: String,
    /// Partition index within the topic
    pub partition: i32,
}

impl PartitionKey {
    /// Create a new partition key
    pub fn new(topic: impl Into<String>, partition: i32) -> Self {
        Self {
            topic: topic.into(),
            partition,
        }
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.topic, self.partition)
    }
}

impl From<(&str, i32)> for PartitionKey {
    fn from((topic, partition): (&str, i32)) -> Self {
        Self::new(topic, partition)
    }
}

// ============================================================================
// Consumed Message
// ============================================================================

/// An owned record delivered by a broker client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumedMessage {
    /// Topic the record was read from
    pub topic: String,
    /// Partition the record was read from
    pub partition: i32,
    /// Offset of the record
    pub offset: Offset,
    /// Record key
    pub key: Option<Bytes>,
    /// Record value
    pub payload: Option<Bytes>,
    /// Broker timestamp in milliseconds since the epoch
    pub timestamp_ms: Option<i64>,
}

impl ConsumedMessage {
    /// Create a message with no key, payload or timestamp
    pub fn new(topic: impl Into<String>, partition: i32, offset: Offset) -> Self {
        Self {
            topic: topic.into(),
            partition,
            offset,
            key: None,
            payload: None,
            timestamp_ms: None,
        }
    }

    /// Set the record key
    #[must_use]
    pub fn with_key(mut self, key: impl Into<Bytes>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Set the record value
    #[must_use]
    pub fn with_payload(mut self, payload: impl Into<Bytes>) -> Self {
        self.payload = Some(payload.into());
        self
    }

    /// Set the broker timestamp
    #[must_use]
    pub fn with_timestamp_ms(mut self, timestamp_ms: i64) -> Self {
        self.timestamp_ms = Some(timestamp_ms);
        self
    }

    /// Partition key of this message
    pub fn partition_key(&self) -> PartitionKey {
        PartitionKey::new(self.topic.clone(), self.partition)
    }

    /// Broker timestamp as a UTC datetime
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.timestamp_ms
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
    }

    /// Key as UTF-8 text, if present and valid
    pub fn key_str(&self) -> Option<&str> {
        self.key
            .as_deref()
            .and_then(|k| std::str::from_utf8(k).ok())
    }

    /// Payload as UTF-8 text, if present and valid
    pub fn payload_str(&self) -> Option<&str> {
        self.payload
            .as_deref()
            .and_then(|p| std::str::from_utf8(p).ok())
    }
}

// ============================================================================
// Log Level
// ============================================================================

/// Log level used by the configuration file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => tracing::Level::TRACE,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}
