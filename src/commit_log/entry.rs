//! Commit log record encoding and decoding

use crate::error::{Error, Result};
use crate::types::{ConsumedMessage, Offset, PartitionKey};
use serde::{Deserialize, Serialize};

/// Separator between key segments
pub const KEY_SEPARATOR: char = ':';

/// One committed offset published on the commit log
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CommitLogEntry {
    /// Consumer group that committed the offset
    pub group: String,
    /// Topic of the committed partition
    pub topic: String,
    /// Committed partition
    pub partition: i32,
    /// Next offset the group will read
    pub offset: Offset,
}

impl CommitLogEntry {
    /// Create a commit log entry
    pub fn new(
        group: impl Into<String>,
        topic: impl Into<String>,
        partition: i32,
        offset: Offset,
    ) -> Self {
        Self {
            group: group.into(),
            topic: topic.into(),
            partition,
            offset,
        }
    }

    /// Partition the entry refers to
    pub fn partition_key(&self) -> PartitionKey {
        PartitionKey::new(self.topic.clone(), self.partition)
    }

    /// Record key
    pub fn encode_key(&self) -> String {
        format!(
            "{}{KEY_SEPARATOR}{}{KEY_SEPARATOR}{}",
            self.group, self.topic, self.partition
        )
    }

    /// Record value
    pub fn encode_value(&self) -> String {
        self.offset.to_string()
    }

    /// Record key and value
    pub fn encode(&self) -> (String, String) {
        (self.encode_key(), self.encode_value())
    }

    /// Decode a record from raw key and value bytes
    pub fn decode(key: Option<&[u8]>, value: Option<&[u8]>) -> Result<Self> {
        let key = key.ok_or_else(|| Error::malformed_key("", "record has no key"))?;
        let key = std::str::from_utf8(key)
            .map_err(|e| Error::malformed_key(String::from_utf8_lossy(key), e.to_string()))?;
        let (group, topic, partition) = decode_key(key)?;

        let value = value.ok_or_else(|| Error::invalid_offset("", "record has no value"))?;
        let value = std::str::from_utf8(value)
            .map_err(|e| Error::invalid_offset(String::from_utf8_lossy(value), e.to_string()))?;
        let offset = decode_offset(value)?;

        Ok(Self::new(group, topic, partition, offset))
    }

    /// Decode a record delivered by the commit log client
    pub fn from_message(message: &ConsumedMessage) -> Result<Self> {
        Self::decode(message.key.as_deref(), message.payload.as_deref())
    }
}

/// Split a commit log key into `(group, topic, partition)`
pub fn decode_key(key: &str) -> Result<(&str, &str, i32)> {
    let segments: Vec<&str> = key.split(KEY_SEPARATOR).collect();
    let &[group, topic, partition] = segments.as_slice() else {
        return Err(Error::malformed_key(
            key,
            format!("expected 3 segments, found {}", segments.len()),
        ));
    };

    if group.is_empty() {
        return Err(Error::malformed_key(key, "empty group"));
    }
    if topic.is_empty() {
        return Err(Error::malformed_key(key, "empty topic"));
    }

    let partition = partition
        .parse::<i32>()
        .ok()
        .filter(|p| *p >= 0)
        .ok_or_else(|| Error::malformed_key(key, format!("invalid partition '{partition}'")))?;

    Ok((group, topic, partition))
}

/// Parse a commit log value into an offset
pub fn decode_offset(value: &str) -> Result<Offset> {
    let offset = value
        .parse::<Offset>()
        .map_err(|e| Error::invalid_offset(value, e.to_string()))?;

    if offset < 0 {
        return Err(Error::invalid_offset(value, "offset must not be negative"));
    }

    Ok(offset)
}
