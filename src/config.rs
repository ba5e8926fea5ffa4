//! Configuration for the synchronized consumer
//!
//! Loaded from YAML or JSON. Besides the five options that define the
//! synchronization (`bootstrap_servers`, `topics`, `consumer_group`,
//! `commit_log_topic`, `synchronize_commit_group`) it carries poll scheduler
//! tuning and extra librdkafka properties.

use crate::error::{Error, Result, ResultExt};
use crate::types::{LogLevel, StringMap};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::LazyLock;
use std::time::Duration;
use uuid::Uuid;

/// Legal Kafka topic names
static TOPIC_NAME_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9._-]{1,249}$").unwrap());

/// librdkafka properties the synchronization protocol depends on
pub const RESERVED_PROPERTIES: &[&str] = &[
    "bootstrap.servers",
    "group.id",
    "enable.auto.commit",
    "enable.auto.offset.store",
    "enable.partition.eof",
    "auto.offset.reset",
];

// ============================================================================
// Consumer Config
// ============================================================================

/// Complete consumer configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsumerConfig {
    /// Kafka bootstrap servers (comma-separated host:port list)
    pub bootstrap_servers: String,

    /// Primary topics to consume
    pub topics: Vec<String>,

    /// Consumer group of this consumer
    pub consumer_group: String,

    /// Topic republishing committed offsets
    pub commit_log_topic: String,

    /// Group whose commits gate this consumer
    pub synchronize_commit_group: String,

    /// Group used by the commit log client.
    ///
    /// Every member of this group must read the whole commit log, so it is
    /// never shared: when unset, each instance joins its own
    /// `{consumer_group}:sync:{instance_id}` group.
    #[serde(default)]
    pub commit_log_group: Option<String>,

    /// Poll scheduler settings
    #[serde(default)]
    pub poll: PollConfig,

    /// Extra librdkafka properties applied to both clients
    #[serde(default)]
    pub properties: StringMap,

    /// Log level for the CLI
    #[serde(default)]
    pub log_level: LogLevel,
}

impl ConsumerConfig {
    /// Create a config with default scheduler settings
    pub fn new(
        bootstrap_servers: impl Into<String>,
        topics: Vec<String>,
        consumer_group: impl Into<String>,
        commit_log_topic: impl Into<String>,
        synchronize_commit_group: impl Into<String>,
    ) -> Self {
        Self {
            bootstrap_servers: bootstrap_servers.into(),
            topics,
            consumer_group: consumer_group.into(),
            commit_log_topic: commit_log_topic.into(),
            synchronize_commit_group: synchronize_commit_group.into(),
            commit_log_group: None,
            poll: PollConfig::default(),
            properties: StringMap::new(),
            log_level: LogLevel::default(),
        }
    }

    /// Set poll scheduler settings
    #[must_use]
    pub fn with_poll(mut self, poll: PollConfig) -> Self {
        self.poll = poll;
        self
    }

    /// Set the commit log client's group
    #[must_use]
    pub fn with_commit_log_group(mut self, group: impl Into<String>) -> Self {
        self.commit_log_group = Some(group.into());
        self
    }

    /// Add an extra librdkafka property
    #[must_use]
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Load and validate a config file (`.json` is parsed as JSON, anything else as YAML)
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::FileNotFound {
                path: path.display().to_string(),
            });
        }

        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

        if is_json {
            Self::from_json_str(&contents)
        } else {
            Self::from_yaml_str(&contents)
        }
    }

    /// Parse and validate YAML
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate JSON
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the configuration for values the consumer cannot run with
    pub fn validate(&self) -> Result<()> {
        require_non_empty("bootstrap_servers", &self.bootstrap_servers)?;
        require_non_empty("consumer_group", &self.consumer_group)?;
        require_non_empty("commit_log_topic", &self.commit_log_topic)?;
        require_non_empty("synchronize_commit_group", &self.synchronize_commit_group)?;

        if self.topics.is_empty() {
            return Err(Error::missing_field("topics"));
        }
        for topic in &self.topics {
            validate_topic_name("topics", topic)?;
        }
        validate_topic_name("commit_log_topic", &self.commit_log_topic)?;

        if self.topics.contains(&self.commit_log_topic) {
            return Err(Error::invalid_value(
                "commit_log_topic",
                "must not also be a primary topic",
            ));
        }

        if let Some(group) = &self.commit_log_group {
            require_non_empty("commit_log_group", group)?;
            if *group == self.consumer_group {
                return Err(Error::invalid_value(
                    "commit_log_group",
                    "must differ from consumer_group, the commit log must be replayed in full",
                ));
            }
        }

        if let Some(key) = RESERVED_PROPERTIES
            .iter()
            .find(|key| self.properties.contains_key(**key))
        {
            return Err(Error::invalid_value(
                "properties",
                format!("'{key}' is managed by the consumer and cannot be overridden"),
            ));
        }

        self.poll.validate()
    }

    /// Group used by the commit log client of instance `instance_id`
    pub fn commit_log_group(&self, instance_id: &str) -> String {
        match &self.commit_log_group {
            Some(group) => group.clone(),
            None => format!("{}:sync:{instance_id}", self.consumer_group),
        }
    }

    /// librdkafka properties of the main client
    pub fn main_client_properties(&self) -> StringMap {
        let mut properties = self.base_properties(&self.consumer_group);
        properties.insert("auto.offset.reset".to_string(), "error".to_string());
        properties
    }

    /// librdkafka properties of the commit log client of instance `instance_id`
    pub fn commit_log_client_properties(&self, instance_id: &str) -> StringMap {
        let mut properties = self.base_properties(&self.commit_log_group(instance_id));
        properties.insert("auto.offset.reset".to_string(), "earliest".to_string());
        properties
    }

    fn base_properties(&self, group: &str) -> StringMap {
        let mut properties = self.properties.clone();
        for (key, value) in [
            ("bootstrap.servers", self.bootstrap_servers.as_str()),
            ("group.id", group),
            ("enable.auto.commit", "false"),
            ("enable.auto.offset.store", "true"),
            ("enable.partition.eof", "false"),
        ] {
            properties.insert(key.to_string(), value.to_string());
        }
        properties
    }
}

/// Fresh identifier for one consumer instance
pub fn new_instance_id() -> String {
    Uuid::new_v4().simple().to_string()
}

fn require_non_empty(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::missing_field(field));
    }
    Ok(())
}

fn validate_topic_name(field: &str, topic: &str) -> Result<()> {
    if topic == "." || topic == ".." || !TOPIC_NAME_REGEX.is_match(topic) {
        return Err(Error::invalid_value(
            field,
            format!("'{topic}' is not a legal topic name"),
        ));
    }
    Ok(())
}

// ============================================================================
// Poll Config
// ============================================================================

/// Poll scheduler configuration
///
/// Each loop iteration polls the main client, then the commit log client,
/// each for at most its timeout, and backs off when neither had anything.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollConfig {
    /// Maximum wait on the main client per iteration
    #[serde(default = "default_poll_timeout")]
    pub main_timeout_ms: u64,

    /// Maximum wait on the commit log client per iteration
    #[serde(default = "default_poll_timeout")]
    pub commit_log_timeout_ms: u64,

    /// Sleep when an iteration yielded nothing
    #[serde(default = "default_idle_backoff")]
    pub idle_backoff_ms: u64,

    /// Timeout for blocking broker lookups (committed offsets, watermarks, seeks)
    #[serde(default = "default_operation_timeout")]
    pub operation_timeout_ms: u64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            main_timeout_ms: default_poll_timeout(),
            commit_log_timeout_ms: default_poll_timeout(),
            idle_backoff_ms: default_idle_backoff(),
            operation_timeout_ms: default_operation_timeout(),
        }
    }
}

fn default_poll_timeout() -> u64 {
    100
}

fn default_idle_backoff() -> u64 {
    50
}

fn default_operation_timeout() -> u64 {
    5000
}

impl PollConfig {
    /// Config that never waits (for in-memory clients)
    pub fn immediate() -> Self {
        Self {
            main_timeout_ms: 0,
            commit_log_timeout_ms: 0,
            idle_backoff_ms: 0,
            operation_timeout_ms: default_operation_timeout(),
        }
    }

    /// Main client poll timeout
    pub fn main_timeout(&self) -> Duration {
        Duration::from_millis(self.main_timeout_ms)
    }

    /// Commit log client poll timeout
    pub fn commit_log_timeout(&self) -> Duration {
        Duration::from_millis(self.commit_log_timeout_ms)
    }

    /// Idle backoff
    pub fn idle_backoff(&self) -> Duration {
        Duration::from_millis(self.idle_backoff_ms)
    }

    /// Broker lookup timeout
    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }

    fn validate(&self) -> Result<()> {
        if self.operation_timeout_ms == 0 {
            return Err(Error::invalid_value(
                "poll.operation_timeout_ms",
                "must be greater than zero",
            ));
        }
        Ok(())
    }
}
