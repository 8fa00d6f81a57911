//! Transport configuration document.
//!
//! ```yaml
//! bootstrap_servers: localhost:9092
//! create_topics: true
//! partitions: 3
//! properties:
//!   linger.ms: "5"
//!   compression.type: lz4
//! ```

use crate::error::SinkError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Kafka transport settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Broker list, e.g. `localhost:9092`
    #[serde(default = "default_bootstrap_servers")]
    pub bootstrap_servers: String,

    /// Extra librdkafka properties, applied after the defaults
    #[serde(default)]
    pub properties: BTreeMap<String, String>,

    /// Create every configured topic before producing
    #[serde(default)]
    pub create_topics: bool,

    /// Partitions for created topics
    #[serde(default = "default_partitions")]
    pub partitions: i32,

    /// Replication factor for created topics
    #[serde(default = "default_replication_factor")]
    pub replication_factor: i32,
}

fn default_bootstrap_servers() -> String {
    "localhost:9092".to_string()
}

fn default_partitions() -> i32 {
    3
}

fn default_replication_factor() -> i32 {
    1
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            bootstrap_servers: default_bootstrap_servers(),
            properties: BTreeMap::new(),
            create_topics: false,
            partitions: default_partitions(),
            replication_factor: default_replication_factor(),
        }
    }
}

impl TransportConfig {
    pub fn from_yaml(content: &str) -> Result<Self, SinkError> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, SinkError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }
}
